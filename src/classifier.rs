/// File classification by extension.
///
/// Maps file extensions to the category folder names configured in
/// `category_map`. Anything unmatched lands in [`OTHER_CATEGORY`].
///
/// # Examples
///
/// ```
/// use dlsort::classifier::Classifier;
/// use std::collections::BTreeMap;
///
/// let mut map = BTreeMap::new();
/// map.insert("pdf".to_string(), "Documents".to_string());
/// let classifier = Classifier::new(&map);
///
/// assert_eq!(classifier.classify(Some("PDF")), "Documents");
/// assert_eq!(classifier.classify(Some("xyz")), "Other");
/// assert_eq!(classifier.classify(None), "Other");
/// ```
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Category for files whose extension is not mapped.
pub const OTHER_CATEGORY: &str = "Other";

/// Folder receiving duplicates under the quarantine policy.
pub const DUPLICATES_CATEGORY: &str = "Duplicates";

/// Maps lowercase extensions to category names.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    extension_map: HashMap<String, String>,
}

impl Classifier {
    /// Builds a classifier from an extension to category table.
    pub fn new(category_map: &BTreeMap<String, String>) -> Self {
        let mut classifier = Self::default();
        for (ext, category) in category_map {
            classifier.add_extension_mapping(ext, category);
        }
        classifier
    }

    /// Adds an extension mapping. A leading dot is ignored.
    pub fn add_extension_mapping(&mut self, ext: &str, category: &str) {
        self.extension_map.insert(
            ext.trim_start_matches('.').to_lowercase(),
            category.to_string(),
        );
    }

    /// Returns the category for an extension, or `"Other"`.
    pub fn classify(&self, ext: Option<&str>) -> &str {
        ext.and_then(|ext| {
            self.extension_map
                .get(&ext.trim_start_matches('.').to_lowercase())
        })
        .map(String::as_str)
        .unwrap_or(OTHER_CATEGORY)
    }

    /// All category folder names this classifier can produce, `Other` included.
    pub fn categories(&self) -> BTreeSet<&str> {
        self.extension_map
            .values()
            .map(String::as_str)
            .chain(std::iter::once(OTHER_CATEGORY))
            .collect()
    }
}

/// Guesses an extension from the file's leading bytes.
///
/// Used for files that carry no extension in their name. Only the header is
/// read, not the whole file.
pub fn sniff_extension(path: &Path) -> Option<String> {
    match infer::get_from_path(path) {
        Ok(kind) => kind.map(|kind| kind.extension().to_string()),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "content sniffing failed");
            None
        }
    }
}
