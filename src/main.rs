use anyhow::{Context, Result};
use clap::Parser;
use dlsort::cancel::CancellationToken;
use dlsort::cli::{OrganizeCommand, resolve_base_path, run_cli};
use dlsort::config::Config;
use dlsort::logging::init_logging;
use dlsort::output::OutputFormatter;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "dlsort",
    version,
    about = "Sort a downloads folder into category subfolders"
)]
struct Args {
    /// Directory to organize [default: downloads_dir from the config, then the platform downloads folder]
    dir: Option<PathBuf>,

    /// Show what would happen without touching any file
    #[arg(long)]
    dry_run: bool,

    /// Keep running and organize new files as they arrive
    #[arg(long, conflicts_with_all = ["undo", "clean"])]
    watch: bool,

    /// Revert the most recent run
    #[arg(long, conflicts_with = "clean")]
    undo: bool,

    /// Only expire files older than retention_days
    #[arg(long)]
    clean: bool,

    /// Configuration file to use instead of the lookup locations
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the default configuration and exit
    #[arg(long, conflicts_with_all = ["dry_run", "watch", "undo", "clean"])]
    init_config: bool,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn mode(&self) -> OrganizeCommand {
        let dry_run = self.dry_run;
        if self.watch {
            OrganizeCommand::Watch { dry_run }
        } else if self.undo {
            OrganizeCommand::Undo { dry_run }
        } else if self.clean {
            OrganizeCommand::Clean { dry_run }
        } else {
            OrganizeCommand::Organize { dry_run }
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            OutputFormatter::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every file was handled.
fn run(args: &Args) -> Result<bool> {
    if args.init_config {
        let path = args.config.clone().unwrap_or_else(Config::user_config_path);
        Config::write_default(&path).context("Error writing default configuration")?;
        OutputFormatter::success(&format!("Wrote default configuration to {}", path.display()));
        return Ok(true);
    }

    let config = Config::load(args.config.as_deref()).context("Error loading configuration")?;
    let base_path = resolve_base_path(args.dir.as_deref(), &config)?;
    let command = args.mode();

    let token = CancellationToken::new();
    if matches!(command, OrganizeCommand::Watch { .. }) {
        let handler_token = token.clone();
        ctrlc::set_handler(move || {
            tracing::info!("received Ctrl+C, stopping");
            handler_token.cancel();
        })
        .context("Failed to install Ctrl+C handler")?;
    }

    let status = run_cli(command, &base_path, &config, &token)?;
    Ok(status.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_mode_selection() {
        let args = Args::try_parse_from(["dlsort", "/tmp/dl", "--watch", "--dry-run"]).unwrap();
        assert_eq!(args.mode(), OrganizeCommand::Watch { dry_run: true });

        let args = Args::try_parse_from(["dlsort", "--undo"]).unwrap();
        assert_eq!(args.mode(), OrganizeCommand::Undo { dry_run: false });

        let args = Args::try_parse_from(["dlsort"]).unwrap();
        assert_eq!(args.mode(), OrganizeCommand::Organize { dry_run: false });
    }

    #[test]
    fn test_exclusive_modes_conflict() {
        assert!(Args::try_parse_from(["dlsort", "--watch", "--undo"]).is_err());
        assert!(Args::try_parse_from(["dlsort", "--undo", "--clean"]).is_err());
        assert!(Args::try_parse_from(["dlsort", "--init-config", "--watch"]).is_err());
    }
}
