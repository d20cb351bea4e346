//! Run summaries delivered to the user.
//!
//! The organizer only knows about the [`Notifier`] trait. Delivery is either
//! a console line or an external command such as `notify-send`.

use crate::config::Config;
use crate::output::OutputFormatter;
use crate::summary::RunSummary;
use std::process::{Command, Stdio};

pub trait Notifier {
    fn notify(&self, summary: &RunSummary);

    /// Short name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Prints the summary and logs it.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, summary: &RunSummary) {
        if summary.is_empty() {
            return;
        }
        tracing::info!(%summary, "run summary");
        OutputFormatter::info(&format!("dlsort: {}", summary));
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

/// Runs an external program with the summary as its last argument.
pub struct CommandNotifier {
    program: String,
    args: Vec<String>,
}

impl CommandNotifier {
    /// `argv[0]` is the program; returns `None` for an empty argv.
    pub fn new(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn command(&self, summary: &RunSummary) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(summary.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        command
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, summary: &RunSummary) {
        if summary.is_empty() {
            return;
        }
        match self.command(summary).status() {
            Ok(status) if status.success() => {
                tracing::debug!(program = %self.program, "notification sent");
            }
            Ok(status) => {
                tracing::warn!(program = %self.program, %status, "notification command failed");
            }
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "could not run notification command");
            }
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

/// Used when notifications are turned off.
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _summary: &RunSummary) {}

    fn name(&self) -> &'static str {
        "silent"
    }
}

/// Picks the notifier the configuration asks for.
pub fn from_config(config: &Config) -> Box<dyn Notifier> {
    let notifier: Box<dyn Notifier> = if !config.notify {
        Box::new(SilentNotifier)
    } else {
        match config.notify_command.as_deref().and_then(CommandNotifier::new) {
            Some(notifier) => Box::new(notifier),
            None => Box::new(ConsoleNotifier),
        }
    };
    tracing::debug!(notifier = notifier.name(), "notifications configured");
    notifier
}
