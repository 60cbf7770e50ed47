//! Terminal adapters for user output and prompts

use crate::domain::ports::{Prompter, Reporter};
use crate::error::{Error, Result};
use dialoguer::Confirm;
use tracing::{error, info, warn};

/// Reporter that emits user-facing messages as log events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        info!(target: "addon", "{}", message);
    }

    fn warning(&self, message: &str) {
        warn!(target: "addon", "{}", message);
    }

    fn error(&self, message: &str) {
        error!(target: "addon", "{}", message);
    }
}

/// Interactive yes/no prompt on the terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(message)
            .default(default)
            .interact()
            .map_err(|e| Error::Internal(format!("Prompt failed: {}", e)))
    }
}
