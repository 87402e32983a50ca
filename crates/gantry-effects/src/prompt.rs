//! Terminal confirmation prompts

use async_trait::async_trait;
use gantry_core::effects::PromptEffects;
use gantry_core::errors::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Interactive y/N prompt on the controlling terminal
///
/// Anything other than `y`/`yes` (case-insensitive), including EOF,
/// counts as a decline.
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    /// Create a new prompt handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PromptEffects for TerminalPrompt {
    async fn confirm(&self, message: &str) -> Result<bool> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{message} [y/N] ").as_bytes())
            .await?;
        stdout.flush().await?;

        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(false);
        }
        let answer = line.trim().to_ascii_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

/// Non-interactive handler that accepts every prompt
///
/// Used when the operator passed an assume-yes flag; the question is still
/// logged so the transcript shows what was skipped.
#[derive(Debug, Clone, Default)]
pub struct AssumeYes;

impl AssumeYes {
    /// Create a new auto-confirming handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PromptEffects for AssumeYes {
    async fn confirm(&self, message: &str) -> Result<bool> {
        tracing::info!(prompt = message, "auto-confirmed");
        Ok(true)
    }
}
