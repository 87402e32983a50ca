//! Operator prompt effect interface

use async_trait::async_trait;

use crate::errors::Result;

/// Yes/no confirmation from whoever is driving the migration
#[async_trait]
pub trait PromptEffects: Send + Sync {
    /// Ask a yes/no question; `false` means decline
    async fn confirm(&self, message: &str) -> Result<bool>;
}
