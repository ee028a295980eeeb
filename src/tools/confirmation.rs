//! Confirmation gate for destructive tools.

use async_trait::async_trait;

/// Answer to a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// The user explicitly agreed.
    Granted,
    /// The user declined, cancelled or answered anything but yes.
    Denied,
    /// The client cannot ask the user.
    Unavailable,
}

/// Asks the human user whether a tool may run.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Presents `message` for `tool` and waits for the answer.
    async fn confirm(&self, tool: &str, message: &str) -> Confirmation;
}

/// A [`Confirmer`] for clients that cannot be asked anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConfirmer;

#[async_trait]
impl Confirmer for NoConfirmer {
    async fn confirm(&self, _tool: &str, _message: &str) -> Confirmation {
        Confirmation::Unavailable
    }
}
