//! Outcome of a single authentication pass

/// Mutable authentication outcome
///
/// A result starts out successful. Adapters flip it with [`AuthResult::cancel`];
/// once cancelled it stays cancelled and keeps the first reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    success: bool,
    cancel_reason: String,
}

impl Default for AuthResult {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthResult {
    pub fn new() -> Self {
        Self {
            success: true,
            cancel_reason: String::new(),
        }
    }

    /// Mark the result as failed. Later calls do not overwrite the reason.
    pub fn cancel(&mut self, reason: impl Into<String>) {
        if self.success {
            self.success = false;
            self.cancel_reason = reason.into();
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn is_cancelled(&self) -> bool {
        !self.success
    }

    /// Empty while the result is successful
    pub fn cancel_reason(&self) -> &str {
        &self.cancel_reason
    }
}
