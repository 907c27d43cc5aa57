//! Early abort of a running session.

use tokio_util::sync::CancellationToken;

/// Cloneable handle that aborts a session from another task.
///
/// Aborting wakes any reply wait or pacing pause in progress; the session
/// then releases its connection and refuses further commands.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the session.
    pub fn abort(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `abort` has been called.
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }
}
