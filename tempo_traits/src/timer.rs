//! One-shot timer seam between the normal context and the expiry context.

use std::time::Duration;

/// Identity of one armed actuation.
///
/// The token travels with the timer so the expiry side never has to read
/// fields the normal context may be rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmToken {
    /// Monotonic arm counter; never 0 for a real arm.
    pub generation: u32,
    /// Absolute time (ms) the actuation was requested for.
    pub target_ms: i64,
    pub sequence: u16,
}

/// Called when an armed timer elapses.
///
/// Implementations run in the restricted context: they must not block,
/// allocate, or log.
pub trait ExpiryHandler: Send + Sync {
    fn on_expiry(&self, token: ArmToken);
}

/// A single hardware-style one-shot timer.
///
/// Starting it again before it fires may or may not cancel the previous
/// deadline; handlers must ignore tokens that are no longer armed.
pub trait OneShotTimer {
    fn start_once(
        &mut self,
        after: Duration,
        token: ArmToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
