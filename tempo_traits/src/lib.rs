pub mod clock;
pub mod timer;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use timer::{ArmToken, ExpiryHandler, OneShotTimer};

/// Physical output driven by an actuation.
///
/// Both contexts call into the actuator, so methods take `&self` and must be
/// safe to call from the timer-expiry context (no blocking, no allocation).
pub trait Actuator: Send + Sync {
    fn set_output(&self, high: bool);
    fn set_indicator(&self, on: bool);

    /// Session-connected LED. Backends without one ignore it.
    fn set_session(&self, _on: bool) {}

    /// Apply pin writes that could not complete without blocking. Normal
    /// context only. Returns how many writes were deferred since the last
    /// call.
    fn settle(&self) -> u32 {
        0
    }
}

/// Analog level source polled by the edge detector.
pub trait AnalogInput {
    fn read_level(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>>;
}

/// Lets callers pick the backend at runtime (`Box<dyn AnalogInput + Send>`).
impl<T: AnalogInput + ?Sized> AnalogInput for Box<T> {
    fn read_level(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        (**self).read_level()
    }
}

/// Outbound half of the command transport (a notify-style characteristic).
pub trait ResponseSink {
    fn notify(&mut self, payload: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
