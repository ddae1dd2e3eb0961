//! Device backends for the timing tester.
//!
//! - `sim`: lock-free simulated actuator and a clock-driven analog square wave
//! - `timer`: thread-backed one-shot timer
//! - `pin`: non-blocking output pin shared with the expiry context
//! - `rpi` (feature `hardware`): GPIO actuator and MCP3008 ADC via rppal
//! - `rt` (feature `rt`): SCHED_FIFO for the timer thread

pub mod error;
pub mod pin;
pub mod sim;
pub mod timer;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod rpi;
#[cfg(feature = "rt")]
pub mod rt;

pub use error::HwError;
pub use pin::{GuardedPin, PinWrite};
pub use sim::{SimulatedActuator, SimulatedAnalog};
pub use timer::ThreadTimer;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use rpi::{GpioActuator, Mcp3008};
