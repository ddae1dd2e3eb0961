//! Three-timestamp clock exchange.
//!
//! The responder only reports its own receipt (`t2`) and send (`t3`) times
//! next to the echoed originator time (`t1`). Offset and round-trip
//! arithmetic belong to the caller; [`TimeSyncReply::offset_ms`] and
//! [`TimeSyncReply::round_trip_ms`] are provided for clients.

use std::sync::Arc;
use std::time::Duration;

use tempo_traits::Clock;

use crate::protocol::Response;
use crate::util::wire_to_ms;

/// Processing delay inserted between receipt and reply.
pub const SYNC_TURNAROUND: Duration = Duration::from_micros(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSyncReply {
    pub t1: u64,
    pub t2: i64,
    pub t3: i64,
}

impl TimeSyncReply {
    /// Responder clock minus originator clock, given the originator's
    /// receive time `t4`: `((t2 - t1) + (t3 - t4)) / 2`.
    pub fn offset_ms(&self, t4: i64) -> i64 {
        let t1 = wire_to_ms(self.t1);
        (self.t2.saturating_sub(t1) + self.t3.saturating_sub(t4)) / 2
    }

    /// Network round trip excluding the responder turnaround.
    pub fn round_trip_ms(&self, t4: i64) -> i64 {
        let t1 = wire_to_ms(self.t1);
        t4.saturating_sub(t1) - self.t3.saturating_sub(self.t2)
    }
}

impl From<TimeSyncReply> for Response {
    fn from(r: TimeSyncReply) -> Self {
        Response::TimeSync {
            t1: r.t1,
            t2: r.t2,
            t3: r.t3,
        }
    }
}

/// Stateless: nothing survives between calls.
pub struct TimeSyncResponder {
    clock: Arc<dyn Clock + Send + Sync>,
    turnaround: Duration,
}

impl TimeSyncResponder {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            clock,
            turnaround: SYNC_TURNAROUND,
        }
    }

    pub fn respond(&self, t1: u64) -> TimeSyncReply {
        let t2 = self.clock.now_ms();
        self.clock.delay(self.turnaround);
        let t3 = self.clock.now_ms();
        TimeSyncReply { t1, t2, t3 }
    }
}
