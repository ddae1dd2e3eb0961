//! Thread-backed one-shot timer.
//!
//! A dedicated worker thread stands in for the hardware timer: it owns the
//! single deadline, waits on a channel until the deadline (or a re-arm)
//! arrives, spins out the last stretch for sub-millisecond accuracy and then
//! calls the [`ExpiryHandler`]. The handler runs on the worker thread, which
//! plays the role of the restricted context.
//!
//! The worker is joined when the `ThreadTimer` is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use tempo_traits::{ArmToken, ExpiryHandler, OneShotTimer};

use crate::error::HwError;

/// Final stretch before a deadline that is busy-waited instead of parked.
const SPIN_MARGIN: Duration = Duration::from_micros(500);

#[derive(Debug, Clone, Copy)]
struct Arm {
    deadline: Instant,
    token: ArmToken,
}

pub struct ThreadTimer {
    tx: Option<xch::Sender<Arm>>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl ThreadTimer {
    pub fn spawn(handler: Arc<dyn ExpiryHandler>) -> Self {
        let (tx, rx) = xch::unbounded::<Arm>();
        let join_handle = std::thread::Builder::new()
            .name("tempo-timer".into())
            .spawn(move || run(&rx, &*handler));
        let join_handle = match join_handle {
            Ok(h) => Some(h),
            Err(e) => {
                tracing::error!(error = %e, "timer thread spawn failed");
                None
            }
        };
        Self {
            tx: join_handle.as_ref().map(|_| tx),
            join_handle,
        }
    }

    /// Factory matching `DispatcherBuilder::with_timer`.
    pub fn factory() -> impl FnOnce(Arc<dyn ExpiryHandler>) -> Box<dyn OneShotTimer + Send> {
        |handler: Arc<dyn ExpiryHandler>| -> Box<dyn OneShotTimer + Send> {
            Box::new(Self::spawn(handler))
        }
    }
}

fn run(rx: &xch::Receiver<Arm>, handler: &dyn ExpiryHandler) {
    #[cfg(feature = "rt")]
    crate::rt::raise_current_thread();

    tracing::debug!("timer thread started");
    let mut armed: Option<Arm> = None;
    loop {
        let next = match armed {
            Some(a) => rx.recv_deadline(a.deadline.checked_sub(SPIN_MARGIN).unwrap_or(a.deadline)),
            None => rx.recv().map_err(|_| xch::RecvTimeoutError::Disconnected),
        };
        match next {
            // A new arm replaces the deadline; the old one never fires.
            Ok(arm) => armed = Some(arm),
            Err(xch::RecvTimeoutError::Timeout) => {
                if let Some(a) = armed.take() {
                    while Instant::now() < a.deadline {
                        std::hint::spin_loop();
                    }
                    handler.on_expiry(a.token);
                }
            }
            Err(xch::RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::trace!("timer thread exiting cleanly");
}

impl OneShotTimer for ThreadTimer {
    fn start_once(
        &mut self,
        after: Duration,
        token: ArmToken,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let tx = self.tx.as_ref().ok_or(HwError::TimerStopped)?;
        tx.send(Arm {
            deadline: Instant::now() + after,
            token,
        })
        .map_err(|_| HwError::TimerStopped)?;
        Ok(())
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        // Closing the channel stops the worker, even with a deadline pending.
        drop(self.tx.take());
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}
