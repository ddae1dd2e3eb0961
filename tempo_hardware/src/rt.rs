//! Per-thread real-time priority for the timer worker.

#[cfg(target_os = "linux")]
pub fn raise_current_thread() {
    use libc::{SCHED_FIFO, pthread_self, pthread_setschedparam, sched_get_priority_max, sched_param};

    let max = unsafe { sched_get_priority_max(SCHED_FIFO) };
    let param = sched_param {
        sched_priority: if max > 0 { max } else { 99 },
    };
    let rc = unsafe { pthread_setschedparam(pthread_self(), SCHED_FIFO, &param) };
    if rc != 0 {
        tracing::warn!(
            error = %std::io::Error::from_raw_os_error(rc),
            "timer thread stays at normal priority"
        );
    } else {
        tracing::debug!(priority = param.sched_priority, "timer thread on SCHED_FIFO");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn raise_current_thread() {
    tracing::debug!("SCHED_FIFO not available on this platform");
}
