//! Process-wide real-time setup: mlockall, SCHED_FIFO and CPU affinity.
//!
//! Each step is attempted independently; a failure is logged and the
//! service continues with whatever was applied.

use crate::cli::RtLock;

/// Knobs resolved from `[rt]` and the `serve` flags.
#[derive(Debug, Clone, Copy)]
pub struct RtRequest {
    pub enabled: bool,
    pub priority: Option<i32>,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

#[cfg(target_os = "linux")]
pub fn setup_rt_once(req: RtRequest) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !req.enabled {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match lock_memory(req.lock) {
            Ok(()) => tracing::info!(mode = ?req.lock, "rt: memory locked"),
            Err(e) => tracing::warn!(error = %e, mode = ?req.lock, "rt: mlockall failed"),
        }
        match apply_fifo(req.priority) {
            Ok(prio) => tracing::info!(priority = prio, "rt: SCHED_FIFO applied"),
            Err(e) => tracing::warn!(error = %e, "rt: SCHED_FIFO not applied"),
        }
        match pin_cpu(req.cpu.unwrap_or(0)) {
            Ok(cpu) => tracing::info!(cpu, "rt: affinity applied"),
            Err(e) => tracing::warn!(error = %e, "rt: affinity not applied"),
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(req: RtRequest) {
    if req.enabled {
        tracing::warn!("rt: real-time mode is only supported on Linux; continuing without it");
    }
}

#[cfg(target_os = "linux")]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    let flags = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => MCL_CURRENT,
        RtLock::All => MCL_CURRENT | MCL_FUTURE,
    };
    if unsafe { mlockall(flags) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    let retryable = matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM);
    // All may exceed the memlock limit where Current still fits.
    if lock == RtLock::All && retryable && unsafe { mlockall(MCL_CURRENT) } == 0 {
        tracing::warn!(error = %err, "rt: mlockall(current|future) failed, locked current pages only");
        return Ok(());
    }
    let mut msg = format!("mlockall: {err}");
    if retryable {
        if let Some(limit) = memlock_limit_kib() {
            msg.push_str(&format!("; memlock limit: {limit} KiB"));
        }
        msg.push_str("; needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

#[cfg(target_os = "linux")]
fn memlock_limit_kib() -> Option<u64> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    let r = unsafe { rlim.assume_init() };
    (r.rlim_cur != libc::RLIM_INFINITY).then_some(r.rlim_cur / 1024)
}

#[cfg(target_os = "linux")]
fn apply_fifo(priority: Option<i32>) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    let (min, max) = unsafe {
        let min = sched_get_priority_min(SCHED_FIFO);
        let max = sched_get_priority_max(SCHED_FIFO);
        if min < 0 || max < 0 { (1, 99) } else { (min, max) }
    };
    let prio = priority.unwrap_or(max).clamp(min, max);
    let param = sched_param {
        sched_priority: prio,
    };
    if unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            eyre::bail!(
                "{err}; needs CAP_SYS_NICE or root (try 'sudo setcap cap_sys_nice=ep /path/to/tempo')"
            );
        }
        return Err(err.into());
    }
    Ok(prio)
}

#[cfg(target_os = "linux")]
fn pin_cpu(target: usize) -> eyre::Result<usize> {
    use libc::{CPU_ISSET, CPU_SET, CPU_ZERO, cpu_set_t};

    let capacity = std::mem::size_of::<cpu_set_t>() * 8;
    if target >= capacity {
        eyre::bail!("CPU {target} exceeds cpu_set_t capacity {capacity}");
    }
    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if online < 1 {
        eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
    }
    if target as libc::c_long >= online {
        eyre::bail!("requested CPU {target} >= online {online}");
    }

    let mut allowed: cpu_set_t = unsafe { std::mem::zeroed() };
    let rc = unsafe {
        CPU_ZERO(&mut allowed);
        libc::sched_getaffinity(0, std::mem::size_of::<cpu_set_t>(), &mut allowed)
    };
    if rc == 0 && !unsafe { CPU_ISSET(target, &allowed) } {
        eyre::bail!("CPU {target} not permitted by current affinity mask");
    }

    let mut desired: cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        CPU_ZERO(&mut desired);
        CPU_SET(target, &mut desired);
    }
    if unsafe { libc::sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &desired) } != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(target)
}
