//! OS resource limits for sandboxed child processes
//!
//! Limits are installed in the **child process** via `pre_exec`, after fork
//! and before exec, so the host process is never restricted.

use tokio::process::Command;

use super::ResourceLimits;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
type Resource = libc::__rlimit_resource_t;
#[cfg(all(unix, not(all(target_os = "linux", target_env = "gnu"))))]
type Resource = libc::c_int;

/// Installs `RLIMIT_AS`, `RLIMIT_CPU` and `RLIMIT_FSIZE` on the child.
#[cfg(unix)]
pub(crate) fn apply_child_limits(cmd: &mut Command, limits: &ResourceLimits) {
    let limits = *limits;
    // SAFETY: the closure only calls getrlimit/setrlimit, which are
    // async-signal-safe, and allocates nothing.
    unsafe {
        cmd.pre_exec(move || {
            lower_limit(libc::RLIMIT_AS, limits.max_memory)?;
            lower_limit(libc::RLIMIT_CPU, limits.max_cpu_time)?;
            lower_limit(libc::RLIMIT_FSIZE, limits.max_file_size)?;
            Ok(())
        });
    }
}

#[cfg(not(unix))]
pub(crate) fn apply_child_limits(_cmd: &mut Command, _limits: &ResourceLimits) {}

/// Sets the soft limit to `value`, capped at the existing hard limit.
#[cfg(unix)]
fn lower_limit(resource: Resource, value: u64) -> std::io::Result<()> {
    let mut current = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(resource, &mut current) } != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let wanted = value as libc::rlim_t;
    let soft = if current.rlim_max == libc::RLIM_INFINITY {
        wanted
    } else {
        wanted.min(current.rlim_max)
    };
    let next = libc::rlimit {
        rlim_cur: soft,
        rlim_max: current.rlim_max,
    };
    if unsafe { libc::setrlimit(resource, &next) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Maps a signal-terminated child to the limit it tripped, if any.
#[cfg(unix)]
pub(crate) fn limit_for_signal(signal: i32) -> Option<&'static str> {
    match signal {
        libc::SIGXCPU => Some("CPU time"),
        libc::SIGXFSZ => Some("file size"),
        _ => None,
    }
}
