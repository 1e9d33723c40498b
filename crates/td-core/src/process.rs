//! Process liveness probe used by stale-lock recovery.

/// Report whether a process with `pid` is running.
///
/// Any process the OS admits exists counts as alive, including ones owned by
/// another user (`EPERM`). Pid 0 and values outside the platform range are
/// never alive.
#[cfg(unix)]
#[must_use]
pub fn pid_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Without a portable probe, assume every non-zero pid is alive so locks are
/// never stolen from a live holder.
#[cfg(not(unix))]
#[must_use]
pub const fn pid_alive(pid: u32) -> bool {
    pid != 0
}

#[cfg(test)]
mod tests {
    use super::pid_alive;

    #[test]
    fn current_process_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_is_never_alive() {
        assert!(!pid_alive(0));
    }

    #[cfg(unix)]
    #[test]
    fn out_of_range_pid_is_dead() {
        assert!(!pid_alive(u32::MAX));
        assert!(!pid_alive(i32::MAX as u32));
    }
}
