//! Process exit status and signal delivery

use crate::error::{Error, Result};
use std::fmt;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Status of a process that exited normally with `code`
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            #[cfg(unix)]
            signal: None,
        }
    }

    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Returns true if the process was terminated by a signal
    pub fn terminated_by_signal(&self) -> bool {
        #[cfg(unix)]
        {
            self.signal.is_some()
        }
        #[cfg(not(unix))]
        {
            false
        }
    }

    /// Exit code as a single integer.
    ///
    /// Signal termination maps to `128 + signal`, the way shells report it.
    pub fn exit_code(&self) -> i32 {
        if let Some(code) = self.code {
            return code;
        }
        #[cfg(unix)]
        if let Some(signal) = self.signal {
            return 128 + signal;
        }
        -1
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
            #[cfg(unix)]
            signal: {
                use std::os::unix::process::ExitStatusExt;
                status.signal()
            },
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            return write!(f, "exit code {code}");
        }
        #[cfg(unix)]
        if let Some(signal) = self.signal {
            return write!(f, "terminated by signal {signal}");
        }
        f.write_str("unknown exit status")
    }
}

/// Fully buffered result of a finished process
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    /// How the process exited
    pub status: ExitStatus,
    /// Everything written to stdout
    pub stdout: String,
    /// Everything written to stderr
    pub stderr: String,
}

impl CapturedOutput {
    /// Exit code, see [`ExitStatus::exit_code`]
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Send SIGTERM to the process group led by `pid`
#[cfg(unix)]
pub(crate) fn terminate_group(pid: u32) -> Result<()> {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM)
}

/// Send SIGKILL to the process group led by `pid`
#[cfg(unix)]
pub(crate) fn kill_group(pid: u32) -> Result<()> {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL)
}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(pid as i32), signal) {
        // The group is already gone
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::signal_failed(signal as i32, e.to_string())),
    }
}
