use std::{fmt, io};

use libc::{c_int, WEXITSTATUS, WIFEXITED, WIFSIGNALED, WNOHANG, WTERMSIG};

use crate::cutils::cerr;
use crate::system::{
    interface::ProcessId,
    signal::{signal_fmt, SignalNumber},
};

mod sealed {
    pub trait Sealed {}

    impl Sealed for crate::system::interface::ProcessId {}
}

pub trait Wait: sealed::Sealed {
    /// Wait for the shell to terminate and reap it.
    ///
    /// Stopped children are not reported, so a shell parked at its idle beacon keeps this blocked
    /// (or [`WaitError::NotReady`] with [`WaitOptions::no_hang`]).
    fn wait(self, options: WaitOptions) -> Result<(ProcessId, WaitStatus), WaitError>;
}

impl Wait for ProcessId {
    fn wait(self, options: WaitOptions) -> Result<(ProcessId, WaitStatus), WaitError> {
        let mut raw: c_int = 0;

        let pid = cerr(unsafe { libc::waitpid(self.get(), &mut raw, options.flags) })
            .map_err(WaitError::Io)?;

        if pid == 0 {
            return Err(WaitError::NotReady);
        }

        Ok((ProcessId::new(pid), WaitStatus::from_raw(raw)))
    }
}

#[derive(Debug)]
pub enum WaitError {
    /// The shell is still alive. Only returned with [`WaitOptions::no_hang`].
    NotReady,
    Io(io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    flags: c_int,
}

impl WaitOptions {
    /// Block until the process terminates.
    pub const fn new() -> Self {
        Self { flags: 0 }
    }

    /// Return [`WaitError::NotReady`] instead of blocking.
    pub const fn no_hang(mut self) -> Self {
        self.flags |= WNOHANG;
        self
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// How a reaped shell ended.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// Called `exit` with this status.
    Exited(c_int),
    /// Killed by this signal.
    Signaled(SignalNumber),
    /// Anything `waitpid` may report besides the two above.
    Other(c_int),
}

impl WaitStatus {
    const fn from_raw(raw: c_int) -> Self {
        if WIFEXITED(raw) {
            Self::Exited(WEXITSTATUS(raw))
        } else if WIFSIGNALED(raw) {
            Self::Signaled(WTERMSIG(raw))
        } else {
            Self::Other(raw)
        }
    }

    pub const fn exit_status(&self) -> Option<c_int> {
        match self {
            Self::Exited(status) => Some(*status),
            _ => None,
        }
    }

    pub const fn term_signal(&self) -> Option<SignalNumber> {
        match self {
            Self::Signaled(signal) => Some(*signal),
            _ => None,
        }
    }
}

impl fmt::Debug for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(status) => write!(f, "Exited({status})"),
            Self::Signaled(signal) => write!(f, "Signaled({})", signal_fmt(*signal)),
            Self::Other(raw) => write!(f, "Other({raw:#x})"),
        }
    }
}
