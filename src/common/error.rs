use std::{fmt, io};

use crate::system::interface::ProcessId;

#[derive(Debug)]
pub enum Error {
    /// No pseudoterminal could be allocated or its follower side could not be opened.
    DeviceUnavailable(io::Error),
    /// Granting access to or unlocking the pseudoterminal failed.
    PermissionDenied(io::Error),
    SpawnFailed(io::Error),
    StateUnreadable(io::Error),
    ProcessTerminated(ProcessId),
    InvalidCommand,
    ResumeFailed(io::Error),
    TransmissionIncomplete {
        expected: usize,
        written: usize,
    },
    RelayForwardingFailed {
        read: usize,
        written: usize,
    },
    ReapFailed(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceUnavailable(e) => write!(f, "cannot open pseudoterminal: {e}"),
            Error::PermissionDenied(e) => {
                write!(f, "cannot grant access to pseudoterminal: {e}")
            }
            Error::SpawnFailed(e) => write!(f, "cannot spawn shell: {e}"),
            Error::StateUnreadable(e) => write!(f, "shell status acquiring failed: {e}"),
            Error::ProcessTerminated(pid) => write!(f, "shell {pid} terminated"),
            Error::InvalidCommand => f.write_str("command must not contain a line terminator"),
            Error::ResumeFailed(e) => write!(f, "cannot resume shell: {e}"),
            Error::TransmissionIncomplete { expected, written } => write!(
                f,
                "cannot feed pseudoterminal with command: {written} of {expected} bytes written"
            ),
            Error::RelayForwardingFailed { read, written } => write!(
                f,
                "cannot print out results: {written} of {read} bytes forwarded"
            ),
            Error::ReapFailed(e) => write!(f, "cannot reap shell: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DeviceUnavailable(e)
            | Error::PermissionDenied(e)
            | Error::SpawnFailed(e)
            | Error::StateUnreadable(e)
            | Error::ResumeFailed(e)
            | Error::ReapFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Returns `true` if the error means the shell is gone for good.
    ///
    /// Feeding a session again after such an error cannot succeed.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ProcessTerminated(_) | Self::StateUnreadable(_))
    }
}
