//! Scheduling state of a process as reported by `/proc/<pid>/stat`.
use std::{fmt, io, path::PathBuf};

use crate::common::Error;

use super::interface::ProcessId;

/// A point-in-time observation of how the kernel classifies a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// `R`
    Running,
    /// `S`
    Sleeping,
    /// `T`, stopped by a job-control signal.
    Stopped,
    /// `Z`, exited but not yet reaped by its parent.
    Zombie,
    /// Any other state code (`D`, `t`, `X`, `I`, ...).
    Other(u8),
}

impl ProcessState {
    /// Read the current state of the process with the given ID.
    ///
    /// Every failure, be it a missing stat file or one that cannot be parsed, is reported as
    /// [`Error::StateUnreadable`].
    pub fn of(pid: ProcessId) -> Result<Self, Error> {
        let pid = pid.to_string();
        let path = PathBuf::from_iter(["/proc", pid.as_str(), "stat"]);
        let record = std::fs::read(path).map_err(Error::StateUnreadable)?;
        Self::parse(&record)
    }

    /// Extract the state from the contents of a stat file.
    ///
    /// The record looks like `pid (comm) state ...`. `comm` may contain spaces and parentheses,
    /// but the kernel always closes it with the last `)` of the record, followed by a single space
    /// and the state code.
    pub fn parse(record: &[u8]) -> Result<Self, Error> {
        let close_paren = record.iter().rposition(|b| *b == b')').ok_or_else(|| {
            Error::StateUnreadable(io::Error::new(
                io::ErrorKind::InvalidData,
                "could not find the end of the 'comm' field in the process stat",
            ))
        })?;

        let code = record[close_paren + 1..]
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .ok_or_else(|| {
                Error::StateUnreadable(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "process stat ends before the state field",
                ))
            })?;

        Ok(Self::from_code(*code))
    }

    pub const fn from_code(code: u8) -> Self {
        match code {
            b'R' => Self::Running,
            b'S' => Self::Sleeping,
            b'T' => Self::Stopped,
            b'Z' => Self::Zombie,
            other => Self::Other(other),
        }
    }

    /// The one-character code the kernel uses for this state.
    pub const fn code(&self) -> char {
        match self {
            Self::Running => 'R',
            Self::Sleeping => 'S',
            Self::Stopped => 'T',
            Self::Zombie => 'Z',
            Self::Other(code) => *code as char,
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Sleeping => f.write_str("sleeping"),
            Self::Stopped => f.write_str("stopped"),
            Self::Zombie => f.write_str("zombie"),
            Self::Other(code) => write!(f, "state '{}'", *code as char),
        }
    }
}
