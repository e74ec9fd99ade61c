//! Feeding commands to a self-stopping shell.
//!
//! The shell stops itself right before it draws a prompt (see [`crate::launch`]), so observing it
//! in the stopped state means it has nothing left to do and everything it printed for the previous
//! command is already in the pty. A round trip is:
//!
//! 1. wait until the shell is stopped,
//! 2. resume it with `SIGCONT`,
//! 3. send the command and one line terminator,
//! 4. wait until the shell is stopped again,
//! 5. drain whatever output is left.
//!
//! Waiting is a polling loop over `/proc/<pid>/stat` that relays output while the shell is busy.
//! There is no timeout: a shell that never stops again keeps the loop spinning.
use std::{
    io::{Read, Write},
    time::Duration,
};

use libc::SIGCONT;

use crate::{
    common::Error,
    log::{dev_debug, user_error, user_warn},
    relay::{relay_chunk, write_fully, Chunk},
    system::{interface::ProcessId, kill, process::ProcessState},
};

/// Options to configure how [`wait_idle`] polls the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
    interval: Option<Duration>,
}

impl PollOptions {
    /// Poll in a tight loop, without sleeping.
    pub const fn new() -> Self {
        Self { interval: None }
    }

    /// Sleep for `interval` whenever a poll found the shell busy and no output to relay.
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

impl Default for PollOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until the shell with the given ID has stopped itself.
///
/// Output the shell produces in the meantime is relayed to `sink` on a best-effort basis. Only the
/// shell's state ends the wait: a zombie fails with [`Error::ProcessTerminated`], an unreadable
/// state with [`Error::StateUnreadable`].
pub fn wait_idle<R, W>(
    pid: ProcessId,
    leader: &mut R,
    sink: &mut W,
    options: &PollOptions,
) -> Result<(), Error>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    loop {
        match ProcessState::of(pid)? {
            ProcessState::Stopped => return Ok(()),
            ProcessState::Zombie => return Err(Error::ProcessTerminated(pid)),
            ProcessState::Running | ProcessState::Sleeping | ProcessState::Other(_) => {}
        }

        let relayed = match relay_chunk(leader, sink) {
            Ok(Chunk::Forwarded(_)) => true,
            Ok(Chunk::Pending) => false,
            Ok(Chunk::Closed) => {
                dev_debug!("pty of shell {pid} reached end of file");
                false
            }
            Ok(Chunk::Failed(err)) => {
                dev_debug!("cannot read from pty of shell {pid}: {err}");
                false
            }
            Err(err) => {
                user_warn!("{err}");
                false
            }
        };

        match options.interval {
            Some(interval) if !relayed => std::thread::sleep(interval),
            _ => std::hint::spin_loop(),
        }
    }
}

/// Relay output until the pty has nothing more to offer.
fn drain<R, W>(pid: ProcessId, leader: &mut R, sink: &mut W) -> Result<(), Error>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    loop {
        match relay_chunk(leader, sink)? {
            Chunk::Forwarded(_) => {}
            Chunk::Pending | Chunk::Closed => return Ok(()),
            Chunk::Failed(err) => {
                dev_debug!("cannot read from pty of shell {pid}: {err}");
                return Ok(());
            }
        }
    }
}

/// Run `command` in the shell and stream the output it produces to `sink`.
///
/// `command` must not contain a line terminator; exactly one is appended. The shell must be
/// stopped at its idle beacon when this is called, and it is again when this returns `Ok`.
///
/// Nothing is retried. After an error the shell may have consumed part of a command, so feeding it
/// again may not behave as expected.
pub fn feed<L, W>(
    pid: ProcessId,
    leader: &mut L,
    sink: &mut W,
    command: &[u8],
    options: &PollOptions,
) -> Result<(), Error>
where
    L: Read + Write + ?Sized,
    W: Write + ?Sized,
{
    round_trip(pid, leader, sink, command, options).map_err(|err| {
        user_error!("{err}");
        err
    })
}

fn round_trip<L, W>(
    pid: ProcessId,
    leader: &mut L,
    sink: &mut W,
    command: &[u8],
    options: &PollOptions,
) -> Result<(), Error>
where
    L: Read + Write + ?Sized,
    W: Write + ?Sized,
{
    if command.contains(&b'\n') {
        return Err(Error::InvalidCommand);
    }

    wait_idle(pid, leader, sink, options)?;

    kill(pid, SIGCONT).map_err(Error::ResumeFailed)?;

    let expected = command.len() + 1;
    let written = write_fully(leader, command);
    if written != command.len() {
        return Err(Error::TransmissionIncomplete { expected, written });
    }
    if write_fully(leader, b"\n") != 1 {
        return Err(Error::TransmissionIncomplete {
            expected,
            written: command.len(),
        });
    }

    wait_idle(pid, leader, sink, options)?;

    drain(pid, leader, sink)
}
