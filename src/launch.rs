//! Spawning a shell on a fresh pseudoterminal.
//!
//! The spawned shell must honor `PROMPT_COMMAND`: the launcher installs
//! `PROMPT_COMMAND=kill -STOP $$` so the shell stops itself right before drawing each prompt. This
//! idle beacon is what [`crate::feed`] synchronizes on. A shell without such a prompt hook starts
//! fine but can never be fed.
use std::{
    ffi::{CString, OsStr, OsString},
    io::{self, Write},
    os::{
        fd::{AsRawFd, RawFd},
        unix::ffi::{OsStrExt, OsStringExt},
    },
    ptr,
};

use libc::{c_char, SIGKILL, STDERR_FILENO};

use crate::{
    common::Error,
    feed::{feed, PollOptions},
    log::{dev_info, dev_warn},
    system::{
        _exit, fork,
        interface::ProcessId,
        kill,
        term::{Pty, PtyFollower, PtyLeader},
        wait::{Wait, WaitError, WaitOptions, WaitStatus},
        ForkResult,
    },
};

/// The environment variable bash runs before every interactive prompt.
pub const PROMPT_HOOK_VAR: &str = "PROMPT_COMMAND";
/// Makes the shell stop itself, signalling that it is idle.
pub const IDLE_BEACON: &str = "kill -STOP $$";

/// Exit status of the child when the target cannot be executed.
pub const EXEC_FAILED_STATUS: libc::c_int = 127;

/// Builder for a shell [`Session`].
///
/// The shell inherits the environment of the calling process, with the overrides given through
/// [`Launcher::env`] applied and the idle beacon installed on top.
#[derive(Debug, Clone)]
pub struct Launcher {
    path: OsString,
    args: Vec<OsString>,
    env: Vec<(OsString, OsString)>,
}

impl Launcher {
    pub fn new(path: impl AsRef<OsStr>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_owned()));
        self
    }

    /// Set an environment variable for the shell. The prompt hook cannot be overridden.
    pub fn env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_owned(), value.as_ref().to_owned()));
        self
    }

    /// Allocate a pty and start the shell on it.
    pub fn spawn(&self) -> Result<Session, Error> {
        let pty = Pty::open()?;

        // Everything the child needs is allocated up front: after `fork` only async-signal-safe
        // calls are allowed.
        let image = ExecImage::new(&self.path, &self.args, self.environment())
            .map_err(Error::SpawnFailed)?;

        let ForkResult::Parent(pid) = (unsafe { fork() }).map_err(Error::SpawnFailed)? else {
            exec_in_child(
                pty.leader.as_raw_fd(),
                pty.follower.as_raw_fd(),
                &image,
            )
        };

        dev_info!(
            "spawned {} as {pid} on {}",
            self.path.to_string_lossy(),
            pty.path.to_string_lossy()
        );

        let mut session = Session {
            pid,
            reaped: false,
            leader: pty.leader,
            follower: pty.follower,
            options: PollOptions::new(),
        };

        if let Err(err) = session.leader.set_nonblocking() {
            session.reap().ok();
            return Err(Error::SpawnFailed(err));
        }

        Ok(session)
    }

    fn environment(&self) -> Vec<(OsString, OsString)> {
        let mut env: Vec<(OsString, OsString)> = std::env::vars_os().collect();

        for (key, value) in self.env.iter().cloned() {
            env.retain(|(k, _)| *k != key);
            env.push((key, value));
        }

        env.retain(|(k, _)| k != PROMPT_HOOK_VAR);
        env.push((PROMPT_HOOK_VAR.into(), IDLE_BEACON.into()));

        env
    }
}

/// Spawn `path` with `args` on a new pseudoterminal. `path` is also passed as `argv[0]`.
pub fn spawn<S: AsRef<OsStr>>(path: impl AsRef<OsStr>, args: &[S]) -> Result<Session, Error> {
    Launcher::new(path).args(args).spawn()
}

/// C strings and pointer arrays for `execve`.
struct ExecImage {
    path: CString,
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    _envp: Vec<CString>,
    envp_ptrs: Vec<*const c_char>,
    failure_msg: Vec<u8>,
}

impl ExecImage {
    fn new(
        path: &OsStr,
        args: &[OsString],
        env: Vec<(OsString, OsString)>,
    ) -> io::Result<Self> {
        let path = c_string(path.as_bytes().to_vec())?;

        let argv = std::iter::once(Ok(path.clone()))
            .chain(args.iter().map(|arg| c_string(arg.as_bytes().to_vec())))
            .collect::<io::Result<Vec<_>>>()?;

        let envp = env
            .into_iter()
            .map(|(key, value)| {
                let mut entry = key.into_vec();
                entry.push(b'=');
                entry.extend(value.into_vec());
                c_string(entry)
            })
            .collect::<io::Result<Vec<_>>>()?;

        let mut failure_msg = Vec::new();
        writeln!(
            failure_msg,
            "shpawn: cannot execute '{}'",
            path.to_string_lossy()
        )?;

        Ok(Self {
            argv_ptrs: null_terminated(&argv),
            envp_ptrs: null_terminated(&envp),
            path,
            _argv: argv,
            _envp: envp,
            failure_msg,
        })
    }
}

fn c_string(bytes: Vec<u8>) -> io::Result<CString> {
    CString::new(bytes).map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

/// Bind the follower to the standard streams and replace the process image.
///
/// Only async-signal-safe functions are called here.
fn exec_in_child(leader: RawFd, follower: RawFd, image: &ExecImage) -> ! {
    unsafe {
        libc::close(leader);

        for fd in 0..=STDERR_FILENO {
            if fd == follower {
                // `dup2` would not clear close-on-exec here.
                libc::fcntl(fd, libc::F_SETFD, 0);
            } else {
                libc::close(fd);
                libc::dup2(follower, fd);
            }
        }

        if follower > STDERR_FILENO {
            libc::close(follower);
        }

        libc::execve(
            image.path.as_ptr(),
            image.argv_ptrs.as_ptr(),
            image.envp_ptrs.as_ptr(),
        );

        // Only reached if `execve` failed. stderr is the pty by now.
        libc::write(
            STDERR_FILENO,
            image.failure_msg.as_ptr().cast(),
            image.failure_msg.len(),
        );
    }

    _exit(EXEC_FAILED_STATUS)
}

/// A shell running on a pseudoterminal.
///
/// Dropping the session kills and reaps the shell if that did not happen yet, and closes both
/// sides of the pty.
pub struct Session {
    pid: ProcessId,
    reaped: bool,
    leader: PtyLeader,
    follower: PtyFollower,
    options: PollOptions,
}

impl Session {
    /// Spawn `path` with `args`, see [`spawn`].
    pub fn spawn<S: AsRef<OsStr>>(path: impl AsRef<OsStr>, args: &[S]) -> Result<Self, Error> {
        spawn(path, args)
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    /// The controlling side of the pty. It is in non-blocking mode.
    pub fn leader(&mut self) -> &mut PtyLeader {
        &mut self.leader
    }

    /// The side of the pty the shell uses as its standard streams.
    pub fn follower(&self) -> &PtyFollower {
        &self.follower
    }

    pub fn with_poll_options(mut self, options: PollOptions) -> Self {
        self.options = options;
        self
    }

    /// Run `command` in the shell and stream its output to `sink`, see [`feed`].
    pub fn feed<W: Write + ?Sized>(&mut self, sink: &mut W, command: &[u8]) -> Result<(), Error> {
        feed(self.pid, &mut self.leader, sink, command, &self.options)
    }

    /// Turn off the terminal echo and job control so command output reaches the sink alone.
    pub fn quiet(&mut self) -> Result<(), Error> {
        self.feed(&mut io::sink(), b"stty -echo")?;
        self.feed(&mut io::sink(), b"set +m")
    }

    /// Reap the shell if it has exited, without blocking.
    ///
    /// Once the shell is reaped its state can no longer be observed, so every later feed fails
    /// with [`Error::StateUnreadable`].
    pub fn try_wait(&mut self) -> Result<Option<WaitStatus>, Error> {
        if self.reaped {
            return Ok(None);
        }

        match self.pid.wait(WaitOptions::new().no_hang()) {
            Ok((_, status)) => {
                self.reaped = true;
                Ok(Some(status))
            }
            Err(WaitError::NotReady) => Ok(None),
            Err(WaitError::Io(err)) => Err(Error::ReapFailed(err)),
        }
    }

    /// Kill and reap the shell.
    pub fn terminate(mut self) -> Result<WaitStatus, Error> {
        self.reap().map_err(Error::ReapFailed)
    }

    fn reap(&mut self) -> io::Result<WaitStatus> {
        if let Err(err) = kill(self.pid, SIGKILL) {
            dev_warn!("cannot kill shell {}: {err}", self.pid);
        }

        loop {
            match self.pid.wait(WaitOptions::new()) {
                Ok((_, status)) => {
                    self.reaped = true;
                    dev_info!("shell {} reaped: {status:?}", self.pid);
                    return Ok(status);
                }
                Err(WaitError::Io(err)) if crate::cutils::was_interrupted(&err) => {}
                Err(WaitError::Io(err)) => {
                    // Nothing left to reap.
                    self.reaped = true;
                    return Err(err);
                }
                Err(WaitError::NotReady) => {}
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.reaped {
            if let Err(err) = self.reap() {
                dev_warn!("cannot reap shell {}: {err}", self.pid);
            }
        }
    }
}
