//! Drive an interactive shell on a pseudoterminal, one command at a time.
//!
//! The shell is launched with a prompt hook that makes it stop itself before drawing each prompt.
//! A command has finished once the shell is observed in the stopped state again, so no marker has
//! to be injected into the command stream and no output has to be inspected.
//!
//! ```no_run
//! use shpawn::Session;
//!
//! let mut session = Session::spawn("/bin/bash", &["--norc", "--noprofile"])?;
//! session.quiet()?;
//! session.feed(&mut std::io::stdout(), b"echo hi")?;
//! # Ok::<(), shpawn::Error>(())
//! ```
pub(crate) mod common;
pub(crate) mod cutils;
pub mod feed;
pub mod launch;
pub mod log;
pub mod relay;
pub mod system;

pub use common::Error;
pub use feed::{feed, wait_idle, PollOptions};
pub use launch::{spawn, Launcher, Session};
pub use crate::log::ShellLogger;
pub use relay::{relay_chunk, write_fully, Chunk};
pub use system::{interface::ProcessId, process::ProcessState};
