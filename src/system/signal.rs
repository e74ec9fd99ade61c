//! Signal numbers and names used to drive the shell's job control.
use libc::c_int;

pub type SignalNumber = c_int;

macro_rules! define_consts {
    ($($signal:ident,)*) => {
        pub mod consts {
            pub use libc::{$($signal,)*};
        }

        pub fn signal_name(signal: SignalNumber) -> Option<&'static str> {
            match signal {
                $(consts::$signal => Some(stringify!($signal)),)*
                _ => None,
            }
        }
    };
}

define_consts! {
    SIGCONT,
    SIGKILL,
    SIGSTOP,
}

/// Format a signal for diagnostics, falling back to its number.
pub fn signal_fmt(signal: SignalNumber) -> String {
    signal_name(signal)
        .map(str::to_owned)
        .unwrap_or_else(|| format!("unknown signal #{signal}"))
}
