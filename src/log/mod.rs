#![allow(unused_macros)]
use std::{io::Write, ops::Deref, sync::Mutex};

macro_rules! logger_macro {
    ($name:ident is $rule_level:ident to $target:expr, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => (::log::log!(target: $target, ::log::Level::$rule_level, $d($d arg)+));
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident to $target:expr) => {
        logger_macro!($name is $rule_level to $target, $);
    };
}

logger_macro!(user_error is Error to "shpawn::user");
logger_macro!(user_warn is Warn to "shpawn::user");

macro_rules! dev_logger_macro {
    ($name:ident is $rule_level:ident to $target:expr, $d:tt) => {
        macro_rules! $name {
            ($d($d arg:tt)+) => {
                if std::cfg!(feature = "dev") {
                    (::log::log!(
                        target: $target,
                        ::log::Level::$rule_level,
                        "{}: {}",
                        std::panic::Location::caller(),
                        format_args!($d($d arg)+)
                    ));
                }
            };
        }

        pub(crate) use $name;
    };
    ($name:ident is $rule_level:ident to $target:expr) => {
        dev_logger_macro!($name is $rule_level to $target, $);
    };
}

dev_logger_macro!(dev_warn is Warn to "shpawn::dev");
dev_logger_macro!(dev_info is Info to "shpawn::dev");
dev_logger_macro!(dev_debug is Debug to "shpawn::dev");

/// A logger routing records to a different backend depending on their target.
///
/// `shpawn::user` diagnostics go to stderr. With the `dev` feature, `shpawn::dev` tracing goes to
/// the file named by `SHPAWN_DEV_LOGS` at build time, or to `shpawn-dev-<pid>.log` in the
/// temporary directory.
#[derive(Default)]
pub struct ShellLogger(Vec<(String, Box<dyn log::Log>)>);

impl ShellLogger {
    pub fn new(prefix: &'static str) -> Self {
        let mut logger: Self = Default::default();

        logger.add_logger("shpawn::user", StreamLogger::new(std::io::stderr(), prefix));

        #[cfg(feature = "dev")]
        {
            let path = option_env!("SHPAWN_DEV_LOGS")
                .map(std::path::PathBuf::from)
                .unwrap_or_else(|| {
                    std::env::temp_dir().join(format!("shpawn-dev-{}.log", std::process::id()))
                });
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(path);
            match file {
                Ok(file) => logger.add_logger("shpawn::dev", StreamLogger::new(file, "")),
                Err(err) => {
                    let _ = writeln!(std::io::stderr(), "{prefix}cannot open dev log: {err}");
                }
            }
        }

        logger
    }

    /// Install this logger as the global `log` backend.
    ///
    /// Fails if another logger was installed before.
    pub fn into_global_logger(self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self)).map(|()| log::set_max_level(log::LevelFilter::Trace))
    }

    /// Add a logger for a specific prefix to the stack
    fn add_logger(
        &mut self,
        prefix: impl ToString + Deref<Target = str>,
        logger: impl log::Log + 'static,
    ) {
        let prefix = if prefix.ends_with("::") {
            prefix.to_string()
        } else {
            // given a prefix `my::prefix`, we want to match `my::prefix::somewhere`
            // but not `my::prefix_to_somewhere`
            format!("{}::", prefix.to_string())
        };
        self.0.push((prefix, Box::new(logger)))
    }

    fn route<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = &'a (dyn log::Log + 'static)> + 'a {
        self.0.iter().filter_map(move |(prefix, l)| {
            (target == &prefix[..prefix.len() - 2] || target.starts_with(prefix.as_str()))
                .then_some(&**l)
        })
    }
}

/// Writes every record it is handed as one prefixed line.
struct StreamLogger<W> {
    target: Mutex<W>,
    prefix: &'static str,
}

impl<W> StreamLogger<W> {
    fn new(target: W, prefix: &'static str) -> Self {
        Self {
            target: Mutex::new(target),
            prefix,
        }
    }
}

impl<W: Write + Send> log::Log for StreamLogger<W> {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if let Ok(mut target) = self.target.lock() {
            let _ = writeln!(target, "{}{}", self.prefix, record.args());
        }
    }

    fn flush(&self) {
        if let Ok(mut target) = self.target.lock() {
            let _ = target.flush();
        }
    }
}

impl log::Log for ShellLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level() && metadata.level() <= log::STATIC_MAX_LEVEL
    }

    fn log(&self, record: &log::Record) {
        for l in self.route(record.target()) {
            l.log(record);
        }
    }

    fn flush(&self) {
        for (_, l) in self.0.iter() {
            l.flush();
        }
    }
}
