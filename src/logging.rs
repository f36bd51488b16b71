use std::io::Write;
use std::str::FromStr;

use log::LevelFilter;

/// Log levels, most quiet first
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Nothing = 0,
    User = 1,
    Error = 2,
    #[default]
    Warning = 3,
    Info = 4,
    Debug = 5,
    All = 6,
}

impl LogLevel {
    /// Create a LogLevel from an integer
    pub fn from_i32(level: i32) -> Self {
        match level {
            0 => LogLevel::Nothing,
            1 => LogLevel::User,
            2 => LogLevel::Error,
            3 => LogLevel::Warning,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            6 => LogLevel::All,
            _ => LogLevel::Info,
        }
    }

    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    /// Maximum `log` level shown at this setting
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            LogLevel::Nothing => LevelFilter::Off,
            LogLevel::User | LogLevel::Error => LevelFilter::Error,
            LogLevel::Warning => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::All => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    /// Accepts a level name or its number
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i32>() {
            if !(0..=6).contains(&n) {
                anyhow::bail!("Log level {} out of range (0 to 6)", n);
            }
            return Ok(LogLevel::from_i32(n));
        }
        match s.to_ascii_lowercase().as_str() {
            "nothing" | "off" => Ok(LogLevel::Nothing),
            "user" => Ok(LogLevel::User),
            "error" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "all" | "trace" => Ok(LogLevel::All),
            other => anyhow::bail!("Unknown log level '{}'", other),
        }
    }
}

/// Installs the stderr logger at `level`
///
/// `RUST_LOG` refines the filter when set. Calling it again only changes the
/// level.
pub fn init(level: LogLevel) {
    let installed = env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .parse_default_env()
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .target(env_logger::Target::Stderr)
        .try_init();
    if installed.is_err() {
        log::debug!("Logger already installed");
        log::set_max_level(level.to_level_filter());
    }
}
