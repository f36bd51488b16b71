use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::logging::LogLevel;
use crate::sound::decoder::DecoderOptions;
use crate::sound::handoff::{HandoffConfig, TimeoutPolicy, DEFAULT_HANDOFF_TIMEOUT};
use crate::sound::ieee80::ExtendedFloatMode;

/// Application options that can be set via CLI or config file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub extended_float: ExtendedFloatMode,
    pub handoff_timeout: Duration,
    pub timeout_policy: TimeoutPolicy,
    pub log_level: LogLevel,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            extended_float: ExtendedFloatMode::default(),
            handoff_timeout: DEFAULT_HANDOFF_TIMEOUT,
            timeout_policy: TimeoutPolicy::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl Options {
    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            extended_float: self.extended_float,
        }
    }

    pub fn handoff_config(&self) -> HandoffConfig {
        HandoffConfig {
            timeout: self.handoff_timeout,
            policy: self.timeout_policy,
        }
    }

    /// Applies one `key = value` setting
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "extended_float" => self.extended_float = parse_extended_float(value)?,
            "handoff_timeout" => self.handoff_timeout = parse_duration(value)?,
            "timeout_policy" => self.timeout_policy = parse_policy(value)?,
            "log_level" => self.log_level = value.parse()?,
            other => anyhow::bail!("Unknown option '{}'", other),
        }
        Ok(())
    }
}

/// Load options from a `key = value` file
///
/// Blank lines and lines starting with `#` are ignored. Without a path the
/// defaults are returned.
pub fn load_config(path: Option<&Path>) -> Result<Options> {
    let mut opts = Options::default();
    let path = match path {
        Some(path) => path,
        None => return Ok(opts),
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    apply_config(&mut opts, &text).with_context(|| format!("In config file {}", path.display()))?;
    Ok(opts)
}

/// Applies the settings in `text` on top of `opts`
pub fn apply_config(opts: &mut Options, text: &str) -> Result<()> {
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .with_context(|| format!("Line {}: expected key = value", index + 1))?;
        opts.set(key.trim(), value.trim())
            .with_context(|| format!("Line {}", index + 1))?;
    }
    Ok(())
}

/// Parse a duration: "2s", "500ms", or a bare number of milliseconds
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (digits, millis_per_unit) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 1)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1000)
    } else {
        (s, 1)
    };
    let value: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("Invalid duration '{}'", s))?;
    let millis = value
        .checked_mul(millis_per_unit)
        .with_context(|| format!("Duration '{}' too large", s))?;
    if millis == 0 {
        anyhow::bail!("Duration must be positive");
    }
    Ok(Duration::from_millis(millis))
}

/// Parse a timeout policy: "fail", "retry", or "retry:N"
pub fn parse_policy(s: &str) -> Result<TimeoutPolicy> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "fail" => Ok(TimeoutPolicy::Fail),
        "retry" => Ok(TimeoutPolicy::Retry { max_attempts: None }),
        _ => {
            let count = s
                .strip_prefix("retry:")
                .with_context(|| format!("Unknown timeout policy '{}'", s))?;
            let max: u32 = count.parse().context("Invalid retry count")?;
            Ok(TimeoutPolicy::Retry {
                max_attempts: Some(max),
            })
        }
    }
}

/// Parse the sample-rate decode mode: "reference" or "exact"
pub fn parse_extended_float(s: &str) -> Result<ExtendedFloatMode> {
    match s.trim().to_ascii_lowercase().as_str() {
        "reference" => Ok(ExtendedFloatMode::Reference),
        "exact" => Ok(ExtendedFloatMode::Exact),
        other => anyhow::bail!("Unknown extended float mode '{}'", other),
    }
}
