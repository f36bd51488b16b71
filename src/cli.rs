use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{parse_duration, parse_extended_float, parse_policy, Options};
use crate::logging::LogLevel;
use crate::sound::formats::Dialect;

/// Inspect and convert chunk-based audio files
#[derive(Parser, Debug)]
#[command(name = "audioinfo")]
#[command(version)]
#[command(about = "Inspect and convert AIFF, WAV and CAF audio files", long_about = None)]
pub struct Cli {
    /// Options file (key = value lines)
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (nothing, user, error, warning, info, debug, all, or 0-6)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// AIFF sample-rate decoding (reference, exact)
    #[arg(long, value_name = "MODE", global = true)]
    pub extended_float: Option<String>,

    /// How long the chunk scanner waits for a chunk to be released (e.g. 2s, 500ms)
    #[arg(long, value_name = "DURATION", global = true)]
    pub handoff_timeout: Option<String>,

    /// What to do when a chunk is not released in time (fail, retry, retry:N)
    #[arg(long, value_name = "POLICY", global = true)]
    pub timeout_policy: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Print the stream description of each file
    Info {
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },
    /// List the chunks of a file
    Chunks {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Re-encode a file into another container
    Convert {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// Output container (aiff, wav, caf); defaults from the output extension
        #[arg(long, value_name = "FORMAT")]
        to: Option<String>,
    },
}

impl Cli {
    /// Merge CLI arguments into the options struct
    pub fn merge_into_options(&self, mut opts: Options) -> Result<Options> {
        if let Some(ref level) = self.log_level {
            opts.log_level = level.parse::<LogLevel>().context("Invalid log level")?;
        }
        if let Some(ref mode) = self.extended_float {
            opts.extended_float = parse_extended_float(mode)?;
        }
        if let Some(ref timeout) = self.handoff_timeout {
            opts.handoff_timeout = parse_duration(timeout).context("Invalid handoff timeout")?;
        }
        if let Some(ref policy) = self.timeout_policy {
            opts.timeout_policy = parse_policy(policy)?;
        }
        Ok(opts)
    }
}

/// Picks the output container from `--to`, falling back to the extension
pub fn target_dialect(to: Option<&str>, output: &Path) -> Result<Dialect> {
    if let Some(name) = to {
        return Dialect::from_extension(name)
            .with_context(|| format!("Unknown output format '{}'", name));
    }
    output
        .extension()
        .and_then(|ext| ext.to_str())
        .and_then(Dialect::from_extension)
        .with_context(|| {
            format!(
                "Cannot tell the output format from {}; use --to",
                output.display()
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sound::handoff::TimeoutPolicy;
    use crate::sound::ieee80::ExtendedFloatMode;
    use std::time::Duration;

    #[test]
    fn test_parse_info_paths() {
        let cli = Cli::try_parse_from(["audioinfo", "info", "a.aif", "b.wav"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Info {
                paths: vec![PathBuf::from("a.aif"), PathBuf::from("b.wav")]
            }
        );
    }

    #[test]
    fn test_info_requires_a_path() {
        assert!(Cli::try_parse_from(["audioinfo", "info"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "audioinfo",
            "chunks",
            "x.caf",
            "--handoff-timeout",
            "300ms",
            "--timeout-policy",
            "retry:4",
            "--extended-float",
            "exact",
            "-l",
            "debug",
        ])
        .unwrap();
        let opts = cli.merge_into_options(Options::default()).unwrap();
        assert_eq!(opts.handoff_timeout, Duration::from_millis(300));
        assert_eq!(
            opts.timeout_policy,
            TimeoutPolicy::Retry {
                max_attempts: Some(4)
            }
        );
        assert_eq!(opts.extended_float, ExtendedFloatMode::Exact);
        assert_eq!(opts.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_flags_override_file_values() {
        let mut file_opts = Options::default();
        file_opts.timeout_policy = TimeoutPolicy::Retry { max_attempts: None };
        file_opts.handoff_timeout = Duration::from_secs(9);
        let cli = Cli::try_parse_from(["audioinfo", "--timeout-policy", "fail", "info", "a.wav"])
            .unwrap();
        let opts = cli.merge_into_options(file_opts).unwrap();
        assert_eq!(opts.timeout_policy, TimeoutPolicy::Fail);
        assert_eq!(opts.handoff_timeout, Duration::from_secs(9));
    }

    #[test]
    fn test_invalid_flag_values() {
        let cli =
            Cli::try_parse_from(["audioinfo", "--handoff-timeout", "soon", "info", "a.wav"]).unwrap();
        assert!(cli.merge_into_options(Options::default()).is_err());
    }

    #[test]
    fn test_target_dialect() {
        assert_eq!(
            target_dialect(None, Path::new("out.wav")).unwrap(),
            Dialect::Wav
        );
        assert_eq!(
            target_dialect(Some("caf"), Path::new("out.wav")).unwrap(),
            Dialect::Caf
        );
        assert_eq!(
            target_dialect(None, Path::new("OUT.AIFF")).unwrap(),
            Dialect::Aiff
        );
        assert!(target_dialect(None, Path::new("out")).is_err());
        assert!(target_dialect(Some("mp3"), Path::new("out.wav")).is_err());
    }
}
