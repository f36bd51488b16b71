use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use audiocontainer::cli::{self, Cli, Command};
use audiocontainer::config::{self, Options};
use audiocontainer::logging;
use audiocontainer::sound::{
    self, spawn_scanner, transcode, Container, Decoder, Encoder, FormatDetails, FrameSource,
    StreamMetadata,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let options = config::load_config(cli.config.as_deref())?;
    let options = cli.merge_into_options(options)?;
    logging::init(options.log_level);
    log::debug!("Options: {:?}", options);

    match &cli.command {
        Command::Info { paths } => Ok(info(paths, &options)),
        Command::Chunks { path } => chunks(path, &options),
        Command::Convert { input, output, to } => convert(input, output, to.as_deref(), &options),
    }
}

/// Describes each file; a failure is reported and the batch continues
fn info(paths: &[PathBuf], options: &Options) -> ExitCode {
    let mut failed = 0;
    for path in paths {
        match describe(path, options) {
            Ok(report) => print!("{}", report),
            Err(e) => {
                failed += 1;
                println!("{}: {} ({})", path.display(), e.kind(), e);
            }
        }
    }
    if failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

/// What `info` prints for one file
struct Report {
    path: PathBuf,
    container: Container,
    meta: StreamMetadata,
    /// Frames and duration, when the samples are PCM
    timing: Option<(u64, Duration)>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let meta = &self.meta;
        writeln!(f, "{}:", self.path.display())?;
        writeln!(
            f,
            "  container:   {} ({})",
            self.container.dialect, self.container.form_type
        )?;
        if let FormatDetails::Aiff {
            encoding,
            encoding_name,
        } = &meta.details
        {
            if self.container.is_aifc() {
                let name = encoding_name.as_deref().unwrap_or(encoding.default_name());
                writeln!(f, "  encoding:    {} ({})", encoding.fourcc(), name)?;
            }
        }
        writeln!(f, "  codec:       {}", meta.details.codec_name())?;
        writeln!(f, "  channels:    {}", meta.channels)?;
        writeln!(f, "  sample rate: {} Hz", meta.sample_rate)?;
        writeln!(f, "  bit depth:   {}", meta.bit_depth)?;
        match self.timing {
            Some((frames, duration)) => {
                writeln!(f, "  frames:      {}", frames)?;
                writeln!(f, "  duration:    {:.6} s", duration.as_secs_f64())
            }
            None => writeln!(f, "  frames:      unknown (not PCM)"),
        }
    }
}

fn describe(path: &Path, options: &Options) -> sound::Result<Report> {
    let mut decoder = Decoder::open(path)?.with_options(options.decoder_options());
    let container = decoder.read_header()?.clone();
    let meta = decoder.read_info()?.clone();
    let timing = if meta.is_pcm() {
        let frames = decoder.pcm()?.size();
        Some((frames, decoder.duration()?))
    } else {
        None
    };
    Ok(Report {
        path: path.to_path_buf(),
        container,
        meta,
        timing,
    })
}

fn chunks(path: &Path, options: &Options) -> Result<ExitCode> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let handle = spawn_scanner(
        BufReader::new(file),
        options.decoder_options(),
        options.handoff_config(),
    )
    .with_context(|| format!("Failed to read {}", path.display()))?;

    let container = handle.container();
    println!("{}: {} ({})", path.display(), container.dialect, container.form_type);
    while let Some(chunk) = handle.recv() {
        let header = *chunk.header();
        drop(chunk);
        match header.size {
            Some(size) => println!("  {}  {:>10} bytes at {}", header.id, size, header.offset),
            None => println!("  {}  to end of stream at {}", header.id, header.offset),
        }
    }
    if let Some(meta) = handle.description() {
        println!(
            "  description: {} ch, {} Hz, {} bit",
            meta.channels, meta.sample_rate, meta.bit_depth
        );
    }
    let summary = handle.join()?;
    println!("  {} chunks", summary.chunks);
    Ok(ExitCode::SUCCESS)
}

fn convert(input: &Path, output: &Path, to: Option<&str>, options: &Options) -> Result<ExitCode> {
    let dialect = cli::target_dialect(to, output)?;
    let mut pcm = Decoder::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?
        .with_options(options.decoder_options())
        .into_pcm()
        .with_context(|| format!("Failed to decode {}", input.display()))?;

    let file =
        File::create(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let mut encoder = Encoder::new(BufWriter::new(file), dialect, pcm.format())?;
    let frames = transcode(&mut pcm, &mut encoder)?;
    encoder.finish()?;
    println!(
        "Wrote {} frames to {} ({})",
        frames,
        output.display(),
        dialect
    );
    Ok(ExitCode::SUCCESS)
}
