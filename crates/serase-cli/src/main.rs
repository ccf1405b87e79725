//! serase: secure erase CLI
//!
//! Usage:
//!   serase --device /dev/sda [--nvme] [--dry-run] [--yes]
//!   serase --cryptoshred --file <path> [--dry-run]
//!
//! Every accepted request writes a sealed JSON certificate (and a text
//! rendering) into the configured certificate directory.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::info;

use serase_core::config::SeraseConfig;
use serase_core::{CertificateRecord, MediaKind};
use serase_shred::{
    CertificateRenderer, CertificateStore, CommandEraser, DevicePathProbe, DirectoryStore,
    EraseRequest, Orchestrator, ProgressFn, RunControl, ShredPipeline, TextRenderer,
};

const CONFIRM_PHRASE: &str = "ERASE-ALL";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "serase",
    version,
    about = "Secure disk erase and file crypto-shredding",
    long_about = "serase: firmware-level ATA/NVMe erase and per-file crypto-shred with sealed certificates"
)]
#[command(group(ArgGroup::new("target").required(true).args(["device", "file"])))]
struct Cli {
    /// Block device to erase (e.g. /dev/sda, /dev/nvme0n1)
    #[arg(long, short = 'd')]
    device: Option<String>,

    /// Treat the device as NVMe regardless of its name
    #[arg(long, requires = "device")]
    nvme: bool,

    /// Crypto-shred a single file instead of erasing a device
    #[arg(long, requires = "file")]
    cryptoshred: bool,

    /// File to crypto-shred
    #[arg(long, short = 'f', requires = "cryptoshred")]
    file: Option<PathBuf>,

    /// Simulate the operation; no storage is modified
    #[arg(long)]
    dry_run: bool,

    /// Skip the interactive ERASE-ALL confirmation
    #[arg(long, short = 'y')]
    yes: bool,

    /// Path to serase.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SERASE_CONFIG",
        default_value = "/etc/serase/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(long, env = "SERASE_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides config
    #[arg(long, env = "SERASE_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = SeraseConfig::load(&cli.config)
        .with_context(|| format!("loading config {}", cli.config.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.log.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        dry_run = cli.dry_run,
        "serase starting"
    );

    let orchestrator = build_orchestrator(&config, cli.nvme);

    let record = match (&cli.device, &cli.file) {
        (Some(device), _) => {
            if !cli.dry_run && !cli.yes {
                confirm_disk_erase(device)?;
            }
            orchestrator
                .request_erase(&EraseRequest::disk(device.clone(), cli.dry_run))
                .with_context(|| format!("erasing {device}"))?
        }
        (None, Some(path)) => cmd_shred(&orchestrator, path, cli.dry_run)?,
        (None, None) => anyhow::bail!("either --device or --file is required"),
    };

    write_certificate(&config, &record)?;

    if record.outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("operation did not succeed: {}", record.outcome);
        Ok(ExitCode::FAILURE)
    }
}

fn build_orchestrator(config: &SeraseConfig, force_nvme: bool) -> Orchestrator {
    if !force_nvme {
        return Orchestrator::new(config);
    }
    Orchestrator::with_collaborators(
        ShredPipeline::new(&config.shred),
        Box::new(DevicePathProbe::forced(MediaKind::Nvme)),
        Box::new(CommandEraser::new(config.disk.clone())),
    )
}

fn confirm_disk_erase(device: &str) -> Result<()> {
    eprintln!("WARNING: this will irreversibly erase ALL data on {device}.");
    eprint!("Type {CONFIRM_PHRASE} to continue: ");
    io::stderr().flush().ok();

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("reading confirmation")?;
    if answer.trim() != CONFIRM_PHRASE {
        anyhow::bail!("confirmation not given, nothing was erased");
    }
    Ok(())
}

// ── Progress bar ──────────────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
        )
        .context("progress bar template")?
        .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

// ── `serase --cryptoshred --file` ─────────────────────────────────────────────

fn cmd_shred(orchestrator: &Orchestrator, path: &Path, dry_run: bool) -> Result<CertificateRecord> {
    let pb = make_progress_bar(if dry_run { "shred (dry-run)" } else { "shred" })?;
    let progress: ProgressFn = {
        let pb = pb.clone();
        Box::new(move |done, total, msg| {
            pb.set_length(total);
            pb.set_position(done);
            pb.set_message(msg.to_string());
        })
    };

    let result = orchestrator.request_erase_with(
        &EraseRequest::file(path, dry_run),
        &RunControl {
            cancel: None,
            progress: Some(&progress),
        },
    );
    pb.finish_and_clear();

    result.with_context(|| format!("shredding {}", path.display()))
}

fn write_certificate(config: &SeraseConfig, record: &CertificateRecord) -> Result<()> {
    let document = if config.certificates.write_document {
        Some(TextRenderer.render(record).context("rendering certificate")?)
    } else {
        None
    };

    let store = DirectoryStore::new(&config.certificates.dir);
    let persisted = store
        .persist(record, document.as_ref())
        .context("persisting certificate")?;

    println!(
        "{}",
        serde_json::to_string_pretty(record).context("serializing certificate")?
    );
    println!("certificate: {}", persisted.record_path.display());
    if let Some(doc) = &persisted.document_path {
        println!("document:    {}", doc.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_device_and_file_conflict() {
        let res = Cli::try_parse_from([
            "serase",
            "--device",
            "/dev/sda",
            "--cryptoshred",
            "--file",
            "/tmp/x",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_file_requires_cryptoshred() {
        assert!(Cli::try_parse_from(["serase", "--file", "/tmp/x"]).is_err());
        let cli = Cli::try_parse_from(["serase", "--cryptoshred", "--file", "/tmp/x", "--dry-run"])
            .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.file, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn test_nvme_requires_device() {
        assert!(Cli::try_parse_from(["serase", "--nvme"]).is_err());
        let cli = Cli::try_parse_from(["serase", "--device", "/dev/sdb", "--nvme"]).unwrap();
        assert!(cli.nvme);
    }

    #[test]
    fn test_target_required() {
        assert!(Cli::try_parse_from(["serase", "--dry-run"]).is_err());
    }
}
