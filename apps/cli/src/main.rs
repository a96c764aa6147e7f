use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use canflash_core::{
    FirmwareImage, SessionConfig, TracingObserver, UploadOutcome, UploadSession, restore_bus,
    transport,
};
use clap::Parser;
use tracing::{error, info, warn};

const PROGRESS_REFRESH: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(author, version, about = "CAN bus firmware uploader", long_about = None)]
struct Args {
    /// CAN interface (can0, vcan0, ...)
    #[arg(required_unless_present = "list_interfaces")]
    interface: Option<String>,

    /// Node to flash: TOP, BOTTOM (BOT) or SENSE
    #[arg(required_unless_present_any = ["list_interfaces", "restore_bus"])]
    target: Option<String>,

    /// Firmware image (Intel HEX, or raw .bin)
    #[arg(required_unless_present_any = ["list_interfaces", "restore_bus"])]
    firmware: Option<PathBuf>,

    /// Boot mode wait per attempt in milliseconds [default: 10000]
    #[arg(short = 't', long)]
    timeout_ms: Option<u64>,

    /// Number of boot mode attempts [default: 1]
    #[arg(short, long)]
    attempts: Option<u32>,

    /// Unmute the bus after the upload
    #[arg(short, long)]
    unmute: bool,

    /// Give up on a chunk after this many polls
    #[arg(long)]
    max_chunk_polls: Option<u64>,

    /// Load defaults from a TOML session file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only send the unmute sequence, e.g. after a failed boot
    #[arg(long)]
    restore_bus: bool,

    /// List CAN interfaces and exit
    #[arg(long)]
    list_interfaces: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// File values first, then command line overrides.
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => SessionConfig::default(),
        };

        if let Some(name) = &self.target {
            config.target = SessionConfig::parse_target(name)?;
        }
        if let Some(timeout) = self.timeout_ms {
            config.boot_timeout_ms = timeout;
        }
        if let Some(attempts) = self.attempts {
            config.max_boot_attempts = attempts;
        }
        if self.unmute {
            config.unmute_after_upload = true;
        }
        if self.max_chunk_polls.is_some() {
            config.max_chunk_polls = self.max_chunk_polls;
        }
        if let Some(interface) = &self.interface {
            config.interface = Some(interface.clone());
        }
        if let Some(firmware) = &self.firmware {
            config.firmware_path = Some(firmware.display().to_string());
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(&args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if args.list_interfaces {
        let interfaces = transport::list_interfaces();
        if interfaces.is_empty() {
            warn!("No CAN interfaces found");
        }
        for name in interfaces {
            println!("{}", name);
        }
        return Ok(());
    }

    let config = args.session_config()?;
    let interface = config
        .interface
        .clone()
        .ok_or_else(|| anyhow!("No CAN interface given"))?;

    info!(interface = %interface, "Opening CAN interface");
    let bus = transport::open(&interface)
        .with_context(|| format!("Failed to open {}", interface))?;

    if args.restore_bus {
        let sent = restore_bus(bus.as_ref(), &TracingObserver);
        info!(frames = sent, "Bus restored");
        return Ok(());
    }

    let firmware = config
        .firmware_path
        .clone()
        .ok_or_else(|| anyhow!("No firmware file given"))?;
    let image = FirmwareImage::load(&firmware)?;
    info!(
        node = %config.target,
        bytes = image.len(),
        chunks = image.chunk_count(),
        "Uploading {}",
        firmware
    );

    let session = UploadSession::new(bus.as_ref(), image, config)?;
    let progress = session.progress();

    let report = std::thread::scope(|scope| {
        let worker = scope.spawn(move || session.run());

        let mut shown = -1.0;
        while !worker.is_finished() {
            let percent = progress.percent();
            if percent != shown {
                eprint!("\rProgress: {:5.1}%", percent);
                let _ = std::io::stderr().flush();
                shown = percent;
            }
            std::thread::sleep(PROGRESS_REFRESH);
        }
        eprintln!();
        worker.join()
    })
    .map_err(|_| anyhow!("Upload thread panicked"))?;

    if report.bus_muted {
        warn!(
            "CAN bus left muted, run `canflash {} --restore-bus` to restore traffic",
            interface
        );
    }

    match report.outcome {
        UploadOutcome::Flashed(result) => {
            info!(
                bytes = result.bytes_sent,
                chunks = result.chunks,
                packets_lost = result.packets_lost,
                "Upload complete"
            );
            Ok(())
        }
        UploadOutcome::BootFailed { attempts } => Err(anyhow!(
            "Target did not enter bootloader mode after {} attempt(s)",
            attempts
        )),
        UploadOutcome::Aborted { phase, error } => {
            Err(anyhow::Error::new(error).context(format!("Upload failed during {}", phase)))
        }
    }
}
