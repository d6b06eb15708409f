//! Synheart Tracker CLI
//!
//! Send one-off telemetry or replay scripted host signals through the agent.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synheart_tracker::{
    config::Config,
    replay::{read_script, Replayer},
    EventTarget, MemoryTransport, Tracker, TrackerOptions, Transport, VERSION,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "synheart-tracker")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Non-blocking interaction and failure telemetry agent", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one payload to the collection endpoint
    Send {
        /// JSON payload to send
        data: String,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Replay a JSON-lines script of host signals through the agent
    Replay {
        /// Script file (reads stdin when omitted)
        #[arg(long, short)]
        file: Option<PathBuf>,

        /// URL the simulated host starts on
        #[arg(long, default_value = "http://localhost/")]
        initial_url: String,

        /// Capture pushState, replaceState and popstate
        #[arg(long)]
        history: bool,

        /// Capture hashchange
        #[arg(long)]
        hash: bool,

        /// Capture interactions on elements with a target-key attribute
        #[arg(long)]
        dom: bool,

        /// Capture uncaught errors and unhandled rejections
        #[arg(long)]
        js_error: bool,

        /// Generate a random session identifier when none is configured
        #[arg(long)]
        anonymous_session: bool,

        #[command(flatten)]
        delivery: DeliveryArgs,
    },

    /// Show configuration
    Config,
}

#[derive(clap::Args)]
struct DeliveryArgs {
    /// Collection endpoint (overrides the config file)
    #[arg(long)]
    url: Option<String>,

    /// User/session identifier
    #[arg(long)]
    uuid: Option<String>,

    /// Extra context as a JSON object
    #[arg(long)]
    extra: Option<String>,

    /// Print envelopes instead of sending them
    #[arg(long)]
    dry_run: bool,
}

impl DeliveryArgs {
    fn options(&self) -> Result<TrackerOptions> {
        let extra = self
            .extra
            .as_deref()
            .map(|text| {
                serde_json::from_str::<Map<String, Value>>(text)
                    .context("--extra must be a JSON object")
            })
            .transpose()?;

        Ok(TrackerOptions {
            request_url: self.url.clone(),
            uuid: self.uuid.clone(),
            extra,
            ..TrackerOptions::default()
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Send { data, delivery } => cmd_send(&data, &delivery),
        Commands::Replay {
            file,
            initial_url,
            history,
            hash,
            dom,
            js_error,
            anonymous_session,
            delivery,
        } => {
            let flags = TrackerOptions {
                history_tracker: history,
                hash_tracker: hash,
                dom_tracker: dom,
                js_error,
                ..TrackerOptions::default()
            };
            cmd_replay(file, &initial_url, flags, anonymous_session, &delivery)
        }
        Commands::Config => cmd_config(),
    }
}

fn cmd_send(data: &str, delivery: &DeliveryArgs) -> Result<()> {
    let payload: Value = serde_json::from_str(data).context("payload must be valid JSON")?;
    let config = Config::load()?;
    let options = config.tracker.clone().merge(delivery.options()?);

    let sink = DeliverySink::open(&config, delivery.dry_run)?;
    let tracker = Tracker::new(options, &EventTarget::new(), sink.transport())?;

    if !tracker.send_tracker(&payload) {
        eprintln!("Warning: payload was refused by the transport");
    }
    sink.finish();
    Ok(())
}

fn cmd_replay(
    file: Option<PathBuf>,
    initial_url: &str,
    flags: TrackerOptions,
    anonymous_session: bool,
    delivery: &DeliveryArgs,
) -> Result<()> {
    let config = Config::load()?;
    let mut options = config
        .tracker
        .clone()
        .merge(flags)
        .merge(delivery.options()?);
    if options.uuid.is_none() && anonymous_session {
        options.uuid = Some(uuid::Uuid::new_v4().to_string());
    }

    let signals = match file {
        Some(path) => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            read_script(BufReader::new(file))?
        }
        None => read_script(std::io::stdin().lock())?,
    };
    if signals.is_empty() {
        bail!("Script contains no signals");
    }

    let sink = DeliverySink::open(&config, delivery.dry_run)?;
    let mut replayer = Replayer::new(options, sink.transport(), initial_url)?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let total = signals.len();
    let mut applied = 0;
    for signal in signals {
        if !running.load(Ordering::SeqCst) {
            println!("Interrupted after {applied} of {total} signals");
            break;
        }
        if let Err(e) = replayer.apply(signal) {
            eprintln!("Warning: {e}");
        }
        applied += 1;
    }

    replayer.tracker().shutdown();
    sink.finish();
    println!();
    println!("{}", replayer.tracker().summary());
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load()?;
    println!("Synheart Tracker v{VERSION}");
    println!();
    println!("Config file: {}", Config::config_path().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Where envelopes go: the network, or stdout for dry runs.
enum DeliverySink {
    Memory(Arc<MemoryTransport>),
    #[cfg(feature = "beacon")]
    Beacon(Arc<synheart_tracker::BeaconTransport>),
}

impl DeliverySink {
    #[allow(unused_variables)]
    fn open(config: &Config, dry_run: bool) -> Result<Self> {
        #[cfg(feature = "beacon")]
        if !dry_run {
            let transport = synheart_tracker::BeaconTransport::spawn(config.beacon.clone())?;
            return Ok(Self::Beacon(Arc::new(transport)));
        }

        #[cfg(not(feature = "beacon"))]
        if !dry_run {
            eprintln!("Warning: beacon feature not enabled at compile time; printing envelopes");
        }

        Ok(Self::Memory(Arc::new(MemoryTransport::new())))
    }

    fn transport(&self) -> Arc<dyn Transport> {
        match self {
            Self::Memory(transport) => transport.clone(),
            #[cfg(feature = "beacon")]
            Self::Beacon(transport) => transport.clone(),
        }
    }

    /// Flush pending deliveries.
    fn finish(&self) {
        match self {
            Self::Memory(transport) => {
                for beacon in transport.beacons() {
                    println!("POST {} ({})", beacon.url, beacon.content_type);
                    println!("{}", beacon.body);
                }
            }
            #[cfg(feature = "beacon")]
            Self::Beacon(transport) => transport.shutdown(),
        }
    }
}

fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not install Ctrl+C handler: {e}");
    }
}
