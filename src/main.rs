//! Binary entrypoint for the Meshtrace CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml`
//! - `show-config` - print the effective configuration after defaults and validation
//! - `replay <capture.jsonl> [--pretty]` - run a captured event log through the engine
//!   and print every message with its resolved route
//! - `listen` - read device events as JSON lines from stdin until EOF or ctrl-c
//!
//! See the library crate docs for module-level details: `meshtrace::`.
use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use meshtrace::config::Config;
use meshtrace::engine::{Correlator, RouteLookup};
use meshtrace::metrics;
use meshtrace::route::ContactBook;
use meshtrace::session::replay::{load_events, replay};
use meshtrace::session::{DeviceEvent, DeviceSession};

#[derive(Parser)]
#[command(name = "meshtrace")]
#[command(about = "Correlates MeshCore RX-log frames with decoded messages to show message routes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Print the effective configuration
    ShowConfig,
    /// Replay a JSON-lines capture of device events
    Replay {
        /// Capture file, one device event per line
        file: String,
        /// Pretty-print the JSON report
        #[arg(long)]
        pretty: bool,
    },
    /// Read device events from stdin and print routes when the stream ends
    Listen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Init writes the config, so it must not require one.
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new meshtrace configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::ShowConfig => {
            let config = effective_config(pre_config, &cli.config).await?;
            config.validate()?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Replay { file, pretty } => {
            let config = effective_config(pre_config, &cli.config).await?;
            let events = load_events(&file).await?;
            info!("Replaying {} event(s) from {}", events.len(), file);
            let report = replay(&config, events)?;
            let out = if pretty {
                serde_json::to_string_pretty(&report)?
            } else {
                serde_json::to_string(&report)?
            };
            println!("{}", out);
            print_metrics();
        }
        Commands::Listen => {
            let config = effective_config(pre_config, &cli.config).await?;
            listen(&config).await?;
            print_metrics();
        }
    }

    Ok(())
}

/// The config loaded for logging, or the load error when there was none.
async fn effective_config(pre_config: Option<Config>, path: &str) -> Result<Config> {
    match pre_config {
        Some(config) => Ok(config),
        None => Config::load(path).await,
    }
}

async fn listen(config: &Config) -> Result<()> {
    let contacts = Arc::new(ContactBook::new());
    let correlator = Correlator::new(config, contacts.clone())?;
    let session = DeviceSession::new(correlator.producer(), contacts);
    let (tx, rx) = mpsc::unbounded_channel::<DeviceEvent>();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut line_no = 0usize;
        while let Ok(Some(line)) = lines.next_line().await {
            line_no += 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match serde_json::from_str::<DeviceEvent>(line) {
                Ok(ev) => {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("stdin line {}: invalid device event: {}", line_no, e),
            }
        }
    });

    let summary = session.run(rx).await;
    reader.abort();
    info!(
        "session ended: {} frame(s), {} channel / {} direct message(s)",
        summary.frames, summary.channel_messages, summary.contact_messages
    );

    let routes = correlator.routes();
    for msg in routes.messages() {
        let view = routes.resolve_route(&msg);
        let sender = view.sender.as_ref().map(|s| s.name.as_str()).or(msg.sender().name.as_deref());
        println!("{} {}: {} [{}]", msg.received_at(), sender.unwrap_or("?"), msg.text(), view.path_summary());
    }
    Ok(())
}

fn print_metrics() {
    let snap = metrics::snapshot();
    info!(
        "matches: forward={} retroactive={} archive={} none={} guard_vetoes={}",
        snap.forward_matches, snap.retroactive_matches, snap.archive_matches, snap.no_matches, snap.guard_vetoes
    );
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let file = config.as_ref().and_then(|c| c.logging.file.clone());
    match file.and_then(|f| std::fs::OpenOptions::new().create(true).append(true).open(f).ok()) {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Tee to the console only when attached to a terminal
            let is_tty = atty::is(atty::Stream::Stderr);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
