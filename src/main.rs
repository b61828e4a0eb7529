//! Binary entrypoint for the smsgate CLI.
//!
//! Commands:
//! - `start [--port <path>]` - run the gateway: reset the modem and dispatch the outbox
//! - `init` - create a starter `config.toml` and the data directory
//! - `status` - probe the modem and print signal quality and charset
//! - `balance [--code <ussd>]` - run a USSD balance query
//! - `inbox` - list the messages stored on the modem
//! - `send <to> <text>` - queue a message for delivery
//!
//! See the library crate docs for module-level details: `smsgate::`.
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use smsgate::config::Config;
use smsgate::modem::ModemSession;
use smsgate::storage::{JsonStore, MessageStore, OutboundMessage};
use smsgate::worker::{self, DispatchConfig};

/// Single-segment limit for the GSM 7-bit alphabet.
const MAX_MESSAGE_CHARS: usize = 160;

#[derive(Parser)]
#[command(name = "smsgate")]
#[command(about = "An SMS gateway for serial GSM modems")]
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
    /// Start the gateway
    Start {
        /// Modem serial port (e.g., /dev/ttyUSB0); overrides the config value
        #[arg(short, long)]
        port: Option<String>,
    },
    /// Initialize a new gateway configuration
    Init,
    /// Show modem status: connectivity, signal quality, character set
    Status,
    /// Query the account balance over USSD
    Balance {
        /// USSD code to dial; overrides the configured one
        #[arg(long)]
        code: Option<String>,
    },
    /// List messages stored in the modem mailbox
    Inbox,
    /// Queue an outbound message for delivery
    Send {
        /// Destination number in international format
        to: String,
        /// Message text
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config early to configure logging (except for Init which writes it)
    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Start { port } => {
            let config = Config::load_or(pre_config, &cli.config).await?;
            info!("Starting smsgate v{}", env!("CARGO_PKG_VERSION"));

            let store = Arc::new(JsonStore::open(config.storage.data_dir.as_ref())?);

            // CLI port overrides config
            let port_path = port.unwrap_or_else(|| config.modem.port.clone());
            let session = Arc::new(ModemSession::connect(&port_path, config.modem.baud_rate)?);
            session.reset()?;
            info!("Modem on {} initialized", port_path);

            let dispatch = DispatchConfig {
                poll_interval: std::time::Duration::from_secs(config.dispatch.poll_interval_secs),
                retry_limit: config.dispatch.retry_limit,
            };
            worker::start_dispatch(session, store, dispatch);

            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
        }
        Commands::Init => {
            info!("Initializing new gateway configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);

            let config = Config::load(&cli.config).await?;
            tokio::fs::create_dir_all(&config.storage.data_dir).await?;
            info!("Data directory created at {}", config.storage.data_dir);
        }
        Commands::Status => {
            let config = Config::load_or(pre_config, &cli.config).await?;
            let session = ModemSession::connect(&config.modem.port, config.modem.baud_rate)?;
            session.check_connection()?;
            println!("modem:   {} @ {} baud", config.modem.port, config.modem.baud_rate);
            println!("signal:  {}", session.get_signal()?);
            println!("charset: {}", session.get_charset()?);
        }
        Commands::Balance { code } => {
            let config = Config::load_or(pre_config, &cli.config).await?;
            let session = ModemSession::connect(&config.modem.port, config.modem.baud_rate)?;
            let code = code.unwrap_or(config.dispatch.ussd_balance_code);
            let balance = session.get_balance(&code)?;
            println!("{:.2}", balance);
        }
        Commands::Inbox => {
            let config = Config::load_or(pre_config, &cli.config).await?;
            let session = ModemSession::connect(&config.modem.port, config.modem.baud_rate)?;
            let messages = session.get_messages()?;
            if messages.is_empty() {
                println!("mailbox is empty");
            }
            for message in messages {
                println!(
                    "[{}] {} {} ({})",
                    message.index, message.timestamp, message.sender, message.label
                );
                println!("    {}", message.body);
            }
        }
        Commands::Send { to, text } => {
            if text.chars().count() > MAX_MESSAGE_CHARS {
                bail!(
                    "message is {} characters, limit is {}",
                    text.chars().count(),
                    MAX_MESSAGE_CHARS
                );
            }
            if !to.starts_with('+') || !to[1..].chars().all(|c| c.is_ascii_digit()) {
                warn!("destination {} is not in international format", to);
            }
            let config = Config::load_or(pre_config, &cli.config).await?;
            let store = JsonStore::open(config.storage.data_dir.as_ref())?;
            let message = OutboundMessage::new(&to, &text);
            store.insert(&message)?;
            println!("queued {}", message.id);
        }
    }

    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(level);
    let log_file = config.as_ref().and_then(|c| c.logging.file.clone());
    if let Some(file) = log_file {
        if let Ok(f) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
        {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));

            // When stdout is not a terminal (e.g. under a service manager with
            // output already redirected) skip the console copy.
            let is_tty = atty::is(atty::Stream::Stdout);

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
        } else {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
