//! NextGCore QoS provisioning client
//!
//! Connects to a PCRF, sends one Credit-Control-Request per configured
//! subscriber carrying the configured QoS profile, and prints one line per
//! subscriber with the outcome.

use anyhow::{Context, Result};
use clap::Parser;
use nextgcore_qosprovd::{
    provision_all, CcrBuilder, CcrSettings, Imsi, ProvisionError, QosprovConfig, ThreadRandom,
};
use ogs_diameter::{DiameterClient, PeerConnection};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// NextGCore QoSProvD - PCRF QoS provisioning client
#[derive(Parser, Debug)]
#[command(name = "nextgcore-qosprovd")]
#[command(author = "NextGCore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diameter Credit-Control QoS provisioning client", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, default_value = "/etc/nextgcore/qosprovd.yaml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'e', long, default_value = "info")]
    log_level: String,

    /// Disable color output
    #[arg(short = 'm', long)]
    no_color: bool,

    /// PCRF address (host:port), overrides the configuration file
    #[arg(long)]
    pcrf: Option<String>,

    /// Subscriber IMSI, may be repeated; replaces the configured list
    #[arg(long = "imsi")]
    imsi: Vec<String>,

    /// Build and print the requests without connecting
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    log::info!(
        "NextGCore QoSProvD v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    let config = load_config(&args)?;
    let subscribers = config.validate().context("Invalid configuration")?;
    log::info!(
        "Profile [{}] for {} subscriber(s)",
        config.profile.name,
        subscribers.len()
    );

    // Set up signal handlers
    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let mut builder = CcrBuilder::new(CcrSettings::from(&config), ThreadRandom);

    if args.dry_run {
        for imsi in &subscribers {
            println!("{}", builder.build(imsi, &config.profile));
        }
        return Ok(());
    }

    run(&config, &subscribers, &mut builder, &shutdown).await?;

    log::info!("NextGCore QoSProvD stopped");
    Ok(())
}

/// Connect, provision every subscriber, disconnect
async fn run(
    config: &QosprovConfig,
    subscribers: &[Imsi],
    builder: &mut CcrBuilder<ThreadRandom>,
    shutdown: &AtomicBool,
) -> Result<()> {
    let addr = config.diameter.pcrf.resolve()?;
    let dict = Arc::new(config.dictionary());

    log::info!("Connecting to PCRF at {addr}");
    let mut client = DiameterClient::connect(addr, &config.diameter_config(), dict)
        .await
        .map_err(ProvisionError::Connection)
        .with_context(|| format!("PCRF at {addr} unreachable"))?;

    let report = provision_all(
        &mut client,
        builder,
        &config.profile,
        subscribers,
        config.application.success_result_code,
        shutdown,
        |outcome| println!("{outcome}"),
    )
    .await;

    if let Err(e) = client.close().await {
        log::warn!("Error closing Diameter connection: {e}");
    }

    log::info!(
        "Provisioning finished: {} succeeded, {} failed{}",
        report.succeeded(),
        report.failed(),
        if report.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}

/// Load the configuration file and apply command line overrides
fn load_config(args: &Args) -> Result<QosprovConfig> {
    let mut config = if Path::new(&args.config).exists() {
        QosprovConfig::load(&args.config)?
    } else {
        log::warn!(
            "Configuration file not found: {}. Using defaults.",
            args.config
        );
        QosprovConfig::default()
    };

    if let Some(pcrf) = &args.pcrf {
        let (address, port) = parse_host_port(pcrf)?;
        config.diameter.pcrf.address = address;
        if let Some(port) = port {
            config.diameter.pcrf.port = port;
        }
    }

    if !args.imsi.is_empty() {
        config.subscribers = args.imsi.clone();
    }

    Ok(config)
}

/// Split `host[:port]`, accepting bracketed IPv6 literals
fn parse_host_port(value: &str) -> Result<(String, Option<u16>)> {
    let (host, port) = match value.strip_prefix('[') {
        Some(rest) => {
            let (host, tail) = rest
                .split_once(']')
                .with_context(|| format!("Unterminated IPv6 literal in '{value}'"))?;
            (host, tail.strip_prefix(':'))
        }
        None => match value.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => (host, Some(port)),
            _ => (value, None),
        },
    };

    let port = port
        .map(|p| p.parse::<u16>())
        .transpose()
        .with_context(|| format!("Invalid port in '{value}'"))?;
    Ok((host.to_string(), port))
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> Result<()> {
    let mut builder = env_logger::Builder::new();

    // Set log level
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        _ => log::LevelFilter::Info,
    };
    builder.filter_level(level);

    // Configure format
    builder.format_timestamp_millis();

    if args.no_color {
        builder.write_style(env_logger::WriteStyle::Never);
    }

    builder.init();

    Ok(())
}

/// Set up signal handlers for graceful shutdown
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        shutdown.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    Ok(())
}
