//! Channel Sniffer - adaptive 802.11 channel hopping capture
//!
//! Puts a wireless interface into monitor mode, sweeps channels 1-12 and
//! tallies the MAC addresses seen on each. Channels that carry more traffic
//! get proportionally longer dwell on the next sweep.

mod capture;
mod clock;
mod config;
mod error;
mod frame;
mod mac_aggregator;
mod radio;
mod report;
mod scheduler;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use capture::{FrameSource, TcpdumpSource};
use clock::MonotonicClock;
use config::{Backend, Config};
use radio::IwconfigRadio;
use report::CaptureReport;
use scheduler::SchedulerParams;
use session::{CaptureOrchestrator, CaptureSession, SessionOutcome};

#[derive(Parser)]
#[command(name = "channel-sniffer")]
#[command(version, about = "Adaptive channel-hopping 802.11 MAC sniffer")]
struct Cli {
    /// Wireless interface to sniff on (overrides SNIFFER_INTERFACE)
    interface: Option<String>,

    /// -v lists every MAC per channel in the report, -vv adds debug logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Frame source (overrides SNIFFER_BACKEND)
    #[arg(long, value_enum)]
    backend: Option<Backend>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging (stderr; the report owns stdout)
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    info!("===========================================");
    info!("   Channel Sniffer");
    info!("   adaptive 802.11 channel hopping");
    info!("===========================================");

    // Load configuration; command line wins over environment
    let mut config = Config::from_env();
    if let Some(interface) = cli.interface {
        config.interface = Some(interface);
    }
    if let Some(backend) = cli.backend {
        config.backend = backend;
    }

    let interface = config
        .interface
        .clone()
        .context("no interface given (pass one or set SNIFFER_INTERFACE)")?;

    info!("Configuration:");
    info!("  Interface: {}", interface);
    info!("  Backend: {:?}", config.backend);
    info!("  iwconfig: {}", config.iwconfig_path.display());
    info!("  Snapshot length: {}", config.snaplen);

    let radio = IwconfigRadio::new(config.iwconfig_path.clone(), config.ifconfig_path.clone());

    let result = match config.backend {
        Backend::Tcpdump => {
            info!("  tcpdump: {}", config.tcpdump_path.display());
            run_capture(&interface, radio, |iface| {
                TcpdumpSource::open_live(&config.tcpdump_path, iface, config.snaplen)
            })
        }
        Backend::Pcap => capture_pcap(&interface, radio, config.snaplen),
    };

    let (session, outcome) = match result {
        Ok(r) => r,
        Err(e) => {
            error!("{}. Quitting.", e);
            return Err(e.into());
        }
    };

    info!("[Aggregator] {}", session.aggregator.stats_summary());

    let report = CaptureReport::build(&session, outcome);
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text(cli.verbose > 0));
    }

    Ok(())
}

/// Initialize and run a full capture session on `interface`
fn run_capture<S, F>(
    interface: &str,
    radio: IwconfigRadio,
    open_source: F,
) -> error::Result<(CaptureSession, SessionOutcome)>
where
    S: FrameSource,
    F: FnOnce(&str) -> error::Result<S>,
{
    let orchestrator = CaptureOrchestrator::initialize(
        interface,
        radio,
        open_source,
        MonotonicClock::new(),
        SchedulerParams::default(),
    )?;

    info!("===========================================");
    info!("  Starting capture...");
    info!("===========================================");

    orchestrator.run()
}

#[cfg(feature = "pcap")]
fn capture_pcap(
    interface: &str,
    radio: IwconfigRadio,
    snaplen: u32,
) -> error::Result<(CaptureSession, SessionOutcome)> {
    run_capture(interface, radio, |iface| capture::PcapSource::open_live(iface, snaplen))
}

#[cfg(not(feature = "pcap"))]
fn capture_pcap(
    interface: &str,
    _radio: IwconfigRadio,
    _snaplen: u32,
) -> error::Result<(CaptureSession, SessionOutcome)> {
    Err(error::SnifferError::OpenCapture {
        interface: interface.to_string(),
        reason: "built without the `pcap` feature".to_string(),
    })
}
