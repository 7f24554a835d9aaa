/// Replays a capture through the book simulator
///
/// Usage:
///   feed_replay <config.toml>
///   feed_replay <capture.pcap> <protocol>:<port>[/tcp] ...
///
/// `RUST_LOG` overrides the configured log level.

use anyhow::{anyhow, bail, Context, Result};
use feed_sim::config::EndpointConfig;
use feed_sim::{PacketProcessor, PcapFile, ReusingProcessor, SimConfig, Simulator};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    Ok(())
}

/// `moldudp64:18000` or `soupbintcp:18001/tcp`
fn parse_endpoint(arg: &str) -> Result<EndpointConfig> {
    let (protocol, port) = arg
        .split_once(':')
        .ok_or_else(|| anyhow!("endpoint '{}' is not <protocol>:<port>", arg))?;
    let (port, transport) = port.split_once('/').unwrap_or((port, "udp"));
    let endpoint = EndpointConfig {
        port: port.parse().with_context(|| format!("bad port in '{}'", arg))?,
        transport: transport.to_string(),
        protocol: protocol.to_string(),
    };
    endpoint.rule()?;
    Ok(endpoint)
}

fn load_config(args: &[String]) -> Result<SimConfig> {
    let Some(first) = args.first() else {
        bail!("usage: feed_replay <config.toml> | <capture.pcap> <protocol>:<port>[/tcp] ...");
    };
    if Path::new(first).extension().is_some_and(|e| e == "toml") {
        return SimConfig::load(first).with_context(|| format!("loading {}", first));
    }
    let mut config = SimConfig::default();
    config.capture.path = Some(first.into());
    config.endpoints = args[1..].iter().map(|a| parse_endpoint(a)).collect::<Result<_>>()?;
    Ok(config)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(&args)?;
    init_logging(&config.log_level)?;

    let capture_path = config
        .capture
        .path
        .clone()
        .ok_or_else(|| anyhow!("no capture path configured"))?;
    let mut source = PcapFile::open(&capture_path)?;

    let mut processor = ReusingProcessor::default();
    processor.limit(config.capture.limit);
    for rule in config.endpoint_rules()? {
        info!(port = rule.port, transport = ?rule.transport, layer = ?rule.layer, "endpoint");
        processor.add_endpoint(rule);
    }

    let mut sim = Simulator::with_limits(config.subscription()?, config.book.max_orders, config.book.max_levels);
    let summary = processor
        .run(&mut source, &mut sim)
        .with_context(|| format!("replaying {}", capture_path.display()))?;

    processor.stats().log_summary();
    let sim_stats = sim.stats();
    let db = sim.order_db().stats();
    info!(
        messages = sim_stats.messages,
        operations = sim_stats.operations,
        not_found = sim_stats.not_found,
        book_updates = sim_stats.book_updates,
        orders = db.count,
        peak_orders = db.peak_count,
        options = sim.book().option_count(),
        "simulation"
    );
    if let Some(s) = sim.apply_latencies().stats() {
        info!(p50_ns = s.p50_ns, p99_ns = s.p99_ns, max_ns = s.max_ns, "apply latency");
    }
    info!(
        sessions = summary.sessions,
        gaps = summary.gaps,
        missing = summary.missing,
        duplicates = summary.duplicates,
        skipped = summary.skipped,
        decode_failures = summary.decode_failures,
        unsequenced = summary.unsequenced,
        buffered = summary.buffered,
        "sessions"
    );
    Ok(())
}
