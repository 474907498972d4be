mod snapshot;

use anyhow::{anyhow, bail};
use clap::Parser;
use pkg_cache::switchboard::{ApiCapabilities, EndpointSource};
use pkg_cache::{ClusterCache, ClusterLogs, DnsControlOpts, DnsController};
use pkg_constants::dns::{DEFAULT_TTL, DEFAULT_ZONE};
use pkg_constants::paths::{DEFAULT_DNS_CONFIG, DEFAULT_SNAPSHOT};
use pkg_constants::state::{SYNC_POLL_INTERVAL_MS, SYNC_TIMEOUT_SECS};
use pkg_network::dns::AddressSynthesizer;
use pkg_types::config::{DnsConfigFile, PodsMode, load_config_file};
use snapshot::ClusterSnapshot;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "k3rs-dns", about = "k3rs cluster DNS cache")]
struct Cli {
    /// Path to YAML config file
    #[arg(long, short, default_value = DEFAULT_DNS_CONFIG)]
    config: String,

    /// Path to YAML cluster snapshot to prime the cache from
    #[arg(long, default_value = DEFAULT_SNAPSHOT)]
    snapshot: String,

    /// Zone to synthesize records in (replaces the config file's zones)
    #[arg(long)]
    zone: Option<String>,

    /// Address this instance listens on (repeatable)
    #[arg(long = "local-ip")]
    local_ips: Vec<IpAddr>,

    /// Announce external addresses instead of cluster ones
    #[arg(long)]
    external: bool,

    /// Record TTL in seconds
    #[arg(long)]
    ttl: Option<u32>,

    /// Print cache metrics after the records
    #[arg(long)]
    metrics: bool,
}

fn parse_local_ips(raw: &[String]) -> anyhow::Result<Vec<IpAddr>> {
    raw.iter()
        .map(|ip| {
            ip.parse()
                .map_err(|e| anyhow!("invalid local-ips entry '{}': {}", ip, e))
        })
        .collect()
}

/// `--zone` replaces the configured zones; with neither, the default zone is used.
fn resolve_zones(cli_zone: Option<String>, file_zones: Vec<String>) -> Vec<String> {
    match cli_zone {
        Some(zone) => vec![zone],
        None if file_zones.is_empty() => vec![DEFAULT_ZONE.to_string()],
        None => file_zones,
    }
}

async fn wait_for_sync(controller: &DnsController) -> bool {
    let poll = async {
        while !controller.has_synced() {
            tokio::time::sleep(Duration::from_millis(SYNC_POLL_INTERVAL_MS)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(SYNC_TIMEOUT_SECS), poll)
        .await
        .is_ok()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    // Load config file (returns defaults if file not found)
    let file_cfg: DnsConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let zones = resolve_zones(cli.zone, file_cfg.zones);
    let local_ips = if cli.local_ips.is_empty() {
        parse_local_ips(&file_cfg.local_ips)?
    } else {
        cli.local_ips
    };
    if local_ips.is_empty() {
        bail!("no local addresses: pass --local-ip or set local-ips in {}", cli.config);
    }
    let external = cli.external || file_cfg.external;
    let ttl = cli.ttl.or(file_cfg.ttl).unwrap_or(DEFAULT_TTL);

    let snapshot: ClusterSnapshot = load_config_file(&cli.snapshot)?;
    let caps = ApiCapabilities::from(&snapshot.capabilities);
    let endpoint_source = EndpointSource::from_mode(file_cfg.endpoint_source, &caps);

    info!("Starting k3rs-dns");
    info!("  Zones:           {:?}", zones);
    info!("  Local IPs:       {:?}", local_ips);
    info!("  Endpoint source: {}", endpoint_source);
    info!("  Pods:            {:?}", file_cfg.pods);

    let logs = ClusterLogs::new();
    let seeded = snapshot.seed(&logs).await;
    info!("Seeded {} objects from {}", seeded, cli.snapshot);

    let opts = DnsControlOpts {
        init_pod_cache: file_cfg.pods == PodsMode::Verified,
        init_endpoints_cache: file_cfg.endpoints.unwrap_or(true),
        endpoint_source,
        label_selector: file_cfg.label_selector,
        namespace_label_selector: file_cfg.namespace_label_selector,
        zones,
        endpoint_name_mode: file_cfg.endpoint_name_mode,
    };

    let controller = Arc::new(DnsController::new(logs.sources(), opts));
    let task = controller.start();
    if !wait_for_sync(&controller).await {
        warn!("Cache not synced after {}s, answering from partial data", SYNC_TIMEOUT_SECS);
    }

    let synthesizer = AddressSynthesizer::new(local_ips, controller.opts().endpoint_name_mode);
    for zone in &controller.opts().zones {
        for record in synthesizer.ns_addrs(controller.as_ref(), zone, external) {
            match record.to_record(ttl) {
                Ok(rr) => println!(
                    "{} {} IN {} {}",
                    rr.name(),
                    rr.ttl(),
                    rr.record_type(),
                    record.address
                ),
                Err(e) => warn!("Skipping record {}: {}", record.name, e),
            }
        }
    }

    if cli.metrics {
        print!("{}", controller.metrics().render());
    }

    controller.stop()?;
    task.await?;
    Ok(())
}
