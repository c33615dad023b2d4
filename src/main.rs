use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use netrecon::config::{ScanConfig, DEFAULT_CONCURRENCY, DEFAULT_TIMEOUT_MS};
use netrecon::types::ScanResult;
use netrecon::{ports, report, scanner, server, targets};

/// netrecon: concurrent TCP port scanner with banner and TLS fingerprinting.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netrecon",
    version,
    about = "Concurrent TCP port scanner with banner capture and TLS fingerprinting.",
    long_about = None
)]
struct Cli {
    /// CIDR (192.168.1.0/24), range (10.0.0.1-10.0.0.20) or single address.
    /// Repeatable. If omitted, local IPv4 /24 networks are used.
    #[arg(long = "target", short = 't')]
    targets: Vec<String>,

    /// Port spec, e.g. "1-1024" or "22,80,443,8000-8010".
    #[arg(long, short = 'p', default_value = "1-1024", env = "NETRECON_PORTS")]
    ports: String,

    /// File with one port spec per line (`#` comments). Overrides --ports.
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,

    /// Worker count, i.e. max concurrent probes.
    #[arg(long, short = 'c', default_value_t = DEFAULT_CONCURRENCY, env = "NETRECON_CONCURRENCY")]
    concurrency: usize,

    /// Connect, read and TLS handshake timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = DEFAULT_TIMEOUT_MS, env = "NETRECON_TIMEOUT_MS")]
    timeout_ms: u64,

    /// Write the report as indented JSON to this path.
    #[arg(long)]
    json: Option<PathBuf>,

    /// Write the report as an HTML page to this path.
    #[arg(long)]
    html: Option<PathBuf>,

    /// Start the control API on this address (e.g. 127.0.0.1:8080).
    #[arg(long)]
    serve: Option<String>,

    /// More logging (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(bind) = cli.serve.clone() {
        println!("Control API starting at http://{bind}");
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind).await {
                warn!(error = %e, "control API stopped");
            }
        });
        if cli.targets.is_empty() {
            println!("Press Ctrl+C to stop the server...");
            let _ = tokio::signal::ctrl_c().await;
            return Ok(());
        }
    }

    let specs = if cli.targets.is_empty() {
        local_target_specs()?
    } else {
        cli.targets.clone()
    };
    let addrs = targets::parse_targets(&specs).context("invalid target")?;
    let port_set = match &cli.ports_file {
        Some(path) => ports::load_ports_from_path(path)?,
        None => ports::parse_port_spec(&cli.ports).context("invalid ports")?,
    };
    let config = ScanConfig::new(cli.concurrency, cli.timeout_ms).validate()?;

    println!("netrecon configuration:");
    println!("  targets      : {} ({} hosts)", specs.join(", "), addrs.len());
    println!("  ports        : {} ports", port_set.len());
    println!("  concurrency  : {}", config.concurrency);
    println!("  timeout_ms   : {}", config.timeout_ms);

    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_ctrlc.cancel();
        }
    });

    let results = scanner::scan_targets_with_cancel(
        &addrs,
        &port_set,
        config,
        cancel,
        scanner::SharedProgress::new(),
    )
    .await?;
    print_results_table(&results);

    if let Some(path) = cli.json.as_deref() {
        report::write_json(path, &results)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON report to {}", path.display());
    }
    if let Some(path) = cli.html.as_deref() {
        report::write_html(path, &results)
            .with_context(|| format!("failed to write HTML to {}", path.display()))?;
        println!("Wrote HTML report to {}", path.display());
    }

    if cli.serve.is_some() {
        println!("Scan finished. Control API still running, press Ctrl+C to exit.");
        let _ = tokio::signal::ctrl_c().await;
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

fn local_target_specs() -> Result<Vec<String>> {
    let cidrs = targets::detect_local_cidrs().context("failed to detect local networks")?;
    if cidrs.is_empty() {
        anyhow::bail!("no --target given and no local IPv4 network detected");
    }
    for cidr in &cidrs {
        info!(%cidr, "using local network");
    }
    Ok(cidrs.iter().map(ToString::to_string).collect())
}

fn print_results_table(results: &ScanResult) {
    let open: Vec<_> = results
        .iter()
        .flat_map(|h| h.open_ports().map(move |p| (h.ip.as_str(), p)))
        .collect();

    let mut ip_w = "ip".len();
    let mut tls_w = "tls".len();
    for (ip, p) in &open {
        ip_w = ip_w.max(ip.len());
        tls_w = tls_w.max(p.tls_version.as_deref().map_or(0, str::len));
    }
    let port_w = 5usize;

    println!("\nOpen ports: {} (hosts: {})", open.len(), results.len());
    println!(
        "{:<ip_w$}  {:>port_w$}  {:<tls_w$}  banner",
        "ip", "port", "tls",
    );
    println!("{:-<ip_w$}  {:-<port_w$}  {:-<tls_w$}  {:-<6}", "", "", "", "");
    for (ip, p) in open {
        let mut bsnip = p.banner.clone().unwrap_or_default();
        if let Some((idx, _)) = bsnip.char_indices().nth(60) {
            bsnip.truncate(idx);
        }
        println!(
            "{:<ip_w$}  {:>port_w$}  {:<tls_w$}  {}",
            ip,
            p.port,
            p.tls_version.as_deref().unwrap_or(""),
            bsnip,
        );
    }
}
