//! CLI entry point for reconmap.

use std::io::{self, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{fmt, EnvFilter};

use reconmap_client::ScanClient;
use reconmap_core::events::{EventPayload, ReconEvent};
use reconmap_core::{ReconConfig, ReconError, ScanMode, ScanRequest};
use reconmap_journal::{FileJournalStore, JournalQuery, JournalStore};
use reconmap_topology::{describe_node, render_text, LayoutKind, RenderFrame, TextSurface};

use reconmap_scan::view::unreachable_banner;
use reconmap_scan::{ScanPhase, ScanView};

#[derive(Parser)]
#[command(name = "reconmap")]
#[command(about = "Submit network scans and view the discovered topology")]
struct Cli {
    /// Config file prefix (default: reconmap).
    #[arg(short, long, default_value = "reconmap", global = true)]
    config: String,

    /// Override the scan backend base URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a scan, wait for it to finish, and print the topology.
    Scan(ScanArgs),

    /// Show the backend's status for a scan.
    Status {
        scan_id: String,
    },

    /// Probe the scan backend once.
    Health,

    /// List recent scans.
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        skip: u32,

        /// Read the local journal instead of the backend.
        #[arg(long)]
        local: bool,

        /// Only scans of this target.
        #[arg(long)]
        target: Option<String>,
    },
}

#[derive(clap::Args)]
struct ScanArgs {
    /// IP, CIDR range or hostname.
    target: String,

    /// Scan mode: quick, full, custom.
    #[arg(short, long, default_value = "quick")]
    mode: ScanMode,

    /// Port list for custom scans, e.g. 22,80,8000-8100.
    #[arg(short, long)]
    ports: Option<String>,

    /// Raw nmap arguments for custom scans.
    #[arg(short, long, allow_hyphen_values = true)]
    arguments: Option<String>,

    /// Show details for the node with this IP once the scan completes.
    #[arg(long)]
    select: Option<String>,

    /// Topology layout: grid, circle.
    #[arg(long, default_value = "grid")]
    layout: LayoutKind,

    /// Print every topology frame to stderr as it changes.
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = ReconConfig::load(&cli.config)?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }

    match cli.command {
        Command::Scan(args) => run_scan(&config, args).await,
        Command::Status { scan_id } => {
            let client = ScanClient::from_config(&config, None)?;
            let snapshot = client.fetch_status(&scan_id).await.map_err(report)?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        Command::Health => {
            let client = ScanClient::from_config(&config, None)?;
            let url = client.health().url().to_string();
            if client.health().probe().await {
                println!("{url}: reachable");
                Ok(())
            } else {
                anyhow::bail!("{url}: unreachable")
            }
        }
        Command::History {
            limit,
            skip,
            local,
            target,
        } => {
            if local {
                print_local_history(&config, limit, target)
            } else {
                print_backend_history(&config, limit, skip, target).await
            }
        }
    }
}

async fn run_scan(config: &ReconConfig, args: ScanArgs) -> anyhow::Result<()> {
    let mut request = ScanRequest::new(args.target, args.mode);
    if let Some(ports) = args.ports {
        request = request.with_ports(ports);
    }
    if let Some(arguments) = args.arguments {
        request = request.with_arguments(arguments);
    }

    let out: Box<dyn Write + Send> = if args.watch {
        Box::new(io::stderr())
    } else {
        Box::new(io::sink())
    };
    let (selected_tx, mut selected_rx) = mpsc::unbounded_channel();
    let view = ScanView::mount(
        config,
        TextSurface::new(out),
        args.layout,
        Box::new(move |node| {
            let _ = selected_tx.send(node);
        }),
    )?;
    let mut events = view.subscribe_events();

    let scan_id = match view.submit(request).await {
        Ok(scan_id) => scan_id,
        Err(e) => {
            view.unmount().await;
            return Err(report(e));
        }
    };
    eprintln!("Scan {scan_id} submitted, waiting for results");

    let phase = loop {
        tokio::select! {
            phase = view.controller().wait_for_terminal() => break phase,
            Ok(event) = events.recv() => print_event(&event),
            _ = tokio::signal::ctrl_c() => {
                view.controller().discard();
                break ScanPhase::Idle;
            }
        }
    };

    let job = view.controller().job();
    match phase {
        ScanPhase::Completed => {
            if let Some(job) = &job {
                println!(
                    "Scan {scan_id} completed: {} host(s), {} finding(s) in {:.1}s",
                    job.hosts,
                    job.findings,
                    job.elapsed_ms() as f64 / 1000.0
                );
            }

            let mut details = None;
            if let Some(ip) = &args.select {
                if view.select_ip(ip) {
                    details = tokio::time::timeout(Duration::from_secs(2), selected_rx.recv())
                        .await
                        .ok()
                        .flatten()
                        .flatten();
                } else {
                    eprintln!("No node with IP {ip} in the topology");
                }
            }

            let frame = RenderFrame::build(&view.store().snapshot(), args.layout);
            print!("{}", render_text(&frame));
            if let Some(node) = details {
                print!("\n{}", describe_node(&node));
            }

            view.unmount().await;
            Ok(())
        }
        ScanPhase::Failed => {
            view.unmount().await;
            let error = job
                .and_then(|j| j.error)
                .unwrap_or_else(|| ReconError::job_failure("scan failed"));
            Err(report(error))
        }
        _ => {
            view.unmount().await;
            anyhow::bail!("Scan {scan_id} cancelled")
        }
    }
}

fn print_event(event: &ReconEvent) {
    match &event.payload {
        EventPayload::ScanProgress {
            status, elapsed_ms, ..
        } => eprintln!("  {status:?} after {:.1}s", *elapsed_ms as f64 / 1000.0),
        EventPayload::BackendUnreachable { url } => eprintln!("! {}", unreachable_banner(url)),
        EventPayload::BackendRestored { url } => eprintln!("  scan server at {url} is back"),
        _ => {}
    }
}

/// Attach the friendly hint, when there is one, to a user-facing error.
fn report(error: ReconError) -> anyhow::Error {
    match error.hint() {
        Some(hint) => anyhow::anyhow!("{error}\nhint: {hint}"),
        None => anyhow::Error::new(error),
    }
}

fn print_local_history(
    config: &ReconConfig,
    limit: u32,
    target: Option<String>,
) -> anyhow::Result<()> {
    let dir = config
        .journal_dir
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("journal_dir is not configured"))?;
    let journal = FileJournalStore::new(dir)?;

    let entries = journal.list(&JournalQuery {
        target,
        outcome: None,
        limit: Some(limit as usize),
    })?;

    if entries.is_empty() {
        println!("No journaled scans");
    }
    for entry in entries {
        println!(
            "{}  {:<9} {:<6} {:<20} hosts={} findings={} {}",
            entry.finished_at.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", entry.outcome).to_lowercase(),
            entry.mode.as_str(),
            entry.target,
            entry.hosts,
            entry.findings,
            entry.error.as_deref().or(entry.scan_id.as_deref()).unwrap_or("-"),
        );
    }
    Ok(())
}

async fn print_backend_history(
    config: &ReconConfig,
    limit: u32,
    skip: u32,
    target: Option<String>,
) -> anyhow::Result<()> {
    let client = ScanClient::from_config(config, None)?;
    let page = client.history(limit, skip).await.map_err(report)?;

    let rows: Vec<_> = page
        .scans
        .iter()
        .filter(|s| target.as_deref().map_or(true, |t| s.target == t))
        .collect();

    println!("{} of {} scan(s)", rows.len(), page.count);
    for scan in rows {
        let duration = scan
            .duration
            .map(|d| format!("{d:.1}s"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<9} {:<6} {:<20} {}",
            scan.scan_id,
            format!("{:?}", scan.status).to_lowercase(),
            scan.mode.as_str(),
            scan.target,
            duration
        );
    }
    Ok(())
}
