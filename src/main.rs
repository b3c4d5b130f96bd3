use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pool_census_dash::controller::StartOutcome;
use pool_census_dash::dashboard::{Dashboard, DashboardConfig};
use pool_census_dash::render;
use pool_census_dash::replay::ReplayBackend;
use pool_census_dash::server;
use pool_census_dash::store::ViewStore;
use pool_census_dash::types::{DashboardView, HostEntry};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// pool-census-dash: dashboard state layer for long-running pool scans, with a tiny embedded web UI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pool-census-dash",
    version,
    about = "Dashboard state layer for long-running pool scans, with a tiny embedded web UI.",
    long_about = None
)]
struct Cli {
    /// Report file replayed by the built-in backend (bare view or versioned cache envelope).
    #[arg(long, default_value = "last_report.json")]
    report: PathBuf,

    /// Concurrency passed to each scan start.
    #[arg(long, default_value_t = 3)]
    concurrency: u32,

    /// Give up waiting for the backend runtime after this many milliseconds.
    #[arg(long = "ready-timeout-ms", default_value_t = 10_000)]
    ready_timeout_ms: u64,

    /// Interval between backend readiness checks in milliseconds.
    #[arg(long = "poll-interval-ms", default_value_t = 50)]
    poll_interval_ms: u64,

    /// Simulated per-pool scan time for the replay backend in milliseconds.
    #[arg(long = "step-delay-ms", default_value_t = 150)]
    step_delay_ms: u64,

    /// Write the committed view as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the embedded HTTP UI instead of running a single headless scan.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address for the HTTP UI.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    println!("pool-census-dash configuration:");
    println!("  report        : {}", cli.report.display());
    println!("  concurrency   : {}", cli.concurrency);
    println!("  ready_timeout : {}ms", cli.ready_timeout_ms);
    println!("  poll_interval : {}ms", cli.poll_interval_ms);
    println!("  step_delay    : {}ms", cli.step_delay_ms);
    println!(
        "  output        : {}",
        cli.output
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("  serve_ui      : {}", cli.serve_ui);

    let (tx, rx) = mpsc::unbounded_channel();
    let backend = Arc::new(ReplayBackend::open(
        &cli.report,
        tx,
        Duration::from_millis(cli.step_delay_ms),
    ));

    let config = DashboardConfig {
        concurrency: cli.concurrency,
        ready_timeout: Duration::from_millis(cli.ready_timeout_ms),
        poll_interval: Duration::from_millis(cli.poll_interval_ms),
    };
    let store = ViewStore::new().with_render_hook(|snapshot| {
        let rendered = render::render_dashboard(snapshot);
        debug!(generation = rendered.generation, summary = %rendered.summary, "render pass");
    });
    let dashboard = Arc::new(Dashboard::new(backend, || true, store, config));

    let cancel = CancellationToken::new();
    if let Err(e) = dashboard.boot(rx, cancel.clone()).await {
        error!(error = %e, "dashboard boot failed");
        println!("{}", dashboard.status().status_text);
    }

    if cli.serve_ui {
        let bind = cli.bind.clone();
        let server_dash = dashboard.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, server_dash).await {
                error!(error = %e, "HTTP UI server error");
            }
        });
        println!("UI server starting at http://{} (Ctrl+C to stop)", cli.bind);
        let _ = tokio::signal::ctrl_c().await;
    } else {
        run_headless(&dashboard).await?;
        let snapshot = dashboard.snapshot();
        match snapshot.view.as_deref() {
            Some(view) => {
                print_results_table(view);
                if let Some(path) = cli.output.as_deref() {
                    if let Err(e) = write_view_json(path, view) {
                        eprintln!("Failed to write JSON to {}: {}", path.display(), e);
                    } else {
                        println!("Wrote JSON view to {}", path.display());
                    }
                }
            }
            None => println!("{}", snapshot.summary()),
        }
    }

    cancel.cancel();
    dashboard.shutdown().await;
    Ok(())
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Start one scan and wait until its outcome has been applied (or Ctrl+C).
async fn run_headless(dashboard: &Dashboard<ReplayBackend>) -> Result<()> {
    let generation = match dashboard.start_scan().await {
        Some(StartOutcome::Pending(g)) | Some(StartOutcome::Completed(g)) => g,
        Some(StartOutcome::Failed(_)) | Some(StartOutcome::Ignored { .. }) | None => {
            warn!(status = %dashboard.status().status_text, "scan did not start");
            return Ok(());
        }
    };

    let mut status = dashboard.controller().subscribe();
    tokio::select! {
        res = status.wait_for(|s| s.settled >= generation) => {
            res.context("scan status channel closed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, abandoning scan");
        }
    }
    let final_status = dashboard.status();
    println!("\n{}", final_status.status_text);
    println!("{}", final_status.progress_label);
    Ok(())
}

const POOL_COLUMN_MAX: usize = 40;

/// Pool name as shown in the table, cut to `POOL_COLUMN_MAX` characters.
fn pool_cell(name: &str) -> String {
    name.chars().take(POOL_COLUMN_MAX).collect()
}

fn print_results_table(view: &DashboardView) {
    let rows: Vec<(&str, &HostEntry)> = view
        .clean_entries
        .iter()
        .map(|e| ("clean", e))
        .chain(view.issue_entries.iter().map(|e| ("issue", e)))
        .collect();

    let mut pool_w = "pool".len();
    let mut host_w = "endpoint".len();
    for (_, e) in &rows {
        pool_w = pool_w.max(pool_cell(&e.pool_name).chars().count());
        host_w = host_w.max(render::host_label(e).chars().count());
    }
    let list_w = "list".len().max("clean".len());
    let ping_w = 10usize;

    println!("\n{}", render::summary_text(view.total_clean(), view.total_issues()));
    println!(
        "{:<list_w$}  {:<pool_w$}  {:<host_w$}  {:>ping_w$}",
        "list",
        "pool",
        "endpoint",
        "ping",
        list_w = list_w,
        pool_w = pool_w,
        host_w = host_w,
        ping_w = ping_w
    );
    println!(
        "{:-<list_w$}  {:-<pool_w$}  {:-<host_w$}  {:-<ping_w$}",
        "",
        "",
        "",
        "",
        list_w = list_w,
        pool_w = pool_w,
        host_w = host_w,
        ping_w = ping_w
    );
    for (list, e) in rows {
        let pool = pool_cell(&e.pool_name);
        println!(
            "{:<list_w$}  {:<pool_w$}  {:<host_w$}  {:>ping_w$}",
            list,
            pool,
            render::host_label(e),
            render::ping_text(e.latest()),
            list_w = list_w,
            pool_w = pool_w,
            host_w = host_w,
            ping_w = ping_w
        );
    }
}

fn write_view_json(path: &std::path::Path, view: &DashboardView) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, view)?;
    Ok(())
}
