//! `mfetch fetch` – fetch one file from every configured source.

use anyhow::{Context, Result};
use mfetch_core::config::FetchConfig;
use mfetch_core::fetch_head;
use mfetch_core::manager::Manager;
use mfetch_core::scheduler::{FetchOutcome, FetchReport, ProgressStats, Scheduler};
use mfetch_core::source::SourceSnapshot;
use mfetch_core::transport::CurlTransport;
use std::sync::Arc;
use std::time::Instant;

const PROGRESS_INTERVAL_MS: u128 = 500;
const MIB: f64 = 1_048_576.0;

pub async fn run_fetch(cfg: FetchConfig, path: &str, size: Option<u64>) -> Result<()> {
    let manager = Arc::new(Manager::new(&cfg).context("invalid configuration")?);

    let total_size = match size {
        Some(n) => n,
        None => {
            let sources = cfg.sources.clone();
            let p = path.to_string();
            let found = tokio::task::spawn_blocking(move || fetch_head::discover_size(&sources, &p))
                .await
                .context("size probe join")??;
            tracing::info!(source = %found.source, size = found.size, "using discovered size");
            found.size
        }
    };

    let scheduler = Scheduler::new(
        Arc::clone(&manager),
        Arc::new(CurlTransport::default()),
        path,
        total_size,
    );
    println!(
        "Fetching {} ({:.1} MiB, {} chunks, {} workers, {} sources)",
        path,
        total_size as f64 / MIB,
        scheduler.task_count(),
        manager.worker_count(),
        cfg.sources.len()
    );

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressStats>(16);
    let progress_handle = tokio::spawn(async move {
        let mut last_print = Instant::now();
        while let Some(stats) = progress_rx.recv().await {
            let now = Instant::now();
            if now.duration_since(last_print).as_millis() >= PROGRESS_INTERVAL_MS
                || stats.chunks_done == stats.chunk_count
            {
                let eta = stats
                    .eta_secs()
                    .map(|s| format!("{:.0}s", s))
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "  {:.1} / {:.1} MiB ({:.1}%)  {}/{} chunks  {:.2} MiB/s  ETA {}",
                    stats.bytes_done as f64 / MIB,
                    stats.total_bytes as f64 / MIB,
                    stats.fraction() * 100.0,
                    stats.chunks_done,
                    stats.chunk_count,
                    stats.bytes_per_sec() / MIB,
                    eta
                );
                last_print = now;
            }
        }
    });

    let report = tokio::task::spawn_blocking(move || scheduler.fetch(Some(&progress_tx)))
        .await
        .context("fetch task join")??;
    progress_handle.await.context("progress printer join")?;

    print_summary(&report, &manager.snapshot());

    match report.outcome {
        FetchOutcome::Succeeded => Ok(()),
        FetchOutcome::Failed if report.tasks_dropped > 0 => anyhow::bail!(
            "fetch failed after {}/{} chunks ({} dropped after source errors)",
            report.tasks_completed,
            report.tasks_total,
            report.tasks_dropped
        ),
        FetchOutcome::Failed => anyhow::bail!(
            "all sources failed after {}/{} chunks",
            report.tasks_completed,
            report.tasks_total
        ),
    }
}

fn print_summary(report: &FetchReport, sources: &[SourceSnapshot]) {
    let secs = report.elapsed.as_secs_f64();
    let rate = if secs > 0.0 { report.bytes as f64 / secs } else { 0.0 };
    println!(
        "Fetch {}: {}/{} chunks, {:.1} MiB in {:.1}s ({:.2} MiB/s)",
        report.outcome,
        report.tasks_completed,
        report.tasks_total,
        report.bytes as f64 / MIB,
        secs,
        rate / MIB
    );
    println!(
        "{:<12} {:<8} {:>10} {:>10} {:>8} {:>6}",
        "SOURCE", "STATUS", "MIB", "MIB/S", "ATTEMPTS", "ERRORS"
    );
    for s in sources {
        println!(
            "{:<12} {:<8} {:>10.1} {:>10.2} {:>8} {:>6}",
            s.id,
            s.status.to_string(),
            s.downloaded as f64 / MIB,
            s.speed / MIB,
            s.attempts,
            s.consecutive_errors
        );
    }
}
