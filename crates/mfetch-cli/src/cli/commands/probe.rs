//! `mfetch probe` – HEAD the path on every source.

use anyhow::{Context, Result};
use mfetch_core::config::FetchConfig;
use mfetch_core::fetch_head;
use mfetch_core::transport::join_url;

pub async fn run_probe(cfg: &FetchConfig, path: &str) -> Result<()> {
    if cfg.sources.is_empty() {
        anyhow::bail!("no sources configured");
    }
    println!("{:<12} {:>14} {:<7} {}", "ID", "SIZE", "RANGES", "RESULT");
    for source in &cfg.sources {
        let url = join_url(&source.host, path);
        let head = tokio::task::spawn_blocking(move || fetch_head::probe(&url))
            .await
            .context("probe task join")?;
        match head {
            Ok(h) => println!(
                "{:<12} {:>14} {:<7} ok",
                source.id,
                h.content_length
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                if h.accept_ranges { "bytes" } else { "none" },
            ),
            Err(e) => println!("{:<12} {:>14} {:<7} {:#}", source.id, "-", "-", e),
        }
    }
    Ok(())
}
