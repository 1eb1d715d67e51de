//! `mfetch sources` – list configured sources.

use mfetch_core::config::FetchConfig;

pub fn run_sources(cfg: &FetchConfig) {
    if cfg.sources.is_empty() {
        println!("No sources configured.");
        return;
    }
    println!(
        "{:<12} {:<5} {:>12} {:>12} {:>6} {:>12}  {}",
        "ID", "CDN", "INITIAL", "LIMIT", "BOOST", "SLOW", "HOST"
    );
    for s in &cfg.sources {
        let limit = if s.speed_limit == 0 {
            "-".to_string()
        } else {
            s.speed_limit.to_string()
        };
        println!(
            "{:<12} {:<5} {:>12.0} {:>12} {:>6.2} {:>12.0}  {}",
            s.id,
            if s.is_cdn { "yes" } else { "no" },
            s.initial_speed,
            limit,
            s.boost,
            s.slow_threshold,
            s.host
        );
    }
}
