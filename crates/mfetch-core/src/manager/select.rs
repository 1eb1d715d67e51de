//! Source selection over a locked pool.

use std::time::Instant;

use crate::source::{Source, SourceStatus, UncertaintyBoost};

/// CDN sources are a last resort: eligible only when every direct source
/// that has not failed is below its slow threshold (vacuously true when none
/// remain).
pub(super) fn cdn_enabled(sources: &[Source]) -> bool {
    sources
        .iter()
        .filter(|s| !s.is_cdn() && s.status() != SourceStatus::Failed)
        .all(Source::is_slow)
}

/// Index of the eligible source with the strictly highest score; the first
/// one seen wins ties.
pub(super) fn pick_best(
    sources: &[Source],
    boost: &UncertaintyBoost,
    now: Instant,
) -> Option<usize> {
    let allow_cdn = cdn_enabled(sources);
    let mut best: Option<(usize, f64)> = None;
    for (index, source) in sources.iter().enumerate() {
        if source.is_cdn() && !allow_cdn {
            continue;
        }
        if !source.status().is_selectable() || source.in_cooldown(boost, now) {
            continue;
        }
        let score = source.score(boost, now);
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((index, score)),
        }
    }
    best.map(|(index, _)| index)
}
