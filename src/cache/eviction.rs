use serde::Serialize;

use super::{CacheEntry, CacheStore, STALE_TEMP_AGE};

/// Once over budget, evict down to this fraction of it
pub const EVICTION_TARGET_RATIO: f64 = 0.8;

/// What a sweep did
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepReport {
    pub evicted: Vec<CacheEntry>,
    pub freed_bytes: u64,
    pub remaining_bytes: u64,
}

/// Evict oldest-modified entries until the cache is at or below
/// `EVICTION_TARGET_RATIO * max_bytes`. Does nothing while under `max_bytes`.
///
/// Orphaned sidecars and stale temp files are removed first, since no entry
/// would ever account for them. An entry that cannot be removed is logged and
/// skipped.
pub fn sweep(store: &CacheStore, max_bytes: u64) -> SweepReport {
    let orphaned = store.remove_orphans(STALE_TEMP_AGE);
    let total = store.stats().total_bytes;
    if total <= max_bytes {
        return SweepReport {
            freed_bytes: orphaned,
            remaining_bytes: total,
            ..Default::default()
        };
    }

    let target = (max_bytes as f64 * EVICTION_TARGET_RATIO) as u64;
    tracing::info!(
        "Cache size {} exceeds limit {}, evicting down to {}",
        total,
        max_bytes,
        target
    );

    let mut entries = store.list_entries();
    entries.sort_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then(a.created_at.cmp(&b.created_at))
    });

    let mut report = SweepReport {
        freed_bytes: orphaned,
        remaining_bytes: total,
        ..Default::default()
    };

    for entry in entries {
        if report.remaining_bytes <= target {
            break;
        }

        let (freed, result) = store.remove_entry(&entry);
        report.freed_bytes += freed;
        report.remaining_bytes = report.remaining_bytes.saturating_sub(freed);

        match result {
            Ok(()) => {
                tracing::debug!("Evicted {} {} ({} bytes)", entry.kind.as_str(), entry.key, freed);
                report.evicted.push(entry);
            }
            Err(e) => {
                tracing::warn!("Could not evict {}: {}", entry.key, e);
            }
        }
    }

    tracing::info!(
        "Evicted {} entries, freed {} bytes",
        report.evicted.len(),
        report.freed_bytes
    );
    report
}
