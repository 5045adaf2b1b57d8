//! Record filter/normalizer
//!
//! Drops unreachable OD pairs, skips malformed rows, and picks the narrowest
//! column widths for what survives. Nothing here is fatal: a bad row is
//! counted in [`FilterStats`] and the pass carries on.

use butterfly_common::Result;
use rustc_hash::FxHashSet;
use serde::Deserialize;

use crate::formats::od_container::{ColumnLayout, CompactRecord, IdWidth, TimeUnit, TimeWidth};
use crate::od_index::pack_key;

/// One row of the raw OD table as produced upstream.
/// `travel_time` is in seconds; `None` marks a missing value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawRecord {
    pub from_id: i64,
    pub to_id: i64,
    pub travel_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Unit the travel times are stored in
    pub unit: TimeUnit,
    /// Extra value meaning "unreachable" besides missing/NaN (e.g. -1 or 2147483647)
    pub sentinel: Option<f64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            unit: TimeUnit::Seconds,
            sentinel: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub read: u64,
    pub kept: u64,
    pub unreachable: u64,
    pub malformed: u64,
    pub duplicates: u64,
}

/// Filtered records plus the narrowest layout that holds them
#[derive(Debug, Clone)]
pub struct Normalized {
    pub records: Vec<CompactRecord>,
    pub layout: ColumnLayout,
    pub stats: FilterStats,
}

enum Verdict {
    Keep(CompactRecord),
    Unreachable,
    Malformed(&'static str),
}

fn classify(raw: &RawRecord, config: &FilterConfig) -> Verdict {
    // Bad ids are malformed whatever the travel time says
    let Ok(from_id) = u32::try_from(raw.from_id) else {
        return Verdict::Malformed("from_id out of range");
    };
    let Ok(to_id) = u32::try_from(raw.to_id) else {
        return Verdict::Malformed("to_id out of range");
    };
    let Some(seconds) = raw.travel_time else {
        return Verdict::Unreachable;
    };
    if seconds.is_nan() || config.sentinel == Some(seconds) {
        return Verdict::Unreachable;
    }
    if seconds == f64::INFINITY {
        return Verdict::Unreachable;
    }
    if seconds < 0.0 {
        return Verdict::Malformed("negative travel time");
    }
    match config.unit.from_seconds(seconds) {
        Some(travel_time) => Verdict::Keep(CompactRecord {
            from_id,
            to_id,
            travel_time,
        }),
        None => Verdict::Malformed("travel time overflows"),
    }
}

/// Filter and narrow a raw record stream.
///
/// `Err` items are rows the reader could not parse; they are counted as
/// malformed. Duplicate (from, to) pairs keep their first occurrence.
pub fn normalize<I>(rows: I, config: &FilterConfig) -> Normalized
where
    I: IntoIterator<Item = Result<RawRecord>>,
{
    let mut stats = FilterStats::default();
    let mut records = Vec::new();
    let mut seen = FxHashSet::default();
    let mut max_id = 0u32;
    let mut max_time = 0u32;

    for row in rows {
        stats.read += 1;
        let raw = match row {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(row = stats.read, error = %e, "skipping unparsable record");
                stats.malformed += 1;
                continue;
            }
        };

        match classify(&raw, config) {
            Verdict::Keep(record) => {
                if !seen.insert(pack_key(record.from_id, record.to_id)) {
                    tracing::debug!(
                        from = record.from_id,
                        to = record.to_id,
                        "skipping duplicate OD pair"
                    );
                    stats.duplicates += 1;
                    continue;
                }
                max_id = max_id.max(record.from_id).max(record.to_id);
                max_time = max_time.max(record.travel_time);
                records.push(record);
            }
            Verdict::Unreachable => stats.unreachable += 1,
            Verdict::Malformed(reason) => {
                tracing::debug!(row = stats.read, reason, ?raw, "skipping malformed record");
                stats.malformed += 1;
            }
        }
    }
    stats.kept = records.len() as u64;

    let layout = ColumnLayout {
        id_width: IdWidth::for_max(max_id),
        time_width: TimeWidth::for_max(max_time),
        unit: config.unit,
    };

    tracing::info!(
        read = stats.read,
        kept = stats.kept,
        unreachable = stats.unreachable,
        malformed = stats.malformed,
        duplicates = stats.duplicates,
        id_width = layout.id_width.bytes(),
        time_width = layout.time_width.bytes(),
        "filtered OD records"
    );

    Normalized {
        records,
        layout,
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use butterfly_common::Error;

    fn raw(from_id: i64, to_id: i64, travel_time: Option<f64>) -> Result<RawRecord> {
        Ok(RawRecord {
            from_id,
            to_id,
            travel_time,
        })
    }

    #[test]
    fn test_unreachable_rows_are_dropped() {
        let config = FilterConfig {
            sentinel: Some(-1.0),
            ..FilterConfig::default()
        };
        let rows = vec![
            raw(1, 2, Some(300.0)),
            raw(1, 3, None),
            raw(2, 3, Some(f64::NAN)),
            raw(3, 1, Some(-1.0)),
            raw(3, 2, Some(f64::INFINITY)),
        ];
        let out = normalize(rows, &config);

        assert_eq!(
            out.records,
            vec![CompactRecord {
                from_id: 1,
                to_id: 2,
                travel_time: 300
            }]
        );
        assert_eq!(out.stats.unreachable, 4);
        assert_eq!(out.stats.read, 5);
        assert_eq!(out.stats.kept, 1);
    }

    #[test]
    fn test_malformed_rows_are_counted_not_fatal() {
        let rows = vec![
            Err(Error::format("row 2: travel_time 'abc' is not a number")),
            raw(-4, 2, Some(10.0)),
            raw(1, 5_000_000_000, Some(10.0)),
            raw(1, 2, Some(-30.0)),
            raw(7, 8, Some(42.0)),
        ];
        let out = normalize(rows, &FilterConfig::default());

        assert_eq!(out.stats.malformed, 4);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].from_id, 7);
    }

    #[test]
    fn test_bad_ids_are_malformed_even_when_unreachable() {
        let config = FilterConfig {
            sentinel: Some(-1.0),
            ..FilterConfig::default()
        };
        let rows = vec![
            raw(-1, 2, None),
            raw(1, 5_000_000_000, Some(-1.0)),
            raw(-3, 4, Some(f64::NAN)),
            raw(1, 2, None),
        ];
        let out = normalize(rows, &config);

        assert_eq!(out.stats.malformed, 3);
        assert_eq!(out.stats.unreachable, 1);
        assert!(out.records.is_empty());
    }

    #[test]
    fn test_duplicates_keep_first() {
        let rows = vec![
            raw(1, 2, Some(100.0)),
            raw(2, 1, Some(200.0)),
            raw(1, 2, Some(999.0)),
        ];
        let out = normalize(rows, &FilterConfig::default());

        assert_eq!(out.stats.duplicates, 1);
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].travel_time, 100);
        assert_eq!(out.records[1].travel_time, 200);
    }

    #[test]
    fn test_widths_follow_maxima() {
        let narrow = normalize(vec![raw(10, 200, Some(3600.0))], &FilterConfig::default());
        assert_eq!(narrow.layout.id_width, IdWidth::U8);
        assert_eq!(narrow.layout.time_width, TimeWidth::U16);

        let wide = normalize(
            vec![raw(70_000, 1, Some(100_000.0))],
            &FilterConfig::default(),
        );
        assert_eq!(wide.layout.id_width, IdWidth::U32);
        assert_eq!(wide.layout.time_width, TimeWidth::U32);
    }

    #[test]
    fn test_minutes_rounding() {
        let config = FilterConfig {
            unit: TimeUnit::Minutes,
            sentinel: None,
        };
        let out = normalize(vec![raw(1, 2, Some(150.0)), raw(2, 1, Some(29.0))], &config);
        assert_eq!(out.layout.unit, TimeUnit::Minutes);
        assert_eq!(out.records[0].travel_time, 3);
        assert_eq!(out.records[1].travel_time, 0);
    }
}
