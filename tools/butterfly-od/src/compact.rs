//! Columnar compactor: persist filtered records as an `.odmx` container

use butterfly_common::{Error, Result};
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::path::Path;
use std::time::Instant;

use crate::filter::Normalized;
use crate::formats::od_container::{
    encode_block, ColumnLayout, CompactRecord, ContainerInfo, ContainerWriter,
};
use crate::od_index::pack_key;

/// Blocks encoded in parallel before being written out in order
const BLOCKS_PER_WAVE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompactConfig {
    /// Rows per independently compressed block
    pub block_rows: u32,
    /// zstd compression level
    pub zstd_level: i32,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            block_rows: 65_536,
            zstd_level: 3,
        }
    }
}

/// Write `records` to `path` with the given column layout.
///
/// The container only appears at `path` once fully written and synced.
/// Every record is written; filtering happens upstream. A repeated
/// (from_id, to_id) pair is `InvalidInput` and nothing is written.
pub fn compact<P: AsRef<Path>>(
    records: &[CompactRecord],
    layout: ColumnLayout,
    path: P,
    config: &CompactConfig,
) -> Result<ContainerInfo> {
    if config.block_rows == 0 {
        return Err(Error::invalid("block_rows must be at least 1"));
    }
    let started = Instant::now();
    ensure_unique_pairs(records)?;
    let mut writer = ContainerWriter::create(path.as_ref(), layout, config.block_rows)?;

    let block_rows = config.block_rows as usize;
    for wave in records.chunks(block_rows.saturating_mul(BLOCKS_PER_WAVE)) {
        let encoded = wave
            .par_chunks(block_rows)
            .map(|chunk| encode_block(chunk, layout, config.zstd_level))
            .collect::<Result<Vec<_>>>()?;
        for block in &encoded {
            writer.write_block(block)?;
        }
    }

    let info = writer.finish()?;
    // Against a naive row dump of i64 ids and f64 seconds
    let naive_bytes = records.len() as u64 * 24;
    tracing::info!(
        path = %path.as_ref().display(),
        rows = info.n_rows,
        blocks = info.n_blocks,
        bytes = info.file_len,
        ratio = naive_bytes as f64 / info.file_len.max(1) as f64,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "compacted OD container"
    );
    Ok(info)
}

fn ensure_unique_pairs(records: &[CompactRecord]) -> Result<()> {
    let mut seen = FxHashSet::with_capacity_and_hasher(records.len(), Default::default());
    for r in records {
        if !seen.insert(pack_key(r.from_id, r.to_id)) {
            return Err(Error::invalid(format!(
                "duplicate OD pair ({}, {})",
                r.from_id, r.to_id
            )));
        }
    }
    Ok(())
}

/// Compact the output of [`crate::filter::normalize`] with its narrowed layout
pub fn compact_normalized<P: AsRef<Path>>(
    normalized: &Normalized,
    path: P,
    config: &CompactConfig,
) -> Result<ContainerInfo> {
    compact(&normalized.records, normalized.layout, path, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::od_container::{partial_path, ContainerReader, TimeUnit};

    fn grid(n: u32) -> Vec<CompactRecord> {
        let mut recs = Vec::new();
        for from_id in 0..n {
            for to_id in 0..n {
                if from_id != to_id {
                    recs.push(CompactRecord {
                        from_id,
                        to_id,
                        travel_time: 30 * from_id.abs_diff(to_id),
                    });
                }
            }
        }
        recs
    }

    #[test]
    fn test_row_count_preserved_across_block_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let recs = grid(40);
        for block_rows in [1u32, 7, 1_000, 100_000] {
            let path = dir.path().join(format!("od-{block_rows}.odmx"));
            let config = CompactConfig {
                block_rows,
                zstd_level: 1,
            };
            let info = compact(&recs, ColumnLayout::wide(TimeUnit::Seconds), &path, &config)
                .unwrap();
            assert_eq!(info.n_rows, recs.len() as u64);
            assert_eq!(
                info.n_blocks as usize,
                recs.len().div_ceil(block_rows as usize)
            );
            assert_eq!(ContainerReader::open(&path).unwrap().info(), &info);
        }
    }

    #[test]
    fn test_zero_block_rows_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = CompactConfig {
            block_rows: 0,
            zstd_level: 3,
        };
        let result = compact(
            &grid(3),
            ColumnLayout::wide(TimeUnit::Seconds),
            dir.path().join("od.odmx"),
            &config,
        );
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_failed_compaction_leaves_no_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("od.odmx");
        let narrow = ColumnLayout {
            id_width: crate::formats::od_container::IdWidth::U8,
            time_width: crate::formats::od_container::TimeWidth::U16,
            unit: TimeUnit::Seconds,
        };
        let mut recs = grid(10);
        recs.push(CompactRecord {
            from_id: 1_000,
            to_id: 1,
            travel_time: 1,
        });

        let result = compact(&recs, narrow, &path, &CompactConfig::default());
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_duplicate_pair_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("od.odmx");
        let recs = vec![
            CompactRecord {
                from_id: 1,
                to_id: 2,
                travel_time: 5,
            },
            CompactRecord {
                from_id: 2,
                to_id: 1,
                travel_time: 5,
            },
            CompactRecord {
                from_id: 1,
                to_id: 2,
                travel_time: 6,
            },
        ];
        let config = CompactConfig {
            block_rows: 1,
            zstd_level: 1,
        };

        let result = compact(&recs, ColumnLayout::wide(TimeUnit::Seconds), &path, &config);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
    }

    #[test]
    fn test_unwritable_destination_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("od.odmx");
        let result = compact(
            &grid(3),
            ColumnLayout::wide(TimeUnit::Seconds),
            &path,
            &CompactConfig::default(),
        );
        assert!(matches!(result, Err(Error::IoError(_))));
    }
}
