//! In-memory OD index and the batched container loader
//!
//! The index maps a directed (from_id, to_id) pair, packed into one u64, to
//! the stored travel-time count. It is built once and read-only afterwards.

use butterfly_common::{Error, Result};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::formats::od_container::{ContainerReader, DecodedBlock, TimeUnit};
use crate::spatial::PointId;

/// Pack a directed id pair into a single hash key
#[inline]
pub fn pack_key(from_id: PointId, to_id: PointId) -> u64 {
    ((from_id as u64) << 32) | to_id as u64
}

#[inline]
pub fn unpack_key(key: u64) -> (PointId, PointId) {
    ((key >> 32) as PointId, key as PointId)
}

/// Shared flag a caller can raise to stop a long load at the next batch boundary
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Rows decoded and inserted per batch
    pub batch_size: usize,
    /// Give up loading after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            batch_size: 65_536,
            timeout_secs: None,
        }
    }
}

/// Runtime knobs for [`OdIndex::load`]. The batch size bounds memory held in
/// flight; it never changes the resulting index.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub batch_size: usize,
    pub cancel: Option<CancelFlag>,
    pub deadline: Option<Instant>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions::from(&LoadConfig::default())
    }
}

impl From<&LoadConfig> for LoadOptions {
    fn from(config: &LoadConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            cancel: None,
            deadline: config
                .timeout_secs
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        }
    }
}

impl LoadOptions {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size,
            ..Self::default()
        }
    }

    fn check(&self, rows_done: u64) -> Result<()> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(Error::Cancelled(format!("load cancelled after {rows_done} rows")));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(Error::Cancelled(format!(
                "load deadline passed after {rows_done} rows"
            )));
        }
        Ok(())
    }
}

/// Read-only map from a directed OD pair to its travel time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OdIndex {
    map: FxHashMap<u64, u32>,
    unit: TimeUnit,
}

impl OdIndex {
    /// Load a whole container from `path`. See [`OdIndex::load`].
    pub fn load_path<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Self> {
        let mut reader = ContainerReader::open(path)?;
        Self::load(&mut reader, options)
    }

    /// Materialize a container in `batch_size`-row slices.
    ///
    /// All-or-nothing: any format error, duplicate pair, cancellation or
    /// deadline aborts and the partial map is dropped.
    pub fn load(reader: &mut ContainerReader, options: &LoadOptions) -> Result<Self> {
        if options.batch_size == 0 {
            return Err(Error::invalid("batch_size must be at least 1"));
        }
        let started = Instant::now();
        let info = reader.info().clone();
        let capacity = usize::try_from(info.n_rows)
            .map_err(|_| Error::invalid(format!("{} rows do not fit in memory", info.n_rows)))?;
        let mut map = FxHashMap::with_capacity_and_hasher(capacity, Default::default());

        let mut batches = Batches::new(reader, options.batch_size);
        let mut rows_done = 0u64;
        let mut n_batches = 0u64;
        loop {
            options.check(rows_done)?;
            let Some(batch) = batches.next_batch()? else {
                break;
            };
            for i in 0..batch.len() {
                let key = pack_key(batch.from[i], batch.to[i]);
                if map.insert(key, batch.time[i]).is_some() {
                    return Err(Error::format(format!(
                        "duplicate OD pair ({}, {}) in container",
                        batch.from[i], batch.to[i]
                    )));
                }
            }
            rows_done += batch.len() as u64;
            n_batches += 1;
        }

        if rows_done != info.n_rows {
            return Err(Error::format(format!(
                "container declares {} rows, loaded {rows_done}",
                info.n_rows
            )));
        }

        tracing::info!(
            rows = rows_done,
            batches = n_batches,
            batch_size = options.batch_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "loaded OD index"
        );

        Ok(Self {
            map,
            unit: info.layout.unit,
        })
    }

    /// Build directly from records already in memory (tests, tooling)
    pub fn from_records<I>(records: I, unit: TimeUnit) -> Result<Self>
    where
        I: IntoIterator<Item = crate::CompactRecord>,
    {
        let mut map = FxHashMap::default();
        for r in records {
            if map.insert(pack_key(r.from_id, r.to_id), r.travel_time).is_some() {
                return Err(Error::invalid(format!(
                    "duplicate OD pair ({}, {})",
                    r.from_id, r.to_id
                )));
            }
        }
        Ok(Self { map, unit })
    }

    /// Raw stored count for the exact directed pair
    #[inline]
    pub fn get(&self, from_id: PointId, to_id: PointId) -> Option<u32> {
        self.map.get(&pack_key(from_id, to_id)).copied()
    }

    pub fn travel_time(&self, from_id: PointId, to_id: PointId) -> Option<Duration> {
        self.get(from_id, to_id).map(|count| self.unit.to_duration(count))
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All entries as (from_id, to_id, count), in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (PointId, PointId, u32)> + '_ {
        self.map.iter().map(|(&key, &count)| {
            let (from, to) = unpack_key(key);
            (from, to, count)
        })
    }

    /// Every id appearing as origin or destination
    pub fn ids(&self) -> FxHashSet<PointId> {
        let mut ids = FxHashSet::default();
        for &key in self.map.keys() {
            let (from, to) = unpack_key(key);
            ids.insert(from);
            ids.insert(to);
        }
        ids
    }
}

/// Re-slices container blocks into fixed-size batches, crossing block
/// boundaries when `batch_size` exceeds the block size.
struct Batches<'a> {
    reader: &'a mut ContainerReader,
    batch_size: usize,
    next_block: usize,
    pending: DecodedBlock,
    cursor: usize,
}

impl<'a> Batches<'a> {
    fn new(reader: &'a mut ContainerReader, batch_size: usize) -> Self {
        Self {
            reader,
            batch_size,
            next_block: 0,
            pending: DecodedBlock::default(),
            cursor: 0,
        }
    }

    fn next_batch(&mut self) -> Result<Option<DecodedBlock>> {
        let mut batch = DecodedBlock::default();
        while batch.len() < self.batch_size {
            if self.cursor == self.pending.len() {
                if self.next_block == self.reader.blocks().len() {
                    break;
                }
                self.pending = self.reader.read_block(self.next_block)?;
                tracing::debug!(block = self.next_block, rows = self.pending.len(), "decoded block");
                self.next_block += 1;
                self.cursor = 0;
                continue;
            }
            let take = (self.batch_size - batch.len()).min(self.pending.len() - self.cursor);
            let range = self.cursor..self.cursor + take;
            batch.from.extend_from_slice(&self.pending.from[range.clone()]);
            batch.to.extend_from_slice(&self.pending.to[range.clone()]);
            batch.time.extend_from_slice(&self.pending.time[range]);
            self.cursor += take;
        }
        Ok(if batch.is_empty() { None } else { Some(batch) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompactRecord;

    #[test]
    fn test_pack_roundtrip_is_directed() {
        assert_eq!(unpack_key(pack_key(7, 9)), (7, 9));
        assert_ne!(pack_key(7, 9), pack_key(9, 7));
        assert_eq!(unpack_key(pack_key(u32::MAX, 0)), (u32::MAX, 0));
    }

    #[test]
    fn test_from_records_lookup() {
        let index = OdIndex::from_records(
            vec![CompactRecord {
                from_id: 1,
                to_id: 2,
                travel_time: 5,
            }],
            TimeUnit::Minutes,
        )
        .unwrap();
        assert_eq!(index.get(1, 2), Some(5));
        assert_eq!(index.travel_time(1, 2), Some(Duration::from_secs(300)));
        assert_eq!(index.get(2, 1), None);
        assert_eq!(index.ids().len(), 2);
    }

    #[test]
    fn test_from_records_rejects_duplicates() {
        let r = CompactRecord {
            from_id: 1,
            to_id: 2,
            travel_time: 5,
        };
        assert!(OdIndex::from_records(vec![r, r], TimeUnit::Seconds).is_err());
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let options = LoadOptions {
            batch_size: 1,
            cancel: Some(flag.clone()),
            deadline: None,
        };
        assert!(options.check(0).is_ok());
        flag.cancel();
        assert!(matches!(options.check(10), Err(Error::Cancelled(_))));
    }

    #[test]
    fn test_expired_deadline() {
        let options = LoadOptions {
            batch_size: 1,
            cancel: None,
            deadline: Some(Instant::now()),
        };
        assert!(matches!(options.check(0), Err(Error::Cancelled(_))));
    }
}
