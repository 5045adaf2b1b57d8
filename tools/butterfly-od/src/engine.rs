//! Query engine: coordinate -> nearest OD point (twice) -> exact directed lookup
//!
//! Construction loads the container and builds the spatial index once; every
//! query afterwards is a pure read against both.

use butterfly_common::{Error, Result};
use rayon::prelude::*;
use std::path::Path;
use std::time::{Duration, Instant};

use crate::od_index::{LoadOptions, OdIndex};
use crate::spatial::{Coord, NearestPoint, Point, PointId, RTreeResolver};

/// Owns the OD index and spatial index for its whole lifetime
pub struct QueryEngine<R: NearestPoint = RTreeResolver> {
    index: OdIndex,
    resolver: R,
}

impl<R: NearestPoint> QueryEngine<R> {
    /// Load the container at `container` and index `points`.
    ///
    /// Fails without returning a partial engine on any format, I/O or
    /// input error, or when the container references an id missing from
    /// `points`.
    pub fn build<P: AsRef<Path>>(
        container: P,
        points: &[Point],
        options: &LoadOptions,
    ) -> Result<Self> {
        let started = Instant::now();
        let resolver = R::build(points)?;
        let index = OdIndex::load_path(container.as_ref(), options)?;
        let engine = Self::from_parts(index, resolver, points)?;
        tracing::info!(
            pairs = engine.index.len(),
            points = engine.resolver.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query engine ready"
        );
        Ok(engine)
    }

    /// Assemble an engine from indexes built elsewhere.
    /// `points` must be the set `resolver` was built from.
    pub fn from_parts(index: OdIndex, resolver: R, points: &[Point]) -> Result<Self> {
        let known: rustc_hash::FxHashSet<PointId> = points.iter().map(|p| p.id).collect();
        if let Some(missing) = index.ids().into_iter().find(|id| !known.contains(id)) {
            return Err(Error::invalid(format!(
                "OD matrix references id {missing}, which has no point"
            )));
        }
        Ok(Self { index, resolver })
    }

    /// Nearest known point id for `coord`
    pub fn resolve(&self, coord: Coord) -> Result<PointId> {
        coord.ensure_finite()?;
        Ok(self.resolver.nearest(coord))
    }

    /// Travel time between the points nearest to `origin` and `destination`.
    ///
    /// `Ok(None)` means the directed pair has no entry: the reverse pair is
    /// never consulted. `Err` only for non-finite coordinates.
    pub fn query_travel_time(&self, origin: Coord, destination: Coord) -> Result<Option<Duration>> {
        let from = self.resolve(origin)?;
        let to = self.resolve(destination)?;
        Ok(self.query_ids(from, to))
    }

    /// Exact lookup by ids, skipping spatial resolution
    pub fn query_ids(&self, from: PointId, to: PointId) -> Option<Duration> {
        self.index.travel_time(from, to)
    }

    /// Answer many queries in parallel against the shared indexes
    pub fn query_batch(&self, pairs: &[(Coord, Coord)]) -> Vec<Result<Option<Duration>>> {
        pairs
            .par_iter()
            .map(|&(origin, destination)| self.query_travel_time(origin, destination))
            .collect()
    }

    pub fn index(&self) -> &OdIndex {
        &self.index
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }
}
