//! Query latency measurement for a built engine

use butterfly_common::{Error, Result};
use hdrhistogram::Histogram;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use crate::engine::QueryEngine;
use crate::spatial::{Coord, NearestPoint, Point};

#[derive(Debug, Clone)]
pub struct LatencyReport {
    pub queries: u64,
    pub found: u64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
}

impl std::fmt::Display for LatencyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} queries ({} found): p50 {:.1}µs, p99 {:.1}µs, max {:.1}µs, mean {:.1}µs",
            self.queries,
            self.found,
            self.p50_ns as f64 / 1e3,
            self.p99_ns as f64 / 1e3,
            self.max_ns as f64 / 1e3,
            self.mean_ns / 1e3
        )
    }
}

/// Uniform random coordinate pairs inside the bounding box of `points`
pub fn random_queries(points: &[Point], n: usize, seed: u64) -> Result<Vec<(Coord, Coord)>> {
    let first = points
        .first()
        .ok_or_else(|| Error::invalid("cannot draw queries from an empty point set"))?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let draw = |rng: &mut StdRng| {
        Coord::new(
            min_x + rng.random::<f64>() * (max_x - min_x),
            min_y + rng.random::<f64>() * (max_y - min_y),
        )
    };
    Ok((0..n)
        .map(|_| {
            let origin = draw(&mut rng);
            (origin, draw(&mut rng))
        })
        .collect())
}

/// Time each query individually, single-threaded
pub fn measure<R: NearestPoint>(
    engine: &QueryEngine<R>,
    queries: &[(Coord, Coord)],
) -> Result<LatencyReport> {
    let mut histogram = Histogram::<u64>::new_with_bounds(1, 60_000_000_000, 3)
        .map_err(|e| Error::invalid(format!("histogram: {e}")))?;
    let mut found = 0u64;

    for &(origin, destination) in queries {
        let started = Instant::now();
        let result = engine.query_travel_time(origin, destination)?;
        histogram.saturating_record(started.elapsed().as_nanos().max(1) as u64);
        if result.is_some() {
            found += 1;
        }
    }

    Ok(LatencyReport {
        queries: histogram.len(),
        found,
        p50_ns: histogram.value_at_quantile(0.5),
        p99_ns: histogram.value_at_quantile(0.99),
        max_ns: histogram.max(),
        mean_ns: histogram.mean(),
    })
}
