//! Compact origin-destination travel-time matrices with point-to-point lookups
//!
//! Pipeline:
//!
//! 1. [`filter::normalize`] drops unreachable and malformed rows and picks
//!    the narrowest column widths.
//! 2. [`compact::compact`] writes a block-chunked, zstd-compressed
//!    column container (`.odmx`).
//! 3. [`QueryEngine::build`] loads the container into an [`OdIndex`] and
//!    builds a spatial index over the point table, once.
//! 4. [`QueryEngine::query_travel_time`] snaps both coordinates to their
//!    nearest points and looks up the exact directed pair.

pub mod bench;
pub mod cli;
pub mod compact;
pub mod config;
pub mod engine;
pub mod filter;
pub mod formats;
pub mod ingest;
pub mod logging;
pub mod od_index;
pub mod spatial;

pub use butterfly_common::{Error, Result};
pub use compact::{compact, CompactConfig};
pub use config::OdConfig;
pub use engine::QueryEngine;
pub use filter::{normalize, FilterConfig, FilterStats, Normalized, RawRecord};
pub use formats::{CompactRecord, ContainerInfo, TimeUnit};
pub use od_index::{CancelFlag, LoadConfig, LoadOptions, OdIndex};
pub use spatial::{Coord, LinearScanResolver, NearestPoint, Point, PointId, RTreeResolver};
