//! Binary file formats

pub mod crc;
pub mod od_container;

pub use od_container::{
    ColumnLayout, CompactRecord, ContainerInfo, ContainerReader, ContainerWriter, IdWidth,
    TimeUnit, TimeWidth,
};
