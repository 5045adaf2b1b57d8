//! od.odmx format - block-chunked, column-compressed OD travel-time container
//!
//! Format (little-endian):
//!
//! Header (32 bytes):
//!   magic:       u32 = 0x584D444F  // "ODMX"
//!   version:     u16 = 1
//!   id_width:    u8  = {1, 2, 4}   // bytes per from_id / to_id
//!   time_width:  u8  = {2, 4}      // bytes per travel_time
//!   time_unit:   u8  = {0=seconds, 1=minutes}
//!   codec:       u8  = 1           // zstd
//!   reserved:    u16
//!   block_rows:  u32               // max rows per block
//!   reserved:    [16]u8
//!
//! Body (n_blocks blocks, back to back):
//!   from_id column frame | to_id column frame | travel_time column frame
//!   Each frame is an independent zstd frame over rows * width raw bytes.
//!
//! Block directory (n_blocks * 32 bytes):
//!   offset:      u64
//!   rows:        u32
//!   from_len:    u32
//!   to_len:      u32
//!   time_len:    u32
//!   crc64:       u64   // over the three compressed frames
//!
//! Trailer (48 bytes):
//!   n_blocks:         u32
//!   reserved:         u32
//!   n_rows:           u64
//!   directory_offset: u64
//!   directory_crc64:  u64
//!   file_crc64:       u64   // header + body + directory
//!   end_magic:        u32 = 0x584D444F
//!   reserved:         u32
//!
//! The trailer is the commit marker. Writers stream into `<path>.partial`
//! and only rename onto `<path>` once the trailer is durable.

use butterfly_common::{Error, Result};
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::crc::{self, DigestWriter};

const MAGIC: u32 = 0x584D444F; // "ODMX"
const VERSION: u16 = 1;
const CODEC_ZSTD: u8 = 1;
pub const HEADER_SIZE: usize = 32;
pub const DIRECTORY_ENTRY_SIZE: usize = 32;
pub const TRAILER_SIZE: usize = 48;

/// Bytes used to store one origin/destination id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IdWidth {
    U8,
    U16,
    U32,
}

impl IdWidth {
    /// Narrowest width holding `max_id`
    pub fn for_max(max_id: u32) -> Self {
        if max_id <= u8::MAX as u32 {
            IdWidth::U8
        } else if max_id <= u16::MAX as u32 {
            IdWidth::U16
        } else {
            IdWidth::U32
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            IdWidth::U8 => 1,
            IdWidth::U16 => 2,
            IdWidth::U32 => 4,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(IdWidth::U8),
            2 => Some(IdWidth::U16),
            4 => Some(IdWidth::U32),
            _ => None,
        }
    }

    fn fits(self, value: u32) -> bool {
        match self {
            IdWidth::U8 => value <= u8::MAX as u32,
            IdWidth::U16 => value <= u16::MAX as u32,
            IdWidth::U32 => true,
        }
    }

    fn put(self, value: u32, out: &mut Vec<u8>) {
        match self {
            IdWidth::U8 => out.push(value as u8),
            IdWidth::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            IdWidth::U32 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    fn get(self, bytes: &[u8]) -> u32 {
        match self {
            IdWidth::U8 => bytes[0] as u32,
            IdWidth::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            IdWidth::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

/// Bytes used to store one travel time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeWidth {
    U16,
    U32,
}

impl TimeWidth {
    pub fn for_max(max_time: u32) -> Self {
        if max_time <= u16::MAX as u32 {
            TimeWidth::U16
        } else {
            TimeWidth::U32
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            TimeWidth::U16 => 2,
            TimeWidth::U32 => 4,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            2 => Some(TimeWidth::U16),
            4 => Some(TimeWidth::U32),
            _ => None,
        }
    }

    fn fits(self, value: u32) -> bool {
        match self {
            TimeWidth::U16 => value <= u16::MAX as u32,
            TimeWidth::U32 => true,
        }
    }

    fn put(self, value: u32, out: &mut Vec<u8>) {
        match self {
            TimeWidth::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            TimeWidth::U32 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    fn get(self, bytes: &[u8]) -> u32 {
        match self {
            TimeWidth::U16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
            TimeWidth::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

/// Unit of the stored integer travel times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Minutes,
}

impl TimeUnit {
    pub fn seconds_per_unit(self) -> u64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
        }
    }

    /// Convert a duration in seconds to a whole number of units, rounding to nearest.
    /// `None` if the value is not finite, negative, or overflows u32.
    pub fn from_seconds(self, seconds: f64) -> Option<u32> {
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        let units = (seconds / self.seconds_per_unit() as f64).round();
        if units > u32::MAX as f64 {
            return None;
        }
        Some(units as u32)
    }

    pub fn to_duration(self, count: u32) -> Duration {
        Duration::from_secs(count as u64 * self.seconds_per_unit())
    }

    fn to_byte(self) -> u8 {
        match self {
            TimeUnit::Seconds => 0,
            TimeUnit::Minutes => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(TimeUnit::Seconds),
            1 => Some(TimeUnit::Minutes),
            _ => None,
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(TimeUnit::Seconds),
            "min" | "minutes" => Ok(TimeUnit::Minutes),
            other => Err(Error::invalid(format!("unknown time unit '{other}'"))),
        }
    }
}

/// Column widths and time unit shared by every block of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub id_width: IdWidth,
    pub time_width: TimeWidth,
    pub unit: TimeUnit,
}

impl ColumnLayout {
    /// Widest layout; holds any record.
    pub fn wide(unit: TimeUnit) -> Self {
        Self {
            id_width: IdWidth::U32,
            time_width: TimeWidth::U32,
            unit,
        }
    }
}

/// One row of the compacted OD relation.
/// `travel_time` counts units of the container's [`TimeUnit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompactRecord {
    pub from_id: u32,
    pub to_id: u32,
    pub travel_time: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    pub offset: u64,
    pub rows: u32,
    pub from_len: u32,
    pub to_len: u32,
    pub time_len: u32,
    pub crc64: u64,
}

impl BlockEntry {
    pub fn compressed_len(&self) -> u64 {
        self.from_len as u64 + self.to_len as u64 + self.time_len as u64
    }

    fn to_bytes(self) -> [u8; DIRECTORY_ENTRY_SIZE] {
        let mut buf = [0u8; DIRECTORY_ENTRY_SIZE];
        buf[0..8].copy_from_slice(&self.offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.rows.to_le_bytes());
        buf[12..16].copy_from_slice(&self.from_len.to_le_bytes());
        buf[16..20].copy_from_slice(&self.to_len.to_le_bytes());
        buf[20..24].copy_from_slice(&self.time_len.to_le_bytes());
        buf[24..32].copy_from_slice(&self.crc64.to_le_bytes());
        buf
    }

    fn from_bytes(b: &[u8]) -> Self {
        Self {
            offset: le_u64(&b[0..8]),
            rows: le_u32(&b[8..12]),
            from_len: le_u32(&b[12..16]),
            to_len: le_u32(&b[16..20]),
            time_len: le_u32(&b[20..24]),
            crc64: le_u64(&b[24..32]),
        }
    }
}

/// Summary of a committed container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub version: u16,
    pub layout: ColumnLayout,
    pub block_rows: u32,
    pub n_blocks: u32,
    pub n_rows: u64,
    pub file_len: u64,
    pub compressed_bytes: u64,
    pub file_crc64: u64,
}

/// A block whose three columns are already compressed
#[derive(Debug, Clone)]
pub struct EncodedBlock {
    pub rows: u32,
    pub from: Vec<u8>,
    pub to: Vec<u8>,
    pub time: Vec<u8>,
}

/// A decompressed block, one vector per column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBlock {
    pub from: Vec<u32>,
    pub to: Vec<u32>,
    pub time: Vec<u32>,
}

impl DecodedBlock {
    pub fn len(&self) -> usize {
        self.from.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from.is_empty()
    }
}

/// Narrow and compress one block of records.
///
/// Pure function so blocks can be encoded on worker threads.
pub fn encode_block(
    records: &[CompactRecord],
    layout: ColumnLayout,
    zstd_level: i32,
) -> Result<EncodedBlock> {
    let rows = u32::try_from(records.len())
        .map_err(|_| Error::invalid(format!("block of {} rows is too large", records.len())))?;

    let id_bytes = layout.id_width.bytes();
    let mut from = Vec::with_capacity(records.len() * id_bytes);
    let mut to = Vec::with_capacity(records.len() * id_bytes);
    let mut time = Vec::with_capacity(records.len() * layout.time_width.bytes());

    for r in records {
        if !layout.id_width.fits(r.from_id) || !layout.id_width.fits(r.to_id) {
            return Err(Error::invalid(format!(
                "record ({}, {}) does not fit id width {:?}",
                r.from_id, r.to_id, layout.id_width
            )));
        }
        if !layout.time_width.fits(r.travel_time) {
            return Err(Error::invalid(format!(
                "travel time {} does not fit time width {:?}",
                r.travel_time, layout.time_width
            )));
        }
        layout.id_width.put(r.from_id, &mut from);
        layout.id_width.put(r.to_id, &mut to);
        layout.time_width.put(r.travel_time, &mut time);
    }

    Ok(EncodedBlock {
        rows,
        from: zstd::bulk::compress(&from, zstd_level)?,
        to: zstd::bulk::compress(&to, zstd_level)?,
        time: zstd::bulk::compress(&time, zstd_level)?,
    })
}

/// Streaming container writer with an explicit commit step.
///
/// Dropping the writer without calling [`ContainerWriter::finish`] removes the
/// partial file.
pub struct ContainerWriter {
    path: PathBuf,
    partial: PathBuf,
    writer: Option<DigestWriter<BufWriter<File>>>,
    layout: ColumnLayout,
    block_rows: u32,
    directory: Vec<BlockEntry>,
    n_rows: u64,
    committed: bool,
}

impl ContainerWriter {
    pub fn create<P: AsRef<Path>>(path: P, layout: ColumnLayout, block_rows: u32) -> Result<Self> {
        if block_rows == 0 {
            return Err(Error::invalid("block_rows must be at least 1"));
        }
        let path = path.as_ref().to_path_buf();
        let partial = partial_path(&path);
        let file = File::create(&partial)?;

        let mut header = Vec::with_capacity(HEADER_SIZE);
        header.extend_from_slice(&MAGIC.to_le_bytes());
        header.extend_from_slice(&VERSION.to_le_bytes());
        header.push(layout.id_width.bytes() as u8);
        header.push(layout.time_width.bytes() as u8);
        header.push(layout.unit.to_byte());
        header.push(CODEC_ZSTD);
        header.extend_from_slice(&0u16.to_le_bytes()); // reserved
        header.extend_from_slice(&block_rows.to_le_bytes());
        header.resize(HEADER_SIZE, 0);

        let mut this = Self {
            path,
            partial,
            writer: Some(DigestWriter::new(BufWriter::new(file))),
            layout,
            block_rows,
            directory: Vec::new(),
            n_rows: 0,
            committed: false,
        };
        if let Some(writer) = this.writer.as_mut() {
            writer.write_all(&header)?;
        }
        Ok(this)
    }

    pub fn layout(&self) -> ColumnLayout {
        self.layout
    }

    pub fn block_rows(&self) -> u32 {
        self.block_rows
    }

    /// Append one encoded block. Blocks are read back in the order written.
    pub fn write_block(&mut self, block: &EncodedBlock) -> Result<()> {
        if block.rows == 0 {
            return Err(Error::invalid("refusing to write an empty block"));
        }
        if block.rows > self.block_rows {
            return Err(Error::invalid(format!(
                "block has {} rows, container allows {}",
                block.rows, self.block_rows
            )));
        }
        let writer = self.writer.as_mut().ok_or_else(|| {
            Error::IoError(io::Error::other("container writer already finished"))
        })?;

        let entry = BlockEntry {
            offset: writer.position(),
            rows: block.rows,
            from_len: frame_len(&block.from)?,
            to_len: frame_len(&block.to)?,
            time_len: frame_len(&block.time)?,
            crc64: crc::checksum_parts(&[&block.from, &block.to, &block.time]),
        };
        writer.write_all(&block.from)?;
        writer.write_all(&block.to)?;
        writer.write_all(&block.time)?;

        self.n_rows += block.rows as u64;
        self.directory.push(entry);
        Ok(())
    }

    /// Write directory and trailer, fsync, and atomically move the file into place.
    pub fn finish(mut self) -> Result<ContainerInfo> {
        let mut writer = self.writer.take().ok_or_else(|| {
            Error::IoError(io::Error::other("container writer already finished"))
        })?;

        let n_blocks = u32::try_from(self.directory.len())
            .map_err(|_| Error::invalid("too many blocks for one container"))?;
        let directory_offset = writer.position();
        let mut directory = Vec::with_capacity(self.directory.len() * DIRECTORY_ENTRY_SIZE);
        for entry in &self.directory {
            directory.extend_from_slice(&entry.to_bytes());
        }
        let directory_crc64 = crc::checksum(&directory);
        writer.write_all(&directory)?;
        let file_crc64 = writer.current();

        let mut trailer = Vec::with_capacity(TRAILER_SIZE);
        trailer.extend_from_slice(&n_blocks.to_le_bytes());
        trailer.extend_from_slice(&0u32.to_le_bytes());
        trailer.extend_from_slice(&self.n_rows.to_le_bytes());
        trailer.extend_from_slice(&directory_offset.to_le_bytes());
        trailer.extend_from_slice(&directory_crc64.to_le_bytes());
        trailer.extend_from_slice(&file_crc64.to_le_bytes());
        trailer.extend_from_slice(&MAGIC.to_le_bytes());
        trailer.extend_from_slice(&0u32.to_le_bytes());
        writer.write_all(&trailer)?;

        let file_len = writer.position();
        let file = writer
            .into_inner()
            .into_inner()
            .map_err(|e| Error::IoError(e.into_error()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.partial, &self.path)?;
        self.committed = true;

        Ok(ContainerInfo {
            version: VERSION,
            layout: self.layout,
            block_rows: self.block_rows,
            n_blocks,
            n_rows: self.n_rows,
            file_len,
            compressed_bytes: self.directory.iter().map(BlockEntry::compressed_len).sum(),
            file_crc64,
        })
    }
}

impl Drop for ContainerWriter {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.writer.take());
            let _ = fs::remove_file(&self.partial);
        }
    }
}

/// Random-access reader over a committed container
pub struct ContainerReader {
    path: PathBuf,
    reader: BufReader<File>,
    info: ContainerInfo,
    directory: Vec<BlockEntry>,
}

impl ContainerReader {
    /// Open a container, validating header, trailer and block directory.
    /// Block payloads are only read on demand.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let name = path.display().to_string();

        if file_len < (HEADER_SIZE + TRAILER_SIZE) as u64 {
            return Err(Error::format(format!(
                "{name}: {file_len} bytes is too short for a container"
            )));
        }

        let mut header = [0u8; HEADER_SIZE];
        read_exact(&mut reader, &mut header, &name)?;
        let magic = le_u32(&header[0..4]);
        if magic != MAGIC {
            return Err(Error::format(format!(
                "{name}: invalid magic, expected 0x{MAGIC:08x}, got 0x{magic:08x}"
            )));
        }
        let version = le_u16(&header[4..6]);
        if version != VERSION {
            return Err(Error::format(format!("{name}: unsupported version {version}")));
        }
        let id_width = IdWidth::from_byte(header[6])
            .ok_or_else(|| Error::format(format!("{name}: invalid id width {}", header[6])))?;
        let time_width = TimeWidth::from_byte(header[7])
            .ok_or_else(|| Error::format(format!("{name}: invalid time width {}", header[7])))?;
        let unit = TimeUnit::from_byte(header[8])
            .ok_or_else(|| Error::format(format!("{name}: invalid time unit {}", header[8])))?;
        if header[9] != CODEC_ZSTD {
            return Err(Error::format(format!("{name}: unknown codec {}", header[9])));
        }
        let block_rows = le_u32(&header[12..16]);
        if block_rows == 0 {
            return Err(Error::format(format!("{name}: block_rows is zero")));
        }

        let mut trailer = [0u8; TRAILER_SIZE];
        reader.seek(SeekFrom::Start(file_len - TRAILER_SIZE as u64))?;
        read_exact(&mut reader, &mut trailer, &name)?;
        if le_u32(&trailer[40..44]) != MAGIC {
            return Err(Error::format(format!(
                "{name}: missing end marker (container was not committed)"
            )));
        }
        let n_blocks = le_u32(&trailer[0..4]);
        let n_rows = le_u64(&trailer[8..16]);
        let directory_offset = le_u64(&trailer[16..24]);
        let directory_crc64 = le_u64(&trailer[24..32]);
        let file_crc64 = le_u64(&trailer[32..40]);

        // Trailer fields are not checksummed; bound them before trusting them
        let directory_len = n_blocks as u64 * DIRECTORY_ENTRY_SIZE as u64;
        let directory_end = directory_offset
            .checked_add(directory_len)
            .and_then(|end| end.checked_add(TRAILER_SIZE as u64));
        if directory_offset < HEADER_SIZE as u64
            || directory_len > file_len
            || directory_end != Some(file_len)
        {
            return Err(Error::format(format!(
                "{name}: directory at {directory_offset} with {n_blocks} blocks does not match file length {file_len}"
            )));
        }

        let mut raw_directory = vec![0u8; directory_len as usize];
        reader.seek(SeekFrom::Start(directory_offset))?;
        read_exact(&mut reader, &mut raw_directory, &name)?;
        let computed = crc::checksum(&raw_directory);
        if computed != directory_crc64 {
            return Err(Error::format(format!(
                "{name}: directory CRC64 mismatch, computed 0x{computed:016X}, stored 0x{directory_crc64:016X}"
            )));
        }

        let directory: Vec<BlockEntry> = raw_directory
            .chunks_exact(DIRECTORY_ENTRY_SIZE)
            .map(BlockEntry::from_bytes)
            .collect();

        let mut expected_offset = HEADER_SIZE as u64;
        let mut total_rows = 0u64;
        for (i, entry) in directory.iter().enumerate() {
            if entry.offset != expected_offset {
                return Err(Error::format(format!(
                    "{name}: block {i} starts at {}, expected {expected_offset}",
                    entry.offset
                )));
            }
            if entry.rows == 0 || entry.rows > block_rows {
                return Err(Error::format(format!(
                    "{name}: block {i} has {} rows (limit {block_rows})",
                    entry.rows
                )));
            }
            expected_offset = expected_offset
                .checked_add(entry.compressed_len())
                .filter(|end| *end <= directory_offset)
                .ok_or_else(|| {
                    Error::format(format!("{name}: block {i} runs past the directory"))
                })?;
            total_rows += entry.rows as u64;
        }
        if expected_offset != directory_offset {
            return Err(Error::format(format!(
                "{name}: blocks end at {expected_offset}, directory starts at {directory_offset}"
            )));
        }
        if total_rows != n_rows {
            return Err(Error::format(format!(
                "{name}: blocks hold {total_rows} rows, trailer declares {n_rows}"
            )));
        }

        let info = ContainerInfo {
            version,
            layout: ColumnLayout {
                id_width,
                time_width,
                unit,
            },
            block_rows,
            n_blocks,
            n_rows,
            file_len,
            compressed_bytes: directory.iter().map(BlockEntry::compressed_len).sum(),
            file_crc64,
        };

        Ok(Self {
            path,
            reader,
            info,
            directory,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn info(&self) -> &ContainerInfo {
        &self.info
    }

    pub fn blocks(&self) -> &[BlockEntry] {
        &self.directory
    }

    /// Read, verify and decompress block `index`
    pub fn read_block(&mut self, index: usize) -> Result<DecodedBlock> {
        let name = self.path.display().to_string();
        let entry = *self.directory.get(index).ok_or_else(|| {
            Error::invalid(format!(
                "{name}: block {index} out of range ({} blocks)",
                self.directory.len()
            ))
        })?;

        let mut payload = vec![0u8; entry.compressed_len() as usize];
        self.reader.seek(SeekFrom::Start(entry.offset))?;
        read_exact(&mut self.reader, &mut payload, &name)?;

        let computed = crc::checksum(&payload);
        if computed != entry.crc64 {
            return Err(Error::format(format!(
                "{name}: block {index} CRC64 mismatch, computed 0x{computed:016X}, stored 0x{:016X}",
                entry.crc64
            )));
        }

        let (from_frame, rest) = payload.split_at(entry.from_len as usize);
        let (to_frame, time_frame) = rest.split_at(entry.to_len as usize);
        let rows = entry.rows as usize;
        let layout = self.info.layout;

        let from = decompress_column(from_frame, rows, layout.id_width.bytes(), &name, index)?;
        let to = decompress_column(to_frame, rows, layout.id_width.bytes(), &name, index)?;
        let time = decompress_column(time_frame, rows, layout.time_width.bytes(), &name, index)?;

        let id_bytes = layout.id_width.bytes();
        let time_bytes = layout.time_width.bytes();
        Ok(DecodedBlock {
            from: from.chunks_exact(id_bytes).map(|c| layout.id_width.get(c)).collect(),
            to: to.chunks_exact(id_bytes).map(|c| layout.id_width.get(c)).collect(),
            time: time
                .chunks_exact(time_bytes)
                .map(|c| layout.time_width.get(c))
                .collect(),
        })
    }

    /// Verify the whole-file CRC and every block payload
    pub fn verify(&mut self) -> Result<()> {
        let name = self.path.display().to_string();
        let covered = self.info.file_len - TRAILER_SIZE as u64;
        self.reader.seek(SeekFrom::Start(0))?;

        let mut digest = crc::CRC64.digest();
        let mut remaining = covered;
        let mut buf = vec![0u8; 1 << 16];
        while remaining > 0 {
            let n = remaining.min(buf.len() as u64) as usize;
            read_exact(&mut self.reader, &mut buf[..n], &name)?;
            digest.update(&buf[..n]);
            remaining -= n as u64;
        }
        let computed = digest.finalize();
        if computed != self.info.file_crc64 {
            return Err(Error::format(format!(
                "{name}: file CRC64 mismatch, computed 0x{computed:016X}, stored 0x{:016X}",
                self.info.file_crc64
            )));
        }

        for index in 0..self.directory.len() {
            self.read_block(index)?;
        }
        Ok(())
    }
}

/// Sibling path used while a container is being written
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

fn frame_len(frame: &[u8]) -> Result<u32> {
    u32::try_from(frame.len())
        .map_err(|_| Error::invalid(format!("compressed column of {} bytes is too large", frame.len())))
}

fn decompress_column(
    frame: &[u8],
    rows: usize,
    width: usize,
    name: &str,
    index: usize,
) -> Result<Vec<u8>> {
    let expected = rows * width;
    let raw = zstd::bulk::decompress(frame, expected).map_err(|e| {
        Error::format(format!("{name}: block {index} failed to decompress: {e}"))
    })?;
    if raw.len() != expected {
        return Err(Error::format(format!(
            "{name}: block {index} column holds {} bytes, expected {expected}",
            raw.len()
        )));
    }
    Ok(raw)
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], name: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::format(format!("{name}: truncated container"))
        } else {
            Error::IoError(e)
        }
    })
}

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn le_u64(b: &[u8]) -> u64 {
    u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}
