//! CRC-64-ISO checksums for container blocks, directory and whole file

use crc::{Crc, CRC_64_GO_ISO};
use std::io::{self, Write};

/// CRC-64-ISO algorithm
pub const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

/// Compute CRC-64 checksum for a byte slice
pub fn checksum(data: &[u8]) -> u64 {
    CRC64.checksum(data)
}

/// Checksum over several slices as if they were concatenated
pub fn checksum_parts(parts: &[&[u8]]) -> u64 {
    let mut digest = CRC64.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}

/// Writer adapter that feeds every byte written into a CRC-64 digest
/// and tracks the number of bytes passed through.
pub struct DigestWriter<W: Write> {
    inner: W,
    digest: crc::Digest<'static, u64>,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
            written: 0,
        }
    }

    /// Bytes written so far, i.e. the current file offset
    pub fn position(&self) -> u64 {
        self.written
    }

    /// Checksum of everything written so far (the digest keeps running)
    pub fn current(&self) -> u64 {
        self.digest.clone().finalize()
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.digest.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_match_whole() {
        let data = b"origin destination";
        assert_eq!(checksum_parts(&[&data[..6], &data[6..]]), checksum(data));
    }

    #[test]
    fn test_digest_writer_tracks_bytes() {
        let mut writer = DigestWriter::new(Vec::new());
        writer.write_all(b"hello ").unwrap();
        let partial = writer.current();
        writer.write_all(b"world").unwrap();

        assert_eq!(partial, checksum(b"hello "));
        assert_eq!(writer.current(), checksum(b"hello world"));
        assert_eq!(writer.position(), 11);
        assert_eq!(writer.into_inner(), b"hello world".to_vec());
    }
}
