//! Segment files: append-only containers of records.
//!
//! A data directory holds segments named `<decimal-id>.bitcask.data`. Ids
//! only ever grow; the highest id is the active segment, everything below it
//! is sealed and immutable.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::record::{Header, Record, HEADER_SIZE};
use crate::{Error, Result, SEGMENT_SUFFIX};

pub(crate) fn segment_file_name(id: u64) -> String {
    format!("{}{}", id, SEGMENT_SUFFIX)
}

/// Parses `<decimal-id>.bitcask.data`. Anything else found in the data
/// directory is refused rather than skipped.
pub(crate) fn parse_segment_file_name(name: &str) -> Result<u64> {
    let invalid = || Error::InvalidSegmentName {
        filename: name.to_string(),
    };
    let id = name.strip_suffix(SEGMENT_SUFFIX).ok_or_else(invalid)?;
    id.parse::<u64>().map_err(|_| invalid())
}

/// A single on-disk segment. The store owns every handle; keydir entries
/// refer to segments by id only, never by handle.
#[derive(Debug)]
pub(crate) struct Segment {
    pub id: u64,
    path: PathBuf,
    file: File,
}

/// One record yielded while sequentially replaying a segment.
pub(crate) struct ReplayedRecord {
    pub key: Vec<u8>,
    pub timestamp: u32,
    pub offset: u64,
    pub len: u32,
    pub tombstone: bool,
}

impl Segment {
    /// Creates a fresh, empty segment open for appends and reads.
    pub fn create(dir: &Path, id: u64) -> Result<Segment> {
        let path = dir.join(segment_file_name(id));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|source| Error::Io {
                source,
                filename: path.display().to_string(),
            })?;
        debug!("created segment {}", path.display());
        Ok(Segment { id, path, file })
    }

    /// Opens an existing segment read-only.
    pub fn open(path: PathBuf, id: u64) -> Result<Segment> {
        let file = File::open(&path).map_err(|source| Error::Io {
            source,
            filename: path.display().to_string(),
        })?;
        Ok(Segment { id, path, file })
    }

    pub fn name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn len(&self) -> Result<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|source| Error::Io {
                source,
                filename: self.name(),
            })
    }

    /// Appends `buf` and fsyncs. The bytes are durable when this returns.
    pub fn append(&self, buf: &[u8]) -> Result<()> {
        use std::io::Write;

        (&self.file)
            .write_all(buf)
            .map_err(|source| Error::WriteFailed {
                source,
                filename: self.name(),
            })?;
        self.file.sync_all().map_err(|source| Error::WriteFailed {
            source,
            filename: self.name(),
        })
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().map_err(|source| Error::WriteFailed {
            source,
            filename: self.name(),
        })
    }

    /// Reads exactly `buf.len()` bytes at `offset` without moving the shared
    /// file cursor, so concurrent readers never serialize on a seek.
    pub fn read_exact_at(&self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_exact_at(&self.file, buf, offset).map_err(|source| Error::ReadFailed {
            source,
            filename: self.name(),
        })
    }

    /// Replays the segment record by record, verifying each checksum and
    /// handing every record's location to `apply`. Reaching the end of the
    /// file on a record boundary ends the replay cleanly; running out of
    /// bytes inside a record is an error.
    pub fn replay<F>(&self, mut apply: F) -> Result<()>
    where
        F: FnMut(ReplayedRecord),
    {
        let file_len = self.len()?;
        let mut reader = BufReader::new(&self.file);
        let mut header_buf = [0u8; HEADER_SIZE];
        let mut buf = Vec::new();
        let mut offset = 0u64;

        while offset < file_len {
            if file_len - offset < HEADER_SIZE as u64 {
                return Err(Error::TruncatedRecord {
                    filename: self.name(),
                });
            }
            reader
                .read_exact(&mut header_buf)
                .map_err(|source| Error::ReadFailed {
                    source,
                    filename: self.name(),
                })?;
            let header = Header::decode(&header_buf)?;
            let record_len = header.record_len() as u64;
            if offset + record_len > file_len {
                return Err(Error::TruncatedRecord {
                    filename: self.name(),
                });
            }

            buf.clear();
            buf.extend_from_slice(&header_buf);
            buf.resize(record_len as usize, 0);
            reader
                .read_exact(&mut buf[HEADER_SIZE..])
                .map_err(|source| Error::ReadFailed {
                    source,
                    filename: self.name(),
                })?;

            let record = Record::decode(&buf)?;
            record.verify_checksum(&buf)?;

            apply(ReplayedRecord {
                key: record.key,
                timestamp: record.header.timestamp,
                offset,
                len: record_len as u32,
                tombstone: record.header.is_tombstone(),
            });
            offset += record_len;
        }
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        let n = file.seek_read(buf, offset)?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
        }
        buf = &mut buf[n..];
        offset += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_names_round_trip() {
        assert_eq!(segment_file_name(1_000_000_000), "1000000000.bitcask.data");
        assert_eq!(
            parse_segment_file_name("1000000000.bitcask.data").unwrap(),
            1_000_000_000
        );
        assert_eq!(
            parse_segment_file_name("1000000017.bitcask.data").unwrap(),
            1_000_000_017
        );
    }

    #[test]
    fn foreign_names_are_rejected() {
        for name in [
            "notes.txt",
            "1000000000.bitcask",
            "abc.bitcask.data",
            "1000000000.bitcask.data.bak",
            ".bitcask.data",
        ] {
            assert!(
                matches!(
                    parse_segment_file_name(name),
                    Err(Error::InvalidSegmentName { .. })
                ),
                "expected {name} to be rejected"
            );
        }
    }
}
