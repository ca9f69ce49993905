//! On-disk record codec.
//!
//! Every record is a self-delimited unit laid out as:
//!
//! ```text
//! [checksum: u32 LE][timestamp: u32 LE][key_size: u32 LE][value_size: u32 LE][key][value]
//! ```
//!
//! The checksum is CRC-32/IEEE over every byte after the checksum field.
//! Bit 31 of `value_size` marks a tombstone; live values keep it clear, so
//! a value is at most [`MAX_VALUE_SIZE`] bytes.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;

use crate::{Error, Result};

/// Fixed width of the record header in bytes.
pub const HEADER_SIZE: usize = 16;

const TOMBSTONE_FLAG: u32 = 1 << 31;

/// Hard ceiling on value length; the tombstone bit must stay clear.
pub const MAX_VALUE_SIZE: usize = (TOMBSTONE_FLAG - 1) as usize;

/// Hard ceiling on key length.
pub const MAX_KEY_SIZE: usize = u32::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub checksum: u32,
    pub timestamp: u32,
    pub key_size: u32,
    pub value_size: u32,
}

impl Header {
    pub fn decode(buf: &[u8]) -> Result<Header> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::DecodingFailed {
                reason: "buffer shorter than a record header",
            });
        }
        Ok(Header {
            checksum: LittleEndian::read_u32(&buf[0..4]),
            timestamp: LittleEndian::read_u32(&buf[4..8]),
            key_size: LittleEndian::read_u32(&buf[8..12]),
            value_size: LittleEndian::read_u32(&buf[12..16]),
        })
    }

    pub fn key_len(&self) -> usize {
        self.key_size as usize
    }

    pub fn value_len(&self) -> usize {
        (self.value_size & !TOMBSTONE_FLAG) as usize
    }

    pub fn is_tombstone(&self) -> bool {
        self.value_size & TOMBSTONE_FLAG != 0
    }

    /// Total size of the record this header describes, header included.
    pub fn record_len(&self) -> usize {
        HEADER_SIZE + self.key_len() + self.value_len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: Header,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    /// Builds a live record, computing its checksum.
    pub fn put(timestamp: u32, key: &[u8], value: &[u8]) -> Record {
        Record::new(timestamp, key, value, false)
    }

    /// Builds a tombstone for `key`. Tombstones carry no value bytes.
    pub fn tombstone(timestamp: u32, key: &[u8]) -> Record {
        Record::new(timestamp, key, &[], true)
    }

    fn new(timestamp: u32, key: &[u8], value: &[u8], tombstone: bool) -> Record {
        let mut value_size = value.len() as u32;
        if tombstone {
            value_size |= TOMBSTONE_FLAG;
        }
        let mut header = Header {
            checksum: 0,
            timestamp,
            key_size: key.len() as u32,
            value_size,
        };
        header.checksum = checksum(&header, key, value);
        Record {
            header,
            key: key.to_vec(),
            value: value.to_vec(),
        }
    }

    /// Total serialized size, header included.
    pub fn len(&self) -> usize {
        self.header.record_len()
    }

    /// Serializes the record onto the end of `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.reserve(self.len());
        buf.write_u32::<LittleEndian>(self.header.checksum)
            .map_err(encoding)?;
        buf.write_u32::<LittleEndian>(self.header.timestamp)
            .map_err(encoding)?;
        buf.write_u32::<LittleEndian>(self.header.key_size)
            .map_err(encoding)?;
        buf.write_u32::<LittleEndian>(self.header.value_size)
            .map_err(encoding)?;
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        Ok(())
    }

    /// Parses a byte range holding one whole record. The declared sizes are
    /// checked against the buffer before anything is sliced. The checksum is
    /// not verified here; call [`Record::verify_checksum`] with the same
    /// bytes.
    pub fn decode(buf: &[u8]) -> Result<Record> {
        let header = Header::decode(buf)?;
        let total = header.record_len();
        if buf.len() < total {
            return Err(Error::DecodingFailed {
                reason: "record sizes exceed the supplied buffer",
            });
        }
        let key_end = HEADER_SIZE + header.key_len();
        Ok(Record {
            header,
            key: buf[HEADER_SIZE..key_end].to_vec(),
            value: buf[key_end..total].to_vec(),
        })
    }

    /// Recomputes the CRC over every byte after the checksum field and
    /// compares it against the stored value.
    pub fn verify_checksum(&self, buf: &[u8]) -> Result<()> {
        let total = self.len();
        if buf.len() < total {
            return Err(Error::DecodingFailed {
                reason: "record sizes exceed the supplied buffer",
            });
        }
        let mut hasher = Crc32::new();
        hasher.update(&buf[4..total]);
        let computed = hasher.finalize();
        if computed != self.header.checksum {
            return Err(Error::ChecksumMismatch {
                stored: self.header.checksum,
                computed,
            });
        }
        Ok(())
    }
}

fn checksum(header: &Header, key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&header.timestamp.to_le_bytes());
    hasher.update(&header.key_size.to_le_bytes());
    hasher.update(&header.value_size.to_le_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

fn encoding(source: std::io::Error) -> Error {
    Error::EncodingFailed { source }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(record: &Record) -> Vec<u8> {
        let mut buf = Vec::new();
        record.encode_into(&mut buf).unwrap();
        buf
    }

    #[test]
    fn encode_matches_wire_layout() {
        let record = Record::put(7, b"a", b"1");
        let buf = encode(&record);

        assert_eq!(buf.len(), 18);
        assert_eq!(&buf[4..8], &7u32.to_le_bytes());
        assert_eq!(&buf[8..12], &1u32.to_le_bytes());
        assert_eq!(&buf[12..16], &1u32.to_le_bytes());
        assert_eq!(&buf[16..17], b"a");
        assert_eq!(&buf[17..18], b"1");

        // checksum covers everything after its own field
        let mut hasher = Crc32::new();
        hasher.update(&buf[4..]);
        assert_eq!(&buf[0..4], &hasher.finalize().to_le_bytes());
    }

    #[test]
    fn decode_round_trip() {
        let record = Record::put(42, b"key", b"value");
        let buf = encode(&record);

        let decoded = Record::decode(&buf).unwrap();
        assert_eq!(decoded, record);
        decoded.verify_checksum(&buf).unwrap();
    }

    #[test]
    fn decode_rejects_short_header() {
        let result = Record::decode(&[0u8; 4]);
        assert!(matches!(result, Err(Error::DecodingFailed { .. })));
    }

    #[test]
    fn decode_rejects_sizes_beyond_buffer() {
        let record = Record::put(1, b"k", b"v");
        let mut buf = encode(&record);
        // inflate the declared value size past the buffer
        buf[12..16].copy_from_slice(&1024u32.to_le_bytes());

        let result = Record::decode(&buf);
        assert!(matches!(result, Err(Error::DecodingFailed { .. })));
    }

    #[test]
    fn verify_detects_flipped_payload_byte() {
        let record = Record::put(1, b"key", b"value");
        let mut buf = encode(&record);
        let last = buf.len() - 1;
        buf[last] ^= 0xff;

        let decoded = Record::decode(&buf).unwrap();
        let result = decoded.verify_checksum(&buf);
        assert!(matches!(result, Err(Error::ChecksumMismatch { .. })));
    }

    #[test]
    fn tombstone_carries_no_value_bytes() {
        let record = Record::tombstone(9, b"gone");
        assert!(record.header.is_tombstone());
        assert_eq!(record.header.value_len(), 0);
        assert_eq!(record.len(), HEADER_SIZE + 4);

        let buf = encode(&record);
        let decoded = Record::decode(&buf).unwrap();
        assert!(decoded.header.is_tombstone());
        assert!(decoded.value.is_empty());
        decoded.verify_checksum(&buf).unwrap();
    }

    #[test]
    fn zero_length_value_is_not_a_tombstone() {
        let record = Record::put(3, b"k", b"");
        assert!(!record.header.is_tombstone());
        assert_eq!(record.len(), HEADER_SIZE + 1);

        let buf = encode(&record);
        let decoded = Record::decode(&buf).unwrap();
        assert!(!decoded.header.is_tombstone());
        assert!(decoded.value.is_empty());
    }
}
