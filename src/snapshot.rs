/*!
 * RDB Snapshot Loader
 *
 * This module parses the binary RDB dump format and installs every
 * key/value pair it finds into a Keyspace. It runs once at startup and
 * only reads; snapshot writing is out of scope.
 *
 * The grammar handled here: a magic header with version, zero or more
 * auxiliary metadata fields (skipped without interpretation), then the
 * database section where each pair may be preceded by an expiry opcode
 * in one of two fixed-width forms. Only the string value type is in
 * scope.
 */

use crate::storage::Keyspace;
use log::debug;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File magic preceding the 4-byte ASCII version
const MAGIC: &[u8; 5] = b"REDIS";

// Section/record opcodes of the RDB format.
const OP_AUX: u8 = 0xFA;
const OP_RESIZEDB: u8 = 0xFB;
const OP_EXPIRETIME_MS: u8 = 0xFC;
const OP_EXPIRETIME_S: u8 = 0xFD;
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;

/// Value-type byte for a plain string pair
const TYPE_STRING: u8 = 0x00;

/// Everything that can go wrong while reading a snapshot
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("snapshot header does not carry the RDB magic marker")]
    BadMagic,
    #[error("unexpected end of snapshot stream")]
    UnexpectedEof,
    #[error("unsupported length encoding byte 0x{0:02x}")]
    UnsupportedEncoding(u8),
    #[error("unsupported value type 0x{0:02x}")]
    UnsupportedValueType(u8),
}

/// Parse a snapshot file and populate the store from it
///
/// Returns the number of keys installed. Installation happens pair by
/// pair as the stream is decoded: on failure partway through, keys
/// already installed remain (no rollback) and the error is returned for
/// the caller to log. A decoded expiry already in the past is still
/// installed; lazy expiry treats it as absent from the first read on.
pub fn load_file(path: &Path, store: &Keyspace) -> Result<usize, SnapshotError> {
    let bytes = fs::read(path)?;
    let mut r = Reader::new(&bytes);

    read_header(&mut r)?;

    let mut installed = 0usize;
    let mut pending_expiry: Option<u64> = None;

    loop {
        // A stream that stops cleanly between records is taken as the end
        // of the database section; truncation inside a record is not.
        let op = match r.read_u8() {
            Ok(b) => b,
            Err(SnapshotError::UnexpectedEof) => break,
            Err(e) => return Err(e),
        };

        match op {
            OP_EOF => break,
            OP_AUX => {
                // Auxiliary metadata: two strings we have no use for.
                let _name = r.read_string()?;
                let _value = r.read_string()?;
            }
            OP_SELECTDB => {
                r.read_length()?;
            }
            OP_RESIZEDB => {
                // Hash-table size hints for the keyspace and expiry table.
                r.read_length()?;
                r.read_length()?;
            }
            OP_EXPIRETIME_MS => {
                pending_expiry = Some(r.read_u64_le()?);
            }
            OP_EXPIRETIME_S => {
                pending_expiry = Some(u64::from(r.read_u32_le()?) * 1000);
            }
            TYPE_STRING => {
                let key = r.read_string()?;
                let value = r.read_string()?;
                match pending_expiry.take() {
                    Some(deadline) => store.set_with_deadline(key, value, deadline),
                    None => store.set(key, value),
                }
                installed += 1;
            }
            other => return Err(SnapshotError::UnsupportedValueType(other)),
        }
    }

    Ok(installed)
}

fn read_header(r: &mut Reader) -> Result<(), SnapshotError> {
    let magic = r.take(MAGIC.len()).map_err(|_| SnapshotError::BadMagic)?;
    if magic != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = r.take(4).map_err(|_| SnapshotError::BadMagic)?;
    debug!("snapshot format version {}", String::from_utf8_lossy(version));
    Ok(())
}

/// Cursor over the raw snapshot bytes with the primitive readers the
/// format needs
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(SnapshotError::UnexpectedEof)?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32_le(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64_le(&mut self) -> Result<u64, SnapshotError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    /// Decode the RDB length encoding
    ///
    /// The top two bits of the first byte select the form: 6-bit inline,
    /// 14-bit over two bytes, or an explicit 32-bit length. The fourth
    /// form (special string encodings) is out of scope here.
    fn read_length(&mut self) -> Result<u64, SnapshotError> {
        let first = self.read_u8()?;
        match first >> 6 {
            0b00 => Ok(u64::from(first & 0x3F)),
            0b01 => {
                let second = self.read_u8()?;
                Ok((u64::from(first & 0x3F) << 8) | u64::from(second))
            }
            0b10 => Ok(u64::from(self.read_u32_le()?)),
            _ => Err(SnapshotError::UnsupportedEncoding(first)),
        }
    }

    /// Read a length-prefixed string
    fn read_string(&mut self) -> Result<String, SnapshotError> {
        let len = self.read_length()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
