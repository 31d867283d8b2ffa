//! String interning table shared by every instruction of a compiled file.
//!
//! Serialized as `[count:u16][blobLength:u16][offsets:u16*count][lengths:u16*count][blob]`.

use crate::error::{CompileErrorKind, DecompileError};
use crate::ir::ByteReader;
use std::collections::HashMap;

pub type StringIndex = u16;

/// Deduplicated table of `(offset, length)` records over one byte blob.
///
/// Indices are assigned in first-seen order starting at zero.
///
/// # Examples
///
/// ```rust
/// use config_rules::StringTable;
///
/// let mut table = StringTable::new();
/// let a = table.intern("SRC_DeviceMake")?;
/// let b = table.intern("Samsung")?;
/// assert_eq!(table.intern("SRC_DeviceMake")?, a);
/// assert_eq!((a, b), (0, 1));
/// assert_eq!(table.get(b)?, "Samsung");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    index: HashMap<String, StringIndex>,
    offsets: Vec<u16>,
    lengths: Vec<u16>,
    blob: Vec<u8>,
}

impl StringTable {
    pub const MAX_STRINGS: usize = u16::MAX as usize;
    pub const MAX_STRING_LEN: usize = u16::MAX as usize;
    pub const MAX_BLOB_LEN: usize = u16::MAX as usize;

    pub fn new() -> Self {
        Self::default()
    }

    /// Return the index of `value`, appending it on first sight.
    pub fn intern(&mut self, value: &str) -> Result<StringIndex, CompileErrorKind> {
        if let Some(&existing) = self.index.get(value) {
            return Ok(existing);
        }

        if self.offsets.len() >= Self::MAX_STRINGS {
            return Err(CompileErrorKind::TooManyStrings);
        }
        if value.len() > Self::MAX_STRING_LEN {
            return Err(CompileErrorKind::StringTooLong(value.len()));
        }
        if self.blob.len() + value.len() > Self::MAX_BLOB_LEN {
            return Err(CompileErrorKind::StringBlobTooLarge);
        }

        let new_index = self.offsets.len() as StringIndex;
        self.offsets.push(self.blob.len() as u16);
        self.lengths.push(value.len() as u16);
        self.blob.extend_from_slice(value.as_bytes());
        self.index.insert(value.to_string(), new_index);
        Ok(new_index)
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn blob_len(&self) -> usize {
        self.blob.len()
    }

    pub fn get(&self, index: StringIndex) -> Result<&str, DecompileError> {
        let slot = index as usize;
        if slot >= self.offsets.len() {
            return Err(DecompileError::StringIndexOutOfRange {
                index,
                count: self.offsets.len(),
            });
        }
        let start = self.offsets[slot] as usize;
        let end = start + self.lengths[slot] as usize;
        self.blob
            .get(start..end)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .ok_or(DecompileError::InvalidUtf8(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<&str, DecompileError>> + '_ {
        (0..self.offsets.len()).map(|slot| self.get(slot as StringIndex))
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.offsets.len() as u16).to_be_bytes());
        out.extend_from_slice(&(self.blob.len() as u16).to_be_bytes());
        for offset in &self.offsets {
            out.extend_from_slice(&offset.to_be_bytes());
        }
        for length in &self.lengths {
            out.extend_from_slice(&length.to_be_bytes());
        }
        out.extend_from_slice(&self.blob);
    }

    /// Read a serialized table, validating every record against the blob.
    pub fn read_from(reader: &mut ByteReader<'_>) -> Result<Self, DecompileError> {
        let count = reader.read_u16()? as usize;
        let blob_len = reader.read_u16()? as usize;

        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(reader.read_u16()?);
        }
        let mut lengths = Vec::with_capacity(count);
        for _ in 0..count {
            lengths.push(reader.read_u16()?);
        }
        let blob = reader.read_bytes(blob_len)?.to_vec();

        let mut table = Self {
            index: HashMap::with_capacity(count),
            offsets,
            lengths,
            blob,
        };

        for slot in 0..count {
            let index = slot as StringIndex;
            let start = table.offsets[slot] as usize;
            let end = start + table.lengths[slot] as usize;
            if end > table.blob.len() {
                return Err(DecompileError::StringIndexOutOfRange {
                    index,
                    count: table.blob.len(),
                });
            }
            let value = table.get(index)?.to_string();
            table.index.entry(value).or_insert(index);
        }

        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_idempotent() {
        let mut table = StringTable::new();
        let first = table.intern("r.MobileHDR").unwrap();
        let blob_len = table.blob_len();

        assert_eq!(table.intern("r.MobileHDR").unwrap(), first);
        assert_eq!(table.len(), 1);
        assert_eq!(table.blob_len(), blob_len);
    }

    #[test]
    fn test_first_seen_order() {
        let mut table = StringTable::new();
        let values = ["c", "a", "b", "a", "c", "d"];
        let indices: Vec<_> = values.iter().map(|v| table.intern(v).unwrap()).collect();

        assert_eq!(indices, vec![0, 1, 2, 1, 0, 3]);
        assert_eq!(table.len(), 4);
        let stored: Vec<_> = table.iter().map(|s| s.unwrap().to_string()).collect();
        assert_eq!(stored, vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn test_exact_byte_equality() {
        let mut table = StringTable::new();
        let lower = table.intern("adreno").unwrap();
        let upper = table.intern("Adreno").unwrap();
        let empty = table.intern("").unwrap();
        assert_ne!(lower, upper);
        assert_eq!(table.get(empty).unwrap(), "");
    }

    #[test]
    fn test_blob_capacity() {
        let mut table = StringTable::new();
        let big = "a".repeat(60_000);
        table.intern(&big).unwrap();
        let rest = "b".repeat(StringTable::MAX_BLOB_LEN - 60_000);
        table.intern(&rest).unwrap();
        assert_eq!(table.blob_len(), StringTable::MAX_BLOB_LEN);

        assert_eq!(table.intern("c"), Err(CompileErrorKind::StringBlobTooLarge));
        assert_eq!(table.len(), 2);
        assert_eq!(table.blob_len(), StringTable::MAX_BLOB_LEN);
        // Already interned strings still resolve.
        assert_eq!(table.intern(&big), Ok(0));
    }

    #[test]
    fn test_get_out_of_range() {
        let mut table = StringTable::new();
        table.intern("only").unwrap();
        assert_eq!(
            table.get(1),
            Err(DecompileError::StringIndexOutOfRange { index: 1, count: 1 })
        );
    }

    #[test]
    fn test_string_too_long() {
        let mut table = StringTable::new();
        let long = "x".repeat(StringTable::MAX_STRING_LEN + 1);
        assert_eq!(
            table.intern(&long),
            Err(CompileErrorKind::StringTooLong(long.len()))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_too_many_strings() {
        // 65535 empty records fill the index space without touching the blob.
        let mut table = StringTable::new();
        table.offsets = vec![0; StringTable::MAX_STRINGS];
        table.lengths = vec![0; StringTable::MAX_STRINGS];
        assert_eq!(table.intern("new"), Err(CompileErrorKind::TooManyStrings));
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut table = StringTable::new();
        table.intern("SRC_DeviceModel").unwrap();
        table.intern("SM-G9").unwrap();
        table.intern("").unwrap();

        let mut bytes = Vec::new();
        table.write_to(&mut bytes);
        assert_eq!(&bytes[0..2], &3u16.to_be_bytes());

        let mut reader = ByteReader::new(&bytes);
        let decoded = StringTable::read_from(&mut reader).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_rejects_record_outside_blob() {
        // count=1, blob=2, offset=1, length=5
        let bytes = [0, 1, 0, 2, 0, 1, 0, 5, b'a', b'b'];
        let mut reader = ByteReader::new(&bytes);
        assert!(StringTable::read_from(&mut reader).is_err());
    }
}
