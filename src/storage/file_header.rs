//! Sealed metadata files.
//!
//! Every metadata file (table descriptor, storage-manager index, reference
//! table, saved query) starts with a [`FileHeader`] containing:
//! - a magic number and a [`FileKind`] discriminator
//! - the format version and payload byte order
//! - a CRC32 checksum for integrity

use std::fs;
use std::path::Path;

use crate::common::config::Endian;
use crate::common::{Error, Result};

/// Magic number at the start of every metadata file.
pub const MAGIC: [u8; 4] = *b"TBDB";

/// Type of metadata stored in a file.
///
/// Uses `#[repr(u8)]` to guarantee a 1-byte representation for serialization.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Uninitialized or corrupted file.
    #[default]
    Invalid = 0,
    /// Plain table descriptor.
    Table = 1,
    /// Reference table (row map into a root table).
    RefTable = 2,
    /// Incremental storage manager index.
    IsmIndex = 3,
    /// Saved query syntax tree.
    SyntaxTree = 4,
}

impl FileKind {
    /// Convert from u8, returning Invalid for unknown values.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => FileKind::Table,
            2 => FileKind::RefTable,
            3 => FileKind::IsmIndex,
            4 => FileKind::SyntaxTree,
            _ => FileKind::Invalid,
        }
    }
}

/// Header at the beginning of every metadata file.
///
/// # Layout (24 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     magic "TBDB"
/// 4       1     kind (FileKind as u8)
/// 5       1     endian of the payload
/// 6       2     reserved (zero)
/// 8       4     version
/// 12      4     checksum (CRC32 of the whole file, checksum field zeroed)
/// 16      8     payload length
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub kind: FileKind,
    pub endian: Endian,
    pub version: u32,
    pub checksum: u32,
    pub payload_len: u64,
}

impl FileHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 24;

    pub const OFFSET_KIND: usize = 4;
    pub const OFFSET_ENDIAN: usize = 5;
    pub const OFFSET_VERSION: usize = 8;
    pub const OFFSET_CHECKSUM: usize = 12;
    pub const OFFSET_LEN: usize = 16;

    /// Read a header from the beginning of a byte slice.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::internal("file too small for a metadata header"));
        }
        if data[..4] != MAGIC {
            return Err(Error::internal("bad magic number in metadata file"));
        }
        let endian = Endian::from_u8(data[Self::OFFSET_ENDIAN])
            .ok_or_else(|| Error::internal("invalid endian tag in metadata header"))?;

        let mut word = [0u8; 4];
        word.copy_from_slice(&data[Self::OFFSET_VERSION..Self::OFFSET_VERSION + 4]);
        let version = u32::from_le_bytes(word);
        word.copy_from_slice(&data[Self::OFFSET_CHECKSUM..Self::OFFSET_CHECKSUM + 4]);
        let checksum = u32::from_le_bytes(word);
        let mut long = [0u8; 8];
        long.copy_from_slice(&data[Self::OFFSET_LEN..Self::OFFSET_LEN + 8]);

        Ok(Self {
            kind: FileKind::from_u8(data[Self::OFFSET_KIND]),
            endian,
            version,
            checksum,
            payload_len: u64::from_le_bytes(long),
        })
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < FileHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for FileHeader");

        data[..4].copy_from_slice(&MAGIC);
        data[Self::OFFSET_KIND] = self.kind as u8;
        data[Self::OFFSET_ENDIAN] = self.endian.to_u8();
        data[6] = 0;
        data[7] = 0;
        data[Self::OFFSET_VERSION..Self::OFFSET_VERSION + 4]
            .copy_from_slice(&self.version.to_le_bytes());
        data[Self::OFFSET_CHECKSUM..Self::OFFSET_CHECKSUM + 4]
            .copy_from_slice(&self.checksum.to_le_bytes());
        data[Self::OFFSET_LEN..Self::OFFSET_LEN + 8]
            .copy_from_slice(&self.payload_len.to_le_bytes());
    }

    /// Compute the CRC32 checksum of a sealed file.
    ///
    /// The checksum field itself is hashed as zeros.
    pub fn compute_checksum(file_data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&file_data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&file_data[Self::OFFSET_CHECKSUM + 4..]);
        hasher.finalize()
    }

    /// Verify that the stored checksum matches the computed checksum.
    pub fn verify_checksum(&self, file_data: &[u8]) -> bool {
        self.checksum == Self::compute_checksum(file_data)
    }
}

/// Wrap a payload into a sealed byte image (header + payload).
pub fn seal(kind: FileKind, version: u32, endian: Endian, payload: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; FileHeader::SIZE + payload.len()];
    data[FileHeader::SIZE..].copy_from_slice(payload);

    let mut header = FileHeader {
        kind,
        endian,
        version,
        checksum: 0,
        payload_len: payload.len() as u64,
    };
    header.write_to(&mut data);
    header.checksum = FileHeader::compute_checksum(&data);
    header.write_to(&mut data);
    data
}

/// Validate a sealed byte image and return its header and payload.
///
/// # Errors
/// `StorageInternal` for a bad magic number, a length mismatch or a
/// checksum mismatch.
pub fn unseal(data: &[u8]) -> Result<(FileHeader, &[u8])> {
    let header = FileHeader::from_bytes(data)?;
    let end = FileHeader::SIZE as u64 + header.payload_len;
    if end != data.len() as u64 {
        return Err(Error::internal(format!(
            "metadata length mismatch: header says {} bytes, file has {}",
            end,
            data.len()
        )));
    }
    if !header.verify_checksum(data) {
        return Err(Error::internal("metadata checksum mismatch"));
    }
    Ok((header, &data[FileHeader::SIZE..]))
}

/// Write a sealed file, replacing any previous version atomically.
pub fn write_sealed(
    path: &Path,
    kind: FileKind,
    version: u32,
    endian: Endian,
    payload: &[u8],
) -> Result<()> {
    let data = seal(kind, version, endian, payload);
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read and validate a sealed file.
pub fn read_sealed(path: &Path) -> Result<(FileHeader, Vec<u8>)> {
    let data = fs::read(path)?;
    let (header, payload) = unseal(&data)?;
    Ok((header, payload.to_vec()))
}

/// Read only the kind of a sealed file.
pub fn peek_kind(path: &Path) -> Result<FileKind> {
    let data = fs::read(path)?;
    Ok(FileHeader::from_bytes(&data)?.kind)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_kind_from_u8() {
        assert_eq!(FileKind::from_u8(0), FileKind::Invalid);
        assert_eq!(FileKind::from_u8(1), FileKind::Table);
        assert_eq!(FileKind::from_u8(2), FileKind::RefTable);
        assert_eq!(FileKind::from_u8(3), FileKind::IsmIndex);
        assert_eq!(FileKind::from_u8(4), FileKind::SyntaxTree);
        assert_eq!(FileKind::from_u8(255), FileKind::Invalid);
    }

    #[test]
    fn test_seal_unseal_roundtrip() {
        let sealed = seal(FileKind::RefTable, 3, Endian::Big, b"payload");
        let (header, payload) = unseal(&sealed).unwrap();
        assert_eq!(header.kind, FileKind::RefTable);
        assert_eq!(header.version, 3);
        assert_eq!(header.endian, Endian::Big);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn test_header_byte_layout() {
        let sealed = seal(FileKind::Table, 0x04030201, Endian::Little, &[]);
        assert_eq!(&sealed[..4], b"TBDB");
        assert_eq!(sealed[4], 1);
        assert_eq!(sealed[8], 0x01);
        assert_eq!(sealed[11], 0x04);
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut sealed = seal(FileKind::Table, 1, Endian::Little, b"abc");
        let c1 = FileHeader::compute_checksum(&sealed);
        sealed[12..16].copy_from_slice(&[0xFF; 4]);
        let c2 = FileHeader::compute_checksum(&sealed);
        assert_eq!(c1, c2);
    }

    #[test]
    fn test_corruption_detected() {
        let mut sealed = seal(FileKind::Table, 1, Endian::Little, b"abcdef");
        let last = sealed.len() - 1;
        sealed[last] ^= 0xFF;
        assert!(matches!(unseal(&sealed), Err(Error::StorageInternal(_))));
    }

    #[test]
    fn test_write_read_sealed_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("meta.dat");
        write_sealed(&path, FileKind::IsmIndex, 2, Endian::Little, b"xyz").unwrap();

        let (header, payload) = read_sealed(&path).unwrap();
        assert_eq!(header.kind, FileKind::IsmIndex);
        assert_eq!(payload, b"xyz");
        assert_eq!(peek_kind(&path).unwrap(), FileKind::IsmIndex);
    }
}
