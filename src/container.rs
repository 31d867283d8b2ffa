//! Framed on-disk container.
//!
//! ```text
//! [signature:2][ruleLanguageVersion:i32][uncompressedSize:i32][payload]
//! ```
//!
//! The payload is the zlib-compressed data, optionally encrypted with
//! [`crate::crypto`]. The signature tells compiled bytecode (`CR`) apart
//! from raw rule text (`CT`).

use crate::config::ContainerOptions;
use crate::crypto;
use crate::error::ContainerError;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub const HEADER_LEN: usize = 10;

/// What a container holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Serialized [`crate::CompiledRules`].
    Compiled,
    /// Rule source text, stored without compiling.
    Text,
}

impl PayloadKind {
    pub fn signature(self) -> [u8; 2] {
        match self {
            PayloadKind::Compiled => *b"CR",
            PayloadKind::Text => *b"CT",
        }
    }

    pub fn from_signature(signature: [u8; 2]) -> Option<Self> {
        match &signature {
            b"CR" => Some(PayloadKind::Compiled),
            b"CT" => Some(PayloadKind::Text),
            _ => None,
        }
    }
}

/// Decoded container contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unpacked {
    pub kind: PayloadKind,
    pub rule_version: i32,
    pub data: Vec<u8>,
}

/// Compress, optionally encrypt, and frame `data`.
///
/// # Examples
///
/// ```rust
/// use config_rules::config::ContainerOptions;
/// use config_rules::container::{pack, unpack, PayloadKind};
///
/// let framed = pack(b"hello", PayloadKind::Text, 4, None, &ContainerOptions::default())?;
/// assert_eq!(&framed[..2], b"CT");
///
/// let unpacked = unpack(&framed, None)?;
/// assert_eq!(unpacked.rule_version, 4);
/// assert_eq!(unpacked.data, b"hello");
/// # Ok::<(), config_rules::error::ContainerError>(())
/// ```
pub fn pack(
    data: &[u8],
    kind: PayloadKind,
    rule_version: i32,
    password: Option<&str>,
    options: &ContainerOptions,
) -> Result<Vec<u8>, ContainerError> {
    let size =
        i32::try_from(data.len()).map_err(|_| ContainerError::InvalidSize(data.len() as i64))?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(options.compression_level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| ContainerError::Compression(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ContainerError::Compression(e.to_string()))?;

    let payload = match password {
        Some(password) => crypto::encrypt(&compressed, password)?,
        None => compressed,
    };
    log::debug!(
        "packed {} bytes into {} ({}, encrypted: {})",
        data.len(),
        payload.len(),
        String::from_utf8_lossy(&kind.signature()),
        password.is_some()
    );

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&kind.signature());
    out.extend_from_slice(&rule_version.to_be_bytes());
    out.extend_from_slice(&size.to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Reverse [`pack`]. The password must match the one used to pack.
pub fn unpack(bytes: &[u8], password: Option<&str>) -> Result<Unpacked, ContainerError> {
    if bytes.len() < HEADER_LEN {
        return Err(ContainerError::TooShort(bytes.len()));
    }
    let signature = [bytes[0], bytes[1]];
    let kind =
        PayloadKind::from_signature(signature).ok_or(ContainerError::BadSignature(signature))?;
    let rule_version = i32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]);
    let declared = i32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let expected =
        usize::try_from(declared).map_err(|_| ContainerError::InvalidSize(declared as i64))?;

    let payload = &bytes[HEADER_LEN..];
    let decrypted;
    let compressed = match password {
        Some(password) => {
            decrypted = crypto::decrypt(payload, password)?;
            decrypted.as_slice()
        }
        None => payload,
    };

    // Read one byte past the declared size so oversized data is detected
    // without inflating all of it. The declared size is untrusted, so the
    // initial allocation is bounded by the payload actually present.
    let mut data = Vec::with_capacity(expected.min(compressed.len().saturating_mul(4)));
    ZlibDecoder::new(compressed)
        .take(expected as u64 + 1)
        .read_to_end(&mut data)
        .map_err(|e| ContainerError::Decompression(e.to_string()))?;
    if data.len() != expected {
        return Err(ContainerError::SizeMismatch {
            expected,
            actual: data.len(),
        });
    }

    Ok(Unpacked {
        kind,
        rule_version,
        data,
    })
}
