//! Content fingerprints.
//!
//! A fingerprint is the BLAKE3 digest of a byte stream, hex-encoded. BLAKE3
//! hashes its input as a tree over fixed 1 KiB leaf chunks with a 32 byte
//! digest, so the same bytes always produce the same fingerprint regardless
//! of how the stream was buffered. The same digest is used for individual
//! file contents and for the aggregate identity of an ordered entry
//! collection.

use hex::FromHexError;
use std::error::Error;
use std::fmt;

/// Size in bytes of a decoded fingerprint.
pub const DIGEST_SIZE: usize = 32;

/// A validated content fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint(pub [u8; DIGEST_SIZE]);

impl Fingerprint {
    /// Fingerprints a complete in-memory byte stream.
    pub fn digest(bytes: &[u8]) -> Self {
        Fingerprint(*blake3::hash(bytes).as_bytes())
    }

    /// Parses the hex rendering of a fingerprint.
    pub fn from_hex(s: &str) -> Result<Self, FingerprintError> {
        let raw = hex::decode(s).map_err(FingerprintError::BadHex)?;
        let digest: [u8; DIGEST_SIZE] = raw
            .as_slice()
            .try_into()
            .map_err(|_| FingerprintError::BadLength(raw.len()))?;
        Ok(Fingerprint(digest))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Computes the aggregate fingerprint of an ordered sequence of individual
/// fingerprints.
///
/// The digest is taken over the concatenation of the decoded fingerprints in
/// input order, so it is reproducible bit-for-bit given the same ordered
/// input. Fails on the first malformed fingerprint.
pub fn aggregate<'a, I>(fingerprints: I) -> Result<Fingerprint, FingerprintError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut hasher = blake3::Hasher::new();
    for hex_digest in fingerprints {
        let digest = Fingerprint::from_hex(hex_digest)?;
        hasher.update(&digest.0);
    }
    Ok(Fingerprint(*hasher.finalize().as_bytes()))
}

/// A fingerprint string failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum FingerprintError {
    BadHex(FromHexError),
    BadLength(usize),
}

impl fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadHex(e) => write!(f, "invalid fingerprint: {e}"),
            Self::BadLength(n) => {
                write!(f, "invalid fingerprint: {n} bytes, expected {DIGEST_SIZE}")
            }
        }
    }
}

impl Error for FingerprintError {}

impl From<FromHexError> for FingerprintError {
    fn from(e: FromHexError) -> Self {
        FingerprintError::BadHex(e)
    }
}
