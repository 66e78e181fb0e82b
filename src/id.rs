//! Ordered unique identifiers for diamonds, splits, generations and bundles.
//!
//! Ids are 16 bytes: the leading 8 bytes are the big-endian milliseconds
//! since the Unix epoch, the trailing 8 bytes are random. Hex-encoded, the
//! lexical order of two ids follows their creation order, which gives
//! listings a reproducible chronological ordering and provides the tie-break
//! used when merging splits.

use rand::{thread_rng, RngCore};
use std::time::{SystemTime, UNIX_EPOCH};

/// Length of the hex rendering of an id.
pub const ORDID_LEN: usize = 32;

/// Mints a new time-ordered unique id.
pub fn ordid() -> String {
    let now_in_sys = SystemTime::now();
    let now_since_epoch = now_in_sys
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards");
    let now_in_ms = now_since_epoch.as_millis() as u64;

    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&now_in_ms.to_be_bytes());
    thread_rng().fill_bytes(&mut id[8..16]);

    hex::encode(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique() {
        assert!(ordid() != ordid());
    }

    #[test]
    fn chronological() {
        let a = ordid();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = ordid();
        assert!(a < b);
    }

    #[test]
    fn fixed_width() {
        assert_eq!(ordid().len(), ORDID_LEN);
    }
}
