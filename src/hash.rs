//! Content hashing for version payloads.
//!
//! The hash is always computed over a fully assembled payload, never per
//! transferred chunk, so it does not depend on how a sender fragments a stream.

use sha2::{Digest, Sha256};

/// Compute the lowercase hex-encoded SHA-256 digest of `data`.
pub fn compute_sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_payload_hash() {
        assert_eq!(
            compute_sha256_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_known_payload_hash() {
        assert_eq!(
            compute_sha256_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_independent_of_assembly() {
        let whole: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut assembled = Vec::new();
        for chunk in whole.chunks(333) {
            assembled.extend_from_slice(chunk);
        }
        assert_eq!(compute_sha256_hash(&whole), compute_sha256_hash(&assembled));
    }
}
