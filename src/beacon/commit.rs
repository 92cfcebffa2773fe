// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Commitment construction for the randomness beacon's commit-reveal (spec
//! §4.I). Grounded on
//! `examples/original_source/randomness/commit_reveal/commit.py`, rebuilt
//! over the shared domain-separated hasher (spec §4.A) instead of ad hoc
//! concatenation.

use crate::hashing::{dhash256, Part};

use super::errors::BeaconError;

pub const MIN_ADDR_LEN: usize = 20;
pub const MAX_ADDR_LEN: usize = 64;
pub const MIN_SALT_LEN: usize = 8;
pub const MAX_SALT_LEN: usize = 128;
pub const MAX_PAYLOAD_LEN: usize = 1 << 20; // 1 MiB

pub const DEFAULT_DOMAIN_TAG: &str = "animica-rand-commit-v1";

/// A round's per-participant commitment record (spec §3): `commit` is
/// exactly 32 bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitRecord {
    pub round: u64,
    pub participant: Vec<u8>,
    pub commitment: [u8; 32],
}

fn validate_sizes(addr: &[u8], salt: &[u8], payload: &[u8], domain_tag: &str) -> Result<(), BeaconError> {
    if !(MIN_ADDR_LEN..=MAX_ADDR_LEN).contains(&addr.len()) {
        return Err(BeaconError::RandError(format!(
            "addr length must be in [{MIN_ADDR_LEN}, {MAX_ADDR_LEN}] bytes, got {}",
            addr.len()
        )));
    }
    if !(MIN_SALT_LEN..=MAX_SALT_LEN).contains(&salt.len()) {
        return Err(BeaconError::RandError(format!(
            "salt length must be in [{MIN_SALT_LEN}, {MAX_SALT_LEN}] bytes, got {}",
            salt.len()
        )));
    }
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(BeaconError::RandError(format!(
            "payload too large (> {MAX_PAYLOAD_LEN} bytes)"
        )));
    }
    if domain_tag.is_empty() {
        return Err(BeaconError::RandError("domain_tag must be non-empty".into()));
    }
    Ok(())
}

/// `C = H(domain_tag || addr || salt || payload)` (spec §4.I), computed via
/// the crate-wide domain-separated TLV hasher so the envelope can never
/// collide with any other subsystem's digest.
pub fn build_commitment(
    addr: &[u8],
    salt: &[u8],
    payload: &[u8],
    domain_tag: Option<&str>,
) -> Result<[u8; 32], BeaconError> {
    let tag = domain_tag.unwrap_or(DEFAULT_DOMAIN_TAG);
    validate_sizes(addr, salt, payload, tag)?;
    Ok(dhash256(
        tag,
        &[Part::Bytes(addr), Part::Bytes(salt), Part::Bytes(payload)],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> Vec<u8> {
        vec![0xAA; 20]
    }
    fn salt() -> Vec<u8> {
        vec![0xBB; 8]
    }

    #[test]
    fn rejects_undersized_addr() {
        assert!(build_commitment(&[0u8; 10], &salt(), b"", None).is_err());
    }

    #[test]
    fn rejects_undersized_salt() {
        assert!(build_commitment(&addr(), &[0u8; 4], b"", None).is_err());
    }

    #[test]
    fn rejects_oversized_payload() {
        let big = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert!(build_commitment(&addr(), &salt(), &big, None).is_err());
    }

    #[test]
    fn is_deterministic_and_domain_bound() {
        let a = build_commitment(&addr(), &salt(), b"payload", None).unwrap();
        let b = build_commitment(&addr(), &salt(), b"payload", None).unwrap();
        assert_eq!(a, b);
        let c = build_commitment(&addr(), &salt(), b"payload", Some("other-domain")).unwrap();
        assert_ne!(a, c);
    }
}
