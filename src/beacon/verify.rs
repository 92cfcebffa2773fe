// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Reveal verification against a prior commitment (spec §4.I). Grounded on
//! `examples/original_source/randomness/commit_reveal/verify.py`, with the
//! `hmac.compare_digest` constant-time check replaced by
//! [`crate::hashing::ct_eq`].

use crate::hashing::ct_eq;

use super::commit::build_commitment;
use super::errors::BeaconError;

/// A validated reveal: the opening of a prior [`super::commit::CommitRecord`]
/// (spec §3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealRecord {
    pub round: u64,
    pub participant: Vec<u8>,
    pub salt: Vec<u8>,
    pub payload: Vec<u8>,
}

/// Recompute the commitment from `(addr, salt, payload, domain_tag)` and
/// compare to `commitment` in constant time (spec §4.I).
pub fn verify_reveal(
    commitment: &[u8; 32],
    addr: &[u8],
    salt: &[u8],
    payload: &[u8],
    domain_tag: Option<&str>,
) -> Result<(), BeaconError> {
    let expected = build_commitment(addr, salt, payload, domain_tag)
        .map_err(|e| BeaconError::BadReveal {
            round: 0,
            reason: e.to_string(),
        })?;
    if ct_eq(&expected, commitment) {
        Ok(())
    } else {
        Err(BeaconError::BadReveal {
            round: 0,
            reason: "reveal does not match prior commitment".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon::commit::build_commitment;

    /// Commitment roundtrip invariant (spec §8): for all (addr, salt,
    /// payload, domain), verifying a freshly built commitment succeeds, and
    /// flipping any byte fails.
    #[test]
    fn commitment_roundtrip_and_byte_flip() {
        let addr = vec![1u8; 20];
        let salt = vec![2u8; 16];
        let payload = b"hello".to_vec();
        let c = build_commitment(&addr, &salt, &payload, None).unwrap();

        assert!(verify_reveal(&c, &addr, &salt, &payload, None).is_ok());

        let mut bad_addr = addr.clone();
        bad_addr[0] ^= 1;
        assert!(verify_reveal(&c, &bad_addr, &salt, &payload, None).is_err());

        let mut bad_commit = c;
        bad_commit[0] ^= 1;
        assert!(verify_reveal(&bad_commit, &addr, &salt, &payload, None).is_err());
    }
}
