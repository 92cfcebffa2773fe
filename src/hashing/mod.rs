// Copyright 2020 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Domain-separated hashing and TLV framing shared by the mempool and beacon
//! cores (spec §4.A). Every cross-subsystem digest goes through [`dhash256`]
//! or [`dhash512`] so that independent contexts (commitments, VDF
//! transcripts, beacon chaining, ...) can never collide by construction.
//!
//! Envelope: `H(PREFIX || u32_be(len(tag)) || tag || '|' || framed_inputs)`
//! where `framed_inputs` is the concatenation of TLV-encoded [`Part`]s, each
//! `type_tag(1B) || u32_be(len) || payload` (bool and none are lengthless).

use sha3::{Digest, Sha3_256, Sha3_512};

/// Static prefix for every domain-separated hash produced by this crate.
pub const DOMAIN_PREFIX: &[u8] = b"ledger-core|";

const TT_BYTES: u8 = 0x01;
const TT_STR: u8 = 0x02;
const TT_INT: u8 = 0x03;
const TT_BOOL: u8 = 0x04;
const TT_SEQ: u8 = 0x05;
const TT_NONE: u8 = 0x06;

/// A single TLV-framable input to a domain-separated hash.
#[derive(Clone, Debug)]
pub enum Part<'a> {
    Bytes(&'a [u8]),
    Str(&'a str),
    Int(u64),
    Bool(bool),
    Seq(Vec<Part<'a>>),
    None,
}

impl<'a> From<&'a [u8]> for Part<'a> {
    fn from(v: &'a [u8]) -> Self {
        Part::Bytes(v)
    }
}

impl<'a> From<&'a str> for Part<'a> {
    fn from(v: &'a str) -> Self {
        Part::Str(v)
    }
}

impl From<u64> for Part<'_> {
    fn from(v: u64) -> Self {
        Part::Int(v)
    }
}

impl From<bool> for Part<'_> {
    fn from(v: bool) -> Self {
        Part::Bool(v)
    }
}

fn encode_one(out: &mut Vec<u8>, part: &Part<'_>) {
    match part {
        Part::None => out.push(TT_NONE),
        Part::Bytes(b) => {
            out.push(TT_BYTES);
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(b);
        }
        Part::Str(s) => {
            out.push(TT_STR);
            let b = s.as_bytes();
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(b);
        }
        Part::Int(i) => {
            out.push(TT_INT);
            let b = i.to_be_bytes();
            out.extend_from_slice(&(b.len() as u32).to_be_bytes());
            out.extend_from_slice(&b);
        }
        Part::Bool(v) => {
            out.push(TT_BOOL);
            out.push(if *v { 1 } else { 0 });
        }
        Part::Seq(items) => {
            out.push(TT_SEQ);
            let mut inner = Vec::new();
            for p in items {
                encode_one(&mut inner, p);
            }
            out.extend_from_slice(&(inner.len() as u32).to_be_bytes());
            out.extend_from_slice(&inner);
        }
    }
}

/// Frame a sequence of [`Part`]s into the TLV byte string used by
/// [`dhash256`]/[`dhash512`].
pub fn frame_parts(parts: &[Part<'_>]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in parts {
        encode_one(&mut out, p);
    }
    out
}

fn domain_prefix(tag: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(DOMAIN_PREFIX.len() + 4 + tag.len() + 1);
    out.extend_from_slice(DOMAIN_PREFIX);
    out.extend_from_slice(&(tag.len() as u32).to_be_bytes());
    out.extend_from_slice(tag.as_bytes());
    out.push(b'|');
    out
}

/// Domain-separated SHA3-256 over `parts`, tagged with `tag`.
pub fn dhash256(tag: &str, parts: &[Part<'_>]) -> [u8; 32] {
    let mut h = Sha3_256::new();
    h.update(domain_prefix(tag));
    h.update(frame_parts(parts));
    h.finalize().into()
}

/// Domain-separated SHA3-512 over `parts`, tagged with `tag`.
pub fn dhash512(tag: &str, parts: &[Part<'_>]) -> [u8; 64] {
    let mut h = Sha3_512::new();
    h.update(domain_prefix(tag));
    h.update(frame_parts(parts));
    h.finalize().into()
}

/// Plain (non domain-separated) SHA3-256, for call sites that already embed
/// their own framing (e.g. re-hashing a previously domain-tagged digest).
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    Sha3_256::digest(data).into()
}

/// Plain SHA3-512.
pub fn sha3_512(data: &[u8]) -> [u8; 64] {
    Sha3_512::digest(data).into()
}

/// A streaming, domain-separated absorber, used by the VDF challenge-prime
/// derivation and beacon mix transcript so multi-field inputs don't need an
/// intermediate `Vec<Part>` allocation at every call site.
pub struct Transcript {
    hasher: Sha3_256,
}

impl Transcript {
    pub fn new(tag: &str) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(domain_prefix(tag));
        hasher.update(b"transcript|");
        Self { hasher }
    }

    pub fn absorb(&mut self, label: &str, parts: &[Part<'_>]) -> &mut Self {
        self.hasher
            .update((label.len() as u32).to_be_bytes());
        self.hasher.update(label.as_bytes());
        self.hasher.update(frame_parts(parts));
        self
    }

    pub fn digest(&self) -> [u8; 32] {
        self.hasher.clone().finalize().into()
    }

    /// Derive a labelled challenge without mutating the transcript's state.
    pub fn challenge(&self, label: &str, parts: &[Part<'_>]) -> [u8; 32] {
        let mut h = self.hasher.clone();
        h.update(b"chal|");
        h.update((label.len() as u32).to_be_bytes());
        h.update(label.as_bytes());
        h.update(frame_parts(parts));
        h.finalize().into()
    }
}

/// Constant-time equality for digests and commitments. Loops over the full
/// length and accumulates via XOR so no early return leaks timing.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}
