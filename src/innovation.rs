//! Hash-based structural identity for edges and topologies.
//!
//! Species are told apart by handle, but log lines and topology re-sharing
//! after deserialization need a stable way to say "this is the same wiring".
//! The fingerprint is a diagnostic identity, not a structural key: equal
//! fingerprints are confirmed by comparing topologies. Edges hash to
//! `Hash(source, target)` and a topology hashes its row layout plus its
//! sorted edge innovations, so two independently built but identical
//! topologies share a fingerprint.

use std::hash::{Hash, Hasher};

use crate::gene::EdgeGene;

/// Marker mixed into row-layout hashing to separate it from edge hashing.
const ROW_MARKER: u64 = 0xDEAD_BEEF_CAFE_BABE;

/// A deterministic hasher with FxHash-style multiplication and a
/// murmur-style finalizer.
#[derive(Default)]
struct InnovationHasher {
    state: u64,
}

impl Hasher for InnovationHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state = self
                .state
                .wrapping_mul(0x517c_c1b7_2722_0a95)
                .wrapping_add(u64::from(byte));
        }
    }

    #[inline]
    fn finish(&self) -> u64 {
        let mut h = self.state;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h ^= h >> 33;
        h
    }
}

/// Compute a deterministic innovation number for an edge.
#[inline]
#[must_use]
pub fn edge_innovation(edge: EdgeGene) -> u64 {
    let mut hasher = InnovationHasher::default();
    (edge.source as u64).hash(&mut hasher);
    (edge.target as u64).hash(&mut hasher);
    hasher.finish()
}

/// Compute a fingerprint for a row layout and edge set.
///
/// Edge order does not matter; row sizes and their order do.
#[must_use]
pub fn topology_fingerprint(row_sizes: &[usize], edges: &[EdgeGene]) -> u64 {
    let mut innovations: Vec<u64> = edges.iter().map(|&e| edge_innovation(e)).collect();
    innovations.sort_unstable();

    let mut hasher = InnovationHasher::default();
    ROW_MARKER.hash(&mut hasher);
    for &size in row_sizes {
        (size as u64).hash(&mut hasher);
    }
    for innovation in innovations {
        innovation.hash(&mut hasher);
    }
    hasher.finish()
}
