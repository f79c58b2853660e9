//! Configurable key hashing for the TTL map (spec.md §3 "`hash_fn`: FNV-1a
//! or CRC32 (configurable)").
//!
//! `original_source/common/hash.h` and `common/crc32.h` use wyhash64 and a
//! CRC32 instruction intrinsic respectively; spec.md names FNV-1a and
//! CRC32 as the two configurable options, which is what this module
//! implements — a portable CRC32 table lookup stands in for the hardware
//! instruction.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashKind {
    #[default]
    Fnv1a,
    Crc32,
}

impl HashKind {
    pub fn hash(&self, seed: u32, bytes: &[u8]) -> u32 {
        match self {
            HashKind::Fnv1a => fnv1a(seed, bytes),
            HashKind::Crc32 => crc32(seed, bytes),
        }
    }
}

const FNV_PRIME: u32 = 0x0100_0193;

pub fn fnv1a(seed: u32, bytes: &[u8]) -> u32 {
    let mut hash = seed ^ 0x811c_9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

static CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

pub fn crc32(seed: u32, bytes: &[u8]) -> u32 {
    let mut crc = !seed;
    for &b in bytes {
        let idx = ((crc ^ b as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[idx];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_is_deterministic_and_order_sensitive() {
        assert_eq!(fnv1a(0, b"abc"), fnv1a(0, b"abc"));
        assert_ne!(fnv1a(0, b"abc"), fnv1a(0, b"cba"));
    }

    #[test]
    fn crc32_matches_known_vector() {
        // Standard CRC-32 (IEEE 802.3) of "123456789" is 0xCBF43926.
        assert_eq!(crc32(0, b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn hash_kind_dispatches_to_selected_algorithm() {
        assert_eq!(HashKind::Fnv1a.hash(0, b"x"), fnv1a(0, b"x"));
        assert_eq!(HashKind::Crc32.hash(0, b"x"), crc32(0, b"x"));
    }
}
