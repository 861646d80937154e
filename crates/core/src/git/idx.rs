//! Pack index (`.idx`) reader, v2 layout.
//!
//! A v2 index is: a magic/version header, a 256-entry cumulative fanout
//! table keyed by the first id byte, the sorted 20-byte object names, a
//! CRC32 table, a 32-bit offset table, and an optional 64-bit offset table
//! for entries past 2 GiB. All integers are network byte order.

use std::path::Path;

use crate::error::{GitHeightError, Result};
use crate::git::ObjectId;

const MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
const HEADER_LEN: usize = 8;
const FANOUT_LEN: usize = 256 * 4;
const TRAILER_LEN: usize = 40; // pack checksum + index checksum

/// An open pack index, held as one owned buffer.
pub struct PackIndex {
    data: Vec<u8>,
    count: usize,
}

impl PackIndex {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    fn parse(data: Vec<u8>) -> Result<Self> {
        if data.len() < HEADER_LEN + FANOUT_LEN + TRAILER_LEN {
            return Err(GitHeightError::malformed("pack index", "file too short"));
        }
        if data[..4] != MAGIC {
            return Err(GitHeightError::malformed("pack index", "bad magic"));
        }
        let version = read_u32(&data, 4);
        if version != 2 {
            return Err(GitHeightError::malformed(
                "pack index",
                format!("unsupported version {version}"),
            ));
        }

        let count = read_u32(&data, HEADER_LEN + 255 * 4) as usize;
        let fixed = HEADER_LEN + FANOUT_LEN + count * (20 + 4 + 4) + TRAILER_LEN;
        if data.len() < fixed {
            return Err(GitHeightError::malformed(
                "pack index",
                "tables truncated against fanout count",
            ));
        }

        let index = PackIndex { data, count };
        for bucket in 1..256 {
            if index.fanout(bucket - 1) > index.fanout(bucket) {
                return Err(GitHeightError::malformed(
                    "pack index",
                    "fanout table not monotonic",
                ));
            }
        }
        Ok(index)
    }

    pub fn object_count(&self) -> usize {
        self.count
    }

    fn fanout(&self, bucket: usize) -> u32 {
        read_u32(&self.data, HEADER_LEN + bucket * 4)
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let start = HEADER_LEN + FANOUT_LEN + index * 20;
        &self.data[start..start + 20]
    }

    /// The object id at a given table position (sorted order).
    pub fn oid_at(&self, index: usize) -> ObjectId {
        ObjectId::from_bytes(self.name_at(index)).expect("index slice is 20 bytes")
    }

    fn offset_at(&self, index: usize) -> Result<u64> {
        let offsets_start = HEADER_LEN + FANOUT_LEN + self.count * 24;
        let raw = read_u32(&self.data, offsets_start + index * 4);
        if raw & 0x8000_0000 == 0 {
            return Ok(raw as u64);
        }
        // Offsets of 2 GiB or more indirect into the 64-bit table.
        let large_index = (raw & 0x7fff_ffff) as usize;
        let large_start = offsets_start + self.count * 4 + large_index * 8;
        if large_start + 8 > self.data.len() - TRAILER_LEN {
            return Err(GitHeightError::malformed(
                "pack index",
                "64-bit offset table truncated",
            ));
        }
        Ok(read_u64(&self.data, large_start))
    }

    /// Locate an object id, returning its pack-local offset.
    pub fn lookup(&self, id: &ObjectId) -> Result<Option<u64>> {
        let bucket = id.first_byte() as usize;
        let lo = if bucket == 0 { 0 } else { self.fanout(bucket - 1) as usize };
        let hi = self.fanout(bucket) as usize;

        let target = id.as_bytes().as_slice();
        let mut lo = lo;
        let mut hi = hi;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.name_at(mid).cmp(target) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Some(self.offset_at(mid)?)),
            }
        }
        Ok(None)
    }

    /// First table position whose name is `>=` the bound.
    fn lower_bound(&self, bound: &[u8; 20]) -> usize {
        let mut lo = 0usize;
        let mut hi = self.count;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.name_at(mid) < bound.as_slice() {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Count ids matching a hex prefix, stopping once `limit` is reached.
    /// Used for unique-abbreviation probing, where only 0, 1, or "more than
    /// one" are distinguished.
    pub fn prefix_match_count(&self, prefix: &str, limit: usize) -> usize {
        let (lo, hi) = match prefix_bounds(prefix) {
            Some(bounds) => bounds,
            None => return 0,
        };
        let start = self.lower_bound(&lo);
        let mut matched = 0;
        for index in start..self.count {
            if self.name_at(index) > hi.as_slice() {
                break;
            }
            matched += 1;
            if matched >= limit {
                break;
            }
        }
        matched
    }

    /// Collect up to `limit` ids matching a hex prefix.
    pub fn prefix_matches(&self, prefix: &str, limit: usize) -> Vec<ObjectId> {
        let (lo, hi) = match prefix_bounds(prefix) {
            Some(bounds) => bounds,
            None => return Vec::new(),
        };
        let mut matches = Vec::new();
        for index in self.lower_bound(&lo)..self.count {
            if self.name_at(index) > hi.as_slice() || matches.len() >= limit {
                break;
            }
            matches.push(self.oid_at(index));
        }
        matches
    }
}

/// Inclusive byte bounds covering every id with the given hex prefix.
pub(crate) fn prefix_bounds(prefix: &str) -> Option<([u8; 20], [u8; 20])> {
    if prefix.is_empty()
        || prefix.len() > 40
        || !prefix.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }
    let mut lo_hex = prefix.to_ascii_lowercase();
    let mut hi_hex = lo_hex.clone();
    while lo_hex.len() < 40 {
        lo_hex.push('0');
        hi_hex.push('f');
    }
    let mut lo = [0u8; 20];
    let mut hi = [0u8; 20];
    hex::decode_to_slice(&lo_hex, &mut lo).ok()?;
    hex::decode_to_slice(&hi_hex, &mut hi).ok()?;
    Some((lo, hi))
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(data[offset..offset + 4].try_into().expect("4-byte slice"))
}

fn read_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(data[offset..offset + 8].try_into().expect("8-byte slice"))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a v2 index over the given (id, offset) pairs.
    fn build_index(mut entries: Vec<(ObjectId, u64)>) -> Vec<u8> {
        entries.sort_by_key(|(id, _)| *id.as_bytes());

        let mut data = Vec::new();
        data.extend(MAGIC);
        data.extend(2u32.to_be_bytes());

        let mut cumulative = 0u32;
        for bucket in 0..256u16 {
            cumulative += entries
                .iter()
                .filter(|(id, _)| id.first_byte() as u16 == bucket)
                .count() as u32;
            data.extend(cumulative.to_be_bytes());
        }
        for (id, _) in &entries {
            data.extend(id.as_bytes());
        }
        for _ in &entries {
            data.extend(0u32.to_be_bytes()); // CRCs are not read
        }
        let mut large = Vec::new();
        for (_, offset) in &entries {
            if *offset < 0x8000_0000 {
                data.extend((*offset as u32).to_be_bytes());
            } else {
                data.extend((0x8000_0000u32 | large.len() as u32).to_be_bytes());
                large.push(*offset);
            }
        }
        for offset in large {
            data.extend(offset.to_be_bytes());
        }
        data.extend([0u8; TRAILER_LEN]);
        data
    }

    fn oid(hex40: &str) -> ObjectId {
        ObjectId::from_hex(hex40).unwrap()
    }

    fn sample_entries() -> Vec<(ObjectId, u64)> {
        vec![
            (oid("00a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3"), 12),
            (oid("4e912736c27e40b389904d046dc63dc9f578117f"), 451),
            (oid("4e91ffffc27e40b389904d046dc63dc9f578117f"), 902),
            (oid("ff00000000000000000000000000000000000001"), 0x9_0000_0000),
        ]
    }

    #[test]
    fn lookup_finds_each_entry() {
        let index = PackIndex::parse(build_index(sample_entries())).unwrap();
        assert_eq!(index.object_count(), 4);
        for (id, offset) in sample_entries() {
            assert_eq!(index.lookup(&id).unwrap(), Some(offset));
        }
    }

    #[test]
    fn lookup_misses_absent_ids() {
        let index = PackIndex::parse(build_index(sample_entries())).unwrap();
        let absent = oid("4e91273600000000000000000000000000000000");
        assert_eq!(index.lookup(&absent).unwrap(), None);
    }

    #[test]
    fn large_offsets_indirect_through_the_64_bit_table() {
        let index = PackIndex::parse(build_index(sample_entries())).unwrap();
        let big = oid("ff00000000000000000000000000000000000001");
        assert_eq!(index.lookup(&big).unwrap(), Some(0x9_0000_0000));
    }

    #[test]
    fn prefix_counting_distinguishes_unique_and_ambiguous() {
        let index = PackIndex::parse(build_index(sample_entries())).unwrap();
        assert_eq!(index.prefix_match_count("4e91", 2), 2);
        assert_eq!(index.prefix_match_count("4e9127", 2), 1);
        assert_eq!(index.prefix_match_count("ab", 2), 0);
        assert_eq!(index.prefix_matches("4e91", 8).len(), 2);
        assert_eq!(
            index.prefix_matches("4e9127", 8),
            vec![oid("4e912736c27e40b389904d046dc63dc9f578117f")]
        );
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut data = build_index(sample_entries());
        data[0] = b'P';
        assert!(PackIndex::parse(data).is_err());
    }
}
