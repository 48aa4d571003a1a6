// Copyright 2025 DistroHop Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A scalable bloom filter used to skip whole key ranges during search.
//!
//! The filter grows by appending partitions: inserts always go to the
//! newest partition, lookups consult every partition. Bits are never
//! cleared, so an inserted key can never produce a false negative. Sizing
//! is ~10 bits per expected key with 7 hash probes, giving a false
//! positive rate below 1%.

use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::error::{Error, Result};

const NUM_HASHES: u32 = 7;
const BITS_PER_KEY: u64 = 10;
const INITIAL_CAPACITY: u64 = 4096;

const MAGIC: [u8; 4] = *b"dhbf";
const VERSION: u8 = 1;

#[derive(Debug, Clone, Default)]
pub struct BloomFilter {
    partitions: Vec<Partition>,
}

#[derive(Debug, Clone)]
struct Partition {
    /// Insert budget; a full partition triggers growth.
    capacity: u64,
    count: u64,
    bits: Vec<u64>,
}

impl Partition {
    fn with_capacity(capacity: u64) -> Self {
        let num_bits = (capacity * BITS_PER_KEY).next_multiple_of(64);
        Partition {
            capacity,
            count: 0,
            bits: vec![0u64; (num_bits / 64) as usize],
        }
    }

    fn num_bits(&self) -> u64 {
        self.bits.len() as u64 * 64
    }

    fn set(&mut self, bit: u64) {
        self.bits[(bit / 64) as usize] |= 1 << (bit % 64);
    }

    fn get(&self, bit: u64) -> bool {
        self.bits[(bit / 64) as usize] & (1 << (bit % 64)) != 0
    }
}

impl BloomFilter {
    pub fn new() -> Self {
        BloomFilter::default()
    }

    /// Inserts a key. Never fails and never forgets: once inserted,
    /// `contains` returns true for this key forever.
    pub fn insert(&mut self, key: &[u8]) {
        let needs_partition = match self.partitions.last() {
            Some(p) => p.count >= p.capacity,
            None => true,
        };
        if needs_partition {
            let capacity = self
                .partitions
                .last()
                .map(|p| p.capacity * 2)
                .unwrap_or(INITIAL_CAPACITY);
            self.partitions.push(Partition::with_capacity(capacity));
        }

        let part = self
            .partitions
            .last_mut()
            .expect("partition pushed above");
        let num_bits = part.num_bits();
        for seed in 0..NUM_HASHES {
            let hash = xxh3_64_with_seed(key, seed as u64);
            part.set(hash % num_bits);
        }
        part.count += 1;
    }

    /// Returns whether the key was possibly inserted. False positives are
    /// possible, false negatives are not.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.partitions.iter().any(|part| {
            let num_bits = part.num_bits();
            (0..NUM_HASHES).all(|seed| {
                let hash = xxh3_64_with_seed(key, seed as u64);
                part.get(hash % num_bits)
            })
        })
    }

    /// Serializes the filter into the on-disk representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            10 + self
                .partitions
                .iter()
                .map(|p| 28 + p.bits.len() * 8)
                .sum::<usize>(),
        );
        out.extend(&MAGIC);
        out.push(VERSION);
        out.push(NUM_HASHES as u8);
        out.extend(&(self.partitions.len() as u32).to_le_bytes());
        for part in &self.partitions {
            out.extend(&part.capacity.to_le_bytes());
            out.extend(&part.count.to_le_bytes());
            out.extend(&(part.bits.len() as u32).to_le_bytes());
            for word in &part.bits {
                out.extend(&word.to_le_bytes());
            }
        }
        out
    }

    /// Deserializes a filter previously produced by [`BloomFilter::encode`].
    pub fn decode(data: &[u8]) -> Result<BloomFilter> {
        let mut r = Reader { data, pos: 0 };
        let magic = r.bytes(4)?;
        if magic != MAGIC {
            return Err(Error::FilterCorrupt("bad magic".into()));
        }
        let version = r.u8()?;
        if version != VERSION {
            return Err(Error::FilterCorrupt(format!(
                "unsupported version {version}"
            )));
        }
        let hashes = r.u8()?;
        if u32::from(hashes) != NUM_HASHES {
            return Err(Error::FilterCorrupt(format!(
                "unexpected hash count {hashes}"
            )));
        }
        let num_partitions = r.u32()?;
        let mut partitions = Vec::with_capacity(num_partitions as usize);
        for _ in 0..num_partitions {
            let capacity = r.u64()?;
            let count = r.u64()?;
            let num_words = r.u32()?;
            let mut bits = Vec::with_capacity(num_words as usize);
            for _ in 0..num_words {
                bits.push(r.u64()?);
            }
            if bits.is_empty() {
                return Err(Error::FilterCorrupt("empty partition".into()));
            }
            partitions.push(Partition {
                capacity,
                count,
                bits,
            });
        }
        Ok(BloomFilter { partitions })
    }
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::FilterCorrupt("truncated".into()));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_keys_are_always_found() {
        let mut filter = BloomFilter::new();
        let keys: Vec<String> = (0..20_000).map(|i| format!("lib=lib{i}.so")).collect();
        for key in &keys {
            filter.insert(key.as_bytes());
        }
        for key in &keys {
            assert!(filter.contains(key.as_bytes()), "false negative for {key}");
        }
    }

    #[test]
    fn growth_spans_partitions() {
        let mut filter = BloomFilter::new();
        // Far past the initial capacity to force several partitions.
        for i in 0..50_000u32 {
            filter.insert(&i.to_le_bytes());
        }
        assert!(filter.partitions.len() > 1);
        for i in 0..50_000u32 {
            assert!(filter.contains(&i.to_le_bytes()));
        }
    }

    #[test]
    fn absent_keys_are_mostly_absent() {
        let mut filter = BloomFilter::new();
        for i in 0..10_000u32 {
            filter.insert(format!("bin=tool{i}").as_bytes());
        }
        let false_positives = (0..10_000u32)
            .filter(|i| filter.contains(format!("bin=other{i}").as_bytes()))
            .count();
        // ~10 bits/key with 7 probes keeps this well under 1%.
        assert!(false_positives < 200, "{false_positives} false positives");
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut filter = BloomFilter::new();
        for i in 0..10_000u32 {
            filter.insert(format!("hdr=h{i}.h").as_bytes());
        }
        let decoded = BloomFilter::decode(&filter.encode()).unwrap();
        for i in 0..10_000u32 {
            assert!(decoded.contains(format!("hdr=h{i}.h").as_bytes()));
        }
        assert!(!decoded.contains(b"bin=missing"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(BloomFilter::decode(b"").is_err());
        assert!(BloomFilter::decode(b"nope").is_err());
        assert!(BloomFilter::decode(b"dhbf\x02\x07\x00\x00\x00\x00").is_err());
    }

    #[test]
    fn empty_filter_contains_nothing() {
        let filter = BloomFilter::new();
        assert!(!filter.contains(b"bin=ls"));
    }
}
