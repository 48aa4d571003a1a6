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

//! Shard-parallel tag search.
//!
//! The user key space is partitioned into 62 disjoint ranges, one per
//! possible first byte of a package name. Workers pull ranges off a shared
//! queue; each range is first gated on the bloom filter for its starting
//! byte, so ranges that cannot contain any of the input tags are skipped
//! without touching a single package row.

use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use redb::Database;
use regex::Regex;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::store::{Package, Store, INTERNAL_PREFIX, PKGS, UNIT_SEP};

/// All possible starting bytes of a package name.
const START_CHARS: [u8; 62] =
    *b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

static TAG_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+=.+").expect("tag pattern compiles"));

/// One hit of a tag search.
#[derive(Debug, Clone)]
pub struct TagResult {
    /// Fraction of the input tags this package carries, in `[0, 1]`.
    pub confidence: f32,
    /// The input tags the package also carries.
    pub overlap: Vec<String>,
    pub package: Package,
}

/// A single worker's unit of work: the key range of one starting byte.
#[derive(Debug, Clone, Copy)]
struct SearchRange {
    lower: u8,
    upper: u8,
}

impl Store {
    /// Searches the shard for packages carrying any of the given tags,
    /// ranked by the fraction of input tags they carry (ties broken by
    /// name). Every tag must match `\w+=.+`. Also returns the elapsed
    /// wall time of the search.
    pub fn search(&self, tags: &[String]) -> Result<(Vec<TagResult>, Duration)> {
        let start = Instant::now();
        for tag in tags {
            if !TAG_PATTERN.is_match(tag) {
                return Err(Error::InvalidTag(tag.clone()));
            }
        }
        if tags.is_empty() {
            return Ok((Vec::new(), start.elapsed()));
        }

        let results = self.with_db(|db| scan(db, tags, self.search_threads))?;
        Ok((results, start.elapsed()))
    }
}

/// Runs the worker pool over all 62 ranges and returns the sorted results.
/// The caller holds the shard's shared lock; the database cannot be
/// replaced out from under the workers.
fn scan(db: &Database, tags: &[String], threads: usize) -> Result<Vec<TagResult>> {
    let queue: Mutex<Vec<SearchRange>> = Mutex::new(
        START_CHARS
            .iter()
            .map(|&c| SearchRange { lower: c, upper: c + 1 })
            .collect(),
    );
    let results: Mutex<Vec<TagResult>> = Mutex::new(Vec::new());
    let error: Mutex<Option<Error>> = Mutex::new(None);

    std::thread::scope(|scope| {
        for _ in 0..threads.max(1) {
            scope.spawn(|| {
                if let Err(err) = worker(db, tags, &queue, &results) {
                    let mut slot = error.lock();
                    if slot.is_none() {
                        *slot = Some(err);
                    }
                }
            });
        }
    });

    if let Some(err) = error.into_inner() {
        return Err(err);
    }

    let mut results = results.into_inner();
    sort_results(&mut results);
    Ok(results)
}

/// Pulls ranges off the queue until it is empty. Each range gets its own
/// read transaction, so a range scan observes a consistent snapshot.
fn worker(
    db: &Database,
    tags: &[String],
    queue: &Mutex<Vec<SearchRange>>,
    results: &Mutex<Vec<TagResult>>,
) -> Result<()> {
    loop {
        let range = match queue.lock().pop() {
            Some(range) => range,
            None => return Ok(()),
        };

        let txn = db.begin_read()?;
        let table = txn.open_table(PKGS)?;

        // A missing filter means no package with this starting byte was
        // ever stored; a present filter that rejects every input tag means
        // the range cannot contain a match. Either way, skip the scan.
        let found = match table.get([INTERNAL_PREFIX, range.lower].as_slice())? {
            None => false,
            Some(raw) => {
                let filter = BloomFilter::decode(raw.value())?;
                tags.iter().any(|tag| filter.contains(tag.as_bytes()))
            }
        };
        if !found {
            continue;
        }

        let mut local = Vec::new();
        for entry in table.range::<&[u8]>([range.lower].as_slice()..[range.upper].as_slice())? {
            let (key, value) = entry?;
            // The value bytes alias the iterator's buffer; overlap is
            // computed on views and only matches are copied out.
            let raw = value.value();

            let mut overlap = Vec::new();
            for tag in tags {
                if raw.split(|&b| b == UNIT_SEP).any(|chunk| chunk == tag.as_bytes()) {
                    overlap.push(tag.clone());
                }
            }
            if overlap.is_empty() {
                continue;
            }

            let confidence = overlap.len() as f32 / tags.len() as f32;
            local.push(TagResult {
                confidence,
                overlap,
                package: Package {
                    name: String::from_utf8_lossy(key.value()).into_owned(),
                    tags: crate::store::split_tags(raw).map(str::to_owned).collect(),
                },
            });
        }

        results.lock().append(&mut local);
    }
}

/// Sorts results by confidence descending, package name ascending.
pub fn sort_results(results: &mut [TagResult]) {
    results.sort_unstable_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.package.name.cmp(&b.package.name))
    });
}
