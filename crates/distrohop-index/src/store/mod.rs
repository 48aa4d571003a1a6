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

//! Persistent per-shard package store.
//!
//! One [`Store`] backs a single `(repo, version, sub-repo, arch)`
//! coordinate. It keeps three key spaces in one ordered table:
//!
//! * package names (UTF-8, first byte in `[0-9A-Za-z]`) mapping to the
//!   package's tags joined with the `0x1F` unit separator,
//! * `{0x02, c}` mapping to the bloom filter over all tags of packages
//!   whose name starts with byte `c`,
//! * `\x02META` mapping to the JSON-encoded repository freshness metadata.
//!
//! The `0x02` prefix sorts below every valid package name, so internal
//! keys never collide with user keys.
//!
//! Every operation except [`Store::replace`] takes the shard's shared lock
//! non-blockingly and fails fast with [`Error::Blocked`] while a replace
//! is in flight. `replace` takes the exclusive lock, waits for in-flight
//! readers to drain, and swaps the entire database directory atomically.

mod cached;
mod combined;
mod search;

pub use cached::Cached;
pub use combined::Combined;
pub use search::{sort_results, TagResult};

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};

const PKGS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("pkgs");

/// Separator between tag strings in a stored package value.
pub(crate) const UNIT_SEP: u8 = 0x1F;

/// Prefix byte of the internal key space (bloom filters and metadata).
const INTERNAL_PREFIX: u8 = 0x02;

/// Key of the repository metadata record.
const META_KEY: &[u8] = b"\x02META";

/// Defensive bounds for scans over the user key space: the first byte of a
/// package name is in `[0-9A-Za-z]`, so `[0x03, 0x7B)` covers all of them
/// while excluding the internal `0x02` prefix.
const USER_KEYS_LOW: &[u8] = &[0x03];
const USER_KEYS_HIGH: &[u8] = &[0x7B];

/// Name of the database file inside a shard directory.
const DB_FILE: &str = "store.redb";

/// A software package: its name and the semantic tags derived from the
/// files it ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub tags: Vec<String>,
}

/// One ingested record: the package a file belongs to plus the tags
/// generated from that file's path. Importers produce these; batches of
/// them are merged into the store.
#[derive(Debug, Clone)]
pub struct Record {
    pub name: String,
    pub tags: Vec<String>,
}

/// Upstream index freshness metadata, used for conditional refresh.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoMeta {
    pub etag: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Read-only query surface shared by shard stores and the views stacked
/// on top of them.
pub trait ReadOnly: Send + Sync {
    fn get_pkg(&self, name: &str) -> Result<Package>;
    fn get_pkg_names_by_prefix(&self, prefix: &str, n: usize) -> Result<Vec<String>>;
    fn search(&self, tags: &[String]) -> Result<(Vec<TagResult>, Duration)>;
}

/// Persistent store for one shard.
pub struct Store {
    /// The shard directory. The database file lives inside it so the whole
    /// shard can be swapped with two directory renames.
    pub path: PathBuf,

    /// The replace lock doubles as the owner of the database handle:
    /// readers take it shared (non-blocking), `replace` takes it exclusive
    /// while it closes, renames and reopens. `None` only ever occurs
    /// inside the replace critical section, or after a reopen failure in
    /// which case readers surface [`Error::Unavailable`].
    db: RwLock<Option<Database>>,

    /// Worker threads used by [`Store::search`].
    pub search_threads: usize,
}

impl Store {
    /// Opens or creates the store at the given shard directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Store> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        let db = Database::create(path.join(DB_FILE))?;

        // Materialize the table so read paths never race its creation.
        let txn = db.begin_write()?;
        txn.open_table(PKGS)?;
        txn.commit()?;

        Ok(Store {
            path,
            db: RwLock::new(Some(db)),
            search_threads: 4,
        })
    }

    /// Runs `f` with the database handle under the shared lock, failing
    /// fast with [`Error::Blocked`] while a replace holds the exclusive
    /// lock.
    fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let guard = self.db.try_read().ok_or(Error::Blocked)?;
        let db = guard.as_ref().ok_or(Error::Unavailable)?;
        f(db)
    }

    /// Writes a batch of records, merging each record's tags into any tags
    /// already stored for that package (union, sorted, deduplicated), and
    /// inserts every resulting tag into the bloom filter for the first
    /// byte of the package name, creating filters as needed. The whole
    /// batch commits as one transaction.
    pub fn write_batch(
        &self,
        batch: &HashMap<String, Record>,
        filters: &mut HashMap<u8, BloomFilter>,
    ) -> Result<()> {
        self.with_db(|db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(PKGS)?;
                for record in batch.values() {
                    if record.name.is_empty() || record.tags.is_empty() {
                        continue;
                    }
                    let key = record.name.as_bytes();

                    let existing = table.get(key)?.map(|v| v.value().to_vec());
                    let mut tags: Vec<String> = match existing {
                        Some(raw) => split_tags(&raw)
                            .chain(record.tags.iter().map(|t| t.as_str()))
                            .map(str::to_owned)
                            .collect(),
                        None => record.tags.clone(),
                    };
                    tags.sort_unstable();
                    tags.dedup();

                    let value = join_tags(key[0], &tags, filters);
                    table.insert(key, value.as_slice())?;
                }
            }
            txn.commit()?;
            Ok(())
        })
    }

    /// Persists the bloom filters under their `{0x02, c}` keys.
    pub fn write_filters(&self, filters: &HashMap<u8, BloomFilter>) -> Result<()> {
        self.with_db(|db| {
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(PKGS)?;
                for (&first, filter) in filters {
                    let encoded = filter.encode();
                    table.insert([INTERNAL_PREFIX, first].as_slice(), encoded.as_slice())?;
                }
            }
            txn.commit()?;
            Ok(())
        })
    }

    /// Loads the bloom filter for packages starting with the given byte.
    /// [`Error::NotFound`] means no package with that starting byte was
    /// ever written.
    pub fn get_filter(&self, first: u8) -> Result<BloomFilter> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(PKGS)?;
            let raw = table
                .get([INTERNAL_PREFIX, first].as_slice())?
                .ok_or(Error::NotFound)?;
            BloomFilter::decode(raw.value())
        })
    }

    /// Retrieves a package and its stored tags by exact name.
    pub fn get_pkg(&self, name: &str) -> Result<Package> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(PKGS)?;
            let raw = table.get(name.as_bytes())?.ok_or(Error::NotFound)?;
            Ok(Package {
                name: name.to_owned(),
                tags: split_tags(raw.value()).map(str::to_owned).collect(),
            })
        })
    }

    /// Returns up to `n` package names starting with `prefix`, in
    /// lexicographic order. An empty prefix scans the whole user key
    /// space.
    pub fn get_pkg_names_by_prefix(&self, prefix: &str, n: usize) -> Result<Vec<String>> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(PKGS)?;

            let (lower, upper) = match prefix.as_bytes() {
                [] => (USER_KEYS_LOW.to_vec(), USER_KEYS_HIGH.to_vec()),
                bytes => (bytes.to_vec(), prefix_upper_bound(bytes)),
            };

            let mut out = Vec::new();
            for entry in table.range::<&[u8]>(lower.as_slice()..upper.as_slice())? {
                if out.len() >= n {
                    break;
                }
                let (key, _) = entry?;
                out.push(String::from_utf8_lossy(key.value()).into_owned());
            }
            Ok(out)
        })
    }

    /// Writes the repository freshness metadata.
    pub fn write_meta(&self, meta: &RepoMeta) -> Result<()> {
        self.with_db(|db| {
            let encoded = serde_json::to_vec(meta)?;
            let txn = db.begin_write()?;
            {
                let mut table = txn.open_table(PKGS)?;
                table.insert(META_KEY, encoded.as_slice())?;
            }
            txn.commit()?;
            Ok(())
        })
    }

    /// Reads the repository freshness metadata. [`Error::NotFound`] means
    /// the shard has never completed a refresh.
    pub fn get_meta(&self) -> Result<RepoMeta> {
        self.with_db(|db| {
            let txn = db.begin_read()?;
            let table = txn.open_table(PKGS)?;
            let raw = table.get(META_KEY)?.ok_or(Error::NotFound)?;
            Ok(serde_json::from_slice(raw.value())?)
        })
    }

    /// Atomically replaces this store's contents with `other`'s.
    ///
    /// The exclusive lock is held for the whole critical section, so every
    /// concurrent operation fails with [`Error::Blocked`] rather than
    /// observing a half-swapped shard. `other` is consumed: its database
    /// directory is renamed into place. On failure the old contents are
    /// restored where possible and the error is surfaced; the live shard
    /// is never left mixing old and new state.
    pub fn replace(&self, other: Store) -> Result<()> {
        // Leftovers from an earlier interrupted replace. Concurrent
        // operations are still safe, no lock needed yet.
        let old_path = match self.path.parent() {
            Some(parent) => parent.join("db-old"),
            None => PathBuf::from("db-old"),
        };
        remove_dir_if_present(&old_path)?;

        let other_path = other.path.clone();

        // From here until the guard drops, every other operation observes
        // Blocked.
        let mut guard = self.db.write();

        // Close both databases before touching the filesystem.
        drop(other);
        drop(guard.take());

        if let Err(err) = fs::rename(&self.path, &old_path) {
            // Nothing moved; reopen in place so the shard stays usable.
            *guard = Database::create(self.path.join(DB_FILE)).ok();
            return Err(err.into());
        }

        if let Err(err) = fs::rename(&other_path, &self.path) {
            // Roll the old directory back into place before surfacing.
            let rollback = fs::rename(&old_path, &self.path);
            let err = match rollback {
                Ok(()) => {
                    *guard = Database::create(self.path.join(DB_FILE)).ok();
                    err
                }
                Err(rb) => std::io::Error::other(format!(
                    "{err}; rollback of old shard failed: {rb}"
                )),
            };
            return Err(err.into());
        }

        *guard = Some(Database::create(self.path.join(DB_FILE))?);
        drop(guard);

        // The replace itself has committed; a leftover db-old directory is
        // tolerable.
        let _ = fs::remove_dir_all(&old_path);
        Ok(())
    }

    /// Closes the underlying database. Fails with [`Error::Blocked`] if
    /// any operation (including a replace) is in flight. Subsequent
    /// operations observe [`Error::Unavailable`].
    pub fn close(&self) -> Result<()> {
        let mut guard = self.db.try_write().ok_or(Error::Blocked)?;
        drop(guard.take());
        Ok(())
    }
}

impl ReadOnly for Store {
    fn get_pkg(&self, name: &str) -> Result<Package> {
        Store::get_pkg(self, name)
    }

    fn get_pkg_names_by_prefix(&self, prefix: &str, n: usize) -> Result<Vec<String>> {
        Store::get_pkg_names_by_prefix(self, prefix, n)
    }

    fn search(&self, tags: &[String]) -> Result<(Vec<TagResult>, Duration)> {
        Store::search(self, tags)
    }
}

/// Splits a stored value into its tag strings.
pub(crate) fn split_tags(raw: &[u8]) -> impl Iterator<Item = &str> {
    raw.split(|&b| b == UNIT_SEP)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
}

/// Joins sorted tags with the unit separator and inserts each of them into
/// the bloom filter for the package's first name byte, creating the filter
/// on first use.
fn join_tags(first: u8, tags: &[String], filters: &mut HashMap<u8, BloomFilter>) -> Vec<u8> {
    let filter = filters.entry(first).or_default();
    let mut out = Vec::with_capacity(tags.iter().map(|t| t.len() + 1).sum());
    for (i, tag) in tags.iter().enumerate() {
        filter.insert(tag.as_bytes());
        out.extend_from_slice(tag.as_bytes());
        if i != tags.len() - 1 {
            out.push(UNIT_SEP);
        }
    }
    out
}

/// Exclusive upper bound for a prefix scan: the prefix with its last byte
/// incremented.
fn prefix_upper_bound(prefix: &[u8]) -> Vec<u8> {
    let mut upper = prefix.to_vec();
    if let Some(last) = upper.last_mut() {
        *last = last.saturating_add(1);
    }
    upper
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
