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

//! A read-only view over the shards that back one repository. Queries fan
//! out across every shard concurrently and the per-shard answers are
//! merged.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::store::{sort_results, Package, ReadOnly, TagResult};

/// An ordered list of shards queried as one repository.
#[derive(Default)]
pub struct Combined {
    stores: Vec<Arc<dyn ReadOnly>>,
}

impl Combined {
    pub fn new() -> Combined {
        Combined::default()
    }

    pub fn with_stores(stores: Vec<Arc<dyn ReadOnly>>) -> Combined {
        Combined { stores }
    }

    pub fn add(&mut self, store: Arc<dyn ReadOnly>) {
        self.stores.push(store);
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }
}

impl ReadOnly for Combined {
    /// Asks every shard for the package; the first hit wins. Only when
    /// every shard reports not-found does the combined lookup report
    /// not-found. Any other shard error aborts the lookup.
    fn get_pkg(&self, name: &str) -> Result<Package> {
        let found: Mutex<Option<Package>> = Mutex::new(None);
        let failure: Mutex<Option<Error>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for store in &self.stores {
                let (found, failure) = (&found, &failure);
                scope.spawn(move || match store.get_pkg(name) {
                    Ok(pkg) => {
                        let mut slot = found.lock();
                        if slot.is_none() {
                            *slot = Some(pkg);
                        }
                    }
                    Err(Error::NotFound) => {}
                    Err(err) => {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                });
            }
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        found.into_inner().ok_or(Error::NotFound)
    }

    /// Unions the per-shard prefix scans, sorts lexicographically and
    /// truncates to `n`.
    fn get_pkg_names_by_prefix(&self, prefix: &str, n: usize) -> Result<Vec<String>> {
        let names: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let failure: Mutex<Option<Error>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for store in &self.stores {
                let (names, failure) = (&names, &failure);
                scope.spawn(move || match store.get_pkg_names_by_prefix(prefix, n) {
                    Ok(mut part) => names.lock().append(&mut part),
                    Err(err) => {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                });
            }
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        let mut names = names.into_inner();
        names.sort_unstable();
        names.dedup();
        names.truncate(n);
        Ok(names)
    }

    /// Concatenates the ranked results of every shard and re-sorts them as
    /// one list. The reported latency is the sum of the per-shard search
    /// times, not the wall time of the fan-out.
    fn search(&self, tags: &[String]) -> Result<(Vec<TagResult>, Duration)> {
        let merged: Mutex<(Vec<TagResult>, Duration)> =
            Mutex::new((Vec::new(), Duration::ZERO));
        let failure: Mutex<Option<Error>> = Mutex::new(None);

        std::thread::scope(|scope| {
            for store in &self.stores {
                let (merged, failure) = (&merged, &failure);
                scope.spawn(move || match store.search(tags) {
                    Ok((mut results, elapsed)) => {
                        let mut slot = merged.lock();
                        slot.0.append(&mut results);
                        slot.1 += elapsed;
                    }
                    Err(err) => {
                        let mut slot = failure.lock();
                        if slot.is_none() {
                            *slot = Some(err);
                        }
                    }
                });
            }
        });

        if let Some(err) = failure.into_inner() {
            return Err(err);
        }
        let (mut results, latency) = merged.into_inner();
        sort_results(&mut results);
        Ok((results, latency))
    }
}
