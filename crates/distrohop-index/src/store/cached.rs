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

//! A memoization layer over any [`ReadOnly`] provider. Only `search` is
//! cached; package and prefix lookups pass straight through.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Result;
use crate::store::{Package, ReadOnly, TagResult};

/// Default lifetime of a cached search result.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

/// Default interval between sweeps of expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

struct CacheEntry {
    results: Vec<TagResult>,
    latency: Duration,
    expires_at: Instant,
}

/// Caches search results by their exact (order-sensitive) tag list.
pub struct Cached {
    inner: Arc<dyn ReadOnly>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
}

impl Cached {
    pub fn new(inner: Arc<dyn ReadOnly>, ttl: Duration, sweep_interval: Duration) -> Cached {
        Cached {
            inner,
            entries: Mutex::new(HashMap::new()),
            ttl,
            sweep_interval,
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn with_defaults(inner: Arc<dyn ReadOnly>) -> Cached {
        Cached::new(inner, DEFAULT_TTL, DEFAULT_SWEEP_INTERVAL)
    }

    /// Drops expired entries if a sweep interval has elapsed since the
    /// last sweep. Runs opportunistically on insert instead of from a
    /// background thread.
    fn maybe_sweep(&self, now: Instant) {
        let mut last_sweep = self.last_sweep.lock();
        if now.duration_since(*last_sweep) < self.sweep_interval {
            return;
        }
        *last_sweep = now;
        self.entries.lock().retain(|_, entry| entry.expires_at > now);
    }
}

impl ReadOnly for Cached {
    fn get_pkg(&self, name: &str) -> Result<Package> {
        self.inner.get_pkg(name)
    }

    fn get_pkg_names_by_prefix(&self, prefix: &str, n: usize) -> Result<Vec<String>> {
        self.inner.get_pkg_names_by_prefix(prefix, n)
    }

    fn search(&self, tags: &[String]) -> Result<(Vec<TagResult>, Duration)> {
        let key = tags.join("\x1F");
        let now = Instant::now();

        if let Some(entry) = self.entries.lock().get(&key) {
            if entry.expires_at > now {
                return Ok((entry.results.clone(), entry.latency));
            }
        }

        let (results, latency) = self.inner.search(tags)?;
        if !results.is_empty() {
            self.maybe_sweep(now);
            self.entries.lock().insert(
                key,
                CacheEntry {
                    results: results.clone(),
                    latency,
                    expires_at: now + self.ttl,
                },
            );
        }
        Ok((results, latency))
    }
}
