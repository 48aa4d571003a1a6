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

//! The refresh pipeline: fetch an upstream package index, stream it
//! through the matching importer into a freshly-built shadow shard, then
//! atomically swap the shadow in for the live shard.
//!
//! The live shard keeps answering queries for the whole duration of a
//! pull; it is only blocked for the final replace. A failure at any point
//! before the replace leaves the live shard untouched.

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use distrohop_index::bloom::BloomFilter;
use distrohop_index::{Record, RepoMeta, Store};

use crate::error::SyncError;
use crate::importer::Importer;

/// Records merged between two batch flushes into the shadow shard.
const BATCH_SIZE: usize = 5000;

/// Channel capacity between the importer thread and the batching loop.
const CHANNEL_CAPACITY: usize = 1024;

/// Download progress callback: `(title, received_bytes, total_bytes)`.
/// The total is absent when the server did not send a Content-Length.
pub type ProgressFn = Arc<dyn Fn(&str, u64, Option<u64>) + Send + Sync>;

pub struct PullOptions {
    pub base_url: String,
    pub version: String,
    pub repo: String,
    pub architecture: String,
    pub progress: Option<ProgressFn>,
}

/// Outcome of a successful pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pulled {
    /// The shadow shard was built and swapped in.
    Updated,
    /// The upstream index is unchanged; the live shard was not touched.
    UpToDate,
}

/// Synchronizes one shard from its upstream repository index.
///
/// Candidate URLs from the importer are tried in order; if the upstream's
/// `ETag` or `Last-Modified` show the stored contents are current, the
/// pull short-circuits with [`Pulled::UpToDate`]. Otherwise records are
/// streamed into a shadow shard next to the live one and
/// [`Store::replace`] swaps it in.
pub fn pull(
    opts: &PullOptions,
    live: &Store,
    importer: &dyn Importer,
) -> Result<Pulled, SyncError> {
    let urls = importer.index_urls(
        &opts.base_url,
        &opts.version,
        &opts.repo,
        &opts.architecture,
    )?;

    let mut errors = Vec::new();
    let mut response = None;
    for url in &urls {
        match ureq::get(url).call() {
            Ok(res) => {
                response = Some(res);
                break;
            }
            Err(ureq::Error::Status(code, _)) => {
                errors.push(format!("{url}: http status {code}"));
            }
            Err(err) => errors.push(format!("{url}: {err}")),
        }
    }
    let Some(response) = response else {
        return Err(SyncError::Http { errors });
    };

    let etag = response.header("ETag").unwrap_or_default().to_owned();
    let last_modified = response
        .header("Last-Modified")
        .and_then(parse_http_date);

    if let Ok(meta) = live.get_meta() {
        if !etag.is_empty() && etag == meta.etag {
            return Ok(Pulled::UpToDate);
        }
        if let (Some(upstream), Some(stored)) = (last_modified, meta.last_modified) {
            if stored >= upstream {
                return Ok(Pulled::UpToDate);
            }
        }
    }

    // The shadow shard is built in a sibling directory so the final
    // replace is a pair of renames on one filesystem.
    let parent = live.path.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent)?;
    let shadow_path = tempfile::Builder::new()
        .prefix("distrohop-pull.")
        .tempdir_in(parent)?
        .keep();

    let result = build_and_swap(opts, live, importer, response, &shadow_path, etag, last_modified);
    if result.is_err() {
        // The live shard is intact; don't leave the half-built shadow
        // behind.
        let _ = fs::remove_dir_all(&shadow_path);
    }
    result
}

fn build_and_swap(
    opts: &PullOptions,
    live: &Store,
    importer: &dyn Importer,
    response: ureq::Response,
    shadow_path: &Path,
    etag: String,
    last_modified: Option<DateTime<Utc>>,
) -> Result<Pulled, SyncError> {
    let shadow = Store::open(shadow_path)?;

    let total = response
        .header("Content-Length")
        .and_then(|v| v.parse::<u64>().ok());
    let body: Box<dyn Read + Send> = Box::new(response.into_reader());
    let reader: Box<dyn Read + Send> = match &opts.progress {
        Some(progress) => Box::new(ProgressReader {
            inner: body,
            title: progress_title(opts),
            received: 0,
            total,
            progress: progress.clone(),
        }),
        None => body,
    };

    let mut filters: HashMap<u8, BloomFilter> = HashMap::new();
    let mut collected: HashMap<String, Record> = HashMap::with_capacity(BATCH_SIZE);

    let streamed: Result<(), SyncError> = std::thread::scope(|scope| {
        let (tx, rx) = crossbeam_channel::bounded(CHANNEL_CAPACITY);
        scope.spawn(move || importer.read_pkg_data(reader, &tx));

        let mut merged = 0usize;
        for item in rx {
            let record = item?;
            match collected.get_mut(&record.name) {
                Some(current) => current.tags.extend(record.tags),
                None => {
                    collected.insert(record.name.clone(), record);
                }
            }

            merged += 1;
            if merged >= BATCH_SIZE {
                shadow.write_batch(&collected, &mut filters)?;
                collected.clear();
                merged = 0;
            }
        }
        Ok(())
    });
    streamed?;

    if !collected.is_empty() {
        shadow.write_batch(&collected, &mut filters)?;
    }
    shadow.write_filters(&filters)?;
    shadow.write_meta(&RepoMeta {
        etag,
        last_modified,
    })?;

    live.replace(shadow)?;
    Ok(Pulled::Updated)
}

/// Parses an RFC 1123 `Last-Modified` header value.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn progress_title(opts: &PullOptions) -> String {
    [
        opts.version.as_str(),
        opts.repo.as_str(),
        opts.architecture.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join("/")
}

/// Wraps the HTTP body and reports cumulative download progress.
struct ProgressReader {
    inner: Box<dyn Read + Send>,
    title: String,
    received: u64,
    total: Option<u64>,
    progress: ProgressFn,
}

impl Read for ProgressReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.received += n as u64;
        (self.progress)(&self.title, self.received, self.total);
        Ok(n)
    }
}
