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

//! Importers for RPM `filelists.xml` indexes: Fedora-style mirrors
//! (`dnf`) and openSUSE-style mirrors (`zypper`). The two differ only in
//! where `repodata/repomd.xml` lives; the record stream is identical.
//!
//! filelists.xml is huge (hundreds of MB for a full Fedora release) but
//! rigidly machine-generated: one element per line. The reader exploits
//! that and scans line-wise instead of running an XML parser over the
//! whole stream.

use std::io::{BufRead, BufReader, Read};

use crossbeam_channel::Sender;
use distrohop_index::{tags, Record};

use crate::error::SyncError;
use crate::fetch;
use crate::importer::{send, Importer};

pub struct Dnf;

impl Importer for Dnf {
    fn name(&self) -> &'static str {
        "dnf"
    }

    fn index_urls(
        &self,
        base_url: &str,
        version: &str,
        repo: &str,
        arch: &str,
    ) -> Result<Vec<String>, SyncError> {
        let root = fetch::join_url(base_url, &["linux/releases", version, repo, arch, "os"]);
        let repomd = fetch::get_string(&fetch::join_url(&root, &["repodata/repomd.xml"]))?;
        let href = filelists_href(&repomd).ok_or(SyncError::MissingFilelists)?;
        Ok(vec![fetch::join_url(&root, &[href])])
    }

    fn read_pkg_data(&self, reader: Box<dyn Read + Send>, out: &Sender<Result<Record, SyncError>>) {
        read_filelists(reader, out);
    }
}

pub struct Zypper;

impl Importer for Zypper {
    fn name(&self) -> &'static str {
        "zypper"
    }

    fn index_urls(
        &self,
        base_url: &str,
        version: &str,
        repo: &str,
        _arch: &str,
    ) -> Result<Vec<String>, SyncError> {
        let root = fetch::join_url(base_url, &[version, "repo", repo]);
        let repomd = fetch::get_string(&fetch::join_url(&root, &["repodata/repomd.xml"]))?;
        let href = filelists_href(&repomd).ok_or(SyncError::MissingFilelists)?;
        Ok(vec![fetch::join_url(&root, &[href])])
    }

    fn read_pkg_data(&self, reader: Box<dyn Read + Send>, out: &Sender<Result<Record, SyncError>>) {
        read_filelists(reader, out);
    }
}

/// Picks the first `<location href="..."/>` in repomd.xml that points at a
/// filelists index, whatever its compression suffix.
fn filelists_href(repomd: &str) -> Option<&str> {
    let mut rest = repomd;
    while let Some(idx) = rest.find("<location href=\"") {
        rest = &rest[idx + 16..];
        let end = rest.find('"')?;
        let href = &rest[..end];
        if href.contains("filelists.xml") {
            return Some(href);
        }
        rest = &rest[end..];
    }
    None
}

/// Streams records out of a filelists.xml body.
///
/// `<package ... name="X" ...>` lines switch the current package;
/// `<file>...</file>` lines emit one record each. Directory and ghost
/// entries are skipped, as are the `.build-id` symlink farms Fedora ships
/// in every package.
fn read_filelists(reader: Box<dyn Read + Send>, out: &Sender<Result<Record, SyncError>>) {
    let decompressed = match fetch::decompress(reader) {
        Ok(r) => r,
        Err(err) => {
            send(out, Err(err));
            return;
        }
    };

    let mut current_pkg = String::new();
    for line in BufReader::new(decompressed).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                send(out, Err(err.into()));
                return;
            }
        };
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("<file") {
            // "<filelists ...>" also starts with "<file"; skip the
            // document element along with non-regular entries.
            if rest.starts_with('l') {
                continue;
            }
            let attrs = rest.trim_start();
            if attrs.starts_with("type=\"dir\"") || attrs.starts_with("type=\"ghost\"") {
                continue;
            }

            let Some(open) = line.find('>') else { continue };
            let Some(close) = line.rfind('<') else { continue };
            if close <= open {
                continue;
            }
            let fpath = &line[open + 1..close];
            if fpath.contains(".build-id") {
                continue;
            }

            let record = Record {
                name: current_pkg.clone(),
                tags: tags::generate(fpath),
            };
            if !send(out, Ok(record)) {
                return;
            }
        } else if line.starts_with("<package") {
            if let Some(idx) = line.rfind("name=\"") {
                let rest = &line[idx + 6..];
                if let Some(end) = rest.find('"') {
                    current_pkg = rest[..end].to_owned();
                }
            }
        }
    }
}
