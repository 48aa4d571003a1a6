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

//! Importer for APT `Contents-<arch>.gz` indexes (Debian, Ubuntu and
//! derivatives). Each line maps one file path to the comma-separated list
//! of `section/package` entries that ship it.

use std::io::{BufRead, BufReader, Read};

use crossbeam_channel::Sender;
use distrohop_index::{tags, Record};

use crate::error::SyncError;
use crate::fetch;
use crate::importer::{send, Importer};

pub struct Apt;

impl Importer for Apt {
    fn name(&self) -> &'static str {
        "apt"
    }

    fn index_urls(
        &self,
        base_url: &str,
        version: &str,
        repo: &str,
        arch: &str,
    ) -> Result<Vec<String>, SyncError> {
        let contents = format!("Contents-{arch}.gz");
        Ok(vec![
            fetch::join_url(base_url, &["dists", version, repo, &contents]),
            // Before Debian Wheezy the Contents indices lived directly
            // under dists/<version>; Ubuntu still publishes them there.
            fetch::join_url(base_url, &["dists", version, &contents]),
        ])
    }

    fn read_pkg_data(&self, reader: Box<dyn Read + Send>, out: &Sender<Result<Record, SyncError>>) {
        let decompressed = match fetch::decompress(reader) {
            Ok(r) => r,
            Err(err) => {
                send(out, Err(err));
                return;
            }
        };

        for line in BufReader::new(decompressed).lines() {
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    send(out, Err(err.into()));
                    return;
                }
            };

            // Paths may contain spaces; the package list never does, so
            // split at the last one.
            let Some(split) = line.rfind(' ') else {
                continue;
            };
            let fpath = format!("/{}", line[..split].trim());

            // Packaging boilerplate that exists in every Debian package
            // and would only add noise tags.
            if fpath.contains("changelog.Debian")
                || fpath.contains("README.Debian")
                || fpath.contains("NEWS.Debian.gz")
            {
                continue;
            }

            let tags = tags::generate(&fpath);
            for entry in line[split + 1..].trim().split(',') {
                let name = entry.rsplit('/').next().unwrap_or(entry);
                let record = Record {
                    name: name.to_owned(),
                    tags: tags.clone(),
                };
                if !send(out, Ok(record)) {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn gzip(data: &str) -> Vec<u8> {
        let mut enc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data.as_bytes()).unwrap();
        enc.finish().unwrap()
    }

    fn run(index: &str) -> Vec<Record> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Apt.read_pkg_data(Box::new(std::io::Cursor::new(gzip(index))), &tx);
        drop(tx);
        rx.iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn index_urls_include_pre_wheezy_fallback() {
        let urls = Apt
            .index_urls("https://deb.debian.org/debian", "trixie", "main", "amd64")
            .unwrap();
        assert_eq!(
            urls,
            vec![
                "https://deb.debian.org/debian/dists/trixie/main/Contents-amd64.gz",
                "https://deb.debian.org/debian/dists/trixie/Contents-amd64.gz",
            ]
        );
    }

    #[test]
    fn parses_lines_and_strips_sections() {
        let records = run("usr/bin/vim editors/vim\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "vim");
        assert_eq!(records[0].tags, vec!["bin=vim"]);
    }

    #[test]
    fn one_record_per_package_on_shared_files() {
        let records = run("usr/lib/libssl.so.3 libs/libssl3,libs/libssl3t64\n");
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["libssl3", "libssl3t64"]);
        assert_eq!(records[0].tags, records[1].tags);
        assert!(records[0].tags.contains(&"lib=ssl".to_owned()));
    }

    #[test]
    fn skips_debian_doc_files() {
        let index = "usr/share/doc/vim/changelog.Debian.gz editors/vim\n\
                     usr/share/doc/vim/README.Debian editors/vim\n\
                     usr/bin/vim editors/vim\n";
        let records = run(index);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tags, vec!["bin=vim"]);
    }

    #[test]
    fn skips_lines_without_a_package_column() {
        assert!(run("justonefield\n").is_empty());
    }

    #[test]
    fn uncompressed_input_is_an_error() {
        let (tx, rx) = crossbeam_channel::unbounded();
        Apt.read_pkg_data(
            Box::new(std::io::Cursor::new(b"usr/bin/vim editors/vim\n".to_vec())),
            &tx,
        );
        drop(tx);
        let items: Vec<_> = rx.iter().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SyncError::InvalidIndex)));
    }
}
