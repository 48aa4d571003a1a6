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

//! Importer for Pacman `<repo>.files` databases (Arch Linux and
//! derivatives): a compressed tar archive with one directory per package
//! containing `desc` (metadata) and `files` (the file list).

use std::io::{BufRead, BufReader, Read};

use crossbeam_channel::Sender;
use distrohop_index::{tags, Record};

use crate::error::SyncError;
use crate::fetch;
use crate::importer::{send, Importer};

pub struct Pacman;

impl Importer for Pacman {
    fn name(&self) -> &'static str {
        "pacman"
    }

    /// Arch mirror URLs conventionally contain `$repo` and `$arch`
    /// placeholders. They are expanded here, and `<repo>.files` is then
    /// appended regardless: a base URL that already used `$repo` gets the
    /// repo name twice, which is what existing mirror configs expect.
    fn index_urls(
        &self,
        base_url: &str,
        _version: &str,
        repo: &str,
        arch: &str,
    ) -> Result<Vec<String>, SyncError> {
        let expanded = expand_vars(base_url, repo, arch);
        Ok(vec![fetch::join_url(
            &expanded,
            &[&format!("{repo}.files")],
        )])
    }

    fn read_pkg_data(&self, reader: Box<dyn Read + Send>, out: &Sender<Result<Record, SyncError>>) {
        let decompressed = match fetch::decompress(reader) {
            Ok(r) => r,
            Err(err) => {
                send(out, Err(err));
                return;
            }
        };

        let mut archive = tar::Archive::new(decompressed);
        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(err) => {
                send(out, Err(err.into()));
                return;
            }
        };

        let mut current_pkg = String::new();
        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    send(out, Err(err.into()));
                    return;
                }
            };

            let base = match entry.path() {
                Ok(path) => path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned()),
                Err(err) => {
                    send(out, Err(err.into()));
                    return;
                }
            };

            match base.as_deref() {
                Some("desc") => {
                    let mut desc = String::new();
                    if let Err(err) = entry.read_to_string(&mut desc) {
                        send(out, Err(err.into()));
                        return;
                    }
                    if let Some(name) = desc_field(&desc, "%NAME%") {
                        current_pkg = name.to_owned();
                    }
                }
                Some("files") => {
                    for line in BufReader::new(entry).lines() {
                        let line = match line {
                            Ok(line) => line,
                            Err(err) => {
                                send(out, Err(err.into()));
                                return;
                            }
                        };
                        let line = line.trim();
                        // %FILES% is the section header; trailing-slash
                        // entries are directories.
                        if line == "%FILES%" || line.is_empty() || line.ends_with('/') {
                            continue;
                        }
                        let record = Record {
                            name: current_pkg.clone(),
                            tags: tags::generate(&format!("/{line}")),
                        };
                        if !send(out, Ok(record)) {
                            return;
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Returns the line following a `%FIELD%` header in a pacman desc file.
fn desc_field<'a>(desc: &'a str, field: &str) -> Option<&'a str> {
    let mut lines = desc.lines();
    while let Some(line) = lines.next() {
        if line.trim() == field {
            return lines.next().map(str::trim);
        }
    }
    None
}

/// Expands the `$repo` and `$arch` placeholders (bare or braced) used in
/// pacman mirror URLs. Unknown placeholders are left untouched.
fn expand_vars(base_url: &str, repo: &str, arch: &str) -> String {
    base_url
        .replace("${repo}", repo)
        .replace("${arch}", arch)
        .replace("$repo", repo)
        .replace("$arch", arch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn files_db(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, contents) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, path, contents.as_bytes())
                .unwrap();
        }
        let tarball = builder.into_inner().unwrap();

        let mut enc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(&tarball).unwrap();
        enc.finish().unwrap()
    }

    fn run(db: Vec<u8>) -> Vec<Record> {
        let (tx, rx) = crossbeam_channel::unbounded();
        Pacman.read_pkg_data(Box::new(std::io::Cursor::new(db)), &tx);
        drop(tx);
        rx.iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn url_expansion_appends_repo_files() {
        let urls = Pacman
            .index_urls(
                "https://geo.mirror.pkgbuild.com/$repo/os/$arch",
                "",
                "core",
                "x86_64",
            )
            .unwrap();
        assert_eq!(
            urls,
            vec!["https://geo.mirror.pkgbuild.com/core/os/x86_64/core.files"]
        );
    }

    #[test]
    fn parses_desc_and_files_entries() {
        let db = files_db(&[
            (
                "zsh-5.9-5/desc",
                "%FILENAME%\nzsh-5.9-5-x86_64.pkg.tar.zst\n\n%NAME%\nzsh\n\n%VERSION%\n5.9-5\n",
            ),
            (
                "zsh-5.9-5/files",
                "%FILES%\nusr/\nusr/bin/\nusr/bin/zsh\nusr/share/man/man1/zsh.1.gz\n",
            ),
        ]);

        let records = run(db);
        let summary: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.name.as_str(), r.tags[0].as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![("zsh", "bin=zsh"), ("zsh", "man=zsh.1")]
        );
    }

    #[test]
    fn desc_without_name_keeps_previous_package() {
        let db = files_db(&[
            ("a-1/desc", "%NAME%\npkg-a\n"),
            ("a-1/files", "%FILES%\nusr/bin/a\n"),
            ("b-1/desc", "%VERSION%\n1\n"),
            ("b-1/files", "%FILES%\nusr/bin/b\n"),
        ]);

        let records = run(db);
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        // The malformed desc leaves the previous package current, exactly
        // as a line-oriented reader of the upstream format behaves.
        assert_eq!(names, vec!["pkg-a", "pkg-a"]);
    }

    #[test]
    fn garbage_stream_is_an_invalid_index() {
        let (tx, rx) = crossbeam_channel::unbounded();
        Pacman.read_pkg_data(Box::new(std::io::Cursor::new(b"plain".to_vec())), &tx);
        drop(tx);
        let items: Vec<_> = rx.iter().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(SyncError::InvalidIndex)));
    }
}
