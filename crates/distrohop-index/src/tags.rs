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

//! Semantic tag extraction from package file paths.
//!
//! A tag is a `kind=value` string derived from where a file sits in the
//! filesystem: `/usr/bin/firefox` becomes `bin=firefox`,
//! `/usr/lib/libaudit.so.1` becomes a family of `lib=` tags, and so on.
//! Packages from different distributions that ship files in the same
//! well-known locations end up with overlapping tag sets, which is what
//! the search layer scores on.

/// Generates the list of tags for a single file path.
///
/// Directory segments are walked left to right. `usr`, `opt`, `local` and
/// `share` are transparent; the first recognised bucket segment that
/// actually produces a tag wins and stops the walk. Paths that match no
/// bucket fall back to a single `file=<path>` tag, so every file
/// contributes at least one tag.
pub fn generate(file_path: &str) -> Vec<String> {
    let (dir, name) = match file_path.rfind('/') {
        Some(idx) => (&file_path[..idx], &file_path[idx + 1..]),
        None => ("", file_path),
    };

    let mut tags = Vec::new();
    for elem in dir.split('/') {
        match elem {
            // Transparent segments: keep walking.
            "usr" | "opt" | "local" | "share" => continue,
            "bin" | "sbin" => tags.push(format!("bin={name}")),
            "icons" | "pixmaps" => {
                if matches!(ext(name), ".svg" | ".png" | ".jpg" | ".jpeg") {
                    tags.push(format!("icon={name}"));
                }
            }
            "man" => {
                if let Some(man) = manual_name(name) {
                    tags.push(format!("man={man}"));
                }
            }
            "dist-packages" | "site-packages" => {
                if let Some(py) = python_name(file_path) {
                    tags.push(format!("py={py}"));
                }
            }
            "pkgconfig" | "pkg-config" => {
                if let Some(stem) = name.strip_suffix(".pc") {
                    tags.push(format!("pkgcfg={stem}"));
                }
            }
            "applications" => {
                if let Some(stem) = name.strip_suffix(".desktop") {
                    tags.push(format!("desktop={stem}"));
                }
            }
            "dbus-1" => {
                if let Some(stem) = name.strip_suffix(".service") {
                    tags.push(format!("dbus={stem}"));
                }
            }
            "systemd" => {
                if matches!(ext(name), ".service" | ".target" | ".socket" | ".timer") {
                    tags.push(format!("systemd={name}"));
                }
            }
            "include" => {
                if matches!(ext(name), ".h" | ".hh" | ".hpp" | ".hxx" | ".h++") {
                    // Tag by the path below the include root so headers of the
                    // same library match across distributions regardless of
                    // the prefix (/usr/include vs /usr/local/include).
                    let hdr = match file_path.split_once("include/") {
                        Some((_, below)) => below,
                        None => name,
                    };
                    tags.push(format!("hdr={hdr}"));
                }
            }
            "lib" | "lib32" | "lib64" => {
                let so = name
                    .split_once(".so")
                    .filter(|(_, sover)| soversion_is_valid(sover));
                if let Some((stem, _)) = so {
                    tags.push(format!("lib={name}"));
                    // Only versioned names (libfoo.so.1.2.3) get the
                    // unversioned and canonical variants; a bare libfoo.so
                    // already is the unversioned name.
                    if name.ends_with(|c: char| c.is_ascii_digit()) {
                        tags.push(format!("lib={stem}.so"));
                        tags.push(format!("lib={}", stem.strip_prefix("lib").unwrap_or(stem)));
                    }
                } else if let Some(stem) = name.strip_suffix(".a") {
                    tags.push(format!("lib={name}"));
                    tags.push(format!("lib={stem}"));
                }
            }
            _ => continue,
        }

        if !tags.is_empty() {
            break;
        }
    }

    if tags.is_empty() {
        tags.push(format!("file={file_path}"));
    }

    tags
}

/// File extension including the leading dot, or `""` when there is none.
fn ext(name: &str) -> &str {
    name.rfind('.').map(|i| &name[i..]).unwrap_or("")
}

/// Returns the manual page name for basenames of the form
/// `<page>.<section>[.gz]`, where `<section>` is all digits.
fn manual_name(file_name: &str) -> Option<&str> {
    let stripped = file_name.strip_suffix(".gz").unwrap_or(file_name);
    let (_, section) = stripped.rsplit_once('.')?;
    if section.is_empty() || !section.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(stripped)
}

/// Returns the top-level module/distribution directory under the first
/// `dist-packages/` or `site-packages/` segment of the path.
fn python_name(file_path: &str) -> Option<&str> {
    for marker in ["/dist-packages/", "/site-packages/"] {
        if let Some(idx) = file_path.find(marker) {
            let below = &file_path[idx + marker.len()..];
            if let Some(end) = below.find('/') {
                if end > 0 {
                    return Some(&below[..end]);
                }
            }
        }
    }
    None
}

/// A soversion suffix is valid when it is empty or consists of
/// dot-separated numeric segments (the leading empty segment of `.1.2.3`
/// counts as numeric).
pub fn soversion_is_valid(s: &str) -> bool {
    s.split('.').all(|seg| seg.bytes().all(|b| b.is_ascii_digit()))
}
