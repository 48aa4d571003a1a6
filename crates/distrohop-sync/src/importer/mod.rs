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

//! Format-specific index importers.
//!
//! Each supported distribution family publishes a "which files does each
//! package ship" index in its own format. An [`Importer`] knows how to
//! locate that index on a mirror and how to stream `(package, tags)`
//! records out of its byte stream. The registry is keyed by the `type`
//! field of a repository's configuration.

mod apt;
mod pacman;
mod rpm;

pub use apt::Apt;
pub use pacman::Pacman;
pub use rpm::{Dnf, Zypper};

use std::io::Read;

use crossbeam_channel::Sender;
use distrohop_index::Record;

use crate::error::SyncError;

/// A streaming parser for one package index format.
///
/// `read_pkg_data` is a producer: it runs on its own thread and sends
/// records into the channel until the stream ends or an error occurs. An
/// error is sent as the final item and terminates the sequence. Sending
/// stops silently when the receiver hangs up.
pub trait Importer: Send + Sync {
    /// Registry name; matches the repository `type` in the configuration.
    fn name(&self) -> &'static str;

    /// Candidate index URLs, tried in order until one answers.
    fn index_urls(
        &self,
        base_url: &str,
        version: &str,
        repo: &str,
        arch: &str,
    ) -> Result<Vec<String>, SyncError>;

    /// Streams `(package, tags)` records from the raw (still compressed)
    /// index body into `out`.
    fn read_pkg_data(&self, reader: Box<dyn Read + Send>, out: &Sender<Result<Record, SyncError>>);
}

static IMPORTERS: [&dyn Importer; 4] = [&Apt, &Dnf, &Zypper, &Pacman];

/// Looks an importer up by its registry name.
pub fn importer_by_name(name: &str) -> Result<&'static dyn Importer, SyncError> {
    IMPORTERS
        .iter()
        .find(|imp| imp.name() == name)
        .copied()
        .ok_or_else(|| SyncError::UnknownImporter(name.to_owned()))
}

/// Sends a record, reporting whether the receiver is still listening.
fn send(out: &Sender<Result<Record, SyncError>>, item: Result<Record, SyncError>) -> bool {
    out.send(item).is_ok()
}
