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

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The downloaded index is not in a recognized compressed format.
    #[error("downloaded index is not a valid compressed file")]
    InvalidIndex,

    #[error("no such importer: {0:?}")]
    UnknownImporter(String),

    #[error("no filelists entry found in repomd.xml")]
    MissingFilelists,

    /// Every candidate index URL failed; one message per attempt.
    #[error("all index urls failed: {}", .errors.join("; "))]
    Http { errors: Vec<String> },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Index(#[from] distrohop_index::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
