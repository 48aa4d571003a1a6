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

//! Index synchronization for DistroHop: format-specific importers that
//! stream `(package, file-path)` records out of upstream package indexes,
//! and the pull pipeline that builds a shadow shard from them and swaps it
//! in atomically.

pub mod config;
pub mod error;
pub mod fetch;
pub mod importer;
pub mod pull;

pub use crate::error::SyncError;
pub use crate::importer::{importer_by_name, Importer};
pub use crate::pull::{pull, PullOptions, Pulled};
