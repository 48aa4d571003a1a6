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

//! Core indexing and search for DistroHop: semantic tag extraction from
//! package file lists, per-shard persistent stores with bloom-filter
//! acceleration, and the combined/cached query views layered on top.

pub mod bloom;
pub mod error;
pub mod store;
pub mod tags;

pub use crate::error::{Error, Result};
pub use crate::store::{
    Cached, Combined, Package, ReadOnly, Record, RepoMeta, Store, TagResult,
};
