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

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the index core. `Blocked` and `NotFound` are part of
/// the query contract and must stay distinguishable from storage failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A replace operation holds the shard's exclusive lock. Retryable.
    #[error("store is being replaced; try again later")]
    Blocked,

    /// The requested key does not exist.
    #[error("not found")]
    NotFound,

    /// The shard's database is gone, which only happens after a replace
    /// failed to reopen it. The shard stays in this state until reopened.
    #[error("store is unavailable")]
    Unavailable,

    /// An input tag did not match `\w+=.+`.
    #[error("invalid tag format: {0:?}")]
    InvalidTag(String),

    /// A stored bloom filter failed structural validation.
    #[error("corrupt bloom filter: {0}")]
    FilterCorrupt(String),

    #[error("invalid metadata record: {0}")]
    Meta(#[from] serde_json::Error),

    #[error(transparent)]
    Database(#[from] redb::DatabaseError),

    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),

    #[error(transparent)]
    Table(#[from] redb::TableError),

    #[error(transparent)]
    Storage(#[from] redb::StorageError),

    #[error(transparent)]
    Commit(#[from] redb::CommitError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
