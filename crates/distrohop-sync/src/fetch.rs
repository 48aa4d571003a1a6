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

//! Decompression by content sniffing. Upstream indexes arrive as gzip, xz
//! or zstd streams depending on the distribution and mirror; the format is
//! detected from magic bytes rather than trusted from the URL.

use std::io::{Chain, Cursor, Read};

use crate::error::SyncError;

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00];
const ZSTD_MAGIC: &[u8] = &[0x28, 0xb5, 0x2f, 0xfd];

type Sniffed<R> = Chain<Cursor<Vec<u8>>, R>;

/// Wraps `reader` in the decoder matching its leading magic bytes.
/// Unrecognized content is rejected with [`SyncError::InvalidIndex`].
pub fn decompress<R: Read + Send + 'static>(
    mut reader: R,
) -> Result<Box<dyn Read + Send>, SyncError> {
    let mut magic = [0u8; 6];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..])? {
            0 => break,
            n => filled += n,
        }
    }

    let head = &magic[..filled];
    let chained: Sniffed<R> = Cursor::new(head.to_vec()).chain(reader);

    if head.starts_with(GZIP_MAGIC) {
        Ok(Box::new(flate2::read::GzDecoder::new(chained)))
    } else if head.starts_with(XZ_MAGIC) {
        Ok(Box::new(xz2::read::XzDecoder::new(chained)))
    } else if head.starts_with(ZSTD_MAGIC) {
        Ok(Box::new(zstd::stream::read::Decoder::new(chained)?))
    } else {
        Err(SyncError::InvalidIndex)
    }
}

/// Joins URL path segments onto a base, normalizing the slashes in
/// between. Query strings are not supported; index URLs never carry them.
pub(crate) fn join_url(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_owned();
    for segment in segments {
        url.push('/');
        url.push_str(segment.trim_matches('/'));
    }
    url
}

/// Fetches a small text resource (repomd.xml) and returns its body.
pub(crate) fn get_string(url: &str) -> Result<String, SyncError> {
    let response = ureq::get(url).call().map_err(|err| SyncError::Http {
        errors: vec![format!("{url}: {err}")],
    })?;
    response.into_string().map_err(SyncError::Io)
}
