/*
 * Copyright 2025 gns3proxy and/or its affiliates.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use thiserror::Error;

mod chunk;
mod headers;
mod message;

pub use chunk::{ChunkParseState, ChunkParser};
pub use headers::{HeaderEntry, HttpHeaderMap};
pub use message::{HttpMessage, HttpMessageKind, HttpParseState, RequestUri};

#[derive(Error, Debug)]
pub enum HttpParseError {
    #[error("invalid start line")]
    InvalidStartLine,
    #[error("invalid content-length header value")]
    InvalidContentLength,
    #[error("invalid chunk size line")]
    InvalidChunkSize,
}
