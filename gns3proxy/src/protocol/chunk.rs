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

use atoi::FromRadix16;

use super::HttpParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkParseState {
    WaitingForSize,
    WaitingForData,
    Complete,
}

/// Incremental decoder for chunked transfer encoding. Input may be
/// fragmented at any byte boundary, including inside the size line or
/// the chunk trailer.
#[derive(Debug)]
pub struct ChunkParser {
    state: ChunkParseState,
    /// fully decoded chunks, in order
    body: Vec<u8>,
    /// partial size line, or partial chunk data plus its trailing CRLF
    chunk: Vec<u8>,
    /// expected size of the chunk currently being received
    size: usize,
}

impl Default for ChunkParser {
    fn default() -> Self {
        ChunkParser {
            state: ChunkParseState::WaitingForSize,
            body: Vec::new(),
            chunk: Vec::new(),
            size: 0,
        }
    }
}

impl ChunkParser {
    pub fn state(&self) -> ChunkParseState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == ChunkParseState::Complete
    }

    pub fn take_body(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.body)
    }

    pub fn parse(&mut self, data: &[u8]) -> Result<(), HttpParseError> {
        let mut data = data;
        while !data.is_empty() {
            data = self.process(data)?;
        }
        Ok(())
    }

    fn process<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8], HttpParseError> {
        match self.state {
            ChunkParseState::WaitingForSize => {
                // the size line may have been split across reads
                let start = self.chunk.len().saturating_sub(1);
                self.chunk.extend_from_slice(data);
                match memchr::memmem::find(&self.chunk[start..], b"\r\n") {
                    None => Ok(&[]),
                    Some(rel) => {
                        let pos = start + rel;
                        let (size, digits) = usize::from_radix_16(&self.chunk[..pos]);
                        if digits == 0 {
                            return Err(HttpParseError::InvalidChunkSize);
                        }
                        let consumed = (pos + 2).saturating_sub(self.chunk.len() - data.len());
                        self.size = size;
                        self.chunk.clear();
                        self.state = ChunkParseState::WaitingForData;
                        Ok(&data[consumed..])
                    }
                }
            }
            ChunkParseState::WaitingForData => {
                // collect chunk data plus its trailing CRLF before emitting
                let need = self.size + 2 - self.chunk.len();
                let take = need.min(data.len());
                self.chunk.extend_from_slice(&data[..take]);
                if self.chunk.len() == self.size + 2 {
                    self.body.extend_from_slice(&self.chunk[..self.size]);
                    self.state = if self.size == 0 {
                        ChunkParseState::Complete
                    } else {
                        ChunkParseState::WaitingForSize
                    };
                    self.chunk.clear();
                    self.size = 0;
                }
                Ok(&data[take..])
            }
            // bytes past the terminating chunk are not ours to consume
            ChunkParseState::Complete => Ok(&[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_chunk() {
        let mut parser = ChunkParser::default();
        parser.parse(b"5\r\nhello\r\n0\r\n\r\n").unwrap();
        assert!(parser.is_complete());
        assert_eq!(parser.take_body(), b"hello");
    }

    #[test]
    fn multiple_chunks() {
        let mut parser = ChunkParser::default();
        parser.parse(b"4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n").unwrap();
        assert!(parser.is_complete());
        assert_eq!(parser.take_body(), b"Wikipedia");
    }

    #[test]
    fn decoded_body_is_fragmentation_independent() {
        let stream = b"4\r\nWiki\r\nb\r\npedia in\r\n\r\nch\r\n8\r\nunks.\r\n\r\n\r\n0\r\n\r\n";
        for step in 1..=stream.len() {
            let mut parser = ChunkParser::default();
            for piece in stream.chunks(step) {
                parser.parse(piece).unwrap();
            }
            assert!(parser.is_complete(), "step {step}");
            assert_eq!(parser.take_body(), b"Wikipedia in\r\n\r\nchunks.\r\n", "step {step}");
        }
    }

    #[test]
    fn size_line_split_across_reads() {
        let mut parser = ChunkParser::default();
        parser.parse(b"a").unwrap();
        parser.parse(b"\r").unwrap();
        parser.parse(b"\n0123456789\r\n0\r\n").unwrap();
        parser.parse(b"\r\n").unwrap();
        assert!(parser.is_complete());
        assert_eq!(parser.take_body(), b"0123456789");
    }

    #[test]
    fn hex_size_with_extension() {
        let mut parser = ChunkParser::default();
        parser.parse(b"5;name=value\r\nhello\r\n0\r\n\r\n").unwrap();
        assert!(parser.is_complete());
        assert_eq!(parser.take_body(), b"hello");
    }

    #[test]
    fn invalid_size_line() {
        let mut parser = ChunkParser::default();
        let err = parser.parse(b"xyz\r\n").unwrap_err();
        assert!(matches!(err, HttpParseError::InvalidChunkSize));
    }
}
