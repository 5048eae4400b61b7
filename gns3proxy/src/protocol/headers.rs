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

use std::borrow::Cow;

use indexmap::IndexMap;

/// One received header field. The name keeps its on-wire casing so a
/// rebuilt message serialises exactly as the peer sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    name: String,
    value: Vec<u8>,
}

impl HeaderEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Case-insensitive header map keyed by the lower-cased field name,
/// preserving insertion order and the original casing of each name.
/// A repeated field name replaces the earlier entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaderMap {
    inner: IndexMap<String, HeaderEntry>,
}

impl HttpHeaderMap {
    pub fn insert(&mut self, name: &[u8], value: &[u8]) {
        let name = String::from_utf8_lossy(name).into_owned();
        let key = name.to_ascii_lowercase();
        self.inner.insert(
            key,
            HeaderEntry {
                name,
                value: value.to_vec(),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(|e| e.value.as_slice())
    }

    pub fn get_str(&self, name: &str) -> Option<Cow<'_, str>> {
        self.get(name).map(String::from_utf8_lossy)
    }

    /// Iterate entries in received order as (lower-cased key, entry).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderEntry)> {
        self.inner.iter().map(|(k, e)| (k.as_str(), e))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
