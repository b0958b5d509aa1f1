// Copyright 2025 eraflo
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

use lithos_core::resource::ResourcePayload;
use std::collections::HashMap;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;

/// A trait for types that can decode raw resource bytes into a live payload
/// and re-encode a payload for persistence.
///
/// This represents the "data plane" of resource loading. Implementors carry
/// the potentially CPU-intensive work of parsing file data; the resource
/// subsystem treats the step as opaque and only routes bytes through it.
///
/// `decode` runs on work queue worker threads, `encode` on whichever thread
/// calls `save`, so implementors must be thread-safe.
pub trait ResourceCodec: Send + Sync {
    /// Parses a byte slice into a payload object.
    ///
    /// # Returns
    /// The decoded payload, or a boxed dynamic error on malformed input. The
    /// error must be thread-safe; the agent maps it to a decode failure.
    fn decode(&self, bytes: &[u8]) -> Result<Arc<dyn ResourcePayload>, Box<dyn Error + Send + Sync>>;

    /// Serializes a payload back into the byte form `decode` accepts.
    ///
    /// Backs the `save` operation. Implementors should reject payloads of a
    /// concrete type they do not own.
    fn encode(&self, payload: &dyn ResourcePayload) -> Result<Vec<u8>, Box<dyn Error + Send + Sync>>;
}

/// Routes a resource path to the codec responsible for its format.
///
/// Selection is keyed on the lowercased file extension, with an optional
/// default codec for extension-less or unknown paths. The registry is built
/// up-front and then shared immutably with the worker threads.
#[derive(Default)]
pub struct CodecRegistry {
    by_extension: HashMap<String, Arc<dyn ResourceCodec>>,
    default: Option<Arc<dyn ResourceCodec>>,
}

impl CodecRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `codec` for files with the given extension (without the dot).
    pub fn register(&mut self, extension: &str, codec: Arc<dyn ResourceCodec>) {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), codec);
    }

    /// Sets the codec used when no extension-specific codec matches.
    pub fn set_default(&mut self, codec: Arc<dyn ResourceCodec>) {
        self.default = Some(codec);
    }

    /// Selects the codec for `path`, falling back to the default if set.
    pub fn codec_for(&self, path: &Path) -> Option<Arc<dyn ResourceCodec>> {
        let by_extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()));
        by_extension.or(self.default.as_ref()).cloned()
    }
}
