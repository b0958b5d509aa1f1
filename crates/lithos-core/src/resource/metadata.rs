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

use super::uuid::ResourceUUID;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Serializable metadata describing a persisted resource.
///
/// This is the "identity card" of a resource: the stable link between its
/// [`ResourceUUID`] and the logical path it currently lives at. The metadata
/// store keeps one record per persisted resource and rewrites the full record
/// set to disk on every mutation, so the mapping survives process restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    /// The unique, stable identifier for this resource.
    pub uuid: ResourceUUID,

    /// The logical path the resource is currently persisted at.
    pub path: PathBuf,
}

impl ResourceMetadata {
    /// Creates a new metadata record binding `uuid` to `path`.
    pub fn new(uuid: ResourceUUID, path: impl Into<PathBuf>) -> Self {
        Self {
            uuid,
            path: path.into(),
        }
    }
}
