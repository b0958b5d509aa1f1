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

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A globally unique, persistent identifier for a logical resource.
///
/// This UUID represents the "idea" of a resource, completely decoupled from its
/// physical file path. It is the primary key used by the metadata store to
/// track resources and by the cache tables to deduplicate loads.
///
/// By using a stable UUID, resources can be moved or renamed without breaking
/// references to them held elsewhere. A UUID is assigned the first time a
/// resource is persisted; resources loaded from paths unknown to the metadata
/// store receive an ephemeral UUID that is never written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceUUID(Uuid);

impl ResourceUUID {
    /// Creates a new, random (version 4) `ResourceUUID`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ResourceUUID {
    /// Creates a new, random (version 4) `ResourceUUID`.
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ResourceUUID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
