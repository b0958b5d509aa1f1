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

//! Defines the error taxonomy for the resource subsystem.

use super::uuid::ResourceUUID;
use thiserror::Error;

/// Errors produced by the resource subsystem.
///
/// All variants are `Clone` so a failed asynchronous load can park its error
/// inside the handle and report it to every thread blocked in
/// `ResourceHandle::synchronize`. I/O causes are carried as rendered strings
/// for the same reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The requested path or UUID does not resolve to any known resource.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource bytes were read but could not be decoded.
    #[error("Failed to decode resource at '{path}': {details}")]
    DecodeFailure {
        /// The path whose content failed to decode.
        path: String,
        /// Detail message from the codec.
        details: String,
    },

    /// `create` was called without `overwrite` on a path that already has a record.
    #[error("A resource already exists at path '{0}'")]
    AlreadyExists(String),

    /// `save` was called on a handle that was never registered via `create`.
    #[error("Resource {0} was never registered; call create before save")]
    NotRegistered(ResourceUUID),

    /// A metadata record was created for a UUID that already has one.
    ///
    /// This indicates index corruption; the caller contract is `update`, not a
    /// second `create`.
    #[error("Duplicate metadata record for UUID {0}")]
    DuplicateUuid(ResourceUUID),

    /// A payload could not be serialized back to bytes during `save`.
    #[error("Failed to encode resource for '{path}': {details}")]
    EncodeFailure {
        /// The path being saved to.
        path: String,
        /// Detail message from the codec.
        details: String,
    },

    /// The asynchronous load was abandoned because the resource system shut
    /// down before it completed.
    #[error("Load of resource {0} was aborted during shutdown")]
    Aborted(ResourceUUID),

    /// Persisting the metadata record set failed; the triggering mutation was
    /// rolled back in memory.
    #[error("Failed to persist resource metadata: {0}")]
    MetadataWrite(String),

    /// An I/O failure outside the metadata store (reading or writing resource
    /// bytes).
    #[error("Resource I/O failed for '{path}': {details}")]
    Io {
        /// The path being read or written.
        path: String,
        /// Rendered `std::io::Error`.
        details: String,
    },
}
