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

//! Provides the foundational traits and primitive types for Lithos' resource system.
//!
//! This module defines the "common language" for all resource-related operations.
//! It contains the core contracts that other crates will implement or use, but it
//! has no knowledge of how resources are loaded, decoded, or stored on disk.
//!
//! The key components are:
//! - The [`ResourcePayload`] trait: the type-erased seam every decoded resource
//!   object passes through.
//! - [`ResourceUUID`]: the stable, unique identifier naming a resource
//!   independently of its file path.
//! - [`ResourceHandle`]: the reference-counted, readiness-gated proxy handed to
//!   callers for both synchronous and asynchronous loads.
//! - [`ResourceError`]: the error taxonomy shared by every layer above.

mod error;
mod handle;
mod metadata;
mod uuid;

pub use error::*;
pub use handle::*;
pub use metadata::*;
pub use uuid::*;

use std::any::Any;
use std::fmt::Debug;

/// The type-erased contract every decoded resource object satisfies.
///
/// The cache stores heterogeneous resources (textures, meshes, shaders,
/// programs) behind one table, so decoded payloads are kept as
/// `Arc<dyn ResourcePayload>` and downcast at the call site via [`Self::as_any`].
///
/// The supertraits enforce critical safety guarantees:
/// - `Send` + `Sync`: the payload can be decoded on a worker thread and shared
///   with any caller thread afterwards.
/// - `'static`: the payload holds no borrowed data, so it can live in the cache
///   for the lifetime of the application.
/// - `Debug`: handles print their load state in logs and panics.
pub trait ResourcePayload: Any + Send + Sync + Debug + 'static {
    /// Returns `self` as a `&dyn Any` so callers can downcast to the concrete type.
    fn as_any(&self) -> &dyn Any;

    /// Requests the release of any externally-managed sub-resources (e.g.
    /// device-side buffers) held by this payload.
    ///
    /// Called from the owning context that drains the deferred-release
    /// channel, never inline from `unload`. The default implementation is a
    /// no-op for purely CPU-side resources.
    fn release_device_resources(&self) {}
}
