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

//! The resource agent: the caller-facing façade of the resource subsystem.
//!
//! A [`ResourceAgent`] owns everything a resource needs through its lifetime:
//! the on-disk metadata index resolving paths to stable UUIDs, the cache of
//! resident resources, the ledger of in-flight asynchronous loads, and the
//! work queue whose workers perform the actual disk reads and decodes. The
//! agent's `update()` is the single consumer context that drains completed
//! loads back into the cache.

mod agent;
mod handlers;

pub use agent::{DeviceRelease, ResourceAgent};
