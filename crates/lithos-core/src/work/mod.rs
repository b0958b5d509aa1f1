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

//! Provides the generic asynchronous work execution primitive.
//!
//! This module is deliberately resource-agnostic: the [`WorkQueue`] moves
//! opaque, channel-tagged payloads from producer threads through a pool of
//! worker threads and back to a single consumer context. Higher-level crates
//! register [`RequestHandler`]/[`ResponseHandler`] pairs for the channels they
//! own; the queue itself never inspects a payload.
//!
//! By keeping this primitive generic, `lithos-core` lets the agent crates
//! define their own request and response types without creating circular
//! dependencies.

mod queue;

pub use self::queue::{
    ChannelId, RequestHandler, RequestId, ResponseHandler, WorkQueue, WorkRequest, WorkResponse,
};
