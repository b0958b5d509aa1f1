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

//! # Lithos Lanes
//!
//! Hot-path execution seams of the resource subsystem: raw byte I/O
//! ([`load_lane::DiskLane`]) and the opaque bytes↔payload step
//! ([`load_lane::ResourceCodec`]). The format-specific import logic itself
//! lives outside this workspace; consumers plug their codecs into the
//! [`load_lane::CodecRegistry`].

#![warn(missing_docs)]

pub mod load_lane;

pub use load_lane::{CodecRegistry, DiskLane, ResourceCodec};
