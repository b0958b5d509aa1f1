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

use std::io;
use std::path::Path;

/// A lane responsible for the raw I/O task of moving resource bytes between
/// disk and memory.
///
/// This struct encapsulates nothing but whole-file reads and writes; decoding
/// is a separate step so workers can keep I/O and CPU work distinct. Errors
/// are surfaced as plain [`io::Error`] and classified (not-found vs. other
/// failure) by the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskLane;

impl DiskLane {
    /// Creates a new lane.
    pub fn new() -> Self {
        Self
    }

    /// Reads the full content of the file at `path`.
    pub fn read_bytes(&self, path: &Path) -> io::Result<Vec<u8>> {
        log::trace!("Reading resource bytes from '{}'.", path.display());
        std::fs::read(path)
    }

    /// Writes `bytes` to `path`, creating missing parent directories first.
    pub fn write_bytes(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        log::trace!(
            "Writing {} resource byte(s) to '{}'.",
            bytes.len(),
            path.display()
        );
        std::fs::write(path, bytes)
    }
}
