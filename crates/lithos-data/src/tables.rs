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

//! In-memory resource tables: the cache of resident resources and the ledger
//! of loads still in flight.
//!
//! Both tables map a [`ResourceUUID`] to handle state under one mutex each.
//! They are mutated only by the designated consumer context; lookups from
//! arbitrary caller threads take the same mutex. The agent guarantees the
//! cross-table invariant that a UUID is present in at most one of the two
//! tables at any time.

use lithos_core::resource::{ResourceHandle, ResourceUUID};
use lithos_core::work::RequestId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Book-keeping for one dispatched but incomplete asynchronous load.
#[derive(Debug, Clone)]
pub struct AsyncLoadOp {
    /// The pending handle every deduplicated caller shares.
    pub handle: ResourceHandle,
    /// The work queue token, used to abort the request on teardown.
    pub request_id: RequestId,
}

/// The cache of resident resources: UUID → live handle.
///
/// The table's entry is itself a strong reference, which is what keeps a
/// payload alive independently of caller-held clones. A second load of a
/// UUID present here is a cache hit and never touches the disk.
#[derive(Default)]
pub struct LoadedTable {
    entries: Mutex<HashMap<ResourceUUID, ResourceHandle>>,
}

impl LoadedTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a resident resource, replacing any previous entry.
    pub fn insert(&self, uuid: ResourceUUID, handle: ResourceHandle) {
        self.entries.lock().unwrap().insert(uuid, handle);
    }

    /// Cache-hit lookup: returns a clone of the resident handle.
    pub fn get(&self, uuid: ResourceUUID) -> Option<ResourceHandle> {
        self.entries.lock().unwrap().get(&uuid).cloned()
    }

    /// Returns `true` if the UUID is resident.
    pub fn contains(&self, uuid: ResourceUUID) -> bool {
        self.entries.lock().unwrap().contains_key(&uuid)
    }

    /// Drops the cache's reference for `uuid`, returning the handle so the
    /// caller can schedule deferred sub-resource release.
    pub fn take(&self, uuid: ResourceUUID) -> Option<ResourceHandle> {
        self.entries.lock().unwrap().remove(&uuid)
    }

    /// Removes and returns every entry whose only strong reference is the
    /// cache's own, i.e. resources no external caller still holds.
    pub fn take_unused(&self) -> Vec<ResourceHandle> {
        let mut entries = self.entries.lock().unwrap();
        let unused: Vec<ResourceUUID> = entries
            .iter()
            .filter(|(_, handle)| handle.reference_count() == 1)
            .map(|(uuid, _)| *uuid)
            .collect();
        unused
            .into_iter()
            .filter_map(|uuid| entries.remove(&uuid))
            .collect()
    }

    /// Removes and returns every entry. Used during teardown.
    pub fn drain(&self) -> Vec<ResourceHandle> {
        self.entries.lock().unwrap().drain().map(|(_, h)| h).collect()
    }

    /// The number of resident resources.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` if nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The ledger of asynchronous loads that have been dispatched but have not
/// completed: UUID → pending handle + request token.
///
/// Its presence is what enforces the at-most-one-outstanding-load guarantee:
/// a request for a UUID already here returns the existing pending handle
/// instead of dispatching a duplicate.
#[derive(Default)]
pub struct InProgressTable {
    entries: Mutex<HashMap<ResourceUUID, AsyncLoadOp>>,
}

impl InProgressTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly dispatched load.
    pub fn insert(&self, uuid: ResourceUUID, op: AsyncLoadOp) {
        self.entries.lock().unwrap().insert(uuid, op);
    }

    /// Deduplication lookup: returns the pending handle if a load for this
    /// UUID is already in flight.
    pub fn get_handle(&self, uuid: ResourceUUID) -> Option<ResourceHandle> {
        self.entries
            .lock()
            .unwrap()
            .get(&uuid)
            .map(|op| op.handle.clone())
    }

    /// Returns `true` if a load for this UUID is in flight.
    pub fn contains(&self, uuid: ResourceUUID) -> bool {
        self.entries.lock().unwrap().contains_key(&uuid)
    }

    /// Records the work queue token for an already-registered load.
    ///
    /// The entry is registered *before* the request is submitted so a racing
    /// completion can always find it; the token only becomes known afterwards.
    /// Returns `false` if the entry already completed in between, in which
    /// case the token is useless anyway.
    pub fn set_request_id(&self, uuid: ResourceUUID, request_id: RequestId) -> bool {
        match self.entries.lock().unwrap().get_mut(&uuid) {
            Some(op) => {
                op.request_id = request_id;
                true
            }
            None => false,
        }
    }

    /// Completes (or abandons) the load for `uuid`, removing its entry.
    ///
    /// Returns `None` if the entry was already gone, which the consumer-side
    /// dispatch must tolerate when racing teardown.
    pub fn take(&self, uuid: ResourceUUID) -> Option<AsyncLoadOp> {
        self.entries.lock().unwrap().remove(&uuid)
    }

    /// Removes and returns every in-flight operation. Used during teardown to
    /// abort outstanding requests.
    pub fn drain(&self) -> Vec<AsyncLoadOp> {
        self.entries.lock().unwrap().drain().map(|(_, op)| op).collect()
    }

    /// The number of loads in flight.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Returns `true` if no load is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lithos_core::resource::ResourcePayload;
    use std::any::Any;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Blob;
    impl ResourcePayload for Blob {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn ready_handle() -> ResourceHandle {
        ResourceHandle::new_ready(ResourceUUID::new(), Arc::new(Blob))
    }

    #[test]
    fn loaded_table_cache_hit_returns_same_slot() {
        let table = LoadedTable::new();
        let uuid = ResourceUUID::new();
        let handle = ready_handle();
        table.insert(uuid, handle.clone());

        let hit = table.get(uuid).unwrap();
        assert!(hit.ptr_eq(&handle));
        assert!(table.get(ResourceUUID::new()).is_none());
    }

    #[test]
    fn take_unused_spares_externally_held_entries() {
        let table = LoadedTable::new();

        let held_uuid = ResourceUUID::new();
        let held = ready_handle();
        table.insert(held_uuid, held.clone());

        let orphan_uuid = ResourceUUID::new();
        table.insert(orphan_uuid, ready_handle());

        let removed = table.take_unused();
        assert_eq!(removed.len(), 1);
        assert!(table.contains(held_uuid));
        assert!(!table.contains(orphan_uuid));

        // Once the external clone is gone the survivor becomes unused too.
        drop(held);
        assert_eq!(table.take_unused().len(), 1);
        assert!(table.is_empty());
    }

    #[test]
    fn in_progress_dedup_hands_out_the_pending_handle() {
        let table = InProgressTable::new();
        let uuid = ResourceUUID::new();
        let pending = ResourceHandle::new_pending(uuid);
        table.insert(
            uuid,
            AsyncLoadOp {
                handle: pending.clone(),
                request_id: 9,
            },
        );

        let dedup = table.get_handle(uuid).unwrap();
        assert!(dedup.ptr_eq(&pending));

        let op = table.take(uuid).unwrap();
        assert_eq!(op.request_id, 9);
        // A second take races teardown and must be tolerated.
        assert!(table.take(uuid).is_none());
    }
}
