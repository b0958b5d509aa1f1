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

use super::handlers::{LoadRequest, LoadRequestHandler, LoadResponseHandler};
use lithos_core::resource::{
    LoadState, ResourceError, ResourceHandle, ResourcePayload, ResourceUUID,
};
use lithos_core::work::{ChannelId, WorkQueue};
use lithos_data::{AsyncLoadOp, InProgressTable, LoadedTable, MetadataStore};
use lithos_lanes::{CodecRegistry, DiskLane};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Name of the work queue channel carrying resource load requests.
const RESOURCE_CHANNEL: &str = "resources";

/// A request to release a payload's externally-managed sub-resources.
///
/// `unload` never frees device-side state inline; it pushes one of these onto
/// the release channel and the owning context (e.g. the render thread) picks
/// the actual reclamation point by draining [`ResourceAgent::release_receiver`]
/// and calling [`ResourcePayload::release_device_resources`].
#[derive(Clone)]
pub struct DeviceRelease {
    /// The resource being unloaded.
    pub uuid: ResourceUUID,
    /// The payload whose sub-resources should be released.
    pub payload: Arc<dyn ResourcePayload>,
}

/// State shared between the agent and its work queue handlers.
pub(super) struct AgentShared {
    pub metadata: MetadataStore,
    pub loaded: LoadedTable,
    pub in_progress: InProgressTable,
    pub codecs: CodecRegistry,
    pub disk: DiskLane,
    /// In-memory-only UUIDs for resources loaded from paths the metadata
    /// store does not know. Keyed by path so repeated loads of the same
    /// unmanaged path still deduplicate.
    pub ephemeral: Mutex<HashMap<PathBuf, ResourceUUID>>,
    /// Serializes the check-then-dispatch section of a load and the settle
    /// that moves an entry from the in-progress ledger to the cache, so a
    /// racing caller can never observe a UUID in neither table (and dispatch
    /// a duplicate request) or in both at once.
    pub dispatch: Mutex<()>,
}

impl AgentShared {
    /// The blocking half of a load: read the file and run it through the
    /// codec selected for its extension. Runs on worker threads for
    /// asynchronous loads and on the calling thread for synchronous ones.
    pub fn read_and_decode(&self, path: &Path) -> Result<Arc<dyn ResourcePayload>, ResourceError> {
        let bytes = self.disk.read_bytes(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ResourceError::NotFound(path.display().to_string()),
            _ => ResourceError::Io {
                path: path.display().to_string(),
                details: e.to_string(),
            },
        })?;

        let codec = self
            .codecs
            .codec_for(path)
            .ok_or_else(|| ResourceError::DecodeFailure {
                path: path.display().to_string(),
                details: "no codec registered for this extension".to_string(),
            })?;

        codec
            .decode(&bytes)
            .map_err(|e| ResourceError::DecodeFailure {
                path: path.display().to_string(),
                details: e.to_string(),
            })
    }

    /// Settles a load owned by `uuid`: moves the entry out of the in-progress
    /// ledger and, on success, into the cache with the handle flipped ready.
    ///
    /// The whole move runs under the `dispatch` lock, atomically with the
    /// check-then-register in `load_internal`: a concurrent load always finds
    /// the UUID in exactly one table and joins the existing handle instead of
    /// dispatching a second request. On failure the ephemeral assignment for
    /// the path is discarded so a retried load starts fresh.
    ///
    /// Returns `None` if the entry was already gone (teardown raced the
    /// completion); the caller drops the payload.
    pub fn settle_load(
        &self,
        uuid: ResourceUUID,
        result: Result<Arc<dyn ResourcePayload>, ResourceError>,
    ) -> Option<Result<ResourceHandle, ResourceError>> {
        let _guard = self.dispatch.lock().unwrap();
        let op = self.in_progress.take(uuid)?;
        Some(match result {
            Ok(payload) => {
                op.handle.mark_ready(payload);
                self.loaded.insert(uuid, op.handle.clone());
                Ok(op.handle)
            }
            Err(e) => {
                op.handle.mark_failed(e.clone());
                self.ephemeral.lock().unwrap().retain(|_, u| *u != uuid);
                Err(e)
            }
        })
    }
}

/// The caller-facing façade of the resource subsystem.
///
/// Translates a path or UUID request into a cache hit, a synchronous load, or
/// an asynchronous work queue request, and manages the create/save/unload
/// lifecycle. One agent instance owns one metadata folder, one work queue and
/// one set of cache tables.
///
/// Handles may be cloned and dropped from any thread; the tables themselves
/// are only written by the thread driving [`ResourceAgent::update`] (plus the
/// synchronous-load path, which takes the same locks).
pub struct ResourceAgent {
    shared: Arc<AgentShared>,
    work_queue: WorkQueue,
    channel: ChannelId,
    release_tx: crossbeam_channel::Sender<DeviceRelease>,
    release_rx: crossbeam_channel::Receiver<DeviceRelease>,
}

impl ResourceAgent {
    /// Creates an agent rooted at `metadata_folder` (created if absent),
    /// decoding through `codecs`, with `worker_count` loading threads.
    ///
    /// # Errors
    /// Fails if the metadata folder cannot be created or its record store
    /// cannot be read.
    pub fn new(
        metadata_folder: &Path,
        codecs: CodecRegistry,
        worker_count: usize,
    ) -> Result<Self, ResourceError> {
        let metadata = MetadataStore::open(metadata_folder)?;
        let shared = Arc::new(AgentShared {
            metadata,
            loaded: LoadedTable::new(),
            in_progress: InProgressTable::new(),
            codecs,
            disk: DiskLane::new(),
            ephemeral: Mutex::new(HashMap::new()),
            dispatch: Mutex::new(()),
        });

        let work_queue = WorkQueue::new();
        let channel = work_queue.resolve_channel(RESOURCE_CHANNEL);
        work_queue.register_request_handler(Arc::new(LoadRequestHandler {
            shared: Arc::clone(&shared),
            channel,
        }));
        work_queue.register_response_handler(Arc::new(LoadResponseHandler {
            shared: Arc::clone(&shared),
            channel,
        }));
        work_queue.start(worker_count);

        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        log::info!("ResourceAgent initialized with {worker_count} loader thread(s).");

        Ok(Self {
            shared,
            work_queue,
            channel,
            release_tx,
            release_rx,
        })
    }

    /// Drains completed asynchronous loads into the cache.
    ///
    /// Must be driven periodically from exactly one consumer context (the
    /// main/update thread); completion notification, table moves, and
    /// readiness flips all happen here.
    pub fn update(&self) {
        self.work_queue.process_responses();
    }

    /// Loads the resource at `path`, blocking for the full read + decode.
    ///
    /// A resident resource is a cache hit and returns the existing handle.
    /// Paths unknown to the metadata store are loaded as temporary resources
    /// under an ephemeral UUID: usable like any other resource, but not
    /// persisted and not saveable until registered via
    /// [`ResourceAgent::create`].
    ///
    /// # Errors
    /// [`ResourceError::NotFound`] if the file does not exist,
    /// [`ResourceError::DecodeFailure`] if its content is malformed.
    pub fn load(&self, path: &Path) -> Result<ResourceHandle, ResourceError> {
        let uuid = self.uuid_for_path(path);
        self.load_internal(path, uuid, true)
    }

    /// Begins loading the resource at `path` without blocking.
    ///
    /// If the resource is already resident or already being loaded, the
    /// existing handle is returned (a single underlying request is fanned out
    /// to every caller). The returned handle starts in the `Loading` state;
    /// use [`ResourceHandle::is_loaded`] or [`ResourceHandle::synchronize`]
    /// before touching the payload.
    pub fn load_async(&self, path: &Path) -> Result<ResourceHandle, ResourceError> {
        let uuid = self.uuid_for_path(path);
        self.load_internal(path, uuid, false)
    }

    /// Loads the resource with the given UUID, blocking until decoded.
    ///
    /// # Errors
    /// [`ResourceError::NotFound`] if the UUID has no metadata record, plus
    /// the synchronous-load errors of [`ResourceAgent::load`].
    pub fn load_from_uuid(&self, uuid: ResourceUUID) -> Result<ResourceHandle, ResourceError> {
        let path = self.shared.metadata.resolve_path(uuid)?;
        self.load_internal(&path, uuid, true)
    }

    /// Begins loading the resource with the given UUID without blocking.
    ///
    /// # Errors
    /// [`ResourceError::NotFound`] if the UUID has no metadata record.
    pub fn load_from_uuid_async(
        &self,
        uuid: ResourceUUID,
    ) -> Result<ResourceHandle, ResourceError> {
        let path = self.shared.metadata.resolve_path(uuid)?;
        self.load_internal(&path, uuid, false)
    }

    /// Unloads the resource referenced by `handle`.
    ///
    /// Device-side sub-resources are scheduled for release on the owning
    /// context; the in-memory payload itself is freed once every remaining
    /// clone of the handle is dropped. The UUID may be loaded fresh later.
    pub fn unload(&self, handle: ResourceHandle) {
        let uuid = handle.uuid();
        if let Some(cached) = self.shared.loaded.take(uuid) {
            self.schedule_device_release(&cached);
            log::debug!("Unloaded resource {uuid}.");
        }
        self.shared
            .ephemeral
            .lock()
            .unwrap()
            .retain(|_, u| *u != uuid);
    }

    /// Finds every resident resource no external caller references anymore
    /// and unloads it. Entries still held outside the cache are left intact.
    pub fn unload_all_unused(&self) {
        let removed = self.shared.loaded.take_unused();
        for handle in &removed {
            self.schedule_device_release(handle);
            self.shared
                .ephemeral
                .lock()
                .unwrap()
                .retain(|_, u| *u != handle.uuid());
        }
        if !removed.is_empty() {
            log::info!("Unloaded {} unused resource(s).", removed.len());
        }
    }

    /// Persists the resource's current in-memory state back to its recorded
    /// path.
    ///
    /// Waits for a still-loading handle to settle first, driving the response
    /// drain itself so the wait is safe even on the consumer thread.
    ///
    /// # Errors
    /// [`ResourceError::NotRegistered`] if the resource was never registered
    /// via [`ResourceAgent::create`]; encode and I/O failures otherwise.
    pub fn save(&self, handle: &ResourceHandle) -> Result<(), ResourceError> {
        let uuid = handle.uuid();
        let path = self
            .shared
            .metadata
            .resolve_path(uuid)
            .map_err(|_| ResourceError::NotRegistered(uuid))?;

        self.wait_for(handle.clone())?;
        let payload = match handle.payload() {
            Some(payload) => payload,
            None => return Err(ResourceError::NotRegistered(uuid)),
        };

        let codec = self
            .shared
            .codecs
            .codec_for(&path)
            .ok_or_else(|| ResourceError::EncodeFailure {
                path: path.display().to_string(),
                details: "no codec registered for this extension".to_string(),
            })?;
        let bytes = codec
            .encode(payload.as_ref())
            .map_err(|e| ResourceError::EncodeFailure {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;
        self.shared
            .disk
            .write_bytes(&path, &bytes)
            .map_err(|e| ResourceError::Io {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;
        log::debug!("Saved resource {uuid} to '{}'.", path.display());
        Ok(())
    }

    /// Registers a brand-new resource at `path` and performs its initial save.
    ///
    /// The handle's UUID becomes the resource's persistent identifier. With
    /// `overwrite`, an existing record at `path` is replaced and the store
    /// keeps exactly one record for the path.
    ///
    /// # Errors
    /// - [`ResourceError::AlreadyExists`] if `path` is occupied and
    ///   `overwrite` is false.
    /// - [`ResourceError::DuplicateUuid`] if the handle was already created.
    /// - Save errors; the fresh metadata record is rolled back so no record
    ///   points at an unwritten file.
    pub fn create(
        &self,
        handle: &ResourceHandle,
        path: &Path,
        overwrite: bool,
    ) -> Result<(), ResourceError> {
        let uuid = handle.uuid();

        if let Ok(occupant) = self.shared.metadata.resolve_uuid(path) {
            if !overwrite {
                return Err(ResourceError::AlreadyExists(path.display().to_string()));
            }
            self.shared.metadata.remove(occupant)?;
            log::debug!(
                "Overwriting resource {occupant} previously at '{}'.",
                path.display()
            );
        }

        self.shared.metadata.create(uuid, path)?;
        if let Err(e) = self.save(handle) {
            // Roll the record back rather than leave it pointing at a file
            // that was never written.
            let _ = self.shared.metadata.remove(uuid);
            return Err(e);
        }

        // The UUID is persistent now; a stale ephemeral assignment would
        // shadow nothing but is dropped for hygiene.
        self.shared
            .ephemeral
            .lock()
            .unwrap()
            .retain(|_, u| *u != uuid);
        self.shared.loaded.insert(uuid, handle.clone());
        log::info!("Created resource {uuid} at '{}'.", path.display());
        Ok(())
    }

    /// The persistent UUID↔path index backing this agent.
    pub fn metadata(&self) -> &MetadataStore {
        &self.shared.metadata
    }

    /// The number of resources currently resident in the cache.
    pub fn resident_count(&self) -> usize {
        self.shared.loaded.len()
    }

    /// The number of asynchronous loads still in flight.
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_progress.len()
    }

    /// The receiving end of the deferred device-release channel.
    ///
    /// The owning context for device-side sub-resources drains this and picks
    /// the actual reclamation point; the agent only ever *requests* release.
    pub fn release_receiver(&self) -> crossbeam_channel::Receiver<DeviceRelease> {
        self.release_rx.clone()
    }

    /// Resolves the UUID for a path: the metadata store first, then the
    /// ephemeral assignments for temporary resources, allocating a fresh one
    /// on first sight so repeated loads of an unmanaged path deduplicate.
    fn uuid_for_path(&self, path: &Path) -> ResourceUUID {
        if let Ok(uuid) = self.shared.metadata.resolve_uuid(path) {
            return uuid;
        }
        let mut ephemeral = self.shared.ephemeral.lock().unwrap();
        *ephemeral
            .entry(path.to_path_buf())
            .or_insert_with(ResourceUUID::new)
    }

    fn load_internal(
        &self,
        path: &Path,
        uuid: ResourceUUID,
        synchronous: bool,
    ) -> Result<ResourceHandle, ResourceError> {
        enum Dispatch {
            Hit(ResourceHandle),
            InFlight(ResourceHandle),
            Owned(ResourceHandle),
        }

        // One racing caller wins the dispatch; everyone else sees the tables.
        // Only the check-and-register runs under the lock, never the I/O.
        let dispatch = {
            let _guard = self.shared.dispatch.lock().unwrap();

            if let Some(handle) = self.shared.loaded.get(uuid) {
                log::trace!("Cache hit for resource {uuid}.");
                Dispatch::Hit(handle)
            } else if let Some(handle) = self.shared.in_progress.get_handle(uuid) {
                Dispatch::InFlight(handle)
            } else {
                // Miss on both tables: this caller owns the load. The entry
                // is registered before any work happens so the UUID can never
                // be double-dispatched, synchronously or otherwise.
                let handle = ResourceHandle::new_pending(uuid);
                self.shared.in_progress.insert(
                    uuid,
                    AsyncLoadOp {
                        handle: handle.clone(),
                        request_id: 0,
                    },
                );
                Dispatch::Owned(handle)
            }
        };

        let pending = match dispatch {
            Dispatch::Hit(handle) => return Ok(handle),
            Dispatch::InFlight(handle) => {
                return if synchronous {
                    self.wait_for(handle)
                } else {
                    Ok(handle)
                };
            }
            Dispatch::Owned(handle) => handle,
        };

        if synchronous {
            let result = self.shared.read_and_decode(path);
            // The sync path plays both worker and consumer for its own load.
            match self.shared.settle_load(uuid, result) {
                Some(Ok(handle)) => {
                    log::info!("Resource {uuid} loaded from '{}'.", path.display());
                    Ok(handle)
                }
                Some(Err(e)) => Err(e),
                // Only teardown removes the entry out from under us.
                None => Err(ResourceError::Aborted(uuid)),
            }
        } else {
            let request_id = self.work_queue.submit(
                self.channel,
                Box::new(LoadRequest {
                    path: path.to_path_buf(),
                    uuid,
                    handle: pending.clone(),
                }),
            );
            // Record the token for teardown aborts; a no-op if the load
            // already completed in between.
            self.shared.in_progress.set_request_id(uuid, request_id);
            log::debug!(
                "Dispatched async load of resource {uuid} from '{}' (request {request_id}).",
                path.display()
            );
            Ok(pending)
        }
    }

    /// Blocks until an in-flight load (owned by another caller) settles.
    ///
    /// The waiter also drives the response drain: if the caller *is* the
    /// consumer context, nobody else would deliver the completion and a bare
    /// `synchronize()` would deadlock.
    fn wait_for(&self, handle: ResourceHandle) -> Result<ResourceHandle, ResourceError> {
        loop {
            self.work_queue.process_responses();
            match handle.load_state() {
                LoadState::Ready(_) => return Ok(handle),
                LoadState::Failed(e) => return Err(e),
                LoadState::Loading => std::thread::sleep(Duration::from_millis(1)),
            }
        }
    }

    fn schedule_device_release(&self, handle: &ResourceHandle) {
        let Some(payload) = handle.payload() else {
            return;
        };
        let release = DeviceRelease {
            uuid: handle.uuid(),
            payload,
        };
        if self.release_tx.send(release).is_err() {
            // Unreachable while the agent holds its own receiver clone, but
            // harmless: the payload just drops with no device state to free.
            log::warn!("Device release channel disconnected; dropping payload directly.");
        }
    }
}

impl Drop for ResourceAgent {
    fn drop(&mut self) {
        // Abort anything still in flight and wake blocked synchronize()
        // callers before the queue joins its workers. Responses already
        // produced are discarded by the drain's abort check or dropped with
        // the queue, both of which the handlers tolerate.
        let outstanding = self.shared.in_progress.drain();
        for op in &outstanding {
            self.work_queue.abort(op.request_id);
            op.handle.mark_failed(ResourceError::Aborted(op.handle.uuid()));
        }
        if !outstanding.is_empty() {
            log::info!(
                "ResourceAgent shutting down with {} load(s) still in flight.",
                outstanding.len()
            );
        }
        self.work_queue.shutdown();
    }
}
