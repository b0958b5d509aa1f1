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

use super::{ResourceError, ResourcePayload, ResourceUUID};
use std::any::Any;
use std::sync::{Arc, Condvar, Mutex};

/// The lifecycle state of the resource behind a handle.
#[derive(Debug, Clone)]
pub enum LoadState {
    /// The load has been dispatched but has not completed yet. The payload
    /// must not be dereferenced.
    Loading,
    /// The payload is resident and safe to use from any thread.
    Ready(Arc<dyn ResourcePayload>),
    /// The load failed; the handle is permanently unusable.
    Failed(ResourceError),
}

#[derive(Debug)]
struct HandleInner {
    uuid: ResourceUUID,
    state: Mutex<LoadState>,
    ready: Condvar,
}

/// A thread-safe, reference-counted handle to a (possibly still loading) resource.
///
/// This acts as a smart pointer providing shared ownership of a resource's
/// payload. Cloning a handle is cheap: it only increments the reference count.
/// Every caller that requested the same resource holds a clone of the *same*
/// handle, and the cache holds one clone of its own, so the payload outlives
/// individual callers until an explicit unload drops the cache's reference.
///
/// A handle returned by an asynchronous load starts in [`LoadState::Loading`];
/// callers must not touch the payload until [`ResourceHandle::is_loaded`]
/// reports `true`, or may block in [`ResourceHandle::synchronize`] until the
/// load settles.
#[derive(Debug)]
pub struct ResourceHandle {
    inner: Arc<HandleInner>,
}

impl ResourceHandle {
    /// Creates a handle in the `Loading` state, to be completed later by the
    /// consumer context via [`ResourceHandle::mark_ready`] or
    /// [`ResourceHandle::mark_failed`].
    pub fn new_pending(uuid: ResourceUUID) -> Self {
        Self::with_state(uuid, LoadState::Loading)
    }

    /// Creates an immediately-ready handle around an already-decoded payload.
    ///
    /// This is the synchronous-load path: the caller blocked for the full
    /// decode, so there is no `Loading` window to observe.
    pub fn new_ready(uuid: ResourceUUID, payload: Arc<dyn ResourcePayload>) -> Self {
        Self::with_state(uuid, LoadState::Ready(payload))
    }

    fn with_state(uuid: ResourceUUID, state: LoadState) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                uuid,
                state: Mutex::new(state),
                ready: Condvar::new(),
            }),
        }
    }

    /// The stable identifier of the resource this handle refers to.
    pub fn uuid(&self) -> ResourceUUID {
        self.inner.uuid
    }

    /// Returns `true` once the payload is resident and safe to dereference.
    pub fn is_loaded(&self) -> bool {
        matches!(*self.inner.state.lock().unwrap(), LoadState::Ready(_))
    }

    /// Returns a snapshot of the current load state.
    pub fn load_state(&self) -> LoadState {
        self.inner.state.lock().unwrap().clone()
    }

    /// Returns the payload if the handle is ready, `None` while loading or failed.
    pub fn payload(&self) -> Option<Arc<dyn ResourcePayload>> {
        match &*self.inner.state.lock().unwrap() {
            LoadState::Ready(payload) => Some(Arc::clone(payload)),
            _ => None,
        }
    }

    /// Returns the payload downcast to its concrete type.
    ///
    /// Returns `None` if the handle is not ready or the payload is of a
    /// different type.
    pub fn downcast<T: ResourcePayload>(&self) -> Option<Arc<T>> {
        let payload = self.payload()?;
        let any: Arc<dyn Any + Send + Sync> = payload;
        any.downcast::<T>().ok()
    }

    /// Blocks the calling thread until the resource leaves the `Loading` state.
    ///
    /// Returns immediately if the load already settled before this call (no
    /// missed wake-up: the state is checked under the same mutex the completing
    /// thread takes to flip it). On a failed load the parked error is returned
    /// instead of blocking forever.
    pub fn synchronize(&self) -> Result<(), ResourceError> {
        let mut state = self.inner.state.lock().unwrap();
        while matches!(*state, LoadState::Loading) {
            state = self.inner.ready.wait(state).unwrap();
        }
        match &*state {
            LoadState::Ready(_) => Ok(()),
            LoadState::Failed(err) => Err(err.clone()),
            LoadState::Loading => unreachable!(),
        }
    }

    /// Installs the decoded payload and wakes every thread blocked in
    /// [`ResourceHandle::synchronize`].
    ///
    /// Called exactly once per handle, by the consumer context that drains the
    /// work queue response (or inline on the synchronous path).
    pub fn mark_ready(&self, payload: Arc<dyn ResourcePayload>) {
        let mut state = self.inner.state.lock().unwrap();
        *state = LoadState::Ready(payload);
        self.inner.ready.notify_all();
    }

    /// Transitions the handle to `Failed` and wakes all blocked waiters.
    pub fn mark_failed(&self, error: ResourceError) {
        log::warn!("Resource {} failed to load: {error}", self.inner.uuid);
        let mut state = self.inner.state.lock().unwrap();
        *state = LoadState::Failed(error);
        self.inner.ready.notify_all();
    }

    /// The number of strong references to this handle, the cache's included.
    ///
    /// The cache holds exactly one reference per resident resource, so a count
    /// of 1 observed through the cache's own clone means no external caller
    /// still holds the resource.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Returns `true` if both handles are clones referring to the same
    /// underlying resource slot.
    pub fn ptr_eq(&self, other: &ResourceHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for ResourceHandle {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct DummyPayload(u32);
    impl ResourcePayload for DummyPayload {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn ready_handle_is_immediately_loaded() {
        let handle = ResourceHandle::new_ready(ResourceUUID::new(), Arc::new(DummyPayload(7)));
        assert!(handle.is_loaded());
        assert_eq!(handle.downcast::<DummyPayload>().unwrap().0, 7);
        // Completed before synchronize was called; must not block.
        handle.synchronize().unwrap();
    }

    #[test]
    fn synchronize_blocks_until_marked_ready() {
        let handle = ResourceHandle::new_pending(ResourceUUID::new());
        assert!(!handle.is_loaded());

        let waiter = handle.clone();
        let join = thread::spawn(move || {
            waiter.synchronize().unwrap();
            waiter.downcast::<DummyPayload>().unwrap().0
        });

        thread::sleep(Duration::from_millis(20));
        handle.mark_ready(Arc::new(DummyPayload(42)));
        assert_eq!(join.join().unwrap(), 42);
    }

    #[test]
    fn synchronize_reports_failure_instead_of_blocking() {
        let handle = ResourceHandle::new_pending(ResourceUUID::new());

        let waiter = handle.clone();
        let join = thread::spawn(move || waiter.synchronize());

        thread::sleep(Duration::from_millis(20));
        handle.mark_failed(ResourceError::NotFound("missing.tex".to_string()));

        let err = join.join().unwrap().unwrap_err();
        assert_eq!(err, ResourceError::NotFound("missing.tex".to_string()));
        assert!(!handle.is_loaded());
        assert!(handle.payload().is_none());
    }

    #[test]
    fn clones_share_one_slot() {
        let handle = ResourceHandle::new_pending(ResourceUUID::new());
        let clone = handle.clone();
        assert!(handle.ptr_eq(&clone));
        assert_eq!(handle.reference_count(), 2);

        clone.mark_ready(Arc::new(DummyPayload(5)));
        assert!(handle.is_loaded());

        drop(clone);
        assert_eq!(handle.reference_count(), 1);
    }
}
