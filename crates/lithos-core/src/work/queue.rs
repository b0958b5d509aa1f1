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

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

/// Identifies a logical request-type category. Handlers are matched by channel.
pub type ChannelId = u16;

/// A token identifying one submitted request, usable for abortion.
pub type RequestId = u64;

/// A unit of work travelling from a producer to a worker thread.
///
/// The payload is opaque to the queue; the handler registered for the
/// request's channel downcasts it back to its concrete type.
pub struct WorkRequest {
    id: RequestId,
    channel: ChannelId,
    payload: Box<dyn Any + Send>,
}

impl std::fmt::Debug for WorkRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkRequest")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl WorkRequest {
    /// The token returned to the producer that submitted this request.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// The channel this request was submitted on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Borrows the payload downcast to its concrete type.
    pub fn downcast_payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Consumes the request, producing the response that answers it.
    ///
    /// The response inherits the request's id and channel so the consumer side
    /// can correlate it with the originating submission.
    pub fn into_response(self, payload: Box<dyn Any + Send>) -> WorkResponse {
        WorkResponse {
            request_id: self.id,
            channel: self.channel,
            payload,
        }
    }
}

/// The result of executing a [`WorkRequest`], owned by the queue until the
/// consumer context drains it.
pub struct WorkResponse {
    request_id: RequestId,
    channel: ChannelId,
    payload: Box<dyn Any + Send>,
}

impl std::fmt::Debug for WorkResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkResponse")
            .field("request_id", &self.request_id)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl WorkResponse {
    /// The id of the request this response answers.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The channel the originating request was submitted on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Borrows the payload downcast to its concrete type.
    pub fn downcast_payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

/// Executes requests on worker threads.
///
/// A handler is consulted with [`RequestHandler::can_handle`] before being
/// given a request; the first registered handler that accepts wins. Handlers
/// must be thread-safe since any worker may invoke them.
pub trait RequestHandler: Send + Sync {
    /// Returns `true` if this handler recognizes the request's channel and
    /// payload type.
    fn can_handle(&self, request: &WorkRequest) -> bool;

    /// Executes the request, returning the response to queue for the consumer
    /// context, or `None` if no response should be delivered.
    fn handle(&self, request: WorkRequest) -> Option<WorkResponse>;
}

/// Dispatches drained responses on the consumer context.
pub trait ResponseHandler: Send + Sync {
    /// Returns `true` if this handler recognizes the response's channel and
    /// payload type.
    fn can_handle(&self, response: &WorkResponse) -> bool;

    /// Consumes the response. Runs only on the thread calling
    /// [`WorkQueue::process_responses`], so it may safely touch
    /// consumer-owned state.
    fn handle(&self, response: WorkResponse);
}

/// A multi-producer/multi-worker/single-consumer request pipeline.
///
/// Producers submit channel-tagged requests and immediately receive a
/// [`RequestId`]. A pool of worker threads pulls requests, matches them
/// against registered [`RequestHandler`]s and queues the produced responses.
/// Exactly one consumer context periodically calls
/// [`WorkQueue::process_responses`] to drain them; workers never touch
/// consumer-side data structures directly.
///
/// Responses are delivered in the order their requests *complete*. Concurrent
/// producers must not rely on submission order across workers.
pub struct WorkQueue {
    // `None` only during teardown: taking the sender disconnects the request
    // pipe, which is what drains the workers out of their recv loop.
    request_tx: Option<flume::Sender<WorkRequest>>,
    request_rx: flume::Receiver<WorkRequest>,
    response_tx: flume::Sender<WorkResponse>,
    response_rx: flume::Receiver<WorkResponse>,

    channels: Mutex<ChannelTable>,
    next_request_id: AtomicU64,
    aborted: Arc<Mutex<HashSet<RequestId>>>,

    request_handlers: Arc<RwLock<Vec<Arc<dyn RequestHandler>>>>,
    response_handlers: RwLock<Vec<Arc<dyn ResponseHandler>>>,

    workers: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Default)]
struct ChannelTable {
    by_name: HashMap<String, ChannelId>,
    next: ChannelId,
}

impl WorkQueue {
    /// Creates a new queue with no worker threads running.
    ///
    /// Call [`WorkQueue::start`] to spin up the pool; requests submitted
    /// before that simply sit in the pipe.
    pub fn new() -> Self {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        log::info!("WorkQueue initialized.");
        Self {
            request_tx: Some(request_tx),
            request_rx,
            response_tx,
            response_rx,
            channels: Mutex::new(ChannelTable::default()),
            next_request_id: AtomicU64::new(1),
            aborted: Arc::new(Mutex::new(HashSet::new())),
            request_handlers: Arc::new(RwLock::new(Vec::new())),
            response_handlers: RwLock::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Resolves a channel name to its stable id, allocating one on first use.
    pub fn resolve_channel(&self, name: &str) -> ChannelId {
        let mut table = self.channels.lock().unwrap();
        if let Some(id) = table.by_name.get(name) {
            return *id;
        }
        let id = table.next;
        table.next += 1;
        table.by_name.insert(name.to_string(), id);
        log::debug!("WorkQueue channel '{name}' resolved to id {id}.");
        id
    }

    /// Spawns `worker_count` worker threads pulling from the request pipe.
    pub fn start(&self, worker_count: usize) {
        let mut workers = self.workers.lock().unwrap();
        for index in 0..worker_count {
            let request_rx = self.request_rx.clone();
            let response_tx = self.response_tx.clone();
            let handlers = Arc::clone(&self.request_handlers);
            let aborted = Arc::clone(&self.aborted);
            let handle = std::thread::Builder::new()
                .name(format!("lithos-worker-{index}"))
                .spawn(move || worker_loop(request_rx, response_tx, handlers, aborted))
                .expect("failed to spawn work queue worker");
            workers.push(handle);
        }
        log::info!("WorkQueue started {worker_count} worker thread(s).");
    }

    /// Registers a handler executing requests on worker threads.
    pub fn register_request_handler(&self, handler: Arc<dyn RequestHandler>) {
        self.request_handlers.write().unwrap().push(handler);
    }

    /// Registers a handler dispatching drained responses on the consumer context.
    pub fn register_response_handler(&self, handler: Arc<dyn ResponseHandler>) {
        self.response_handlers.write().unwrap().push(handler);
    }

    /// Submits a request on `channel` and returns its token immediately.
    ///
    /// Never blocks; the request is executed by whichever worker claims it
    /// first.
    pub fn submit(&self, channel: ChannelId, payload: Box<dyn Any + Send>) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let request = WorkRequest {
            id,
            channel,
            payload,
        };
        if let Some(tx) = &self.request_tx {
            if let Err(e) = tx.send(request) {
                log::error!("Failed to submit work request: {e}. Workers likely gone.");
            }
        }
        id
    }

    /// Marks a request as aborted.
    ///
    /// If no worker has claimed the request yet it is dropped at claim time.
    /// A request already being executed runs to completion, but its response
    /// is discarded during the drain instead of being dispatched.
    pub fn abort(&self, request_id: RequestId) {
        self.aborted.lock().unwrap().insert(request_id);
    }

    /// Drains all pending responses and dispatches each to a matching
    /// response handler.
    ///
    /// Non-blocking. Must be called from exactly one designated consumer
    /// context; that single-writer rule is what lets response handlers mutate
    /// consumer-owned state without per-entry locking.
    pub fn process_responses(&self) {
        for response in self.response_rx.try_iter() {
            if self.aborted.lock().unwrap().remove(&response.request_id) {
                log::trace!(
                    "Discarding response for aborted request {}.",
                    response.request_id
                );
                continue;
            }
            let handlers = self.response_handlers.read().unwrap();
            match handlers.iter().find(|h| h.can_handle(&response)) {
                Some(handler) => handler.handle(response),
                None => log::warn!(
                    "No response handler for channel {}; response dropped.",
                    response.channel
                ),
            }
        }
    }

    /// Disconnects the request pipe and joins all worker threads.
    ///
    /// Workers drain what is already queued before exiting (aborted requests
    /// are skipped at claim time, so abort-then-shutdown is fast). Undrained
    /// responses stay in the pipe and are freed with the queue.
    pub fn shutdown(&mut self) {
        if self.request_tx.take().is_none() {
            return;
        }
        let workers: Vec<_> = self.workers.lock().unwrap().drain(..).collect();
        for worker in workers {
            if worker.join().is_err() {
                log::error!("A work queue worker panicked during shutdown.");
            }
        }
        log::info!("WorkQueue shut down.");
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WorkQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    request_rx: flume::Receiver<WorkRequest>,
    response_tx: flume::Sender<WorkResponse>,
    handlers: Arc<RwLock<Vec<Arc<dyn RequestHandler>>>>,
    aborted: Arc<Mutex<HashSet<RequestId>>>,
) {
    // Exits when every sender is gone, i.e. on queue shutdown.
    while let Ok(request) = request_rx.recv() {
        if aborted.lock().unwrap().remove(&request.id) {
            log::trace!("Dropping aborted request {} before execution.", request.id);
            continue;
        }

        let handler = {
            let handlers = handlers.read().unwrap();
            handlers.iter().find(|h| h.can_handle(&request)).cloned()
        };

        let Some(handler) = handler else {
            log::warn!(
                "No request handler for channel {}; request {} dropped.",
                request.channel,
                request.id
            );
            continue;
        };

        if let Some(response) = handler.handle(request) {
            // A send failure means the queue is being torn down; the response
            // is discarded, which teardown tolerates.
            let _ = response_tx.send(response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    struct DoublingHandler {
        channel: ChannelId,
    }

    impl RequestHandler for DoublingHandler {
        fn can_handle(&self, request: &WorkRequest) -> bool {
            request.channel() == self.channel
        }

        fn handle(&self, request: WorkRequest) -> Option<WorkResponse> {
            let value = *request.downcast_payload::<u32>()?;
            Some(request.into_response(Box::new(value * 2)))
        }
    }

    struct CollectingHandler {
        channel: ChannelId,
        results: Arc<Mutex<Vec<(RequestId, u32)>>>,
    }

    impl ResponseHandler for CollectingHandler {
        fn can_handle(&self, response: &WorkResponse) -> bool {
            response.channel() == self.channel
        }

        fn handle(&self, response: WorkResponse) {
            let value = *response.downcast_payload::<u32>().unwrap();
            self.results
                .lock()
                .unwrap()
                .push((response.request_id(), value));
        }
    }

    fn drain_until(queue: &WorkQueue, results: &Mutex<Vec<(RequestId, u32)>>, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while results.lock().unwrap().len() < count {
            assert!(Instant::now() < deadline, "responses never arrived");
            queue.process_responses();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn doubling_queue() -> (WorkQueue, ChannelId, Arc<Mutex<Vec<(RequestId, u32)>>>) {
        let queue = WorkQueue::new();
        let channel = queue.resolve_channel("test");
        let results = Arc::new(Mutex::new(Vec::new()));
        queue.register_request_handler(Arc::new(DoublingHandler { channel }));
        queue.register_response_handler(Arc::new(CollectingHandler {
            channel,
            results: Arc::clone(&results),
        }));
        (queue, channel, results)
    }

    #[test]
    fn channel_ids_are_stable_per_name() {
        let queue = WorkQueue::new();
        let a = queue.resolve_channel("resources");
        let b = queue.resolve_channel("telemetry");
        assert_ne!(a, b);
        assert_eq!(queue.resolve_channel("resources"), a);
    }

    #[test]
    fn requests_round_trip_through_workers() {
        let (queue, channel, results) = doubling_queue();
        queue.start(2);

        let id = queue.submit(channel, Box::new(21u32));
        drain_until(&queue, &results, 1);

        assert_eq!(*results.lock().unwrap(), vec![(id, 42)]);
    }

    #[test]
    fn many_requests_all_complete() {
        let (queue, channel, results) = doubling_queue();
        queue.start(4);

        for value in 0..64u32 {
            queue.submit(channel, Box::new(value));
        }
        drain_until(&queue, &results, 64);

        let mut values: Vec<u32> = results.lock().unwrap().iter().map(|(_, v)| *v).collect();
        values.sort_unstable();
        let expected: Vec<u32> = (0..64).map(|v| v * 2).collect();
        assert_eq!(values, expected);
    }

    #[test]
    fn aborted_request_is_never_executed() {
        let (queue, channel, results) = doubling_queue();

        // Workers are not running yet, so the abort beats any claim.
        let id = queue.submit(channel, Box::new(7u32));
        queue.abort(id);
        queue.start(1);

        let live = queue.submit(channel, Box::new(1u32));
        drain_until(&queue, &results, 1);

        assert_eq!(*results.lock().unwrap(), vec![(live, 2)]);
    }

    #[test]
    fn unhandled_channel_does_not_wedge_workers() {
        let (queue, channel, results) = doubling_queue();
        queue.start(1);

        let unhandled = queue.resolve_channel("nobody-home");
        queue.submit(unhandled, Box::new(3u32));
        let id = queue.submit(channel, Box::new(5u32));
        drain_until(&queue, &results, 1);

        assert_eq!(*results.lock().unwrap(), vec![(id, 10)]);
    }

    #[test]
    fn shutdown_with_pending_requests_does_not_hang() {
        let (queue, channel, _results) = doubling_queue();
        queue.start(2);
        for value in 0..32u32 {
            queue.submit(channel, Box::new(value));
        }
        // Dropping the queue disconnects the pipe and joins the workers;
        // undrained responses are discarded safely.
        drop(queue);
    }
}
