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

//! Work queue handlers for the resource load channel.
//!
//! The request handler runs on worker threads and performs the blocking part
//! of a load (disk read + decode). The response handler runs only on the
//! consumer context draining the queue; it is the sole writer of the
//! loaded/in-progress tables for asynchronous completions.

use super::agent::AgentShared;
use lithos_core::resource::{ResourceError, ResourceHandle, ResourcePayload, ResourceUUID};
use lithos_core::work::{ChannelId, RequestHandler, ResponseHandler, WorkRequest, WorkResponse};
use std::path::PathBuf;
use std::sync::Arc;

/// The payload of a load request travelling to a worker thread.
///
/// Carries the target handle so the completion can be correlated even if the
/// in-progress ledger raced a teardown.
#[derive(Debug)]
pub(super) struct LoadRequest {
    pub path: PathBuf,
    pub uuid: ResourceUUID,
    pub handle: ResourceHandle,
}

/// The payload of a completed load travelling back to the consumer context.
#[derive(Debug)]
pub(super) struct LoadResponse {
    pub uuid: ResourceUUID,
    pub result: Result<Arc<dyn ResourcePayload>, ResourceError>,
}

/// Executes load requests on worker threads: read bytes, decode, answer.
pub(super) struct LoadRequestHandler {
    pub shared: Arc<AgentShared>,
    pub channel: ChannelId,
}

impl RequestHandler for LoadRequestHandler {
    fn can_handle(&self, request: &WorkRequest) -> bool {
        request.channel() == self.channel && request.downcast_payload::<LoadRequest>().is_some()
    }

    fn handle(&self, request: WorkRequest) -> Option<WorkResponse> {
        let load = request.downcast_payload::<LoadRequest>()?;
        let uuid = load.uuid;

        // The in-progress ledger holds one clone of the handle; if this
        // request's own clone is the only one left, every interested party
        // (ledger included) is gone and decoding would be wasted work.
        if load.handle.reference_count() == 1 {
            log::debug!("Skipping load of abandoned resource {uuid}.");
            return None;
        }

        let result = self.shared.read_and_decode(&load.path);
        log::trace!(
            "Worker finished load request {} for resource {uuid}.",
            request.id()
        );
        Some(request.into_response(Box::new(LoadResponse { uuid, result })))
    }
}

/// Installs completed loads into the cache on the consumer context.
pub(super) struct LoadResponseHandler {
    pub shared: Arc<AgentShared>,
    pub channel: ChannelId,
}

impl ResponseHandler for LoadResponseHandler {
    fn can_handle(&self, response: &WorkResponse) -> bool {
        response.channel() == self.channel && response.downcast_payload::<LoadResponse>().is_some()
    }

    fn handle(&self, response: WorkResponse) {
        let Some(load) = response.downcast_payload::<LoadResponse>() else {
            return;
        };
        let uuid = load.uuid;

        // The table move happens atomically under the dispatch lock so a
        // racing load always joins this handle instead of starting over.
        match self.shared.settle_load(uuid, load.result.clone()) {
            Some(Ok(_)) => log::info!("Resource {uuid} finished loading asynchronously."),
            // The handle leaves the in-progress ledger permanently; a later
            // load of the same UUID starts from a fresh handle.
            Some(Err(_)) => {}
            // The entry is gone if the agent tore down (or the load was
            // abandoned) while this response was in flight.
            None => log::debug!("Discarding load response for abandoned resource {uuid}."),
        }
    }
}
