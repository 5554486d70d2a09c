use std::{sync::Arc, time::Duration};

use corral_model::{
    AllocateCall, AllocationRequest, AllocationUpdate, ClusterLimits, ContainerId, FinalStatus,
    JobId, Priority, ResourceCapability,
};
use tracing::{debug, instrument, trace};

use crate::{
    error::{CoordinatorError, NegotiationError, RegistrationError},
    protocol::SchedulerApi,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatorState {
    New,
    Registered,
    Unregistered,
}

/// Request/response wrapper around the coordinator's allocation protocol for one job.
///
/// Asks accumulate locally and travel with the next [`poll`](Self::poll) as a
/// full table aggregated per capability and priority. Granted containers are
/// subtracted from that table as they arrive.
pub struct ResourceNegotiator {
    api: Arc<dyn SchedulerApi>,
    job: JobId,
    state: NegotiatorState,
    asks: Vec<AllocationRequest>,
    releases: Vec<ContainerId>,
    progress: f32,
    /// Id of the last update received, echoed back as the acknowledgement.
    last_response: u64,
}

impl ResourceNegotiator {
    pub fn new(api: Arc<dyn SchedulerApi>, job: JobId) -> Self {
        Self {
            api,
            job,
            state: NegotiatorState::New,
            asks: Vec::new(),
            releases: Vec::new(),
            progress: 0.0,
            last_response: 0,
        }
    }

    pub fn job(&self) -> &JobId {
        &self.job
    }

    pub fn state(&self) -> NegotiatorState {
        self.state
    }

    #[instrument(level = "debug", skip(self), fields(job = %self.job))]
    pub async fn register(&mut self) -> Result<ClusterLimits, RegistrationError> {
        if self.state != NegotiatorState::New {
            return Err(RegistrationError::AlreadyRegistered(self.job.clone()));
        }
        let limits = self.api.register(&self.job).await?;
        self.state = NegotiatorState::Registered;
        debug!(target: "corral.core.negotiator", max = %limits.max_capability, nodes = limits.node_count, "registered");
        Ok(limits)
    }

    /// Add `count` containers of `capability` to the outstanding asks. No network call.
    pub fn request_slots(
        &mut self,
        capability: ResourceCapability,
        priority: Priority,
        count: u32,
    ) -> Result<(), NegotiationError> {
        self.ensure_registered()?;
        if count == 0 {
            return Ok(());
        }
        match self
            .asks
            .iter_mut()
            .find(|a| a.capability == capability && a.priority == priority)
        {
            Some(ask) => ask.count += count,
            None => self.asks.push(AllocationRequest {
                capability,
                priority,
                count,
            }),
        }
        Ok(())
    }

    /// Hand a container back on the next poll.
    pub fn release(&mut self, container: ContainerId) {
        if !self.releases.contains(&container) {
            self.releases.push(container);
        }
    }

    /// Progress in `[0, 1]` reported with every poll.
    pub fn set_progress(&mut self, progress: f32) {
        self.progress = progress.clamp(0.0, 1.0);
    }

    /// Containers still asked for and not yet granted.
    pub fn outstanding(&self) -> u32 {
        self.asks.iter().map(|a| a.count).sum()
    }

    /// One allocate round-trip, bounded by `timeout_hint`.
    ///
    /// An elapsed hint is reported as a transient failure; the asks are kept
    /// and re-sent on the next call. Since that call still carries the old
    /// acknowledgement, the coordinator re-delivers whatever the lost update held.
    pub async fn poll(&mut self, timeout_hint: Duration) -> Result<AllocationUpdate, NegotiationError> {
        self.ensure_registered()?;
        let call = AllocateCall {
            response_id: self.last_response,
            asks: self.asks.clone(),
            releases: self.releases.clone(),
            progress: self.progress,
        };

        let update = match tokio::time::timeout(timeout_hint, self.api.allocate(&self.job, call)).await {
            Err(_) => {
                return Err(NegotiationError::Transient(CoordinatorError::Timeout(
                    timeout_hint,
                )));
            }
            Ok(result) => result?,
        };

        self.last_response = update.response_id;
        self.releases.clear();
        for handle in &update.allocated {
            self.consume_ask(&handle.capability);
        }
        trace!(
            target: "corral.core.negotiator",
            allocated = update.allocated.len(),
            completed = update.completed.len(),
            outstanding = self.outstanding(),
            "poll"
        );
        Ok(update)
    }

    /// Terminal call; afterwards the negotiator refuses further requests.
    #[instrument(level = "debug", skip(self, message), fields(job = %self.job))]
    pub async fn unregister(
        &mut self,
        status: FinalStatus,
        message: &str,
    ) -> Result<(), NegotiationError> {
        self.ensure_registered()?;
        self.api.unregister(&self.job, status, message).await?;
        self.state = NegotiatorState::Unregistered;
        self.asks.clear();
        self.releases.clear();
        debug!(target: "corral.core.negotiator", ?status, "unregistered");
        Ok(())
    }

    fn ensure_registered(&self) -> Result<(), NegotiationError> {
        match self.state {
            NegotiatorState::Registered => Ok(()),
            other => Err(NegotiationError::InvalidState(other)),
        }
    }

    fn consume_ask(&mut self, capability: &ResourceCapability) {
        let idx = self
            .asks
            .iter()
            .position(|a| a.count > 0 && a.capability == *capability)
            .or_else(|| {
                self.asks
                    .iter()
                    .position(|a| a.count > 0 && capability.fits_within(&a.capability))
            });
        if let Some(i) = idx {
            self.asks[i].count -= 1;
        }
        self.asks.retain(|a| a.count > 0);
    }
}
