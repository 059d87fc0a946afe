//! Two-phase booking submission: create the client record, then the booking
//! that references it.
//!
//! The client id from phase 1 is kept in `BookingState::created_client_id`
//! and survives a phase 2 failure, so a retry goes straight to phase 2 and
//! never creates a second client record.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::api::BookingApi;
use crate::error::{ApiError, ApiFailure, ErrorKind, SubmissionError, classify};

use super::model::{ClientInfo, CreateBookingRequest, CreateClientRequest, Service, TimeSlot};
use super::orchestrator::ResourceOrchestrator;
use super::state::{BookingState, ResourceKind};
use super::step::BookingStep;

/// Everything a submission needs, captured from the state up front.
#[derive(Debug, Clone)]
struct SubmissionPlan {
    service: Service,
    date: NaiveDate,
    slot: TimeSlot,
    info: ClientInfo,
    client_id: Option<String>,
    epoch: u64,
}

impl SubmissionPlan {
    fn from_state(state: &BookingState) -> Result<Self, SubmissionError> {
        let not_ready = |reason: &str| SubmissionError::NotReady {
            step: state.current_step,
            reason: reason.to_string(),
        };

        if state.current_step != BookingStep::Confirmation {
            return Err(not_ready("submission is only possible from CONFIRMATION"));
        }
        let service = state
            .selected_service
            .clone()
            .ok_or_else(|| not_ready("no service selected"))?;
        let date = state.selected_date.ok_or_else(|| not_ready("no date selected"))?;
        let slot = state
            .selected_time_slot
            .clone()
            .ok_or_else(|| not_ready("no time slot selected"))?;
        let info = state
            .client_info
            .clone()
            .ok_or_else(|| not_ready("client information missing"))?;
        if !info.has_all_consents() {
            return Err(not_ready("all consent flags must be accepted"));
        }

        Ok(Self {
            service,
            date,
            slot,
            info,
            client_id: state.created_client_id.clone(),
            epoch: state.epoch(),
        })
    }
}

/// Executes the two-phase remote write.
pub struct SubmissionPipeline {
    phases: Phases,
    /// Serializes submissions; a second caller waits and then sees the
    /// first one's outcome in the state.
    in_progress: Arc<tokio::sync::Mutex<()>>,
}

impl SubmissionPipeline {
    pub fn new(
        api: Arc<dyn BookingApi>,
        state: Arc<Mutex<BookingState>>,
        resources: ResourceOrchestrator,
        request_timeout: Duration,
    ) -> Self {
        Self {
            phases: Phases {
                api,
                state,
                resources,
                request_timeout,
            },
            in_progress: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Submit the booking. Returns the booking reference on success.
    ///
    /// Calling this again after a successful submission returns the existing
    /// reference without any network traffic. The remote calls run on their
    /// own task: a caller that stops waiting does not abandon a half-written
    /// submission, and the loading flags still settle.
    pub async fn submit(&self) -> Result<String, SubmissionError> {
        let guard = Arc::clone(&self.in_progress).lock_owned().await;
        let phases = self.phases.clone();

        let task = tokio::spawn(async move {
            let outcome = phases.run().await;
            drop(guard);
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => match e.try_into_panic() {
                Ok(panic) => std::panic::resume_unwind(panic),
                Err(_) => Err(SubmissionError::Discarded),
            },
        }
    }
}

#[derive(Clone)]
struct Phases {
    api: Arc<dyn BookingApi>,
    state: Arc<Mutex<BookingState>>,
    resources: ResourceOrchestrator,
    request_timeout: Duration,
}

impl Phases {
    async fn run(&self) -> Result<String, SubmissionError> {
        let plan = {
            let state = self.state.lock();
            if let Some(ref reference) = state.booking_reference {
                debug!(reference = %reference, "Booking already submitted");
                return Ok(reference.clone());
            }
            SubmissionPlan::from_state(&state)?
        };

        let client_id = match plan.client_id.clone() {
            Some(id) => {
                debug!(client_id = %id, "Client already created; skipping phase 1");
                id
            }
            None => self.create_client(&plan).await?,
        };

        self.create_booking(&plan, &client_id).await
    }

    async fn create_client(&self, plan: &SubmissionPlan) -> Result<String, SubmissionError> {
        self.begin(plan.epoch, ResourceKind::ClientCreation)?;

        let request = CreateClientRequest::from(&plan.info);
        let outcome = self.call(self.api.create_client(&request)).await;

        let mut state = self.state.lock();
        if state.epoch() != plan.epoch {
            return Err(SubmissionError::Discarded);
        }
        match outcome {
            Ok(record) => {
                state.finish_loading(ResourceKind::ClientCreation, None);
                // Never overwrite an id from an earlier attempt.
                let id = state
                    .created_client_id
                    .get_or_insert_with(|| record.id.clone())
                    .clone();
                info!(client_id = %id, "Client record created");
                Ok(id)
            }
            Err(failure) => {
                warn!(
                    kind = %failure.kind,
                    status = ?failure.status,
                    retryable = failure.kind.is_transient(),
                    "Client creation failed; booking not attempted"
                );
                state.finish_loading(ResourceKind::ClientCreation, Some(failure.clone()));
                Err(SubmissionError::ClientCreation(failure))
            }
        }
    }

    async fn create_booking(
        &self,
        plan: &SubmissionPlan,
        client_id: &str,
    ) -> Result<String, SubmissionError> {
        self.begin(plan.epoch, ResourceKind::Booking)?;

        let request =
            CreateBookingRequest::new(client_id, &plan.service, plan.date, &plan.slot, &plan.info);
        let outcome = self.call(self.api.create_booking(&request)).await;

        let failure = {
            let mut state = self.state.lock();
            if state.epoch() != plan.epoch {
                return Err(SubmissionError::Discarded);
            }
            match outcome {
                Ok(record) => {
                    let reference = record.reference_or_id().to_string();
                    state.finish_loading(ResourceKind::Booking, None);
                    state.booking_reference = Some(reference.clone());
                    state.completed_steps.insert(BookingStep::Confirmation);
                    state.completed_steps.insert(BookingStep::Success);
                    state.current_step = BookingStep::Success;
                    info!(
                        reference = %reference,
                        client_id = client_id,
                        service_id = %plan.service.id,
                        date = %plan.date,
                        slot_id = %plan.slot.id,
                        "Booking confirmed"
                    );
                    return Ok(reference);
                }
                Err(failure) => {
                    warn!(
                        kind = %failure.kind,
                        status = ?failure.status,
                        retryable = failure.kind.is_transient(),
                        client_id = client_id,
                        "Booking creation failed; client id kept for retry"
                    );
                    state.finish_loading(ResourceKind::Booking, Some(failure.clone()));
                    failure
                }
            }
        };

        if failure.kind == ErrorKind::Conflict {
            self.resources
                .invalidate_time_slots(&plan.service.id, plan.date);
        }
        Err(SubmissionError::BookingCreation(failure))
    }

    fn begin(&self, epoch: u64, kind: ResourceKind) -> Result<(), SubmissionError> {
        let mut state = self.state.lock();
        if state.epoch() != epoch {
            return Err(SubmissionError::Discarded);
        }
        state.begin_loading(kind);
        Ok(())
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiFailure> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(&e)),
            Err(_) => Err(classify(&ApiError::Timeout(self.request_timeout))),
        }
    }
}
