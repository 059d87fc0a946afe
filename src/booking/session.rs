//! BookingSession: one booking attempt, from service choice to confirmation.
//!
//! The session is the only writer of its `BookingState`. Setters and
//! navigation run synchronously under the state lock; remote work is
//! delegated to the orchestrator and the submission pipeline, which share
//! the same state.

use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::BookingApi;
use crate::config::SessionConfig;
use crate::error::{ApiFailure, FetchError, SelectionError, SubmissionError};

use super::gate;
use super::model::{ClientInfo, Service, TimeSlot};
use super::orchestrator::ResourceOrchestrator;
use super::recovery::{self, Invalidation};
use super::state::{BookingState, ResourceKind};
use super::step::BookingStep;
use super::submission::SubmissionPipeline;

pub struct BookingSession {
    id: Uuid,
    state: Arc<Mutex<BookingState>>,
    resources: ResourceOrchestrator,
    submission: SubmissionPipeline,
}

impl BookingSession {
    pub fn new(api: Arc<dyn BookingApi>, config: &SessionConfig) -> Self {
        let state = Arc::new(Mutex::new(BookingState::default()));
        let resources =
            ResourceOrchestrator::new(Arc::clone(&api), Arc::clone(&state), config.request_timeout);
        let submission = SubmissionPipeline::new(
            api,
            Arc::clone(&state),
            resources.clone(),
            config.request_timeout,
        );
        let id = Uuid::new_v4();
        debug!(session = %id, "Booking session created");
        Self {
            id,
            state,
            resources,
            submission,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Read-only snapshot of the current state.
    pub fn state(&self) -> BookingState {
        self.state.lock().clone()
    }

    pub fn current_step(&self) -> BookingStep {
        self.state.lock().current_step
    }

    pub fn resources(&self) -> &ResourceOrchestrator {
        &self.resources
    }

    // ── Selections ──────────────────────────────────────────────────

    /// Choose the service to book. Changing it drops the date and slot,
    /// which belong to the old service, and invalidates the old service's
    /// cached availability.
    pub fn select_service(&self, service: Service) -> Result<(), SelectionError> {
        if service.id.is_empty() {
            return Err(SelectionError::EmptyServiceId);
        }
        if !service.is_active {
            warn!(session = %self.id, service_id = %service.id, "Rejected inactive service");
            return Err(SelectionError::ServiceInactive { id: service.id });
        }

        let previous = {
            let mut state = self.state.lock();
            ensure_open(&state)?;
            let previous = state
                .selected_service
                .as_ref()
                .map(|s| s.id.clone())
                .filter(|id| *id != service.id);
            if previous.is_some() {
                state.clear_schedule();
            }
            info!(session = %self.id, service_id = %service.id, "Service selected");
            state.selected_service = Some(service);
            self.settle_step(&mut state);
            previous
        };

        if let Some(old_id) = previous {
            self.resources.invalidate_service_availability(&old_id);
        }
        Ok(())
    }

    /// Choose the date. Changing it drops the selected slot.
    pub fn select_date(&self, date: NaiveDate) -> Result<(), SelectionError> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        if state.selected_service.is_none() {
            return Err(SelectionError::NoServiceSelected);
        }
        if state.selected_date != Some(date) {
            state.selected_time_slot = None;
        }
        state.selected_date = Some(date);
        debug!(session = %self.id, %date, "Date selected");
        self.settle_step(&mut state);
        Ok(())
    }

    pub fn select_time_slot(&self, slot: TimeSlot) -> Result<(), SelectionError> {
        let mut state = self.state.lock();
        ensure_open(&state)?;
        if state.selected_service.is_none() {
            return Err(SelectionError::NoServiceSelected);
        }
        if state.selected_date.is_none() {
            return Err(SelectionError::NoDateSelected);
        }
        if !slot.available {
            return Err(SelectionError::SlotUnavailable { id: slot.id });
        }
        debug!(session = %self.id, slot_id = %slot.id, "Time slot selected");
        state.selected_time_slot = Some(slot);
        self.settle_step(&mut state);
        Ok(())
    }

    /// Store the client's details. Fields are validated here; the consent
    /// flags only gate entry to confirmation.
    pub fn set_client_info(&self, info: ClientInfo) -> Result<(), SelectionError> {
        info.validate().map_err(SelectionError::InvalidClientInfo)?;
        let mut state = self.state.lock();
        ensure_open(&state)?;
        state.client_info = Some(info);
        self.settle_step(&mut state);
        Ok(())
    }

    /// Mark the current step complete when its work is done, and pull the
    /// wizard back if a cleared selection invalidated the current step.
    fn settle_step(&self, state: &mut BookingState) {
        let current = state.current_step;
        if gate::step_satisfied(state, current) {
            state.completed_steps.insert(current);
        }
        let consistent = gate::nearest_consistent_step(state);
        if consistent != current {
            info!(
                session = %self.id,
                from = %current,
                to = %consistent,
                "Selection change moved wizard back"
            );
            state.current_step = consistent;
        }
    }

    // ── Navigation ──────────────────────────────────────────────────

    /// Move to `target`. Returns `false`, leaving the state untouched, when
    /// the step gate refuses the transition.
    pub fn go_to_step(&self, target: BookingStep) -> bool {
        let mut state = self.state.lock();
        let current = state.current_step;
        if let Err(denial) = gate::check_transition(&state, target) {
            warn!(session = %self.id, from = %current, to = %target, reason = %denial, "Step transition rejected");
            return false;
        }
        if target == current {
            return true;
        }

        if target > current {
            for step in &BookingStep::ALL[current.index()..target.index()] {
                state.completed_steps.insert(*step);
            }
        }
        state.current_step = target;
        info!(session = %self.id, from = %current, to = %target, "Step changed");
        true
    }

    pub fn go_to_next_step(&self) -> bool {
        match self.current_step().next() {
            Some(next) => self.go_to_step(next),
            None => false,
        }
    }

    pub fn go_to_previous_step(&self) -> bool {
        match self.current_step().previous() {
            Some(previous) => self.go_to_step(previous),
            None => false,
        }
    }

    /// Same rule as `go_to_step`, without moving.
    pub fn can_proceed_to_step(&self, target: BookingStep) -> bool {
        gate::can_proceed(&self.state.lock(), target)
    }

    // ── Remote reads ────────────────────────────────────────────────

    pub async fn fetch_available_services(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<Service>, FetchError> {
        self.resources.fetch_services(force_refresh).await
    }

    /// Dates for the selected service.
    pub async fn fetch_available_dates(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<NaiveDate>, FetchError> {
        let service_id = self
            .selected_service_id()
            .ok_or(FetchError::MissingSelection {
                resource: ResourceKind::Dates,
                reason: SelectionError::NoServiceSelected,
            })?;
        self.resources.fetch_dates(&service_id, force_refresh).await
    }

    /// Slots for the selected service on the selected date.
    pub async fn fetch_available_time_slots(
        &self,
        force_refresh: bool,
    ) -> Result<Vec<TimeSlot>, FetchError> {
        let (service_id, date) = {
            let state = self.state.lock();
            let missing = |reason| FetchError::MissingSelection {
                resource: ResourceKind::TimeSlots,
                reason,
            };
            let service_id = state
                .selected_service
                .as_ref()
                .map(|s| s.id.clone())
                .ok_or_else(|| missing(SelectionError::NoServiceSelected))?;
            let date = state
                .selected_date
                .ok_or_else(|| missing(SelectionError::NoDateSelected))?;
            (service_id, date)
        };
        self.resources
            .fetch_time_slots(&service_id, date, force_refresh)
            .await
    }

    fn selected_service_id(&self) -> Option<String> {
        self.state
            .lock()
            .selected_service
            .as_ref()
            .map(|s| s.id.clone())
    }

    // ── Submission, recovery, reset ─────────────────────────────────

    /// Run the two-phase submission. Returns the booking reference.
    pub async fn submit_booking(&self) -> Result<String, SubmissionError> {
        self.submission.submit().await
    }

    /// Clear recorded errors and rewind to the nearest consistent step if
    /// the current one can no longer be completed. Returns whether the
    /// wizard moved. Client information is always kept.
    pub fn recover_from_error(&self) -> bool {
        let catalog = self.resources.cached_services();
        let (outcome, withdrawn) = {
            let mut state = self.state.lock();
            let selected = state.selected_service.as_ref().map(|s| s.id.clone());
            let outcome = recovery::recover(&mut state, catalog.as_deref());
            let withdrawn = selected
                .filter(|_| outcome.invalidated.contains(&Invalidation::ServiceWithdrawn));
            (outcome, withdrawn)
        };

        if let Some(service_id) = withdrawn {
            self.resources.invalidate_service_availability(&service_id);
        }
        if !outcome.cleared_errors.is_empty() {
            debug!(
                session = %self.id,
                cleared = ?outcome.cleared_errors,
                "Cleared recorded errors"
            );
        }
        outcome.rewound()
    }

    /// Start over: every field back to its initial value, caches emptied.
    /// Work still in flight from before the reset is discarded when it
    /// settles.
    pub fn reset_form(&self) {
        self.resources.clear();
        let mut state = self.state.lock();
        state.reset();
        info!(session = %self.id, epoch = state.epoch(), "Booking form reset");
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn is_resource_loading(&self, kind: ResourceKind) -> bool {
        self.state.lock().is_loading(kind)
    }

    pub fn has_api_error(&self) -> bool {
        self.state.lock().has_api_error()
    }

    pub fn api_error_for(&self, kind: ResourceKind) -> Option<ApiFailure> {
        self.state.lock().error_for(kind).cloned()
    }
}

fn ensure_open(state: &BookingState) -> Result<(), SelectionError> {
    if state.current_step.is_terminal() {
        return Err(SelectionError::AlreadyBooked);
    }
    Ok(())
}
