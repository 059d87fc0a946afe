//! Error recovery. Decides whether the client can retry in place or the
//! wizard has to rewind to the last consistent step.
//!
//! Recovery never discards `client_info`; only selections that are known to
//! be invalid (a withdrawn service, a slot taken by someone else) are dropped.

use tracing::info;

use crate::error::ErrorKind;

use super::gate;
use super::model::Service;
use super::state::{BookingState, ResourceKind};
use super::step::BookingStep;

/// Why a selection was dropped during recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// The selected service is gone from the catalog or inactive.
    ServiceWithdrawn,
    /// Booking creation reported the slot as taken.
    SlotTaken,
}

/// What `recover` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome {
    pub from: BookingStep,
    pub to: BookingStep,
    pub cleared_errors: Vec<ResourceKind>,
    pub invalidated: Vec<Invalidation>,
}

impl RecoveryOutcome {
    pub fn rewound(&self) -> bool {
        self.to != self.from
    }
}

/// Clear errors and rewind if the current step is no longer reachable.
///
/// `catalog` is the last fetched service list, used to detect a selected
/// service that has since been withdrawn.
pub fn recover(state: &mut BookingState, catalog: Option<&[Service]>) -> RecoveryOutcome {
    let from = state.current_step;
    if from.is_terminal() {
        return RecoveryOutcome {
            from,
            to: from,
            cleared_errors: Vec::new(),
            invalidated: Vec::new(),
        };
    }

    let mut invalidated = Vec::new();

    if let (Some(selected), Some(catalog)) = (state.selected_service.as_ref(), catalog) {
        let still_offered = catalog
            .iter()
            .any(|s| s.id == selected.id && s.is_active);
        if !still_offered {
            state.selected_service = None;
            state.clear_schedule();
            invalidated.push(Invalidation::ServiceWithdrawn);
        }
    }

    let booking_error = state.error_for(ResourceKind::Booking).map(|f| f.kind);
    let client_error = state.error_for(ResourceKind::ClientCreation).map(|f| f.kind);

    if booking_error == Some(ErrorKind::Conflict) && state.selected_time_slot.is_some() {
        state.selected_time_slot = None;
        invalidated.push(Invalidation::SlotTaken);
    }

    let needs_client_edit = [booking_error, client_error].contains(&Some(ErrorKind::Validation));

    let cleared_errors: Vec<ResourceKind> = state.api_errors.keys().copied().collect();
    state.api_errors.clear();

    let mut to = gate::nearest_consistent_step(state);
    if needs_client_edit && to > BookingStep::ClientInformation {
        to = BookingStep::ClientInformation;
    }
    state.current_step = to;

    if to != from {
        info!(
            from = %from,
            to = %to,
            invalidated = ?invalidated,
            "Recovered by rewinding to last consistent step"
        );
    }

    RecoveryOutcome {
        from,
        to,
        cleared_errors,
        invalidated,
    }
}
