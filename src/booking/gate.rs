//! Step gate rules as pure predicates over a `BookingState`.
//!
//! | Step               | Required to enter                          |
//! |--------------------|--------------------------------------------|
//! | ServiceSelection   | nothing                                    |
//! | DateSelection      | selected service                           |
//! | ClientInformation  | the above + selected date and time slot    |
//! | Confirmation       | the above + client info with all consents  |
//! | Success            | a booking reference from submission        |
//!
//! Requirements are cumulative, so "prerequisites of step N hold" implies
//! they hold for every earlier step too.

use super::state::BookingState;
use super::step::BookingStep;

/// Why a transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("the booking is complete; only a reset leaves the success step")]
    Terminal,

    #[error("cannot skip from {from} to {to} past steps that were never completed")]
    SkipsAhead { from: BookingStep, to: BookingStep },

    #[error("prerequisites for {0} are not met")]
    MissingPrerequisites(BookingStep),
}

/// Whether the data required to enter `step` is present.
pub fn prerequisites_met(state: &BookingState, step: BookingStep) -> bool {
    match step {
        BookingStep::ServiceSelection => true,
        BookingStep::DateSelection => state.selected_service.is_some(),
        BookingStep::ClientInformation => {
            prerequisites_met(state, BookingStep::DateSelection)
                && state.selected_date.is_some()
                && state.selected_time_slot.is_some()
        }
        BookingStep::Confirmation => {
            prerequisites_met(state, BookingStep::ClientInformation)
                && state
                    .client_info
                    .as_ref()
                    .is_some_and(|info| info.has_all_consents())
        }
        BookingStep::Success => state.booking_reference.is_some(),
    }
}

/// Whether the work of `step` itself is done, i.e. the next step could be
/// entered.
pub fn step_satisfied(state: &BookingState, step: BookingStep) -> bool {
    match step.next() {
        Some(next) => prerequisites_met(state, next),
        None => state.booking_reference.is_some(),
    }
}

/// The rule `goToStep` applies.
///
/// Moving back is always allowed (except out of Success). Moving forward is
/// allowed one step at a time, or further when every step in between was
/// already completed; in both cases the target's prerequisites must hold.
pub fn check_transition(state: &BookingState, target: BookingStep) -> Result<(), Denial> {
    let current = state.current_step;
    if target == current {
        return Ok(());
    }
    if current.is_terminal() {
        return Err(Denial::Terminal);
    }
    if target < current {
        return Ok(());
    }

    let skipped_incomplete = BookingStep::ALL[current.index() + 1..target.index()]
        .iter()
        .any(|step| !state.completed_steps.contains(step));
    if skipped_incomplete {
        return Err(Denial::SkipsAhead {
            from: current,
            to: target,
        });
    }

    if !prerequisites_met(state, target) {
        return Err(Denial::MissingPrerequisites(target));
    }
    Ok(())
}

pub fn can_proceed(state: &BookingState, target: BookingStep) -> bool {
    check_transition(state, target).is_ok()
}

/// Highest step at or below the current one whose prerequisites still hold.
pub fn nearest_consistent_step(state: &BookingState) -> BookingStep {
    BookingStep::ALL[..=state.current_step.index()]
        .iter()
        .rev()
        .copied()
        .find(|step| prerequisites_met(state, *step))
        .unwrap_or(BookingStep::ServiceSelection)
}
