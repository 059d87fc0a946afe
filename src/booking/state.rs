//! The booking aggregate: wizard position, selections, and per-resource
//! loading/error bookkeeping.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiFailure;

use super::model::{ClientInfo, Service, TimeSlot};
use super::step::BookingStep;

/// A loadable unit of remote work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Services,
    Dates,
    TimeSlots,
    Booking,
    ClientCreation,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Services => "services",
            Self::Dates => "dates",
            Self::TimeSlots => "timeSlots",
            Self::Booking => "booking",
            Self::ClientCreation => "clientCreation",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache keys, `kind[:param...]`. Ids are escaped so a `:` inside one
/// cannot be mistaken for a separator.
pub mod keys {
    use chrono::NaiveDate;

    pub fn services() -> String {
        "services".to_string()
    }

    pub fn dates(service_id: &str) -> String {
        format!("dates:{}", escape(service_id))
    }

    pub fn time_slots(service_id: &str, date: NaiveDate) -> String {
        format!("timeSlots:{}:{date}", escape(service_id))
    }

    /// Prefix matching every time-slot key for a service.
    pub fn time_slots_prefix(service_id: &str) -> String {
        format!("timeSlots:{}:", escape(service_id))
    }

    fn escape(id: &str) -> String {
        id.replace('%', "%25").replace(':', "%3A")
    }
}

/// Booking session state. One owner (`BookingSession`); everything else
/// reads snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingState {
    pub current_step: BookingStep,
    /// Grows monotonically until a full reset.
    pub completed_steps: BTreeSet<BookingStep>,
    pub selected_service: Option<Service>,
    pub selected_date: Option<NaiveDate>,
    pub selected_time_slot: Option<TimeSlot>,
    pub client_info: Option<ClientInfo>,
    pub loading_state: BTreeMap<ResourceKind, bool>,
    /// Absent key means no error for that resource.
    pub api_errors: BTreeMap<ResourceKind, ApiFailure>,
    pub booking_reference: Option<String>,
    /// Survives a failed booking-creation attempt so a retry skips client
    /// creation.
    pub created_client_id: Option<String>,
    /// Bumped by every reset; async work started in an earlier epoch is
    /// discarded when it settles.
    #[serde(skip)]
    pub(crate) epoch: u64,
}

impl Default for BookingState {
    fn default() -> Self {
        Self {
            current_step: BookingStep::default(),
            completed_steps: BTreeSet::new(),
            selected_service: None,
            selected_date: None,
            selected_time_slot: None,
            client_info: None,
            loading_state: BTreeMap::new(),
            api_errors: BTreeMap::new(),
            booking_reference: None,
            created_client_id: None,
            epoch: 0,
        }
    }
}

impl BookingState {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Return every field to its initial value and start a new epoch.
    pub(crate) fn reset(&mut self) {
        let epoch = self.epoch + 1;
        *self = Self {
            epoch,
            ..Self::default()
        };
    }

    pub fn is_loading(&self, kind: ResourceKind) -> bool {
        self.loading_state.get(&kind).copied().unwrap_or(false)
    }

    pub fn is_any_loading(&self) -> bool {
        self.loading_state.values().any(|v| *v)
    }

    pub fn error_for(&self, kind: ResourceKind) -> Option<&ApiFailure> {
        self.api_errors.get(&kind)
    }

    pub fn has_api_error(&self) -> bool {
        !self.api_errors.is_empty()
    }

    /// Mark a remote operation as started: loading on, stale error cleared.
    pub(crate) fn begin_loading(&mut self, kind: ResourceKind) {
        self.loading_state.insert(kind, true);
        self.api_errors.remove(&kind);
    }

    /// Mark a remote operation as settled. Always clears the loading flag.
    pub(crate) fn finish_loading(&mut self, kind: ResourceKind, failure: Option<ApiFailure>) {
        self.loading_state.insert(kind, false);
        match failure {
            Some(f) => {
                self.api_errors.insert(kind, f);
            }
            None => {
                self.api_errors.remove(&kind);
            }
        }
    }

    /// Drop the date and slot, which belong to a specific service.
    pub(crate) fn clear_schedule(&mut self) {
        self.selected_date = None;
        self.selected_time_slot = None;
    }
}
