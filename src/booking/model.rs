//! Booking data models: services, time slots, client details, and the
//! request/response payloads exchanged with the booking API.
//!
//! Every entity has exactly one canonical shape. Alternate field names the
//! API is known to emit (`_id`, `duration`) are accepted here at the
//! boundary and never re-interpreted downstream.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::FieldError;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

const MAX_NAME_LEN: usize = 100;
const MIN_DESCRIPTION_LEN: usize = 10;
const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_NOTES_LEN: usize = 2000;
const MIN_PHONE_DIGITS: usize = 7;
const MAX_PHONE_DIGITS: usize = 15;

fn default_true() -> bool {
    true
}

/// A bookable consultation service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Opaque identifier. Only guaranteed to be a non-empty string.
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(alias = "duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A bookable window on a given date. Unavailable slots are shown but
/// cannot be selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(with = "hh_mm")]
    pub start_time: NaiveTime,
    #[serde(with = "hh_mm")]
    pub end_time: NaiveTime,
    #[serde(alias = "duration")]
    pub duration_minutes: u32,
    #[serde(default = "default_true")]
    pub available: bool,
}

/// How quickly the client needs a consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for UrgencyLevel {
    fn default() -> Self {
        Self::Medium
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Personal, case, and consent details supplied by the prospective client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,

    pub case_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_loss: Option<Decimal>,
    #[serde(default)]
    pub urgency_level: UrgencyLevel,
    pub case_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_notes: Option<String>,

    #[serde(default)]
    pub consent_to_contact: bool,
    #[serde(default)]
    pub privacy_policy_accepted: bool,
    #[serde(default)]
    pub data_processing_agreed: bool,
}

impl ClientInfo {
    /// All three consent flags must be set before a submission is attempted.
    pub fn has_all_consents(&self) -> bool {
        self.consent_to_contact && self.privacy_policy_accepted && self.data_processing_agreed
    }

    /// Validate the field contents. Consent flags are not checked here;
    /// they gate entry to confirmation instead.
    ///
    /// Returns every failing field, not just the first.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();

        for (field, value) in [("firstName", &self.first_name), ("lastName", &self.last_name)] {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                errors.push(FieldError::new(field, "is required"));
            } else if trimmed.chars().count() > MAX_NAME_LEN {
                errors.push(FieldError::new(
                    field,
                    format!("must be at most {MAX_NAME_LEN} characters"),
                ));
            }
        }

        if !EMAIL_RE.is_match(self.email.trim()) {
            errors.push(FieldError::new("email", "must be a valid email address"));
        }

        if !is_plausible_phone(&self.phone) {
            errors.push(FieldError::new(
                "phone",
                format!("must contain {MIN_PHONE_DIGITS}-{MAX_PHONE_DIGITS} digits"),
            ));
        }

        if self.case_type.trim().is_empty() {
            errors.push(FieldError::new("caseType", "is required"));
        }

        if let Some(loss) = self.estimated_loss {
            if loss.is_sign_negative() {
                errors.push(FieldError::new("estimatedLoss", "must not be negative"));
            }
        }

        let description_len = self.case_description.trim().chars().count();
        if description_len < MIN_DESCRIPTION_LEN {
            errors.push(FieldError::new(
                "caseDescription",
                format!("must be at least {MIN_DESCRIPTION_LEN} characters"),
            ));
        } else if description_len > MAX_DESCRIPTION_LEN {
            errors.push(FieldError::new(
                "caseDescription",
                format!("must be at most {MAX_DESCRIPTION_LEN} characters"),
            ));
        }

        if let Some(ref notes) = self.additional_notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                errors.push(FieldError::new(
                    "additionalNotes",
                    format!("must be at most {MAX_NOTES_LEN} characters"),
                ));
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

fn is_plausible_phone(raw: &str) -> bool {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'))
    {
        return false;
    }
    let digits = body.chars().filter(|c| c.is_ascii_digit()).count();
    (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
}

/// Payload for `POST /clients`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub case_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_loss: Option<Decimal>,
    pub urgency_level: UrgencyLevel,
    pub case_description: String,
    pub consent_to_contact: bool,
    pub privacy_policy_accepted: bool,
    pub data_processing_agreed: bool,
}

impl From<&ClientInfo> for CreateClientRequest {
    fn from(info: &ClientInfo) -> Self {
        Self {
            first_name: info.first_name.trim().to_string(),
            last_name: info.last_name.trim().to_string(),
            email: info.email.trim().to_lowercase(),
            phone: info.phone.trim().to_string(),
            case_type: info.case_type.trim().to_string(),
            estimated_loss: info.estimated_loss,
            urgency_level: info.urgency_level,
            case_description: info.case_description.trim().to_string(),
            consent_to_contact: info.consent_to_contact,
            privacy_policy_accepted: info.privacy_policy_accepted,
            data_processing_agreed: info.data_processing_agreed,
        }
    }
}

/// Payload for `POST /bookings`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub client_id: String,
    pub service_id: String,
    pub date: NaiveDate,
    pub time_slot_id: String,
    #[serde(with = "hh_mm")]
    pub start_time: NaiveTime,
    #[serde(with = "hh_mm")]
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
    pub case_type: String,
    pub urgency_level: UrgencyLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_loss: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl CreateBookingRequest {
    pub fn new(
        client_id: &str,
        service: &Service,
        date: NaiveDate,
        slot: &TimeSlot,
        info: &ClientInfo,
    ) -> Self {
        Self {
            client_id: client_id.to_string(),
            service_id: service.id.clone(),
            date,
            time_slot_id: slot.id.clone(),
            start_time: slot.start_time,
            end_time: slot.end_time,
            duration_minutes: slot.duration_minutes,
            case_type: info.case_type.trim().to_string(),
            urgency_level: info.urgency_level,
            estimated_loss: info.estimated_loss,
            notes: info
                .additional_notes
                .as_ref()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }
}

/// Response body of the create endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl CreatedRecord {
    /// Human-facing reference, falling back to the record id.
    pub fn reference_or_id(&self) -> &str {
        self.reference
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Services that can be offered for selection, in API order.
pub fn active_services(services: &[Service]) -> Vec<&Service> {
    services
        .iter()
        .filter(|s| s.is_active && !s.id.is_empty())
        .collect()
}

/// Slots the client may pick, ordered by start time.
pub fn selectable_slots(slots: &[TimeSlot]) -> Vec<&TimeSlot> {
    let mut selectable: Vec<&TimeSlot> = slots.iter().filter(|s| s.available).collect();
    selectable.sort_by_key(|s| s.start_time);
    selectable
}

/// `HH:MM` wire format for times of day. `HH:MM:SS` is accepted on input.
mod hh_mm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time {raw:?}: {e}")))
    }
}
