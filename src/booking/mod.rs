//! Booking orchestration: the wizard state machine and the remote work it
//! drives.
//!
//! `BookingSession` is the single owner of a `BookingState`. It exposes the
//! setters and navigation of the step gate, cached availability reads
//! through `ResourceOrchestrator`, the two-phase `SubmissionPipeline`, and
//! error recovery.

pub mod cache;
pub mod gate;
pub mod model;
pub mod orchestrator;
pub mod recovery;
pub mod session;
pub mod state;
pub mod step;
pub mod submission;

pub use gate::Denial;
pub use model::{ClientInfo, Service, TimeSlot, UrgencyLevel};
pub use orchestrator::ResourceOrchestrator;
pub use recovery::{Invalidation, RecoveryOutcome};
pub use session::BookingSession;
pub use state::{BookingState, ResourceKind};
pub use step::BookingStep;
pub use submission::SubmissionPipeline;

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, NaiveTime};
    use rust_decimal_macros::dec;

    use super::model::{ClientInfo, Service, TimeSlot, UrgencyLevel};

    pub fn service(id: &str) -> Service {
        Service {
            id: id.to_string(),
            name: format!("Service {id}"),
            price: dec!(150.00),
            duration_minutes: 60,
            category: "fraud".to_string(),
            is_active: true,
        }
    }

    /// One-hour slot starting at `hour`.
    pub fn slot(id: &str, hour: u32, available: bool) -> TimeSlot {
        TimeSlot {
            id: id.to_string(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
            duration_minutes: 60,
            available,
        }
    }

    pub fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    /// Valid client info with every consent given.
    pub fn client_info() -> ClientInfo {
        ClientInfo {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+44 20 7946 0958".to_string(),
            case_type: "investment_fraud".to_string(),
            estimated_loss: Some(dec!(25000)),
            urgency_level: UrgencyLevel::High,
            case_description: "Transferred funds to a fake trading platform.".to_string(),
            additional_notes: None,
            consent_to_contact: true,
            privacy_policy_accepted: true,
            data_processing_agreed: true,
        }
    }
}
