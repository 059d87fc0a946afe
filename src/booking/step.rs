//! Wizard steps, totally ordered 0..4.

use serde::{Deserialize, Serialize};

/// The steps of the booking wizard.
///
/// Progresses linearly: ServiceSelection → DateSelection →
/// ClientInformation → Confirmation → Success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStep {
    ServiceSelection,
    DateSelection,
    ClientInformation,
    Confirmation,
    Success,
}

impl BookingStep {
    pub const ALL: [BookingStep; 5] = [
        Self::ServiceSelection,
        Self::DateSelection,
        Self::ClientInformation,
        Self::Confirmation,
        Self::Success,
    ];

    pub fn index(&self) -> usize {
        match self {
            Self::ServiceSelection => 0,
            Self::DateSelection => 1,
            Self::ClientInformation => 2,
            Self::Confirmation => 3,
            Self::Success => 4,
        }
    }

    pub fn from_index(index: usize) -> Option<BookingStep> {
        Self::ALL.get(index).copied()
    }

    /// Next step in the linear progression, if any.
    pub fn next(&self) -> Option<BookingStep> {
        Self::from_index(self.index() + 1)
    }

    pub fn previous(&self) -> Option<BookingStep> {
        self.index().checked_sub(1).and_then(Self::from_index)
    }

    /// Whether this step ends the flow.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl Default for BookingStep {
    fn default() -> Self {
        Self::ServiceSelection
    }
}

impl std::fmt::Display for BookingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ServiceSelection => "SERVICE_SELECTION",
            Self::DateSelection => "DATE_SELECTION",
            Self::ClientInformation => "CLIENT_INFORMATION",
            Self::Confirmation => "CONFIRMATION",
            Self::Success => "SUCCESS",
        };
        write!(f, "{s}")
    }
}
