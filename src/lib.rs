//! Booking intake: the orchestration core of a consultation booking wizard.
//!
//! A `BookingSession` walks a client through service selection, date and
//! time-slot selection, client details and confirmation, backed by a remote
//! booking API reached through the `BookingApi` trait.

pub mod api;
pub mod booking;
pub mod config;
pub mod error;
