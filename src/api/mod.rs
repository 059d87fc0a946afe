//! Remote booking API: the collaborators the booking flow reads from and
//! writes to.
//!
//! The flow only depends on the `BookingApi` trait; `HttpBookingApi` is the
//! production implementation, tests substitute scripted mocks.

pub mod http;

pub use http::HttpBookingApi;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::booking::model::{
    CreateBookingRequest, CreateClientRequest, CreatedRecord, Service, TimeSlot,
};
use crate::error::ApiError;

/// Backend-agnostic booking API.
#[async_trait]
pub trait BookingApi: Send + Sync {
    /// `GET /services`
    async fn list_services(&self) -> Result<Vec<Service>, ApiError>;

    /// `GET /availability?serviceId=..`: dates with at least one slot.
    async fn list_available_dates(&self, service_id: &str) -> Result<Vec<NaiveDate>, ApiError>;

    /// `GET /availability?serviceId=..&date=..`
    async fn list_time_slots(
        &self,
        service_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, ApiError>;

    /// `POST /clients`
    async fn create_client(&self, request: &CreateClientRequest)
    -> Result<CreatedRecord, ApiError>;

    /// `POST /bookings`
    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<CreatedRecord, ApiError>;

    /// `GET /health`: liveness only; the booking flow never calls this.
    async fn health(&self) -> Result<(), ApiError>;
}
