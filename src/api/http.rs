//! reqwest implementation of `BookingApi`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Method, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::booking::model::{
    CreateBookingRequest, CreateClientRequest, CreatedRecord, Service, TimeSlot,
};
use crate::config::ApiConfig;
use crate::error::ApiError;

use super::BookingApi;

/// Header carrying a per-request correlation id.
const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// HTTP client for the booking API.
pub struct HttpBookingApi {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<SecretString>,
    request_timeout: Duration,
}

impl HttpBookingApi {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ApiError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, self.url(path))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string());
        if let Some(ref token) = self.auth_token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        builder
    }

    /// Send and read the body; non-2xx becomes `ApiError::Status` with the
    /// raw body preserved for classification.
    async fn send_raw(&self, builder: RequestBuilder) -> Result<String, ApiError> {
        let timeout = self.request_timeout;
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest(e, timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest(e, timeout))?;
        if !status.is_success() {
            tracing::debug!(status = status.as_u16(), "Booking API returned an error status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send_raw(builder).await?;
        parse_body(&body)
    }
}

/// The API answers either with a bare payload or `{ "data": payload }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(Envelope::Wrapped { data }) => Ok(data),
        Ok(Envelope::Bare(value)) => Ok(value),
        Err(e) => Err(ApiError::Decode(format!(
            "{e} (body: {})",
            body.chars().take(200).collect::<String>()
        ))),
    }
}

#[async_trait]
impl BookingApi for HttpBookingApi {
    async fn list_services(&self) -> Result<Vec<Service>, ApiError> {
        self.send(self.request(Method::GET, "services")).await
    }

    async fn list_available_dates(&self, service_id: &str) -> Result<Vec<NaiveDate>, ApiError> {
        let builder = self
            .request(Method::GET, "availability")
            .query(&[("serviceId", service_id)]);
        self.send(builder).await
    }

    async fn list_time_slots(
        &self,
        service_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlot>, ApiError> {
        let date = date.format("%Y-%m-%d").to_string();
        let builder = self
            .request(Method::GET, "availability")
            .query(&[("serviceId", service_id), ("date", date.as_str())]);
        self.send(builder).await
    }

    async fn create_client(
        &self,
        request: &CreateClientRequest,
    ) -> Result<CreatedRecord, ApiError> {
        self.send(self.request(Method::POST, "clients").json(request))
            .await
    }

    async fn create_booking(
        &self,
        request: &CreateBookingRequest,
    ) -> Result<CreatedRecord, ApiError> {
        self.send(self.request(Method::POST, "bookings").json(request))
            .await
    }

    async fn health(&self) -> Result<(), ApiError> {
        self.send_raw(self.request(Method::GET, "health")).await?;
        Ok(())
    }
}
