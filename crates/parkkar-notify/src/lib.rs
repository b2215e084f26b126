//! # parkkar-notify
//!
//! Delivers free-slot counts to the parking backend over HTTP.
//!
//! Each reading becomes a `POST <base>/api/v1/parkings/slot-update` with a
//! JSON body `{"parkingId": .., "freeSlots": ..}`. Delivery is best effort:
//! failures come back as [`NotifierError`] for the caller to log, they are
//! never retried.

use log::info;
use parkkar_bridge::{Notifier, NotifierError, OccupancyReading};
use serde::Serialize;
use std::time::Duration;

/// Path of the slot-update endpoint on the backend.
pub const SLOT_UPDATE_PATH: &str = "/api/v1/parkings/slot-update";

/// Backend URL used when none is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Wire format of a slot update
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpdate<'a> {
    pub parking_id: &'a str,
    pub free_slots: i64,
}

/// [`Notifier`] that POSTs each reading to the backend.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpNotifier {
    /// Notifier for the backend at `base_url` with a per-request `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, NotifierError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), SLOT_UPDATE_PATH),
        })
    }

    pub fn with_defaults() -> Result<Self, NotifierError> {
        Self::new(DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Notifier for HttpNotifier {
    async fn notify(&self, reading: &OccupancyReading) -> Result<(), NotifierError> {
        let body = SlotUpdate {
            parking_id: &reading.lot_id,
            free_slots: reading.free_slots,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifierError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifierError::Status(status.as_u16()));
        }

        info!(
            "[{}] sent slot update: {} free",
            reading.lot_id, reading.free_slots
        );
        Ok(())
    }
}
