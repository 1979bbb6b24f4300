///! Secondary metadata store: sensor-details catalog source and append-only
///! status history.

pub mod client;
pub mod types;

pub use client::{MetastoreClient, DETAILS_COLLECTION, POCKETHOST_BASE, STATUS_COLLECTION};
pub use types::{NewStatusRecord, SensorDetail, StatusHistoryRecord};
