pub mod cache;
pub mod catalog;
pub mod metastore;
pub mod report;
pub mod serial;
pub mod telemetry;
