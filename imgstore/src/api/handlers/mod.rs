//! HTTP request handlers.
//!
//! - [`uploads`]: file upload ingestion
//!
//! # Error Handling
//!
//! Handlers return [`crate::errors::Result`]; every error renders as a JSON `{ "message" }` body
//! with the status from [`crate::errors::Error::status_code`].

pub mod uploads;
