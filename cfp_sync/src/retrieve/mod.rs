//! # Remote Retrieval
//!
//! Everything that leaves the device: the retrying HTTP transport, the typed
//! CFP REST API and the cloud function calls.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// Conference-scoped REST endpoints.
pub mod cfp_client;
/// Named remote procedures (votes, favorites, account verification).
pub mod cloud_functions;
/// Retrying HTTP client with JSON handling.
pub mod ky_http;

// --- Public API Re-exports ---
pub use cfp_client::{CfpApi, HttpCfpApi, ScheduleLink};
pub use cloud_functions::{CloudFunctions, HttpCloudFunctions, RecordedCall, RecordingCloudFunctions};
pub use ky_http::{build_client, ApiClient, ApiResponse, HttpOptions};
