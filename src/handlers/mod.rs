// Transcription relay HTTP handlers
//
// This module contains the HTTP handlers of the relay.
// It provides the interface between the browser-facing proxy route and the
// upstream transcription service.

pub mod credentials;
pub mod form;
pub mod routes;

// Re-export handlers for easier access
pub use self::routes::{
    configure, metrics_handler, proxy_get, proxy_options, proxy_post, relay_status,
};
// Re-export the credentials extractor
pub use self::credentials::UpstreamCredentials;
