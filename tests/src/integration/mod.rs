//! Cross-endpoint scenarios over the in-memory hub.

pub mod listener_lifecycle;
pub mod malformed_traffic;
pub mod request_response;
