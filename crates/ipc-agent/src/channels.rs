//! # Channel Naming
//!
//! Maps a logical topic onto the pair of physical channels used on the
//! transport: requests travel on `{topic}-request`, responses on
//! `{topic}-response`.

/// Suffix of every request channel.
pub const REQUEST_SUFFIX: &str = "-request";

/// Suffix of every response channel.
pub const RESPONSE_SUFFIX: &str = "-response";

/// The pair of physical channels derived from one topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommunicationChannels {
    /// Channel requests are sent on.
    pub request_channel: String,
    /// Channel responses are received on.
    pub response_channel: String,
}

/// Channel name derivation.
pub struct Channels;

impl Channels {
    /// Channel that requests for `topic` are sent on.
    #[must_use]
    pub fn request_channel(topic: &str) -> String {
        format!("{topic}{REQUEST_SUFFIX}")
    }

    /// Channel that responses for `topic` are sent on.
    #[must_use]
    pub fn response_channel(topic: &str) -> String {
        format!("{topic}{RESPONSE_SUFFIX}")
    }

    /// Whether `channel` is a request channel.
    #[must_use]
    pub fn is_request_channel(channel: &str) -> bool {
        channel.ends_with(REQUEST_SUFFIX)
    }

    /// Both channels for `topic`.
    #[must_use]
    pub fn communication_channels(topic: &str) -> CommunicationChannels {
        CommunicationChannels {
            request_channel: Self::request_channel(topic),
            response_channel: Self::response_channel(topic),
        }
    }
}
