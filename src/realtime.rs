//! GTFS Realtime feed fetch and decode.
//!
//! The decoded [`FeedMessage`] is consumed as-is by callers; merging it into
//! the static model is a reserved extension point
//! ([`crate::model::TransitModel::merge_realtime_update`]), not a feature.

use anyhow::{Context, Result, bail};
use prost::Message;
use tracing::info;

use crate::fetch::{HttpClient, SubscriptionKey, fetch_bytes};
use crate::gtfs_rt::FeedMessage;

/// Environment variable holding the realtime API subscription key. Required
/// for any path that fetches the realtime feed.
pub const SUBSCRIPTION_KEY_VAR: &str = "TRANSIT_SUBSCRIPTION_KEY";

const SUBSCRIPTION_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
pub fn decode_feed(bytes: &[u8]) -> Result<FeedMessage> {
    FeedMessage::decode(bytes).context("realtime payload did not decode as a FeedMessage")
}

/// Downloads and decodes the realtime feed at `url`, authenticating with the
/// subscription key from the environment.
///
/// A missing or empty [`SUBSCRIPTION_KEY_VAR`] is an immediate error, before
/// any network traffic.
pub async fn fetch_feed<C: HttpClient>(client: C, url: &str) -> Result<FeedMessage> {
    let key = subscription_key()?;
    let authed = SubscriptionKey::new(client, SUBSCRIPTION_HEADER, &key)?;

    let bytes = fetch_bytes(&authed, url).await?;
    info!(url, bytes = bytes.len(), "Realtime feed downloaded");

    decode_feed(&bytes)
}

fn subscription_key() -> Result<String> {
    match std::env::var(SUBSCRIPTION_KEY_VAR) {
        Ok(key) if !key.is_empty() => Ok(key),
        _ => bail!("{SUBSCRIPTION_KEY_VAR} environment variable missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{FeedEntity, FeedHeader};

    #[test]
    fn empty_bytes_decode_to_a_default_feed() {
        // An empty byte array is valid protobuf for a message with defaults.
        let feed = decode_feed(&[]).unwrap();
        assert_eq!(feed.header.gtfs_realtime_version, "");
        assert!(feed.entity.is_empty());
    }

    #[test]
    fn invalid_bytes_fail_to_decode() {
        assert!(decode_feed(&[0xFF, 0xFE, 0x00, 0x01]).is_err());
    }

    #[test]
    fn round_trips_a_minimal_feed() {
        let feed = FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1234567890),
                incrementality: None,
                feed_version: None,
            },
            entity: vec![FeedEntity {
                id: "e1".to_string(),
                ..Default::default()
            }],
        };

        let decoded = decode_feed(&feed.encode_to_vec()).unwrap();
        assert_eq!(decoded.header.gtfs_realtime_version, "2.0");
        assert_eq!(decoded.header.timestamp, Some(1234567890));
        assert_eq!(decoded.entity.len(), 1);
        assert_eq!(decoded.entity[0].id, "e1");
    }
}
