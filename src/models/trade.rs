//! # models::trade
//!
//! Defines [`TradeEvent`], the immutable input message: one executed trade
//! for one instrument, as published on the input topic.
//!
//! Decoding is strict.  Anything that would poison a price window (missing
//! instrument key, non-positive or non-finite price, unreadable timestamp) is
//! rejected here, before it ever reaches the calculator.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Epoch values above this are treated as milliseconds.
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// A single trade observed for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeEvent {
    /// Instrument key, e.g. a token contract address.  Partition key on both topics.
    pub token_address: String,

    /// Human-readable instrument name, carried through to the output.
    pub token_name: String,

    /// Executed price.  Always finite and `> 0` once decoded.
    pub price: f64,

    /// When the trade happened (UTC).
    pub timestamp: DateTime<Utc>,
}

/// Wire shape before validation.
#[derive(Debug, Deserialize)]
struct RawTradeEvent {
    token_address: String,
    token_name: String,
    price: f64,
    timestamp: RawTimestamp,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Epoch(i64),
    Text(String),
}

impl TradeEvent {
    /// Decode and validate an input-topic payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let raw: RawTradeEvent = serde_json::from_slice(payload)?;

        if raw.token_address.trim().is_empty() {
            return Err(DecodeError::MissingField("token_address"));
        }
        if !raw.price.is_finite() || raw.price <= 0.0 {
            return Err(DecodeError::InvalidPrice(raw.price));
        }

        Ok(Self {
            token_address: raw.token_address,
            token_name: raw.token_name,
            price: raw.price,
            timestamp: parse_timestamp(raw.timestamp)?,
        })
    }
}

fn parse_timestamp(raw: RawTimestamp) -> Result<DateTime<Utc>, DecodeError> {
    match raw {
        RawTimestamp::Epoch(n) if n > EPOCH_MILLIS_THRESHOLD => DateTime::from_timestamp_millis(n)
            .ok_or_else(|| DecodeError::InvalidTimestamp(n.to_string())),
        RawTimestamp::Epoch(n) => DateTime::from_timestamp(n, 0)
            .ok_or_else(|| DecodeError::InvalidTimestamp(n.to_string())),
        RawTimestamp::Text(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(&s) {
                return Ok(dt.with_timezone(&Utc));
            }
            // ISO-8601 without an offset (e.g. "2024-01-01T12:00:00.123") is read as UTC
            NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                .map(|naive| naive.and_utc())
                .map_err(|_| DecodeError::InvalidTimestamp(s))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_event() {
        let payload = br#"{"token_address":"0xabc","token_name":"TokenA","price":1.25,"timestamp":"2024-03-01T10:00:00Z"}"#;
        let event = TradeEvent::decode(payload).unwrap();
        assert_eq!(event.token_address, "0xabc");
        assert_eq!(event.token_name, "TokenA");
        assert_eq!(event.price, 1.25);
        assert_eq!(event.timestamp.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_decode_naive_and_epoch_timestamps() {
        let naive = br#"{"token_address":"a","token_name":"A","price":2,"timestamp":"2024-03-01T10:00:00.500"}"#;
        let event = TradeEvent::decode(naive).unwrap();
        assert_eq!(event.timestamp.timestamp_millis(), 1_709_287_200_500);

        let secs = br#"{"token_address":"a","token_name":"A","price":2,"timestamp":1709287200}"#;
        assert_eq!(TradeEvent::decode(secs).unwrap().timestamp.timestamp(), 1_709_287_200);

        let millis = br#"{"token_address":"a","token_name":"A","price":2,"timestamp":1709287200500}"#;
        assert_eq!(
            TradeEvent::decode(millis).unwrap().timestamp.timestamp_millis(),
            1_709_287_200_500
        );
    }

    #[test]
    fn test_reject_non_positive_price() {
        let zero = br#"{"token_address":"a","token_name":"A","price":0,"timestamp":"2024-03-01T10:00:00Z"}"#;
        assert!(matches!(TradeEvent::decode(zero), Err(DecodeError::InvalidPrice(_))));

        let negative = br#"{"token_address":"a","token_name":"A","price":-3.5,"timestamp":"2024-03-01T10:00:00Z"}"#;
        assert!(matches!(TradeEvent::decode(negative), Err(DecodeError::InvalidPrice(_))));
    }

    #[test]
    fn test_reject_missing_or_empty_fields() {
        let no_price = br#"{"token_address":"a","token_name":"A","timestamp":"2024-03-01T10:00:00Z"}"#;
        assert!(matches!(TradeEvent::decode(no_price), Err(DecodeError::Json(_))));

        let empty_key = br#"{"token_address":"  ","token_name":"A","price":1,"timestamp":"2024-03-01T10:00:00Z"}"#;
        assert!(matches!(TradeEvent::decode(empty_key), Err(DecodeError::MissingField("token_address"))));
    }

    #[test]
    fn test_reject_garbage() {
        assert!(TradeEvent::decode(b"not json").is_err());
        let bad_ts = br#"{"token_address":"a","token_name":"A","price":1,"timestamp":"yesterday"}"#;
        assert!(matches!(TradeEvent::decode(bad_ts), Err(DecodeError::InvalidTimestamp(_))));
    }
}
