//! # models::indicator
//!
//! Defines [`RsiEvent`]: the derived message published on the output topic
//! once an instrument's window is warm.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

use crate::error::EngineError;
use crate::models::TradeEvent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RsiEvent {
    pub token_address: String,
    pub token_name: String,
    /// RSI in `[0, 100]`.
    pub rsi: f64,
    /// Price of the trade that produced this value.
    pub current_price: f64,
    /// Copied from the triggering trade, rendered as RFC-3339 UTC.
    #[serde(serialize_with = "serialize_rfc3339")]
    pub timestamp: DateTime<Utc>,
}

impl RsiEvent {
    pub fn from_trade(trade: &TradeEvent, rsi: f64) -> Self {
        Self {
            token_address: trade.token_address.clone(),
            token_name: trade.token_name.clone(),
            rsi,
            current_price: trade.price,
            timestamp: trade.timestamp,
        }
    }

    /// Encode to the output wire format (UTF-8 JSON).
    pub fn encode(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(self).map_err(EngineError::Encode)
    }
}

fn serialize_rfc3339<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_output_shape() {
        let trade = TradeEvent {
            token_address: "0xabc".into(),
            token_name: "TokenA".into(),
            price: 16.0,
            timestamp: DateTime::from_timestamp(1_709_287_200, 0).unwrap(),
        };
        let bytes = RsiEvent::from_trade(&trade, 65.0).encode().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["token_address"], "0xabc");
        assert_eq!(value["token_name"], "TokenA");
        assert_eq!(value["rsi"], 65.0);
        assert_eq!(value["current_price"], 16.0);
        assert_eq!(value["timestamp"], "2024-03-01T10:00:00Z");
    }
}
