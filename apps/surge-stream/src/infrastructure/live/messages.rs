//! Live Tick Wire Types
//!
//! JSON messages sent by the quote socket at `/ws/live/<symbol>`.
//!
//! # Message Types
//!
//! - `Status`: sent once after the handshake
//! - `Tick`: one price sample per poll
//! - `Error`: per-symbol fetch failure; the socket stays open
//!
//! # Wire Format (JSON)
//!
//! ```json
//! {"status": "connected", "tickers": ["AAPL"], "message": "Live price stream started"}
//! {"id": "AAPL", "price": 189.5, "change": 1.25, "changePercent": 0.66,
//!  "currency": "USD", "exchange": "NMS", "market_cap": 2950000000000.0,
//!  "volume": 48213, "timestamp": "2024-05-01T14:30:00.123456"}
//! {"error": "Error fetching AAPL: rate limited"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::ticks::TickSample;

/// One price sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickMessage {
    /// Symbol the sample belongs to.
    #[serde(default)]
    pub id: Option<String>,

    /// Last traded price.
    pub price: Decimal,

    /// Absolute change against the previous close.
    pub change: Decimal,

    /// Percentage change against the previous close.
    #[serde(rename = "changePercent")]
    pub change_percent: Decimal,

    /// Last traded volume. Sent as an integer or a float.
    #[serde(default)]
    pub volume: Option<serde_json::Number>,

    /// ISO-8601 timestamp, usually without an offset.
    pub timestamp: String,

    /// Quote currency.
    #[serde(default)]
    pub currency: Option<String>,

    /// Listing exchange.
    #[serde(default)]
    pub exchange: Option<String>,

    /// Market capitalisation.
    #[serde(default)]
    pub market_cap: Option<Decimal>,
}

impl TickMessage {
    /// Whether the sample is for `symbol`. Samples without an `id` match.
    #[must_use]
    pub fn is_for(&self, symbol: &str) -> bool {
        self.id
            .as_deref()
            .is_none_or(|id| id.trim().eq_ignore_ascii_case(symbol))
    }

    /// Convert into the domain sample.
    #[must_use]
    pub fn into_sample(self) -> TickSample {
        TickSample {
            price: self.price,
            change: self.change,
            change_percent: self.change_percent,
            volume: self.volume.as_ref().and_then(volume_from_number),
            timestamp: self.timestamp,
            currency: self.currency,
            exchange: self.exchange,
            market_cap: self.market_cap,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn volume_from_number(n: &serde_json::Number) -> Option<u64> {
    n.as_u64().or_else(|| {
        n.as_f64()
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v as u64)
    })
}

/// Handshake acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Connection status, `"connected"` in practice.
    pub status: String,

    /// Symbols the socket will stream.
    #[serde(default)]
    pub tickers: Vec<String>,

    /// Human-readable note.
    #[serde(default)]
    pub message: Option<String>,
}

/// Application error reported on the socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Error description.
    pub error: String,
}

/// Any message the quote socket sends.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveMessage {
    /// Price sample.
    Tick(TickMessage),
    /// Handshake acknowledgement.
    Status(StatusMessage),
    /// Application error.
    Error(ErrorMessage),
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn tick(json: &str) -> TickMessage {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn deserializes_backend_sample() {
        let msg = tick(
            r#"{"id":"AAPL","price":189.5,"change":1.25,"changePercent":0.66,
                "currency":"USD","exchange":"NMS","market_cap":2950000000000.0,
                "volume":48213,"timestamp":"2024-05-01T14:30:00.123456"}"#,
        );

        assert_eq!(msg.id.as_deref(), Some("AAPL"));
        assert_eq!(msg.price, Decimal::new(1895, 1));
        assert_eq!(msg.change_percent, Decimal::new(66, 2));

        let sample = msg.into_sample();
        assert_eq!(sample.volume, Some(48_213));
        assert_eq!(sample.currency.as_deref(), Some("USD"));
        assert!(sample.parsed_timestamp().is_some());
    }

    #[test]
    fn minimal_sample_has_optional_fields_empty() {
        let sample = tick(
            r#"{"price":10,"change":-0.5,"changePercent":-4.76,"timestamp":"2024-05-01T14:30:00"}"#,
        )
        .into_sample();

        assert_eq!(sample.volume, None);
        assert_eq!(sample.market_cap, None);
        assert!(!sample.is_up());
    }

    #[test_case(r#"48213"#, Some(48_213) ; "integer")]
    #[test_case(r#"48213.0"#, Some(48_213) ; "float")]
    #[test_case(r#"null"#, None ; "null")]
    #[test_case(r#"-1"#, None ; "negative")]
    fn volume_variants(raw: &str, expected: Option<u64>) {
        let json = format!(
            r#"{{"price":1,"change":0,"changePercent":0,"volume":{raw},"timestamp":"t"}}"#
        );
        assert_eq!(tick(&json).into_sample().volume, expected);
    }

    #[test_case(Some("AAPL"), "AAPL", true ; "same symbol")]
    #[test_case(Some("aapl"), "AAPL", true ; "case insensitive")]
    #[test_case(Some("MSFT"), "AAPL", false ; "other symbol")]
    #[test_case(None, "AAPL", true ; "no id")]
    fn symbol_matching(id: Option<&str>, symbol: &str, expected: bool) {
        let mut msg =
            tick(r#"{"price":1,"change":0,"changePercent":0,"timestamp":"t"}"#);
        msg.id = id.map(str::to_string);
        assert_eq!(msg.is_for(symbol), expected);
    }
}
