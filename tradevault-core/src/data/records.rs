//! Typed market-data records as returned by the provider.

use serde::{Deserialize, Serialize};

/// One aggregate bar. Field names follow the provider's JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBar {
    /// Volume
    pub v: f64,
    /// Volume-weighted average price
    #[serde(default)]
    pub vw: Option<f64>,
    pub o: f64,
    pub c: f64,
    pub h: f64,
    pub l: f64,
    /// Bar start, Unix milliseconds
    pub t: i64,
    /// Number of trades
    #[serde(default)]
    pub n: Option<i64>,
}

/// One trade (tick).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// SIP timestamp, Unix nanoseconds
    pub sip_timestamp: i64,
    #[serde(default)]
    pub participant_timestamp: Option<i64>,
    pub price: f64,
    pub size: f64,
    #[serde(default)]
    pub exchange: Option<i64>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub sequence_number: Option<i64>,
    #[serde(default)]
    pub tape: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<i64>,
}

impl Trade {
    /// Conditions as `"[12, 37]"`, the form used in CSV output.
    pub fn conditions_text(&self) -> String {
        let inner: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        format!("[{}]", inner.join(", "))
    }
}

/// Records fetched for one chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum MarketRecords {
    Bars(Vec<AggregateBar>),
    Trades(Vec<Trade>),
}

impl MarketRecords {
    pub fn len(&self) -> usize {
        match self {
            MarketRecords::Bars(b) => b.len(),
            MarketRecords::Trades(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first `n` records.
    pub fn head(&self, n: usize) -> MarketRecords {
        match self {
            MarketRecords::Bars(b) => MarketRecords::Bars(b.iter().take(n).cloned().collect()),
            MarketRecords::Trades(t) => MarketRecords::Trades(t.iter().take(n).cloned().collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_deserializes_without_optional_fields() {
        let bar: AggregateBar =
            serde_json::from_str(r#"{"v":100,"o":1.0,"c":2.0,"h":3.0,"l":0.5,"t":1704067200000}"#).unwrap();
        assert_eq!(bar.vw, None);
        assert_eq!(bar.n, None);
        assert_eq!(bar.v, 100.0);
    }

    #[test]
    fn trade_conditions_text() {
        let trade: Trade = serde_json::from_str(
            r#"{"sip_timestamp":1,"price":10.5,"size":100,"conditions":[12,37],"exchange":4,"id":"1","tape":3}"#,
        )
        .unwrap();
        assert_eq!(trade.conditions_text(), "[12, 37]");
        assert_eq!(trade.participant_timestamp, None);
    }

    #[test]
    fn head_truncates() {
        let recs = MarketRecords::Trades(
            (0..5)
                .map(|i| Trade {
                    sip_timestamp: i,
                    participant_timestamp: None,
                    price: 1.0,
                    size: 1.0,
                    exchange: None,
                    id: None,
                    sequence_number: None,
                    tape: None,
                    conditions: vec![],
                })
                .collect(),
        );
        assert_eq!(recs.head(3).len(), 3);
        assert_eq!(recs.head(10).len(), 5);
    }
}
