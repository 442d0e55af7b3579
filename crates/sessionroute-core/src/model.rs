//! Domain types flowing through the pipeline.
//!
//! A `RawRecord` comes off a source partition, decodes into a `Session`,
//! and leaves as an `EnrichedSession` on exactly one destination log.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One record read from a source partition. Immutable; consumed once.
#[derive(Debug, Clone)]
pub struct RawRecord {
    /// Partition the record was read from
    pub partition: i32,

    /// Monotonic position within the partition
    pub sequence: i64,

    /// Record key, if the producer set one
    pub key: Option<Vec<u8>>,

    /// Record payload (UTF-8 JSON on the wire)
    pub payload: Vec<u8>,

    /// Broker-side arrival timestamp (milliseconds since epoch)
    pub arrival_time_ms: i64,
}

/// One product entry within a session's activity history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    /// Product identifier
    pub product_code: String,

    /// Quantity browsed or carted
    pub quantity: u64,

    /// Whether the item sits in the shopping cart
    #[serde(rename = "in_shopping_cart")]
    pub in_cart: bool,
}

/// One decoded user-activity record. Created by decoding exactly one
/// `RawRecord`; never mutated; consumed by enrichment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub session_id: String,
    pub customer_number: i64,
    pub city: String,
    pub country: String,
    pub credit_limit: f64,
    #[serde(rename = "browse_history")]
    pub line_items: Vec<LineItem>,
}

/// A `Session` plus derived processing fields. Published exactly once;
/// not persisted by this pipeline.
///
/// Wire names follow the downstream contract: `total_different_products`
/// is a raw count of line-item entries, not de-duplicated product codes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedSession {
    #[serde(flatten)]
    pub session: Session,

    /// Wall-clock time of processing, not event time. Replaying the same
    /// record later yields a different value.
    pub processing_timestamp: DateTime<Utc>,

    #[serde(rename = "overall_product_quantity")]
    pub total_quantity: u64,

    #[serde(rename = "overall_in_shopping_cart")]
    pub total_in_cart_quantity: u64,

    #[serde(rename = "total_different_products")]
    pub line_item_count: u64,
}

impl EnrichedSession {
    /// Stable partition key for destination publishing. Repeated sessions
    /// route to the same destination partition, preserving relative order
    /// for the key.
    pub fn partition_key(&self) -> &str {
        &self.session.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_session() -> Session {
        Session {
            session_id: "a1".into(),
            customer_number: 100,
            city: "Washington".into(),
            country: "USA".into(),
            credit_limit: 1000.0,
            line_items: vec![LineItem {
                product_code: "P1".into(),
                quantity: 2,
                in_cart: true,
            }],
        }
    }

    #[test]
    fn test_session_wire_names() {
        let json = serde_json::to_value(sample_session()).unwrap();
        assert!(json.get("browse_history").is_some());
        assert!(json["browse_history"][0].get("in_shopping_cart").is_some());
        assert_eq!(json["session_id"], "a1");
    }

    #[test]
    fn test_enriched_session_flattens_and_renames() {
        let enriched = EnrichedSession {
            session: sample_session(),
            processing_timestamp: Utc::now(),
            total_quantity: 2,
            total_in_cart_quantity: 2,
            line_item_count: 1,
        };

        let json = serde_json::to_value(&enriched).unwrap();
        // Session fields sit at the top level next to the derived ones
        assert_eq!(json["session_id"], "a1");
        assert_eq!(json["overall_product_quantity"], 2);
        assert_eq!(json["overall_in_shopping_cart"], 2);
        assert_eq!(json["total_different_products"], 1);
        assert!(json["processing_timestamp"].is_string());
    }

    #[test]
    fn test_partition_key_is_session_id() {
        let enriched = EnrichedSession {
            session: sample_session(),
            processing_timestamp: Utc::now(),
            total_quantity: 0,
            total_in_cart_quantity: 0,
            line_item_count: 0,
        };
        assert_eq!(enriched.partition_key(), "a1");
    }
}
