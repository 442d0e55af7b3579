//! Derivation of processing-time fields from a decoded `Session`.

use crate::error::EnrichError;
use crate::model::{EnrichedSession, Session};
use chrono::{DateTime, Utc};

/// Enrich a session with aggregates and a processing timestamp.
///
/// `now` is wall-clock processing time, not event time: replaying the same
/// record later produces a different timestamp. An empty line-item
/// sequence is valid and yields all-zero aggregates.
///
/// `line_item_count` is a raw count of entries; repeated product codes
/// are counted once per entry. The downstream wire name
/// (`total_different_products`) predates this pipeline and is kept as-is.
pub fn enrich(session: Session, now: DateTime<Utc>) -> Result<EnrichedSession, EnrichError> {
    let mut total_quantity: u64 = 0;
    let mut total_in_cart_quantity: u64 = 0;

    for (index, item) in session.line_items.iter().enumerate() {
        total_quantity = total_quantity
            .checked_add(item.quantity)
            .ok_or(EnrichError::QuantityOverflow { index })?;
        if item.in_cart {
            // Cannot overflow: the in-cart sum is bounded by the checked total.
            total_in_cart_quantity += item.quantity;
        }
    }

    let line_item_count = session.line_items.len() as u64;

    Ok(EnrichedSession {
        session,
        processing_timestamp: now,
        total_quantity,
        total_in_cart_quantity,
        line_item_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LineItem;

    fn session_with(items: Vec<LineItem>) -> Session {
        Session {
            session_id: "s-1".into(),
            customer_number: 42,
            city: "Lyon".into(),
            country: "France".into(),
            credit_limit: 250.5,
            line_items: items,
        }
    }

    fn item(code: &str, quantity: u64, in_cart: bool) -> LineItem {
        LineItem {
            product_code: code.into(),
            quantity,
            in_cart,
        }
    }

    #[test]
    fn test_enrich_sums_quantities() {
        let session = session_with(vec![item("P1", 2, true), item("P2", 1, false)]);
        let enriched = enrich(session, Utc::now()).unwrap();

        assert_eq!(enriched.total_quantity, 3);
        assert_eq!(enriched.total_in_cart_quantity, 2);
        assert_eq!(enriched.line_item_count, 2);
    }

    #[test]
    fn test_enrich_empty_history_is_all_zero() {
        let enriched = enrich(session_with(vec![]), Utc::now()).unwrap();
        assert_eq!(enriched.total_quantity, 0);
        assert_eq!(enriched.total_in_cart_quantity, 0);
        assert_eq!(enriched.line_item_count, 0);
    }

    #[test]
    fn test_enrich_in_cart_never_exceeds_total() {
        let session = session_with(vec![
            item("P1", 5, true),
            item("P2", 3, false),
            item("P3", 7, true),
        ]);
        let enriched = enrich(session, Utc::now()).unwrap();
        assert!(enriched.total_in_cart_quantity <= enriched.total_quantity);
        assert_eq!(enriched.total_in_cart_quantity, 12);
        assert_eq!(enriched.total_quantity, 15);
    }

    #[test]
    fn test_enrich_counts_repeated_product_codes_per_entry() {
        // Raw entry count, not distinct product codes.
        let session = session_with(vec![item("P1", 1, false), item("P1", 1, false)]);
        let enriched = enrich(session, Utc::now()).unwrap();
        assert_eq!(enriched.line_item_count, 2);
    }

    #[test]
    fn test_enrich_uses_supplied_timestamp() {
        let now = Utc::now();
        let enriched = enrich(session_with(vec![]), now).unwrap();
        assert_eq!(enriched.processing_timestamp, now);
    }

    #[test]
    fn test_enrich_overflow_is_an_error() {
        let session = session_with(vec![item("P1", u64::MAX, false), item("P2", 1, false)]);
        let err = enrich(session, Utc::now()).unwrap_err();
        assert!(matches!(err, EnrichError::QuantityOverflow { index: 1 }));
    }
}
