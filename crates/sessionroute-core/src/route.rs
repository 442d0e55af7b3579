//! Classification and destination routing.
//!
//! Routing is an explicit tag lookup against an immutable table built and
//! validated once at startup, shared read-only across all partition loops.

use crate::error::RouteError;
use crate::model::Session;
use std::collections::HashMap;

/// Classification tag derived from a session's country.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionTag {
    Usa,
    International,
}

impl RegionTag {
    /// `USA` iff the country field is exactly `"USA"`; every other value,
    /// including empty strings and unseen countries, is `International`.
    pub fn for_country(country: &str) -> Self {
        if country == "USA" {
            RegionTag::Usa
        } else {
            RegionTag::International
        }
    }

    /// The tag's key in routing configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionTag::Usa => "USA",
            RegionTag::International => "International",
        }
    }
}

/// Immutable mapping from classification tag to destination log name.
///
/// Construction fails with `MissingRoute` if either tag is absent, so a
/// configuration fault is fatal at startup rather than per record.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    usa: String,
    international: String,
}

impl RoutingTable {
    /// Build and validate a routing table from a startup-supplied mapping.
    pub fn from_map(map: &HashMap<String, String>) -> Result<Self, RouteError> {
        let lookup = |tag: RegionTag| -> Result<String, RouteError> {
            let destination = map.get(tag.as_str()).ok_or_else(|| RouteError::MissingRoute {
                tag: tag.as_str().to_string(),
            })?;
            if destination.is_empty() {
                return Err(RouteError::EmptyDestination {
                    tag: tag.as_str().to_string(),
                });
            }
            Ok(destination.clone())
        };

        Ok(Self {
            usa: lookup(RegionTag::Usa)?,
            international: lookup(RegionTag::International)?,
        })
    }

    /// Destination log name for a tag.
    pub fn destination(&self, tag: RegionTag) -> &str {
        match tag {
            RegionTag::Usa => &self.usa,
            RegionTag::International => &self.international,
        }
    }

    /// Destination log names in no particular order.
    pub fn destinations(&self) -> [&str; 2] {
        [&self.usa, &self.international]
    }
}

/// Map a session to its destination log name.
pub fn classify<'a>(session: &Session, table: &'a RoutingTable) -> &'a str {
    table.destination(RegionTag::for_country(&session.country))
}
