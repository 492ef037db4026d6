pub mod api;
pub mod cli;
pub mod config;
pub mod graph;
pub mod highlight;
pub mod host;
pub mod journal;
pub mod logging;
pub mod navigator;
pub mod osm;
pub mod resolver;
pub mod session;
pub mod tui;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::api::ApiError;
use crate::host::HostError;

/// Sort order sent on the first navigation request of a session.
///
/// Any value below -1 asks the service for a random starting reviewable.
pub const RANDOM_ENTRY_SORT_ORDER: i64 = -999;

/// Feature tags, ordered by key so comparisons and digests are stable.
pub type Tags = BTreeMap<String, String>;

/// Kind of an OSM element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Node,
    Way,
    Relation,
}

impl ElementKind {
    fn prefix(self) -> char {
        match self {
            ElementKind::Node => 'n',
            ElementKind::Way => 'w',
            ElementKind::Relation => 'r',
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
        }
    }
}

/// Reference to a map entity, rendered as `n12`, `w7` or `r42`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    pub kind: ElementKind,
    pub id: i64,
}

impl EntityId {
    pub fn node(id: i64) -> Self {
        Self {
            kind: ElementKind::Node,
            id,
        }
    }

    pub fn way(id: i64) -> Self {
        Self {
            kind: ElementKind::Way,
            id,
        }
    }

    pub fn relation(id: i64) -> Self {
        Self {
            kind: ElementKind::Relation,
            id,
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid entity id: {0}")]
pub struct ParseEntityIdError(String);

impl FromStr for EntityId {
    type Err = ParseEntityIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let kind = match chars.next() {
            Some('n') => ElementKind::Node,
            Some('w') => ElementKind::Way,
            Some('r') => ElementKind::Relation,
            _ => return Err(ParseEntityIdError(s.to_string())),
        };
        let id = chars
            .as_str()
            .parse::<i64>()
            .map_err(|_| ParseEntityIdError(s.to_string()))?;
        Ok(Self { kind, id })
    }
}

/// Geographic bounding box in WGS84 degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl Extent {
    pub fn point(lon: f64, lat: f64) -> Self {
        Self {
            min_lon: lon,
            min_lat: lat,
            max_lon: lon,
            max_lat: lat,
        }
    }

    /// Smallest extent covering both `self` and `other`.
    pub fn union(&self, other: &Extent) -> Extent {
        Extent {
            min_lon: self.min_lon.min(other.min_lon),
            min_lat: self.min_lat.min(other.min_lat),
            max_lon: self.max_lon.max(other.max_lon),
            max_lat: self.max_lat.max(other.max_lat),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lon + self.max_lon) / 2.0,
            (self.min_lat + self.max_lat) / 2.0,
        )
    }
}

/// Navigation direction through the review sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// The operator's position in the review sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewCursor {
    pub map_id: i64,
    pub relation_id: i64,
    pub sort_order: i64,
    pub result_count: u64,
}

/// Aggregate review progress for a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatistics {
    pub total_count: u64,
    pub unreviewed_count: u64,
}

/// Members of the reviewable relation and the two displayed slots.
///
/// `left` and `right` index into `members` and never point at the same member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePair {
    pub relation_id: i64,
    pub members: Vec<EntityId>,
    pub left: usize,
    pub right: Option<usize>,
}

impl FeaturePair {
    /// Build the initial pair for a relation. Returns `None` when there are no members.
    pub fn new(relation_id: i64, members: Vec<EntityId>) -> Option<Self> {
        if members.is_empty() {
            return None;
        }
        let right = (members.len() > 1).then_some(1);
        Some(Self {
            relation_id,
            members,
            left: 0,
            right,
        })
    }

    pub fn relation(&self) -> EntityId {
        EntityId::relation(self.relation_id)
    }

    pub fn left_id(&self) -> EntityId {
        self.members[self.left]
    }

    pub fn right_id(&self) -> Option<EntityId> {
        self.right.map(|i| self.members[i])
    }

    /// Ids currently shown, left slot first.
    pub fn displayed(&self) -> Vec<EntityId> {
        let mut ids = vec![self.left_id()];
        ids.extend(self.right_id());
        ids
    }
}

/// Failures surfaced by the review traversal.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("review navigation has not been initialized")]
    NotInitialized,
    #[error("unsaved feature changes must be resolved before navigating")]
    UnsavedChangesBlock,
    #[error("a review item is already loading")]
    AdvanceInFlight,
    #[error("failed to get review statistics: {0}")]
    StatisticsFetchFailed(#[source] ApiError),
    #[error("failed to retrieve the next review item: {0}")]
    NextItemFetchFailed(#[source] ApiError),
    #[error("no more items to review")]
    SessionExhausted,
    #[error("feature not found: {0}")]
    FeatureNotFound(EntityId),
    #[error("no reviewable is currently displayed")]
    NothingToReview,
    #[error("failed to save edits: {0}")]
    SaveFailed(#[source] HostError),
    #[error("failed to resolve all reviews: {0}")]
    ResolveAllFailed(#[source] ApiError),
    #[error("editor operation failed: {0}")]
    Host(#[source] HostError),
}

impl ReviewError {
    /// Transient fetch failures the operator may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReviewError::StatisticsFetchFailed(_) | ReviewError::NextItemFetchFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_display_and_parse() {
        let id = EntityId::relation(42);
        assert_eq!(id.to_string(), "r42");
        assert_eq!("r42".parse::<EntityId>().unwrap(), id);
        assert_eq!("n-5".parse::<EntityId>().unwrap(), EntityId::node(-5));
        assert!("x1".parse::<EntityId>().is_err());
        assert!("w".parse::<EntityId>().is_err());
    }

    #[test]
    fn extent_union_covers_both() {
        let a = Extent::point(10.0, 50.0);
        let b = Extent::point(11.0, 49.0);
        let u = a.union(&b);
        assert_eq!(u.min_lon, 10.0);
        assert_eq!(u.max_lon, 11.0);
        assert_eq!(u.min_lat, 49.0);
        assert_eq!(u.max_lat, 50.0);
        assert_eq!(u.center(), (10.5, 49.5));
    }

    #[test]
    fn feature_pair_starts_with_first_two_members() {
        let pair = FeaturePair::new(7, vec![EntityId::way(1), EntityId::way(2), EntityId::node(3)])
            .unwrap();
        assert_eq!(pair.left_id(), EntityId::way(1));
        assert_eq!(pair.right_id(), Some(EntityId::way(2)));
        assert_eq!(pair.displayed().len(), 2);
        assert_eq!(pair.relation(), EntityId::relation(7));
    }

    #[test]
    fn feature_pair_single_member_has_no_right_slot() {
        let pair = FeaturePair::new(7, vec![EntityId::node(3)]).unwrap();
        assert_eq!(pair.right, None);
        assert_eq!(pair.displayed(), vec![EntityId::node(3)]);
        assert!(FeaturePair::new(7, Vec::new()).is_none());
    }

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Direction::Backward).unwrap(),
            "\"backward\""
        );
    }

    #[test]
    fn only_fetch_failures_are_retryable() {
        assert!(!ReviewError::NotInitialized.is_retryable());
        assert!(!ReviewError::NothingToReview.is_retryable());
        let err = ReviewError::NextItemFetchFailed(ApiError::Status {
            status: 500,
            body: String::new(),
        });
        assert!(err.is_retryable());
    }
}
