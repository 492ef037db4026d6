use crate::host::{HostEditor, ReviewUi, Severity};
use crate::session::ReviewSession;
use crate::{Direction, EntityId, Extent, FeaturePair, ReviewError, Tags};
use tracing::{debug, warn};

pub const DEFAULT_MIN_ZOOM: f64 = 16.0;
pub const DEFAULT_MAX_ZOOM: f64 = 21.0;

/// Tag prefix used by the conflation service for review bookkeeping.
const REVIEW_TAG_PREFIX: &str = "hoot:review:";

/// One of the two displayed positions of a [`FeaturePair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Left,
    Right,
}

/// One row of the side-by-side tag table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub key: String,
    pub left: Option<String>,
    pub right: Option<String>,
}

impl TagRow {
    pub fn differs(&self) -> bool {
        self.left != self.right
    }
}

/// Tags of the displayed features, aligned by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagComparison {
    pub left: EntityId,
    pub right: Option<EntityId>,
    pub rows: Vec<TagRow>,
}

impl TagComparison {
    pub fn build(left: EntityId, left_tags: &Tags, right: Option<(EntityId, &Tags)>) -> Self {
        let mut keys: Vec<&String> = left_tags.keys().collect();
        if let Some((_, tags)) = right {
            keys.extend(tags.keys());
        }
        keys.sort();
        keys.dedup();

        let rows = keys
            .into_iter()
            .filter(|key| !key.starts_with(REVIEW_TAG_PREFIX))
            .map(|key| TagRow {
                key: key.clone(),
                left: left_tags.get(key).cloned(),
                right: right.and_then(|(_, tags)| tags.get(key).cloned()),
            })
            .collect();

        Self {
            left,
            right: right.map(|(id, _)| id),
            rows,
        }
    }
}

/// Index the `current` slot moves to when stepping in `direction`.
///
/// Wraps at both ends and skips `other` so both slots never show the same
/// member. With fewer than three members the slot may end up where it was.
pub fn next_member_index(
    len: usize,
    current: usize,
    other: Option<usize>,
    direction: Direction,
) -> usize {
    if len == 0 {
        return current;
    }
    let step = |i: usize| match direction {
        Direction::Forward => (i + 1) % len,
        Direction::Backward => (i + len - 1) % len,
    };
    let next = step(current);
    if Some(next) == other { step(next) } else { next }
}

/// Resolve a reviewable relation into its initial pair of members.
pub fn resolve_pair(host: &dyn HostEditor, relation_id: i64) -> Result<FeaturePair, ReviewError> {
    let relation = EntityId::relation(relation_id);
    let element = host
        .entity(&relation)
        .ok_or(ReviewError::FeatureNotFound(relation))?;
    FeaturePair::new(relation_id, element.member_ids()).ok_or(ReviewError::FeatureNotFound(relation))
}

/// Decorates the pair under review and frames it in the viewport.
#[derive(Debug, Clone)]
pub struct ConflictHighlighter {
    min_zoom: f64,
    max_zoom: f64,
}

impl Default for ConflictHighlighter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_ZOOM, DEFAULT_MAX_ZOOM)
    }
}

impl ConflictHighlighter {
    pub fn new(min_zoom: f64, max_zoom: f64) -> Self {
        Self { min_zoom, max_zoom }
    }

    /// Highlight `pair`, replacing whatever was highlighted before.
    ///
    /// Every displayed member must resolve in the working graph; otherwise
    /// nothing is changed and `FeatureNotFound` is returned.
    pub fn highlight(
        &self,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        pair: FeaturePair,
        pan_camera: bool,
    ) -> Result<(), ReviewError> {
        let ids = pair.displayed();
        if let Some(missing) = ids.iter().find(|id| host.entity(id).is_none()) {
            warn!(feature = %missing, relation = pair.relation_id, "feature not in working graph");
            ui.alert(
                Severity::Error,
                &format!("Feature {missing} could not be found in the loaded map data."),
            );
            return Err(ReviewError::FeatureNotFound(*missing));
        }

        self.clear(session, host);
        host.set_highlight(&ids, true);
        host.enter_selection(&ids);

        if pan_camera {
            let extent = ids
                .iter()
                .filter_map(|id| host.extent(id))
                .reduce(|a, b| a.union(&b));
            if let Some(extent) = extent {
                let zoom = self.frame_zoom(host, &extent);
                host.pan_to(extent, zoom);
            }
        }

        if let Some(comparison) = comparison_for(host, &pair) {
            ui.show_comparison(&comparison);
        }
        if let Some(stats) = session.statistics() {
            ui.meta_updated(stats.unreviewed_count);
        }

        debug!(relation = pair.relation_id, ?ids, "highlighted reviewable");
        session.set_current_pair(Some(pair));
        Ok(())
    }

    /// Move one slot to the neighbouring member of the relation without panning.
    pub fn cycle(
        &self,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        slot: Slot,
        direction: Direction,
    ) -> Result<(), ReviewError> {
        let mut pair = session
            .current_pair()
            .cloned()
            .ok_or(ReviewError::NothingToReview)?;
        let len = pair.members.len();
        match slot {
            Slot::Left => {
                pair.left = next_member_index(len, pair.left, pair.right, direction);
            }
            Slot::Right => {
                let Some(right) = pair.right else {
                    return Ok(());
                };
                pair.right = Some(next_member_index(len, right, Some(pair.left), direction));
            }
        }
        if Some(&pair) == session.current_pair() {
            return Ok(());
        }
        self.highlight(session, host, ui, pair, false)
    }

    /// Remove the decoration from the currently highlighted pair.
    pub fn clear(&self, session: &mut ReviewSession, host: &mut dyn HostEditor) {
        if let Some(previous) = session.current_pair() {
            host.set_highlight(&previous.displayed(), false);
        }
        session.set_current_pair(None);
    }

    fn frame_zoom(&self, host: &dyn HostEditor, extent: &Extent) -> f64 {
        host.extent_zoom(extent).clamp(self.min_zoom, self.max_zoom)
    }
}

fn comparison_for(host: &dyn HostEditor, pair: &FeaturePair) -> Option<TagComparison> {
    let left = pair.left_id();
    let left_tags = host.entity(&left)?.tags();
    let right = pair
        .right_id()
        .and_then(|id| host.entity(&id).map(|element| (id, element.tags())));
    Some(TagComparison::build(left, left_tags, right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_wraps_and_skips_other_slot() {
        assert_eq!(next_member_index(4, 0, Some(1), Direction::Forward), 2);
        assert_eq!(next_member_index(4, 3, Some(1), Direction::Forward), 0);
        assert_eq!(next_member_index(4, 3, Some(0), Direction::Forward), 1);
    }

    #[test]
    fn backward_wraps_and_skips_other_slot() {
        assert_eq!(next_member_index(4, 0, Some(1), Direction::Backward), 3);
        assert_eq!(next_member_index(4, 2, Some(1), Direction::Backward), 0);
        assert_eq!(next_member_index(4, 1, Some(0), Direction::Backward), 3);
    }

    #[test]
    fn cycling_never_lands_on_the_other_slot() {
        for len in 2..7 {
            for other in 0..len {
                for current in (0..len).filter(|c| *c != other) {
                    for direction in [Direction::Forward, Direction::Backward] {
                        let next = next_member_index(len, current, Some(other), direction);
                        assert_ne!(next, other, "len={len} current={current} other={other}");
                        assert!(next < len);
                    }
                }
            }
        }
    }

    #[test]
    fn two_members_stay_put() {
        assert_eq!(next_member_index(2, 0, Some(1), Direction::Forward), 0);
        assert_eq!(next_member_index(2, 1, Some(0), Direction::Backward), 1);
    }

    #[test]
    fn comparison_aligns_keys_and_hides_review_tags() {
        let left = Tags::from([
            ("name".to_string(), "Main St".to_string()),
            ("highway".to_string(), "primary".to_string()),
            ("hoot:review:needs".to_string(), "yes".to_string()),
        ]);
        let right = Tags::from([
            ("name".to_string(), "Main Street".to_string()),
            ("highway".to_string(), "primary".to_string()),
            ("lanes".to_string(), "2".to_string()),
        ]);
        let cmp = TagComparison::build(
            EntityId::way(1),
            &left,
            Some((EntityId::way(2), &right)),
        );
        let keys: Vec<&str> = cmp.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["highway", "lanes", "name"]);
        assert!(!cmp.rows[0].differs());
        assert!(cmp.rows[1].differs());
        assert_eq!(cmp.rows[1].left, None);
        assert_eq!(cmp.rows[2].right.as_deref(), Some("Main Street"));
        assert_eq!(cmp.right, Some(EntityId::way(2)));
    }
}
