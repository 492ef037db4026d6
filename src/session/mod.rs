use crate::api::{NextItemRequest, ReviewItemRequest};
use crate::host::ReviewUi;
use crate::{Direction, FeaturePair, RANDOM_ENTRY_SORT_ORDER, ReviewCursor, ReviewStatistics};

/// Request behind an in-flight or failed navigation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavRequest {
    Next(NextItemRequest),
    Item(ReviewItemRequest),
}

impl NavRequest {
    pub fn map_id(&self) -> i64 {
        match self {
            NavRequest::Next(r) => r.map_id,
            NavRequest::Item(r) => r.map_id,
        }
    }
}

/// State of one review session.
///
/// Created when the operator enters review mode and handed by reference to
/// the navigator, highlighter and resolver. Dropping it ends the session.
#[derive(Debug, Default)]
pub struct ReviewSession {
    map_id: Option<i64>,
    initialized: bool,
    active: bool,
    exhausted: bool,
    cursor: Option<ReviewCursor>,
    statistics: Option<ReviewStatistics>,
    current_pair: Option<FeaturePair>,
    generation: u64,
    next_ticket: u64,
    in_flight: Option<u64>,
    pending_retry: Option<NavRequest>,
    processing: bool,
}

impl ReviewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_id(&self) -> Option<i64> {
        self.map_id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The session ended because the service had nothing left to review.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn cursor(&self) -> Option<&ReviewCursor> {
        self.cursor.as_ref()
    }

    pub fn statistics(&self) -> Option<&ReviewStatistics> {
        self.statistics.as_ref()
    }

    pub fn current_pair(&self) -> Option<&FeaturePair> {
        self.current_pair.as_ref()
    }

    pub fn has_active_reviewable(&self) -> bool {
        self.current_pair.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn in_flight(&self) -> Option<u64> {
        self.in_flight
    }

    pub fn pending_retry(&self) -> Option<&NavRequest> {
        self.pending_retry.as_ref()
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Start from a previously recorded position instead of a random entry.
    pub fn seed_cursor(&mut self, cursor: ReviewCursor) {
        if self.cursor.is_none() {
            self.cursor = Some(cursor);
        }
    }

    /// Navigation payload for the next step in `direction`.
    pub fn next_item_request(&self, map_id: i64, direction: Direction) -> NextItemRequest {
        match &self.cursor {
            Some(cursor) => NextItemRequest {
                map_id: cursor.map_id,
                sort_order: cursor.sort_order,
                direction,
            },
            None => NextItemRequest {
                map_id,
                sort_order: RANDOM_ENTRY_SORT_ORDER,
                direction,
            },
        }
    }

    pub(crate) fn activate(&mut self, map_id: i64) {
        self.map_id = Some(map_id);
        self.initialized = true;
        self.active = true;
        self.exhausted = false;
    }

    pub(crate) fn deactivate(&mut self, exhausted: bool) {
        self.active = false;
        self.exhausted = exhausted;
        self.generation += 1;
        self.in_flight = None;
        self.pending_retry = None;
        self.current_pair = None;
    }

    /// Claim the single in-flight slot. Returns the ticket id.
    pub(crate) fn claim_in_flight(&mut self) -> u64 {
        self.next_ticket += 1;
        self.in_flight = Some(self.next_ticket);
        self.next_ticket
    }

    /// Whether an outcome for `ticket` issued in `generation` may still be applied.
    pub(crate) fn owns_ticket(&self, ticket: u64, generation: u64) -> bool {
        self.active && self.generation == generation && self.in_flight == Some(ticket)
    }

    pub(crate) fn clear_in_flight(&mut self) {
        self.in_flight = None;
    }

    pub(crate) fn set_pending_retry(&mut self, request: NavRequest) {
        self.pending_retry = Some(request);
    }

    pub(crate) fn take_pending_retry(&mut self) -> Option<NavRequest> {
        self.pending_retry.take()
    }

    pub(crate) fn set_statistics(&mut self, statistics: ReviewStatistics) {
        self.statistics = Some(statistics);
    }

    pub(crate) fn replace_cursor(&mut self, cursor: ReviewCursor) {
        self.cursor = Some(cursor);
    }

    pub(crate) fn set_current_pair(&mut self, pair: Option<FeaturePair>) {
        self.current_pair = pair;
    }

    pub(crate) fn acquire_processing(&mut self, ui: &mut dyn ReviewUi, message: &str) {
        self.processing = true;
        ui.set_processing(true, Some(message));
    }

    /// Release the processing indicator. Safe to call on every exit path.
    pub(crate) fn release_processing(&mut self, ui: &mut dyn ReviewUi) {
        if self.processing {
            self.processing = false;
            ui.set_processing(false, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_uses_random_entry() {
        let session = ReviewSession::new();
        let request = session.next_item_request(5, Direction::Forward);
        assert_eq!(request.map_id, 5);
        assert_eq!(request.sort_order, RANDOM_ENTRY_SORT_ORDER);
        assert!(request.sort_order < -1);
    }

    #[test]
    fn later_requests_follow_cursor() {
        let mut session = ReviewSession::new();
        session.replace_cursor(ReviewCursor {
            map_id: 9,
            relation_id: 42,
            sort_order: 3,
            result_count: 1,
        });
        let request = session.next_item_request(5, Direction::Backward);
        assert_eq!(request.map_id, 9);
        assert_eq!(request.sort_order, 3);
        assert_eq!(request.direction, Direction::Backward);
    }

    #[test]
    fn seed_does_not_overwrite_existing_cursor() {
        let mut session = ReviewSession::new();
        let first = ReviewCursor {
            map_id: 1,
            relation_id: 2,
            sort_order: 3,
            result_count: 1,
        };
        session.seed_cursor(first.clone());
        session.seed_cursor(ReviewCursor {
            sort_order: 99,
            ..first.clone()
        });
        assert_eq!(session.cursor(), Some(&first));
    }

    #[test]
    fn tickets_go_stale_on_deactivate() {
        let mut session = ReviewSession::new();
        session.activate(5);
        let ticket = session.claim_in_flight();
        let generation = session.generation();
        assert!(session.owns_ticket(ticket, generation));

        session.deactivate(false);
        assert!(!session.owns_ticket(ticket, generation));
        assert_eq!(session.in_flight(), None);
    }

    #[test]
    fn newer_ticket_supersedes_older() {
        let mut session = ReviewSession::new();
        session.activate(5);
        let first = session.claim_in_flight();
        session.clear_in_flight();
        let second = session.claim_in_flight();
        assert_ne!(first, second);
        assert!(!session.owns_ticket(first, session.generation()));
        assert!(session.owns_ticket(second, session.generation()));
    }
}
