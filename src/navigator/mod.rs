use crate::api::{ApiError, ReviewApi, ReviewItemRequest};
use crate::highlight::{ConflictHighlighter, resolve_pair};
use crate::host::{HostEditor, ReviewUi, Severity};
use crate::osm::Element;
use crate::session::{NavRequest, ReviewSession};
use crate::{Direction, EntityId, ReviewCursor, ReviewError, ReviewStatistics};
use tracing::{debug, error, info, warn};

const NOT_INITIALIZED_MSG: &str = "Review navigation has not been initialized.";
const MISSING_CONTROLS_MSG: &str = "Review navigation controls are not configured.";
const MISSING_MAP_MSG: &str = "No map has been selected for review.";
const UNSAVED_MSG: &str =
    "Please resolve or undo the current feature changes before proceeding to the next review.";
const IN_FLIGHT_MSG: &str = "A review item is already loading.";
const LOADING_MSG: &str = "Loading review item...";
const STATISTICS_FAILED_MSG: &str = "Failed to get review statistics. Do you want to retry?";
const NEXT_FAILED_MSG: &str =
    "Failed to retrieve the next set of features for review. Do you want to retry?";
const EXHAUSTED_MSG: &str =
    "There are no more available features to review. Exiting the review session.";
const ABANDONED_MSG: &str = "Review session abandoned.";
const WORKER_FAILED_MSG: &str = "Loading the review item failed unexpectedly.";

/// Identifiers of the next/previous controls and the map under review.
#[derive(Debug, Clone, Default)]
pub struct NavigatorOptions {
    pub next_control: Option<String>,
    pub prev_control: Option<String>,
    pub map_id: Option<i64>,
}

/// Operator's answer to a retry prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryChoice {
    Retry,
    Abandon,
}

/// Result of applying a navigation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceStatus {
    /// The cursor moved and the new pair is highlighted.
    Highlighted(ReviewCursor),
    /// The service had nothing left; the session has exited.
    Exhausted,
    /// The outcome belonged to a superseded request or an exited session.
    Discarded,
}

/// A claimed navigation step, ready to be fetched.
///
/// Fetching performs all network I/O and may run on another thread; the
/// outcome goes back to [`ReviewNavigator::finish_advance`].
#[derive(Debug, Clone)]
pub struct AdvanceTicket {
    id: u64,
    generation: u64,
    request: NavRequest,
}

impl AdvanceTicket {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &NavRequest {
        &self.request
    }

    /// Statistics, then the next pointer, then the relation's members.
    pub fn fetch(&self, api: &dyn ReviewApi) -> AdvanceOutcome {
        AdvanceOutcome {
            ticket_id: self.id,
            generation: self.generation,
            request: self.request.clone(),
            result: fetch_step(api, &self.request),
        }
    }
}

#[derive(Debug)]
pub struct AdvanceOutcome {
    ticket_id: u64,
    generation: u64,
    request: NavRequest,
    result: Result<Fetched, FetchFailure>,
}

impl AdvanceOutcome {
    pub fn ticket_id(&self) -> u64 {
        self.ticket_id
    }
}

#[derive(Debug)]
struct Fetched {
    statistics: ReviewStatistics,
    cursor: ReviewCursor,
    members: Option<Result<Vec<Element>, ApiError>>,
}

#[derive(Debug)]
enum FetchFailure {
    Statistics(ApiError),
    NextItem(ApiError),
}

fn fetch_step(api: &dyn ReviewApi, request: &NavRequest) -> Result<Fetched, FetchFailure> {
    let statistics = api
        .statistics(request.map_id())
        .map_err(FetchFailure::Statistics)?;
    let cursor = match request {
        NavRequest::Next(next) => api.next_item(next).map(ReviewCursor::from),
        NavRequest::Item(item) => api
            .review_item(item)
            .map(|response| response.into_cursor(item.sequence)),
    }
    .map_err(FetchFailure::NextItem)?;
    let members =
        (cursor.result_count > 0).then(|| api.load_relation(cursor.map_id, cursor.relation_id));
    Ok(Fetched {
        statistics,
        cursor,
        members,
    })
}

/// Owns the traversal of the review sequence.
#[derive(Debug, Clone, Default)]
pub struct ReviewNavigator {
    highlighter: ConflictHighlighter,
}

impl ReviewNavigator {
    pub fn new(highlighter: ConflictHighlighter) -> Self {
        Self { highlighter }
    }

    pub fn highlighter(&self) -> &ConflictHighlighter {
        &self.highlighter
    }

    /// Gate for every other operation. Returns `false` and tells the operator
    /// why when the controls or the map are missing.
    pub fn initialize(
        &self,
        session: &mut ReviewSession,
        ui: &mut dyn ReviewUi,
        options: &NavigatorOptions,
    ) -> bool {
        if options.next_control.is_none() || options.prev_control.is_none() {
            warn!("review navigation controls missing");
            ui.alert(Severity::Error, MISSING_CONTROLS_MSG);
            return false;
        }
        let Some(map_id) = options.map_id else {
            warn!("review map id missing");
            ui.set_nav_enabled(false);
            ui.alert(Severity::Error, MISSING_MAP_MSG);
            return false;
        };
        session.activate(map_id);
        ui.set_nav_enabled(true);
        info!(map_id, "review navigation initialized");
        true
    }

    /// Claim a step in `direction` after checking the guards.
    ///
    /// No request is issued and the session is untouched when a guard fails.
    pub fn begin_advance(
        &self,
        session: &mut ReviewSession,
        host: &dyn HostEditor,
        ui: &mut dyn ReviewUi,
        direction: Direction,
    ) -> Result<AdvanceTicket, ReviewError> {
        let map_id = self.check_ready(session, host, ui)?;
        let request = NavRequest::Next(session.next_item_request(map_id, direction));
        Ok(self.dispatch(session, ui, request))
    }

    /// Claim a jump to the reviewable at `sequence`.
    pub fn begin_jump(
        &self,
        session: &mut ReviewSession,
        host: &dyn HostEditor,
        ui: &mut dyn ReviewUi,
        sequence: i64,
    ) -> Result<AdvanceTicket, ReviewError> {
        let map_id = self.check_ready(session, host, ui)?;
        let map_id = session.cursor().map_or(map_id, |cursor| cursor.map_id);
        let request = NavRequest::Item(ReviewItemRequest { map_id, sequence });
        Ok(self.dispatch(session, ui, request))
    }

    /// Apply a fetched outcome. The processing indicator is released on every path.
    pub fn finish_advance(
        &self,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        outcome: AdvanceOutcome,
    ) -> Result<AdvanceStatus, ReviewError> {
        if !session.owns_ticket(outcome.ticket_id, outcome.generation) {
            debug!(ticket = outcome.ticket_id, "discarding stale review outcome");
            return Ok(AdvanceStatus::Discarded);
        }
        session.clear_in_flight();
        let result = self.apply(session, host, ui, outcome);
        session.release_processing(ui);
        result
    }

    /// Begin, fetch and finish one step on the calling thread.
    pub fn advance(
        &self,
        session: &mut ReviewSession,
        api: &dyn ReviewApi,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        direction: Direction,
    ) -> Result<AdvanceStatus, ReviewError> {
        let ticket = self.begin_advance(session, host, ui, direction)?;
        let outcome = ticket.fetch(api);
        self.finish_advance(session, host, ui, outcome)
    }

    /// Act on the operator's answer to a retry prompt.
    ///
    /// Returns a new ticket when retrying, `None` when abandoning or when no
    /// failed request is waiting.
    pub fn resolve_failure(
        &self,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        choice: RetryChoice,
    ) -> Result<Option<AdvanceTicket>, ReviewError> {
        let Some(request) = session.take_pending_retry() else {
            return Ok(None);
        };
        match choice {
            RetryChoice::Retry => {
                if let Err(e) = self.check_ready(session, host, ui) {
                    session.set_pending_retry(request);
                    return Err(e);
                }
                info!(?request, "retrying review request");
                Ok(Some(self.dispatch(session, ui, request)))
            }
            RetryChoice::Abandon => {
                self.exit_session(session, host, ui, Some(ABANDONED_MSG));
                Ok(None)
            }
        }
    }

    /// Release a ticket whose fetch never produced an outcome.
    pub fn abort_advance(&self, session: &mut ReviewSession, ui: &mut dyn ReviewUi, ticket_id: u64) {
        if session.in_flight() != Some(ticket_id) {
            return;
        }
        error!(ticket = ticket_id, "review fetch aborted");
        session.clear_in_flight();
        session.release_processing(ui);
        ui.alert(Severity::Error, WORKER_FAILED_MSG);
    }

    /// Leave review mode. Calling it again is a no-op.
    ///
    /// The cursor is kept so the owner can still read where the operator stopped.
    pub fn exit_session(
        &self,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        message: Option<&str>,
    ) {
        self.exit(session, host, ui, message, false);
    }

    pub fn current_cursor<'a>(&self, session: &'a ReviewSession) -> Option<&'a ReviewCursor> {
        session.cursor()
    }

    fn exit(
        &self,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        message: Option<&str>,
        exhausted: bool,
    ) {
        if !session.is_active() {
            return;
        }
        self.highlighter.clear(session, host);
        session.deactivate(exhausted);
        session.release_processing(ui);
        ui.set_nav_enabled(false);
        ui.session_exited(message);
        info!(map_id = ?session.map_id(), exhausted, "review session exited");
    }

    fn check_ready(
        &self,
        session: &ReviewSession,
        host: &dyn HostEditor,
        ui: &mut dyn ReviewUi,
    ) -> Result<i64, ReviewError> {
        if session.is_exhausted() {
            ui.alert(Severity::Notice, EXHAUSTED_MSG);
            return Err(ReviewError::SessionExhausted);
        }
        let map_id = match session.map_id() {
            Some(map_id) if session.is_initialized() && session.is_active() => map_id,
            _ => {
                warn!("navigation requested before initialization");
                ui.alert(Severity::Error, NOT_INITIALIZED_MSG);
                return Err(ReviewError::NotInitialized);
            }
        };
        if host.has_unsaved_changes() {
            warn!(map_id, "navigation blocked by unsaved changes");
            ui.alert(Severity::Warning, UNSAVED_MSG);
            return Err(ReviewError::UnsavedChangesBlock);
        }
        if session.in_flight().is_some() {
            debug!(map_id, "navigation already in flight");
            ui.alert(Severity::Notice, IN_FLIGHT_MSG);
            return Err(ReviewError::AdvanceInFlight);
        }
        Ok(map_id)
    }

    fn dispatch(
        &self,
        session: &mut ReviewSession,
        ui: &mut dyn ReviewUi,
        request: NavRequest,
    ) -> AdvanceTicket {
        let id = session.claim_in_flight();
        session.acquire_processing(ui, LOADING_MSG);
        debug!(ticket = id, ?request, "dispatching review request");
        AdvanceTicket {
            id,
            generation: session.generation(),
            request,
        }
    }

    fn apply(
        &self,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        outcome: AdvanceOutcome,
    ) -> Result<AdvanceStatus, ReviewError> {
        let fetched = match outcome.result {
            Ok(fetched) => fetched,
            Err(FetchFailure::Statistics(e)) => {
                error!(error = %e, "failed to get review statistics");
                session.set_pending_retry(outcome.request);
                session.release_processing(ui);
                ui.prompt_retry(STATISTICS_FAILED_MSG);
                return Err(ReviewError::StatisticsFetchFailed(e));
            }
            Err(FetchFailure::NextItem(e)) => {
                error!(error = %e, "failed to get next reviewable");
                session.set_pending_retry(outcome.request);
                session.release_processing(ui);
                ui.prompt_retry(NEXT_FAILED_MSG);
                return Err(ReviewError::NextItemFetchFailed(e));
            }
        };

        session.set_statistics(fetched.statistics);
        if fetched.cursor.result_count == 0 {
            info!("no more reviewables");
            session.release_processing(ui);
            ui.alert(Severity::Notice, EXHAUSTED_MSG);
            self.exit(session, host, ui, None, true);
            return Ok(AdvanceStatus::Exhausted);
        }

        let cursor = fetched.cursor;
        session.replace_cursor(cursor.clone());
        info!(
            map_id = cursor.map_id,
            relation_id = cursor.relation_id,
            sort_order = cursor.sort_order,
            "moved to reviewable"
        );

        let relation = EntityId::relation(cursor.relation_id);
        match fetched.members {
            Some(Ok(elements)) => host.load_entities(elements),
            Some(Err(e)) => {
                warn!(error = %e, relation = %relation, "failed to load reviewable members");
                ui.alert(
                    Severity::Error,
                    &format!("Features of review {relation} could not be loaded."),
                );
                return Err(ReviewError::FeatureNotFound(relation));
            }
            None => {}
        }

        let pair = match resolve_pair(host, cursor.relation_id) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(relation = %relation, "reviewable relation has no usable members");
                ui.alert(
                    Severity::Error,
                    &format!("Review {relation} could not be found in the loaded map data."),
                );
                return Err(e);
            }
        };
        self.highlighter.highlight(session, host, ui, pair, true)?;
        Ok(AdvanceStatus::Highlighted(cursor))
    }
}
