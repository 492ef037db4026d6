use crate::api::ReviewApi;
use crate::host::{HostEditor, ReviewUi, Severity};
use crate::navigator::{AdvanceTicket, ReviewNavigator};
use crate::session::ReviewSession;
use crate::{Direction, EntityId, ReviewError};
use tracing::{error, info, warn};

/// Relation tag the conflation service reads to know whether review is pending.
pub const REVIEW_NEEDS_TAG: &str = "hoot:review:needs";

const ACCEPTING_MSG: &str = "Accepting all remaining reviews...";
const ACCEPTED_MSG: &str = "All reviews accepted.";

/// Commits operator decisions for the displayed reviewable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Mark the displayed reviewable resolved, save, and claim the next step.
    ///
    /// Only the pair the cursor points at can be retained. After a failed
    /// member load the cursor has moved on while the previous pair stays on
    /// screen; that pair is refused with `FeatureNotFound` for the cursor's
    /// relation.
    ///
    /// If the save fails the pair stays highlighted with the tag already
    /// set locally, so calling `retain` again retries the save.
    ///
    /// The returned ticket must be fetched and finished like any other advance.
    pub fn retain(
        &self,
        navigator: &ReviewNavigator,
        session: &mut ReviewSession,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
    ) -> Result<AdvanceTicket, ReviewError> {
        let Some(pair) = session.current_pair().cloned() else {
            return Err(ReviewError::NothingToReview);
        };
        if let Some(cursor) = session.cursor()
            && cursor.relation_id != pair.relation_id
        {
            let target = EntityId::relation(cursor.relation_id);
            warn!(
                displayed = pair.relation_id,
                cursor = cursor.relation_id,
                "displayed pair is not the current reviewable"
            );
            ui.alert(
                Severity::Error,
                &format!("Review {target} is not loaded; it cannot be retained."),
            );
            return Err(ReviewError::FeatureNotFound(target));
        }

        let relation = pair.relation();
        let mut tags = host
            .entity(&relation)
            .map(|element| element.tags().clone())
            .ok_or(ReviewError::FeatureNotFound(relation))?;
        tags.insert(REVIEW_NEEDS_TAG.to_string(), "no".to_string());
        host.set_tags(&relation, tags).map_err(ReviewError::Host)?;

        if host.has_unsaved_changes() {
            if let Err(e) = host.save() {
                error!(error = %e, "saving resolved review failed");
                ui.alert(Severity::Error, &format!("Failed to save changes: {e}"));
                return Err(ReviewError::SaveFailed(e));
            }
        }
        info!(relation = %relation, "reviewable retained");

        navigator.highlighter().clear(session, host);
        navigator.begin_advance(session, host, ui, Direction::Forward)
    }

    /// Resolve every remaining reviewable of the map and end the session.
    pub fn accept_all(
        &self,
        navigator: &ReviewNavigator,
        session: &mut ReviewSession,
        api: &dyn ReviewApi,
        host: &mut dyn HostEditor,
        ui: &mut dyn ReviewUi,
        layer: &str,
    ) -> Result<(), ReviewError> {
        let Some(map_id) = session.map_id() else {
            warn!("accept all requested before initialization");
            return Err(ReviewError::NotInitialized);
        };

        session.acquire_processing(ui, ACCEPTING_MSG);
        let result = self.commit_all(api, host, map_id, layer);
        session.release_processing(ui);
        if let Err(e) = result {
            error!(error = %e, map_id, "accept all failed");
            ui.alert(Severity::Error, &e.to_string());
            return Err(e);
        }

        info!(map_id, layer, "all reviews accepted");
        navigator.highlighter().clear(session, host);
        ui.review_complete(map_id);
        ui.alert(Severity::Success, ACCEPTED_MSG);
        navigator.exit_session(session, host, ui, Some(ACCEPTED_MSG));
        Ok(())
    }

    fn commit_all(
        &self,
        api: &dyn ReviewApi,
        host: &mut dyn HostEditor,
        map_id: i64,
        layer: &str,
    ) -> Result<(), ReviewError> {
        if host.has_unsaved_changes() {
            host.save().map_err(ReviewError::SaveFailed)?;
        }
        api.resolve_all(map_id)
            .map_err(ReviewError::ResolveAllFailed)?;
        host.reload_layer(layer).map_err(ReviewError::Host)
    }
}
