#![allow(dead_code)]

use conflate_review::api::{
    self, ApiError, Bookmark, NewBookmark, NextItemRequest, NextItemResponse, ReviewApi,
    ReviewItemRequest, ReviewItemResponse,
};
use conflate_review::highlight::{ConflictHighlighter, TagComparison};
use conflate_review::host::{EditorHost, ReviewUi, Severity};
use conflate_review::navigator::{AdvanceStatus, NavigatorOptions, ReviewNavigator};
use conflate_review::osm::{Element, Member};
use conflate_review::session::ReviewSession;
use conflate_review::{Direction, ElementKind, ReviewError, ReviewStatistics, Tags};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

pub const MAP_ID: i64 = 5;

fn failure(status: u16) -> ApiError {
    ApiError::Status {
        status,
        body: "scripted failure".to_string(),
    }
}

/// Scripted review service that records every call.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

#[derive(Default)]
pub struct FakeState {
    pub calls: Vec<String>,
    pub statistics: VecDeque<Result<ReviewStatistics, u16>>,
    pub next: VecDeque<Result<NextItemResponse, u16>>,
    pub items: VecDeque<Result<ReviewItemResponse, u16>>,
    pub relations: HashMap<i64, Vec<Element>>,
    pub next_requests: Vec<NextItemRequest>,
    pub item_requests: Vec<ReviewItemRequest>,
    pub uploads: Vec<Vec<Element>>,
    pub upload_failure: Option<u16>,
    pub resolve_all_failure: Option<u16>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn push_statistics(&self, total: u64, unreviewed: u64) {
        self.state().statistics.push_back(Ok(ReviewStatistics {
            total_count: total,
            unreviewed_count: unreviewed,
        }));
    }

    pub fn fail_statistics(&self, status: u16) {
        self.state().statistics.push_back(Err(status));
    }

    pub fn push_next(&self, result_count: u64, relation_id: i64, sort_order: i64) {
        self.state().next.push_back(Ok(NextItemResponse {
            result_count,
            map_id: MAP_ID,
            relation_id,
            sort_order,
        }));
    }

    pub fn fail_next(&self, status: u16) {
        self.state().next.push_back(Err(status));
    }

    pub fn push_item(&self, relation_id: i64) {
        self.state().items.push_back(Ok(ReviewItemResponse {
            result_count: 1,
            map_id: MAP_ID,
            relation_id,
        }));
    }

    pub fn add_relation(&self, relation_id: i64, elements: Vec<Element>) {
        self.state().relations.insert(relation_id, elements);
    }

    /// Script one successful step onto relation `relation_id`.
    pub fn script_step(&self, relation_id: i64, sort_order: i64, member_nodes: &[i64]) {
        self.push_statistics(10, 10);
        self.push_next(1, relation_id, sort_order);
        self.add_relation(relation_id, reviewable(relation_id, member_nodes));
    }
}

impl ReviewApi for FakeApi {
    fn statistics(&self, map_id: i64) -> api::Result<ReviewStatistics> {
        let mut state = self.state();
        state.calls.push(format!("statistics {map_id}"));
        match state.statistics.pop_front() {
            Some(Ok(stats)) => Ok(stats),
            Some(Err(status)) => Err(failure(status)),
            None => Ok(ReviewStatistics {
                total_count: 10,
                unreviewed_count: 10,
            }),
        }
    }

    fn next_item(&self, request: &NextItemRequest) -> api::Result<NextItemResponse> {
        let mut state = self.state();
        state.calls.push(format!("next {}", request.sort_order));
        state.next_requests.push(request.clone());
        match state.next.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(status)) => Err(failure(status)),
            None => Err(failure(404)),
        }
    }

    fn review_item(&self, request: &ReviewItemRequest) -> api::Result<ReviewItemResponse> {
        let mut state = self.state();
        state.calls.push(format!("item {}", request.sequence));
        state.item_requests.push(request.clone());
        match state.items.pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(status)) => Err(failure(status)),
            None => Err(failure(404)),
        }
    }

    fn load_relation(&self, _map_id: i64, relation_id: i64) -> api::Result<Vec<Element>> {
        let mut state = self.state();
        state.calls.push(format!("relation {relation_id}"));
        state
            .relations
            .get(&relation_id)
            .cloned()
            .ok_or_else(|| failure(404))
    }

    fn resolve_all(&self, map_id: i64) -> api::Result<()> {
        let mut state = self.state();
        state.calls.push(format!("resolve_all {map_id}"));
        match state.resolve_all_failure {
            Some(status) => Err(failure(status)),
            None => Ok(()),
        }
    }

    fn upload_changes(&self, map_id: i64, elements: &[&Element]) -> api::Result<u64> {
        let mut state = self.state();
        state.calls.push(format!("upload {map_id}"));
        if let Some(status) = state.upload_failure {
            return Err(failure(status));
        }
        state
            .uploads
            .push(elements.iter().map(|e| (*e).clone()).collect());
        Ok(state.uploads.len() as u64)
    }

    fn save_bookmark(&self, _bookmark: &NewBookmark) -> api::Result<i64> {
        Err(failure(501))
    }

    fn get_bookmark(&self, _bookmark_id: i64) -> api::Result<Bookmark> {
        Err(failure(501))
    }
}

/// Everything a [`ReviewUi`] was asked to show.
#[derive(Debug, Default)]
pub struct RecordingUi {
    pub alerts: Vec<(Severity, String)>,
    pub processing_events: Vec<bool>,
    pub processing: bool,
    pub nav_enabled: Option<bool>,
    pub comparisons: Vec<TagComparison>,
    pub remaining: Vec<u64>,
    pub retry_prompts: Vec<String>,
    pub completed: Vec<i64>,
    pub exits: Vec<Option<String>>,
}

impl RecordingUi {
    pub fn has_alert(&self, severity: Severity, needle: &str) -> bool {
        self.alerts
            .iter()
            .any(|(s, message)| *s == severity && message.contains(needle))
    }
}

impl ReviewUi for RecordingUi {
    fn alert(&mut self, severity: Severity, message: &str) {
        self.alerts.push((severity, message.to_string()));
    }

    fn set_processing(&mut self, active: bool, _message: Option<&str>) {
        self.processing = active;
        self.processing_events.push(active);
    }

    fn set_nav_enabled(&mut self, enabled: bool) {
        self.nav_enabled = Some(enabled);
    }

    fn show_comparison(&mut self, comparison: &TagComparison) {
        self.comparisons.push(comparison.clone());
    }

    fn meta_updated(&mut self, remaining: u64) {
        self.remaining.push(remaining);
    }

    fn prompt_retry(&mut self, message: &str) {
        self.retry_prompts.push(message.to_string());
    }

    fn review_complete(&mut self, map_id: i64) {
        self.completed.push(map_id);
    }

    fn session_exited(&mut self, message: Option<&str>) {
        self.exits.push(message.map(str::to_string));
    }
}

pub fn node(id: i64, lon: f64, lat: f64, tags: &[(&str, &str)]) -> Element {
    Element::Node {
        id,
        version: 1,
        lat,
        lon,
        tags: tags_of(tags),
    }
}

pub fn tags_of(pairs: &[(&str, &str)]) -> Tags {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// A review relation over the given nodes, plus the nodes themselves.
pub fn reviewable(relation_id: i64, member_nodes: &[i64]) -> Vec<Element> {
    let mut elements: Vec<Element> = member_nodes
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let offset = i as f64 * 0.0005;
            node(*id, 10.0 + offset, 50.0 + offset, &[("name", &format!("Feature {id}"))])
        })
        .collect();
    elements.push(Element::Relation {
        id: relation_id,
        version: 1,
        members: member_nodes
            .iter()
            .map(|id| Member {
                kind: ElementKind::Node,
                reference: *id,
                role: "reviewee".to_string(),
            })
            .collect(),
        tags: tags_of(&[("hoot:review:needs", "yes"), ("type", "review")]),
    });
    elements
}

/// A navigator wired to a [`FakeApi`] through a real [`EditorHost`].
pub struct Harness {
    pub api: Arc<FakeApi>,
    pub host: EditorHost,
    pub session: ReviewSession,
    pub navigator: ReviewNavigator,
    pub ui: RecordingUi,
}

impl Harness {
    pub fn new() -> Self {
        let api = FakeApi::new();
        let dyn_api: Arc<dyn ReviewApi> = api.clone();
        Self {
            host: EditorHost::new(dyn_api, MAP_ID),
            api,
            session: ReviewSession::new(),
            navigator: ReviewNavigator::new(ConflictHighlighter::default()),
            ui: RecordingUi::default(),
        }
    }

    /// A harness whose navigator has been initialized for [`MAP_ID`].
    pub fn initialized() -> Self {
        let mut harness = Self::new();
        let options = NavigatorOptions {
            next_control: Some("next".to_string()),
            prev_control: Some("prev".to_string()),
            map_id: Some(MAP_ID),
        };
        assert!(
            harness
                .navigator
                .initialize(&mut harness.session, &mut harness.ui, &options)
        );
        harness
    }

    pub fn advance(&mut self, direction: Direction) -> Result<AdvanceStatus, ReviewError> {
        self.navigator.advance(
            &mut self.session,
            self.api.as_ref(),
            &mut self.host,
            &mut self.ui,
            direction,
        )
    }
}
