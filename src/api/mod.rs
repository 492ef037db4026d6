use crate::config::ReviewConfig;
use crate::osm::{self, Element};
use crate::{Direction, ReviewCursor, ReviewStatistics};
use reqwest::blocking::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors talking to the review service.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("service responded with {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Payload for `reviewGetNext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NextItemRequest {
    pub map_id: i64,
    pub sort_order: i64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextItemResponse {
    pub result_count: u64,
    #[serde(default)]
    pub map_id: i64,
    #[serde(default)]
    pub relation_id: i64,
    #[serde(default)]
    pub sort_order: i64,
}

impl From<NextItemResponse> for ReviewCursor {
    fn from(response: NextItemResponse) -> Self {
        ReviewCursor {
            map_id: response.map_id,
            relation_id: response.relation_id,
            sort_order: response.sort_order,
            result_count: response.result_count,
        }
    }
}

/// Payload for `reviewGetReviewItem`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItemRequest {
    pub map_id: i64,
    pub sequence: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItemResponse {
    pub result_count: u64,
    #[serde(default)]
    pub map_id: i64,
    #[serde(default)]
    pub relation_id: i64,
}

impl ReviewItemResponse {
    /// The item endpoint does not echo the sort order; the requested sequence is it.
    pub fn into_cursor(self, sequence: i64) -> ReviewCursor {
        ReviewCursor {
            map_id: self.map_id,
            relation_id: self.relation_id,
            sort_order: sequence,
            result_count: self.result_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBookmark {
    pub map_id: i64,
    pub relation_id: i64,
    pub detail: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub bookmark_id: i64,
    pub map_id: i64,
    pub relation_id: i64,
    #[serde(default)]
    pub detail: serde_json::Value,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SavedBookmark {
    bookmark_id: i64,
}

/// REST operations consumed by the review workflow.
///
/// Implementations must be shareable with a worker thread.
pub trait ReviewApi: Send + Sync {
    fn statistics(&self, map_id: i64) -> Result<ReviewStatistics>;
    fn next_item(&self, request: &NextItemRequest) -> Result<NextItemResponse>;
    fn review_item(&self, request: &ReviewItemRequest) -> Result<ReviewItemResponse>;
    /// Load a relation with all of its members (`relation/{id}/full`).
    fn load_relation(&self, map_id: i64, relation_id: i64) -> Result<Vec<Element>>;
    fn resolve_all(&self, map_id: i64) -> Result<()>;
    /// Upload modified elements in a new changeset. Returns the changeset id.
    fn upload_changes(&self, map_id: i64, elements: &[&Element]) -> Result<u64>;
    fn save_bookmark(&self, bookmark: &NewBookmark) -> Result<i64>;
    fn get_bookmark(&self, bookmark_id: i64) -> Result<Bookmark>;
}

/// Blocking HTTP client for the review service and its OSM API.
#[derive(Debug, Clone)]
pub struct HttpReviewApi {
    client: Client,
    service_url: String,
    osm_api_url: String,
}

impl HttpReviewApi {
    pub fn new(config: &ReviewConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            service_url: config.service_url.trim_end_matches('/').to_string(),
            osm_api_url: config.osm_api_url.trim_end_matches('/').to_string(),
        })
    }

    fn review_url(&self, path: &str) -> String {
        format!("{}/job/review/{}", self.service_url, path)
    }

    fn osm_url(&self, path: &str) -> String {
        format!("{}/api/0.6/{}", self.osm_api_url, path)
    }

    fn send_text(&self, request: RequestBuilder) -> Result<String> {
        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.send_text(request)?;
        decode(&body)
    }
}

/// Decode a JSON response body.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

impl ReviewApi for HttpReviewApi {
    fn statistics(&self, map_id: i64) -> Result<ReviewStatistics> {
        debug!(map_id, "requesting review statistics");
        self.send_json(
            self.client
                .get(self.review_url("statistics"))
                .query(&[("mapId", map_id)]),
        )
    }

    fn next_item(&self, request: &NextItemRequest) -> Result<NextItemResponse> {
        debug!(?request, "requesting next reviewable");
        let direction = match request.direction {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        };
        self.send_json(self.client.get(self.review_url("next")).query(&[
            ("mapId", request.map_id.to_string()),
            ("sortOrder", request.sort_order.to_string()),
            ("direction", direction.to_string()),
        ]))
    }

    fn review_item(&self, request: &ReviewItemRequest) -> Result<ReviewItemResponse> {
        debug!(?request, "requesting reviewable by sequence");
        self.send_json(
            self.client
                .get(self.review_url("reviewable"))
                .query(&[("mapId", request.map_id), ("sequence", request.sequence)]),
        )
    }

    fn load_relation(&self, map_id: i64, relation_id: i64) -> Result<Vec<Element>> {
        debug!(map_id, relation_id, "loading relation members");
        let body = self.send_text(
            self.client
                .get(self.osm_url(&format!("relation/{relation_id}/full.json")))
                .query(&[("mapId", map_id)]),
        )?;
        Ok(osm::parse_document(&body)?)
    }

    fn resolve_all(&self, map_id: i64) -> Result<()> {
        info!(map_id, "resolving all reviews");
        self.send_text(
            self.client
                .put(self.review_url("resolveall"))
                .json(&serde_json::json!({ "mapId": map_id })),
        )?;
        Ok(())
    }

    fn upload_changes(&self, map_id: i64, elements: &[&Element]) -> Result<u64> {
        let body = self.send_text(
            self.client
                .put(self.osm_url("changeset/create"))
                .query(&[("mapId", map_id)])
                .header("Content-Type", "text/xml")
                .body(osm::render_changeset("Resolved conflation reviews")),
        )?;
        let changeset: u64 = body
            .trim()
            .parse()
            .map_err(|_| ApiError::Malformed(format!("changeset id {:?}", body.trim())))?;

        self.send_text(
            self.client
                .post(self.osm_url(&format!("changeset/{changeset}/upload")))
                .query(&[("mapId", map_id)])
                .header("Content-Type", "text/xml")
                .body(osm::render_osm_change(changeset, elements)),
        )?;
        self.send_text(
            self.client
                .put(self.osm_url(&format!("changeset/{changeset}/close")))
                .query(&[("mapId", map_id)]),
        )?;
        info!(map_id, changeset, count = elements.len(), "uploaded changes");
        Ok(changeset)
    }

    fn save_bookmark(&self, bookmark: &NewBookmark) -> Result<i64> {
        let saved: SavedBookmark = self.send_json(
            self.client
                .post(self.review_url("bookmarks/save"))
                .json(bookmark),
        )?;
        Ok(saved.bookmark_id)
    }

    fn get_bookmark(&self, bookmark_id: i64) -> Result<Bookmark> {
        self.send_json(
            self.client
                .get(self.review_url("bookmarks/get"))
                .query(&[("bookmarkId", bookmark_id)]),
        )
    }
}
