use crate::api::{ApiError, ReviewApi};
use crate::graph::WorkingGraph;
use crate::highlight::TagComparison;
use crate::osm::Element;
use crate::{EntityId, Extent, Tags};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Tile size of the web mercator pyramid, in pixels.
const TILE_SIZE: f64 = 256.0;

/// Zoom used for extents without area (a single node).
pub const POINT_ZOOM: f64 = 24.0;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("service error: {0}")]
    Api(#[from] ApiError),
    #[error("entity not loaded: {0}")]
    MissingEntity(EntityId),
    #[error("{0}")]
    Rejected(String),
}

/// Severity of an operator-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Notice,
    Warning,
    Error,
    Success,
}

/// Map editor services the review workflow consumes.
pub trait HostEditor {
    fn has_unsaved_changes(&self) -> bool;
    fn entity(&self, id: &EntityId) -> Option<&Element>;
    fn extent(&self, id: &EntityId) -> Option<Extent>;
    /// Merge loaded elements into the working graph.
    fn load_entities(&mut self, elements: Vec<Element>);
    /// Zoom level at which `extent` fills the viewport.
    fn extent_zoom(&self, extent: &Extent) -> f64;
    fn pan_to(&mut self, extent: Extent, zoom: f64);
    fn set_highlight(&mut self, ids: &[EntityId], on: bool);
    fn enter_selection(&mut self, ids: &[EntityId]);
    fn set_tags(&mut self, id: &EntityId, tags: Tags) -> Result<(), HostError>;
    fn save(&mut self) -> Result<(), HostError>;
    /// Drop and re-pull the given layer.
    fn reload_layer(&mut self, layer: &str) -> Result<(), HostError>;
}

/// Operator-facing surface driven by the review workflow.
pub trait ReviewUi {
    fn alert(&mut self, severity: Severity, message: &str);
    fn set_processing(&mut self, active: bool, message: Option<&str>);
    fn set_nav_enabled(&mut self, enabled: bool);
    fn show_comparison(&mut self, comparison: &TagComparison);
    /// Remaining reviewable count changed.
    fn meta_updated(&mut self, remaining: u64);
    /// Offer the operator a retry-or-abandon choice. Must not block.
    fn prompt_retry(&mut self, message: &str);
    fn review_complete(&mut self, map_id: i64);
    /// The review mode ended; the front end decides what to show next.
    fn session_exited(&mut self, message: Option<&str>);
}

/// Camera state of the map view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub center: (f64, f64),
    pub zoom: f64,
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: (0.0, 0.0),
            zoom: 2.0,
            width_px: 1024,
            height_px: 768,
        }
    }
}

/// Editor host backed by a [`WorkingGraph`] and the review service.
pub struct EditorHost {
    api: Arc<dyn ReviewApi>,
    map_id: i64,
    graph: WorkingGraph,
    viewport: Viewport,
    highlighted: BTreeSet<EntityId>,
    selection: Vec<EntityId>,
}

impl EditorHost {
    pub fn new(api: Arc<dyn ReviewApi>, map_id: i64) -> Self {
        Self {
            api,
            map_id,
            graph: WorkingGraph::new(),
            viewport: Viewport::default(),
            highlighted: BTreeSet::new(),
            selection: Vec::new(),
        }
    }

    pub fn graph(&self) -> &WorkingGraph {
        &self.graph
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn set_viewport_size(&mut self, width_px: u32, height_px: u32) {
        self.viewport.width_px = width_px.max(1);
        self.viewport.height_px = height_px.max(1);
    }

    pub fn highlighted(&self) -> &BTreeSet<EntityId> {
        &self.highlighted
    }

    pub fn selection(&self) -> &[EntityId] {
        &self.selection
    }
}

impl HostEditor for EditorHost {
    fn has_unsaved_changes(&self) -> bool {
        self.graph.has_changes()
    }

    fn entity(&self, id: &EntityId) -> Option<&Element> {
        self.graph.get(id)
    }

    fn extent(&self, id: &EntityId) -> Option<Extent> {
        self.graph.extent(id)
    }

    fn load_entities(&mut self, elements: Vec<Element>) {
        self.graph.merge(elements);
    }

    fn extent_zoom(&self, extent: &Extent) -> f64 {
        fit_zoom(extent, self.viewport.width_px, self.viewport.height_px)
    }

    fn pan_to(&mut self, extent: Extent, zoom: f64) {
        self.viewport.center = extent.center();
        self.viewport.zoom = zoom;
    }

    fn set_highlight(&mut self, ids: &[EntityId], on: bool) {
        for id in ids {
            if on {
                self.highlighted.insert(*id);
            } else {
                self.highlighted.remove(id);
            }
        }
    }

    fn enter_selection(&mut self, ids: &[EntityId]) {
        self.selection = ids.to_vec();
    }

    fn set_tags(&mut self, id: &EntityId, tags: Tags) -> Result<(), HostError> {
        if self.graph.set_tags(id, tags) {
            Ok(())
        } else {
            Err(HostError::MissingEntity(*id))
        }
    }

    fn save(&mut self) -> Result<(), HostError> {
        let changed = self.graph.modified();
        if changed.is_empty() {
            return Ok(());
        }
        let changeset = self.api.upload_changes(self.map_id, &changed)?;
        info!(map_id = self.map_id, changeset, "saved local edits");
        self.graph.commit_saved();
        Ok(())
    }

    fn reload_layer(&mut self, layer: &str) -> Result<(), HostError> {
        if self.graph.has_changes() {
            return Err(HostError::Rejected(format!(
                "layer {layer} has unsaved edits"
            )));
        }
        info!(layer, "reloading layer");
        self.graph.clear();
        self.highlighted.clear();
        self.selection.clear();
        Ok(())
    }
}

/// Web mercator zoom at which `extent` fits a `width` x `height` pixel view.
pub fn fit_zoom(extent: &Extent, width: u32, height: u32) -> f64 {
    let x0 = lon_to_unit(extent.min_lon);
    let x1 = lon_to_unit(extent.max_lon);
    let y0 = lat_to_unit(extent.max_lat);
    let y1 = lat_to_unit(extent.min_lat);
    let dx = (x1 - x0).abs();
    let dy = (y1 - y0).abs();

    let zx = if dx > 0.0 {
        (f64::from(width) / (TILE_SIZE * dx)).log2()
    } else {
        POINT_ZOOM
    };
    let zy = if dy > 0.0 {
        (f64::from(height) / (TILE_SIZE * dy)).log2()
    } else {
        POINT_ZOOM
    };
    zx.min(zy).min(POINT_ZOOM)
}

fn lon_to_unit(lon: f64) -> f64 {
    (lon + 180.0) / 360.0
}

fn lat_to_unit(lat: f64) -> f64 {
    let lat = lat.clamp(-85.051_128_78, 85.051_128_78).to_radians();
    (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / std::f64::consts::PI) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_extent_uses_point_zoom() {
        let zoom = fit_zoom(&Extent::point(10.0, 50.0), 1024, 768);
        assert_eq!(zoom, POINT_ZOOM);
    }

    #[test]
    fn whole_world_fits_at_low_zoom() {
        let world = Extent {
            min_lon: -180.0,
            min_lat: -85.0,
            max_lon: 180.0,
            max_lat: 85.0,
        };
        let zoom = fit_zoom(&world, 256, 256);
        assert!(zoom.abs() < 0.01, "zoom was {zoom}");
    }

    #[test]
    fn smaller_extent_means_higher_zoom() {
        let big = Extent {
            min_lon: 10.0,
            min_lat: 50.0,
            max_lon: 10.1,
            max_lat: 50.1,
        };
        let small = Extent {
            min_lon: 10.0,
            min_lat: 50.0,
            max_lon: 10.001,
            max_lat: 50.001,
        };
        assert!(fit_zoom(&small, 800, 600) > fit_zoom(&big, 800, 600));
    }
}
