use crate::osm::Element;
use crate::{EntityId, Extent, Tags};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Local store of loaded map entities.
///
/// Each entity remembers a SHA-256 digest of the version it was loaded with.
/// An entity whose current content hashes differently is a pending local edit.
#[derive(Debug, Default)]
pub struct WorkingGraph {
    entities: HashMap<EntityId, Element>,
    base: HashMap<EntityId, String>,
}

impl WorkingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge freshly loaded elements.
    ///
    /// Entities carrying local edits are left untouched so a reload never
    /// discards work the operator has not saved yet.
    pub fn merge(&mut self, elements: Vec<Element>) {
        for element in elements {
            let id = element.id();
            if self.is_modified(&id) {
                continue;
            }
            self.base.insert(id, digest(&element));
            self.entities.insert(id, element);
        }
    }

    pub fn get(&self, id: &EntityId) -> Option<&Element> {
        self.entities.get(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Replace the tags of a loaded entity. Returns `false` if it is not loaded.
    pub fn set_tags(&mut self, id: &EntityId, tags: Tags) -> bool {
        match self.entities.get_mut(id) {
            Some(element) => {
                *element.tags_mut() = tags;
                true
            }
            None => false,
        }
    }

    pub fn is_modified(&self, id: &EntityId) -> bool {
        match (self.entities.get(id), self.base.get(id)) {
            (Some(element), Some(base)) => digest(element) != *base,
            _ => false,
        }
    }

    pub fn has_changes(&self) -> bool {
        self.entities.keys().any(|id| self.is_modified(id))
    }

    /// Entities whose content differs from the loaded version, ordered by id.
    pub fn modified(&self) -> Vec<&Element> {
        let mut changed: Vec<&Element> = self
            .entities
            .iter()
            .filter(|(id, _)| self.is_modified(id))
            .map(|(_, element)| element)
            .collect();
        changed.sort_by_key(|element| element.id());
        changed
    }

    /// Accept all local edits as the new base after a successful upload.
    ///
    /// The server increments the version of every element it stores, so the
    /// local copies follow suit.
    pub fn commit_saved(&mut self) {
        let changed: Vec<EntityId> = self
            .entities
            .keys()
            .filter(|id| self.is_modified(id))
            .copied()
            .collect();
        for id in changed {
            if let Some(element) = self.entities.get_mut(&id) {
                element.bump_version();
                self.base.insert(id, digest(element));
            }
        }
    }

    /// Drop every loaded entity.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.base.clear();
    }

    /// Bounding extent of an entity, following way nodes and relation members.
    ///
    /// Returns `None` when the entity or all of its geometry is not loaded.
    pub fn extent(&self, id: &EntityId) -> Option<Extent> {
        let mut visited = HashSet::new();
        self.extent_inner(id, &mut visited)
    }

    fn extent_inner(&self, id: &EntityId, visited: &mut HashSet<EntityId>) -> Option<Extent> {
        match self.entities.get(id)? {
            Element::Node { lat, lon, .. } => Some(Extent::point(*lon, *lat)),
            Element::Way { nodes, .. } => nodes
                .iter()
                .filter_map(|n| self.extent_inner(&EntityId::node(*n), visited))
                .reduce(|a, b| a.union(&b)),
            Element::Relation { members, .. } => {
                // Relations may reference each other in cycles.
                if !visited.insert(*id) {
                    return None;
                }
                members
                    .iter()
                    .filter_map(|m| self.extent_inner(&m.entity_id(), visited))
                    .reduce(|a, b| a.union(&b))
            }
        }
    }
}

/// Hex SHA-256 digest of an element's canonical JSON form.
fn digest(element: &Element) -> String {
    let bytes = serde_json::to_vec(element).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}
