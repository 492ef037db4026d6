use crate::{ElementKind, EntityId, Tags};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// A relation member reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub kind: ElementKind,
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(default)]
    pub role: String,
}

impl Member {
    pub fn entity_id(&self) -> EntityId {
        EntityId {
            kind: self.kind,
            id: self.reference,
        }
    }
}

/// An OSM element as served by the `.json` flavour of the 0.6 API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Node {
        id: i64,
        #[serde(default)]
        version: u32,
        lat: f64,
        lon: f64,
        #[serde(default)]
        tags: Tags,
    },
    Way {
        id: i64,
        #[serde(default)]
        version: u32,
        #[serde(default)]
        nodes: Vec<i64>,
        #[serde(default)]
        tags: Tags,
    },
    Relation {
        id: i64,
        #[serde(default)]
        version: u32,
        #[serde(default)]
        members: Vec<Member>,
        #[serde(default)]
        tags: Tags,
    },
}

impl Element {
    pub fn id(&self) -> EntityId {
        match self {
            Element::Node { id, .. } => EntityId::node(*id),
            Element::Way { id, .. } => EntityId::way(*id),
            Element::Relation { id, .. } => EntityId::relation(*id),
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            Element::Node { version, .. }
            | Element::Way { version, .. }
            | Element::Relation { version, .. } => *version,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Element::Node { tags, .. } | Element::Way { tags, .. } | Element::Relation { tags, .. } => {
                tags
            }
        }
    }

    pub fn tags_mut(&mut self) -> &mut Tags {
        match self {
            Element::Node { tags, .. } | Element::Way { tags, .. } | Element::Relation { tags, .. } => {
                tags
            }
        }
    }

    pub(crate) fn bump_version(&mut self) {
        match self {
            Element::Node { version, .. }
            | Element::Way { version, .. }
            | Element::Relation { version, .. } => *version += 1,
        }
    }

    /// Member ids of a relation; empty for nodes and ways.
    pub fn member_ids(&self) -> Vec<EntityId> {
        match self {
            Element::Relation { members, .. } => members.iter().map(Member::entity_id).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OsmDocument {
    #[serde(default)]
    elements: Vec<Element>,
}

/// Parse an OSM JSON document (`{"elements": [...]}`).
pub fn parse_document(input: &str) -> Result<Vec<Element>, serde_json::Error> {
    let doc: OsmDocument = serde_json::from_str(input)?;
    Ok(doc.elements)
}

/// Body for `PUT /api/0.6/changeset/create`.
pub fn render_changeset(comment: &str) -> String {
    format!(
        "<osm><changeset><tag k=\"created_by\" v=\"conflate-review\"/><tag k=\"comment\" v=\"{}\"/></changeset></osm>",
        escape(comment)
    )
}

/// Render modified elements as an osmChange document bound to `changeset`.
pub fn render_osm_change(changeset: u64, elements: &[&Element]) -> String {
    let mut out = String::from("<osmChange version=\"0.6\" generator=\"conflate-review\"><modify>");
    for element in elements {
        // Writing into a String cannot fail.
        let _ = write_element(&mut out, changeset, element);
    }
    out.push_str("</modify></osmChange>");
    out
}

fn write_element(out: &mut String, changeset: u64, element: &Element) -> std::fmt::Result {
    match element {
        Element::Node {
            id,
            version,
            lat,
            lon,
            tags,
        } => {
            write!(
                out,
                "<node id=\"{id}\" version=\"{version}\" changeset=\"{changeset}\" lat=\"{lat}\" lon=\"{lon}\">"
            )?;
            write_tags(out, tags)?;
            write!(out, "</node>")
        }
        Element::Way {
            id,
            version,
            nodes,
            tags,
        } => {
            write!(
                out,
                "<way id=\"{id}\" version=\"{version}\" changeset=\"{changeset}\">"
            )?;
            for node in nodes {
                write!(out, "<nd ref=\"{node}\"/>")?;
            }
            write_tags(out, tags)?;
            write!(out, "</way>")
        }
        Element::Relation {
            id,
            version,
            members,
            tags,
        } => {
            write!(
                out,
                "<relation id=\"{id}\" version=\"{version}\" changeset=\"{changeset}\">"
            )?;
            for member in members {
                write!(
                    out,
                    "<member type=\"{}\" ref=\"{}\" role=\"{}\"/>",
                    member.kind.as_str(),
                    member.reference,
                    escape(&member.role)
                )?;
            }
            write_tags(out, tags)?;
            write!(out, "</relation>")
        }
    }
}

fn write_tags(out: &mut String, tags: &Tags) -> std::fmt::Result {
    for (k, v) in tags {
        write!(out, "<tag k=\"{}\" v=\"{}\"/>", escape(k), escape(v))?;
    }
    Ok(())
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
