//! Typed map entities and the entity source seam.
//!
//! A source yields an ordered stream of buffers of typed records. The
//! on-disk reader is backed by `osmpbf`; tests drive the same interface
//! through `MemorySource`.

use anyhow::{Context, Result};
use osmpbf::{Element as PbfElement, ElementReader};
use std::path::PathBuf;

use crate::geo::Coordinate;
use crate::ids::{NodeId, RelationId, WayId};

/// Free-form tags as they appear on the source entity. Entities carry few
/// tags, so lookups stay linear over the original pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagMap {
    pairs: Vec<(String, String)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct OsmNode {
    pub id: NodeId,
    pub coord: Coordinate,
    pub tags: TagMap,
}

#[derive(Debug, Clone)]
pub struct OsmWay {
    pub id: WayId,
    pub nodes: Vec<NodeId>,
    pub tags: TagMap,
    /// Filled by the location-resolution stage when the profile declares
    /// location-dependent data; empty otherwise.
    pub node_locations: Vec<Coordinate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

#[derive(Debug, Clone)]
pub struct RelationMember {
    pub kind: MemberKind,
    pub id: i64,
    pub role: String,
}

#[derive(Debug, Clone)]
pub struct OsmRelation {
    pub id: RelationId,
    pub tags: TagMap,
    pub members: Vec<RelationMember>,
}

#[derive(Debug, Clone)]
pub enum Element {
    Node(OsmNode),
    Way(OsmWay),
    Relation(OsmRelation),
}

/// One unit of pipeline work: an ordered run of entities from the source.
#[derive(Debug, Clone, Default)]
pub struct ElementBuffer {
    pub elements: Vec<Element>,
}

/// Which entity kinds a read pass is interested in.
#[derive(Debug, Clone, Copy)]
pub struct EntityMask {
    pub nodes: bool,
    pub ways: bool,
    pub relations: bool,
}

impl EntityMask {
    pub const RELATIONS: EntityMask = EntityMask {
        nodes: false,
        ways: false,
        relations: true,
    };

    pub const ALL: EntityMask = EntityMask {
        nodes: true,
        ways: true,
        relations: true,
    };

    fn accepts(&self, element: &Element) -> bool {
        match element {
            Element::Node(_) => self.nodes,
            Element::Way(_) => self.ways,
            Element::Relation(_) => self.relations,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceHeader {
    pub generator: Option<String>,
    pub replication_timestamp: Option<String>,
}

/// The entity source seam. Each call to `read` restarts the underlying
/// stream and hands buffers to `sink` in input order.
pub trait EntitySource: Send {
    fn header(&self) -> SourceHeader;

    fn read(&mut self, mask: EntityMask, sink: &mut dyn FnMut(ElementBuffer)) -> Result<()>;
}

const BUFFER_CAPACITY: usize = 8 * 1024;

/// PBF-backed source. The reader decodes sequentially, so buffers come out
/// in file order.
pub struct PbfSource {
    path: PathBuf,
}

impl PbfSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl EntitySource for PbfSource {
    fn header(&self) -> SourceHeader {
        SourceHeader::default()
    }

    fn read(&mut self, mask: EntityMask, sink: &mut dyn FnMut(ElementBuffer)) -> Result<()> {
        let reader = ElementReader::from_path(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;

        let mut buffer = ElementBuffer::default();
        reader
            .for_each(|element| {
                let converted = match element {
                    PbfElement::Node(node) => {
                        if !mask.nodes {
                            return;
                        }
                        Element::Node(OsmNode {
                            id: node.id(),
                            coord: Coordinate::from_degrees(node.lon(), node.lat()),
                            tags: TagMap::from_pairs(
                                node.tags()
                                    .map(|(k, v)| (k.to_string(), v.to_string()))
                                    .collect(),
                            ),
                        })
                    }
                    PbfElement::DenseNode(node) => {
                        if !mask.nodes {
                            return;
                        }
                        Element::Node(OsmNode {
                            id: node.id(),
                            coord: Coordinate::from_degrees(node.lon(), node.lat()),
                            tags: TagMap::from_pairs(
                                node.tags()
                                    .map(|(k, v)| (k.to_string(), v.to_string()))
                                    .collect(),
                            ),
                        })
                    }
                    PbfElement::Way(way) => {
                        if !mask.ways {
                            return;
                        }
                        Element::Way(OsmWay {
                            id: way.id(),
                            nodes: way.refs().collect(),
                            tags: TagMap::from_pairs(
                                way.tags()
                                    .map(|(k, v)| (k.to_string(), v.to_string()))
                                    .collect(),
                            ),
                            node_locations: Vec::new(),
                        })
                    }
                    PbfElement::Relation(relation) => {
                        if !mask.relations {
                            return;
                        }
                        let members = relation
                            .members()
                            .filter_map(|member| {
                                let kind = match member.member_type {
                                    osmpbf::RelMemberType::Node => MemberKind::Node,
                                    osmpbf::RelMemberType::Way => MemberKind::Way,
                                    osmpbf::RelMemberType::Relation => MemberKind::Relation,
                                };
                                Some(RelationMember {
                                    kind,
                                    id: member.member_id,
                                    role: member.role().ok()?.to_string(),
                                })
                            })
                            .collect();
                        Element::Relation(OsmRelation {
                            id: relation.id(),
                            tags: TagMap::from_pairs(
                                relation
                                    .tags()
                                    .map(|(k, v)| (k.to_string(), v.to_string()))
                                    .collect(),
                            ),
                            members,
                        })
                    }
                };

                buffer.elements.push(converted);
                if buffer.elements.len() >= BUFFER_CAPACITY {
                    sink(std::mem::take(&mut buffer));
                }
            })
            .with_context(|| format!("failed to read {}", self.path.display()))?;

        if !buffer.elements.is_empty() {
            sink(buffer);
        }
        Ok(())
    }
}

/// In-memory source for tests and synthetic fixtures.
pub struct MemorySource {
    header: SourceHeader,
    elements: Vec<Element>,
    buffer_size: usize,
}

impl MemorySource {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            header: SourceHeader::default(),
            elements,
            buffer_size: BUFFER_CAPACITY,
        }
    }

    /// Smaller buffers exercise pipeline ordering in tests.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size.max(1);
        self
    }

    pub fn with_header(mut self, header: SourceHeader) -> Self {
        self.header = header;
        self
    }
}

impl EntitySource for MemorySource {
    fn header(&self) -> SourceHeader {
        self.header.clone()
    }

    fn read(&mut self, mask: EntityMask, sink: &mut dyn FnMut(ElementBuffer)) -> Result<()> {
        let mut buffer = ElementBuffer::default();
        for element in &self.elements {
            if !mask.accepts(element) {
                continue;
            }
            buffer.elements.push(element.clone());
            if buffer.elements.len() >= self.buffer_size {
                sink(std::mem::take(&mut buffer));
            }
        }
        if !buffer.elements.is_empty() {
            sink(buffer);
        }
        Ok(())
    }
}
