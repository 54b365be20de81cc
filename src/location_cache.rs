//! Node location cache for location-dependent profiles.
//!
//! Populated as node buffers stream by (the dump places nodes before the
//! ways that reference them) and consulted to annotate each way with the
//! coordinates of its nodes. Only the serial location-resolution stage
//! writes to the cache.

use rustc_hash::FxHashMap;

use crate::geo::Coordinate;
use crate::ids::NodeId;
use crate::osm::{Element, ElementBuffer};

#[derive(Default)]
pub struct LocationCache {
    coords: FxHashMap<NodeId, Coordinate>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record node coordinates from the buffer, then annotate every way in
    /// it with the locations of its nodes. Unresolved references stay as
    /// default coordinates; the reference-integrity pass drops such ways
    /// later with a proper warning.
    pub fn apply(&mut self, buffer: &mut ElementBuffer) {
        for element in &buffer.elements {
            if let Element::Node(node) = element {
                self.coords.insert(node.id, node.coord);
            }
        }
        for element in &mut buffer.elements {
            if let Element::Way(way) = element {
                way.node_locations = way
                    .nodes
                    .iter()
                    .map(|id| self.coords.get(id).copied().unwrap_or_default())
                    .collect();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::{OsmNode, OsmWay, TagMap};

    #[test]
    fn ways_pick_up_node_locations() {
        let mut cache = LocationCache::new();
        let mut buffer = ElementBuffer {
            elements: vec![
                Element::Node(OsmNode {
                    id: 1,
                    coord: Coordinate::from_degrees(4.0, 50.0),
                    tags: TagMap::new(),
                }),
                Element::Node(OsmNode {
                    id: 2,
                    coord: Coordinate::from_degrees(4.1, 50.1),
                    tags: TagMap::new(),
                }),
                Element::Way(OsmWay {
                    id: 10,
                    nodes: vec![1, 2],
                    tags: TagMap::new(),
                    node_locations: Vec::new(),
                }),
            ],
        };

        cache.apply(&mut buffer);

        let Element::Way(way) = &buffer.elements[2] else {
            panic!("expected way");
        };
        assert_eq!(way.node_locations.len(), 2);
        assert_eq!(way.node_locations[0], Coordinate::from_degrees(4.0, 50.0));
    }
}
