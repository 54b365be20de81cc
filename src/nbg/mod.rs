//! Node-based graph construction and degree-2 chain compression.
//!
//! The graph keeps one directed entry per segment direction; oneway
//! mirrors are present but flagged `reversed` so adjacency stays
//! symmetric. Compression folds interior nodes into per-edge geometry
//! lists carrying running weight/duration prefix sums, then renumbers the
//! surviving junction nodes to dense ids. The number of junction nodes
//! always equals the coordinate array length afterwards.

use log::info;
use rustc_hash::FxHashSet;

use crate::containers::RawEdge;
use crate::geo::Coordinate;
use crate::ids::{
    AnnotationId, EdgeId, InternalNodeId, NodeId, INVALID_GEOMETRY_ID, INVALID_INTERNAL_NODE,
};
use crate::profile::RoadPriority;

#[derive(Debug, Clone, Copy)]
pub struct NodeBasedEdgeData {
    pub reversed: bool,
    pub weight: u32,
    pub duration: u32,
    pub annotation: AnnotationId,
    pub geometry: u32,
    pub roundabout: bool,
    pub is_startpoint: bool,
    pub priority: RoadPriority,
}

impl NodeBasedEdgeData {
    fn merge_compatible(&self, other: &NodeBasedEdgeData) -> bool {
        self.reversed == other.reversed
            && self.annotation == other.annotation
            && self.roundabout == other.roundabout
            && self.is_startpoint == other.is_startpoint
            && self.priority == other.priority
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NodeBasedEdge {
    pub target: InternalNodeId,
    pub data: NodeBasedEdgeData,
}

pub struct NodeBasedGraph {
    offsets: Vec<u32>,
    edges: Vec<NodeBasedEdge>,
}

impl NodeBasedGraph {
    fn from_edges(num_nodes: usize, mut input: Vec<(InternalNodeId, NodeBasedEdge)>) -> Self {
        input.sort_by_key(|(source, edge)| (*source, edge.target));

        let mut offsets = vec![0u32; num_nodes + 1];
        for (source, _) in &input {
            offsets[*source as usize + 1] += 1;
        }
        for i in 0..num_nodes {
            offsets[i + 1] += offsets[i];
        }

        Self {
            offsets,
            edges: input.into_iter().map(|(_, edge)| edge).collect(),
        }
    }

    pub fn num_nodes(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_range(&self, node: InternalNodeId) -> std::ops::Range<EdgeId> {
        self.offsets[node as usize]..self.offsets[node as usize + 1]
    }

    pub fn target(&self, edge: EdgeId) -> InternalNodeId {
        self.edges[edge as usize].target
    }

    pub fn data(&self, edge: EdgeId) -> &NodeBasedEdgeData {
        &self.edges[edge as usize].data
    }

    pub fn find_edge(&self, source: InternalNodeId, target: InternalNodeId) -> Option<EdgeId> {
        self.edge_range(source).find(|&e| self.target(e) == target)
    }

    /// Distinct neighbor count, i.e. number of incident road segments.
    pub fn degree(&self, node: InternalNodeId) -> usize {
        self.edge_range(node).len()
    }
}

/// One interior or terminal point of a compressed edge, with cumulative
/// cost from the edge source.
#[derive(Debug, Clone, Copy)]
pub struct GeometryEntry {
    pub coord: Coordinate,
    pub osm_node_id: NodeId,
    pub weight: u32,
    pub duration: u32,
}

#[derive(Default)]
pub struct CompressedEdgeContainer {
    geometries: Vec<Vec<GeometryEntry>>,
}

impl CompressedEdgeContainer {
    fn add(&mut self, geometry: Vec<GeometryEntry>) -> u32 {
        self.geometries.push(geometry);
        (self.geometries.len() - 1) as u32
    }

    pub fn get(&self, id: u32) -> &[GeometryEntry] {
        &self.geometries[id as usize]
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

pub struct NodeBasedGraphOutput {
    pub graph: NodeBasedGraph,
    pub coordinates: Vec<Coordinate>,
    pub osm_node_ids: Vec<NodeId>,
    pub barriers: FxHashSet<InternalNodeId>,
    pub traffic_signals: FxHashSet<InternalNodeId>,
    pub compressed: CompressedEdgeContainer,
    /// Old internal id to new junction id; `INVALID_INTERNAL_NODE` for
    /// nodes folded away during compression.
    pub node_id_map: Vec<InternalNodeId>,
}

/// Build the compressed node-based graph. `protected` nodes (restriction
/// anchors) are never folded; barriers and traffic signals survive by the
/// same mechanism since they annotate the junction.
pub fn build(
    edges: Vec<RawEdge>,
    coordinates: Vec<Coordinate>,
    osm_node_ids: Vec<NodeId>,
    barriers: Vec<InternalNodeId>,
    traffic_signals: Vec<InternalNodeId>,
    protected: &[InternalNodeId],
) -> NodeBasedGraphOutput {
    let num_nodes = coordinates.len();

    // Uncompressed adjacency.
    let uncompressed = NodeBasedGraph::from_edges(
        num_nodes,
        edges
            .iter()
            .map(|e| {
                (
                    e.source,
                    NodeBasedEdge {
                        target: e.target,
                        data: NodeBasedEdgeData {
                            reversed: e.reversed,
                            weight: e.weight,
                            duration: e.duration,
                            annotation: e.annotation,
                            geometry: INVALID_GEOMETRY_ID,
                            roundabout: e.roundabout,
                            is_startpoint: e.is_startpoint,
                            priority: e.priority,
                        },
                    },
                )
            })
            .collect(),
    );
    drop(edges);

    let mut uncompressible = vec![false; num_nodes];
    for &node in barriers.iter().chain(&traffic_signals).chain(protected) {
        uncompressible[node as usize] = true;
    }

    let compressible: Vec<bool> = (0..num_nodes as u32)
        .map(|v| !uncompressible[v as usize] && is_chain_node(&uncompressed, v))
        .collect();

    // Walk chains junction-to-junction and emit compressed edges.
    let mut compressed = CompressedEdgeContainer::default();
    let mut new_edges: Vec<(InternalNodeId, NodeBasedEdge)> = Vec::new();

    for source in 0..num_nodes as u32 {
        if compressible[source as usize] {
            continue;
        }
        for edge in uncompressed.edge_range(source) {
            let data = *uncompressed.data(edge);
            let mut previous = source;
            let mut current = uncompressed.target(edge);
            let mut weight = data.weight;
            let mut duration = data.duration;
            let mut geometry = vec![GeometryEntry {
                coord: coordinates[current as usize],
                osm_node_id: osm_node_ids[current as usize],
                weight,
                duration,
            }];

            let mut steps = 0usize;
            while compressible[current as usize] && steps <= uncompressed.num_edges() {
                let next_edge = uncompressed
                    .edge_range(current)
                    .find(|&e| uncompressed.target(e) != previous)
                    .expect("chain node must have a continuation");
                let next_data = uncompressed.data(next_edge);
                weight += next_data.weight;
                duration += next_data.duration;
                previous = current;
                current = uncompressed.target(next_edge);
                geometry.push(GeometryEntry {
                    coord: coordinates[current as usize],
                    osm_node_id: osm_node_ids[current as usize],
                    weight,
                    duration,
                });
                steps += 1;
            }

            let geometry_id = if data.reversed {
                INVALID_GEOMETRY_ID
            } else {
                compressed.add(geometry)
            };

            new_edges.push((
                source,
                NodeBasedEdge {
                    target: current,
                    data: NodeBasedEdgeData {
                        weight,
                        duration,
                        geometry: geometry_id,
                        ..data
                    },
                },
            ));
        }
    }

    // Renumber surviving nodes densely, preserving input-id order.
    let mut node_id_map = vec![INVALID_INTERNAL_NODE; num_nodes];
    let mut new_coordinates = Vec::new();
    let mut new_osm_ids = Vec::new();
    for old in 0..num_nodes {
        if !compressible[old] {
            node_id_map[old] = new_coordinates.len() as u32;
            new_coordinates.push(coordinates[old]);
            new_osm_ids.push(osm_node_ids[old]);
        }
    }

    let remapped: Vec<(InternalNodeId, NodeBasedEdge)> = new_edges
        .into_iter()
        .map(|(source, mut edge)| {
            edge.target = node_id_map[edge.target as usize];
            (node_id_map[source as usize], edge)
        })
        .collect();

    let graph = NodeBasedGraph::from_edges(new_coordinates.len(), remapped);

    let remap_set = |set: Vec<InternalNodeId>| -> FxHashSet<InternalNodeId> {
        set.into_iter()
            .map(|n| node_id_map[n as usize])
            .filter(|&n| n != INVALID_INTERNAL_NODE)
            .collect()
    };

    info!(
        "node-based graph: {} junction nodes, {} edges after compression",
        graph.num_nodes(),
        graph.num_edges()
    );
    debug_assert_eq!(graph.num_nodes(), new_coordinates.len());

    NodeBasedGraphOutput {
        graph,
        coordinates: new_coordinates,
        osm_node_ids: new_osm_ids,
        barriers: remap_set(barriers),
        traffic_signals: remap_set(traffic_signals),
        compressed,
        node_id_map,
    }
}

/// A node can be folded when exactly two road segments meet there and the
/// through-edges agree on attributes in both directions.
fn is_chain_node(graph: &NodeBasedGraph, v: InternalNodeId) -> bool {
    let range = graph.edge_range(v);
    if range.len() != 2 {
        return false;
    }
    let first = range.start;
    let second = range.start + 1;
    let u = graph.target(first);
    let w = graph.target(second);
    if u == w || u == v || w == v {
        return false;
    }

    // Through-traffic u -> v -> w must look like one edge, and the same in
    // the opposite direction.
    let Some(u_in) = graph.find_edge(u, v) else {
        return false;
    };
    let Some(w_in) = graph.find_edge(w, v) else {
        return false;
    };

    graph.data(u_in).merge_compatible(graph.data(second))
        && graph.data(w_in).merge_compatible(graph.data(first))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::ExtractionContainers;
    use crate::geo::Coordinate;
    use crate::osm::{OsmNode, OsmWay, TagMap};
    use crate::profile::{ExtractionNode, ExtractionWay, TravelMode};

    fn prepared_line(node_count: usize) -> crate::containers::PreparedData {
        let mut containers = ExtractionContainers::new();
        for i in 0..node_count {
            containers
                .process_node(
                    &OsmNode {
                        id: i as i64 + 1,
                        coord: Coordinate::from_degrees(0.001 * i as f64, 0.0),
                        tags: TagMap::new(),
                    },
                    ExtractionNode::default(),
                )
                .unwrap();
        }
        let way = ExtractionWay {
            forward_speed: 36.0,
            backward_speed: 36.0,
            forward_mode: TravelMode::Driving,
            backward_mode: TravelMode::Driving,
            ..ExtractionWay::default()
        };
        containers
            .process_way(
                &OsmWay {
                    id: 100,
                    nodes: (1..=node_count as i64).collect(),
                    tags: TagMap::new(),
                    node_locations: Vec::new(),
                },
                way,
            )
            .unwrap();
        containers.prepare().unwrap()
    }

    #[test]
    fn straight_chain_compresses_to_single_edge() {
        let prepared = prepared_line(4);
        let segment_weight = prepared.edges[0].weight;
        let output = build(
            prepared.edges,
            prepared.coordinates,
            prepared.osm_node_ids,
            prepared.barriers,
            prepared.traffic_signals,
            &[],
        );

        // Interior nodes 2 and 3 fold away.
        assert_eq!(output.graph.num_nodes(), 2);
        assert_eq!(output.graph.num_edges(), 2);
        assert_eq!(output.coordinates.len(), 2);

        let edge = output.graph.find_edge(0, 1).unwrap();
        let data = output.graph.data(edge);
        assert_eq!(data.weight, segment_weight * 3);

        let geometry = output.compressed.get(data.geometry);
        assert_eq!(geometry.len(), 3, "two interior points plus the target");
        assert_eq!(geometry[0].weight, segment_weight);
        assert_eq!(geometry[1].weight, segment_weight * 2);
        assert_eq!(geometry[2].weight, segment_weight * 3);
    }

    #[test]
    fn protected_nodes_survive_compression() {
        let prepared = prepared_line(4);
        let output = build(
            prepared.edges,
            prepared.coordinates,
            prepared.osm_node_ids,
            prepared.barriers,
            prepared.traffic_signals,
            &[1], // protect interior node with internal id 1 (osm id 2)
        );

        assert_eq!(output.graph.num_nodes(), 3);
        assert_eq!(output.node_id_map[1], 1);
        assert_eq!(output.node_id_map[2], INVALID_INTERNAL_NODE);
    }

    #[test]
    fn barrier_node_blocks_folding() {
        let mut prepared = prepared_line(3);
        prepared.barriers = vec![1];
        let output = build(
            prepared.edges,
            prepared.coordinates,
            prepared.osm_node_ids,
            prepared.barriers,
            prepared.traffic_signals,
            &[],
        );
        assert_eq!(output.graph.num_nodes(), 3);
        assert!(output.barriers.contains(&1));
    }

    #[test]
    fn junction_node_count_matches_coordinates() {
        let prepared = prepared_line(6);
        let output = build(
            prepared.edges,
            prepared.coordinates,
            prepared.osm_node_ids,
            prepared.barriers,
            prepared.traffic_signals,
            &[],
        );
        assert_eq!(output.graph.num_nodes(), output.coordinates.len());
        assert_eq!(output.osm_node_ids.len(), output.coordinates.len());
    }
}
