//! Edge-based graph construction.
//!
//! Every directed traversal of a node-based edge becomes an edge-based
//! node; every permitted turn between two of them becomes an edge-based
//! edge. Node restrictions filter turns locally at the via junction; way
//! restrictions are applied by duplicating the edge-based nodes along the
//! restricted via path so the restricted route and its alternatives have
//! distinct identities.

use bit_vec::BitVec;
use log::info;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::containers::EdgeAnnotation;
use crate::geo::{bearing, turn_angle, Coordinate};
use crate::ids::{
    AnnotationId, EdgeBasedNodeId, EdgeId, InternalNodeId, NodeId, INVALID_EDGE_BASED_NODE,
};
use crate::nbg::{CompressedEdgeContainer, NodeBasedGraph};
use crate::profile::{Profile, TurnContext};
use crate::restrictions::{NodeRestriction, RestrictionKind, WayRestriction};

#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedNodeData {
    pub geometry_id: u32,
    pub annotation: AnnotationId,
    pub is_segregated: bool,
    /// 1-based strongly connected component; filled by the SCC labeler.
    pub component_id: u32,
    pub is_tiny_component: bool,
}

/// One per node-based edge; the unit of spatial indexing.
#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedNodeSegment {
    pub forward_ebn: EdgeBasedNodeId,
    pub reverse_ebn: EdgeBasedNodeId,
    pub u: InternalNodeId,
    pub v: InternalNodeId,
    pub is_startpoint: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct EdgeBasedEdge {
    pub source: EdgeBasedNodeId,
    pub target: EdgeBasedNodeId,
    pub turn_id: u32,
    pub weight: u32,
    pub duration: u32,
    pub forward: bool,
    pub backward: bool,
}

/// Source node ids of a turn, for matching external penalty updates.
#[derive(Debug, Clone, Copy)]
pub struct TurnIndexEntry {
    pub from: NodeId,
    pub via: NodeId,
    pub to: NodeId,
}

/// Intersection classification: canonical bearing sets per junction and
/// permitted-exit masks per entry.
#[derive(Debug, Default)]
pub struct IntersectionData {
    pub bearing_class_offsets: Vec<u32>,
    pub bearing_class_values: Vec<u16>,
    pub node_bearing_class: Vec<u32>,
    pub entry_class_masks: Vec<u32>,
    pub ebn_entry_class: Vec<u32>,
}

pub struct EdgeBasedGraphOutput {
    pub node_data: Vec<EdgeBasedNodeData>,
    pub node_weights: Vec<u32>,
    pub annotations: Vec<EdgeAnnotation>,
    pub segments: Vec<EdgeBasedNodeSegment>,
    pub startpoints: BitVec,
    pub edges: Vec<EdgeBasedEdge>,
    pub turn_weight_penalties: Vec<i16>,
    pub turn_duration_penalties: Vec<i16>,
    pub turn_index: Vec<TurnIndexEntry>,
    pub intersection_data: IntersectionData,
}

impl EdgeBasedGraphOutput {
    pub fn num_nodes(&self) -> u32 {
        self.node_data.len() as u32
    }
}

pub struct EdgeBasedGraphInput<'a> {
    pub graph: &'a NodeBasedGraph,
    pub coordinates: &'a [Coordinate],
    pub osm_node_ids: &'a [NodeId],
    pub compressed: &'a CompressedEdgeContainer,
    pub annotations: Vec<EdgeAnnotation>,
    pub barriers: &'a FxHashSet<InternalNodeId>,
    pub traffic_signals: &'a FxHashSet<InternalNodeId>,
    pub segregated: &'a FxHashSet<EdgeId>,
    /// Unconditional node restrictions, applied during enumeration.
    pub node_restrictions: &'a [NodeRestriction],
    /// Unconditional way restrictions, applied via duplication.
    pub way_restrictions: &'a [WayRestriction],
    pub profile: &'a dyn Profile,
}

pub fn build(input: EdgeBasedGraphInput<'_>) -> EdgeBasedGraphOutput {
    let graph = input.graph;
    let compressed = input.compressed;

    // One edge-based node per traversable node-based edge, numbered in
    // adjacency order so the renumbering is deterministic.
    let mut edge_to_ebn: Vec<EdgeBasedNodeId> =
        vec![INVALID_EDGE_BASED_NODE; graph.num_edges()];
    let mut node_data = Vec::new();
    let mut node_weights = Vec::new();

    for source in 0..graph.num_nodes() as u32 {
        for edge in graph.edge_range(source) {
            let data = graph.data(edge);
            if data.reversed {
                continue;
            }
            edge_to_ebn[edge as usize] = node_data.len() as EdgeBasedNodeId;
            node_data.push(EdgeBasedNodeData {
                geometry_id: data.geometry,
                annotation: data.annotation,
                is_segregated: input.segregated.contains(&edge),
                component_id: 0,
                is_tiny_component: false,
            });
            node_weights.push(data.weight);
        }
    }

    // Segments: one per node-based edge, pairing the two traversal
    // directions for the spatial index and the component coupling.
    let mut segments = Vec::new();
    let mut startpoints = BitVec::new();
    for source in 0..graph.num_nodes() as u32 {
        for edge in graph.edge_range(source) {
            let data = graph.data(edge);
            let target = graph.target(edge);
            if data.reversed || source == target {
                continue;
            }
            let mirror = graph
                .find_edge(target, source)
                .expect("adjacency must be symmetric");
            let mirror_reversed = graph.data(mirror).reversed;
            if !mirror_reversed && source > target {
                continue; // counted from the other endpoint
            }
            segments.push(EdgeBasedNodeSegment {
                forward_ebn: edge_to_ebn[edge as usize],
                reverse_ebn: if mirror_reversed {
                    INVALID_EDGE_BASED_NODE
                } else {
                    edge_to_ebn[mirror as usize]
                },
                u: source,
                v: target,
                is_startpoint: data.is_startpoint,
            });
            startpoints.push(data.is_startpoint);
        }
    }

    // Node restriction lookup, anchored at (from node, via node).
    let mut forbidden: FxHashSet<(InternalNodeId, InternalNodeId, InternalNodeId)> =
        FxHashSet::default();
    let mut mandated: FxHashMap<(InternalNodeId, InternalNodeId), FxHashSet<InternalNodeId>> =
        FxHashMap::default();
    for restriction in input.node_restrictions {
        match restriction.kind {
            RestrictionKind::No => {
                forbidden.insert((restriction.from, restriction.via, restriction.to));
            }
            RestrictionKind::Only => {
                mandated
                    .entry((restriction.from, restriction.via))
                    .or_default()
                    .insert(restriction.to);
            }
        }
    }
    let node_restriction_allows =
        |u: InternalNodeId, v: InternalNodeId, w: InternalNodeId| -> bool {
            if forbidden.contains(&(u, v, w)) {
                return false;
            }
            match mandated.get(&(u, v)) {
                Some(allowed) => allowed.contains(&w),
                None => true,
            }
        };

    // The bearing an edge leaves its source junction with, following the
    // first geometry point where there is one.
    let exit_bearing = |source: InternalNodeId, edge: EdgeId| -> f64 {
        let data = graph.data(edge);
        let first = if data.reversed {
            input.coordinates[graph.target(edge) as usize]
        } else {
            compressed.get(data.geometry)[0].coord
        };
        bearing(input.coordinates[source as usize], first)
    };
    // The bearing an edge arrives at its target junction with.
    let entry_bearing = |source: InternalNodeId, edge: EdgeId| -> f64 {
        let data = graph.data(edge);
        let target = graph.target(edge);
        if data.reversed {
            return bearing(
                input.coordinates[source as usize],
                input.coordinates[target as usize],
            );
        }
        let geometry = compressed.get(data.geometry);
        let before = if geometry.len() >= 2 {
            geometry[geometry.len() - 2].coord
        } else {
            input.coordinates[source as usize]
        };
        bearing(before, input.coordinates[target as usize])
    };

    // Way restriction duplication setup: group restrictions by the turn
    // that enters their via path.
    let via_edges = |restriction: &WayRestriction| -> Option<Vec<EdgeId>> {
        restriction
            .via
            .windows(2)
            .map(|pair| {
                graph
                    .find_edge(pair[0], pair[1])
                    .filter(|&e| !graph.data(e).reversed)
            })
            .collect()
    };
    struct ViaPathGroup {
        via_nodes: Vec<InternalNodeId>,
        via_edges: Vec<EdgeId>,
        /// (kind, final target node) constraints at the path end.
        exits: Vec<(RestrictionKind, InternalNodeId)>,
    }
    let mut via_groups: Vec<ViaPathGroup> = Vec::new();
    let mut entry_redirect: FxHashMap<(EdgeId, EdgeId), usize> = FxHashMap::default();
    for restriction in input.way_restrictions {
        let Some(edges) = via_edges(restriction) else {
            continue; // filtered earlier; belt and braces
        };
        let Some(from_edge) = graph
            .find_edge(restriction.from, restriction.via[0])
            .filter(|&e| !graph.data(e).reversed)
        else {
            continue;
        };
        let key = (from_edge, edges[0]);
        match entry_redirect.get(&key) {
            Some(&group_index) if via_groups[group_index].via_edges == edges => {
                via_groups[group_index]
                    .exits
                    .push((restriction.kind, restriction.to));
            }
            Some(_) => {
                log::warn!("overlapping way restrictions share an entry turn; keeping the first");
            }
            None => {
                entry_redirect.insert(key, via_groups.len());
                via_groups.push(ViaPathGroup {
                    via_nodes: restriction.via.clone(),
                    via_edges: edges,
                    exits: vec![(restriction.kind, restriction.to)],
                });
            }
        }
    }

    // Allocate duplicate edge-based nodes for every via edge of every
    // group, shadowing the original node's data.
    let mut group_dups: Vec<Vec<EdgeBasedNodeId>> = Vec::with_capacity(via_groups.len());
    for group in &via_groups {
        let mut dups = Vec::with_capacity(group.via_edges.len());
        for &edge in &group.via_edges {
            let original = edge_to_ebn[edge as usize] as usize;
            let dup_id = node_data.len() as EdgeBasedNodeId;
            node_data.push(node_data[original]);
            node_weights.push(node_weights[original]);
            dups.push(dup_id);
        }
        group_dups.push(dups);
    }

    let mut edges_out: Vec<EdgeBasedEdge> = Vec::new();
    let mut turn_weight_penalties: Vec<i16> = Vec::new();
    let mut turn_duration_penalties: Vec<i16> = Vec::new();
    let mut turn_index: Vec<TurnIndexEntry> = Vec::new();

    // Intersection classification accumulators.
    let mut bearing_classes: FxHashMap<Vec<u16>, u32> = FxHashMap::default();
    let mut bearing_class_lists: Vec<Vec<u16>> = Vec::new();
    let mut node_bearing_class = vec![0u32; graph.num_nodes()];
    let mut entry_classes: FxHashMap<u32, u32> = FxHashMap::default();
    let mut entry_class_masks: Vec<u32> = Vec::new();
    let mut ebn_entry_class = vec![0u32; node_data.len()];

    for via in 0..graph.num_nodes() as u32 {
        let outgoing: Vec<EdgeId> = graph
            .edge_range(via)
            .filter(|&e| !graph.data(e).reversed)
            .collect();

        // Canonical bearing set for this junction; kept around because
        // entry-class bits below are keyed by rank within it.
        let mut bearings: Vec<u16> = graph
            .edge_range(via)
            .map(|e| discretize_bearing(exit_bearing(via, e)))
            .collect();
        bearings.sort_unstable();
        bearings.dedup();
        let class_id = match bearing_classes.get(&bearings) {
            Some(&id) => id,
            None => {
                let id = bearing_class_lists.len() as u32;
                bearing_classes.insert(bearings.clone(), id);
                bearing_class_lists.push(bearings.clone());
                id
            }
        };
        node_bearing_class[via as usize] = class_id;

        // Incoming traversable edges arrive as the mirrors of the local
        // adjacency entries.
        let incoming: Vec<(EdgeId, InternalNodeId)> = graph
            .edge_range(via)
            .filter_map(|e| {
                let neighbor = graph.target(e);
                if neighbor == via {
                    return None;
                }
                let mirror = graph.find_edge(neighbor, via)?;
                (!graph.data(mirror).reversed).then_some((mirror, neighbor))
            })
            .collect();

        let number_of_roads = graph.degree(via);

        for &(in_edge, from_node) in &incoming {
            let in_ebn = edge_to_ebn[in_edge as usize];
            let arrival = entry_bearing(from_node, in_edge);
            let mut exit_mask = 0u32;

            for &out_edge in &outgoing {
                let to_node = graph.target(out_edge);
                if to_node == from_node {
                    continue; // U-turn
                }
                if !node_restriction_allows(from_node, via, to_node) {
                    continue;
                }

                let exit = exit_bearing(via, out_edge);
                let penalty = input.profile.process_turn(&TurnContext {
                    angle: turn_angle(arrival, exit),
                    from_classes: input.annotations
                        [graph.data(in_edge).annotation as usize]
                        .classes,
                    to_classes: input.annotations
                        [graph.data(out_edge).annotation as usize]
                        .classes,
                    from_priority: graph.data(in_edge).priority,
                    to_priority: graph.data(out_edge).priority,
                    has_traffic_signal: input.traffic_signals.contains(&via),
                    through_barrier: input.barriers.contains(&via),
                    number_of_roads,
                });
                if !penalty.allowed {
                    continue;
                }

                // Entry-class bits are keyed by the exit's rank in the
                // junction's canonical bearing set, not by adjacency
                // order, so junctions with the same layout intern to the
                // same class no matter how their edges were inserted.
                if let Ok(rank) = bearings.binary_search(&discretize_bearing(exit)) {
                    if rank < 32 {
                        exit_mask |= 1 << rank;
                    }
                }

                // A turn opening a restricted via path targets the
                // duplicate chain instead of the original node.
                let target_ebn = match entry_redirect.get(&(in_edge, out_edge)) {
                    Some(&group_index) => group_dups[group_index][0],
                    None => edge_to_ebn[out_edge as usize],
                };

                push_turn(
                    &mut edges_out,
                    &mut turn_weight_penalties,
                    &mut turn_duration_penalties,
                    &mut turn_index,
                    graph.data(in_edge).weight,
                    graph.data(in_edge).duration,
                    penalty.weight,
                    penalty.duration,
                    in_ebn,
                    target_ebn,
                    TurnIndexEntry {
                        from: input.osm_node_ids[from_node as usize],
                        via: input.osm_node_ids[via as usize],
                        to: input.osm_node_ids[to_node as usize],
                    },
                );
            }

            let next_entry_class = entry_class_masks.len() as u32;
            let entry_class = *entry_classes.entry(exit_mask).or_insert_with(|| {
                entry_class_masks.push(exit_mask);
                next_entry_class
            });
            ebn_entry_class[in_ebn as usize] = entry_class;
        }
    }

    // Turns leaving the duplicate chains. Alternatives rejoin the base
    // graph; the final junction enforces the restriction itself.
    for (group, dups) in via_groups.iter().zip(&group_dups) {
        for (i, &via_edge) in group.via_edges.iter().enumerate() {
            let from_node = group.via_nodes[i];
            let via = group.via_nodes[i + 1];
            let arrival = entry_bearing(from_node, via_edge);
            let number_of_roads = graph.degree(via);
            let at_path_end = i + 1 == group.via_edges.len();

            let outgoing: Vec<EdgeId> = graph
                .edge_range(via)
                .filter(|&e| !graph.data(e).reversed)
                .collect();

            for &out_edge in &outgoing {
                let to_node = graph.target(out_edge);
                if to_node == from_node {
                    continue;
                }
                if !node_restriction_allows(from_node, via, to_node) {
                    continue;
                }
                if at_path_end && !exit_allowed(&group.exits, to_node) {
                    continue;
                }

                let penalty = input.profile.process_turn(&TurnContext {
                    angle: turn_angle(arrival, exit_bearing(via, out_edge)),
                    from_classes: input.annotations
                        [graph.data(via_edge).annotation as usize]
                        .classes,
                    to_classes: input.annotations
                        [graph.data(out_edge).annotation as usize]
                        .classes,
                    from_priority: graph.data(via_edge).priority,
                    to_priority: graph.data(out_edge).priority,
                    has_traffic_signal: input.traffic_signals.contains(&via),
                    through_barrier: input.barriers.contains(&via),
                    number_of_roads,
                });
                if !penalty.allowed {
                    continue;
                }

                let target_ebn = if !at_path_end && out_edge == group.via_edges[i + 1] {
                    dups[i + 1]
                } else {
                    edge_to_ebn[out_edge as usize]
                };

                push_turn(
                    &mut edges_out,
                    &mut turn_weight_penalties,
                    &mut turn_duration_penalties,
                    &mut turn_index,
                    graph.data(via_edge).weight,
                    graph.data(via_edge).duration,
                    penalty.weight,
                    penalty.duration,
                    dups[i],
                    target_ebn,
                    TurnIndexEntry {
                        from: input.osm_node_ids[from_node as usize],
                        via: input.osm_node_ids[via as usize],
                        to: input.osm_node_ids[to_node as usize],
                    },
                );
            }
        }
    }

    let mut bearing_class_offsets = Vec::with_capacity(bearing_class_lists.len() + 1);
    let mut bearing_class_values = Vec::new();
    bearing_class_offsets.push(0);
    for list in bearing_class_lists {
        bearing_class_values.extend(list);
        bearing_class_offsets.push(bearing_class_values.len() as u32);
    }

    info!(
        "edge-based graph: {} nodes ({} duplicated), {} edges",
        node_data.len(),
        group_dups.iter().map(Vec::len).sum::<usize>(),
        edges_out.len()
    );

    EdgeBasedGraphOutput {
        node_data,
        node_weights,
        annotations: input.annotations,
        segments,
        startpoints,
        edges: edges_out,
        turn_weight_penalties,
        turn_duration_penalties,
        turn_index,
        intersection_data: IntersectionData {
            bearing_class_offsets,
            bearing_class_values,
            node_bearing_class,
            entry_class_masks,
            ebn_entry_class,
        },
    }
}

/// Whole-degree bucket for intersection classification; the same
/// rounding feeds the bearing sets and the entry-class rank lookup.
fn discretize_bearing(bearing: f64) -> u16 {
    (bearing.round() as u16) % 360
}

fn exit_allowed(exits: &[(RestrictionKind, InternalNodeId)], to_node: InternalNodeId) -> bool {
    let mut has_only = false;
    let mut only_matches = false;
    for &(kind, node) in exits {
        match kind {
            RestrictionKind::No => {
                if node == to_node {
                    return false;
                }
            }
            RestrictionKind::Only => {
                has_only = true;
                only_matches |= node == to_node;
            }
        }
    }
    !has_only || only_matches
}

#[allow(clippy::too_many_arguments)]
fn push_turn(
    edges: &mut Vec<EdgeBasedEdge>,
    weight_penalties: &mut Vec<i16>,
    duration_penalties: &mut Vec<i16>,
    index: &mut Vec<TurnIndexEntry>,
    edge_weight: u32,
    edge_duration: u32,
    penalty_weight_s: f64,
    penalty_duration_s: f64,
    source: EdgeBasedNodeId,
    target: EdgeBasedNodeId,
    entry: TurnIndexEntry,
) {
    let weight_penalty = ((penalty_weight_s * 10.0).round() as i64)
        .clamp(i16::MIN as i64, i16::MAX as i64) as i16;
    let duration_penalty = ((penalty_duration_s * 10.0).round() as i64)
        .clamp(i16::MIN as i64, i16::MAX as i64) as i16;

    let turn_id = weight_penalties.len() as u32;
    weight_penalties.push(weight_penalty);
    duration_penalties.push(duration_penalty);
    index.push(entry);

    edges.push(EdgeBasedEdge {
        source,
        target,
        turn_id,
        weight: (edge_weight as i64 + weight_penalty as i64).max(1) as u32,
        duration: (edge_duration as i64 + duration_penalty as i64).max(1) as u32,
        forward: true,
        backward: false,
    });
}

/// Drop restrictions whose legs no longer exist as traversable edges in
/// the compressed graph.
pub fn remove_invalid_restrictions(
    node_restrictions: Vec<NodeRestriction>,
    way_restrictions: Vec<WayRestriction>,
    graph: &NodeBasedGraph,
) -> (Vec<NodeRestriction>, Vec<WayRestriction>) {
    let edge_ok = |from: InternalNodeId, to: InternalNodeId| -> bool {
        graph
            .find_edge(from, to)
            .map(|e| !graph.data(e).reversed)
            .unwrap_or(false)
    };

    let nodes: Vec<NodeRestriction> = node_restrictions
        .into_iter()
        .filter(|r| {
            let ok = edge_ok(r.from, r.via) && edge_ok(r.via, r.to);
            if !ok {
                log::warn!("node restriction references a missing edge, dropped");
            }
            ok
        })
        .collect();

    let ways: Vec<WayRestriction> = way_restrictions
        .into_iter()
        .filter(|r| {
            let chain_ok = edge_ok(r.from, r.via[0])
                && r.via.windows(2).all(|pair| edge_ok(pair[0], pair[1]))
                && edge_ok(*r.via.last().unwrap(), r.to);
            if !chain_ok {
                log::warn!("way restriction references a missing edge, dropped");
            }
            chain_ok
        })
        .collect();

    (nodes, ways)
}
