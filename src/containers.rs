//! Extraction containers: everything the parse pass accumulates, plus the
//! `prepare` step that turns raw entities into a dense, deduplicated edge
//! list ready for graph construction.

use log::warn;
use rustc_hash::FxHashMap;

use crate::error::{ExtractError, Result};
use crate::geo::{haversine_distance, Coordinate};
use crate::ids::{
    AnnotationId, ClassData, InternalNodeId, LaneDescriptionId, NameId, NodeId, WayId,
    INVALID_LANE_DESCRIPTION, MAX_CLASS_INDEX,
};
use crate::names::NameTable;
use crate::osm::{OsmNode, OsmWay};
use crate::profile::{ExtractionNode, ExtractionWay, RoadPriority, TravelMode};
use crate::restrictions::{InputTurnRestriction, NodeRestriction, RestrictionVia, WayRestriction};

/// A node after classification, keyed by its source id.
#[derive(Debug, Clone)]
pub struct RawNode {
    pub id: NodeId,
    pub coord: Coordinate,
    pub barrier: bool,
    pub traffic_signal: bool,
    pub classes: ClassData,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectionalData {
    pub mode: TravelMode,
    pub speed: f64,
    pub lane_description: LaneDescriptionId,
}

/// A way after classification, name interning and class mapping.
#[derive(Debug, Clone)]
pub struct RawWay {
    pub id: WayId,
    pub nodes: Vec<NodeId>,
    pub name_id: NameId,
    pub classes: ClassData,
    pub duration: f64,
    pub forward: DirectionalData,
    pub backward: DirectionalData,
    pub roundabout: bool,
    pub is_startpoint: bool,
    pub priority: RoadPriority,
}

/// Attribute tuple shared between edges; canonicalized by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeAnnotation {
    pub name_id: NameId,
    pub classes: ClassData,
    pub travel_mode: TravelMode,
    pub lane_description: LaneDescriptionId,
}

/// A directed edge over internal node ids. A `reversed` edge is the
/// non-traversable mirror of a oneway segment, kept so adjacency stays
/// symmetric for compression and turn enumeration.
#[derive(Debug, Clone, Copy)]
pub struct RawEdge {
    pub source: InternalNodeId,
    pub target: InternalNodeId,
    /// Deciseconds, at least 1.
    pub weight: u32,
    pub duration: u32,
    pub reversed: bool,
    pub annotation: AnnotationId,
    pub roundabout: bool,
    pub is_startpoint: bool,
    pub priority: RoadPriority,
}

/// Turn-lane strings interned to dense ids; persisted as offset + mask
/// arrays.
#[derive(Default)]
pub struct LaneDescriptionMap {
    dedup: FxHashMap<Vec<u16>, LaneDescriptionId>,
    descriptions: Vec<Vec<u16>>,
}

pub mod turn_lane {
    pub const NONE: u16 = 1 << 0;
    pub const STRAIGHT: u16 = 1 << 1;
    pub const SHARP_LEFT: u16 = 1 << 2;
    pub const LEFT: u16 = 1 << 3;
    pub const SLIGHT_LEFT: u16 = 1 << 4;
    pub const SLIGHT_RIGHT: u16 = 1 << 5;
    pub const RIGHT: u16 = 1 << 6;
    pub const SHARP_RIGHT: u16 = 1 << 7;
    pub const UTURN: u16 = 1 << 8;
    pub const MERGE_TO_LEFT: u16 = 1 << 9;
    pub const MERGE_TO_RIGHT: u16 = 1 << 10;
}

fn lane_mask(turn: &str) -> u16 {
    match turn.trim() {
        "none" | "" => turn_lane::NONE,
        "through" | "straight" => turn_lane::STRAIGHT,
        "sharp_left" => turn_lane::SHARP_LEFT,
        "left" => turn_lane::LEFT,
        "slight_left" => turn_lane::SLIGHT_LEFT,
        "slight_right" => turn_lane::SLIGHT_RIGHT,
        "right" => turn_lane::RIGHT,
        "sharp_right" => turn_lane::SHARP_RIGHT,
        "reverse" => turn_lane::UTURN,
        "merge_to_left" => turn_lane::MERGE_TO_LEFT,
        "merge_to_right" => turn_lane::MERGE_TO_RIGHT,
        _ => turn_lane::NONE,
    }
}

impl LaneDescriptionMap {
    pub fn intern(&mut self, description: &str) -> LaneDescriptionId {
        let masks: Vec<u16> = description
            .split('|')
            .map(|lane| lane.split(';').fold(0u16, |acc, t| acc | lane_mask(t)))
            .collect();

        if let Some(&id) = self.dedup.get(&masks) {
            return id;
        }
        let id = self.descriptions.len() as LaneDescriptionId;
        self.dedup.insert(masks.clone(), id);
        self.descriptions.push(masks);
        id
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }

    /// Flatten into a prefix-sum offset array plus the mask blob.
    pub fn into_arrays(self) -> (Vec<u32>, Vec<u16>) {
        let mut offsets = Vec::with_capacity(self.descriptions.len() + 1);
        let mut masks = Vec::new();
        offsets.push(0);
        for description in self.descriptions {
            masks.extend(description);
            offsets.push(masks.len() as u32);
        }
        (offsets, masks)
    }
}

/// Accumulated by the serial aggregator stage during pass B.
pub struct ExtractionContainers {
    pub nodes: Vec<RawNode>,
    pub ways: Vec<RawWay>,
    pub restrictions: Vec<InputTurnRestriction>,
    pub name_table: NameTable,
    pub classes_map: FxHashMap<String, ClassData>,
    pub lane_map: LaneDescriptionMap,
}

impl Default for ExtractionContainers {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionContainers {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            ways: Vec::new(),
            restrictions: Vec::new(),
            name_table: NameTable::new(),
            classes_map: FxHashMap::default(),
            lane_map: LaneDescriptionMap::default(),
        }
    }

    fn class_mask(&mut self, names: &[String]) -> Result<ClassData> {
        let mut mask = 0;
        for name in names {
            let next_index = self.classes_map.len();
            let data = *self.classes_map.entry(name.clone()).or_insert_with(|| {
                // Index overflow is validated right below; reserve the bit.
                1u8.checked_shl(next_index as u32).unwrap_or(0)
            });
            if data == 0 {
                return Err(ExtractError::Profile(format!(
                    "maximum number of classes is {}",
                    MAX_CLASS_INDEX + 1
                )));
            }
            mask |= data;
        }
        Ok(mask)
    }

    pub fn process_node(&mut self, node: &OsmNode, result: ExtractionNode) -> Result<()> {
        let classes = self.class_mask(&result.classes)?;
        self.nodes.push(RawNode {
            id: node.id,
            coord: node.coord,
            barrier: result.barrier,
            traffic_signal: result.traffic_signal,
            classes,
        });
        Ok(())
    }

    pub fn process_way(&mut self, way: &OsmWay, result: ExtractionWay) -> Result<()> {
        if way.nodes.len() < 2 {
            warn!("way {} has fewer than two nodes, dropped", way.id);
            return Ok(());
        }
        if !result.forward_enabled() && !result.backward_enabled() {
            return Ok(());
        }

        let name_id = self.name_table.insert(
            &result.name,
            &result.destinations,
            &result.pronunciation,
            &result.reference,
        );
        let classes = self.class_mask(&result.classes)?;
        let lane_forward = result
            .lanes_forward
            .as_deref()
            .map(|d| self.lane_map.intern(d))
            .unwrap_or(INVALID_LANE_DESCRIPTION);
        let lane_backward = result
            .lanes_backward
            .as_deref()
            .map(|d| self.lane_map.intern(d))
            .unwrap_or(INVALID_LANE_DESCRIPTION);

        self.ways.push(RawWay {
            id: way.id,
            nodes: way.nodes.clone(),
            name_id,
            classes,
            duration: result.duration,
            forward: DirectionalData {
                mode: if result.forward_enabled() {
                    result.forward_mode
                } else {
                    TravelMode::Inaccessible
                },
                speed: result.forward_speed,
                lane_description: lane_forward,
            },
            backward: DirectionalData {
                mode: if result.backward_enabled() {
                    result.backward_mode
                } else {
                    TravelMode::Inaccessible
                },
                speed: result.backward_speed,
                lane_description: lane_backward,
            },
            roundabout: result.roundabout,
            is_startpoint: result.is_startpoint,
            priority: result.road_priority,
        });
        Ok(())
    }

    pub fn process_restriction(&mut self, restriction: InputTurnRestriction) {
        self.restrictions.push(restriction);
    }

    /// Name interning has already happened per way; this performs the
    /// remaining aggregation: reference resolution, edge fan-out, dedup,
    /// and restriction linking.
    pub fn prepare(self) -> Result<PreparedData> {
        let ExtractionContainers {
            mut nodes,
            ways,
            restrictions,
            name_table,
            classes_map,
            lane_map,
        } = self;

        // Node table sorted by id; first occurrence wins on duplicates.
        nodes.sort_by_key(|n| n.id);
        nodes.dedup_by_key(|n| n.id);

        // Restrict the table to nodes actually referenced by kept ways.
        let mut used_ids: Vec<NodeId> = ways.iter().flat_map(|w| w.nodes.iter().copied()).collect();
        used_ids.sort_unstable();
        used_ids.dedup();
        nodes.retain(|n| used_ids.binary_search(&n.id).is_ok());

        let osm_node_ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        let resolve = |id: NodeId| -> Option<InternalNodeId> {
            osm_node_ids.binary_search(&id).ok().map(|i| i as u32)
        };

        let mut annotations: Vec<EdgeAnnotation> = Vec::new();
        let mut annotation_ids: FxHashMap<EdgeAnnotation, AnnotationId> = FxHashMap::default();
        let mut annotate = |annotation: EdgeAnnotation| -> AnnotationId {
            *annotation_ids.entry(annotation).or_insert_with(|| {
                annotations.push(annotation);
                (annotations.len() - 1) as AnnotationId
            })
        };

        let mut edges: Vec<RawEdge> = Vec::new();
        let mut way_lookup: FxHashMap<WayId, usize> = FxHashMap::default();
        let mut dropped_ways = 0usize;

        for (way_index, way) in ways.iter().enumerate() {
            let internal: Option<Vec<InternalNodeId>> =
                way.nodes.iter().map(|&id| resolve(id)).collect();
            let Some(internal) = internal else {
                warn!("way {} references unknown nodes, dropped", way.id);
                dropped_ways += 1;
                continue;
            };
            way_lookup.entry(way.id).or_insert(way_index);

            // Segment lengths first, so an explicit whole-way duration can
            // be distributed by length share.
            let mut lengths = Vec::with_capacity(internal.len() - 1);
            let mut total_length = 0.0;
            for pair in internal.windows(2) {
                let d = haversine_distance(nodes[pair[0] as usize].coord, nodes[pair[1] as usize].coord);
                lengths.push(d);
                total_length += d;
            }

            let fwd_annotation = annotate(EdgeAnnotation {
                name_id: way.name_id,
                classes: way.classes,
                travel_mode: way.forward.mode,
                lane_description: way.forward.lane_description,
            });
            let bwd_annotation = annotate(EdgeAnnotation {
                name_id: way.name_id,
                classes: way.classes,
                travel_mode: way.backward.mode,
                lane_description: way.backward.lane_description,
            });

            let segment_cost = |direction: &DirectionalData, distance: f64| -> (u32, u32) {
                let seconds = if way.duration > 0.0 && total_length > 0.0 {
                    way.duration * (distance / total_length)
                } else {
                    distance / (direction.speed / 3.6)
                };
                // Zero-cost segments break shortest-path invariants; pin
                // to the smallest representable weight.
                let ds = ((seconds * 10.0).round() as u32).max(1);
                (ds, ds)
            };

            for (i, pair) in internal.windows(2).enumerate() {
                let (a, b) = (pair[0], pair[1]);
                let distance = lengths[i];
                if distance <= 0.0 {
                    warn!("way {} contains a zero-length segment, segment dropped", way.id);
                    continue;
                }

                let fwd = way.forward.mode.is_accessible();
                let bwd = way.backward.mode.is_accessible();
                let (fwd_weight, fwd_duration) = segment_cost(&way.forward, distance);
                let (bwd_weight, bwd_duration) = segment_cost(&way.backward, distance);

                let template = RawEdge {
                    source: a,
                    target: b,
                    weight: fwd_weight,
                    duration: fwd_duration,
                    reversed: false,
                    annotation: fwd_annotation,
                    roundabout: way.roundabout,
                    is_startpoint: way.is_startpoint,
                    priority: way.priority,
                };

                match (fwd, bwd) {
                    (true, true) => {
                        edges.push(template);
                        edges.push(RawEdge {
                            source: b,
                            target: a,
                            weight: bwd_weight,
                            duration: bwd_duration,
                            annotation: bwd_annotation,
                            ..template
                        });
                    }
                    (true, false) => {
                        edges.push(template);
                        edges.push(RawEdge {
                            source: b,
                            target: a,
                            reversed: true,
                            ..template
                        });
                    }
                    (false, true) => {
                        edges.push(RawEdge {
                            source: b,
                            target: a,
                            weight: bwd_weight,
                            duration: bwd_duration,
                            annotation: bwd_annotation,
                            ..template
                        });
                        edges.push(RawEdge {
                            source: a,
                            target: b,
                            weight: bwd_weight,
                            duration: bwd_duration,
                            reversed: true,
                            annotation: bwd_annotation,
                            ..template
                        });
                    }
                    (false, false) => {}
                }
            }
        }

        if dropped_ways > 0 {
            warn!("{dropped_ways} ways dropped for unresolved node references");
        }

        // Sort by (source, target); merge duplicates keeping the minimum
        // weight, preferring traversable entries over reversed mirrors.
        edges.sort_by(|a, b| {
            (a.source, a.target, a.reversed, a.weight).cmp(&(
                b.source,
                b.target,
                b.reversed,
                b.weight,
            ))
        });
        edges.dedup_by(|next, kept| kept.source == next.source && kept.target == next.target);

        if edges.is_empty() {
            return Err(ExtractError::Profile(
                "there are no edges remaining after parsing".to_string(),
            ));
        }

        let (node_restrictions, way_restrictions) =
            link_restrictions(restrictions, &ways, &way_lookup, &resolve);

        let barriers: Vec<InternalNodeId> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.barrier)
            .map(|(i, _)| i as u32)
            .collect();
        let traffic_signals: Vec<InternalNodeId> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.traffic_signal)
            .map(|(i, _)| i as u32)
            .collect();

        let coordinates: Vec<Coordinate> = nodes.iter().map(|n| n.coord).collect();
        let (turn_lane_offsets, turn_lane_masks) = lane_map.into_arrays();

        Ok(PreparedData {
            osm_node_ids,
            coordinates,
            barriers,
            traffic_signals,
            edges,
            annotations,
            name_table,
            classes_map,
            node_restrictions,
            way_restrictions,
            turn_lane_offsets,
            turn_lane_masks,
        })
    }
}

/// Output of the aggregation step; consumed by the node-based graph
/// builder, which takes ownership of everything in it.
pub struct PreparedData {
    pub osm_node_ids: Vec<NodeId>,
    pub coordinates: Vec<Coordinate>,
    pub barriers: Vec<InternalNodeId>,
    pub traffic_signals: Vec<InternalNodeId>,
    pub edges: Vec<RawEdge>,
    pub annotations: Vec<EdgeAnnotation>,
    pub name_table: NameTable,
    pub classes_map: FxHashMap<String, ClassData>,
    pub node_restrictions: Vec<NodeRestriction>,
    pub way_restrictions: Vec<WayRestriction>,
    pub turn_lane_offsets: Vec<u32>,
    pub turn_lane_masks: Vec<u16>,
}

/// The node on `way` from which traffic approaches `via` (the from leg),
/// or to which it continues past `via` (the to leg).
fn adjacent_node(way_nodes: &[NodeId], via: NodeId, approaching: bool) -> Option<NodeId> {
    let position = way_nodes.iter().position(|&n| n == via)?;
    let candidate = if position == 0 {
        1
    } else if position == way_nodes.len() - 1 {
        way_nodes.len() - 2
    } else if approaching {
        position - 1
    } else {
        position + 1
    };
    way_nodes.get(candidate).copied()
}

/// The endpoint of `way` that also occurs on `other`; how two consecutive
/// restriction legs join.
fn shared_endpoint(way_nodes: &[NodeId], other: &[NodeId]) -> Option<NodeId> {
    let first = *way_nodes.first()?;
    let last = *way_nodes.last()?;
    if other.contains(&first) {
        Some(first)
    } else if other.contains(&last) {
        Some(last)
    } else {
        None
    }
}

fn link_restrictions(
    restrictions: Vec<InputTurnRestriction>,
    ways: &[RawWay],
    way_lookup: &FxHashMap<WayId, usize>,
    resolve: &dyn Fn(NodeId) -> Option<InternalNodeId>,
) -> (Vec<NodeRestriction>, Vec<WayRestriction>) {
    let mut node_restrictions = Vec::new();
    let mut way_restrictions = Vec::new();

    'outer: for restriction in restrictions {
        let Some(&from_index) = way_lookup.get(&restriction.from_way) else {
            warn!(
                "restriction references missing from-way {}, dropped",
                restriction.from_way
            );
            continue;
        };
        let Some(&to_index) = way_lookup.get(&restriction.to_way) else {
            warn!(
                "restriction references missing to-way {}, dropped",
                restriction.to_way
            );
            continue;
        };
        let from_way = &ways[from_index];
        let to_way = &ways[to_index];

        match &restriction.via {
            RestrictionVia::Node(via) => {
                let linked = (|| {
                    let from = adjacent_node(&from_way.nodes, *via, true)?;
                    let to = adjacent_node(&to_way.nodes, *via, false)?;
                    Some(NodeRestriction {
                        from: resolve(from)?,
                        via: resolve(*via)?,
                        to: resolve(to)?,
                        kind: restriction.kind,
                        condition: restriction.condition.clone(),
                    })
                })();
                match linked {
                    Some(r) => node_restrictions.push(r),
                    None => warn!(
                        "restriction via node {} could not be resolved, dropped",
                        via
                    ),
                }
            }
            RestrictionVia::Ways(via_way_ids) => {
                // Walk the via chain, collecting the junction sequence.
                let mut via_nodes: Vec<NodeId> = Vec::with_capacity(via_way_ids.len() + 1);
                let mut previous: &[NodeId] = &from_way.nodes;

                for via_way_id in via_way_ids {
                    let Some(&via_index) = way_lookup.get(via_way_id) else {
                        warn!("restriction references missing via-way {via_way_id}, dropped");
                        continue 'outer;
                    };
                    let via_way = &ways[via_index];
                    let Some(entry) = shared_endpoint(&via_way.nodes, previous) else {
                        warn!("restriction via-way {via_way_id} does not join its predecessor, dropped");
                        continue 'outer;
                    };
                    let exit = if entry == *via_way.nodes.first().unwrap() {
                        *via_way.nodes.last().unwrap()
                    } else {
                        *via_way.nodes.first().unwrap()
                    };
                    via_nodes.push(entry);
                    if via_way_id == via_way_ids.last().unwrap() {
                        via_nodes.push(exit);
                    }
                    previous = &ways[via_index].nodes;
                }

                let linked = (|| {
                    let from = adjacent_node(&from_way.nodes, *via_nodes.first()?, true)?;
                    let to = adjacent_node(&to_way.nodes, *via_nodes.last()?, false)?;
                    Some(WayRestriction {
                        from: resolve(from)?,
                        via: via_nodes
                            .iter()
                            .map(|&n| resolve(n))
                            .collect::<Option<Vec<_>>>()?,
                        to: resolve(to)?,
                        kind: restriction.kind,
                        condition: restriction.condition.clone(),
                    })
                })();
                match linked {
                    Some(r) => way_restrictions.push(r),
                    None => warn!("restriction via ways could not be resolved, dropped"),
                }
            }
        }
    }

    (node_restrictions, way_restrictions)
}

/// Protected nodes a restriction needs to survive chain compression.
pub fn restriction_nodes(
    node_restrictions: &[NodeRestriction],
    way_restrictions: &[WayRestriction],
) -> Vec<InternalNodeId> {
    let mut nodes = Vec::new();
    for r in node_restrictions {
        nodes.extend([r.from, r.via, r.to]);
    }
    for r in way_restrictions {
        nodes.push(r.from);
        nodes.extend(r.via.iter().copied());
        nodes.push(r.to);
    }
    nodes.sort_unstable();
    nodes.dedup();
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osm::TagMap;
    use crate::profile::ExtractionWay;
    use crate::restrictions::RestrictionKind;

    fn node(id: NodeId, lon: f64, lat: f64) -> (OsmNode, ExtractionNode) {
        (
            OsmNode {
                id,
                coord: Coordinate::from_degrees(lon, lat),
                tags: TagMap::new(),
            },
            ExtractionNode::default(),
        )
    }

    fn bidirectional_way() -> ExtractionWay {
        ExtractionWay {
            forward_speed: 36.0,
            backward_speed: 36.0,
            forward_mode: TravelMode::Driving,
            backward_mode: TravelMode::Driving,
            ..ExtractionWay::default()
        }
    }

    fn fill(containers: &mut ExtractionContainers, nodes: &[(NodeId, f64, f64)], ways: &[(WayId, &[NodeId], ExtractionWay)]) {
        for &(id, lon, lat) in nodes {
            let (n, e) = node(id, lon, lat);
            containers.process_node(&n, e).unwrap();
        }
        for (id, node_ids, extraction) in ways {
            let way = OsmWay {
                id: *id,
                nodes: node_ids.to_vec(),
                tags: TagMap::new(),
                node_locations: Vec::new(),
            };
            containers.process_way(&way, extraction.clone()).unwrap();
        }
    }

    #[test]
    fn two_node_way_produces_symmetric_edges() {
        let mut containers = ExtractionContainers::new();
        fill(
            &mut containers,
            &[(1, 0.0, 0.0), (2, 0.0, 0.001)],
            &[(10, &[1, 2], bidirectional_way())],
        );

        let prepared = containers.prepare().unwrap();
        assert_eq!(prepared.coordinates.len(), 2);
        assert_eq!(prepared.edges.len(), 2);
        assert!(prepared.edges.iter().all(|e| !e.reversed));
        // 111 m at 36 km/h is about 11 s.
        let weight = prepared.edges[0].weight;
        assert!((105..=120).contains(&weight), "weight {weight}");
    }

    #[test]
    fn oneway_emits_reversed_mirror() {
        let mut containers = ExtractionContainers::new();
        let mut way = bidirectional_way();
        way.backward_mode = TravelMode::Inaccessible;
        fill(
            &mut containers,
            &[(1, 0.0, 0.0), (2, 0.0, 0.001)],
            &[(10, &[1, 2], way)],
        );

        let prepared = containers.prepare().unwrap();
        assert_eq!(prepared.edges.len(), 2);
        let forward = prepared.edges.iter().find(|e| !e.reversed).unwrap();
        let mirror = prepared.edges.iter().find(|e| e.reversed).unwrap();
        assert_eq!((forward.source, forward.target), (0, 1));
        assert_eq!((mirror.source, mirror.target), (1, 0));
    }

    #[test]
    fn ways_with_unknown_nodes_are_dropped() {
        let mut containers = ExtractionContainers::new();
        fill(
            &mut containers,
            &[(1, 0.0, 0.0), (2, 0.0, 0.001)],
            &[
                (10, &[1, 2], bidirectional_way()),
                (11, &[2, 99], bidirectional_way()),
            ],
        );

        let prepared = containers.prepare().unwrap();
        // Only the resolvable way contributes edges.
        assert_eq!(prepared.edges.len(), 2);
    }

    #[test]
    fn no_edges_is_a_profile_error() {
        let containers = ExtractionContainers::new();
        assert!(matches!(
            containers.prepare(),
            Err(ExtractError::Profile(_))
        ));
    }

    #[test]
    fn duplicate_edges_keep_minimum_weight() {
        let mut containers = ExtractionContainers::new();
        let slow = ExtractionWay {
            forward_speed: 18.0,
            backward_speed: 18.0,
            ..bidirectional_way()
        };
        fill(
            &mut containers,
            &[(1, 0.0, 0.0), (2, 0.0, 0.001)],
            &[
                (10, &[1, 2], bidirectional_way()),
                (11, &[1, 2], slow),
            ],
        );

        let prepared = containers.prepare().unwrap();
        assert_eq!(prepared.edges.len(), 2);
        // The fast way's weight must win the merge.
        assert!(prepared.edges[0].weight <= 120);
    }

    #[test]
    fn node_restriction_links_to_internal_ids() {
        let mut containers = ExtractionContainers::new();
        fill(
            &mut containers,
            &[
                (1, 0.0, 0.0),
                (2, 0.001, 0.0),
                (3, 0.002, 0.0),
                (4, 0.001, 0.001),
            ],
            &[
                (10, &[1, 2, 3], bidirectional_way()),
                (20, &[2, 4], bidirectional_way()),
            ],
        );
        containers.process_restriction(InputTurnRestriction {
            from_way: 10,
            via: RestrictionVia::Node(2),
            to_way: 20,
            kind: RestrictionKind::No,
            condition: None,
        });

        let prepared = containers.prepare().unwrap();
        assert_eq!(prepared.node_restrictions.len(), 1);
        let r = &prepared.node_restrictions[0];
        // osm ids 1..4 map to internal 0..3
        assert_eq!((r.from, r.via, r.to), (0, 1, 3));
    }

    #[test]
    fn via_way_restriction_walks_the_chain() {
        let mut containers = ExtractionContainers::new();
        fill(
            &mut containers,
            &[
                (1, 0.0, 0.0),
                (2, 0.001, 0.0),
                (3, 0.002, 0.0),
                (4, 0.003, 0.0),
            ],
            &[
                (10, &[1, 2], bidirectional_way()),
                (15, &[2, 3], bidirectional_way()),
                (20, &[3, 4], bidirectional_way()),
            ],
        );
        containers.process_restriction(InputTurnRestriction {
            from_way: 10,
            via: RestrictionVia::Ways(vec![15]),
            to_way: 20,
            kind: RestrictionKind::No,
            condition: None,
        });

        let prepared = containers.prepare().unwrap();
        assert_eq!(prepared.way_restrictions.len(), 1);
        let r = &prepared.way_restrictions[0];
        assert_eq!(r.from, 0);
        assert_eq!(r.via, vec![1, 2]);
        assert_eq!(r.to, 3);
    }

    #[test]
    fn lane_descriptions_dedup() {
        let mut map = LaneDescriptionMap::default();
        let a = map.intern("left|through|right");
        let b = map.intern("left|through|right");
        let c = map.intern("through|through;right");
        assert_eq!(a, b);
        assert_ne!(a, c);

        let (offsets, masks) = map.into_arrays();
        assert_eq!(offsets, vec![0, 3, 5]);
        assert_eq!(masks[0], turn_lane::LEFT);
        assert_eq!(masks[4], turn_lane::STRAIGHT | turn_lane::RIGHT);
    }
}
