//! Dual-carriageway detection on the node-based graph.
//!
//! A short edge joining the two halves of a divided road is marked
//! segregated so downstream guidance can suppress the spurious turn
//! instructions crossing the median would otherwise generate.

use log::info;
use rustc_hash::FxHashSet;

use crate::containers::EdgeAnnotation;
use crate::geo::{haversine_distance, Coordinate};
use crate::ids::{ClassData, EdgeId, InternalNodeId};
use crate::names::NameTable;
use crate::nbg::{CompressedEdgeContainer, NodeBasedGraph};
use crate::profile::RoadPriority;

#[derive(Clone)]
struct EdgeInfo<'a> {
    node: InternalNodeId,
    name: &'a str,
    /// 0 outgoing, 1 incoming, 2 both.
    direction: u8,
    classes: ClassData,
    priority: RoadPriority,
}

pub fn find_segregated_edges(
    graph: &NodeBasedGraph,
    annotations: &[EdgeAnnotation],
    names: &NameTable,
    compressed: &CompressedEdgeContainer,
    coordinates: &[Coordinate],
) -> FxHashSet<EdgeId> {
    let edge_info = |edge: EdgeId| {
        let data = graph.data(edge);
        EdgeInfo {
            node: graph.target(edge),
            name: names.name(annotations[data.annotation as usize].name_id),
            direction: if data.reversed { 1 } else { 0 },
            classes: annotations[data.annotation as usize].classes,
            priority: data.priority,
        }
    };

    // Neighborhood of `node`, excluding the edge toward `exclude`;
    // opposite-direction pairs to the same neighbor fold into one entry.
    let collect_neighborhood = |node: InternalNodeId, exclude: InternalNodeId| {
        let mut info: Vec<EdgeInfo> = graph
            .edge_range(node)
            .filter(|&e| graph.target(e) != exclude)
            .map(edge_info)
            .collect();

        info.sort_by_key(|e| e.node);
        let mut deduped: Vec<EdgeInfo> = Vec::with_capacity(info.len());
        for entry in info {
            match deduped.last_mut() {
                Some(last) if last.node == entry.node => {
                    if last.direction != entry.direction {
                        last.direction = 2;
                    }
                }
                _ => deduped.push(entry),
            }
        }
        deduped
    };

    let edge_length = |source: InternalNodeId, edge: EdgeId| -> f64 {
        let geometry = compressed.get(graph.data(edge).geometry);
        let mut length = 0.0;
        let mut previous = coordinates[source as usize];
        for entry in geometry {
            length += haversine_distance(previous, entry.coord);
            previous = entry.coord;
        }
        length
    };

    let mut segregated = FxHashSet::default();

    for source in 0..graph.num_nodes() as u32 {
        for edge in graph.edge_range(source) {
            let data = graph.data(edge);
            if data.reversed {
                continue;
            }
            let target = graph.target(edge);
            if target == source {
                continue;
            }

            let source_side = collect_neighborhood(source, target);
            let target_side = collect_neighborhood(target, source);

            if is_segregated(
                source_side,
                target_side,
                &edge_info(edge),
                edge_length(source, edge),
            ) {
                segregated.insert(edge);
            }
        }
    }

    info!("segregated edges count = {}", segregated.len());
    segregated
}

fn is_segregated(
    mut v1: Vec<EdgeInfo>,
    mut v2: Vec<EdgeInfo>,
    current: &EdgeInfo,
    edge_length: f64,
) -> bool {
    if v1.len() < 2 || v2.len() < 2 {
        return false;
    }

    v1.sort_by(|a, b| a.name.cmp(b.name));
    v2.sort_by(|a, b| a.name.cmp(b.name));

    // A named crossover must connect to a continuation of the same road on
    // at least one side, otherwise it is a spur, not a median link.
    if !current.name.is_empty() {
        let has_name = |v: &[EdgeInfo]| v.binary_search_by(|e| e.name.cmp(current.name)).is_ok();
        if !has_name(&v1) && !has_name(&v2) {
            return false;
        }
    }

    // set_intersection-style walk collecting pairs with equal non-empty
    // names on both sides.
    let mut commons: Vec<(&EdgeInfo, &EdgeInfo)> = Vec::new();
    let mut i1 = v1.iter().peekable();
    let mut i2 = v2.iter().peekable();
    while let (Some(e1), Some(e2)) = (i1.peek(), i2.peek()) {
        match e1.name.cmp(e2.name) {
            std::cmp::Ordering::Equal => {
                if !e1.name.is_empty() {
                    commons.push((*e1, *e2));
                }
                i1.next();
                i2.next();
            }
            std::cmp::Ordering::Less => {
                i1.next();
            }
            std::cmp::Ordering::Greater => {
                i2.next();
            }
        }
    }

    if commons.len() < 2 {
        return false;
    }

    let equal_class_count = commons
        .iter()
        .filter(|(a, b)| a.classes == b.classes)
        .count();
    if equal_class_count < 2 {
        return false;
    }

    let threshold = commons
        .iter()
        .map(|(a, b)| a.priority.segregated_threshold_m() + b.priority.segregated_threshold_m())
        .fold(f64::MAX, f64::min);

    edge_length <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::containers::ExtractionContainers;
    use crate::nbg;
    use crate::osm::{OsmNode, OsmWay, TagMap};
    use crate::profile::{ExtractionNode, ExtractionWay, TravelMode};

    struct Fixture {
        output: nbg::NodeBasedGraphOutput,
        annotations: Vec<EdgeAnnotation>,
        names: NameTable,
    }

    /// Two parallel oneway carriageways named "Main St", connected by two
    /// mid-block crossover links:
    ///
    ///   1 --> 2 --> 3 --> 4      (north carriageway, oneway east)
    ///         |     |
    ///   8 <-- 7 <-- 6 <-- 5      (south carriageway, oneway west)
    ///
    /// `separation` is the latitude gap between the carriageways in
    /// degrees; 0.00007 is about 8 m.
    fn dual_carriageway(separation: f64) -> Fixture {
        let mut containers = ExtractionContainers::new();
        let coords = [
            (1, 0.0000, separation),
            (2, 0.0007, separation),
            (3, 0.0014, separation),
            (4, 0.0021, separation),
            (5, 0.0021, 0.0),
            (6, 0.0014, 0.0),
            (7, 0.0007, 0.0),
            (8, 0.0000, 0.0),
        ];
        for (id, lon, lat) in coords {
            containers
                .process_node(
                    &OsmNode {
                        id,
                        coord: Coordinate::from_degrees(lon, lat),
                        tags: TagMap::new(),
                    },
                    ExtractionNode::default(),
                )
                .unwrap();
        }

        let oneway = ExtractionWay {
            forward_speed: 50.0,
            forward_mode: TravelMode::Driving,
            backward_mode: TravelMode::Inaccessible,
            name: "Main St".to_string(),
            road_priority: crate::profile::RoadPriority::Primary,
            ..ExtractionWay::default()
        };
        let link = ExtractionWay {
            forward_speed: 30.0,
            backward_speed: 30.0,
            forward_mode: TravelMode::Driving,
            backward_mode: TravelMode::Driving,
            name: "Main St".to_string(),
            ..ExtractionWay::default()
        };

        let ways: Vec<(i64, Vec<i64>, ExtractionWay)> = vec![
            (10, vec![1, 2, 3, 4], oneway.clone()),
            (11, vec![5, 6, 7, 8], oneway),
            (12, vec![2, 7], link.clone()),
            (13, vec![3, 6], link),
        ];
        for (id, nodes, way) in ways {
            containers
                .process_way(
                    &OsmWay {
                        id,
                        nodes,
                        tags: TagMap::new(),
                        node_locations: Vec::new(),
                    },
                    way,
                )
                .unwrap();
        }

        let prepared = containers.prepare().unwrap();
        let annotations = prepared.annotations.clone();
        let names = prepared.name_table;
        let output = nbg::build(
            prepared.edges,
            prepared.coordinates,
            prepared.osm_node_ids,
            prepared.barriers,
            prepared.traffic_signals,
            &[],
        );
        Fixture {
            output,
            annotations,
            names,
        }
    }

    fn crossover_edges(fixture: &Fixture) -> FxHashSet<EdgeId> {
        find_segregated_edges(
            &fixture.output.graph,
            &fixture.annotations,
            &fixture.names,
            &fixture.output.compressed,
            &fixture.output.coordinates,
        )
    }

    #[test]
    fn crossovers_between_carriageways_are_segregated() {
        let fixture = dual_carriageway(0.00007);
        let segregated = crossover_edges(&fixture);

        // Both crossovers, both directions each.
        assert_eq!(
            segregated.len(),
            4,
            "expected both crossover directions marked"
        );
        for &edge in &segregated {
            let data = fixture.output.graph.data(edge);
            assert!(!data.reversed);
            // Crossovers are the only short Other-priority edges here.
            assert_eq!(data.priority, crate::profile::RoadPriority::Other);
        }
    }

    #[test]
    fn long_links_are_not_segregated() {
        // ~110 m between carriageways exceeds every class threshold.
        let fixture = dual_carriageway(0.001);
        assert!(crossover_edges(&fixture).is_empty());
    }
}
