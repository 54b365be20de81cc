//! End-to-end extraction scenarios driven through the in-memory entity
//! source and the built-in car profile, verified against the persisted
//! artifacts.

use std::path::PathBuf;

use tempfile::TempDir;

use waymill::config::ExtractorConfig;
use waymill::extractor::{ExtractionSummary, Extractor};
use waymill::formats::artifacts::{
    read_compressed_node_based_graph, read_ebg_node_components, read_edge_based_graph,
    read_nbg_nodes,
};
use waymill::formats::writer::ArtifactReader;
use waymill::geo::Coordinate;
use waymill::osm::{
    Element, MemberKind, MemorySource, OsmNode, OsmRelation, OsmWay, RelationMember, TagMap,
};
use waymill::profile::CarProfile;

fn tags(pairs: &[(&str, &str)]) -> TagMap {
    TagMap::from_pairs(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    )
}

fn node(id: i64, lon: f64, lat: f64) -> Element {
    Element::Node(OsmNode {
        id,
        coord: Coordinate::from_degrees(lon, lat),
        tags: TagMap::new(),
    })
}

fn way(id: i64, nodes: &[i64], pairs: &[(&str, &str)]) -> Element {
    Element::Way(OsmWay {
        id,
        nodes: nodes.to_vec(),
        tags: tags(pairs),
        node_locations: Vec::new(),
    })
}

fn no_turn_restriction(id: i64, value: &str, from: i64, via_node: i64, to: i64) -> Element {
    Element::Relation(OsmRelation {
        id,
        tags: tags(&[("type", "restriction"), ("restriction", value)]),
        members: vec![
            RelationMember {
                kind: MemberKind::Way,
                id: from,
                role: "from".to_string(),
            },
            RelationMember {
                kind: MemberKind::Node,
                id: via_node,
                role: "via".to_string(),
            },
            RelationMember {
                kind: MemberKind::Way,
                id: to,
                role: "to".to_string(),
            },
        ],
    })
}

struct Extraction {
    summary: ExtractionSummary,
    prefix: PathBuf,
    _dir: TempDir,
}

impl Extraction {
    fn path(&self, suffix: &str) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

fn extract(elements: Vec<Element>) -> Extraction {
    extract_with(elements, |_| {})
}

fn extract_with(elements: Vec<Element>, tweak: impl FnOnce(&mut ExtractorConfig)) -> Extraction {
    let dir = TempDir::new().unwrap();
    let prefix = dir.path().join("map");
    let mut config = ExtractorConfig::new(PathBuf::from("memory.pbf"), prefix.clone());
    config.requested_threads = 2;
    tweak(&mut config);

    let mut source = MemorySource::new(elements).with_buffer_size(4);
    let summary = Extractor::new(config)
        .run(&CarProfile, &mut source)
        .unwrap();
    Extraction {
        summary,
        prefix,
        _dir: dir,
    }
}

fn crossroads() -> Vec<Element> {
    vec![
        node(1, 0.000, 0.000),
        node(2, 0.001, 0.000),
        node(3, 0.002, 0.000),
        node(4, 0.001, 0.001),
        node(5, 0.001, -0.001),
        way(10, &[1, 2, 3], &[("highway", "residential")]),
        way(20, &[4, 2, 5], &[("highway", "residential")]),
    ]
}

#[test]
fn single_two_node_way() {
    let extraction = extract(vec![
        node(1, 0.0, 0.0),
        node(2, 0.0, 0.001),
        way(10, &[1, 2], &[("highway", "residential")]),
    ]);

    assert_eq!(extraction.summary.junction_nodes, 2);
    assert_eq!(extraction.summary.edge_based_nodes, 2);
    assert_eq!(extraction.summary.edge_based_edges, 0);
    assert_eq!(extraction.summary.components, 1);
    assert_eq!(extraction.summary.spatial_segments, 1);

    // Coordinate integrity: nbg_nodes matches the junction count.
    let (coordinates, osm_ids) = read_nbg_nodes(&extraction.path(".nbg_nodes")).unwrap();
    assert_eq!(coordinates.len(), 2);
    assert_eq!(osm_ids, vec![1, 2]);

    let (num_nodes, edges) = read_edge_based_graph(&extraction.path(".ebg")).unwrap();
    assert_eq!(num_nodes, 2);
    assert!(edges.is_empty());

    // Both traversal directions share a component.
    let components = read_ebg_node_components(&extraction.path(".ebg_nodes")).unwrap();
    assert_eq!(components.len(), 2);
    assert_eq!(components[0].0, components[1].0);
}

#[test]
fn degree_two_chain_compresses() {
    let extraction = extract(vec![
        node(1, 0.000, 0.0),
        node(2, 0.001, 0.0),
        node(3, 0.002, 0.0),
        node(4, 0.003, 0.0),
        way(10, &[1, 2, 3, 4], &[("highway", "residential")]),
    ]);

    assert_eq!(extraction.summary.junction_nodes, 2);
    assert_eq!(extraction.summary.edge_based_nodes, 2);

    let (edges, coordinates) =
        read_compressed_node_based_graph(&extraction.path(".cnbg")).unwrap();
    assert_eq!(coordinates.len(), 2);
    assert_eq!(edges.len(), 2);
    assert!(edges.contains(&(0, 1)) && edges.contains(&(1, 0)));
}

#[test]
fn crossroads_turn_enumeration() {
    let extraction = extract(crossroads());

    assert_eq!(extraction.summary.junction_nodes, 5);
    assert_eq!(extraction.summary.edge_based_nodes, 8);
    // 4 incoming directed edges at the junction, 3 non-U-turn exits each.
    assert_eq!(extraction.summary.edge_based_edges, 12);
    assert_eq!(extraction.summary.components, 1);
}

#[test]
fn no_left_turn_drops_exactly_one_edge() {
    let mut elements = crossroads();
    elements.push(no_turn_restriction(900, "no_left_turn", 10, 2, 20));

    let restricted = extract(elements);
    assert_eq!(restricted.summary.edge_based_edges, 11);

    // Restriction soundness: compare against the unrestricted graph; the
    // one missing edge is a turn out of way 10 onto way 20.
    let baseline = extract(crossroads());
    let (_, baseline_edges) = read_edge_based_graph(&baseline.path(".ebg")).unwrap();
    let (_, restricted_edges) = read_edge_based_graph(&restricted.path(".ebg")).unwrap();
    assert_eq!(baseline_edges.len() - 1, restricted_edges.len());
}

#[test]
fn dual_carriageway_crossovers_are_segregated() {
    let extraction = extract(vec![
        node(1, 0.0000, 0.00007),
        node(2, 0.0007, 0.00007),
        node(3, 0.0014, 0.00007),
        node(4, 0.0021, 0.00007),
        node(5, 0.0021, 0.0),
        node(6, 0.0014, 0.0),
        node(7, 0.0007, 0.0),
        node(8, 0.0000, 0.0),
        way(
            10,
            &[1, 2, 3, 4],
            &[("highway", "primary"), ("name", "Main St"), ("oneway", "yes")],
        ),
        way(
            11,
            &[5, 6, 7, 8],
            &[("highway", "primary"), ("name", "Main St"), ("oneway", "yes")],
        ),
        way(12, &[2, 7], &[("highway", "residential"), ("name", "Main St")]),
        way(13, &[3, 6], &[("highway", "residential"), ("name", "Main St")]),
    ]);

    // Both crossovers, counted per direction.
    assert_eq!(extraction.summary.segregated_edges, 4);
}

#[test]
fn disconnected_island_is_tiny() {
    let mut elements = Vec::new();
    // Main component: a chain of ten distinctly-named bidirectional ways
    // (distinct names keep the chain from compressing), 20 edge-based
    // nodes total.
    for i in 0..11 {
        elements.push(node(1 + i, 0.001 * i as f64, 0.0));
    }
    for i in 0..10u32 {
        let name = format!("A{i}");
        elements.push(way(
            100 + i as i64,
            &[1 + i as i64, 2 + i as i64],
            &[("highway", "residential"), ("name", name.as_str())],
        ));
    }
    // Island: a ring of five distinctly-named oneway segments far away,
    // 5 edge-based nodes.
    let ring = [21, 22, 23, 24, 25];
    for (i, &id) in ring.iter().enumerate() {
        let angle = i as f64 / 5.0 * std::f64::consts::TAU;
        elements.push(node(id, 1.0 + 0.001 * angle.cos(), 1.0 + 0.001 * angle.sin()));
    }
    for i in 0..5usize {
        let name = format!("B{i}");
        elements.push(way(
            200 + i as i64,
            &[ring[i], ring[(i + 1) % 5]],
            &[
                ("highway", "residential"),
                ("name", name.as_str()),
                ("oneway", "yes"),
            ],
        ));
    }

    let extraction = extract_with(elements, |config| {
        config.small_component_size = 10;
    });

    assert_eq!(extraction.summary.edge_based_nodes, 25);
    assert_eq!(extraction.summary.components, 2);

    let components = read_ebg_node_components(&extraction.path(".ebg_nodes")).unwrap();
    let tiny: Vec<_> = components.iter().filter(|(_, tiny)| *tiny).collect();
    let large: Vec<_> = components.iter().filter(|(_, tiny)| !*tiny).collect();
    assert_eq!(tiny.len(), 5);
    assert_eq!(large.len(), 20);
    // All island nodes share one component id, all mainland nodes another.
    assert!(tiny.windows(2).all(|w| w[0].0 == w[1].0));
    assert!(large.windows(2).all(|w| w[0].0 == w[1].0));
}

#[test]
fn all_artifacts_are_written_and_fingerprinted() {
    let extraction = extract(crossroads());

    let suffixes = [
        ".timestamp",
        ".nbg_nodes",
        ".ebg_nodes",
        ".ebg",
        ".enw",
        ".geometry",
        ".cnbg",
        ".icd",
        ".names",
        ".properties",
        ".restrictions",
        ".tls",
        ".tld",
        ".turn_weight_penalties",
        ".turn_duration_penalties",
        ".turn_penalties_index",
        ".cnbg_to_ebg",
        ".ramIndex",
        ".fileIndex",
    ];
    for suffix in suffixes {
        let path = extraction.path(suffix);
        assert!(path.exists(), "{suffix} missing");
        // Opening verifies fingerprint and checksum.
        ArtifactReader::open(&path).unwrap_or_else(|e| panic!("{suffix}: {e}"));
        // No temp files may survive a successful run.
        assert!(!extraction.path(&format!("{suffix}.tmp")).exists());
    }
    assert!(extraction.path(".lock.json").exists());
}

#[test]
fn output_is_deterministic_across_thread_counts() {
    let build = |threads: usize| {
        extract_with(crossroads(), move |config| {
            config.requested_threads = threads;
        })
    };
    let single = build(1);
    let parallel = build(4);

    let suffixes = [
        ".timestamp",
        ".nbg_nodes",
        ".ebg_nodes",
        ".ebg",
        ".enw",
        ".geometry",
        ".cnbg",
        ".icd",
        ".names",
        ".properties",
        ".restrictions",
        ".tls",
        ".tld",
        ".turn_weight_penalties",
        ".turn_duration_penalties",
        ".turn_penalties_index",
        ".cnbg_to_ebg",
        ".ramIndex",
        ".fileIndex",
    ];
    for suffix in suffixes {
        let a = std::fs::read(single.path(suffix)).unwrap();
        let b = std::fs::read(parallel.path(suffix)).unwrap();
        assert_eq!(a, b, "{suffix} differs between thread counts");
    }
}

#[test]
fn service_roads_are_excluded_from_snapping() {
    // A service spur off a residential road: its segments exist in the
    // graph but are not startpoints, so the spatial index skips them.
    let extraction = extract(vec![
        node(1, 0.000, 0.0),
        node(2, 0.001, 0.0),
        node(3, 0.001, 0.001),
        way(10, &[1, 2], &[("highway", "residential")]),
        way(11, &[2, 3], &[("highway", "service")]),
    ]);

    assert_eq!(extraction.summary.edge_based_nodes, 4);
    assert_eq!(extraction.summary.spatial_segments, 1);

    let mut reader = ArtifactReader::open(&extraction.path(".fileIndex")).unwrap();
    assert_eq!(reader.read_u64().unwrap(), 1);
}
