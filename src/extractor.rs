//! The extraction orchestrator.
//!
//! Drives the two ingestion passes, the graph transformations, and the
//! artifact writes, handing each large container to exactly one
//! downstream owner. The compressed node-based graph is written on its
//! own thread concurrently with component labeling and the spatial index
//! build, and joined before the run returns.

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::time::Instant;

use crate::config::{is_valid_class_name, ExtractorConfig};
use crate::containers::{restriction_nodes, ExtractionContainers, PreparedData};
use crate::ebg;
use crate::error::ExtractError;
use crate::formats::artifacts;
use crate::ids::{ClassData, InternalNodeId, MAX_CLASS_INDEX, MAX_EXCLUDABLE_CLASSES};
use crate::location_cache::LocationCache;
use crate::nbg;
use crate::osm::{Element, EntityMask, EntitySource, MemberKind, OsmNode, OsmWay};
use crate::pipeline::{self, CancelToken, PipelineConfig};
use crate::profile::{ExtractionNode, ExtractionWay, Profile, ProfileProperties};
use crate::relations::RelationIndex;
use crate::restrictions::{
    InputTurnRestriction, NodeRestriction, RestrictionParser, WayRestriction,
};
use crate::rtree::StaticRTree;
use crate::scc;
use crate::segregated::find_segregated_edges;

/// Run statistics, persisted as `<prefix>.lock.json`.
#[derive(Debug, Serialize)]
pub struct ExtractionSummary {
    pub profile: String,
    pub nodes: u64,
    pub ways: u64,
    pub relations: u64,
    pub restrictions: u64,
    pub junction_nodes: u64,
    pub segregated_edges: u64,
    pub edge_based_nodes: u64,
    pub edge_based_edges: u64,
    pub components: u64,
    pub spatial_segments: u64,
    pub parse_ms: u64,
    pub total_ms: u64,
}

pub struct Extractor {
    config: ExtractorConfig,
}

#[derive(Default)]
struct ParsedBuffer {
    nodes: Vec<(OsmNode, ExtractionNode)>,
    ways: Vec<(OsmWay, ExtractionWay)>,
    restrictions: Vec<InputTurnRestriction>,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        profile: &dyn Profile,
        source: &mut dyn EntitySource,
    ) -> Result<ExtractionSummary> {
        self.run_with_cancel(profile, source, &CancelToken::new())
    }

    pub fn run_with_cancel(
        &self,
        profile: &dyn Profile,
        source: &mut dyn EntitySource,
        cancel: &CancelToken,
    ) -> Result<ExtractionSummary> {
        let total_timer = Instant::now();
        let threads = self.config.thread_count();
        let pipeline_config = PipelineConfig::for_workers(threads);
        info!("input: {}", self.config.input_path.display());
        info!("threads: {threads}");

        // Source header and the timestamp artifact.
        let header = source.header();
        info!(
            "input generated by {}",
            header.generator.as_deref().unwrap_or("unknown tool")
        );
        let timestamp = if self.config.use_metadata {
            header.replication_timestamp.as_deref().unwrap_or("n/a")
        } else {
            "n/a"
        };
        info!("timestamp: {timestamp}");
        artifacts::write_timestamp(&self.config.path(".timestamp"), timestamp)?;

        let parse_timer = Instant::now();

        // Pass A: relations only. Translation is parallel, the merge into
        // the shared index serial in input order.
        info!("parse relations ...");
        let mut relation_types = profile.relation_types();
        relation_types.sort();
        let mut relation_index = RelationIndex::new();
        {
            let relation_types = &relation_types;
            pipeline::run(
                pipeline_config,
                cancel,
                |emit| source.read(EntityMask::RELATIONS, &mut |buffer| emit(buffer)),
                move |buffer| {
                    let mut partial = RelationIndex::new();
                    for element in &buffer.elements {
                        if let Element::Relation(relation) = element {
                            let declared = relation.tags.get("type").is_some_and(|t| {
                                relation_types
                                    .binary_search_by(|candidate| candidate.as_str().cmp(t))
                                    .is_ok()
                            });
                            if declared {
                                partial.add(relation);
                            }
                        }
                    }
                    partial
                },
                |partial| {
                    relation_index.merge(partial);
                    Ok(())
                },
            )?;
        }
        info!("indexed {} relations", relation_index.len());

        // Pass B: nodes, ways and turn-restriction relations.
        info!("parse ways and nodes ...");
        let properties = profile.properties();
        let parser = RestrictionParser::new(
            properties.use_turn_restrictions,
            self.config.parse_conditionals,
            profile.restriction_filters(),
        );
        let resolve_locations =
            profile.has_location_dependent_data() && self.config.use_locations_cache;
        let mut location_cache = LocationCache::new();

        let mut containers = ExtractionContainers::new();
        let mut node_count = 0u64;
        let mut way_count = 0u64;
        let mut restriction_count = 0u64;
        {
            let relation_index = &relation_index;
            let parser = &parser;
            pipeline::run(
                pipeline_config,
                cancel,
                |emit| {
                    source.read(EntityMask::ALL, &mut |mut buffer| {
                        if resolve_locations {
                            location_cache.apply(&mut buffer);
                        }
                        emit(buffer);
                    })
                },
                move |buffer| {
                    let mut parsed = ParsedBuffer::default();
                    for element in buffer.elements {
                        match element {
                            Element::Node(node) => {
                                let result = profile.process_node(&node.tags);
                                parsed.nodes.push((node, result));
                            }
                            Element::Way(way) => {
                                let context =
                                    relation_index.context_for(MemberKind::Way, way.id);
                                if let Some(result) = profile.process_way(&way.tags, &context) {
                                    parsed.ways.push((way, result));
                                }
                            }
                            Element::Relation(relation) => {
                                if let Some(restriction) = parser.parse(&relation) {
                                    parsed.restrictions.push(restriction);
                                }
                            }
                        }
                    }
                    parsed
                },
                |parsed: ParsedBuffer| {
                    node_count += parsed.nodes.len() as u64;
                    way_count += parsed.ways.len() as u64;
                    restriction_count += parsed.restrictions.len() as u64;
                    for (node, result) in parsed.nodes {
                        containers.process_node(&node, result)?;
                    }
                    for (way, result) in parsed.ways {
                        containers.process_way(&way, result)?;
                    }
                    for restriction in parsed.restrictions {
                        containers.process_restriction(restriction);
                    }
                    Ok(())
                },
            )?;
        }

        let parse_ms = parse_timer.elapsed().as_millis() as u64;
        info!(
            "raw input contains {node_count} nodes, {way_count} routable ways, \
             {} relations, {restriction_count} restrictions",
            relation_index.len()
        );

        // Aggregate: name interning happened inline; resolve references,
        // fan out edges, link restrictions.
        let prepared = containers.prepare()?;
        let PreparedData {
            osm_node_ids,
            coordinates,
            barriers,
            traffic_signals,
            edges,
            annotations,
            name_table,
            mut classes_map,
            node_restrictions,
            way_restrictions,
            turn_lane_offsets,
            turn_lane_masks,
        } = prepared;

        // Class configuration and the small early artifacts.
        let mut properties = properties;
        set_class_names(&profile.class_names(), &mut classes_map, &mut properties)?;
        set_excludable_classes(&classes_map, &profile.excludable_classes(), &mut properties)?;
        artifacts::write_properties(&self.config.path(".properties"), &properties)?;
        artifacts::write_names(&self.config.path(".names"), &name_table)?;
        artifacts::write_turn_lane_descriptions(
            &self.config.path(".tls"),
            &turn_lane_offsets,
            &turn_lane_masks,
        )?;

        // Node-based graph with chain compression; restriction anchors are
        // protected so their edges survive.
        info!("generating edge-expanded graph representation");
        let expansion_timer = Instant::now();
        let protected = restriction_nodes(&node_restrictions, &way_restrictions);
        let nbg_output = nbg::build(
            edges,
            coordinates,
            osm_node_ids,
            barriers,
            traffic_signals,
            &protected,
        );

        let remap = |id: InternalNodeId| nbg_output.node_id_map[id as usize];
        let node_restrictions: Vec<NodeRestriction> = node_restrictions
            .into_iter()
            .map(|r| NodeRestriction {
                from: remap(r.from),
                via: remap(r.via),
                to: remap(r.to),
                ..r
            })
            .collect();
        let way_restrictions: Vec<WayRestriction> = way_restrictions
            .into_iter()
            .map(|r| WayRestriction {
                from: remap(r.from),
                via: r.via.iter().map(|&v| remap(v)).collect(),
                to: remap(r.to),
                ..r
            })
            .collect();
        let (node_restrictions, way_restrictions) =
            ebg::remove_invalid_restrictions(node_restrictions, way_restrictions, &nbg_output.graph);

        // Dual-carriageway halves.
        let segregated = find_segregated_edges(
            &nbg_output.graph,
            &annotations,
            &name_table,
            &nbg_output.compressed,
            &nbg_output.coordinates,
        );

        artifacts::write_nbg_nodes(
            &self.config.path(".nbg_nodes"),
            &nbg_output.coordinates,
            &nbg_output.osm_node_ids,
        )?;

        // The compressed node-based graph dumps on its own thread; joined
        // below, after SCC labeling and the R-tree build.
        let cnbg_path = self.config.path(".cnbg");
        let cnbg_edges = artifacts::snapshot_cnbg(&nbg_output.graph);
        let cnbg_coordinates = nbg_output.coordinates.clone();
        let cnbg_writer = std::thread::spawn(move || {
            artifacts::write_compressed_node_based_graph(&cnbg_path, &cnbg_edges, &cnbg_coordinates)
        });

        // Unconditional restrictions are baked into the edge-based graph;
        // conditional ones only travel through the artifact.
        let (applied_node, applied_way): (Vec<_>, Vec<_>) = (
            node_restrictions
                .iter()
                .filter(|r| r.condition.is_none())
                .cloned()
                .collect(),
            way_restrictions
                .iter()
                .filter(|r| r.condition.is_none())
                .cloned()
                .collect(),
        );

        let mut ebg_output = ebg::build(ebg::EdgeBasedGraphInput {
            graph: &nbg_output.graph,
            coordinates: &nbg_output.coordinates,
            osm_node_ids: &nbg_output.osm_node_ids,
            compressed: &nbg_output.compressed,
            annotations,
            barriers: &nbg_output.barriers,
            traffic_signals: &nbg_output.traffic_signals,
            segregated: &segregated,
            node_restrictions: &applied_node,
            way_restrictions: &applied_way,
            profile,
        });
        info!(
            "expansion took {:.2}s",
            expansion_timer.elapsed().as_secs_f64()
        );

        // Geometry is written after its last reader.
        artifacts::write_segment_data(&self.config.path(".geometry"), &nbg_output.compressed)?;
        artifacts::write_node_weights(&self.config.path(".enw"), &ebg_output.node_weights)?;
        artifacts::write_restrictions(
            &self.config.path(".restrictions"),
            &node_restrictions,
            &way_restrictions,
        )?;
        artifacts::write_turn_penalties(
            &self.config.path(".turn_weight_penalties"),
            &self.config.path(".turn_duration_penalties"),
            &self.config.path(".turn_penalties_index"),
            &ebg_output.turn_weight_penalties,
            &ebg_output.turn_duration_penalties,
            &ebg_output.turn_index,
        )?;
        artifacts::write_turn_lane_data(
            &self.config.path(".tld"),
            &ebg_output.node_data,
            &ebg_output.annotations,
        )?;
        artifacts::write_intersections(
            &self.config.path(".icd"),
            &ebg_output.intersection_data,
        )?;
        artifacts::write_cnbg_to_ebg(&self.config.path(".cnbg_to_ebg"), &ebg_output.segments)?;

        // Strongly connected components over the edge-based graph.
        info!("computing strictly connected components ...");
        let components = scc::find_components(
            ebg_output.num_nodes(),
            &ebg_output.edges,
            &ebg_output.segments,
        );
        scc::label_components(
            &mut ebg_output.node_data,
            &components,
            self.config.small_component_size,
        );

        artifacts::write_ebg_nodes(
            &self.config.path(".ebg_nodes"),
            &ebg_output.node_data,
            &ebg_output.annotations,
        )?;
        artifacts::write_edge_based_graph(
            &self.config.path(".ebg"),
            ebg_output.num_nodes(),
            &ebg_output.edges,
        )?;

        // Spatial index over startpoint segments; consumes the segments.
        info!("building r-tree ...");
        let edge_based_nodes = ebg_output.num_nodes() as u64;
        let edge_based_edges = ebg_output.edges.len() as u64;
        let startpoints = ebg_output.startpoints;
        let segments = ebg_output.segments;
        let tree = StaticRTree::build(segments, &startpoints, &nbg_output.coordinates)?;
        tree.write(
            &self.config.path(".ramIndex"),
            &self.config.path(".fileIndex"),
        )?;

        cnbg_writer
            .join()
            .map_err(|_| anyhow!("compressed graph writer panicked"))?
            .context("writing compressed node-based graph")?;

        let summary = ExtractionSummary {
            profile: profile.name().to_string(),
            nodes: node_count,
            ways: way_count,
            relations: relation_index.len() as u64,
            restrictions: restriction_count,
            junction_nodes: nbg_output.graph.num_nodes() as u64,
            segregated_edges: segregated.len() as u64,
            edge_based_nodes,
            edge_based_edges,
            components: components.num_components() as u64,
            spatial_segments: tree.num_segments(),
            parse_ms,
            total_ms: total_timer.elapsed().as_millis() as u64,
        };
        std::fs::write(
            self.config.path(".lock.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;

        info!(
            "extraction finished after {:.2}s: {} edge-based nodes, {} edges",
            summary.total_ms as f64 / 1000.0,
            summary.edge_based_nodes,
            summary.edge_based_edges
        );
        Ok(summary)
    }
}

/// Validate profile-declared class names against the classes actually
/// used on ways, and expose the index-to-name mapping in the properties.
fn set_class_names(
    class_names: &[String],
    classes_map: &mut FxHashMap<String, ClassData>,
    properties: &mut ProfileProperties,
) -> std::result::Result<(), ExtractError> {
    if !class_names.is_empty() {
        // Register declared names that no way happened to use, so unknown
        // names can be told apart from merely unused ones.
        for name in class_names {
            if !is_valid_class_name(name) {
                return Err(ExtractError::Profile(format!(
                    "invalid class name {name}, only [A-Za-z0-9] allowed"
                )));
            }
            if !classes_map.contains_key(name) {
                let index = classes_map.len();
                if index > MAX_CLASS_INDEX {
                    return Err(ExtractError::Profile(format!(
                        "maximum number of classes is {}",
                        MAX_CLASS_INDEX + 1
                    )));
                }
                classes_map.insert(name.clone(), 1 << index);
            }
        }

        for used in classes_map.keys() {
            if !class_names.contains(used) {
                return Err(ExtractError::Profile(format!(
                    "profile used unknown class name: {used}"
                )));
            }
        }
    }

    let max_index = classes_map
        .values()
        .map(|mask| mask.trailing_zeros() as usize)
        .max();
    if let Some(max_index) = max_index {
        properties.class_names = vec![String::new(); max_index + 1];
        for (name, mask) in classes_map.iter() {
            properties.class_names[mask.trailing_zeros() as usize] = name.clone();
        }
    }
    Ok(())
}

/// Resolve excludable class combinations to masks. Index 0 stays reserved
/// for "exclude nothing".
fn set_excludable_classes(
    classes_map: &FxHashMap<String, ClassData>,
    excludable_classes: &[Vec<String>],
    properties: &mut ProfileProperties,
) -> std::result::Result<(), ExtractError> {
    if excludable_classes.len() > MAX_EXCLUDABLE_CLASSES {
        return Err(ExtractError::Profile(format!(
            "only {MAX_EXCLUDABLE_CLASSES} excludable combinations allowed"
        )));
    }

    properties.excludable_classes = vec![0];
    for combination in excludable_classes {
        let mut mask: ClassData = 0;
        for name in combination {
            match classes_map.get(name) {
                Some(class) => mask |= class,
                None => {
                    warn!("unknown class name {name} in excludable combination, ignoring");
                }
            }
        }
        if mask > 0 {
            properties.excludable_classes.push(mask);
        }
    }
    Ok(())
}
