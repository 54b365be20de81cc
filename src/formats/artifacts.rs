//! Writers (and test-facing readers) for the extraction artifacts.
//!
//! Layouts are little-endian with 64-bit element counts ahead of every
//! sized table. All files share the fingerprint + CRC framing from
//! `writer`.

use std::path::Path;

use super::writer::{ArtifactReader, ArtifactWriter};
use crate::containers::EdgeAnnotation;
use crate::ebg::{
    EdgeBasedEdge, EdgeBasedNodeData, EdgeBasedNodeSegment, IntersectionData, TurnIndexEntry,
};
use crate::error::Result;
use crate::geo::Coordinate;
use crate::ids::NodeId;
use crate::names::NameTable;
use crate::nbg::{CompressedEdgeContainer, NodeBasedGraph};
use crate::profile::ProfileProperties;
use crate::restrictions::{NodeRestriction, RestrictionKind, WayRestriction};

pub fn write_timestamp(path: &Path, timestamp: &str) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_str(timestamp)?;
    writer.finish()
}

/// Junction coordinates plus their source node ids.
pub fn write_nbg_nodes(
    path: &Path,
    coordinates: &[Coordinate],
    osm_node_ids: &[NodeId],
) -> Result<()> {
    debug_assert_eq!(coordinates.len(), osm_node_ids.len());
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(coordinates.len() as u64)?;
    for coordinate in coordinates {
        writer.write_i32(coordinate.lon)?;
        writer.write_i32(coordinate.lat)?;
    }
    for id in osm_node_ids {
        writer.write_i64(*id)?;
    }
    writer.finish()
}

pub fn read_nbg_nodes(path: &Path) -> Result<(Vec<Coordinate>, Vec<NodeId>)> {
    let mut reader = ArtifactReader::open(path)?;
    let count = reader.read_u64()? as usize;
    let mut coordinates = Vec::with_capacity(count);
    for _ in 0..count {
        let lon = reader.read_i32()?;
        let lat = reader.read_i32()?;
        coordinates.push(Coordinate::new(lon, lat));
    }
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(reader.read_i64()?);
    }
    Ok((coordinates, ids))
}

pub fn write_names(path: &Path, names: &NameTable) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(names.len() as u64)?;
    writer.write_u64(names.offsets().len() as u64)?;
    for offset in names.offsets() {
        writer.write_u32(*offset)?;
    }
    writer.write_str(names.blob())?;
    writer.finish()
}

pub fn read_names(path: &Path) -> Result<(Vec<u32>, String)> {
    let mut reader = ArtifactReader::open(path)?;
    let _count = reader.read_u64()?;
    let offsets_len = reader.read_u64()? as usize;
    let mut offsets = Vec::with_capacity(offsets_len);
    for _ in 0..offsets_len {
        offsets.push(reader.read_u32()?);
    }
    let blob = reader.read_str()?;
    Ok((offsets, blob))
}

pub fn write_properties(path: &Path, properties: &ProfileProperties) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_str(&properties.profile_name)?;
    writer.write_str(&properties.weight_name)?;
    writer.write_f64(properties.traffic_signal_penalty)?;
    writer.write_f64(properties.u_turn_penalty)?;
    writer.write_f64(properties.max_speed)?;
    writer.write_u8(properties.use_turn_restrictions as u8)?;
    writer.write_u8(properties.continue_straight_at_waypoint as u8)?;
    writer.write_u8(properties.left_hand_driving as u8)?;
    writer.write_u8(properties.class_names.len() as u8)?;
    for name in &properties.class_names {
        writer.write_str(name)?;
    }
    writer.write_u8(properties.excludable_classes.len() as u8)?;
    for mask in &properties.excludable_classes {
        writer.write_u8(*mask)?;
    }
    writer.finish()
}

pub fn write_turn_lane_descriptions(
    path: &Path,
    offsets: &[u32],
    masks: &[u16],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(offsets.len() as u64)?;
    for offset in offsets {
        writer.write_u32(*offset)?;
    }
    writer.write_u64(masks.len() as u64)?;
    for mask in masks {
        writer.write_u16(*mask)?;
    }
    writer.finish()
}

/// Per edge-based node: the turn-lane description it carries.
pub fn write_turn_lane_data(
    path: &Path,
    node_data: &[EdgeBasedNodeData],
    annotations: &[EdgeAnnotation],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(node_data.len() as u64)?;
    for data in node_data {
        writer.write_u16(annotations[data.annotation as usize].lane_description)?;
    }
    writer.finish()
}

pub fn write_ebg_nodes(
    path: &Path,
    node_data: &[EdgeBasedNodeData],
    annotations: &[EdgeAnnotation],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(node_data.len() as u64)?;
    for data in node_data {
        let annotation = &annotations[data.annotation as usize];
        writer.write_u32(data.geometry_id)?;
        writer.write_u32(annotation.name_id)?;
        writer.write_u8(annotation.classes)?;
        writer.write_u8(annotation.travel_mode as u8)?;
        writer.write_u16(annotation.lane_description)?;
        writer.write_u32(data.component_id)?;
        writer.write_u8(data.is_tiny_component as u8)?;
        writer.write_u8(data.is_segregated as u8)?;
    }
    writer.finish()
}

/// Component id and tiny flag per edge-based node, for verification.
pub fn read_ebg_node_components(path: &Path) -> Result<Vec<(u32, bool)>> {
    let mut reader = ArtifactReader::open(path)?;
    let count = reader.read_u64()? as usize;
    let mut components = Vec::with_capacity(count);
    for _ in 0..count {
        let _geometry = reader.read_u32()?;
        let _name = reader.read_u32()?;
        let _classes = reader.read_u8()?;
        let _mode = reader.read_u8()?;
        let _lanes = reader.read_u16()?;
        let component = reader.read_u32()?;
        let tiny = reader.read_u8()? != 0;
        let _segregated = reader.read_u8()?;
        components.push((component, tiny));
    }
    Ok(components)
}

pub fn write_edge_based_graph(
    path: &Path,
    num_nodes: u32,
    edges: &[EdgeBasedEdge],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u32(num_nodes)?;
    writer.write_u64(edges.len() as u64)?;
    for edge in edges {
        writer.write_u32(edge.source)?;
        writer.write_u32(edge.target)?;
        writer.write_u32(edge.turn_id)?;
        writer.write_u32(edge.weight)?;
        writer.write_u32(edge.duration)?;
        writer.write_u8(edge.forward as u8)?;
        writer.write_u8(edge.backward as u8)?;
    }
    writer.finish()
}

pub fn read_edge_based_graph(path: &Path) -> Result<(u32, Vec<EdgeBasedEdge>)> {
    let mut reader = ArtifactReader::open(path)?;
    let num_nodes = reader.read_u32()?;
    let count = reader.read_u64()? as usize;
    let mut edges = Vec::with_capacity(count);
    for _ in 0..count {
        edges.push(EdgeBasedEdge {
            source: reader.read_u32()?,
            target: reader.read_u32()?,
            turn_id: reader.read_u32()?,
            weight: reader.read_u32()?,
            duration: reader.read_u32()?,
            forward: reader.read_u8()? != 0,
            backward: reader.read_u8()? != 0,
        });
    }
    Ok((num_nodes, edges))
}

pub fn write_node_weights(path: &Path, weights: &[u32]) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(weights.len() as u64)?;
    for weight in weights {
        writer.write_u32(*weight)?;
    }
    writer.finish()
}

/// Segment geometries with cumulative weights and durations.
pub fn write_segment_data(path: &Path, compressed: &CompressedEdgeContainer) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(compressed.len() as u64)?;
    for id in 0..compressed.len() as u32 {
        let geometry = compressed.get(id);
        writer.write_u32(geometry.len() as u32)?;
        for entry in geometry {
            writer.write_i32(entry.coord.lon)?;
            writer.write_i32(entry.coord.lat)?;
            writer.write_i64(entry.osm_node_id)?;
            writer.write_u32(entry.weight)?;
            writer.write_u32(entry.duration)?;
        }
    }
    writer.finish()
}

/// Flat snapshot of the compressed node-based graph, so the write can run
/// on its own thread while later stages keep using the graph.
pub fn snapshot_cnbg(graph: &NodeBasedGraph) -> Vec<(u32, u32)> {
    let mut edges = Vec::with_capacity(graph.num_edges());
    for source in 0..graph.num_nodes() as u32 {
        for edge in graph.edge_range(source) {
            edges.push((source, graph.target(edge)));
        }
    }
    edges
}

/// Compressed node-based graph for downstream partitioning:
/// | fingerprint | #edges | #nodes | (from, to)... | (lon, lat)... |
pub fn write_compressed_node_based_graph(
    path: &Path,
    edges: &[(u32, u32)],
    coordinates: &[Coordinate],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(edges.len() as u64)?;
    writer.write_u64(coordinates.len() as u64)?;
    for (from, to) in edges {
        writer.write_u32(*from)?;
        writer.write_u32(*to)?;
    }
    for coordinate in coordinates {
        writer.write_i32(coordinate.lon)?;
        writer.write_i32(coordinate.lat)?;
    }
    writer.finish()
}

pub fn read_compressed_node_based_graph(
    path: &Path,
) -> Result<(Vec<(u32, u32)>, Vec<Coordinate>)> {
    let mut reader = ArtifactReader::open(path)?;
    let num_edges = reader.read_u64()? as usize;
    let num_nodes = reader.read_u64()? as usize;
    let mut edges = Vec::with_capacity(num_edges);
    for _ in 0..num_edges {
        edges.push((reader.read_u32()?, reader.read_u32()?));
    }
    let mut coordinates = Vec::with_capacity(num_nodes);
    for _ in 0..num_nodes {
        let lon = reader.read_i32()?;
        let lat = reader.read_i32()?;
        coordinates.push(Coordinate::new(lon, lat));
    }
    Ok((edges, coordinates))
}

fn write_restriction_kind(writer: &mut ArtifactWriter, kind: RestrictionKind) -> Result<()> {
    writer.write_u8(match kind {
        RestrictionKind::No => 0,
        RestrictionKind::Only => 1,
    })
}

fn write_condition(writer: &mut ArtifactWriter, condition: &Option<String>) -> Result<()> {
    match condition {
        Some(condition) => {
            writer.write_u8(1)?;
            writer.write_str(condition)
        }
        None => writer.write_u8(0),
    }
}

pub fn write_restrictions(
    path: &Path,
    node_restrictions: &[NodeRestriction],
    way_restrictions: &[WayRestriction],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;

    writer.write_u64(node_restrictions.len() as u64)?;
    for restriction in node_restrictions {
        writer.write_u32(restriction.from)?;
        writer.write_u32(restriction.via)?;
        writer.write_u32(restriction.to)?;
        write_restriction_kind(&mut writer, restriction.kind)?;
        write_condition(&mut writer, &restriction.condition)?;
    }

    writer.write_u64(way_restrictions.len() as u64)?;
    for restriction in way_restrictions {
        writer.write_u32(restriction.from)?;
        writer.write_u16(restriction.via.len() as u16)?;
        for via in &restriction.via {
            writer.write_u32(*via)?;
        }
        writer.write_u32(restriction.to)?;
        write_restriction_kind(&mut writer, restriction.kind)?;
        write_condition(&mut writer, &restriction.condition)?;
    }

    writer.finish()
}

pub fn write_turn_penalties(
    weight_path: &Path,
    duration_path: &Path,
    index_path: &Path,
    weight_penalties: &[i16],
    duration_penalties: &[i16],
    index: &[TurnIndexEntry],
) -> Result<()> {
    let mut writer = ArtifactWriter::create(weight_path)?;
    writer.write_u64(weight_penalties.len() as u64)?;
    for penalty in weight_penalties {
        writer.write_i16(*penalty)?;
    }
    writer.finish()?;

    let mut writer = ArtifactWriter::create(duration_path)?;
    writer.write_u64(duration_penalties.len() as u64)?;
    for penalty in duration_penalties {
        writer.write_i16(*penalty)?;
    }
    writer.finish()?;

    let mut writer = ArtifactWriter::create(index_path)?;
    writer.write_u64(index.len() as u64)?;
    for entry in index {
        writer.write_i64(entry.from)?;
        writer.write_i64(entry.via)?;
        writer.write_i64(entry.to)?;
    }
    writer.finish()
}

/// Mapping from compressed node-based edges to the edge-based nodes that
/// traverse them.
pub fn write_cnbg_to_ebg(path: &Path, segments: &[EdgeBasedNodeSegment]) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;
    writer.write_u64(segments.len() as u64)?;
    for segment in segments {
        writer.write_u32(segment.u)?;
        writer.write_u32(segment.v)?;
        writer.write_u32(segment.forward_ebn)?;
        writer.write_u32(segment.reverse_ebn)?;
    }
    writer.finish()
}

pub fn write_intersections(path: &Path, data: &IntersectionData) -> Result<()> {
    let mut writer = ArtifactWriter::create(path)?;

    writer.write_u64(data.bearing_class_offsets.len() as u64)?;
    for offset in &data.bearing_class_offsets {
        writer.write_u32(*offset)?;
    }
    writer.write_u64(data.bearing_class_values.len() as u64)?;
    for value in &data.bearing_class_values {
        writer.write_u16(*value)?;
    }
    writer.write_u64(data.node_bearing_class.len() as u64)?;
    for class in &data.node_bearing_class {
        writer.write_u32(*class)?;
    }
    writer.write_u64(data.entry_class_masks.len() as u64)?;
    for mask in &data.entry_class_masks {
        writer.write_u32(*mask)?;
    }
    writer.write_u64(data.ebn_entry_class.len() as u64)?;
    for class in &data.ebn_entry_class {
        writer.write_u32(*class)?;
    }

    writer.finish()
}
