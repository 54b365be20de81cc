//! Identifier types shared across the extraction pipeline.
//!
//! Source identifiers (`NodeId`, `WayId`, `RelationId`) are the 64-bit
//! signed ids from the map dump. Internal identifiers are dense 32-bit
//! indices assigned during the build and are only meaningful relative to
//! the containers they index.

pub type NodeId = i64;
pub type WayId = i64;
pub type RelationId = i64;

pub type InternalNodeId = u32;
pub type EdgeId = u32;
pub type EdgeBasedNodeId = u32;

pub type NameId = u32;
pub type AnnotationId = u32;
pub type LaneDescriptionId = u16;

/// Way/node classes are a small bitmask; at most eight distinct classes.
pub type ClassData = u8;

pub const INVALID_INTERNAL_NODE: InternalNodeId = u32::MAX;
pub const INVALID_EDGE: EdgeId = u32::MAX;
pub const INVALID_EDGE_BASED_NODE: EdgeBasedNodeId = u32::MAX;
pub const INVALID_NAME_ID: NameId = u32::MAX;
pub const INVALID_GEOMETRY_ID: u32 = u32::MAX;
pub const INVALID_LANE_DESCRIPTION: LaneDescriptionId = u16::MAX;

pub const MAX_CLASS_INDEX: usize = 7;
pub const MAX_EXCLUDABLE_CLASSES: usize = 8;
