//! Packed static R-tree over snap-eligible segments.
//!
//! Segments are sorted along a Hilbert curve, packed into fixed-size leaf
//! pages, and covered by a small-fanout tree of bounding boxes built
//! bottom-up. The inner tree persists to one file (`.ramIndex`), the leaf
//! pages to another (`.fileIndex`); query services map the leaf file and
//! keep the tree in memory.

use log::info;
use std::path::Path;

use bit_vec::BitVec;

use crate::ebg::EdgeBasedNodeSegment;
use crate::error::{ExtractError, Result};
use crate::formats::writer::ArtifactWriter;
use crate::geo::Coordinate;
use crate::ids::INVALID_EDGE_BASED_NODE;

pub const LEAF_PAGE_SIZE: usize = 128;
pub const BRANCHING_FACTOR: usize = 4;

/// Inclusive bounding box in fixed-point coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rectangle {
    pub min_lon: i32,
    pub min_lat: i32,
    pub max_lon: i32,
    pub max_lat: i32,
}

impl Rectangle {
    pub fn inverted() -> Self {
        Self {
            min_lon: i32::MAX,
            min_lat: i32::MAX,
            max_lon: i32::MIN,
            max_lat: i32::MIN,
        }
    }

    pub fn extend(&mut self, coordinate: Coordinate) {
        self.min_lon = self.min_lon.min(coordinate.lon);
        self.min_lat = self.min_lat.min(coordinate.lat);
        self.max_lon = self.max_lon.max(coordinate.lon);
        self.max_lat = self.max_lat.max(coordinate.lat);
    }

    pub fn merge(&mut self, other: &Rectangle) {
        self.min_lon = self.min_lon.min(other.min_lon);
        self.min_lat = self.min_lat.min(other.min_lat);
        self.max_lon = self.max_lon.max(other.max_lon);
        self.max_lat = self.max_lat.max(other.max_lat);
    }

    pub fn intersects(&self, other: &Rectangle) -> bool {
        self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
            && self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
    }
}

#[derive(Debug, Clone, Copy)]
struct TreeNode {
    mbr: Rectangle,
    /// Leaf-level nodes index into the page array, inner nodes into the
    /// node array.
    first_child: u32,
    child_count: u32,
    is_leaf_level: bool,
}

pub struct StaticRTree {
    nodes: Vec<TreeNode>,
    root: u32,
    pages: Vec<Vec<EdgeBasedNodeSegment>>,
    num_segments: u64,
}

fn segment_bbox(segment: &EdgeBasedNodeSegment, coordinates: &[Coordinate]) -> Rectangle {
    let mut bbox = Rectangle::inverted();
    bbox.extend(coordinates[segment.u as usize]);
    bbox.extend(coordinates[segment.v as usize]);
    bbox
}

const HILBERT_ORDER: u32 = 1 << 16;

fn hilbert_rotate(n: u32, x: &mut u32, y: &mut u32, rx: u32, ry: u32) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}

/// Distance along the Hilbert curve for a 16-bit (x, y) cell.
fn hilbert_index(mut x: u32, mut y: u32) -> u64 {
    let mut d: u64 = 0;
    let mut s = HILBERT_ORDER / 2;
    while s > 0 {
        let rx = u32::from((x & s) > 0);
        let ry = u32::from((y & s) > 0);
        d += (s as u64) * (s as u64) * ((3 * rx) ^ ry) as u64;
        hilbert_rotate(HILBERT_ORDER, &mut x, &mut y, rx, ry);
        s /= 2;
    }
    d
}

/// Top 16 bits of the coordinate, offset into unsigned space.
fn hilbert_cell(value: i32) -> u32 {
    (((value as i64 - i32::MIN as i64) as u64) >> 16) as u32
}

impl StaticRTree {
    /// Build from the segment list, keeping only startpoint segments.
    pub fn build(
        segments: Vec<EdgeBasedNodeSegment>,
        startpoints: &BitVec,
        coordinates: &[Coordinate],
    ) -> Result<Self> {
        debug_assert_eq!(segments.len(), startpoints.len());

        let mut snappable: Vec<EdgeBasedNodeSegment> = segments
            .into_iter()
            .enumerate()
            .filter(|(index, _)| startpoints.get(*index).unwrap_or(false))
            .map(|(_, segment)| segment)
            .collect();

        if snappable.is_empty() {
            return Err(ExtractError::EmptyIndex);
        }

        snappable.sort_by_key(|segment| {
            let bbox = segment_bbox(segment, coordinates);
            let center_lon = ((bbox.min_lon as i64 + bbox.max_lon as i64) / 2) as i32;
            let center_lat = ((bbox.min_lat as i64 + bbox.max_lat as i64) / 2) as i32;
            hilbert_index(hilbert_cell(center_lon), hilbert_cell(center_lat))
        });

        let num_segments = snappable.len() as u64;

        // Leaf pages and their covering nodes.
        let mut pages: Vec<Vec<EdgeBasedNodeSegment>> = Vec::new();
        let mut level: Vec<TreeNode> = Vec::new();
        for chunk in snappable.chunks(LEAF_PAGE_SIZE) {
            let mut mbr = Rectangle::inverted();
            for segment in chunk {
                mbr.merge(&segment_bbox(segment, coordinates));
            }
            level.push(TreeNode {
                mbr,
                first_child: pages.len() as u32,
                child_count: 1,
                is_leaf_level: true,
            });
            pages.push(chunk.to_vec());
        }

        // Pack upper levels until a single root covers everything.
        let mut nodes: Vec<TreeNode> = Vec::new();
        let mut level_start = 0u32;
        nodes.extend(&level);
        while level.len() > 1 {
            let mut next_level: Vec<TreeNode> = Vec::new();
            for (chunk_index, chunk) in level.chunks(BRANCHING_FACTOR).enumerate() {
                let mut mbr = Rectangle::inverted();
                for node in chunk {
                    mbr.merge(&node.mbr);
                }
                next_level.push(TreeNode {
                    mbr,
                    first_child: level_start + (chunk_index * BRANCHING_FACTOR) as u32,
                    child_count: chunk.len() as u32,
                    is_leaf_level: false,
                });
            }
            level_start = nodes.len() as u32;
            nodes.extend(&next_level);
            level = next_level;
        }

        let root = nodes.len() as u32 - 1;
        info!(
            "r-tree: {} segments in {} leaf pages, {} tree nodes",
            num_segments,
            pages.len(),
            nodes.len()
        );

        Ok(Self {
            nodes,
            root,
            pages,
            num_segments,
        })
    }

    pub fn num_segments(&self) -> u64 {
        self.num_segments
    }

    pub fn num_pages(&self) -> usize {
        self.pages.len()
    }

    /// All segments whose bounding box intersects `rect`.
    pub fn query(
        &self,
        rect: &Rectangle,
        coordinates: &[Coordinate],
    ) -> Vec<EdgeBasedNodeSegment> {
        let mut result = Vec::new();
        let mut pending = vec![self.root];
        while let Some(node_index) = pending.pop() {
            let node = &self.nodes[node_index as usize];
            if !node.mbr.intersects(rect) {
                continue;
            }
            if node.is_leaf_level {
                for segment in &self.pages[node.first_child as usize] {
                    if segment_bbox(segment, coordinates).intersects(rect) {
                        result.push(*segment);
                    }
                }
            } else {
                for child in node.first_child..node.first_child + node.child_count {
                    pending.push(child);
                }
            }
        }
        result
    }

    /// Persist the in-memory tree and the leaf pages. Leaf pages are
    /// padded to a fixed record count so offsets are computable.
    pub fn write(&self, ram_path: &Path, leaf_path: &Path) -> Result<()> {
        let mut writer = ArtifactWriter::create(ram_path)?;
        writer.write_u64(self.nodes.len() as u64)?;
        writer.write_u32(self.root)?;
        writer.write_u32(LEAF_PAGE_SIZE as u32)?;
        writer.write_u32(BRANCHING_FACTOR as u32)?;
        for node in &self.nodes {
            writer.write_i32(node.mbr.min_lon)?;
            writer.write_i32(node.mbr.min_lat)?;
            writer.write_i32(node.mbr.max_lon)?;
            writer.write_i32(node.mbr.max_lat)?;
            writer.write_u32(node.first_child)?;
            writer.write_u32(node.child_count)?;
            writer.write_u8(node.is_leaf_level as u8)?;
        }
        writer.finish()?;

        let mut writer = ArtifactWriter::create(leaf_path)?;
        writer.write_u64(self.num_segments)?;
        writer.write_u64(self.pages.len() as u64)?;
        for page in &self.pages {
            writer.write_u32(page.len() as u32)?;
            for slot in 0..LEAF_PAGE_SIZE {
                match page.get(slot) {
                    Some(segment) => {
                        writer.write_u32(segment.forward_ebn)?;
                        writer.write_u32(segment.reverse_ebn)?;
                        writer.write_u32(segment.u)?;
                        writer.write_u32(segment.v)?;
                    }
                    None => {
                        for _ in 0..4 {
                            writer.write_u32(INVALID_EDGE_BASED_NODE)?;
                        }
                    }
                }
            }
        }
        writer.finish()
    }
}
