//! Strongly connected component labeling of the edge-based graph.
//!
//! Tarjan's algorithm with an explicit work stack: recursion depth on a
//! country-sized network reaches millions of frames, far past any thread
//! stack. Forward and reverse traversals of the same segment are tied
//! together with symmetric edges so both always land in one component.

use log::info;
use rayon::prelude::*;

use crate::ebg::{EdgeBasedEdge, EdgeBasedNodeData, EdgeBasedNodeSegment};
use crate::ids::{EdgeBasedNodeId, INVALID_EDGE_BASED_NODE};

const UNSET: u32 = u32::MAX;

pub struct SccResult {
    /// 1-based component id per edge-based node.
    pub component_id: Vec<u32>,
    /// Size of each component, indexed by `component_id - 1`.
    pub component_sizes: Vec<u32>,
}

impl SccResult {
    pub fn num_components(&self) -> usize {
        self.component_sizes.len()
    }

    pub fn size_of(&self, node: EdgeBasedNodeId) -> u32 {
        self.component_sizes[self.component_id[node as usize] as usize - 1]
    }
}

pub fn find_components(
    num_nodes: u32,
    edges: &[EdgeBasedEdge],
    segments: &[EdgeBasedNodeSegment],
) -> SccResult {
    let mut pairs: Vec<(u32, u32)> = Vec::with_capacity(edges.len() + segments.len() * 2);
    for edge in edges {
        if edge.forward {
            pairs.push((edge.source, edge.target));
        }
        if edge.backward {
            pairs.push((edge.target, edge.source));
        }
    }
    // Couple the two traversal directions of every segment.
    for segment in segments {
        if segment.reverse_ebn != INVALID_EDGE_BASED_NODE {
            pairs.push((segment.forward_ebn, segment.reverse_ebn));
            pairs.push((segment.reverse_ebn, segment.forward_ebn));
        }
    }

    pairs.par_sort_unstable();
    pairs.dedup();

    // CSR over the deduplicated pairs.
    let n = num_nodes as usize;
    let mut offsets = vec![0u32; n + 1];
    for &(source, _) in &pairs {
        offsets[source as usize + 1] += 1;
    }
    for i in 0..n {
        offsets[i + 1] += offsets[i];
    }
    let targets: Vec<u32> = pairs.iter().map(|&(_, target)| target).collect();

    let mut index = vec![UNSET; n];
    let mut lowlink = vec![0u32; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<u32> = Vec::new();
    let mut component_id = vec![0u32; n];
    let mut component_sizes: Vec<u32> = Vec::new();
    let mut next_index = 0u32;

    // (node, cursor into its adjacency) frames replace recursion.
    let mut frames: Vec<(u32, u32)> = Vec::new();

    for root in 0..n as u32 {
        if index[root as usize] != UNSET {
            continue;
        }
        index[root as usize] = next_index;
        lowlink[root as usize] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root as usize] = true;
        frames.push((root, offsets[root as usize]));

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if frame.1 < offsets[v as usize + 1] {
                let w = targets[frame.1 as usize];
                frame.1 += 1;
                if index[w as usize] == UNSET {
                    index[w as usize] = next_index;
                    lowlink[w as usize] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w as usize] = true;
                    frames.push((w, offsets[w as usize]));
                } else if on_stack[w as usize] {
                    lowlink[v as usize] = lowlink[v as usize].min(index[w as usize]);
                }
            } else {
                frames.pop();
                if let Some(parent) = frames.last() {
                    let p = parent.0 as usize;
                    lowlink[p] = lowlink[p].min(lowlink[v as usize]);
                }
                if lowlink[v as usize] == index[v as usize] {
                    let component = component_sizes.len() as u32 + 1;
                    let mut size = 0u32;
                    loop {
                        let w = stack.pop().expect("tarjan stack underflow");
                        on_stack[w as usize] = false;
                        component_id[w as usize] = component;
                        size += 1;
                        if w == v {
                            break;
                        }
                    }
                    component_sizes.push(size);
                }
            }
        }
    }

    info!(
        "strongly connected components: {} over {} edge-based nodes",
        component_sizes.len(),
        num_nodes
    );

    SccResult {
        component_id,
        component_sizes,
    }
}

/// Stamp component ids and the tiny flag onto the edge-based node data.
pub fn label_components(
    node_data: &mut [EdgeBasedNodeData],
    result: &SccResult,
    small_component_size: u32,
) {
    for (node, data) in node_data.iter_mut().enumerate() {
        let component = result.component_id[node];
        data.component_id = component;
        data.is_tiny_component = result.component_sizes[component as usize - 1] < small_component_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(source: u32, target: u32) -> EdgeBasedEdge {
        EdgeBasedEdge {
            source,
            target,
            turn_id: 0,
            weight: 1,
            duration: 1,
            forward: true,
            backward: false,
        }
    }

    fn ring(start: u32, len: u32) -> Vec<EdgeBasedEdge> {
        (0..len)
            .map(|i| edge(start + i, start + (i + 1) % len))
            .collect()
    }

    #[test]
    fn two_islands_get_distinct_components() {
        // A 20-node cycle and a separate 5-node cycle.
        let mut edges = ring(0, 20);
        edges.extend(ring(20, 5));

        let result = find_components(25, &edges, &[]);
        assert_eq!(result.num_components(), 2);
        assert_eq!(result.component_id[0], result.component_id[19]);
        assert_eq!(result.component_id[20], result.component_id[24]);
        assert_ne!(result.component_id[0], result.component_id[20]);
        assert_eq!(result.size_of(0), 20);
        assert_eq!(result.size_of(20), 5);
    }

    #[test]
    fn tiny_flag_respects_the_threshold() {
        let mut edges = ring(0, 20);
        edges.extend(ring(20, 5));
        let result = find_components(25, &edges, &[]);

        let mut node_data = vec![
            crate::ebg::EdgeBasedNodeData {
                geometry_id: 0,
                annotation: 0,
                is_segregated: false,
                component_id: 0,
                is_tiny_component: false,
            };
            25
        ];
        label_components(&mut node_data, &result, 10);

        assert!(!node_data[0].is_tiny_component);
        assert!(node_data[20].is_tiny_component);
        assert!(node_data.iter().all(|d| d.component_id >= 1));
    }

    #[test]
    fn segments_couple_forward_and_reverse() {
        // One-directional edges 0 -> 1 and 2 -> 3 would split into four
        // trivial components; the segment pairings close the cycle.
        let edges = vec![edge(0, 1), edge(2, 3)];
        let segments = vec![
            EdgeBasedNodeSegment {
                forward_ebn: 0,
                reverse_ebn: 3,
                u: 0,
                v: 1,
                is_startpoint: true,
            },
            EdgeBasedNodeSegment {
                forward_ebn: 1,
                reverse_ebn: 2,
                u: 1,
                v: 2,
                is_startpoint: true,
            },
        ];

        let result = find_components(4, &edges, &segments);
        assert_eq!(result.component_id[0], result.component_id[3]);
        assert_eq!(result.component_id[1], result.component_id[2]);
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        // A long path exercises the explicit stack; recursive Tarjan
        // would blow the thread stack well before this size.
        let n = 200_000u32;
        let edges: Vec<EdgeBasedEdge> = (0..n - 1).map(|i| edge(i, i + 1)).collect();
        let result = find_components(n, &edges, &[]);
        // A simple path is all trivial components.
        assert_eq!(result.num_components(), n as usize);
    }

    #[test]
    fn isolated_node_without_edges_is_its_own_component() {
        let result = find_components(3, &[edge(0, 1)], &[]);
        assert_eq!(result.num_components(), 3);
        assert_eq!(result.size_of(2), 1);
    }
}
