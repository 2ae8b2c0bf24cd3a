//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! Nodes live in a single arena in depth-first pre-order with the root at
//! index 0, so a node's left child is always the next node. Leaves reference a
//! contiguous range of the BVH's own primitive array, which is reordered into
//! leaf order during the build.
//!
//! Splits use a binned surface area heuristic: centroids are sorted into
//! [`NUM_BUCKETS`] equal-width buckets per axis and every bucket boundary is
//! scored as `SA(left) * n_left + SA(right) * n_right`.
//!
//! [`Bvh::flatten`] re-expresses the arena with entry/exit jump indices for
//! a stackless traversal loop.

use std::time::Instant;

use lumen_math::{BBox, Ray, Vec3};

use crate::primitive::{Intersection, Primitive};
use crate::stats::TraversalStats;

/// Default maximum primitives per leaf node.
pub const DEFAULT_MAX_LEAF_SIZE: usize = 4;

/// Centroid buckets per axis for the SAH sweep.
pub const NUM_BUCKETS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Internal node; `left` is always the node directly after this one.
    Interior { left: usize, right: usize },
    /// Leaf covering `primitives[start..start + count]`.
    Leaf { start: usize, count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BvhNode {
    pub bbox: BBox,
    pub kind: NodeKind,
}

impl BvhNode {
    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }
}

/// A chosen SAH split: primitives whose bucket on `axis` is below `bucket`
/// go left.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SahSplit {
    axis: usize,
    bucket: usize,
    cost: f64,
}

/// Per-primitive data needed while building.
#[derive(Debug, Clone, Copy)]
struct BuildPrim {
    bbox: BBox,
    centroid: Vec3,
}

/// Arena BVH over an owned primitive list.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    primitives: Vec<Primitive>,
}

impl Bvh {
    /// Build a BVH. An empty input yields an empty arena whose queries
    /// always miss.
    pub fn new(primitives: Vec<Primitive>, max_leaf_size: usize) -> Self {
        if primitives.is_empty() {
            return Self::default();
        }

        let start = Instant::now();
        let info: Vec<BuildPrim> = primitives
            .iter()
            .map(|p| {
                let bbox = p.bbox();
                BuildPrim {
                    bbox,
                    centroid: bbox.centroid(),
                }
            })
            .collect();

        let mut builder = Builder {
            info: &info,
            max_leaf_size: max_leaf_size.max(1),
            nodes: Vec::with_capacity(2 * primitives.len()),
            order: Vec::with_capacity(primitives.len()),
        };
        builder.build((0..primitives.len()).collect());

        let Builder { nodes, order, .. } = builder;
        let mut slots: Vec<Option<Primitive>> = primitives.into_iter().map(Some).collect();
        let primitives: Vec<Primitive> = order
            .iter()
            .filter_map(|&i| slots[i].take())
            .collect();

        let bvh = Self { nodes, primitives };
        log::info!(
            "BVH built: {} primitives, {} nodes ({} leaves, depth {}) in {:.2?}",
            bvh.primitives.len(),
            bvh.nodes.len(),
            bvh.leaf_count(),
            bvh.depth(),
            start.elapsed()
        );
        bvh
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Primitives in leaf order; `Intersection::primitive` indexes this slice.
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bounds of the whole hierarchy.
    pub fn bbox(&self) -> BBox {
        self.nodes.first().map_or(BBox::EMPTY, |n| n.bbox)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Number of levels (0 for an empty BVH).
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 1usize)];
        while let Some((index, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let NodeKind::Interior { left, right } = self.nodes[index].kind {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
        }
        max_depth
    }

    /// Box test shared by both traversal forms.
    #[inline]
    fn visit(bbox: &BBox, ray: &Ray, stats: &mut TraversalStats) -> bool {
        stats.box_tests += 1;
        match bbox.intersect(ray) {
            Some(t) => !(t.min > ray.max_t || t.max < ray.min_t),
            None => false,
        }
    }

    /// Any-hit query over `[ray.min_t, ray.max_t]`.
    pub fn has_intersection(&self, ray: &Ray, stats: &mut TraversalStats) -> bool {
        !self.nodes.is_empty() && self.any_hit(0, ray, stats)
    }

    fn any_hit(&self, index: usize, ray: &Ray, stats: &mut TraversalStats) -> bool {
        let node = &self.nodes[index];
        if !Self::visit(&node.bbox, ray, stats) {
            return false;
        }

        match node.kind {
            NodeKind::Leaf { start, count } => {
                self.primitives[start..start + count].iter().any(|p| {
                    stats.primitive_tests += 1;
                    p.has_intersection(ray)
                })
            }
            NodeKind::Interior { left, right } => {
                self.any_hit(left, ray, stats) || self.any_hit(right, ray, stats)
            }
        }
    }

    /// Closest-hit query. Narrows `ray.max_t` with every accepted hit.
    pub fn intersect(
        &self,
        ray: &mut Ray,
        isect: &mut Intersection,
        stats: &mut TraversalStats,
    ) -> bool {
        !self.nodes.is_empty() && self.closest_hit(0, ray, isect, stats)
    }

    fn closest_hit(
        &self,
        index: usize,
        ray: &mut Ray,
        isect: &mut Intersection,
        stats: &mut TraversalStats,
    ) -> bool {
        let node = &self.nodes[index];
        if !Self::visit(&node.bbox, ray, stats) {
            return false;
        }

        match node.kind {
            NodeKind::Leaf { start, count } => {
                let mut hit = false;
                for i in start..start + count {
                    stats.primitive_tests += 1;
                    if self.primitives[i].intersect(ray, isect) {
                        isect.primitive = i;
                        hit = true;
                    }
                }
                hit
            }
            NodeKind::Interior { left, right } => {
                // Both sides must run; the right may hold a closer hit.
                let hit_left = self.closest_hit(left, ray, isect, stats);
                let hit_right = self.closest_hit(right, ray, isect, stats);
                hit_left || hit_right
            }
        }
    }

    /// Stackless view of this hierarchy.
    pub fn flatten(&self) -> FlatBvh<'_> {
        let n = self.nodes.len();

        // Pre-order: a subtree ends where its right child's subtree ends.
        let mut subtree_end = vec![0usize; n];
        for i in (0..n).rev() {
            subtree_end[i] = match self.nodes[i].kind {
                NodeKind::Leaf { .. } => i + 1,
                NodeKind::Interior { right, .. } => subtree_end[right],
            };
        }

        let nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let exit = subtree_end[i] % n;
                match node.kind {
                    NodeKind::Leaf { start, count } => FlatNode {
                        bbox: node.bbox,
                        prim_start: start,
                        prim_count: count,
                        entry: exit,
                        exit,
                    },
                    NodeKind::Interior { .. } => FlatNode {
                        bbox: node.bbox,
                        prim_start: 0,
                        prim_count: 0,
                        entry: i + 1,
                        exit,
                    },
                }
            })
            .collect();

        FlatBvh {
            nodes,
            primitives: &self.primitives,
        }
    }
}

struct Builder<'a> {
    info: &'a [BuildPrim],
    max_leaf_size: usize,
    nodes: Vec<BvhNode>,
    order: Vec<usize>,
}

impl Builder<'_> {
    /// Emit the subtree for `indices` in pre-order and return its root index.
    fn build(&mut self, indices: Vec<usize>) -> usize {
        let bbox = indices.iter().fold(BBox::EMPTY, |mut acc, &i| {
            acc.expand(&self.info[i].bbox);
            acc
        });
        let node_index = self.nodes.len();

        if indices.len() <= self.max_leaf_size {
            let start = self.order.len();
            self.order.extend_from_slice(&indices);
            self.nodes.push(BvhNode {
                bbox,
                kind: NodeKind::Leaf {
                    start,
                    count: indices.len(),
                },
            });
            return node_index;
        }

        // Placeholder until the children are known.
        self.nodes.push(BvhNode {
            bbox,
            kind: NodeKind::Leaf { start: 0, count: 0 },
        });

        let (left, right) = match find_sah_split(self.info, &indices, &bbox) {
            Some(split) => indices.into_iter().partition(|&i| {
                bucket_index(self.info[i].centroid[split.axis], &bbox, split.axis) < split.bucket
            }),
            None => bisect(indices),
        };

        let left = self.build(left);
        let right = self.build(right);
        self.nodes[node_index].kind = NodeKind::Interior { left, right };
        node_index
    }
}

/// Bucket of a centroid coordinate within `bounds` on `axis`, clamped to
/// `[0, NUM_BUCKETS - 1]`. A zero-width axis puts everything in bucket 0.
fn bucket_index(c: f64, bounds: &BBox, axis: usize) -> usize {
    let min = bounds.min[axis];
    let width = bounds.max[axis] - min;
    if width <= 0.0 || width.is_nan() {
        return 0;
    }
    let b = ((c - min) / width * NUM_BUCKETS as f64).floor();
    (b.max(0.0) as usize).min(NUM_BUCKETS - 1)
}

#[cfg(test)]
fn find_sah_split_for(prims: &[Primitive]) -> Option<SahSplit> {
    let info: Vec<BuildPrim> = prims
        .iter()
        .map(|p| BuildPrim {
            bbox: p.bbox(),
            centroid: p.bbox().centroid(),
        })
        .collect();
    let bounds = info.iter().fold(BBox::EMPTY, |mut acc, p| {
        acc.expand(&p.bbox);
        acc
    });
    let indices: Vec<usize> = (0..info.len()).collect();
    find_sah_split(&info, &indices, &bounds)
}

/// Cheapest split over all axes and bucket boundaries, or `None` when every
/// candidate leaves one side empty.
fn find_sah_split(info: &[BuildPrim], indices: &[usize], bounds: &BBox) -> Option<SahSplit> {
    let mut best: Option<SahSplit> = None;

    for axis in 0..3 {
        let mut boxes = [BBox::EMPTY; NUM_BUCKETS];
        let mut counts = [0usize; NUM_BUCKETS];
        for &i in indices {
            let b = bucket_index(info[i].centroid[axis], bounds, axis);
            boxes[b].expand(&info[i].bbox);
            counts[b] += 1;
        }

        for bucket in 1..NUM_BUCKETS {
            let (mut left_box, mut right_box) = (BBox::EMPTY, BBox::EMPTY);
            let (mut left_count, mut right_count) = (0usize, 0usize);
            for b in 0..NUM_BUCKETS {
                if b < bucket {
                    left_box.expand(&boxes[b]);
                    left_count += counts[b];
                } else {
                    right_box.expand(&boxes[b]);
                    right_count += counts[b];
                }
            }
            if left_count == 0 || right_count == 0 {
                continue;
            }

            let cost = left_box.surface_area() * left_count as f64
                + right_box.surface_area() * right_count as f64;
            if best.map_or(true, |s| cost < s.cost) {
                best = Some(SahSplit { axis, bucket, cost });
            }
        }
    }

    best
}

/// First half / second half of the input order.
fn bisect(mut indices: Vec<usize>) -> (Vec<usize>, Vec<usize>) {
    let right = indices.split_off(indices.len() / 2);
    (indices, right)
}

/// Node of the flattened form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlatNode {
    pub bbox: BBox,
    /// Leaf primitive range; `prim_count` is 0 for interior nodes.
    pub prim_start: usize,
    pub prim_count: usize,
    /// Next node when the box test passes.
    pub entry: usize,
    /// Next node when the box test fails (end of this subtree).
    pub exit: usize,
}

/// Entry/exit linearization of a [`Bvh`], sharing its primitive array.
#[derive(Debug, Clone)]
pub struct FlatBvh<'a> {
    nodes: Vec<FlatNode>,
    primitives: &'a [Primitive],
}

impl<'a> FlatBvh<'a> {
    pub fn nodes(&self) -> &[FlatNode] {
        &self.nodes
    }

    pub fn primitives(&self) -> &'a [Primitive] {
        self.primitives
    }

    /// Any-hit without a call stack.
    pub fn has_intersection(&self, ray: &Ray, stats: &mut TraversalStats) -> bool {
        if self.nodes.is_empty() {
            return false;
        }

        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            if Bvh::visit(&node.bbox, ray, stats) {
                for p in &self.primitives[node.prim_start..node.prim_start + node.prim_count] {
                    stats.primitive_tests += 1;
                    if p.has_intersection(ray) {
                        return true;
                    }
                }
                index = node.entry;
            } else {
                index = node.exit;
            }
            if index == 0 {
                return false;
            }
        }
    }

    /// Closest-hit without a call stack. Narrows `ray.max_t`.
    pub fn intersect(
        &self,
        ray: &mut Ray,
        isect: &mut Intersection,
        stats: &mut TraversalStats,
    ) -> bool {
        if self.nodes.is_empty() {
            return false;
        }

        let mut hit = false;
        let mut index = 0;
        loop {
            let node = &self.nodes[index];
            if Bvh::visit(&node.bbox, ray, stats) {
                for i in node.prim_start..node.prim_start + node.prim_count {
                    stats.primitive_tests += 1;
                    if self.primitives[i].intersect(ray, isect) {
                        isect.primitive = i;
                        hit = true;
                    }
                }
                index = node.entry;
            } else {
                index = node.exit;
            }
            if index == 0 {
                return hit;
            }
        }
    }
}
