use crate::core::{
    aabb::Aabb, color::Color, ray::Ray, rng::Rng, triangle::Triangle, EPSILON,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KdTreeConfig {
    /// Surface area heuristic when set, midpoint of the longest axis otherwise.
    pub use_sah: bool,
    pub max_depth: u32,
}

impl Default for KdTreeConfig {
    fn default() -> Self {
        Self {
            use_sah: true,
            max_depth: 25,
        }
    }
}

pub enum KdNode {
    Branch {
        /// Stable per-tree id, used to color nodes in depth visualization.
        id: u32,
        axis: usize,
        split: f32,
        left: Option<Box<KdNode>>,
        right: Option<Box<KdNode>>,
    },
    Leaf {
        triangles: Vec<Triangle>,
        /// Index of each leaf triangle in the owning mesh.
        indices: Vec<u32>,
    },
}

pub struct KdTree {
    root: KdNode,
    bounds: Aabb,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum KdHitPayload {
    Triangle { index: u32, barycentric: glam::Vec3A },
    DepthColor(Color),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct KdHit {
    pub distance: f32,
    pub payload: KdHitPayload,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct KdTreeStats {
    pub branch_count: usize,
    pub leaf_count: usize,
    pub triangle_refs: usize,
    pub max_leaf_size: usize,
    pub depth: usize,
}

impl KdTree {
    /// `bounds` must enclose every triangle; the mesh pads it by `EPSILON`.
    pub fn build(triangles: Vec<Triangle>, bounds: Aabb, config: KdTreeConfig) -> Self {
        let indices = (0..triangles.len() as u32).collect();
        let mut builder = Builder { next_id: 0 };
        let root = if config.use_sah {
            builder.build_sah(bounds, triangles, indices, config.max_depth)
        } else {
            builder.build_median(bounds, triangles, indices, config.max_depth)
        };
        Self { root, bounds }
    }

    pub fn root(&self) -> &KdNode {
        &self.root
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn stats(&self) -> KdTreeStats {
        let mut stats = KdTreeStats::default();
        let mut stack = vec![(&self.root, 1)];
        while let Some((node, depth)) = stack.pop() {
            stats.depth = stats.depth.max(depth);
            match node {
                KdNode::Branch { left, right, .. } => {
                    stats.branch_count += 1;
                    for child in [left, right].iter().filter_map(|child| child.as_deref()) {
                        stack.push((child, depth + 1));
                    }
                }
                KdNode::Leaf { triangles, .. } => {
                    stats.leaf_count += 1;
                    stats.triangle_refs += triangles.len();
                    stats.max_leaf_size = stats.max_leaf_size.max(triangles.len());
                }
            }
        }
        stats
    }

    /// Nearest hit along `ray`, or a depth-visualization color when
    /// `visualize_depth` is reached while descending branches (0 disables it).
    pub fn intersect(&self, ray: &Ray, visualize_depth: u32) -> Option<KdHit> {
        let bounds_hit = self.bounds.intersect(ray)?;
        if !bounds_hit.has_hit() {
            return None;
        }

        let origin = ray.origin;
        let direction = ray.direction();

        let mut stack: Vec<(&KdNode, f32, f32, u32)> =
            vec![(&self.root, bounds_hit.near, bounds_hit.far, 1)];

        while let Some((node, near, mut far, mut depth)) = stack.pop() {
            let mut node = Some(node);

            while let Some(KdNode::Branch {
                id,
                axis,
                split,
                left,
                right,
            }) = node
            {
                if depth == visualize_depth {
                    return Some(KdHit {
                        distance: near.max(0.0),
                        payload: KdHitPayload::DepthColor(depth_color(*id)),
                    });
                }
                depth += 1;

                // a ray parallel to the plane stays on the origin's side
                let split_dist = if direction[*axis] == 0.0 {
                    f32::INFINITY
                } else {
                    (split - origin[*axis]) / direction[*axis]
                };
                let (first, second) = if origin[*axis] < *split {
                    (left.as_deref(), right.as_deref())
                } else {
                    (right.as_deref(), left.as_deref())
                };

                if split_dist < 0.0 || split_dist > far {
                    node = first;
                } else if split_dist < near {
                    node = second;
                } else {
                    if let Some(second) = second {
                        stack.push((second, split_dist, far, depth));
                    }
                    node = first;
                    far = split_dist;
                }
            }

            let (triangles, indices) = match node {
                Some(KdNode::Leaf { triangles, indices }) => (triangles, indices),
                _ => continue,
            };

            let mut nearest: Option<(usize, f32, glam::Vec3A)> = None;
            for (i, triangle) in triangles.iter().enumerate() {
                if let Some(hit) = triangle.intersect(ray) {
                    if hit.has_hit()
                        && hit.distance <= far
                        && nearest.map_or(true, |(_, dist, _)| hit.distance < dist)
                    {
                        nearest = Some((i, hit.distance, hit.barycentric));
                    }
                }
            }

            if let Some((i, distance, barycentric)) = nearest {
                // Stack frames are ordered near to far, so the first leaf hit wins.
                if visualize_depth != 0 {
                    return None;
                }
                return Some(KdHit {
                    distance,
                    payload: KdHitPayload::Triangle {
                        index: indices[i],
                        barycentric,
                    },
                });
            }
        }

        None
    }
}

struct Builder {
    next_id: u32,
}

impl Builder {
    fn branch(
        &mut self,
        axis: usize,
        split: f32,
        left: Option<KdNode>,
        right: Option<KdNode>,
    ) -> KdNode {
        let id = self.next_id;
        self.next_id += 1;
        KdNode::Branch {
            id,
            axis,
            split,
            left: left.map(Box::new),
            right: right.map(Box::new),
        }
    }

    fn build_median(
        &mut self,
        bounds: Aabb,
        triangles: Vec<Triangle>,
        indices: Vec<u32>,
        depth: u32,
    ) -> KdNode {
        if depth == 0 {
            return leaf(triangles, indices);
        }

        let extent = bounds.extent();
        let mut axis = 0;
        for i in 1..3 {
            if extent[i] > extent[axis] {
                axis = i;
            }
        }
        let split = bounds.min[axis] + extent[axis] * 0.5;

        let (left_bounds, right_bounds) = bounds.split(axis, split);
        let SplitParts {
            left,
            right,
            left_indices,
            right_indices,
        } = split_triangles(&triangles, &indices, axis, split);
        drop(triangles);

        let left = if left.is_empty() {
            None
        } else {
            Some(self.build_median(left_bounds, left, left_indices, depth - 1))
        };
        let right = if right.is_empty() {
            None
        } else {
            Some(self.build_median(right_bounds, right, right_indices, depth - 1))
        };
        self.branch(axis, split, left, right)
    }

    fn build_sah(
        &mut self,
        bounds: Aabb,
        triangles: Vec<Triangle>,
        indices: Vec<u32>,
        depth: u32,
    ) -> KdNode {
        if depth == 0 || triangles.is_empty() {
            return leaf(triangles, indices);
        }

        let base_cost = triangles.len() as f32 * bounds.surface_area();
        let mut best_cost = base_cost;
        let mut best: Option<(usize, f32)> = None;

        let mut events: Vec<(f32, bool)> = Vec::with_capacity(triangles.len() * 2);
        for axis in 0..3 {
            events.clear();
            for triangle in &triangles {
                events.push((triangle.min_on_axis(axis), true));
                events.push((triangle.max_on_axis(axis), false));
            }
            // Starts sort before ends at equal coordinates so the last event is always an end.
            events.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

            let mut left_count = 0usize;
            let mut right_count = triangles.len();

            for i in 0..=events.len() {
                let split = if i == 0 {
                    events[0].0 - EPSILON
                } else if i == events.len() {
                    right_count = right_count.saturating_sub(1);
                    events[i - 1].0 + EPSILON
                } else {
                    let (prev, prev_is_start) = events[i - 1];
                    let (next, _) = events[i];
                    if prev_is_start {
                        left_count += 1;
                    } else {
                        right_count = right_count.saturating_sub(1);
                    }
                    if prev == next {
                        continue;
                    }
                    (prev + next) * 0.5
                };

                if split <= bounds.min[axis] {
                    continue;
                }
                if split >= bounds.max[axis] {
                    break;
                }

                let (left_bounds, right_bounds) = bounds.split(axis, split);
                let cost = left_count as f32 * left_bounds.surface_area()
                    + right_count as f32 * right_bounds.surface_area();
                if cost < best_cost {
                    best_cost = cost;
                    best = Some((axis, split));
                }
            }
        }

        let (axis, split) = match best {
            Some(best) if best_cost < base_cost => best,
            _ => return leaf(triangles, indices),
        };

        let (left_bounds, right_bounds) = bounds.split(axis, split);
        let SplitParts {
            left,
            right,
            left_indices,
            right_indices,
        } = split_triangles(&triangles, &indices, axis, split);
        drop(triangles);

        let left = if left.is_empty() {
            None
        } else {
            Some(self.build_sah(left_bounds, left, left_indices, depth - 1))
        };
        let right = if right.is_empty() {
            None
        } else {
            Some(self.build_sah(right_bounds, right, right_indices, depth - 1))
        };
        self.branch(axis, split, left, right)
    }
}

fn leaf(mut triangles: Vec<Triangle>, mut indices: Vec<u32>) -> KdNode {
    triangles.shrink_to_fit();
    indices.shrink_to_fit();
    KdNode::Leaf { triangles, indices }
}

struct SplitParts {
    left: Vec<Triangle>,
    right: Vec<Triangle>,
    left_indices: Vec<u32>,
    right_indices: Vec<u32>,
}

/// A triangle goes left if any vertex lies below `split` and right if any
/// vertex does not, so straddling triangles land on both sides.
fn split_triangles(triangles: &[Triangle], indices: &[u32], axis: usize, split: f32) -> SplitParts {
    let mut parts = SplitParts {
        left: Vec::with_capacity(triangles.len()),
        right: Vec::with_capacity(triangles.len()),
        left_indices: Vec::with_capacity(indices.len()),
        right_indices: Vec::with_capacity(indices.len()),
    };

    for (triangle, index) in triangles.iter().zip(indices) {
        let mut to_left = false;
        let mut to_right = false;
        for i in 0..3 {
            if triangle[i][axis] < split {
                to_left = true;
            } else {
                to_right = true;
            }
        }

        if to_left {
            parts.left.push(*triangle);
            parts.left_indices.push(*index);
        }
        if to_right {
            parts.right.push(*triangle);
            parts.right_indices.push(*index);
        }
    }

    parts
}

/// Saturated hue derived from a node id.
fn depth_color(id: u32) -> Color {
    let hue = Rng::with_seed(id as u64).uniform_1d();
    Color::new(
        (hue * 6.0 - 3.0).abs() - 1.0,
        2.0 - (hue * 6.0 - 2.0).abs(),
        2.0 - (hue * 6.0 - 4.0).abs(),
    )
    .saturate()
}
