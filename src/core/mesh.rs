use std::sync::Arc;

use crate::core::{
    aabb::Aabb,
    kd_tree::{KdHit, KdTree, KdTreeConfig},
    material::Material,
    ray::Ray,
    triangle::Triangle,
    EPSILON,
};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: glam::Vec3A,
    pub uv: glam::Vec2,
    pub normal: glam::Vec3A,
    pub tangent: glam::Vec3A,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: glam::Vec3A::ZERO,
            uv: glam::Vec2::ZERO,
            normal: glam::Vec3A::Z,
            tangent: glam::Vec3A::X,
        }
    }
}

impl Vertex {
    pub fn interpolate(v: [&Vertex; 3], barycentric: glam::Vec3A) -> Vertex {
        Vertex {
            position: v[0].position * barycentric.x
                + v[1].position * barycentric.y
                + v[2].position * barycentric.z,
            uv: v[0].uv * barycentric.x + v[1].uv * barycentric.y + v[2].uv * barycentric.z,
            normal: v[0].normal * barycentric.x
                + v[1].normal * barycentric.y
                + v[2].normal * barycentric.z,
            tangent: v[0].tangent * barycentric.x
                + v[1].tangent * barycentric.y
                + v[2].tangent * barycentric.z,
        }
    }
}

/// Triangle mesh in its local space, with a kd-tree built at construction.
pub struct Mesh {
    vertices: Vec<Vertex>,
    triangles: Vec<[u32; 3]>,
    aabb: Aabb,
    kd_tree: KdTree,
    material: Arc<Material>,
}

impl Mesh {
    pub fn new(
        vertices: Vec<Vertex>,
        indices: &[u32],
        material: Arc<Material>,
        config: KdTreeConfig,
    ) -> anyhow::Result<Self> {
        if indices.len() % 3 != 0 {
            anyhow::bail!(format!(
                "index count {} is not a multiple of 3",
                indices.len()
            ));
        }
        if let Some(bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            anyhow::bail!(format!(
                "index {} is out of range for {} vertices",
                bad,
                vertices.len()
            ));
        }

        let triangles: Vec<[u32; 3]> = indices
            .chunks_exact(3)
            .map(|tri| [tri[0], tri[1], tri[2]])
            .collect();

        let mut aabb = Aabb::empty();
        for v in &vertices {
            aabb.add_point(v.position);
        }
        let aabb = aabb.expanded(EPSILON);

        let geometry = triangles
            .iter()
            .map(|tri| {
                Triangle::new(
                    vertices[tri[0] as usize].position,
                    vertices[tri[1] as usize].position,
                    vertices[tri[2] as usize].position,
                )
            })
            .collect();
        let kd_tree = KdTree::build(geometry, aabb, config);

        let stats = kd_tree.stats();
        log::debug!(
            "kd-tree over {} triangles: {} branches, {} leaves, depth {}, largest leaf {}",
            triangles.len(),
            stats.branch_count,
            stats.leaf_count,
            stats.depth,
            stats.max_leaf_size
        );

        Ok(Self {
            vertices,
            triangles,
            aabb,
            kd_tree,
            material,
        })
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn kd_tree(&self) -> &KdTree {
        &self.kd_tree
    }

    pub fn material(&self) -> &Arc<Material> {
        &self.material
    }

    pub fn intersect(&self, ray: &Ray, visualize_depth: u32) -> Option<KdHit> {
        self.kd_tree.intersect(ray, visualize_depth)
    }

    /// Interpolated local-space vertex at a hit on triangle `index`.
    pub fn surface_at(&self, index: u32, barycentric: glam::Vec3A) -> Vertex {
        let [i0, i1, i2] = self.triangles[index as usize];
        Vertex::interpolate(
            [
                &self.vertices[i0 as usize],
                &self.vertices[i1 as usize],
                &self.vertices[i2 as usize],
            ],
            barycentric,
        )
    }
}

/// Area-weighted face normals accumulated per vertex.
pub fn compute_normals(vertices: &mut [Vertex], indices: &[u32]) {
    let mut sums = vec![glam::Vec3A::ZERO; vertices.len()];
    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let e1 = vertices[i1].position - vertices[i0].position;
        let e2 = vertices[i2].position - vertices[i0].position;
        let n = e1.cross(e2);
        sums[i0] += n;
        sums[i1] += n;
        sums[i2] += n;
    }
    for (vertex, sum) in vertices.iter_mut().zip(sums) {
        if sum.length_squared() > 0.0 {
            vertex.normal = sum.normalize();
        }
    }
}

/// Per-vertex tangents from uv gradients, orthogonalized against the normal.
pub fn compute_tangents(vertices: &mut [Vertex], indices: &[u32]) {
    let mut sums = vec![glam::Vec3A::ZERO; vertices.len()];
    let mut counts = vec![0u32; vertices.len()];

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let e1 = vertices[i1].position - vertices[i0].position;
        let e2 = vertices[i2].position - vertices[i0].position;
        let u1 = vertices[i1].uv - vertices[i0].uv;
        let u2 = vertices[i2].uv - vertices[i0].uv;

        let det = u1.x * u2.y - u1.y * u2.x;
        if det == 0.0 {
            continue;
        }
        let t = (e1 * u2.y - e2 * u1.y) / det;
        if t.length_squared() == 0.0 {
            continue;
        }
        let t = t.normalize();
        for &i in &[i0, i1, i2] {
            sums[i] += t;
            counts[i] += 1;
        }
    }

    for ((vertex, sum), count) in vertices.iter_mut().zip(sums).zip(counts) {
        let n = vertex.normal;
        let candidate = if count != 0 {
            sum / count as f32
        } else {
            fallback_tangent(n)
        };
        let ortho = candidate - n * n.dot(candidate);
        vertex.tangent = if ortho.length_squared() > 1e-12 {
            ortho.normalize()
        } else {
            fallback_tangent(n)
        };
    }
}

fn fallback_tangent(n: glam::Vec3A) -> glam::Vec3A {
    let axis = if n.x.abs() < 0.9 {
        glam::Vec3A::X
    } else {
        glam::Vec3A::Y
    };
    (axis - n * n.dot(axis)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Vertex>, Vec<u32>) {
        let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        let vertices = corners
            .iter()
            .map(|&(x, y)| Vertex {
                position: glam::Vec3A::new(x, y, 0.0),
                uv: glam::Vec2::new((x + 1.0) * 0.5, (y + 1.0) * 0.5),
                normal: glam::Vec3A::ZERO,
                tangent: glam::Vec3A::ZERO,
            })
            .collect();
        (vertices, vec![0, 1, 2, 0, 2, 3])
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let (vertices, _) = quad();
        let result = Mesh::new(
            vertices,
            &[0, 1, 7],
            Arc::new(Material::default()),
            KdTreeConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_partial_triangle() {
        let (vertices, _) = quad();
        let result = Mesh::new(
            vertices,
            &[0, 1],
            Arc::new(Material::default()),
            KdTreeConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_generated_frame() {
        let (mut vertices, indices) = quad();
        compute_normals(&mut vertices, &indices);
        compute_tangents(&mut vertices, &indices);
        for v in &vertices {
            assert!((v.normal - glam::Vec3A::Z).length() < 1e-5);
            assert!((v.tangent - glam::Vec3A::X).length() < 1e-5);
        }
    }

    #[test]
    fn test_surface_interpolation() {
        let (mut vertices, indices) = quad();
        compute_normals(&mut vertices, &indices);
        compute_tangents(&mut vertices, &indices);
        let mesh = Mesh::new(
            vertices,
            &indices,
            Arc::new(Material::default()),
            KdTreeConfig::default(),
        )
        .unwrap();

        let ray = Ray::new(glam::Vec3A::new(0.5, -0.5, 3.0), -glam::Vec3A::Z);
        let hit = mesh.intersect(&ray, 0).unwrap();
        assert!((hit.distance - 3.0).abs() < 1e-4);
        match hit.payload {
            crate::core::kd_tree::KdHitPayload::Triangle { index, barycentric } => {
                let surface = mesh.surface_at(index, barycentric);
                assert!((surface.position - glam::Vec3A::new(0.5, -0.5, 0.0)).length() < 1e-4);
                assert!((surface.uv - glam::Vec2::new(0.75, 0.25)).length() < 1e-4);
            }
            _ => panic!("expected a triangle hit"),
        }
    }
}
