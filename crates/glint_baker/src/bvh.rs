//! Bounding Volume Hierarchy over world-space triangles.
//!
//! The default `Accelerator`: a binary tree built once at commit by median
//! split on the longest centroid axis, with Möller-Trumbore leaf tests.

use glint_math::{Aabb, Ray, Vec3};

use crate::error::BakeResult;
use crate::intersector::{Accelerator, GeometryId, RayHit};

/// Maximum triangles per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

/// Triangle with precomputed edges.
#[derive(Debug, Clone, Copy)]
struct BvhTriangle {
    v0: Vec3,
    edge1: Vec3,
    edge2: Vec3,
    geometry: GeometryId,
    primitive: u32,
    bbox: Aabb,
}

impl BvhTriangle {
    fn new(v0: Vec3, v1: Vec3, v2: Vec3, geometry: GeometryId, primitive: u32) -> Self {
        Self {
            v0,
            edge1: v1 - v0,
            edge2: v2 - v0,
            geometry,
            primitive,
            bbox: Aabb::from_iter_points([v0, v1, v2]),
        }
    }

    /// Möller-Trumbore, two-sided. Returns `(t, u, v)`.
    #[inline]
    fn hit(&self, ray: &Ray) -> Option<(f32, f32, f32)> {
        let h = ray.direction.cross(self.edge2);
        let a = self.edge1.dot(h);

        // Ray is parallel to triangle
        if a.abs() < 1e-8 {
            return None;
        }

        let f = 1.0 / a;
        let s = ray.origin - self.v0;
        let u = f * s.dot(h);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let q = s.cross(self.edge1);
        let v = f * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t = f * self.edge2.dot(q);
        ray.in_range(t).then_some((t, u, v))
    }
}

/// BVH node - either a branch with two children or a leaf of triangle indices.
enum BvhNode {
    Branch {
        left: Box<BvhNode>,
        right: Box<BvhNode>,
        bbox: Aabb,
    },
    Leaf {
        triangles: Vec<u32>,
        bbox: Aabb,
    },
    Empty,
}

impl BvhNode {
    fn build(triangles: &[BvhTriangle], mut indices: Vec<u32>) -> Self {
        if indices.is_empty() {
            return BvhNode::Empty;
        }

        let bounds = indices.iter().fold(Aabb::EMPTY, |acc, &i| {
            Aabb::surrounding(&acc, &triangles[i as usize].bbox)
        });

        if indices.len() <= LEAF_MAX_SIZE {
            return BvhNode::Leaf {
                triangles: indices,
                bbox: bounds,
            };
        }

        let centroid_bounds = indices.iter().fold(Aabb::EMPTY, |acc, &i| {
            acc.grow(triangles[i as usize].bbox.centroid())
        });
        let axis = centroid_bounds.longest_axis();

        indices.sort_unstable_by(|&a, &b| {
            let ca = triangles[a as usize].bbox.centroid()[axis];
            let cb = triangles[b as usize].bbox.centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let right_indices = indices.split_off(indices.len() / 2);
        let left = Self::build(triangles, indices);
        let right = Self::build(triangles, right_indices);

        BvhNode::Branch {
            left: Box::new(left),
            right: Box::new(right),
            bbox: bounds,
        }
    }

    /// Nearest hit; shrinks `ray.t_max` as closer hits are found.
    fn closest(&self, triangles: &[BvhTriangle], ray: &mut Ray, inv_dir: Vec3) -> Option<RayHit> {
        match self {
            BvhNode::Empty => None,

            BvhNode::Leaf { triangles: leaf, bbox } => {
                if !bbox.hit(ray, inv_dir) {
                    return None;
                }
                let mut best = None;
                for &i in leaf {
                    let tri = &triangles[i as usize];
                    if let Some((t, u, v)) = tri.hit(ray) {
                        ray.t_max = t;
                        best = Some(RayHit {
                            geometry: tri.geometry,
                            primitive: tri.primitive,
                            u,
                            v,
                            distance: t,
                        });
                    }
                }
                best
            }

            BvhNode::Branch { left, right, bbox } => {
                if !bbox.hit(ray, inv_dir) {
                    return None;
                }
                let hit_left = left.closest(triangles, ray, inv_dir);
                // Right is only searched up to the closest hit so far
                let hit_right = right.closest(triangles, ray, inv_dir);
                hit_right.or(hit_left)
            }
        }
    }

    fn any(&self, triangles: &[BvhTriangle], ray: &Ray, inv_dir: Vec3) -> bool {
        match self {
            BvhNode::Empty => false,
            BvhNode::Leaf { triangles: leaf, bbox } => {
                bbox.hit(ray, inv_dir)
                    && leaf.iter().any(|&i| triangles[i as usize].hit(ray).is_some())
            }
            BvhNode::Branch { left, right, bbox } => {
                bbox.hit(ray, inv_dir)
                    && (left.any(triangles, ray, inv_dir) || right.any(triangles, ray, inv_dir))
            }
        }
    }
}

/// Pure-Rust triangle BVH accelerator.
pub struct BvhAccelerator {
    triangles: Vec<BvhTriangle>,
    geometry_count: u32,
    root: BvhNode,
}

impl BvhAccelerator {
    pub fn new() -> Self {
        Self {
            triangles: Vec::new(),
            geometry_count: 0,
            root: BvhNode::Empty,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }
}

impl Default for BvhAccelerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Accelerator for BvhAccelerator {
    fn add_triangles(&mut self, positions: &[Vec3], triangles: &[[u32; 3]]) -> GeometryId {
        let id = self.geometry_count;
        self.geometry_count += 1;

        for (primitive, &[a, b, c]) in triangles.iter().enumerate() {
            let (Some(&v0), Some(&v1), Some(&v2)) = (
                positions.get(a as usize),
                positions.get(b as usize),
                positions.get(c as usize),
            ) else {
                log::warn!("Geometry {}: triangle {} has out of range indices", id, primitive);
                continue;
            };
            self.triangles
                .push(BvhTriangle::new(v0, v1, v2, id, primitive as u32));
        }
        id
    }

    fn commit(&mut self) -> BakeResult<()> {
        let indices = (0..self.triangles.len() as u32).collect();
        self.root = BvhNode::build(&self.triangles, indices);
        log::info!(
            "BVH built: {} triangles in {} geometries",
            self.triangles.len(),
            self.geometry_count
        );
        Ok(())
    }

    fn intersect(&self, ray: &Ray) -> Option<RayHit> {
        let mut segment = *ray;
        self.root
            .closest(&self.triangles, &mut segment, ray.direction.recip())
    }

    fn occluded(&self, ray: &Ray) -> bool {
        self.root.any(&self.triangles, ray, ray.direction.recip())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn committed(geometries: &[(Vec<Vec3>, Vec<[u32; 3]>)]) -> BvhAccelerator {
        let mut bvh = BvhAccelerator::new();
        for (positions, triangles) in geometries {
            bvh.add_triangles(positions, triangles);
        }
        bvh.commit().unwrap();
        bvh
    }

    fn triangle_at(z: f32) -> (Vec<Vec3>, Vec<[u32; 3]>) {
        (
            vec![
                Vec3::new(-1.0, -1.0, z),
                Vec3::new(1.0, -1.0, z),
                Vec3::new(0.0, 1.0, z),
            ],
            vec![[0, 1, 2]],
        )
    }

    #[test]
    fn test_bvh_empty() {
        let bvh = committed(&[]);
        assert!(matches!(bvh.root, BvhNode::Empty));
        assert!(bvh.intersect(&Ray::new(Vec3::ZERO, Vec3::Z)).is_none());
    }

    #[test]
    fn test_nearest_of_stacked_triangles() {
        let bvh = committed(&[triangle_at(-3.0), triangle_at(-1.0), triangle_at(-2.0)]);

        let hit = bvh.intersect(&Ray::new(Vec3::ZERO, Vec3::NEG_Z)).unwrap();
        assert_eq!(hit.geometry, 1);
        assert!((hit.distance - 1.0).abs() < 0.001);

        // Back side is hit too
        let hit = bvh
            .intersect(&Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z))
            .unwrap();
        assert_eq!(hit.geometry, 0);
    }

    #[test]
    fn test_barycentrics() {
        let bvh = committed(&[triangle_at(-1.0)]);
        // Straight at v1
        let hit = bvh
            .intersect(&Ray::new(Vec3::new(0.999, -0.999, 0.0), Vec3::NEG_Z))
            .unwrap();
        assert!(hit.u > 0.99);
        assert!(hit.v < 0.01);
    }

    #[test]
    fn test_range_limits() {
        let bvh = committed(&[triangle_at(-2.0)]);
        let short = Ray::new(Vec3::ZERO, Vec3::NEG_Z).with_range(0.001, 1.5);
        assert!(bvh.intersect(&short).is_none());
        assert!(!bvh.occluded(&short));

        let long = Ray::new(Vec3::ZERO, Vec3::NEG_Z).with_range(0.001, 2.5);
        assert!(bvh.occluded(&long));
    }

    #[test]
    fn test_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut positions = Vec::new();
        let mut triangles = Vec::new();
        for i in 0..200u32 {
            let center = Vec3::new(
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
                rng.gen_range(-10.0..10.0),
            );
            for _ in 0..3 {
                positions.push(
                    center
                        + Vec3::new(
                            rng.gen_range(-1.0..1.0),
                            rng.gen_range(-1.0..1.0),
                            rng.gen_range(-1.0..1.0),
                        ),
                );
            }
            triangles.push([i * 3, i * 3 + 1, i * 3 + 2]);
        }
        let bvh = committed(&[(positions.clone(), triangles.clone())]);
        let brute: Vec<BvhTriangle> = triangles
            .iter()
            .enumerate()
            .map(|(p, t)| {
                BvhTriangle::new(
                    positions[t[0] as usize],
                    positions[t[1] as usize],
                    positions[t[2] as usize],
                    0,
                    p as u32,
                )
            })
            .collect();

        for _ in 0..200 {
            let dir = Vec3::new(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            )
            .normalize();
            let ray = Ray::new(Vec3::ZERO, dir).with_range(0.001, 100.0);

            let expected = brute
                .iter()
                .filter_map(|t| t.hit(&ray).map(|(d, _, _)| (d, t.primitive)))
                .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
            let actual = bvh.intersect(&ray).map(|h| (h.distance, h.primitive));

            match (expected, actual) {
                (None, None) => {}
                (Some((d0, _)), Some((d1, _))) => assert!((d0 - d1).abs() < 1e-4),
                other => panic!("BVH disagrees with brute force: {:?}", other),
            }
            assert_eq!(expected.is_some(), bvh.occluded(&ray));
        }
    }
}
