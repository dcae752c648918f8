//! Ray queries against the committed bake geometry.
//!
//! `RayIntersector` owns an `Accelerator` backend plus the side tables the
//! baker needs: which bake mesh owns a geometry, and which geometries are
//! alpha-tested for shadow rays.

use std::sync::Arc;

use glint_core::{Material, Texture};
use glint_math::{barycentric_lerp, Ray, Vec2, Vec3};

use crate::bake_mesh::MeshId;
use crate::error::BakeResult;

/// Dense geometry handle, assigned in registration order.
pub type GeometryId = u32;

/// Nearest hit of a ray.
///
/// Barycentrics follow `p = (1 - u - v) * v0 + u * v1 + v * v2`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub geometry: GeometryId,
    pub primitive: u32,
    pub u: f32,
    pub v: f32,
    pub distance: f32,
}

/// Acceleration structure backend.
///
/// All geometry is added before `commit`; queries happen only afterwards and
/// may come from many threads at once.
pub trait Accelerator: Send + Sync {
    /// Register a world-space triangle mesh. Ids are dense, starting at 0.
    fn add_triangles(&mut self, positions: &[Vec3], triangles: &[[u32; 3]]) -> GeometryId;

    fn commit(&mut self) -> BakeResult<()>;

    /// Nearest hit in `[ray.t_min, ray.t_max]`.
    fn intersect(&self, ray: &Ray) -> Option<RayHit>;

    /// Any hit in `[ray.t_min, ray.t_max]`.
    fn occluded(&self, ray: &Ray) -> bool;
}

/// Cut-out test for alpha-masked occluders.
pub struct AlphaMask {
    texture: Arc<Texture>,
    /// Material-transformed diffuse UVs per triangle corner
    triangle_uvs: Vec<[Vec2; 3]>,
}

impl AlphaMask {
    /// Alpha below this lets shadow rays through.
    pub const CUTOFF: f32 = 0.5;

    pub fn new(
        texture: Arc<Texture>,
        material: &Material,
        uvs: &[Vec2],
        triangles: &[[u32; 3]],
    ) -> Self {
        let triangle_uvs = triangles
            .iter()
            .map(|tri| tri.map(|i| material.transform_uv(uvs[i as usize])))
            .collect();
        Self {
            texture,
            triangle_uvs,
        }
    }

    pub fn is_transparent(&self, primitive: u32, u: f32, v: f32) -> bool {
        match self.triangle_uvs.get(primitive as usize) {
            Some([a, b, c]) => {
                let uv = barycentric_lerp(*a, *b, *c, u, v);
                self.texture.sample_alpha(uv) < Self::CUTOFF
            }
            None => false,
        }
    }
}

pub struct RayIntersector {
    accel: Box<dyn Accelerator>,
    owners: Vec<Option<MeshId>>,
    masks: Vec<Option<Arc<AlphaMask>>>,
    committed: bool,
}

impl RayIntersector {
    /// Create an intersector on the default backend.
    ///
    /// With the `embree` feature this opens an Embree device and fails if the
    /// device cannot be created.
    pub fn new() -> BakeResult<Self> {
        #[cfg(feature = "embree")]
        let accel: Box<dyn Accelerator> = Box::new(crate::embree::EmbreeAccelerator::new()?);
        #[cfg(not(feature = "embree"))]
        let accel: Box<dyn Accelerator> = Box::new(crate::bvh::BvhAccelerator::new());

        Ok(Self::with_accelerator(accel))
    }

    pub fn with_accelerator(accel: Box<dyn Accelerator>) -> Self {
        Self {
            accel,
            owners: Vec::new(),
            masks: Vec::new(),
            committed: false,
        }
    }

    /// Register world-space geometry, owned by a bake mesh if `owner` is set.
    pub fn add_geometry(
        &mut self,
        positions: &[Vec3],
        triangles: &[[u32; 3]],
        owner: Option<MeshId>,
        mask: Option<Arc<AlphaMask>>,
    ) -> GeometryId {
        debug_assert!(!self.committed, "geometry added after commit");

        let id = self.accel.add_triangles(positions, triangles);
        let slot = id as usize;
        if self.owners.len() <= slot {
            self.owners.resize(slot + 1, None);
            self.masks.resize(slot + 1, None);
        }
        self.owners[slot] = owner;
        self.masks[slot] = mask;
        id
    }

    pub fn commit(&mut self) -> BakeResult<()> {
        self.accel.commit()?;
        self.committed = true;
        log::debug!("Ray intersector committed: {} geometries", self.owners.len());
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn geometry_count(&self) -> usize {
        self.owners.len()
    }

    /// Bake mesh owning a geometry handle.
    pub fn owner(&self, geometry: GeometryId) -> Option<MeshId> {
        self.owners.get(geometry as usize).copied().flatten()
    }

    pub fn intersect(&self, ray: &Ray) -> Option<RayHit> {
        if !self.committed {
            log::debug!("intersect() before commit");
            return None;
        }
        self.accel.intersect(ray)
    }

    /// Shadow query. Cut-out texels of alpha-masked geometry do not block.
    pub fn occluded(&self, ray: &Ray) -> bool {
        if !self.committed {
            log::debug!("occluded() before commit");
            return false;
        }
        if self.masks.iter().all(Option::is_none) {
            return self.accel.occluded(ray);
        }

        let mut segment = *ray;
        while let Some(hit) = self.accel.intersect(&segment) {
            let transparent = self
                .masks
                .get(hit.geometry as usize)
                .and_then(Option::as_ref)
                .is_some_and(|mask| mask.is_transparent(hit.primitive, hit.u, hit.v));
            if !transparent {
                return true;
            }
            // Step past the cut-out hit
            segment.t_min = hit.distance + hit.distance.abs().max(1.0) * 1e-5;
            if segment.t_min > segment.t_max {
                break;
            }
        }
        false
    }
}
