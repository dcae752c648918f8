//! Embree 4 accelerator backend.
//!
//! Manual FFI bindings to Intel Embree 4, avoiding a bindgen dependency.
//! Only the single-ray nearest-hit and occlusion entry points are bound.

use std::ffi::c_void;

use glint_math::{Ray, Vec3};

use crate::error::{BakeError, BakeResult};
use crate::intersector::{Accelerator, GeometryId, RayHit};

// ============================================================================
// Embree FFI Bindings
// ============================================================================

#[allow(non_camel_case_types)]
type RTCDevice = *mut c_void;

#[allow(non_camel_case_types)]
type RTCScene = *mut c_void;

#[allow(non_camel_case_types)]
type RTCGeometry = *mut c_void;

// From rtcore_geometry.h
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(dead_code)]
enum RTCGeometryType {
    Triangle = 0,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(dead_code)]
enum RTCBufferType {
    Index = 0,
    Vertex = 1,
}

// From rtcore_common.h
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[allow(dead_code)]
enum RTCFormat {
    UInt3 = 0x5003,
    Float3 = 0x9003,
}

#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct RTCRay {
    org_x: f32,
    org_y: f32,
    org_z: f32,
    tnear: f32,

    dir_x: f32,
    dir_y: f32,
    dir_z: f32,
    time: f32,

    tfar: f32,
    mask: u32,
    id: u32,
    flags: u32,
}

#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct RTCHit {
    ng_x: f32,
    ng_y: f32,
    ng_z: f32,

    u: f32,
    v: f32,

    prim_id: u32,
    geom_id: u32,
    inst_id: [u32; 1],
}

#[repr(C, align(16))]
#[derive(Debug, Copy, Clone)]
struct RTCRayHit {
    ray: RTCRay,
    hit: RTCHit,
}

const RTC_INVALID_GEOMETRY_ID: u32 = 0xFFFFFFFF;

#[link(name = "embree4")]
extern "C" {
    fn rtcNewDevice(config: *const std::ffi::c_char) -> RTCDevice;
    fn rtcReleaseDevice(device: RTCDevice);
    fn rtcGetDeviceError(device: RTCDevice) -> i32;

    fn rtcNewScene(device: RTCDevice) -> RTCScene;
    fn rtcReleaseScene(scene: RTCScene);
    fn rtcCommitScene(scene: RTCScene);

    fn rtcNewGeometry(device: RTCDevice, geom_type: RTCGeometryType) -> RTCGeometry;
    fn rtcReleaseGeometry(geom: RTCGeometry);
    fn rtcCommitGeometry(geom: RTCGeometry);
    fn rtcAttachGeometryByID(scene: RTCScene, geom: RTCGeometry, geom_id: u32);

    fn rtcSetSharedGeometryBuffer(
        geom: RTCGeometry,
        buffer_type: u32,
        slot: u32,
        format: u32,
        ptr: *const c_void,
        byte_offset: usize,
        byte_stride: usize,
        item_count: usize,
    );

    fn rtcIntersect1(scene: RTCScene, rayhit: *mut RTCRayHit, args: *const c_void);
    fn rtcOccluded1(scene: RTCScene, ray: *mut RTCRay, args: *const c_void);
}

fn error_name(code: i32) -> &'static str {
    match code {
        1 => "RTC_ERROR_UNKNOWN",
        2 => "RTC_ERROR_INVALID_ARGUMENT",
        3 => "RTC_ERROR_INVALID_OPERATION",
        4 => "RTC_ERROR_OUT_OF_MEMORY",
        5 => "RTC_ERROR_UNSUPPORTED_CPU",
        6 => "RTC_ERROR_CANCELLED",
        _ => "UNKNOWN_ERROR",
    }
}

impl RTCRay {
    fn from_ray(ray: &Ray) -> Self {
        Self {
            org_x: ray.origin.x,
            org_y: ray.origin.y,
            org_z: ray.origin.z,
            tnear: ray.t_min,

            dir_x: ray.direction.x,
            dir_y: ray.direction.y,
            dir_z: ray.direction.z,
            time: 0.0,

            tfar: ray.t_max,
            mask: 0xFFFFFFFF,
            id: 0,
            flags: 0,
        }
    }
}

// ============================================================================
// EmbreeAccelerator
// ============================================================================

/// Single-level Embree scene, one triangle geometry per bake geometry.
pub struct EmbreeAccelerator {
    device: RTCDevice,
    scene: RTCScene,
    // Embree holds pointers into these until the scene is released
    vertex_data: Vec<Vec<f32>>,
    index_data: Vec<Vec<u32>>,
    triangle_count: usize,
}

impl EmbreeAccelerator {
    pub fn new() -> BakeResult<Self> {
        unsafe {
            let device = rtcNewDevice(std::ptr::null());
            if device.is_null() {
                return Err(BakeError::Device("failed to create Embree device".into()));
            }
            let err = rtcGetDeviceError(device);
            if err != 0 {
                rtcReleaseDevice(device);
                return Err(BakeError::Device(format!(
                    "Embree device error {} ({})",
                    err,
                    error_name(err)
                )));
            }

            let scene = rtcNewScene(device);
            if scene.is_null() {
                rtcReleaseDevice(device);
                return Err(BakeError::Device("failed to create Embree scene".into()));
            }

            Ok(Self {
                device,
                scene,
                vertex_data: Vec::new(),
                index_data: Vec::new(),
                triangle_count: 0,
            })
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.triangle_count
    }
}

impl Accelerator for EmbreeAccelerator {
    fn add_triangles(&mut self, positions: &[Vec3], triangles: &[[u32; 3]]) -> GeometryId {
        let id = self.vertex_data.len() as GeometryId;

        let vertices: Vec<f32> = positions.iter().flat_map(|p| p.to_array()).collect();
        let indices: Vec<u32> = bytemuck::cast_slice::<[u32; 3], u32>(triangles).to_vec();

        unsafe {
            let geom = rtcNewGeometry(self.device, RTCGeometryType::Triangle);
            if geom.is_null() {
                log::error!("Embree: failed to create geometry {}", id);
            } else {
                rtcSetSharedGeometryBuffer(
                    geom,
                    RTCBufferType::Vertex as u32,
                    0,
                    RTCFormat::Float3 as u32,
                    vertices.as_ptr() as *const c_void,
                    0,
                    12,
                    positions.len(),
                );
                rtcSetSharedGeometryBuffer(
                    geom,
                    RTCBufferType::Index as u32,
                    0,
                    RTCFormat::UInt3 as u32,
                    indices.as_ptr() as *const c_void,
                    0,
                    12,
                    triangles.len(),
                );
                rtcCommitGeometry(geom);
                rtcAttachGeometryByID(self.scene, geom, id);
                rtcReleaseGeometry(geom);

                let err = rtcGetDeviceError(self.device);
                if err != 0 {
                    log::error!(
                        "Embree error attaching geometry {}: {} ({})",
                        id,
                        err,
                        error_name(err)
                    );
                }
            }
        }

        self.triangle_count += triangles.len();
        self.vertex_data.push(vertices);
        self.index_data.push(indices);
        id
    }

    fn commit(&mut self) -> BakeResult<()> {
        unsafe {
            rtcCommitScene(self.scene);
            let err = rtcGetDeviceError(self.device);
            if err != 0 {
                return Err(BakeError::Device(format!(
                    "Embree scene commit failed: {} ({})",
                    err,
                    error_name(err)
                )));
            }
        }
        log::info!(
            "Embree scene committed: {} triangles in {} geometries",
            self.triangle_count,
            self.vertex_data.len()
        );
        Ok(())
    }

    fn intersect(&self, ray: &Ray) -> Option<RayHit> {
        let mut rayhit = RTCRayHit {
            ray: RTCRay::from_ray(ray),
            hit: RTCHit {
                ng_x: 0.0,
                ng_y: 0.0,
                ng_z: 0.0,
                u: 0.0,
                v: 0.0,
                prim_id: RTC_INVALID_GEOMETRY_ID,
                geom_id: RTC_INVALID_GEOMETRY_ID,
                inst_id: [RTC_INVALID_GEOMETRY_ID],
            },
        };

        unsafe {
            rtcIntersect1(self.scene, &mut rayhit, std::ptr::null());
        }

        if rayhit.hit.geom_id == RTC_INVALID_GEOMETRY_ID {
            return None;
        }
        Some(RayHit {
            geometry: rayhit.hit.geom_id,
            primitive: rayhit.hit.prim_id,
            u: rayhit.hit.u,
            v: rayhit.hit.v,
            distance: rayhit.ray.tfar,
        })
    }

    fn occluded(&self, ray: &Ray) -> bool {
        let mut rtc_ray = RTCRay::from_ray(ray);
        unsafe {
            rtcOccluded1(self.scene, &mut rtc_ray, std::ptr::null());
        }
        // Embree sets tfar to -inf on any hit
        rtc_ray.tfar < 0.0
    }
}

impl Drop for EmbreeAccelerator {
    fn drop(&mut self) {
        unsafe {
            rtcReleaseScene(self.scene);
            rtcReleaseDevice(self.device);
        }
    }
}

// SAFETY: Embree scenes are safe to query from many threads once committed,
// and geometry is only added through `&mut self`.
unsafe impl Send for EmbreeAccelerator {}
unsafe impl Sync for EmbreeAccelerator {}
