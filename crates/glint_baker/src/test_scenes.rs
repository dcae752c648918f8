//! Small scenes shared by the unit tests.

use glint_core::{BakeSettings, Mesh, Model};
use glint_math::{Mat4, Vec2, Vec3};

use crate::bake_mesh::{BakeMesh, MeshId, MeshSource, SampleLayout};
use crate::intersector::RayIntersector;
use crate::light::BakeLight;
use crate::lighting::BakeScene;

/// Unit quad on the XZ plane facing +Y, lightmap UVs spanning [0, 1].
pub fn unit_quad_model() -> Model {
    let positions = vec![
        Vec3::ZERO,
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 1.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];
    let uvs = vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::ONE, Vec2::new(0.0, 1.0)];
    let mesh = Mesh::new(positions, vec![0, 2, 1, 0, 3, 2], Some(vec![Vec3::Y; 4]))
        .with_uvs(uvs.clone())
        .with_lightmap_uvs(uvs);
    Model::new("quad", vec![mesh])
}

/// 10x10 triangle on the XZ plane facing +Y.
pub fn unit_triangle_model() -> Model {
    let mesh = Mesh::new(
        vec![
            Vec3::new(-5.0, 0.0, -5.0),
            Vec3::new(-5.0, 0.0, 5.0),
            Vec3::new(5.0, 0.0, -5.0),
        ],
        vec![0, 1, 2],
        Some(vec![Vec3::Y; 3]),
    )
    .with_lightmap_uvs(vec![Vec2::ZERO, Vec2::new(0.0, 1.0), Vec2::new(1.0, 0.0)]);
    Model::new("triangle", vec![mesh])
}

fn mesh_from(id: MeshId, model: &Model, world: Mat4, layout: Option<SampleLayout>) -> BakeMesh {
    let source = MeshSource {
        name: model.name.clone(),
        node_id: id as u32,
        static_model_id: id as u32,
        light_mask: u32::MAX,
        model,
        world,
        albedo: Vec3::splat(0.5),
        cast_shadows: true,
        layout,
        zone: None,
    };
    BakeMesh::preprocess(id, source, &BakeSettings::default()).unwrap()
}

pub fn quad_mesh(id: MeshId, world: Mat4, layout: Option<SampleLayout>) -> BakeMesh {
    mesh_from(id, &unit_quad_model(), world, layout)
}

pub fn triangle_mesh(id: MeshId, layout: Option<SampleLayout>) -> BakeMesh {
    mesh_from(id, &unit_triangle_model(), Mat4::IDENTITY, layout)
}

/// Register every mesh with a fresh intersector and commit the scene.
pub fn build_scene(
    mut meshes: Vec<BakeMesh>,
    lights: Vec<BakeLight>,
    settings: BakeSettings,
) -> BakeScene {
    let mut intersector = RayIntersector::new().unwrap();
    for mesh in &mut meshes {
        mesh.register(&mut intersector, None);
    }
    BakeScene::new(meshes, lights, intersector, settings).unwrap()
}
