#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc};

use kd_path_tracer::{
    camera::PerspectiveCamera,
    core::{
        color::Color,
        entity::SceneGraph,
        kd_tree::KdTreeConfig,
        material::Material,
        mesh::{Mesh, Vertex},
        model::Model,
        scene::Scene,
        transform::Transform,
    },
    light::{EnvLight, SunLight},
};

pub const FOV: f32 = 0.8;

/// Square of half size `half` at depth `z`, facing +Z.
pub fn quad(material: Material, half: f32, z: f32) -> Mesh {
    let vertices = [(-half, -half), (half, -half), (half, half), (-half, half)]
        .iter()
        .map(|&(x, y)| Vertex {
            position: glam::Vec3A::new(x, y, z),
            ..Default::default()
        })
        .collect();
    Mesh::new(
        vertices,
        &[0, 1, 2, 0, 2, 3],
        Arc::new(material),
        KdTreeConfig::default(),
    )
    .unwrap()
}

pub fn emissive(color: Color) -> Material {
    Material {
        albedo_factor: Color::BLACK,
        metallic_factor: 0.0,
        emissive_factor: color,
        ..Default::default()
    }
}

pub fn matte(albedo: f32) -> Material {
    Material {
        albedo_factor: Color::gray(albedo),
        roughness_factor: 0.6,
        metallic_factor: 0.0,
        emissive_factor: Color::BLACK,
        ..Default::default()
    }
}

/// Camera at the origin looking down -Z. The sun, when present, shines down -Z.
pub fn scene_with(meshes: Vec<Mesh>, with_sun: bool, environment: Color) -> Scene {
    let mut graph = SceneGraph::new();
    let camera = graph.add_entity("camera", Transform::IDENTITY, None);
    graph.entity_mut(camera).camera = Some(PerspectiveCamera::new(FOV).into());
    for (index, mesh) in meshes.into_iter().enumerate() {
        let id = graph.add_entity(&format!("mesh_{}", index), Transform::IDENTITY, None);
        graph.entity_mut(id).model = Some(Model::new(vec![Arc::new(mesh)]));
    }
    let sun = if with_sun {
        let id = graph.add_entity("sun", Transform::IDENTITY, None);
        graph.entity_mut(id).sun = Some(SunLight::new(Color::gray(3.0)));
        Some(id)
    } else {
        None
    };
    Scene::new(graph, camera, sun, EnvLight::uniform(environment)).unwrap()
}

fn quad_buffer() -> Vec<u8> {
    let positions: [f32; 12] = [
        -1.0, -1.0, 0.0, 1.0, -1.0, 0.0, 1.0, 1.0, 0.0, -1.0, 1.0, 0.0,
    ];
    let indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
    let mut bytes = Vec::with_capacity(60);
    for value in positions.iter() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    for value in indices.iter() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Two copies of a unit quad: mesh "Near" (red glow) scaled to half size at z = -2
/// and mesh "Far" (green glow) scaled by 4 at z = -4. The camera sits at the origin.
fn gltf_json(buffer_uri: Option<&str>) -> serde_json::Value {
    let mut buffer = serde_json::json!({ "byteLength": 60 });
    if let Some(uri) = buffer_uri {
        buffer["uri"] = serde_json::Value::from(uri);
    }
    serde_json::json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0, 1, 2] }],
        "nodes": [
            { "name": "Camera", "camera": 0 },
            { "name": "NearNode", "mesh": 0, "translation": [0.0, 0.0, -2.0], "scale": [0.5, 0.5, 1.0] },
            { "name": "FarNode", "mesh": 1, "translation": [0.0, 0.0, -4.0], "scale": [4.0, 4.0, 1.0] }
        ],
        "cameras": [{ "type": "perspective", "perspective": { "yfov": FOV, "znear": 0.1 } }],
        "meshes": [
            { "name": "Near", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] },
            { "name": "Far", "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 1 }] }
        ],
        "materials": [
            {
                "name": "near",
                "pbrMetallicRoughness": { "baseColorFactor": [0.0, 0.0, 0.0, 1.0], "metallicFactor": 0.0 },
                "emissiveFactor": [0.1, 0.0, 0.0]
            },
            {
                "name": "far",
                "pbrMetallicRoughness": { "baseColorFactor": [0.0, 0.0, 0.0, 1.0], "metallicFactor": 0.0 },
                "emissiveFactor": [0.0, 0.1, 0.0]
            }
        ],
        "buffers": [buffer],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 48, "target": 34962 },
            { "buffer": 0, "byteOffset": 48, "byteLength": 12, "target": 34963 }
        ],
        "accessors": [
            {
                "bufferView": 0,
                "componentType": 5126,
                "count": 4,
                "type": "VEC3",
                "min": [-1.0, -1.0, 0.0],
                "max": [1.0, 1.0, 0.0]
            },
            { "bufferView": 1, "componentType": 5123, "count": 6, "type": "SCALAR" }
        ]
    })
}

/// Writes `scene.gltf` and its `quad.bin` into `dir`.
pub fn write_gltf(dir: &std::path::Path) -> PathBuf {
    std::fs::write(dir.join("quad.bin"), quad_buffer()).unwrap();
    let path = dir.join("scene.gltf");
    std::fs::write(&path, gltf_json(Some("quad.bin")).to_string()).unwrap();
    path
}

/// The same scene as a self-contained binary glTF.
pub fn glb_bytes() -> Vec<u8> {
    let mut json = gltf_json(None).to_string().into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let bin = quad_buffer();

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut bytes = Vec::with_capacity(total);
    bytes.extend_from_slice(b"glTF");
    bytes.extend_from_slice(&2u32.to_le_bytes());
    bytes.extend_from_slice(&(total as u32).to_le_bytes());
    bytes.extend_from_slice(&(json.len() as u32).to_le_bytes());
    bytes.extend_from_slice(b"JSON");
    bytes.extend_from_slice(&json);
    bytes.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    bytes.extend_from_slice(b"BIN\0");
    bytes.extend_from_slice(&bin);
    bytes
}
