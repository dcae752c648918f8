//! Binary bake results: atlas names plus one record per placed static model,
//! and a sidecar of baked colors for vertex-target models.

use std::path::Path;

use glint_core::Scene;
use glint_math::Vec4;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BakeResult;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Bake record refers to missing node {node_id}")]
    NodeNotFound { node_id: u32 },

    #[error("Node {node_id} has no static model {static_model_id}")]
    ModelMismatch { node_id: u32, static_model_id: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BakeRecord {
    pub node_id: u32,
    pub static_model_id: u32,
    pub light_mask: u32,
    pub lightmap_index: u32,
    pub scale_offset: [f32; 4],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BakeData {
    /// Atlas file names, in atlas index order
    pub lightmaps: Vec<String>,
    pub records: Vec<BakeRecord>,
}

impl BakeData {
    pub fn to_bytes(&self) -> BakeResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> BakeResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> BakeResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> BakeResult<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Write lightmap indices and UV transforms back onto the scene.
    ///
    /// Returns the number of static models updated. Records are checked
    /// before anything is written, so a failed apply leaves the scene as it was.
    pub fn apply(&self, scene: &mut Scene) -> Result<usize, ApplyError> {
        for record in &self.records {
            let node = scene.node(record.node_id).ok_or(ApplyError::NodeNotFound {
                node_id: record.node_id,
            })?;
            let matches = node
                .static_model
                .as_ref()
                .is_some_and(|sm| sm.id == record.static_model_id);
            if !matches {
                return Err(ApplyError::ModelMismatch {
                    node_id: record.node_id,
                    static_model_id: record.static_model_id,
                });
            }
        }

        for record in &self.records {
            if let Some(sm) = scene
                .node_mut(record.node_id)
                .and_then(|node| node.static_model.as_mut())
            {
                sm.lightmap_index = Some(record.lightmap_index);
                sm.lightmap_scale_offset = Vec4::from_array(record.scale_offset);
                sm.light_mask = record.light_mask;
            }
        }
        scene.lightmaps = self.lightmaps.clone();

        log::info!("Applied {} bake records", self.records.len());
        Ok(self.records.len())
    }
}

/// Baked colors of one vertex-target static model, in prepared vertex order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexColorRecord {
    pub node_id: u32,
    pub static_model_id: u32,
    pub colors: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VertexColorData {
    pub records: Vec<VertexColorRecord>,
}

impl VertexColorData {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn to_bytes(&self) -> BakeResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> BakeResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> BakeResult<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> BakeResult<Self> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_scenes::unit_quad_model;
    use glint_core::{Node, StaticModel};
    use std::sync::Arc;

    fn sample_data() -> BakeData {
        BakeData {
            lightmaps: vec!["Lightmap0.png".to_string(), "Lightmap1.png".to_string()],
            records: vec![
                BakeRecord {
                    node_id: 1,
                    static_model_id: 10,
                    light_mask: 0xFF,
                    lightmap_index: 1,
                    scale_offset: [0.5, 0.25, 0.125, 0.0625],
                },
                BakeRecord {
                    node_id: 2,
                    static_model_id: 20,
                    light_mask: u32::MAX,
                    lightmap_index: 0,
                    scale_offset: [1.0, 1.0, 0.0, 0.0],
                },
            ],
        }
    }

    fn sample_scene() -> Scene {
        let model = Arc::new(unit_quad_model());
        let mut scene = Scene::new("apply");
        scene.add_node(Node::new(1, "a").with_static_model(StaticModel::new(10, model.clone())));
        scene.add_node(Node::new(2, "b").with_static_model(StaticModel::new(20, model)));
        scene.add_node(Node::new(3, "empty"));
        scene
    }

    #[test]
    fn test_bincode_round_trip() {
        let data = sample_data();
        let bytes = data.to_bytes().unwrap();
        assert_eq!(BakeData::from_bytes(&bytes).unwrap(), data);
    }

    #[test]
    fn test_truncated_bytes_fail() {
        let bytes = sample_data().to_bytes().unwrap();
        assert!(BakeData::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!("glint_bake_data_{}.bin", std::process::id()));
        let data = sample_data();
        data.write(&path).unwrap();
        let read = BakeData::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(read, data);
    }

    #[test]
    fn test_apply_updates_static_models() {
        let mut scene = sample_scene();
        let applied = sample_data().apply(&mut scene).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(scene.lightmaps.len(), 2);

        let a = scene.node(1).unwrap().static_model.as_ref().unwrap();
        assert_eq!(a.lightmap_index, Some(1));
        assert_eq!(a.lightmap_scale_offset, Vec4::new(0.5, 0.25, 0.125, 0.0625));
        assert_eq!(a.light_mask, 0xFF);
    }

    #[test]
    fn test_apply_missing_node() {
        let mut scene = sample_scene();
        let mut data = sample_data();
        data.records[1].node_id = 99;
        assert_eq!(
            data.apply(&mut scene),
            Err(ApplyError::NodeNotFound { node_id: 99 })
        );
        // Nothing written
        assert!(scene.lightmaps.is_empty());
        assert_eq!(scene.node(1).unwrap().static_model.as_ref().unwrap().lightmap_index, None);
    }

    #[test]
    fn test_apply_model_mismatch() {
        let mut scene = sample_scene();
        let mut data = sample_data();
        data.records[0].static_model_id = 11;
        assert_eq!(
            data.apply(&mut scene),
            Err(ApplyError::ModelMismatch {
                node_id: 1,
                static_model_id: 11
            })
        );

        // Node without a static model
        let mut data = sample_data();
        data.records[0].node_id = 3;
        assert!(matches!(
            data.apply(&mut scene),
            Err(ApplyError::ModelMismatch { node_id: 3, .. })
        ));
    }

    #[test]
    fn test_vertex_color_file_round_trip() {
        let data = VertexColorData {
            records: vec![VertexColorRecord {
                node_id: 4,
                static_model_id: 40,
                colors: vec![[1.0, 0.5, 0.25], [0.0, 0.0, 0.0]],
            }],
        };
        let path = std::env::temp_dir().join(format!("glint_vertex_colors_{}.bin", std::process::id()));
        data.write(&path).unwrap();
        let read = VertexColorData::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(read, data);
        assert!(VertexColorData::default().is_empty());
    }
}
