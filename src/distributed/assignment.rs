use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Primitives owned by one worker, by mesh name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneInfo {
    pub work: BTreeMap<String, Vec<usize>>,
    /// Estimated bytes of geometry and textures in `work`.
    pub total_size: u64,
}

/// What one partition worker loads, and how many partitions report per ray.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerAssignment {
    pub scene_info: SceneInfo,
    #[serde(default)]
    pub scene_bucket: String,
    #[serde(default)]
    pub scene_root: String,
    pub worker_id: String,
    pub num_workers: usize,
}

impl WorkerAssignment {
    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let assignment: Self =
            serde_json::from_str(text).context("invalid worker assignment document")?;
        if assignment.num_workers == 0 {
            anyhow::bail!(format!(
                "worker '{}' - num_workers must be at least 1",
                assignment.worker_id
            ));
        }
        Ok(assignment)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .context(format!("can't read worker assignment '{}'", path.display()))?;
        Self::from_json_str(&text).context(format!("in '{}'", path.display()))
    }

    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn owns(&self, mesh_name: &str, primitive: usize) -> bool {
        self.scene_info
            .work
            .get(mesh_name)
            .map_or(false, |prims| prims.contains(&primitive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_ownership() {
        let assignment = WorkerAssignment::from_json_str(
            r#"{
                "scene_info": { "work": { "Floor": [0, 2] }, "total_size": 1024 },
                "scene_bucket": "scenes",
                "scene_root": "sponza/",
                "worker_id": "1",
                "num_workers": 2
            }"#,
        )
        .unwrap();
        assert!(assignment.owns("Floor", 2));
        assert!(!assignment.owns("Floor", 1));
        assert!(!assignment.owns("Wall", 0));
        assert_eq!(assignment.scene_info.total_size, 1024);
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let text = r#"{ "scene_info": { "work": {}, "total_size": 0 }, "worker_id": "1", "num_workers": 0 }"#;
        assert!(WorkerAssignment::from_json_str(text).is_err());
        assert!(WorkerAssignment::from_json_str("{}").is_err());
    }
}
