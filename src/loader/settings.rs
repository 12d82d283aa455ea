use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::core::{color::Color, kd_tree::KdTreeConfig, loader::InputParams};

/// Everything a render needs besides the scene document.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderSettings {
    pub width: u32,
    pub height: u32,
    pub sample_count: u32,
    pub bounce_count: u32,
    pub environment_factor: Color,
    pub environment_image: Option<PathBuf>,
    pub transparent_background: bool,
    /// 0 disables kd-tree visualization.
    pub visualize_kd_tree_depth: u32,
    /// 0 means one thread per logical cpu.
    pub thread_count: usize,
    pub camera_index: usize,
    pub sun_light_index: Option<usize>,
    pub kd_tree: KdTreeConfig,
    /// Snapshot the film every this many samples. 0 only saves at the end.
    pub save_interval: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            sample_count: 64,
            bounce_count: 4,
            environment_factor: Color::WHITE,
            environment_image: None,
            transparent_background: false,
            visualize_kd_tree_depth: 0,
            thread_count: 0,
            camera_index: 0,
            sun_light_index: Some(0),
            kd_tree: KdTreeConfig::default(),
            save_interval: 5,
        }
    }
}

impl RenderSettings {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .context(format!("can't read settings file '{}'", path.display()))?;
        let mut params = InputParams::from_json_str("settings", &text)?;
        params.set_base_path(path.to_path_buf());
        Self::from_params(&mut params)
    }

    pub fn from_params(params: &mut InputParams) -> anyhow::Result<Self> {
        let default = Self::default();

        let [width, height] = params.get_int2_or(
            "resolution",
            [default.width as i32, default.height as i32],
        )?;
        if width <= 0 || height <= 0 {
            anyhow::bail!(format!(
                "{} - resolution must be positive, got {}x{}",
                params.name(),
                width,
                height
            ));
        }

        let sample_count = non_negative(params, "sample_count", default.sample_count as i32)?;
        let bounce_count = non_negative(params, "bounce_count", default.bounce_count as i32)?;
        let environment_factor = params
            .get_float3_or("environment_factor", [1.0, 1.0, 1.0])?
            .into();
        let environment_image = if params.contains_key("environment_image") {
            Some(params.get_file_path("environment_image")?)
        } else {
            None
        };
        let transparent_background = params.get_bool_or("transparent_background", false)?;
        let visualize_kd_tree_depth = non_negative(params, "visualize_kd_tree_depth", 0)?;
        let thread_count = non_negative(params, "thread_count", 0)? as usize;
        let camera_index = non_negative(params, "camera_index", 0)? as usize;
        let sun_light_index = params.get_int_or("sun_light_index", 0)?;
        let sun_light_index = if sun_light_index < 0 {
            None
        } else {
            Some(sun_light_index as usize)
        };
        let use_sah = params.get_bool_or("use_sah", default.kd_tree.use_sah)?;
        let max_depth =
            non_negative(params, "kd_tree_max_depth", default.kd_tree.max_depth as i32)?;
        let save_interval = non_negative(params, "save_interval", default.save_interval as i32)?;

        params.check_unused_keys();

        Ok(Self {
            width: width as u32,
            height: height as u32,
            sample_count,
            bounce_count,
            environment_factor,
            environment_image,
            transparent_background,
            visualize_kd_tree_depth,
            thread_count,
            camera_index,
            sun_light_index,
            kd_tree: KdTreeConfig { use_sah, max_depth },
            save_interval,
        })
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn threads(&self) -> usize {
        if self.thread_count == 0 {
            num_cpus::get()
        } else {
            self.thread_count
        }
    }

    /// Whether the film should be written after finishing sample `sample` (0-based).
    pub fn should_save(&self, sample: u32) -> bool {
        let last = sample + 1 == self.sample_count;
        let periodic = self.save_interval != 0 && sample != 0 && sample % self.save_interval == 0;
        last || periodic
    }
}

fn non_negative(params: &mut InputParams, key: &str, fallback: i32) -> anyhow::Result<u32> {
    let value = params.get_int_or(key, fallback)?;
    if value < 0 {
        anyhow::bail!(format!("{} - '{}' can't be negative", params.name(), key));
    }
    Ok(value as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        let mut params = InputParams::from_json_str("settings", "{}").unwrap();
        let settings = RenderSettings::from_params(&mut params).unwrap();
        assert_eq!(settings, RenderSettings::default());
        assert_eq!(settings.width, 1920);
        assert_eq!(settings.bounce_count, 4);
        assert!(settings.kd_tree.use_sah);
        assert_eq!(settings.kd_tree.max_depth, 25);
    }

    #[test]
    fn test_overrides_and_negative_sun_index() {
        let mut params = InputParams::from_json_str(
            "settings",
            r#"{
                "resolution": [64, 32],
                "sample_count": 3,
                "environment_factor": [0.5, 0.5, 2],
                "transparent_background": true,
                "sun_light_index": -1,
                "use_sah": false
            }"#,
        )
        .unwrap();
        let settings = RenderSettings::from_params(&mut params).unwrap();
        assert_eq!((settings.width, settings.height), (64, 32));
        assert_eq!(settings.sample_count, 3);
        assert_eq!(settings.environment_factor, Color::new(0.5, 0.5, 2.0));
        assert!(settings.transparent_background);
        assert_eq!(settings.sun_light_index, None);
        assert!(!settings.kd_tree.use_sah);
        assert!((settings.aspect() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut params =
            InputParams::from_json_str("settings", r#"{ "resolution": [0, 10] }"#).unwrap();
        assert!(RenderSettings::from_params(&mut params).is_err());
        let mut params =
            InputParams::from_json_str("settings", r#"{ "bounce_count": -2 }"#).unwrap();
        assert!(RenderSettings::from_params(&mut params).is_err());
    }

    #[test]
    fn test_snapshot_schedule() {
        let settings = RenderSettings {
            sample_count: 12,
            ..Default::default()
        };
        let saved: Vec<u32> = (0..12).filter(|&s| settings.should_save(s)).collect();
        assert_eq!(saved, vec![5, 10, 11]);
    }
}
