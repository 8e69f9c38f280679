use crate::generator::profile::ScenarioConfig;
use anyhow::Context;
use beaconcore::FusionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub engine: FusionConfig,
    pub scenario: ScenarioConfig,
}

impl WorkflowConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading workflow config {}", path_ref.display()))?;
        let config: WorkflowConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing workflow config {}", path_ref.display()))?;
        config
            .engine
            .validate()
            .with_context(|| format!("validating engine section of {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(seed: u64, duration_ms: u64, window_size: usize) -> Self {
        let mut config = Self::default();
        config.scenario.seed = seed;
        config.scenario.duration_ms = duration_ms;
        config.engine.tracking.window_size = window_size;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn config_from_args_overrides_defaults() {
        let cfg = WorkflowConfig::from_args(11, 12_000, 16);
        assert_eq!(cfg.scenario.seed, 11);
        assert_eq!(cfg.scenario.duration_ms, 12_000);
        assert_eq!(cfg.engine.feature_dimension(), 20);
    }

    #[test]
    fn config_load_reads_partial_yaml() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(
            b"engine:\n  classifier:\n    near_dbm: -50\nscenario:\n  duration_ms: 5000\n  objects:\n    - id: tag-1\n      base_rssi_dbm: -70\n",
        )
        .unwrap();
        let path = temp.into_temp_path();
        let cfg = WorkflowConfig::load(&path).unwrap();
        assert_eq!(cfg.scenario.duration_ms, 5_000);
        assert_eq!(cfg.scenario.objects.len(), 1);
        assert_eq!(cfg.scenario.objects[0].id, "tag-1");
        assert_eq!(cfg.engine.tracking.window_size, 20);
    }

    #[test]
    fn config_load_rejects_invalid_engine() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"engine:\n  tracking:\n    window_size: 0\n")
            .unwrap();
        let path = temp.into_temp_path();
        assert!(WorkflowConfig::load(&path).is_err());
    }
}
