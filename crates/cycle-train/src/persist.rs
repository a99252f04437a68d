//! End-of-run persistence of parameters and loss history.

use std::path::{Path, PathBuf};

use cycle_core::CycleError;
use serde::Serialize;

use crate::metrics::TrainHistory;
use crate::models::CycleModels;
use crate::plot::plot_history;

/// Where a run's final (or postmortem) state goes.
pub trait Persistence {
    /// Saves the four parameter sets and the history under `tag`
    /// (`final` or `postmortem`).
    fn persist(
        &mut self,
        tag: &str,
        models: &CycleModels,
        history: &TrainHistory,
    ) -> Result<(), CycleError>;
}

/// Writes `<root>/<tag>/{generatorA,generatorB,discriminatorA,discriminatorB}_param.safetensors`,
/// `train_hist.json`, the `train_hist.png` loss plot and, when set,
/// `config.json`.
///
/// # Example
///
/// ```no_run
/// use cycle_train::SafetensorsStore;
///
/// let store = SafetensorsStore::new("results/horse2zebra")
///     .with_manifest(&serde_json::json!({ "dataset": "horse2zebra" }))
///     .unwrap();
/// assert!(store.tag_dir("final").ends_with("final"));
/// ```
#[derive(Debug, Clone)]
pub struct SafetensorsStore {
    root: PathBuf,
    manifest: Option<serde_json::Value>,
}

impl SafetensorsStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: None,
        }
    }

    /// Records a run manifest, written as `config.json` next to the weights.
    ///
    /// # Errors
    ///
    /// Returns [`CycleError::Data`] if `manifest` cannot be serialized.
    pub fn with_manifest<T: Serialize>(mut self, manifest: &T) -> Result<Self, CycleError> {
        let value = serde_json::to_value(manifest).map_err(|e| CycleError::Data {
            message: format!("serialize run manifest: {e}"),
        })?;
        self.manifest = Some(value);
        Ok(self)
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory written for `tag`.
    pub fn tag_dir(&self, tag: &str) -> PathBuf {
        self.root.join(tag)
    }
}

impl Persistence for SafetensorsStore {
    fn persist(
        &mut self,
        tag: &str,
        models: &CycleModels,
        history: &TrainHistory,
    ) -> Result<(), CycleError> {
        let dir = self.tag_dir(tag);
        std::fs::create_dir_all(&dir).map_err(|e| CycleError::io(&dir, e))?;

        for (stem, model) in models.iter() {
            let path = dir.join(format!("{stem}.safetensors"));
            model
                .var_map()
                .save(&path)
                .map_err(|e| CycleError::io(&path, e))?;
        }

        let hist_path = dir.join("train_hist.json");
        std::fs::write(&hist_path, history.to_json()?)
            .map_err(|e| CycleError::io(&hist_path, e))?;
        plot_history(history, &dir.join("train_hist.png"))?;

        if let Some(manifest) = &self.manifest {
            let config_path = dir.join("config.json");
            let text = serde_json::to_string_pretty(manifest).map_err(|e| CycleError::Data {
                message: format!("serialize run manifest: {e}"),
            })?;
            std::fs::write(&config_path, text).map_err(|e| CycleError::io(&config_path, e))?;
        }

        tracing::info!(tag, dir = %dir.display(), epochs = history.epochs_completed(), "saved run state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use cycle_nets::NetConfig;

    #[test]
    fn writes_all_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let config = NetConfig {
            ngf: 2,
            ndf: 2,
            n_blocks: 1,
            n_layers_d: 1,
            ..NetConfig::default()
        };
        let models = CycleModels::build(&config, 16, 0, &Device::Cpu).unwrap();
        let mut store = SafetensorsStore::new(tmp.path())
            .with_manifest(&config)
            .unwrap();
        store.persist("final", &models, &TrainHistory::new()).unwrap();

        let dir = tmp.path().join("final");
        for name in [
            "generatorA_param.safetensors",
            "generatorB_param.safetensors",
            "discriminatorA_param.safetensors",
            "discriminatorB_param.safetensors",
            "train_hist.json",
            "train_hist.png",
            "config.json",
        ] {
            assert!(dir.join(name).is_file(), "missing {name}");
        }

        let saved = candle_core::safetensors::load(dir.join("generatorA_param.safetensors"), &Device::Cpu)
            .unwrap();
        assert_eq!(saved.len(), models.g_a.vars().len());

        let back: NetConfig =
            serde_json::from_str(&std::fs::read_to_string(dir.join("config.json")).unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn without_manifest_skips_config() {
        let tmp = tempfile::tempdir().unwrap();
        let config = NetConfig {
            ngf: 2,
            ndf: 2,
            n_blocks: 1,
            n_layers_d: 1,
            ..NetConfig::default()
        };
        let models = CycleModels::build(&config, 16, 0, &Device::Cpu).unwrap();
        let mut store = SafetensorsStore::new(tmp.path());
        store.persist("postmortem", &models, &TrainHistory::new()).unwrap();
        assert!(!tmp.path().join("postmortem/config.json").exists());
        assert!(tmp.path().join("postmortem/train_hist.json").is_file());
        assert!(tmp.path().join("postmortem/train_hist.png").is_file());
    }
}
