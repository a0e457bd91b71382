//! A loaded task: data, prompts and label extraction bundled together.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::TaskConfig;
use crate::dataset::Dataset;
use crate::error::{Result, TaskError};
use crate::extract::LabelExtractor;
use crate::prompt::PromptBuilder;

/// Train, test and validation splits.
#[derive(Debug, Clone, Default)]
pub struct Splits {
    pub train: Dataset,
    pub test: Dataset,
    pub val: Dataset,
}

/// A hypothesis discovery task.
#[derive(Debug, Clone)]
pub struct Task {
    config: TaskConfig,
    base_dir: PathBuf,
    extractor: LabelExtractor,
    prompts: PromptBuilder,
}

impl Task {
    /// Load a task from its YAML file. Data paths resolve against the file's directory.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| TaskError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = TaskConfig::from_yaml(&content)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_config(config, base_dir)
    }

    /// Build a task from an already parsed config.
    pub fn from_config(config: TaskConfig, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let extractor = LabelExtractor::from_name(&config.extract_label)?;
        let prompts = PromptBuilder::new(config.prompt_templates.clone())?;
        Ok(Self {
            config,
            base_dir: base_dir.into(),
            extractor,
            prompts,
        })
    }

    /// Task name.
    pub fn name(&self) -> &str {
        &self.config.task_name
    }

    /// Task configuration.
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Label extractor.
    pub fn extractor(&self) -> &LabelExtractor {
        &self.extractor
    }

    /// Prompt builder.
    pub fn prompts(&self) -> &PromptBuilder {
        &self.prompts
    }

    /// Load and subsample the splits.
    ///
    /// Each split is shuffled with an RNG seeded from `seed` and truncated,
    /// so the same seed always yields the same examples. A split without a
    /// configured path is empty.
    pub fn get_data(
        &self,
        num_train: usize,
        num_test: usize,
        num_val: usize,
        seed: u64,
    ) -> Result<Splits> {
        let train = self
            .load(Some(&self.config.train_data_path))?
            .sample(num_train, &mut StdRng::seed_from_u64(seed));
        let test = self
            .load(self.config.test_data_path.as_deref())?
            .sample(num_test, &mut StdRng::seed_from_u64(seed));
        let val = self
            .load(self.config.val_data_path.as_deref())?
            .sample(num_val, &mut StdRng::seed_from_u64(seed));

        info!(
            task = %self.config.task_name,
            train = train.len(),
            test = test.len(),
            val = val.len(),
            seed,
            "Loaded task data"
        );

        Ok(Splits { train, test, val })
    }

    fn load(&self, path: Option<&Path>) -> Result<Dataset> {
        match path {
            Some(path) => Dataset::load_json(&self.base_dir.join(path), &self.config.label_name),
            None => Ok(Dataset::default()),
        }
    }
}
