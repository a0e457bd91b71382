//! Durable JSON snapshots of the hypothesis bank.

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::bank::HypothesisBank;
use crate::error::{HypogenError, Result};

/// Default checkpoint file name template.
pub const DEFAULT_FILE_NAME_TEMPLATE: &str =
    "hypotheses_training_sample_${sample}_seed_${seed}_epoch_${epoch}.json";

/// Training position a checkpoint was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleTag {
    /// After this many training examples
    At(usize),
    /// End of an epoch
    Final,
}

impl fmt::Display for SampleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleTag::At(n) => write!(f, "{}", n),
            SampleTag::Final => f.write_str("final"),
        }
    }
}

/// Writes and reads bank checkpoints in one output directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    template: String,
}

impl CheckpointStore {
    /// Create a store with the default file name template.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            template: DEFAULT_FILE_NAME_TEMPLATE.to_string(),
        }
    }

    /// Use a custom template (`${sample}`, `${seed}` and `${epoch}` are substituted).
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the checkpoint for a position.
    pub fn path_for(&self, sample: SampleTag, seed: u64, epoch: usize) -> PathBuf {
        let name = self
            .template
            .replace("${sample}", &sample.to_string())
            .replace("${seed}", &seed.to_string())
            .replace("${epoch}", &epoch.to_string());
        self.dir.join(name)
    }

    /// Write a checkpoint. The file is replaced atomically.
    pub fn save(
        &self,
        bank: &HypothesisBank,
        sample: SampleTag,
        seed: u64,
        epoch: usize,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir).map_err(|source| HypogenError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(sample, seed, epoch);
        let tmp = path.with_extension("json.tmp");
        let json = bank.to_json_string()?;

        std::fs::write(&tmp, json).map_err(|source| HypogenError::Io {
            path: tmp.clone(),
            source,
        })?;
        std::fs::rename(&tmp, &path).map_err(|source| HypogenError::Io {
            path: path.clone(),
            source,
        })?;

        info!(
            path = %path.display(),
            sample = %sample,
            seed,
            epoch,
            bank_size = bank.len(),
            "Checkpoint written"
        );
        Ok(path)
    }

    /// Read a checkpoint.
    pub fn load(path: &Path) -> Result<HypothesisBank> {
        let content = std::fs::read_to_string(path).map_err(|source| HypogenError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(HypothesisBank::from_json_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::SummaryInformation;

    #[test]
    fn test_path_for() {
        let store = CheckpointStore::new("/out");
        assert_eq!(
            store.path_for(SampleTag::At(30), 49, 0),
            PathBuf::from("/out/hypotheses_training_sample_30_seed_49_epoch_0.json")
        );
        assert_eq!(
            store.path_for(SampleTag::Final, 49, 2),
            PathBuf::from("/out/hypotheses_training_sample_final_seed_49_epoch_2.json")
        );
    }

    #[test]
    fn test_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested"));

        let mut s = SummaryInformation::new("Long tweets win")
            .with_stats(0.1 + 0.2, 7)
            .with_correct_examples(vec![(0, "first".to_string()), (5, "second".to_string())]);
        s.update_reward(17, 0.5);
        let bank: HypothesisBank = vec![s, SummaryInformation::new("Emoji lose")]
            .into_iter()
            .collect();

        let path = store.save(&bank, SampleTag::At(17), 3, 1).unwrap();
        let loaded = CheckpointStore::load(&path).unwrap();

        assert_eq!(loaded, bank);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_custom_template() {
        let store = CheckpointStore::new("out").with_template("bank_${epoch}_${sample}.json");
        assert_eq!(
            store.path_for(SampleTag::Final, 1, 0),
            PathBuf::from("out/bank_0_final.json")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = CheckpointStore::load(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(HypogenError::Io { .. })));
    }
}
