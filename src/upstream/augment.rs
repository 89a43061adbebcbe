//! System-prompt augmentation
//!
//! The relay sends one system prompt per deployment, chosen at startup.
//! Mode `none` passes the configured base prompt through; mode `dataset`
//! reads the header row of a CSV file and appends a dataset description so
//! the assistant can answer questions about the file's columns.

use crate::config::AugmentConfig;
use crate::error::{RelayError, Result};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Supplies the system prompt sent with every upstream request
pub trait PromptAugmenter: Send + Sync + std::fmt::Debug {
    /// Produce the deployment's system prompt from the configured base.
    fn augment(&self, base: &str) -> String;
}

/// Passthrough augmenter, mode `none`
#[derive(Debug)]
pub struct NoAugment;

impl PromptAugmenter for NoAugment {
    fn augment(&self, base: &str) -> String {
        base.to_string()
    }
}

/// Dataset-aware augmenter, mode `dataset`
#[derive(Debug)]
pub struct DatasetAugment {
    dataset_name: String,
    columns: Vec<String>,
}

impl DatasetAugment {
    /// Load the dataset description from a CSV file's header row.
    ///
    /// Column names are split on commas with whitespace and surrounding
    /// quotes trimmed. A missing or headerless file is a configuration
    /// error: the deployment asked for a dataset it cannot describe.
    pub fn from_csv(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dataset file {}", path.display()))
            .map_err(|e| RelayError::Config(e.to_string()))?;

        let header = contents.lines().next().unwrap_or("").trim();
        if header.is_empty() {
            return Err(RelayError::Config(format!(
                "Dataset file {} has no header row",
                path.display()
            ))
            .into());
        }

        let columns: Vec<String> = header
            .split(',')
            .map(|c| c.trim().trim_matches('"').to_string())
            .filter(|c| !c.is_empty())
            .collect();

        let dataset_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            dataset_name,
            columns,
        })
    }
}

impl PromptAugmenter for DatasetAugment {
    fn augment(&self, base: &str) -> String {
        format!(
            "{base}\n\nYou have access to the dataset '{}' with columns: {}.",
            self.dataset_name,
            self.columns.join(", ")
        )
    }
}

/// Build the augmenter selected by configuration.
///
/// # Errors
///
/// Returns a configuration error for an unknown mode, and for mode
/// `dataset` without a usable dataset file.
pub fn create_augmenter(config: &AugmentConfig) -> Result<Box<dyn PromptAugmenter>> {
    match config.mode.as_str() {
        "none" => Ok(Box::new(NoAugment)),
        "dataset" => {
            let file = config.dataset_file.as_deref().ok_or_else(|| {
                RelayError::Config("augment mode 'dataset' requires a dataset file".to_string())
            })?;
            let path = PathBuf::from(&config.input_dir).join(file);
            Ok(Box::new(DatasetAugment::from_csv(&path)?))
        }
        other => Err(RelayError::Config(format!("Unknown augment mode: {other}")).into()),
    }
}
