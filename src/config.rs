//! This module provides functionality for loading and handling the application's configuration.
//!
//! It defines the `ScoutConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a file.
//!
//! # Examples
//!
//! Loading the configuration from a file:
//!
//! ```no_run
//! use shutterscout::config::{ScoutConfig, load_config};
//!
//! let config_file_path = "/path/to/config.yaml";
//! let config: ScoutConfig = load_config(config_file_path).unwrap();
//! println!("{:?}", config);
//! ```

use serde::{Deserialize, Serialize};
use std::{error::Error, fs};

use crate::DatasetPaths;

/// Represents the application's configuration.
///
/// This struct holds the configuration parameters needed to run the application,
/// such as the relevance-judge credentials and the dataset layout. It can be
/// constructed by loading a YAML configuration file using the `load_config`
/// function, or seeded with [`ScoutConfig::starter`] by `scout init`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct ScoutConfig {
    /// The API key used to authenticate requests to the relevance judge.
    pub api_key: String,

    /// The base URL of the OpenAI-compatible chat endpoint.
    pub api_base: String,

    /// The name of the multimodal model used for re-ranking.
    pub judge_model: String,

    // Root directory holding the dataset versions.
    pub data_dir: String,

    // Dataset version to operate on ("lite" or "full").
    pub dataset_version: String,

    // Photos embedded per index batch.
    pub batch_size: usize,

    // Concurrent downloads during corpus acquisition.
    pub download_threads: usize,

    // Candidates retrieved by cosine ranking.
    pub search_count: usize,

    // Candidates kept by the relevance judge.
    pub rerank_count: usize,
}

impl ScoutConfig {
    /// A starter configuration, written out by `scout init`.
    ///
    /// The API key is a placeholder; everything else works out of the box
    /// for the lite dataset tier.
    pub fn starter() -> Self {
        Self {
            api_key: "CHANGEME".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            judge_model: "gpt-4o-mini".to_string(),
            data_dir: "data".to_string(),
            dataset_version: "lite".to_string(),
            batch_size: 16,
            download_threads: 16,
            search_count: 10,
            rerank_count: 4,
        }
    }

    /// Resolve the on-disk layout for `version`, falling back to the
    /// configured `dataset_version` when `version` is `None`.
    pub fn dataset_paths(&self, version: Option<&str>) -> DatasetPaths {
        let version = version.unwrap_or(&self.dataset_version);
        DatasetPaths::new(&self.data_dir, version)
    }
}

/// Loads the application's configuration from a YAML file.
///
/// This function reads the file at the given path, parses it as YAML, and
/// constructs a `ScoutConfig` struct from it.
///
/// # Parameters
///
/// - `file`: The path to the YAML configuration file.
///
/// # Returns
///
/// - `Ok(ScoutConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
///
/// # Examples
///
/// ```no_run
/// use shutterscout::config::load_config;
///
/// match load_config("/path/to/config.yaml") {
///     Ok(config) => println!("{:?}", config),
///     Err(err) => eprintln!("Error loading config: {}", err),
/// }
/// ```
pub fn load_config(file: &str) -> Result<ScoutConfig, Box<dyn Error>> {
    let content = fs::read_to_string(file)?;
    let config: ScoutConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}
