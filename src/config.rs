use serde::{Deserialize, Serialize};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Directory holding the raw interaction JSON documents
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Tabular feature source (CSV) keyed by track id
    #[serde(default = "default_features_path")]
    pub features_path: String,

    /// Directory every pipeline stage reads from and writes to
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Candidates fetched per HTTP request before paging
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,

    #[serde(default = "default_hidden_channels")]
    pub hidden_channels: usize,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    #[serde(default = "default_val_ratio")]
    pub val_ratio: f64,

    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,

    #[serde(default = "default_disjoint_train_ratio")]
    pub disjoint_train_ratio: f64,

    #[serde(default = "default_neg_sampling_ratio")]
    pub neg_sampling_ratio: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Knobs for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub hidden_channels: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub val_ratio: f64,
    pub test_ratio: f64,
    /// Fraction of train edges used for supervision only, never for message passing
    pub disjoint_train_ratio: f64,
    /// Sampled negatives per positive edge, applied to every partition
    pub neg_sampling_ratio: f64,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            hidden_channels: default_hidden_channels(),
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            val_ratio: default_val_ratio(),
            test_ratio: default_test_ratio(),
            disjoint_train_ratio: default_disjoint_train_ratio(),
            neg_sampling_ratio: default_neg_sampling_ratio(),
            seed: default_seed(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_features_path() -> String {
    "./data/features.csv".to_string()
}

fn default_artifacts_dir() -> String {
    "./artifacts".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_fetch_size() -> usize {
    500
}

fn default_hidden_channels() -> usize {
    64
}

fn default_epochs() -> usize {
    300
}

fn default_learning_rate() -> f32 {
    0.01
}

fn default_val_ratio() -> f64 {
    0.1
}

fn default_test_ratio() -> f64 {
    0.1
}

fn default_disjoint_train_ratio() -> f64 {
    0.3
}

fn default_neg_sampling_ratio() -> f64 {
    2.0
}

fn default_seed() -> u64 {
    42
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    /// Training section of the configuration
    pub fn training(&self) -> TrainingConfig {
        TrainingConfig {
            hidden_channels: self.hidden_channels,
            epochs: self.epochs,
            learning_rate: self.learning_rate,
            val_ratio: self.val_ratio,
            test_ratio: self.test_ratio,
            disjoint_train_ratio: self.disjoint_train_ratio,
            neg_sampling_ratio: self.neg_sampling_ratio,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_environment() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();

        assert_eq!(config.artifacts_dir, "./artifacts");
        assert_eq!(config.port, 8000);
        assert_eq!(config.fetch_size, 500);
        assert_eq!(config.training(), TrainingConfig::default());
    }

    #[test]
    fn test_overrides_are_parsed() {
        let vars = vec![
            ("EPOCHS".to_string(), "5".to_string()),
            ("LEARNING_RATE".to_string(), "0.05".to_string()),
            ("NEG_SAMPLING_RATIO".to_string(), "1.0".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();

        let training = config.training();
        assert_eq!(training.epochs, 5);
        assert!((training.learning_rate - 0.05).abs() < 1e-6);
        assert_eq!(training.neg_sampling_ratio, 1.0);
        assert_eq!(training.hidden_channels, 64);
    }
}
