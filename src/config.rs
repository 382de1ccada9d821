use std::path::PathBuf;

/// Runtime settings that are not exposed as CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that receives extracted thumbnails and attachments.
    pub output_dir: PathBuf,
    /// Fixed seed for the scramble source; time-derived when `None`.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("output"), seed: None }
    }
}

impl Config {
    /// Defaults overridden by `METASCRUB_OUTPUT_DIR` and `METASCRUB_SEED`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Ok(dir) = std::env::var("METASCRUB_OUTPUT_DIR") {
            if !dir.is_empty() {
                cfg.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(seed) = std::env::var("METASCRUB_SEED") {
            match seed.parse() {
                Ok(s) => cfg.seed = Some(s),
                Err(_) => tracing::warn!(value = %seed, "ignoring non-numeric METASCRUB_SEED"),
            }
        }
        cfg
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
