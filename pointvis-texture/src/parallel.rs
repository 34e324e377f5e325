//! Thread pool configuration for per-face sampling

use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};

use pointvis_core::{Error, Result};

/// Controls the parallel fan-out of the sampling loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Enable parallel processing (can be disabled for debugging)
    pub enabled: bool,
    /// Number of threads to use (None = automatic)
    pub num_threads: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            num_threads: None,
            thread_name_prefix: "pointvis-sample".to_string(),
        }
    }
}

impl SamplingConfig {
    /// Single-threaded sampling
    pub fn serial() -> Self {
        Self::default().with_enabled(false)
    }

    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Enable or disable parallel processing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build a dedicated pool from this configuration
    pub fn build_pool(&self) -> Result<ThreadPool> {
        let mut builder = ThreadPoolBuilder::new();
        if let Some(n) = self.num_threads {
            builder = builder.num_threads(n);
        }
        if !self.thread_name_prefix.is_empty() {
            let prefix = self.thread_name_prefix.clone();
            builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
        }
        builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to create thread pool: {}", e)))
    }
}
