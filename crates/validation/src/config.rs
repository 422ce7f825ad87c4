//! Validation engine configuration
//!
//! Only the overall request deadline is tunable. Code length, per-code
//! expiry and the attempt cap are protocol constants (`tontine-otp`) and
//! identical for every deployment.

use serde::{Deserialize, Serialize};

/// Configuration for the validation workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Hours until an unfinished request expires as a whole
    /// (distinct from the 15-minute per-code window)
    #[serde(default = "default_request_ttl_hours")]
    pub request_ttl_hours: i64,
}

// Default value functions for serde
fn default_request_ttl_hours() -> i64 {
    24
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            request_ttl_hours: default_request_ttl_hours(),
        }
    }
}

impl ValidationConfig {
    /// Load configuration from JSON file
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Get the overall deadline as a chrono Duration
    pub fn request_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.request_ttl_hours)
    }
}
