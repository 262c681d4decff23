use crate::core::resample::GeometryResampler;
use crate::core::validate::ValidationParams;
use crate::types::{OcError, OcResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Matchup extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchupConfig {
    /// Overrides the product's disqualifying flags when set
    pub invalid_flag_names: Option<BTreeSet<String>>,
    /// Pure pixels required in the 3x3 window (0..=9)
    pub min_valid_neighbors: usize,
    /// Maximum coefficient of variation of the reference band
    pub cv_threshold: f64,
    /// Tie-point spacing of geometry grids
    pub resample_interval: usize,
    /// Records between result flushes (0 disables periodic flushing)
    pub flush_every: usize,
}

impl Default for MatchupConfig {
    fn default() -> Self {
        let validation = ValidationParams::default();
        Self {
            invalid_flag_names: None,
            min_valid_neighbors: validation.min_valid_neighbors,
            cv_threshold: validation.cv_threshold,
            resample_interval: 1,
            flush_every: 10,
        }
    }
}

impl MatchupConfig {
    pub fn from_json_str(json: &str) -> OcResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> OcResult<Self> {
        let path = path.as_ref();
        log::info!("Loading matchup configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> OcResult<()> {
        self.validation_params().validate()?;
        if self.resample_interval == 0 {
            return Err(OcError::Config(
                "resample_interval must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    pub fn validation_params(&self) -> ValidationParams {
        ValidationParams {
            min_valid_neighbors: self.min_valid_neighbors,
            cv_threshold: self.cv_threshold,
        }
    }

    /// Geometry resampler for an image of `lines` x `pixels`
    pub fn resampler(&self, lines: usize, pixels: usize) -> OcResult<GeometryResampler> {
        GeometryResampler::new(self.resample_interval, lines, pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = MatchupConfig::default();
        assert_eq!(config.min_valid_neighbors, 5);
        assert_eq!(config.cv_threshold, 0.15);
        assert_eq!(config.resample_interval, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json() {
        let config = MatchupConfig::from_json_str(
            r#"{"cv_threshold": 0.2, "invalid_flag_names": ["LAND", "CLDICE"]}"#,
        )
        .unwrap();
        assert_eq!(config.cv_threshold, 0.2);
        assert_eq!(config.min_valid_neighbors, 5);
        assert_eq!(config.invalid_flag_names.unwrap().len(), 2);
    }

    #[test]
    fn test_rejects_out_of_range() {
        assert!(MatchupConfig::from_json_str(r#"{"min_valid_neighbors": 12}"#).is_err());
        assert!(MatchupConfig::from_json_str(r#"{"cv_threshold": -0.1}"#).is_err());
        assert!(MatchupConfig::from_json_str(r#"{"resample_interval": 0}"#).is_err());
        assert!(matches!(
            MatchupConfig::from_json_str("{not json"),
            Err(OcError::Serialization(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"resample_interval": 10}}"#).unwrap();
        let config = MatchupConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.resample_interval, 10);

        let resampler = config.resampler(7820, 5000).unwrap();
        assert_eq!(resampler.interval, 10);
    }
}
