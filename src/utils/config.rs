use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::algorithms::global_optimizer::StageTwoConfig;
use crate::algorithms::local_refinement::StageOneConfig;
use crate::core::{Anchor, Coordinates};
use crate::processing::aggregation::RangeFilterConfig;
use crate::validation::error::ConfigError;

/// Solver parameters; every field falls back to its default when omitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Local trilateration refinement
    pub stage_one: StageOneConfig,
    /// Global simplex refinement
    pub stage_two: StageTwoConfig,
    /// Reduction of repeated readings
    pub range_filter: RangeFilterConfig,
    /// Fill a missing range from the reverse direction before solving
    pub symmetrize_ranges: bool,
}

/// Individual anchor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorConfig {
    /// Unique anchor identifier, also the prefix of its ranging record file
    pub id: String,
    /// Starting position for the solver (meters)
    pub initial_guess: Coordinates,
    /// Surveyed position, used only for error reporting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<Coordinates>,
}

/// One ranging network and its anchors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub network_id: String,
    pub anchors: Vec<AnchorConfig>,
}

/// Complete calibration run configuration as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub networks: Vec<NetworkConfig>,
    /// Ids of anchors whose positions are trusted
    #[serde(default)]
    pub fixed_anchors: Vec<String>,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// Configuration validation result
#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn into_result(mut self) -> Result<Vec<String>, ConfigError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(self.errors.remove(0))
        }
    }
}

/// Loads, validates and exposes a calibration configuration
#[derive(Debug, Default)]
pub struct ConfigurationManager {
    config: CalibrationConfig,
    config_file_path: Option<PathBuf>,
}

impl ConfigurationManager {
    /// Create a configuration manager with an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration manager and load from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut manager = Self::new();
        manager.load_from_file(path)?;
        Ok(manager)
    }

    /// Parse and validate an in-memory JSON document
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: CalibrationConfig = serde_json::from_str(content)?;
        let mut manager = Self::new();
        manager.set_config(config)?;
        Ok(manager)
    }

    /// Load configuration from JSON file
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: CalibrationConfig = serde_json::from_str(&content)?;

        self.set_config(config)?;
        self.config_file_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Save configuration to JSON file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(&self.config)?;
        fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        self.config_file_path = Some(path.to_path_buf());
        Ok(())
    }

    /// Replace the configuration after validating it
    pub fn set_config(&mut self, config: CalibrationConfig) -> Result<(), ConfigError> {
        let warnings = Self::validate_config(&config).into_result()?;
        for warning in warnings {
            warn!("{}", warning);
        }
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn solver_config(&self) -> &SolverConfig {
        &self.config.solver
    }

    /// Path the configuration was last loaded from or saved to
    pub fn config_file_path(&self) -> Option<&Path> {
        self.config_file_path.as_deref()
    }

    /// Anchor ids across all networks, in document order
    pub fn anchor_ids(&self) -> Vec<String> {
        self.anchor_configs().map(|a| a.id.clone()).collect()
    }

    /// Solver anchors across all networks, in document order, with the
    /// fixed flag taken from `fixed_anchors`
    pub fn anchors(&self) -> Vec<Anchor> {
        let fixed: HashSet<&str> = self.config.fixed_anchors.iter().map(String::as_str).collect();
        self.anchor_configs()
            .map(|a| Anchor {
                id: a.id.clone(),
                fixed: fixed.contains(a.id.as_str()),
                initial_guess: a.initial_guess,
                ground_truth: a.ground_truth,
            })
            .collect()
    }

    fn anchor_configs(&self) -> impl Iterator<Item = &AnchorConfig> {
        self.config.networks.iter().flat_map(|n| n.anchors.iter())
    }

    /// Validate a configuration without applying it
    pub fn validate_config(config: &CalibrationConfig) -> ValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        let anchors: Vec<&AnchorConfig> = config.networks.iter().flat_map(|n| n.anchors.iter()).collect();
        if anchors.is_empty() {
            errors.push(ConfigError::MissingParameter {
                parameter: "networks[].anchors".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for anchor in &anchors {
            if anchor.id.trim().is_empty() {
                errors.push(ConfigError::InvalidParameter {
                    parameter: "anchors[].id".to_string(),
                    value: format!("{:?}", anchor.id),
                    reason: "Anchor ID cannot be empty".to_string(),
                });
            } else if !seen.insert(anchor.id.as_str()) {
                errors.push(ConfigError::DuplicateAnchor(anchor.id.clone()));
            }

            let finite = |p: &Coordinates| p.iter().all(|c| c.is_finite());
            if !finite(&anchor.initial_guess) {
                errors.push(ConfigError::InvalidParameter {
                    parameter: format!("{}.initial_guess", anchor.id),
                    value: format!("{:?}", anchor.initial_guess.as_slice()),
                    reason: "Coordinates must be finite".to_string(),
                });
            }
            if anchor.ground_truth.as_ref().is_some_and(|p| !finite(p)) {
                errors.push(ConfigError::InvalidParameter {
                    parameter: format!("{}.ground_truth", anchor.id),
                    value: "non-finite".to_string(),
                    reason: "Coordinates must be finite".to_string(),
                });
            }
        }

        let mut fixed_count = 0;
        for id in &config.fixed_anchors {
            if seen.contains(id.as_str()) {
                fixed_count += 1;
            } else {
                warnings.push(format!("Fixed anchor '{}' is not configured and will be ignored", id));
            }
        }
        if !anchors.is_empty() && fixed_count == 0 {
            warnings.push("No fixed anchors: positions are only determined up to a rigid motion".to_string());
        }

        Self::validate_solver_config(&config.solver, &mut errors);

        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_solver_config(solver: &SolverConfig, errors: &mut Vec<ConfigError>) {
        let mut positive = |parameter: &str, value: f64| {
            if !(value > 0.0 && value.is_finite()) {
                errors.push(ConfigError::InvalidParameter {
                    parameter: parameter.to_string(),
                    value: value.to_string(),
                    reason: "Must be a positive number".to_string(),
                });
            }
        };
        positive("solver.stage_one.tolerance", solver.stage_one.tolerance);
        positive("solver.stage_two.x_tolerance", solver.stage_two.simplex.x_tolerance);
        positive("solver.stage_two.f_tolerance", solver.stage_two.simplex.f_tolerance);
        positive("solver.stage_two.initial_step", solver.stage_two.simplex.initial_step);
        positive("solver.stage_two.zero_step", solver.stage_two.simplex.zero_step);

        if solver.stage_one.max_iterations == 0 {
            errors.push(ConfigError::InvalidParameter {
                parameter: "solver.stage_one.max_iterations".to_string(),
                value: "0".to_string(),
                reason: "At least one refinement iteration is required".to_string(),
            });
        }

        let filter = &solver.range_filter;
        for (parameter, value) in [
            ("solver.range_filter.lower_percentile", filter.lower_percentile),
            ("solver.range_filter.upper_percentile", filter.upper_percentile),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ConfigError::InvalidParameter {
                    parameter: parameter.to_string(),
                    value: value.to_string(),
                    reason: "Percentile must be a fraction between 0 and 1".to_string(),
                });
            }
        }
        if filter.lower_percentile > filter.upper_percentile {
            errors.push(ConfigError::InvalidParameter {
                parameter: "solver.range_filter".to_string(),
                value: format!("{}..{}", filter.lower_percentile, filter.upper_percentile),
                reason: "Lower percentile exceeds upper percentile".to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"{
        "networks": [
            {
                "network_id": "0x1c2d",
                "anchors": [
                    { "id": "DW0A01", "initial_guess": [0, 0, 0], "ground_truth": [0, 0, 0] },
                    { "id": "DW0A02", "initial_guess": [0, 2, 0] },
                    { "id": "DW0A03", "initial_guess": [2, 2, 0] }
                ]
            },
            {
                "network_id": "0x2e3f",
                "anchors": [
                    { "id": "DW0B01", "initial_guess": [2.0, 0.1, 0.0] },
                    { "id": "DW0B02", "initial_guess": [1.2, 0.8, 0.1], "ground_truth": [1, 1, 0] }
                ]
            }
        ],
        "fixed_anchors": ["DW0A01", "DW0A02", "DW0A03", "DW0B01", "DWFFFF"],
        "solver": { "stage_one": { "max_iterations": 50 }, "symmetrize_ranges": true }
    }"#;

    #[test]
    fn test_default_solver_config() {
        let config = SolverConfig::default();
        assert_eq!(config.stage_one.max_iterations, 100);
        assert_eq!(config.stage_one.tolerance, 1e-6);
        assert!(config.stage_two.enabled);
        assert!(config.range_filter.discard_first);
        assert_eq!(config.range_filter.lower_percentile, 0.05);
        assert_eq!(config.range_filter.upper_percentile, 0.95);
        assert!(!config.symmetrize_ranges);
    }

    #[test]
    fn test_anchors_flattened_in_document_order() {
        let manager = ConfigurationManager::from_json_str(SAMPLE_CONFIG).unwrap();
        let anchors = manager.anchors();

        assert_eq!(manager.anchor_ids(), vec!["DW0A01", "DW0A02", "DW0A03", "DW0B01", "DW0B02"]);
        assert_eq!(anchors.len(), 5);
        assert!(anchors[..4].iter().all(|a| a.fixed));
        assert!(!anchors[4].fixed);
        assert_eq!(anchors[4].initial_guess, Coordinates::new(1.2, 0.8, 0.1));
        assert_eq!(anchors[4].ground_truth, Some(Coordinates::new(1.0, 1.0, 0.0)));
        assert_eq!(anchors[1].ground_truth, None);
    }

    #[test]
    fn test_partial_solver_section_uses_defaults() {
        let manager = ConfigurationManager::from_json_str(SAMPLE_CONFIG).unwrap();
        let solver = manager.solver_config();
        assert_eq!(solver.stage_one.max_iterations, 50);
        assert_eq!(solver.stage_one.tolerance, 1e-6);
        assert!(solver.symmetrize_ranges);
        assert_eq!(solver.stage_two, StageTwoConfig::default());
    }

    #[test]
    fn test_unknown_fixed_anchor_is_a_warning() {
        let config: CalibrationConfig = serde_json::from_str(SAMPLE_CONFIG).unwrap();
        let result = ConfigurationManager::validate_config(&config);
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("DWFFFF")));
    }

    #[test]
    fn test_duplicate_anchor_rejected() {
        let json = r#"{
            "networks": [
                { "anchors": [ { "id": "A", "initial_guess": [0, 0, 0] } ] },
                { "anchors": [ { "id": "A", "initial_guess": [1, 0, 0] } ] }
            ]
        }"#;
        let result = ConfigurationManager::from_json_str(json);
        assert!(matches!(result, Err(ConfigError::DuplicateAnchor(id)) if id == "A"));
    }

    #[test]
    fn test_invalid_solver_parameters() {
        let mut config: CalibrationConfig = serde_json::from_str(SAMPLE_CONFIG).unwrap();
        config.solver.range_filter.lower_percentile = 0.9;
        config.solver.range_filter.upper_percentile = 0.1;
        config.solver.stage_one.max_iterations = 0;
        config.solver.stage_two.simplex.x_tolerance = -1.0;

        let result = ConfigurationManager::validate_config(&config);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);

        config.solver.range_filter.upper_percentile = 1.5;
        let result = ConfigurationManager::validate_config(&config);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ConfigError::InvalidParameter { parameter, .. } if parameter == "solver.range_filter.upper_percentile"
        )));
    }

    #[test]
    fn test_empty_config_rejected() {
        let result = ConfigurationManager::from_json_str(r#"{ "networks": [] }"#);
        assert!(matches!(result, Err(ConfigError::MissingParameter { .. })));
        assert!(matches!(
            ConfigurationManager::from_json_str("{ not json"),
            Err(ConfigError::Serialization(_))
        ));
    }

    #[test]
    fn test_config_file_round_trip() {
        let mut manager = ConfigurationManager::from_json_str(SAMPLE_CONFIG).unwrap();
        let temp_path = std::env::temp_dir().join(format!("autocalibration_config_{}.json", std::process::id()));

        manager.save_to_file(&temp_path).unwrap();
        let loaded = ConfigurationManager::from_file(&temp_path).unwrap();

        assert_eq!(loaded.config(), manager.config());
        assert_eq!(loaded.config_file_path(), Some(temp_path.as_path()));

        let _ = fs::remove_file(temp_path);
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigurationManager::from_file("/nonexistent/autocalibration.json");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
