use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_K_FACTOR: f64 = 32.0;
pub const DEFAULT_MIN_MASTERY: f64 = 600.0;
pub const DEFAULT_MAX_MASTERY: f64 = 1800.0;
pub const DEFAULT_STARTING_MASTERY: f64 = 800.0;
pub const DEFAULT_CONCEPT_DIFFICULTY: i32 = 2;

/// The model always assumes even odds against a concept.
const EXPECTED_SCORE: f64 = 0.5;

pub const MIN_DIFFICULTY: i32 = 1;
pub const MAX_DIFFICULTY: i32 = 5;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} must be a number, got {value:?}")]
    NotANumber { key: &'static str, value: String },
    #[error("k factor must be positive, got {0}")]
    NonPositiveK(f64),
    #[error("mastery bounds are inverted: min {min} >= max {max}")]
    InvertedBounds { min: f64, max: f64 },
    #[error("starting mastery {default} lies outside [{min}, {max}]")]
    DefaultOutOfBounds { default: f64, min: f64, max: f64 },
    #[error("concept difficulty {0} lies outside 1..=5")]
    DifficultyOutOfRange(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingConfig {
    pub k_factor: f64,
    pub min_mastery: f64,
    pub max_mastery: f64,
    pub default_mastery: f64,
    pub default_concept_difficulty: i32,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_K_FACTOR,
            min_mastery: DEFAULT_MIN_MASTERY,
            max_mastery: DEFAULT_MAX_MASTERY,
            default_mastery: DEFAULT_STARTING_MASTERY,
            default_concept_difficulty: DEFAULT_CONCEPT_DIFFICULTY,
        }
    }
}

impl RatingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            k_factor: env_f64("MASTERY_K_FACTOR", defaults.k_factor)?,
            min_mastery: env_f64("MASTERY_MIN", defaults.min_mastery)?,
            max_mastery: env_f64("MASTERY_MAX", defaults.max_mastery)?,
            default_mastery: env_f64("MASTERY_DEFAULT", defaults.default_mastery)?,
            default_concept_difficulty: env_i32(
                "CONCEPT_DEFAULT_DIFFICULTY",
                defaults.default_concept_difficulty,
            )?,
        })
    }
}

/// Validated rating parameters. Construction is the only place bounds are checked,
/// so [`RatingModel::update`] itself has no failure mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingModel {
    config: RatingConfig,
}

impl Default for RatingModel {
    fn default() -> Self {
        Self {
            config: RatingConfig::default(),
        }
    }
}

impl RatingModel {
    pub fn new(config: RatingConfig) -> Result<Self, ConfigError> {
        if config.k_factor.is_nan() || config.k_factor <= 0.0 {
            return Err(ConfigError::NonPositiveK(config.k_factor));
        }
        if config.min_mastery.is_nan()
            || config.max_mastery.is_nan()
            || config.min_mastery >= config.max_mastery
        {
            return Err(ConfigError::InvertedBounds {
                min: config.min_mastery,
                max: config.max_mastery,
            });
        }
        if config.default_mastery.is_nan()
            || config.default_mastery < config.min_mastery
            || config.default_mastery > config.max_mastery
        {
            return Err(ConfigError::DefaultOutOfBounds {
                default: config.default_mastery,
                min: config.min_mastery,
                max: config.max_mastery,
            });
        }
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&config.default_concept_difficulty) {
            return Err(ConfigError::DifficultyOutOfRange(
                config.default_concept_difficulty,
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    pub fn default_mastery(&self) -> f64 {
        self.config.default_mastery
    }

    pub fn default_concept_difficulty(&self) -> i32 {
        self.config.default_concept_difficulty
    }

    pub fn update(&self, current: f64, success: bool) -> f64 {
        update_mastery_score(current, success, &self.config)
    }

    /// Maps a mastery score onto the 1..=5 difficulty scale tasks use.
    pub fn normalized_ability(&self, mastery: f64) -> f64 {
        let span = self.config.max_mastery - self.config.min_mastery;
        let fraction = ((mastery - self.config.min_mastery) / span).clamp(0.0, 1.0);
        MIN_DIFFICULTY as f64 + fraction * (MAX_DIFFICULTY - MIN_DIFFICULTY) as f64
    }
}

fn update_mastery_score(current: f64, success: bool, config: &RatingConfig) -> f64 {
    let actual = if success { 1.0 } else { 0.0 };
    let delta = config.k_factor * (actual - EXPECTED_SCORE);
    (current + delta).clamp(config.min_mastery, config.max_mastery)
}

fn env_f64(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::NotANumber { key, value }),
        _ => Ok(default),
    }
}

fn env_i32(key: &'static str, default: i32) -> Result<i32, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<i32>()
            .map_err(|_| ConfigError::NotANumber { key, value }),
        _ => Ok(default),
    }
}
