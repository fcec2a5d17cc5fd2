use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::slots::SlotGrid;

pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("population size must be at least 1")]
    EmptyPopulation,
    #[error("mutation rate {0} is outside [0, 1]")]
    MutationRate(f64),
    #[error("slot attempt budget must be at least 1")]
    NoAttempts,
    #[error("slot grid needs at least one day")]
    NoDays,
    #[error("slot grid needs at least two hours, got {0}")]
    TooFewHours(usize),
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Penalty weights used by the fitness evaluator. All strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FitnessWeights {
    pub instructor_clash: u32,
    pub group_clash: u32,
    pub room_clash: u32,
    pub overlap: u32,
    pub overload: u32,
    pub sparse: u32,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            instructor_clash: 10,
            group_clash: 10,
            room_clash: 10,
            overlap: 5,
            overload: 3,
            sparse: 2,
        }
    }
}

/// Weekly load limits applied per group and per instructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadPolicy {
    pub max_sessions_per_day: usize,
    /// Only enforced once an entity has at least this many sessions.
    pub min_active_days: usize,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            max_sessions_per_day: 4,
            min_active_days: 3,
        }
    }
}

/// Tunables for one optimisation run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GaConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub max_slot_attempts: usize,
    pub days: Vec<String>,
    pub hours: Vec<String>,
    pub weights: FitnessWeights,
    pub load: LoadPolicy,
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            generations: 50,
            mutation_rate: 0.1,
            max_slot_attempts: 200,
            days: ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday"]
                .into_iter()
                .map(String::from)
                .collect(),
            hours: (8..=17).map(|h| format!("{:02}:00", h)).collect(),
            weights: FitnessWeights::default(),
            load: LoadPolicy::default(),
            seed: None,
        }
    }
}

impl GaConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: GaConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `TIMETABLE_CONFIG` if set, otherwise falls back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("TIMETABLE_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            return Err(ConfigError::MutationRate(self.mutation_rate));
        }
        if self.max_slot_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.days.is_empty() {
            return Err(ConfigError::NoDays);
        }
        if self.hours.len() < 2 {
            return Err(ConfigError::TooFewHours(self.hours.len()));
        }
        Ok(())
    }

    pub fn grid(&self) -> SlotGrid {
        SlotGrid::new(self.days.clone(), self.hours.clone())
    }

    /// The single random source threaded through a run.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

pub fn bind_addr() -> String {
    std::env::var("TIMETABLE_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string())
}
