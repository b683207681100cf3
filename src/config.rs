/*!

Run configuration: one explicit, eagerly validated struct per component.

The scenario-sweep scripts around the simulator supply one `ScenarioConfig`
per run (as a value or as JSON) and receive one `ResultSeries` back; there is
no other coupling. Every out-of-range parameter is rejected here, at
initialization, never mid-run.

*/

use crate::disease::DiseaseConfig;
use crate::error::EpiError;
use crate::intervention::InterventionConfig;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Initial age structure of the population.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgeDistribution {
    Constant { value: f64 },
    Uniform { low: f64, high: f64 },
}

impl Default for AgeDistribution {
    fn default() -> Self {
        AgeDistribution::Constant { value: 0.0 }
    }
}

impl AgeDistribution {
    fn validate(&self) -> Result<(), EpiError> {
        let ok = match self {
            AgeDistribution::Constant { value } => value.is_finite() && *value >= 0.0,
            AgeDistribution::Uniform { low, high } => {
                low.is_finite() && high.is_finite() && *low >= 0.0 && low <= high
            }
        };
        if ok {
            Ok(())
        } else {
            Err(EpiError::Config(format!("invalid age distribution {self:?}")))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PopulationConfig {
    pub size: usize,
    pub initial_infected: usize,
    #[serde(default)]
    pub age: AgeDistribution,
    /// When true, every agent's age advances by `dt` per step. Needed for
    /// age-banded routine vaccination; fixed-age models leave it off.
    #[serde(default)]
    pub aging: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Target mean number of contacts per agent.
    pub n_contacts: u32,
    /// The distance over which agents preferentially form contacts.
    pub spatial_scale: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    pub n_steps: u32,
    /// Simulation time per step; total horizon is `n_steps * dt`.
    pub dt: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub population: PopulationConfig,
    pub disease: DiseaseConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub interventions: Vec<InterventionConfig>,
    pub time: TimeConfig,
    pub seed: u64,
}

impl ScenarioConfig {
    pub fn from_json_str(json: &str) -> Result<Self, EpiError> {
        let config: ScenarioConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, EpiError> {
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        ScenarioConfig::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), EpiError> {
        if self.population.size == 0 {
            return Err(EpiError::Config("population size must be nonzero".to_string()));
        }
        if self.population.initial_infected > self.population.size {
            return Err(EpiError::Config(format!(
                "initial_infected ({}) exceeds population size ({})",
                self.population.initial_infected, self.population.size
            )));
        }
        self.population.age.validate()?;

        if !self.network.spatial_scale.is_finite() || self.network.spatial_scale <= 0.0 {
            return Err(EpiError::Config(format!(
                "spatial_scale must be positive, got {}",
                self.network.spatial_scale
            )));
        }

        if self.time.n_steps == 0 {
            return Err(EpiError::Config("n_steps must be nonzero".to_string()));
        }
        if !self.time.dt.is_finite() || self.time.dt <= 0.0 {
            return Err(EpiError::Config(format!(
                "dt must be positive, got {}",
                self.time.dt
            )));
        }

        self.disease.validate(self.time.dt)?;
        crate::intervention::validate_interventions(&self.interventions)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::DiseaseConfig;

    fn base_config() -> ScenarioConfig {
        ScenarioConfig {
            population: PopulationConfig {
                size: 100,
                initial_infected: 3,
                age: AgeDistribution::default(),
                aging: false,
            },
            disease: DiseaseConfig::sis(0.3, 0.5, 1.0),
            network: NetworkConfig {
                n_contacts: 10,
                spatial_scale: 0.1,
            },
            interventions: vec![],
            time: TimeConfig { n_steps: 40, dt: 0.4 },
            seed: 1,
        }
    }

    #[test]
    fn base_config_is_valid() {
        base_config().validate().unwrap();
    }

    #[test]
    fn rejects_empty_population() {
        let mut config = base_config();
        config.population.size = 0;
        assert!(matches!(config.validate(), Err(EpiError::Config(_))));
    }

    #[test]
    fn rejects_seed_count_above_population() {
        let mut config = base_config();
        config.population.initial_infected = 101;
        assert!(matches!(config.validate(), Err(EpiError::Config(_))));
    }

    #[test]
    fn rejects_nonpositive_dt_and_steps() {
        let mut config = base_config();
        config.time.dt = 0.0;
        assert!(matches!(config.validate(), Err(EpiError::Config(_))));

        let mut config = base_config();
        config.time.n_steps = 0;
        assert!(matches!(config.validate(), Err(EpiError::Config(_))));
    }

    #[test]
    fn rejects_inverted_age_band() {
        let mut config = base_config();
        config.population.age = AgeDistribution::Uniform { low: 5.0, high: 1.0 };
        assert!(matches!(config.validate(), Err(EpiError::Config(_))));
    }

    #[test]
    fn parses_and_validates_json() {
        let json = r#"{
            "population": { "size": 1000, "initial_infected": 3 },
            "disease": {
                "beta": 0.3,
                "infectious_duration": { "family": "exponential", "mean": 2.0 },
                "recovery": { "kind": "to_susceptible", "waning_rate": 1.0 }
            },
            "network": { "n_contacts": 10, "spatial_scale": 0.1 },
            "time": { "n_steps": 40, "dt": 0.4 },
            "seed": 1
        }"#;
        let config = ScenarioConfig::from_json_str(json).unwrap();
        assert_eq!(config.population.size, 1000);
        assert_eq!(config.disease, DiseaseConfig::sis(0.3, 0.5, 1.0));
        assert!(config.interventions.is_empty());
    }

    #[test]
    fn json_with_bad_probability_fails_validation() {
        let json = r#"{
            "population": { "size": 1000, "initial_infected": 3 },
            "disease": {
                "beta": 0.3,
                "p_death": 7.0,
                "infectious_duration": { "family": "exponential", "mean": 2.0 },
                "recovery": { "kind": "to_recovered" }
            },
            "network": { "n_contacts": 10, "spatial_scale": 0.1 },
            "time": { "n_steps": 40, "dt": 0.4 },
            "seed": 1
        }"#;
        assert!(matches!(
            ScenarioConfig::from_json_str(json),
            Err(EpiError::Config(_))
        ));
    }
}
