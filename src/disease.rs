/*!

The disease model as data.

A disease is not a type: it is a transition-rule table — a transmission
probability, an optional latency stage, an infectious-duration distribution, a
death probability, and what recovery means. SIS-with-waning, SEIR, and
SIR-with-vaccination are all values of [`DiseaseConfig`] fed to the same
engine.

*/

use crate::error::EpiError;
use rand::Rng;
use rand_distr::{Distribution, Exp, LogNormal, Normal};
use serde::{Deserialize, Serialize};

/// A named duration distribution, selected and parameterized in
/// configuration. Sampled once per agent per stage, never per step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum DurationDistribution {
    Constant { value: f64 },
    /// Mean duration `1/rate`; the per-step-rate models (e.g. recovery rate
    /// gamma) are expressed as `Exponential { mean: 1.0 / gamma }`.
    Exponential { mean: f64 },
    Normal { mean: f64, std_dev: f64 },
    /// Parameters of the underlying normal.
    LogNormal { location: f64, scale: f64 },
}

impl DurationDistribution {
    /// Eager validation of the distribution parameters. `what` names the
    /// parameter being validated in the error message.
    pub fn validate(&self, what: &str) -> Result<(), EpiError> {
        let ok = match self {
            DurationDistribution::Constant { value } => value.is_finite() && *value > 0.0,
            DurationDistribution::Exponential { mean } => mean.is_finite() && *mean > 0.0,
            DurationDistribution::Normal { mean, std_dev } => {
                mean.is_finite() && *mean > 0.0 && std_dev.is_finite() && *std_dev >= 0.0
            }
            DurationDistribution::LogNormal { location, scale } => {
                location.is_finite() && scale.is_finite() && *scale >= 0.0
            }
        };

        if ok {
            Ok(())
        } else {
            Err(EpiError::Config(format!(
                "{what}: invalid duration distribution {self:?}"
            )))
        }
    }

    /// Draws one duration. A negative draw (possible for the normal family)
    /// is a `SamplingError`, surfaced immediately rather than clamped.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Result<f64, EpiError> {
        let drawn = match self {
            DurationDistribution::Constant { value } => *value,
            DurationDistribution::Exponential { mean } => Exp::new(1.0 / mean)
                .map_err(|error| EpiError::Sampling(format!("exponential: {error}")))?
                .sample(rng),
            DurationDistribution::Normal { mean, std_dev } => Normal::new(*mean, *std_dev)
                .map_err(|error| EpiError::Sampling(format!("normal: {error}")))?
                .sample(rng),
            DurationDistribution::LogNormal { location, scale } => {
                LogNormal::new(*location, *scale)
                    .map_err(|error| EpiError::Sampling(format!("lognormal: {error}")))?
                    .sample(rng)
            }
        };

        if drawn < 0.0 {
            return Err(EpiError::Sampling(format!(
                "drew negative duration {drawn} from {self:?}"
            )));
        }
        Ok(drawn)
    }
}

/// What happens when an infection resolves without death.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// SIR/SEIR: the agent moves to the absorbing Recovered compartment.
    ToRecovered,
    /// SIS: the agent returns to Susceptible with immunity 1.0, which then
    /// decays as `exp(-(t - t_recovered) / waning_rate)`.
    ToSusceptible { waning_rate: f64 },
}

/// The transition-rule table for one disease.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiseaseConfig {
    /// Infection rate per contact per unit time.
    pub beta: f64,
    /// Latency (Exposed) stage duration; `None` means newly infected agents
    /// are infectious immediately.
    #[serde(default)]
    pub latency: Option<DurationDistribution>,
    pub infectious_duration: DurationDistribution,
    /// Probability that an infection resolves in death rather than recovery.
    /// Drawn exactly once, at exposure time.
    #[serde(default)]
    pub p_death: f64,
    pub recovery: RecoveryOutcome,
}

impl DiseaseConfig {
    /// SIS with waning immunity: recovery rate `gamma` expressed as an
    /// exponential infectious duration with mean `1/gamma`.
    pub fn sis(beta: f64, gamma: f64, waning_rate: f64) -> Self {
        DiseaseConfig {
            beta,
            latency: None,
            infectious_duration: DurationDistribution::Exponential { mean: 1.0 / gamma },
            p_death: 0.0,
            recovery: RecoveryOutcome::ToSusceptible { waning_rate },
        }
    }

    /// SEIR with a case-fatality probability.
    pub fn seir(
        beta: f64,
        latency: DurationDistribution,
        infectious_duration: DurationDistribution,
        p_death: f64,
    ) -> Self {
        DiseaseConfig {
            beta,
            latency: Some(latency),
            infectious_duration,
            p_death,
            recovery: RecoveryOutcome::ToRecovered,
        }
    }

    /// `dt` is needed because the per-step infection probability is
    /// `beta * dt` scaled by susceptibility, and must itself be a probability.
    pub fn validate(&self, dt: f64) -> Result<(), EpiError> {
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(EpiError::Config(format!(
                "beta must be a nonnegative rate, got {}",
                self.beta
            )));
        }
        let step_probability = self.beta * dt;
        if !(0.0..=1.0).contains(&step_probability) {
            return Err(EpiError::Config(format!(
                "beta * dt = {step_probability} is not a probability; lower beta or dt"
            )));
        }
        if !(0.0..=1.0).contains(&self.p_death) {
            return Err(EpiError::Config(format!(
                "p_death must be in [0, 1], got {}",
                self.p_death
            )));
        }
        if let Some(latency) = &self.latency {
            latency.validate("latency")?;
        }
        self.infectious_duration.validate("infectious_duration")?;
        if let RecoveryOutcome::ToSusceptible { waning_rate } = self.recovery {
            if !waning_rate.is_finite() || waning_rate <= 0.0 {
                return Err(EpiError::Config(format!(
                    "waning_rate must be positive, got {waning_rate}"
                )));
            }
        }
        Ok(())
    }
}
