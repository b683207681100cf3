/*!

Vaccination interventions.

Each intervention is a named delivery schedule (routine window or campaign
dates), an acceptance probability, and an effect on susceptibility. A leaky
vaccine scales `rel_sus` multiplicatively; an all-or-nothing vaccine protects
a fraction `efficacy` of acceptors completely and the rest not at all.

Eligibility predicates may read another intervention's per-agent dose counts,
which is how multi-dose schedules are expressed: a booster is its own
intervention whose predicate requires a prior dose. Those reads always go
through a snapshot of the dose counts taken at the start of the step, so the
outcome never depends on the order interventions are applied in and there is
no cyclic evaluation.

*/

use crate::context::{Context, DataPlugin};
use crate::define_rng;
use crate::error::EpiError;
use crate::population::{AgentId, PopulationData};
use crate::random::ContextRandomExt;
use serde::{Deserialize, Serialize};

define_rng!(InterventionRng);

/// When doses are offered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    /// Offered every step from `start_time` until `end_time` (inclusive), or
    /// forever when `end_time` is absent.
    Routine {
        start_time: f64,
        #[serde(default)]
        end_time: Option<f64>,
    },
    /// Offered once per listed date, at the first step whose time reaches it.
    Campaign { times: Vec<f64> },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EfficacyMode {
    /// Every acceptor's susceptibility is scaled by `1 - efficacy`.
    Leaky,
    /// With probability `efficacy` an acceptor becomes permanently
    /// non-infectable; otherwise the dose has no effect.
    AllOrNothing,
}

/// "This agent must already hold `doses` doses of `intervention`."
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DoseRequirement {
    pub intervention: String,
    pub doses: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Eligibility {
    #[serde(default)]
    pub min_age: Option<f64>,
    #[serde(default)]
    pub max_age: Option<f64>,
    /// Prior doses of other interventions, read from the start-of-step
    /// snapshot.
    #[serde(default)]
    pub required_doses: Vec<DoseRequirement>,
    /// Doses of this intervention an agent can receive in total.
    #[serde(default = "default_max_doses")]
    pub max_doses: u32,
}

fn default_max_doses() -> u32 {
    1
}

impl Default for Eligibility {
    fn default() -> Self {
        Eligibility {
            min_age: None,
            max_age: None,
            required_doses: vec![],
            max_doses: default_max_doses(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterventionConfig {
    pub name: String,
    pub delivery: Delivery,
    /// Per-offer acceptance probability.
    pub coverage: f64,
    pub efficacy: f64,
    pub mode: EfficacyMode,
    #[serde(default)]
    pub eligibility: Eligibility,
}

/// Cross-checks a scenario's intervention list. Called from scenario
/// validation so a bad schedule is rejected before the run starts.
pub fn validate_interventions(interventions: &[InterventionConfig]) -> Result<(), EpiError> {
    for (idx, intervention) in interventions.iter().enumerate() {
        let name = &intervention.name;
        if name.is_empty() {
            return Err(EpiError::Config("intervention name must be nonempty".to_string()));
        }
        if interventions[..idx].iter().any(|other| other.name == *name) {
            return Err(EpiError::Config(format!(
                "duplicate intervention name {name:?}"
            )));
        }
        if !(0.0..=1.0).contains(&intervention.coverage) {
            return Err(EpiError::Config(format!(
                "{name}: coverage must be in [0, 1], got {}",
                intervention.coverage
            )));
        }
        if !(0.0..=1.0).contains(&intervention.efficacy) {
            return Err(EpiError::Config(format!(
                "{name}: efficacy must be in [0, 1], got {}",
                intervention.efficacy
            )));
        }

        match &intervention.delivery {
            Delivery::Routine { start_time, end_time } => {
                if !start_time.is_finite() {
                    return Err(EpiError::Config(format!(
                        "{name}: routine start_time must be finite"
                    )));
                }
                if let Some(end_time) = end_time
                    && (!end_time.is_finite() || end_time < start_time)
                {
                    return Err(EpiError::Config(format!(
                        "{name}: routine window [{start_time}, {end_time}] is inverted"
                    )));
                }
            }
            Delivery::Campaign { times } => {
                if times.is_empty() {
                    return Err(EpiError::Config(format!(
                        "{name}: campaign must list at least one time"
                    )));
                }
                if times.iter().any(|time| !time.is_finite())
                    || times.windows(2).any(|pair| pair[0] > pair[1])
                {
                    return Err(EpiError::Config(format!(
                        "{name}: campaign times must be finite and ascending"
                    )));
                }
            }
        }

        let eligibility = &intervention.eligibility;
        if let (Some(min_age), Some(max_age)) = (eligibility.min_age, eligibility.max_age)
            && min_age > max_age
        {
            return Err(EpiError::Config(format!(
                "{name}: age band [{min_age}, {max_age}] is inverted"
            )));
        }
        if eligibility.max_doses == 0 {
            return Err(EpiError::Config(format!(
                "{name}: max_doses must be at least 1"
            )));
        }
        for requirement in &eligibility.required_doses {
            if requirement.intervention == *name {
                return Err(EpiError::Config(format!(
                    "{name}: an intervention cannot require its own doses"
                )));
            }
            if !interventions
                .iter()
                .any(|other| other.name == requirement.intervention)
            {
                return Err(EpiError::Config(format!(
                    "{name}: dose requirement names unknown intervention {:?}",
                    requirement.intervention
                )));
            }
        }
    }
    Ok(())
}

/// Where an intervention stands relative to its delivery schedule.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Phase {
    Pending,
    Active,
    Done,
}

/// Runtime state for one intervention: its config, phase, and the per-agent
/// vaccination record.
pub struct InterventionState {
    pub(crate) config: InterventionConfig,
    pub(crate) phase: Phase,
    /// Index of the next unfired campaign date.
    next_campaign: usize,
    pub(crate) n_doses: Vec<u32>,
    pub(crate) t_vaccinated: Vec<Option<f64>>,
    pub(crate) age_at_vaccination: Vec<Option<f64>>,
}

impl InterventionState {
    /// Advances the phase machine for time `t` and reports whether doses are
    /// offered this step. A campaign consumes every listed date that `t` has
    /// reached.
    fn tick(&mut self, t: f64) -> bool {
        match &self.config.delivery {
            Delivery::Routine { start_time, end_time } => {
                if t < *start_time {
                    self.phase = Phase::Pending;
                    false
                } else if end_time.is_some_and(|end_time| t > end_time) {
                    self.phase = Phase::Done;
                    false
                } else {
                    self.phase = Phase::Active;
                    true
                }
            }
            Delivery::Campaign { times } => {
                let mut fires = false;
                while self.next_campaign < times.len() && t >= times[self.next_campaign] {
                    self.next_campaign += 1;
                    fires = true;
                }
                // After the final date fires the campaign is Done, even
                // though this very call still delivered.
                self.phase = if self.next_campaign >= times.len() {
                    Phase::Done
                } else if fires {
                    Phase::Active
                } else {
                    self.phase
                };
                fires
            }
        }
    }
}

#[derive(Default)]
pub struct InterventionData {
    pub(crate) interventions: Vec<InterventionState>,
}

impl DataPlugin for InterventionData {
    const new: &'static dyn Fn() -> Self = &InterventionData::default;
}

impl InterventionData {
    pub fn state(&self, name: &str) -> Option<&InterventionState> {
        self.interventions
            .iter()
            .find(|state| state.config.name == name)
    }

    pub fn doses(&self, name: &str, agent_id: AgentId) -> u32 {
        self.state(name)
            .map_or(0, |state| state.n_doses[agent_id.0])
    }

    pub fn phase(&self, name: &str) -> Option<Phase> {
        self.state(name).map(|state| state.phase)
    }
}

pub trait ContextInterventionExt {
    /// Installs the scenario's interventions with empty vaccination records.
    /// The population must be initialized first.
    fn init_interventions(&mut self, configs: &[InterventionConfig]) -> Result<(), EpiError>;

    /// Runs every intervention's delivery pass for time `t`. Returns the
    /// total number of doses administered this step.
    fn apply_interventions(&mut self, t: f64) -> Result<usize, EpiError>;
}

impl ContextInterventionExt for Context {
    fn init_interventions(&mut self, configs: &[InterventionConfig]) -> Result<(), EpiError> {
        let size = match self.get_data_container::<PopulationData>() {
            Some(population) if population.size() > 0 => population.size(),
            _ => {
                return Err(EpiError::Config(
                    "population must be initialized before interventions".to_string(),
                ));
            }
        };
        let data = self.get_data_container_mut::<InterventionData>();
        data.interventions = configs
            .iter()
            .map(|config| InterventionState {
                config: config.clone(),
                phase: Phase::Pending,
                next_campaign: 0,
                n_doses: vec![0; size],
                t_vaccinated: vec![None; size],
                age_at_vaccination: vec![None; size],
            })
            .collect();
        Ok(())
    }

    fn apply_interventions(&mut self, t: f64) -> Result<usize, EpiError> {
        let intervention_count = match self.get_data_container::<InterventionData>() {
            None => return Ok(0),
            Some(data) => data.interventions.len(),
        };
        if intervention_count == 0 {
            return Ok(0);
        }

        // Start-of-step snapshot of every intervention's dose counts. All
        // cross-intervention eligibility reads go through this, so doses
        // administered within this step are never visible to it.
        let dose_snapshot: Vec<(String, Vec<u32>)> = {
            let data = self
                .get_data_container::<InterventionData>()
                .ok_or_else(|| EpiError::Config("interventions not initialized".to_string()))?;
            data.interventions
                .iter()
                .map(|state| (state.config.name.clone(), state.n_doses.clone()))
                .collect()
        };

        let mut total_doses = 0;
        for which in 0..intervention_count {
            let (config, delivers, own_doses) = {
                let data = self
                    .get_data_container_mut::<InterventionData>();
                let state = &mut data.interventions[which];
                let delivers = state.tick(t);
                (state.config.clone(), delivers, state.n_doses.clone())
            };
            if !delivers {
                continue;
            }

            let eligible = {
                let population = self
                    .get_data_container::<PopulationData>()
                    .ok_or_else(|| EpiError::Config("population missing".to_string()))?;
                population.filter_agents(|population, agent_id| {
                    is_eligible(&config, population, agent_id, &own_doses, &dose_snapshot)
                })
            };

            // Acceptance and (for all-or-nothing) the protection draw, both
            // from the intervention stream.
            let mut administered: Vec<(AgentId, bool)> = Vec::new();
            for agent_id in eligible {
                if !self.sample_bool::<InterventionRng>(config.coverage) {
                    continue;
                }
                let protects = match config.mode {
                    EfficacyMode::Leaky => false,
                    EfficacyMode::AllOrNothing => {
                        self.sample_bool::<InterventionRng>(config.efficacy)
                    }
                };
                administered.push((agent_id, protects));
            }

            // Apply the effect and capture ages for the record.
            let mut dosed: Vec<(AgentId, f64)> = Vec::with_capacity(administered.len());
            {
                let population = self.get_data_container_mut::<PopulationData>();
                for (agent_id, protects) in &administered {
                    let idx = agent_id.0;
                    match config.mode {
                        EfficacyMode::Leaky => {
                            population.rel_sus[idx] *= 1.0 - config.efficacy;
                        }
                        EfficacyMode::AllOrNothing => {
                            if *protects {
                                population.vaccine_protected[idx] = true;
                            }
                        }
                    }
                    dosed.push((*agent_id, population.age[idx]));
                }
            }

            {
                let data = self.get_data_container_mut::<InterventionData>();
                let state = &mut data.interventions[which];
                for (agent_id, age) in &dosed {
                    let idx = agent_id.0;
                    state.n_doses[idx] += 1;
                    state.t_vaccinated[idx] = Some(t);
                    state.age_at_vaccination[idx] = Some(*age);
                }
            }

            if !dosed.is_empty() {
                log::debug!("t={t}: {} administered {} doses", config.name, dosed.len());
            }
            total_doses += dosed.len();
        }
        Ok(total_doses)
    }
}

fn is_eligible(
    config: &InterventionConfig,
    population: &PopulationData,
    agent_id: AgentId,
    own_doses: &[u32],
    dose_snapshot: &[(String, Vec<u32>)],
) -> bool {
    if !population.is_alive(agent_id) {
        return false;
    }
    let age = population.age(agent_id);
    let eligibility = &config.eligibility;
    if eligibility.min_age.is_some_and(|min_age| age < min_age)
        || eligibility.max_age.is_some_and(|max_age| age > max_age)
    {
        return false;
    }
    if own_doses[agent_id.0] >= eligibility.max_doses {
        return false;
    }
    eligibility.required_doses.iter().all(|requirement| {
        dose_snapshot
            .iter()
            .find(|(name, _)| *name == requirement.intervention)
            .is_some_and(|(_, doses)| doses[agent_id.0] >= requirement.doses)
    })
}
