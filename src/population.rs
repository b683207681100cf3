/*!

The agent population: one struct-of-arrays data plugin.

Per-agent state lives in parallel columns indexed by `AgentId`, giving O(1)
state lookup and O(k) bulk mutation of a selection. An agent's compartment is
a single enum value, so the mutual-exclusion ("partition") invariant is
structural: no agent can carry two compartment flags at once.

*/

use crate::config::{AgeDistribution, PopulationConfig};
use crate::context::{Context, DataPlugin};
use crate::define_rng;
use crate::error::EpiError;
use crate::random::ContextRandomExt;
use serde::{Deserialize, Serialize};
use std::fmt;

define_rng!(PopulationRng);

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct AgentId(pub(crate) usize);

impl AgentId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "agent {}", self.0)
    }
}

/// A mutually exclusive disease state. Exactly one holds per agent at any
/// time.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compartment {
    Susceptible,
    Exposed,
    Infectious,
    Recovered,
    Dead,
}

/// Per-compartment population counts at one instant.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompartmentCounts {
    pub susceptible: usize,
    pub exposed: usize,
    pub infectious: usize,
    pub recovered: usize,
    pub dead: usize,
}

impl CompartmentCounts {
    #[must_use]
    pub fn living(&self) -> usize {
        self.susceptible + self.exposed + self.infectious + self.recovered
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.living() + self.dead
    }
}

/// Stores all per-agent state as parallel columns.
///
/// The `t_*` columns are `None` until set. `t_infectious`, `t_recovered` and
/// `t_dead` hold the pre-computed scheduled time from the moment of exposure
/// until the corresponding transition fires (one-shot fate sampling).
pub struct PopulationData {
    pub(crate) compartment: Vec<Compartment>,
    pub(crate) alive: Vec<bool>,
    pub(crate) age: Vec<f64>,
    /// Waning-immunity level in [0, 1]; 0 = fully susceptible.
    pub(crate) immunity: Vec<f64>,
    /// Multiplicative susceptibility from leaky vaccination, in [0, 1].
    pub(crate) rel_sus: Vec<f64>,
    /// All-or-nothing vaccine protection; protected agents cannot be infected.
    pub(crate) vaccine_protected: Vec<bool>,
    pub(crate) x: Vec<f64>,
    pub(crate) y: Vec<f64>,
    pub(crate) t_exposed: Vec<Option<f64>>,
    pub(crate) t_infectious: Vec<Option<f64>>,
    pub(crate) t_recovered: Vec<Option<f64>>,
    pub(crate) t_dead: Vec<Option<f64>>,
    initial_size: usize,
}

impl Default for PopulationData {
    fn default() -> Self {
        PopulationData {
            compartment: vec![],
            alive: vec![],
            age: vec![],
            immunity: vec![],
            rel_sus: vec![],
            vaccine_protected: vec![],
            x: vec![],
            y: vec![],
            t_exposed: vec![],
            t_infectious: vec![],
            t_recovered: vec![],
            t_dead: vec![],
            initial_size: 0,
        }
    }
}

impl DataPlugin for PopulationData {
    const new: &'static dyn Fn() -> Self = &PopulationData::default;
}

impl PopulationData {
    #[must_use]
    pub fn size(&self) -> usize {
        self.compartment.len()
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = AgentId> + use<> {
        (0..self.size()).map(AgentId)
    }

    #[inline]
    #[must_use]
    pub fn compartment(&self, agent_id: AgentId) -> Compartment {
        self.compartment[agent_id.0]
    }

    #[inline]
    #[must_use]
    pub fn is_alive(&self, agent_id: AgentId) -> bool {
        self.alive[agent_id.0]
    }

    #[inline]
    #[must_use]
    pub fn age(&self, agent_id: AgentId) -> f64 {
        self.age[agent_id.0]
    }

    #[inline]
    #[must_use]
    pub fn immunity(&self, agent_id: AgentId) -> f64 {
        self.immunity[agent_id.0]
    }

    #[must_use]
    pub fn position(&self, agent_id: AgentId) -> (f64, f64) {
        (self.x[agent_id.0], self.y[agent_id.0])
    }

    /// Returns the identities of all agents satisfying `predicate`.
    pub fn filter_agents(
        &self,
        predicate: impl Fn(&PopulationData, AgentId) -> bool,
    ) -> Vec<AgentId> {
        self.agent_ids()
            .filter(|agent_id| predicate(self, *agent_id))
            .collect()
    }

    /// Applies `mutate` to each of the selected agents. O(k) in the size of
    /// the selection.
    pub fn mutate_agents(
        &mut self,
        selection: &[AgentId],
        mut mutate: impl FnMut(&mut PopulationData, AgentId),
    ) {
        for agent_id in selection {
            mutate(self, *agent_id);
        }
    }

    #[must_use]
    pub fn counts(&self) -> CompartmentCounts {
        let mut counts = CompartmentCounts::default();
        for compartment in &self.compartment {
            match compartment {
                Compartment::Susceptible => counts.susceptible += 1,
                Compartment::Exposed => counts.exposed += 1,
                Compartment::Infectious => counts.infectious += 1,
                Compartment::Recovered => counts.recovered += 1,
                Compartment::Dead => counts.dead += 1,
            }
        }
        counts
    }

    /// Prevalence is derived on read, never stored: the fraction of the
    /// living population currently exposed or infectious.
    #[must_use]
    pub fn prevalence(&self) -> f64 {
        let counts = self.counts();
        let living = counts.living();
        if living == 0 {
            return 0.0;
        }
        (counts.exposed + counts.infectious) as f64 / living as f64
    }

    /// Fails fast on data-model corruption. Checked once per step by the
    /// driver; a violation aborts the run.
    pub fn check_invariants(&self, now: f64) -> Result<(), EpiError> {
        let counts = self.counts();
        if counts.total() != self.initial_size {
            return Err(EpiError::InvariantViolation(format!(
                "compartment counts sum to {} but the population was created with {} agents",
                counts.total(),
                self.initial_size
            )));
        }

        for agent_id in self.agent_ids() {
            let idx = agent_id.0;
            if !(0.0..=1.0).contains(&self.immunity[idx]) {
                return Err(EpiError::InvariantViolation(format!(
                    "{agent_id} has immunity {} outside [0, 1]",
                    self.immunity[idx]
                )));
            }
            if !(0.0..=1.0).contains(&self.rel_sus[idx]) {
                return Err(EpiError::InvariantViolation(format!(
                    "{agent_id} has rel_sus {} outside [0, 1]",
                    self.rel_sus[idx]
                )));
            }
            if self.alive[idx] == (self.compartment[idx] == Compartment::Dead) {
                return Err(EpiError::InvariantViolation(format!(
                    "{agent_id} has alive={} but compartment {:?}",
                    self.alive[idx], self.compartment[idx]
                )));
            }
            // Monotonic timestamps: exposure <= infectiousness <= resolution.
            if let (Some(t_exposed), Some(t_infectious)) =
                (self.t_exposed[idx], self.t_infectious[idx])
            {
                if t_exposed > t_infectious {
                    return Err(EpiError::InvariantViolation(format!(
                        "{agent_id} exposed at {t_exposed} after becoming infectious at {t_infectious}"
                    )));
                }
            }
            if let (Some(t_infectious), Some(t_dead)) = (self.t_infectious[idx], self.t_dead[idx]) {
                if t_infectious > t_dead {
                    return Err(EpiError::InvariantViolation(format!(
                        "{agent_id} infectious at {t_infectious} after dying at {t_dead}"
                    )));
                }
            }
            if self.compartment[idx] == Compartment::Dead {
                match self.t_dead[idx] {
                    Some(t_dead) if t_dead <= now => {}
                    _ => {
                        return Err(EpiError::InvariantViolation(format!(
                            "{agent_id} is dead without a past death timestamp"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

pub trait ContextPopulationExt {
    /// Creates the population: everyone susceptible, alive, unvaccinated,
    /// with positions uniform in the unit square and ages drawn from the
    /// configured distribution.
    fn init_population(&mut self, config: &PopulationConfig);

    fn population_size(&self) -> usize;
    fn compartment_counts(&self) -> CompartmentCounts;

    /// Advances every living agent's age by `dt`.
    fn advance_ages(&mut self, dt: f64);
}

impl ContextPopulationExt for Context {
    fn init_population(&mut self, config: &PopulationConfig) {
        log::trace!("initializing population of {}", config.size);
        let size = config.size;

        let mut xs = Vec::with_capacity(size);
        let mut ys = Vec::with_capacity(size);
        let mut ages = Vec::with_capacity(size);
        for _ in 0..size {
            xs.push(self.sample_range::<PopulationRng, _, f64>(0.0..1.0));
            ys.push(self.sample_range::<PopulationRng, _, f64>(0.0..1.0));
            let age = match config.age {
                AgeDistribution::Constant { value } => value,
                AgeDistribution::Uniform { low, high } => {
                    if low < high {
                        self.sample_range::<PopulationRng, _, f64>(low..high)
                    } else {
                        low
                    }
                }
            };
            ages.push(age);
        }

        let population = self.get_data_container_mut::<PopulationData>();
        population.compartment = vec![Compartment::Susceptible; size];
        population.alive = vec![true; size];
        population.age = ages;
        population.immunity = vec![0.0; size];
        population.rel_sus = vec![1.0; size];
        population.vaccine_protected = vec![false; size];
        population.x = xs;
        population.y = ys;
        population.t_exposed = vec![None; size];
        population.t_infectious = vec![None; size];
        population.t_recovered = vec![None; size];
        population.t_dead = vec![None; size];
        population.initial_size = size;
    }

    fn population_size(&self) -> usize {
        match self.get_data_container::<PopulationData>() {
            None => 0,
            Some(population) => population.size(),
        }
    }

    fn compartment_counts(&self) -> CompartmentCounts {
        match self.get_data_container::<PopulationData>() {
            None => CompartmentCounts::default(),
            Some(population) => population.counts(),
        }
    }

    fn advance_ages(&mut self, dt: f64) {
        let population = self.get_data_container_mut::<PopulationData>();
        for idx in 0..population.size() {
            if population.alive[idx] {
                population.age[idx] += dt;
            }
        }
    }
}
