/*!

The simulation driver: a step-synchronous loop over a fixed transition order.

Steps are numbered `0..n_steps`. Step 0 is initialization — population,
network, seeded infections, interventions installed — and its row records the
post-seeding initial state. Every later step runs, in fixed order: infections,
latency progression, resolution, waning, aging, interventions, then result
accumulation, followed by a population invariant check that aborts the run on
any violation. Single-threaded; determinism comes from the named rng streams,
so the same config and seed reproduce the result series byte for byte.

*/

use crate::config::ScenarioConfig;
use crate::context::Context;
use crate::error::EpiError;
use crate::intervention::ContextInterventionExt;
use crate::network::ContextNetworkExt;
use crate::population::{ContextPopulationExt, PopulationData};
use crate::random::ContextRandomExt;
use crate::results::{ContextResultsExt, ResultSeries};
use crate::transition;
use std::io::Write;
use std::path::Path;

/// Discrete step counter with its real-time mapping `time = step * dt`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SimulationClock {
    pub step: u32,
    pub n_steps: u32,
    pub dt: f64,
}

impl SimulationClock {
    #[must_use]
    pub fn new(n_steps: u32, dt: f64) -> Self {
        SimulationClock { step: 0, n_steps, dt }
    }

    #[must_use]
    pub fn time(&self) -> f64 {
        f64::from(self.step) * self.dt
    }

    pub fn advance(&mut self) {
        self.step += 1;
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.step + 1 >= self.n_steps
    }
}

pub struct Simulation {
    config: ScenarioConfig,
    clock: SimulationClock,
    context: Context,
}

impl Simulation {
    /// Validates the scenario and runs step 0: rng streams, population,
    /// contact network, seeded infections, interventions, and the initial
    /// result row.
    pub fn new(config: ScenarioConfig) -> Result<Self, EpiError> {
        config.validate()?;
        log::info!(
            "initializing scenario: {} agents, {} steps of dt={}",
            config.population.size,
            config.time.n_steps,
            config.time.dt
        );

        let mut context = Context::new();
        context.init_random(config.seed);
        context.init_population(&config.population);
        context.build_contact_network(&config.network)?;
        let seeded = transition::seed_infections(
            &mut context,
            &config.disease,
            config.population.initial_infected,
        )?;
        context.init_interventions(&config.interventions)?;

        let mut simulation = Simulation {
            clock: SimulationClock::new(config.time.n_steps, config.time.dt),
            config,
            context,
        };
        simulation.record_row(seeded)?;
        Ok(simulation)
    }

    /// Runs all remaining steps and returns the completed result series.
    pub fn run(&mut self) -> Result<&ResultSeries, EpiError> {
        while !self.clock.is_finished() {
            self.step()?;
        }
        log::info!("run complete after {} steps", self.clock.step + 1);
        self.results()
    }

    /// Executes one step's transitions in fixed order, records its row, and
    /// checks the population invariants.
    fn step(&mut self) -> Result<(), EpiError> {
        self.clock.advance();
        let t = self.clock.time();
        let disease = self.config.disease;

        let new_infections =
            transition::check_infections(&mut self.context, &disease, self.clock.dt, t)?;
        transition::check_progression(&mut self.context, t);
        transition::check_resolution(&mut self.context, &disease, t);
        transition::check_waning(&mut self.context, &disease, t);
        if self.config.population.aging {
            self.context.advance_ages(self.clock.dt);
        }
        self.context.apply_interventions(t)?;

        self.record_row(new_infections)
    }

    fn record_row(&mut self, new_infections: usize) -> Result<(), EpiError> {
        let (counts, prevalence) = {
            let population = self
                .context
                .get_data_container::<PopulationData>()
                .ok_or_else(|| {
                    EpiError::InvariantViolation("population missing mid-run".to_string())
                })?;
            population.check_invariants(self.clock.time())?;
            (population.counts(), population.prevalence())
        };
        self.context.record_result(
            self.clock.step,
            self.clock.time(),
            counts,
            new_infections,
            prevalence,
        );
        Ok(())
    }

    pub fn results(&self) -> Result<&ResultSeries, EpiError> {
        self.context.results().ok_or_else(|| {
            EpiError::InvariantViolation("result series missing mid-run".to_string())
        })
    }

    pub fn write_results_csv<W: Write>(&self, writer: W) -> Result<(), EpiError> {
        self.results()?.write_csv(writer)
    }

    pub fn write_results_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EpiError> {
        self.results()?.write_csv_file(path)
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }
}
