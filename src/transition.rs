/*!

The per-timestep stochastic transition rules.

Every operation here takes the current time and mutates the population in
place; each is otherwise a pure function of (population state, network, rng
stream, t). Infection draws are evaluated against an immutable snapshot of
state taken at the start of the step, so the order of edge evaluation cannot
create same-step cascades. An agent's fate — latency, infectious duration,
death-or-recovery — is sampled exactly once, at exposure time, and stored as
pre-computed future timestamps; nothing is resampled per step.

*/

use crate::context::Context;
use crate::define_rng;
use crate::disease::{DiseaseConfig, RecoveryOutcome};
use crate::error::EpiError;
use crate::network::NetworkData;
use crate::population::{AgentId, Compartment, PopulationData};
use crate::random::ContextRandomExt;

define_rng!(TransmissionRng);
define_rng!(PrognosisRng);

/// Evaluates every contact edge, in both directions, against the pre-step
/// snapshot. A susceptible endpoint of an infectious neighbor is infected
/// with probability `beta * dt * (1 - immunity) * rel_sus`, independently per
/// direction per step. Agents reached through several edges are infected
/// once. Returns the number of new infections.
pub fn check_infections(
    context: &mut Context,
    disease: &DiseaseConfig,
    dt: f64,
    t: f64,
) -> Result<usize, EpiError> {
    let step_beta = disease.beta * dt;

    let edges = match context.get_data_container::<NetworkData>() {
        None => return Ok(0),
        Some(network) => network.edges.clone(),
    };
    // The pre-step snapshot: compartments and effective susceptibility as
    // they stood when the step began. Mid-step mutations never feed back
    // into this pass.
    let (compartments, susceptibility, protected) = {
        let population = match context.get_data_container::<PopulationData>() {
            None => return Ok(0),
            Some(population) => population,
        };
        let susceptibility: Vec<f64> = (0..population.size())
            .map(|idx| (1.0 - population.immunity[idx]) * population.rel_sus[idx])
            .collect();
        (
            population.compartment.clone(),
            susceptibility,
            population.vaccine_protected.clone(),
        )
    };

    let mut newly_infected: Vec<AgentId> = Vec::new();
    let mut already_drawn_positive = vec![false; compartments.len()];
    for edge in &edges {
        // Undirected transmission: check both directions of the channel.
        for (src, dst) in [(edge.a.0, edge.b.0), (edge.b.0, edge.a.0)] {
            if compartments[src] == Compartment::Infectious
                && compartments[dst] == Compartment::Susceptible
                && !protected[dst]
            {
                let p = step_beta * susceptibility[dst];
                if context.sample_bool::<TransmissionRng>(p) && !already_drawn_positive[dst] {
                    already_drawn_positive[dst] = true;
                    newly_infected.push(AgentId(dst));
                }
            }
        }
    }

    for agent_id in &newly_infected {
        set_prognoses(context, disease, *agent_id, t)?;
    }
    if !newly_infected.is_empty() {
        log::trace!("t={t}: {} new infections", newly_infected.len());
    }
    Ok(newly_infected.len())
}

/// Samples an exposed agent's complete fate exactly once: latency duration
/// (if the model has a latent stage), infectious duration, and the
/// death-or-recovery Bernoulli. The resulting resolution time is stored as a
/// pre-computed future timestamp, which rules out double-sampling bugs.
pub fn set_prognoses(
    context: &mut Context,
    disease: &DiseaseConfig,
    agent_id: AgentId,
    t: f64,
) -> Result<(), EpiError> {
    let (compartment, t_infectious) = match &disease.latency {
        Some(latency) => {
            let duration = context.sample::<PrognosisRng, _>(|rng| latency.sample(rng))?;
            (Compartment::Exposed, t + duration)
        }
        None => (Compartment::Infectious, t),
    };
    let infectious_duration =
        context.sample::<PrognosisRng, _>(|rng| disease.infectious_duration.sample(rng))?;
    let dies = context.sample_bool::<PrognosisRng>(disease.p_death);

    let population = context.get_data_container_mut::<PopulationData>();
    let idx = agent_id.0;
    population.compartment[idx] = compartment;
    population.t_exposed[idx] = Some(t);
    population.t_infectious[idx] = Some(t_infectious);
    // Any waning protection from a previous recovery is spent.
    population.immunity[idx] = 0.0;
    if dies {
        population.t_dead[idx] = Some(t_infectious + infectious_duration);
        population.t_recovered[idx] = None;
    } else {
        population.t_recovered[idx] = Some(t_infectious + infectious_duration);
        population.t_dead[idx] = None;
    }
    Ok(())
}

/// Initial conditions: gives the first `count` agents prognoses at t = 0.
pub fn seed_infections(
    context: &mut Context,
    disease: &DiseaseConfig,
    count: usize,
) -> Result<usize, EpiError> {
    for idx in 0..count {
        set_prognoses(context, disease, AgentId(idx), 0.0)?;
    }
    Ok(count)
}

/// Exposed → Infectious once the pre-computed infectiousness time arrives.
pub fn check_progression(context: &mut Context, t: f64) {
    let population = context.get_data_container_mut::<PopulationData>();
    let due = population.filter_agents(|population, agent_id| {
        population.compartment(agent_id) == Compartment::Exposed
            && population.t_infectious[agent_id.0].is_some_and(|t_infectious| t >= t_infectious)
    });
    population.mutate_agents(&due, |population, agent_id| {
        population.compartment[agent_id.0] = Compartment::Infectious;
    });
}

/// Infectious → Dead, Recovered, or Susceptible-with-immunity once the
/// pre-computed resolution time arrives. The fate itself was fixed at
/// exposure; this only fires it.
pub fn check_resolution(context: &mut Context, disease: &DiseaseConfig, t: f64) {
    let population = context.get_data_container_mut::<PopulationData>();

    let dying = population.filter_agents(|population, agent_id| {
        population.compartment(agent_id) == Compartment::Infectious
            && population.t_dead[agent_id.0].is_some_and(|t_dead| t >= t_dead)
    });
    population.mutate_agents(&dying, |population, agent_id| {
        population.compartment[agent_id.0] = Compartment::Dead;
        population.alive[agent_id.0] = false;
        // Birth/replacement bookkeeping is an external hook, not done here.
    });

    let recovering = population.filter_agents(|population, agent_id| {
        population.compartment(agent_id) == Compartment::Infectious
            && population.t_recovered[agent_id.0].is_some_and(|t_recovered| t >= t_recovered)
    });
    population.mutate_agents(&recovering, |population, agent_id| {
        let idx = agent_id.0;
        match disease.recovery {
            RecoveryOutcome::ToRecovered => {
                population.compartment[idx] = Compartment::Recovered;
            }
            RecoveryOutcome::ToSusceptible { .. } => {
                // SIS: back to susceptible with perfect, waning immunity.
                // t_recovered becomes the firing time so the decay law is
                // exact from this step onward.
                population.compartment[idx] = Compartment::Susceptible;
                population.immunity[idx] = 1.0;
                population.t_recovered[idx] = Some(t);
            }
        }
    });
}

/// Recomputes waning immunity for every susceptible agent with a recovery
/// behind it: `immunity(t) = exp(-(t - t_recovered) / waning_rate)`. Only the
/// SIS rule table has waning; other models leave immunity untouched.
pub fn check_waning(context: &mut Context, disease: &DiseaseConfig, t: f64) {
    let RecoveryOutcome::ToSusceptible { waning_rate } = disease.recovery else {
        return;
    };
    let population = context.get_data_container_mut::<PopulationData>();
    for idx in 0..population.size() {
        if population.alive[idx]
            && population.compartment[idx] == Compartment::Susceptible
            && let Some(t_recovered) = population.t_recovered[idx]
        {
            population.immunity[idx] = (-(t - t_recovered) / waning_rate).exp();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgeDistribution, PopulationConfig};
    use crate::disease::{DiseaseConfig, DurationDistribution};
    use crate::network::ContactEdge;
    use crate::population::ContextPopulationExt;
    use crate::random::ContextRandomExt;

    fn init_context(seed: u64, size: usize) -> Context {
        let mut context = Context::new();
        context.init_random(seed);
        context.init_population(&PopulationConfig {
            size,
            initial_infected: 0,
            age: AgeDistribution::default(),
            aging: false,
        });
        context
    }

    fn set_edges(context: &mut Context, edges: &[(usize, usize)]) {
        let network = context.get_data_container_mut::<NetworkData>();
        network.edges = edges
            .iter()
            .map(|(a, b)| ContactEdge {
                a: AgentId(*a),
                b: AgentId(*b),
            })
            .collect();
    }

    #[test]
    fn zero_beta_never_transmits() {
        let disease = DiseaseConfig::sis(0.0, 0.5, 1.0);
        let mut context = init_context(1, 10);
        set_edges(
            &mut context,
            &[(0, 1), (0, 2), (1, 2), (3, 4), (5, 6), (7, 8)],
        );
        seed_infections(&mut context, &disease, 3).unwrap();

        for step in 1..50 {
            let new = check_infections(&mut context, &disease, 0.4, step as f64 * 0.4).unwrap();
            assert_eq!(new, 0);
        }
    }

    #[test]
    fn infection_is_decided_on_the_prestep_snapshot() {
        // Chain 0 - 1 - 2 with a certain per-step infection probability.
        // Agent 1 is infected this step, but agent 2's draw saw agent 1 as
        // susceptible, so the infection cannot cascade within one step.
        let disease = DiseaseConfig::sis(2.5, 0.5, 1.0); // beta * dt = 1.0
        let mut context = init_context(1, 3);
        set_edges(&mut context, &[(0, 1), (1, 2)]);
        seed_infections(&mut context, &disease, 1).unwrap();

        let new = check_infections(&mut context, &disease, 0.4, 0.4).unwrap();
        assert_eq!(new, 1);

        let population = context.get_data_container::<PopulationData>().unwrap();
        assert_eq!(population.compartment(AgentId(1)), Compartment::Infectious);
        assert_eq!(population.compartment(AgentId(2)), Compartment::Susceptible);
    }

    #[test]
    fn fully_immune_agents_are_never_infected() {
        let disease = DiseaseConfig::sis(2.5, 0.5, 1.0); // beta * dt = 1.0
        let mut context = init_context(1, 2);
        set_edges(&mut context, &[(0, 1)]);
        seed_infections(&mut context, &disease, 1).unwrap();
        {
            let population = context.get_data_container_mut::<PopulationData>();
            population.immunity[1] = 1.0;
            population.t_recovered[1] = Some(0.0);
        }

        let new = check_infections(&mut context, &disease, 0.4, 0.4).unwrap();
        assert_eq!(new, 0);
    }

    #[test]
    fn latency_progresses_at_the_sampled_time() {
        let disease = DiseaseConfig::seir(
            0.3,
            DurationDistribution::Constant { value: 2.0 },
            DurationDistribution::Constant { value: 5.0 },
            0.0,
        );
        let mut context = init_context(1, 1);
        set_prognoses(&mut context, &disease, AgentId(0), 0.0).unwrap();

        {
            let population = context.get_data_container::<PopulationData>().unwrap();
            assert_eq!(population.compartment(AgentId(0)), Compartment::Exposed);
            assert_eq!(population.t_exposed[0], Some(0.0));
            assert_eq!(population.t_infectious[0], Some(2.0));
            assert_eq!(population.t_recovered[0], Some(7.0));
        }

        check_progression(&mut context, 1.9);
        assert_eq!(
            context
                .get_data_container::<PopulationData>()
                .unwrap()
                .compartment(AgentId(0)),
            Compartment::Exposed
        );

        check_progression(&mut context, 2.0);
        assert_eq!(
            context
                .get_data_container::<PopulationData>()
                .unwrap()
                .compartment(AgentId(0)),
            Compartment::Infectious
        );
    }

    #[test]
    fn certain_death_fires_at_the_precomputed_time() {
        let disease = DiseaseConfig {
            beta: 0.3,
            latency: None,
            infectious_duration: DurationDistribution::Constant { value: 3.0 },
            p_death: 1.0,
            recovery: RecoveryOutcome::ToRecovered,
        };
        let mut context = init_context(1, 1);
        set_prognoses(&mut context, &disease, AgentId(0), 0.0).unwrap();

        {
            let population = context.get_data_container::<PopulationData>().unwrap();
            assert_eq!(population.t_dead[0], Some(3.0));
            assert_eq!(population.t_recovered[0], None);
        }

        check_resolution(&mut context, &disease, 2.9);
        let population = context.get_data_container::<PopulationData>().unwrap();
        assert_eq!(population.compartment(AgentId(0)), Compartment::Infectious);

        check_resolution(&mut context, &disease, 3.0);
        let population = context.get_data_container::<PopulationData>().unwrap();
        assert_eq!(population.compartment(AgentId(0)), Compartment::Dead);
        assert!(!population.is_alive(AgentId(0)));
        population.check_invariants(3.0).unwrap();
    }

    #[test]
    fn sis_recovery_restores_susceptibility_with_waning_immunity() {
        let waning_rate = 2.0;
        let disease = DiseaseConfig {
            beta: 0.3,
            latency: None,
            infectious_duration: DurationDistribution::Constant { value: 1.0 },
            p_death: 0.0,
            recovery: RecoveryOutcome::ToSusceptible { waning_rate },
        };
        let mut context = init_context(1, 1);
        set_prognoses(&mut context, &disease, AgentId(0), 0.0).unwrap();

        check_resolution(&mut context, &disease, 1.0);
        {
            let population = context.get_data_container::<PopulationData>().unwrap();
            assert_eq!(population.compartment(AgentId(0)), Compartment::Susceptible);
            assert_eq!(population.immunity(AgentId(0)), 1.0);
            assert_eq!(population.t_recovered[0], Some(1.0));
        }

        // Decay law: immunity(t) = exp(-(t - t_recovered) / waning_rate).
        for t in [1.0, 1.5, 3.0, 10.0] {
            check_waning(&mut context, &disease, t);
            let population = context.get_data_container::<PopulationData>().unwrap();
            let expected = (-(t - 1.0) / waning_rate).exp();
            assert_eq!(population.immunity(AgentId(0)), expected);
        }
    }

    #[test]
    fn reinfection_spends_previous_immunity() {
        let disease = DiseaseConfig::sis(0.3, 0.5, 1.0);
        let mut context = init_context(1, 1);
        {
            let population = context.get_data_container_mut::<PopulationData>();
            population.immunity[0] = 0.7;
            population.t_recovered[0] = Some(0.0);
        }
        set_prognoses(&mut context, &disease, AgentId(0), 2.0).unwrap();

        let population = context.get_data_container::<PopulationData>().unwrap();
        assert_eq!(population.immunity(AgentId(0)), 0.0);
        assert_eq!(population.t_exposed[0], Some(2.0));
        population.check_invariants(2.0).unwrap();
    }
}
