/*!

The contact network: a fixed set of undirected contact channels built once at
initialization from agent positions.

Construction is a distance-biased random ranking: every ordered pair gets a
weight `1 + d/spatial_scale` and an independent uniform draw `r`, pairs are
ranked by `w/r` ascending, and the best `size * n_contacts / 2` become edges.
Closer agents are more likely to be connected, with full-population
randomness as the tie-breaker — a cheap proxy for small-world spatial
structure. Time-varying networks are a documented extension, not built here.

*/

use crate::config::NetworkConfig;
use crate::context::{Context, DataPlugin};
use crate::define_rng;
use crate::error::EpiError;
use crate::population::{AgentId, PopulationData};
use crate::random::ContextRandomExt;

define_rng!(NetworkRng);

/// One contact channel between two agents. Transmission is checked in both
/// directions, so the pair is effectively unordered.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ContactEdge {
    pub a: AgentId,
    pub b: AgentId,
}

#[derive(Default)]
pub struct NetworkData {
    pub(crate) edges: Vec<ContactEdge>,
}

impl DataPlugin for NetworkData {
    const new: &'static dyn Fn() -> Self = &NetworkData::default;
}

impl NetworkData {
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> impl Iterator<Item = ContactEdge> + '_ {
        self.edges.iter().copied()
    }
}

pub trait ContextNetworkExt {
    /// Builds the fixed contact-edge set from the current population's
    /// positions. Deterministic given the base seed. The population must be
    /// initialized first.
    fn build_contact_network(&mut self, config: &NetworkConfig) -> Result<(), EpiError>;

    fn contact_count(&self) -> usize;
}

impl ContextNetworkExt for Context {
    fn build_contact_network(&mut self, config: &NetworkConfig) -> Result<(), EpiError> {
        let (xs, ys) = {
            let population = self.get_data_container::<PopulationData>().ok_or_else(|| {
                EpiError::Config(
                    "population must be initialized before the contact network".to_string(),
                )
            })?;
            (population.x.clone(), population.y.clone())
        };
        let size = xs.len();
        if size == 0 {
            return Err(EpiError::Config(
                "population must be initialized before the contact network".to_string(),
            ));
        }

        // Edge case: the target may exceed the number of available pairs
        // (small populations, large n_contacts); clamp to all pairs.
        let available_pairs = size * (size - 1);
        let target = usize::min(
            size * config.n_contacts as usize / 2,
            available_pairs,
        );

        log::trace!("ranking {available_pairs} ordered pairs for {target} contacts");

        // Rank every ordered pair by weight / uniform-draw, ascending.
        // ToDo: replace the full pair sort with a bounded selection so that
        //       populations much larger than ~10^4 don't pay O(N^2 log N).
        let mut ranked: Vec<(f64, u32, u32)> = Vec::with_capacity(available_pairs);
        for i in 0..size {
            for j in 0..size {
                if i == j {
                    continue; // self-pairs have infinite weight
                }
                let distance = ((xs[i] - xs[j]).powi(2) + (ys[i] - ys[j]).powi(2)).sqrt();
                let weight = 1.0 + distance / config.spatial_scale;
                let r = self.sample_range::<NetworkRng, _, f64>(f64::EPSILON..1.0);
                ranked.push((weight / r, i as u32, j as u32));
            }
        }
        ranked.sort_unstable_by(|lhs, rhs| f64::total_cmp(&lhs.0, &rhs.0));
        ranked.truncate(target);

        let network = self.get_data_container_mut::<NetworkData>();
        network.edges = ranked
            .into_iter()
            .map(|(_, i, j)| ContactEdge {
                a: AgentId(i as usize),
                b: AgentId(j as usize),
            })
            .collect();
        Ok(())
    }

    fn contact_count(&self) -> usize {
        match self.get_data_container::<NetworkData>() {
            None => 0,
            Some(network) => network.edge_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgeDistribution, NetworkConfig, PopulationConfig};
    use crate::population::ContextPopulationExt;

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

    fn edges_for(seed: u64, size: usize, config: &NetworkConfig) -> Vec<ContactEdge> {
        let mut context = init_context(seed, size);
        context.build_contact_network(config).unwrap();
        context
            .get_data_container::<NetworkData>()
            .unwrap()
            .edges
            .clone()
    }

    #[test]
    fn builds_the_target_number_of_contacts() {
        let config = NetworkConfig {
            n_contacts: 10,
            spatial_scale: 0.1,
        };
        let mut context = init_context(1, 200);
        context.build_contact_network(&config).unwrap();
        assert_eq!(context.contact_count(), 200 * 10 / 2);
    }

    #[test]
    fn no_self_contacts() {
        let config = NetworkConfig {
            n_contacts: 8,
            spatial_scale: 0.1,
        };
        for edge in edges_for(3, 100, &config) {
            assert_ne!(edge.a, edge.b);
        }
    }

    #[test]
    fn clamps_to_available_pairs() {
        // 4 agents have 12 ordered pairs; a target of 4 * 10 / 2 = 20 must
        // clamp to 12.
        let config = NetworkConfig {
            n_contacts: 10,
            spatial_scale: 0.1,
        };
        assert_eq!(edges_for(1, 4, &config).len(), 12);
    }

    #[test]
    fn deterministic_given_seed() {
        let config = NetworkConfig {
            n_contacts: 10,
            spatial_scale: 0.1,
        };
        assert_eq!(edges_for(7, 150, &config), edges_for(7, 150, &config));
        assert_ne!(edges_for(7, 150, &config), edges_for(8, 150, &config));
    }

    #[test]
    fn closer_agents_are_favored() {
        let config = NetworkConfig {
            n_contacts: 4,
            spatial_scale: 0.05,
        };
        let mut context = init_context(11, 200);
        context.build_contact_network(&config).unwrap();

        let population = context.get_data_container::<PopulationData>().unwrap();
        let network = context.get_data_container::<NetworkData>().unwrap();
        let mean_edge_distance: f64 = network
            .edges()
            .map(|edge| {
                let (ax, ay) = population.position(edge.a);
                let (bx, by) = population.position(edge.b);
                ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
            })
            .sum::<f64>()
            / network.edge_count() as f64;

        // Uniform random pairs in the unit square average ~0.52 apart.
        assert!(mean_edge_distance < 0.3, "mean edge distance {mean_edge_distance}");
    }

    #[test]
    fn fails_without_a_population() {
        let mut context = Context::new();
        context.init_random(1);
        let result = context.build_contact_network(&NetworkConfig {
            n_contacts: 10,
            spatial_scale: 0.1,
        });
        assert!(matches!(result, Err(EpiError::Config(_))));
    }
}
