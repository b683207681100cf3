pub mod config;
mod context;
pub mod disease;
mod error;
mod hashing;
pub mod intervention;
pub mod log;
pub mod network;
pub mod population;
pub mod random;
pub mod results;
pub mod sim;
pub mod transition;

// All modules import `crate::TypeId` in case we want to change the underlying type of `TypeId`.
pub(crate) use std::any::TypeId;

pub(crate) type HashMap<K, V> = rustc_hash::FxHashMap<K, V>;

// Re-exported so that `define_rng!` expansions can name `$crate::rand` paths.
pub use rand;

pub use config::ScenarioConfig;
pub use context::{Context, DataPlugin};
pub use error::EpiError;
pub use population::{AgentId, Compartment};
pub use results::{ResultRow, ResultSeries};
pub use sim::{Simulation, SimulationClock};

// Replace with `typeid::of as type_of` if necessary.
#[inline(always)]
pub fn type_of<T: 'static>() -> TypeId {
    TypeId::of::<T>()
}
