/*!

Named, independently seeded random number streams.

Every stochastic concern of the simulation (transmission draws, prognosis
sampling, network construction, intervention acceptance) owns its own stream,
declared with [`define_rng!`]. Each stream is seeded with
`base_seed + hash(stream name)`, so two runs with the same base seed produce
identical draws per stream no matter how the other streams are consumed.

*/

use crate::{
    TypeId, context::Context, context::DataPlugin, hashing::hash_str, type_of,
};
use rand::{
    Rng, SeedableRng,
    distr::uniform::{SampleRange, SampleUniform},
    prelude::Distribution,
};
use std::any::Any;

pub trait RngId: Any {
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn(u64) -> Self;
    #[allow(non_upper_case_globals)]
    const name: &'static str;
    type RngType: SeedableRng;
    fn rng(&mut self) -> &mut Self::RngType;
}

struct RngPlugin {
    base_seed: u64,
    // This is actually a `HashMap<TypeId, Box<dyn RngId>>`.
    rng_map: crate::HashMap<TypeId, Box<dyn Any>>,
}

impl RngPlugin {
    fn clear(&mut self) {
        self.rng_map.clear();
    }

    fn get_rng<R: RngId>(&mut self) -> &mut R::RngType {
        let base_seed = self.base_seed;
        self.rng_map
            .entry(type_of::<R>())
            .or_insert_with(|| {
                let seed = base_seed.wrapping_add(hash_str(R::name));
                Box::new(R::new(seed))
            })
            .downcast_mut::<R>()
            .unwrap() // Will never panic as the entry has the matching type
            .rng()
    }
}

impl DataPlugin for RngPlugin {
    const new: &'static dyn Fn() -> Self = &|| RngPlugin {
        base_seed: 0,
        rng_map: crate::HashMap::default(),
    };
}

/// Gets a mutable reference to the random number generator associated with the given
/// `RngId`.
// This is a private free function so that it's not leaked to the public API.
fn get_rng<R: RngId>(context: &mut Context) -> &mut R::RngType {
    let rng_container = context.get_data_container_mut::<RngPlugin>();
    rng_container.get_rng::<R>()
}

pub trait ContextRandomExt {
    fn init_random(&mut self, base_seed: u64);

    /// Gets a random sample from the random number generator associated with the given
    /// `RngId` by applying the specified sampler function. If the Rng has not been used
    /// before, one will be created seeded from the base seed set in `init_random`.
    fn sample<R: RngId + 'static, T>(&mut self, sampler: impl FnOnce(&mut R::RngType) -> T) -> T;

    /// Gets a random sample from the specified distribution using the generator
    /// associated with the given `RngId`.
    fn sample_distr<R: RngId + 'static, T>(&mut self, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng;

    /// Gets a random sample within the range provided by `range`
    /// using the generator associated with the given `RngId`.
    fn sample_range<R: RngId + 'static, S, T>(&mut self, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform;

    /// Gets a random boolean value which is true with probability `p`
    /// using the generator associated with the given `RngId`.
    fn sample_bool<R: RngId + 'static>(&mut self, p: f64) -> bool
    where
        R::RngType: Rng;
}

impl ContextRandomExt for Context {
    /// Initializes the `RngPlugin` data container to store rngs as well as a base
    /// seed. Note that rngs are created lazily when `get_rng` is called.
    fn init_random(&mut self, base_seed: u64) {
        log::trace!("initializing random module with seed {base_seed}");
        let rng_container = self.get_data_container_mut::<RngPlugin>();
        rng_container.base_seed = base_seed;

        // Clear any existing Rngs to ensure they get re-seeded when `get_rng` is called
        rng_container.clear();
    }

    fn sample<R: RngId + 'static, T>(&mut self, sampler: impl FnOnce(&mut R::RngType) -> T) -> T {
        let rng = get_rng::<R>(self);
        sampler(rng)
    }

    fn sample_distr<R: RngId + 'static, T>(&mut self, distribution: impl Distribution<T>) -> T
    where
        R::RngType: Rng,
    {
        let rng = get_rng::<R>(self);
        distribution.sample::<R::RngType>(rng)
    }

    fn sample_range<R: RngId + 'static, S, T>(&mut self, range: S) -> T
    where
        R::RngType: Rng,
        S: SampleRange<T>,
        T: SampleUniform,
    {
        self.sample::<R, T>(|rng| rng.random_range(range))
    }

    fn sample_bool<R: RngId + 'static>(&mut self, p: f64) -> bool
    where
        R::RngType: Rng,
    {
        self.sample::<R, bool>(|rng| rng.random_bool(p))
    }
}

#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        define_rng!($random_id, $crate::rand::rngs::StdRng);
    };
    ($random_id:ident, $rng_type:ty) => {
        struct $random_id {
            rng: $rng_type,
        }

        impl $crate::random::RngId for $random_id {
            type RngType = $rng_type;
            #[allow(non_upper_case_globals)]
            const name: &'static str = stringify!($random_id);
            #[allow(non_upper_case_globals)]
            const new: &'static dyn Fn(u64) -> Self = &|seed| {
                use $crate::rand::SeedableRng;
                Self {
                    rng: <$rng_type>::seed_from_u64(seed),
                }
            };

            fn rng(&mut self) -> &mut Self::RngType {
                &mut self.rng
            }
        }
    };
}
#[allow(unused_imports)]
pub use define_rng;

#[cfg(test)]
mod test {
    use crate::context::Context;
    use crate::random::ContextRandomExt;
    use rand::RngCore;

    define_rng!(FooRng);
    define_rng!(BarRng);

    #[test]
    fn get_rng_basic() {
        let mut context = Context::new();
        context.init_random(42);

        assert_ne!(
            context.sample::<FooRng, _>(RngCore::next_u64),
            context.sample::<FooRng, _>(RngCore::next_u64)
        );
    }

    #[test]
    fn multiple_rng_types() {
        let mut context = Context::new();
        context.init_random(42);

        assert_ne!(
            context.sample::<FooRng, _>(RngCore::next_u64),
            context.sample::<BarRng, _>(RngCore::next_u64)
        );
    }

    #[test]
    fn reset_seed() {
        let mut context = Context::new();
        context.init_random(42);

        let run_0 = context.sample::<FooRng, _>(RngCore::next_u64);
        let run_1 = context.sample::<FooRng, _>(RngCore::next_u64);

        // Reset with same seed, ensure we get the same values
        context.init_random(42);
        assert_eq!(run_0, context.sample::<FooRng, _>(RngCore::next_u64));
        assert_eq!(run_1, context.sample::<FooRng, _>(RngCore::next_u64));

        // Reset with different seed, ensure we get different values
        context.init_random(88);
        assert_ne!(run_0, context.sample::<FooRng, _>(RngCore::next_u64));
        assert_ne!(run_1, context.sample::<FooRng, _>(RngCore::next_u64));
    }

    #[test]
    fn streams_are_independent_of_each_other() {
        // Draws from one stream must not perturb another stream.
        let mut context = Context::new();
        context.init_random(42);
        let _ = context.sample::<BarRng, _>(RngCore::next_u64);
        let foo_after_bar = context.sample::<FooRng, _>(RngCore::next_u64);

        context.init_random(42);
        let foo_alone = context.sample::<FooRng, _>(RngCore::next_u64);

        assert_eq!(foo_after_bar, foo_alone);
    }

    #[test]
    fn sample_range() {
        let mut context = Context::new();
        context.init_random(42);
        let result = context.sample_range::<FooRng, _, i32>(0..10);
        assert!((0..10).contains(&result));
    }

    #[test]
    fn sample_bool() {
        let mut context = Context::new();
        context.init_random(42);
        assert!(context.sample_bool::<FooRng>(1.0));
        assert!(!context.sample_bool::<FooRng>(0.0));
    }
}
