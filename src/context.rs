use crate::{HashMap, TypeId, type_of};
use std::any::Any;

/// An object-safe trait for the typed data containers a [`Context`] can hold.
/// The constructor constant lets the context create a container lazily the
/// first time it is asked for.
pub trait DataPlugin: Any + 'static {
    /// A constant reference to a constructor.
    #[allow(non_upper_case_globals)]
    const new: &'static dyn Fn() -> Self;
}

/// The shared store for all simulation state. Each functional area (agents,
/// network, rng streams, interventions, results) owns one data plugin and
/// exposes its API as an extension trait on `Context`.
pub struct Context {
    // This is actually a `HashMap<TypeId, Box<dyn DataPlugin>>` but must be declared this way
    // to avoid having to implement an `as_any()` method on everything.
    data_plugins: HashMap<TypeId, Box<dyn Any>>,
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Context {
            data_plugins: HashMap::default(),
        }
    }

    /// Returns a mutable reference to the data container for `T`, creating it if it
    /// doesn't exist yet.
    pub fn get_data_container_mut<T: DataPlugin>(&mut self) -> &mut T {
        self.data_plugins
            .entry(type_of::<T>())
            .or_insert_with(|| Box::new(<T as DataPlugin>::new()))
            .downcast_mut::<T>()
            .unwrap() // Will never panic as data container has the matching type
    }

    /// Returns a reference to the data container for `T` if it exists.
    /// If you need a mutable reference or lazy instantiation, use
    /// [`Context::get_data_container_mut()`].
    pub fn get_data_container<T: DataPlugin>(&self) -> Option<&T> {
        if let Some(data) = self.data_plugins.get(&type_of::<T>()) {
            data.downcast_ref::<T>()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CounterPlugin {
        count: usize,
    }

    impl DataPlugin for CounterPlugin {
        const new: &'static dyn Fn() -> Self = &|| CounterPlugin { count: 0 };
    }

    struct LabelPlugin {
        labels: Vec<&'static str>,
    }

    impl DataPlugin for LabelPlugin {
        const new: &'static dyn Fn() -> Self = &|| LabelPlugin { labels: Vec::new() };
    }

    #[test]
    fn lazily_creates_containers() {
        let mut context = Context::new();
        assert!(context.get_data_container::<CounterPlugin>().is_none());

        context.get_data_container_mut::<CounterPlugin>().count += 3;
        assert_eq!(context.get_data_container::<CounterPlugin>().unwrap().count, 3);
    }

    #[test]
    fn containers_are_independent_per_type() {
        let mut context = Context::new();
        context.get_data_container_mut::<CounterPlugin>().count = 7;
        context
            .get_data_container_mut::<LabelPlugin>()
            .labels
            .push("duck");

        assert_eq!(context.get_data_container::<CounterPlugin>().unwrap().count, 7);
        assert_eq!(
            context.get_data_container::<LabelPlugin>().unwrap().labels,
            vec!["duck"]
        );
    }
}
