//! Provider/counter inclusion decisions.

use fxhash::{FxHashMap, FxHashSet};

/// Decides which counter samples are emitted to the sinks.
///
/// The filter maps a provider name to an optional set of counter names:
/// no set means every counter of that provider is included. A provider that
/// was never registered is excluded, unless the filter is the
/// [all-counters sentinel](CounterFilter::all_counters).
///
/// Matching is a case-sensitive exact comparison on both names; there is no
/// globbing and no normalization.
#[derive(Debug, Clone, Default)]
pub struct CounterFilter {
    include_all: bool,
    providers: FxHashMap<String, Option<FxHashSet<String>>>,
}

impl CounterFilter {
    /// An empty filter, which includes nothing until providers are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// The sentinel filter that includes every counter of every provider.
    pub fn all_counters() -> Self {
        Self {
            include_all: true,
            providers: FxHashMap::default(),
        }
    }

    /// Registers a provider, optionally restricted to an explicit set of
    /// counter names (`None` includes every counter of the provider).
    ///
    /// Registering the same provider twice is additive: explicit sets merge,
    /// and registering once without a restriction lifts any restriction
    /// registered before or after.
    pub fn add_filter(&mut self, provider: &str, counters: Option<&[String]>) {
        use std::collections::hash_map::Entry;

        match self.providers.entry(provider.to_owned()) {
            Entry::Vacant(entry) => {
                entry.insert(counters.map(|cs| cs.iter().cloned().collect()));
            }
            Entry::Occupied(mut entry) => match (entry.get_mut(), counters) {
                // Already unrestricted: stays unrestricted.
                (None, _) => {}
                // A registration without a set lifts the restriction.
                (slot, None) => *slot = None,
                (Some(set), Some(cs)) => set.extend(cs.iter().cloned()),
            },
        }
    }

    /// Whether the sample `(provider, counter)` should be emitted.
    pub fn include(&self, provider: &str, counter: &str) -> bool {
        if self.include_all {
            return true;
        }
        match self.providers.get(provider) {
            Some(None) => true,
            Some(Some(set)) => set.contains(counter),
            None => false,
        }
    }
}
