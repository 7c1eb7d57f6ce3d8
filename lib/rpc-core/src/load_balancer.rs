//! Host selection across the hosts registered for a target

use lru::LruCache;
use rand::seq::SliceRandom;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Number of routing keys whose round-robin position is remembered
pub const DEFAULT_CURSOR_CAPACITY: usize = 4096;

/// Load balancing strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LoadBalancingStrategy {
    /// Round-robin: distribute requests evenly across hosts
    #[default]
    RoundRobin,
    /// Random: pick a host uniformly at random
    Random,
}

/// Load balancer for selecting a host based on a strategy.
///
/// Round-robin keeps one cursor per routing key so interleaved resolutions of
/// different targets cannot pin a target to a single host. Cursors of the
/// least recently used keys are evicted once `capacity` keys are tracked; an
/// evicted key restarts at its first host.
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    cursors: Mutex<LruCache<String, usize>>,
}

impl LoadBalancer {
    /// Create a new load balancer with the specified strategy
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self::with_capacity(strategy, DEFAULT_CURSOR_CAPACITY)
    }

    /// Create a load balancer remembering at most `capacity` routing keys
    pub fn with_capacity(strategy: LoadBalancingStrategy, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            strategy,
            cursors: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn strategy(&self) -> &LoadBalancingStrategy {
        &self.strategy
    }

    /// Select a host for `key` from the list based on the configured strategy
    pub fn select<'a>(&self, key: &str, hosts: &'a [String]) -> Option<&'a String> {
        if hosts.is_empty() {
            return None;
        }

        match self.strategy {
            LoadBalancingStrategy::RoundRobin => self.select_round_robin(key, hosts),
            LoadBalancingStrategy::Random => hosts.choose(&mut rand::thread_rng()),
        }
    }

    fn select_round_robin<'a>(&self, key: &str, hosts: &'a [String]) -> Option<&'a String> {
        // A poisoned map only loses fairness, not correctness
        let mut cursors = self.cursors.lock().unwrap_or_else(|p| p.into_inner());
        let current = match cursors.get_mut(key) {
            Some(cursor) => {
                let current = *cursor;
                *cursor = current.wrapping_add(1);
                current
            }
            None => {
                cursors.put(key.to_string(), 1);
                0
            }
        };
        hosts.get(current % hosts.len())
    }

    /// Number of routing keys with a remembered round-robin position
    pub fn tracked_keys(&self) -> usize {
        self.cursors.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(LoadBalancingStrategy::default())
    }
}
