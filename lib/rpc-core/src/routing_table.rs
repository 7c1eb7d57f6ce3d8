//! Target to host resolution with bounded retries against the matchmaker

use crate::load_balancer::{LoadBalancer, LoadBalancingStrategy};
use crate::matchmaker::Matchmaker;
use crate::policy::RetryPolicy;
use crate::{CoreError, Result};
use rpc_api::Target;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

/// State of one resolution; lives only for the duration of a call
struct RoutingEntry {
    key: String,
    attempts: u32,
    started: Instant,
    last_error: Option<CoreError>,
}

impl RoutingEntry {
    fn new(target: &Target) -> Self {
        Self {
            key: target.key(),
            attempts: 0,
            started: Instant::now(),
            last_error: None,
        }
    }

    fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Error ending a resolution whose budget is spent.
    ///
    /// A registry that was still unreachable on the last attempt is reported
    /// as such; only a registry that answered with no hosts is exhaustion.
    fn give_up(self) -> CoreError {
        let elapsed = self.elapsed();
        if let Some(error) = self.last_error {
            warn!(
                target = %self.key, attempts = self.attempts, ?elapsed, %error,
                "Giving up resolving target, registry unavailable"
            );
            return error;
        }

        debug!(
            target = %self.key, attempts = self.attempts, ?elapsed,
            "Giving up resolving target, no hosts registered"
        );
        CoreError::RetryExhausted {
            target: self.key,
            attempts: self.attempts,
            elapsed,
        }
    }
}

/// RoutingTable resolves targets to the hosts a message must be sent to.
///
/// The matchmaker is queried on every call; nothing is cached across calls.
pub struct RoutingTable {
    matchmaker: Arc<dyn Matchmaker>,
    policy: RetryPolicy,
    balancer: LoadBalancer,
}

impl RoutingTable {
    pub fn new(matchmaker: Arc<dyn Matchmaker>, policy: RetryPolicy) -> Self {
        Self::with_strategy(matchmaker, policy, LoadBalancingStrategy::RoundRobin)
    }

    pub fn with_strategy(
        matchmaker: Arc<dyn Matchmaker>,
        policy: RetryPolicy,
        strategy: LoadBalancingStrategy,
    ) -> Self {
        Self {
            matchmaker,
            policy,
            balancer: LoadBalancer::new(strategy),
        }
    }

    pub fn matchmaker(&self) -> &Arc<dyn Matchmaker> {
        &self.matchmaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One host for point-to-point delivery.
    ///
    /// Fails with [`CoreError::RetryExhausted`] when no host showed up within
    /// the retry budget, or with [`CoreError::RegistryUnavailable`] when the
    /// registry could not be reached on the last attempt.
    pub async fn get_routable_host(&self, target: &Target) -> Result<String> {
        let key = target.key();
        let hosts = self.resolve(target).await?;
        let host = self
            .balancer
            .select(&key, &hosts)
            .cloned()
            .ok_or_else(|| CoreError::Internal(format!("empty host set for {}", key)))?;
        debug!(target = %key, host = %host, "Resolved routable host");
        Ok(host)
    }

    /// Every host of the target for broadcast delivery.
    ///
    /// An exhausted retry budget yields an empty set; an unreachable registry
    /// is still an error.
    pub async fn get_all_hosts(&self, target: &Target) -> Result<Vec<String>> {
        match self.resolve(target).await {
            Ok(hosts) => Ok(hosts),
            Err(CoreError::RetryExhausted { .. }) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn resolve(&self, target: &Target) -> Result<Vec<String>> {
        target.validate()?;
        let mut entry = RoutingEntry::new(target);

        loop {
            entry.attempts += 1;
            match self.query(target, entry.elapsed()).await {
                Some(Ok(hosts)) if !hosts.is_empty() => return Ok(hosts),
                Some(Ok(_)) => {
                    debug!(target = %entry.key, attempt = entry.attempts, "No hosts registered yet");
                    entry.last_error = None;
                }
                Some(Err(e)) if e.is_retryable() => {
                    debug!(target = %entry.key, attempt = entry.attempts, error = %e, "Host query failed");
                    entry.last_error = Some(e);
                }
                Some(Err(e)) => return Err(e),
                None => {
                    debug!(target = %entry.key, attempt = entry.attempts, "Host query cut off by deadline");
                    entry.last_error = None;
                    return Err(entry.give_up());
                }
            }

            match self.policy.next_delay(entry.attempts, entry.elapsed()) {
                Some(delay) => time::sleep(delay).await,
                None => return Err(entry.give_up()),
            }
        }
    }

    /// Query the matchmaker, bounded by what is left of the overall deadline.
    ///
    /// `None` means the deadline passed before the matchmaker answered.
    async fn query(&self, target: &Target, elapsed: Duration) -> Option<Result<Vec<String>>> {
        match self.policy.remaining(elapsed) {
            Some(remaining) if remaining.is_zero() => None,
            Some(remaining) => time::timeout(remaining, self.matchmaker.get_hosts(target))
                .await
                .ok(),
            None => Some(self.matchmaker.get_hosts(target).await),
        }
    }
}
