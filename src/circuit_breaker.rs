use failsafe::{backoff, failure_policy, Config, StateMachine};
use std::time::Duration;

/// Breaker type guarding a single provider.
pub type ProviderCircuitBreaker =
    StateMachine<failure_policy::ConsecutiveFailures<backoff::Exponential>, ()>;

/// Creates the circuit breaker placed in front of each provider adapter.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive outages (transport, timeout, 5xx, 429) open the circuit.
/// - **Backoff**: Exponential backoff from 10s to 60s before a trial call is let through.
///
/// While open, fetches fail fast and the orchestrator treats the rejection as
/// an ordinary provider failure, so fallback still applies.
pub fn create_provider_circuit_breaker() -> ProviderCircuitBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}
