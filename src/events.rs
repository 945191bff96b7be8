//! Structured service events (provider failures and fallbacks).

use crate::models::ProviderId;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceEvent {
    ProviderFailure {
        provider: ProviderId,
        code: String,
    },
    ProviderFallback {
        original_provider: ProviderId,
        fallback_to: ProviderId,
        reason: String,
    },
}

impl ServiceEvent {
    pub fn title(&self) -> &'static str {
        match self {
            ServiceEvent::ProviderFailure { .. } => "Provider Failure",
            ServiceEvent::ProviderFallback { .. } => "Provider Fallback",
        }
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, event: &ServiceEvent);
}

/// Writes every event as a structured tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: &ServiceEvent) {
        match event {
            ServiceEvent::ProviderFailure { provider, code } => {
                tracing::warn!(
                    title = event.title(),
                    provider = provider.as_str(),
                    code = code.as_str(),
                    "Provider Failure"
                );
            }
            ServiceEvent::ProviderFallback {
                original_provider,
                fallback_to,
                reason,
            } => {
                tracing::warn!(
                    title = event.title(),
                    original_provider = original_provider.as_str(),
                    fallback_to = fallback_to.as_str(),
                    reason = reason.as_str(),
                    "Provider Fallback"
                );
            }
        }
    }
}

/// Keeps events in memory (and still logs them). Handy for callers that want
/// to inspect what happened during a calculation.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<ServiceEvent>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ServiceEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn fallbacks(&self) -> Vec<(ProviderId, ProviderId)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ServiceEvent::ProviderFallback {
                    original_provider,
                    fallback_to,
                    ..
                } => Some((original_provider, fallback_to)),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn record(&self, event: &ServiceEvent) {
        TracingEventSink.record(event);
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingEventSink::new();
        sink.record(&ServiceEvent::ProviderFailure {
            provider: ProviderId::Equifax,
            code: "EQUIFAX_TIMEOUT".into(),
        });
        sink.record(&ServiceEvent::ProviderFallback {
            original_provider: ProviderId::Equifax,
            fallback_to: ProviderId::Mym,
            reason: "EQUIFAX_TIMEOUT".into(),
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].title(), "Provider Fallback");
        assert_eq!(sink.fallbacks(), vec![(ProviderId::Equifax, ProviderId::Mym)]);
    }
}
