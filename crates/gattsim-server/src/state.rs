//! Application state shared across handlers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use gattsim_core::{DomainEvent, PeripheralHandle};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use utoipa::ToSchema;

/// Number of domain events kept for `/api/events`.
pub const EVENT_LOG_CAPACITY: usize = 200;

/// A domain event with the time the server saw it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordedEvent {
    /// When the event was received.
    #[schema(example = "2025-01-15T03:30:00Z")]
    pub received_at_utc: DateTime<Utc>,

    /// The event.
    pub event: DomainEvent,
}

/// Handlers take the state through this alias.
pub type SharedState = AppState;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    peripheral: PeripheralHandle,
    events: RwLock<VecDeque<RecordedEvent>>,
    started_at: Instant,
}

impl AppState {
    /// Create new application state around a running peripheral.
    pub fn new(peripheral: PeripheralHandle) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                peripheral,
                events: RwLock::new(VecDeque::with_capacity(EVENT_LOG_CAPACITY)),
                started_at: Instant::now(),
            }),
        }
    }

    /// Handle to the peripheral task.
    pub fn peripheral(&self) -> &PeripheralHandle {
        &self.inner.peripheral
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }

    /// The most recent `limit` events, oldest first.
    pub async fn recent_events(&self, limit: usize) -> Vec<RecordedEvent> {
        let events = self.inner.events.read().await;
        let skip = events.len().saturating_sub(limit);
        events.iter().skip(skip).cloned().collect()
    }

    async fn record(&self, event: DomainEvent) {
        let mut events = self.inner.events.write().await;
        if events.len() == EVENT_LOG_CAPACITY {
            events.pop_front();
        }
        events.push_back(RecordedEvent {
            received_at_utc: Utc::now(),
            event,
        });
    }

    /// Spawns a task copying domain events into the bounded event log until
    /// the peripheral stops.
    pub fn spawn_event_recorder(&self) -> JoinHandle<()> {
        let state = self.clone();
        let mut rx = self.inner.peripheral.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => state.record(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event log fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("event stream closed");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast;

    #[tokio::test]
    async fn test_event_log_is_bounded() {
        let (events, _) = broadcast::channel(4);
        let (handle, _rx) = gattsim_core::runtime::channel(4, events);
        let state = AppState::new(handle);

        for count in 0..EVENT_LOG_CAPACITY + 5 {
            state
                .record(DomainEvent::ConnectedDevicesChanged {
                    count,
                    devices: vec![],
                })
                .await;
        }

        let all = state.recent_events(usize::MAX).await;
        assert_eq!(all.len(), EVENT_LOG_CAPACITY);
        assert!(matches!(
            all[0].event,
            DomainEvent::ConnectedDevicesChanged { count: 5, .. }
        ));

        let last = state.recent_events(1).await;
        assert!(matches!(
            last[0].event,
            DomainEvent::ConnectedDevicesChanged { count, .. } if count == EVENT_LOG_CAPACITY + 4
        ));
    }
}
