//! One-at-a-time service registration.
//!
//! Real stacks reject overlapping `add_service` calls, so the sequencer keeps
//! at most one submission outstanding and only submits the next service once
//! the pending one is acknowledged.
//!
//! ```text
//! Idle ──start──▶ Registering(0) ──ack ok──▶ Registering(1) ──▶ … ──▶ Done
//!                      │  ▲
//!              ack fail│  │resubmit (once)
//!                      ▼  │
//!                  Registering(0, attempt 2) ──ack fail──▶ Failed
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::attribute::AttributeTree;
use crate::driver::{DriverError, RadioDriver};

/// Submissions of one service before giving up.
pub const MAX_ATTEMPTS: u8 = 2;

/// Errors that end registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The driver negatively acknowledged a service on every attempt.
    #[error("service {uuid} rejected after {attempts} attempts")]
    ServiceRejected {
        /// Rejected service.
        uuid: Uuid,
        /// Attempts made.
        attempts: u8,
    },

    /// The driver refused a submission.
    #[error("driver refused service submission: {0}")]
    Driver(#[from] DriverError),
}

/// Sequencer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RegistrationState {
    /// Not started.
    #[default]
    Idle,
    /// Waiting for the acknowledgement of `services[index]`.
    Registering {
        /// Index of the pending service.
        index: usize,
        /// Submissions made for it so far.
        attempt: u8,
    },
    /// Every service is registered.
    Done,
    /// Registration stopped at a service.
    Failed {
        /// Service that could not be registered.
        service: Uuid,
    },
}

/// What an acknowledgement did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// Stale, duplicate, or arrived outside `Registering`.
    Ignored,
    /// The pending service was resubmitted after a failure.
    Retried(Uuid),
    /// The next service was submitted.
    Advanced(Uuid),
    /// The last service was registered.
    Completed,
}

/// Registration progress for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegistrationProgress {
    /// Current state.
    pub state: RegistrationState,
    /// Services acknowledged so far.
    pub registered: usize,
    /// Services to register.
    pub total: usize,
}

/// Drives service registration against a [`RadioDriver`].
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistrationSequencer {
    services: Vec<Uuid>,
    state: RegistrationState,
}

impl ServiceRegistrationSequencer {
    /// A sequencer in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RegistrationState {
        self.state
    }

    /// UUID of the service awaiting acknowledgement.
    #[must_use]
    pub fn pending(&self) -> Option<Uuid> {
        match self.state {
            RegistrationState::Registering { index, .. } => self.services.get(index).copied(),
            _ => None,
        }
    }

    /// Progress summary.
    #[must_use]
    pub fn progress(&self) -> RegistrationProgress {
        let registered = match self.state {
            RegistrationState::Idle => 0,
            RegistrationState::Registering { index, .. } => index,
            RegistrationState::Done => self.services.len(),
            RegistrationState::Failed { service } => self
                .services
                .iter()
                .position(|s| *s == service)
                .unwrap_or(0),
        };
        RegistrationProgress {
            state: self.state,
            registered,
            total: self.services.len(),
        }
    }

    /// Starts registering the tree's services in order. No-op unless `Idle`.
    ///
    /// Returns `true` when registration is already complete (no services).
    ///
    /// # Errors
    ///
    /// `Driver` if the first submission is refused; the sequencer is then `Failed`.
    pub fn start<D: RadioDriver>(
        &mut self,
        tree: &AttributeTree,
        driver: &mut D,
    ) -> Result<bool, RegistrationError> {
        if self.state != RegistrationState::Idle {
            debug!(state = ?self.state, "registration already started");
            return Ok(self.state == RegistrationState::Done);
        }
        self.services = tree
            .services_in_registration_order()
            .iter()
            .map(|s| s.uuid)
            .collect();
        if self.services.is_empty() {
            self.state = RegistrationState::Done;
            return Ok(true);
        }
        info!(services = self.services.len(), "registering services");
        self.submit(0, 1, tree, driver)?;
        Ok(false)
    }

    /// Handles an `add_service` acknowledgement.
    ///
    /// # Errors
    ///
    /// `ServiceRejected` once the pending service failed [`MAX_ATTEMPTS`]
    /// times; `Driver` if a follow-up submission is refused. Either way the
    /// sequencer ends in `Failed` and the index never advances.
    pub fn on_registration_ack<D: RadioDriver>(
        &mut self,
        uuid: Uuid,
        success: bool,
        tree: &AttributeTree,
        driver: &mut D,
    ) -> Result<AckOutcome, RegistrationError> {
        let RegistrationState::Registering { index, attempt } = self.state else {
            debug!(%uuid, state = ?self.state, "ignoring registration ack outside registration");
            return Ok(AckOutcome::Ignored);
        };
        if self.services.get(index) != Some(&uuid) {
            debug!(%uuid, index, "ignoring stale registration ack");
            return Ok(AckOutcome::Ignored);
        }

        if !success {
            if attempt >= MAX_ATTEMPTS {
                self.state = RegistrationState::Failed { service: uuid };
                return Err(RegistrationError::ServiceRejected {
                    uuid,
                    attempts: attempt,
                });
            }
            warn!(%uuid, attempt, "service registration rejected, retrying");
            self.submit(index, attempt + 1, tree, driver)?;
            return Ok(AckOutcome::Retried(uuid));
        }

        debug!(%uuid, index, "service registered");
        let next = index + 1;
        match self.services.get(next).copied() {
            Some(next_uuid) => {
                self.submit(next, 1, tree, driver)?;
                Ok(AckOutcome::Advanced(next_uuid))
            }
            None => {
                self.state = RegistrationState::Done;
                info!(services = self.services.len(), "all services registered");
                Ok(AckOutcome::Completed)
            }
        }
    }

    fn submit<D: RadioDriver>(
        &mut self,
        index: usize,
        attempt: u8,
        tree: &AttributeTree,
        driver: &mut D,
    ) -> Result<(), RegistrationError> {
        let uuid = self.services[index];
        self.state = RegistrationState::Registering { index, attempt };
        let Some(service) = tree.service(uuid) else {
            self.state = RegistrationState::Failed { service: uuid };
            return Err(RegistrationError::ServiceRejected {
                uuid,
                attempts: attempt,
            });
        };
        if let Err(e) = driver.add_service(service) {
            self.state = RegistrationState::Failed { service: uuid };
            return Err(e.into());
        }
        Ok(())
    }
}
