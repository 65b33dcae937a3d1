//! Single-task runtime around a [`Peripheral`].
//!
//! Driver events, scheduler ticks and host requests all end up on one task
//! that owns the peripheral, so no state is ever touched concurrently.
//! Hosts talk to that task through a cloneable [`PeripheralHandle`].

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::att::AttStatus;
use crate::connection::DeviceId;
use crate::driver::RadioDriver;
use crate::error::{GattSimError, Result};
use crate::events::{DomainEvent, DriverEvent};
use crate::peripheral::Peripheral;
use crate::router::WriteOutcome;
use crate::types::PeripheralSnapshot;

/// Capacity of the command queue.
pub const COMMAND_QUEUE_CAPACITY: usize = 64;

/// A request for the peripheral task.
#[derive(Debug)]
pub enum Command {
    /// Apply a driver event; used to inject simulated peer activity.
    Driver(DriverEvent),
    /// Regenerate values and notify subscribers.
    Tick,
    /// Rebuild the advertising data.
    RefreshAdvertising,
    /// Return a snapshot of the peripheral.
    Snapshot(oneshot::Sender<PeripheralSnapshot>),
    /// Read a characteristic as a peer would.
    Read {
        /// Characteristic.
        characteristic: Uuid,
        /// Read offset.
        offset: u16,
        /// Value or status.
        reply: oneshot::Sender<std::result::Result<Vec<u8>, AttStatus>>,
    },
    /// Write a characteristic as a peer would.
    Write {
        /// Characteristic.
        characteristic: Uuid,
        /// Written bytes.
        value: Vec<u8>,
        /// Outcome of the write.
        reply: oneshot::Sender<WriteOutcome>,
    },
    /// Push a characteristic value to every connected device.
    Notify {
        /// Characteristic.
        characteristic: Uuid,
        /// Number of notifications handed to the driver.
        reply: oneshot::Sender<Result<usize>>,
    },
    /// Ask the driver to drop a device.
    Disconnect {
        /// Device.
        device: DeviceId,
        /// Driver result.
        reply: oneshot::Sender<Result<()>>,
    },
    /// Stop the peripheral and end the task.
    Shutdown(oneshot::Sender<()>),
}

/// Host-side handle to the peripheral task.
#[derive(Debug, Clone)]
pub struct PeripheralHandle {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<DomainEvent>,
}

/// Creates a command queue of `capacity` and a handle feeding it.
#[must_use]
pub fn channel(
    capacity: usize,
    events: broadcast::Sender<DomainEvent>,
) -> (PeripheralHandle, mpsc::Receiver<Command>) {
    let (commands, rx) = mpsc::channel(capacity);
    (PeripheralHandle { commands, events }, rx)
}

/// Spawns the peripheral task on the current runtime.
///
/// `driver_events` is the receiving side of the sink handed to the driver.
/// The task returns the peripheral once it shuts down.
pub fn spawn<D: RadioDriver + 'static>(
    peripheral: Peripheral<D>,
    driver_events: mpsc::UnboundedReceiver<DriverEvent>,
) -> (PeripheralHandle, JoinHandle<Peripheral<D>>) {
    let (handle, commands) = channel(COMMAND_QUEUE_CAPACITY, peripheral.event_sender());
    let task = tokio::spawn(run(peripheral, commands, driver_events));
    (handle, task)
}

/// Starts the peripheral and serves commands and driver events until a
/// `Shutdown` command arrives or every handle is dropped.
pub async fn run<D: RadioDriver>(
    mut peripheral: Peripheral<D>,
    mut commands: mpsc::Receiver<Command>,
    mut driver_events: mpsc::UnboundedReceiver<DriverEvent>,
) -> Peripheral<D> {
    if let Err(e) = peripheral.start() {
        error!(error = %e, "peripheral failed to start");
    }

    loop {
        tokio::select! {
            biased;

            // Acknowledgements first, so a reply never overtakes the driver
            // event its own request caused.
            Some(event) = driver_events.recv() => peripheral.handle_driver_event(event),
            command = commands.recv() => match command {
                Some(command) => {
                    if !handle_command(&mut peripheral, command) {
                        return peripheral;
                    }
                }
                None => {
                    debug!("all peripheral handles dropped");
                    break;
                }
            },
        }
    }

    peripheral.stop();
    peripheral
}

/// Applies one command. Returns `false` once the peripheral has shut down.
fn handle_command<D: RadioDriver>(peripheral: &mut Peripheral<D>, command: Command) -> bool {
    // A dropped reply receiver means the requester gave up; nothing to do.
    match command {
        Command::Driver(event) => peripheral.handle_driver_event(event),
        Command::Tick => {
            peripheral.tick();
        }
        Command::RefreshAdvertising => {
            if let Err(e) = peripheral.refresh_advertising() {
                warn!(error = %e, "advertising refresh failed");
            }
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(peripheral.snapshot());
        }
        Command::Read {
            characteristic,
            offset,
            reply,
        } => {
            let _ = reply.send(peripheral.read(characteristic, offset));
        }
        Command::Write {
            characteristic,
            value,
            reply,
        } => {
            let _ = reply.send(peripheral.submit_write(characteristic, &value));
        }
        Command::Notify {
            characteristic,
            reply,
        } => {
            let _ = reply.send(peripheral.notify_now(characteristic));
        }
        Command::Disconnect { device, reply } => {
            let _ = reply.send(peripheral.disconnect(&device));
        }
        Command::Shutdown(reply) => {
            peripheral.stop();
            let _ = reply.send(());
            return false;
        }
    }
    true
}

impl PeripheralHandle {
    /// Queues a command without waiting for a reply.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task has ended.
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| GattSimError::PeripheralStopped)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx)).await?;
        rx.await.map_err(|_| GattSimError::PeripheralStopped)
    }

    /// Subscribes to domain events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.events.subscribe()
    }

    /// Whether the peripheral task has ended.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Injects a driver event, e.g. a simulated peer connecting.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task has ended.
    pub async fn inject(&self, event: DriverEvent) -> Result<()> {
        self.send(Command::Driver(event)).await
    }

    /// Snapshot of the peripheral.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task has ended.
    pub async fn snapshot(&self) -> Result<PeripheralSnapshot> {
        self.request(Command::Snapshot).await
    }

    /// Reads a characteristic as a peer would. The inner result carries the
    /// protocol status.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task has ended.
    pub async fn read(
        &self,
        characteristic: Uuid,
        offset: u16,
    ) -> Result<std::result::Result<Vec<u8>, AttStatus>> {
        self.request(|reply| Command::Read {
            characteristic,
            offset,
            reply,
        })
        .await
    }

    /// Writes a characteristic as a peer would.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task has ended.
    pub async fn write(&self, characteristic: Uuid, value: Vec<u8>) -> Result<WriteOutcome> {
        self.request(|reply| Command::Write {
            characteristic,
            value,
            reply,
        })
        .await
    }

    /// Pushes a characteristic value to every connected device.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task has ended, or the notify error.
    pub async fn notify(&self, characteristic: Uuid) -> Result<usize> {
        self.request(|reply| Command::Notify {
            characteristic,
            reply,
        })
        .await?
    }

    /// Asks the driver to drop a device.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task has ended, or the driver error.
    pub async fn disconnect(&self, device: DeviceId) -> Result<()> {
        self.request(|reply| Command::Disconnect { device, reply })
            .await?
    }

    /// Stops the peripheral and waits for the task to acknowledge.
    ///
    /// # Errors
    ///
    /// `PeripheralStopped` if the task had already ended.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await?;
        info!("peripheral shut down");
        Ok(())
    }
}
