//! Per-device command agent
//!
//! One agent owns one bounded mailbox and one worker task. The worker hands
//! commands to the coordinator strictly in arrival order, one at a time.
//! Submitting to a full mailbox fails immediately.

use alignkit_core::{AlignmentError, AlignmentEvent, EventBus, SequencerEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::command::{CommandPacket, CommandResult};
use crate::coordinator::Coordinator;

/// Default mailbox capacity per agent
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct QueuedCommand {
    packet: CommandPacket,
    cancel: CancelToken,
    reply: oneshot::Sender<CommandResult>,
}

/// Handle to the eventual result of a submitted command
#[derive(Debug)]
pub struct PendingResult {
    job_id: String,
    cancel: CancelToken,
    rx: oneshot::Receiver<CommandResult>,
}

impl PendingResult {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Ask the worker to abandon this command
    ///
    /// A command still in the mailbox fails with "Operation cancelled" when
    /// its turn comes; a running capture is dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token shared with the worker for this command
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the command to finish
    ///
    /// If the agent went away before answering, a failed result is returned.
    pub async fn wait(self) -> CommandResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => CommandResult::failed(&self.job_id, "Agent stopped before replying"),
        }
    }
}

/// Single-consumer command queue for one (connection, camera)
pub struct Agent {
    key: String,
    capacity: usize,
    tx: Mutex<Option<mpsc::Sender<QueuedCommand>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    processed: Arc<AtomicU64>,
    events: Arc<EventBus>,
}

impl Agent {
    /// Spawn the worker task; must be called inside a tokio runtime
    pub fn spawn(key: impl Into<String>, coordinator: Arc<Coordinator>, capacity: usize) -> Self {
        let key = key.into();
        let capacity = capacity.max(1);
        let events = coordinator.events();
        let (tx, mut rx) = mpsc::channel::<QueuedCommand>(capacity);
        let processed = Arc::new(AtomicU64::new(0));

        let worker_key = key.clone();
        let worker_events = events.clone();
        let worker_processed = processed.clone();
        let handle = tokio::spawn(async move {
            tracing::debug!("Agent {} started (capacity {})", worker_key, capacity);
            worker_events.publish(AlignmentEvent::Sequencer(SequencerEvent::AgentStarted {
                key: worker_key.clone(),
            }));

            while let Some(cmd) = rx.recv().await {
                let result = coordinator.handle(&cmd.packet, &cmd.cancel).await;
                worker_processed.fetch_add(1, Ordering::Relaxed);
                if cmd.reply.send(result).is_err() {
                    tracing::debug!(
                        "Agent {}: caller dropped result for job {}",
                        worker_key,
                        cmd.packet.job_id
                    );
                }
            }

            let processed = worker_processed.load(Ordering::Relaxed);
            tracing::debug!("Agent {} stopped after {} command(s)", worker_key, processed);
            worker_events.publish(AlignmentEvent::Sequencer(SequencerEvent::AgentStopped {
                key: worker_key,
                processed,
            }));
        });

        Self {
            key,
            capacity,
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            processed,
            events,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commands handled so far
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Queue a command without waiting for room
    pub fn enqueue(&self, packet: CommandPacket) -> Result<PendingResult, AlignmentError> {
        self.enqueue_with(packet, CancelToken::new())
    }

    /// Queue a command with a caller-owned cancellation token
    pub fn enqueue_with(
        &self,
        packet: CommandPacket,
        cancel: CancelToken,
    ) -> Result<PendingResult, AlignmentError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or_else(|| AlignmentError::AgentClosed {
            key: self.key.clone(),
        })?;

        let (reply, rx) = oneshot::channel();
        let job_id = packet.job_id.clone();
        let queued = QueuedCommand {
            packet,
            cancel: cancel.clone(),
            reply,
        };

        match tx.try_send(queued) {
            Ok(()) => Ok(PendingResult { job_id, cancel, rx }),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Agent {} queue full (capacity {})", self.key, self.capacity);
                self.events
                    .publish(AlignmentEvent::Sequencer(SequencerEvent::QueueRejected {
                        key: self.key.clone(),
                        capacity: self.capacity,
                    }));
                Err(AlignmentError::QueueRejected {
                    key: self.key.clone(),
                    capacity: self.capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AlignmentError::AgentClosed {
                key: self.key.clone(),
            }),
        }
    }

    /// Close the mailbox and wait for queued commands to drain
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Agent {} worker failed: {}", self.key, e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("key", &self.key)
            .field("capacity", &self.capacity)
            .field("processed", &self.processed())
            .finish()
    }
}
