//! Command router
//!
//! Maps each (connection, camera) to one long-lived [`Agent`], created on the
//! first command for that key. Different keys run independently.

use alignkit_core::types::{thread_safe_map, ThreadSafeMap};
use alignkit_core::{AlignmentError, DeviceName};
use std::sync::Arc;

use crate::agent::{Agent, PendingResult, DEFAULT_QUEUE_CAPACITY};
use crate::cancel::CancelToken;
use crate::command::{CommandPacket, CommandResult};
use crate::coordinator::Coordinator;
use crate::parser::parse_packet;

/// Routes commands to per-device agents
pub struct Router {
    coordinator: Arc<Coordinator>,
    agents: ThreadSafeMap<(DeviceName, DeviceName), Arc<Agent>>,
    capacity: usize,
}

impl Router {
    /// Router with the default mailbox capacity
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self::with_capacity(coordinator, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(coordinator: Arc<Coordinator>, capacity: usize) -> Self {
        Self {
            coordinator,
            agents: thread_safe_map(),
            capacity,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Agent for `(connection, camera)`, spawning it on first use
    pub fn agent(&self, connection: &DeviceName, camera: &DeviceName) -> Arc<Agent> {
        self.agents
            .lock()
            .entry((connection.clone(), camera.clone()))
            .or_insert_with(|| {
                let key = format!("{}/{}", connection, camera);
                tracing::info!("Starting agent {}", key);
                Arc::new(Agent::spawn(key, self.coordinator.clone(), self.capacity))
            })
            .clone()
    }

    /// Queue a command on its device's agent
    ///
    /// Fails immediately with [`AlignmentError::QueueRejected`] when that
    /// agent's mailbox is full.
    pub fn submit(&self, packet: CommandPacket) -> Result<PendingResult, AlignmentError> {
        self.agent(&packet.connection, &packet.camera).enqueue(packet)
    }

    /// Queue a command with a caller-owned cancellation token
    pub fn submit_with(
        &self,
        packet: CommandPacket,
        cancel: CancelToken,
    ) -> Result<PendingResult, AlignmentError> {
        self.agent(&packet.connection, &packet.camera)
            .enqueue_with(packet, cancel)
    }

    /// Parse a text command and queue it
    pub fn submit_raw(
        &self,
        connection: impl Into<DeviceName>,
        camera: impl Into<DeviceName>,
        raw: &str,
    ) -> Result<PendingResult, AlignmentError> {
        let packet = parse_packet(raw, connection, camera, None)?;
        self.submit(packet)
    }

    /// Queue a command and wait for its result
    ///
    /// Queue and parse failures come back as failed results.
    pub async fn execute(&self, packet: CommandPacket) -> CommandResult {
        let job_id = packet.job_id.clone();
        match self.submit(packet) {
            Ok(pending) => pending.wait().await,
            Err(AlignmentError::QueueRejected { .. }) => CommandResult::queue_rejected(job_id),
            Err(e) => CommandResult::failed(job_id, e.to_string()),
        }
    }

    /// Number of live agents
    pub fn agent_count(&self) -> usize {
        self.agents.lock().len()
    }

    /// Close every mailbox, wait for the workers to drain and forget the agents
    pub async fn shutdown(&self) {
        let agents: Vec<Arc<Agent>> = self.agents.lock().drain().map(|(_, a)| a).collect();
        tracing::info!("Shutting down {} agent(s)", agents.len());
        for agent in agents {
            agent.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("agents", &self.agent_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}
