// Outbound messaging seam and the multi-peer response collector.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crest_common::crypto::Address;

use crate::core::error::BlockchainError;
use crate::p2p::packet::Packet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    High1,
    Medium,
    Low,
}

#[derive(Clone, Copy, Debug)]
pub struct SendFlags {
    pub priority: Priority,
    pub compress: bool,
    pub encrypt: bool,
}

impl SendFlags {
    /// Requests: high priority, no compression, no encryption.
    pub fn high_priority() -> Self {
        Self {
            priority: Priority::High1,
            compress: false,
            encrypt: false,
        }
    }

    /// Acks: compression on, encryption still off.
    pub fn high_priority_compressed() -> Self {
        Self {
            priority: Priority::High1,
            compress: true,
            encrypt: false,
        }
    }
}

#[async_trait]
pub trait MessageSender: Send + Sync + 'static {
    async fn send(
        &self,
        peer: &Address,
        packet: Packet,
        flags: SendFlags,
    ) -> Result<(), BlockchainError>;
}

struct PendingWait {
    responses: Vec<Vec<u8>>,
    required: usize,
    notify: Arc<Notify>,
}

/// Collects replies from fan-out requests. A waiter registers how many
/// replies it wants, peers feed raw payloads in under the message id, and
/// the waiter gets whatever arrived once the count is reached or the
/// timeout fires.
#[derive(Default)]
pub struct ResponseCollector {
    pending: Mutex<HashMap<String, PendingWait>>,
    counter: AtomicU64,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait slot and return its message id.
    pub fn create_wait(&self, required: usize) -> String {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        let msg_id = format!("msg-{}-{}", id, rand::random::<u32>());
        let mut pending = self.pending.lock().expect("response collector lock");
        pending.insert(
            msg_id.clone(),
            PendingWait {
                responses: Vec::new(),
                required,
                notify: Arc::new(Notify::new()),
            },
        );
        msg_id
    }

    /// Feed one reply. Returns false when no waiter is registered.
    pub fn add_response(&self, msg_id: &str, data: Vec<u8>) -> bool {
        let mut pending = self.pending.lock().expect("response collector lock");
        match pending.get_mut(msg_id) {
            Some(wait) => {
                wait.responses.push(data);
                if wait.responses.len() >= wait.required {
                    wait.notify.notify_one();
                }
                true
            }
            None => false,
        }
    }

    /// Wait until the required reply count is reached or `timeout` passes,
    /// then take whatever was collected. The slot is removed either way.
    pub async fn wait_data(&self, msg_id: &str, timeout: Duration) -> Vec<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notify = {
                let pending = self.pending.lock().expect("response collector lock");
                match pending.get(msg_id) {
                    Some(wait) if wait.responses.len() >= wait.required => break,
                    Some(wait) => wait.notify.clone(),
                    None => return Vec::new(),
                }
            };
            if tokio::time::timeout_at(deadline, notify.notified())
                .await
                .is_err()
            {
                break;
            }
        }
        let mut pending = self.pending.lock().expect("response collector lock");
        pending
            .remove(msg_id)
            .map(|wait| wait.responses)
            .unwrap_or_default()
    }
}
