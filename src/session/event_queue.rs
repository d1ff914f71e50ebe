//! Bounded per-session key queue.
//!
//! Storage is reserved once at construction and never grows. What happens
//! when a push meets a full queue is an explicit [`OverflowPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::mapping::KeyId;

pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest pending key to make room; size stays at capacity.
    #[default]
    OverwriteOldest,
    /// Keep the pending keys and drop the incoming one.
    DropNewest,
}

/// What a push did to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting this older key.
    Evicted(KeyId),
    /// The incoming key was not queued.
    Dropped,
}

impl PushOutcome {
    pub fn lost_key(&self) -> bool {
        !matches!(self, PushOutcome::Queued)
    }
}

#[derive(Debug, Clone)]
pub struct EventQueue {
    keys: VecDeque<KeyId>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl EventQueue {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            keys: VecDeque::with_capacity(capacity),
            capacity,
            policy,
        }
    }

    pub fn push(&mut self, key: KeyId) -> PushOutcome {
        if self.keys.len() < self.capacity {
            self.keys.push_back(key);
            return PushOutcome::Queued;
        }

        match self.policy {
            OverflowPolicy::OverwriteOldest => {
                let evicted = self.keys.pop_front();
                self.keys.push_back(key);
                match evicted {
                    Some(old) => PushOutcome::Evicted(old),
                    None => PushOutcome::Queued,
                }
            }
            OverflowPolicy::DropNewest => PushOutcome::Dropped,
        }
    }

    pub fn pop(&mut self) -> Option<KeyId> {
        self.keys.pop_front()
    }

    pub fn peek(&self) -> Option<KeyId> {
        self.keys.front().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }
}
