//! Typing debounce state machine
//!
//! Tracks, per connection within one room, whether the user is currently
//! typing. A stream of `typing` signals collapses into a single start
//! notification; silence for [`TYPING_TIMEOUT`] (or an explicit stop, a
//! sent message, a leave, or a disconnect) produces exactly one stop
//! notification.
//!
//! The tracker itself owns no clock: the coordinator arms a cancellable
//! sleep task per signal, and expiry re-enters the room's command channel
//! carrying a generation number. Re-arming aborts the previous task and
//! bumps the generation, so an expiry that escaped the abort is recognized
//! as stale and discarded. At most one timer per connection is live.

use std::collections::HashMap;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::types::ConnectionId;

/// Silence window after which a typing indication auto-expires
pub const TYPING_TIMEOUT: Duration = Duration::from_millis(1000);

/// What a typing signal did to the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingTransition {
    /// Idle -> Typing; broadcast `user-typing`
    Started,
    /// Already Typing; timer re-armed, nothing broadcast
    Extended,
    /// Typing -> Idle; broadcast `user-stop-typing`
    Stopped,
    /// Already Idle, or a stale expiry; nothing to do
    Idle,
}

#[derive(Debug)]
struct TypingEntry {
    generation: u64,
    timer: JoinHandle<()>,
}

/// Per-room typing state, keyed by connection
///
/// Owned and mutated exclusively by the room's coordinator task.
#[derive(Debug, Default)]
pub struct TypingTracker {
    entries: HashMap<ConnectionId, TypingEntry>,
    next_generation: u64,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typing signal
    ///
    /// `arm` must spawn the expiry task for the supplied generation and
    /// return its handle. Any previous timer for this connection is
    /// aborted before the new one is armed.
    pub fn note_typing<F>(&mut self, conn: ConnectionId, arm: F) -> TypingTransition
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        self.next_generation += 1;
        let generation = self.next_generation;

        match self.entries.get_mut(&conn) {
            Some(entry) => {
                entry.timer.abort();
                entry.generation = generation;
                entry.timer = arm(generation);
                TypingTransition::Extended
            }
            None => {
                let timer = arm(generation);
                self.entries.insert(conn, TypingEntry { generation, timer });
                TypingTransition::Started
            }
        }
    }

    /// Explicit stop, sent message, leave, or disconnect
    ///
    /// Idempotent: stopping an idle connection reports [`TypingTransition::Idle`].
    pub fn note_stop(&mut self, conn: ConnectionId) -> TypingTransition {
        match self.entries.remove(&conn) {
            Some(entry) => {
                entry.timer.abort();
                TypingTransition::Stopped
            }
            None => TypingTransition::Idle,
        }
    }

    /// Timer expiry delivered through the room's command channel
    ///
    /// Discarded as stale unless `generation` matches the entry armed last.
    pub fn note_expired(&mut self, conn: ConnectionId, generation: u64) -> TypingTransition {
        match self.entries.get(&conn) {
            Some(entry) if entry.generation == generation => {
                self.entries.remove(&conn);
                TypingTransition::Stopped
            }
            _ => TypingTransition::Idle,
        }
    }

    /// Whether the connection currently shows as typing
    pub fn is_typing(&self, conn: ConnectionId) -> bool {
        self.entries.contains_key(&conn)
    }

    /// Abort every pending timer (room shutdown)
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.timer.abort();
        }
    }
}

impl Drop for TypingTracker {
    fn drop(&mut self) {
        self.clear();
    }
}
