//! Conversation registry
//!
//! Each conversation binds an id (`session-1`, `session-2`, ...) to its own
//! agent. Exactly one is active; switching only moves the pointer, so an
//! agent call on the previously active conversation keeps running.

use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;
use tracing::info;

use crate::backend::Agent;
use crate::events::StateEvent;

/// Builds the agent for a newly created conversation
pub type AgentFactory = Box<dyn Fn(&str) -> Arc<dyn Agent> + Send + Sync>;

/// Session bookkeeping consumed by the worker
pub trait SessionRegistry: Send + Sync {
    /// Create a conversation, make it active, return its id
    fn create(&self) -> String;

    /// Make `id` active; false if unknown
    fn switch(&self, id: &str) -> bool;

    /// Ids in creation order
    fn list_ids(&self) -> Vec<String>;

    /// Active conversation id and agent
    fn active(&self) -> Option<(String, Arc<dyn Agent>)>;

    /// Resolve a 1-based index and switch to it.
    ///
    /// On failure the active conversation is unchanged and the current count
    /// is returned.
    fn switch_to_index(&self, n: usize) -> Result<String, usize> {
        let ids = self.list_ids();
        match n.checked_sub(1).and_then(|i| ids.get(i)) {
            Some(id) if self.switch(id) => Ok(id.clone()),
            _ => Err(ids.len()),
        }
    }

    /// Id of the active conversation
    fn active_id(&self) -> Option<String> {
        self.active().map(|(id, _)| id)
    }
}

struct Sessions {
    entries: Vec<(String, Arc<dyn Agent>)>,
    active: Option<usize>,
    next_id: u64,
}

/// In-memory registry of agent sessions
pub struct ConversationManager {
    sessions: RwLock<Sessions>,
    factory: AgentFactory,
    event_tx: broadcast::Sender<StateEvent>,
}

impl ConversationManager {
    pub fn new(factory: AgentFactory, event_tx: broadcast::Sender<StateEvent>) -> Self {
        Self {
            sessions: RwLock::new(Sessions {
                entries: Vec::new(),
                active: None,
                next_id: 1,
            }),
            factory,
            event_tx,
        }
    }

    /// Stop every agent; used on shutdown
    pub fn stop_all(&self) {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        for (id, agent) in &sessions.entries {
            info!(session_id = %id, "stopping conversation");
            agent.stop();
        }
    }
}

impl SessionRegistry for ConversationManager {
    fn create(&self) -> String {
        let id = {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            let id = format!("session-{}", sessions.next_id);
            sessions.next_id += 1;
            let agent = (self.factory)(&id);
            sessions.entries.push((id.clone(), agent));
            sessions.active = Some(sessions.entries.len() - 1);
            id
        };

        info!(session_id = %id, "created new conversation");
        let _ = self.event_tx.send(StateEvent::ConversationCreated {
            session_id: id.clone(),
        });
        id
    }

    fn switch(&self, id: &str) -> bool {
        {
            let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
            let Some(index) = sessions.entries.iter().position(|(sid, _)| sid == id) else {
                return false;
            };
            sessions.active = Some(index);
        }

        info!(session_id = %id, "switched conversation");
        let _ = self.event_tx.send(StateEvent::ConversationSwitched {
            session_id: id.to_string(),
        });
        true
    }

    fn list_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        sessions.entries.iter().map(|(id, _)| id.clone()).collect()
    }

    fn active(&self) -> Option<(String, Arc<dyn Agent>)> {
        let sessions = self.sessions.read().unwrap_or_else(|e| e.into_inner());
        let index = sessions.active?;
        sessions
            .entries
            .get(index)
            .map(|(id, agent)| (id.clone(), Arc::clone(agent)))
    }
}
