use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Mutex;

/// A connected player as the transport sees it: a stable user id and the
/// session id the bus routes unicasts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Client {
    pub uid: u64,
    pub sid: String,
}

impl Client {
    pub fn new(uid: u64, sid: impl Into<String>) -> Self {
        Self {
            uid,
            sid: sid.into(),
        }
    }
}

/// Where an outbound event goes: every member of a room, or one session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
    Room(String),
    Sid(String),
}

impl Address {
    pub fn room(room: impl Into<String>) -> Self {
        Self::Room(room.into())
    }
    pub fn sid(sid: impl Into<String>) -> Self {
        Self::Sid(sid.into())
    }
}

/// Facade over the transport. The match runtime only ever sees this contract:
/// named events with JSON payloads, delivered to a room or a single session,
/// plus room membership management.
///
/// Implementations are expected to be cheap to call from the match actor;
/// emit failures are reported so the caller can log and move on, they never
/// abort a state transition.
#[async_trait::async_trait]
pub trait Bus: Send + Sync {
    async fn emit(
        &self,
        event: &str,
        payload: serde_json::Value,
        to: Address,
    ) -> anyhow::Result<()>;
    async fn join_room(&self, sid: &str, room: &str);
    async fn leave_room(&self, sid: &str, room: &str);
}

/// One delivered event, as recorded by [`MemoryBus`].
#[derive(Clone, Debug)]
pub struct Emission {
    pub event: String,
    pub payload: serde_json::Value,
    pub to: Address,
}

/// In-memory bus for single-process embedding and tests. Records every
/// emission in order and tracks room membership the way the transport would.
#[derive(Default)]
pub struct MemoryBus {
    emissions: Mutex<Vec<Emission>>,
    rooms: Mutex<HashMap<String, HashSet<String>>>,
}

impl MemoryBus {
    /// All emissions so far, oldest first.
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.lock().expect("bus lock").clone()
    }
    /// Drains the recorded emissions.
    pub fn take(&self) -> Vec<Emission> {
        std::mem::take(&mut *self.emissions.lock().expect("bus lock"))
    }
    /// Emissions of one event name, oldest first.
    pub fn of(&self, event: &str) -> Vec<Emission> {
        self.emissions
            .lock()
            .expect("bus lock")
            .iter()
            .filter(|e| e.event == event)
            .cloned()
            .collect()
    }
    /// Current members of a room.
    pub fn members(&self, room: &str) -> HashSet<String> {
        self.rooms
            .lock()
            .expect("bus lock")
            .get(room)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Bus for MemoryBus {
    async fn emit(
        &self,
        event: &str,
        payload: serde_json::Value,
        to: Address,
    ) -> anyhow::Result<()> {
        self.emissions.lock().expect("bus lock").push(Emission {
            event: event.to_string(),
            payload,
            to,
        });
        Ok(())
    }
    async fn join_room(&self, sid: &str, room: &str) {
        self.rooms
            .lock()
            .expect("bus lock")
            .entry(room.to_string())
            .or_default()
            .insert(sid.to_string());
    }
    async fn leave_room(&self, sid: &str, room: &str) {
        if let Some(members) = self.rooms.lock().expect("bus lock").get_mut(room) {
            members.remove(sid);
        }
    }
}
