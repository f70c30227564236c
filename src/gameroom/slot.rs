use super::Countdown;
use super::Instruction;
use crate::Role;
use crate::bus::Client;
use crate::grid::Grid;

/// One seat in a match. Created on join, destroyed on leave or dispose.
#[derive(Debug)]
pub struct Slot {
    pub client: Client,
    pub ready: bool,
    pub intro_done: bool,
    pub host: bool,
    pub role: Role,
    pub grid: Option<Grid>,
    pub instruction: Option<Instruction>,
    pub next_generation: Option<Countdown>,
    /// Epochs of generation timers replaced without cancellation; their
    /// firings are still honored (a modifier timer outlives the warmup
    /// generation this way).
    pub superseded: Vec<u64>,
    pub special_command_cooldown: u32,
    pub defeating_asteroid: bool,
    pub defeating_black_hole: bool,
    pub has_completed_special_action: bool,
}

impl Slot {
    pub fn new(client: Client, host: bool, role: Role) -> Self {
        Self {
            client,
            ready: false,
            intro_done: false,
            host,
            role,
            grid: None,
            instruction: None,
            next_generation: None,
            superseded: Vec::new(),
            special_command_cooldown: 0,
            defeating_asteroid: false,
            defeating_black_hole: false,
            has_completed_special_action: false,
        }
    }

    pub fn uid(&self) -> u64 {
        self.client.uid
    }
    pub fn sid(&self) -> &str {
        &self.client.sid
    }

    /// Entry in the `game_info` slots array.
    pub fn info(&self) -> serde_json::Value {
        serde_json::json!({
            "uid": self.client.uid,
            "ready": self.ready,
            "host": self.host,
        })
    }

    /// Stops the pending regeneration timer, if any. Idempotent.
    pub fn cancel_generation(&mut self) {
        if let Some(countdown) = self.next_generation.take() {
            log::debug!("[slot {}] generation timer cancelled", self.client.uid);
            countdown.cancel();
        }
    }
}
