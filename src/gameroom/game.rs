use super::Cmd;
use super::Countdown;
use super::Difficulty;
use super::Directive;
use super::Instruction;
use super::Scheduler;
use super::Slot;
use crate::DEATH_LIMIT_CEILING;
use crate::HEALTH_CEILING;
use crate::HEALTH_LOOP_RATE;
use crate::MAX_PLAYERS;
use crate::MIN_PLAYERS;
use crate::Role;
use crate::STARTING_HEALTH;
use crate::WARMUP_FLOOR;
use crate::bus::Address;
use crate::bus::Bus;
use crate::bus::Client;
use crate::grid::Grid;
use crate::grid::Kind;
use crate::grid::Value;
use crate::grid::Widget;
use crate::lobby::Config;
use crate::lobby::LobbyRegistry;
use crate::names::NameSource;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::mpsc::unbounded_channel;
use uuid::Uuid;

/// Level modifier widgets and the verb each one offers. One is planted into
/// every grid at the start of a level; every slot but the announcer must act
/// on it.
const MODIFIERS: [(&str, &str); 5] = [
    ("Macy's Parade", "Attend"),
    ("4th of July Fireworks", "Watch"),
    ("Vote", "Submit"),
    ("Bagel", "Eat"),
    ("A Slice of Pizza", "Eat"),
];

/// External collaborators a match is built over.
pub struct Services {
    pub bus: Arc<dyn Bus>,
    pub lobby: Arc<dyn LobbyRegistry>,
    pub config: Arc<dyn Config>,
    pub names: Box<dyn NameSource>,
}

/// One match: the slots, the in-flight instructions, the shared health pool,
/// and every timer that moves them.
///
/// All mutation runs on a single logical context: the actor loop owns the
/// `Game` and feeds it external operations and timer firings from one command
/// channel, so no two operations ever interleave mid-flight. Timer firings
/// carry epochs and are dropped when the timer they came from was cancelled.
pub struct Game {
    uuid: Option<Uuid>,
    name: String,
    public: bool,
    max_players: usize,
    slots: Vec<Slot>,
    playing: bool,
    disposing: bool,
    instructions: Vec<Instruction>,
    level: i32,
    health: f64,
    death_limit: f64,
    difficulty: Difficulty,
    vanilla_difficulty: Difficulty,
    previous_game_modifier: Option<String>,
    game_modifier: Option<String>,
    special_action: Option<String>,
    health_drain: Option<Countdown>,
    game_modifier_task: Option<Countdown>,
    warmup: Option<Countdown>,
    next_instruction_id: u64,
    scheduler: Scheduler<Cmd>,
    bus: Arc<dyn Bus>,
    lobby: Arc<dyn LobbyRegistry>,
    config: Arc<dyn Config>,
    names: Box<dyn NameSource>,
    rng: SmallRng,
}

impl Game {
    /// Creates a match and the command channel its actor loop will drain.
    pub fn new(
        name: impl Into<String>,
        public: bool,
        services: Services,
    ) -> (Self, UnboundedReceiver<Cmd>) {
        Self::with_rng(name, public, services, SmallRng::from_os_rng())
    }

    /// Like [`Game::new`] with an explicit random source, for deterministic
    /// tests.
    pub fn with_rng(
        name: impl Into<String>,
        public: bool,
        services: Services,
        rng: SmallRng,
    ) -> (Self, UnboundedReceiver<Cmd>) {
        let (tx, rx) = unbounded_channel();
        let difficulty = Difficulty::default();
        let game = Self {
            uuid: None,
            name: name.into(),
            public,
            max_players: MIN_PLAYERS,
            slots: Vec::new(),
            playing: false,
            disposing: false,
            instructions: Vec::new(),
            level: -1,
            health: STARTING_HEALTH,
            death_limit: 0.0,
            vanilla_difficulty: difficulty.clone(),
            difficulty,
            previous_game_modifier: None,
            game_modifier: None,
            special_action: None,
            health_drain: None,
            game_modifier_task: None,
            warmup: None,
            next_instruction_id: 1,
            scheduler: Scheduler::new(tx),
            bus: services.bus,
            lobby: services.lobby,
            config: services.config,
            names: services.names,
            rng,
        };
        (game, rx)
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }
    /// Write-once identity; assigning twice is refused.
    pub fn set_uuid(&mut self, uuid: Uuid) -> anyhow::Result<()> {
        match self.uuid {
            Some(_) => Err(anyhow::anyhow!("the match uuid cannot be changed")),
            None => {
                self.uuid = Some(uuid);
                Ok(())
            }
        }
    }
    pub fn playing(&self) -> bool {
        self.playing
    }
    pub fn disposing(&self) -> bool {
        self.disposing
    }
    pub fn level(&self) -> i32 {
        self.level
    }
    pub fn health(&self) -> f64 {
        self.health
    }
    pub fn death_limit(&self) -> f64 {
        self.death_limit
    }
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }
    pub fn game_modifier(&self) -> Option<&str> {
        self.game_modifier.as_deref()
    }
    pub fn difficulty(&self) -> &Difficulty {
        &self.difficulty
    }
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
    /// Bus room every member of this match sits in.
    pub fn room(&self) -> String {
        match self.uuid {
            Some(uuid) => format!("game/{}", uuid),
            None => "game/pending".to_string(),
        }
    }
    /// A fresh endpoint posting onto this match's command channel.
    pub fn sender(&self) -> UnboundedSender<Cmd> {
        self.scheduler.sender()
    }
}

/// Command dispatch for the actor loop.
impl Game {
    pub async fn handle(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Join { client, ack } => {
                let _ = ack.send(self.join(client).await);
            }
            Cmd::Leave { client, ack } => {
                let _ = ack.send(self.leave(&client).await);
            }
            Cmd::UpdateSettings { size, public, ack } => {
                let _ = ack.send(self.update_settings(size, public).await);
            }
            Cmd::Ready { client, ack } => {
                let _ = ack.send(self.ready(&client).await);
            }
            Cmd::Start { ack } => {
                let _ = ack.send(self.start().await);
            }
            Cmd::IntroDone { client, ack } => {
                let _ = ack.send(self.intro_done(&client).await);
            }
            Cmd::DoCommand {
                client,
                name,
                value,
                ack,
            } => {
                let _ = ack.send(self.do_command(&client, &name, value).await);
            }
            Cmd::DefeatSpecial {
                client,
                black_hole,
                ack,
            } => {
                let _ = ack.send(self.defeat_special(&client, black_hole).await);
            }
            Cmd::Dispose { ack } => {
                let _ = ack.send(self.dispose().await);
            }
            Cmd::GenerationDue {
                uid,
                epoch,
                expired,
                stop_old_task,
                modifier,
            } => self.generation_due(uid, epoch, expired, stop_old_task, modifier).await,
            Cmd::WarmupOver { epoch } => self.warmup_over(epoch).await,
            Cmd::DrainTick { epoch } => self.drain_tick(epoch).await,
            Cmd::DefeatOver { uid, black_hole } => self.defeat_over(uid, black_hole),
        }
    }
}

/// Public operations. Each one refuses (without mutating) when its
/// preconditions do not hold.
impl Game {
    /// Seats a client. The first joiner hosts; roles follow join order.
    pub async fn join(&mut self, client: Client) -> anyhow::Result<()> {
        self.guard()?;
        if self.playing {
            return Err(anyhow::anyhow!("the game is in progress"));
        }
        if self.slots.len() >= self.max_players {
            self.emit(
                "game_join_fail",
                serde_json::json!({"message": "The game is full"}),
                Address::sid(client.sid.clone()),
            )
            .await;
            return Ok(());
        }
        let host = self.slots.is_empty();
        let role = self.slots.len().min(3) as Role;
        let sid = client.sid.clone();
        self.slots.push(Slot::new(client, host, role));
        self.bus.join_room(&sid, &self.room()).await;
        self.emit(
            "game_join_success",
            serde_json::json!({"game_id": self.uuid}),
            Address::sid(sid.clone()),
        )
        .await;
        self.notify_game().await;
        self.notify_lobby().await;
        log::info!("[game] {} joined {}", sid, self.room());
        if self.config.single_player() {
            self.start().await?;
        }
        Ok(())
    }

    /// Unseats a client. Mid-game this tears the whole match down; in the
    /// lobby it reassigns the host and disposes once nobody is left.
    pub async fn leave(&mut self, client: &Client) -> anyhow::Result<()> {
        self.guard()?;
        let index = self
            .slots
            .iter()
            .position(|s| s.client == *client)
            .ok_or_else(|| anyhow::anyhow!("client not in match"))?;
        let removed = self.slots.remove(index);
        self.bus.leave_room(removed.sid(), &self.room()).await;
        if self.playing {
            self.emit("player_disconnected", serde_json::json!({}), Address::room(self.room()))
                .await;
            let _ = self.dispose().await;
        } else {
            if removed.host && !self.slots.is_empty() {
                let chosen = self.rng.random_range(0..self.slots.len());
                self.slots[chosen].host = true;
                log::info!(
                    "[game] {} chosen as new host in {}",
                    self.slots[chosen].sid(),
                    self.room()
                );
            }
            self.notify_game().await;
            self.notify_lobby().await;
            if self.slots.is_empty() {
                let _ = self.dispose().await;
            }
        }
        log::info!("[game] {} left {}", removed.sid(), self.room());
        Ok(())
    }

    /// Adjusts lobby settings. Turning a public match private removes it from
    /// the lobby listing.
    pub async fn update_settings(
        &mut self,
        size: Option<usize>,
        public: Option<bool>,
    ) -> anyhow::Result<()> {
        self.guard()?;
        if self.playing {
            return Err(anyhow::anyhow!("the game is in progress"));
        }
        let mut visibility_changed = false;
        if let Some(size) = size {
            self.max_players = size.clamp(MIN_PLAYERS, MAX_PLAYERS);
        }
        if let Some(public) = public {
            self.public = public;
            visibility_changed = true;
        }
        self.notify_game().await;
        if self.public {
            self.notify_lobby().await;
        } else if visibility_changed {
            self.notify_lobby_dispose().await;
        }
        Ok(())
    }

    /// Toggles a client's ready flag.
    pub async fn ready(&mut self, client: &Client) -> anyhow::Result<()> {
        self.guard()?;
        if self.playing {
            return Err(anyhow::anyhow!("the game is in progress"));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.client == *client)
            .ok_or_else(|| anyhow::anyhow!("client not in match"))?;
        slot.ready = !slot.ready;
        self.notify_game().await;
        Ok(())
    }

    /// Starts the match once everyone is ready (or alone, in single-player
    /// mode): first level, then a `game_started` with each slot's role.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.guard()?;
        if self.playing {
            return Err(anyhow::anyhow!("the game is in progress"));
        }
        let all_ready = self.slots.len() > 1 && self.slots.iter().all(|s| s.ready);
        if !(all_ready || self.config.single_player()) {
            return Err(anyhow::anyhow!("conditions not met for game to start"));
        }
        self.playing = true;
        self.notify_lobby_dispose().await;
        self.next_level().await;
        let roles: Vec<(String, Role)> = self
            .slots
            .iter()
            .map(|s| (s.sid().to_string(), s.role))
            .collect();
        for (sid, role) in roles {
            self.emit(
                "game_started",
                serde_json::json!({"role": role}),
                Address::sid(sid),
            )
            .await;
        }
        Ok(())
    }

    /// Records that a client finished the level intro. Once everyone has,
    /// grids go out, a warmup countdown runs, and the first instructions
    /// follow.
    pub async fn intro_done(&mut self, client: &Client) -> anyhow::Result<()> {
        self.guard()?;
        if !self.playing {
            return Err(anyhow::anyhow!("the game is not in progress"));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.client == *client)
            .ok_or_else(|| anyhow::anyhow!("client not in match"))?;
        slot.intro_done = true;
        if self.slots.iter().all(|s| s.intro_done) {
            self.intro_done_all().await;
        }
        Ok(())
    }

    /// A client operated a widget on their own grid. The widget mutates
    /// first; then, if some in-flight instruction asked for exactly this
    /// state, that instruction completes. Anything else is a harmless no-op.
    pub async fn do_command(
        &mut self,
        client: &Client,
        command_name: &str,
        value: Option<Value>,
    ) -> anyhow::Result<()> {
        self.guard()?;
        if !self.playing {
            return Err(anyhow::anyhow!("the game is not in progress"));
        }
        let i = self
            .slots
            .iter()
            .position(|s| s.client == *client)
            .ok_or_else(|| anyhow::anyhow!("client not in match"))?;
        let normalize = {
            let widget = self.slots[i]
                .grid
                .as_ref()
                .and_then(|g| g.widget(command_name))
                .ok_or_else(|| anyhow::anyhow!("command not found"))?;
            widget.validate(value.as_ref())?;
            matches!(widget.kind, Kind::Actions { .. })
        };
        let value = match (normalize, value) {
            (true, Some(Value::Text(v))) => Some(Value::Text(v.to_lowercase())),
            (_, value) => value,
        };
        if let Some(widget) = self.slots[i]
            .grid
            .as_mut()
            .and_then(|g| g.widget_mut(command_name))
        {
            widget.apply(value.as_ref());
        }
        let completed = self
            .instructions
            .iter()
            .filter(|x| {
                x.directive.widget_name() == Some(command_name)
                    && x.value == value
                    && self
                        .slots
                        .iter()
                        .find(|s| s.uid() == x.source)
                        .is_some_and(|s| !s.has_completed_special_action)
            })
            .next_back()
            .cloned();
        match completed {
            // useless command: no penalty
            None => Ok(()),
            Some(instruction) => {
                self.complete_instruction(instruction, true).await;
                Ok(())
            }
        }
    }

    /// A client is defending against an asteroid or black hole. When every
    /// slot defends at once, the matching special instructions complete with
    /// no health reward. The caller's flag drops again two seconds later.
    pub async fn defeat_special(&mut self, client: &Client, black_hole: bool) -> anyhow::Result<()> {
        self.guard()?;
        if !self.playing {
            return Err(anyhow::anyhow!("the game is not in progress"));
        }
        let i = self
            .slots
            .iter()
            .position(|s| s.client == *client)
            .ok_or_else(|| anyhow::anyhow!("client not in match"))?;
        if black_hole {
            self.slots[i].defeating_black_hole = true;
        } else {
            self.slots[i].defeating_asteroid = true;
        }
        let all_defending = self
            .slots
            .iter()
            .all(|s| if black_hole { s.defeating_black_hole } else { s.defeating_asteroid });
        if all_defending {
            log::debug!("[game] every slot is defending, resolving specials");
            let completed: Vec<Instruction> = self
                .instructions
                .iter()
                .filter(|x| match x.directive {
                    Directive::Asteroid => !black_hole,
                    Directive::BlackHole => black_hole,
                    Directive::Widget { .. } => false,
                })
                .cloned()
                .collect();
            for instruction in completed {
                self.complete_instruction(instruction, false).await;
            }
        }
        let uid = self.slots[i].uid();
        self.scheduler
            .after(Duration::from_secs(2), Cmd::DefeatOver { uid, black_hole });
        Ok(())
    }

    /// Tears the match down: every timer cancelled, every client detached,
    /// the lobby registry told exactly once. Terminal.
    pub async fn dispose(&mut self) -> anyhow::Result<()> {
        if self.disposing {
            return Err(anyhow::anyhow!("the match is already disposing"));
        }
        self.disposing = true;
        for slot in &mut self.slots {
            slot.cancel_generation();
        }
        if let Some(countdown) = self.health_drain.take() {
            log::debug!("[game] health drain cancelled");
            countdown.cancel();
        }
        if let Some(countdown) = self.game_modifier_task.take() {
            countdown.cancel();
        }
        if let Some(countdown) = self.warmup.take() {
            countdown.cancel();
        }
        let room = self.room();
        for slot in &self.slots {
            self.bus.leave_room(slot.sid(), &room).await;
        }
        self.lobby.remove_game(self.uuid).await;
        log::info!("[game] {} disposed", room);
        Ok(())
    }
}

/// Level progression and instruction generation.
impl Game {
    /// Advances to the next level: fresh health and grids, a steeper
    /// difficulty, and a planted modifier widget that will announce itself on
    /// a shared random delay.
    async fn next_level(&mut self) {
        self.health_drain = None;
        self.game_modifier_task = None;
        for slot in &mut self.slots {
            slot.cancel_generation();
        }
        self.level += 1;
        if self.level == 0 {
            log::info!("[game] {} starting", self.room());
        } else {
            log::info!("[game] {} advancing to level {}", self.room(), self.level + 1);
        }
        self.health = STARTING_HEALTH;
        self.death_limit = 0.0;
        if self.level > 0 {
            self.difficulty.escalate();
            log::debug!("[game] difficulty now {:?}", self.difficulty);
        }
        for slot in &mut self.slots {
            slot.intro_done = false;
        }
        let size = ((self.level / 2 + 2) as usize).min(4);
        for i in 0..self.slots.len() {
            let role = self.slots[i].role;
            let grid = Grid::generate(size, size, role, self.level, self.names.as_mut(), &mut self.rng);
            self.slots[i].grid = Some(grid);
        }

        self.previous_game_modifier = self.game_modifier.clone();
        let pool: Vec<&(&str, &str)> = MODIFIERS
            .iter()
            .filter(|(name, _)| self.previous_game_modifier.as_deref() != Some(*name))
            .collect();
        let (modifier, verb) = **pool.choose(&mut self.rng).expect("modifier pool is never empty");
        self.game_modifier = Some(modifier.to_string());
        log::debug!("[game] selected modifier {}", modifier);

        let delay = Duration::from_secs_f64(10.0 + 15.0 * self.rng.random::<f64>());
        for i in 0..self.slots.len() {
            let planted = {
                let Some(grid) = self.slots[i].grid.as_ref() else { continue };
                if grid.widgets().is_empty() {
                    // name exhaustion left this grid bare
                    continue;
                }
                let index = self.rng.random_range(0..grid.widgets().len());
                let old = &grid.widgets()[index];
                let widget = Widget::new(
                    modifier,
                    old.x,
                    old.y,
                    old.w,
                    old.h,
                    Kind::Actions {
                        actions: vec![verb.to_string()],
                    },
                );
                (index, widget)
            };
            if let Some(grid) = self.slots[i].grid.as_mut() {
                grid.replace(planted.0, planted.1);
            }
            let uid = self.slots[i].uid();
            let name = modifier.to_string();
            let countdown = self.scheduler.once(delay, move |epoch| Cmd::GenerationDue {
                uid,
                epoch,
                expired: None,
                stop_old_task: true,
                modifier: Some(name),
            });
            self.slots[i].next_generation = Some(countdown);
        }
    }

    /// Everyone has seen the intro: send each slot its grid, count the warmup
    /// down, then the first instructions start the loop.
    async fn intro_done_all(&mut self) {
        let grids: Vec<(String, serde_json::Value)> = self
            .slots
            .iter()
            .filter_map(|s| s.grid.as_ref().map(|g| (s.sid().to_string(), g.payload())))
            .collect();
        for (sid, payload) in grids {
            self.emit("grid", payload, Address::sid(sid)).await;
        }
        let warmup = ((self.difficulty.instructions_time / 5.0) as u64).max(WARMUP_FLOOR);
        self.emit(
            "command",
            serde_json::json!({
                "text": "Prepare to receive instructions",
                "time": warmup,
            }),
            Address::room(self.room()),
        )
        .await;
        self.warmup = Some(
            self.scheduler
                .once(Duration::from_secs(warmup), |epoch| Cmd::WarmupOver { epoch }),
        );
    }

    /// Builds and installs a fresh instruction for slot `i`, tells its
    /// client, and arms the expiry timer. `modifier` names the planted
    /// level-modifier widget when this generation announces one.
    async fn generate_instruction(
        &mut self,
        i: usize,
        expired: Option<bool>,
        stop_old_task: bool,
        modifier: Option<String>,
    ) {
        if stop_old_task {
            self.slots[i].cancel_generation();
        }
        let old = self.slots[i].instruction.clone();
        let id = self.next_instruction_id;
        self.next_instruction_id += 1;
        let source_uid = self.slots[i].uid();
        let mut target = self.random_other(i).unwrap_or(i);

        self.special_action = modifier.clone();

        let mut instruction = None;
        if modifier.is_none() {
            if self.rng.random::<f64>() < self.difficulty.asteroid_chance
                && self.slots[i].special_command_cooldown == 0
            {
                instruction = Some(Instruction::asteroid(id, source_uid));
                self.slots[i].special_command_cooldown = self.difficulty.special_command_cooldown + 1;
            } else if self.rng.random::<f64>() < self.difficulty.black_hole_chance
                && self.slots[i].special_command_cooldown == 0
            {
                instruction = Some(Instruction::black_hole(id, source_uid));
                self.slots[i].special_command_cooldown = self.difficulty.special_command_cooldown + 1;
            } else if self.config.single_player() {
                target = i;
            } else if self.rng.random_range(0..6) == 0 {
                // now and then a slot works its own console
                target = i;
            } else {
                target = self.random_other(i).unwrap_or(i);
            }
        }
        self.slots[i].special_command_cooldown =
            self.slots[i].special_command_cooldown.saturating_sub(1);

        let instruction = match instruction {
            Some(instruction) => instruction,
            None => match self.widget_instruction(id, i, target, modifier) {
                Some(instruction) => instruction,
                None => return,
            },
        };
        log::debug!(
            "[game] instruction for {}: {:?}",
            self.slots[i].sid(),
            instruction.text
        );
        self.instructions.push(instruction.clone());
        self.slots[i].instruction = Some(instruction.clone());
        self.emit(
            "command",
            serde_json::json!({
                "text": instruction.text,
                "time": self.difficulty.instructions_time,
                "expired": expired,
            }),
            Address::sid(self.slots[i].sid().to_string()),
        )
        .await;
        if old.as_ref().is_some_and(|o| o.directive.is_special()) {
            self.emit("safe", serde_json::json!({}), Address::room(self.room()))
                .await;
        }
        let uid = source_uid;
        let after = Duration::from_secs_f64(self.difficulty.instructions_time);
        let countdown = self.scheduler.once(after, move |epoch| Cmd::GenerationDue {
            uid,
            epoch,
            expired: Some(true),
            stop_old_task: false,
            modifier: None,
        });
        if let Some(previous) = self.slots[i].next_generation.take() {
            // superseded but not cancelled: its firing must still land
            self.slots[i].superseded.push(previous.epoch());
            previous.detach();
        }
        self.slots[i].next_generation = Some(countdown);
    }

    /// Picks the widget a new instruction will demand. The planted modifier
    /// widget is taken verbatim; otherwise a widget is drawn from the target
    /// grid, skipping modifier names and names already claimed by in-flight
    /// instructions, retrying other grids when a grid has nothing eligible.
    fn widget_instruction(
        &mut self,
        id: u64,
        i: usize,
        target: usize,
        modifier: Option<String>,
    ) -> Option<Instruction> {
        let source_uid = self.slots[i].uid();
        if let Some(name) = modifier {
            if let Some(widget) = self.slots[i]
                .grid
                .as_ref()
                .and_then(|g| g.widget(&name))
                .cloned()
            {
                let value = widget.objective(&mut self.rng);
                let target_uid = Some(self.slots[target].uid());
                return Some(Instruction::for_widget(
                    id,
                    source_uid,
                    target_uid,
                    target == i,
                    &widget,
                    value,
                    true,
                ));
            }
            log::warn!("[game] modifier widget {} missing, drawing normally", name);
        }
        let mut order = vec![target];
        let mut rest: Vec<usize> = (0..self.slots.len()).filter(|j| *j != target).collect();
        rest.shuffle(&mut self.rng);
        order.extend(rest);
        for t in order {
            let Some(name) = self.eligible_widget(i, t) else { continue };
            let Some(widget) = self.slots[t]
                .grid
                .as_ref()
                .and_then(|g| g.widget(&name))
                .cloned()
            else {
                continue;
            };
            let value = widget.objective(&mut self.rng);
            let special = self.special_action.is_some();
            return Some(Instruction::for_widget(
                id,
                source_uid,
                Some(self.slots[t].uid()),
                t == i,
                &widget,
                value,
                special,
            ));
        }
        log::error!("[game] no eligible widget in any grid, slot {} gets none", source_uid);
        None
    }

    /// Draws an unclaimed widget name from slot `t`'s grid for an instruction
    /// sourced by slot `i`. Falls back to a claimed name when everything
    /// eligible is in flight; yields `None` when nothing is eligible at all.
    fn eligible_widget(&mut self, i: usize, t: usize) -> Option<String> {
        let eligible: Vec<String> = self.slots[t]
            .grid
            .as_ref()?
            .widgets()
            .iter()
            .map(|w| w.name.clone())
            .filter(|name| !Self::is_modifier(name))
            .collect();
        if eligible.is_empty() {
            return None;
        }
        let claimed: Vec<&str> = self
            .instructions
            .iter()
            .chain(self.slots[i].instruction.iter())
            .filter_map(|x| x.directive.widget_name())
            .collect();
        for _ in 0..eligible.len() {
            let name = eligible.choose(&mut self.rng)?;
            if !claimed.contains(&name.as_str()) {
                return Some(name.clone());
            }
        }
        eligible.choose(&mut self.rng).cloned()
    }

    fn is_modifier(name: &str) -> bool {
        MODIFIERS.iter().any(|(m, _)| *m == name)
    }

    fn random_other(&mut self, i: usize) -> Option<usize> {
        let others: Vec<usize> = (0..self.slots.len()).filter(|j| *j != i).collect();
        others.choose(&mut self.rng).copied()
    }

    /// One instruction or a whole special-action barrier was satisfied.
    async fn complete_instruction(&mut self, instruction: Instruction, increase_health: bool) {
        if self.special_action.is_some() {
            let all_completed = self
                .slots
                .iter()
                .filter(|s| s.uid() != instruction.source)
                .all(|s| s.has_completed_special_action);
            if all_completed {
                for slot in &mut self.slots {
                    slot.has_completed_special_action = false;
                }
                self.instructions.clear();
                if increase_health {
                    self.health += self.difficulty.completed_instruction_health_increase;
                }
                if self.health >= HEALTH_CEILING {
                    self.next_level().await;
                    self.emit(
                        "next_level",
                        serde_json::json!({"level": self.level}),
                        Address::room(self.room()),
                    )
                    .await;
                } else {
                    for i in 0..self.slots.len() {
                        self.generate_instruction(i, Some(false), true, None).await;
                    }
                    self.notify_health().await;
                }
            } else if let Some(slot) = self.slots.iter_mut().find(|s| s.uid() == instruction.source)
            {
                slot.has_completed_special_action = true;
                log::debug!("[game] slot {} completed the special action", instruction.source);
            }
            return;
        }

        self.instructions.retain(|x| x.id != instruction.id);
        if increase_health {
            self.health += self.difficulty.completed_instruction_health_increase;
        }
        if self.health >= HEALTH_CEILING {
            self.next_level().await;
            self.emit(
                "next_level",
                serde_json::json!({"level": self.level}),
                Address::room(self.room()),
            )
            .await;
        } else {
            if let Some(i) = self.slots.iter().position(|s| s.uid() == instruction.source) {
                self.generate_instruction(i, Some(false), true, None).await;
            }
            self.notify_health().await;
        }
    }

    async fn game_over(&mut self) {
        self.emit(
            "game_over",
            serde_json::json!({"level": self.level}),
            Address::room(self.room()),
        )
        .await;
        log::info!("[game] {} game over", self.room());
        self.level = -1;
        self.health = STARTING_HEALTH;
        self.death_limit = 0.0;
        self.health_drain = None;
        self.previous_game_modifier = None;
        self.game_modifier = None;
        self.game_modifier_task = None;
        self.difficulty = self.vanilla_difficulty.clone();
    }
}

/// Timer firings, posted by the scheduler onto the command channel.
impl Game {
    /// A generation timer fired: the slot's current instruction expires (with
    /// its health penalty) and a new one is generated.
    pub(crate) async fn generation_due(
        &mut self,
        uid: u64,
        epoch: u64,
        expired: Option<bool>,
        stop_old_task: bool,
        modifier: Option<String>,
    ) {
        if self.disposing {
            return;
        }
        let Some(i) = self.slots.iter().position(|s| s.uid() == uid) else {
            return;
        };
        if self.slots[i].next_generation.as_ref().map(Countdown::epoch) == Some(epoch) {
            self.slots[i].next_generation = None;
        } else if let Some(at) = self.slots[i].superseded.iter().position(|e| *e == epoch) {
            self.slots[i].superseded.remove(at);
        } else {
            // stale firing from a cancelled timer
            return;
        }
        if let Some(instruction) = &self.slots[i].instruction {
            let expired_id = instruction.id;
            self.instructions.retain(|x| x.id != expired_id);
        }
        self.health -= self.difficulty.expired_command_health_decrease;
        self.generate_instruction(i, expired, stop_old_task, modifier).await;
    }

    /// The warmup countdown ran out: hand out the first instructions and
    /// start draining health.
    pub(crate) async fn warmup_over(&mut self, epoch: u64) {
        if self.disposing {
            return;
        }
        if self.warmup.as_ref().map(Countdown::epoch) != Some(epoch) {
            return;
        }
        self.warmup = None;
        for i in 0..self.slots.len() {
            self.generate_instruction(i, None, false, None).await;
        }
        self.health_drain = Some(
            self.scheduler
                .every(Duration::from_secs(HEALTH_LOOP_RATE), |epoch| Cmd::DrainTick { epoch }),
        );
    }

    /// Periodic drain: health falls, the death limit climbs, and the match
    /// ends when they meet.
    pub(crate) async fn drain_tick(&mut self, epoch: u64) {
        if self.disposing {
            return;
        }
        if self.health_drain.as_ref().map(Countdown::epoch) != Some(epoch) {
            return;
        }
        self.health -= self.difficulty.health_drain_rate * HEALTH_LOOP_RATE as f64;
        self.death_limit = (self.death_limit
            + self.difficulty.death_limit_increase_rate * HEALTH_LOOP_RATE as f64)
            .min(DEATH_LIMIT_CEILING);
        log::debug!(
            "[game] health {:.2}, death limit {:.2}",
            self.health,
            self.death_limit
        );
        if self.health <= self.death_limit {
            self.game_over().await;
        } else {
            self.notify_health().await;
        }
    }

    /// A defend flag drops again two seconds after it was raised.
    pub(crate) fn defeat_over(&mut self, uid: u64, black_hole: bool) {
        if self.disposing {
            return;
        }
        if let Some(slot) = self.slots.iter_mut().find(|s| s.uid() == uid) {
            if black_hole {
                slot.defeating_black_hole = false;
            } else {
                slot.defeating_asteroid = false;
            }
        }
    }
}

/// Outbound notifications.
impl Game {
    fn guard(&self) -> anyhow::Result<()> {
        if self.disposing {
            return Err(anyhow::anyhow!("the match is disposing"));
        }
        Ok(())
    }

    fn lobby_info(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "game_id": self.uuid,
            "players": self.slots.len(),
            "max_players": self.max_players,
            "public": self.public,
        })
    }

    fn game_info(&self) -> serde_json::Value {
        let mut info = self.lobby_info();
        let mut slots: Vec<serde_json::Value> = self.slots.iter().map(|s| s.info()).collect();
        while slots.len() < self.max_players {
            slots.push(serde_json::Value::Null);
        }
        info["slots"] = serde_json::Value::Array(slots);
        info
    }

    async fn notify_game(&self) {
        self.emit("game_info", self.game_info(), Address::room(self.room()))
            .await;
    }

    async fn notify_lobby(&self) {
        if self.public {
            self.emit("lobby_info", self.lobby_info(), Address::room("lobby"))
                .await;
        }
    }

    async fn notify_lobby_dispose(&self) {
        self.emit(
            "lobby_disposed",
            serde_json::json!({"game_id": self.uuid}),
            Address::room("lobby"),
        )
        .await;
    }

    async fn notify_health(&self) {
        self.emit(
            "health_info",
            serde_json::json!({
                "health": self.health,
                "death_limit": self.death_limit,
            }),
            Address::room(self.room()),
        )
        .await;
    }

    /// Emit failures are logged and swallowed; they never abort a state
    /// transition.
    async fn emit(&self, event: &'static str, payload: serde_json::Value, to: Address) {
        if let Err(e) = self.bus.emit(event, payload, to).await {
            log::warn!("[game] emit {} failed: {}", event, e);
        }
    }
}
