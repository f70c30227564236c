// per-level escalation bounds
const INSTRUCTIONS_TIME_FLOOR: f64 = 7.0;
const HEALTH_DRAIN_RATE_CEILING: f64 = 1.25;
const DEATH_LIMIT_RATE_CEILING: f64 = 1.25;
const COMPLETION_GAIN_FLOOR: f64 = 3.0;
const EXPIRY_LOSS_CEILING: f64 = 11.5;
const MODIFIER_CHANCE_CEILING: f64 = 1.0;

/// Tuning parameters for one level of a match.
///
/// A match keeps two copies: the live one, escalated once per level, and a
/// pristine baseline snapshot that `game_over` clones back.
#[derive(Clone, Debug, PartialEq)]
pub struct Difficulty {
    /// seconds to complete an instruction
    pub instructions_time: f64,
    /// health drain per second
    pub health_drain_rate: f64,
    /// death barrier progress per second
    pub death_limit_increase_rate: f64,
    /// health increase per instruction completed
    pub completed_instruction_health_increase: f64,
    /// health decrease per instruction failed
    pub expired_command_health_decrease: f64,
    /// chance of getting an asteroid (0.0 - 1.0)
    pub asteroid_chance: f64,
    /// chance of getting a black hole (0.0 - 1.0)
    pub black_hole_chance: f64,
    /// instructions between special commands (asteroid and black hole)
    pub special_command_cooldown: u32,
    /// chance of getting a game modifier (0.0 - 1.0)
    pub game_modifier_chance: f64,
}

impl Default for Difficulty {
    fn default() -> Self {
        Self {
            instructions_time: 25.0,
            health_drain_rate: 0.5,
            death_limit_increase_rate: 0.05,
            completed_instruction_health_increase: 10.0,
            expired_command_health_decrease: 5.0,
            asteroid_chance: 0.0,
            black_hole_chance: 0.0,
            special_command_cooldown: 3,
            game_modifier_chance: 0.1,
        }
    }
}

impl Difficulty {
    /// Tightens every parameter one level's worth, clamped at its bound.
    /// Special-command chances reset each level; modifier fields would raise
    /// them again.
    pub fn escalate(&mut self) {
        self.instructions_time = (self.instructions_time - 1.25).max(INSTRUCTIONS_TIME_FLOOR);
        self.health_drain_rate = (self.health_drain_rate + 0.35).min(HEALTH_DRAIN_RATE_CEILING);
        self.death_limit_increase_rate =
            (self.death_limit_increase_rate + 0.15).min(DEATH_LIMIT_RATE_CEILING);
        self.completed_instruction_health_increase =
            (self.completed_instruction_health_increase - 0.5).max(COMPLETION_GAIN_FLOOR);
        self.expired_command_health_decrease =
            (self.expired_command_health_decrease + 0.25).min(EXPIRY_LOSS_CEILING);
        self.asteroid_chance = 0.0;
        self.black_hole_chance = 0.0;
        self.game_modifier_chance = (self.game_modifier_chance + 0.25).min(MODIFIER_CHANCE_CEILING);
    }
}
