pub mod bus;
pub mod gameroom;
pub mod grid;
pub mod lobby;
pub mod names;

/// player role id, 0..=3; decides which word list names a slot's widgets
pub type Role = u8;

// match tuning parameters
pub const STARTING_HEALTH: f64 = 50.0;
pub const HEALTH_CEILING: f64 = 100.0;
pub const DEATH_LIMIT_CEILING: f64 = 90.0;
pub const HEALTH_LOOP_RATE: u64 = 2;
pub const MAX_PLAYERS: usize = 4;
pub const MIN_PLAYERS: usize = 2;
pub const WARMUP_FLOOR: u64 = 3;

/// initialize terminal logging
pub fn init() {
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    simplelog::TermLogger::init(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )
    .expect("initialize logger");
}
