use uuid::Uuid;

/// The surrounding registry of open matches. The runtime only needs to tell
/// it when a match is gone.
#[async_trait::async_trait]
pub trait LobbyRegistry: Send + Sync {
    async fn remove_game(&self, game_id: Option<Uuid>);
}

/// Process configuration as the match runtime sees it.
pub trait Config: Send + Sync {
    /// Single-player debug mode: a lone client may start and targets itself.
    fn single_player(&self) -> bool;
}
