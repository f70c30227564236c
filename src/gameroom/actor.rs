use super::Game;
use crate::bus::Client;
use crate::grid::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Reply channel for an external operation: the caller learns whether the
/// match accepted or refused it.
pub type Ack = oneshot::Sender<anyhow::Result<()>>;

/// Everything a match actor processes: external operations relayed from the
/// transport (each with a reply channel) and the firings of its own timers.
pub enum Cmd {
    Join {
        client: Client,
        ack: Ack,
    },
    Leave {
        client: Client,
        ack: Ack,
    },
    UpdateSettings {
        size: Option<usize>,
        public: Option<bool>,
        ack: Ack,
    },
    Ready {
        client: Client,
        ack: Ack,
    },
    Start {
        ack: Ack,
    },
    IntroDone {
        client: Client,
        ack: Ack,
    },
    DoCommand {
        client: Client,
        name: String,
        value: Option<Value>,
        ack: Ack,
    },
    DefeatSpecial {
        client: Client,
        black_hole: bool,
        ack: Ack,
    },
    Dispose {
        ack: Ack,
    },
    /// A slot's generation timer ran out.
    GenerationDue {
        uid: u64,
        epoch: u64,
        expired: Option<bool>,
        stop_old_task: bool,
        modifier: Option<String>,
    },
    /// The warmup between intro and first instructions ran out.
    WarmupOver {
        epoch: u64,
    },
    /// The periodic health drain.
    DrainTick {
        epoch: u64,
    },
    /// A defend flag drops again.
    DefeatOver {
        uid: u64,
        black_hole: bool,
    },
}

/// Cloneable front of a running match. Operations are posted onto the match's
/// command channel and answered through a oneshot; once the match disposes,
/// the channel closes and every call reports the match as disposed.
#[derive(Clone)]
pub struct GameHandle {
    tx: UnboundedSender<Cmd>,
    id: Option<Uuid>,
}

impl GameHandle {
    /// Spawns the actor loop that owns the match. All mutation happens on
    /// that task; this handle only posts commands.
    pub fn spawn(game: Game, rx: UnboundedReceiver<Cmd>) -> Self {
        let tx = game.sender();
        let id = game.uuid();
        tokio::spawn(Self::run(game, rx));
        Self { tx, id }
    }

    async fn run(mut game: Game, mut rx: UnboundedReceiver<Cmd>) {
        while let Some(cmd) = rx.recv().await {
            game.handle(cmd).await;
            if game.disposing() {
                break;
            }
        }
        log::debug!("[actor] {} loop ended", game.room());
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub async fn join(&self, client: Client) -> anyhow::Result<()> {
        self.request(|ack| Cmd::Join { client, ack }).await
    }
    pub async fn leave(&self, client: Client) -> anyhow::Result<()> {
        self.request(|ack| Cmd::Leave { client, ack }).await
    }
    pub async fn update_settings(
        &self,
        size: Option<usize>,
        public: Option<bool>,
    ) -> anyhow::Result<()> {
        self.request(|ack| Cmd::UpdateSettings { size, public, ack })
            .await
    }
    pub async fn ready(&self, client: Client) -> anyhow::Result<()> {
        self.request(|ack| Cmd::Ready { client, ack }).await
    }
    pub async fn start(&self) -> anyhow::Result<()> {
        self.request(|ack| Cmd::Start { ack }).await
    }
    pub async fn intro_done(&self, client: Client) -> anyhow::Result<()> {
        self.request(|ack| Cmd::IntroDone { client, ack }).await
    }
    pub async fn do_command(
        &self,
        client: Client,
        name: impl Into<String>,
        value: Option<Value>,
    ) -> anyhow::Result<()> {
        let name = name.into();
        self.request(|ack| Cmd::DoCommand {
            client,
            name,
            value,
            ack,
        })
        .await
    }
    pub async fn defeat_special(&self, client: Client, black_hole: bool) -> anyhow::Result<()> {
        self.request(|ack| Cmd::DefeatSpecial {
            client,
            black_hole,
            ack,
        })
        .await
    }
    pub async fn dispose(&self) -> anyhow::Result<()> {
        self.request(|ack| Cmd::Dispose { ack }).await
    }

    async fn request(&self, make: impl FnOnce(Ack) -> Cmd) -> anyhow::Result<()> {
        let (ack, reply) = oneshot::channel();
        self.tx
            .send(make(ack))
            .map_err(|_| anyhow::anyhow!("the match is disposed"))?;
        reply
            .await
            .map_err(|_| anyhow::anyhow!("the match is disposed"))?
    }
}
