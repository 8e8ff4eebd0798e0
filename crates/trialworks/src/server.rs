//! The server task and its handle.
//!
//! One Tokio task owns the [`Engine`]. It waits on two things: the next
//! command from a [`ServerHandle`] and the next tick of the clock. Either
//! one is handled to completion before the task awaits again, so the
//! engine is never observed halfway through a cascade.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use trialworks_game::{Engine, GameError, Rejection};
use trialworks_protocol::{AreaId, CharacterId, ClientId, GameRef, IcMessage};
use trialworks_tick::TickScheduler;
use trialworks_world::NotificationSender;

use crate::{ServerConfig, TrialworksError};

type EngineCall = Box<dyn FnOnce(&mut Engine) + Send>;

/// Commands sent from handles to the server task.
pub(crate) enum Command {
    Connect {
        sender: NotificationSender,
        reply: oneshot::Sender<ClientId>,
    },
    Disconnect {
        client: ClientId,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    ChangeArea {
        client: ClientId,
        area: AreaId,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    ChangeCharacter {
        client: ClientId,
        character: Option<CharacterId>,
        char_name: String,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    Ic {
        client: ClientId,
        message: IcMessage,
        reply: oneshot::Sender<Result<(), Rejection>>,
    },
    Rt {
        client: ClientId,
        name: String,
        reply: oneshot::Sender<Result<(), GameError>>,
    },
    /// Runs an arbitrary closure against the engine. The closure sends
    /// its own reply.
    Call(EngineCall),
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// A cloneable handle for talking to the server task.
///
/// Every method fails with [`TrialworksError::Unavailable`] once the task
/// has stopped.
#[derive(Clone)]
pub struct ServerHandle {
    sender: mpsc::Sender<Command>,
}

impl ServerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, TrialworksError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(command(reply_tx))
            .await
            .map_err(|_| TrialworksError::Unavailable)?;
        reply_rx.await.map_err(|_| TrialworksError::Unavailable)
    }

    /// Registers a client whose notifications go to `sender`. The client
    /// lands in the default area of the first hub.
    pub async fn connect(&self, sender: NotificationSender) -> Result<ClientId, TrialworksError> {
        self.request(|reply| Command::Connect { sender, reply }).await
    }

    pub async fn disconnect(&self, client: ClientId) -> Result<(), TrialworksError> {
        self.request(|reply| Command::Disconnect { client, reply })
            .await??;
        Ok(())
    }

    pub async fn change_area(&self, client: ClientId, area: AreaId) -> Result<(), TrialworksError> {
        self.request(|reply| Command::ChangeArea {
            client,
            area,
            reply,
        })
        .await??;
        Ok(())
    }

    pub async fn change_character(
        &self,
        client: ClientId,
        character: Option<CharacterId>,
        char_name: impl Into<String>,
    ) -> Result<(), TrialworksError> {
        let char_name = char_name.into();
        self.request(|reply| Command::ChangeCharacter {
            client,
            character,
            char_name,
            reply,
        })
        .await??;
        Ok(())
    }

    /// Sends an in-character message. A refusal comes back as
    /// [`TrialworksError::Rejected`] carrying the text to show the sender.
    pub async fn say(&self, client: ClientId, message: IcMessage) -> Result<(), TrialworksError> {
        self.request(|reply| Command::Ic {
            client,
            message,
            reply,
        })
        .await??;
        Ok(())
    }

    /// Plays a splash animation such as `testimony1` or `testimony2`.
    pub async fn play_rt(
        &self,
        client: ClientId,
        name: impl Into<String>,
    ) -> Result<(), TrialworksError> {
        let name = name.into();
        self.request(|reply| Command::Rt {
            client,
            name,
            reply,
        })
        .await??;
        Ok(())
    }

    /// Runs `f` on the server task and returns its result.
    ///
    /// This is how the rest of the engine API (trials, debates, stats) is
    /// reached. Returning a `Result<_, GameError>` from `f` and applying
    /// `??` to the call gives a flat `TrialworksError`.
    pub async fn call<T, F>(&self, f: F) -> Result<T, TrialworksError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Engine) -> T + Send + 'static,
    {
        self.request(|reply| {
            Command::Call(Box::new(move |engine: &mut Engine| {
                let _ = reply.send(f(engine));
            }))
        })
        .await
    }

    /// The hubs, ordered by id.
    pub async fn hubs(&self) -> Result<Vec<GameRef>, TrialworksError> {
        self.call(|engine| engine.hubs()).await
    }

    /// Stops the server task after the commands already queued.
    pub async fn shutdown(&self) -> Result<(), TrialworksError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

// ---------------------------------------------------------------------------
// ServerBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`Server`].
///
/// ```rust,no_run
/// # async fn run() -> Result<(), trialworks::TrialworksError> {
/// let (server, task) = trialworks::Server::builder().spawn()?;
/// server.shutdown().await?;
/// task.await.ok();
/// # Ok(())
/// # }
/// ```
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the clock rate. 0 stops the clock; timers then only move on
    /// explicit [`Engine::tick`] calls.
    pub fn tick_rate(mut self, hz: u32) -> Self {
        self.config.tick.tick_rate_hz = hz;
        self
    }

    /// Builds the engine, creates the configured hubs and spawns the
    /// server task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> Result<(ServerHandle, JoinHandle<()>), TrialworksError> {
        Ok(self.build()?.spawn())
    }

    /// Builds the server without spawning it.
    pub fn build(self) -> Result<Server, TrialworksError> {
        self.config.validate()?;
        let ServerConfig {
            tick,
            command_channel_size,
            engine: engine_config,
            hubs,
            ..
        } = self.config;

        let mut engine = Engine::new(engine_config);
        for spec in hubs {
            let hub = engine.new_hub(spec)?;
            tracing::info!(%hub, "hub loaded");
        }

        Ok(Server {
            engine,
            scheduler: TickScheduler::new(tick),
            channel_size: command_channel_size,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// The engine plus the clock that drives it.
///
/// Usually created and spawned in one step with
/// [`ServerBuilder::spawn`]. Holding a `Server` directly is useful for
/// inspecting the seeded engine before anything runs.
pub struct Server {
    engine: Engine,
    scheduler: TickScheduler,
    channel_size: usize,
}

impl Server {
    /// Creates a new builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Spawns the server task. Must be called inside a Tokio runtime.
    pub fn spawn(self) -> (ServerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(self.channel_size);
        let task = tokio::spawn(self.run(receiver));
        (ServerHandle { sender }, task)
    }

    /// Runs until a shutdown command arrives or every handle is dropped.
    async fn run(mut self, mut receiver: mpsc::Receiver<Command>) {
        tracing::info!(
            tick_rate_hz = self.scheduler.tick_rate_hz(),
            hubs = self.engine.hubs().len(),
            "server started"
        );

        loop {
            tokio::select! {
                command = receiver.recv() => {
                    let Some(command) = command else { break };
                    if !self.handle(command) {
                        break;
                    }
                }
                info = self.scheduler.wait_for_tick() => {
                    self.engine.tick(info.elapsed);
                    self.scheduler.record_tick_end();
                }
            }
        }

        let metrics = self.scheduler.metrics();
        tracing::info!(
            ticks = metrics.ticks,
            late = metrics.late_ticks,
            "server stopped"
        );
    }

    /// Applies one command. Returns `false` when the task should stop.
    fn handle(&mut self, command: Command) -> bool {
        let engine = &mut self.engine;
        match command {
            Command::Connect { sender, reply } => {
                let _ = reply.send(engine.connect_client(Some(sender)));
            }
            Command::Disconnect { client, reply } => {
                let _ = reply.send(engine.disconnect_client(client));
            }
            Command::ChangeArea {
                client,
                area,
                reply,
            } => {
                let _ = reply.send(engine.change_area(client, area));
            }
            Command::ChangeCharacter {
                client,
                character,
                char_name,
                reply,
            } => {
                let _ = reply.send(engine.change_character(client, character, char_name));
            }
            Command::Ic {
                client,
                message,
                reply,
            } => {
                let result = engine.handle_ic_message(client, message);
                if let Err(rejection) = &result {
                    tracing::debug!(%client, %rejection, "ic message refused");
                }
                let _ = reply.send(result);
            }
            Command::Rt {
                client,
                name,
                reply,
            } => {
                let _ = reply.send(engine.handle_rt(client, &name));
            }
            Command::Call(f) => f(engine),
            Command::Shutdown { reply } => {
                let _ = reply.send(());
                return false;
            }
        }
        true
    }
}
