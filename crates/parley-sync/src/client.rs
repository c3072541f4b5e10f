//! Client event loop.
//!
//! [`spawn_client`] wires the connection manager, the event processor and the
//! sync engine together and runs them on a single task. The loop owns the
//! reconnect timer: the connection manager only decides *whether* and *with
//! what delay* to retry, the loop arms and cancels the actual sleep.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use parley_net::{ConnectionManager, ConnectionSignal, PushChannelFactory, ReconnectConfig, Transport};
use parley_shared::events::{ClientEvent, PushEvent};
use parley_shared::model::Conversation;
use parley_shared::notify::Notifier;
use parley_shared::types::{ConnectionInfo, ConnectionState, UserId};

use crate::engine::SyncEngine;
use crate::merge::{MergeOutcome, MessageRouting};
use crate::processor::EventProcessor;
use crate::state::lock_state;

const PUSH_EVENT_BUFFER: usize = 64;
const COMMAND_BUFFER: usize = 32;

#[derive(Debug)]
pub enum ClientCommand {
    Connect,
    Disconnect,
    /// Manual retry after the automatic attempts gave up.
    Reconnect,
    SelectConversation(Option<Conversation>),
    StartTyping,
    StopTyping,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub local_user: UserId,
    pub user_name: String,
    pub routing: MessageRouting,
    pub reconnect: ReconnectConfig,
}

impl ClientConfig {
    pub fn new(local_user: UserId, user_name: impl Into<String>) -> Self {
        Self {
            local_user,
            user_name: user_name.into(),
            routing: MessageRouting::ConversationOnly,
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Handle held by the host application. Cloneable; dropping all clones does
/// not stop the loop, send [`ClientCommand::Shutdown`] for that.
#[derive(Clone)]
pub struct ChatHandle {
    cmd_tx: mpsc::Sender<ClientCommand>,
    engine: Arc<SyncEngine>,
    connection: Arc<Mutex<ConnectionInfo>>,
}

impl ChatHandle {
    /// The engine is shared with the loop; history loads, sends, edits and
    /// reactions are called on it directly.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn connection_info(&self) -> ConnectionInfo {
        self.connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn send(&self, command: ClientCommand) {
        if self.cmd_tx.send(command).await.is_err() {
            debug!("Client loop already stopped, command dropped");
        }
    }

    pub async fn connect(&self) {
        self.send(ClientCommand::Connect).await;
    }

    pub async fn disconnect(&self) {
        self.send(ClientCommand::Disconnect).await;
    }

    pub async fn select_conversation(&self, conversation: Option<Conversation>) {
        self.send(ClientCommand::SelectConversation(conversation))
            .await;
    }

    pub async fn shutdown(&self) {
        self.send(ClientCommand::Shutdown).await;
    }
}

/// Start the client loop on its own task and return the handle.
pub fn spawn_client(
    transport: Arc<dyn Transport>,
    factory: PushChannelFactory,
    notifier: Arc<dyn Notifier>,
    config: ClientConfig,
) -> ChatHandle {
    let (push_tx, push_rx) = mpsc::channel(PUSH_EVENT_BUFFER);
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let connection = ConnectionManager::new(
        factory,
        push_tx,
        config.reconnect.clone(),
        Arc::clone(&notifier),
    );
    let info = connection.info_handle();

    let engine = Arc::new(SyncEngine::new(
        transport,
        crate::state::ChatState::shared(),
        Arc::clone(&info),
        notifier,
        config.local_user.clone(),
    ));

    let client = ChatClient {
        engine: Arc::clone(&engine),
        connection,
        processor: EventProcessor::new(config.local_user.clone(), config.routing),
        push_rx,
        cmd_rx,
        reconnect_timer: None,
        local_user: config.local_user,
        user_name: config.user_name,
    };
    tokio::spawn(client.run());

    ChatHandle {
        cmd_tx,
        engine,
        connection: info,
    }
}

struct ChatClient {
    engine: Arc<SyncEngine>,
    connection: ConnectionManager,
    processor: EventProcessor,
    push_rx: mpsc::Receiver<PushEvent>,
    cmd_rx: mpsc::Receiver<ClientCommand>,
    /// Armed by `ScheduleReconnect`, cancelled on connect, manual disconnect
    /// or give-up.
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    local_user: UserId,
    user_name: String,
}

impl ChatClient {
    async fn run(mut self) {
        info!("Client loop started");
        loop {
            tokio::select! {
                event = self.push_rx.recv() => match event {
                    Some(event) => self.handle_push(event).await,
                    None => {
                        // The manager holds the only persistent sender, so
                        // this means the loop state is torn down already.
                        break;
                    }
                },

                _ = Self::timer_fired(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    debug!("Reconnect timer fired");
                    self.connection.connect();
                },

                command = self.cmd_rx.recv() => match command {
                    Some(ClientCommand::Shutdown) | None => {
                        self.connection.disconnect();
                        break;
                    }
                    Some(command) => self.handle_command(command).await,
                },
            }
        }
        info!("Client loop stopped");
    }

    async fn timer_fired(timer: &mut Option<Pin<Box<Sleep>>>) {
        match timer {
            Some(sleep) => sleep.await,
            None => std::future::pending().await,
        }
    }

    async fn handle_push(&mut self, event: PushEvent) {
        if let Some(signal) = self.connection.handle_push(&event) {
            match signal {
                ConnectionSignal::BecameConnected => {
                    self.reconnect_timer = None;
                    if self.engine.active_conversation_id().is_some()
                        && !self.processor.is_subscribed()
                    {
                        self.processor.subscribe();
                    }
                    self.engine.drain_queue().await;
                }
                ConnectionSignal::ScheduleReconnect(delay) => {
                    self.reconnect_timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
                ConnectionSignal::GaveUp => {
                    self.reconnect_timer = None;
                }
            }
        }
        if event.is_lifecycle() {
            return;
        }

        let outcome = {
            let state = self.engine.state_handle();
            let mut state = lock_state(&state);
            self.processor.dispatch(&mut state, &event)
        };
        if let MergeOutcome::NeedsReadReceipt(id) = outcome {
            self.engine.mark_read(&id).await;
        }
    }

    async fn handle_command(&mut self, command: ClientCommand) {
        match command {
            ClientCommand::Connect => {
                self.reconnect_timer = None;
                self.connection.connect();
            }
            ClientCommand::Disconnect => {
                self.reconnect_timer = None;
                // Subscriptions go first so nothing from the dying channel
                // can still merge into the state.
                self.processor.unsubscribe();
                self.connection.disconnect();
            }
            ClientCommand::Reconnect => {
                self.reconnect_timer = None;
                self.connection.reconnect();
            }
            ClientCommand::SelectConversation(conversation) => {
                self.processor.unsubscribe();
                let subscribe = conversation.is_some();
                self.engine.select_conversation(conversation);
                if subscribe {
                    self.processor.subscribe();
                }
            }
            ClientCommand::StartTyping => {
                self.emit_typing(true);
            }
            ClientCommand::StopTyping => {
                self.emit_typing(false);
            }
            ClientCommand::Shutdown => unreachable!("handled by the loop"),
        }
    }

    fn emit_typing(&mut self, start: bool) {
        let Some(conversation_id) = self.engine.active_conversation_id() else {
            return;
        };
        let event = if start {
            ClientEvent::Typing {
                conversation_id,
                user_id: self.local_user.clone(),
                user_name: self.user_name.clone(),
            }
        } else {
            ClientEvent::StopTyping {
                conversation_id,
                user_id: self.local_user.clone(),
            }
        };
        // Typing indicators are best effort.
        if let Err(err) = self.connection.emit(&event) {
            warn!(error = %err, "Failed to emit typing event");
        }
    }
}
