//! The main process tying VK, the game console and the database together.
use std::pin::pin;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use tracing::{debug, error, info};

use crate::Error;
use crate::command::Command;
use crate::config::Config;
use crate::database::RewardStore;
use crate::processor::Processor;
use crate::rcon::RconConsole;
use crate::reward::Dispatcher;
use crate::supervisor::Supervisor;
use crate::vk::{InboundMessage, LongPoll, VkClient};

/// The bot: owns the clients and feeds incoming messages to the command processor.
pub struct Vkcraft {
    /// The complete configuration loaded from file and environment
    config: Config,
    /// The VK API client
    vk: VkClient,
    /// The game server console
    console: Arc<RconConsole>,
    /// Claim records
    store: Arc<dyn RewardStore>,
}

impl Vkcraft {
    /// Creates the bot from `config`, storing claims in `store`.
    ///
    /// No connections are opened until [`run`] is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Vk`] if the VK client can't be created.
    ///
    /// [`run`]: Vkcraft::run
    pub fn new(config: Config, store: Arc<dyn RewardStore>) -> Result<Self, Error> {
        let vk = VkClient::new(&config.vk)?;
        let console = Arc::new(RconConsole::new(&config.rcon));

        Ok(Self {
            config,
            vk,
            console,
            store,
        })
    }

    /// Builds the command processor from the configuration.
    fn processor(&self) -> Result<Processor, Error> {
        let command = Command::new(&self.config.command.pattern, &self.config.command.flags)?;
        let chat = Arc::new(self.vk.clone());
        let dispatcher = Dispatcher::new(
            self.config.reward.clone(),
            chat.clone(),
            self.console.clone(),
            self.store.clone(),
        );

        Ok(Processor::new(
            command,
            self.config.messages.clone(),
            self.store.clone(),
            chat,
            dispatcher,
        ))
    }

    /// Starts the console supervisor and processes VK messages until the process exits.
    ///
    /// # Errors
    ///
    /// This function will return an error in the following situations:
    ///
    /// - [`Error::InvalidPattern`] and friends - if the command pattern is invalid.
    /// - [`Error::Vk`] - if the long poll session can't be established.
    ///
    /// Errors while handling individual messages are logged and never end the loop.
    pub async fn run(&self) -> Result<(), Error> {
        let processor = self.processor()?;
        let supervisor = Supervisor::new(self.console.clone(), self.config.rcon.reconnect_interval);

        tokio::spawn(supervisor.run());

        let long_poll = LongPoll::connect(self.vk.clone()).await?;

        process_messages(&processor, long_poll.into_stream()).await;

        Ok(())
    }
}

/// Handles `messages` one at a time, in order.
async fn process_messages(processor: &Processor, messages: impl Stream<Item = InboundMessage>) {
    let mut messages = pin!(messages);

    while let Some(message) = messages.next().await {
        debug!(?message, "processing vk message");

        match processor.handle_message(&message).await {
            Ok(outcome) => debug!(?outcome, "message processed"),
            Err(err) => error!(?err, "could not process message"),
        }
    }

    info!("message stream ended");
}
