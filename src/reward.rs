//! Reward delivery.

use std::sync::Arc;

use tracing::{Instrument, debug, error, info};

use crate::Error;
use crate::config::RewardConfig;
use crate::database::RewardStore;
use crate::rcon::Console;
use crate::template::Placeholders;
use crate::vk::ChatSender;

/// Delivers the reward through the configured channel.
pub struct Dispatcher {
    reward: RewardConfig,
    chat: Arc<dyn ChatSender>,
    console: Arc<dyn Console>,
    store: Arc<dyn RewardStore>,
}

impl Dispatcher {
    /// Creates a dispatcher for the `reward` mode.
    #[must_use]
    pub fn new(
        reward: RewardConfig,
        chat: Arc<dyn ChatSender>,
        console: Arc<dyn Console>,
        store: Arc<dyn RewardStore>,
    ) -> Self {
        Self {
            reward,
            chat,
            console,
            store,
        }
    }

    /// Delivers the reward for `placeholders`.
    ///
    /// Chat rewards are sent before returning. Console commands and database writes run in a
    /// background task that logs its outcome, so their failures never reach the caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Vk`] if a chat reward can't be sent.
    pub async fn dispatch(&self, placeholders: &Placeholders) -> Result<(), Error> {
        match &self.reward {
            RewardConfig::Message { text } => {
                let text = placeholders.render(text);
                self.chat.send(placeholders.user_id(), &text).await?;

                debug!("reward message sent");
            }
            RewardConfig::ConsoleCommand { command } => {
                let command = placeholders.render(command);
                let console = self.console.clone();

                tokio::spawn(
                    async move {
                        match console.send(&command).await {
                            Ok(response) => info!(%command, %response, "reward command executed"),
                            Err(err) => error!(?err, %command, "reward command failed"),
                        }
                    }
                    .in_current_span(),
                );
            }
            RewardConfig::DatabaseWrite { query } => {
                let query = query.clone();
                let placeholders = placeholders.clone();
                let store = self.store.clone();

                tokio::spawn(
                    async move {
                        match store.execute(&query, &placeholders).await {
                            Ok(rows) => info!(%rows, "reward written to database"),
                            Err(err) => error!(?err, "reward query failed"),
                        }
                    }
                    .in_current_span(),
                );
            }
        }

        Ok(())
    }
}
