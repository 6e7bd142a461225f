//! Reward command handling.

use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::Error;
use crate::command::Command;
use crate::config::MessagesConfig;
use crate::database::{PlayerStatus, RewardStore};
use crate::reward::Dispatcher;
use crate::template::Placeholders;
use crate::vk::{ChatSender, InboundMessage};

/// How a message was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The message isn't a reward command.
    Ignored,
    /// The command was given without a nickname.
    MissingNickname,
    /// The user has claimed a reward before.
    UserAlreadyRewarded,
    /// The nickname has been claimed before.
    PlayerAlreadyRewarded,
    /// There is no player with the nickname.
    PlayerNotFound,
    /// The nickname was claimed between the check and the write.
    ClaimLost,
    /// The claim was saved and the reward dispatched.
    Rewarded,
}

/// Checks reward commands against the store and hands out rewards.
pub struct Processor {
    command: Command,
    messages: MessagesConfig,
    store: Arc<dyn RewardStore>,
    chat: Arc<dyn ChatSender>,
    dispatcher: Dispatcher,
}

impl Processor {
    /// Creates a processor for commands matching `command`.
    #[must_use]
    pub fn new(
        command: Command,
        messages: MessagesConfig,
        store: Arc<dyn RewardStore>,
        chat: Arc<dyn ChatSender>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            command,
            messages,
            store,
            chat,
            dispatcher,
        }
    }

    /// Processes a single inbound message.
    ///
    /// # Errors
    ///
    /// Returns an error if a store query fails or a chat reward can't be delivered. Steps that
    /// ran before the failure are not undone.
    #[instrument(skip_all, fields(user_id = message.sender_id))]
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<Outcome, Error> {
        let Some(nickname) = self.command.parse(&message.text) else {
            return Ok(Outcome::Ignored);
        };

        if nickname.is_empty() {
            debug!("command without a nickname");

            return Ok(Outcome::MissingNickname);
        }

        let placeholders = Placeholders::new(message.sender_id, nickname);

        if self.store.has_claim(&placeholders).await? {
            info!(%nickname, "user was already rewarded");
            self.reply(&placeholders, &self.messages.user_already_rewarded)
                .await;

            return Ok(Outcome::UserAlreadyRewarded);
        }

        match self.store.player_status(&placeholders).await? {
            PlayerStatus::Claimed => {
                info!(%nickname, "player was already rewarded");
                self.reply(&placeholders, &self.messages.player_already_rewarded)
                    .await;

                return Ok(Outcome::PlayerAlreadyRewarded);
            }
            PlayerStatus::NotFound => {
                info!(%nickname, "player not found");
                self.reply(&placeholders, &self.messages.player_not_found)
                    .await;

                return Ok(Outcome::PlayerNotFound);
            }
            PlayerStatus::Unclaimed => {}
        }

        self.reply(&placeholders, &self.messages.success).await;

        if !self.store.save_claim(&placeholders).await? {
            warn!(%nickname, "player was claimed by someone else in the meantime");

            return Ok(Outcome::ClaimLost);
        }

        info!(%nickname, "reward claimed");

        self.dispatcher.dispatch(&placeholders).await?;

        Ok(Outcome::Rewarded)
    }

    /// Sends the rendered `template` to the user. A failed reply is logged and doesn't stop the
    /// command.
    async fn reply(&self, placeholders: &Placeholders, template: &str) {
        let text = placeholders.render(template);

        if let Err(err) = self.chat.send(placeholders.user_id(), &text).await {
            error!(?err, "could not send reply");
        }
    }
}
