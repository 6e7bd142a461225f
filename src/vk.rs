//! VK messaging: API calls and the user long poll.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use serde::Deserialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::Value;
use tracing::{debug, error, info, instrument, trace, warn};
use url::Url;

use crate::config::VkConfig;
use crate::{consts, http};

/// Long poll event code of a new message.
const EVENT_MESSAGE_NEW: u64 = 4;
/// Message flag set on messages the account sent itself.
const FLAG_OUTBOX: u64 = 2;
/// Peer ids from here on are group chats rather than users.
const CHAT_PEER_OFFSET: i64 = 2_000_000_000;

/// Errors that can occur while talking to VK.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The HTTP request failed or returned an error status.
    #[error("request error: {0}")]
    Request(#[source] reqwest::Error),
    /// The response body didn't have the expected shape.
    #[error("could not deserialize response: {0}")]
    Deserialize(#[source] serde_path_to_error::Error<serde_json::Error>),
    /// The API answered with an error object.
    #[error("api error {code}: {message}")]
    Api {
        /// The VK error code.
        code: i64,
        /// The error description.
        message: String,
    },
    /// The response had neither a result nor an error.
    #[error("response has neither a result nor an error")]
    EmptyResponse,
    /// An API or long poll url couldn't be built.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// A private message sent to the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The VK id of the sender.
    pub sender_id: i64,
    /// The raw message text.
    pub text: String,
}

/// Something that can deliver chat messages to a user.
#[async_trait]
pub trait ChatSender: Send + Sync {
    /// Sends `text` to the user with the given id.
    async fn send(&self, user_id: i64, text: &str) -> Result<(), Error>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    error_msg: String,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<T, Error> {
        match (self.response, self.error) {
            (_, Some(err)) => Err(Error::Api {
                code: err.error_code,
                message: err.error_msg,
            }),
            (Some(response), None) => Ok(response),
            (None, None) => Err(Error::EmptyResponse),
        }
    }
}

/// The long poll `ts` is a number for user long polls and a string for community ones.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Number(u64),
    Text(String),
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(ts) => write!(f, "{ts}"),
            Self::Text(ts) => f.write_str(ts),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct LongPollServer {
    key: String,
    server: String,
    ts: Timestamp,
}

#[derive(Debug, Deserialize)]
struct PollResponse {
    ts: Option<Timestamp>,
    failed: Option<u8>,
    #[serde(default)]
    updates: Vec<Value>,
}

/// Decodes a JSON response body, logging the body if it doesn't match `T`.
fn decode<T: DeserializeOwned>(text: &str) -> Result<T, Error> {
    let jd = &mut serde_json::Deserializer::from_str(text);

    serde_path_to_error::deserialize(jd)
        .inspect_err(|err| error!(?err, %text, "could not parse vk response"))
        .map_err(Error::Deserialize)
}

/// Extracts a private message from a single long poll update.
///
/// Updates are arrays of the form `[4, message_id, flags, peer_id, timestamp, text, ...]`.
/// Everything that isn't an incoming private message is ignored.
fn parse_update(update: &Value) -> Option<InboundMessage> {
    let fields = update.as_array()?;

    if fields.first()?.as_u64()? != EVENT_MESSAGE_NEW {
        return None;
    }

    let flags = fields.get(2)?.as_u64()?;
    let peer_id = fields.get(3)?.as_i64()?;
    let text = fields.get(5)?.as_str()?;

    if flags & FLAG_OUTBOX != 0 || !(1..CHAT_PEER_OFFSET).contains(&peer_id) {
        return None;
    }

    Some(InboundMessage {
        sender_id: peer_id,
        text: text.to_string(),
    })
}

/// VK API client.
#[derive(Clone)]
pub struct VkClient {
    http: reqwest::Client,
    api_url: Url,
    token: String,
    api_version: String,
    long_poll_wait: Duration,
}

impl VkClient {
    /// Creates a client for the account in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API url is invalid or the HTTP client can't be built.
    pub fn new(config: &VkConfig) -> Result<Self, Error> {
        let http = http::build_client().map_err(Error::Request)?;
        let api_url = Url::parse(&config.api_url)?;

        Ok(Self {
            http,
            api_url,
            token: config.token.clone(),
            api_version: config.api_version.clone(),
            long_poll_wait: config.long_poll_wait,
        })
    }

    /// Calls the API `method` with `params` and returns the decoded `response` field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Api`] if VK rejected the call, and transport or decoding errors
    /// otherwise.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T, Error> {
        let url = self.api_url.join(method)?;
        let mut form: Vec<(&str, &str)> = vec![
            ("access_token", self.token.as_str()),
            ("v", self.api_version.as_str()),
        ];
        form.extend(params.iter().map(|(key, value)| (*key, value.as_str())));

        trace!(%method, "calling vk api");

        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(Error::Request)?;
        let text = response.text().await.map_err(Error::Request)?;

        decode::<Envelope<T>>(&text)?.into_result()
    }

    async fn long_poll_server(&self) -> Result<LongPollServer, Error> {
        self.call(
            "messages.getLongPollServer",
            &[("lp_version", "3".to_string())],
        )
        .await
    }
}

#[async_trait]
impl ChatSender for VkClient {
    #[instrument(skip(self, text))]
    async fn send(&self, user_id: i64, text: &str) -> Result<(), Error> {
        // `random_id` lets VK drop duplicates if a send is retried.
        let random_id: i32 = rand::random();
        let params = [
            ("peer_id", user_id.to_string()),
            ("message", text.to_string()),
            ("random_id", random_id.to_string()),
        ];

        self.call::<IgnoredAny>("messages.send", &params).await?;
        debug!("message sent");

        Ok(())
    }
}

/// A user long poll session that yields incoming private messages.
pub struct LongPoll {
    client: VkClient,
    server: LongPollServer,
    pending: VecDeque<InboundMessage>,
}

impl LongPoll {
    /// Opens a long poll session.
    ///
    /// # Errors
    ///
    /// Returns an error if the long poll server can't be obtained, e.g. due to a bad token.
    pub async fn connect(client: VkClient) -> Result<Self, Error> {
        let server = client.long_poll_server().await?;

        info!(server = %server.server, "long poll session established");

        Ok(Self {
            client,
            server,
            pending: VecDeque::new(),
        })
    }

    /// Makes a single long poll request and returns the messages it delivered.
    async fn poll(&mut self) -> Result<Vec<InboundMessage>, Error> {
        let ts = self.server.ts.to_string();
        let wait = self.client.long_poll_wait.as_secs().to_string();
        let url = Url::parse_with_params(
            &format!("https://{}", self.server.server),
            &[
                ("act", "a_check"),
                ("key", self.server.key.as_str()),
                ("ts", ts.as_str()),
                ("wait", wait.as_str()),
                ("mode", "2"),
                ("version", "3"),
            ],
        )?;

        let response = self
            .client
            .http
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(Error::Request)?;
        let text = response.text().await.map_err(Error::Request)?;
        let response: PollResponse = decode(&text)?;

        match response.failed {
            None => {
                if let Some(ts) = response.ts {
                    self.server.ts = ts;
                }

                Ok(response.updates.iter().filter_map(parse_update).collect())
            }
            // Events were lost, continue from the ts the server gave us.
            Some(1) => {
                warn!("long poll history is out of date");

                if let Some(ts) = response.ts {
                    self.server.ts = ts;
                }

                Ok(vec![])
            }
            // The key expired, keep our ts.
            Some(2) => {
                debug!("long poll key expired");

                let ts = self.server.ts.clone();
                self.server = self.client.long_poll_server().await?;
                self.server.ts = ts;

                Ok(vec![])
            }
            Some(code) => {
                warn!(%code, "long poll session lost, starting over");

                self.server = self.client.long_poll_server().await?;

                Ok(vec![])
            }
        }
    }

    /// Waits for the next incoming message.
    ///
    /// Failed polls are logged and retried after a short delay, so this only returns once a
    /// message arrives.
    pub async fn next_message(&mut self) -> InboundMessage {
        loop {
            if let Some(message) = self.pending.pop_front() {
                return message;
            }

            match self.poll().await {
                Ok(messages) => self.pending.extend(messages),
                Err(err) => {
                    error!(?err, "long poll request failed");
                    tokio::time::sleep(consts::VK_LONG_POLL_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Turns the session into an endless stream of messages.
    pub fn into_stream(self) -> impl Stream<Item = InboundMessage> {
        futures::stream::unfold(self, |mut long_poll| async move {
            let message = long_poll.next_message().await;

            Some((message, long_poll))
        })
    }
}
