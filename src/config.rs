use std::path::Path;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::{Deserialize, Serialize};

use crate::{Error, consts, template};

/// The prefix of environment variables that override values from the config file.
pub const ENV_PREFIX: &str = "VKCRAFT_";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Database configuration
    pub database: DbConfig,
    /// Tracing configuration
    pub tracing: TracingConfig,
    /// VK client configuration
    pub vk: VkConfig,
    /// RCON client configuration
    pub rcon: RconConfig,
    /// Reward command detection
    pub command: CommandConfig,
    /// Reply message templates
    pub messages: MessagesConfig,
    /// SQL statement templates
    pub sql: SqlConfig,
    /// How the reward is delivered
    pub reward: RewardConfig,
}

impl Config {
    /// Loads the TOML file at `path`, with `VKCRAFT_`-prefixed environment variables layered on
    /// top. Nested keys are separated by `__`, e.g. `VKCRAFT_RCON__PASSWORD`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be parsed or a required value is missing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Checks the values that deserialization alone can't.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LongPollWaitTooLong`] if a long poll would outlast the HTTP timeout and
    /// [`Error::PlaceholderInLiteral`] if a query template has a placeholder that can't be bound.
    pub fn validate(&self) -> Result<(), Error> {
        if self.vk.long_poll_wait > consts::MAX_VK_LONG_POLL_WAIT {
            return Err(Error::LongPollWaitTooLong(self.vk.long_poll_wait));
        }

        let reward_query = match &self.reward {
            RewardConfig::DatabaseWrite { query } => Some(query.as_str()),
            RewardConfig::Message { .. } | RewardConfig::ConsoleCommand { .. } => None,
        };

        [&self.sql.check_user, &self.sql.check_player, &self.sql.save_claim]
            .into_iter()
            .map(String::as_str)
            .chain(reward_query)
            .try_for_each(template::check_query)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DbConfig {
    /// Connection URL
    pub url: String,
    /// Maximum number of connections to keep in the connection pool
    #[serde(default = "default_max_db_connections")]
    pub max_connections: u32,
    /// Maximum idle duration for individual connections
    #[serde(default = "default_db_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TracingConfig {
    /// Enable tracing
    pub enabled: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct VkConfig {
    /// The access token of the account the bot runs as.
    pub token: String,
    /// The API version to request.
    #[serde(default = "default_vk_api_version")]
    pub api_version: String,
    /// The base URL of the API, including the trailing slash.
    #[serde(default = "default_vk_api_url")]
    pub api_url: String,
    /// How long the long poll server may hold a request before returning no updates.
    #[serde(default = "default_vk_long_poll_wait", with = "humantime_serde")]
    pub long_poll_wait: Duration,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RconConfig {
    /// The hostname of the game server.
    pub host: String,
    /// The RCON port of the game server.
    #[serde(default = "default_rcon_port")]
    pub port: u16,
    /// The RCON password.
    pub password: String,
    /// How often to check the connection and reconnect when it's down.
    #[serde(default = "default_rcon_reconnect_interval", with = "humantime_serde")]
    pub reconnect_interval: Duration,
    /// Upper bound for each connect, read and write.
    #[serde(default = "default_rcon_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CommandConfig {
    /// The regular expression that detects the command. Capture group 1 is the nickname.
    pub pattern: String,
    /// Pattern flags, e.g. `"i"` for case-insensitive matching.
    #[serde(default)]
    pub flags: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MessagesConfig {
    /// Sent when the VK user has already claimed a reward.
    pub user_already_rewarded: String,
    /// Sent when the nickname has already been claimed.
    pub player_already_rewarded: String,
    /// Sent when the nickname is unknown.
    pub player_not_found: String,
    /// Sent when the claim is accepted.
    pub success: String,
}

/// SQL statement templates.
///
/// Rows are read through the database-agnostic driver, which can't decode every column type
/// (`DATETIME` and `DECIMAL` on MySQL, for one). The check queries should select only the columns
/// they need rather than `SELECT *`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SqlConfig {
    /// Selects rows already claimed by `%vkid%`. Only whether a row comes back matters.
    pub check_user: String,
    /// Selects the row of `%nickname%`, which must include the claimant column.
    pub check_player: String,
    /// Writes `%vkid%` onto the row of `%nickname%`. Should only match unclaimed rows.
    pub save_claim: String,
    /// The column of the `check_player` row that holds the claimant.
    #[serde(default = "default_claimant_column")]
    pub claimant_column: String,
}

/// Reward delivery mode and its template.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RewardConfig {
    /// Send a chat message to the user.
    #[serde(alias = "msg")]
    Message {
        /// The message template.
        text: String,
    },
    /// Run a command on the game server console.
    #[serde(alias = "rcon")]
    ConsoleCommand {
        /// The command template.
        command: String,
    },
    /// Execute a write query against the database.
    #[serde(alias = "sql")]
    DatabaseWrite {
        /// The query template.
        query: String,
    },
}

#[must_use]
pub const fn default_max_db_connections() -> u32 {
    consts::DEFAULT_MAX_DB_CONNECTIONS
}

#[must_use]
pub const fn default_db_idle_timeout() -> Duration {
    consts::DEFAULT_DB_IDLE_TIMEOUT
}

fn default_vk_api_version() -> String {
    consts::DEFAULT_VK_API_VERSION.to_string()
}

fn default_vk_api_url() -> String {
    consts::DEFAULT_VK_API_URL.to_string()
}

const fn default_vk_long_poll_wait() -> Duration {
    consts::DEFAULT_VK_LONG_POLL_WAIT
}

const fn default_rcon_port() -> u16 {
    consts::DEFAULT_RCON_PORT
}

const fn default_rcon_reconnect_interval() -> Duration {
    consts::DEFAULT_RCON_RECONNECT_INTERVAL
}

const fn default_rcon_timeout() -> Duration {
    consts::DEFAULT_RCON_TIMEOUT
}

fn default_claimant_column() -> String {
    consts::DEFAULT_CLAIMANT_COLUMN.to_string()
}
