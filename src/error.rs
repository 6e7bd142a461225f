//! Error types

use miette::Diagnostic;
use thiserror::Error;

/// Application errors for the database, chat, console and command handling.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Failed to establish a connection to the database.
    #[error("Cannot connect to database")]
    #[diagnostic(code(vkcraft::db_open))]
    OpenDatabase(#[source] sqlx::Error),
    /// The database URL uses a scheme without a supported driver.
    #[error("Unsupported database url scheme: {0}")]
    #[diagnostic(
        code(vkcraft::db_scheme),
        help("use a mysql://, postgres:// or sqlite: url")
    )]
    UnsupportedDatabase(String),
    /// A database query operation failed.
    #[error("Database query failed")]
    DatabaseQueryFailed(#[from] sqlx::Error),
    /// The command pattern could not be compiled.
    #[error("Invalid command pattern")]
    #[diagnostic(code(vkcraft::pattern))]
    InvalidPattern(#[source] regex::Error),
    /// The command pattern flags contain an unknown flag.
    #[error("Unknown command pattern flag `{0}`")]
    #[diagnostic(code(vkcraft::pattern_flag), help("supported flags are i, m, s, x, U, g and u"))]
    InvalidPatternFlag(char),
    /// The command pattern has no capture group to extract the nickname from.
    #[error("Command pattern has no capture group for the nickname")]
    #[diagnostic(code(vkcraft::pattern_group))]
    MissingCaptureGroup,
    /// A query template has a placeholder inside a string literal, where it can't be bound.
    #[error("Placeholder inside the SQL string literal {0}")]
    #[diagnostic(
        code(vkcraft::sql_template),
        help("move the placeholder out of the quotes, e.g. 'claimed by ' || %vkid% or CONCAT('claimed by ', %vkid%)")
    )]
    PlaceholderInLiteral(String),
    /// The long poll wait doesn't leave room for the round trip within the HTTP timeout.
    #[error("VK long poll wait of {0:?} is too long")]
    #[diagnostic(
        code(vkcraft::long_poll_wait),
        help("use a long_poll_wait of at most 80s, the HTTP timeout is 90s")
    )]
    LongPollWaitTooLong(std::time::Duration),
    /// VK API or long poll error.
    #[error("VK error")]
    Vk(#[from] crate::vk::Error),
    /// RCON client error.
    #[error("RCON error")]
    Rcon(#[from] crate::rcon::Error),
}
