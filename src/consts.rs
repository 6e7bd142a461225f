use std::time::Duration;

/// The `User-Agent` header to send when issuing HTTP requests.
pub const HTTP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// The duration before a HTTP request times out.
///
/// This has to stay above the long poll wait time, or every idle poll would time out.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(90);

/// The default value for the maximum number of connections the database connection pool will keep
/// open at once.
pub const DEFAULT_MAX_DB_CONNECTIONS: u32 = 5;

/// The default value for the duration the connection pool will keep an idle connection open.
pub const DEFAULT_DB_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// The default VK API version to request.
pub const DEFAULT_VK_API_VERSION: &str = "5.199";

/// The default base URL of the VK API.
pub const DEFAULT_VK_API_URL: &str = "https://api.vk.com/method/";

/// The default duration the VK long poll server may hold a request open.
pub const DEFAULT_VK_LONG_POLL_WAIT: Duration = Duration::from_secs(25);

/// The longest long poll wait that still leaves room for the round trip within [`HTTP_TIMEOUT`].
pub const MAX_VK_LONG_POLL_WAIT: Duration = Duration::from_secs(80);

/// The delay before polling again after a failed long poll request.
pub const VK_LONG_POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// The default RCON port used by Minecraft servers.
pub const DEFAULT_RCON_PORT: u16 = 25575;

/// The default interval between RCON reconnection attempts.
pub const DEFAULT_RCON_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// The default duration before an RCON network operation times out.
pub const DEFAULT_RCON_TIMEOUT: Duration = Duration::from_secs(10);

/// The default name of the column that holds the claimant's VK id.
pub const DEFAULT_CLAIMANT_COLUMN: &str = "vkid";
