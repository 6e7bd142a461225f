//! Minecraft RCON console client.
//!
//! The wire protocol is handled by [`minecraft_client_rs`], which is blocking. Every call runs on
//! the blocking thread pool and is bounded by the configured timeout.

use std::time::Duration;

use async_trait::async_trait;
use minecraft_client_rs::Client;
use tokio::sync::{Mutex, watch};
use tokio::task::{self, JoinError};
use tracing::{debug, info, instrument, warn};

use crate::config::RconConfig;

/// The longest command body the server accepts.
pub const MAX_COMMAND_LEN: usize = 1446;

/// Errors that can occur while talking to the console.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The TCP connection could not be opened.
    #[error("could not connect to rcon server: {0}")]
    Connect(String),
    /// The server rejected the login.
    #[error("rcon authentication failed, check the password: {0}")]
    Authentication(String),
    /// A command could not be sent or its response could not be read.
    #[error("rcon command failed: {0}")]
    Command(String),
    /// The server didn't answer within the configured timeout.
    #[error("rcon operation timed out")]
    Timeout,
    /// There is no open connection.
    #[error("rcon is not connected")]
    NotConnected,
    /// The command is longer than the server accepts.
    #[error("command is {0} bytes, the limit is {MAX_COMMAND_LEN}")]
    CommandTooLong(usize),
    /// The blocking client task panicked or was cancelled.
    #[error("rcon task failed: {0}")]
    Task(#[from] JoinError),
}

/// The game server console.
#[async_trait]
pub trait Console: Send + Sync {
    /// Opens and authenticates the connection.
    async fn connect(&self) -> Result<(), Error>;

    /// Runs `command` and returns the server's response.
    async fn send(&self, command: &str) -> Result<String, Error>;

    /// Returns whether the connection is currently up.
    fn is_connected(&self) -> bool;
}

/// RCON client that keeps a single connection open and tracks whether it's up.
pub struct RconConsole {
    address: String,
    password: String,
    timeout: Duration,
    client: Mutex<Option<Client>>,
    status: watch::Sender<bool>,
}

/// Runs `f` on the blocking thread pool, giving up after `duration`.
///
/// A timed out task keeps running in the background, but whatever it owns is dropped with it.
async fn blocking<T, F>(duration: Duration, f: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::time::timeout(duration, task::spawn_blocking(f))
        .await
        .map_err(|_| Error::Timeout)?
        .map_err(Error::Task)
}

impl RconConsole {
    /// Creates a disconnected client for the server in `config`.
    #[must_use]
    pub fn new(config: &RconConfig) -> Self {
        let (status, _) = watch::channel(false);

        Self {
            address: format!("{}:{}", config.host, config.port),
            password: config.password.clone(),
            timeout: config.timeout,
            client: Mutex::new(None),
            status,
        }
    }

    /// Returns a receiver that observes connectivity changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.status.subscribe()
    }

    fn open(address: String, password: String) -> Result<Client, Error> {
        let mut client = Client::new(address).map_err(|err| Error::Connect(err.to_string()))?;

        client
            .authenticate(password)
            .map_err(|err| Error::Authentication(err.to_string()))?;

        Ok(client)
    }
}

#[async_trait]
impl Console for RconConsole {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn connect(&self) -> Result<(), Error> {
        let mut slot = self.client.lock().await;
        let address = self.address.clone();
        let password = self.password.clone();

        debug!("authenticating");

        let client = blocking(self.timeout, move || Self::open(address, password)).await??;

        *slot = Some(client);
        self.status.send_replace(true);

        info!("rcon connected");

        Ok(())
    }

    #[instrument(skip(self))]
    async fn send(&self, command: &str) -> Result<String, Error> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(Error::CommandTooLong(command.len()));
        }

        let mut slot = self.client.lock().await;
        let mut client = slot.take().ok_or(Error::NotConnected)?;
        let command = command.to_owned();

        let result = blocking(self.timeout, move || {
            let response = client
                .send_command(command)
                .map(|message| message.body)
                .map_err(|err| Error::Command(err.to_string()));

            (client, response)
        })
        .await;

        match result {
            Ok((client, Ok(response))) => {
                *slot = Some(client);

                debug!(%response, "command executed");

                Ok(response)
            }
            Ok((_, Err(err))) | Err(err) => {
                self.status.send_replace(false);

                warn!(?err, "rcon connection lost");

                Err(err)
            }
        }
    }

    fn is_connected(&self) -> bool {
        *self.status.borrow()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    use super::*;

    const PASSWORD: &str = "hunter2";
    const AUTH: i32 = 3;
    const AUTH_RESPONSE: i32 = 2;
    const EXEC_COMMAND: i32 = 2;
    const RESPONSE_VALUE: i32 = 0;

    async fn read_packet(stream: &mut TcpStream) -> Option<(i32, i32, String)> {
        let len = usize::try_from(stream.read_i32_le().await.ok()?).ok()?;
        let mut buf = vec![0; len];
        stream.read_exact(&mut buf).await.ok()?;

        let id = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let kind = i32::from_le_bytes(buf[4..8].try_into().unwrap());
        let body = String::from_utf8_lossy(&buf[8..len - 2]).into_owned();

        Some((id, kind, body))
    }

    async fn write_packet(stream: &mut TcpStream, id: i32, kind: i32, body: &str) {
        let len = i32::try_from(body.len() + 10).unwrap();
        let mut buf = vec![];
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(&id.to_le_bytes());
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(body.as_bytes());
        buf.extend_from_slice(&[0, 0]);

        stream.write_all(&buf).await.unwrap();
    }

    /// Accepts a single client, answers the login and echoes commands back until the client
    /// disconnects. Returns the command bodies it received.
    async fn fake_server(hang_up_after_auth: bool) -> (SocketAddr, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut commands = vec![];

            let (id, kind, body) = read_packet(&mut stream).await.unwrap();
            assert_eq!(kind, AUTH);

            let id = if body == PASSWORD { id } else { -1 };
            write_packet(&mut stream, id, AUTH_RESPONSE, "").await;

            if hang_up_after_auth {
                return commands;
            }

            while let Some((id, kind, body)) = read_packet(&mut stream).await {
                assert_eq!(kind, EXEC_COMMAND);

                write_packet(&mut stream, id, RESPONSE_VALUE, &format!("ran: {body}")).await;
                commands.push(body);
            }

            commands
        });

        (addr, handle)
    }

    fn console(addr: SocketAddr, password: &str) -> RconConsole {
        RconConsole::new(&RconConfig {
            host: addr.ip().to_string(),
            port: addr.port(),
            password: password.to_string(),
            reconnect_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(5),
        })
    }

    #[tokio::test]
    async fn connect_and_send() {
        let (addr, server) = fake_server(false).await;
        let console = console(addr, PASSWORD);
        let status = console.subscribe();

        assert!(!console.is_connected());

        console.connect().await.unwrap();

        assert!(console.is_connected());
        assert!(*status.borrow());
        assert_eq!(
            console.send("give Notch diamond 1").await.unwrap(),
            "ran: give Notch diamond 1"
        );

        drop(console);

        assert_eq!(server.await.unwrap(), vec!["give Notch diamond 1"]);
    }

    #[tokio::test]
    async fn connect_with_wrong_password() {
        let (addr, _server) = fake_server(false).await;
        let console = console(addr, "wrong");

        assert!(matches!(
            console.connect().await,
            Err(Error::Authentication(_))
        ));
        assert!(!console.is_connected());
    }

    #[tokio::test]
    async fn connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let console = console(addr, PASSWORD);

        assert!(matches!(console.connect().await, Err(Error::Connect(_))));
        assert!(!console.is_connected());
    }

    #[tokio::test]
    async fn connect_times_out() {
        // Accepts the connection but never answers the login.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(stream);
        });

        let mut console = console(addr, PASSWORD);
        console.timeout = Duration::from_millis(200);

        assert!(matches!(console.connect().await, Err(Error::Timeout)));
        assert!(!console.is_connected());
    }

    #[tokio::test]
    async fn send_while_disconnected() {
        let (addr, _server) = fake_server(false).await;
        let console = console(addr, PASSWORD);

        assert!(matches!(
            console.send("list").await,
            Err(Error::NotConnected)
        ));
    }

    #[tokio::test]
    async fn send_rejects_long_command() {
        let (addr, _server) = fake_server(false).await;
        let console = console(addr, PASSWORD);
        let command = "a".repeat(MAX_COMMAND_LEN + 1);

        assert!(matches!(
            console.send(&command).await,
            Err(Error::CommandTooLong(_))
        ));
    }

    #[tokio::test]
    async fn lost_connection_marks_disconnected() {
        let (addr, server) = fake_server(true).await;
        let console = console(addr, PASSWORD);
        let mut status = console.subscribe();

        console.connect().await.unwrap();
        server.await.unwrap();

        assert!(console.send("list").await.is_err());
        assert!(!console.is_connected());
        assert!(status.has_changed().unwrap());
        assert!(!*status.borrow_and_update());

        // The broken client is gone, so nothing is sent until the next reconnect.
        assert!(matches!(
            console.send("list").await,
            Err(Error::NotConnected)
        ));
    }
}
