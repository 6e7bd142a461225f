pub mod command;
pub mod config;
pub mod consts;
pub mod database;
mod error;
pub mod http;
pub mod processor;
pub mod rcon;
pub mod reward;
pub mod supervisor;
pub mod template;
pub mod tracing;
pub mod vk;
mod vkcraft;

pub use config::Config;
pub use error::Error;
pub use vkcraft::Vkcraft;
