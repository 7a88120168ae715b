//! Transports that carry the wire protocol

pub mod loopback;

use thiserror::Error;

pub use loopback::{run_demo, Bot, BotReport, DemoReport, LoopbackServer, ServerHandle};

#[derive(Debug, Error)]
pub enum NetError {
    #[error("Loopback task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
