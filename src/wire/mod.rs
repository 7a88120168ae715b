//! Wire formats: binary codec and message envelopes

pub mod codec;
pub mod protocol;

pub use codec::CodecError;
pub use protocol::{ClientMsg, PlayerInput, ServerMsg};
