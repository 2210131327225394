//! Dataflow channels (C2): the single-assignment variable ([`dfv::Dfv`]), the
//! multi-producer/single-consumer queue ([`dfq::Dfq`]), and the functional lazy
//! stream ([`dfs::Dfs`]).

pub mod dfq;
pub mod dfs;
pub mod dfv;

pub use dfq::Dfq;
pub use dfs::Dfs;
pub use dfv::Dfv;

use thiserror::Error;

/// Errors surfaced by the channel subsystem, grounded on the base design's
/// `AlreadyBoundError` / timeout taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is already bound")]
    AlreadyBound,
    #[error("unique-bind value does not match the already-bound value")]
    UniqueBindMismatch,
    #[error("timed out waiting for a value")]
    Timeout,
    #[error("channel was closed before a value arrived")]
    Closed,
}
