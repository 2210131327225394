//! A pooled actor scheduler, dataflow channels, and a dataflow operator runtime for
//! structured concurrent programming.
//!
//! - [`actor`]: the continuation-style [`actor::reactive::ReactiveActor`] and the
//!   [`actor::blocking::BlockingActor`] adapter (C1).
//! - [`channels`]: the single-assignment variable, queue, and stream (C2).
//! - [`operator`]: the dataflow operator runtime built on top of C1 and C2 (C3).
//! - [`pool`] and [`runtime`]: the ambient worker-pool abstraction and process-wide
//!   configuration shared by all three.

pub mod actor;
pub mod channels;
pub mod operator;
pub mod pool;
pub mod runtime;

#[cfg(test)]
mod tests;

pub use actor::blocking::{BlockingActor, BlockingContext, BlockingOutcome};
pub use actor::handle::{ActorHandle, ActorTermination, Observation};
pub use actor::mailbox::{mock_mailbox, Envelope, Mailbox};
pub use actor::reactive::{ReactContext, ReactOutcome, ReactiveActor};
pub use actor::{ActorError, KillSwitch, Progress, SendError};
pub use channels::{ChannelError, Dfq, Dfs, Dfv};
pub use operator::{Operator, OperatorBody, OperatorContext, OperatorError, OperatorOptions};
pub use pool::Pool;
pub use runtime::RuntimeConfig;
