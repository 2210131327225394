//! Pooled actors (C1): a continuation-style [`reactive`] actor whose chunks release
//! the worker between messages, and a [`blocking`] adapter implementing the same
//! public contract over a dedicated worker.

pub mod blocking;
pub mod handle;
pub mod mailbox;
pub mod reactive;

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use handle::{ActorHandle, ActorTermination, Observation};
pub use mailbox::{mock_mailbox, Envelope, Mailbox};

/// Errors surfaced by the actor subsystem, grounded on the base design's
/// `InvalidOperationError` / `DeliveryError` / `UserError` taxonomy.
#[derive(Error, Debug)]
pub enum ActorError {
    #[error("actor has not been started")]
    NotStarted,
    #[error("actor is stopped")]
    Stopped,
    #[error("this actor has replies disabled")]
    RepliesDisabled,
    #[error("the message being processed has no sender to reply to")]
    NoCurrentSender,
    #[error("the sender does not accept a reply of this type")]
    ReplyTypeMismatch,
    #[error("message could not be delivered")]
    Delivery,
    #[error("timed out waiting for a reply")]
    Timeout,
    #[error(transparent)]
    User(#[from] anyhow::Error),
}

/// Thin error used by the mailbox's own `send`, independent of [`ActorError`] so that
/// [`mailbox::Mailbox`] does not need to know about the richer taxonomy above.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("the actor's mailbox is closed")]
    Closed,
    #[error("the reply does not match the type the sender expects")]
    TypeMismatch,
}

/// A type-erased target a reply can be delivered to: the sender's own mailbox,
/// narrowed to "accepts a boxed `Any`". This is how `reply()` can target whichever
/// actor sent the message currently being processed without every actor sharing one
/// concrete `Reply` type, mirroring the base spec's untyped `{sender?, payload: any}`
/// envelope in a statically typed setting (see DESIGN.md).
pub trait ErasedReplyRecipient: Send + Sync {
    fn deliver_any(&self, reply: Box<dyn Any + Send>) -> Result<(), SendError>;
}

pub(crate) struct MailboxRecipient<M> {
    mailbox: Mailbox<M>,
}

impl<M: Send + Sync + std::fmt::Debug + 'static> ErasedReplyRecipient for MailboxRecipient<M> {
    fn deliver_any(&self, reply: Box<dyn Any + Send>) -> Result<(), SendError> {
        match reply.downcast::<M>() {
            Ok(message) => self.mailbox.send_blocking(*message),
            Err(_) => Err(SendError::TypeMismatch),
        }
    }
}

pub type AnyRecipient = Arc<dyn ErasedReplyRecipient>;

tokio::task_local! {
    /// The mailbox of the actor whose chunk is currently executing, narrowed to a
    /// reply target. Set on chunk entry and cleared on exit (see
    /// [`reactive::run_reactive_actor`] / [`blocking::run_blocking_actor`]); read by
    /// [`Mailbox::send`] to capture the sender automatically.
    pub(crate) static CURRENT_SENDER: Option<AnyRecipient>;
}

/// Makes it possible to register forward progress on a chunk. If no progress is
/// observed between two heartbeats the actor is presumed wedged.
///
/// This is a watchdog layered under, not instead of, the cooperative `stop()` /
/// interrupt mechanism: it catches a chunk that never returns (e.g. an accidental
/// infinite loop or unbounded blocking call) so it can still be reported.
#[derive(Clone)]
pub struct Progress(Arc<AtomicBool>);

impl Default for Progress {
    fn default() -> Progress {
        Progress(Arc::new(AtomicBool::new(false)))
    }
}

impl Progress {
    pub fn record_progress(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn has_changed(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// A generation-counter kill switch shared by every actor in a group (e.g. an
/// operator's driver plus its `maxForks - 1` worker clones), so that stopping the
/// group stops all of them at their next safe point.
#[derive(Clone, Debug)]
pub struct KillSwitch {
    step_id: usize,
    lowest_step_alive: Arc<AtomicUsize>,
}

impl Default for KillSwitch {
    fn default() -> Self {
        KillSwitch {
            step_id: 0,
            lowest_step_alive: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl KillSwitch {
    pub fn kill(&self) {
        self.lowest_step_alive
            .fetch_max(self.step_id + 1, Ordering::AcqRel);
    }

    pub fn is_alive(&self) -> bool {
        let lowest_step_alive = self.lowest_step_alive.load(Ordering::Relaxed);
        lowest_step_alive <= self.step_id
    }

    /// Derives a child kill switch sharing the same underlying generation counter,
    /// used to fan a group-wide `kill()` out to actors started after it.
    pub fn add_step(&self) -> KillSwitch {
        KillSwitch {
            step_id: self.step_id + 1,
            lowest_step_alive: self.lowest_step_alive.clone(),
        }
    }
}
