use flume::Receiver;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{AnyRecipient, MailboxRecipient, SendError, CURRENT_SENDER};

/// `{sender?, payload}`, captured at send time from the caller's task-local "current
/// actor" binding if any (see [`CURRENT_SENDER`]).
pub struct Envelope<M> {
    pub sender: Option<AnyRecipient>,
    pub payload: M,
}

pub(crate) enum ActorMessage<M> {
    Envelope(Envelope<M>),
    Observe(oneshot::Sender<()>),
}

impl<M: fmt::Debug> fmt::Debug for ActorMessage<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Envelope(envelope) => write!(f, "Envelope({:?})", envelope.payload),
            Self::Observe(_) => write!(f, "Observe"),
        }
    }
}

/// The FIFO of envelopes owned by one actor.
///
/// Lightweight to clone (a thin handle around a `flume::Sender`). If every clone of a
/// mailbox is dropped, the actor does not die right away: it processes whatever is
/// already queued before terminating.
pub struct Mailbox<M> {
    sender: flume::Sender<ActorMessage<M>>,
    id: Uuid,
    actor_name: String,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Mailbox {
            sender: self.sender.clone(),
            id: self.id,
            actor_name: self.actor_name.clone(),
        }
    }
}

impl<M> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mailbox({})", self.actor_name())
    }
}

impl<M> Hash for Mailbox<M> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl<M> PartialEq for Mailbox<M> {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq(&other.id)
    }
}

impl<M> Eq for Mailbox<M> {}

impl<M> Mailbox<M> {
    pub(crate) fn new(sender: flume::Sender<ActorMessage<M>>, actor_name: String) -> Self {
        Mailbox {
            sender,
            id: Uuid::new_v4(),
            actor_name,
        }
    }

    pub fn actor_name(&self) -> String {
        format!("{}:{}", self.actor_name, self.id)
    }

    pub(crate) async fn send_actor_message(&self, msg: ActorMessage<M>) -> Result<(), SendError> {
        self.sender
            .send_async(msg)
            .await
            .map_err(|_| SendError::Closed)
    }
}

impl<M: Send + Sync + std::fmt::Debug + 'static> Mailbox<M> {
    /// Sends a message, capturing the calling chunk's mailbox as the reply target if
    /// one is set (see [`CURRENT_SENDER`]).
    pub async fn send(&self, payload: M) -> Result<(), SendError> {
        let sender = CURRENT_SENDER
            .try_with(|sender| sender.clone())
            .unwrap_or(None);
        self.send_actor_message(ActorMessage::Envelope(Envelope { sender, payload }))
            .await
    }

    /// Sends a message without attempting to capture a sender, from outside any
    /// actor chunk.
    pub async fn send_anonymous(&self, payload: M) -> Result<(), SendError> {
        self.send_actor_message(ActorMessage::Envelope(Envelope {
            sender: None,
            payload,
        }))
        .await
    }

    /// Sends a message in a blocking fashion. Used by the blocking-style actor and by
    /// reply delivery, where there is no `.await` point available.
    pub fn send_blocking(&self, payload: M) -> Result<(), SendError> {
        self.sender
            .send(ActorMessage::Envelope(Envelope {
                sender: None,
                payload,
            }))
            .map_err(|_| SendError::Closed)
    }

    /// Narrows this mailbox to a type-erased reply target, for capture in
    /// [`CURRENT_SENDER`].
    pub(crate) fn as_any_recipient(&self) -> AnyRecipient {
        Arc::new(MailboxRecipient {
            mailbox: self.clone(),
        }) as AnyRecipient
    }
}

pub struct DebugInbox<M>(Receiver<ActorMessage<M>>);

impl<M> DebugInbox<M> {
    /// Drains whatever is left in the mailbox, discarding observation requests. Used
    /// by tests and by the drain-on-stop lifecycle step.
    pub fn drain(&self) -> Vec<M> {
        self.0
            .drain()
            .filter_map(|msg| match msg {
                ActorMessage::Envelope(envelope) => Some(envelope.payload),
                ActorMessage::Observe(_) => None,
            })
            .collect()
    }
}

/// A mailbox/inbox pair not attached to any running actor, for unit tests that only
/// want to inspect what was sent.
pub fn mock_mailbox<M>() -> (Mailbox<M>, DebugInbox<M>) {
    let (tx, rx) = flume::unbounded();
    let mailbox = Mailbox::new(tx, "mock_actor".to_string());
    let debug_inbox = DebugInbox(rx);
    (mailbox, debug_inbox)
}

pub(crate) fn channel<M>(
    capacity: Option<usize>,
) -> (flume::Sender<ActorMessage<M>>, flume::Receiver<ActorMessage<M>>) {
    match capacity {
        Some(capacity) => flume::bounded(capacity),
        None => flume::unbounded(),
    }
}
