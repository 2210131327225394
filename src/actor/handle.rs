use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::mailbox::{ActorMessage, Envelope};
use super::{ActorError, AnyRecipient, ErasedReplyRecipient, KillSwitch, Mailbox, Progress, SendError};

/// A single-use reply target for [`ActorHandle::send_and_wait`]: the "throwaway actor
/// with a single-count latch" of the base design, realized as one oneshot slot rather
/// than a whole spawned actor. Accepts either the expected reply type (success) or an
/// `anyhow::Error` (the reply "carries an error"), so a responder can signal failure
/// through the same `reply()` call a normal reply would use.
struct OnceReplySlot<R> {
    sender: Mutex<Option<oneshot::Sender<Result<R, anyhow::Error>>>>,
}

impl<R: Send + 'static> ErasedReplyRecipient for OnceReplySlot<R> {
    fn deliver_any(&self, reply: Box<dyn Any + Send>) -> Result<(), SendError> {
        let sender = self
            .sender
            .lock()
            .unwrap()
            .take()
            .ok_or(SendError::Closed)?;
        let reply = match reply.downcast::<R>() {
            Ok(value) => Ok(*value),
            Err(reply) => match reply.downcast::<anyhow::Error>() {
                Ok(error) => Err(*error),
                Err(_) => return Err(SendError::TypeMismatch),
            },
        };
        sender.send(reply).map_err(|_| SendError::Closed)
    }
}

/// Result of [`ActorHandle::observe`]: a snapshot of [`super::reactive::ReactiveActor::ObservableState`]
/// (or the blocking adapter's equivalent), tagged with whether the actor is still
/// running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<S> {
    Running(S),
    /// No observation arrived before the heartbeat elapsed; the actor may be wedged
    /// in a chunk that never calls back into the runtime.
    Timeout(S),
    Terminated(S),
}

/// The cause an actor's top-level task returned.
pub enum ActorTermination {
    /// The body called `stop()`, or fell through with no further continuation.
    OnDemand,
    /// `on_exception` (or the default handler) decided to terminate.
    ActorError(anyhow::Error),
    /// The group-wide kill switch fired.
    KillSwitch,
    /// Every mailbox clone was dropped and no more messages could ever arrive.
    Disconnect,
}

/// An address to communicate with a started actor: send messages through its
/// [`Mailbox`], observe its state, wait for it to terminate.
pub struct ActorHandle<M, S> {
    mailbox: Mailbox<M>,
    join_handle: JoinHandle<ActorTermination>,
    kill_switch: KillSwitch,
    last_state: watch::Receiver<S>,
    /// Set only for reactive actors: notifying it interrupts their in-flight chunk.
    /// The blocking adapter has no equivalent (see `BlockingActor`'s own `stop`).
    interrupt: Option<Arc<Notify>>,
}

impl<M: fmt::Debug, S> fmt::Debug for ActorHandle<M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorHandle({})", self.mailbox.actor_name())
    }
}

impl<M: Send + Sync + std::fmt::Debug + 'static, S: Clone + Send + Sync + fmt::Debug + 'static>
    ActorHandle<M, S>
{
    pub(crate) fn new(
        mailbox: Mailbox<M>,
        last_state: watch::Receiver<S>,
        join_handle: JoinHandle<ActorTermination>,
        progress: Progress,
        kill_switch: KillSwitch,
    ) -> Self {
        Self::new_with_interrupt(mailbox, last_state, join_handle, progress, kill_switch, None)
    }

    pub(crate) fn new_reactive(
        mailbox: Mailbox<M>,
        last_state: watch::Receiver<S>,
        join_handle: JoinHandle<ActorTermination>,
        progress: Progress,
        kill_switch: KillSwitch,
        interrupt: Arc<Notify>,
    ) -> Self {
        Self::new_with_interrupt(
            mailbox,
            last_state,
            join_handle,
            progress,
            kill_switch,
            Some(interrupt),
        )
    }

    fn new_with_interrupt(
        mailbox: Mailbox<M>,
        last_state: watch::Receiver<S>,
        join_handle: JoinHandle<ActorTermination>,
        progress: Progress,
        kill_switch: KillSwitch,
        interrupt: Option<Arc<Notify>>,
    ) -> Self {
        let heartbeat = crate::runtime::config().heartbeat;
        let watchdog_kill_switch = kill_switch.clone();
        tokio::task::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat);
            interval.tick().await;
            while watchdog_kill_switch.is_alive() {
                interval.tick().await;
                if !progress.has_changed() {
                    watchdog_kill_switch.kill();
                    return;
                }
                progress.reset();
            }
        });
        ActorHandle {
            mailbox,
            join_handle,
            kill_switch,
            last_state,
            interrupt,
        }
    }

    /// This actor's mailbox, for sending it messages.
    pub fn mailbox(&self) -> &Mailbox<M> {
        &self.mailbox
    }

    /// Stops the actor at its next safe point: marks the kill switch, lets the
    /// current chunk (if any) finish or be interrupted, then the lifecycle-unwind
    /// hooks run.
    pub fn stop(&self) {
        self.kill_switch.kill();
        if let Some(interrupt) = &self.interrupt {
            interrupt.notify_waiters();
        }
    }

    /// Blocks (asynchronously) until the actor's top-level task has returned.
    pub async fn join(self) -> ActorTermination {
        self.join_handle
            .await
            .unwrap_or_else(|join_error| ActorTermination::ActorError(join_error.into()))
    }

    /// Whether the actor's kill switch is still alive. Does not guarantee the actor's
    /// top-level task has not yet unwound after a kill — use [`Self::join`] to wait
    /// for that.
    pub fn is_active(&self) -> bool {
        self.kill_switch.is_alive()
    }

    /// Sends `message` and waits for the single reply sent back via `reply()`/
    /// `reply_if_exists()`, or `timeout`, whichever comes first. A reply that itself
    /// carries an `anyhow::Error` is rethrown as `Err` rather than returned as `Ok`.
    ///
    /// Realized as a throwaway single-count latch (one oneshot slot set as the
    /// envelope's sender) rather than a whole second actor.
    pub async fn send_and_wait<R: Send + 'static>(
        &self,
        message: M,
        timeout_duration: Duration,
    ) -> Result<R, ActorError> {
        let (tx, rx) = oneshot::channel();
        let recipient: AnyRecipient = Arc::new(OnceReplySlot {
            sender: Mutex::new(Some(tx)),
        });
        let envelope = ActorMessage::Envelope(Envelope {
            sender: Some(recipient),
            payload: message,
        });
        self.mailbox
            .send_actor_message(envelope)
            .await
            .map_err(|_| ActorError::Delivery)?;
        match timeout(timeout_duration, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) => Err(ActorError::User(error)),
            Ok(Err(_)) => Err(ActorError::Delivery),
            Err(_) => Err(ActorError::Timeout),
        }
    }

    /// Returns a snapshot of the observable state of the actor.
    ///
    /// Goes through the mailbox like a regular message, so it also waits for
    /// messages queued ahead of it to be processed first; it may therefore time out
    /// against the process-wide heartbeat.
    pub async fn observe(&self) -> Observation<S> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .mailbox
            .send_actor_message(ActorMessage::Observe(tx))
            .await;
        let observed = timeout(crate::runtime::config().heartbeat, rx).await;
        let state = self.last_state.borrow().clone();
        match observed {
            Ok(Ok(())) => Observation::Running(state),
            Ok(Err(_)) => Observation::Terminated(state),
            Err(_) => {
                if self.kill_switch.is_alive() {
                    Observation::Timeout(state)
                } else {
                    Observation::Terminated(state)
                }
            }
        }
    }
}
