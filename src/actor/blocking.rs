//! The blocking-style actor: specified by the base design only as an alternative
//! implementation of the same public contract (`send`, `reply`, `receive(timeout)`,
//! `sendAndWait`) as the reactive actor, occupying one worker for its whole lifetime.
//! Grounded directly on the teacher's `SyncActor`/`sync_actor_loop`.

use std::fmt;
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use crate::pool::Pool;

use super::mailbox::{channel, ActorMessage};
use super::{ActorHandle, ActorTermination, KillSwitch, Mailbox, Progress, CURRENT_SENDER};

/// What `process_message` decides for the next iteration of the blocking loop.
pub enum BlockingOutcome {
    Continue,
    Stop,
}

pub struct BlockingContext<A: BlockingActor + ?Sized> {
    mailbox: Mailbox<A::Message>,
    inbox: flume::Receiver<ActorMessage<A::Message>>,
    current_sender: Option<super::AnyRecipient>,
    replies_enabled: bool,
}

impl<A: BlockingActor> BlockingContext<A> {
    pub fn mailbox(&self) -> &Mailbox<A::Message> {
        &self.mailbox
    }

    pub fn enable_sending_replies(&mut self) {
        self.replies_enabled = true;
    }

    pub fn disable_sending_replies(&mut self) {
        self.replies_enabled = false;
    }

    /// Blocks the current (already dedicated) worker for up to `timeout`, pulling
    /// the next message directly out of the mailbox. Only messages, never
    /// observation requests, are returned; `Observe` requests received meanwhile are
    /// answered transparently with a stale (pre-call) state snapshot.
    pub fn receive(&self, timeout: Option<Duration>) -> Option<A::Message> {
        loop {
            let next = match timeout {
                Some(duration) => self.inbox.recv_timeout(duration).ok(),
                None => self.inbox.recv().ok(),
            };
            match next {
                Some(ActorMessage::Envelope(envelope)) => return Some(envelope.payload),
                Some(ActorMessage::Observe(tx)) => {
                    let _ = tx.send(());
                }
                None => return None,
            }
        }
    }

    pub fn reply<R: Send + 'static>(&self, reply: R) -> Result<(), super::ActorError> {
        if !self.replies_enabled {
            return Err(super::ActorError::RepliesDisabled);
        }
        match &self.current_sender {
            None => Err(super::ActorError::NoCurrentSender),
            Some(recipient) => recipient
                .deliver_any(Box::new(reply))
                .map_err(|err| match err {
                    super::SendError::Closed => super::ActorError::Delivery,
                    super::SendError::TypeMismatch => super::ActorError::ReplyTypeMismatch,
                }),
        }
    }

    pub fn reply_if_exists<R: Send + 'static>(&self, reply: R) {
        let _ = self.reply(reply);
    }
}

/// An actor that occupies one dedicated worker for its entire lifetime, blocking on
/// its mailbox between messages rather than suspending a pooled continuation.
pub trait BlockingActor: Send + 'static {
    type Message: Send + Sync + fmt::Debug + 'static;
    type ObservableState: Clone + Send + Sync + fmt::Debug + 'static;

    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    fn observable_state(&self) -> Self::ObservableState;

    fn process_message(
        &mut self,
        message: Self::Message,
        ctx: &mut BlockingContext<Self>,
    ) -> anyhow::Result<BlockingOutcome>
    where
        Self: Sized;

    /// Called once the mailbox is disconnected (every handle dropped, nothing left
    /// to process), before the worker is released.
    fn finalize(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_delivery_error(&self, _message: &Self::Message) {}

    #[doc(hidden)]
    fn spawn(
        mut self,
        pool: Pool,
        mailbox_capacity: Option<usize>,
        kill_switch: KillSwitch,
    ) -> (Mailbox<Self::Message>, ActorHandle<Self::Message, Self::ObservableState>)
    where
        Self: Sized,
    {
        let actor_name = self.name();
        let (sender, inbox) = channel::<Self::Message>(mailbox_capacity);
        let mailbox = Mailbox::new(sender, actor_name);
        let (state_tx, state_rx) = watch::channel(self.observable_state());
        let progress = Progress::default();
        let progress_clone = progress.clone();
        let kill_switch_clone = kill_switch.clone();
        let ctx_mailbox = mailbox.clone();

        let join_handle = pool.execute_blocking(move || {
            let actor_name = self.name();
            let mut ctx = BlockingContext::<Self> {
                mailbox: ctx_mailbox,
                inbox: inbox.clone(),
                current_sender: None,
                replies_enabled: true,
            };
            let termination =
                run_blocking_actor(&mut self, &inbox, &state_tx, kill_switch, progress, &mut ctx);
            debug!(actor = %actor_name, "actor stopped");
            let _ = state_tx.send(self.observable_state());
            termination
        });

        let actor_handle = ActorHandle::new(mailbox.clone(), state_rx, join_handle, progress_clone, kill_switch_clone);
        (mailbox, actor_handle)
    }
}

fn run_blocking_actor<A: BlockingActor>(
    actor: &mut A,
    inbox: &flume::Receiver<ActorMessage<A::Message>>,
    state_tx: &watch::Sender<A::ObservableState>,
    kill_switch: KillSwitch,
    progress: Progress,
    ctx: &mut BlockingContext<A>,
) -> ActorTermination {
    let heartbeat = crate::runtime::config().heartbeat;
    loop {
        if !kill_switch.is_alive() {
            return ActorTermination::KillSwitch;
        }
        progress.record_progress();
        let received = inbox.recv_timeout(heartbeat.mul_f32(0.2));
        progress.record_progress();
        if !kill_switch.is_alive() {
            return ActorTermination::KillSwitch;
        }
        match received {
            Ok(ActorMessage::Envelope(envelope)) => {
                ctx.current_sender = envelope.sender;
                let self_recipient = Some(ctx.mailbox.as_any_recipient());
                let outcome = CURRENT_SENDER
                    .sync_scope(self_recipient, || actor.process_message(envelope.payload, ctx));
                ctx.current_sender = None;
                match outcome {
                    Ok(BlockingOutcome::Continue) => {}
                    Ok(BlockingOutcome::Stop) => return ActorTermination::OnDemand,
                    Err(error) => return ActorTermination::ActorError(error),
                }
            }
            Ok(ActorMessage::Observe(tx)) => {
                let _ = state_tx.send(actor.observable_state());
                let _ = tx.send(());
            }
            Err(flume::RecvTimeoutError::Disconnected) => {
                let drained: Vec<A::Message> = inbox
                    .drain()
                    .filter_map(|msg| match msg {
                        ActorMessage::Envelope(envelope) => Some(envelope.payload),
                        ActorMessage::Observe(_) => None,
                    })
                    .collect();
                for message in &drained {
                    actor.on_delivery_error(message);
                }
                if let Err(error) = actor.finalize() {
                    return ActorTermination::ActorError(error);
                }
                return ActorTermination::Disconnect;
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
        }
    }
}
