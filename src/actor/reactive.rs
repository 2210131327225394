//! The continuation-style pooled actor (C1): `react` suspends without occupying a
//! worker between messages. Grounded on the teacher's `async_actor_loop`, generalized
//! from "one long-lived task re-polling a channel" to a loop whose each turn (a
//! "chunk") is cooperatively cancellable and may carry a `react`-scoped timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};

use crate::pool::Pool;

use super::mailbox::{channel, ActorMessage};
use super::{ActorError, ActorHandle, ActorTermination, KillSwitch, Mailbox, Progress, CURRENT_SENDER};

/// What a chunk decides once it has processed its signal.
#[derive(Debug)]
pub enum ReactOutcome {
    /// Suspend again, waiting for the next message with no deadline.
    Continue,
    /// Suspend again, waiting for the next message or this deadline, whichever is
    /// first.
    ContinueWithTimeout(Duration),
    /// Terminate. A `react` body that "falls through" with nothing left to do is
    /// expressed the same way: Rust requires an explicit return, so there is no
    /// separate "fell through" signal to model here.
    Stop,
}

/// State threaded through one actor's chunks: its own mailbox, and whichever sender
/// is attached to the message currently being processed.
pub struct ReactContext<A: ReactiveActor + ?Sized> {
    mailbox: Mailbox<A::Message>,
    current_sender: Option<super::AnyRecipient>,
    replies_enabled: bool,
}

impl<A: ReactiveActor> ReactContext<A> {
    fn new(mailbox: Mailbox<A::Message>) -> Self {
        ReactContext {
            mailbox,
            current_sender: None,
            replies_enabled: true,
        }
    }

    pub fn mailbox(&self) -> &Mailbox<A::Message> {
        &self.mailbox
    }

    pub fn enable_sending_replies(&mut self) {
        self.replies_enabled = true;
    }

    pub fn disable_sending_replies(&mut self) {
        self.replies_enabled = false;
    }

    fn set_current_sender(&mut self, sender: Option<super::AnyRecipient>) {
        self.current_sender = sender;
    }

    /// Replies to the sender of the message currently being processed.
    ///
    /// `R` need not be this actor's own `Message` type: it only has to be the type
    /// the *sender* expects back. If it isn't, delivery fails with
    /// `ActorError::ReplyTypeMismatch` rather than silently dropping the reply.
    pub fn reply<R: Send + 'static>(&self, reply: R) -> Result<(), ActorError> {
        if !self.replies_enabled {
            return Err(ActorError::RepliesDisabled);
        }
        match &self.current_sender {
            None => Err(ActorError::NoCurrentSender),
            Some(recipient) => recipient.deliver_any(Box::new(reply)).map_err(|err| match err {
                super::SendError::Closed => ActorError::Delivery,
                super::SendError::TypeMismatch => ActorError::ReplyTypeMismatch,
            }),
        }
    }

    /// Same as [`Self::reply`] but swallows the error, for hooks that want a
    /// best-effort reply without failing the chunk over it.
    pub fn reply_if_exists<R: Send + 'static>(&self, reply: R) {
        let _ = self.reply(reply);
    }
}

/// An actor whose body is driven one message at a time by the runtime, releasing its
/// worker between chunks.
#[async_trait]
pub trait ReactiveActor: Send + 'static {
    /// Type of message that can be received by the actor.
    type Message: Send + Sync + fmt::Debug + 'static;
    /// Piece of state that can be copied for assert in unit test, admin, etc.
    type ObservableState: Clone + Send + Sync + fmt::Debug + 'static;

    /// A name identifying the type of actor. Does not need to be instance-unique.
    fn name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    fn observable_state(&self) -> Self::ObservableState;

    /// Runs once, before the first chunk is scheduled. Its outcome seeds the initial
    /// wait the same way a chunk's own outcome would, so an actor can arm a
    /// `react(timeout)` (or stop outright) before ever receiving a message.
    async fn after_start(&mut self, _ctx: &mut ReactContext<Self>) -> ReactOutcome
    where
        Self: Sized,
    {
        ReactOutcome::Continue
    }

    /// Handles one message. This is a chunk: the runtime releases the worker the
    /// instant this future suspends at an internal `.await`, and between chunks no
    /// worker is held at all.
    async fn react(
        &mut self,
        message: Self::Message,
        ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome>
    where
        Self: Sized;

    /// Runs if a `react` deadline elapses before the next message arrives.
    async fn on_timeout(&mut self, _ctx: &mut ReactContext<Self>) -> anyhow::Result<ReactOutcome>
    where
        Self: Sized,
    {
        Ok(ReactOutcome::Continue)
    }

    /// Runs if `react`/`on_timeout` returned an error. The default terminates the
    /// actor; overrides may inspect the error and return `Continue` to keep going.
    async fn on_exception(
        &mut self,
        _error: anyhow::Error,
        _ctx: &mut ReactContext<Self>,
    ) -> ReactOutcome
    where
        Self: Sized,
    {
        ReactOutcome::Stop
    }

    /// Runs if a chunk was interrupted by `stop()` while executing. The actor
    /// terminates unconditionally afterwards.
    async fn on_interrupt(&mut self, _ctx: &mut ReactContext<Self>)
    where
        Self: Sized,
    {
    }

    async fn before_stop(&mut self, _ctx: &mut ReactContext<Self>)
    where
        Self: Sized,
    {
    }

    /// Runs once the actor is fully stopped, with whatever was left in the mailbox.
    async fn after_stop(&mut self, _drained: Vec<Self::Message>, _ctx: &mut ReactContext<Self>)
    where
        Self: Sized,
    {
    }

    /// Called during drain for every payload that could not be, and now never will
    /// be, processed.
    fn on_delivery_error(&self, _message: &Self::Message) {}

    #[doc(hidden)]
    fn spawn(
        self,
        pool: Pool,
        mailbox_capacity: Option<usize>,
        kill_switch: KillSwitch,
    ) -> (Mailbox<Self::Message>, ActorHandle<Self::Message, Self::ObservableState>)
    where
        Self: Sized,
    {
        let (sender, inbox) = channel::<Self::Message>(mailbox_capacity);
        let actor_name = self.name();
        let mailbox = Mailbox::new(sender, actor_name);
        let (state_tx, state_rx) = watch::channel(self.observable_state());
        let progress = Progress::default();
        let cancel = Arc::new(Notify::new());

        let join_handle = pool.execute(run_reactive_actor(
            self,
            inbox,
            mailbox.clone(),
            state_tx,
            kill_switch.clone(),
            progress.clone(),
            cancel.clone(),
        ));

        let handle = ActorHandle::new_reactive(
            mailbox.clone(),
            state_rx,
            join_handle,
            progress,
            kill_switch,
            cancel,
        );
        (mailbox, handle)
    }
}

enum WaitResult<M> {
    Message(ActorMessage<M>),
    TimedOut,
    Disconnected,
}

async fn wait_for_next<M>(
    inbox: &flume::Receiver<ActorMessage<M>>,
    deadline: Option<Duration>,
) -> WaitResult<M> {
    match deadline {
        None => match inbox.recv_async().await {
            Ok(msg) => WaitResult::Message(msg),
            Err(_) => WaitResult::Disconnected,
        },
        Some(duration) => match tokio::time::timeout(duration, inbox.recv_async()).await {
            Ok(Ok(msg)) => WaitResult::Message(msg),
            Ok(Err(_)) => WaitResult::Disconnected,
            Err(_) => WaitResult::TimedOut,
        },
    }
}

enum Cancellable<T> {
    Completed(T),
    Interrupted,
}

/// Races a chunk's future against the cancel notification. A `stop()` landing while a
/// chunk is in flight drops that chunk's future immediately: the Rust-native
/// equivalent of interrupting the worker thread it would have occupied in a
/// thread-per-chunk runtime.
async fn run_cancellable<F, T>(cancel: &Notify, fut: F) -> Cancellable<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.notified() => Cancellable::Interrupted,
        out = fut => Cancellable::Completed(out),
    }
}

fn apply_outcome(
    outcome: anyhow::Result<ReactOutcome>,
    pending_timeout: &mut Option<Duration>,
) -> Option<ActorTermination> {
    match outcome {
        Ok(ReactOutcome::Continue) => {
            *pending_timeout = None;
            None
        }
        Ok(ReactOutcome::ContinueWithTimeout(duration)) => {
            *pending_timeout = Some(duration);
            None
        }
        Ok(ReactOutcome::Stop) => Some(ActorTermination::OnDemand),
        Err(_) => None, // handled by the caller via on_exception before this is reached
    }
}

async fn run_reactive_actor<A: ReactiveActor>(
    mut actor: A,
    inbox: flume::Receiver<ActorMessage<A::Message>>,
    mailbox: Mailbox<A::Message>,
    state_tx: watch::Sender<A::ObservableState>,
    kill_switch: KillSwitch,
    progress: Progress,
    cancel: Arc<Notify>,
) -> ActorTermination {
    let mut ctx = ReactContext::<A>::new(mailbox.clone());
    let after_start_outcome = actor.after_start(&mut ctx).await;

    let mut pending_timeout: Option<Duration> = None;
    let mut pending_termination = apply_outcome(Ok(after_start_outcome), &mut pending_timeout);

    let termination = 'outer: loop {
        if let Some(termination) = pending_termination.take() {
            break 'outer termination;
        }
        if !kill_switch.is_alive() {
            break ActorTermination::KillSwitch;
        }
        progress.record_progress();
        let wait = wait_for_next(&inbox, pending_timeout.take()).await;
        progress.record_progress();
        if !kill_switch.is_alive() {
            break ActorTermination::KillSwitch;
        }

        match wait {
            WaitResult::Disconnected => break ActorTermination::Disconnect,
            WaitResult::Message(ActorMessage::Observe(tx)) => {
                let _ = state_tx.send(actor.observable_state());
                let _ = tx.send(());
            }
            WaitResult::TimedOut => {
                let self_recipient = Some(mailbox.as_any_recipient());
                match CURRENT_SENDER
                    .scope(self_recipient, run_cancellable(&cancel, actor.on_timeout(&mut ctx)))
                    .await
                {
                    Cancellable::Interrupted => {
                        actor.on_interrupt(&mut ctx).await;
                        break 'outer ActorTermination::KillSwitch;
                    }
                    Cancellable::Completed(Err(error)) => {
                        match actor.on_exception(error, &mut ctx).await {
                            ReactOutcome::Stop => break 'outer ActorTermination::OnDemand,
                            ReactOutcome::Continue => {}
                            ReactOutcome::ContinueWithTimeout(d) => pending_timeout = Some(d),
                        }
                    }
                    Cancellable::Completed(outcome) => {
                        if let Some(termination) = apply_outcome(outcome, &mut pending_timeout) {
                            break 'outer termination;
                        }
                    }
                }
            }
            WaitResult::Message(ActorMessage::Envelope(envelope)) => {
                ctx.set_current_sender(envelope.sender);
                let self_recipient = Some(mailbox.as_any_recipient());
                let outcome = CURRENT_SENDER
                    .scope(
                        self_recipient,
                        run_cancellable(&cancel, actor.react(envelope.payload, &mut ctx)),
                    )
                    .await;
                ctx.set_current_sender(None);
                match outcome {
                    Cancellable::Interrupted => {
                        actor.on_interrupt(&mut ctx).await;
                        break 'outer ActorTermination::KillSwitch;
                    }
                    Cancellable::Completed(Err(error)) => {
                        match actor.on_exception(error, &mut ctx).await {
                            ReactOutcome::Stop => break 'outer ActorTermination::OnDemand,
                            ReactOutcome::Continue => {}
                            ReactOutcome::ContinueWithTimeout(d) => pending_timeout = Some(d),
                        }
                    }
                    Cancellable::Completed(outcome) => {
                        if let Some(termination) = apply_outcome(outcome, &mut pending_timeout) {
                            break 'outer termination;
                        }
                    }
                }
            }
        }
    };

    actor.before_stop(&mut ctx).await;
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
    actor.after_stop(drained, &mut ctx).await;
    let _ = state_tx.send(actor.observable_state());
    kill_switch.kill();
    termination
}
