//! The operator's driver algorithm: gather one value per input position, apply the
//! body, emit, re-arm. One [`OperatorWorker`] is spawned per fork, each an independent
//! [`ReactiveActor`] sharing the same input/output handles.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::actor::reactive::{ReactContext, ReactOutcome, ReactiveActor};

use super::context::OperatorContext;
use super::options::InputChannel;

impl<V: Clone + Send + Sync + 'static> InputChannel<V> {
    /// Synchronously reserves this round's read (registration order is what gives the
    /// operator's gather phase its FIFO-per-position guarantee), returning a future
    /// that resolves once the value is available.
    pub(crate) fn reserve(&self) -> Pin<Box<dyn Future<Output = V> + Send>> {
        match self {
            InputChannel::Dfv(dfv) => {
                let dfv = dfv.clone();
                Box::pin(async move { dfv.get_val().await })
            }
            InputChannel::Dfq(dfq) => {
                let (slot, _was_request) = dfq.acquire_reader_slot();
                Box::pin(async move { slot.get_val().await })
            }
            InputChannel::Dfs(cursor) => {
                let cell = {
                    let mut guard = cursor.lock().unwrap();
                    let current = guard.clone();
                    *guard = current.rest();
                    current
                };
                Box::pin(async move {
                    match cell.get_first().await {
                        Some(value) => value,
                        // End of stream: this position will never produce another
                        // value, so this round never completes on it.
                        None => futures::future::pending().await,
                    }
                })
            }
        }
    }
}

/// Wakes one operator worker to run its next gather/apply round.
#[derive(Debug, Clone, Copy)]
pub struct NextRound;

/// The user-supplied per-round computation, given the gathered positional inputs and
/// a handle to emit on the operator's outputs.
#[async_trait]
pub trait OperatorBody<V: Send + Sync + 'static>: Send + Sync {
    async fn apply(&self, inputs: Vec<V>, ctx: &OperatorContext<V>) -> anyhow::Result<()>;

    /// Number of positional inputs this body expects, checked against
    /// `OperatorOptions::inputs.len()` when the operator starts.
    fn arity(&self) -> usize;
}

pub(crate) struct OperatorWorker<V, B> {
    pub(crate) inputs: Arc<Vec<InputChannel<V>>>,
    pub(crate) ctx: OperatorContext<V>,
    pub(crate) body: Arc<B>,
    pub(crate) rounds_completed: u64,
}

#[async_trait]
impl<V, B> ReactiveActor for OperatorWorker<V, B>
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
    B: OperatorBody<V> + 'static,
{
    type Message = NextRound;
    type ObservableState = u64;

    fn observable_state(&self) -> u64 {
        self.rounds_completed
    }

    async fn after_start(&mut self, ctx: &mut ReactContext<Self>) -> ReactOutcome {
        let _ = ctx.mailbox().send_anonymous(NextRound).await;
        ReactOutcome::Continue
    }

    async fn react(
        &mut self,
        _message: NextRound,
        ctx: &mut ReactContext<Self>,
    ) -> anyhow::Result<ReactOutcome> {
        let reservations: Vec<_> = self.inputs.iter().map(|input| input.reserve()).collect();
        let values = futures::future::join_all(reservations).await;
        self.body.apply(values, &self.ctx).await?;
        self.rounds_completed += 1;
        let _ = ctx.mailbox().send_anonymous(NextRound).await;
        Ok(ReactOutcome::Continue)
    }

    async fn on_exception(
        &mut self,
        error: anyhow::Error,
        ctx: &mut ReactContext<Self>,
    ) -> ReactOutcome {
        error!(error = %error, "operator body failed, continuing to the next round");
        let _ = ctx.mailbox().send_anonymous(NextRound).await;
        ReactOutcome::Continue
    }
}
