//! The dataflow operator runtime (C3): a driver actor, replicated up to `max_forks`
//! times, gathering one value per input, applying a body, and emitting on outputs.

pub mod context;
pub mod driver;
pub mod options;

pub use context::OperatorContext;
pub use driver::{NextRound, OperatorBody};
pub use options::{InputChannel, OperatorOptions, OperatorOptionsBuilder};

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::actor::handle::ActorHandle;
use crate::actor::reactive::ReactiveActor;
use crate::actor::KillSwitch;
use crate::channels::Dfq;
use crate::pool::Pool;

use driver::OperatorWorker;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("{0}")]
    Configuration(String),
    #[error(transparent)]
    User(#[from] anyhow::Error),
}

/// A running operator: `max_forks` worker actors sharing one kill switch, one emit
/// lock, and the input/output handles named at construction. Terminal once stopped —
/// an `Operator` is never restarted.
pub struct Operator<V, B> {
    handles: Vec<ActorHandle<NextRound, u64>>,
    outputs: Vec<Arc<Dfq<V>>>,
    kill_switch: KillSwitch,
    _body: PhantomData<B>,
}

impl<V, B> fmt::Debug for Operator<V, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("handles", &self.handles)
            .field("outputs", &self.outputs)
            .field("kill_switch", &self.kill_switch)
            .finish()
    }
}

impl<V, B> Operator<V, B>
where
    V: Clone + Send + Sync + fmt::Debug + 'static,
    B: OperatorBody<V> + 'static,
{
    pub fn start(options: OperatorOptions<V>, body: B, pool: Pool) -> Result<Self, OperatorError> {
        if options.inputs.len() != body.arity() {
            return Err(OperatorError::Configuration(format!(
                "operator has {} input(s) but the body declares arity {}",
                options.inputs.len(),
                body.arity()
            )));
        }
        let inputs = Arc::new(options.inputs);
        let outputs = Arc::new(options.outputs);
        let emit_lock = Arc::new(Mutex::new(()));
        let body = Arc::new(body);
        let kill_switch = KillSwitch::default();

        let mut handles = Vec::with_capacity(options.max_forks);
        for _ in 0..options.max_forks {
            let worker = OperatorWorker {
                inputs: inputs.clone(),
                ctx: OperatorContext {
                    outputs: outputs.clone(),
                    emit_lock: emit_lock.clone(),
                },
                body: body.clone(),
                rounds_completed: 0,
            };
            let (_mailbox, handle) = worker.spawn(pool.clone(), None, kill_switch.clone());
            handles.push(handle);
        }

        Ok(Operator {
            handles,
            outputs: outputs.as_ref().clone(),
            kill_switch,
            _body: PhantomData,
        })
    }

    /// Requests every worker to stop at its next safe point. Does not guarantee that a
    /// round already in flight finishes consuming its gathered inputs.
    pub fn stop(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Waits for every worker to terminate.
    pub async fn join(self) {
        for handle in self.handles {
            let _ = handle.join().await;
        }
    }

    /// The operator's first declared output, the conventional single-output case.
    pub fn get_output(&self) -> Option<Arc<Dfq<V>>> {
        self.outputs.first().cloned()
    }

    pub fn outputs(&self) -> &[Arc<Dfq<V>>] {
        &self.outputs
    }

    pub fn is_running(&self) -> bool {
        self.kill_switch.is_alive()
    }
}
