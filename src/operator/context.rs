//! What the operator body sees: a handle to emit on the operator's outputs, plain or
//! atomically.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::channels::Dfq;

pub struct OperatorContext<V> {
    pub(crate) outputs: Arc<Vec<Arc<Dfq<V>>>>,
    pub(crate) emit_lock: Arc<Mutex<()>>,
}

impl<V> Clone for OperatorContext<V> {
    fn clone(&self) -> Self {
        OperatorContext {
            outputs: self.outputs.clone(),
            emit_lock: self.emit_lock.clone(),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> OperatorContext<V> {
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn bind_output(&self, index: usize, value: V) {
        if let Some(output) = self.outputs.get(index) {
            output.left_shift(value);
        }
    }

    pub fn bind_all_outputs(&self, value: V) {
        for output in self.outputs.iter() {
            output.left_shift(value.clone());
        }
    }

    pub fn bind_all_output_values(&self, values: Vec<V>) {
        for (output, value) in self.outputs.iter().zip(values) {
            output.left_shift(value);
        }
    }

    /// Binds `value` to every output under this operator's emit lock: if worker A's
    /// atomic emit begins before worker B's, A's values appear before B's on every
    /// shared output channel.
    pub async fn bind_all_outputs_atomically(&self, value: V) {
        let _guard = self.emit_lock.lock().await;
        self.bind_all_outputs(value);
    }

    pub async fn bind_all_output_values_atomically(&self, values: Vec<V>) {
        let _guard = self.emit_lock.lock().await;
        self.bind_all_output_values(values);
    }
}
