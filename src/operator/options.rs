//! Construction-time configuration for an [`super::Operator`]: a typed builder
//! standing in for the base design's validated options bag, so unknown keys are a
//! compile error rather than a runtime one — the only residual runtime check is
//! `max_forks == 0`.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::channels::{Dfq, Dfs, Dfv};

use super::OperatorError;

/// One input position: a DFV (read once, then the same value forever), a DFQ
/// (consumed one value per read), or a DFS (each read advances this position's
/// shared cursor by one cell).
pub enum InputChannel<V> {
    Dfv(Arc<Dfv<V>>),
    Dfq(Arc<Dfq<V>>),
    Dfs(Mutex<Arc<Dfs<V>>>),
}

impl<V: Clone + Send + Sync + 'static> fmt::Debug for InputChannel<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputChannel::Dfv(v) => f.debug_tuple("Dfv").field(v).finish(),
            InputChannel::Dfq(q) => f.debug_tuple("Dfq").field(q).finish(),
            InputChannel::Dfs(s) => f.debug_tuple("Dfs").field(s).finish(),
        }
    }
}

impl<V> InputChannel<V> {
    pub fn dfv(source: Arc<Dfv<V>>) -> Self {
        InputChannel::Dfv(source)
    }

    pub fn dfq(source: Arc<Dfq<V>>) -> Self {
        InputChannel::Dfq(source)
    }

    pub fn dfs(source: Arc<Dfs<V>>) -> Self {
        InputChannel::Dfs(Mutex::new(source))
    }
}

pub struct OperatorOptions<V> {
    pub(crate) inputs: Vec<InputChannel<V>>,
    pub(crate) outputs: Vec<Arc<Dfq<V>>>,
    pub(crate) max_forks: usize,
}

impl<V: Clone + Send + Sync + 'static> fmt::Debug for OperatorOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorOptions")
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("max_forks", &self.max_forks)
            .finish()
    }
}

impl<V> OperatorOptions<V> {
    pub fn builder() -> OperatorOptionsBuilder<V> {
        OperatorOptionsBuilder {
            inputs: Vec::new(),
            outputs: Vec::new(),
            max_forks: 1,
        }
    }
}

pub struct OperatorOptionsBuilder<V> {
    inputs: Vec<InputChannel<V>>,
    outputs: Vec<Arc<Dfq<V>>>,
    max_forks: usize,
}

impl<V> OperatorOptionsBuilder<V> {
    pub fn input(mut self, input: InputChannel<V>) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: Arc<Dfq<V>>) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn max_forks(mut self, max_forks: usize) -> Self {
        self.max_forks = max_forks;
        self
    }

    pub fn build(self) -> Result<OperatorOptions<V>, OperatorError> {
        if self.inputs.is_empty() {
            return Err(OperatorError::Configuration(
                "operator requires at least one input".to_string(),
            ));
        }
        if self.max_forks == 0 {
            return Err(OperatorError::Configuration(
                "max_forks must be at least 1".to_string(),
            ));
        }
        Ok(OperatorOptions {
            inputs: self.inputs,
            outputs: self.outputs,
            max_forks: self.max_forks,
        })
    }
}
