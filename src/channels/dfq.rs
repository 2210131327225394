//! Dataflow queue (DFQ): a channel that matches producers and consumers, FIFO per
//! direction. At most one of its two internal queues is non-empty at any time.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::dfv::Dfv;
use super::ChannelError;

struct State<V> {
    /// Bound (or eventually-to-be-bound, for `left_shift_from`) values ready to be
    /// read, in submission order.
    values: VecDeque<Arc<Dfv<V>>>,
    /// Unbound slots owed to readers who arrived before a producer, in arrival order.
    requests: VecDeque<Arc<Dfv<V>>>,
}

/// A multi-producer/single-consumer-per-read dataflow queue. `left_shift` and
/// `get_val` are the producer/consumer halves of the same matching operation: whichever
/// arrives second always matches the other side immediately.
pub struct Dfq<V> {
    state: Mutex<State<V>>,
    /// Listeners registered via `whenever_bound`/`when_bound`, fired on every
    /// `left_shift`. A separate lock from `state` so a listener never runs while the
    /// values/requests invariant lock is held.
    listeners: Mutex<Vec<Box<dyn FnMut(V) + Send>>>,
}

impl<V> fmt::Debug for Dfq<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock().unwrap();
        write!(
            f,
            "Dfq(values={}, requests={})",
            state.values.len(),
            state.requests.len()
        )
    }
}

impl<V> Default for Dfq<V> {
    fn default() -> Self {
        Dfq {
            state: Mutex::new(State {
                values: VecDeque::new(),
                requests: VecDeque::new(),
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Dfq<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a bound value. Matches the oldest pending reader if one is waiting,
    /// otherwise appends to `values`.
    pub fn left_shift(&self, value: V) {
        let pending = {
            let mut state = self.state.lock().unwrap();
            debug_assert!(state.values.is_empty() || state.requests.is_empty());
            state.requests.pop_front()
        };
        match pending {
            Some(request) => {
                // A timed-out reader may have already been removed from `requests` by
                // the time we observe it here; binding a vacated slot is a harmless no-op.
                let _ = request.bind(value.clone());
            }
            None => {
                let mut state = self.state.lock().unwrap();
                state.values.push_back(Arc::new(Dfv::ready(value.clone())));
            }
        }
        self.notify_listeners(value);
    }

    /// Reserves this queue's next slot for `source`'s eventual value, preserving this
    /// call's position relative to concurrent `left_shift`/`left_shift_from` calls even
    /// though the value itself is not known yet.
    pub fn left_shift_from(self: &Arc<Self>, source: Arc<Dfv<V>>) {
        let placeholder = Arc::new(Dfv::new());
        {
            let mut state = self.state.lock().unwrap();
            state.values.push_back(placeholder.clone());
        }
        let sink = placeholder;
        let this = self.clone();
        tokio::spawn(async move {
            let value = source.get_val().await;
            if sink.bind(value.clone()).is_ok() {
                this.notify_listeners(value);
            }
        });
    }

    /// Runs every registered listener with a clone of `value`, without holding the
    /// values/requests invariant lock.
    fn notify_listeners(&self, value: V) {
        let mut listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter_mut() {
            listener(value.clone());
        }
    }

    /// Registers `callback` to run, in binding order, on every value bound to this
    /// queue from now on.
    pub fn whenever_bound<F>(&self, callback: F)
    where
        F: FnMut(V) + Send + 'static,
    {
        self.listeners.lock().unwrap().push(Box::new(callback));
    }

    /// Registers `callback` to run exactly once, on the next value bound to this
    /// queue.
    pub fn when_bound<F>(&self, callback: F)
    where
        F: FnOnce(V) + Send + 'static,
    {
        let callback = Mutex::new(Some(callback));
        self.whenever_bound(move |value| {
            if let Some(callback) = callback.lock().unwrap().take() {
                callback(value);
            }
        });
    }

    /// Reserves the next read synchronously (registration order matters for the
    /// FIFO-per-position guarantee the operator runtime's gather phase relies on),
    /// returning a slot that may still need to be awaited.
    pub(crate) fn acquire_reader_slot(&self) -> (Arc<Dfv<V>>, bool) {
        let mut state = self.state.lock().unwrap();
        debug_assert!(state.values.is_empty() || state.requests.is_empty());
        match state.values.pop_front() {
            Some(slot) => (slot, false),
            None => {
                let slot = Arc::new(Dfv::new());
                state.requests.push_back(slot.clone());
                (slot, true)
            }
        }
    }

    fn remove_request(&self, slot: &Arc<Dfv<V>>) {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state.requests.iter().position(|r| Arc::ptr_eq(r, slot)) {
            state.requests.remove(pos);
        }
    }

    /// Takes the next value, waiting asynchronously if none is ready yet.
    pub async fn get_val(&self) -> V {
        let (slot, _was_request) = self.acquire_reader_slot();
        slot.get_val().await
    }

    /// Takes the next value, waiting asynchronously up to `timeout`. On timeout, the
    /// reservation is released so it never matches a later producer.
    pub async fn get_val_timeout(&self, timeout: Duration) -> Result<V, ChannelError> {
        let (slot, was_request) = self.acquire_reader_slot();
        let result = slot.get_val_timeout(timeout).await;
        if result.is_err() && was_request {
            self.remove_request(&slot);
        }
        result
    }

    /// Takes the next value, blocking the calling OS thread. For use from a dedicated
    /// worker, never from a pooled `react` chunk.
    pub fn get_val_blocking(&self) -> V {
        let (slot, _was_request) = self.acquire_reader_slot();
        slot.get_val_blocking()
    }

    pub fn get_val_blocking_timeout(&self, timeout: Duration) -> Result<V, ChannelError> {
        let (slot, was_request) = self.acquire_reader_slot();
        let result = slot.get_val_blocking_timeout(Some(timeout));
        if result.is_err() && was_request {
            self.remove_request(&slot);
        }
        result
    }

    /// Registers an attachment-bearing interest, delivered into `target` once a value
    /// is available (immediately, if one already is).
    pub fn get_val_async<A: Clone + Send + Sync + 'static>(self: &Arc<Self>, attachment: Option<A>, target: Arc<Dfq<(Option<A>, V)>>) {
        let (slot, _was_request) = self.acquire_reader_slot();
        tokio::spawn(async move {
            let value = slot.get_val().await;
            target.left_shift((attachment, value));
        });
    }

    /// Non-blocking: pops the head of `values` if it is already bound, otherwise
    /// returns nothing without disturbing a not-yet-resolved `left_shift_from` slot.
    pub fn poll(&self) -> Option<V> {
        let mut state = self.state.lock().unwrap();
        match state.values.front() {
            Some(slot) if slot.is_bound() => {
                let slot = state.values.pop_front().unwrap();
                drop(state);
                Some(
                    slot.try_get_now()
                        .expect("front was observed bound under the same lock"),
                )
            }
            _ => None,
        }
    }

    /// Snapshot of the number of bound-or-pending values currently queued.
    pub fn length(&self) -> usize {
        self.state.lock().unwrap().values.len()
    }

    /// A snapshot-based iterator: each `next()` blocks until its corresponding
    /// element is bound.
    pub fn iter(self: &Arc<Self>) -> DfqIter<V> {
        let snapshot = self.state.lock().unwrap().values.clone();
        DfqIter {
            remaining: snapshot,
        }
    }
}

pub struct DfqIter<V> {
    remaining: VecDeque<Arc<Dfv<V>>>,
}

impl<V: Clone + Send + Sync + 'static> Iterator for DfqIter<V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        let slot = self.remaining.pop_front()?;
        Some(slot.get_val_blocking())
    }
}
