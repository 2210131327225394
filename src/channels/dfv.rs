//! Single-assignment variable (DFV): a write-once slot with blocking and async get.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use super::dfq::Dfq;
use super::ChannelError;

struct BlockingSlot<V> {
    value: Mutex<Option<V>>,
    condvar: Condvar,
}

enum Waiter<V> {
    Async(u64, oneshot::Sender<V>),
    Blocking(Arc<BlockingSlot<V>>),
}

enum DfvState<V> {
    Unbound { waiters: Vec<Waiter<V>>, next_id: u64 },
    Bound(V),
}

/// A write-once slot: [`Dfv::bind`] succeeds exactly once; every waiter registered
/// before or after that point observes the same value, in registration order.
pub struct Dfv<V> {
    state: Mutex<DfvState<V>>,
}

impl<V> fmt::Debug for Dfv<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bound = matches!(&*self.state.lock().unwrap(), DfvState::Bound(_));
        write!(f, "Dfv(bound={})", bound)
    }
}

impl<V> Default for Dfv<V> {
    fn default() -> Self {
        Dfv {
            state: Mutex::new(DfvState::Unbound {
                waiters: Vec::new(),
                next_id: 0,
            }),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Dfv<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// An already-bound slot, for constants threaded through a body as if they had
    /// arrived through the channel machinery.
    pub fn ready(value: V) -> Self {
        Dfv {
            state: Mutex::new(DfvState::Bound(value)),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(&*self.state.lock().unwrap(), DfvState::Bound(_))
    }

    /// Binds this slot. Fails with [`ChannelError::AlreadyBound`] if a value is
    /// already present.
    pub fn bind(&self, value: V) -> Result<(), ChannelError> {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            if matches!(&*state, DfvState::Bound(_)) {
                return Err(ChannelError::AlreadyBound);
            }
            match std::mem::replace(&mut *state, DfvState::Bound(value.clone())) {
                DfvState::Unbound { waiters, .. } => waiters,
                DfvState::Bound(_) => unreachable!(),
            }
        };
        notify_all(waiters, &value);
        Ok(())
    }

    /// Succeeds if unbound, or if already bound to a value equal to `value`.
    pub fn bind_unique(&self, value: V) -> Result<(), ChannelError>
    where
        V: PartialEq,
    {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            match &*state {
                DfvState::Bound(existing) => {
                    return if *existing == value {
                        Ok(())
                    } else {
                        Err(ChannelError::UniqueBindMismatch)
                    };
                }
                DfvState::Unbound { .. } => {}
            }
            match std::mem::replace(&mut *state, DfvState::Bound(value.clone())) {
                DfvState::Unbound { waiters, .. } => waiters,
                DfvState::Bound(_) => unreachable!(),
            }
        };
        notify_all(waiters, &value);
        Ok(())
    }

    /// Waits asynchronously until bound, with no deadline.
    pub async fn get_val(&self) -> V {
        if let Some(value) = self.try_get() {
            return value;
        }
        let (tx, rx) = oneshot::channel();
        let registered = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                DfvState::Bound(value) => Some(value.clone()),
                DfvState::Unbound { waiters, next_id } => {
                    let id = *next_id;
                    *next_id += 1;
                    waiters.push(Waiter::Async(id, tx));
                    None
                }
            }
        };
        match registered {
            Some(value) => value,
            None => rx.await.expect("bind always fires registered waiters before dropping them"),
        }
    }

    /// Waits asynchronously until bound or `timeout` elapses, whichever comes first.
    /// On timeout, the registered waiter is removed so it never fires late.
    pub async fn get_val_timeout(&self, timeout: Duration) -> Result<V, ChannelError> {
        if let Some(value) = self.try_get() {
            return Ok(value);
        }
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                DfvState::Bound(value) => return Ok(value.clone()),
                DfvState::Unbound { waiters, next_id } => {
                    let id = *next_id;
                    *next_id += 1;
                    waiters.push(Waiter::Async(id, tx));
                    id
                }
            }
        };
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(ChannelError::Closed),
            Err(_) => {
                let mut state = self.state.lock().unwrap();
                if let DfvState::Unbound { waiters, .. } = &mut *state {
                    waiters.retain(|waiter| !matches!(waiter, Waiter::Async(waiter_id, _) if *waiter_id == id));
                }
                drop(state);
                match self.try_get() {
                    Some(value) => Ok(value),
                    None => Err(ChannelError::Timeout),
                }
            }
        }
    }

    /// Blocks the calling OS thread until bound, with no deadline. For use from a
    /// dedicated worker (the blocking-style actor), never from a pooled `react` chunk.
    pub fn get_val_blocking(&self) -> V {
        self.get_val_blocking_timeout(None).expect("no deadline was given")
    }

    /// Blocks the calling OS thread until bound or `timeout` elapses.
    pub fn get_val_blocking_timeout(&self, timeout: Option<Duration>) -> Result<V, ChannelError> {
        if let Some(value) = self.try_get() {
            return Ok(value);
        }
        let slot = Arc::new(BlockingSlot {
            value: Mutex::new(None),
            condvar: Condvar::new(),
        });
        {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                DfvState::Bound(value) => return Ok(value.clone()),
                DfvState::Unbound { waiters, .. } => {
                    waiters.push(Waiter::Blocking(slot.clone()));
                }
            }
        }
        let guard = slot.value.lock().unwrap();
        let result = match timeout {
            None => {
                let guard = slot
                    .condvar
                    .wait_while(guard, |value| value.is_none())
                    .unwrap();
                guard.clone()
            }
            Some(duration) => {
                let (guard, _) = slot
                    .condvar
                    .wait_timeout_while(guard, duration, |value| value.is_none())
                    .unwrap();
                guard.clone()
            }
        };
        match result {
            Some(value) => Ok(value),
            None => Err(ChannelError::Timeout),
        }
    }

    /// Schedules `f` to run once this slot is bound: immediately (on a fresh task) if
    /// already bound, or on a fresh task at bind time otherwise. Never runs `f`
    /// reentrantly on the caller's or binder's own stack.
    pub fn when_bound<F>(self: &Arc<Self>, f: F)
    where
        F: FnOnce(V) + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let value = this.get_val().await;
            f(value);
        });
    }

    /// Registers interest with an attachment: once bound, pushes `(attachment,
    /// value)` into `target`.
    pub fn get_val_async<A: Clone + Send + Sync + 'static>(self: &Arc<Self>, attachment: Option<A>, target: Arc<Dfq<(Option<A>, V)>>) {
        let this = self.clone();
        tokio::spawn(async move {
            let value = this.get_val().await;
            target.left_shift((attachment, value));
        });
    }

    fn try_get(&self) -> Option<V> {
        match &*self.state.lock().unwrap() {
            DfvState::Bound(value) => Some(value.clone()),
            DfvState::Unbound { .. } => None,
        }
    }

    /// Non-blocking read, for callers (e.g. [`super::dfq::Dfq::poll`]) that already
    /// know the slot is bound and just want the value out.
    pub(crate) fn try_get_now(&self) -> Option<V> {
        self.try_get()
    }
}

fn notify_all<V: Clone>(waiters: Vec<Waiter<V>>, value: &V) {
    for waiter in waiters {
        match waiter {
            Waiter::Async(_, tx) => {
                let _ = tx.send(value.clone());
            }
            Waiter::Blocking(slot) => {
                let mut guard = slot.value.lock().unwrap();
                *guard = Some(value.clone());
                drop(guard);
                slot.condvar.notify_all();
            }
        }
    }
}
