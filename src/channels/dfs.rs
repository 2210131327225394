//! Dataflow stream (DFS): a functional cons-list of DFVs. Many readers may each
//! traverse independently from the same head; binding is single-producer per cell.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;

use super::dfv::Dfv;
use super::ChannelError;

/// One cell of a lazily-extended cons-list. `first` is `None` exactly at, and only
/// at, the end of the stream.
pub struct Dfs<T> {
    first: Arc<Dfv<Option<T>>>,
    rest: OnceCell<Arc<Dfs<T>>>,
}

impl<T: Clone + Send + Sync + 'static> fmt::Debug for Dfs<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dfs(first_bound={})", self.first.is_bound())
    }
}

impl<T: Clone + Send + Sync + 'static> Dfs<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Dfs {
            first: Arc::new(Dfv::new()),
            rest: OnceCell::new(),
        })
    }

    /// Binds this cell's value and returns the cell after it, creating it if this is
    /// the first write to reach this position.
    pub fn left_shift(self: &Arc<Self>, value: T) -> Result<Arc<Dfs<T>>, ChannelError> {
        self.first.bind(Some(value))?;
        Ok(self.rest())
    }

    /// Terminates the stream at this cell by binding the end-of-stream sentinel.
    pub fn close(self: &Arc<Self>) -> Result<(), ChannelError> {
        self.first.bind(None)
    }

    /// Waits for this cell's value; `None` means end-of-stream.
    pub async fn get_first(&self) -> Option<T> {
        self.first.get_val().await
    }

    /// Returns the cell after this one, creating it synchronously if no cell has
    /// reached this position yet. Never waits: the cell itself exists immediately,
    /// only its value is lazily bound.
    pub fn rest(self: &Arc<Self>) -> Arc<Dfs<T>> {
        if let Some(existing) = self.rest.get() {
            return existing.clone();
        }
        let fresh = Dfs::new();
        match self.rest.set(fresh.clone()) {
            Ok(()) => fresh,
            Err(_) => self
                .rest
                .get()
                .expect("set() only fails when a value is already present")
                .clone(),
        }
    }

    /// Waits for this cell to resolve, then reports whether it was the end-of-stream
    /// sentinel.
    pub async fn is_empty(&self) -> bool {
        self.get_first().await.is_none()
    }

    /// Builds a new stream containing only the elements for which `predicate`
    /// returns true, populated asynchronously as `self` is bound. Traversal is an
    /// explicit loop, not recursion, so arbitrarily long streams don't grow the stack.
    pub fn filter<F>(self: Arc<Self>, mut predicate: F) -> Arc<Dfs<T>>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        let output = Dfs::new();
        let sink = output.clone();
        tokio::spawn(async move {
            let mut cursor = self;
            let mut tail = sink;
            loop {
                match cursor.get_first().await {
                    None => {
                        let _ = tail.close();
                        break;
                    }
                    Some(value) => {
                        let next_cursor = cursor.rest();
                        if predicate(&value) {
                            match tail.left_shift(value) {
                                Ok(next_tail) => tail = next_tail,
                                Err(_) => break,
                            }
                        }
                        cursor = next_cursor;
                    }
                }
            }
        });
        output
    }

    /// Builds a new stream of `f` applied to every element, populated asynchronously.
    pub fn map<F, U>(self: Arc<Self>, mut f: F) -> Arc<Dfs<U>>
    where
        F: FnMut(T) -> U + Send + 'static,
        U: Clone + Send + Sync + 'static,
    {
        let output = Dfs::<U>::new();
        let sink = output.clone();
        tokio::spawn(async move {
            let mut cursor = self;
            let mut tail = sink;
            loop {
                match cursor.get_first().await {
                    None => {
                        let _ = tail.close();
                        break;
                    }
                    Some(value) => {
                        let next_cursor = cursor.rest();
                        match tail.left_shift(f(value)) {
                            Ok(next_tail) => tail = next_tail,
                            Err(_) => break,
                        }
                        cursor = next_cursor;
                    }
                }
            }
        });
        output
    }

    /// Folds the whole stream down to one value. Consumes the stream up to, and
    /// including, its end-of-stream sentinel, so it only returns once the producer
    /// has closed it. Iterative, not recursive.
    pub async fn reduce<F, U>(self: Arc<Self>, init: U, mut f: F) -> U
    where
        F: FnMut(U, T) -> U,
    {
        let mut acc = init;
        let mut cursor = self;
        loop {
            match cursor.get_first().await {
                None => break,
                Some(value) => {
                    let next_cursor = cursor.rest();
                    acc = f(acc, value);
                    cursor = next_cursor;
                }
            }
        }
        acc
    }

    /// Registers `callback` to run, in binding order, for every element bound from
    /// this cell on, on a background task.
    pub fn whenever_bound<F>(self: Arc<Self>, mut callback: F)
    where
        F: FnMut(&T) + Send + 'static,
    {
        tokio::spawn(async move {
            let mut cursor = self;
            loop {
                match cursor.get_first().await {
                    None => break,
                    Some(value) => {
                        callback(&value);
                        cursor = cursor.rest();
                    }
                }
            }
        });
    }
}
