use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll, Waker},
};

use futures::future::BoxFuture;

/// A future driven from the UI loop by polling once per frame.
///
/// There is no executor: the future is polled with a no-op waker, so its
/// work has to happen on another thread. Callers request repaints while a
/// task is pending.
pub enum UiTask<T> {
    Pending(BoxFuture<'static, T>),
    Ready(T),
    Taken,
}

impl<T> UiTask<T> {
    pub fn new(future: BoxFuture<'static, T>) -> Self {
        Self::Pending(future)
    }

    fn poll(&mut self) {
        if let UiTask::Pending(future) = self {
            let mut cx = Context::from_waker(Waker::noop());
            if let Poll::Ready(value) = Pin::new(future).poll(&mut cx) {
                *self = UiTask::Ready(value);
            }
        }
    }

    pub fn is_pending(&mut self) -> bool {
        self.poll();
        matches!(self, UiTask::Pending(_))
    }

    /// Borrows the result once available and keeps it for later frames.
    pub fn get(&mut self) -> Option<&mut T> {
        self.poll();
        match self {
            UiTask::Ready(value) => Some(value),
            _ => None,
        }
    }

    /// Hands out the result once.
    pub fn take(&mut self) -> Option<T> {
        self.poll();
        match std::mem::replace(self, UiTask::Taken) {
            UiTask::Ready(value) => Some(value),
            other => {
                *self = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::{channel::oneshot, FutureExt};

    use super::*;

    #[test]
    fn take_yields_once() {
        let (tx, rx) = oneshot::channel::<u32>();
        let mut task = UiTask::new(rx.map(|r| r.unwrap_or(0)).boxed());
        assert_eq!(None, task.take());
        assert!(task.is_pending());

        tx.send(7).unwrap();
        assert_eq!(Some(7), task.take());
        assert_eq!(None, task.take());
        assert!(!task.is_pending());
    }

    #[test]
    fn get_keeps_value() {
        let (tx, rx) = oneshot::channel::<Vec<u32>>();
        let mut task = UiTask::new(rx.map(|r| r.unwrap_or_default()).boxed());
        assert_eq!(None, task.get());
        tx.send(vec![1, 2]).unwrap();
        task.get().unwrap().push(3);
        assert_eq!(Some(&mut vec![1, 2, 3]), task.get());
    }
}
