//! Owned timer and task handles.
//!
//! Every timer the controller starts is a spawned task that posts an event
//! back to the session channel. The guard aborts the task when dropped, so
//! replacing or clearing the field that holds it is the cancellation point.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Aborts the wrapped task on drop
#[derive(Debug)]
pub struct TaskGuard {
    handle: JoinHandle<()>,
}

impl TaskGuard {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            handle: tokio::spawn(future),
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Post `event` once after `delay`
pub fn after<E>(delay: Duration, tx: UnboundedSender<E>, event: E) -> TaskGuard
where
    E: Send + 'static,
{
    TaskGuard::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(event);
    })
}

/// Post `make()` every `period`, first one a full period from now
pub fn every<E, F>(period: Duration, tx: UnboundedSender<E>, make: F) -> TaskGuard
where
    E: Send + 'static,
    F: Fn() -> E + Send + 'static,
{
    TaskGuard::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if tx.send(make()).is_err() {
                break;
            }
        }
    })
}
