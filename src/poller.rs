//! Background status polling and change notification.
//!
//! [`StatusHub`] keeps the latest decoded status of one connection and fans
//! changes out to listeners. [`StatusPoller`] is the periodic task driving it;
//! what a tick does is supplied by the print engine.

use std::future::Future;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use log::debug;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::status::DeviceStatus;

pub type ListenerId = u64;

type Listener = Arc<dyn Fn(&DeviceStatus) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Latest status of a connection plus the listeners interested in it.
///
/// Snapshots are replaced whole, never mutated.
#[derive(Default)]
pub struct StatusHub {
    latest: RwLock<Option<Arc<DeviceStatus>>>,
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<Arc<DeviceStatus>> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn add_listener(&self, listener: impl Fn(&DeviceStatus) + Send + Sync + 'static) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Store `status` if its raw frame differs from the stored one and notify
    /// every listener once. Returns whether anything changed.
    pub fn publish(&self, status: Arc<DeviceStatus>) -> bool {
        {
            let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
            if let Some(previous) = latest.as_ref()
                && previous.raw_data() == status.raw_data()
            {
                return false;
            }
            *latest = Some(Arc::clone(&status));
        }

        // Listeners may add or remove listeners; call them on a snapshot
        let listeners: Vec<Listener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        debug!("status changed, notifying {} listener(s)", listeners.len());
        for listener in listeners {
            listener(&status);
        }
        true
    }

    /// Forget the stored status, e.g. when a different device is bound.
    pub fn invalidate(&self) {
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Periodic background task; aborted when stopped or dropped.
pub struct StatusPoller {
    task: Option<JoinHandle<()>>,
}

impl StatusPoller {
    /// Run `tick` every `period`, first after one full period, until it
    /// returns `Break`.
    pub fn spawn<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if tick().await.is_break() {
                    debug!("status poller finished");
                    break;
                }
            }
        });
        StatusPoller { task: Some(task) }
    }

    pub fn stop(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Let the task run to its own end; used from inside the task itself.
    pub fn detach(mut self) {
        self.task.take();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
