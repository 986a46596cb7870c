//! Serial listener delivery
//!
//! Probes of different modules run concurrently, and several sessions may
//! share one listener, but listener code must never be entered twice at
//! once. Every probe of a registry posts its events to one [`CallbackQueue`];
//! a single task drains the queue and calls each event's listener in posting
//! order.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;
use unibio_core::{AuthEvent, AuthenticationListener, FailureReason, HelpReason, ModuleTag};

enum Delivery {
    Event(Arc<dyn AuthenticationListener>, AuthEvent),
    Flush(oneshot::Sender<()>),
}

/// Single delivery task shared by every session of a registry
#[derive(Clone)]
pub struct CallbackQueue {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl CallbackQueue {
    /// Spawn the delivery task.
    ///
    /// The task exits once every clone of the queue is dropped and the
    /// backlog has been delivered.
    pub fn spawn() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                match delivery {
                    Delivery::Event(listener, event) => event.deliver(listener.as_ref()),
                    Delivery::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Callback queue drained");
        });

        Self { tx }
    }

    pub fn post(&self, listener: &Arc<dyn AuthenticationListener>, event: AuthEvent) {
        if self.tx.send(Delivery::Event(listener.clone(), event)).is_err() {
            debug!("Callback queue closed, dropping event");
        }
    }

    /// Wait until everything posted before this call has been delivered
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Delivery::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }

    /// Listener front that routes `listener`'s callbacks through this queue
    pub fn front(&self, listener: Arc<dyn AuthenticationListener>) -> QueuedListener {
        QueuedListener {
            queue: self.clone(),
            listener,
        }
    }
}

/// A listener whose callbacks go through a [`CallbackQueue`]
#[derive(Clone)]
pub struct QueuedListener {
    queue: CallbackQueue,
    listener: Arc<dyn AuthenticationListener>,
}

impl QueuedListener {
    fn post(&self, event: AuthEvent) {
        self.queue.post(&self.listener, event);
    }
}

impl AuthenticationListener for QueuedListener {
    fn on_success(&self, tag: ModuleTag) {
        self.post(AuthEvent::Success { tag });
    }

    fn on_failure(&self, reason: FailureReason, tag: ModuleTag) {
        self.post(AuthEvent::Failure { reason, tag });
    }

    fn on_help(&self, reason: HelpReason, message: Option<&str>) {
        self.post(AuthEvent::Help {
            reason,
            message: message.map(str::to_string),
        });
    }

    fn on_progress(&self, code: i32) {
        self.post(AuthEvent::AcquisitionProgress { code });
    }
}
