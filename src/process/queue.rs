/*!
 * Execution Queue
 *
 * One worker thread per process. The worker builds its own state (the
 * engine is not `Send`, so it is created there and never moves) and then
 * runs submitted jobs one at a time, in submission order.
 */

use flume::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::core::limits::DEFAULT_QUEUE_CAPACITY;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum QueueError {
    /// The queue shut down before the job ran
    #[error("execution queue is closed")]
    Closed,

    /// A job tried to wait on its own queue
    #[error("job submitted from its own worker thread")]
    Reentrant,

    #[error("worker thread failed to start: {0}")]
    Spawn(String),
}

pub type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

enum Message<S> {
    Run(Job<S>),
    /// Runs even after `close`, then stops the worker
    Shutdown(Job<S>),
}

/// Unstarted queue configuration
#[derive(Debug, Clone)]
pub struct ExecutionQueue {
    label: String,
    capacity: usize,
}

impl ExecutionQueue {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Pending jobs accepted before submitters block
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Spawn the worker, build its state with `init` and wait for the outcome
    pub fn start<S, E, I>(self, init: I) -> Result<QueueHandle<S>, E>
    where
        S: 'static,
        E: From<QueueError> + Send + 'static,
        I: FnOnce() -> Result<S, E> + Send + 'static,
    {
        let (sender, receiver) = flume::bounded::<Message<S>>(self.capacity);
        let (ready_tx, ready_rx) = flume::bounded::<Result<(), E>>(1);
        let closed = Arc::new(AtomicBool::new(false));
        let worker_closed = Arc::clone(&closed);
        let label = self.label.clone();

        let handle = thread::Builder::new()
            .name(self.label.clone())
            .spawn(move || {
                let mut state = match init() {
                    Ok(state) => state,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                drop(ready_tx);
                run_worker(&label, &mut state, &receiver, &worker_closed);
                debug!(queue = %label, "Worker stopped");
            })
            .map_err(|e| E::from(QueueError::Spawn(e.to_string())))?;

        let worker_id = handle.thread().id();
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(QueueHandle {
                label: self.label,
                sender,
                closed,
                worker: Mutex::new(Some(handle)),
                worker_id,
            }),
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                let _ = handle.join();
                Err(E::from(QueueError::Spawn(
                    "worker exited during startup".to_string(),
                )))
            }
        }
    }
}

fn run_worker<S>(label: &str, state: &mut S, receiver: &Receiver<Message<S>>, closed: &AtomicBool) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => {
                if closed.load(Ordering::Acquire) {
                    // dropping the job drops its reply sender: the caller sees Closed
                    continue;
                }
                if catch_unwind(AssertUnwindSafe(|| job(state))).is_err() {
                    error!(queue = %label, "Job panicked");
                }
            }
            Message::Shutdown(job) => {
                if catch_unwind(AssertUnwindSafe(|| job(state))).is_err() {
                    error!(queue = %label, "Shutdown job panicked");
                }
                break;
            }
        }
    }
}

/// Submission side of a running queue
pub struct QueueHandle<S: 'static> {
    label: String,
    sender: Sender<Message<S>>,
    closed: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl<S: 'static> QueueHandle<S> {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    fn prepare<F, R>(&self, f: F) -> Result<(Message<S>, Receiver<R>), QueueError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_worker_thread() {
            return Err(QueueError::Reentrant);
        }
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let (reply_tx, reply_rx) = flume::bounded(1);
        let job: Job<S> = Box::new(move |state: &mut S| {
            let _ = reply_tx.send(f(state));
        });
        Ok((Message::Run(job), reply_rx))
    }

    /// Run `f` on the worker and block until it has finished
    pub fn submit<F, R>(&self, f: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (message, reply) = self.prepare(f)?;
        self.sender.send(message).map_err(|_| QueueError::Closed)?;
        reply.recv().map_err(|_| QueueError::Closed)
    }

    /// Async variant of `submit`; never blocks the calling executor thread
    pub async fn submit_async<F, R>(&self, f: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (message, reply) = self.prepare(f)?;
        self.sender
            .send_async(message)
            .await
            .map_err(|_| QueueError::Closed)?;
        reply.recv_async().await.map_err(|_| QueueError::Closed)
    }

    /// Reject new work and skip jobs that have not started
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Close, run `f` as the worker's last job and join the worker
    ///
    /// Idempotent. Called from the worker itself it only closes the queue;
    /// the worker stops once the handle is dropped.
    pub fn shutdown<F>(&self, f: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        self.close();
        if self.is_worker_thread() {
            let _ = self.sender.try_send(Message::Shutdown(Box::new(f)));
            return;
        }
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        // fails only when the worker is already gone
        let _ = self.sender.send(Message::Shutdown(Box::new(f)));
        if handle.join().is_err() {
            warn!(queue = %self.label, "Worker thread panicked");
        }
    }
}

impl<S: 'static> Drop for QueueHandle<S> {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        let Some(handle) = self.worker.get_mut().take() else {
            return;
        };
        let stop: Job<S> = Box::new(|_: &mut S| {});
        if thread::current().id() == self.worker_id {
            let _ = self.sender.try_send(Message::Shutdown(stop));
            return;
        }
        let _ = self.sender.send(Message::Shutdown(stop));
        let _ = handle.join();
    }
}

impl<S: 'static> std::fmt::Debug for QueueHandle<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHandle")
            .field("label", &self.label)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}
