//! Release Module
//!
//! Destinations for destroying evicted and removed values once they have
//! been detached from the index and the lock has been dropped.
//!
//! # Targets
//! - [`Inline`]: drop on the calling thread
//! - [`BackgroundRelease`]: drop on a lazily started worker thread
//! - [`DesignatedThread`]: drop on a thread chosen by the caller, which pumps
//!   its [`ReleaseQueue`]

use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use tracing::{debug, error, warn};

/// A unit of destruction work.
pub type ReleaseJob = Box<dyn FnOnce() + Send + 'static>;

// == Release Target ==
/// Somewhere a batch of detached values can be destroyed.
pub trait ReleaseTarget: Send + Sync + fmt::Debug {
    /// Runs `job` now or hands it to another thread.
    fn dispatch(&self, job: ReleaseJob);
}

/// Runs a job, logging instead of unwinding if a destructor panics.
fn run_job(job: ReleaseJob) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(job)) {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        error!("Value destructor panicked during release: {}", message);
    }
}

// == Inline ==
/// Destroys values on the calling thread, after the lock is released.
///
/// A panicking destructor unwinds into the caller.
#[derive(Debug, Default, Clone, Copy)]
pub struct Inline;

impl ReleaseTarget for Inline {
    fn dispatch(&self, job: ReleaseJob) {
        job();
    }
}

// == Designated Thread ==
/// Handle for posting release jobs to one specific thread.
///
/// Jobs dispatched from the designated thread itself run inline.
#[derive(Clone)]
pub struct DesignatedThread {
    sender: Sender<ReleaseJob>,
    owner: Arc<OnceLock<ThreadId>>,
}

/// Receiving end of a [`DesignatedThread`], pumped by the thread that
/// should destroy values.
pub struct ReleaseQueue {
    receiver: Receiver<ReleaseJob>,
    owner: Arc<OnceLock<ThreadId>>,
}

impl DesignatedThread {
    // == Constructor ==
    /// Creates a handle and the queue the designated thread must pump.
    ///
    /// The first thread that pumps the queue becomes the designated one.
    pub fn channel() -> (Self, ReleaseQueue) {
        let (sender, receiver) = mpsc::channel();
        let owner = Arc::new(OnceLock::new());
        (
            Self {
                sender,
                owner: owner.clone(),
            },
            ReleaseQueue { receiver, owner },
        )
    }

    /// Starts a named thread that pumps its own queue until every handle
    /// is dropped.
    pub fn spawn(name: &str) -> io::Result<Self> {
        let (handle, queue) = Self::channel();
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || queue.run())?;
        debug!("Started release thread '{}'", name);
        Ok(handle)
    }

    /// Returns true when called from the designated thread.
    pub fn is_current(&self) -> bool {
        self.owner.get() == Some(&thread::current().id())
    }
}

impl fmt::Debug for DesignatedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DesignatedThread")
            .field("owner", &self.owner.get())
            .finish()
    }
}

impl ReleaseTarget for DesignatedThread {
    fn dispatch(&self, job: ReleaseJob) {
        if self.is_current() {
            job();
            return;
        }
        if let Err(mpsc::SendError(job)) = self.sender.send(job) {
            warn!("Designated release thread is gone, releasing on the calling thread");
            job();
        }
    }
}

impl ReleaseQueue {
    /// Claims the queue for the current thread.
    fn bind(&self) {
        let current = thread::current().id();
        if *self.owner.get_or_init(|| current) != current {
            warn!("Release queue pumped from a thread other than its designated one");
        }
    }

    /// Runs every job queued so far and returns how many ran.
    pub fn run_pending(&self) -> usize {
        self.bind();
        let mut ran = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(job) => {
                    run_job(job);
                    ran += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        ran
    }

    /// Runs jobs as they arrive until every handle has been dropped.
    pub fn run(self) {
        self.bind();
        while let Ok(job) = self.receiver.recv() {
            run_job(job);
        }
    }
}

// == Background Release ==
/// Destroys values on a worker thread started on first use.
#[derive(Debug)]
pub struct BackgroundRelease {
    name: String,
    worker: OnceLock<Option<DesignatedThread>>,
}

impl BackgroundRelease {
    /// Creates a target whose worker thread will carry `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: OnceLock::new(),
        }
    }
}

impl ReleaseTarget for BackgroundRelease {
    fn dispatch(&self, job: ReleaseJob) {
        let worker = self.worker.get_or_init(|| match DesignatedThread::spawn(&self.name) {
            Ok(worker) => Some(worker),
            Err(e) => {
                warn!(
                    "Failed to start release thread '{}', releasing inline: {}",
                    self.name, e
                );
                None
            }
        });

        match worker {
            Some(worker) => worker.dispatch(job),
            None => job(),
        }
    }
}
