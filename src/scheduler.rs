//! Keeping interaction responsive: event coalescing, load supersession and
//! off-thread slice work.
//!
//! [`LoadSupervisor`] and [`RenderWorker`] spawn onto tokio's blocking pool
//! and must be used from within a tokio runtime.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::{AbortHandle, Abortable, Aborted};
use thiserror::Error;
use tokio::task::JoinHandle;
use web_time::Instant;

use crate::volume::Volume;
use crate::volume_loader::{VolumeLoader, VolumeLoaderError};

/// Coalesces a burst of events to at most one per interval. The newest
/// pending event replaces older ones and is never lost: [`FrameThrottle::flush`]
/// hands it out at the end of the interaction.
#[derive(Debug)]
pub struct FrameThrottle<T> {
    interval: Duration,
    last_emit: Option<Instant>,
    pending: Option<T>,
}

impl<T> FrameThrottle<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
            pending: None,
        }
    }

    pub fn push(&mut self, event: T) -> Option<T> {
        self.push_at(event, Instant::now())
    }

    pub fn push_at(&mut self, event: T, now: Instant) -> Option<T> {
        if self.ready(now) {
            self.last_emit = Some(now);
            self.pending = None;
            Some(event)
        } else {
            self.pending = Some(event);
            None
        }
    }

    /// Emit the pending event if its frame has come.
    pub fn poll(&mut self) -> Option<T> {
        self.poll_at(Instant::now())
    }

    pub fn poll_at(&mut self, now: Instant) -> Option<T> {
        if self.pending.is_some() && self.ready(now) {
            self.last_emit = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    /// End of interaction: return whatever is still pending.
    pub fn flush(&mut self) -> Option<T> {
        self.last_emit = None;
        self.pending.take()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn ready(&self, now: Instant) -> bool {
        match self.last_emit {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("load was superseded by a newer request")]
    Superseded,

    #[error(transparent)]
    Failed(#[from] VolumeLoaderError),

    #[error("load worker failed: {0}")]
    Worker(String),
}

/// Pending load; resolves to the decoded value or to the reason it didn't.
pub struct LoadTicket<T> {
    task: Abortable<JoinHandle<Result<T, VolumeLoaderError>>>,
}

impl<T> LoadTicket<T> {
    pub async fn wait(self) -> Result<T, LoadError> {
        match self.task.await {
            Err(Aborted) => Err(LoadError::Superseded),
            Ok(Err(join)) => Err(LoadError::Worker(join.to_string())),
            Ok(Ok(result)) => Ok(result?),
        }
    }
}

/// At most one in-flight load; starting another aborts the previous one.
#[derive(Debug, Default)]
pub struct LoadSupervisor {
    current: Option<AbortHandle>,
}

impl LoadSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<T, F>(&mut self, job: F) -> LoadTicket<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, VolumeLoaderError> + Send + 'static,
    {
        if let Some(previous) = self.current.take() {
            log::debug!("aborting superseded load");
            previous.abort();
        }
        let (handle, registration) = AbortHandle::new_pair();
        self.current = Some(handle);
        LoadTicket {
            task: Abortable::new(tokio::task::spawn_blocking(job), registration),
        }
    }

    pub fn load_bytes(&mut self, bytes: Vec<u8>) -> LoadTicket<Volume> {
        self.start(move || VolumeLoader::load_from_bytes(&bytes))
    }

    pub fn load_file(&mut self, path: PathBuf) -> LoadTicket<Volume> {
        self.start(move || VolumeLoader::load_from_file(path))
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.abort();
        }
    }
}

/// Result of off-thread work; `None` once a newer request was submitted.
pub struct RenderTicket<T> {
    generation: u64,
    task: JoinHandle<Option<T>>,
}

impl<T> RenderTicket<T> {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn wait(self) -> Option<T> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => {
                log::error!("render job {} failed: {err}", self.generation);
                None
            }
        }
    }
}

/// Runs slice extraction and compositing off the interaction thread.
/// Every submission supersedes the ones before it; superseded jobs are
/// skipped if they have not started and their output is dropped if they have.
#[derive(Clone, Debug, Default)]
pub struct RenderWorker {
    generation: Arc<AtomicU64>,
}

impl RenderWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn submit<T, F>(&self, job: F) -> RenderTicket<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let latest = Arc::clone(&self.generation);
        let task = tokio::task::spawn_blocking(move || {
            if latest.load(Ordering::Acquire) != generation {
                return None;
            }
            let output = job();
            if latest.load(Ordering::Acquire) != generation {
                log::trace!("dropping superseded render {generation}");
                return None;
            }
            Some(output)
        });
        RenderTicket { generation, task }
    }
}
