use crate::assets::{FetchError, InjectedErr, IoErr, NotFoundErr};
use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use log::trace;
use parking_lot::Mutex;
use snafu::ResultExt;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Where loadable assets get their raw bytes from.
pub trait AssetSource: Send + Sync + Debug + 'static {
    fn name(&self) -> &str;

    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>>;
}

/// Reads assets from a directory on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
    name: String,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        let root = root.into();
        let name = format!("file source at {}", root.display());
        Arc::new(Self { root, name })
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

impl AssetSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async move {
            let full = self.root.join(path);
            trace!("[File Source] Reading {}", full.display());
            tokio::fs::read(&full).await.context(IoErr { path: full })
        }
        .boxed()
    }
}

/// Keeps a fetch of one path pending until released or dropped.
#[derive(Debug)]
pub struct SourceHold {
    open: watch::Sender<bool>,
}

impl SourceHold {
    pub fn release(self) {}
}

impl Drop for SourceHold {
    fn drop(&mut self) {
        self.open.send_replace(true);
    }
}

/// An in-memory asset source. Counts fetches and can be told to fail, lag or hold
/// individual paths.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: DashMap<String, Arc<[u8]>>,
    failures: DashMap<String, String>,
    holds: DashMap<String, watch::Receiver<bool>>,
    fetches: DashMap<String, usize>,
    total_fetches: AtomicUsize,
    latency: Mutex<Option<Duration>>,
}

impl MemorySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: impl Into<String>, bytes: impl AsRef<[u8]>) {
        self.entries.insert(path.into(), Arc::from(bytes.as_ref()));
    }

    /// Every fetch of `path` fails with `reason` until [`MemorySource::clear_failure`].
    pub fn fail(&self, path: impl Into<String>, reason: impl Into<String>) {
        self.failures.insert(path.into(), reason.into());
    }

    pub fn clear_failure(&self, path: &str) {
        self.failures.remove(path);
    }

    /// Every fetch sleeps this long before answering.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Fetches of `path` stay pending until the returned hold is released or dropped.
    pub fn hold(&self, path: impl Into<String>) -> SourceHold {
        let (open, rx) = watch::channel(false);
        self.holds.insert(path.into(), rx);
        SourceHold { open }
    }

    pub fn fetch_count(&self, path: &str) -> usize {
        self.fetches.get(path).map_or(0, |n| *n)
    }

    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::SeqCst)
    }
}

impl AssetSource for MemorySource {
    fn name(&self) -> &str {
        "memory source"
    }

    fn fetch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        async move {
            *self.fetches.entry(path.to_string()).or_insert(0) += 1;
            self.total_fetches.fetch_add(1, Ordering::SeqCst);

            let hold = self.holds.get(path).map(|rx| rx.clone());
            if let Some(mut rx) = hold {
                // a dropped hold counts as released
                let _ = rx.wait_for(|open| *open).await;
            }

            let latency = *self.latency.lock();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            if let Some(reason) = self.failures.get(path) {
                return InjectedErr {
                    path,
                    reason: reason.value().as_str(),
                }
                .fail();
            }

            match self.entries.get(path) {
                Some(bytes) => Ok(bytes.to_vec()),
                None => NotFoundErr {
                    path,
                    source_name: self.name(),
                }
                .fail(),
            }
        }
        .boxed()
    }
}
