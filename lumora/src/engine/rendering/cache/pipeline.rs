//! Render pipelines by key, built at most once per key at a time.
//!
//! Every key is in one of three slots: `Ready`, `Building` or `Failed`. Lookup and insertion
//! happen under one lock, so racing callers for an unseen key see exactly one build start
//! and all of them get the outcome of that same build.
//!
//! Failed builds are not cached as results. They are remembered with a cooldown that doubles
//! with every consecutive failure, up to a cap. Until it expires, requests fail fast without
//! invoking the builder. With a zero cooldown every request retries.

use crate::gpu::{
    BindGroupLayoutId, GpuDevice, GpuError, PipelineId, RenderPipelineDescriptor, ShaderModuleId,
};
use futures::future::{BoxFuture, Shared};
use futures::{Future, FutureExt};
use log::{debug, trace, warn};
use parking_lot::Mutex;
use snafu::{ResultExt, Snafu};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use web_time::Instant;

#[derive(Debug, Clone, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum PipelineError {
    #[snafu(display("Pipeline {key} failed to build: {source}"))]
    Build { key: PipelineKey, source: GpuError },

    #[snafu(display("Pipeline {key} failed {failures} time(s), next retry in {remaining:?}"))]
    CoolingDown {
        key: PipelineKey,
        failures: u32,
        remaining: Duration,
    },

    #[snafu(display("Pipeline {key} is still being built"))]
    Pending { key: PipelineKey },
}

/// What a pipeline is for: the kind of renderer that draws with it and the format of the
/// target it draws into. Renderers whose shaders or layout can vary also put those in the
/// key, so two of them never share a pipeline built from the other's modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub kind: Cow<'static, str>,
    pub format: wgpu::TextureFormat,
    pub sources: Option<PipelineSources>,
}

/// GPU objects a pipeline is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineSources {
    pub layout: BindGroupLayoutId,
    pub vertex: ShaderModuleId,
    pub fragment: ShaderModuleId,
}

impl PipelineKey {
    pub fn new(kind: impl Into<Cow<'static, str>>, format: wgpu::TextureFormat) -> Self {
        Self {
            kind: kind.into(),
            format,
            sources: None,
        }
    }

    pub fn with_sources(mut self, sources: PipelineSources) -> Self {
        self.sources = Some(sources);
        self
    }
}

impl Display for PipelineKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}:{:?}\"", self.kind, self.format)?;
        if let Some(sources) = &self.sources {
            write!(
                f,
                " (layout {}, vertex {}, fragment {})",
                sources.layout, sources.vertex, sources.fragment
            )?;
        }
        Ok(())
    }
}

pub type PipelineResult = Result<PipelineId, PipelineError>;
pub type PipelineFuture = Shared<BoxFuture<'static, PipelineResult>>;

#[derive(Debug)]
enum Slot {
    Ready(PipelineId),
    Building(PipelineFuture),
    Failed { at: Instant, failures: u32 },
}

#[derive(Debug, Clone, Copy)]
struct Backoff {
    base: Duration,
    max: Duration,
}

impl Backoff {
    fn cooldown(self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug)]
pub struct PipelineCache {
    slots: Arc<Mutex<HashMap<PipelineKey, Slot>>>,
    backoff: Backoff,
    runtime: Option<Handle>,
    builds_started: AtomicUsize,
}

impl Default for PipelineCache {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

impl PipelineCache {
    pub fn new(retry_cooldown: Duration, max_retry_cooldown: Duration) -> Self {
        Self {
            slots: Arc::default(),
            backoff: Backoff {
                base: retry_cooldown,
                max: max_retry_cooldown.max(retry_cooldown),
            },
            runtime: None,
            builds_started: AtomicUsize::new(0),
        }
    }

    /// Background builds are spawned onto this runtime. Without one, the runtime of the
    /// caller is used if there is any, otherwise a build only makes progress while awaited.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    fn background_runtime(&self) -> Option<Handle> {
        self.runtime.clone().or_else(|| Handle::try_current().ok())
    }

    /// True if [`get_or_create_async`](Self::get_or_create_async) can drive a build without
    /// anyone awaiting it. Callers that drop the returned future must build with
    /// [`get_or_create`](Self::get_or_create) otherwise.
    pub fn can_build_in_background(&self) -> bool {
        self.background_runtime().is_some()
    }

    pub fn get(&self, key: &PipelineKey) -> Option<PipelineId> {
        match self.slots.lock().get(key) {
            Some(Slot::Ready(id)) => Some(*id),
            _ => None,
        }
    }

    /// True if the pipeline is cached or currently being built.
    pub fn has(&self, key: &PipelineKey) -> bool {
        matches!(
            self.slots.lock().get(key),
            Some(Slot::Ready(_) | Slot::Building(_))
        )
    }

    /// The build currently running for `key`, if any.
    pub fn in_flight(&self, key: &PipelineKey) -> Option<PipelineFuture> {
        match self.slots.lock().get(key) {
            Some(Slot::Building(build)) => Some(build.clone()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many builds were started, sync and async, successful or not.
    pub fn builds_started(&self) -> usize {
        self.builds_started.load(Ordering::SeqCst)
    }

    fn check_cooldown(&self, key: &PipelineKey, slot: Option<&Slot>) -> Result<u32, PipelineError> {
        let Some(&Slot::Failed { at, failures }) = slot else {
            return Ok(0);
        };

        let cooldown = self.backoff.cooldown(failures);
        let elapsed = at.elapsed();
        if elapsed < cooldown {
            return CoolingDownErr {
                key: key.clone(),
                failures,
                remaining: cooldown - elapsed,
            }
            .fail();
        }
        Ok(failures)
    }

    /// Returns the cached pipeline or builds it right here.
    ///
    /// `descriptor` is only invoked when a build starts. If the key is being built in the
    /// background this fails with [`PipelineError::Pending`] instead of building twice.
    pub fn get_or_create(
        &self,
        key: PipelineKey,
        device: &dyn GpuDevice,
        descriptor: impl FnOnce() -> RenderPipelineDescriptor,
    ) -> PipelineResult {
        let mut slots = self.slots.lock();
        let failures = match slots.get(&key) {
            Some(Slot::Ready(id)) => return Ok(*id),
            Some(Slot::Building(_)) => return PendingErr { key }.fail(),
            slot => self.check_cooldown(&key, slot)?,
        };

        self.builds_started.fetch_add(1, Ordering::SeqCst);
        match device.create_render_pipeline(&descriptor()) {
            Ok(id) => {
                debug!("[Pipeline Cache] Built {key}");
                slots.insert(key, Slot::Ready(id));
                Ok(id)
            }
            Err(source) => {
                warn!("[Pipeline Cache] Building {key} failed: {source}");
                slots.insert(
                    key.clone(),
                    Slot::Failed {
                        at: Instant::now(),
                        failures: failures + 1,
                    },
                );
                Err(source).context(BuildErr { key })
            }
        }
    }

    /// Returns a future for the pipeline of `key`.
    ///
    /// Cached pipelines resolve immediately. If a build is in flight, its future is shared
    /// with the new caller. Otherwise `build` is invoked once to start a new build, which is
    /// registered as in flight and moves to the cache (or the failure cooldown) when it
    /// completes. The build is driven in the background even if nobody awaits the result.
    pub fn get_or_create_async<F, Fut>(&self, key: PipelineKey, build: F) -> PipelineFuture
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PipelineId, GpuError>> + Send + 'static,
    {
        let mut slots = self.slots.lock();
        let failures = match slots.get(&key) {
            Some(Slot::Ready(id)) => return resolved(Ok(*id)),
            Some(Slot::Building(in_flight)) => {
                trace!("[Pipeline Cache] Joining in-flight build of {key}");
                return in_flight.clone();
            }
            slot => match self.check_cooldown(&key, slot) {
                Ok(failures) => failures,
                Err(e) => return resolved(Err(e)),
            },
        };

        self.builds_started.fetch_add(1, Ordering::SeqCst);
        debug!("[Pipeline Cache] Building {key} in the background");

        let pending = build();
        let shared_slots = Arc::clone(&self.slots);
        let build_key = key.clone();
        let future = async move {
            let result = pending.await;
            let mut slots = shared_slots.lock();
            match result {
                Ok(id) => {
                    debug!("[Pipeline Cache] Built {build_key}");
                    slots.insert(build_key, Slot::Ready(id));
                    Ok(id)
                }
                Err(source) => {
                    warn!("[Pipeline Cache] Building {build_key} failed: {source}");
                    slots.insert(
                        build_key.clone(),
                        Slot::Failed {
                            at: Instant::now(),
                            failures: failures + 1,
                        },
                    );
                    Err(source).context(BuildErr { key: build_key })
                }
            }
        }
        .boxed()
        .shared();

        slots.insert(key, Slot::Building(future.clone()));
        drop(slots);

        match self.background_runtime() {
            Some(runtime) => {
                runtime.spawn(future.clone());
            }
            None => trace!("[Pipeline Cache] No runtime to drive the build, it runs when awaited"),
        }

        future
    }

    /// Drops every pipeline and failure record. Builds in flight still finish and land in
    /// the cache.
    pub fn clear(&self) {
        self.slots
            .lock()
            .retain(|_, slot| matches!(slot, Slot::Building(_)));
    }
}

fn resolved(result: PipelineResult) -> PipelineFuture {
    futures::future::ready(result).boxed().shared()
}
