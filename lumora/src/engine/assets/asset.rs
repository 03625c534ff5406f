use crate::assets::{
    AbandonedErr, AssetError, AssetPayload, AssetSource, FetchErr, decode_payload,
};
use log::{debug, error, trace};
use parking_lot::RwLock;
use snafu::ResultExt;
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use tokio::sync::watch;

/// Stable identity of an asset, usually a path, URL or content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(Arc<str>);

impl AssetId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for AssetId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AssetId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AssetId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<&AssetId> for AssetId {
    fn from(value: &AssetId) -> Self {
        value.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Shader,
    Texture,
    Mesh,
    Material,
}

impl AssetKind {
    pub const ALL: [AssetKind; 4] = [
        AssetKind::Shader,
        AssetKind::Texture,
        AssetKind::Mesh,
        AssetKind::Material,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            AssetKind::Shader => "Shader",
            AssetKind::Texture => "Texture",
            AssetKind::Mesh => "Mesh",
            AssetKind::Material => "Material",
        }
    }
}

impl Display for AssetKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl AssetState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, AssetState::Ready | AssetState::Failed)
    }

    /// Position in the lifecycle. Never decreases for a given asset.
    pub const fn rank(self) -> u8 {
        match self {
            AssetState::Unloaded => 0,
            AssetState::Loading => 1,
            AssetState::Ready | AssetState::Failed => 2,
        }
    }
}

/// Where an asset's content comes from.
#[derive(Clone)]
pub enum AssetOrigin {
    /// Fetched and decoded on first load.
    Loadable {
        source: Arc<dyn AssetSource>,
        path: String,
    },
    /// Has no load capability. It stays in whatever state it was created in.
    Static,
}

impl Debug for AssetOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetOrigin::Loadable { source, path } => f
                .debug_struct("Loadable")
                .field("source", &source.name())
                .field("path", path)
                .finish(),
            AssetOrigin::Static => f.write_str("Static"),
        }
    }
}

pub struct Asset {
    id: AssetId,
    kind: AssetKind,
    origin: AssetOrigin,
    hot_reload: bool,
    state: watch::Sender<AssetState>,
    error: RwLock<Option<Arc<AssetError>>>,
    payload: RwLock<Option<Arc<AssetPayload>>>,
}

impl Asset {
    fn with_origin(
        id: AssetId,
        kind: AssetKind,
        origin: AssetOrigin,
        state: AssetState,
        payload: Option<AssetPayload>,
    ) -> Self {
        Self {
            id,
            kind,
            origin,
            hot_reload: false,
            state: watch::Sender::new(state),
            error: RwLock::new(None),
            payload: RwLock::new(payload.map(Arc::new)),
        }
    }

    /// An asset whose content is fetched from `source`, using its identity as the path.
    pub fn loadable(id: impl Into<AssetId>, kind: AssetKind, source: Arc<dyn AssetSource>) -> Self {
        let id = id.into();
        let path = id.as_str().to_string();
        Self::with_origin(
            id,
            kind,
            AssetOrigin::Loadable { source, path },
            AssetState::Unloaded,
            None,
        )
    }

    /// An asset that is ready from the start and can't be loaded again.
    pub fn from_payload(id: impl Into<AssetId>, payload: AssetPayload) -> Self {
        let kind = payload.kind();
        Self::with_origin(
            id.into(),
            kind,
            AssetOrigin::Static,
            AssetState::Ready,
            Some(payload),
        )
    }

    /// A name without content. Stays `Unloaded`, so everything that needs it falls back.
    pub fn placeholder(id: impl Into<AssetId>, kind: AssetKind) -> Self {
        Self::with_origin(id.into(), kind, AssetOrigin::Static, AssetState::Unloaded, None)
    }

    /// Keeps the CPU copy around after upload so the content can be reloaded.
    pub fn with_hot_reload(mut self) -> Self {
        self.hot_reload = true;
        self
    }

    pub fn id(&self) -> &AssetId {
        &self.id
    }

    pub fn kind(&self) -> AssetKind {
        self.kind
    }

    pub fn origin(&self) -> &AssetOrigin {
        &self.origin
    }

    pub fn is_loadable(&self) -> bool {
        matches!(self.origin, AssetOrigin::Loadable { .. })
    }

    pub fn state(&self) -> AssetState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == AssetState::Ready
    }

    /// Present iff the asset is `Failed`.
    pub fn error(&self) -> Option<Arc<AssetError>> {
        self.error.read().clone()
    }

    /// A receiver that sees every state this asset settles in from now on.
    pub fn subscribe(&self) -> watch::Receiver<AssetState> {
        self.state.subscribe()
    }

    /// The decoded content, or `None` while not ready or after it was discarded.
    pub fn cpu_data(&self) -> Option<Arc<AssetPayload>> {
        self.payload.read().clone()
    }

    pub fn can_discard_cpu_data(&self) -> bool {
        if self.hot_reload {
            return false;
        }
        match self.kind {
            AssetKind::Shader | AssetKind::Texture | AssetKind::Mesh => true,
            // read on every draw
            AssetKind::Material => false,
        }
    }

    /// Drops the CPU copy if the policy allows it. Returns whether anything was dropped.
    /// Never touches the state.
    pub fn discard_cpu_data(&self) -> bool {
        if !self.can_discard_cpu_data() {
            return false;
        }
        let discarded = self.payload.write().take().is_some();
        if discarded {
            trace!("[Asset] Discarded CPU data of {} \"{}\"", self.kind, self.id);
        }
        discarded
    }

    /// Fetches and decodes the content if the asset is still `Unloaded`.
    ///
    /// Returns immediately and successfully in every other state, and for assets without a
    /// load capability. A failure is recorded on the asset and returned.
    pub async fn load(&self) -> Result<(), Arc<AssetError>> {
        let AssetOrigin::Loadable { source, path } = &self.origin else {
            return Ok(());
        };

        let started = self.state.send_if_modified(|state| {
            if *state == AssetState::Unloaded {
                *state = AssetState::Loading;
                true
            } else {
                false
            }
        });
        if !started {
            return Ok(());
        }

        debug!("[Asset] Loading {} \"{}\" from {}", self.kind, self.id, source.name());

        let mut guard = LoadGuard {
            asset: self,
            armed: true,
        };

        let result = match source.fetch(path).await {
            Ok(bytes) => decode_payload(&self.id, self.kind, bytes),
            Err(e) => Err(e).context(FetchErr {
                id: self.id.clone(),
                kind: self.kind,
            }),
        };
        guard.armed = false;

        match result {
            Ok(payload) => {
                *self.payload.write() = Some(Arc::new(payload));
                self.state.send_replace(AssetState::Ready);
                debug!("[Asset] {} \"{}\" is ready", self.kind, self.id);
                Ok(())
            }
            Err(e) => {
                let e = Arc::new(e);
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    fn fail(&self, err: Arc<AssetError>) {
        error!("[Asset] {err}");
        *self.error.write() = Some(err);
        self.state.send_replace(AssetState::Failed);
    }

    /// Resolves once the asset is `Ready` or `Failed`, with that state.
    ///
    /// Does not start a load. Waiting on an asset nobody loads never resolves.
    pub async fn wait_terminal(&self) -> AssetState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            // the sender lives in `self`
            Err(_) => self.state(),
        }
    }
}

impl Debug for Asset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("origin", &self.origin)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Fails the asset if the future driving its load is dropped halfway.
struct LoadGuard<'a> {
    asset: &'a Asset,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.asset.fail(Arc::new(
                AbandonedErr {
                    id: self.asset.id.clone(),
                }
                .build(),
            ));
        }
    }
}
