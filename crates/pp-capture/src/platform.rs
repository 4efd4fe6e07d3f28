//! Process-wide table of screen and tab capture entry points.

use once_cell::sync::OnceCell;
use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

/// Known capture entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CaptureApi {
    /// Extension tab capture, exposed as a property.
    TabCapture,
    /// Extension desktop capture, exposed as a property.
    DesktopCapture,
    /// `getDisplayMedia`, exposed as a promise-returning call.
    DisplayMedia,
}

impl CaptureApi {
    pub const ALL: [Self; 3] = [Self::TabCapture, Self::DesktopCapture, Self::DisplayMedia];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TabCapture => "tab-capture",
            Self::DesktopCapture => "desktop-capture",
            Self::DisplayMedia => "display-media",
        }
    }
}

/// Constraints passed by a capture caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CaptureRequest {
    pub video: bool,
    pub audio: bool,
}

/// Handle to a live capture stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStream {
    pub api: CaptureApi,
    pub track_count: u32,
}

/// Native implementation behind a capture entry point.
pub trait CaptureBackend: Send + Sync {
    fn start(&self, request: &CaptureRequest) -> PlaypenResult<CaptureStream>;
}

#[derive(Clone)]
pub(crate) enum EntryPoint {
    Native(Arc<dyn CaptureBackend>),
    Blocked(Arc<AtomicU64>),
}

impl fmt::Debug for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native"),
            Self::Blocked(hits) => write!(f, "Blocked({})", hits.load(Ordering::Relaxed)),
        }
    }
}

/// Capture surfaces of the running process.
///
/// Platform integrations (and anything else living in the process, such as
/// injected extensions) publish entry points with [`CapturePlatform::expose`];
/// callers reach them through the accessor matching the entry point's style.
#[derive(Debug, Default)]
pub struct CapturePlatform {
    entries: RwLock<HashMap<CaptureApi, EntryPoint>>,
}

impl CapturePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Self {
        static PLATFORM: OnceCell<CapturePlatform> = OnceCell::new();
        PLATFORM.get_or_init(Self::new)
    }

    /// Publishes (or re-publishes) a native entry point.
    pub fn expose(&self, api: CaptureApi, backend: Arc<dyn CaptureBackend>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(api, EntryPoint::Native(backend));
    }

    pub fn is_present(&self, api: CaptureApi) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&api)
    }

    pub fn is_blocked(&self, api: CaptureApi) -> bool {
        matches!(self.entry(api), Some(EntryPoint::Blocked(_)))
    }

    /// Promise-style display capture. A blocked entry point rejects with
    /// `capture.not_allowed`.
    pub fn get_display_media(&self, request: &CaptureRequest) -> PlaypenResult<CaptureStream> {
        match self.entry(CaptureApi::DisplayMedia) {
            Some(EntryPoint::Native(backend)) => backend.start(request),
            Some(EntryPoint::Blocked(hits)) => {
                record_blocked(&hits, CaptureApi::DisplayMedia);
                Err(PlaypenError::new(
                    "capture.not_allowed",
                    "Screen capture is disabled on this site",
                ))
            }
            None => Err(PlaypenError::new(
                "capture.unsupported",
                "display capture is not available in this environment",
            )),
        }
    }

    /// Property-style tab capture; blocked entries read as absent.
    pub fn tab_capture(&self) -> Option<Arc<dyn CaptureBackend>> {
        self.property(CaptureApi::TabCapture)
    }

    /// Property-style desktop capture; blocked entries read as absent.
    pub fn desktop_capture(&self) -> Option<Arc<dyn CaptureBackend>> {
        self.property(CaptureApi::DesktopCapture)
    }

    pub(crate) fn replace(&self, api: CaptureApi, entry: EntryPoint) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(api, entry);
    }

    fn entry(&self, api: CaptureApi) -> Option<EntryPoint> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&api)
            .cloned()
    }

    fn property(&self, api: CaptureApi) -> Option<Arc<dyn CaptureBackend>> {
        match self.entry(api)? {
            EntryPoint::Native(backend) => Some(backend),
            EntryPoint::Blocked(hits) => {
                record_blocked(&hits, api);
                None
            }
        }
    }
}

fn record_blocked(hits: &AtomicU64, api: CaptureApi) {
    let attempts = hits.fetch_add(1, Ordering::Relaxed).saturating_add(1);
    tracing::warn!(api = api.as_str(), attempts, "unauthorized capture attempt blocked");
}
