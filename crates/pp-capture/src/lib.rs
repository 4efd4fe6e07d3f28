//! Defensive overrides for platform screen and tab capture entry points.
//!
//! [`CaptureGuard::install`] replaces every capture entry point present on a
//! [`CapturePlatform`] with a blocking stub. Installation overwrites rather
//! than wraps, so repeated installs (one per visibility change, for
//! instance) always leave the same single override in place.

pub mod platform;

use once_cell::sync::OnceCell;
use platform::EntryPoint;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

pub use platform::CaptureApi;
pub use platform::CaptureBackend;
pub use platform::CapturePlatform;
pub use platform::CaptureRequest;
pub use platform::CaptureStream;

/// Page visibility transitions observed by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Operator-facing snapshot; never consulted for blocking decisions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureGuardStatus {
    pub installed: bool,
    pub install_count: u64,
    pub intercepted: BTreeMap<CaptureApi, bool>,
    pub blocked_attempts: u64,
}

impl CaptureGuardStatus {
    pub fn is_intercepted(&self, api: CaptureApi) -> bool {
        self.intercepted.get(&api).copied().unwrap_or(false)
    }
}

/// Process-wide capture blocker.
#[derive(Debug, Default)]
pub struct CaptureGuard {
    attempts: Arc<AtomicU64>,
    install_count: AtomicU64,
    intercepted: Mutex<BTreeMap<CaptureApi, bool>>,
}

impl CaptureGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static Self {
        static GUARD: OnceCell<CaptureGuard> = OnceCell::new();
        GUARD.get_or_init(Self::new)
    }

    /// Installs the blocking overrides on `platform`.
    ///
    /// Safe to call any number of times; entry points missing from the
    /// platform are recorded as not intercepted and skipped.
    pub fn install(&self, platform: &CapturePlatform) -> CaptureGuardStatus {
        let mut intercepted = self
            .intercepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        for api in CaptureApi::ALL {
            let present = platform.is_present(api);
            if present {
                platform.replace(api, EntryPoint::Blocked(Arc::clone(&self.attempts)));
            }
            intercepted.insert(api, present);
        }
        drop(intercepted);

        let count = self.install_count.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        tracing::debug!(install_count = count, "capture guard installed");
        self.status()
    }

    /// Re-installs when the page becomes visible again, countering late
    /// attempts to restore the original entry points.
    pub fn on_visibility_change(&self, platform: &CapturePlatform, visibility: Visibility) {
        if visibility == Visibility::Visible {
            self.install(platform);
        }
    }

    pub fn status(&self) -> CaptureGuardStatus {
        let install_count = self.install_count.load(Ordering::Relaxed);
        CaptureGuardStatus {
            installed: install_count > 0,
            install_count,
            intercepted: self
                .intercepted
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            blocked_attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}

/// Installs the process guard on the process platform.
pub fn install_process_guard() -> CaptureGuardStatus {
    CaptureGuard::global().install(CapturePlatform::global())
}

#[cfg(test)]
mod tests {
    use super::CaptureApi;
    use super::CaptureBackend;
    use super::CaptureGuard;
    use super::CapturePlatform;
    use super::CaptureRequest;
    use super::CaptureStream;
    use super::Visibility;
    use pp_core::PlaypenResult;
    use std::sync::Arc;

    struct RecordingBackend(CaptureApi);

    impl CaptureBackend for RecordingBackend {
        fn start(&self, _request: &CaptureRequest) -> PlaypenResult<CaptureStream> {
            Ok(CaptureStream {
                api: self.0,
                track_count: 1,
            })
        }
    }

    #[test]
    fn process_globals_are_single_instances() {
        assert!(std::ptr::eq(CaptureGuard::global(), CaptureGuard::global()));
        assert!(std::ptr::eq(CapturePlatform::global(), CapturePlatform::global()));
    }

    fn platform_with_all_apis() -> CapturePlatform {
        let platform = CapturePlatform::new();
        for api in CaptureApi::ALL {
            platform.expose(api, Arc::new(RecordingBackend(api)));
        }
        platform
    }

    fn video() -> CaptureRequest {
        CaptureRequest {
            video: true,
            audio: false,
        }
    }

    #[test]
    fn unguarded_platform_captures() {
        let platform = platform_with_all_apis();
        assert!(platform.get_display_media(&video()).is_ok());
        assert!(platform.tab_capture().is_some());
    }

    #[test]
    fn display_media_rejects_after_install() {
        let platform = platform_with_all_apis();
        let guard = CaptureGuard::new();
        guard.install(&platform);

        let result = platform.get_display_media(&video());
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "capture.not_allowed");
        }
        assert_eq!(guard.status().blocked_attempts, 1);
    }

    #[test]
    fn property_entry_points_read_as_absent() {
        let platform = platform_with_all_apis();
        let guard = CaptureGuard::new();
        guard.install(&platform);

        assert!(platform.tab_capture().is_none());
        assert!(platform.desktop_capture().is_none());
        assert_eq!(guard.status().blocked_attempts, 2);
    }

    #[test]
    fn install_is_idempotent() {
        let platform = platform_with_all_apis();
        let guard = CaptureGuard::new();
        let first = guard.install(&platform);
        let second = guard.install(&platform);

        assert_eq!(first.intercepted, second.intercepted);
        assert_eq!(second.install_count, 2);
        assert!(platform.get_display_media(&video()).is_err());
        // One override, not a chain: a single call counts once.
        assert_eq!(guard.status().blocked_attempts, 1);
    }

    #[test]
    fn absent_entry_points_are_skipped_without_error() {
        let platform = CapturePlatform::new();
        platform.expose(CaptureApi::DisplayMedia, Arc::new(RecordingBackend(CaptureApi::DisplayMedia)));
        let guard = CaptureGuard::new();
        let status = guard.install(&platform);

        assert!(status.installed);
        assert!(status.is_intercepted(CaptureApi::DisplayMedia));
        assert!(!status.is_intercepted(CaptureApi::TabCapture));
        assert!(!platform.is_present(CaptureApi::TabCapture));
    }

    #[test]
    fn visibility_reinstall_counters_restored_entry_points() {
        let platform = platform_with_all_apis();
        let guard = CaptureGuard::new();
        guard.install(&platform);

        platform.expose(CaptureApi::DisplayMedia, Arc::new(RecordingBackend(CaptureApi::DisplayMedia)));
        assert!(platform.get_display_media(&video()).is_ok());

        guard.on_visibility_change(&platform, Visibility::Hidden);
        assert!(!platform.is_blocked(CaptureApi::DisplayMedia));

        guard.on_visibility_change(&platform, Visibility::Visible);
        assert!(platform.is_blocked(CaptureApi::DisplayMedia));
        assert!(platform.get_display_media(&video()).is_err());
    }
}
