//! The player: one isolation boundary, its monitor and its lifecycle.

use crate::EmbedSettings;
use crate::boundary::BoundaryAttributes;
use crate::boundary::BoundarySource;
use crate::boundary::IsolationBoundary;
use crate::monitor::MonitorConfig;
use crate::monitor::MonitorStats;
use crate::monitor::RedirectCheck;
use crate::monitor::SecurityMonitor;
use crate::viewport::ViewportSize;
use pp_content::ContentDescriptor;
use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use pp_ipc::BoundaryMessage;
use pp_ipc::MessageBus;
use pp_privacy::EXTERNAL_WINDOW_FEATURES;
use pp_privacy::ReferrerPolicy;
use pp_security::ExpectedOrigin;
use pp_security::Presentation;
use pp_security::capability::allow_attribute;
use std::time::Instant;

/// Why a surface stopped hosting its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    LoadFailed(String),
    BoundaryError(String),
    /// The boundary could not be created or its monitor could not attach.
    SetupFailed(String),
    /// Repeated redirects away from the content with nowhere safe to return.
    UnsafeNavigation(String),
}

impl BlockReason {
    pub fn describe(&self) -> &str {
        match self {
            Self::LoadFailed(detail)
            | Self::BoundaryError(detail)
            | Self::SetupFailed(detail)
            | Self::UnsafeNavigation(detail) => detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceState {
    Idle,
    Loading,
    Ready,
    Blocked(BlockReason),
    Disposed,
}

impl SurfaceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Blocked(_) => "blocked",
            Self::Disposed => "disposed",
        }
    }
}

/// Signals for the owner of a surface, drained with
/// [`EmbedSurface::take_events`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    StateChanged(SurfaceState),
    /// The content navigated outside its origin but has not yet crossed the
    /// restoration threshold.
    RedirectSuspected { destination: String, attempts: u32 },
    /// User-visible warning: a redirect was undone.
    RedirectBlocked { blocked: String, restored_to: String },
    /// A message from a trusted origin.
    Message(BoundaryMessage),
}

/// Static view shown in place of a blocked boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub title: String,
    pub reason: BlockReason,
    /// Whether the "open in a new window" control is offered.
    pub can_open_externally: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalTarget {
    Url(String),
    Document(String),
}

/// Request to show the content in a new top-level context, outside the
/// sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalOpenRequest {
    pub target: ExternalTarget,
    pub features: &'static str,
    pub referrer_policy: ReferrerPolicy,
}

/// Owns exactly one isolation boundary and the monitor attached to it.
///
/// `Idle -> Loading -> (Ready | Blocked) -> Disposed`. Resources are
/// released when the surface is blocked, disposed or dropped.
pub struct EmbedSurface {
    title: String,
    descriptor: ContentDescriptor,
    source: BoundarySource,
    presentation: Presentation,
    settings: EmbedSettings,
    viewport: ViewportSize,
    state: SurfaceState,
    boundary: Option<Box<dyn IsolationBoundary>>,
    monitor: Option<SecurityMonitor>,
    last_stats: MonitorStats,
    events: Vec<SurfaceEvent>,
}

impl std::fmt::Debug for EmbedSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedSurface")
            .field("title", &self.title)
            .field("render_mode", &self.descriptor.render_mode)
            .field("presentation", &self.presentation)
            .field("state", &self.state)
            .field("mounted", &self.boundary.is_some())
            .finish()
    }
}

impl EmbedSurface {
    pub fn new(
        title: impl Into<String>,
        descriptor: ContentDescriptor,
        presentation: Presentation,
        settings: EmbedSettings,
    ) -> Self {
        let source = BoundarySource::from_descriptor(&descriptor);
        Self {
            title: title.into(),
            descriptor,
            source,
            presentation,
            settings,
            viewport: ViewportSize::default(),
            state: SurfaceState::Idle,
            boundary: None,
            monitor: None,
            last_stats: MonitorStats::default(),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &SurfaceState {
        &self.state
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn descriptor(&self) -> &ContentDescriptor {
        &self.descriptor
    }

    pub fn presentation(&self) -> Presentation {
        self.presentation
    }

    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    pub fn is_mounted(&self) -> bool {
        self.boundary.is_some()
    }

    /// Counters of the current monitor, or of the last one if released.
    pub fn monitor_stats(&self) -> MonitorStats {
        self.monitor
            .as_ref()
            .map_or(self.last_stats, SecurityMonitor::stats)
    }

    /// Attribute set the boundary is created with.
    pub fn attributes(&self) -> BoundaryAttributes {
        let sandbox = &self.settings.sandbox;
        BoundaryAttributes {
            title: self.title.clone(),
            sandbox: sandbox.capabilities_for(self.presentation).to_attribute(),
            allow: allow_attribute(&sandbox.allowances_for(self.presentation)),
            referrer_policy: self.settings.privacy.embed_referrer,
            allow_fullscreen: self.presentation == Presentation::Fullscreen,
        }
    }

    /// Creates the boundary, attaches its monitor and starts loading.
    ///
    /// On a setup failure every acquired resource is released, the surface
    /// is left `Blocked` and the error is returned.
    pub fn mount(
        &mut self,
        mut boundary: Box<dyn IsolationBoundary>,
        bus: &MessageBus,
        now: Instant,
    ) -> PlaypenResult<()> {
        if self.state != SurfaceState::Idle {
            return Err(PlaypenError::new(
                "embed.already_mounted",
                format!("surface is {} and cannot be mounted again", self.state.as_str()),
            ));
        }

        self.transition(SurfaceState::Loading);

        if let BoundarySource::Url(url) = &self.source {
            if let Err(error) = self.settings.sandbox.check_destination(url) {
                self.block(BlockReason::SetupFailed(error.to_string()));
                return Err(error);
            }
        }

        let config = MonitorConfig {
            poll_interval: self.settings.poll_interval,
            redirect_threshold: self.settings.redirect_threshold,
            expected_origin: self.expected_origin(),
        };
        let mut monitor = match SecurityMonitor::attach(
            config,
            self.settings.allowlist.clone(),
            self.settings.sandbox.clone(),
            bus,
            self.source.initial_destination(),
            now,
        ) {
            Ok(monitor) => monitor,
            Err(error) => {
                self.block(BlockReason::SetupFailed(error.to_string()));
                return Err(error);
            }
        };

        if let Err(error) = boundary.instantiate(&self.attributes(), &self.source) {
            monitor.release();
            boundary.teardown();
            self.last_stats = monitor.stats();
            self.block(BlockReason::SetupFailed(error.to_string()));
            return Err(error);
        }

        tracing::debug!(
            title = %self.title,
            render_mode = self.descriptor.render_mode.as_str(),
            "boundary instantiated"
        );
        self.boundary = Some(boundary);
        self.monitor = Some(monitor);
        Ok(())
    }

    pub fn on_first_paint(&mut self) {
        if self.state == SurfaceState::Loading {
            self.transition(SurfaceState::Ready);
        }
    }

    pub fn on_load_error(&mut self, detail: impl Into<String>) {
        self.fail(BlockReason::LoadFailed(detail.into()));
    }

    pub fn on_boundary_error(&mut self, detail: impl Into<String>) {
        self.fail(BlockReason::BoundaryError(detail.into()));
    }

    /// Drives the monitor; call from the host event loop.
    pub fn poll(&mut self, now: Instant) {
        let (Some(monitor), Some(boundary)) = (self.monitor.as_mut(), self.boundary.as_mut()) else {
            return;
        };
        let report = monitor.poll(now, boundary.as_mut());

        match report.redirect {
            Some(RedirectCheck::Suspicious {
                destination,
                attempts,
            }) => self.events.push(SurfaceEvent::RedirectSuspected {
                destination,
                attempts,
            }),
            Some(RedirectCheck::Restored {
                blocked,
                restored_to,
            }) => self.events.push(SurfaceEvent::RedirectBlocked {
                blocked,
                restored_to,
            }),
            Some(RedirectCheck::NoSafeDestination { blocked }) => {
                self.fail(BlockReason::UnsafeNavigation(format!(
                    "content kept navigating away to {blocked}"
                )));
            }
            _ => {}
        }

        self.events
            .extend(report.accepted.into_iter().map(SurfaceEvent::Message));
    }

    /// Rewrites the boundary's destination through the monitor's scheme
    /// guard.
    pub fn set_destination(&mut self, destination: &str) -> PlaypenResult<()> {
        let (Some(monitor), Some(boundary)) = (self.monitor.as_mut(), self.boundary.as_mut()) else {
            return Err(PlaypenError::new(
                "embed.not_mounted",
                "surface has no live boundary",
            ));
        };
        monitor.guard_rewrite(destination)?;
        boundary.navigate(destination);
        Ok(())
    }

    pub fn resize(&mut self, dx: i32, dy: i32) {
        self.viewport = self.viewport.resized(dx, dy);
    }

    /// The fallback view, present only while blocked.
    pub fn fallback(&self) -> Option<Fallback> {
        let SurfaceState::Blocked(reason) = &self.state else {
            return None;
        };
        Some(Fallback {
            title: self.title.clone(),
            reason: reason.clone(),
            can_open_externally: self.external_target().is_ok(),
        })
    }

    /// Builds the escape hatch request. Only available while blocked; the
    /// caller acts on it only after an explicit user action.
    pub fn open_externally(&self) -> PlaypenResult<ExternalOpenRequest> {
        if !matches!(self.state, SurfaceState::Blocked(_)) {
            return Err(PlaypenError::new(
                "embed.not_blocked",
                "content can only be opened externally from the fallback view",
            ));
        }

        let target = self.external_target()?;
        tracing::info!(title = %self.title, "opening content outside the sandbox");
        Ok(ExternalOpenRequest {
            target,
            features: EXTERNAL_WINDOW_FEATURES,
            referrer_policy: ReferrerPolicy::NoReferrer,
        })
    }

    pub fn take_events(&mut self) -> Vec<SurfaceEvent> {
        std::mem::take(&mut self.events)
    }

    /// Releases the monitor and tears down the boundary. Idempotent.
    pub fn dispose(&mut self) {
        if self.state == SurfaceState::Disposed {
            return;
        }
        self.release();
        self.transition(SurfaceState::Disposed);
    }

    fn expected_origin(&self) -> Option<ExpectedOrigin> {
        match &self.source {
            BoundarySource::Url(url) if self.settings.pin_remote_origin => {
                ExpectedOrigin::of_destination(url)
            }
            _ => None,
        }
    }

    fn external_target(&self) -> PlaypenResult<ExternalTarget> {
        if !self.settings.privacy.open_external_without_opener {
            return Err(PlaypenError::new(
                "privacy.opener_required_off",
                "external windows must be opened without an opener",
            ));
        }
        match &self.source {
            BoundarySource::Document(document) => Ok(ExternalTarget::Document(document.clone())),
            BoundarySource::Url(url) => {
                self.settings.sandbox.check_destination(url)?;
                Ok(ExternalTarget::Url(url.clone()))
            }
        }
    }

    fn fail(&mut self, reason: BlockReason) {
        if matches!(self.state, SurfaceState::Loading | SurfaceState::Ready) {
            tracing::warn!(title = %self.title, reason = reason.describe(), "embedded content blocked");
            self.block(reason);
        }
    }

    fn block(&mut self, reason: BlockReason) {
        self.release();
        self.transition(SurfaceState::Blocked(reason));
    }

    fn release(&mut self) {
        if let Some(mut monitor) = self.monitor.take() {
            monitor.release();
            self.last_stats = monitor.stats();
        }
        if let Some(mut boundary) = self.boundary.take() {
            boundary.teardown();
        }
    }

    fn transition(&mut self, next: SurfaceState) {
        if self.state == next {
            return;
        }
        tracing::debug!(title = %self.title, from = self.state.as_str(), to = next.as_str(), "surface state");
        self.state = next.clone();
        self.events.push(SurfaceEvent::StateChanged(next));
    }
}

impl Drop for EmbedSurface {
    fn drop(&mut self) {
        self.dispose();
    }
}
