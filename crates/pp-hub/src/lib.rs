//! Hub coordinator: ties the tab session to embed lifecycles, the message
//! bus and the process capture guard.

pub mod config;
pub mod telemetry;

use pp_capture::CaptureGuard;
use pp_capture::CaptureGuardStatus;
use pp_capture::CapturePlatform;
use pp_capture::Visibility;
use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use pp_embed::EmbedSurface;
use pp_embed::ExternalOpenRequest;
use pp_embed::IsolationBoundary;
use pp_embed::SurfaceEvent;
use pp_ipc::MessageBus;
use pp_security::Presentation;
use pp_session::ContentRef;
use pp_session::TabId;
use pp_session::TabSessionManager;
use pp_storage::FileStore;
use pp_storage::MemoryStorage;
use pp_storage::SessionStorage;
use pp_storage::StorageConfig;
use pp_storage::StorageManager;
use std::time::Instant;

pub use config::HubConfig;
pub use config::LogFormat;

const SESSION_NAMESPACE: &str = "tabs";

/// Source of raw stored content per playable item.
pub trait ContentCatalog {
    fn raw_content(&self, item: &ContentRef) -> Option<String>;
}

/// Signed-in user, used only to attribute log output.
pub trait IdentitySource {
    fn current_user(&self) -> Option<String>;
}

/// Creates platform isolation boundaries.
pub trait BoundaryFactory {
    fn create_boundary(
        &mut self,
        tab_id: &TabId,
        presentation: Presentation,
    ) -> PlaypenResult<Box<dyn IsolationBoundary>>;
}

/// Identity source for sessions without a signed-in user.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl IdentitySource for Anonymous {
    fn current_user(&self) -> Option<String> {
        None
    }
}

/// Backing store of the tab session.
#[derive(Debug, Clone)]
pub enum SessionStore {
    File(FileStore),
    Memory(MemoryStorage),
}

impl SessionStore {
    /// Durable store under `config.storage_dir`, or memory when ephemeral or
    /// when the durable store cannot be opened.
    pub fn for_config(config: &HubConfig) -> Self {
        let manager = StorageManager::new(StorageConfig {
            ephemeral_mode: config.ephemeral,
        })
        .with_persistent_root(config.storage_dir.clone());

        match manager.open(SESSION_NAMESPACE) {
            Ok(store) => Self::File(store),
            Err(error) => {
                if !error.is_in("storage.persistence_disabled") {
                    tracing::warn!(%error, "falling back to in-memory tab session");
                }
                Self::Memory(MemoryStorage::new())
            }
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, Self::File(_))
    }
}

impl SessionStorage for SessionStore {
    fn get_item(&self, key: &str) -> PlaypenResult<Option<String>> {
        match self {
            Self::File(store) => store.get_item(key),
            Self::Memory(store) => store.get_item(key),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> PlaypenResult<()> {
        match self {
            Self::File(store) => store.set_item(key, value),
            Self::Memory(store) => store.set_item(key, value),
        }
    }

    fn remove_item(&self, key: &str) -> PlaypenResult<()> {
        match self {
            Self::File(store) => store.remove_item(key),
            Self::Memory(store) => store.remove_item(key),
        }
    }
}

/// What an embed is built for. A surface is rebuilt only when this changes.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EmbedKey {
    tab_id: TabId,
    content_ref: ContentRef,
    presentation: Presentation,
}

/// The one live embed.
#[derive(Debug)]
struct ActiveEmbed {
    key: EmbedKey,
    surface: EmbedSurface,
}

/// Startup summary for the shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubSummary {
    pub tabs: usize,
    pub durable_session: bool,
    pub capture_guard_installed: bool,
}

/// Top-level orchestration object.
pub struct Hub<C, I, F> {
    config: HubConfig,
    session: TabSessionManager<SessionStore>,
    bus: MessageBus,
    catalog: C,
    identity: I,
    factory: F,
    embed: Option<ActiveEmbed>,
    /// Foreground content that produced no surface last time.
    unplayable: Option<EmbedKey>,
}

impl<C, I, F> std::fmt::Debug for Hub<C, I, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("config", &self.config)
            .field("session", &self.session)
            .field("embed", &self.embed)
            .field("unplayable", &self.unplayable)
            .finish_non_exhaustive()
    }
}

impl<C, I, F> Hub<C, I, F>
where
    C: ContentCatalog,
    I: IdentitySource,
    F: BoundaryFactory,
{
    /// Validates policies, installs the capture guard and restores the tab
    /// session from the configured store.
    pub fn new(config: HubConfig, catalog: C, identity: I, factory: F) -> PlaypenResult<Self> {
        let store = SessionStore::for_config(&config);
        Self::with_store(config, store, catalog, identity, factory)
    }

    pub fn with_store(
        config: HubConfig,
        store: SessionStore,
        catalog: C,
        identity: I,
        factory: F,
    ) -> PlaypenResult<Self> {
        config.validate()?;

        let status = pp_capture::install_process_guard();
        tracing::info!(
            install_count = status.install_count,
            blocked_attempts = status.blocked_attempts,
            "capture guard active"
        );

        Ok(Self {
            session: TabSessionManager::rehydrate(store),
            bus: MessageBus::hardened()?,
            config,
            catalog,
            identity,
            factory,
            embed: None,
            unplayable: None,
        })
    }

    pub fn summary(&self) -> HubSummary {
        HubSummary {
            tabs: self.session.tabs().len(),
            durable_session: self.session.storage().is_durable(),
            capture_guard_installed: self.capture_status().installed,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn session(&self) -> &TabSessionManager<SessionStore> {
        &self.session
    }

    /// Mutable session access; follow mutations with [`Hub::sync_embeds`].
    pub fn session_mut(&mut self) -> &mut TabSessionManager<SessionStore> {
        &mut self.session
    }

    /// Target for messages posted by embedded content.
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn active_surface(&self) -> Option<&EmbedSurface> {
        self.embed.as_ref().map(|embed| &embed.surface)
    }

    /// Surface hosting `tab_id`, if that tab currently has one.
    pub fn surface_for(&mut self, tab_id: &TabId) -> Option<&mut EmbedSurface> {
        self.embed
            .as_mut()
            .filter(|embed| &embed.key.tab_id == tab_id)
            .map(|embed| &mut embed.surface)
    }

    pub fn capture_status(&self) -> CaptureGuardStatus {
        CaptureGuard::global().status()
    }

    pub fn on_visibility_change(&self, visibility: Visibility) {
        CaptureGuard::global().on_visibility_change(CapturePlatform::global(), visibility);
    }

    /// Brings the live embed in line with the foreground tab.
    ///
    /// At most one surface exists: the one for the foreground tab when it
    /// hosts embedded content. Leaving that tab, closing it, changing its
    /// content or toggling fullscreen disposes the old surface first.
    /// Content that could not be embedded is not retried while it stays in
    /// the foreground unchanged.
    pub fn sync_embeds(&mut self, now: Instant) {
        let user = self.user_label();
        let span = tracing::debug_span!("sync_embeds", user = %user);
        let _entered = span.enter();

        let active = self.session.active_tab();
        let presentation = if self.session.is_fullscreen() {
            Presentation::Fullscreen
        } else {
            Presentation::Windowed
        };
        let wanted = active.kind.content_ref().map(|content_ref| {
            let key = EmbedKey {
                tab_id: active.id.clone(),
                content_ref: content_ref.clone(),
                presentation,
            };
            (key, active.title.clone())
        });

        if let Some((key, _)) = &wanted {
            let live = self.embed.as_ref().is_some_and(|embed| &embed.key == key);
            if live || self.unplayable.as_ref() == Some(key) {
                return;
            }
        }

        if let Some(mut stale) = self.embed.take() {
            tracing::debug!(tab_id = %stale.key.tab_id, "disposing embed");
            stale.surface.dispose();
        }
        self.unplayable = None;

        let Some((key, title)) = wanted else {
            return;
        };
        match self.build_surface(&key, title, now) {
            Some(surface) => self.embed = Some(ActiveEmbed { key, surface }),
            None => self.unplayable = Some(key),
        }
    }

    /// Drives the live surface's monitor and drains its events.
    pub fn poll(&mut self, now: Instant) -> Vec<SurfaceEvent> {
        let Some(embed) = self.embed.as_mut() else {
            return Vec::new();
        };
        embed.surface.poll(now);
        let events = embed.surface.take_events();
        for event in &events {
            if let SurfaceEvent::RedirectBlocked {
                blocked,
                restored_to,
            } = event
            {
                tracing::warn!(
                    tab_id = %embed.key.tab_id,
                    destination = %blocked,
                    restored_to = %restored_to,
                    "suspicious redirect undone"
                );
            }
        }
        events
    }

    /// Escape hatch for the live surface; see
    /// [`EmbedSurface::open_externally`].
    pub fn open_externally(&self) -> PlaypenResult<ExternalOpenRequest> {
        self.active_surface()
            .ok_or_else(|| PlaypenError::new("embed.not_mounted", "no content is embedded"))?
            .open_externally()
    }

    /// Disposes the live embed.
    pub fn shutdown(&mut self) {
        if let Some(mut embed) = self.embed.take() {
            embed.surface.dispose();
        }
    }

    fn build_surface(&mut self, key: &EmbedKey, title: String, now: Instant) -> Option<EmbedSurface> {
        let EmbedKey {
            tab_id,
            content_ref,
            presentation,
        } = key;
        let Some(raw) = self.catalog.raw_content(content_ref) else {
            tracing::warn!(tab_id = %tab_id, content = %content_ref, "content item not found; nothing to play");
            return None;
        };
        let descriptor = match pp_content::resolve(&raw) {
            Ok(descriptor) => descriptor,
            Err(error) => {
                tracing::warn!(tab_id = %tab_id, content = %content_ref, %error, "content item is unplayable");
                return None;
            }
        };

        let mut surface =
            EmbedSurface::new(title, descriptor, *presentation, self.config.embed.clone());
        match self.factory.create_boundary(tab_id, *presentation) {
            Ok(boundary) => {
                if let Err(error) = surface.mount(boundary, &self.bus, now) {
                    tracing::warn!(tab_id = %tab_id, %error, "embed could not be mounted");
                }
            }
            Err(error) => {
                tracing::warn!(tab_id = %tab_id, %error, "no isolation boundary available");
                return None;
            }
        }

        tracing::info!(
            tab_id = %tab_id,
            content = %content_ref,
            render_mode = surface.descriptor().render_mode.as_str(),
            state = surface.state().as_str(),
            "embed created"
        );
        Some(surface)
    }

    fn user_label(&self) -> String {
        self.identity
            .current_user()
            .unwrap_or_else(|| "anonymous".to_owned())
    }
}
