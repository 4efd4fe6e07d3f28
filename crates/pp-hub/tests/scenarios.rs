//! End-to-end behaviour of the hub with a scripted platform.

use pp_capture::CaptureApi;
use pp_capture::CaptureBackend;
use pp_capture::CapturePlatform;
use pp_capture::CaptureRequest;
use pp_capture::CaptureStream;
use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use pp_embed::BlockReason;
use pp_embed::BoundaryAttributes;
use pp_embed::BoundarySource;
use pp_embed::DestinationRead;
use pp_embed::ExternalTarget;
use pp_embed::IsolationBoundary;
use pp_embed::SurfaceEvent;
use pp_embed::SurfaceState;
use pp_hub::BoundaryFactory;
use pp_hub::ContentCatalog;
use pp_hub::Hub;
use pp_hub::HubConfig;
use pp_hub::IdentitySource;
use pp_hub::SessionStore;
use pp_ipc::BoundaryMessage;
use pp_security::Presentation;
use pp_session::ContentRef;
use pp_session::TabId;
use pp_session::TabKind;
use pp_storage::MemoryStorage;
use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

const INLINE_GAME: &str = "<!DOCTYPE html><html><head><title>Snake</title></head><body><canvas></canvas></body></html>";
const REMOTE_GAME: &str = "https://example.com/game";

#[derive(Debug, Default)]
struct Catalog {
    items: HashMap<String, String>,
    lookups: Rc<Cell<usize>>,
}

impl Catalog {
    fn with(items: &[(&str, &str)]) -> Self {
        Self {
            items: items
                .iter()
                .map(|(id, raw)| ((*id).to_owned(), (*raw).to_owned()))
                .collect(),
            lookups: Rc::default(),
        }
    }
}

impl ContentCatalog for Catalog {
    fn raw_content(&self, item: &ContentRef) -> Option<String> {
        self.lookups.set(self.lookups.get() + 1);
        self.items.get(item.as_str()).cloned()
    }
}

struct Player(&'static str);

impl IdentitySource for Player {
    fn current_user(&self) -> Option<String> {
        Some(self.0.to_owned())
    }
}

#[derive(Debug, Default)]
struct FrameRecord {
    tab_id: Option<TabId>,
    presentation: Option<Presentation>,
    attributes: Option<BoundaryAttributes>,
    source: Option<BoundarySource>,
    torn_down: bool,
}

type Frames = Rc<RefCell<Vec<Rc<RefCell<FrameRecord>>>>>;

/// Frames that honour isolation: their destination is never readable.
struct IsolatedFrame {
    record: Rc<RefCell<FrameRecord>>,
}

impl IsolationBoundary for IsolatedFrame {
    fn instantiate(
        &mut self,
        attributes: &BoundaryAttributes,
        source: &BoundarySource,
    ) -> PlaypenResult<()> {
        let mut record = self.record.borrow_mut();
        record.attributes = Some(attributes.clone());
        record.source = Some(source.clone());
        Ok(())
    }

    fn current_destination(&self) -> DestinationRead {
        DestinationRead::Isolated
    }

    fn navigate(&mut self, _destination: &str) {}

    fn teardown(&mut self) {
        self.record.borrow_mut().torn_down = true;
    }
}

#[derive(Default)]
struct Factory {
    frames: Frames,
}

impl BoundaryFactory for Factory {
    fn create_boundary(
        &mut self,
        tab_id: &TabId,
        presentation: Presentation,
    ) -> PlaypenResult<Box<dyn IsolationBoundary>> {
        let record = Rc::new(RefCell::new(FrameRecord {
            tab_id: Some(tab_id.clone()),
            presentation: Some(presentation),
            ..FrameRecord::default()
        }));
        self.frames.borrow_mut().push(Rc::clone(&record));
        Ok(Box::new(IsolatedFrame { record }))
    }
}

#[derive(Default)]
struct NoFrames {
    attempts: Rc<Cell<usize>>,
}

impl BoundaryFactory for NoFrames {
    fn create_boundary(
        &mut self,
        _tab_id: &TabId,
        _presentation: Presentation,
    ) -> PlaypenResult<Box<dyn IsolationBoundary>> {
        self.attempts.set(self.attempts.get() + 1);
        Err(PlaypenError::new("embed.unsupported", "headless"))
    }
}

fn hub(catalog: Catalog) -> (Hub<Catalog, Player, Factory>, Frames) {
    let factory = Factory::default();
    let frames = Rc::clone(&factory.frames);
    let hub = Hub::with_store(
        HubConfig::default(),
        SessionStore::Memory(MemoryStorage::new()),
        catalog,
        Player("ada"),
        factory,
    )
    .unwrap_or_else(|_| unreachable!());
    (hub, frames)
}

#[test]
fn inline_document_content_reaches_ready() {
    let (mut hub, frames) = hub(Catalog::with(&[("snake", INLINE_GAME)]));
    let tab = hub
        .session_mut()
        .open_content_in_new_tab(ContentRef::new("snake"), "Snake");
    hub.sync_embeds(Instant::now());

    let surface = hub.surface_for(&tab).unwrap_or_else(|| unreachable!());
    assert!(surface.descriptor().is_inline());
    assert_eq!(surface.state(), &SurfaceState::Loading);
    surface.on_first_paint();
    assert_eq!(surface.state(), &SurfaceState::Ready);

    let frames = frames.borrow();
    assert_eq!(frames.len(), 1);
    assert!(matches!(
        frames[0].borrow().source,
        Some(BoundarySource::Document(ref doc)) if doc == INLINE_GAME
    ));
}

#[test]
fn remote_content_load_error_shows_escape_hatch() {
    let (mut hub, frames) = hub(Catalog::with(&[("pong", REMOTE_GAME)]));
    let tab = hub
        .session_mut()
        .open_content_in_new_tab(ContentRef::new("pong"), "Pong");
    hub.sync_embeds(Instant::now());

    let surface = hub.surface_for(&tab).unwrap_or_else(|| unreachable!());
    assert!(!surface.descriptor().is_inline());
    surface.on_load_error("refused to connect");
    assert!(matches!(
        surface.state(),
        SurfaceState::Blocked(BlockReason::LoadFailed(_))
    ));
    assert!(surface.fallback().is_some_and(|fallback| fallback.can_open_externally));

    let request = hub.open_externally().unwrap_or_else(|_| unreachable!());
    assert_eq!(request.target, ExternalTarget::Url(REMOTE_GAME.to_owned()));
    assert_eq!(request.features, "noopener,noreferrer");
    assert!(frames.borrow()[0].borrow().torn_down);
    assert_eq!(hub.bus().listener_count(), 0);

    // A blocked surface is kept, not retried.
    hub.sync_embeds(Instant::now());
    assert_eq!(frames.borrow().len(), 1);
}

#[test]
fn closing_the_middle_of_three_tabs() {
    let (mut hub, _frames) = hub(Catalog::default());
    let session = hub.session_mut();
    let first = session.active_id().clone();
    let middle = session.open_tab(TabKind::ListView);
    let last = session.open_tab(TabKind::DetailView);
    assert!(session.focus_tab(&middle).is_ok());

    assert_eq!(session.close_tab(&middle), Ok(true));
    let ids: Vec<_> = session.tabs().iter().map(|tab| tab.id.clone()).collect();
    assert_eq!(ids, vec![first, last.clone()]);
    assert_eq!(session.active_id(), &last);
}

#[derive(Debug)]
struct RealScreen;

impl CaptureBackend for RealScreen {
    fn start(&self, _request: &CaptureRequest) -> PlaypenResult<CaptureStream> {
        Ok(CaptureStream {
            api: CaptureApi::DisplayMedia,
            track_count: 1,
        })
    }
}

#[test]
fn display_capture_is_rejected_after_startup() {
    let platform = CapturePlatform::global();
    platform.expose(CaptureApi::DisplayMedia, Arc::new(RealScreen));
    platform.expose(CaptureApi::TabCapture, Arc::new(RealScreen));

    let (hub, _frames) = hub(Catalog::default());
    let request = CaptureRequest {
        video: true,
        audio: true,
    };

    let result = platform.get_display_media(&request);
    assert_eq!(result.err().map(|error| error.code), Some("capture.not_allowed"));
    assert!(platform.tab_capture().is_none());

    let status = hub.capture_status();
    assert!(status.installed);
    assert!(status.blocked_attempts >= 2);
}

#[test]
fn backgrounding_the_tab_disposes_its_embed() {
    let (mut hub, frames) = hub(Catalog::with(&[("snake", REMOTE_GAME)]));
    let home = hub.session().active_id().clone();
    hub.session_mut()
        .open_content_in_new_tab(ContentRef::new("snake"), "Snake");
    hub.sync_embeds(Instant::now());
    assert!(hub.active_surface().is_some());
    assert_eq!(hub.bus().listener_count(), 1);

    assert!(hub.session_mut().focus_tab(&home).is_ok());
    hub.sync_embeds(Instant::now());

    assert!(hub.active_surface().is_none());
    assert!(frames.borrow()[0].borrow().torn_down);
    assert_eq!(hub.bus().listener_count(), 0);
}

#[test]
fn closing_the_embedded_tab_disposes_its_embed() {
    let (mut hub, frames) = hub(Catalog::with(&[("snake", REMOTE_GAME)]));
    let tab = hub
        .session_mut()
        .open_content_in_new_tab(ContentRef::new("snake"), "Snake");
    hub.sync_embeds(Instant::now());

    assert_eq!(hub.session_mut().close_tab(&tab), Ok(true));
    hub.sync_embeds(Instant::now());

    assert!(hub.active_surface().is_none());
    assert!(frames.borrow()[0].borrow().torn_down);
}

#[test]
fn fullscreen_toggle_rebuilds_with_wider_capabilities() {
    let (mut hub, frames) = hub(Catalog::with(&[("snake", REMOTE_GAME)]));
    hub.session_mut()
        .open_content_in_new_tab(ContentRef::new("snake"), "Snake");
    hub.sync_embeds(Instant::now());

    hub.session_mut().toggle_fullscreen();
    hub.sync_embeds(Instant::now());

    let frames = frames.borrow();
    assert_eq!(frames.len(), 2);
    assert!(frames[0].borrow().torn_down);
    let fullscreen = frames[1].borrow();
    assert_eq!(fullscreen.presentation, Some(Presentation::Fullscreen));
    let attributes = fullscreen.attributes.clone().unwrap_or_else(|| unreachable!());
    assert!(attributes.sandbox.contains("allow-presentation"));
    assert!(attributes.allow_fullscreen);
    assert!(!attributes.sandbox.contains("allow-top-navigation"));
    assert_eq!(
        hub.active_surface().map(|surface| surface.presentation()),
        Some(Presentation::Fullscreen)
    );
}

#[test]
fn rebuilding_targets_the_foreground_tab() {
    let (mut hub, frames) = hub(Catalog::with(&[("a", REMOTE_GAME), ("b", INLINE_GAME)]));
    hub.session_mut()
        .open_content_in_new_tab(ContentRef::new("a"), "A");
    let second = hub
        .session_mut()
        .open_content_in_new_tab(ContentRef::new("b"), "B");
    hub.sync_embeds(Instant::now());

    let frames = frames.borrow();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].borrow().tab_id.as_ref(), Some(&second));
}

#[test]
fn unplayable_content_yields_no_surface() {
    let catalog = Catalog::with(&[("blank", "   ")]);
    let lookups = Rc::clone(&catalog.lookups);
    let (mut hub, frames) = hub(catalog);
    let blank = hub
        .session_mut()
        .open_content_in_new_tab(ContentRef::new("blank"), "Blank");
    hub.sync_embeds(Instant::now());
    hub.sync_embeds(Instant::now());
    assert!(hub.active_surface().is_none());
    assert_eq!(lookups.get(), 1);

    hub.session_mut()
        .open_content_in_new_tab(ContentRef::new("missing"), "Missing");
    hub.sync_embeds(Instant::now());
    assert!(hub.active_surface().is_none());
    assert!(frames.borrow().is_empty());
    assert_eq!(lookups.get(), 2);

    assert!(hub.session_mut().focus_tab(&blank).is_ok());
    hub.sync_embeds(Instant::now());
    assert_eq!(lookups.get(), 3);
}

#[test]
fn missing_platform_boundary_yields_no_surface() {
    let factory = NoFrames::default();
    let attempts = Rc::clone(&factory.attempts);
    let mut hub = Hub::with_store(
        HubConfig::default(),
        SessionStore::Memory(MemoryStorage::new()),
        Catalog::with(&[("snake", REMOTE_GAME)]),
        Player("ada"),
        factory,
    )
    .unwrap_or_else(|_| unreachable!());
    hub.session_mut()
        .open_content_in_new_tab(ContentRef::new("snake"), "Snake");
    hub.sync_embeds(Instant::now());
    hub.sync_embeds(Instant::now());
    assert!(hub.active_surface().is_none());
    assert_eq!(hub.bus().listener_count(), 0);
    assert_eq!(attempts.get(), 1);

    hub.session_mut().toggle_fullscreen();
    hub.sync_embeds(Instant::now());
    assert_eq!(attempts.get(), 2);
}

#[test]
fn only_trusted_messages_reach_the_owner() {
    let (mut hub, _frames) = hub(Catalog::with(&[("snake", REMOTE_GAME)]));
    hub.session_mut()
        .open_content_in_new_tab(ContentRef::new("snake"), "Snake");
    let start = Instant::now();
    hub.sync_embeds(start);
    hub.poll(start);

    assert!(hub
        .bus()
        .post(BoundaryMessage::new("https://example.com", "grant-admin"))
        .is_ok());
    assert!(hub
        .bus()
        .post(BoundaryMessage::new("https://playpen.app", "achievement:first-apple"))
        .is_ok());

    let events = hub.poll(start + Duration::from_secs(1));
    let messages: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            SurfaceEvent::Message(message) => Some(message.origin.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(messages, vec!["https://playpen.app"]);
    assert_eq!(
        hub.active_surface()
            .map(|surface| surface.monitor_stats().messages_rejected),
        Some(1)
    );
}

#[test]
fn session_survives_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let config = HubConfig {
        storage_dir: dir.path().to_path_buf(),
        ..HubConfig::default()
    };

    let (tabs, active) = {
        let mut hub = Hub::new(config.clone(), Catalog::default(), Player("ada"), Factory::default())
            .unwrap_or_else(|_| unreachable!());
        assert!(hub.summary().durable_session);
        hub.session_mut().open_tab(TabKind::ListView);
        hub.session_mut()
            .open_content_in_new_tab(ContentRef::new("snake"), "Snake");
        (hub.session().tabs().to_vec(), hub.session().active_id().clone())
    };

    let hub = Hub::new(config, Catalog::default(), Player("ada"), Factory::default())
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(hub.session().tabs(), tabs.as_slice());
    assert_eq!(hub.session().active_id(), &active);
}

#[test]
fn ephemeral_sessions_are_not_written() {
    let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
    let config = HubConfig {
        storage_dir: dir.path().to_path_buf(),
        ephemeral: true,
        ..HubConfig::default()
    };

    let mut hub = Hub::new(config, Catalog::default(), Player("ada"), Factory::default())
        .unwrap_or_else(|_| unreachable!());
    assert!(!hub.summary().durable_session);
    hub.session_mut().open_tab(TabKind::ListView);
    assert!(!dir.path().join("session").exists());
}
