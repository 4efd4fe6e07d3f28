//! Ordered tab session with foreground/fullscreen selection and durable
//! rehydration.

pub mod keymap;
pub mod tab;

use keymap::KeyPress;
use keymap::SessionCommand;
use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use pp_storage::SessionStorage;
use std::sync::mpsc;

pub use tab::ContentRef;
pub use tab::Tab;
pub use tab::TabId;
pub use tab::TabKind;

/// Storage key holding the ordered tab array.
pub const TABS_KEY: &str = "playpen.tabs";
/// Storage key holding the foreground tab id.
pub const ACTIVE_TAB_KEY: &str = "playpen.active_tab";

const NEW_TAB_TITLE: &str = "New Tab";

/// Change notification for observers of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    Opened(TabId),
    Closed(TabId),
    Focused(TabId),
    Navigated(TabId),
    Fullscreen(bool),
}

/// Owns the tab collection. At least one tab always exists and exactly one
/// is in the foreground.
#[derive(Debug)]
pub struct TabSessionManager<S: SessionStorage> {
    storage: S,
    tabs: Vec<Tab>,
    active: usize,
    fullscreen: bool,
    next_sequence: Option<u64>,
    last_persist_error: Option<PlaypenError>,
    watchers: Vec<mpsc::Sender<SessionChange>>,
}

impl<S: SessionStorage> TabSessionManager<S> {
    /// Restores the session from `storage`, falling back to a single Home
    /// tab when nothing usable is stored.
    pub fn rehydrate(storage: S) -> Self {
        let (tabs, active) = match load_session(&storage) {
            Ok(Some(restored)) => restored,
            Ok(None) => default_session(),
            Err(error) => {
                tracing::warn!(%error, "discarding unreadable tab session");
                default_session()
            }
        };

        let next_sequence = tabs
            .iter()
            .filter_map(|tab| tab.id.sequence())
            .max()
            .unwrap_or(0)
            .checked_add(1);

        tracing::debug!(tabs = tabs.len(), active, "tab session restored");
        Self {
            storage,
            tabs,
            active,
            fullscreen: false,
            next_sequence,
            last_persist_error: None,
            watchers: Vec::new(),
        }
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn active_tab(&self) -> &Tab {
        &self.tabs[self.active]
    }

    pub fn active_id(&self) -> &TabId {
        &self.active_tab().id
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Error from the most recent write, cleared by the next successful one.
    pub fn last_persist_error(&self) -> Option<&PlaypenError> {
        self.last_persist_error.as_ref()
    }

    /// Subscribes to change notifications.
    pub fn watch(&mut self) -> mpsc::Receiver<SessionChange> {
        let (tx, rx) = mpsc::channel();
        self.watchers.push(tx);
        rx
    }

    /// Appends a tab and brings it to the foreground.
    pub fn open_tab(&mut self, kind: TabKind) -> TabId {
        let title = match kind {
            TabKind::Home => NEW_TAB_TITLE,
            _ => kind.default_title(),
        };
        self.push_tab(title.to_owned(), kind)
    }

    /// Opens `content_ref` in a new foreground tab titled after the content.
    pub fn open_content_in_new_tab(&mut self, content_ref: ContentRef, title: &str) -> TabId {
        let title = match title.trim() {
            "" => TabKind::EmbeddedContent {
                content_ref: content_ref.clone(),
            }
            .default_title()
            .to_owned(),
            trimmed => trimmed.to_owned(),
        };
        self.push_tab(title, TabKind::EmbeddedContent { content_ref })
    }

    /// Closes `id`. Returns `false` when it is the last tab, which always
    /// survives.
    pub fn close_tab(&mut self, id: &TabId) -> PlaypenResult<bool> {
        let index = self.index_of(id)?;
        if self.tabs.len() == 1 {
            tracing::debug!(tab_id = %id, "refusing to close the last tab");
            return Ok(false);
        }

        let closed = self.tabs.remove(index);
        let was_active = index == self.active;
        if index < self.active || (was_active && self.active >= self.tabs.len()) {
            self.active -= 1;
        }

        tracing::debug!(tab_id = %closed.id, "tab closed");
        self.persist();
        self.notify(SessionChange::Closed(closed.id));
        if was_active {
            self.notify(SessionChange::Focused(self.active_id().clone()));
        }
        Ok(true)
    }

    pub fn focus_tab(&mut self, id: &TabId) -> PlaypenResult<()> {
        let index = self.index_of(id)?;
        if index == self.active {
            return Ok(());
        }
        self.active = index;
        self.persist();
        self.notify(SessionChange::Focused(id.clone()));
        Ok(())
    }

    /// Replaces the kind of an existing tab in place.
    pub fn navigate(&mut self, id: &TabId, kind: TabKind) -> PlaypenResult<()> {
        let index = self.index_of(id)?;
        let tab = &mut self.tabs[index];
        tab.title = kind.default_title().to_owned();
        tab.address_label = kind.address_label();
        tab.kind = kind;

        tracing::debug!(tab_id = %id, address = %tab.address_label, "tab navigated");
        self.persist();
        self.notify(SessionChange::Navigated(id.clone()));
        Ok(())
    }

    /// Cycles the foreground to the next tab, wrapping at the end.
    pub fn next_tab(&mut self) {
        let next = (self.active + 1) % self.tabs.len();
        if next == self.active {
            return;
        }
        self.active = next;
        self.persist();
        self.notify(SessionChange::Focused(self.active_id().clone()));
    }

    pub fn toggle_fullscreen(&mut self) -> bool {
        self.set_fullscreen(!self.fullscreen);
        self.fullscreen
    }

    /// Leaves fullscreen if active. Returns whether anything changed.
    pub fn exit_fullscreen(&mut self) -> bool {
        if !self.fullscreen {
            return false;
        }
        self.set_fullscreen(false);
        true
    }

    pub fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::CloseCurrentTab => {
                let id = self.active_id().clone();
                if let Err(error) = self.close_tab(&id) {
                    tracing::warn!(%error, "close shortcut failed");
                }
            }
            SessionCommand::NewTab => {
                self.open_tab(TabKind::Home);
            }
            SessionCommand::NextTab => self.next_tab(),
            SessionCommand::ExitFullscreen => {
                self.exit_fullscreen();
            }
        }
    }

    /// Routes an accelerator. Returns whether the press was consumed; Escape
    /// outside fullscreen is left for the shell.
    pub fn handle_key(&mut self, press: KeyPress) -> bool {
        match keymap::command_for(press) {
            None => false,
            Some(SessionCommand::ExitFullscreen) => self.exit_fullscreen(),
            Some(command) => {
                self.apply(command);
                true
            }
        }
    }

    fn push_tab(&mut self, title: String, kind: TabKind) -> TabId {
        let id = self.mint_id();

        self.tabs.push(Tab::new(id.clone(), title, kind));
        self.active = self.tabs.len() - 1;

        tracing::debug!(tab_id = %id, "tab opened");
        self.persist();
        self.notify(SessionChange::Opened(id.clone()));
        self.notify(SessionChange::Focused(id.clone()));
        id
    }

    /// Next free `tab-<n>` id. Falls back to the lowest unused sequence once
    /// the counter is exhausted or collides with a restored id.
    fn mint_id(&mut self) -> TabId {
        let sequence = self
            .next_sequence
            .filter(|candidate| !self.is_taken(*candidate))
            .or_else(|| (1..=u64::MAX).find(|candidate| !self.is_taken(*candidate)))
            .unwrap_or_default();
        self.next_sequence = sequence.checked_add(1);
        TabId::numbered(sequence)
    }

    fn is_taken(&self, sequence: u64) -> bool {
        let id = TabId::numbered(sequence);
        self.tabs.iter().any(|tab| tab.id == id)
    }

    fn set_fullscreen(&mut self, fullscreen: bool) {
        self.fullscreen = fullscreen;
        tracing::debug!(fullscreen, "presentation changed");
        self.notify(SessionChange::Fullscreen(fullscreen));
    }

    fn index_of(&self, id: &TabId) -> PlaypenResult<usize> {
        self.tabs
            .iter()
            .position(|tab| &tab.id == id)
            .ok_or_else(|| {
                PlaypenError::new("session.tab_not_found", format!("no tab with id `{id}`"))
            })
    }

    fn persist(&mut self) {
        match self.write_session() {
            Ok(()) => self.last_persist_error = None,
            Err(error) => {
                tracing::warn!(%error, "failed to persist tab session");
                self.last_persist_error = Some(error);
            }
        }
    }

    fn write_session(&self) -> PlaypenResult<()> {
        let encoded = serde_json::to_string(&self.tabs).map_err(|error| {
            PlaypenError::new(
                "session.encode_failed",
                format!("failed to encode tabs: {error}"),
            )
        })?;
        self.storage.set_item(TABS_KEY, &encoded)?;
        self.storage.set_item(ACTIVE_TAB_KEY, self.active_id().as_str())
    }

    fn notify(&mut self, change: SessionChange) {
        self.watchers.retain(|tx| tx.send(change.clone()).is_ok());
    }
}

fn default_session() -> (Vec<Tab>, usize) {
    (vec![Tab::new(TabId::numbered(1), "Home", TabKind::Home)], 0)
}

fn load_session<S: SessionStorage>(storage: &S) -> PlaypenResult<Option<(Vec<Tab>, usize)>> {
    let Some(raw) = storage.get_item(TABS_KEY)? else {
        return Ok(None);
    };

    let stored: Vec<Tab> = serde_json::from_str(&raw).map_err(|error| {
        PlaypenError::new(
            "session.format_invalid",
            format!("stored tabs are not a tab array: {error}"),
        )
    })?;

    let mut tabs: Vec<Tab> = Vec::with_capacity(stored.len());
    for tab in stored {
        if tabs.iter().any(|existing| existing.id == tab.id) {
            continue;
        }
        tabs.push(tab);
    }
    if tabs.is_empty() {
        return Ok(None);
    }

    let active = storage
        .get_item(ACTIVE_TAB_KEY)?
        .and_then(|id| tabs.iter().position(|tab| tab.id.as_str() == id))
        .unwrap_or(0);
    Ok(Some((tabs, active)))
}

#[cfg(test)]
mod tests {
    use super::ACTIVE_TAB_KEY;
    use super::ContentRef;
    use super::SessionChange;
    use super::TABS_KEY;
    use super::TabKind;
    use super::TabSessionManager;
    use crate::keymap::Key;
    use crate::keymap::KeyPress;
    use crate::keymap::Modifiers;
    use pp_core::PlaypenError;
    use pp_core::PlaypenResult;
    use pp_storage::MemoryStorage;
    use pp_storage::SessionStorage;
    use pp_storage::StorageConfig;
    use pp_storage::StorageManager;
    use rstest::rstest;

    fn fresh() -> TabSessionManager<MemoryStorage> {
        TabSessionManager::rehydrate(MemoryStorage::new())
    }

    fn titles<S: SessionStorage>(session: &TabSessionManager<S>) -> Vec<&str> {
        session.tabs().iter().map(|tab| tab.title.as_str()).collect()
    }

    struct ReadOnlyStorage;

    impl SessionStorage for ReadOnlyStorage {
        fn get_item(&self, _key: &str) -> PlaypenResult<Option<String>> {
            Ok(None)
        }

        fn set_item(&self, _key: &str, _value: &str) -> PlaypenResult<()> {
            Err(PlaypenError::new("storage.write_failed", "quota exceeded"))
        }

        fn remove_item(&self, _key: &str) -> PlaypenResult<()> {
            Ok(())
        }
    }

    #[test]
    fn starts_with_single_home_tab() {
        let session = fresh();
        assert_eq!(session.tabs().len(), 1);
        assert_eq!(session.active_tab().kind, TabKind::Home);
        assert_eq!(session.active_tab().title, "Home");
        assert_eq!(session.active_tab().address_label, "app://home");
    }

    #[test]
    fn closing_middle_of_three_keeps_order_and_foreground() {
        let mut session = fresh();
        let second = session.open_tab(TabKind::ListView);
        let third = session.open_content_in_new_tab(ContentRef::new("42"), "Snake");
        assert_eq!(session.active_id(), &third);

        assert_eq!(session.close_tab(&second), Ok(true));
        assert_eq!(titles(&session), vec!["Home", "Snake"]);
        assert_eq!(session.active_id(), &third);
    }

    #[test]
    fn last_tab_survives_close() {
        let mut session = fresh();
        let only = session.active_id().clone();
        assert_eq!(session.close_tab(&only), Ok(false));
        assert_eq!(session.tabs().len(), 1);
        assert_eq!(session.active_id(), &only);
    }

    #[rstest]
    #[case::first(0, 0)]
    #[case::middle(1, 1)]
    #[case::last(2, 1)]
    fn closing_foreground_selects_right_neighbour(
        #[case] closed: usize,
        #[case] expected_index: usize,
    ) {
        let mut session = fresh();
        session.open_tab(TabKind::ListView);
        session.open_tab(TabKind::DetailView);
        let ids: Vec<_> = session.tabs().iter().map(|tab| tab.id.clone()).collect();

        assert!(session.focus_tab(&ids[closed]).is_ok());
        assert_eq!(session.close_tab(&ids[closed]), Ok(true));

        let remaining: Vec<_> = ids.iter().filter(|id| **id != ids[closed]).collect();
        assert_eq!(session.active_id(), remaining[expected_index]);
    }

    #[test]
    fn closing_background_tab_keeps_foreground() {
        let mut session = fresh();
        let first = session.active_id().clone();
        session.open_tab(TabKind::ListView);
        let third = session.open_tab(TabKind::DetailView);

        assert_eq!(session.close_tab(&first), Ok(true));
        assert_eq!(session.active_id(), &third);
    }

    #[test]
    fn navigate_mutates_in_place() {
        let mut session = fresh();
        let id = session.active_id().clone();
        let kind = TabKind::EmbeddedContent {
            content_ref: ContentRef::new("7"),
        };
        assert!(session.navigate(&id, kind.clone()).is_ok());

        assert_eq!(session.tabs().len(), 1);
        assert_eq!(session.active_tab().kind, kind);
        assert_eq!(session.active_tab().address_label, "app://content/7");
        assert_eq!(session.active_tab().title, "Game");
    }

    #[test]
    fn unknown_ids_are_errors() {
        let mut session = fresh();
        let missing = super::TabId::new("nope");
        assert_eq!(
            session.focus_tab(&missing).err().map(|error| error.code),
            Some("session.tab_not_found")
        );
        assert!(session.close_tab(&missing).is_err());
    }

    #[test]
    fn next_tab_wraps() {
        let mut session = fresh();
        let first = session.active_id().clone();
        session.open_tab(TabKind::ListView);
        session.next_tab();
        assert_eq!(session.active_id(), &first);
    }

    #[test]
    fn shortcuts_drive_the_session() {
        let mut session = fresh();
        assert!(session.handle_key(KeyPress::new(Key::Character('t'), Modifiers::CTRL)));
        assert_eq!(titles(&session), vec!["Home", "New Tab"]);

        assert!(session.handle_key(KeyPress::new(Key::Character('w'), Modifiers::META)));
        assert_eq!(session.tabs().len(), 1);
        assert!(session.handle_key(KeyPress::new(Key::Character('w'), Modifiers::CTRL)));
        assert_eq!(session.tabs().len(), 1);

        session.toggle_fullscreen();
        assert!(session.handle_key(KeyPress::new(Key::Escape, Modifiers::NONE)));
        assert!(!session.is_fullscreen());
        assert!(!session.handle_key(KeyPress::new(Key::Character('x'), Modifiers::NONE)));
    }

    #[test]
    fn escape_without_fullscreen_is_harmless() {
        let mut session = fresh();
        let changes = session.watch();
        assert!(!session.handle_key(KeyPress::new(Key::Escape, Modifiers::NONE)));
        assert_eq!(changes.try_iter().count(), 0);
        assert!(!session.exit_fullscreen());
        assert!(session.toggle_fullscreen());
        assert!(session.exit_fullscreen());
        assert!(!session.is_fullscreen());
    }

    #[test]
    fn every_mutation_is_persisted() {
        let storage = MemoryStorage::new();
        let mut session = TabSessionManager::rehydrate(storage.clone());
        let id = session.open_content_in_new_tab(ContentRef::new("9"), "Pong");

        assert_eq!(storage.get_item(ACTIVE_TAB_KEY), Ok(Some(id.as_str().to_owned())));
        let stored = storage
            .get_item(TABS_KEY)
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_default();
        assert!(stored.contains("\"content_ref\":\"9\""));
    }

    #[test]
    fn rehydration_round_trip() {
        let storage = MemoryStorage::new();
        let mut session = TabSessionManager::rehydrate(storage.clone());
        session.open_tab(TabKind::ListView);
        session.open_content_in_new_tab(ContentRef::new("42"), "Snake");
        let middle = session.tabs()[1].id.clone();
        assert!(session.focus_tab(&middle).is_ok());

        let restored = TabSessionManager::rehydrate(storage);
        assert_eq!(restored.tabs(), session.tabs());
        assert_eq!(restored.active_id(), session.active_id());
    }

    #[test]
    fn rehydration_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let manager =
            StorageManager::new(StorageConfig::default()).with_persistent_root(dir.path().to_path_buf());
        let store = manager.open("tabs").unwrap_or_else(|_| unreachable!());

        let mut session = TabSessionManager::rehydrate(store);
        let content = session.open_content_in_new_tab(ContentRef::new("42"), "Snake");

        let reopened = manager.open("tabs").unwrap_or_else(|_| unreachable!());
        let restored = TabSessionManager::rehydrate(reopened);
        assert_eq!(restored.tabs(), session.tabs());
        assert_eq!(restored.active_id(), &content);
    }

    #[rstest]
    #[case::garbage("{not json")]
    #[case::empty_array("[]")]
    #[case::wrong_shape(r#"{"tabs":1}"#)]
    #[case::missing_fields(r#"[{"id":"tab-2"}]"#)]
    fn rehydration_falls_back_to_home(#[case] tabs: &str) {
        let storage = MemoryStorage::new();
        assert!(storage.set_item(TABS_KEY, tabs).is_ok());

        let session = TabSessionManager::rehydrate(storage);
        assert_eq!(session.tabs().len(), 1);
        assert_eq!(session.active_tab().kind, TabKind::Home);
    }

    #[test]
    fn stale_foreground_id_selects_first_tab() {
        let storage = MemoryStorage::new();
        let tabs = r#"[
            {"id":"tab-4","title":"Games","address_label":"app://list","kind":"list_view"},
            {"id":"tab-5","title":"Details","address_label":"app://detail","kind":"detail_view"}
        ]"#;
        assert!(storage.set_item(TABS_KEY, tabs).is_ok());
        assert!(storage.set_item(ACTIVE_TAB_KEY, "tab-gone").is_ok());

        let session = TabSessionManager::rehydrate(storage);
        assert_eq!(session.tabs().len(), 2);
        assert_eq!(session.active_id().as_str(), "tab-4");
    }

    #[test]
    fn new_ids_never_collide_with_restored_ones() {
        let storage = MemoryStorage::new();
        let mut session = TabSessionManager::rehydrate(storage.clone());
        session.open_tab(TabKind::ListView);
        session.open_tab(TabKind::ListView);

        let mut restored = TabSessionManager::rehydrate(storage);
        let id = restored.open_tab(TabKind::Home);
        assert_eq!(id.as_str(), "tab-4");
    }

    #[test]
    fn exhausted_or_duplicate_restored_ids_still_mint_unique_ones() {
        let storage = MemoryStorage::new();
        let tabs = r#"[
            {"id":"tab-18446744073709551615","title":"Home","address_label":"app://home","kind":"home"},
            {"id":"tab-1","title":"Games","address_label":"app://list","kind":"list_view"},
            {"id":"tab-1","title":"Details","address_label":"app://detail","kind":"detail_view"}
        ]"#;
        assert!(storage.set_item(TABS_KEY, tabs).is_ok());

        let mut session = TabSessionManager::rehydrate(storage);
        assert_eq!(titles(&session), vec!["Home", "Games"]);

        let first = session.open_tab(TabKind::ListView);
        let second = session.open_tab(TabKind::DetailView);
        assert_eq!(first.as_str(), "tab-2");
        assert_eq!(second.as_str(), "tab-3");

        assert_eq!(session.close_tab(&second), Ok(true));
        assert_eq!(titles(&session), vec!["Home", "Games", "Games"]);
        assert_eq!(session.tabs()[0].id.as_str(), "tab-18446744073709551615");
    }

    #[test]
    fn persist_failures_are_recorded_not_fatal() {
        let mut session = TabSessionManager::rehydrate(ReadOnlyStorage);
        session.open_tab(TabKind::ListView);
        assert_eq!(session.tabs().len(), 2);
        assert_eq!(
            session.last_persist_error().map(|error| error.code),
            Some("storage.write_failed")
        );
    }

    #[test]
    fn watchers_see_changes_in_order() {
        let mut session = fresh();
        let changes = session.watch();
        let id = session.open_tab(TabKind::ListView);
        session.toggle_fullscreen();

        let seen: Vec<_> = changes.try_iter().collect();
        assert_eq!(
            seen,
            vec![
                SessionChange::Opened(id.clone()),
                SessionChange::Focused(id),
                SessionChange::Fullscreen(true),
            ]
        );
    }
}
