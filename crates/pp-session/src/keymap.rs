//! Fixed keyboard accelerators for the tab session.

/// Key identity, independent of any windowing toolkit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Character(char),
    Tab,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub ctrl: bool,
    /// Command on macOS.
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        ctrl: false,
        meta: false,
        shift: false,
        alt: false,
    };

    pub const CTRL: Self = Self {
        ctrl: true,
        ..Self::NONE
    };

    pub const META: Self = Self {
        meta: true,
        ..Self::NONE
    };

    fn command(self) -> bool {
        self.ctrl || self.meta
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub modifiers: Modifiers,
}

impl KeyPress {
    pub fn new(key: Key, modifiers: Modifiers) -> Self {
        Self { key, modifiers }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    CloseCurrentTab,
    NewTab,
    NextTab,
    ExitFullscreen,
}

/// Maps a key press to a session command.
///
/// Ctrl/Cmd+W closes, Ctrl/Cmd+T opens, Ctrl+Tab cycles and Escape leaves
/// fullscreen. Bindings are not configurable.
pub fn command_for(press: KeyPress) -> Option<SessionCommand> {
    let modifiers = press.modifiers;
    match (press.key, modifiers.command()) {
        (Key::Escape, _) => Some(SessionCommand::ExitFullscreen),
        (Key::Character(ch), true) if ch.eq_ignore_ascii_case(&'w') => {
            Some(SessionCommand::CloseCurrentTab)
        }
        (Key::Character(ch), true) if ch.eq_ignore_ascii_case(&'t') => Some(SessionCommand::NewTab),
        (Key::Tab, _) if modifiers.ctrl => Some(SessionCommand::NextTab),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::Key;
    use super::KeyPress;
    use super::Modifiers;
    use super::SessionCommand;
    use super::command_for;
    use rstest::rstest;

    #[rstest]
    #[case::ctrl_w(Key::Character('w'), Modifiers::CTRL, Some(SessionCommand::CloseCurrentTab))]
    #[case::cmd_w(Key::Character('w'), Modifiers::META, Some(SessionCommand::CloseCurrentTab))]
    #[case::ctrl_t(Key::Character('t'), Modifiers::CTRL, Some(SessionCommand::NewTab))]
    #[case::cmd_t(Key::Character('T'), Modifiers::META, Some(SessionCommand::NewTab))]
    #[case::ctrl_tab(Key::Tab, Modifiers::CTRL, Some(SessionCommand::NextTab))]
    #[case::cmd_tab_is_os_switcher(Key::Tab, Modifiers::META, None)]
    #[case::escape(Key::Escape, Modifiers::NONE, Some(SessionCommand::ExitFullscreen))]
    #[case::plain_w(Key::Character('w'), Modifiers::NONE, None)]
    #[case::plain_tab(Key::Tab, Modifiers::NONE, None)]
    fn bindings(
        #[case] key: Key,
        #[case] modifiers: Modifiers,
        #[case] expected: Option<SessionCommand>,
    ) {
        assert_eq!(command_for(KeyPress::new(key, modifiers)), expected);
    }
}
