//! Desktop shell: tab strip, built-in views and the embed panel.

use crate::platform::FramePreview;
use crate::platform::LocalUser;
use crate::platform::PreviewFactory;
use crate::platform::Shelf;
use eframe::egui;
use pp_capture::Visibility;
use pp_embed::BoundarySource;
use pp_embed::ExternalTarget;
use pp_embed::SurfaceEvent;
use pp_embed::SurfaceState;
use pp_hub::Hub;
use pp_session::ContentRef;
use pp_session::TabId;
use pp_session::TabKind;
use pp_session::keymap::Key;
use pp_session::keymap::KeyPress;
use pp_session::keymap::Modifiers;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use std::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const WARNING_TTL: Duration = Duration::from_secs(6);
const PREVIEW_CHARS: usize = 1200;
const WARNING_COLOR: egui::Color32 = egui::Color32::from_rgb(200, 65, 65);

type ShellHub = Hub<Shelf, LocalUser, PreviewFactory>;

struct Warning {
    text: String,
    until: Instant,
}

pub struct PlaypenApp {
    hub: ShellHub,
    preview: Rc<RefCell<FramePreview>>,
    warning: Option<Warning>,
    status_line: String,
    applied_fullscreen: bool,
    was_focused: bool,
}

impl PlaypenApp {
    pub fn new(hub: ShellHub, preview: Rc<RefCell<FramePreview>>) -> Self {
        let mut app = Self {
            hub,
            preview,
            warning: None,
            status_line: "Ready".to_owned(),
            applied_fullscreen: false,
            was_focused: true,
        };
        app.sync(Instant::now());
        app
    }

    /// Rebuilds the embed for the foreground tab and settles its first load.
    fn sync(&mut self, now: Instant) {
        self.hub.sync_embeds(now);

        let tab_id = self.hub.session().active_id().clone();
        let Some(surface) = self.hub.surface_for(&tab_id) else {
            return;
        };
        if surface.state() != &SurfaceState::Loading {
            return;
        }
        // The shell paints inline documents itself and has no engine for
        // remote pages.
        if surface.descriptor().is_inline() {
            surface.on_first_paint();
        } else {
            surface.on_load_error("remote pages cannot be rendered inside this shell");
        }
    }

    fn poll(&mut self, now: Instant) {
        for event in self.hub.poll(now) {
            match event {
                SurfaceEvent::RedirectBlocked {
                    blocked,
                    restored_to,
                } => {
                    self.warning = Some(Warning {
                        text: format!("Blocked a redirect to {blocked}; returned to {restored_to}"),
                        until: now + WARNING_TTL,
                    });
                }
                SurfaceEvent::Message(message) => {
                    self.status_line = format!("Message from {}: {}", message.origin, message.data);
                }
                SurfaceEvent::StateChanged(state) => {
                    self.status_line = format!("Player {}", state.as_str());
                }
                SurfaceEvent::RedirectSuspected { .. } => {}
            }
        }

        if self.warning.as_ref().is_some_and(|warning| warning.until <= now) {
            self.warning = None;
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context) -> bool {
        let presses: Vec<KeyPress> = ctx.input(|input| {
            input
                .events
                .iter()
                .filter_map(|event| match event {
                    egui::Event::Key {
                        key,
                        pressed: true,
                        modifiers,
                        ..
                    } => key_press(*key, *modifiers),
                    _ => None,
                })
                .collect()
        });

        let mut changed = false;
        for press in presses {
            changed |= self.hub.session_mut().handle_key(press);
        }

        let focused = ctx.input(|input| input.focused);
        if focused != self.was_focused {
            let visibility = if focused {
                Visibility::Visible
            } else {
                Visibility::Hidden
            };
            self.hub.on_visibility_change(visibility);
            self.was_focused = focused;
        }
        changed
    }

    fn apply_fullscreen(&mut self, ctx: &egui::Context) {
        let fullscreen = self.hub.session().is_fullscreen();
        if fullscreen != self.applied_fullscreen {
            ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(fullscreen));
            self.applied_fullscreen = fullscreen;
        }
    }

    fn render_tab_strip(&mut self, ui: &mut egui::Ui) -> bool {
        let mut focus: Option<TabId> = None;
        let mut close: Option<TabId> = None;
        let mut open_new = false;
        let mut toggle_fullscreen = false;

        ui.horizontal(|ui| {
            let session = self.hub.session();
            let active = session.active_id().clone();
            for tab in session.tabs() {
                if ui.selectable_label(tab.id == active, &tab.title).clicked() {
                    focus = Some(tab.id.clone());
                }
                if session.tabs().len() > 1 && ui.small_button("x").clicked() {
                    close = Some(tab.id.clone());
                }
                ui.separator();
            }
            if ui.button("+").clicked() {
                open_new = true;
            }
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                let label = if session.is_fullscreen() {
                    "Exit fullscreen"
                } else {
                    "Fullscreen"
                };
                if ui.button(label).clicked() {
                    toggle_fullscreen = true;
                }
            });
        });

        ui.horizontal(|ui| {
            ui.label(&self.hub.session().active_tab().address_label);
            ui.separator();
            ui.label("Ctrl+T new  Ctrl+W close  Ctrl+Tab next  Esc leave fullscreen");
        });

        let session = self.hub.session_mut();
        let mut changed = open_new || toggle_fullscreen;
        if let Some(id) = focus {
            changed |= session.focus_tab(&id).is_ok();
        }
        if let Some(id) = close {
            changed |= session.close_tab(&id).unwrap_or(false);
        }
        if open_new {
            session.open_tab(TabKind::Home);
        }
        if toggle_fullscreen {
            session.toggle_fullscreen();
        }
        changed
    }

    fn render_content(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) -> bool {
        let tab = self.hub.session().active_tab().clone();
        match &tab.kind {
            TabKind::Home => self.render_home(ui, &tab.id),
            TabKind::ListView => self.render_list(ui),
            TabKind::DetailView => {
                ui.heading("Details");
                ui.label("Pick a game from the list to see it here.");
                if ui.button("Browse games").clicked() {
                    return self.hub.session_mut().navigate(&tab.id, TabKind::ListView).is_ok();
                }
                false
            }
            TabKind::EmbeddedContent { .. } => {
                self.render_embed(ui, ctx, &tab.id);
                false
            }
        }
    }

    fn render_home(&mut self, ui: &mut egui::Ui, tab_id: &TabId) -> bool {
        ui.vertical_centered(|ui| {
            ui.add_space(40.0);
            ui.heading("Playpen");
            ui.label("Games from the community, played in a sandbox.");
            ui.add_space(20.0);
            ui.button("Games").clicked()
        })
        .inner
            && self
                .hub
                .session_mut()
                .navigate(tab_id, TabKind::ListView)
                .is_ok()
    }

    fn render_list(&mut self, ui: &mut egui::Ui) -> bool {
        let mut picked = None;
        ui.heading("Games");
        for item in Shelf.items() {
            ui.horizontal(|ui| {
                ui.label(item.title);
                if ui.button("Play").clicked() {
                    picked = Some(item);
                }
            });
        }

        let Some(item) = picked else {
            return false;
        };
        self.hub
            .session_mut()
            .open_content_in_new_tab(ContentRef::new(item.id), item.title);
        true
    }

    fn render_embed(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, tab_id: &TabId) {
        let Some(surface) = self.hub.surface_for(tab_id) else {
            ui.heading("This game cannot be played");
            ui.label("The content is missing or empty.");
            return;
        };

        if let Some(fallback) = surface.fallback() {
            ui.heading(&fallback.title);
            ui.colored_label(WARNING_COLOR, fallback.reason.describe());
            if fallback.can_open_externally && ui.button("Open in a new window").clicked() {
                match surface.open_externally() {
                    Ok(request) => open_external(ctx, request.target),
                    Err(error) => tracing::warn!(%error, "escape hatch refused"),
                }
            }
            return;
        }

        ui.horizontal(|ui| {
            ui.label(format!("{} ({})", surface.title(), surface.state().as_str()));
            ui.separator();
            let size = surface.viewport();
            ui.label(format!("{}x{}", size.width, size.height));
            if ui.small_button("-").clicked() {
                surface.resize(-100, -75);
            }
            if ui.small_button("+").clicked() {
                surface.resize(100, 75);
            }
        });

        let size = surface.viewport();
        let preview = self.preview.borrow();
        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.set_min_size(egui::vec2(size.width as f32, size.height as f32));
            if let Some(attributes) = &preview.attributes {
                ui.monospace(format!("sandbox=\"{}\"", attributes.sandbox));
                ui.monospace(format!("allow=\"{}\"", attributes.allow));
                ui.monospace(format!(
                    "referrerpolicy=\"{}\"",
                    attributes.referrer_policy.as_str()
                ));
            }
            ui.separator();
            if let Some(BoundarySource::Document(document)) = &preview.source {
                let shown: String = document.chars().take(PREVIEW_CHARS).collect();
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.monospace(shown);
                });
            }
        });
    }
}

impl eframe::App for PlaypenApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = Instant::now();
        let mut changed = self.handle_input(ctx);
        self.poll(now);

        egui::TopBottomPanel::top("tab_strip").show(ctx, |ui| {
            changed |= self.render_tab_strip(ui);
        });

        egui::TopBottomPanel::bottom("status_panel").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                ui.label(&self.status_line);
                if let Some(warning) = &self.warning {
                    ui.colored_label(WARNING_COLOR, &warning.text);
                }
                if let Some(error) = self.hub.session().last_persist_error() {
                    ui.colored_label(WARNING_COLOR, format!("Session not saved: {error}"));
                }
                let capture = self.hub.capture_status();
                ui.separator();
                ui.label(format!("Capture attempts blocked: {}", capture.blocked_attempts));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            changed |= self.render_content(ui, ctx);
        });

        if changed {
            self.sync(now);
            ctx.request_repaint();
        }
        self.apply_fullscreen(ctx);
        ctx.request_repaint_after(POLL_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.hub.shutdown();
    }
}

fn key_press(key: egui::Key, modifiers: egui::Modifiers) -> Option<KeyPress> {
    let key = match key {
        egui::Key::W => Key::Character('w'),
        egui::Key::T => Key::Character('t'),
        egui::Key::Tab => Key::Tab,
        egui::Key::Escape => Key::Escape,
        _ => return None,
    };
    Some(KeyPress::new(
        key,
        Modifiers {
            ctrl: modifiers.ctrl,
            meta: modifiers.mac_cmd,
            shift: modifiers.shift,
            alt: modifiers.alt,
        },
    ))
}

fn open_external(ctx: &egui::Context, target: ExternalTarget) {
    match target {
        ExternalTarget::Url(url) => ctx.open_url(egui::OpenUrl::new_tab(url)),
        ExternalTarget::Document(document) => {
            ctx.copy_text(document);
            tracing::info!("document copied to the clipboard for external viewing");
        }
    }
}
