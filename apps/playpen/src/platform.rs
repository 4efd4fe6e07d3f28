//! Desktop stand-ins for the hub's collaborators.

use pp_core::PlaypenResult;
use pp_embed::BoundaryAttributes;
use pp_embed::BoundarySource;
use pp_embed::DestinationRead;
use pp_embed::IsolationBoundary;
use pp_hub::BoundaryFactory;
use pp_hub::ContentCatalog;
use pp_hub::IdentitySource;
use pp_security::Presentation;
use pp_session::ContentRef;
use pp_session::TabId;
use std::cell::RefCell;
use std::rc::Rc;

/// One playable item on the shelf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfItem {
    pub id: &'static str,
    pub title: &'static str,
    pub raw: &'static str,
}

const SHELF: &[ShelfItem] = &[
    ShelfItem {
        id: "paper-plane",
        title: "Paper Plane",
        raw: "<!DOCTYPE html><html><head><title>Paper Plane</title></head>\
              <body><canvas id=\"sky\" width=\"640\" height=\"360\"></canvas></body></html>",
    },
    ShelfItem {
        id: "escaped-snake",
        title: "Snake (escaped upload)",
        raw: "&lt;html&gt;&lt;body&gt;&lt;h1&gt;Snake&lt;/h1&gt;&lt;/body&gt;&lt;/html&gt;",
    },
    ShelfItem {
        id: "hosted-pong",
        title: "Pong (hosted)",
        raw: "https://example.com/game",
    },
];

/// Built-in catalog shown on the list view.
#[derive(Debug, Clone, Copy, Default)]
pub struct Shelf;

impl Shelf {
    pub fn items(&self) -> &'static [ShelfItem] {
        SHELF
    }
}

impl ContentCatalog for Shelf {
    fn raw_content(&self, item: &ContentRef) -> Option<String> {
        SHELF
            .iter()
            .find(|entry| entry.id == item.as_str())
            .map(|entry| entry.raw.to_owned())
    }
}

/// Local account name, for log attribution only.
#[derive(Debug, Clone, Default)]
pub struct LocalUser;

impl IdentitySource for LocalUser {
    fn current_user(&self) -> Option<String> {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|name| !name.trim().is_empty())
    }
}

/// What the shell shows in place of a live frame.
#[derive(Debug, Clone, Default)]
pub struct FramePreview {
    pub tab_id: Option<TabId>,
    pub presentation: Presentation,
    pub attributes: Option<BoundaryAttributes>,
    pub source: Option<BoundarySource>,
    pub navigations: Vec<String>,
    pub torn_down: bool,
}

/// Boundary that records what it was asked to host without executing it.
///
/// Its destination is never observable from the host, like a frame that
/// honours isolation.
#[derive(Debug)]
pub struct PreviewFrame {
    preview: Rc<RefCell<FramePreview>>,
}

impl IsolationBoundary for PreviewFrame {
    fn instantiate(
        &mut self,
        attributes: &BoundaryAttributes,
        source: &BoundarySource,
    ) -> PlaypenResult<()> {
        let mut preview = self.preview.borrow_mut();
        preview.attributes = Some(attributes.clone());
        preview.source = Some(source.clone());
        Ok(())
    }

    fn current_destination(&self) -> DestinationRead {
        DestinationRead::Isolated
    }

    fn navigate(&mut self, destination: &str) {
        self.preview
            .borrow_mut()
            .navigations
            .push(destination.to_owned());
    }

    fn teardown(&mut self) {
        self.preview.borrow_mut().torn_down = true;
    }
}

/// Hands out preview frames and keeps the latest one for display.
#[derive(Debug, Clone, Default)]
pub struct PreviewFactory {
    latest: Rc<RefCell<FramePreview>>,
}

impl PreviewFactory {
    pub fn latest(&self) -> Rc<RefCell<FramePreview>> {
        Rc::clone(&self.latest)
    }
}

impl BoundaryFactory for PreviewFactory {
    fn create_boundary(
        &mut self,
        tab_id: &TabId,
        presentation: Presentation,
    ) -> PlaypenResult<Box<dyn IsolationBoundary>> {
        self.latest.replace(FramePreview {
            tab_id: Some(tab_id.clone()),
            presentation,
            ..FramePreview::default()
        });
        Ok(Box::new(PreviewFrame {
            preview: Rc::clone(&self.latest),
        }))
    }
}
