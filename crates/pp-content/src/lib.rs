//! Classification of uploaded game content into a render-ready form.

pub mod entities;

use pp_core::PlaypenError;
use pp_core::PlaypenResult;

pub use entities::decode_entities;

const ROOT_MARKERS: &[&str] = &["<!doctype", "<html", "<head"];

/// How a piece of content must be placed into an isolation boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// The payload is a complete HTML document written straight into the boundary.
    InlineDocument,
    /// The payload is a URL the boundary fetches on its own.
    RemoteUrl,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InlineDocument => "inline-document",
            Self::RemoteUrl => "remote-url",
        }
    }
}

/// Render-ready form of a raw content string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    pub render_mode: RenderMode,
    pub payload: String,
}

impl ContentDescriptor {
    pub fn is_inline(&self) -> bool {
        self.render_mode == RenderMode::InlineDocument
    }
}

/// Classifies `raw` and decodes over-escaped markup.
///
/// Empty or whitespace-only input is unplayable and yields
/// `content.empty`. Any markup signal selects
/// [`RenderMode::InlineDocument`]; only input without one is treated as a
/// remote URL, which is passed through byte for byte.
pub fn resolve(raw: &str) -> PlaypenResult<ContentDescriptor> {
    if raw.trim().is_empty() {
        return Err(PlaypenError::new(
            "content.empty",
            "content item has no playable payload",
        ));
    }

    let decoded = raw.contains('&').then(|| decode_entities(raw));
    if is_markup(raw, decoded.as_deref()) {
        return Ok(ContentDescriptor {
            render_mode: RenderMode::InlineDocument,
            payload: decoded.unwrap_or_else(|| raw.to_owned()),
        });
    }

    Ok(ContentDescriptor {
        render_mode: RenderMode::RemoteUrl,
        payload: raw.to_owned(),
    })
}

/// Returns true when `raw` carries any structural HTML signal, either
/// literally or once its character references are decoded.
pub fn looks_like_markup(raw: &str) -> bool {
    let decoded = raw.contains('&').then(|| decode_entities(raw));
    is_markup(raw, decoded.as_deref())
}

fn is_markup(raw: &str, decoded: Option<&str>) -> bool {
    if has_root_signal(raw) {
        return true;
    }
    let Some(decoded) = decoded else {
        return false;
    };
    // Decoding never removes a literal `<`, so a higher count means a
    // reference spelled one.
    has_root_signal(decoded) || decoded.matches('<').count() > raw.matches('<').count()
}

fn has_root_signal(text: &str) -> bool {
    if text.trim_start().starts_with('<') {
        return true;
    }
    let lowered = text.to_ascii_lowercase();
    ROOT_MARKERS.iter().any(|marker| lowered.contains(marker))
}
