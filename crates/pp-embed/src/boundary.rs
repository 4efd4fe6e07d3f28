//! Platform seam for the isolation boundary (the sandboxed frame).

use pp_content::ContentDescriptor;
use pp_content::RenderMode;
use pp_core::PlaypenResult;
use pp_privacy::ReferrerPolicy;

/// Destination reported by a boundary created from an inline document.
pub const INLINE_DOCUMENT_DESTINATION: &str = "about:srcdoc";

/// What gets loaded into a boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundarySource {
    /// Fully materialized document; no network fetch for the document itself.
    Document(String),
    /// URL the boundary fetches and renders.
    Url(String),
}

impl BoundarySource {
    pub fn from_descriptor(descriptor: &ContentDescriptor) -> Self {
        match descriptor.render_mode {
            RenderMode::InlineDocument => Self::Document(descriptor.payload.clone()),
            RenderMode::RemoteUrl => Self::Url(descriptor.payload.clone()),
        }
    }

    /// Destination the boundary reports right after instantiation.
    pub fn initial_destination(&self) -> &str {
        match self {
            Self::Document(_) => INLINE_DOCUMENT_DESTINATION,
            Self::Url(url) => url,
        }
    }
}

/// Attribute set applied to the boundary at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryAttributes {
    pub title: String,
    /// `sandbox` capability string.
    pub sandbox: String,
    /// Permissions-policy `allow` string.
    pub allow: String,
    pub referrer_policy: ReferrerPolicy,
    pub allow_fullscreen: bool,
}

/// Result of reading a boundary's current destination from the host side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationRead {
    Observed(String),
    /// The read was refused across the isolation boundary. This is the
    /// steady state of a correctly sandboxed frame.
    Isolated,
    /// The read failed for some other reason.
    Unavailable(String),
}

/// A sandboxed execution context hosting one piece of untrusted content.
///
/// Implemented by the rendering platform. All calls happen on the host's
/// event loop.
pub trait IsolationBoundary {
    /// Creates the frame with `attributes` and begins loading `source`.
    fn instantiate(
        &mut self,
        attributes: &BoundaryAttributes,
        source: &BoundarySource,
    ) -> PlaypenResult<()>;

    fn current_destination(&self) -> DestinationRead;

    /// Writes the frame's destination attribute.
    fn navigate(&mut self, destination: &str);

    /// Removes the frame; no callbacks may fire afterwards.
    fn teardown(&mut self);
}
