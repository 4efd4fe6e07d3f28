//! Origin parsing and the build-time trusted origin allowlist.

use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use url::Url;

const DEFAULT_HOST_ORIGIN: &str = "https://playpen.app";
const PLATFORM_SERVICE_ORIGINS: &[&str] = &["https://api.playpen.app", "https://assets.playpen.app"];

/// Returns the ASCII serialization of `input`'s origin, or `None` when the
/// input is not an absolute URL with a tuple origin (`data:`, `about:`, ...).
pub fn origin_of(input: &str) -> Option<String> {
    let parsed = Url::parse(input.trim()).ok()?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return None;
    }
    Some(origin.ascii_serialization())
}

/// Origins whose cross-boundary messages may be acted upon.
///
/// The list is assembled from compile-time constants only. Nothing read at
/// runtime can extend it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginAllowlist {
    origins: Vec<String>,
}

impl OriginAllowlist {
    /// Host origin plus platform service origins, with optional additions
    /// baked in through `PLAYPEN_HOST_ORIGIN` / `PLAYPEN_TRUSTED_ORIGINS` at
    /// build time.
    pub fn build_time() -> Self {
        let host = option_env!("PLAYPEN_HOST_ORIGIN").unwrap_or(DEFAULT_HOST_ORIGIN);
        let extra = option_env!("PLAYPEN_TRUSTED_ORIGINS").unwrap_or_default();

        let mut origins = vec![host];
        origins.extend_from_slice(PLATFORM_SERVICE_ORIGINS);
        origins.extend(extra.split(',').map(str::trim).filter(|entry| !entry.is_empty()));
        Self::from_static(&origins)
    }

    /// Builds an allowlist from fixed origin literals; entries that do not
    /// parse to a tuple origin are dropped.
    pub fn from_static(origins: &[&str]) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(origins.len());
        for origin in origins {
            if let Some(origin) = origin_of(origin) {
                if !normalized.contains(&origin) {
                    normalized.push(origin);
                }
            }
        }
        Self {
            origins: normalized,
        }
    }

    pub fn origins(&self) -> &[String] {
        &self.origins
    }

    /// Exact origin comparison; opaque (`"null"`) and malformed origins are
    /// never trusted.
    pub fn is_trusted(&self, origin: &str) -> bool {
        origin_of(origin).is_some_and(|candidate| self.origins.contains(&candidate))
    }
}

/// Origin a boundary is expected to stay within.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedOrigin {
    origin: String,
}

impl ExpectedOrigin {
    pub fn parse(input: &str) -> PlaypenResult<Self> {
        let origin = origin_of(input).ok_or_else(|| {
            PlaypenError::new(
                "security.origin_invalid",
                format!("`{input}` does not name a network origin"),
            )
        })?;
        Ok(Self { origin })
    }

    /// Derives the expected origin from a remote content URL.
    pub fn of_destination(destination: &str) -> Option<Self> {
        origin_of(destination).map(|origin| Self { origin })
    }

    pub fn as_str(&self) -> &str {
        &self.origin
    }

    pub fn permits(&self, destination: &str) -> bool {
        origin_of(destination).is_some_and(|origin| origin == self.origin)
    }
}
