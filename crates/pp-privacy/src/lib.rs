//! Privacy defaults applied to every piece of embedded content.

use pp_core::PlaypenError;
use pp_core::PlaypenResult;

/// Window features used when content is opened outside the host.
pub const EXTERNAL_WINDOW_FEATURES: &str = "noopener,noreferrer";

/// Referrer information forwarded to embedded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferrerPolicy {
    NoReferrer,
    Origin,
    StrictOrigin,
    StrictOriginWhenCrossOrigin,
    SameOrigin,
    NoReferrerWhenDowngrade,
    OriginWhenCrossOrigin,
    UnsafeUrl,
}

impl ReferrerPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoReferrer => "no-referrer",
            Self::Origin => "origin",
            Self::StrictOrigin => "strict-origin",
            Self::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
            Self::SameOrigin => "same-origin",
            Self::NoReferrerWhenDowngrade => "no-referrer-when-downgrade",
            Self::OriginWhenCrossOrigin => "origin-when-cross-origin",
            Self::UnsafeUrl => "unsafe-url",
        }
    }

    /// True when no request, same-origin or not, can carry more than the
    /// host origin. An inline document granted `allow-same-origin` shares the
    /// host origin, so the `*-when-cross-origin` and `same-origin` variants
    /// would hand it the full host URL.
    pub fn is_origin_only_or_stricter(self) -> bool {
        matches!(self, Self::NoReferrer | Self::Origin | Self::StrictOrigin)
    }
}

/// Global privacy policy for embedded content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivacyPolicy {
    pub embed_referrer: ReferrerPolicy,
    pub block_screen_capture: bool,
    pub open_external_without_opener: bool,
}

impl Default for PrivacyPolicy {
    fn default() -> Self {
        Self {
            embed_referrer: ReferrerPolicy::StrictOrigin,
            block_screen_capture: true,
            open_external_without_opener: true,
        }
    }
}

impl PrivacyPolicy {
    pub fn validate(&self) -> PlaypenResult<()> {
        if !self.embed_referrer.is_origin_only_or_stricter() {
            return Err(PlaypenError::new(
                "privacy.referrer_too_permissive",
                format!(
                    "referrer policy `{}` would forward the full host URL to untrusted content",
                    self.embed_referrer.as_str()
                ),
            ));
        }

        if !self.block_screen_capture {
            return Err(PlaypenError::new(
                "privacy.capture_guard_disabled",
                "screen capture blocking must stay enabled",
            ));
        }

        if !self.open_external_without_opener {
            return Err(PlaypenError::new(
                "privacy.opener_required_off",
                "externally opened content must not receive an opener handle",
            ));
        }

        Ok(())
    }
}
