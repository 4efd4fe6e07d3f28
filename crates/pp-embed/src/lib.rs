//! Embedding of untrusted content: the player surface, its isolation
//! boundary and the security monitor watching it.

pub mod boundary;
pub mod monitor;
pub mod surface;
pub mod timer;
pub mod viewport;

use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use pp_privacy::PrivacyPolicy;
use pp_security::OriginAllowlist;
use pp_security::SandboxPolicy;
use std::time::Duration;

pub use boundary::BoundaryAttributes;
pub use boundary::BoundarySource;
pub use boundary::DestinationRead;
pub use boundary::IsolationBoundary;
pub use monitor::MonitorStats;
pub use monitor::SecurityMonitor;
pub use surface::BlockReason;
pub use surface::EmbedSurface;
pub use surface::ExternalOpenRequest;
pub use surface::ExternalTarget;
pub use surface::Fallback;
pub use surface::SurfaceEvent;
pub use surface::SurfaceState;

/// Everything an [`EmbedSurface`] needs to build and watch its boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedSettings {
    pub sandbox: SandboxPolicy,
    pub privacy: PrivacyPolicy,
    pub allowlist: OriginAllowlist,
    pub poll_interval: Duration,
    pub redirect_threshold: u32,
    /// Pin remote content to the origin of its own URL.
    pub pin_remote_origin: bool,
}

impl Default for EmbedSettings {
    fn default() -> Self {
        Self {
            sandbox: SandboxPolicy::default(),
            privacy: PrivacyPolicy::default(),
            allowlist: OriginAllowlist::build_time(),
            poll_interval: monitor::DEFAULT_POLL_INTERVAL,
            redirect_threshold: monitor::DEFAULT_REDIRECT_THRESHOLD,
            pin_remote_origin: true,
        }
    }
}

impl EmbedSettings {
    pub fn validate(&self) -> PlaypenResult<()> {
        self.sandbox.validate()?;
        self.privacy.validate()?;

        if self.allowlist.origins().is_empty() {
            return Err(PlaypenError::new(
                "embed.allowlist_empty",
                "at least the host origin must be trusted",
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(PlaypenError::new(
                "embed.poll_interval_invalid",
                "redirect polling interval must be non-zero",
            ));
        }

        if self.redirect_threshold == 0 {
            return Err(PlaypenError::new(
                "embed.redirect_threshold_invalid",
                "redirect threshold must allow at least one navigation",
            ));
        }

        Ok(())
    }
}
