//! Isolation boundary policy: capability sets, device allowances and
//! destination scheme checks.

pub mod capability;
pub mod origin;

use capability::Capability;
use capability::CapabilitySet;
use capability::DeviceAllowance;
use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use url::Url;

pub use origin::ExpectedOrigin;
pub use origin::OriginAllowlist;
pub use origin::origin_of;

/// Schemes a boundary destination may ever use.
const SAFE_SCHEMES: &[&str] = &["http", "https", "data", "blob"];

/// How an embed is presented to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Presentation {
    #[default]
    Windowed,
    Fullscreen,
}

/// Central policy for isolation boundaries hosting untrusted content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub base_capabilities: CapabilitySet,
    /// Added on top of the base set for fullscreen presentation.
    pub fullscreen_capabilities: CapabilitySet,
    pub device_allowances: Vec<DeviceAllowance>,
    pub permitted_schemes: Vec<&'static str>,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            base_capabilities: CapabilitySet::new(&[
                Capability::Scripts,
                Capability::SameOrigin,
                Capability::Forms,
                Capability::PointerLock,
                Capability::Popups,
            ]),
            fullscreen_capabilities: CapabilitySet::new(&[
                Capability::Modals,
                Capability::OrientationLock,
                Capability::Presentation,
            ]),
            device_allowances: vec![
                DeviceAllowance::Accelerometer,
                DeviceAllowance::Autoplay,
                DeviceAllowance::EncryptedMedia,
                DeviceAllowance::Gyroscope,
                DeviceAllowance::PictureInPicture,
            ],
            permitted_schemes: SAFE_SCHEMES.to_vec(),
        }
    }
}

impl SandboxPolicy {
    pub fn validate(&self) -> PlaypenResult<()> {
        let all = self.base_capabilities.union(&self.fullscreen_capabilities);
        if let Some(token) = all.iter().find(|token| token.is_forbidden()) {
            return Err(PlaypenError::new(
                "security.capability_forbidden",
                format!("`{}` must never be granted to untrusted content", token.as_str()),
            ));
        }

        if !self.base_capabilities.contains(Capability::Scripts) {
            return Err(PlaypenError::new(
                "security.capability_missing",
                "games require `allow-scripts`",
            ));
        }

        if let Some(allowance) = self
            .device_allowances
            .iter()
            .find(|allowance| allowance.is_capture())
        {
            return Err(PlaypenError::new(
                "security.allowance_forbidden",
                format!("`{}` must never be delegated", allowance.as_str()),
            ));
        }

        if let Some(scheme) = self
            .permitted_schemes
            .iter()
            .find(|scheme| !SAFE_SCHEMES.contains(scheme))
        {
            return Err(PlaypenError::new(
                "security.scheme_unsafe",
                format!("scheme `{scheme}` cannot be permitted for boundary destinations"),
            ));
        }

        Ok(())
    }

    pub fn capabilities_for(&self, presentation: Presentation) -> CapabilitySet {
        match presentation {
            Presentation::Windowed => self.base_capabilities.clone(),
            Presentation::Fullscreen => self.base_capabilities.union(&self.fullscreen_capabilities),
        }
    }

    pub fn allowances_for(&self, presentation: Presentation) -> Vec<DeviceAllowance> {
        let mut allowances = self.device_allowances.clone();
        if presentation == Presentation::Fullscreen
            && !allowances.contains(&DeviceAllowance::Fullscreen)
        {
            allowances.push(DeviceAllowance::Fullscreen);
        }
        allowances
    }

    /// Rejects destinations whose scheme is not explicitly permitted.
    ///
    /// Parsing goes through the URL parser so that whitespace and control
    /// characters smuggled into the scheme are normalized the same way a
    /// frame would normalize them. Relative destinations are rejected since
    /// they would resolve against the host page.
    pub fn check_destination(&self, destination: &str) -> PlaypenResult<()> {
        let parsed = Url::parse(destination).map_err(|error| {
            PlaypenError::new(
                "security.destination_invalid",
                format!("destination is not an absolute URL: {error}"),
            )
        })?;

        if self.permitted_schemes.contains(&parsed.scheme()) {
            return Ok(());
        }

        Err(PlaypenError::new(
            "security.scheme_disallowed",
            format!("scheme `{}` is not permitted for embedded content", parsed.scheme()),
        ))
    }
}
