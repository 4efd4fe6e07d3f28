//! Sandbox capability tokens and device allowances.

/// One token of an isolation boundary's sandbox attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Scripts,
    SameOrigin,
    Forms,
    PointerLock,
    Popups,
    Modals,
    OrientationLock,
    Presentation,
    Downloads,
    PopupsToEscapeSandbox,
    TopNavigation,
    TopNavigationByUserActivation,
    TopNavigationToCustomProtocols,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scripts => "allow-scripts",
            Self::SameOrigin => "allow-same-origin",
            Self::Forms => "allow-forms",
            Self::PointerLock => "allow-pointer-lock",
            Self::Popups => "allow-popups",
            Self::Modals => "allow-modals",
            Self::OrientationLock => "allow-orientation-lock",
            Self::Presentation => "allow-presentation",
            Self::Downloads => "allow-downloads",
            Self::PopupsToEscapeSandbox => "allow-popups-to-escape-sandbox",
            Self::TopNavigation => "allow-top-navigation",
            Self::TopNavigationByUserActivation => "allow-top-navigation-by-user-activation",
            Self::TopNavigationToCustomProtocols => "allow-top-navigation-to-custom-protocols",
        }
    }

    /// Tokens that hand the embedded content control over the host page.
    pub fn is_forbidden(self) -> bool {
        matches!(
            self,
            Self::TopNavigation
                | Self::TopNavigationByUserActivation
                | Self::TopNavigationToCustomProtocols
                | Self::PopupsToEscapeSandbox
        )
    }
}

/// Ordered, duplicate-free list of sandbox tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    tokens: Vec<Capability>,
}

impl CapabilitySet {
    pub fn new(tokens: &[Capability]) -> Self {
        let mut set = Self::default();
        for token in tokens {
            set.insert(*token);
        }
        set
    }

    pub fn insert(&mut self, token: Capability) {
        if !self.tokens.contains(&token) {
            self.tokens.push(token);
        }
    }

    pub fn contains(&self, token: Capability) -> bool {
        self.tokens.contains(&token)
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.tokens.iter().copied()
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for token in other.iter() {
            merged.insert(token);
        }
        merged
    }

    /// Renders the space separated `sandbox` attribute value.
    pub fn to_attribute(&self) -> String {
        self.tokens
            .iter()
            .map(|token| token.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Permissions-policy feature delegated to the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceAllowance {
    Accelerometer,
    Autoplay,
    EncryptedMedia,
    Gyroscope,
    PictureInPicture,
    Fullscreen,
    ClipboardWrite,
    DisplayCapture,
    Camera,
    Microphone,
}

impl DeviceAllowance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accelerometer => "accelerometer",
            Self::Autoplay => "autoplay",
            Self::EncryptedMedia => "encrypted-media",
            Self::Gyroscope => "gyroscope",
            Self::PictureInPicture => "picture-in-picture",
            Self::Fullscreen => "fullscreen",
            Self::ClipboardWrite => "clipboard-write",
            Self::DisplayCapture => "display-capture",
            Self::Camera => "camera",
            Self::Microphone => "microphone",
        }
    }

    /// Capture-class features never delegated to untrusted content.
    pub fn is_capture(self) -> bool {
        matches!(self, Self::DisplayCapture | Self::Camera | Self::Microphone)
    }
}

/// Renders the `allow` attribute value.
pub fn allow_attribute(allowances: &[DeviceAllowance]) -> String {
    allowances
        .iter()
        .map(|allowance| allowance.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
