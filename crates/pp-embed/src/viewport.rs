//! Player viewport sizing.

pub const DEFAULT_WIDTH: u32 = 900;
pub const DEFAULT_HEIGHT: u32 = 600;
pub const MIN_WIDTH: u32 = 400;
pub const MIN_HEIGHT: u32 = 300;

/// Size of a windowed player, in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

impl ViewportSize {
    /// Applies a drag delta, clamping to the minimum player size.
    pub fn resized(self, dx: i32, dy: i32) -> Self {
        Self {
            width: self.width.saturating_add_signed(dx).max(MIN_WIDTH),
            height: self.height.saturating_add_signed(dy).max(MIN_HEIGHT),
        }
    }
}
