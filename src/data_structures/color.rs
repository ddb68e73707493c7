use crate::error::{Result, SessionError};

/// Linear RGBA color with four `f32` channels in `0.0..=1.0`.
///
/// Used for material base colors, selection highlights and color patches.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Rgba(pub [f32; 4]);

impl Rgba {
    pub const WHITE: Rgba = Rgba([1.0, 1.0, 1.0, 1.0]);
    pub const RED: Rgba = Rgba([1.0, 0.0, 0.0, 1.0]);
    pub const GREEN: Rgba = Rgba([0.0, 1.0, 0.0, 1.0]);

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self([r, g, b, a])
    }

    pub fn r(&self) -> f32 {
        self.0[0]
    }

    pub fn g(&self) -> f32 {
        self.0[1]
    }

    pub fn b(&self) -> f32 {
        self.0[2]
    }

    pub fn a(&self) -> f32 {
        self.0[3]
    }

    /// Build a color from the channel list a host hands over (usually doubles).
    ///
    /// Exactly four finite channels are required. Values outside `0..=1` are
    /// clamped.
    pub fn try_from_channels(channels: &[f64]) -> Result<Self> {
        let [r, g, b, a] = channels else {
            return Err(SessionError::usage(format!(
                "a color needs exactly 4 channels, got {}",
                channels.len()
            )));
        };
        let mut out = [0.0f32; 4];
        for (slot, value) in out.iter_mut().zip([r, g, b, a]) {
            if !value.is_finite() {
                return Err(SessionError::usage(format!(
                    "color channel {value} is not finite"
                )));
            }
            if !(0.0..=1.0).contains(value) {
                log::warn!("color channel {} clamped into 0..=1", value);
            }
            *slot = value.clamp(0.0, 1.0) as f32;
        }
        Ok(Self(out))
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

impl From<[f32; 4]> for Rgba {
    fn from(value: [f32; 4]) -> Self {
        Self(value)
    }
}

impl From<Rgba> for [f32; 4] {
    fn from(value: Rgba) -> Self {
        value.0
    }
}
