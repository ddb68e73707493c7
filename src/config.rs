//! Session configuration.
//!
//! Everything here is consumed when the session is created or when the
//! backend is brought up. Backend-specific knobs travel opaquely in
//! [`BackendOptions`].

use std::{collections::BTreeMap, str::FromStr};

use crate::data_structures::color::Rgba;

/// Opaque creation parameters handed to the rendering backend.
///
/// The session never interprets these. Each backend documents the keys it
/// understands and ignores the rest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BackendOptions {
    entries: BTreeMap<String, String>,
}

impl BackendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> Option<String> {
        self.entries.insert(key.into(), value.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Parse the value stored under `key`. Unparsable values are logged and
    /// treated as absent.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                log::warn!("backend option {}={} could not be parsed", key, raw);
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for BackendOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (k, v) in iter {
            options.insert(k, v);
        }
        options
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QualityLevel {
    Low,
    #[default]
    Medium,
    High,
    Ultra,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AntiAliasing {
    None,
    #[default]
    Fxaa,
}

/// Post-processing and quality settings forwarded to the backend view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewOptions {
    pub hdr_color_buffer: QualityLevel,
    /// `None` disables dynamic resolution.
    pub dynamic_resolution: Option<QualityLevel>,
    pub msaa: bool,
    pub anti_aliasing: AntiAliasing,
    pub ambient_occlusion: bool,
    pub bloom: bool,
}

impl Default for ViewOptions {
    fn default() -> Self {
        Self {
            hdr_color_buffer: QualityLevel::Medium,
            dynamic_resolution: Some(QualityLevel::Medium),
            msaa: true,
            anti_aliasing: AntiAliasing::Fxaa,
            ambient_occlusion: true,
            bloom: true,
        }
    }
}

/// Parameters for a [`crate::session::SceneSession`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub backend_options: BackendOptions,
    /// Initial viewport size in pixels, used for the projection aspect ratio.
    pub viewport: [u32; 2],
    /// Vertical field of view at zoom level 1, in degrees.
    pub default_fov: f32,
    pub near: f32,
    pub far: f32,
    /// Where auto-scaled models are centred. The camera sits at the origin
    /// looking down -Z.
    pub object_position: [f32; 3],
    /// Fit every loaded model into a unit cube around `object_position`.
    pub auto_scale: bool,
    pub ibl_intensity: f32,
    pub clear_color: Rgba,
    pub view_options: ViewOptions,
    /// Upper bound on threads decoding textures concurrently.
    pub decode_workers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_options: BackendOptions::default(),
            viewport: [1280, 720],
            default_fov: 50.0,
            near: 0.1,
            far: 100.0,
            object_position: [0.0, 0.0, -4.0],
            auto_scale: true,
            ibl_intensity: 30_000.0,
            clear_color: Rgba::new(0.9, 0.9, 0.95, 1.0),
            view_options: ViewOptions::default(),
            decode_workers: 4,
        }
    }
}
