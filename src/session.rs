//! The top-level rendering session.
//!
//! A [`SceneSession`] owns the backend, at most one loaded asset, at most one
//! environment, the camera projection and the host's selection callback. The
//! backend is created lazily on first use and lives until [`SceneSession::destroy`]
//! (or drop).
//!
//! Every mutating call takes `&mut self`, so a second load can never overlap a
//! running one. Hosts that share a session between threads put it behind a
//! `Mutex`; callers then queue in lock order.

use std::sync::Arc;

use cgmath::Deg;
use instant::Instant;

use crate::{
    asset::{AssetInstantiator, LoadedAsset},
    backend::{RenderBackend, recording::RecordingBackend},
    camera::{Camera, CameraMatrices, Projection},
    config::{SessionConfig, ViewOptions},
    data_structures::color::Rgba,
    error::{BackendError, Result, SessionError},
    patch::{
        ColorPatch, Overrides, SelectionEntry, apply_color_patches, apply_selection, unselect,
    },
    resources::{
        ResourceTable,
        environment::{self, EnvironmentState},
    },
};

/// Receives the selectable entities once per successful load.
pub type SelectionCallback = Box<dyn FnMut(&[SelectionEntry]) + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    BackendReady,
    AssetLoaded,
    Destroyed,
}

/// Everything needed to load one model.
#[derive(Clone, Debug, Default)]
pub struct LoadRequest {
    pub model_bytes: Vec<u8>,
    /// Used for labels and logs; the container form is detected from content.
    pub model_name: String,
    pub resources: ResourceTable,
    pub preselected_entities: Option<Vec<String>>,
    pub selection_color: Option<Rgba>,
    pub patch_colors: Option<Vec<ColorPatch>>,
}

impl LoadRequest {
    pub fn new(model_bytes: impl Into<Vec<u8>>, model_name: impl Into<String>) -> Self {
        Self {
            model_bytes: model_bytes.into(),
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn with_resources(mut self, resources: ResourceTable) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_resource(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.resources.insert(name, bytes);
        self
    }

    pub fn preselect<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preselected_entities = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_selection_color(mut self, color: impl Into<Rgba>) -> Self {
        self.selection_color = Some(color.into());
        self
    }

    pub fn patch(mut self, name: impl Into<String>, color: impl Into<Rgba>) -> Self {
        self.patch_colors
            .get_or_insert_with(Vec::new)
            .push(ColorPatch::new(name, color));
        self
    }
}

pub struct SceneSession<B: RenderBackend = RecordingBackend> {
    config: SessionConfig,
    async_runtime: Arc<tokio::runtime::Runtime>,
    backend: Option<B>,
    asset: Option<LoadedAsset>,
    overrides: Overrides,
    environment: Option<EnvironmentState>,
    camera: Camera,
    projection: Projection,
    selection_callback: Option<SelectionCallback>,
    animation_start: Instant,
    destroyed: bool,
}

impl<B: RenderBackend> SceneSession<B> {
    /// Create a session. The backend is not created until it is first needed.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let async_runtime = tokio::runtime::Builder::new_current_thread()
            .max_blocking_threads(config.decode_workers.max(1))
            .thread_name("texture-decode")
            .enable_all()
            .build()
            .map_err(|e| BackendError::from(anyhow::Error::new(e).context("decode runtime")))?;
        let projection = Projection::new(
            config.viewport[0],
            config.viewport[1],
            Deg(config.default_fov),
            config.near,
            config.far,
        );
        Ok(Self {
            config,
            async_runtime: Arc::new(async_runtime),
            backend: None,
            asset: None,
            overrides: Overrides::default(),
            environment: None,
            camera: Camera::looking_at([0.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            projection,
            selection_callback: None,
            animation_start: Instant::now(),
            destroyed: false,
        })
    }

    pub fn state(&self) -> SessionState {
        match (self.destroyed, &self.backend, &self.asset) {
            (true, _, _) => SessionState::Destroyed,
            (false, None, _) => SessionState::Uninitialized,
            (false, Some(_), None) => SessionState::BackendReady,
            (false, Some(_), Some(_)) => SessionState::AssetLoaded,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    pub fn asset(&self) -> Option<&LoadedAsset> {
        self.asset.as_ref()
    }

    pub fn environment(&self) -> Option<EnvironmentState> {
        self.environment
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    pub fn zoom(&self) -> f32 {
        self.projection.zoom()
    }

    pub fn set_selection_callback(
        &mut self,
        callback: impl FnMut(&[SelectionEntry]) + Send + 'static,
    ) {
        self.selection_callback = Some(Box::new(callback));
    }

    pub fn clear_selection_callback(&mut self) {
        self.selection_callback = None;
    }

    fn ensure_live(&self, operation: &str) -> Result<()> {
        if self.destroyed {
            return Err(SessionError::usage(format!(
                "{operation} called on a destroyed session"
            )));
        }
        Ok(())
    }

    /// Create the backend if it does not exist yet. Never recreates it.
    pub fn ensure_backend(&mut self) -> Result<&mut B> {
        self.ensure_live("ensure_backend")?;
        if self.backend.is_none() {
            let mut backend = B::create_context(&self.config)?;
            backend.set_camera(&CameraMatrices::new(&self.camera, &self.projection));
            backend.set_view_options(&self.config.view_options);
            log::info!(
                "Backend ready ({}x{}, fov {}°)",
                self.config.viewport[0],
                self.config.viewport[1],
                self.projection.fovy().0
            );
            self.backend = Some(backend);
        }
        self.backend
            .as_mut()
            .ok_or_else(|| SessionError::usage("backend is unavailable"))
    }

    /// Load a model, replacing the current one only if the load succeeds.
    ///
    /// Blocks the calling thread until textures are decoded and uploaded.
    /// Must not be called from inside an async runtime; use
    /// [`SceneSession::load_model_async`] there.
    pub fn load_model(&mut self, request: LoadRequest) -> Result<()> {
        let async_runtime = Arc::clone(&self.async_runtime);
        async_runtime.block_on(self.load_model_async(request))
    }

    pub async fn load_model_async(&mut self, request: LoadRequest) -> Result<()> {
        self.ensure_live("load_model")?;
        self.ensure_backend()?;
        let Some(backend) = self.backend.as_mut() else {
            return Err(SessionError::usage("backend is unavailable"));
        };
        let LoadRequest {
            model_bytes,
            model_name,
            resources,
            preselected_entities,
            selection_color,
            patch_colors,
        } = request;

        let asset = AssetInstantiator::from_config(&self.config)
            .instantiate(backend, &model_bytes, &model_name, resources)
            .await?;
        drop(model_bytes);

        if let Some(previous) = self.asset.take() {
            log::info!("Replacing {} with {}", previous.name(), asset.name());
            previous.destroy(backend);
        }
        self.overrides.clear();
        asset.attach(backend);
        if let Some(patches) = &patch_colors {
            apply_color_patches(backend, &asset, &mut self.overrides, patches);
        }
        let selection = apply_selection(
            backend,
            &asset,
            &mut self.overrides,
            preselected_entities.as_deref().unwrap_or_default(),
            selection_color,
        );
        self.asset = Some(asset);
        self.animation_start = Instant::now();

        if let Some(callback) = self.selection_callback.as_mut() {
            callback(&selection);
        }
        Ok(())
    }

    /// Install a new indirect light and skybox, releasing the previous pair
    /// only once the new one is in place.
    pub fn load_environment(&mut self, ibl: &[u8], skybox: &[u8]) -> Result<()> {
        self.ensure_live("load_environment")?;
        environment::require_pair(ibl, skybox)?;
        let intensity = self.config.ibl_intensity;
        let backend = self.ensure_backend()?;
        let state = environment::load_environment(backend, ibl, skybox, intensity)?;
        backend.set_environment(Some(state.as_pair()));
        if let Some(previous) = self.environment.replace(state) {
            if let Some(backend) = self.backend.as_mut() {
                previous.destroy(backend);
            }
        }
        Ok(())
    }

    /// Zoom by narrowing the field of view: fov = default fov / `factor`.
    pub fn set_camera_zoom_level(&mut self, factor: f32) -> Result<()> {
        self.ensure_live("set_camera_zoom_level")?;
        self.projection.set_zoom(factor)?;
        self.push_camera();
        Ok(())
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) -> Result<()> {
        self.ensure_live("set_viewport")?;
        self.projection.resize(width, height);
        if width > 0 && height > 0 {
            self.config.viewport = [width, height];
            if let Some(backend) = self.backend.as_mut() {
                backend.set_viewport(width, height);
            }
        }
        self.push_camera();
        Ok(())
    }

    pub fn set_view_options(&mut self, options: ViewOptions) -> Result<()> {
        self.ensure_live("set_view_options")?;
        if let Some(backend) = self.backend.as_mut() {
            backend.set_view_options(&options);
        }
        self.config.view_options = options;
        Ok(())
    }

    fn push_camera(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.set_camera(&CameraMatrices::new(&self.camera, &self.projection));
        }
    }

    /// Advance the current animation and draw one frame.
    ///
    /// Never fails: without a backend this is a logged no-op, and submit
    /// errors are logged so the next call simply renders again.
    pub fn render(&mut self) {
        if self.destroyed {
            log::warn!("render called on a destroyed session");
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            log::warn!("render called before the backend is ready");
            return;
        };
        if let Some(asset) = self.asset.as_mut() {
            asset.animate(backend, self.animation_start.elapsed().as_secs_f32());
        }
        if let Err(e) = backend.submit_frame() {
            log::error!("Unable to render {}", e);
        }
    }

    /// Release the current asset. Does nothing when no asset is loaded.
    pub fn destroy_model(&mut self) {
        let Some(asset) = self.asset.take() else {
            return;
        };
        self.overrides.clear();
        match self.backend.as_mut() {
            Some(backend) => asset.destroy(backend),
            None => log::warn!("asset {} outlived its backend", asset.name()),
        }
    }

    /// Take the selection highlight off the given entities, or off all of them
    /// when `ids` is `None`. Color patches stay in place. Clearing everything
    /// also reports an empty selection to the callback.
    pub fn unselect_entities(&mut self, ids: Option<&[u32]>) -> Result<usize> {
        self.ensure_live("unselect_entities")?;
        let (Some(backend), Some(asset)) = (self.backend.as_mut(), self.asset.as_ref()) else {
            return Ok(0);
        };
        let restored = unselect(backend, asset, &mut self.overrides, ids);
        if ids.is_none() {
            if let Some(callback) = self.selection_callback.as_mut() {
                callback(&[]);
            }
        }
        Ok(restored)
    }

    /// Release the asset, the environment and the backend, in that order.
    /// Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroy_model();
        if let Some(backend) = self.backend.as_mut() {
            if let Some(environment) = self.environment.take() {
                backend.set_environment(None);
                environment.destroy(backend);
            }
            backend.destroy_context();
        }
        self.environment = None;
        self.backend = None;
        self.selection_callback = None;
        self.destroyed = true;
        log::info!("Session destroyed");
    }
}

impl<B: RenderBackend> Drop for SceneSession<B> {
    fn drop(&mut self) {
        self.destroy();
    }
}
