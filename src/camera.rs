//! Camera and projection.
//!
//! The camera sits at a fixed eye position; zooming narrows or widens the
//! vertical field of view instead of moving the eye.

use cgmath::{Deg, Matrix4, Point3, SquareMatrix, Vector3, perspective};

use crate::error::{Result, SessionError};

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub eye: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn looking_at(eye: impl Into<Point3<f32>>, target: impl Into<Point3<f32>>) -> Self {
        Self {
            eye: eye.into(),
            target: target.into(),
            up: Vector3::unit_y(),
        }
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.eye, self.target, self.up)
    }
}

/// Perspective projection with a zoom factor applied to the field of view.
///
/// Zoom 1 yields `default_fovy`, larger factors zoom in (smaller fov), smaller
/// factors zoom out.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    aspect: f32,
    default_fovy: Deg<f32>,
    zoom: f32,
    znear: f32,
    zfar: f32,
}

impl Projection {
    pub fn new(width: u32, height: u32, default_fovy: Deg<f32>, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width.max(1) as f32 / height.max(1) as f32,
            default_fovy,
            zoom: 1.0,
            znear,
            zfar,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            log::warn!("Cannot resize projection: dimensions are zero.");
            return;
        }
        self.aspect = width as f32 / height as f32;
    }

    /// Rejects non-positive or non-finite factors and leaves the projection untouched.
    pub fn set_zoom(&mut self, zoom: f32) -> Result<()> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(SessionError::usage(format!(
                "zoom factor must be positive, got {zoom}"
            )));
        }
        self.zoom = zoom;
        log::debug!("Camera zoom set: zoom = {}, fov = {:?}", zoom, self.fovy());
        Ok(())
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn fovy(&self) -> Deg<f32> {
        Deg(self.default_fovy.0 / self.zoom)
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy(), self.aspect, self.znear, self.zfar)
    }
}

/// Matrices handed to the backend whenever the camera or projection changes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraMatrices {
    pub eye: Point3<f32>,
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
}

impl CameraMatrices {
    pub fn new(camera: &Camera, projection: &Projection) -> Self {
        Self {
            eye: camera.eye,
            view: camera.view_matrix(),
            projection: projection.calc_matrix(),
        }
    }

    pub fn view_proj(&self) -> Matrix4<f32> {
        self.projection * self.view
    }

    pub fn inv_view_proj(&self) -> Matrix4<f32> {
        self.view_proj().invert().unwrap_or_else(Matrix4::identity)
    }
}
