//! Field-of-view cone construction.
//!
//! A cone is a polygonal fan: the camera position, a fixed number of points
//! sampled on a circle of radius `max_distance` across the field of view,
//! and the camera position again. It is an approximation of what the camera
//! could plausibly see, not a projected frustum.

use geo::{Coord, LineString, Point, Polygon};

/// Default number of arc samples per cone.
pub const DEFAULT_SAMPLES: usize = 10;

/// Smallest number of arc samples accepted.
pub const MIN_SAMPLES: usize = 8;

/// Default field-of-view width in degrees (±90° around the heading).
pub const DEFAULT_FIELD_OF_VIEW_DEGREES: f64 = 180.0;

/// Errors from invalid cone parameters.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConeError {
    /// Sensing distance must be a positive finite number.
    #[error("max distance must be positive and finite, got {0}")]
    InvalidDistance(f64),

    /// Field of view must lie in `(0, 360)` degrees.
    #[error("field of view must be within (0, 360) degrees, got {0}")]
    InvalidFieldOfView(f64),

    /// Too few arc samples to approximate the fan.
    #[error("at least {MIN_SAMPLES} arc samples are required, got {0}")]
    TooFewSamples(usize),
}

/// Fixed run parameters shared by every cone of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConeShape {
    max_distance: f64,
    field_of_view_degrees: f64,
    samples: usize,
}

impl ConeShape {
    /// Validates and creates a cone shape.
    ///
    /// # Errors
    ///
    /// Returns a [`ConeError`] if `max_distance` is not positive, the field of
    /// view is outside `(0, 360)`, or fewer than [`MIN_SAMPLES`] samples are
    /// requested.
    pub fn new(
        max_distance: f64,
        field_of_view_degrees: f64,
        samples: usize,
    ) -> Result<Self, ConeError> {
        if !max_distance.is_finite() || max_distance <= 0.0 {
            return Err(ConeError::InvalidDistance(max_distance));
        }
        if !field_of_view_degrees.is_finite()
            || field_of_view_degrees <= 0.0
            || field_of_view_degrees >= 360.0
        {
            return Err(ConeError::InvalidFieldOfView(field_of_view_degrees));
        }
        if samples < MIN_SAMPLES {
            return Err(ConeError::TooFewSamples(samples));
        }

        Ok(Self {
            max_distance,
            field_of_view_degrees,
            samples,
        })
    }

    /// Shape with the default field of view and sample count.
    ///
    /// # Errors
    ///
    /// Returns [`ConeError::InvalidDistance`] if `max_distance` is not
    /// positive.
    pub fn with_distance(max_distance: f64) -> Result<Self, ConeError> {
        Self::new(max_distance, DEFAULT_FIELD_OF_VIEW_DEGREES, DEFAULT_SAMPLES)
    }

    #[must_use]
    pub const fn max_distance(&self) -> f64 {
        self.max_distance
    }

    #[must_use]
    pub const fn field_of_view_degrees(&self) -> f64 {
        self.field_of_view_degrees
    }

    #[must_use]
    pub const fn samples(&self) -> usize {
        self.samples
    }

    /// Builds the cone polygon for a camera at `origin` facing
    /// `heading_degrees`.
    ///
    /// Sample angles are evenly spaced from `heading - fov/2` to
    /// `heading + fov/2` inclusive, and each arc point is
    /// `(x + d·cos θ, y + d·sin θ)`.
    #[must_use]
    pub fn build(&self, origin: Point<f64>, heading_degrees: f64) -> Polygon<f64> {
        let heading = heading_degrees.to_radians();
        let half = self.field_of_view_degrees.to_radians() / 2.0;
        let start = heading - half;
        #[allow(clippy::cast_precision_loss)]
        let step = (2.0 * half) / (self.samples - 1) as f64;

        let mut ring = Vec::with_capacity(self.samples + 2);
        ring.push(origin.0);
        for i in 0..self.samples {
            #[allow(clippy::cast_precision_loss)]
            let angle = (i as f64).mul_add(step, start);
            ring.push(Coord {
                x: self.max_distance.mul_add(angle.cos(), origin.x()),
                y: self.max_distance.mul_add(angle.sin(), origin.y()),
            });
        }
        ring.push(origin.0);

        Polygon::new(LineString::new(ring), vec![])
    }
}

/// Builds a cone with the default field of view and sample count.
///
/// # Errors
///
/// Returns [`ConeError::InvalidDistance`] if `max_distance` is not positive.
pub fn build_cone(
    origin: Point<f64>,
    heading_degrees: f64,
    max_distance: f64,
) -> Result<Polygon<f64>, ConeError> {
    Ok(ConeShape::with_distance(max_distance)?.build(origin, heading_degrees))
}
