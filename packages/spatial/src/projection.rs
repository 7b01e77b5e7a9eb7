//! Planar reprojection of observations and segments.
//!
//! Cones are built with planar distances, so observation positions and
//! segment geometry must share one distance-preserving coordinate reference
//! before any join. Reprojection runs once per input set, never per query.

use geo::{Coord, Geometry, MapCoords, Point};
use sidewalk_crowd_observation_models::ObservationSet;
use sidewalk_crowd_segment_models::SegmentCatalog;

/// Geographic longitude/latitude on WGS84.
pub const WGS84: &str = "EPSG:4326";

/// NAD83 / New York Long Island (US survey feet).
pub const NY_LONG_ISLAND_FTUS: &str = "EPSG:2263";

/// Errors from reprojection.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProjectionError {
    /// No projection is known between the two references.
    #[error("Unsupported reprojection from {from} to {to}")]
    Unsupported {
        /// Source reference.
        from: String,
        /// Target reference.
        to: String,
    },

    /// Input is declared in a different reference than the projection expects.
    #[error("Input is in {actual}, projection expects {expected}")]
    SourceMismatch {
        /// Reference the projection reads.
        expected: String,
        /// Reference the input declares.
        actual: String,
    },

    /// A coordinate could not be projected.
    #[error("Cannot project coordinate ({x}, {y})")]
    InvalidCoordinate {
        /// Input x (longitude for geographic sources).
        x: f64,
        /// Input y (latitude for geographic sources).
        y: f64,
    },
}

/// Converts coordinates from one reference to another.
pub trait Reprojector: Send + Sync {
    /// Authority code of the input reference.
    fn source(&self) -> &str;

    /// Authority code of the output reference.
    fn target(&self) -> &str;

    /// Projects a single coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::InvalidCoordinate`] if the coordinate
    /// cannot be represented in the target reference.
    fn project(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError>;

    /// Projects every coordinate of a geometry.
    ///
    /// # Errors
    ///
    /// Returns the first coordinate error encountered.
    fn project_geometry(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>, ProjectionError> {
        geometry.try_map_coords(|c| self.project(c))
    }
}

/// Pass-through projection for inputs already in the target reference.
#[derive(Debug, Clone)]
pub struct IdentityProjection {
    crs: String,
}

impl IdentityProjection {
    #[must_use]
    pub fn new(crs: impl Into<String>) -> Self {
        Self { crs: crs.into() }
    }
}

impl Reprojector for IdentityProjection {
    fn source(&self) -> &str {
        &self.crs
    }

    fn target(&self) -> &str {
        &self.crs
    }

    fn project(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        Ok(coord)
    }
}

/// Lambert Conformal Conic (two standard parallels) from geographic degrees
/// on the GRS80 ellipsoid.
#[derive(Debug, Clone)]
pub struct LambertConformalConic {
    source: String,
    target: String,
    e: f64,
    n: f64,
    a_f: f64,
    rho0: f64,
    lon0: f64,
    false_easting_m: f64,
    false_northing_m: f64,
    units_per_meter: f64,
}

const GRS80_A: f64 = 6_378_137.0;
const GRS80_INV_F: f64 = 298.257_222_101;
const US_SURVEY_FEET_PER_METER: f64 = 3937.0 / 1200.0;

impl LambertConformalConic {
    /// Builds the projection from its defining parameters (degrees and
    /// meters).
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        target: impl Into<String>,
        lat1: f64,
        lat2: f64,
        lat0: f64,
        lon0: f64,
        false_easting_m: f64,
        false_northing_m: f64,
        units_per_meter: f64,
    ) -> Self {
        let f = 1.0 / GRS80_INV_F;
        let e = f.mul_add(-f, 2.0 * f).sqrt();

        let (phi1, phi2, phi0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());
        let m1 = conformal_m(phi1, e);
        let m2 = conformal_m(phi2, e);
        let t1 = conformal_t(phi1, e);
        let t2 = conformal_t(phi2, e);
        let t0 = conformal_t(phi0, e);

        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let big_f = m1 / (n * t1.powf(n));
        let a_f = GRS80_A * big_f;

        Self {
            source: WGS84.to_string(),
            target: target.into(),
            e,
            n,
            a_f,
            rho0: a_f * t0.powf(n),
            lon0: lon0.to_radians(),
            false_easting_m,
            false_northing_m,
            units_per_meter,
        }
    }

    /// NAD83 / New York Long Island in US survey feet.
    #[must_use]
    pub fn ny_long_island_ftus() -> Self {
        Self::new(
            NY_LONG_ISLAND_FTUS,
            41.033_333_333_333_33,
            40.666_666_666_666_66,
            40.166_666_666_666_66,
            -74.0,
            300_000.0,
            0.0,
            US_SURVEY_FEET_PER_METER,
        )
    }
}

fn conformal_m(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    phi.cos() / es.mul_add(-es, 1.0).sqrt()
}

fn conformal_t(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (std::f64::consts::FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

impl Reprojector for LambertConformalConic {
    fn source(&self) -> &str {
        &self.source
    }

    fn target(&self) -> &str {
        &self.target
    }

    fn project(&self, coord: Coord<f64>) -> Result<Coord<f64>, ProjectionError> {
        let (lon, lat) = (coord.x, coord.y);
        if !lon.is_finite() || !lat.is_finite() || lat.abs() >= 90.0 || lon.abs() > 180.0 {
            return Err(ProjectionError::InvalidCoordinate { x: lon, y: lat });
        }

        let t = conformal_t(lat.to_radians(), self.e);
        let rho = self.a_f * t.powf(self.n);
        let theta = self.n * (lon.to_radians() - self.lon0);

        let x = rho.mul_add(theta.sin(), self.false_easting_m);
        let y = rho.mul_add(-theta.cos(), self.false_northing_m + self.rho0);

        if !x.is_finite() || !y.is_finite() {
            return Err(ProjectionError::InvalidCoordinate { x: lon, y: lat });
        }

        Ok(Coord {
            x: x * self.units_per_meter,
            y: y * self.units_per_meter,
        })
    }
}

/// Returns a projection from `from` to `to`.
///
/// # Errors
///
/// Returns [`ProjectionError::Unsupported`] if no projection between the two
/// references is known.
pub fn projection_between(from: &str, to: &str) -> Result<Box<dyn Reprojector>, ProjectionError> {
    if from.eq_ignore_ascii_case(to) {
        return Ok(Box::new(IdentityProjection::new(to)));
    }
    if from.eq_ignore_ascii_case(WGS84) && to.eq_ignore_ascii_case(NY_LONG_ISLAND_FTUS) {
        return Ok(Box::new(LambertConformalConic::ny_long_island_ftus()));
    }
    Err(ProjectionError::Unsupported {
        from: from.to_string(),
        to: to.to_string(),
    })
}

fn check_source(projection: &dyn Reprojector, crs: &str) -> Result<(), ProjectionError> {
    if projection.source().eq_ignore_ascii_case(crs) {
        Ok(())
    } else {
        Err(ProjectionError::SourceMismatch {
            expected: projection.source().to_string(),
            actual: crs.to_string(),
        })
    }
}

/// Reprojects every observation position.
///
/// # Errors
///
/// Returns an error if the set is not in the projection's source reference
/// or any position cannot be projected.
pub fn reproject_observations(
    set: ObservationSet,
    projection: &dyn Reprojector,
) -> Result<ObservationSet, ProjectionError> {
    check_source(projection, &set.crs)?;

    let observations = set
        .observations
        .into_iter()
        .map(|mut obs| {
            obs.position = Point(projection.project(obs.position.0)?);
            Ok(obs)
        })
        .collect::<Result<Vec<_>, ProjectionError>>()?;

    log::debug!(
        "Reprojected {} observations from {} to {}",
        observations.len(),
        projection.source(),
        projection.target()
    );

    Ok(ObservationSet::new(
        projection.target().to_string(),
        observations,
    ))
}

/// Reprojects every segment geometry. Widths are left as loaded.
///
/// # Errors
///
/// Returns an error if the catalog is not in the projection's source
/// reference or any vertex cannot be projected.
pub fn reproject_catalog(
    catalog: SegmentCatalog,
    projection: &dyn Reprojector,
) -> Result<SegmentCatalog, ProjectionError> {
    check_source(projection, &catalog.crs)?;

    let segments = catalog
        .segments
        .into_iter()
        .map(|mut segment| {
            segment.geometry = projection.project_geometry(&segment.geometry)?;
            Ok(segment)
        })
        .collect::<Result<Vec<_>, ProjectionError>>()?;

    Ok(SegmentCatalog::new(projection.target().to_string(), segments))
}

#[cfg(test)]
mod tests {
    use sidewalk_crowd_observation_models::{DetectionCounts, Direction, Observation};

    use super::*;

    #[test]
    fn projection_origin_maps_to_false_origin() {
        let lcc = LambertConformalConic::ny_long_island_ftus();
        let projected = lcc
            .project(Coord {
                x: -74.0,
                y: 40.166_666_666_666_66,
            })
            .unwrap();

        assert!((projected.x - 984_250.0).abs() < 1e-3);
        assert!(projected.y.abs() < 1e-3);
    }

    #[test]
    fn preserves_local_distances() {
        let lcc = LambertConformalConic::ny_long_island_ftus();
        let a = lcc.project(Coord { x: -73.95, y: 40.70 }).unwrap();
        let b = lcc.project(Coord { x: -73.95, y: 40.701 }).unwrap();

        // 0.001 degrees of latitude is roughly 111 meters, or 364 feet.
        let feet = (a.x - b.x).hypot(a.y - b.y);
        assert!((feet - 364.0).abs() < 4.0, "got {feet}");
        // North stays north.
        assert!(b.y > a.y);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let lcc = LambertConformalConic::ny_long_island_ftus();
        assert!(lcc.project(Coord { x: 0.0, y: 95.0 }).is_err());
        assert!(lcc.project(Coord { x: f64::NAN, y: 40.0 }).is_err());
    }

    #[test]
    fn finds_supported_projections() {
        assert_eq!(
            projection_between(WGS84, NY_LONG_ISLAND_FTUS).unwrap().target(),
            NY_LONG_ISLAND_FTUS
        );
        assert_eq!(
            projection_between("EPSG:2263", "epsg:2263").unwrap().source(),
            "epsg:2263"
        );
        assert!(matches!(
            projection_between("EPSG:3857", NY_LONG_ISLAND_FTUS),
            Err(ProjectionError::Unsupported { .. })
        ));
    }

    #[test]
    fn reprojects_observation_sets() {
        let set = ObservationSet::new(
            WGS84.to_string(),
            vec![Observation {
                frame_id: "f1".to_string(),
                position: Point::new(-74.0, 40.166_666_666_666_66),
                direction: Direction::North,
                captured_at_ms: 0,
                counts: DetectionCounts::default(),
            }],
        );

        let projected =
            reproject_observations(set.clone(), &LambertConformalConic::ny_long_island_ftus())
                .unwrap();
        assert_eq!(projected.crs, NY_LONG_ISLAND_FTUS);
        assert!((projected.observations[0].position.x() - 984_250.0).abs() < 1e-3);

        let err = reproject_observations(set, &IdentityProjection::new(NY_LONG_ISLAND_FTUS));
        assert!(matches!(err, Err(ProjectionError::SourceMismatch { .. })));
    }
}
