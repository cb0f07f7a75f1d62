//! Committed calibration data, one record per connection
//!
//! Records are created on the first write for a connection. Every write runs
//! its math first and takes the write lock only to commit, so a failed solve
//! leaves the record untouched.

use alignkit_core::geometry::{
    rotation_center, solve_affine, AffineTransform, CalibrationInfo, RotationCenterFit,
};
use alignkit_core::types::{thread_safe_rw_map, ThreadSafeRwMap};
use alignkit_core::{compute_sign_u, AlignmentError, DeviceName, Error, GeometryError, Point3};
use alignkit_settings::AlignmentParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Calibration data for one connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerConnectionCalibration {
    /// Pixel → real transform per camera
    pub pixel_to_real: HashMap<DeviceName, AffineTransform>,
    /// Real → pixel transform per camera
    pub real_to_pixel: HashMap<DeviceName, AffineTransform>,
    /// Registered golden pixel readings per camera
    pub pixel_golden: HashMap<DeviceName, Vec<Point3>>,
    /// Robot pose recorded at registration
    pub real_golden: Point3,
    /// Rotation center per camera, in pixels
    pub rotation_centers: HashMap<DeviceName, Point3>,
    /// First real position of the latest affine calibration
    pub origin: Point3,
}

impl PerConnectionCalibration {
    /// Clear transforms, goldens and rotation centers
    ///
    /// `origin` is left as is.
    pub fn clear(&mut self) {
        self.pixel_to_real.clear();
        self.real_to_pixel.clear();
        self.pixel_golden.clear();
        self.rotation_centers.clear();
        self.real_golden = Point3::ZERO;
    }

    /// Whether `camera` has a pixel → real transform
    pub fn is_calibrated(&self, camera: &DeviceName) -> bool {
        self.pixel_to_real.contains_key(camera)
    }
}

/// Result of [`CalibrationStore::calibrate_from_pairs`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOutcome {
    /// Decomposition of the fitted pixel → real transform
    pub info: CalibrationInfo,
    pub pixel_to_real: AffineTransform,
    pub real_to_pixel: AffineTransform,
    pub affine_rmse: f64,
    /// Rotation center, when enough rotation pairs were given
    pub rotation: Option<RotationCenterFit>,
}

impl CalibrationOutcome {
    /// Rotation center or zero
    pub fn rotation_center(&self) -> Point3 {
        self.rotation.map(|r| r.center).unwrap_or_default()
    }

    /// Rotation fit error or zero
    pub fn rotation_rmse(&self) -> f64 {
        self.rotation.map(|r| r.rmse).unwrap_or(0.0)
    }
}

/// Shared store of committed calibration, keyed by connection
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    records: ThreadSafeRwMap<DeviceName, PerConnectionCalibration>,
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self {
            records: thread_safe_rw_map(),
        }
    }

    /// Solve and commit a calibration from `(pixel, real)` pairs
    ///
    /// The first `affine_count` pairs fit the pixel → real transform. The next
    /// `rotation_count` pairs estimate the rotation center with
    /// `params.rotation_method`, after their U angles are sign-corrected for
    /// the configured axis convention. Fewer than two rotation pairs skip the
    /// rotation center.
    ///
    /// Commits `pixel_to_real`, `real_to_pixel`, `origin` (the first real
    /// position) and, when solved, the rotation center.
    pub fn calibrate_from_pairs(
        &self,
        connection: &DeviceName,
        camera: &DeviceName,
        pairs: &[(Point3, Point3)],
        affine_count: usize,
        rotation_count: usize,
        params: &AlignmentParams,
    ) -> Result<CalibrationOutcome, Error> {
        if affine_count < 3 {
            return Err(GeometryError::invalid_input(format!(
                "affine fit needs at least 3 pairs, got {}",
                affine_count
            ))
            .into());
        }
        if pairs.len() < affine_count + rotation_count {
            return Err(GeometryError::invalid_input(format!(
                "{} pairs given, {} affine + {} rotation requested",
                pairs.len(),
                affine_count,
                rotation_count
            ))
            .into());
        }

        let (pixels, reals): (Vec<Point3>, Vec<Point3>) = pairs[..affine_count].iter().copied().unzip();
        let fit = solve_affine(&pixels, &reals)?;
        let inverse = fit.transform.invert()?;
        let info = fit.transform.decompose();

        let rotation = if rotation_count >= 2 {
            let sign = f64::from(compute_sign_u(
                params.x_positive,
                params.y_positive,
                params.u_rotation,
            )?);
            let probes = &pairs[affine_count..affine_count + rotation_count];
            let rc_pixels: Vec<Point3> = probes.iter().map(|(px, _)| *px).collect();
            let rc_angles: Vec<Point3> = probes
                .iter()
                .map(|(_, real)| real.with_u(real.u * sign))
                .collect();
            Some(rotation_center(params.rotation_method, &rc_pixels, &rc_angles)?)
        } else {
            None
        };

        {
            let mut records = self.records.write();
            let record = records.entry(connection.clone()).or_default();
            record.pixel_to_real.insert(camera.clone(), fit.transform);
            record.real_to_pixel.insert(camera.clone(), inverse);
            record.origin = reals[0];
            if let Some(rc) = &rotation {
                record.rotation_centers.insert(camera.clone(), rc.center);
            }
        }

        tracing::debug!(
            "Committed calibration {}/{}: theta {:.4} deg, sx {:.6}, sy {:.6}, shear {:.6}",
            connection,
            camera,
            info.theta_deg,
            info.sx,
            info.sy,
            info.shear
        );

        Ok(CalibrationOutcome {
            info,
            pixel_to_real: fit.transform,
            real_to_pixel: inverse,
            affine_rmse: fit.rmse,
            rotation,
        })
    }

    /// Record the golden pixel readings of one camera and the connection's golden pose
    pub fn register_golden(
        &self,
        connection: &DeviceName,
        camera: &DeviceName,
        pixel_golden: Vec<Point3>,
        real_golden: Point3,
    ) {
        let mut records = self.records.write();
        let record = records.entry(connection.clone()).or_default();
        record.pixel_golden.insert(camera.clone(), pixel_golden);
        record.real_golden = real_golden;
    }

    /// Record one golden pixel per camera under a single write lock
    pub fn register_goldens(
        &self,
        connection: &DeviceName,
        pixels: &[(DeviceName, Point3)],
        real_golden: Point3,
    ) {
        let mut records = self.records.write();
        let record = records.entry(connection.clone()).or_default();
        for (camera, pixel) in pixels {
            record.pixel_golden.insert(camera.clone(), vec![*pixel]);
        }
        record.real_golden = real_golden;
    }

    /// Correction that brings the golden pixel reading onto the golden pose
    ///
    /// `real_golden − pixel_to_real(pixel_golden[0]) + trim`, each axis clamped
    /// to `±offset_limit`. A non-positive limit leaves that axis unclamped.
    pub fn compute_offset(
        &self,
        connection: &DeviceName,
        camera: &DeviceName,
        params: &AlignmentParams,
    ) -> Result<Point3, AlignmentError> {
        let records = self.records.read();
        let record = records
            .get(connection)
            .ok_or_else(|| missing_calibration(connection, camera))?;
        let p2r = record
            .pixel_to_real
            .get(camera)
            .ok_or_else(|| missing_calibration(connection, camera))?;
        let golden_pixel = record
            .pixel_golden
            .get(camera)
            .and_then(|g| g.first())
            .ok_or_else(|| AlignmentError::MissingGolden {
                connection: connection.to_string(),
                camera: camera.to_string(),
            })?;

        let diff = record
            .real_golden
            .subtract(&p2r.apply(golden_pixel))
            .add(&params.offset_trim);

        Ok(Point3::new(
            clamp_axis(diff.x, params.offset_limit.x),
            clamp_axis(diff.y, params.offset_limit.y),
            clamp_axis(diff.u, params.offset_limit.u),
        ))
    }

    /// Pixel → real transforms for `cameras`, in order
    ///
    /// Fails with [`AlignmentError::MissingCalibration`] on the first camera
    /// without one.
    pub fn transforms_for(
        &self,
        connection: &DeviceName,
        cameras: &[DeviceName],
    ) -> Result<(Vec<AffineTransform>, Point3), AlignmentError> {
        let records = self.records.read();
        let record = records
            .get(connection)
            .ok_or_else(|| missing_calibration(connection, &DeviceName::default()))?;

        let transforms = cameras
            .iter()
            .map(|cam| {
                record
                    .pixel_to_real
                    .get(cam)
                    .copied()
                    .ok_or_else(|| missing_calibration(connection, cam))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok((transforms, record.real_golden))
    }

    /// Clear the connection's calibration; other connections are untouched
    pub fn clear_calibration(&self, connection: &DeviceName) {
        if let Some(record) = self.records.write().get_mut(connection) {
            record.clear();
        }
    }

    /// Copy of the connection's record
    pub fn snapshot(&self, connection: &DeviceName) -> Option<PerConnectionCalibration> {
        self.records.read().get(connection).cloned()
    }

    /// Connections with a record
    pub fn connections(&self) -> Vec<DeviceName> {
        self.records.read().keys().cloned().collect()
    }
}

fn missing_calibration(connection: &DeviceName, camera: &DeviceName) -> AlignmentError {
    AlignmentError::MissingCalibration {
        connection: connection.to_string(),
        camera: camera.to_string(),
    }
}

fn clamp_axis(value: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        value.clamp(-limit, limit)
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alignkit_core::geometry::{rotate_point, RotationMethod};
    use alignkit_core::AxisDir;
    use approx::assert_relative_eq;

    fn name(s: &str) -> DeviceName {
        DeviceName::from(s)
    }

    fn grid_pairs(t: &AffineTransform) -> Vec<(Point3, Point3)> {
        let mut pairs = Vec::new();
        for i in 0..3 {
            for j in 0..3 {
                let px = Point3::xy(100.0 * i as f64, 80.0 * j as f64);
                pairs.push((px, t.apply(&px)));
            }
        }
        pairs
    }

    #[test]
    fn test_affine_only_commit() {
        let store = CalibrationStore::new();
        let t = AffineTransform::from_similarity(1.5, 0.02, 10.0, -4.0);
        let pairs = grid_pairs(&t);

        let out = store
            .calibrate_from_pairs(&name("C1"), &name("CCD1"), &pairs, 9, 0, &AlignmentParams::default())
            .unwrap();
        assert!(out.affine_rmse < 1e-9);
        assert!(out.rotation.is_none());
        assert_relative_eq!(out.info.theta_deg, 1.5, epsilon = 1e-6);

        let snap = store.snapshot(&name("c1")).unwrap();
        assert!(snap.is_calibrated(&name("ccd1")));
        assert_eq!(snap.origin, pairs[0].1);
        assert!(snap.rotation_centers.is_empty());
    }

    #[test]
    fn test_rotation_center_uses_sign_corrected_angles() {
        let store = CalibrationStore::new();
        let t = AffineTransform::from_similarity(0.0, 0.01, 0.0, 0.0);
        let mut pairs = grid_pairs(&t);

        // Right/Down/Ccw has sign +1, Right/Up flips it
        let center = Point3::xy(150.0, 90.0);
        let probe = Point3::xy(200.0, 90.0);
        for angle in [-1.0, 1.0, 0.0] {
            pairs.push((rotate_point(&center, &probe, -angle), Point3::new(0.0, 0.0, angle)));
        }

        let params = AlignmentParams {
            y_positive: AxisDir::Up,
            ..Default::default()
        };
        let out = store
            .calibrate_from_pairs(&name("C1"), &name("CCD1"), &pairs, 9, 3, &params)
            .unwrap();
        let rc = out.rotation_center();
        assert_relative_eq!(rc.x, 150.0, epsilon = 1e-6);
        assert_relative_eq!(rc.y, 90.0, epsilon = 1e-6);
        assert_eq!(
            store.snapshot(&name("C1")).unwrap().rotation_centers[&name("CCD1")],
            rc
        );
    }

    #[test]
    fn test_failed_solve_commits_nothing() {
        let store = CalibrationStore::new();
        let t = AffineTransform::IDENTITY;
        let mut pairs = grid_pairs(&t);
        for _ in 0..3 {
            pairs.push((Point3::xy(1.0, 1.0), Point3::ZERO));
        }

        let params = AlignmentParams {
            x_positive: AxisDir::Right,
            y_positive: AxisDir::Left,
            ..Default::default()
        };
        let err = store
            .calibrate_from_pairs(&name("C1"), &name("CCD1"), &pairs, 9, 3, &params)
            .unwrap_err();
        assert!(err.is_alignment_error());
        assert!(store.snapshot(&name("C1")).is_none());

        let params = AlignmentParams {
            rotation_method: RotationMethod::AnglePair,
            ..Default::default()
        };
        let err = store
            .calibrate_from_pairs(&name("C1"), &name("CCD1"), &pairs, 9, 3, &params)
            .unwrap_err();
        assert!(err.is_geometry_error());
        assert!(store.snapshot(&name("C1")).is_none());
    }

    #[test]
    fn test_pair_count_validation() {
        let store = CalibrationStore::new();
        let pairs = grid_pairs(&AffineTransform::IDENTITY);
        let params = AlignmentParams::default();

        assert!(store
            .calibrate_from_pairs(&name("C"), &name("K"), &pairs, 2, 0, &params)
            .is_err());
        assert!(store
            .calibrate_from_pairs(&name("C"), &name("K"), &pairs, 9, 3, &params)
            .is_err());
    }

    #[test]
    fn test_compute_offset_trim_and_clamp() {
        let store = CalibrationStore::new();
        let t = AffineTransform::from_similarity(0.0, 1.0, 5.0, 5.0);
        store
            .calibrate_from_pairs(&name("C1"), &name("CCD1"), &grid_pairs(&t), 9, 0, &AlignmentParams::default())
            .unwrap();
        store.register_golden(
            &name("C1"),
            &name("CCD1"),
            vec![Point3::xy(10.0, 10.0)],
            Point3::new(25.0, 12.0, 3.0),
        );

        let mut params = AlignmentParams {
            offset_trim: Point3::new(0.5, 0.0, 0.0),
            ..Default::default()
        };
        let off = store.compute_offset(&name("C1"), &name("CCD1"), &params).unwrap();
        assert_relative_eq!(off.x, 10.5, epsilon = 1e-9);
        assert_relative_eq!(off.y, -3.0, epsilon = 1e-9);
        assert_relative_eq!(off.u, 3.0, epsilon = 1e-9);

        params.offset_limit = Point3::new(2.0, 1.0, 0.0);
        let off = store.compute_offset(&name("C1"), &name("CCD1"), &params).unwrap();
        assert_relative_eq!(off.x, 2.0);
        assert_relative_eq!(off.y, -1.0);
        assert_relative_eq!(off.u, 3.0, epsilon = 1e-9);

        // Pure: repeated calls agree
        assert_eq!(
            store.compute_offset(&name("C1"), &name("CCD1"), &params).unwrap(),
            off
        );
    }

    #[test]
    fn test_compute_offset_missing_data() {
        let store = CalibrationStore::new();
        let params = AlignmentParams::default();
        assert!(matches!(
            store.compute_offset(&name("C1"), &name("CCD1"), &params),
            Err(AlignmentError::MissingCalibration { .. })
        ));

        store
            .calibrate_from_pairs(
                &name("C1"),
                &name("CCD1"),
                &grid_pairs(&AffineTransform::IDENTITY),
                9,
                0,
                &params,
            )
            .unwrap();
        assert!(matches!(
            store.compute_offset(&name("C1"), &name("CCD1"), &params),
            Err(AlignmentError::MissingGolden { .. })
        ));
    }

    #[test]
    fn test_clear_is_connection_scoped() {
        let store = CalibrationStore::new();
        let params = AlignmentParams::default();
        let pairs = grid_pairs(&AffineTransform::IDENTITY);
        for conn in ["C1", "C2"] {
            store
                .calibrate_from_pairs(&name(conn), &name("CCD1"), &pairs, 9, 0, &params)
                .unwrap();
            store.register_goldens(&name(conn), &[(name("CCD1"), Point3::xy(1.0, 1.0))], Point3::xy(5.0, 5.0));
        }

        store.clear_calibration(&name("C1"));
        let c1 = store.snapshot(&name("C1")).unwrap();
        assert!(c1.pixel_to_real.is_empty());
        assert!(c1.pixel_golden.is_empty());
        assert_eq!(c1.real_golden, Point3::ZERO);
        assert_eq!(c1.origin, pairs[0].1);

        let c2 = store.snapshot(&name("C2")).unwrap();
        assert!(c2.is_calibrated(&name("CCD1")));
        assert_eq!(c2.real_golden, Point3::xy(5.0, 5.0));
    }

    #[test]
    fn test_transforms_for_reports_first_missing_camera() {
        let store = CalibrationStore::new();
        let params = AlignmentParams::default();
        store
            .calibrate_from_pairs(
                &name("C1"),
                &name("CCD1"),
                &grid_pairs(&AffineTransform::IDENTITY),
                9,
                0,
                &params,
            )
            .unwrap();

        let (ts, _) = store.transforms_for(&name("C1"), &[name("CCD1")]).unwrap();
        assert_eq!(ts.len(), 1);

        let err = store
            .transforms_for(&name("C1"), &[name("CCD1"), name("CCD2")])
            .unwrap_err();
        assert_eq!(
            err,
            AlignmentError::MissingCalibration {
                connection: "C1".into(),
                camera: "CCD2".into()
            }
        );
    }
}
