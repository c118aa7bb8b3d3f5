//! Cross-section rings in a branch's canonical frame.
//!
//! Rings are built around the frame axis as a straight tube whose station
//! spacing matches the centerline arc length. The warper then bends them
//! onto the real centerline.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};
use tracing::debug;
use treemesh_math::hermite::{self, SmoothOptions};
use treemesh_math::{Point3, Vec3};

use crate::error::{BifurcationError, Result};
use crate::input::{BranchId, CanonicalFrame, RadiusProfile};
use crate::path::{station_arc_lengths, Station};

/// One surface point of a ring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RingPoint {
    /// Position.
    pub x: Point3,
    /// Around derivative, pointing to the next point.
    pub d1: Vec3,
    /// Along derivative, pointing to the next station.
    pub d2: Vec3,
}

/// The ordered points around one station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ring {
    /// Station this ring belongs to.
    pub station_index: usize,
    /// Centre of the circle the points were built on.
    pub origin: Point3,
    /// Points in around order; `points[(i + 1) % n]` follows `points[i]`.
    pub points: Vec<RingPoint>,
}

impl Ring {
    /// Number of points around.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the ring has no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at a fractional around position, in element units.
    ///
    /// Position and `d1` follow the Hermite segment between the two
    /// neighbouring points; `d2` is interpolated linearly.
    pub fn sample(&self, position: f64) -> RingPoint {
        let n = self.points.len();
        let wrapped = position.rem_euclid(n as f64);
        let i = (wrapped.floor() as usize) % n;
        let xi = wrapped - wrapped.floor();
        let a = &self.points[i];
        if xi == 0.0 {
            return a.clone();
        }
        let b = &self.points[(i + 1) % n];
        RingPoint {
            x: hermite::interpolate(&a.x, &a.d1, &b.x, &b.d1, xi),
            d1: hermite::derivative(&a.x, &a.d1, &b.x, &b.d1, xi),
            d2: a.d2 * (1.0 - xi) + b.d2 * xi,
        }
    }
}

/// Radius at each station from the branch radius profile.
pub fn station_radii(branch: BranchId, radius: &RadiusProfile, count: usize) -> Result<Vec<f64>> {
    let last = count.saturating_sub(1).max(1) as f64;
    (0..count)
        .map(|j| {
            let xi = j as f64 / last;
            let r = hermite::interpolate_scalar(
                radius.start,
                radius.start_derivative,
                radius.end,
                radius.end_derivative,
                xi,
            );
            if r > 0.0 && r.is_finite() {
                Ok(r)
            } else {
                Err(BifurcationError::InvalidRadius { branch, radius: r })
            }
        })
        .collect()
}

/// Build one canonical ring per station.
///
/// Ring `j` is a circle of the station radius centred at `axis * s_j`,
/// with `s_j` the cumulative centerline arc length. Point `k` sits at angle
/// `2πk/n` from `frame.u` toward `frame.v`. Along derivatives are smoothed
/// per around index across all stations.
///
/// # Errors
///
/// Returns [`BifurcationError::InvalidRadius`] if the radius is not positive
/// at some station.
pub fn build_canonical_rings(
    branch: BranchId,
    frame: &CanonicalFrame,
    stations: &[Station],
    radius: &RadiusProfile,
    elements_count_around: usize,
) -> Result<Vec<Ring>> {
    let count = stations.len();
    let n = elements_count_around;
    let radii = station_radii(branch, radius, count)?;
    let arc = station_arc_lengths(stations);
    let per_station = 1.0 / count.saturating_sub(1).max(1) as f64;

    let mut rings: Vec<Ring> = stations
        .iter()
        .enumerate()
        .map(|(j, station)| {
            let r = radii[j];
            let origin = Point3::from(frame.axis * arc[j]);
            let dr = per_station
                * hermite::derivative_scalar(
                    radius.start,
                    radius.start_derivative,
                    radius.end,
                    radius.end_derivative,
                    j as f64 * per_station,
                );
            let step = station.tangent.norm();
            let points = (0..n)
                .map(|k| {
                    let (s, c) = (TAU * k as f64 / n as f64).sin_cos();
                    let radial = frame.u * c + frame.v * s;
                    let around = frame.v * c - frame.u * s;
                    RingPoint {
                        x: origin + radial * r,
                        d1: around * (r * TAU / n as f64),
                        d2: frame.axis * step + radial * dr,
                    }
                })
                .collect();
            Ring {
                station_index: j,
                origin,
                points,
            }
        })
        .collect();

    if count > 1 {
        let options = SmoothOptions::default();
        for k in 0..n {
            let xs: Vec<Point3> = rings.iter().map(|ring| ring.points[k].x).collect();
            let ds: Vec<Vec3> = rings.iter().map(|ring| ring.points[k].d2).collect();
            let smoothed = hermite::smooth_derivatives_line(&xs, &ds, &options);
            for (ring, d2) in rings.iter_mut().zip(smoothed) {
                ring.points[k].d2 = d2;
            }
        }
    }

    debug!("Built {} canonical rings of {} points on {}", rings.len(), n, branch);
    Ok(rings)
}
