//! Central path sampling: resample a branch centerline into stations.

use serde::{Deserialize, Serialize};
use tracing::debug;
use treemesh_math::{hermite, Point3, Vec3};

use crate::error::{BifurcationError, Result};
use crate::input::{BranchId, PathControl};

/// A sampled point on a branch centerline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    /// Position on the centerline.
    pub position: Point3,
    /// Centerline derivative scaled to one station step. Not normalized:
    /// its magnitude is the local station spacing.
    pub tangent: Vec3,
    /// Cross-axis direction field at this station.
    pub cross_axis: Vec3,
    /// Control segment the station was interpolated in.
    pub arc_index: usize,
}

/// Resample a centerline into `elements_count_along + 1` stations.
///
/// Stations are spaced uniformly in the control-segment parameter, so the
/// output count is independent of how many control points were given.
/// Positions and tangents come from the cubic Hermite centerline; the cross
/// axis is the Hermite interpolation of each control's `(d2, d12)` pair.
///
/// # Errors
///
/// Returns an error if:
/// - Fewer than 2 control points are provided
/// - A sampled tangent has zero length
pub fn sample_central_path(
    branch: BranchId,
    path: &[PathControl],
    elements_count_along: usize,
) -> Result<Vec<Station>> {
    if path.len() < 2 {
        return Err(BifurcationError::TooFewControlPoints {
            branch,
            min: 2,
            actual: path.len(),
        });
    }
    if elements_count_along < 1 {
        return Err(BifurcationError::degenerate(
            "central path needs at least one element along",
        ));
    }

    let segments = path.len() - 1;
    let step = segments as f64 / elements_count_along as f64;

    let mut stations = Vec::with_capacity(elements_count_along + 1);
    for j in 0..=elements_count_along {
        let u = j as f64 * step;
        let arc_index = (u.floor() as usize).min(segments - 1);
        let xi = u - arc_index as f64;
        let a = &path[arc_index];
        let b = &path[arc_index + 1];

        let position = hermite::interpolate(&a.x, &a.d1, &b.x, &b.d1, xi);
        let tangent = hermite::derivative(&a.x, &a.d1, &b.x, &b.d1, xi) * step;
        let cross_axis = hermite::interpolate_vec(&a.d2, &a.d12, &b.d2, &b.d12, xi);

        if tangent.norm() < treemesh_math::ZERO_LENGTH {
            return Err(BifurcationError::degenerate(format!(
                "{branch} centerline has a zero tangent at station {j}"
            )));
        }

        stations.push(Station {
            position,
            tangent,
            cross_axis,
            arc_index,
        });
    }

    debug!("Sampled {} stations on {} from {} controls", stations.len(), branch, path.len());
    Ok(stations)
}

/// Cumulative Hermite arc length at each station, starting from zero.
pub fn station_arc_lengths(stations: &[Station]) -> Vec<f64> {
    let mut lengths = Vec::with_capacity(stations.len());
    let mut total = 0.0;
    lengths.push(total);
    for pair in stations.windows(2) {
        total += hermite::arc_length(
            &pair[0].position,
            &pair[0].tangent,
            &pair[1].position,
            &pair[1].tangent,
        );
        lengths.push(total);
    }
    lengths
}
