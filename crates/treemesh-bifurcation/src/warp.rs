//! Segment warping: place canonical rings onto the sampled centerline.
//!
//! Each ring gets two rotations. The first turns the canonical axis onto
//! the station tangent, the second twists about the tangent so the first
//! ring point lines up with the station cross axis. The ring origin is then
//! moved onto the station position. Along derivatives are then resized to
//! the spacing of the bent rings.

use std::f64::consts::PI;

use tracing::{debug, warn};
use treemesh_math::hermite::{self, SmoothOptions};
use treemesh_math::{reject_from, try_normalize, Dir3, Point3, Tolerance, Transform, Vec3};

use crate::error::{BifurcationError, Result};
use crate::input::{BranchId, CanonicalFrame};
use crate::path::Station;
use crate::profile::{Ring, RingPoint};

/// Rotation taking `frame.axis` onto `unit_tangent`.
///
/// When the two are parallel the rotation is the identity; when they are
/// antiparallel it is a half turn about `frame.u`. The cross product is
/// never normalized in either case.
pub fn align_rotation(branch: BranchId, frame: &CanonicalFrame, unit_tangent: &Vec3) -> Transform {
    let cp = frame.axis.cross(unit_tangent);
    let dp = frame.axis.dot(unit_tangent);
    if !Tolerance::DEFAULT.is_parallel(cp.norm()) {
        let axis = Dir3::new_normalize(cp);
        Transform::rotation_about_axis(&axis, dp.clamp(-1.0, 1.0).acos())
    } else if dp < 0.0 {
        warn!("{} tangent is antiparallel to its canonical axis; turning about u", branch);
        Transform::rotation_about_axis(&Dir3::new_normalize(frame.u), PI)
    } else {
        Transform::identity()
    }
}

/// Full rotation for one station: axis alignment followed by the twist
/// about the tangent.
///
/// # Errors
///
/// Returns [`BifurcationError::DegenerateInput`] if the tangent has zero
/// length or the cross axis has no component normal to the tangent.
pub fn station_rotation(
    branch: BranchId,
    frame: &CanonicalFrame,
    station: &Station,
) -> Result<Transform> {
    let unit_tangent = try_normalize(&station.tangent).ok_or_else(|| {
        BifurcationError::degenerate(format!("{branch} station has a zero tangent"))
    })?;
    let align = align_rotation(branch, frame, &unit_tangent);

    let projected = try_normalize(&reject_from(&station.cross_axis, &unit_tangent))
        .ok_or_else(|| {
            BifurcationError::degenerate(format!(
                "{branch} cross axis is parallel to the centerline tangent"
            ))
        })?;
    let first = align.apply_vec(&frame.u);

    let mut angle = projected.dot(&first).clamp(-1.0, 1.0).acos();
    if unit_tangent.dot(&projected.cross(&first)) > 0.0 {
        angle = -angle;
    }
    let twist = Transform::rotation_about_axis(&Dir3::new_unchecked(unit_tangent), angle);
    Ok(twist.then(&align))
}

/// Apply a station rotation to a ring and move its origin to `position`.
pub fn warp_ring(ring: &Ring, rotation: &Transform, position: &Point3) -> Ring {
    let points = ring
        .points
        .iter()
        .map(|p| RingPoint {
            x: position + rotation.apply_vec(&(p.x - ring.origin)),
            d1: rotation.apply_vec(&p.d1),
            d2: rotation.apply_vec(&p.d2),
        })
        .collect();
    Ring {
        station_index: ring.station_index,
        origin: *position,
        points,
    }
}

/// Undo [`warp_ring`], returning the ring to `origin` in its canonical frame.
pub fn unwarp_ring(ring: &Ring, rotation: &Transform, origin: &Point3) -> Ring {
    let inverse = rotation.rotation_inverse();
    warp_ring(ring, &inverse, origin)
}

/// Warp every canonical ring of a branch onto its stations.
///
/// # Errors
///
/// Propagates [`station_rotation`] failures.
pub fn warp_rings(
    branch: BranchId,
    frame: &CanonicalFrame,
    stations: &[Station],
    rings: &[Ring],
) -> Result<Vec<Ring>> {
    let mut warped = stations
        .iter()
        .zip(rings.iter())
        .map(|(station, ring)| {
            let rotation = station_rotation(branch, frame, station)?;
            Ok(warp_ring(ring, &rotation, &station.position))
        })
        .collect::<Result<Vec<_>>>()?;
    resize_along_derivatives(&mut warped);
    debug!("Warped {} rings on {}", warped.len(), branch);
    Ok(warped)
}

/// Resize along derivatives to the bent spacing, keeping their directions.
fn resize_along_derivatives(rings: &mut [Ring]) {
    if rings.len() < 2 {
        return;
    }
    let options = SmoothOptions {
        fix_all_directions: true,
        ..SmoothOptions::default()
    };
    let n = rings[0].len();
    for k in 0..n {
        let xs: Vec<Point3> = rings.iter().map(|ring| ring.points[k].x).collect();
        let ds: Vec<Vec3> = rings.iter().map(|ring| ring.points[k].d2).collect();
        let resized = hermite::smooth_derivatives_line(&xs, &ds, &options);
        for (ring, d2) in rings.iter_mut().zip(resized) {
            ring.points[k].d2 = d2;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::RadiusProfile;
    use crate::profile::build_canonical_rings;
    use approx::assert_relative_eq;

    fn station(position: Point3, tangent: Vec3, cross_axis: Vec3) -> Station {
        Station {
            position,
            tangent,
            cross_axis,
            arc_index: 0,
        }
    }

    fn unit_ring(frame: &CanonicalFrame, n: usize) -> Ring {
        let s = station(Point3::origin(), frame.axis, frame.u);
        build_canonical_rings(
            BranchId::Parent,
            frame,
            &[s],
            &RadiusProfile::uniform(1.0),
            n,
        )
        .unwrap()
        .remove(0)
    }

    fn assert_rings_close(a: &Ring, b: &Ring, tol: f64) {
        assert_eq!(a.len(), b.len());
        for (p, q) in a.points.iter().zip(b.points.iter()) {
            assert!((p.x - q.x).norm() < tol);
            assert!((p.d1 - q.d1).norm() < tol);
            assert!((p.d2 - q.d2).norm() < tol);
        }
    }

    #[test]
    fn test_parallel_tangent_is_pure_translation() {
        let frame = CanonicalFrame::default_for(BranchId::Parent);
        let ring = unit_ring(&frame, 8);
        let s = station(Point3::new(1.0, 2.0, 3.0), Vec3::z(), Vec3::x());
        let rotation = station_rotation(BranchId::Parent, &frame, &s).unwrap();
        assert!((rotation.matrix - Transform::identity().matrix).norm() < 1e-12);

        let warped = warp_ring(&ring, &rotation, &s.position);
        for (p, q) in warped.points.iter().zip(ring.points.iter()) {
            let expected = q.x + Vec3::new(1.0, 2.0, 3.0);
            assert!((p.x - expected).norm() < 1e-12);
            assert!((p.d1 - q.d1).norm() < 1e-12);
        }
    }

    #[test]
    fn test_right_angle_bend_rotates_about_y() {
        let frame = CanonicalFrame::default_for(BranchId::Parent);
        let align = align_rotation(BranchId::Parent, &frame, &Vec3::x());
        let expected = Transform::rotation_about_axis(&Dir3::new_normalize(Vec3::y()), PI / 2.0);
        assert!((align.matrix - expected.matrix).norm() < 1e-12);
        assert!((align.apply_vec(&Vec3::z()) - Vec3::x()).norm() < 1e-12);

        // Cross axis along the rotated u needs no twist.
        let s = station(Point3::origin(), Vec3::x(), -Vec3::z());
        let rotation = station_rotation(BranchId::Parent, &frame, &s).unwrap();
        assert!((rotation.matrix - expected.matrix).norm() < 1e-12);
    }

    #[test]
    fn test_twist_aligns_first_point_with_cross_axis() {
        let frame = CanonicalFrame::default_for(BranchId::Parent);
        let ring = unit_ring(&frame, 8);
        let tangent = Vec3::new(0.3, -0.4, 0.8);
        for cross in [Vec3::y(), Vec3::x(), Vec3::new(-1.0, 0.2, 0.1)] {
            let s = station(Point3::new(0.5, 0.0, 1.0), tangent, cross);
            let rotation = station_rotation(BranchId::Parent, &frame, &s).unwrap();
            let warped = warp_ring(&ring, &rotation, &s.position);
            let t = tangent.normalize();
            let first = (warped.points[0].x - s.position).normalize();
            let projected = reject_from(&cross, &t).normalize();
            assert!((first - projected).norm() < 1e-9);
            // Ring plane is normal to the tangent and the ring still runs
            // counter-clockwise about it.
            assert!(first.dot(&t).abs() < 1e-12);
            assert!(first.cross(&warped.points[0].d1).dot(&t) > 0.0);
        }
    }

    #[test]
    fn test_rotation_round_trip() {
        let frame = CanonicalFrame::default_for(BranchId::Daughter1);
        let ring = unit_ring(&frame, 12);
        let s = station(
            Point3::new(-2.0, 1.0, 4.0),
            Vec3::new(0.2, 0.9, -0.3),
            Vec3::new(0.0, 0.1, 1.0),
        );
        let rotation = station_rotation(BranchId::Daughter1, &frame, &s).unwrap();
        let warped = warp_ring(&ring, &rotation, &s.position);
        let back = unwarp_ring(&warped, &rotation, &ring.origin);
        assert_rings_close(&back, &ring, 1e-9);
    }

    #[test]
    fn test_antiparallel_tangent_falls_back() {
        let frame = CanonicalFrame::default_for(BranchId::Parent);
        let align = align_rotation(BranchId::Parent, &frame, &-Vec3::z());
        assert!((align.apply_vec(&Vec3::z()) + Vec3::z()).norm() < 1e-12);
        assert!((align.apply_vec(&frame.u) - frame.u).norm() < 1e-12);
        for v in align.rotation_part().iter() {
            assert!(v.is_finite());
        }

        let s = station(Point3::origin(), -Vec3::z(), Vec3::x());
        let rotation = station_rotation(BranchId::Parent, &frame, &s).unwrap();
        assert_relative_eq!(rotation.apply_vec(&Vec3::z()).z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cross_axis_along_tangent_rejected() {
        let frame = CanonicalFrame::default_for(BranchId::Parent);
        let s = station(Point3::origin(), Vec3::z(), Vec3::z() * 2.0);
        assert!(matches!(
            station_rotation(BranchId::Parent, &frame, &s),
            Err(BifurcationError::DegenerateInput(_))
        ));
    }
}
