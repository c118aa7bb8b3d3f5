//! Wall extrusion from the inner surface.
//!
//! Every inner surface node is pushed out along its unit normal. Layer
//! positions follow a cubic Hermite segment whose end derivatives are both
//! the full offset, so the profile through the wall stays straight. The
//! around and along derivatives are rescaled by the local surface
//! curvature so elements keep their aspect ratio through a curved wall.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use treemesh_math::{hermite, try_normalize, Point3, Vec3};

use crate::error::{BifurcationError, Result};
use crate::input::BranchId;
use crate::path::Station;
use crate::profile::Ring;
use crate::settings::{BifurcationSettings, MeshDimension};

/// An inner surface node ready for extrusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceNode {
    /// Position.
    pub x: Point3,
    /// Around derivative.
    pub d1: Vec3,
    /// Along derivative.
    pub d2: Vec3,
    /// Outward unit normal, `normalize(d1 × d2)`.
    pub normal: Vec3,
    /// Signed curvature around; positive where the wall is convex.
    pub curvature_around: f64,
    /// Signed curvature along; positive where the surface bends toward
    /// the normal.
    pub curvature_along: f64,
}

/// One node of one through-wall layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallNode {
    /// Position.
    pub x: Point3,
    /// Around derivative.
    pub d1: Vec3,
    /// Along derivative.
    pub d2: Vec3,
    /// Through-wall derivative.
    pub d3: Vec3,
}

/// Around curvature at each point of a ring.
///
/// Each point averages the curvature of the segments before and after it.
/// A segment flagged in `transit` is skipped, so points next to a
/// transition element use the other side only.
pub fn ring_curvatures_around(ring: &Ring, normals: &[Vec3], transit: &[bool]) -> Vec<f64> {
    let n = ring.len();
    let p = &ring.points;
    let is_transit = |e: usize| transit.get(e).copied().unwrap_or(false);
    (0..n)
        .map(|i| {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            let before = || {
                hermite::curvature(&p[prev].x, &p[prev].d1, &p[i].x, &p[i].d1, &normals[i], 1.0)
            };
            let after = || {
                hermite::curvature(&p[i].x, &p[i].d1, &p[next].x, &p[next].d1, &normals[i], 0.0)
            };
            match (is_transit(prev), is_transit(i)) {
                (true, false) => after(),
                (false, true) => before(),
                _ => 0.5 * (before() + after()),
            }
        })
        .collect()
}

/// Along curvature at every point, indexed `[station][around]`.
///
/// Interior stations average the segments before and after; the first and
/// last stations use their one segment.
pub fn curvatures_along(rings: &[Ring], normals: &[Vec<Vec3>]) -> Vec<Vec<f64>> {
    let count = rings.len();
    rings
        .iter()
        .enumerate()
        .map(|(j, ring)| {
            (0..ring.len())
                .map(|k| {
                    let radial = -normals[j][k];
                    let here = &ring.points[k];
                    let before = (j > 0).then(|| {
                        let prev = &rings[j - 1].points[k];
                        hermite::curvature(&prev.x, &prev.d2, &here.x, &here.d2, &radial, 1.0)
                    });
                    let after = (j + 1 < count).then(|| {
                        let next = &rings[j + 1].points[k];
                        hermite::curvature(&here.x, &here.d2, &next.x, &next.d2, &radial, 0.0)
                    });
                    match (before, after) {
                        (Some(b), Some(a)) => 0.5 * (a + b),
                        (Some(v), None) | (None, Some(v)) => v,
                        (None, None) => 0.0,
                    }
                })
                .collect()
        })
        .collect()
}

/// Fail unless `normal` at `x` points away from `centre`.
///
/// # Errors
///
/// Returns [`BifurcationError::DegenerateInput`] for an inward or
/// tangential normal.
pub fn check_outward(normal: &Vec3, x: &Point3, centre: &Point3) -> Result<()> {
    if normal.dot(&(x - centre)) > 0.0 {
        Ok(())
    } else {
        Err(BifurcationError::degenerate(
            "surface normal points into the lumen",
        ))
    }
}

/// Build the inner surface of a trunk, indexed `[station][around]`.
///
/// # Errors
///
/// Returns [`BifurcationError::DegenerateInput`] if a normal cannot be
/// formed or points toward the centerline.
pub fn trunk_surface(
    branch: BranchId,
    stations: &[Station],
    rings: &[Ring],
    transit: &[bool],
) -> Result<Vec<Vec<SurfaceNode>>> {
    let normals = rings
        .iter()
        .zip(stations.iter())
        .enumerate()
        .map(|(j, (ring, station))| {
            ring.points
                .iter()
                .enumerate()
                .map(|(k, p)| {
                    let normal = try_normalize(&p.d1.cross(&p.d2)).ok_or_else(|| {
                        BifurcationError::degenerate(format!(
                            "{branch} surface has no normal at station {j}, point {k}"
                        ))
                    })?;
                    check_outward(&normal, &p.x, &station.position).map_err(|_| {
                        BifurcationError::degenerate(format!(
                            "{branch} surface normal points inward at station {j}, point {k}"
                        ))
                    })?;
                    Ok(normal)
                })
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let along = curvatures_along(rings, &normals);
    let surface = rings
        .iter()
        .enumerate()
        .map(|(j, ring)| {
            let around = ring_curvatures_around(ring, &normals[j], transit);
            ring.points
                .iter()
                .enumerate()
                .map(|(k, p)| SurfaceNode {
                    x: p.x,
                    d1: p.d1,
                    d2: p.d2,
                    normal: normals[j][k],
                    curvature_around: around[k],
                    curvature_along: along[j][k],
                })
                .collect()
        })
        .collect();
    Ok(surface)
}

/// Smallest factor the curvature correction may scale `d1` or `d2` by.
///
/// A fold tighter than the wall is thick (the carina, typically) would
/// otherwise shrink the outer derivative through zero and invert the
/// element.
pub const MIN_CURVATURE_SCALE: f64 = 0.25;

fn curvature_scale(factor: f64) -> f64 {
    factor.max(MIN_CURVATURE_SCALE)
}

/// Extrude one node into `elements_count_through_wall + 1` layers.
///
/// `d1` and `d2` are scaled by `1 + t·xi3·κ_around` and
/// `1 − κ_along·|x − x_inner|`, each limited below by
/// [`MIN_CURVATURE_SCALE`].
pub fn extrude_node(
    node: &SurfaceNode,
    thickness: f64,
    elements_count_through_wall: usize,
) -> Vec<WallNode> {
    let count = elements_count_through_wall.max(1);
    let offset = node.normal * thickness;
    let outer = node.x + offset;
    let d3 = offset / count as f64;
    let outer_along = 1.0 - node.curvature_along * thickness;
    let outer_around = 1.0 + thickness * node.curvature_around;
    if outer_along < MIN_CURVATURE_SCALE || outer_around < MIN_CURVATURE_SCALE {
        warn!(
            "Wall at {:?} is thicker than its curvature allows; limiting derivative scaling",
            node.x
        );
    }
    (0..=count)
        .map(|layer| {
            let xi3 = layer as f64 / count as f64;
            let x = hermite::interpolate(&node.x, &offset, &outer, &offset, xi3);
            let distance = (x - node.x).norm();
            WallNode {
                x,
                d1: node.d1 * curvature_scale(1.0 + thickness * xi3 * node.curvature_around),
                d2: node.d2 * curvature_scale(1.0 - node.curvature_along * distance),
                d3,
            }
        })
        .collect()
}

/// Single layer on the inner surface with the unit normal as `d3`.
pub fn surface_layer(node: &SurfaceNode) -> WallNode {
    WallNode {
        x: node.x,
        d1: node.d1,
        d2: node.d2,
        d3: node.normal,
    }
}

/// All layers for `node` under the given settings.
pub fn extrude(node: &SurfaceNode, settings: &BifurcationSettings) -> Vec<WallNode> {
    match settings.dimension {
        MeshDimension::Solid => extrude_node(
            node,
            settings.wall_thickness,
            settings.elements_count_through_wall,
        ),
        MeshDimension::Surface => vec![surface_layer(node)],
    }
}

/// Extrude a whole trunk surface; result is `[station][around][layer]`.
pub fn extrude_trunk(
    branch: BranchId,
    surface: &[Vec<SurfaceNode>],
    settings: &BifurcationSettings,
) -> Vec<Vec<Vec<WallNode>>> {
    let layers: Vec<Vec<Vec<WallNode>>> = surface
        .iter()
        .map(|ring| ring.iter().map(|node| extrude(node, settings)).collect())
        .collect();
    debug!(
        "Extruded {} rings on {} into {} layers",
        layers.len(),
        branch,
        settings.node_layers()
    );
    layers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{CanonicalFrame, PathControl, RadiusProfile};
    use crate::path::sample_central_path;
    use crate::profile::build_canonical_rings;
    use crate::warp::warp_rings;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn flat_node(curvature_around: f64, curvature_along: f64) -> SurfaceNode {
        SurfaceNode {
            x: Point3::origin(),
            d1: Vec3::x(),
            d2: Vec3::y(),
            normal: Vec3::z(),
            curvature_around,
            curvature_along,
        }
    }

    /// Quarter-circle bend of radius 3 in the x-z plane, bending toward +x.
    fn bent_tube(around: usize, along: usize) -> (Vec<Station>, Vec<Ring>) {
        let k = 3.0 * 4.0 * (PI / 8.0).tan();
        let path = vec![
            PathControl::new(Point3::origin(), Vec3::new(0.0, 0.0, k), Vec3::y()),
            PathControl::new(Point3::new(3.0, 0.0, 3.0), Vec3::new(k, 0.0, 0.0), Vec3::y()),
        ];
        let frame = CanonicalFrame::default_for(BranchId::Parent);
        let stations = sample_central_path(BranchId::Parent, &path, along).unwrap();
        let canonical = build_canonical_rings(
            BranchId::Parent,
            &frame,
            &stations,
            &RadiusProfile::uniform(0.5),
            around,
        )
        .unwrap();
        let rings = warp_rings(BranchId::Parent, &frame, &stations, &canonical).unwrap();
        (stations, rings)
    }

    #[test]
    fn test_straight_wall_layers() {
        let layers = extrude_node(&flat_node(0.0, 0.0), 0.1, 2);
        assert_eq!(layers.len(), 3);
        assert_relative_eq!(layers[0].x.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(layers[1].x.z, 0.05, epsilon = 1e-12);
        assert_relative_eq!(layers[2].x.z, 0.1, epsilon = 1e-12);
        for layer in &layers {
            assert!(layer.x.x.abs() < 1e-12 && layer.x.y.abs() < 1e-12);
            assert!((layer.d3 - Vec3::new(0.0, 0.0, 0.05)).norm() < 1e-12);
            assert!((layer.d1 - Vec3::x()).norm() < 1e-12);
        }
    }

    #[test]
    fn test_curvature_scales_derivatives() {
        let layers = extrude_node(&flat_node(2.0, 2.0), 0.1, 2);
        // Around grows as 1 + t·xi3·κ; along shrinks as 1 − κ·distance.
        assert_relative_eq!(layers[2].d1.norm(), 1.2, epsilon = 1e-12);
        assert_relative_eq!(layers[1].d2.norm(), 0.9, epsilon = 1e-12);
        assert_relative_eq!(layers[2].d2.norm(), 0.8, epsilon = 1e-12);
        assert!(layers[2].d2.norm() < layers[0].d2.norm());
    }

    #[test]
    fn test_surface_layer_uses_unit_normal() {
        let settings = BifurcationSettings {
            dimension: MeshDimension::Surface,
            ..Default::default()
        };
        let layers = extrude(&flat_node(1.0, 1.0), &settings);
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].d3, Vec3::z());
    }

    #[test]
    fn test_circle_around_curvature() {
        let (stations, rings) = bent_tube(8, 4);
        let surface = trunk_surface(BranchId::Parent, &stations, &rings, &[false; 8]).unwrap();
        for node in &surface[0] {
            assert_relative_eq!(node.curvature_around, 2.0, epsilon = 0.15);
        }
    }

    #[test]
    fn test_transit_element_uses_one_side() {
        let (stations, rings) = bent_tube(8, 2);
        let normals: Vec<Vec3> = rings[0]
            .points
            .iter()
            .map(|p| p.d1.cross(&p.d2).normalize())
            .collect();
        let mut transit = vec![false; 8];
        let plain = ring_curvatures_around(&rings[0], &normals, &transit);
        transit[3] = true;
        let flagged = ring_curvatures_around(&rings[0], &normals, &transit);
        for i in [0, 1, 2, 5, 6, 7] {
            assert_eq!(plain[i], flagged[i]);
        }
        let p = &rings[0].points;
        let before_3 = hermite::curvature(&p[2].x, &p[2].d1, &p[3].x, &p[3].d1, &normals[3], 1.0);
        let after_4 = hermite::curvature(&p[4].x, &p[4].d1, &p[5].x, &p[5].d1, &normals[4], 0.0);
        assert_eq!(flagged[3], before_3);
        assert_eq!(flagged[4], after_4);
        assert_eq!(stations.len(), 3);
    }

    #[test]
    fn test_bend_along_curvature_and_monotonicity() {
        let (stations, rings) = bent_tube(8, 4);
        let surface = trunk_surface(BranchId::Parent, &stations, &rings, &[false; 8]).unwrap();
        // Point 6 faces the inside of the bend, point 2 the outside.
        let inside = &surface[2][6];
        let outside = &surface[2][2];
        assert!(inside.curvature_along > 0.0);
        assert!(outside.curvature_along < 0.0);

        let layers = extrude_node(inside, 0.1, 3);
        for pair in layers.windows(2) {
            assert!(pair[1].d2.norm() < pair[0].d2.norm());
        }
        let layers = extrude_node(outside, 0.1, 3);
        assert!(layers[3].d2.norm() > layers[0].d2.norm());
    }

    #[test]
    fn test_inward_normal_rejected() {
        let (stations, mut rings) = bent_tube(4, 2);
        for ring in &mut rings {
            for p in &mut ring.points {
                p.d1 = -p.d1;
            }
        }
        assert!(matches!(
            trunk_surface(BranchId::Parent, &stations, &rings, &[false; 4]),
            Err(BifurcationError::DegenerateInput(_))
        ));
    }

    #[test]
    fn test_tight_fold_never_inverts_derivatives() {
        let node = SurfaceNode {
            x: Point3::origin(),
            d1: Vec3::x() * 0.2,
            d2: Vec3::y() * 0.25,
            normal: Vec3::z(),
            curvature_around: -12.0,
            curvature_along: 9.5,
        };
        for thickness in [0.1, 0.15, 0.2] {
            let layers = extrude_node(&node, thickness, 2);
            for layer in &layers {
                assert!(layer.d1.dot(&node.d1) > 0.0);
                assert!(layer.d2.dot(&node.d2) > 0.0);
                assert!(layer.d2.norm() >= MIN_CURVATURE_SCALE * node.d2.norm() - 1e-12);
                let normal = layer.d1.cross(&layer.d2).normalize();
                assert!(normal.dot(&layer.d3) > 0.0);
            }
        }
        // Gentle curvature is left alone.
        let gentle = SurfaceNode {
            curvature_along: 1.0,
            ..node.clone()
        };
        let layers = extrude_node(&gentle, 0.2, 1);
        assert_relative_eq!(layers[1].d2.norm(), 0.25 * 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_check_outward() {
        let centre = Point3::origin();
        let x = Point3::new(1.0, 0.0, 0.0);
        assert!(check_outward(&Vec3::x(), &x, &centre).is_ok());
        assert!(check_outward(&-Vec3::x(), &x, &centre).is_err());
        assert!(check_outward(&Vec3::y(), &x, &centre).is_err());
    }

    #[test]
    fn test_trunk_layer_shape() {
        let (stations, rings) = bent_tube(8, 3);
        let surface = trunk_surface(BranchId::Parent, &stations, &rings, &[false; 8]).unwrap();
        let settings = BifurcationSettings {
            elements_count_through_wall: 2,
            wall_thickness: 0.2,
            ..Default::default()
        };
        let layers = extrude_trunk(BranchId::Parent, &surface, &settings);
        assert_eq!(layers.len(), 4);
        for ring in &layers {
            assert_eq!(ring.len(), 8);
            for node in ring {
                assert_eq!(node.len(), 3);
                assert_relative_eq!(node[2].d3.norm(), 0.1, epsilon = 1e-12);
            }
        }
    }
}
