//! Branch definitions consumed by the pipeline.
//!
//! A bifurcation is one parent and two daughters. Each branch brings its
//! own centerline (cubic Hermite control points with a cross-axis field),
//! a radius profile, and the canonical frame its cross-sections are built
//! in before being warped onto the centerline.

use std::fmt;

use serde::{Deserialize, Serialize};
use treemesh_math::{Point3, Vec3};

use crate::error::{BifurcationError, Result};
use crate::settings::BifurcationSettings;

/// Which branch of the bifurcation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BranchId {
    /// Incoming tube; its last station is nearest the junction.
    Parent,
    /// First outgoing tube; its first station is nearest the junction.
    Daughter1,
    /// Second outgoing tube, mirror of the first.
    Daughter2,
}

impl BranchId {
    /// All branches in node-numbering order.
    pub const ALL: [BranchId; 3] = [BranchId::Parent, BranchId::Daughter1, BranchId::Daughter2];

    /// Position in [`BranchId::ALL`].
    pub fn index(self) -> usize {
        match self {
            BranchId::Parent => 0,
            BranchId::Daughter1 => 1,
            BranchId::Daughter2 => 2,
        }
    }

    /// `+1` if station order runs toward the junction, `-1` if away.
    pub fn toward_junction(self) -> f64 {
        match self {
            BranchId::Parent => 1.0,
            BranchId::Daughter1 | BranchId::Daughter2 => -1.0,
        }
    }
}

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchId::Parent => write!(f, "parent"),
            BranchId::Daughter1 => write!(f, "daughter1"),
            BranchId::Daughter2 => write!(f, "daughter2"),
        }
    }
}

/// Local frame a branch's cross-sections are built in.
///
/// Circles lie in the `u`/`v` plane, starting at `u` and advancing toward
/// `v`; `u × v = axis` so the around direction is counter-clockwise about
/// the axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFrame {
    /// Reference along-tube direction (unit).
    pub axis: Vec3,
    /// First in-plane axis; also the fallback axis for antiparallel warps.
    pub u: Vec3,
    /// Second in-plane axis.
    pub v: Vec3,
}

impl CanonicalFrame {
    /// Create a frame from three axes.
    pub fn new(axis: Vec3, u: Vec3, v: Vec3) -> Self {
        Self { axis, u, v }
    }

    /// Conventional frame for each branch: parent around +z, daughters
    /// around ±x.
    pub fn default_for(branch: BranchId) -> Self {
        match branch {
            BranchId::Parent => Self::new(Vec3::z(), Vec3::x(), Vec3::y()),
            BranchId::Daughter1 => Self::new(Vec3::x(), Vec3::y(), Vec3::z()),
            BranchId::Daughter2 => Self::new(-Vec3::x(), Vec3::y(), -Vec3::z()),
        }
    }

    /// Check the frame is orthonormal and right-handed.
    pub fn validate(&self) -> Result<()> {
        const TOL: f64 = 1e-9;
        let unit = |v: &Vec3| (v.norm() - 1.0).abs() < TOL;
        if !(unit(&self.axis) && unit(&self.u) && unit(&self.v)) {
            return Err(BifurcationError::degenerate(
                "canonical frame axes must be unit vectors",
            ));
        }
        if self.u.dot(&self.v).abs() > TOL
            || self.u.dot(&self.axis).abs() > TOL
            || self.v.dot(&self.axis).abs() > TOL
        {
            return Err(BifurcationError::degenerate(
                "canonical frame axes must be mutually orthogonal",
            ));
        }
        if (self.u.cross(&self.v) - self.axis).norm() > TOL {
            return Err(BifurcationError::degenerate(
                "canonical frame must satisfy u × v = axis",
            ));
        }
        Ok(())
    }
}

/// One cubic Hermite control point of a centerline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathControl {
    /// Position.
    pub x: Point3,
    /// Tangent (derivative per control segment).
    pub d1: Vec3,
    /// Cross axis; only its direction matters.
    pub d2: Vec3,
    /// Derivative of the cross axis along the curve.
    pub d12: Vec3,
}

impl PathControl {
    /// Control point with a cross axis that does not vary along the curve.
    pub fn new(x: Point3, d1: Vec3, d2: Vec3) -> Self {
        Self {
            x,
            d1,
            d2,
            d12: Vec3::zeros(),
        }
    }
}

/// Radius at both ends of a segment with derivatives per unit segment
/// parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadiusProfile {
    /// Radius at the first station.
    pub start: f64,
    /// Radius derivative at the first station.
    pub start_derivative: f64,
    /// Radius at the last station.
    pub end: f64,
    /// Radius derivative at the last station.
    pub end_derivative: f64,
}

impl RadiusProfile {
    /// Constant radius.
    pub fn uniform(radius: f64) -> Self {
        Self::linear(radius, radius)
    }

    /// Linear taper from `start` to `end`.
    pub fn linear(start: f64, end: f64) -> Self {
        Self {
            start,
            start_derivative: end - start,
            end,
            end_derivative: end - start,
        }
    }
}

/// Everything the pipeline needs to know about one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchDefinition {
    /// Which branch this is.
    pub id: BranchId,
    /// Canonical cross-section frame.
    pub frame: CanonicalFrame,
    /// Centerline control points, in station order.
    pub path: Vec<PathControl>,
    /// Radius along the segment.
    pub radius: RadiusProfile,
}

/// A complete generation request.
///
/// All three cross-axis fields must point to the same side of the
/// bifurcation plane ("front"), i.e. along `t_parent × (t_daughter1 −
/// t_daughter2)` at the junction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BifurcationInput {
    /// Resolution and wall settings.
    #[serde(default)]
    pub settings: BifurcationSettings,
    /// Incoming branch.
    pub parent: BranchDefinition,
    /// First outgoing branch.
    pub daughter1: BranchDefinition,
    /// Second outgoing branch.
    pub daughter2: BranchDefinition,
}

impl BifurcationInput {
    /// Definition of the given branch.
    pub fn branch(&self, id: BranchId) -> &BranchDefinition {
        match id {
            BranchId::Parent => &self.parent,
            BranchId::Daughter1 => &self.daughter1,
            BranchId::Daughter2 => &self.daughter2,
        }
    }

    /// Validate settings and branch frames. Centerline length and radius
    /// are checked by the stages that consume them.
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        for id in BranchId::ALL {
            let branch = self.branch(id);
            if branch.id != id {
                return Err(BifurcationError::degenerate(format!(
                    "{} definition supplied in the {id} slot",
                    branch.id
                )));
            }
            branch.frame.validate()?;
        }
        Ok(())
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Mirror-symmetric Y bifurcation in the x-z plane.
    pub fn symmetric(shape: &SymmetricBifurcation, settings: BifurcationSettings) -> Self {
        let front = Vec3::y();
        let parent_axis = Vec3::z();
        let parent = BranchDefinition {
            id: BranchId::Parent,
            frame: CanonicalFrame::default_for(BranchId::Parent),
            path: vec![
                PathControl::new(
                    Point3::new(0.0, 0.0, -shape.parent_length),
                    parent_axis * shape.parent_length,
                    front,
                ),
                PathControl::new(Point3::origin(), parent_axis * shape.parent_length, front),
            ],
            radius: RadiusProfile::uniform(shape.parent_radius),
        };

        let (s, c) = shape.branch_angle.sin_cos();
        let daughter = |id: BranchId, sign: f64| {
            let axis = Vec3::new(sign * s, 0.0, c);
            let start = Point3::from(axis * shape.junction_gap);
            let end = Point3::from(axis * (shape.junction_gap + shape.daughter_length));
            BranchDefinition {
                id,
                frame: CanonicalFrame::default_for(id),
                path: vec![
                    PathControl::new(start, axis * shape.daughter_length, front),
                    PathControl::new(end, axis * shape.daughter_length, front),
                ],
                radius: RadiusProfile::uniform(shape.daughter_radius),
            }
        };

        Self {
            settings,
            parent,
            daughter1: daughter(BranchId::Daughter1, 1.0),
            daughter2: daughter(BranchId::Daughter2, -1.0),
        }
    }
}

/// Dimensions of [`BifurcationInput::symmetric`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymmetricBifurcation {
    /// Length of the parent trunk, ending at the origin.
    pub parent_length: f64,
    /// Length of each daughter trunk.
    pub daughter_length: f64,
    /// Angle between the parent axis and each daughter axis (radians).
    pub branch_angle: f64,
    /// Distance from the origin to the first daughter station.
    pub junction_gap: f64,
    /// Parent radius.
    pub parent_radius: f64,
    /// Daughter radius.
    pub daughter_radius: f64,
}

impl Default for SymmetricBifurcation {
    fn default() -> Self {
        Self {
            parent_length: 3.0,
            daughter_length: 2.5,
            branch_angle: std::f64::consts::FRAC_PI_6,
            junction_gap: 1.2,
            parent_radius: 0.5,
            daughter_radius: 0.5,
        }
    }
}
