//! Junction stitching: the five-point hub that closes a bifurcation.
//!
//! The hub sits between the parent's last ring and the daughters' first
//! rings. It always has three outer points (one on each side between a
//! parent/daughter pair, plus the carina between the daughters) and two
//! inner points (the front and back saddles where all three tubes meet).
//!
//! Each branch touches four hub points, taken from its ring at the quarter
//! positions `q·n/4`. Ring point 0 faces the front of the bifurcation and
//! rings run counter-clockwise about their tangent, so the role of every
//! quarter is fixed by [`HUB_ROLES`].
//!
//! Hub derivatives come from Hermite chains threaded from one branch
//! surface, through hub points, to another branch surface. Every chain is
//! described by a `ChainPlan` row and solved by the same routine.

use serde::{Deserialize, Serialize};
use tracing::debug;
use treemesh_math::hermite::{self, SmoothOptions};
use treemesh_math::{centroid, try_normalize, Point3, Vec3};

use crate::error::{BifurcationError, Result};
use crate::input::BranchId;
use crate::path::Station;
use crate::profile::{Ring, RingPoint};
use crate::wall::{check_outward, SurfaceNode};

/// Weight of the parent/daughter midpoint in a side outer point. The
/// daughter surface point gets the rest.
const SIDE_MIDPOINT_WEIGHT: f64 = 0.35;

/// Carina weights: daughter 1, daughter 2, parent centre.
const CARINA_WEIGHTS: [f64; 3] = [7.0 / 16.0, 7.0 / 16.0, 2.0 / 16.0];

/// One of the five hub points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HubNode {
    /// Side point between the parent and daughter 1.
    Outer1,
    /// Side point between the parent and daughter 2.
    Outer2,
    /// Carina point between the two daughters.
    Outer3,
    /// Front saddle.
    Inner0,
    /// Back saddle.
    Inner1,
}

impl HubNode {
    /// All hub points in node-numbering order.
    pub const ALL: [HubNode; 5] = [
        HubNode::Outer1,
        HubNode::Outer2,
        HubNode::Outer3,
        HubNode::Inner0,
        HubNode::Inner1,
    ];

    /// Position in [`HubNode::ALL`].
    pub fn index(self) -> usize {
        match self {
            HubNode::Outer1 => 0,
            HubNode::Outer2 => 1,
            HubNode::Outer3 => 2,
            HubNode::Inner0 => 3,
            HubNode::Inner1 => 4,
        }
    }

    /// Whether this is an outer point.
    pub fn is_outer(self) -> bool {
        self.index() < 3
    }

    /// Index within its own block (outer or inner).
    pub fn block_index(self) -> usize {
        if self.is_outer() {
            self.index()
        } else {
            self.index() - 3
        }
    }
}

/// Hub point reached from each quarter of each branch end ring, indexed
/// by [`BranchId::index`] then quarter.
pub const HUB_ROLES: [[HubNode; 4]; 3] = [
    [HubNode::Inner0, HubNode::Outer2, HubNode::Inner1, HubNode::Outer1],
    [HubNode::Inner0, HubNode::Outer3, HubNode::Inner1, HubNode::Outer1],
    [HubNode::Inner0, HubNode::Outer2, HubNode::Inner1, HubNode::Outer3],
];

/// Hub point facing `quarter` of `branch`'s end ring.
pub fn hub_role(branch: BranchId, quarter: usize) -> HubNode {
    HUB_ROLES[branch.index()][quarter % 4]
}

/// Station index of the ring that meets the hub.
pub fn end_station_index(branch: BranchId, station_count: usize) -> usize {
    match branch {
        BranchId::Parent => station_count.saturating_sub(1),
        BranchId::Daughter1 | BranchId::Daughter2 => 0,
    }
}

/// A branch's ring and station nearest the junction.
#[derive(Debug, Clone, Copy)]
pub struct BranchEnd<'a> {
    /// Warped ring.
    pub ring: &'a Ring,
    /// Centerline station of that ring.
    pub station: &'a Station,
}

/// The stitched hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JunctionPatch {
    /// Outer points in order `Outer1`, `Outer2`, `Outer3`.
    pub outer: [SurfaceNode; 3],
    /// Inner points in order `Inner0`, `Inner1`.
    pub inner: [SurfaceNode; 2],
}

impl JunctionPatch {
    /// Surface node of a hub point.
    pub fn node(&self, hub: HubNode) -> &SurfaceNode {
        if hub.is_outer() {
            &self.outer[hub.block_index()]
        } else {
            &self.inner[hub.block_index()]
        }
    }

    /// All hub points in node-numbering order.
    pub fn nodes(&self) -> impl Iterator<Item = (HubNode, &SurfaceNode)> + '_ {
        HubNode::ALL.into_iter().map(move |hub| (hub, self.node(hub)))
    }
}

/// Which hub derivative a chain determines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainRole {
    /// `d1`, with around curvature.
    Around,
    /// `d2`, with along curvature.
    Along,
}

/// One Hermite chain from a branch surface point, through hub points, to
/// another branch surface point.
#[derive(Debug)]
struct ChainPlan {
    /// Branch and quarter the chain leaves from.
    start: (BranchId, usize),
    /// Hub points in chain order.
    through: &'static [HubNode],
    /// Branch and quarter the chain ends on.
    end: (BranchId, usize),
    role: ChainRole,
    /// Hub points that take their derivative from this chain.
    assigns: &'static [HubNode],
}

const CHAINS: [ChainPlan; 8] = [
    ChainPlan {
        start: (BranchId::Parent, 3),
        through: &[HubNode::Outer1],
        end: (BranchId::Daughter1, 3),
        role: ChainRole::Along,
        assigns: &[HubNode::Outer1],
    },
    ChainPlan {
        start: (BranchId::Parent, 1),
        through: &[HubNode::Outer2],
        end: (BranchId::Daughter2, 1),
        role: ChainRole::Along,
        assigns: &[HubNode::Outer2],
    },
    ChainPlan {
        start: (BranchId::Daughter2, 3),
        through: &[HubNode::Outer3],
        end: (BranchId::Daughter1, 1),
        role: ChainRole::Along,
        assigns: &[HubNode::Outer3],
    },
    ChainPlan {
        start: (BranchId::Daughter2, 2),
        through: &[HubNode::Inner1, HubNode::Outer1, HubNode::Inner0],
        end: (BranchId::Daughter2, 0),
        role: ChainRole::Around,
        assigns: &[HubNode::Outer1],
    },
    ChainPlan {
        start: (BranchId::Daughter1, 0),
        through: &[HubNode::Inner0, HubNode::Outer2, HubNode::Inner1],
        end: (BranchId::Daughter1, 2),
        role: ChainRole::Around,
        assigns: &[HubNode::Outer2],
    },
    // Carina chain: parent front, over the carina, down to parent back.
    // It threads the parent's quarter points rather than a daughter's so it
    // favours neither daughter; a daughter-anchored chain would break the
    // hub's mirror symmetry when the daughters are mirror images.
    ChainPlan {
        start: (BranchId::Parent, 0),
        through: &[HubNode::Inner0, HubNode::Outer3, HubNode::Inner1],
        end: (BranchId::Parent, 2),
        role: ChainRole::Around,
        assigns: &[HubNode::Inner0, HubNode::Outer3, HubNode::Inner1],
    },
    ChainPlan {
        start: (BranchId::Daughter2, 0),
        through: &[HubNode::Inner0],
        end: (BranchId::Daughter1, 0),
        role: ChainRole::Along,
        assigns: &[HubNode::Inner0],
    },
    ChainPlan {
        start: (BranchId::Daughter2, 2),
        through: &[HubNode::Inner1],
        end: (BranchId::Daughter1, 2),
        role: ChainRole::Along,
        assigns: &[HubNode::Inner1],
    },
];

/// A chain after smoothing.
struct SolvedChain {
    points: Vec<Point3>,
    derivatives: Vec<Vec3>,
}

impl SolvedChain {
    /// Mean of the curvatures either side of interior point `i`.
    fn curvature_at(&self, i: usize, radial: &Vec3) -> f64 {
        let (p, d) = (&self.points, &self.derivatives);
        let before = hermite::curvature(&p[i - 1], &d[i - 1], &p[i], &d[i], radial, 1.0);
        let after = hermite::curvature(&p[i], &d[i], &p[i + 1], &d[i + 1], radial, 0.0);
        0.5 * (before + after)
    }
}

fn quarter_points(ring: &Ring) -> [RingPoint; 4] {
    let n = ring.len() as f64;
    std::array::from_fn(|q| ring.sample(q as f64 * n / 4.0))
}

fn resized(v: &Vec3, length: f64, fallback: Vec3) -> Vec3 {
    try_normalize(v).map_or(fallback, |u| u * length)
}

fn solve_chain(plan: &ChainPlan, quarters: &[[RingPoint; 4]; 3], hub: &[Point3; 5]) -> SolvedChain {
    let (start_branch, start_q) = plan.start;
    let (end_branch, end_q) = plan.end;
    let first = &quarters[start_branch.index()][start_q];
    let last = &quarters[end_branch.index()][end_q];

    let mut points = Vec::with_capacity(plan.through.len() + 2);
    points.push(first.x);
    points.extend(plan.through.iter().map(|h| hub[h.index()]));
    points.push(last.x);
    let m = points.len() - 1;

    let mut derivatives = vec![Vec3::zeros(); points.len()];
    let first_chord = points[1] - points[0];
    let last_chord = points[m] - points[m - 1];
    derivatives[0] = resized(
        &(first.d2 * start_branch.toward_junction()),
        first_chord.norm(),
        first_chord,
    );
    derivatives[m] = resized(
        &(last.d2 * -end_branch.toward_junction()),
        last_chord.norm(),
        last_chord,
    );
    for i in 1..m {
        derivatives[i] = (points[i + 1] - points[i - 1]) * 0.5;
    }

    let derivatives =
        hermite::smooth_derivatives_line(&points, &derivatives, &SmoothOptions::fixed_ends());
    SolvedChain {
        points,
        derivatives,
    }
}

/// Check the daughters sit on the sides the cross axes imply.
fn check_branch_order(ends: &[BranchEnd<'_>; 3]) -> Result<Vec3> {
    let unit = |id: BranchId| {
        try_normalize(&ends[id.index()].station.tangent).ok_or_else(|| {
            BifurcationError::degenerate(format!("{id} has a zero tangent at the junction"))
        })
    };
    let parent = unit(BranchId::Parent)?;
    let spread = unit(BranchId::Daughter1)? - unit(BranchId::Daughter2)?;
    let front = try_normalize(&parent.cross(&spread)).ok_or_else(|| {
        BifurcationError::degenerate("daughter directions do not span a bifurcation plane")
    })?;
    for id in BranchId::ALL {
        if ends[id.index()].station.cross_axis.dot(&front) <= 0.0 {
            return Err(BifurcationError::degenerate(format!(
                "{id} cross axis faces the back of the bifurcation; daughters may be swapped"
            )));
        }
    }
    Ok(front)
}

/// Stitch the hub from the three branch ends, indexed by [`BranchId::index`].
///
/// # Errors
///
/// Returns [`BifurcationError::DegenerateInput`] if the daughters are in
/// the wrong order for the cross axes, if a hub derivative vanishes, or if
/// a hub normal points into the lumen.
pub fn stitch(ends: [BranchEnd<'_>; 3]) -> Result<JunctionPatch> {
    check_branch_order(&ends)?;
    let quarters: [[RingPoint; 4]; 3] = std::array::from_fn(|i| quarter_points(ends[i].ring));
    let [p, a, b] = &quarters;

    let side = |parent: &RingPoint, daughter: &RingPoint| {
        let mid = (parent.x.coords + daughter.x.coords) * 0.5;
        Point3::from(mid * SIDE_MIDPOINT_WEIGHT + daughter.x.coords * (1.0 - SIDE_MIDPOINT_WEIGHT))
    };
    let parent_centre = ends[BranchId::Parent.index()].station.position;

    let mut x = [Point3::origin(); 5];
    x[HubNode::Outer1.index()] = side(&p[3], &a[3]);
    x[HubNode::Outer2.index()] = side(&p[1], &b[1]);
    x[HubNode::Outer3.index()] = Point3::from(
        a[1].x.coords * CARINA_WEIGHTS[0]
            + b[3].x.coords * CARINA_WEIGHTS[1]
            + parent_centre.coords * CARINA_WEIGHTS[2],
    );
    x[HubNode::Inner0.index()] = centroid(&[p[0].x, a[0].x, b[0].x]);
    x[HubNode::Inner1.index()] = centroid(&[p[2].x, a[2].x, b[2].x]);

    let solved: Vec<SolvedChain> = CHAINS
        .iter()
        .map(|plan| solve_chain(plan, &quarters, &x))
        .collect();

    let mut d1 = [Vec3::zeros(); 5];
    let mut d2 = [Vec3::zeros(); 5];
    for (plan, chain) in CHAINS.iter().zip(&solved) {
        for (i, hub) in plan.through.iter().enumerate() {
            if !plan.assigns.contains(hub) {
                continue;
            }
            let target = match plan.role {
                ChainRole::Around => &mut d1,
                ChainRole::Along => &mut d2,
            };
            target[hub.index()] = chain.derivatives[i + 1];
        }
    }

    let mut normal = [Vec3::zeros(); 5];
    for hub in HubNode::ALL {
        let k = hub.index();
        normal[k] = try_normalize(&d1[k])
            .zip(try_normalize(&d2[k]))
            .and_then(|(u, v)| try_normalize(&u.cross(&v)))
            .ok_or_else(|| {
                BifurcationError::degenerate(format!("{hub:?} derivatives are degenerate"))
            })?;
    }

    let mut curvature_around = [0.0; 5];
    let mut curvature_along = [0.0; 5];
    for (plan, chain) in CHAINS.iter().zip(&solved) {
        for (i, hub) in plan.through.iter().enumerate() {
            if !plan.assigns.contains(hub) {
                continue;
            }
            let k = hub.index();
            match plan.role {
                ChainRole::Around => curvature_around[k] = chain.curvature_at(i + 1, &normal[k]),
                ChainRole::Along => curvature_along[k] = chain.curvature_at(i + 1, &-normal[k]),
            }
        }
    }

    let centre = centroid(&ends.map(|end| end.station.position));
    for hub in HubNode::ALL {
        let k = hub.index();
        check_outward(&normal[k], &x[k], &centre).map_err(|_| {
            BifurcationError::degenerate(format!("{hub:?} normal points into the lumen"))
        })?;
    }

    let node = |hub: HubNode| {
        let k = hub.index();
        SurfaceNode {
            x: x[k],
            d1: d1[k],
            d2: d2[k],
            normal: normal[k],
            curvature_around: curvature_around[k],
            curvature_along: curvature_along[k],
        }
    };
    let patch = JunctionPatch {
        outer: [node(HubNode::Outer1), node(HubNode::Outer2), node(HubNode::Outer3)],
        inner: [node(HubNode::Inner0), node(HubNode::Inner1)],
    };
    debug!(
        "Stitched junction hub from {} chains, carina at {:?}",
        CHAINS.len(),
        patch.node(HubNode::Outer3).x
    );
    Ok(patch)
}
