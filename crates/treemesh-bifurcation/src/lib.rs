#![warn(missing_docs)]

//! Hexahedral mesh generation for bifurcating tubes.
//!
//! Builds the nodes, derivatives and element connectivity of a parent tube
//! splitting into two daughters (an airway bifurcation, say) from three
//! centerline curves, radius profiles and a wall thickness. The result is
//! a plain data structure for an external finite-element authoring library.
//!
//! The pipeline runs per branch through [`path`], [`profile`] and
//! [`warp`], joins the branches with the five-point hub from [`junction`],
//! extrudes the wall in [`wall`] and numbers everything in [`topology`].
//!
//! # Example
//!
//! ```ignore
//! use treemesh_bifurcation::{generate, BifurcationInput, BifurcationSettings, SymmetricBifurcation};
//!
//! let input = BifurcationInput::symmetric(&SymmetricBifurcation::default(), BifurcationSettings::default());
//! let mesh = generate(&input)?;
//! println!("{} nodes, {} elements", mesh.node_count(), mesh.element_count());
//! ```
//!
//! Only a single bifurcation level is supported; each call meshes one
//! parent and its two daughters.

pub mod error;
pub mod input;
pub mod junction;
pub mod mesh;
pub mod path;
pub mod profile;
pub mod settings;
pub mod topology;
pub mod wall;
pub mod warp;

pub use error::{BifurcationError, Result};
pub use input::{
    BifurcationInput, BranchDefinition, BranchId, CanonicalFrame, PathControl, RadiusProfile,
    SymmetricBifurcation,
};
pub use junction::{stitch, BranchEnd, HubNode, JunctionPatch};
pub use mesh::{BifurcationMesh, MeshNode, NodeSet};
pub use path::{sample_central_path, Station};
pub use profile::{build_canonical_rings, Ring, RingPoint};
pub use settings::{BifurcationSettings, MeshDimension};
pub use topology::{
    assemble, CornerRemap, Element, ElementBlock, ElementNodes, ElementTemplate, NodeBlock,
    NodeLayout, SignedAxis, TemplateId,
};
pub use wall::{check_outward, extrude_node, SurfaceNode, WallNode};
pub use warp::{station_rotation, warp_rings};

use tracing::{debug, info};

use junction::end_station_index;
use mesh::{hub_node_sets, trunk_node_set};
use wall::{extrude, extrude_trunk, trunk_surface};

/// Generate the mesh of one bifurcation.
///
/// Geometry is built completely before any node is numbered, so a failure
/// never leaves a partial mesh.
///
/// # Errors
///
/// Returns an error if the settings or any branch definition cannot be
/// meshed; see [`BifurcationError`].
pub fn generate(input: &BifurcationInput) -> Result<BifurcationMesh> {
    input.validate()?;
    let settings = &input.settings;
    let n = settings.elements_count_around;
    info!(
        "Generating bifurcation: {} around, {} along, {} node layers",
        n,
        settings.elements_count_along_segment,
        settings.node_layers()
    );

    let mut stations = Vec::with_capacity(3);
    let mut rings = Vec::with_capacity(3);
    for id in BranchId::ALL {
        let branch = input.branch(id);
        let sampled = sample_central_path(id, &branch.path, settings.elements_count_along_segment)?;
        let canonical = build_canonical_rings(id, &branch.frame, &sampled, &branch.radius, n)?;
        rings.push(warp_rings(id, &branch.frame, &sampled, &canonical)?);
        stations.push(sampled);
    }

    let ends: [BranchEnd<'_>; 3] = std::array::from_fn(|i| {
        let j = end_station_index(BranchId::ALL[i], stations[i].len());
        BranchEnd {
            ring: &rings[i][j],
            station: &stations[i][j],
        }
    });
    let patch = stitch(ends)?;

    let transit = settings.transit_flags();
    let surfaces = BranchId::ALL
        .iter()
        .map(|&id| trunk_surface(id, &stations[id.index()], &rings[id.index()], &transit))
        .collect::<Result<Vec<_>>>()?;

    let trunk_walls: Vec<_> = BranchId::ALL
        .iter()
        .map(|&id| extrude_trunk(id, &surfaces[id.index()], settings))
        .collect();
    let hub_walls = HubNode::ALL.map(|hub| extrude(patch.node(hub), settings));
    debug!("Extruded hub into {} layers", settings.node_layers());

    let layout = NodeLayout::new(settings);
    let mut node_sets: Vec<NodeSet> = BranchId::ALL
        .iter()
        .map(|&id| trunk_node_set(id, &layout, &trunk_walls[id.index()]))
        .collect();
    node_sets.extend(hub_node_sets(&layout, &hub_walls));

    let end_rings: [&[SurfaceNode]; 3] = std::array::from_fn(|i| {
        let j = end_station_index(BranchId::ALL[i], surfaces[i].len());
        surfaces[i][j].as_slice()
    });
    let topology = assemble(settings, &layout, end_rings, &patch);

    let thickness = match settings.dimension {
        MeshDimension::Solid => settings.wall_thickness,
        MeshDimension::Surface => 0.0,
    };
    let mesh = BifurcationMesh {
        node_sets,
        elements: topology.elements,
        templates: topology.templates,
        contracted_wall_thickness: vec![thickness; settings.elements_count_along_segment + 1],
    };
    info!(
        "Generated bifurcation mesh: {} nodes, {} elements, {} templates",
        mesh.node_count(),
        mesh.element_count(),
        mesh.templates.len()
    );
    Ok(mesh)
}
