//! Node numbering and element connectivity.
//!
//! Node identifiers come from a [`NodeLayout`] built once per run: one
//! offset table per block, with every identifier computed through
//! [`NodeLayout::node_id`]. Elements are then listed block by block. Trunk
//! elements use the standard basis; closure elements joining a trunk to the
//! hub may remap the derivatives used at their hub corners, recorded as a
//! template interned in a per-run [`TemplateCache`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use treemesh_math::{try_normalize, Vec3};

use crate::input::BranchId;
use crate::junction::{hub_role, HubNode, JunctionPatch};
use crate::settings::{BifurcationSettings, MeshDimension};
use crate::wall::SurfaceNode;

/// Node blocks in numbering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeBlock {
    /// Parent trunk.
    Parent,
    /// Daughter 1 trunk.
    Daughter1,
    /// Daughter 2 trunk.
    Daughter2,
    /// Outer hub points.
    JunctionOuter,
    /// Inner hub points.
    JunctionInner,
}

impl NodeBlock {
    /// All blocks in numbering order.
    pub const ALL: [NodeBlock; 5] = [
        NodeBlock::Parent,
        NodeBlock::Daughter1,
        NodeBlock::Daughter2,
        NodeBlock::JunctionOuter,
        NodeBlock::JunctionInner,
    ];

    /// Trunk block of a branch.
    pub fn trunk(branch: BranchId) -> Self {
        match branch {
            BranchId::Parent => NodeBlock::Parent,
            BranchId::Daughter1 => NodeBlock::Daughter1,
            BranchId::Daughter2 => NodeBlock::Daughter2,
        }
    }

    /// Hub block holding `hub`.
    pub fn hub(hub: HubNode) -> Self {
        if hub.is_outer() {
            NodeBlock::JunctionOuter
        } else {
            NodeBlock::JunctionInner
        }
    }

    fn index(self) -> usize {
        match self {
            NodeBlock::Parent => 0,
            NodeBlock::Daughter1 => 1,
            NodeBlock::Daughter2 => 2,
            NodeBlock::JunctionOuter => 3,
            NodeBlock::JunctionInner => 4,
        }
    }
}

/// Offsets of one block. Identifiers run around fastest, then through the
/// wall, then along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockOffsets {
    /// Identifier of the block's first node.
    pub start_id: u32,
    /// Step between neighbours around.
    pub ring_stride: u32,
    /// Step between through-wall layers.
    pub wall_stride: u32,
    /// Step between stations.
    pub along_stride: u32,
    /// Stations in the block.
    pub stations: usize,
    /// Nodes around each layer.
    pub around: usize,
    /// Through-wall node layers.
    pub layers: usize,
}

impl BlockOffsets {
    fn new(start_id: u32, stations: usize, around: usize, layers: usize) -> Self {
        Self {
            start_id,
            ring_stride: 1,
            wall_stride: around as u32,
            along_stride: (around * layers) as u32,
            stations,
            around,
            layers,
        }
    }

    /// Number of nodes in the block.
    pub fn count(&self) -> usize {
        self.stations * self.around * self.layers
    }

    /// Identifier one past the block's last node.
    pub fn end_id(&self) -> u32 {
        self.start_id + self.count() as u32
    }
}

/// Named offset table for every block of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLayout {
    blocks: [BlockOffsets; 5],
}

impl NodeLayout {
    /// Build the table for the given resolution.
    pub fn new(settings: &BifurcationSettings) -> Self {
        let stations = settings.elements_count_along_segment + 1;
        let around = settings.elements_count_around;
        let layers = settings.node_layers();

        let mut next = settings.first_node_identifier;
        let mut block = |stations: usize, around: usize| {
            let offsets = BlockOffsets::new(next, stations, around, layers);
            next = offsets.end_id();
            offsets
        };
        let parent = block(stations, around);
        let daughter1 = block(stations, around);
        let daughter2 = block(stations, around);
        let outer = block(1, 3);
        let inner = block(1, 2);
        Self {
            blocks: [parent, daughter1, daughter2, outer, inner],
        }
    }

    /// Offsets of one block.
    pub fn block(&self, block: NodeBlock) -> &BlockOffsets {
        &self.blocks[block.index()]
    }

    /// Identifier of a node.
    ///
    /// # Panics
    ///
    /// Panics if any index is outside the block.
    pub fn node_id(&self, block: NodeBlock, station: usize, layer: usize, around: usize) -> u32 {
        let b = self.block(block);
        assert!(
            station < b.stations && layer < b.layers && around < b.around,
            "node ({station}, {layer}, {around}) outside {block:?} ({} x {} x {})",
            b.stations,
            b.layers,
            b.around
        );
        b.start_id
            + station as u32 * b.along_stride
            + layer as u32 * b.wall_stride
            + around as u32 * b.ring_stride
    }

    /// Identifier of a trunk node.
    pub fn trunk_id(&self, branch: BranchId, station: usize, layer: usize, around: usize) -> u32 {
        self.node_id(NodeBlock::trunk(branch), station, layer, around)
    }

    /// Identifier of a hub node.
    pub fn hub_id(&self, hub: HubNode, layer: usize) -> u32 {
        self.node_id(NodeBlock::hub(hub), 0, layer, hub.block_index())
    }

    /// Total number of nodes.
    pub fn total_nodes(&self) -> usize {
        self.blocks.iter().map(BlockOffsets::count).sum()
    }
}

/// Hub quarter reached from around position `k` of an end ring.
pub fn closure_hub_corner(k: usize, elements_count_around: usize) -> usize {
    let n = elements_count_around;
    ((4 * k + n / 2) / n) % 4
}

/// A node derivative as seen from an element corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignedAxis {
    /// The node's `d1`.
    PlusD1,
    /// Negated `d1`.
    MinusD1,
    /// The node's `d2`.
    PlusD2,
    /// Negated `d2`.
    MinusD2,
    /// No derivative; the edge is collapsed.
    Zero,
}

impl SignedAxis {
    const CANDIDATES: [SignedAxis; 4] = [
        SignedAxis::PlusD1,
        SignedAxis::MinusD1,
        SignedAxis::PlusD2,
        SignedAxis::MinusD2,
    ];

    /// The derivative this axis selects from `node`.
    pub fn vector(self, node: &SurfaceNode) -> Vec3 {
        match self {
            SignedAxis::PlusD1 => node.d1,
            SignedAxis::MinusD1 => -node.d1,
            SignedAxis::PlusD2 => node.d2,
            SignedAxis::MinusD2 => -node.d2,
            SignedAxis::Zero => Vec3::zeros(),
        }
    }

    /// Both signs of the other derivative.
    fn complements(self) -> [SignedAxis; 2] {
        match self {
            SignedAxis::PlusD1 | SignedAxis::MinusD1 => [SignedAxis::PlusD2, SignedAxis::MinusD2],
            SignedAxis::PlusD2 | SignedAxis::MinusD2 | SignedAxis::Zero => {
                [SignedAxis::PlusD1, SignedAxis::MinusD1]
            }
        }
    }

    /// Candidate best aligned with `direction`.
    fn best_match(node: &SurfaceNode, direction: &Vec3) -> SignedAxis {
        let Some(target) = try_normalize(direction) else {
            return SignedAxis::PlusD1;
        };
        let score = |axis: SignedAxis| {
            try_normalize(&axis.vector(node)).map_or(f64::NEG_INFINITY, |v| v.dot(&target))
        };
        Self::CANDIDATES
            .into_iter()
            .fold((SignedAxis::PlusD1, f64::NEG_INFINITY), |best, axis| {
                let s = score(axis);
                if s > best.1 {
                    (axis, s)
                } else {
                    best
                }
            })
            .0
    }
}

/// Local derivative choice at one element corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CornerRemap {
    /// Derivative used along the element's xi1.
    pub xi1: SignedAxis,
    /// Derivative used along the element's xi2.
    pub xi2: SignedAxis,
}

impl CornerRemap {
    /// Unchanged `d1`, `d2`.
    pub const STANDARD: CornerRemap = CornerRemap {
        xi1: SignedAxis::PlusD1,
        xi2: SignedAxis::PlusD2,
    };

    /// Remap whose xi1 follows `around` and whose xi2 keeps the corner
    /// right-handed about the node normal.
    pub fn matching(node: &SurfaceNode, around: &Vec3) -> Self {
        let xi1 = SignedAxis::best_match(node, around);
        let [plus, minus] = xi1.complements();
        let handed = xi1
            .vector(node)
            .cross(&plus.vector(node))
            .dot(&node.normal);
        let xi2 = if handed > 0.0 { plus } else { minus };
        Self { xi1, xi2 }
    }

    /// Remap for a corner on a collapsed xi1 edge.
    pub fn collapsed(node: &SurfaceNode, along: &Vec3) -> Self {
        Self {
            xi1: SignedAxis::Zero,
            xi2: SignedAxis::best_match(node, along),
        }
    }
}

/// Basis description shared by elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementTemplate {
    /// Every corner uses `d1`, `d2`, `d3` unchanged.
    Standard,
    /// Per-corner derivative choice for the four corners of the xi1/xi2
    /// face, in local node order; every through-wall layer uses the same.
    Remapped {
        /// Corner remaps.
        corners: [CornerRemap; 4],
    },
}

/// Index of an interned [`ElementTemplate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub usize);

/// Memoizing template factory owned by one run.
#[derive(Debug, Default)]
pub struct TemplateCache {
    ids: HashMap<ElementTemplate, TemplateId>,
    templates: Vec<ElementTemplate>,
}

impl TemplateCache {
    /// Identifier for `template`, registering it on first use.
    pub fn intern(&mut self, template: ElementTemplate) -> TemplateId {
        if let Some(&id) = self.ids.get(&template) {
            return id;
        }
        let id = TemplateId(self.templates.len());
        self.templates.push(template);
        self.ids.insert(template, id);
        id
    }

    /// Number of distinct templates.
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no template has been registered.
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Templates in identifier order.
    pub fn into_templates(self) -> Vec<ElementTemplate> {
        self.templates
    }
}

/// Which part of the mesh an element belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementBlock {
    /// Regular element of a trunk.
    Trunk(BranchId),
    /// Element joining a trunk's end ring to the hub.
    Closure(BranchId),
}

/// Element connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementNodes {
    /// Solid element, xi1 fastest.
    Hex([u32; 8]),
    /// Surface element, xi1 fastest.
    Quad([u32; 4]),
}

impl ElementNodes {
    /// Node identifiers in local order.
    pub fn ids(&self) -> &[u32] {
        match self {
            ElementNodes::Hex(ids) => &ids[..],
            ElementNodes::Quad(ids) => &ids[..],
        }
    }

    /// Whether some local nodes share an identifier.
    pub fn has_repeated_nodes(&self) -> bool {
        let ids = self.ids();
        ids.iter()
            .enumerate()
            .any(|(i, a)| ids[i + 1..].contains(a))
    }
}

/// One mesh element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Element identifier.
    pub identifier: u32,
    /// Block the element belongs to.
    pub block: ElementBlock,
    /// Connectivity.
    pub nodes: ElementNodes,
    /// Interned basis template.
    pub template: TemplateId,
}

/// Elements and the templates they reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Elements in identifier order.
    pub elements: Vec<Element>,
    /// Templates indexed by [`TemplateId`].
    pub templates: Vec<ElementTemplate>,
}

/// Template for the closure element at around position `k` of `branch`.
pub fn closure_template(
    branch: BranchId,
    k: usize,
    end_ring: &[SurfaceNode],
    patch: &JunctionPatch,
) -> ElementTemplate {
    let n = end_ring.len();
    let quarters = [closure_hub_corner(k, n), closure_hub_corner(k + 1, n)];
    let collapsed = quarters[0] == quarters[1];
    let hub_slots = match branch {
        BranchId::Parent => [2, 3],
        BranchId::Daughter1 | BranchId::Daughter2 => [0, 1],
    };

    let mut corners = [CornerRemap::STANDARD; 4];
    for side in 0..2 {
        let hub = patch.node(hub_role(branch, quarters[side]));
        let ring_node = &end_ring[(k + side) % n];
        corners[hub_slots[side]] = if collapsed {
            let along = match branch {
                BranchId::Parent => hub.x - ring_node.x,
                BranchId::Daughter1 | BranchId::Daughter2 => ring_node.x - hub.x,
            };
            CornerRemap::collapsed(hub, &along)
        } else {
            CornerRemap::matching(hub, &ring_node.d1)
        };
    }

    if corners.iter().all(|c| *c == CornerRemap::STANDARD) {
        ElementTemplate::Standard
    } else {
        ElementTemplate::Remapped { corners }
    }
}

/// Connectivity of one element from its face corners `corner(c, layer)`,
/// `c` in xi1-fastest order.
fn connect(
    dimension: MeshDimension,
    corner: impl Fn(usize, usize) -> u32,
    layer: usize,
) -> ElementNodes {
    match dimension {
        MeshDimension::Solid => {
            ElementNodes::Hex(std::array::from_fn(|i| corner(i % 4, layer + i / 4)))
        }
        MeshDimension::Surface => ElementNodes::Quad(std::array::from_fn(|i| corner(i, 0))),
    }
}

/// List every element of the mesh.
///
/// `end_rings` holds the inner surface of each branch's ring at the hub,
/// indexed by [`BranchId::index`]. Elements are numbered trunk by trunk,
/// then closures by branch.
pub fn assemble(
    settings: &BifurcationSettings,
    layout: &NodeLayout,
    end_rings: [&[SurfaceNode]; 3],
    patch: &JunctionPatch,
) -> Topology {
    let n = settings.elements_count_around;
    let along = settings.elements_count_along_segment;
    let element_layers = settings.element_layers();
    let dimension = settings.dimension;

    let mut cache = TemplateCache::default();
    let standard = cache.intern(ElementTemplate::Standard);
    let mut elements = Vec::new();
    let mut push = |block: ElementBlock, nodes: ElementNodes, template: TemplateId| {
        let identifier = settings.first_element_identifier + elements.len() as u32;
        elements.push(Element {
            identifier,
            block,
            nodes,
            template,
        });
    };

    for branch in BranchId::ALL {
        for j in 0..along {
            for layer in 0..element_layers {
                for k in 0..n {
                    let corner = |c: usize, l: usize| {
                        layout.trunk_id(branch, j + c / 2, l, (k + c % 2) % n)
                    };
                    push(ElementBlock::Trunk(branch), connect(dimension, corner, layer), standard);
                }
            }
        }
    }

    for branch in BranchId::ALL {
        let end_ring = end_rings[branch.index()];
        for layer in 0..element_layers {
            for k in 0..n {
                let hub = |offset: usize, l: usize| {
                    layout.hub_id(hub_role(branch, closure_hub_corner(k + offset, n)), l)
                };
                let corner = |c: usize, l: usize| match branch {
                    BranchId::Parent if c < 2 => layout.trunk_id(branch, along, l, (k + c) % n),
                    BranchId::Parent => hub(c - 2, l),
                    _ if c < 2 => hub(c, l),
                    _ => layout.trunk_id(branch, 0, l, (k + c - 2) % n),
                };
                let template = cache.intern(closure_template(branch, k, end_ring, patch));
                push(ElementBlock::Closure(branch), connect(dimension, corner, layer), template);
            }
        }
    }

    debug!(
        "Assembled {} elements ({} collapsed) over {} nodes with {} templates",
        elements.len(),
        elements.iter().filter(|e| e.nodes.has_repeated_nodes()).count(),
        layout.total_nodes(),
        cache.len()
    );
    Topology {
        elements,
        templates: cache.into_templates(),
    }
}
