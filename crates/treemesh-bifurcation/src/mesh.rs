//! The generated mesh handed to an authoring adapter.

use serde::{Deserialize, Serialize};
use treemesh_math::{Point3, Vec3};

use crate::input::BranchId;
use crate::junction::HubNode;
use crate::topology::{Element, ElementTemplate, NodeBlock, NodeLayout};
use crate::wall::WallNode;

/// A numbered node with its derivatives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshNode {
    /// Node identifier.
    pub identifier: u32,
    /// Position.
    pub x: Point3,
    /// Around derivative.
    pub d1: Vec3,
    /// Along derivative.
    pub d2: Vec3,
    /// Through-wall derivative.
    pub d3: Vec3,
}

impl MeshNode {
    fn new(identifier: u32, node: &WallNode) -> Self {
        Self {
            identifier,
            x: node.x,
            d1: node.d1,
            d2: node.d2,
            d3: node.d3,
        }
    }
}

/// Nodes of one block in identifier order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSet {
    /// Which block.
    pub block: NodeBlock,
    /// Nodes, identifiers increasing by one.
    pub nodes: Vec<MeshNode>,
}

/// Result of one generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BifurcationMesh {
    /// Node blocks in numbering order.
    pub node_sets: Vec<NodeSet>,
    /// Elements in identifier order.
    pub elements: Vec<Element>,
    /// Element templates indexed by [`crate::topology::TemplateId`].
    pub templates: Vec<ElementTemplate>,
    /// Wall thickness used at each station.
    pub contracted_wall_thickness: Vec<f64>,
}

impl BifurcationMesh {
    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_sets.iter().map(|set| set.nodes.len()).sum()
    }

    /// Total number of elements.
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Every node in identifier order.
    pub fn nodes(&self) -> impl Iterator<Item = &MeshNode> {
        self.node_sets.iter().flat_map(|set| set.nodes.iter())
    }

    /// Nodes of one block.
    pub fn node_set(&self, block: NodeBlock) -> Option<&NodeSet> {
        self.node_sets.iter().find(|set| set.block == block)
    }

    /// Node by identifier.
    pub fn node(&self, identifier: u32) -> Option<&MeshNode> {
        let first = self.node_sets.first()?.nodes.first()?.identifier;
        let index = identifier.checked_sub(first)? as usize;
        self.nodes().nth(index)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Number a trunk's wall nodes, indexed `[station][around][layer]`.
pub(crate) fn trunk_node_set(
    branch: BranchId,
    layout: &NodeLayout,
    walls: &[Vec<Vec<WallNode>>],
) -> NodeSet {
    let block = NodeBlock::trunk(branch);
    let layers = layout.block(block).layers;
    let mut nodes = Vec::with_capacity(layout.block(block).count());
    for (j, ring) in walls.iter().enumerate() {
        for layer in 0..layers {
            for (k, column) in ring.iter().enumerate() {
                let id = layout.trunk_id(branch, j, layer, k);
                nodes.push(MeshNode::new(id, &column[layer]));
            }
        }
    }
    NodeSet { block, nodes }
}

/// Number the hub's wall nodes, indexed by [`HubNode::index`] then layer.
pub(crate) fn hub_node_sets(layout: &NodeLayout, walls: &[Vec<WallNode>; 5]) -> [NodeSet; 2] {
    [NodeBlock::JunctionOuter, NodeBlock::JunctionInner].map(|block| {
        let members: Vec<HubNode> = HubNode::ALL
            .into_iter()
            .filter(|&hub| NodeBlock::hub(hub) == block)
            .collect();
        let mut nodes = Vec::with_capacity(layout.block(block).count());
        for layer in 0..layout.block(block).layers {
            for &hub in &members {
                let id = layout.hub_id(hub, layer);
                nodes.push(MeshNode::new(id, &walls[hub.index()][layer]));
            }
        }
        NodeSet { block, nodes }
    })
}
