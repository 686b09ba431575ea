//! The flow accumulator handed to synthesis stages.

use gbp_types::NodeId;
use std::collections::BTreeMap;

use crate::flow::{Flow, FlowId};

/// Accumulates flows per (node, table) before device programming.
///
/// Writing a flow whose id is already present replaces the previous flow
/// instead of duplicating it, which together with deterministic flow ids
/// makes repeated synthesis a no-op at the device layer. Iteration order
/// is deterministic (sorted by key).
#[derive(Debug, Default)]
pub struct FlowWriter {
    flows: BTreeMap<(NodeId, u8), BTreeMap<FlowId, Flow>>,
}

impl FlowWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a flow under its own (node, table) key.
    pub fn write_flow(&mut self, flow: Flow) {
        self.flows
            .entry((flow.node.clone(), flow.table))
            .or_default()
            .insert(flow.id.clone(), flow);
    }

    /// Returns the flows accumulated for one (node, table), in id order.
    pub fn flows_for(&self, node: &NodeId, table: u8) -> Vec<&Flow> {
        self.flows
            .get(&(node.clone(), table))
            .map(|m| m.values().collect())
            .unwrap_or_default()
    }

    /// Returns the number of flows for one (node, table).
    pub fn flow_count(&self, node: &NodeId, table: u8) -> usize {
        self.flows
            .get(&(node.clone(), table))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Returns the total number of accumulated flows.
    pub fn total_flow_count(&self) -> usize {
        self.flows.values().map(|m| m.len()).sum()
    }

    /// Returns true if a flow with this id was accumulated.
    pub fn contains(&self, node: &NodeId, table: u8, id: &FlowId) -> bool {
        self.flows
            .get(&(node.clone(), table))
            .is_some_and(|m| m.contains_key(id))
    }

    /// Drains all accumulated flows, keyed by (node, table).
    pub fn take(&mut self) -> BTreeMap<(NodeId, u8), BTreeMap<FlowId, Flow>> {
        std::mem::take(&mut self.flows)
    }
}
