//! Live state consumed by synthesis: endpoints, switch configuration and
//! the resolved policy snapshot.

use gbp_policy::{ConditionGroup, ResolvedPolicy, TenantIndex};
use gbp_types::{ConditionName, ConnectorId, EndpointGroupId, MacAddress, NodeId, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::net::IpAddr;

use crate::ordinal::PolicyOrdinals;

/// A registered endpoint's resolved switch attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointLocation {
    pub node: NodeId,
    pub connector: ConnectorId,
}

/// An endpoint as published by the endpoint-registry collaborator.
///
/// Location is optional by design: an endpoint whose placement has not yet
/// converged in the data store is a valid, expected state and simply skips
/// synthesis until the next event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub tenant: TenantId,
    pub groups: BTreeSet<EndpointGroupId>,
    pub conditions: Vec<ConditionName>,
    pub mac: MacAddress,
    pub ips: BTreeSet<IpAddr>,
    pub location: Option<EndpointLocation>,
}

impl Endpoint {
    pub fn new(tenant: impl Into<TenantId>, mac: MacAddress) -> Self {
        Self {
            tenant: tenant.into(),
            groups: BTreeSet::new(),
            conditions: Vec::new(),
            mac,
            ips: BTreeSet::new(),
            location: None,
        }
    }

    pub fn in_group(mut self, group: impl Into<EndpointGroupId>) -> Self {
        self.groups.insert(group.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<ConditionName>) -> Self {
        self.conditions.push(condition.into());
        self
    }

    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ips.insert(ip);
        self
    }

    pub fn located_at(mut self, node: impl Into<NodeId>, connector: impl Into<ConnectorId>) -> Self {
        self.location = Some(EndpointLocation {
            node: node.into(),
            connector: connector.into(),
        });
        self
    }

    /// The condition group this endpoint evaluates under.
    pub fn condition_group(&self) -> ConditionGroup {
        ConditionGroup::from_endpoint(Some(&self.conditions))
    }
}

/// Encapsulation used on a tunnel port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TunnelKind {
    Vxlan,
    VxlanGpe,
}

/// A configured overlay tunnel port on a switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelPort {
    pub connector: ConnectorId,
    pub kind: TunnelKind,
}

/// Per-switch configuration published by the topology collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub tunnel_ports: Vec<TunnelPort>,
    pub external_ports: BTreeSet<ConnectorId>,
}

impl NodeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tunnel_port(mut self, connector: impl Into<ConnectorId>, kind: TunnelKind) -> Self {
        self.tunnel_ports.push(TunnelPort {
            connector: connector.into(),
            kind,
        });
        self
    }

    pub fn with_external_port(mut self, connector: impl Into<ConnectorId>) -> Self {
        self.external_ports.insert(connector.into());
        self
    }
}

/// Everything one synthesis pass reads: immutable snapshots only.
///
/// Published atomically by the surrounding context whenever tenant policy
/// or topology changes; synthesis never observes a partial view.
#[derive(Debug, Clone)]
pub struct RendererContext {
    index: TenantIndex,
    policy: ResolvedPolicy,
    ordinals: PolicyOrdinals,
    endpoints: Vec<Endpoint>,
    nodes: BTreeMap<NodeId, NodeConfig>,
}

impl RendererContext {
    /// Bundles a snapshot; ordinal assignment is derived deterministically
    /// from the index and endpoint set.
    pub fn new(
        index: TenantIndex,
        policy: ResolvedPolicy,
        endpoints: Vec<Endpoint>,
        nodes: BTreeMap<NodeId, NodeConfig>,
    ) -> Self {
        let ordinals = PolicyOrdinals::build(&index, &endpoints);
        Self {
            index,
            policy,
            ordinals,
            endpoints,
            nodes,
        }
    }

    pub fn index(&self) -> &TenantIndex {
        &self.index
    }

    pub fn policy(&self) -> &ResolvedPolicy {
        &self.policy
    }

    pub fn ordinals(&self) -> &PolicyOrdinals {
        &self.ordinals
    }

    /// Returns the switch configuration for a node, if known.
    pub fn node_config(&self, node: &NodeId) -> Option<&NodeConfig> {
        self.nodes.get(node)
    }

    /// Returns every known node id.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Returns every known endpoint, located or not.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Returns the endpoints currently located on `node`.
    pub fn endpoints_on(&self, node: &NodeId) -> Vec<&Endpoint> {
        self.endpoints
            .iter()
            .filter(|ep| ep.location.as_ref().is_some_and(|loc| &loc.node == node))
            .collect()
    }

    /// Returns true if every policy treatment of this endpoint is external:
    /// it belongs to at least one of the tenant's external implicit groups.
    pub fn is_external_endpoint(&self, endpoint: &Endpoint) -> bool {
        endpoint
            .groups
            .iter()
            .any(|g| self.index.is_external_group(g))
    }
}
