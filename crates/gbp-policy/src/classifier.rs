//! Classifier and action instances, with authoring-time validation.
//!
//! A classifier instance is a named, parameterized predicate over packet
//! fields. Instances are validated and compiled into a [`ClassifierSpec`]
//! during policy resolution; malformed parameters are the one error class
//! that fails loudly (see [`crate::PolicyValidationError`]), since they
//! indicate an unsatisfiable contract rather than a transient state.

use gbp_types::{ethertype, ActionName, ClassifierName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::PolicyValidationError;

/// Well-known classifier parameter names.
pub mod params {
    /// Ether type for the `EtherType` classifier.
    pub const ETHER_TYPE: &str = "ethertype";
    /// IP protocol number for the `IpProto` and `L4` classifiers.
    pub const PROTO: &str = "proto";
    /// Exact L4 source port.
    pub const SRC_PORT: &str = "sourceport";
    /// Exact L4 destination port.
    pub const DST_PORT: &str = "destport";
    /// Low bound of an L4 source port range.
    pub const SRC_PORT_LOW: &str = "sourceport_range_low";
    /// High bound of an L4 source port range.
    pub const SRC_PORT_HIGH: &str = "sourceport_range_high";
    /// Low bound of an L4 destination port range.
    pub const DST_PORT_LOW: &str = "destport_range_low";
    /// High bound of an L4 destination port range.
    pub const DST_PORT_HIGH: &str = "destport_range_high";
}

/// Traffic direction a classifier reference applies to, relative to the
/// contract: `In` is consumer-to-provider traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    In,
    Out,
    Bidirectional,
}

impl Direction {
    /// Returns true if this direction covers consumer-to-provider traffic.
    pub fn covers_in(&self) -> bool {
        matches!(self, Direction::In | Direction::Bidirectional)
    }

    /// Returns true if this direction covers provider-to-consumer traffic.
    pub fn covers_out(&self) -> bool {
        matches!(self, Direction::Out | Direction::Bidirectional)
    }
}

/// Kind of a classifier instance, determining required parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierKind {
    /// Matches one ether type (`ethertype` parameter).
    EtherType,
    /// Matches an IP protocol over both IP ether types (`proto`).
    IpProto,
    /// Matches TCP/UDP ports (`proto` plus port parameters).
    L4,
}

/// A named classifier instance as declared by the tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierInstance {
    pub name: ClassifierName,
    pub kind: ClassifierKind,
    /// Integer-valued parameters, keyed by the [`params`] names.
    pub parameters: BTreeMap<String, i64>,
}

impl ClassifierInstance {
    pub fn new(name: impl Into<ClassifierName>, kind: ClassifierKind) -> Self {
        Self {
            name: name.into(),
            kind,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: i64) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    fn param(&self, name: &str) -> Option<i64> {
        self.parameters.get(name).copied()
    }

    /// Validates the instance parameters and compiles the match predicate.
    pub fn compile(&self) -> Result<ClassifierSpec, PolicyValidationError> {
        match self.kind {
            ClassifierKind::EtherType => self.compile_ether_type(),
            ClassifierKind::IpProto => self.compile_ip_proto(),
            ClassifierKind::L4 => self.compile_l4(),
        }
    }

    fn require(&self, param: &'static str) -> Result<i64, PolicyValidationError> {
        self.param(param)
            .ok_or_else(|| PolicyValidationError::MissingParameter {
                classifier: self.name.clone(),
                param,
            })
    }

    fn ether_type_param(&self) -> Result<u16, PolicyValidationError> {
        let raw = self.require(params::ETHER_TYPE)?;
        let value =
            u16::try_from(raw).map_err(|_| PolicyValidationError::ParameterOutOfRange {
                classifier: self.name.clone(),
                param: params::ETHER_TYPE,
                value: raw,
            })?;
        if !ethertype::is_supported(value) {
            return Err(PolicyValidationError::UnsupportedEtherType {
                classifier: self.name.clone(),
                value,
            });
        }
        Ok(value)
    }

    fn proto_param(&self) -> Result<u8, PolicyValidationError> {
        let raw = self.require(params::PROTO)?;
        u8::try_from(raw).map_err(|_| PolicyValidationError::ParameterOutOfRange {
            classifier: self.name.clone(),
            param: params::PROTO,
            value: raw,
        })
    }

    fn compile_ether_type(&self) -> Result<ClassifierSpec, PolicyValidationError> {
        Ok(ClassifierSpec {
            name: self.name.clone(),
            ether_types: vec![self.ether_type_param()?],
            ip_proto: None,
            src_ports: None,
            dst_ports: None,
        })
    }

    fn compile_ip_proto(&self) -> Result<ClassifierSpec, PolicyValidationError> {
        // An explicit ether type narrows the match to one IP family.
        let ether_types = match self.param(params::ETHER_TYPE) {
            Some(_) => vec![self.ether_type_param()?],
            None => vec![ethertype::IPV4, ethertype::IPV6],
        };
        Ok(ClassifierSpec {
            name: self.name.clone(),
            ether_types,
            ip_proto: Some(self.proto_param()?),
            src_ports: None,
            dst_ports: None,
        })
    }

    fn compile_l4(&self) -> Result<ClassifierSpec, PolicyValidationError> {
        let proto = self.proto_param()?;
        if proto != 6 && proto != 17 {
            return Err(PolicyValidationError::ParameterOutOfRange {
                classifier: self.name.clone(),
                param: params::PROTO,
                value: proto as i64,
            });
        }
        let src_ports = self.port_match(
            params::SRC_PORT,
            params::SRC_PORT_LOW,
            params::SRC_PORT_HIGH,
        )?;
        let dst_ports = self.port_match(
            params::DST_PORT,
            params::DST_PORT_LOW,
            params::DST_PORT_HIGH,
        )?;
        if src_ports.is_none() && dst_ports.is_none() {
            return Err(PolicyValidationError::MissingParameter {
                classifier: self.name.clone(),
                param: params::DST_PORT,
            });
        }
        let ether_types = match self.param(params::ETHER_TYPE) {
            Some(_) => vec![self.ether_type_param()?],
            None => vec![ethertype::IPV4, ethertype::IPV6],
        };
        Ok(ClassifierSpec {
            name: self.name.clone(),
            ether_types,
            ip_proto: Some(proto),
            src_ports,
            dst_ports,
        })
    }

    fn port_match(
        &self,
        exact: &'static str,
        low: &'static str,
        high: &'static str,
    ) -> Result<Option<PortMatch>, PolicyValidationError> {
        let exact_value = self.param(exact);
        let low_value = self.param(low);
        let high_value = self.param(high);

        if exact_value.is_some() && (low_value.is_some() || high_value.is_some()) {
            return Err(PolicyValidationError::ConflictingParameters {
                classifier: self.name.clone(),
                first: exact,
                second: low,
            });
        }
        if let Some(value) = exact_value {
            let port = self.port_value(exact, value)?;
            return Ok(Some(PortMatch::Single(port)));
        }
        match (low_value, high_value) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(PolicyValidationError::MissingParameter {
                classifier: self.name.clone(),
                param: high,
            }),
            (None, Some(_)) => Err(PolicyValidationError::MissingParameter {
                classifier: self.name.clone(),
                param: low,
            }),
            (Some(l), Some(h)) => {
                if l >= h {
                    return Err(PolicyValidationError::InvalidPortRange {
                        classifier: self.name.clone(),
                        low: l,
                        high: h,
                    });
                }
                let l = self.port_value(low, l)?;
                let h = self.port_value(high, h)?;
                Ok(Some(PortMatch::Range(l, h)))
            }
        }
    }

    fn port_value(&self, param: &'static str, value: i64) -> Result<u16, PolicyValidationError> {
        u16::try_from(value).map_err(|_| PolicyValidationError::ParameterOutOfRange {
            classifier: self.name.clone(),
            param,
            value,
        })
    }
}

/// An L4 port predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PortMatch {
    Single(u16),
    Range(u16, u16),
}

/// A validated, compiled classifier predicate consumed by the renderer.
///
/// One flow is emitted per entry in `ether_types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierSpec {
    pub name: ClassifierName,
    pub ether_types: Vec<u16>,
    pub ip_proto: Option<u8>,
    pub src_ports: Option<PortMatch>,
    pub dst_ports: Option<PortMatch>,
}

/// What an action instance does with matched traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    /// Continue down the pipeline.
    Allow,
    /// Suppress flow emission for the rule; table miss enforces the deny.
    Deny,
}

/// A named action instance as declared by the tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionInstance {
    pub name: ActionName,
    pub kind: ActionKind,
}

impl ActionInstance {
    pub fn new(name: impl Into<ActionName>, kind: ActionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}
