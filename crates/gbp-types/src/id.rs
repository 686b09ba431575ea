//! Typed string identifiers for declared policy objects.
//!
//! Every object a tenant declares is referenced by name from other objects;
//! using one newtype per namespace keeps a contract id from ever being
//! handed to an endpoint-group lookup.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of a tenant (the root declarative object).
    TenantId
);
string_id!(
    /// Identifier of an endpoint group within a tenant.
    EndpointGroupId
);
string_id!(
    /// Identifier of a contract within a tenant.
    ContractId
);
string_id!(
    /// Name of a subject within a contract.
    SubjectName
);
string_id!(
    /// Name of a rule within a subject.
    RuleName
);
string_id!(
    /// Name of a classifier instance within a tenant.
    ClassifierName
);
string_id!(
    /// Name of an action instance within a tenant.
    ActionName
);
string_id!(
    /// Name of a boolean condition attached to an endpoint.
    ConditionName
);
string_id!(
    /// Identifier of a forwarding domain (subnet, flood/bridge domain or
    /// L3 context).
    NetworkDomainId
);
string_id!(
    /// Identifier of a switch node.
    NodeId
);
string_id!(
    /// Identifier of a switch port (node connector).
    ConnectorId
);
