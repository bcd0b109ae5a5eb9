//! Typed rows of the northbound tables.
//!
//! Each model serializes to the row shape used on the wire: column names as
//! keys, sets as arrays, maps as objects, and the row UUID under `_uuid`.

mod address_set;
mod load_balancer;
mod nb_global;
pub mod op;
mod port_group;
mod topology;

use std::collections::BTreeMap;
use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use address_set::AddressSet;
pub use load_balancer::{LoadBalancer, LoadBalancerHealthCheck};
pub use nb_global::NbGlobal;
pub use port_group::PortGroup;
pub use topology::{Acl, LogicalRouter, LogicalRouterPort, LogicalSwitch, LogicalSwitchPort};

/// Column shared by every managed table.
pub const EXTERNAL_IDS: &str = "external_ids";

/// External-ID key carrying the ownership marker.
pub const VENDOR_KEY: &str = "vendor";

/// External-ID key naming the security group a record was generated for.
pub const SG_KEY: &str = "sg";

/// External-ID key classifying port groups.
pub const TYPE_KEY: &str = "type";

pub type ExternalIdMap = BTreeMap<String, String>;

/// A row type bound to one table.
pub trait Model: Serialize + DeserializeOwned + Clone + Debug + Send + Sync + 'static {
    const TABLE: &'static str;

    /// Column with a uniqueness index in the schema, if any.
    const INDEX: Option<&'static str> = None;

    /// Row UUID, or a named UUID before the row is inserted. Empty when unset.
    fn uuid(&self) -> &str;

    /// Value of [`Model::INDEX`] for this record.
    fn index_value(&self) -> Option<&str> {
        None
    }

    /// Human-readable identity used in logs and errors.
    fn key(&self) -> String {
        match self.index_value() {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => self.uuid().to_string(),
        }
    }
}

/// Records carrying an `external_ids` column.
pub trait ExternalIds {
    fn external_ids(&self) -> &ExternalIdMap;
    fn external_ids_mut(&mut self) -> &mut ExternalIdMap;

    /// Whether the record carries `vendor` as its ownership marker.
    fn is_owned_by(&self, vendor: &str) -> bool {
        self.external_ids().get(VENDOR_KEY).map(String::as_str) == Some(vendor)
    }

    /// Whether the record carries an ownership marker other than `vendor`.
    fn is_owned_by_other(&self, vendor: &str) -> bool {
        self.external_ids()
            .get(VENDOR_KEY)
            .is_some_and(|owner| !owner.is_empty() && owner != vendor)
    }
}

macro_rules! impl_external_ids {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ExternalIds for $ty {
                fn external_ids(&self) -> &ExternalIdMap {
                    &self.external_ids
                }

                fn external_ids_mut(&mut self) -> &mut ExternalIdMap {
                    &mut self.external_ids
                }
            }
        )*
    };
}

impl_external_ids!(
    AddressSet,
    LoadBalancer,
    LoadBalancerHealthCheck,
    PortGroup,
    NbGlobal,
    LogicalRouter,
    LogicalSwitch,
    LogicalRouterPort,
    LogicalSwitchPort,
    Acl,
);
