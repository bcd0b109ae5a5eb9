use serde::{Deserialize, Serialize};

use super::{ExternalIdMap, Model};

/// The singleton row of cluster-wide settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NbGlobal {
    #[serde(rename = "_uuid")]
    pub uuid: String,
    pub name: String,
    pub ipsec: bool,
    /// Configuration generation, bumped by writers that wait for the
    /// southbound side to catch up.
    pub nb_cfg: i64,
    pub options: ExternalIdMap,
    pub external_ids: ExternalIdMap,
}

impl NbGlobal {
    pub const NAME: &'static str = "name";
    pub const IPSEC: &'static str = "ipsec";
    pub const NB_CFG: &'static str = "nb_cfg";
    pub const OPTIONS: &'static str = "options";
}

impl Model for NbGlobal {
    const TABLE: &'static str = "NB_Global";

    fn uuid(&self) -> &str {
        &self.uuid
    }
}
