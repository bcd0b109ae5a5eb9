//! Logical switch port lookups used by port group membership.

use std::collections::BTreeSet;

use crate::error::{Action, Result, ResultExt};
use crate::model::{LogicalSwitchPort, Model};

use super::NbClient;

impl NbClient {
    pub async fn get_logical_switch_port(
        &self,
        name: &str,
        ignore_not_found: bool,
    ) -> Result<Option<LogicalSwitchPort>> {
        self.get_by_index(name, ignore_not_found)
            .await
            .context(Action::Get, LogicalSwitchPort::TABLE, name)
    }

    pub async fn logical_switch_port_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_logical_switch_port(name, true).await?.is_some())
    }

    /// UUIDs of the named ports that exist.
    pub(crate) async fn logical_switch_port_uuids<S: AsRef<str>>(&self, names: &[S]) -> Result<BTreeSet<String>> {
        self.bounded("logical_switch_port_uuids", async {
            let mut uuids = BTreeSet::new();
            for name in names {
                if let Some(lsp) = self.get_logical_switch_port(name.as_ref(), true).await? {
                    uuids.insert(lsp.uuid);
                }
            }
            Ok(uuids)
        })
        .await
    }
}
