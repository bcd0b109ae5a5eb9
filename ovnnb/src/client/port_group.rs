//! Port group operations.

use std::collections::BTreeSet;

use tracing::{debug, info};

use super::NbClient;
use super::filter::external_ids_filter;
use crate::db::{Mutation, Mutator};
use crate::error::{Action, NbError, Result, ResultExt};
use crate::model::{ExternalIdMap, Model, PortGroup, VENDOR_KEY, op};

impl NbClient {
    /// Creates port group `name`, or brings the external IDs of an existing
    /// one in line with `external_ids` plus the vendor marker.
    pub async fn create_port_group(&self, name: &str, external_ids: &ExternalIdMap) -> Result<()> {
        self.bounded("create_port_group", async {
            let mut ids = external_ids.clone();
            ids.insert(VENDOR_KEY.to_string(), self.vendor().to_string());

            if let Some(mut pg) = self.get_port_group(name, true).await? {
                if pg.external_ids != ids {
                    pg.external_ids = ids;
                    self.update_port_group(&pg, &[crate::model::EXTERNAL_IDS]).await?;
                    info!(pg = name, "Updated port group external ids");
                }
                return Ok(());
            }

            self.create_if_absent(
                "pg-add",
                name,
                |pg: &PortGroup| pg.name == name,
                || PortGroup {
                    name: name.to_string(),
                    external_ids: ids,
                    ..Default::default()
                },
            )
            .await
            .context(Action::Create, PortGroup::TABLE, name)?;
            Ok(())
        })
        .await
    }

    pub async fn update_port_group(&self, pg: &PortGroup, fields: &[&str]) -> Result<()> {
        self.update("pg-update", pg, fields)
            .await
            .context(Action::Update, PortGroup::TABLE, &pg.key())
    }

    pub async fn port_group_add_ports<S: AsRef<str>>(&self, name: &str, lsp_names: &[S]) -> Result<()> {
        self.port_group_update_ports(name, Mutator::Insert, lsp_names).await
    }

    pub async fn port_group_remove_ports<S: AsRef<str>>(&self, name: &str, lsp_names: &[S]) -> Result<()> {
        self.port_group_update_ports(name, Mutator::Delete, lsp_names).await
    }

    /// Adds or removes the named switch ports. Unknown port names are skipped.
    pub async fn port_group_update_ports<S: AsRef<str>>(
        &self,
        name: &str,
        mutator: Mutator,
        lsp_names: &[S],
    ) -> Result<()> {
        self.bounded("port_group_update_ports", async {
            if lsp_names.is_empty() {
                return Ok(());
            }
            let uuids = self.logical_switch_port_uuids(lsp_names).await?;
            if uuids.is_empty() {
                return Ok(());
            }

            let pg = self.port_group_for(Action::Mutate, name).await?;
            let mutation = match mutator {
                Mutator::Insert => Mutation::insert_set(PortGroup::PORTS, uuids),
                Mutator::Delete => Mutation::delete_set(PortGroup::PORTS, uuids),
            };
            self.mutate("pg-ports-update", &pg, vec![mutation])
                .await
                .context(Action::Mutate, PortGroup::TABLE, name)
        })
        .await
    }

    /// Makes the ports of group `name` exactly the named switch ports that
    /// exist, adding and removing the difference in one transaction.
    pub async fn port_group_set_ports<S: AsRef<str>>(&self, name: &str, lsp_names: &[S]) -> Result<()> {
        self.bounded("port_group_set_ports", async {
            if name.is_empty() {
                return Err(NbError::PreconditionFailed("port group name is empty".to_string()));
            }
            let pg = self.port_group_for(Action::Mutate, name).await?;

            let expected = self.logical_switch_port_uuids(lsp_names).await?;
            let existing: BTreeSet<String> = pg.ports.iter().cloned().collect();
            let to_add: Vec<&String> = expected.difference(&existing).collect();
            let to_del: Vec<&String> = existing.difference(&expected).collect();

            let mut mutations = Vec::with_capacity(2);
            if !to_add.is_empty() {
                mutations.push(Mutation::insert_set(PortGroup::PORTS, to_add.iter().map(|s| s.as_str())));
            }
            if !to_del.is_empty() {
                mutations.push(Mutation::delete_set(PortGroup::PORTS, to_del.iter().map(|s| s.as_str())));
            }
            debug!(pg = name, add = to_add.len(), delete = to_del.len(), "Setting port group ports");
            self.mutate("pg-ports-update", &pg, mutations)
                .await
                .context(Action::Mutate, PortGroup::TABLE, name)
        })
        .await
    }

    /// Removes switch port `port_name` from the given groups, or from every
    /// group containing it when `groups` is empty.
    pub async fn remove_port_from_port_groups(&self, port_name: &str, groups: &[&str]) -> Result<()> {
        self.bounded("remove_port_from_port_groups", async {
            let Some(lsp) = self.get_logical_switch_port(port_name, true).await? else {
                return Ok(());
            };

            let candidates = if groups.is_empty() {
                self.list_port_groups(&ExternalIdMap::new()).await?
            } else {
                let mut found = Vec::with_capacity(groups.len());
                for group in groups {
                    if let Some(pg) = self.get_port_group(group, true).await? {
                        found.push(pg);
                    }
                }
                found
            };

            let ops = candidates
                .iter()
                .filter(|pg| pg.ports.contains(&lsp.uuid))
                .map(|pg| op::mutate(pg, vec![Mutation::delete_set(PortGroup::PORTS, [lsp.uuid.as_str()])]))
                .collect::<Result<Vec<_>>>()?;
            self.transact("pg-update", Action::Mutate, ops)
                .await
                .context(Action::Mutate, PortGroup::TABLE, &groups.join(","))
        })
        .await
    }

    /// Deletes the named groups in one transaction. Missing names are skipped.
    pub async fn delete_port_group(&self, names: &[&str]) -> Result<()> {
        self.bounded("delete_port_group", async {
            let mut doomed = Vec::with_capacity(names.len());
            for name in names {
                if let Some(pg) = self.get_port_group(name, true).await? {
                    doomed.push(pg);
                }
            }
            self.delete_all("pg-del", &doomed)
                .await
                .context(Action::Delete, PortGroup::TABLE, &names.join(","))?;
            Ok(())
        })
        .await
    }

    pub async fn get_port_group(&self, name: &str, ignore_not_found: bool) -> Result<Option<PortGroup>> {
        if name.is_empty() {
            return Err(NbError::PreconditionFailed("port group name is empty".to_string()));
        }
        self.get_by_index(name, ignore_not_found)
            .await
            .context(Action::Get, PortGroup::TABLE, name)
    }

    pub async fn port_group_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_port_group(name, true).await?.is_some())
    }

    /// Lists groups matching `external_ids`; all groups when the filter is empty.
    pub async fn list_port_groups(&self, external_ids: &ExternalIdMap) -> Result<Vec<PortGroup>> {
        self.list_where(external_ids_filter::<PortGroup>(external_ids))
            .await
            .context(Action::List, PortGroup::TABLE, "")
    }

    async fn port_group_for(&self, action: Action, name: &str) -> Result<PortGroup> {
        self.require(name, |pg: &PortGroup| pg.name == name)
            .await
            .context(action, PortGroup::TABLE, name)
    }
}
