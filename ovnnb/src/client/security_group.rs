//! Security group naming and teardown.
//!
//! A security group is materialized as a port group named after it, one
//! address set per IP family holding the addresses of its member ports, and
//! the ACLs hanging off the port group.

use tracing::info;

use super::NbClient;
use super::filter::match_external_ids;
use crate::error::{Action, Result, ResultExt};
use crate::model::{Acl, AddressSet, ExternalIdMap, PortGroup, SG_KEY, op};

const KIND: &str = "Security_Group";

/// Port group backing security group `sg`. Hyphens become dots so the name
/// is usable in ACL match expressions.
pub fn sg_port_group_name(sg: &str) -> String {
    format!("ovn.sg.{sg}").replace('-', ".")
}

/// Address set holding the IPv4 addresses of the ports in `sg`.
pub fn sg_v4_associated_name(sg: &str) -> String {
    format!("ovn.sg.{sg}.associated.v4").replace('-', ".")
}

/// Address set holding the IPv6 addresses of the ports in `sg`.
pub fn sg_v6_associated_name(sg: &str) -> String {
    format!("ovn.sg.{sg}.associated.v6").replace('-', ".")
}

impl NbClient {
    /// Deletes the ACLs, address sets and port group of security group `sg`
    /// in one transaction. Parts that do not exist are skipped.
    pub async fn delete_security_group(&self, sg: &str) -> Result<()> {
        self.bounded("delete_security_group", async {
            let pg_name = sg_port_group_name(sg);

            let parent = ExternalIdMap::from([(Acl::PARENT_KEY.to_string(), pg_name.clone())]);
            let acls = self
                .list_where(|acl: &Acl| match_external_ids(&acl.external_ids, &parent))
                .await
                .context(Action::Delete, KIND, sg)?;

            let owner = ExternalIdMap::from([(SG_KEY.to_string(), sg.to_string())]);
            let sets = self
                .list_where(|set: &AddressSet| match_external_ids(&set.external_ids, &owner))
                .await
                .context(Action::Delete, KIND, sg)?;

            let pg = self.get_port_group(&pg_name, true).await?;

            let mut ops = Vec::with_capacity(acls.len() + sets.len() + 1);
            for acl in &acls {
                ops.push(op::delete(acl)?);
            }
            for set in &sets {
                ops.push(op::delete(set)?);
            }
            if let Some(pg) = &pg {
                ops.push(op::delete::<PortGroup>(pg)?);
            }
            if ops.is_empty() {
                return Ok(());
            }

            self.transact("sg-del", Action::Delete, ops)
                .await
                .context(Action::Delete, KIND, sg)?;
            info!(
                sg,
                acls = acls.len(),
                address_sets = sets.len(),
                port_group = pg.is_some(),
                "Deleted security group"
            );
            Ok(())
        })
        .await
    }
}
