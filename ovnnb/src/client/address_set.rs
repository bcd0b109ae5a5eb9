//! Address set operations.

use std::collections::{BTreeSet, HashSet};
use std::sync::LazyLock;

use ipnet::IpNet;
use regex::Regex;
use tracing::{info, warn};

use super::NbClient;
use super::filter::external_ids_filter;
use crate::error::{Action, NbError, Result, ResultExt};
use crate::model::{AddressSet, ExternalIdMap, Model, VENDOR_KEY};

/// ACL match expressions cannot reference names containing `-`.
static ADDRESS_SET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_.][a-zA-Z_.0-9]*$").expect("address set name pattern is valid"));

pub fn is_valid_address_set_name(name: &str) -> bool {
    ADDRESS_SET_NAME.is_match(name)
}

/// Canonicalizes CIDRs to their network address, then sorts and dedups.
///
/// Entries without a `/` are kept as given. A CIDR that does not parse is
/// kept unchanged with a warning.
pub fn normalize_addresses<S: AsRef<str>>(addresses: &[S]) -> Vec<String> {
    let normalized: BTreeSet<String> = addresses
        .iter()
        .map(|addr| addr.as_ref().trim())
        .filter(|addr| !addr.is_empty())
        .map(|addr| {
            if !addr.contains('/') {
                return addr.to_string();
            }
            match addr.parse::<IpNet>() {
                Ok(net) => net.trunc().to_string(),
                Err(e) => {
                    warn!(address = addr, error = %e, "Failed to parse CIDR");
                    addr.to_string()
                }
            }
        })
        .collect();
    normalized.into_iter().collect()
}

impl NbClient {
    /// Creates an address set tagged with this client's vendor marker.
    ///
    /// Does nothing if a set with `name` already exists.
    pub async fn create_address_set(&self, name: &str, external_ids: &ExternalIdMap) -> Result<()> {
        if !is_valid_address_set_name(name) {
            return Err(NbError::PreconditionFailed(format!(
                "address set {name} must match `[a-zA-Z_.][a-zA-Z_.0-9]*`"
            )))
            .context(Action::Create, AddressSet::TABLE, name);
        }

        let mut ids = external_ids.clone();
        ids.insert(VENDOR_KEY.to_string(), self.vendor().to_string());

        self.create_if_absent(
            "as-add",
            name,
            |set: &AddressSet| set.name == name,
            || AddressSet {
                name: name.to_string(),
                external_ids: ids,
                ..Default::default()
            },
        )
        .await
        .context(Action::Create, AddressSet::TABLE, name)?;
        Ok(())
    }

    /// Replaces the addresses of set `name`. An empty list clears it.
    pub async fn address_set_update_addresses<S: AsRef<str>>(&self, name: &str, addresses: &[S]) -> Result<()> {
        self.bounded("address_set_update_addresses", async {
            let mut set = self
                .require::<AddressSet>(name, |set| set.name == name)
                .await
                .context(Action::Update, AddressSet::TABLE, name)?;

            let addresses = normalize_addresses(addresses);
            let current: BTreeSet<&String> = set.addresses.iter().collect();
            let wanted: BTreeSet<&String> = addresses.iter().collect();
            if current == wanted {
                return Ok(());
            }

            set.addresses = addresses;
            self.update_address_set(&set, &[AddressSet::ADDRESSES]).await
        })
        .await
    }

    /// Writes `fields` of `set`; every column when `fields` is empty.
    pub async fn update_address_set(&self, set: &AddressSet, fields: &[&str]) -> Result<()> {
        self.update("as-update", set, fields)
            .await
            .context(Action::Update, AddressSet::TABLE, &set.key())
    }

    /// Deletes the named sets in one transaction. Missing names are skipped.
    pub async fn delete_address_set(&self, names: &[&str]) -> Result<()> {
        self.bounded("delete_address_set", async {
            let mut doomed = Vec::with_capacity(names.len());
            for name in names {
                if let Some(set) = self
                    .get_address_set(name, true)
                    .await
                    .context(Action::Delete, AddressSet::TABLE, name)?
                {
                    doomed.push(set);
                }
            }
            self.delete_all("as-del", &doomed)
                .await
                .context(Action::Delete, AddressSet::TABLE, &names.join(","))?;
            Ok(())
        })
        .await
    }

    /// Deletes every set whose name is in `names` in one transaction.
    pub async fn batch_delete_address_sets_by_names<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        self.bounded("batch_delete_address_sets_by_names", async {
            let wanted: HashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
            let key = format!("{} names", wanted.len());
            let doomed = self
                .list_where(|set: &AddressSet| wanted.contains(set.name.as_str()))
                .await
                .context(Action::Delete, AddressSet::TABLE, &key)?;
            let count = self
                .delete_all("as-del", &doomed)
                .await
                .context(Action::Delete, AddressSet::TABLE, &key)?;
            if count > 0 {
                info!(count, "Deleted address sets by name");
            }
            Ok(())
        })
        .await
    }

    /// Deletes every set matching `external_ids`.
    ///
    /// An empty filter deletes nothing: it would otherwise match every set.
    pub async fn delete_address_sets(&self, external_ids: &ExternalIdMap) -> Result<()> {
        self.bounded("delete_address_sets", async {
            if external_ids.is_empty() {
                return Ok(());
            }
            let key = format!("{external_ids:?}");
            let doomed = self
                .list_address_sets(external_ids)
                .await
                .context(Action::Delete, AddressSet::TABLE, &key)?;
            let count = self
                .delete_all("ass-del", &doomed)
                .await
                .context(Action::Delete, AddressSet::TABLE, &key)?;
            if count > 0 {
                info!(count, filter = %key, "Deleted address sets");
            }
            Ok(())
        })
        .await
    }

    pub async fn get_address_set(&self, name: &str, ignore_not_found: bool) -> Result<Option<AddressSet>> {
        self.get_by_index(name, ignore_not_found)
            .await
            .context(Action::Get, AddressSet::TABLE, name)
    }

    pub async fn address_set_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_address_set(name, true).await?.is_some())
    }

    /// Lists sets matching `external_ids`; all sets when the filter is empty.
    pub async fn list_address_sets(&self, external_ids: &ExternalIdMap) -> Result<Vec<AddressSet>> {
        self.list_where(external_ids_filter::<AddressSet>(external_ids))
            .await
            .context(Action::List, AddressSet::TABLE, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_set_names() {
        assert!(is_valid_address_set_name("ovn.sg.web.associated.v4"));
        assert!(is_valid_address_set_name("_as1"));
        assert!(!is_valid_address_set_name("as-1"));
        assert!(!is_valid_address_set_name("1as"));
        assert!(!is_valid_address_set_name(""));
    }

    #[test]
    fn test_normalize_addresses() {
        let normalized = normalize_addresses(&["10.0.0.5/24", "10.0.0.1", "10.0.0.0/24", "fd00::3/64", "bad/cidr", " "]);
        assert_eq!(normalized, vec!["10.0.0.0/24", "10.0.0.1", "bad/cidr", "fd00::/64"]);
    }
}
