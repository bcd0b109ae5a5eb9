//! Load balancer operations.
//!
//! Load balancers have no name index, so every lookup by name is a full
//! scan that reports duplicates as [`NbError::Ambiguous`](crate::NbError::Ambiguous).

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use super::NbClient;
use crate::db::Mutation;
use crate::error::{Action, Result, ResultExt};
use crate::model::{ExternalIdMap, LoadBalancer, LoadBalancerHealthCheck, Model, VENDOR_KEY, op};

/// Host part of a `host:port` or `[v6]:port` backend.
pub(crate) fn backend_ip(backend: &str) -> Option<&str> {
    let backend = backend.trim();
    if let Some(rest) = backend.strip_prefix('[') {
        let (host, port) = rest.split_once("]:")?;
        return (!host.is_empty() && !port.is_empty()).then_some(host);
    }
    let (host, port) = backend.rsplit_once(':')?;
    (!host.is_empty() && !host.contains(':') && !port.is_empty()).then_some(host)
}

fn backend_ips(backends: &str) -> BTreeSet<&str> {
    backends.split(',').filter_map(backend_ip).collect()
}

impl NbClient {
    /// Creates load balancer `name` unless it exists.
    pub async fn create_load_balancer(&self, name: &str, protocol: &str, selection_fields: Option<&str>) -> Result<()> {
        self.create_if_absent(
            "lb-add",
            name,
            |lb: &LoadBalancer| lb.name == name,
            || LoadBalancer {
                uuid: op::named_uuid(),
                name: name.to_string(),
                protocol: Some(protocol.to_string()),
                selection_fields: selection_fields
                    .filter(|f| !f.is_empty())
                    .map(|f| vec![f.to_string()])
                    .unwrap_or_default(),
                external_ids: BTreeMap::from([(VENDOR_KEY.to_string(), self.vendor().to_string())]),
                ..Default::default()
            },
        )
        .await
        .context(Action::Create, LoadBalancer::TABLE, name)?;
        Ok(())
    }

    pub async fn update_load_balancer(&self, lb: &LoadBalancer, fields: &[&str]) -> Result<()> {
        self.update("lb-update", lb, fields)
            .await
            .context(Action::Update, LoadBalancer::TABLE, &lb.key())
    }

    pub async fn get_load_balancer(&self, name: &str, ignore_not_found: bool) -> Result<Option<LoadBalancer>> {
        self.get_where(name, |lb: &LoadBalancer| lb.name == name, ignore_not_found)
            .await
            .context(Action::Get, LoadBalancer::TABLE, name)
    }

    pub async fn load_balancer_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_load_balancer(name, true).await?.is_some())
    }

    /// Lists load balancers accepted by `filter`.
    pub async fn list_load_balancers(&self, filter: impl Fn(&LoadBalancer) -> bool) -> Result<Vec<LoadBalancer>> {
        self.list_where(filter)
            .await
            .context(Action::List, LoadBalancer::TABLE, "")
    }

    async fn load_balancer_for(&self, action: Action, name: &str) -> Result<LoadBalancer> {
        self.require(name, |lb: &LoadBalancer| lb.name == name)
            .await
            .context(action, LoadBalancer::TABLE, name)
    }

    /// Adds or removes VIPs of load balancer `name`.
    ///
    /// Adding a VIP that exists with a different backend list replaces it.
    /// Removing a VIP that is not present is a no-op.
    pub async fn load_balancer_update_vips(&self, name: &str, vips: &ExternalIdMap, add: bool) -> Result<()> {
        self.bounded("load_balancer_update_vips", async {
            if vips.is_empty() {
                return Ok(());
            }
            let lb = self.load_balancer_for(Action::Mutate, name).await?;

            let mutations = if add {
                // Map inserts never overwrite, so changed VIPs are removed first.
                let stale: ExternalIdMap = vips
                    .iter()
                    .filter_map(|(vip, backends)| match lb.vips.get(vip) {
                        Some(current) if current != backends => Some((vip.clone(), current.clone())),
                        _ => None,
                    })
                    .collect();
                let fresh: ExternalIdMap = vips
                    .iter()
                    .filter(|(vip, backends)| lb.vips.get(*vip) != Some(*backends))
                    .map(|(vip, backends)| (vip.clone(), backends.clone()))
                    .collect();

                let mut mutations = Vec::with_capacity(2);
                if !stale.is_empty() {
                    mutations.push(Mutation::delete_map(LoadBalancer::VIPS, &stale));
                }
                if !fresh.is_empty() {
                    mutations.push(Mutation::insert_map(LoadBalancer::VIPS, &fresh));
                }
                mutations
            } else {
                let present: Vec<&String> = vips.keys().filter(|vip| lb.vips.contains_key(*vip)).collect();
                if present.is_empty() {
                    Vec::new()
                } else {
                    vec![Mutation::delete_keys(LoadBalancer::VIPS, present.into_iter().cloned())]
                }
            };

            let txn = if add { "lb-add" } else { "lb-del" };
            self.mutate(txn, &lb, mutations)
                .await
                .context(Action::Mutate, LoadBalancer::TABLE, name)
        })
        .await
    }

    /// Sets `vip` to the sorted, comma-joined `backends`.
    pub async fn load_balancer_add_vip<S: AsRef<str>>(&self, name: &str, vip: &str, backends: &[S]) -> Result<()> {
        let mut backends: Vec<&str> = backends.iter().map(|b| b.as_ref()).collect();
        backends.sort_unstable();
        let vips = BTreeMap::from([(vip.to_string(), backends.join(","))]);
        self.load_balancer_update_vips(name, &vips, true).await
    }

    /// Removes `vip`, along with its health check and the IP port mappings
    /// only it used unless `ignore_health_check` is set.
    pub async fn load_balancer_delete_vip(&self, name: &str, vip: &str, ignore_health_check: bool) -> Result<()> {
        self.bounded("load_balancer_delete_vip", async {
            let (_, health_check) = self.get_load_balancer_health_check(name, vip, true).await?;
            if !ignore_health_check {
                if let Some(hc) = health_check {
                    self.load_balancer_delete_ip_port_mapping(name, vip).await?;
                    self.load_balancer_delete_health_check(name, &hc.uuid).await?;
                }
            }

            let vips = BTreeMap::from([(vip.to_string(), String::new())]);
            self.load_balancer_update_vips(name, &vips, false).await
        })
        .await
    }

    pub async fn set_load_balancer_affinity_timeout(&self, name: &str, timeout_secs: u32) -> Result<()> {
        self.set_load_balancer_option(name, LoadBalancer::OPTION_AFFINITY_TIMEOUT, &timeout_secs.to_string())
            .await
    }

    pub async fn set_load_balancer_prefer_local_backend(&self, name: &str, prefer: bool) -> Result<()> {
        self.set_load_balancer_option(name, LoadBalancer::OPTION_PREFER_LOCAL_BACKEND, &prefer.to_string())
            .await
    }

    async fn set_load_balancer_option(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.bounded("set_load_balancer_option", async {
            let mut lb = self.load_balancer_for(Action::Update, name).await?;
            if lb.options.get(key).map(String::as_str) == Some(value) {
                return Ok(());
            }
            lb.options.insert(key.to_string(), value.to_string());
            self.update_load_balancer(&lb, &[LoadBalancer::OPTIONS]).await?;
            info!(lb = name, key, value, "Set load balancer option");
            Ok(())
        })
        .await
    }

    /// Deletes load balancer `name` if it exists.
    pub async fn delete_load_balancer(&self, name: &str) -> Result<()> {
        self.delete_if_exists("lb-del", name, |lb: &LoadBalancer| lb.name == name)
            .await
            .context(Action::Delete, LoadBalancer::TABLE, name)?;
        Ok(())
    }

    /// Deletes every load balancer accepted by `filter` in one transaction.
    pub async fn delete_load_balancers(&self, filter: impl Fn(&LoadBalancer) -> bool) -> Result<()> {
        self.bounded("delete_load_balancers", async {
            let doomed = self
                .list_where(filter)
                .await
                .context(Action::Delete, LoadBalancer::TABLE, "")?;
            let names: Vec<String> = doomed.iter().map(|lb| lb.name.clone()).collect();
            self.delete_all("lb-del", &doomed)
                .await
                .context(Action::Delete, LoadBalancer::TABLE, &names.join(","))?;
            Ok(())
        })
        .await
    }

    // =========================================================================
    // IP port mappings
    // =========================================================================

    /// Inserts `mappings` (backend IP to `port:source_ip`). Existing keys keep
    /// their current value.
    pub async fn load_balancer_add_ip_port_mapping(&self, name: &str, vip: &str, mappings: &ExternalIdMap) -> Result<()> {
        self.bounded("load_balancer_add_ip_port_mapping", async {
            if mappings.is_empty() {
                return Ok(());
            }
            let lb = self.load_balancer_for(Action::Mutate, name).await?;
            debug!(lb = name, vip, ?mappings, "Adding ip port mappings");
            self.mutate("lb-add", &lb, vec![Mutation::insert_map(LoadBalancer::IP_PORT_MAPPINGS, mappings)])
                .await
                .context(Action::Mutate, LoadBalancer::TABLE, name)
        })
        .await
    }

    /// Makes the IP port mappings of `name` equal to `mappings`.
    pub async fn load_balancer_update_ip_port_mapping(
        &self,
        name: &str,
        vip: &str,
        mappings: &ExternalIdMap,
    ) -> Result<()> {
        self.bounded("load_balancer_update_ip_port_mapping", async {
            let lb = self.load_balancer_for(Action::Mutate, name).await?;

            let outdated: ExternalIdMap = lb
                .ip_port_mappings
                .iter()
                .filter(|(ip, current)| mappings.get(*ip) != Some(*current))
                .map(|(ip, current)| (ip.clone(), current.clone()))
                .collect();
            let missing: ExternalIdMap = mappings
                .iter()
                .filter(|(ip, wanted)| lb.ip_port_mappings.get(*ip) != Some(*wanted))
                .map(|(ip, wanted)| (ip.clone(), wanted.clone()))
                .collect();

            let mut mutations = Vec::with_capacity(2);
            if !outdated.is_empty() {
                info!(lb = name, vip, ?outdated, "Deleting outdated ip port mappings");
                mutations.push(Mutation::delete_map(LoadBalancer::IP_PORT_MAPPINGS, &outdated));
            }
            if !missing.is_empty() {
                mutations.push(Mutation::insert_map(LoadBalancer::IP_PORT_MAPPINGS, &missing));
            }
            self.mutate("lb-add", &lb, mutations)
                .await
                .context(Action::Mutate, LoadBalancer::TABLE, name)
        })
        .await
    }

    /// Removes the mappings of backend IPs used by `vip` and by no other VIP.
    pub async fn load_balancer_delete_ip_port_mapping(&self, name: &str, vip: &str) -> Result<()> {
        self.bounded("load_balancer_delete_ip_port_mapping", async {
            let Some(lb) = self.get_load_balancer(name, true).await? else {
                debug!(lb = name, "Load balancer already deleted");
                return Ok(());
            };
            if lb.ip_port_mappings.is_empty() {
                return Ok(());
            }
            let Some(backends) = lb.vips.get(vip) else {
                return Ok(());
            };

            let still_used: BTreeSet<&str> = lb
                .vips
                .iter()
                .filter(|(other, _)| other.as_str() != vip)
                .flat_map(|(_, backends)| backend_ips(backends))
                .collect();
            let unused: ExternalIdMap = backend_ips(backends)
                .into_iter()
                .filter(|ip| !still_used.contains(ip))
                .filter_map(|ip| lb.ip_port_mappings.get(ip).map(|m| (ip.to_string(), m.clone())))
                .collect();
            if unused.is_empty() {
                return Ok(());
            }

            self.mutate("lb-del", &lb, vec![Mutation::delete_map(LoadBalancer::IP_PORT_MAPPINGS, &unused)])
                .await
                .context(Action::Mutate, LoadBalancer::TABLE, name)?;
            info!(lb = name, vip, count = unused.len(), "Deleted unused ip port mappings");
            Ok(())
        })
        .await
    }

    /// Syncs IP port mappings, then creates a health check for `vip` unless
    /// `ignore_health_check` is set.
    pub async fn load_balancer_add_health_check(
        &self,
        name: &str,
        vip: &str,
        ignore_health_check: bool,
        ip_port_mapping: &ExternalIdMap,
        external_ids: &ExternalIdMap,
    ) -> Result<()> {
        self.bounded("load_balancer_add_health_check", async {
            self.load_balancer_update_ip_port_mapping(name, vip, ip_port_mapping)
                .await?;
            if !ignore_health_check {
                self.add_load_balancer_health_check(name, vip, external_ids).await?;
            }
            Ok(())
        })
        .await
    }

    /// Detaches health check `uuid` from load balancer `name` and deletes it.
    pub async fn load_balancer_delete_health_check(&self, name: &str, uuid: &str) -> Result<()> {
        self.bounded("load_balancer_delete_health_check", async {
            let lb = self.load_balancer_for(Action::Mutate, name).await?;
            if !lb.health_check.iter().any(|hc| hc == uuid) {
                return Ok(());
            }
            let ops = self.delete_health_check_ops(&lb, uuid)?;
            self.transact("lbhc-del", Action::Delete, ops)
                .await
                .context(Action::Delete, LoadBalancerHealthCheck::TABLE, uuid)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_ip() {
        assert_eq!(backend_ip("10.0.0.1:80"), Some("10.0.0.1"));
        assert_eq!(backend_ip("[fd00::1]:8080"), Some("fd00::1"));
        assert_eq!(backend_ip("10.0.0.1"), None);
        assert_eq!(backend_ip("fd00::1"), None);
        assert_eq!(backend_ip(""), None);
    }

    #[test]
    fn test_backend_ips_dedup() {
        let ips = backend_ips("10.0.0.1:80,10.0.0.2:80,10.0.0.1:443");
        assert_eq!(ips.into_iter().collect::<Vec<_>>(), vec!["10.0.0.1", "10.0.0.2"]);
    }
}
