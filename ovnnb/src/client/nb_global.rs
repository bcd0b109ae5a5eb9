//! `NB_Global` singleton settings.

use tracing::info;

use super::NbClient;
use crate::error::{Action, NbError, Result, ResultExt};
use crate::model::{ExternalIdMap, Model, NbGlobal, op};

pub const OPTION_USE_CT_INV_MATCH: &str = "use_ct_inv_match";
pub const OPTION_IC_ROUTE_ADV: &str = "ic-route-adv";
pub const OPTION_IC_ROUTE_LEARN: &str = "ic-route-learn";
pub const OPTION_IC_ROUTE_BLACKLIST: &str = "ic-route-blacklist";
pub const OPTION_SVC_IPV4_CIDR: &str = "svc_ipv4_cidr";
pub const OPTION_LS_DNAT_MOD_DL_DST: &str = "ls_dnat_mod_dl_dst";
pub const OPTION_LS_CT_SKIP_DST_LPORT_IPS: &str = "ls_ct_skip_dst_lport_ips";
pub const OPTION_NODE_LOCAL_DNS_IP: &str = "node_local_dns_ip";
pub const OPTION_SKIP_CONNTRACK_DST_CIDRS: &str = "skip_conntrack_dst_cidrs";

const KIND: &str = NbGlobal::TABLE;

impl NbClient {
    pub async fn create_nb_global(&self, nb_global: &NbGlobal) -> Result<()> {
        let ops = vec![op::insert(nb_global)?];
        self.transact("nb-global-create", Action::Create, ops)
            .await
            .context(Action::Create, KIND, &nb_global.name)
    }

    /// Returns the singleton row. Zero or several rows are errors.
    pub async fn get_nb_global(&self) -> Result<NbGlobal> {
        self.get_where("", |_: &NbGlobal| true, false)
            .await
            .and_then(|found| found.ok_or_else(|| NbError::not_found(KIND, "")))
            .context(Action::Get, KIND, "")
    }

    pub async fn update_nb_global(&self, nb_global: &NbGlobal, fields: &[&str]) -> Result<()> {
        self.update("nb-global-update", nb_global, fields)
            .await
            .context(Action::Update, KIND, &nb_global.name)
    }

    pub async fn delete_nb_global(&self) -> Result<()> {
        self.bounded("delete_nb_global", async {
            let nb_global = self.get_nb_global().await?;
            let ops = vec![op::delete(&nb_global)?];
            self.transact("nb-global-delete", Action::Delete, ops)
                .await
                .context(Action::Delete, KIND, &nb_global.name)
        })
        .await
    }

    /// Sets the availability zone name.
    pub async fn set_az_name(&self, name: &str) -> Result<()> {
        self.bounded("set_az_name", async {
            let mut nb_global = self.get_nb_global().await?;
            if nb_global.name == name {
                return Ok(());
            }
            nb_global.name = name.to_string();
            self.update_nb_global(&nb_global, &[NbGlobal::NAME]).await
        })
        .await
    }

    pub async fn set_ovn_ipsec(&self, enable: bool) -> Result<()> {
        self.bounded("set_ovn_ipsec", async {
            let mut nb_global = self.get_nb_global().await?;
            if nb_global.ipsec == enable {
                return Ok(());
            }
            nb_global.ipsec = enable;
            self.update_nb_global(&nb_global, &[NbGlobal::IPSEC]).await
        })
        .await
    }

    /// Applies option changes: a non-empty value sets the key, an empty
    /// value removes it. Nothing is written when the options end up equal.
    pub async fn set_nb_global_options(&self, changes: &ExternalIdMap) -> Result<()> {
        self.bounded("set_nb_global_options", async {
            let mut nb_global = self.get_nb_global().await?;
            let mut options = nb_global.options.clone();
            for (key, value) in changes {
                if value.is_empty() {
                    options.remove(key);
                } else {
                    options.insert(key.clone(), value.clone());
                }
            }
            if options == nb_global.options {
                return Ok(());
            }

            nb_global.options = options;
            self.update_nb_global(&nb_global, &[NbGlobal::OPTIONS]).await?;
            info!(?changes, "Updated NB_Global options");
            Ok(())
        })
        .await
    }

    /// Sets option `key` to `value`; an empty value removes the key.
    pub async fn set_nb_global_option(&self, key: &str, value: impl ToString) -> Result<()> {
        let changes = ExternalIdMap::from([(key.to_string(), value.to_string())]);
        self.set_nb_global_options(&changes).await
    }

    pub async fn set_use_ct_inv_match(&self) -> Result<()> {
        self.set_nb_global_option(OPTION_USE_CT_INV_MATCH, false).await
    }

    /// Enables or disables interconnect route advertisement and learning.
    ///
    /// Enabling always writes the blacklist, even when it is empty.
    pub async fn set_ic_auto_route(&self, enable: bool, blacklist: &[&str]) -> Result<()> {
        self.bounded("set_ic_auto_route", async {
            let mut nb_global = self.get_nb_global().await?;
            let mut options = nb_global.options.clone();
            if enable {
                options.insert(OPTION_IC_ROUTE_ADV.to_string(), "true".to_string());
                options.insert(OPTION_IC_ROUTE_LEARN.to_string(), "true".to_string());
                options.insert(OPTION_IC_ROUTE_BLACKLIST.to_string(), blacklist.join(","));
            } else {
                for key in [OPTION_IC_ROUTE_ADV, OPTION_IC_ROUTE_LEARN, OPTION_IC_ROUTE_BLACKLIST] {
                    options.remove(key);
                }
            }
            if options == nb_global.options {
                return Ok(());
            }

            nb_global.options = options;
            self.update_nb_global(&nb_global, &[NbGlobal::OPTIONS]).await?;
            info!(enable, "Updated interconnect auto route");
            Ok(())
        })
        .await
    }

    pub async fn set_lb_cidr(&self, service_cidr: &str) -> Result<()> {
        self.set_nb_global_option(OPTION_SVC_IPV4_CIDR, service_cidr).await
    }

    pub async fn set_ls_dnat_mod_dl_dst(&self, enabled: bool) -> Result<()> {
        self.set_nb_global_option(OPTION_LS_DNAT_MOD_DL_DST, enabled).await
    }

    pub async fn set_ls_ct_skip_dst_lport_ips(&self, enabled: bool) -> Result<()> {
        self.set_nb_global_option(OPTION_LS_CT_SKIP_DST_LPORT_IPS, enabled).await
    }

    /// Sets the node-local DNS IP; an empty value removes the option.
    pub async fn set_node_local_dns_ip(&self, ip: &str) -> Result<()> {
        self.set_nb_global_option(OPTION_NODE_LOCAL_DNS_IP, ip).await
    }

    /// Sets the CIDRs exempt from conntrack; an empty value removes the option.
    pub async fn set_skip_conntrack_cidrs(&self, cidrs: &str) -> Result<()> {
        self.set_nb_global_option(OPTION_SKIP_CONNTRACK_DST_CIDRS, cidrs).await
    }
}
