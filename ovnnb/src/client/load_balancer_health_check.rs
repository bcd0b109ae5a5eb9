//! Load balancer health checks.
//!
//! A health check belongs to the load balancer whose `health_check` column
//! references it. It is created and attached in one transaction, and
//! detached and deleted in one transaction.

use std::collections::HashSet;

use tracing::info;

use super::NbClient;
use crate::db::{Mutation, Operation};
use crate::error::{Action, NbError, Result, ResultExt};
use crate::model::{ExternalIdMap, LoadBalancer, LoadBalancerHealthCheck, Model, op};

impl NbClient {
    /// Creates a health check for `vip` and attaches it to load balancer
    /// `lb_name`. Does nothing if one already exists for that VIP.
    pub async fn add_load_balancer_health_check(
        &self,
        lb_name: &str,
        vip: &str,
        external_ids: &ExternalIdMap,
    ) -> Result<()> {
        self.bounded("add_load_balancer_health_check", async {
            let ctx = |e: NbError| e.context(Action::Create, LoadBalancerHealthCheck::TABLE, vip);
            if lb_name.is_empty() {
                return Err(ctx(NbError::PreconditionFailed("the lb name is required".to_string())));
            }
            if vip.is_empty() {
                return Err(ctx(NbError::PreconditionFailed("the vip endpoint is required".to_string())));
            }

            let key = format!("{lb_name}/{vip}");
            let _guard = match self.config.serialize_creates {
                true => Some(self.locks.lock(LoadBalancerHealthCheck::TABLE, &key).await),
                false => None,
            };

            let (lb, existing) = self.get_load_balancer_health_check(lb_name, vip, true).await?;
            if existing.is_some() {
                info!(lb = lb_name, vip, "Health check already exists");
                return Ok(());
            }
            if lb.ip_port_mappings.is_empty() {
                return Err(ctx(NbError::PreconditionFailed(format!(
                    "load balancer {lb_name} has no ip port mappings for health check of {vip}"
                ))));
            }

            let hc = LoadBalancerHealthCheck {
                uuid: op::named_uuid(),
                vip: vip.to_string(),
                options: LoadBalancerHealthCheck::default_options(),
                external_ids: external_ids.clone(),
            };
            let ops = vec![
                op::insert(&hc).map_err(ctx)?,
                op::mutate(&lb, vec![Mutation::insert_set(LoadBalancer::HEALTH_CHECK, [hc.uuid.clone()])]).map_err(ctx)?,
            ];
            self.transact("lbhc-add", Action::Create, ops).await.map_err(ctx)?;

            info!(lb = lb_name, vip, "Created health check");
            Ok(())
        })
        .await
    }

    /// Returns load balancer `lb_name` and its health check for `vip`.
    ///
    /// A missing load balancer is always an error. A missing health check
    /// is `None` when `ignore_not_found` is set, an error otherwise. More
    /// than one health check for the same VIP is an error.
    pub async fn get_load_balancer_health_check(
        &self,
        lb_name: &str,
        vip: &str,
        ignore_not_found: bool,
    ) -> Result<(LoadBalancer, Option<LoadBalancerHealthCheck>)> {
        self.bounded("get_load_balancer_health_check", async {
            let lb = self
                .require(lb_name, |lb: &LoadBalancer| lb.name == lb_name)
                .await
                .context(Action::Get, LoadBalancer::TABLE, lb_name)?;

            if lb.health_check.is_empty() {
                if ignore_not_found {
                    return Ok((lb, None));
                }
                return Err(NbError::not_found(LoadBalancerHealthCheck::TABLE, vip).context(
                    Action::Get,
                    LoadBalancerHealthCheck::TABLE,
                    vip,
                ));
            }

            let attached: HashSet<&str> = lb.health_check.iter().map(String::as_str).collect();
            let hc = self
                .get_where(
                    vip,
                    |hc: &LoadBalancerHealthCheck| attached.contains(hc.uuid.as_str()) && hc.vip == vip,
                    ignore_not_found,
                )
                .await
                .context(Action::Get, LoadBalancerHealthCheck::TABLE, vip)?;
            Ok((lb, hc))
        })
        .await
    }

    pub async fn load_balancer_health_check_exists(&self, lb_name: &str, vip: &str) -> Result<bool> {
        let (_, hc) = self.get_load_balancer_health_check(lb_name, vip, true).await?;
        Ok(hc.is_some())
    }

    pub async fn list_load_balancer_health_checks(
        &self,
        filter: impl Fn(&LoadBalancerHealthCheck) -> bool,
    ) -> Result<Vec<LoadBalancerHealthCheck>> {
        self.list_where(filter)
            .await
            .context(Action::List, LoadBalancerHealthCheck::TABLE, "")
    }

    pub async fn update_load_balancer_health_check(
        &self,
        hc: &LoadBalancerHealthCheck,
        fields: &[&str],
    ) -> Result<()> {
        self.update("lbhc-update", hc, fields)
            .await
            .context(Action::Update, LoadBalancerHealthCheck::TABLE, &hc.key())
    }

    /// Detaches and deletes the health check of `vip` on `lb_name`, if any.
    pub async fn delete_load_balancer_health_check(&self, lb_name: &str, vip: &str) -> Result<()> {
        self.bounded("delete_load_balancer_health_check", async {
            let (lb, hc) = self.get_load_balancer_health_check(lb_name, vip, true).await?;
            let Some(hc) = hc else {
                return Ok(());
            };
            let ops = self.delete_health_check_ops(&lb, &hc.uuid)?;
            self.transact("lbhc-del", Action::Delete, ops)
                .await
                .context(Action::Delete, LoadBalancerHealthCheck::TABLE, vip)?;
            info!(lb = lb_name, vip, "Deleted health check");
            Ok(())
        })
        .await
    }

    /// Deletes every health check accepted by `filter` and detaches it from
    /// the load balancers referencing it, in one transaction.
    pub async fn delete_load_balancer_health_checks(
        &self,
        filter: impl Fn(&LoadBalancerHealthCheck) -> bool,
    ) -> Result<()> {
        self.bounded("delete_load_balancer_health_checks", async {
            let ctx = |e: NbError| e.context(Action::Delete, LoadBalancerHealthCheck::TABLE, "");
            let doomed = self.list_where(filter).await.map_err(ctx)?;
            if doomed.is_empty() {
                return Ok(());
            }
            let doomed_uuids: HashSet<&str> = doomed.iter().map(|hc| hc.uuid.as_str()).collect();

            let referencing = self
                .list_where(|lb: &LoadBalancer| lb.health_check.iter().any(|hc| doomed_uuids.contains(hc.as_str())))
                .await
                .map_err(ctx)?;

            let mut ops = Vec::with_capacity(referencing.len() + doomed.len());
            for lb in &referencing {
                let detached = lb
                    .health_check
                    .iter()
                    .filter(|hc| doomed_uuids.contains(hc.as_str()))
                    .cloned();
                ops.push(op::mutate(lb, vec![Mutation::delete_set(LoadBalancer::HEALTH_CHECK, detached)]).map_err(ctx)?);
            }
            for hc in &doomed {
                ops.push(op::delete(hc).map_err(ctx)?);
            }
            self.transact("lbhc-del", Action::Delete, ops).await.map_err(ctx)?;
            info!(count = doomed.len(), "Deleted health checks");
            Ok(())
        })
        .await
    }

    /// Operations detaching health check `uuid` from `lb` and deleting it.
    pub(crate) fn delete_health_check_ops(&self, lb: &LoadBalancer, uuid: &str) -> Result<Vec<Operation>> {
        let hc = LoadBalancerHealthCheck {
            uuid: uuid.to_string(),
            ..Default::default()
        };
        Ok(vec![
            op::mutate(lb, vec![Mutation::delete_set(LoadBalancer::HEALTH_CHECK, [uuid])])?,
            op::delete(&hc)?,
        ])
    }
}
