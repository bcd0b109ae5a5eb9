//! Vendor tagging of records created before ownership markers existed.
//!
//! Releases before 1.15.0 did not stamp `external_ids["vendor"]` on the
//! records they created. On upgrade, [`NbClient::migrate_vendor_external_ids`]
//! finds those records by their external IDs and naming patterns and tags
//! them, so later cleanups can tell them apart from records owned by other
//! systems sharing the database.
//!
//! ```text
//! NeedsMigration ──► InProgress ──► Completed
//!       ▲                 │
//!       │            any failure
//!       └──── (version not stamped, rerun on next start)
//!
//! NotNeeded (terminal, version re-stamped when it changed)
//! ```
//!
//! Passes run in dependency order: router ports, port groups, address
//! sets, load balancers, ACLs. ACL ownership depends on the port groups
//! tagged before it.

mod classify;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;

use tracing::{Instrument, info, info_span};

use crate::client::NbClient;
use crate::error::{Action, Result, ResultExt};
use crate::model::{
    Acl, EXTERNAL_IDS, ExternalIds, LogicalRouter, LogicalRouterPort, LogicalSwitch, Model, NbGlobal, PortGroup,
    VENDOR_KEY, op,
};
use crate::version::compare_versions;

pub use classify::{is_acl, is_address_set, is_load_balancer, is_port_group, is_router_port};

/// `NB_Global` external-ID key recording the last version that ran.
pub const VERSION_KEY: &str = "kube-ovn-version";

/// First release that tags every record it creates.
pub const VENDOR_TAG_VERSION: &str = "1.15.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationState {
    NotNeeded,
    NeedsMigration,
    InProgress,
    Completed,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationState::NotNeeded => "not needed",
            MigrationState::NeedsMigration => "needs migration",
            MigrationState::InProgress => "in progress",
            MigrationState::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Outcome of a migration run with the number of records tagged per pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub state: MigrationState,
    pub previous_version: Option<String>,
    pub router_ports: usize,
    pub port_groups: usize,
    pub address_sets: usize,
    pub load_balancers: usize,
    pub acls: usize,
}

impl MigrationReport {
    fn new(state: MigrationState, previous_version: Option<String>) -> Self {
        Self {
            state,
            previous_version,
            router_ports: 0,
            port_groups: 0,
            address_sets: 0,
            load_balancers: 0,
            acls: 0,
        }
    }

    pub fn total(&self) -> usize {
        self.router_ports + self.port_groups + self.address_sets + self.load_balancers + self.acls
    }
}

/// Decides whether a database stamped with `stored` needs tagging when
/// `running` starts.
///
/// No stamp means a fresh or very old database, both safe to migrate.
pub fn migration_decision(stored: Option<&str>, running: &str) -> MigrationState {
    let Some(stored) = stored.filter(|v| !v.is_empty()) else {
        return MigrationState::NeedsMigration;
    };
    if stored == running {
        return MigrationState::NotNeeded;
    }
    match compare_versions(stored, VENDOR_TAG_VERSION) {
        Ordering::Less => MigrationState::NeedsMigration,
        _ => MigrationState::NotNeeded,
    }
}

impl NbClient {
    /// Version stamped by the last successful start, if any.
    pub async fn kube_ovn_version(&self) -> Result<Option<String>> {
        let nb_global = self.get_nb_global().await?;
        Ok(nb_global.external_ids.get(VERSION_KEY).filter(|v| !v.is_empty()).cloned())
    }

    /// Stamps `version` into `NB_Global`. Nothing is written when it is
    /// already there.
    pub async fn set_kube_ovn_version(&self, version: &str) -> Result<()> {
        let mut nb_global = self.get_nb_global().await?;
        if nb_global.external_ids.get(VERSION_KEY).map(String::as_str) == Some(version) {
            return Ok(());
        }
        nb_global.external_ids.insert(VERSION_KEY.to_string(), version.to_string());
        self.update_nb_global(&nb_global, &[EXTERNAL_IDS]).await?;
        info!(version, "Updated kube-ovn version in NB_Global");
        Ok(())
    }

    pub async fn migration_state(&self) -> Result<MigrationState> {
        let stored = self.kube_ovn_version().await?;
        Ok(migration_decision(stored.as_deref(), &self.config().version))
    }

    /// Tags untagged records of this controller with the vendor marker and
    /// stamps the running version.
    ///
    /// Each pass is one transaction. The first failure aborts the run and
    /// leaves the version unstamped, so the next start retries from scratch;
    /// passes already committed are skipped then because their records
    /// carry the marker.
    pub async fn migrate_vendor_external_ids(&self) -> Result<MigrationReport> {
        let running = self.config().version.clone();
        let stored = self.kube_ovn_version().await?;
        let decision = migration_decision(stored.as_deref(), &running);
        let mut report = MigrationReport::new(decision, stored.clone());

        if decision == MigrationState::NotNeeded {
            info!(stored = ?stored, running = %running, "Vendor migration not needed");
            self.set_kube_ovn_version(&running).await?;
            return Ok(report);
        }

        info!(stored = ?stored, running = %running, "Starting vendor migration");
        report.state = MigrationState::InProgress;
        self.run_passes(&mut report)
            .instrument(info_span!("migration", running = %running))
            .await
            .context(Action::Migrate, NbGlobal::TABLE, VERSION_KEY)?;

        self.set_kube_ovn_version(&running).await?;
        report.state = MigrationState::Completed;
        info!(tagged = report.total(), "Completed vendor migration");
        Ok(report)
    }

    async fn run_passes(&self, report: &mut MigrationReport) -> Result<()> {
        let routers = self.owned_names(|lr: &LogicalRouter| lr.name.clone()).await?;
        let switches = self.owned_names(|ls: &LogicalSwitch| ls.name.clone()).await?;
        info!(routers = routers.len(), switches = switches.len(), "Found owned routers and switches");

        report.router_ports = self
            .retag("lrp-vendor-migrate", |lrp: &LogicalRouterPort| is_router_port(lrp, &routers))
            .await?;
        report.port_groups = self.retag("pg-vendor-migrate", is_port_group).await?;
        report.address_sets = self.retag("as-vendor-migrate", is_address_set).await?;
        report.load_balancers = self.retag("lb-vendor-migrate", is_load_balancer).await?;

        let vendor = self.vendor();
        let port_groups: HashSet<String> = self
            .list_where(|pg: &PortGroup| {
                pg.is_owned_by(vendor) || (!pg.is_owned_by_other(vendor) && is_port_group(pg))
            })
            .await
            .context(Action::List, PortGroup::TABLE, "")?
            .into_iter()
            .map(|pg| pg.name)
            .collect();
        report.acls = self
            .retag("acl-vendor-migrate", |acl: &Acl| is_acl(acl, &port_groups, &switches))
            .await?;
        Ok(())
    }

    /// Names of records of `T` already carrying this client's vendor marker.
    async fn owned_names<T>(&self, name: impl Fn(&T) -> String) -> Result<HashSet<String>>
    where
        T: Model + ExternalIds,
    {
        let vendor = self.vendor();
        let owned = self
            .list_where(|r: &T| r.is_owned_by(vendor))
            .await
            .context(Action::List, T::TABLE, "")?;
        Ok(owned.iter().map(name).collect())
    }

    /// Tags every untagged record of `T` accepted by `classify` in one
    /// transaction named `txn`. Returns how many were tagged. Records
    /// marked by another vendor are left alone whatever their name.
    async fn retag<T>(&self, txn: &str, classify: impl Fn(&T) -> bool) -> Result<usize>
    where
        T: Model + ExternalIds,
    {
        self.retag_pass(txn, classify)
            .instrument(info_span!("pass", txn, table = T::TABLE))
            .await
    }

    async fn retag_pass<T>(&self, txn: &str, classify: impl Fn(&T) -> bool) -> Result<usize>
    where
        T: Model + ExternalIds,
    {
        let vendor = self.vendor();
        let mut records = self
            .list_where(|r: &T| !r.is_owned_by(vendor) && !r.is_owned_by_other(vendor) && classify(r))
            .await
            .context(Action::List, T::TABLE, "")?;
        if records.is_empty() {
            info!("No records need vendor migration");
            return Ok(0);
        }

        let mut ops = Vec::with_capacity(records.len());
        for record in &mut records {
            record
                .external_ids_mut()
                .insert(VENDOR_KEY.to_string(), vendor.to_string());
            ops.push(op::update(&*record, &[EXTERNAL_IDS])?);
        }
        self.transact(txn, Action::Migrate, ops)
            .await
            .context(Action::Migrate, T::TABLE, txn)?;

        info!(count = records.len(), "Tagged records");
        Ok(records.len())
    }
}
