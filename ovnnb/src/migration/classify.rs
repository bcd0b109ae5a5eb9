//! Recognizes records created by this controller before vendor tagging.
//!
//! Name patterns are only used where they are specific enough to never
//! match records written by other systems sharing the database.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Acl, AddressSet, LoadBalancer, LogicalRouterPort, PortGroup, SG_KEY, TYPE_KEY};

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("classifier pattern is valid")
}

/// `ovn.sg.<name>`
static SG_PORT_GROUP: LazyLock<Regex> = LazyLock::new(|| pattern(r"^ovn\.sg\..+"));

/// `ovn.sg.<name>.associated.v4` and `.v6`
static SG_ADDRESS_SET: LazyLock<Regex> = LazyLock::new(|| pattern(r"^ovn\.sg\..+\.associated\.v[46]$"));

/// Network policy sets, `<np>.<namespace>.<direction>.<allow|except>.<family>[.<index>]`.
static NP_ADDRESS_SET: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\.(ingress|egress)\.(allow|except)\.(ip[46]|all)(\.\d+)?$"));

static CLUSTER_LOAD_BALANCER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"^cluster-(tcp|udp|sctp)(-session)?-loadbalancer$"));

static VPC_LOAD_BALANCER: LazyLock<Regex> = LazyLock::new(|| pattern(r"^vpc-.+-(tcp|udp|sctp)-(load|sess-load)$"));

pub fn is_router_port(lrp: &LogicalRouterPort, routers: &HashSet<String>) -> bool {
    lrp.external_ids
        .get(LogicalRouterPort::ROUTER_KEY)
        .is_some_and(|lr| routers.contains(lr))
}

/// Security group and typed port groups. Network policy groups are only
/// recognized through their external IDs.
pub fn is_port_group(pg: &PortGroup) -> bool {
    SG_PORT_GROUP.is_match(&pg.name) || pg.external_ids.contains_key(SG_KEY) || pg.external_ids.contains_key(TYPE_KEY)
}

pub fn is_address_set(set: &AddressSet) -> bool {
    SG_ADDRESS_SET.is_match(&set.name) || NP_ADDRESS_SET.is_match(&set.name) || set.external_ids.contains_key(SG_KEY)
}

pub fn is_load_balancer(lb: &LoadBalancer) -> bool {
    CLUSTER_LOAD_BALANCER.is_match(&lb.name) || VPC_LOAD_BALANCER.is_match(&lb.name)
}

/// An ACL is ours when it hangs off one of our port groups or switches, or
/// was generated for one of our switches' subnets.
pub fn is_acl(acl: &Acl, port_groups: &HashSet<String>, switches: &HashSet<String>) -> bool {
    let parent = acl
        .external_ids
        .get(Acl::PARENT_KEY)
        .is_some_and(|parent| port_groups.contains(parent) || switches.contains(parent));
    let subnet = acl
        .external_ids
        .get(Acl::SUBNET_KEY)
        .is_some_and(|subnet| switches.contains(subnet));
    parent || subnet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExternalIdMap;

    fn ids(pairs: &[(&str, &str)]) -> ExternalIdMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn pg(name: &str, external_ids: ExternalIdMap) -> PortGroup {
        PortGroup {
            name: name.to_string(),
            external_ids,
            ..Default::default()
        }
    }

    fn set(name: &str) -> AddressSet {
        AddressSet {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn lb(name: &str) -> LoadBalancer {
        LoadBalancer {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_port_groups() {
        assert!(is_port_group(&pg("ovn.sg.allow.ssh", ids(&[]))));
        assert!(is_port_group(&pg("np.default", ids(&[("type", "networkpolicy")]))));
        assert!(is_port_group(&pg("whatever", ids(&[("sg", "")]))));
        assert!(!is_port_group(&pg("ovn.sg.", ids(&[]))));
        assert!(!is_port_group(&pg("neutron_pg_drop", ids(&[("neutron:security_group_id", "x")]))));
    }

    #[test]
    fn test_address_sets() {
        assert!(is_address_set(&set("ovn.sg.web.associated.v4")));
        assert!(is_address_set(&set("ovn.sg.web.associated.v6")));
        assert!(is_address_set(&set("np1.default.ingress.allow.ip4.0")));
        assert!(is_address_set(&set("np1.default.egress.except.all")));
        assert!(!is_address_set(&set("ovn.sg.web.associated.v5")));
        assert!(!is_address_set(&set("pg_2a4c_ip4")));
    }

    #[test]
    fn test_load_balancers() {
        assert!(is_load_balancer(&lb("cluster-tcp-loadbalancer")));
        assert!(is_load_balancer(&lb("cluster-udp-session-loadbalancer")));
        assert!(is_load_balancer(&lb("vpc-red-sctp-load")));
        assert!(is_load_balancer(&lb("vpc-red-tcp-sess-load")));
        assert!(!is_load_balancer(&lb("cluster-icmp-loadbalancer")));
        assert!(!is_load_balancer(&lb("vpc--tcp-load")));
        assert!(!is_load_balancer(&lb("octavia-lb-1")));
    }

    #[test]
    fn test_router_ports_and_acls() {
        let routers = HashSet::from(["ovn-cluster".to_string()]);
        let lrp = LogicalRouterPort {
            name: "ovn-cluster-join".to_string(),
            external_ids: ids(&[("lr", "ovn-cluster")]),
            ..Default::default()
        };
        assert!(is_router_port(&lrp, &routers));
        assert!(!is_router_port(&LogicalRouterPort::default(), &routers));

        let port_groups = HashSet::from(["ovn.sg.web".to_string()]);
        let switches = HashSet::from(["ovn-default".to_string()]);
        let acl = |pairs: &[(&str, &str)]| Acl {
            external_ids: ids(pairs),
            ..Default::default()
        };
        assert!(is_acl(&acl(&[("parent", "ovn.sg.web")]), &port_groups, &switches));
        assert!(is_acl(&acl(&[("parent", "ovn-default")]), &port_groups, &switches));
        assert!(is_acl(&acl(&[("subnet", "ovn-default")]), &port_groups, &switches));
        assert!(!is_acl(&acl(&[("subnet", "ovn.sg.web")]), &port_groups, &switches));
        assert!(!is_acl(&acl(&[("parent", "neutron-pg")]), &port_groups, &switches));
    }
}
