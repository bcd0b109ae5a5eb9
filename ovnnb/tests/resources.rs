//! Per-kind operations: address sets, load balancers and health checks,
//! port groups, security groups and `NB_Global`.

mod common;

use common::{TestDb, ids};
use ovnnb::NbError;
use ovnnb::client::{sg_port_group_name, sg_v4_associated_name, sg_v6_associated_name};
use ovnnb::model::{
    Acl, AddressSet, LoadBalancer, LoadBalancerHealthCheck, LogicalSwitchPort, NbGlobal, PortGroup,
};

// =============================================================================
// Address sets
// =============================================================================

#[tokio::test]
async fn test_address_set_update_addresses_replaces_and_clears() {
    let t = TestDb::new().await;
    t.client.create_address_set("as1", &ids(&[])).await.unwrap();

    t.client.address_set_update_addresses("as1", &["1.2.3.4"]).await.unwrap();
    let set = t.client.get_address_set("as1", false).await.unwrap().unwrap();
    assert_eq!(set.addresses, vec!["1.2.3.4"]);

    t.client
        .address_set_update_addresses("as1", &["10.0.0.5/24", "1.2.3.4", "1.2.3.4"])
        .await
        .unwrap();
    let set = t.client.get_address_set("as1", false).await.unwrap().unwrap();
    assert_eq!(set.addresses, vec!["1.2.3.4", "10.0.0.0/24"]);

    t.client.address_set_update_addresses::<&str>("as1", &[]).await.unwrap();
    let set = t.client.get_address_set("as1", false).await.unwrap().unwrap();
    assert!(set.addresses.is_empty());
}

#[tokio::test]
async fn test_address_set_name_must_be_acl_safe() {
    let t = TestDb::new().await;
    let err = t.client.create_address_set("allow-ssh", &ids(&[])).await.unwrap_err();
    assert!(matches!(err.root(), NbError::PreconditionFailed(_)));
    assert!(t.all::<AddressSet>().await.is_empty());
}

#[tokio::test]
async fn test_create_address_set_leaves_caller_map_untouched() {
    let t = TestDb::new().await;
    let external_ids = ids(&[("sg", "web")]);
    t.client.create_address_set("as1", &external_ids).await.unwrap();
    assert_eq!(external_ids, ids(&[("sg", "web")]));
}

#[tokio::test]
async fn test_address_set_deletes() {
    let t = TestDb::new().await;
    for (name, sg) in [("as1", "web"), ("as2", "web"), ("as3", "db"), ("as4", "db")] {
        t.client.create_address_set(name, &ids(&[("sg", sg)])).await.unwrap();
    }

    t.client.delete_address_set(&["as1", "missing"]).await.unwrap();
    assert!(!t.client.address_set_exists("as1").await.unwrap());

    t.client.delete_address_sets(&ids(&[("sg", "db")])).await.unwrap();
    t.client.batch_delete_address_sets_by_names(&["as2", "gone"]).await.unwrap();
    assert!(t.all::<AddressSet>().await.is_empty());
}

// =============================================================================
// Load balancers
// =============================================================================

#[tokio::test]
async fn test_update_vips_adds_and_overwrites() {
    let t = TestDb::new().await;
    t.client.create_load_balancer("lb1", "tcp", None).await.unwrap();
    t.client
        .load_balancer_update_vips("lb1", &ids(&[("10.0.0.1:80", "10.1.0.1:80")]), true)
        .await
        .unwrap();
    t.client
        .load_balancer_update_vips(
            "lb1",
            &ids(&[("10.0.0.2:80", "10.1.0.2:80"), ("10.0.0.1:80", "10.1.0.9:80")]),
            true,
        )
        .await
        .unwrap();

    let lb = t.client.get_load_balancer("lb1", false).await.unwrap().unwrap();
    assert_eq!(
        lb.vips,
        ids(&[("10.0.0.1:80", "10.1.0.9:80"), ("10.0.0.2:80", "10.1.0.2:80")])
    );
    assert_eq!(lb.protocol.as_deref(), Some("tcp"));
    assert_eq!(lb.external_ids.get("vendor").map(String::as_str), Some("kube-ovn"));

    t.client
        .load_balancer_update_vips("lb1", &ids(&[("10.0.0.1:80", ""), ("10.0.0.3:80", "")]), false)
        .await
        .unwrap();
    let lb = t.client.get_load_balancer("lb1", false).await.unwrap().unwrap();
    assert_eq!(lb.vips, ids(&[("10.0.0.2:80", "10.1.0.2:80")]));
}

#[tokio::test]
async fn test_add_vip_sorts_backends() {
    let t = TestDb::new().await;
    t.client.create_load_balancer("lb1", "udp", None).await.unwrap();
    t.client
        .load_balancer_add_vip("lb1", "10.96.0.10:53", &["10.0.0.3:53", "10.0.0.2:53"])
        .await
        .unwrap();
    let lb = t.client.get_load_balancer("lb1", false).await.unwrap().unwrap();
    assert_eq!(lb.vips.get("10.96.0.10:53").map(String::as_str), Some("10.0.0.2:53,10.0.0.3:53"));
}

#[tokio::test]
async fn test_load_balancer_options() {
    let t = TestDb::new().await;
    t.client.create_load_balancer("lb1", "tcp", None).await.unwrap();
    t.client.set_load_balancer_affinity_timeout("lb1", 10800).await.unwrap();
    t.client.set_load_balancer_prefer_local_backend("lb1", true).await.unwrap();
    let submitted = t.db.transaction_count();
    t.client.set_load_balancer_affinity_timeout("lb1", 10800).await.unwrap();
    assert_eq!(t.db.transaction_count(), submitted);

    let lb = t.client.get_load_balancer("lb1", false).await.unwrap().unwrap();
    assert_eq!(
        lb.options,
        ids(&[("affinity_timeout", "10800"), ("prefer_local_backend", "true")])
    );
}

#[tokio::test]
async fn test_delete_load_balancers_by_filter() {
    let t = TestDb::new().await;
    for name in ["cluster-tcp-loadbalancer", "cluster-udp-loadbalancer", "other"] {
        t.client.create_load_balancer(name, "tcp", None).await.unwrap();
    }
    t.client
        .delete_load_balancers(|lb| lb.name.starts_with("cluster-"))
        .await
        .unwrap();
    t.client.delete_load_balancer("missing").await.unwrap();

    let left: Vec<LoadBalancer> = t.all().await;
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "other");
}

// =============================================================================
// Health checks and IP port mappings
// =============================================================================

const VIP: &str = "10.96.0.1:443";

async fn lb_with_vip(t: &TestDb) {
    t.client.create_load_balancer("lb1", "tcp", None).await.unwrap();
    t.client
        .load_balancer_add_vip("lb1", VIP, &["10.0.0.1:6443", "10.0.0.2:6443"])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_health_check_requires_ip_port_mapping() {
    let t = TestDb::new().await;
    lb_with_vip(&t).await;

    let err = t
        .client
        .add_load_balancer_health_check("lb1", VIP, &ids(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err.root(), NbError::PreconditionFailed(_)));
    assert!(t.all::<LoadBalancerHealthCheck>().await.is_empty());
}

#[tokio::test]
async fn test_health_check_created_with_back_reference() {
    let t = TestDb::new().await;
    lb_with_vip(&t).await;
    let mappings = ids(&[("10.0.0.1", "node1:172.18.0.2"), ("10.0.0.2", "node2:172.18.0.3")]);

    t.client
        .load_balancer_add_health_check("lb1", VIP, false, &mappings, &ids(&[("switch_lb_vip", "")]))
        .await
        .unwrap();
    t.client
        .load_balancer_add_health_check("lb1", VIP, false, &mappings, &ids(&[]))
        .await
        .unwrap();

    let checks: Vec<LoadBalancerHealthCheck> = t.all().await;
    assert_eq!(checks.len(), 1);
    assert_eq!(checks[0].vip, VIP);
    assert_eq!(checks[0].options, LoadBalancerHealthCheck::default_options());

    let (lb, hc) = t.client.get_load_balancer_health_check("lb1", VIP, false).await.unwrap();
    assert_eq!(lb.health_check, vec![checks[0].uuid.clone()]);
    assert_eq!(lb.ip_port_mappings, mappings);
    assert_eq!(hc.map(|hc| hc.uuid), Some(checks[0].uuid.clone()));
    assert!(t.client.load_balancer_health_check_exists("lb1", VIP).await.unwrap());
}

#[tokio::test]
async fn test_health_check_lookup_on_missing_load_balancer_fails() {
    let t = TestDb::new().await;
    let err = t
        .client
        .get_load_balancer_health_check("missing", VIP, true)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_vip_removes_health_check_and_mappings() {
    let t = TestDb::new().await;
    lb_with_vip(&t).await;
    t.client
        .load_balancer_add_vip("lb1", "10.96.0.2:80", &["10.0.0.2:8080"])
        .await
        .unwrap();
    let mappings = ids(&[("10.0.0.1", "node1:172.18.0.2"), ("10.0.0.2", "node2:172.18.0.3")]);
    t.client
        .load_balancer_add_health_check("lb1", VIP, false, &mappings, &ids(&[]))
        .await
        .unwrap();

    t.client.load_balancer_delete_vip("lb1", VIP, false).await.unwrap();

    let lb = t.client.get_load_balancer("lb1", false).await.unwrap().unwrap();
    assert_eq!(lb.vips, ids(&[("10.96.0.2:80", "10.0.0.2:8080")]));
    assert!(lb.health_check.is_empty());
    // 10.0.0.2 still backs the other VIP.
    assert_eq!(lb.ip_port_mappings, ids(&[("10.0.0.2", "node2:172.18.0.3")]));
    assert!(t.all::<LoadBalancerHealthCheck>().await.is_empty());
}

#[tokio::test]
async fn test_update_ip_port_mapping_replaces_changed_values() {
    let t = TestDb::new().await;
    lb_with_vip(&t).await;
    t.client
        .load_balancer_add_ip_port_mapping("lb1", VIP, &ids(&[("10.0.0.1", "node1:172.18.0.2")]))
        .await
        .unwrap();
    t.client
        .load_balancer_update_ip_port_mapping("lb1", VIP, &ids(&[("10.0.0.1", "node9:172.18.0.9")]))
        .await
        .unwrap();

    let lb = t.client.get_load_balancer("lb1", false).await.unwrap().unwrap();
    assert_eq!(lb.ip_port_mappings, ids(&[("10.0.0.1", "node9:172.18.0.9")]));
}

#[tokio::test]
async fn test_delete_health_checks_by_filter_detaches_them() {
    let t = TestDb::new().await;
    lb_with_vip(&t).await;
    let mappings = ids(&[("10.0.0.1", "node1:172.18.0.2")]);
    t.client
        .load_balancer_add_health_check("lb1", VIP, false, &mappings, &ids(&[("vip", "svc")]))
        .await
        .unwrap();

    t.client
        .delete_load_balancer_health_checks(|hc| hc.external_ids.contains_key("vip"))
        .await
        .unwrap();

    let lb = t.client.get_load_balancer("lb1", false).await.unwrap().unwrap();
    assert!(lb.health_check.is_empty());
    assert!(t.all::<LoadBalancerHealthCheck>().await.is_empty());
}

// =============================================================================
// Port groups
// =============================================================================

async fn seed_ports(t: &TestDb, names: &[&str]) -> Vec<String> {
    let mut uuids = Vec::new();
    for name in names {
        let lsp = LogicalSwitchPort {
            name: name.to_string(),
            ..Default::default()
        };
        uuids.push(t.seed(&lsp).await);
    }
    uuids
}

#[tokio::test]
async fn test_port_group_membership() {
    let t = TestDb::new().await;
    let uuids = seed_ports(&t, &["p1", "p2", "p3"]).await;
    t.client.create_port_group("pg1", &ids(&[("type", "node")])).await.unwrap();

    t.client.port_group_add_ports("pg1", &["p1", "p2", "unknown"]).await.unwrap();
    let pg = t.client.get_port_group("pg1", false).await.unwrap().unwrap();
    let mut expected = vec![uuids[0].clone(), uuids[1].clone()];
    expected.sort();
    assert_eq!(pg.ports, expected);

    t.client.port_group_remove_ports("pg1", &["p1"]).await.unwrap();
    t.client.port_group_set_ports("pg1", &["p2", "p3"]).await.unwrap();
    let pg = t.client.get_port_group("pg1", false).await.unwrap().unwrap();
    let mut expected = vec![uuids[1].clone(), uuids[2].clone()];
    expected.sort();
    assert_eq!(pg.ports, expected);

    t.client.remove_port_from_port_groups("p3", &[]).await.unwrap();
    let pg = t.client.get_port_group("pg1", false).await.unwrap().unwrap();
    assert_eq!(pg.ports, vec![uuids[1].clone()]);
}

#[tokio::test]
async fn test_create_port_group_rewrites_differing_external_ids() {
    let t = TestDb::new().await;
    t.client.create_port_group("pg1", &ids(&[("type", "node")])).await.unwrap();
    t.client.create_port_group("pg1", &ids(&[("type", "gateway")])).await.unwrap();

    let groups: Vec<PortGroup> = t.all().await;
    assert_eq!(groups.len(), 1);
    assert_eq!(
        groups[0].external_ids,
        ids(&[("type", "gateway"), ("vendor", "kube-ovn")])
    );
}

#[tokio::test]
async fn test_port_group_requires_name() {
    let t = TestDb::new().await;
    let err = t.client.get_port_group("", true).await.unwrap_err();
    assert!(matches!(err, NbError::PreconditionFailed(_)));
    t.client.delete_port_group(&["missing"]).await.unwrap();
}

// =============================================================================
// Security groups
// =============================================================================

#[tokio::test]
async fn test_delete_security_group() {
    let t = TestDb::new().await;
    let pg_name = sg_port_group_name("allow-ssh");
    t.client.create_port_group(&pg_name, &ids(&[("sg", "allow-ssh")])).await.unwrap();
    for name in [sg_v4_associated_name("allow-ssh"), sg_v6_associated_name("allow-ssh")] {
        t.client
            .create_address_set(&name, &ids(&[("sg", "allow-ssh")]))
            .await
            .unwrap();
    }
    t.client.create_address_set("unrelated", &ids(&[("sg", "web")])).await.unwrap();
    t.seed(&Acl {
        direction: "to-lport".to_string(),
        priority: 2003,
        match_expr: "tcp.dst == 22".to_string(),
        action: "allow-related".to_string(),
        external_ids: ids(&[("parent", pg_name.as_str())]),
        ..Default::default()
    })
    .await;
    t.seed(&Acl {
        external_ids: ids(&[("parent", "ovn.sg.web")]),
        ..Default::default()
    })
    .await;

    t.client.delete_security_group("allow-ssh").await.unwrap();

    assert!(t.all::<PortGroup>().await.is_empty());
    let sets: Vec<AddressSet> = t.all().await;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].name, "unrelated");
    let acls: Vec<Acl> = t.all().await;
    assert_eq!(acls.len(), 1);
    assert_eq!(acls[0].external_ids, ids(&[("parent", "ovn.sg.web")]));

    // Nothing left to delete.
    let submitted = t.db.transaction_count();
    t.client.delete_security_group("allow-ssh").await.unwrap();
    assert_eq!(t.db.transaction_count(), submitted);
}

// =============================================================================
// NB_Global
// =============================================================================

#[tokio::test]
async fn test_nb_global_options() {
    let t = TestDb::new().await;
    t.client.set_lb_cidr("10.96.0.0/12").await.unwrap();
    t.client.set_ls_dnat_mod_dl_dst(true).await.unwrap();
    t.client.set_use_ct_inv_match().await.unwrap();

    let submitted = t.db.transaction_count();
    t.client.set_lb_cidr("10.96.0.0/12").await.unwrap();
    assert_eq!(t.db.transaction_count(), submitted);

    let nb_global = t.client.get_nb_global().await.unwrap();
    assert_eq!(
        nb_global.options,
        ids(&[
            ("ls_dnat_mod_dl_dst", "true"),
            ("svc_ipv4_cidr", "10.96.0.0/12"),
            ("use_ct_inv_match", "false"),
        ])
    );

    t.client.set_lb_cidr("").await.unwrap();
    let nb_global = t.client.get_nb_global().await.unwrap();
    assert!(!nb_global.options.contains_key("svc_ipv4_cidr"));
}

#[tokio::test]
async fn test_ic_auto_route() {
    let t = TestDb::new().await;
    t.client.set_ic_auto_route(true, &["10.16.0.0/16", "100.64.0.0/16"]).await.unwrap();
    let nb_global = t.client.get_nb_global().await.unwrap();
    assert_eq!(
        nb_global.options,
        ids(&[
            ("ic-route-adv", "true"),
            ("ic-route-blacklist", "10.16.0.0/16,100.64.0.0/16"),
            ("ic-route-learn", "true"),
        ])
    );

    t.client.set_ic_auto_route(false, &[]).await.unwrap();
    let nb_global = t.client.get_nb_global().await.unwrap();
    assert!(nb_global.options.is_empty());

    // An empty blacklist is still written when enabling.
    t.client.set_ic_auto_route(true, &[]).await.unwrap();
    let nb_global = t.client.get_nb_global().await.unwrap();
    assert_eq!(
        nb_global.options,
        ids(&[("ic-route-adv", "true"), ("ic-route-blacklist", ""), ("ic-route-learn", "true")])
    );

    let submitted = t.db.transaction_count();
    t.client.set_ic_auto_route(true, &[]).await.unwrap();
    assert_eq!(t.db.transaction_count(), submitted);
}

#[tokio::test]
async fn test_nb_global_columns() {
    let t = TestDb::new().await;
    t.client.set_az_name("az1").await.unwrap();
    t.client.set_ovn_ipsec(true).await.unwrap();

    let mut nb_global = t.client.get_nb_global().await.unwrap();
    assert_eq!(nb_global.name, "az1");
    assert!(nb_global.ipsec);
    assert_eq!(nb_global.nb_cfg, 0);

    nb_global.nb_cfg = 7;
    nb_global.name = "ignored".to_string();
    t.client.update_nb_global(&nb_global, &[NbGlobal::NB_CFG]).await.unwrap();
    let nb_global = t.client.get_nb_global().await.unwrap();
    assert_eq!(nb_global.nb_cfg, 7);
    assert_eq!(nb_global.name, "az1");
}

#[tokio::test]
async fn test_nb_global_must_be_unique() {
    let t = TestDb::new().await;
    t.seed(&NbGlobal::default()).await;
    let err = t.client.get_nb_global().await.unwrap_err();
    assert!(err.is_ambiguous());

    let empty = TestDb::new().await;
    empty.client.delete_nb_global().await.unwrap();
    let err = empty.client.get_nb_global().await.unwrap_err();
    assert!(err.is_not_found());
}
