use camino::{Utf8Path, Utf8PathBuf};

use cfgtree_schema::TemplateRegistry;
use cfgtree_store::{CfgPath, Layer, Marker, Store};

use crate::{do_commit, CfgNode, CommitOpts, CommitState, CommitStatus, CommitTree};

struct Fixture {
    _dir: tempfile::TempDir,
    store: Store,
    registry: TemplateRegistry,
    witness: Utf8PathBuf,
}

/// Template tree for the commit scenarios: `interfaces ethernet` is a
/// tag node (priority 400) whose values carry a multi-leaf `address`
/// (priority 500); `system host-name` is a single leaf with a default
/// (priority 300). Create/delete actions append to a witness file.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
    let witness = root.join("witness.log");

    let tmpl = root.join("templates");
    let eth = tmpl.join("interfaces/ethernet");
    std::fs::create_dir_all(eth.join("node.tag/address")).unwrap();
    std::fs::write(
        eth.join("node.def"),
        "tag:\ntype: txt\npriority: 400\n\
         create: echo eth-create-$VAR(@) >> \"$WITNESS\"\n\
         delete: echo eth-delete-$VAR(@) >> \"$WITNESS\"\n",
    )
    .unwrap();
    std::fs::write(
        eth.join("node.tag/address/node.def"),
        "multi:\ntype: ipv4net\npriority: 500\n\
         create: echo addr-create-$VAR(@) >> \"$WITNESS\"\n\
         delete: echo addr-delete-$VAR(@) >> \"$WITNESS\"\n",
    )
    .unwrap();
    let host = tmpl.join("system/host-name");
    std::fs::create_dir_all(&host).unwrap();
    std::fs::write(
        host.join("node.def"),
        "type: txt\ndefault: \"router\"\npriority: 300\n",
    )
    .unwrap();

    let store = Store::new(
        root.join("active"),
        root.join("changes"),
        root.join("work"),
        root.join("tmp"),
    );
    store.setup_session().unwrap();

    Fixture {
        _dir: dir,
        store,
        registry: TemplateRegistry::new(tmpl),
        witness,
    }
}

fn p(comps: &[&str]) -> CfgPath {
    CfgPath::from(comps)
}

fn opts(fx: &Fixture) -> CommitOpts {
    CommitOpts {
        base_env: vec![("WITNESS".to_owned(), fx.witness.to_string())],
        ..Default::default()
    }
}

fn witness_lines(fx: &Fixture) -> Vec<String> {
    std::fs::read_to_string(&fx.witness)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

fn set_eth0_address(fx: &Fixture) {
    let eth0 = p(&["interfaces", "ethernet", "eth0"]);
    fx.store.add_node(&eth0).unwrap();
    let addr = eth0.join("address");
    fx.store.add_node(&addr).unwrap();
    fx.store
        .write_values(&addr, &["10.0.0.1/24".to_owned()])
        .unwrap();
    fx.store.mark_changed_with_ancestors(&addr).unwrap();
}

#[test]
fn diff_states() {
    let fx = fixture();
    set_eth0_address(&fx);
    // seed an active-only node so the diff also sees a deletion
    let host = p(&["system", "host-name"]);
    std::fs::create_dir_all(host.storage_path(fx.store.active_root())).unwrap();
    std::fs::write(
        host.storage_path(fx.store.active_root()).join("node.val"),
        "gw1\n",
    )
    .unwrap();

    let active = CfgNode::read_root(&fx.store, &fx.registry, Layer::Active).unwrap();
    let working = CfgNode::read_root(&fx.store, &fx.registry, Layer::Working).unwrap();
    let tree = CommitTree::build(&active, &working).unwrap();

    let mut added = Vec::new();
    let mut deleted = Vec::new();
    for n in &tree.nodes {
        match n.state {
            CommitState::Added => added.push(n.path.to_string()),
            CommitState::Deleted => deleted.push(n.path.to_string()),
            _ => {}
        }
    }
    assert!(added.contains(&"interfaces ethernet eth0".to_owned()));
    assert!(added.contains(&"interfaces ethernet eth0 address".to_owned()));
    assert!(deleted.contains(&"system host-name".to_owned()));
}

#[test]
fn commit_creates_in_priority_order() {
    let fx = fixture();
    set_eth0_address(&fx);

    let outcome = do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert!(outcome.failed.is_empty());

    // 400 before 500 on the update path
    assert_eq!(
        witness_lines(&fx),
        ["eth-create-eth0", "addr-create-10.0.0.1/24"]
    );

    // published active carries the new subtree
    let addr = p(&["interfaces", "ethernet", "eth0", "address"]);
    assert_eq!(
        fx.store.read_values(&addr, Layer::Active).unwrap().unwrap(),
        vec!["10.0.0.1/24".to_owned()]
    );
    // session state reset, unsaved set
    assert!(!fx.store.session_changed());
    assert!(fx.store.session_unsaved());
}

#[test]
fn commit_deletes_leaf_most_first() {
    let fx = fixture();
    set_eth0_address(&fx);
    do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    std::fs::remove_file(&fx.witness).unwrap();

    // drop the whole ethernet subtree from the session
    fx.store
        .remove_subtree(&p(&["interfaces", "ethernet"]))
        .unwrap();
    fx.store
        .mark_changed_with_ancestors(&p(&["interfaces"]))
        .unwrap();

    let outcome = do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);

    // 500 before 400 on the delete path
    assert_eq!(
        witness_lines(&fx),
        ["addr-delete-10.0.0.1/24", "eth-delete-eth0"]
    );
    assert!(!fx
        .store
        .exists(&p(&["interfaces", "ethernet"]), Layer::Active));
}

#[test]
fn reordered_multi_values_recreate_in_order() {
    let fx = fixture();
    let addr = p(&["interfaces", "ethernet", "eth0", "address"]);
    fx.store.add_node(&addr).unwrap();
    fx.store
        .write_values(
            &addr,
            &["10.0.0.1/32".to_owned(), "10.0.0.2/32".to_owned(), "10.0.0.3/32".to_owned()],
        )
        .unwrap();
    fx.store.mark_changed_with_ancestors(&addr).unwrap();
    do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    std::fs::remove_file(&fx.witness).unwrap();

    // [a, b, c] -> [a, c, b]
    fx.store
        .write_values(
            &addr,
            &["10.0.0.1/32".to_owned(), "10.0.0.3/32".to_owned(), "10.0.0.2/32".to_owned()],
        )
        .unwrap();
    fx.store.mark_changed_with_ancestors(&addr).unwrap();
    let outcome = do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);

    // the delete pass drops the moved values in their old order, the
    // update pass re-creates them in the new order
    assert_eq!(
        witness_lines(&fx),
        [
            "addr-delete-10.0.0.2/32",
            "addr-delete-10.0.0.3/32",
            "addr-create-10.0.0.3/32",
            "addr-create-10.0.0.2/32",
        ]
    );
}

#[test]
fn failed_subtree_keeps_active_and_session() {
    let fx = fixture();
    // make the address create fail while the interface create succeeds
    let addr_def = fx
        .registry
        .root()
        .join("interfaces/ethernet/node.tag/address/node.def");
    std::fs::write(
        &addr_def,
        "multi:\ntype: ipv4net\npriority: 500\ncreate: exit 1\n",
    )
    .unwrap();
    set_eth0_address(&fx);

    let outcome = do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    assert_eq!(outcome.status, CommitStatus::Partial);
    assert_eq!(outcome.failed, ["interfaces ethernet eth0 address"]);

    // the interface landed in active, the failed address did not
    assert!(fx
        .store
        .exists(&p(&["interfaces", "ethernet", "eth0"]), Layer::Active));
    assert!(!fx
        .store
        .exists(&p(&["interfaces", "ethernet", "eth0", "address"]), Layer::Active));
    // the session still carries the failed subtree as a pending change
    assert!(fx
        .store
        .exists(&p(&["interfaces", "ethernet", "eth0", "address"]), Layer::Working));
    assert!(fx.store.session_changed());
    assert!(fx.store.session_unsaved());
}

#[test]
fn deactivated_subtree_commits_as_delete() {
    let fx = fixture();
    set_eth0_address(&fx);
    do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    std::fs::remove_file(&fx.witness).unwrap();

    let eth0 = p(&["interfaces", "ethernet", "eth0"]);
    fx.store.mark(&eth0, Marker::Deactivated).unwrap();
    fx.store.mark_changed_with_ancestors(&eth0).unwrap();

    let outcome = do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert_eq!(
        witness_lines(&fx),
        ["addr-delete-10.0.0.1/24", "eth-delete-eth0"]
    );
    // the node stays in the session view, still deactivated
    assert!(fx.store.exists(&eth0, Layer::Working));
    assert!(fx.store.marked(&eth0, Marker::Deactivated, Layer::Working));
}

#[test]
fn no_change_commit_succeeds() {
    let fx = fixture();
    let outcome = do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert!(witness_lines(&fx).is_empty());
}

#[test]
fn priority_inversion_raised_to_parent() {
    let fx = fixture();
    // give the child a priority lower than its parent subtree's
    let addr_def = fx
        .registry
        .root()
        .join("interfaces/ethernet/node.tag/address/node.def");
    std::fs::write(&addr_def, "multi:\ntype: ipv4net\npriority: 100\n").unwrap();
    set_eth0_address(&fx);

    // the commit must still create parent before child
    let outcome = do_commit(&fx.store, &fx.registry, &opts(&fx)).unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert_eq!(witness_lines(&fx), ["eth-create-eth0"]);
    assert!(fx
        .store
        .exists(&p(&["interfaces", "ethernet", "eth0", "address"]), Layer::Active));
}
