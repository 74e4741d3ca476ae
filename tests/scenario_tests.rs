//! End-to-end scenarios over the session facade: edit, commit with
//! per-node actions, partial failure, the commit lock, and effective
//! queries during commit.

use camino::{Utf8Path, Utf8PathBuf};

use cfgtree::Cstore;
use cfgtree_commit::{do_commit, run_hook_dir, CommitLock, CommitOpts, CommitStatus};
use cfgtree_schema::TemplateRegistry;
use cfgtree_store::{CfgPath, Layer, Store};

struct Fixture {
    _dir: tempfile::TempDir,
    root: Utf8PathBuf,
    cstore: Cstore,
    witness: Utf8PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
    let witness = root.join("witness.log");

    let tmpl = root.join("templates");
    let eth = tmpl.join("interfaces/ethernet");
    std::fs::create_dir_all(eth.join("node.tag/address")).unwrap();
    std::fs::write(
        eth.join("node.def"),
        format!(
            "tag:\ntype: txt\npriority: 400\n\
             create: echo eth-create-$VAR(@) >> {witness}\n\
             delete: echo eth-delete-$VAR(@) >> {witness}\n"
        ),
    )
    .unwrap();
    std::fs::write(
        eth.join("node.tag/address/node.def"),
        format!(
            "multi:\ntype: ipv4net\npriority: 500\n\
             create: echo addr-create-$VAR(@) >> {witness}\n\
             delete: echo addr-delete-$VAR(@) >> {witness}\n"
        ),
    )
    .unwrap();
    let host = tmpl.join("system/host-name");
    std::fs::create_dir_all(&host).unwrap();
    std::fs::write(host.join("node.def"), "type: txt\ndefault: \"router\"\n").unwrap();

    let store = Store::new(
        root.join("active"),
        root.join("changes"),
        root.join("work"),
        root.join("tmp"),
    );
    let cstore = Cstore::new(store, TemplateRegistry::new(tmpl));
    cstore.setup_session().unwrap();
    Fixture {
        _dir: dir,
        root,
        cstore,
        witness,
    }
}

fn p(comps: &[&str]) -> CfgPath {
    CfgPath::from(comps)
}

fn witness_lines(fx: &Fixture) -> Vec<String> {
    std::fs::read_to_string(&fx.witness)
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

#[test]
fn scenario_set_commit_then_delete_commit() {
    let fx = fixture();
    let cs = &fx.cstore;

    // scenario 1: create on an empty active
    cs.set(&["interfaces", "ethernet", "eth0", "address", "10.0.0.1/24"])
        .unwrap();
    let outcome = cs.commit().unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert_eq!(
        witness_lines(&fx),
        ["eth-create-eth0", "addr-create-10.0.0.1/24"]
    );
    assert_eq!(
        cs.get_values(&p(&["interfaces", "ethernet", "eth0", "address"]), true)
            .unwrap()
            .unwrap(),
        vec!["10.0.0.1/24".to_owned()]
    );
    assert!(!cs.session_changed());
    assert!(cs.session_unsaved());

    // scenario 2: deleting the only value dissolves the tag chain and
    // deletes run leaf-most first
    std::fs::remove_file(&fx.witness).unwrap();
    cs.delete(&["interfaces", "ethernet", "eth0", "address", "10.0.0.1/24"])
        .unwrap();
    assert!(!cs.cfg_exists(&p(&["interfaces", "ethernet"]), false));
    let outcome = cs.commit().unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert_eq!(
        witness_lines(&fx),
        ["addr-delete-10.0.0.1/24", "eth-delete-eth0"]
    );
    assert!(!cs.cfg_exists(&p(&["interfaces", "ethernet"]), true));
}

#[test]
fn scenario_deactivate_commits_as_delete() {
    let fx = fixture();
    let cs = &fx.cstore;
    cs.set(&["interfaces", "ethernet", "eth0", "address", "10.0.0.1/24"])
        .unwrap();
    cs.commit().unwrap();
    std::fs::remove_file(&fx.witness).unwrap();

    cs.deactivate(&["interfaces", "ethernet", "eth0"]).unwrap();
    let addr = p(&["interfaces", "ethernet", "eth0", "address"]);
    assert!(!cs.cfg_exists(&addr, false));
    assert!(cs.cfg_exists_da(&addr, false, true));

    // activate before commit restores the subtree to unchanged
    cs.activate(&["interfaces", "ethernet", "eth0"]).unwrap();
    assert!(cs.cfg_exists(&addr, false));

    cs.deactivate(&["interfaces", "ethernet", "eth0"]).unwrap();
    let outcome = cs.commit().unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert_eq!(
        witness_lines(&fx),
        ["addr-delete-10.0.0.1/24", "eth-delete-eth0"]
    );
    // the subtree survives in the session, still deactivated
    assert!(cs.cfg_exists_da(&p(&["interfaces", "ethernet", "eth0"]), false, true));
}

#[test]
fn scenario_commit_lock_is_exclusive() {
    let fx = fixture();
    let cs = &fx.cstore;
    cs.set(&["system", "host-name", "gw1"]).unwrap();

    let lock = CommitLock::acquire(&cs.store().commit_lock_file())
        .unwrap()
        .expect("lock is free");
    let err = cs.commit().unwrap_err();
    assert!(err
        .to_string()
        .starts_with("Configuration system temporarily locked"));
    // nothing was modified
    assert!(cs.session_changed());
    assert!(!cs.cfg_exists(&p(&["system", "host-name"]), true));

    drop(lock);
    assert_eq!(cs.commit().unwrap().status, CommitStatus::Success);
}

#[test]
fn effective_tracks_committed_markers() {
    let fx = fixture();
    let cs = &fx.cstore;
    // one committed baseline node, one pending add, one pending delete
    cs.set(&["interfaces", "ethernet", "eth0"]).unwrap();
    cs.commit().unwrap();
    cs.set(&["interfaces", "ethernet", "eth1"]).unwrap();
    cs.delete(&["interfaces", "ethernet", "eth0"]).unwrap();

    let eth0 = p(&["interfaces", "ethernet", "eth0"]);
    let eth1 = p(&["interfaces", "ethernet", "eth1"]);

    // before any commit processing: the delete has not been applied, the
    // add not yet committed
    assert!(cs.effective(&eth0).unwrap());
    assert!(!cs.effective(&eth1).unwrap());

    // mid-commit state: both applied
    cs.store().mark_committed(&eth0, true).unwrap();
    cs.store().mark_committed(&eth1, false).unwrap();
    assert!(!cs.effective(&eth0).unwrap());
    assert!(cs.effective(&eth1).unwrap());

    // the tag node is effective while any tag value is
    assert!(cs.effective(&p(&["interfaces", "ethernet"])).unwrap());

    cs.store().clear_committed_markers().unwrap();
}

#[test]
fn partial_commit_publishes_only_succeeded_subtrees() {
    let fx = fixture();
    let cs = &fx.cstore;
    // a failing create for the address subtree only
    std::fs::write(
        fx.root
            .join("templates/interfaces/ethernet/node.tag/address/node.def"),
        "multi:\ntype: ipv4net\npriority: 500\ncreate: exit 1\n",
    )
    .unwrap();
    cs.set(&["interfaces", "ethernet", "eth0", "address", "10.0.0.1/24"])
        .unwrap();

    let outcome = cs.commit().unwrap();
    assert_eq!(outcome.status, CommitStatus::Partial);
    assert!(cs.cfg_exists(&p(&["interfaces", "ethernet", "eth0"]), true));
    assert!(!cs.cfg_exists(&p(&["interfaces", "ethernet", "eth0", "address"]), true));
    // the failed subtree stays pending in the session
    assert!(cs.cfg_exists(&p(&["interfaces", "ethernet", "eth0", "address"]), false));
    assert!(cs.session_changed());
    assert!(cs.session_unsaved());
}

#[test]
fn post_commit_hooks_see_commit_status() {
    let fx = fixture();
    let hook_dir = fx.root.join("post-hooks");
    std::fs::create_dir_all(&hook_dir).unwrap();
    let hook = hook_dir.join("10-record");
    std::fs::write(
        &hook,
        format!("#!/bin/sh\necho \"status=$COMMIT_STATUS\" >> {}\n", fx.witness),
    )
    .unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let cs = &fx.cstore;
    cs.set(&["system", "host-name", "gw1"]).unwrap();
    let opts = CommitOpts {
        base_env: Vec::new(),
        post_hook_dir: Some(hook_dir.clone()),
        ..Default::default()
    };
    let outcome = do_commit(cs.store(), cs.registry(), &opts).unwrap();
    assert_eq!(outcome.status, CommitStatus::Success);
    assert!(witness_lines(&fx).contains(&"status=SUCCESS".to_owned()));

    // run_hook_dir ignores a missing directory
    run_hook_dir(Utf8Path::new("/nonexistent/hooks.d"), &[]);
}

#[test]
fn working_view_reads_through_to_active() {
    let fx = fixture();
    let cs = &fx.cstore;
    cs.set(&["system", "host-name", "gw1"]).unwrap();
    cs.commit().unwrap();

    // a fresh session over the same roots sees the committed config
    let store = Store::new(
        fx.root.join("active"),
        fx.root.join("changes2"),
        fx.root.join("work2"),
        fx.root.join("tmp2"),
    );
    let cs2 = Cstore::new(store, TemplateRegistry::new(fx.root.join("templates")));
    cs2.setup_session().unwrap();
    assert_eq!(
        cs2.get_value(&p(&["system", "host-name"]), false)
            .unwrap()
            .as_deref(),
        Some("gw1")
    );
    assert!(!cs2.session_changed());
    cs2.teardown_session().unwrap();
    assert!(!cs2.in_session());
    assert!(cs.store().exists(&p(&["system"]), Layer::Active));
}
