//! End-to-end tests over the embedded catalog: load, validate, resolve, and
//! materialize every built-in module.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use aiserver_common::config::{CatalogConfig, GlobalConfig};
use aiserver_common::error::ErrorCode;
use aiserver_registry::{Materializer, Registry};

// ── Catalog ───────────────────────────────────────────────────────

#[test]
fn every_builtin_module_materializes_with_defaults() {
    let registry = Registry::load(&CatalogConfig::default()).expect("load");
    let materializer = Materializer::new(Vec::<(String, String)>::new(), &GlobalConfig::default());
    for module in registry.modules() {
        let manifest = materializer
            .materialize(module)
            .unwrap_or_else(|e| panic!("{} failed: {e}", module.name));
        assert!(manifest.container_name.starts_with("ai-"));
        assert!(!manifest.fingerprint.is_empty());
    }
}

#[test]
fn every_builtin_chain_is_acyclic() {
    let registry = Registry::load(&CatalogConfig::default()).expect("load");
    for module in registry.modules() {
        registry
            .graph()
            .ensure_acyclic_from(&module.name)
            .expect("acyclic");
        let chain = registry.resolve_chain(&module.name).expect("chain");
        assert!(!chain.contains(&module.name));
    }
}

// ── Overrides ─────────────────────────────────────────────────────

#[test]
fn user_override_changes_port_and_bind_flows_through() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("oneapi.json"),
        r#"{"name":"oneapi","variables":{"ONEAPI_PORT":"${ONEAPI_PORT:28080}"}}"#,
    )
    .expect("write");
    let catalog = CatalogConfig {
        builtin_dir: None,
        user_dir: Some(dir.path().to_path_buf()),
    };
    let registry = Registry::load(&catalog).expect("load");
    let config = GlobalConfig {
        bind_address: "0.0.0.0".into(),
        ..GlobalConfig::default()
    };
    let manifest = Materializer::new([("TZ", "UTC")], &config)
        .materialize(registry.require("oneapi").expect("oneapi"))
        .expect("materialize");
    assert_eq!(manifest.ports[0].host_port, 28080);
    assert_eq!(manifest.ports[0].bind_address, "0.0.0.0");
    assert_eq!(manifest.env["TZ"], "UTC");
}

#[test]
fn override_introducing_cycle_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("postgres.json"),
        r#"{"name":"postgres","dependsOn":["n8n"]}"#,
    )
    .expect("write");
    let registry = Registry::load(&CatalogConfig {
        builtin_dir: None,
        user_dir: Some(dir.path().to_path_buf()),
    })
    .expect("load");
    let issues = registry.validate();
    assert!(
        issues.iter().any(|i| i.starts_with("E_DEP_CYCLE: n8n")),
        "got: {issues:?}"
    );
    let err = registry.graph().ensure_acyclic_from("n8n").unwrap_err();
    assert_eq!(err.code(), ErrorCode::DepCycle);
    assert!(err.to_string().contains("n8n -> postgres -> n8n"), "got: {err}");
}

#[test]
fn unrelated_user_override_keeps_builtin_template_dir() {
    let builtin = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        builtin.path().join("web.json"),
        r#"{"name":"web","type":"feature","dependsOn":["cache"],"template":{"file":"web.yaml"}}"#,
    )
    .expect("write");
    std::fs::write(builtin.path().join("web.yaml"), "image: nginx:1.25\n").expect("write");
    std::fs::write(
        builtin.path().join("cache.json"),
        r#"{"name":"cache","type":"basic","image":"redis"}"#,
    )
    .expect("write");
    let user = tempfile::tempdir().expect("tempdir");
    std::fs::write(user.path().join("web.json"), r#"{"name":"web","dependsOn":[]}"#).expect("write");

    let registry = Registry::load(&CatalogConfig {
        builtin_dir: Some(builtin.path().to_path_buf()),
        user_dir: Some(user.path().to_path_buf()),
    })
    .expect("load");
    let web = registry.require("web").expect("web");
    assert!(web.depends_on.is_empty());
    let manifest = Materializer::new(Vec::<(String, String)>::new(), &GlobalConfig::default())
        .materialize(web)
        .expect("materialize");
    assert_eq!(manifest.image, "nginx:1.25");
}

#[test]
fn user_override_of_template_resolves_in_user_dir() {
    let builtin = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        builtin.path().join("web.json"),
        r#"{"name":"web","type":"feature","template":{"file":"web.yaml"}}"#,
    )
    .expect("write");
    std::fs::write(builtin.path().join("web.yaml"), "image: nginx:1.25\n").expect("write");
    let user = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        user.path().join("web.json"),
        r#"{"name":"web","template":{"file":"web.yaml"}}"#,
    )
    .expect("write");
    std::fs::write(user.path().join("web.yaml"), "image: caddy:2\n").expect("write");

    let registry = Registry::load(&CatalogConfig {
        builtin_dir: Some(builtin.path().to_path_buf()),
        user_dir: Some(user.path().to_path_buf()),
    })
    .expect("load");
    let manifest = Materializer::new(Vec::<(String, String)>::new(), &GlobalConfig::default())
        .materialize(registry.require("web").expect("web"))
        .expect("materialize");
    assert_eq!(manifest.image, "caddy:2");
}
