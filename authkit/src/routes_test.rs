use super::*;

#[test]
fn default_table_classifies_login_and_dashboard() {
    let table = RouteTable::default();
    assert_eq!(table.classify("/login"), RouteClass::Public);
    assert_eq!(table.classify("/signup"), RouteClass::Public);
    assert_eq!(table.classify("/dashboard"), RouteClass::Private);
    assert_eq!(table.classify("/"), RouteClass::Private);
    assert_eq!(table.classify("/orders/42"), RouteClass::Private);
}

#[test]
fn prefix_matching_respects_segments() {
    let table = RouteTable::default();
    assert!(table.is_public("/login/reset"));
    assert!(table.is_public("/login/"));
    assert!(!table.is_public("/loginx"));
    assert!(!table.is_public("/admin/login"));
}

#[test]
fn query_and_fragment_are_ignored() {
    let table = RouteTable::default();
    assert!(table.is_public("/login?next=%2Fdashboard"));
    assert!(table.is_public("/signup#terms"));
}

#[test]
fn static_assets_are_never_gated() {
    let table = RouteTable::default();
    for path in ["/pkg/app.wasm", "/assets/logo", "/favicon.ico", "/robots.txt", "/styles/site.CSS", "/img/chart.png?v=3"] {
        assert_eq!(table.classify(path), RouteClass::StaticAsset, "{path}");
        assert_eq!(table.access(path, false), Access::Allow);
    }
    assert_eq!(table.classify("/.well-known"), RouteClass::Private);
    assert_eq!(table.classify("/reports/2024.q1"), RouteClass::Private);
}

#[test]
fn access_follows_decision_table() {
    let table = RouteTable::default();
    assert_eq!(table.access("/login", true), Access::Redirect("/dashboard".into()));
    assert_eq!(table.access("/dashboard", true), Access::Allow);
    assert_eq!(table.access("/login", false), Access::Allow);
    assert_eq!(table.access("/dashboard", false), Access::Redirect("/login".into()));
}

#[test]
fn custom_table_validates_entries() {
    let table = RouteTable::new(["/auth/", "/welcome"], "/auth/login", "/home").unwrap();
    assert!(table.is_public("/auth"));
    assert_eq!(table.public_prefixes(), ["/auth".to_owned(), "/welcome".to_owned()]);
    assert_eq!(table.public_entry(), "/auth/login");
    assert_eq!(table.private_entry(), "/home");
}

#[test]
fn rejects_relative_prefix() {
    let err = RouteTable::new(["login"], "/login", "/dashboard").unwrap_err();
    assert_eq!(err, RouteTableError::NotAbsolute("login".into()));
}

#[test]
fn rejects_public_entry_outside_public_set() {
    let err = RouteTable::new(["/signup"], "/login", "/dashboard").unwrap_err();
    assert_eq!(err, RouteTableError::EntryNotPublic("/login".into()));
}

#[test]
fn rejects_private_entry_inside_public_set() {
    let err = RouteTable::new(["/login", "/dashboard"], "/login", "/dashboard").unwrap_err();
    assert_eq!(err, RouteTableError::PrivateEntryIsPublic("/dashboard".into()));
}

#[test]
fn root_prefix_only_matches_root() {
    let table = RouteTable::new(["/", "/login"], "/login", "/dashboard").unwrap();
    assert!(table.is_public("/"));
    assert!(!table.is_public("/dashboard"));
}
