use tabgroups::types::errors::*;

// === StoreError Tests ===

#[test]
fn store_error_display_variants() {
    assert_eq!(
        StoreError::Backend("disk full".to_string()).to_string(),
        "Store backend error: disk full"
    );
    assert_eq!(
        StoreError::Serialization("groups: expected a sequence".to_string()).to_string(),
        "Store serialization error: groups: expected a sequence"
    );
    assert_eq!(
        StoreError::Unavailable("session".to_string()).to_string(),
        "Store unavailable: session"
    );
}

// === BrowserError Tests ===

#[test]
fn browser_error_display_variants() {
    assert_eq!(
        BrowserError::Unsupported("tabs.hide".to_string()).to_string(),
        "Browser capability unsupported: tabs.hide"
    );
    assert_eq!(
        BrowserError::Call("Invalid tab ID: 9".to_string()).to_string(),
        "Browser call failed: Invalid tab ID: 9"
    );
    assert_eq!(BrowserError::TabNotFound(42).to_string(), "Browser tab not found: 42");
}

#[test]
fn browser_error_is_unsupported() {
    assert!(BrowserError::Unsupported("x".to_string()).is_unsupported());
    assert!(!BrowserError::Call("x".to_string()).is_unsupported());
    assert!(!BrowserError::TabNotFound(1).is_unsupported());
}

// === ConfigError Tests ===

#[test]
fn config_error_display_variants() {
    assert_eq!(ConfigError::Io("denied".to_string()).to_string(), "Config I/O error: denied");
    assert_eq!(ConfigError::Parse("line 1".to_string()).to_string(), "Config parse error: line 1");
    assert_eq!(
        ConfigError::Invalid("session_save_interval_secs must be positive".to_string()).to_string(),
        "Invalid config: session_save_interval_secs must be positive"
    );
}

// === CoreError Tests ===

#[test]
fn core_error_display_variants() {
    assert_eq!(CoreError::NotFound("group g1".to_string()).to_string(), "Not found: group g1");
    assert_eq!(
        CoreError::InvalidAssignment {
            tab_id: 7,
            group_id: "container-work".to_string()
        }
        .to_string(),
        "Tab 7 cannot be assigned to group container-work: container mismatch"
    );
    assert_eq!(
        CoreError::StoreUnavailable("durable".to_string()).to_string(),
        "Store unavailable: durable"
    );
    assert_eq!(
        CoreError::BrowserApiUnavailable("tabs.hide".to_string()).to_string(),
        "Browser API unavailable: tabs.hide"
    );
    assert_eq!(
        CoreError::InvalidRequest("missing name".to_string()).to_string(),
        "Invalid request: missing name"
    );
    assert_eq!(CoreError::NotLoaded.to_string(), "Group repository not loaded");
}

#[test]
fn core_error_wraps_store_error_transparently() {
    let err: CoreError = StoreError::Backend("locked".to_string()).into();
    assert!(matches!(err, CoreError::Store(_)));
    assert_eq!(err.to_string(), "Store backend error: locked");
}

#[test]
fn unsupported_browser_capability_becomes_api_unavailable() {
    let err: CoreError = BrowserError::Unsupported("contextualIdentities".to_string()).into();
    assert!(matches!(err, CoreError::BrowserApiUnavailable(ref what) if what == "contextualIdentities"));
}

#[test]
fn missing_tab_becomes_not_found() {
    let err: CoreError = BrowserError::TabNotFound(5).into();
    assert!(matches!(err, CoreError::NotFound(ref what) if what == "tab 5"));
}

#[test]
fn rejected_browser_call_stays_wrapped() {
    let err: CoreError = BrowserError::Call("boom".to_string()).into();
    assert!(matches!(err, CoreError::Browser(BrowserError::Call(_))));
    assert_eq!(err.to_string(), "Browser call failed: boom");
}

#[test]
fn core_error_implements_error_trait() {
    let err: Box<dyn std::error::Error> = Box::new(CoreError::NotFound("x".to_string()));
    assert!(err.source().is_none());
}
