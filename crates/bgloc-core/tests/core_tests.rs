use std::collections::BTreeMap;
use std::sync::Arc;

use bgloc_core::{
    Disposition, FieldMapTemplate, LocationId, LocationRecord, PostDecision, SyncConfig, DEFAULT_SYNC_THRESHOLD,
};

#[test]
fn test_location_record_creation() {
    let rec = LocationRecord::new(42, 1.0, 2.0).with_bearing(90.0).with_accuracy(5.0);
    assert!(rec.id.is_none());
    assert_eq!(rec.disposition, Disposition::Pending);
    assert_eq!(rec.bearing, Some(90.0));
}

#[test]
fn test_location_id_display() {
    assert_eq!(LocationId(12).to_string(), "12");
    assert_eq!(LocationId::from(5).as_i64(), 5);
}

#[test]
fn test_config_defaults() {
    let cfg = SyncConfig::builder().immediate_post_url("https://example.com/loc").build().unwrap();
    assert_eq!(cfg.sync_threshold(), DEFAULT_SYNC_THRESHOLD);
    assert!(cfg.http_headers().is_empty());
    assert!(cfg.has_valid_url());
    assert!(!cfg.has_valid_sync_url());
}

#[test]
fn test_config_carries_template_and_headers() {
    let mut fields = BTreeMap::new();
    fields.insert("lng".to_string(), "@longitude".to_string());
    let cfg = SyncConfig::builder()
        .header("X-Device", "abc")
        .template(Arc::new(FieldMapTemplate::new(fields)))
        .build()
        .unwrap();
    let payload = cfg.template().render(&LocationRecord::new(0, 3.0, 4.0)).unwrap();
    assert_eq!(payload["lng"], 4.0);
    assert_eq!(cfg.http_headers().get("X-Device").map(String::as_str), Some("abc"));
}

#[test]
fn test_post_decision_flag() {
    assert!(PostDecision::PostNow.should_attempt_immediate_post());
    assert!(!PostDecision::Defer.should_attempt_immediate_post());
    assert!(!PostDecision::PersistOnly.should_attempt_immediate_post());
    assert!(!PostDecision::Skip.should_attempt_immediate_post());
}
