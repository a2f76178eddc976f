use sqlbatch_core::Batchable;
use sqlbatch_macros::Batchable;

#[derive(Batchable)]
struct AuditEvent {
    kind: String,
    amount: f64,
    seen: bool,
}

fn main() {
    assert_eq!(AuditEvent::TABLE, "audit_events");
    assert!(AuditEvent::KEY_COLUMNS.is_empty());
    // Insert-only types have no key spec.
    assert!(AuditEvent::key_spec().is_err());
}
