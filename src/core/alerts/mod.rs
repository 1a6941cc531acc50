// Alert records and the rules that decide when they fire.
//
// Architecture:
// - model.rs: Alert configuration, inputs and backup payloads
// - triggers.rs: Pure fire-decision logic (time matching, debounce, one-shot)
// - store.rs: Record store trait and JSON-backed implementation
// - service.rs: CRUD that keeps scheduler watches in step with the store

pub mod model;
pub mod service;
pub mod store;
pub mod triggers;
