// In-app notification pipeline.
//
// - scheduler.rs: Decides when watched alerts fire
// - manager.rs: Holds the single active notification and publishes events
// - events.rs: Event taxonomy and listener seam

pub mod events;
pub mod manager;
pub mod scheduler;
