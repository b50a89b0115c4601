//! Repository layer — the three persisted stores behind the reminder schedule.
//!
//! - `medicine`: medicine definitions and their dose slots
//! - `dose_history`: latest status per `{instance_id}-{dose_id}`
//! - `deleted_instance`: soft-deleted reminder instance ids
//!
//! Dates and times are stored as written; interpretation (and tolerance of
//! malformed values) belongs to the schedule module.

mod deleted_instance;
mod dose_history;
mod medicine;

// Re-export all public items from sub-modules
pub use deleted_instance::*;
pub use dose_history::*;
pub use medicine::*;
