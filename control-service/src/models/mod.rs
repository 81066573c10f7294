mod action;
mod audit;
mod identity;

pub use action::{ActionKind, ActionParams, ActionRequest, NormalizedAction};
pub use audit::{AuditEntry, AuditEntryResponse};
pub use identity::Identity;
