//! Supervisor dashboard logic.
//!
//! Pure view-layer computations over a record list: per-student absence
//! tallies, threshold tiers, search filtering, change notifications, and
//! file exports. Nothing here owns authoritative state — deletes and
//! clears are relayed to the record service by the caller.

pub mod export;
pub mod notify;
pub mod roster;
