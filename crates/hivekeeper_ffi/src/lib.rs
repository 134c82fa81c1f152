//! Flutter-facing bindings for the HiveKeeper core.

pub mod api;
