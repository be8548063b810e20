//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. `desktop-shims` (default) pulls in the `reqwest` backed
//! `HttpClient` and the HTTP media provider factory next to `core-sync`, so a
//! host can depend on `media-index-workspace` alone.
