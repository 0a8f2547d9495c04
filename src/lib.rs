//! Workspace placeholder crate.
//!
//! Exposes the playback core behind a single dependency. Hosts that want the
//! whole stack enable the default `service` feature and use the re-exports
//! below instead of wiring `core-service`, `core-playback` and
//! `plugin-traits` individually.

#[cfg(feature = "service")]
pub use core_playback as playback;
#[cfg(feature = "service")]
pub use core_service as service;
#[cfg(feature = "service")]
pub use plugin_traits as plugins;
