//! WindowSystem service: responsibility and boundaries
//!
//! This module and its submodules are the ONLY place that talks to the host
//! windowing subsystem: enumeration, metadata queries, focus requests,
//! thread-input attachment and global hotkey registration. It MUST NOT contain
//! filtering, ordering or retry policy; those live in WindowEnumerator,
//! WindowOrderer and FocusController.

mod dry_run;
pub mod fake;
mod r#trait;
#[cfg(windows)]
mod win32;

pub use self::r#trait::{create_window_system, HotkeySink, WindowOwner, WindowState, WindowSystem};
