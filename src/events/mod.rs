pub mod hotkey;
pub mod window;

pub use hotkey::{CycleRequest, CycleSource, HotkeyBinding, Modifiers, VirtualKey};
pub use window::{ActivationFailure, WindowBounds, WindowHandle, WindowRecord};
