pub mod cycler;
pub mod focus_controller;
pub mod hotkey_listener;
pub mod matcher;
pub mod window_enumerator;
pub mod window_orderer;
pub mod window_system;

pub use cycler::WindowCycler;
pub use window_system::create_window_system;
