use crate::error::Result;
use crate::events::{CycleRequest, HotkeyBinding, WindowBounds, WindowHandle};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Channel the platform layer pushes hotkey notifications into
pub type HotkeySink = mpsc::UnboundedSender<CycleRequest>;

/// Style and show state of a window, read in one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowState {
    pub visible: bool,
    pub minimized: bool,
    /// Has an owner window (dialogs, tool popups)
    pub owned: bool,
    /// Carries the tool-window extended style
    pub tool_window: bool,
}

/// Process and thread that created a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowOwner {
    pub process_id: u32,
    pub thread_id: u32,
}

/// Capability boundary over the host windowing subsystem.
///
/// Every call may fail or return stale data: windows close between calls and
/// protected processes deny metadata queries. Callers treat failures against a
/// stale handle as an ordinary outcome. Implementations must be cheap to call
/// from the cycle loop thread; none of these methods block for long.
pub trait WindowSystem: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// All top-level windows, in OS order
    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>>;

    fn window_title(&self, window: WindowHandle) -> Result<String>;

    fn window_class(&self, window: WindowHandle) -> Result<String>;

    fn window_owner(&self, window: WindowHandle) -> Result<WindowOwner>;

    /// Full executable path of a process
    fn process_image_path(&self, process_id: u32) -> Result<String>;

    fn window_state(&self, window: WindowHandle) -> Result<WindowState>;

    fn window_bounds(&self, window: WindowHandle) -> Result<WindowBounds>;

    /// Whether the handle still names a live window
    fn is_window(&self, window: WindowHandle) -> bool;

    fn foreground_window(&self) -> Option<WindowHandle>;

    /// Ask the OS to move foreground focus. `true` only means the request was
    /// accepted; callers must verify with [`WindowSystem::foreground_window`].
    fn request_foreground(&self, window: WindowHandle) -> bool;

    /// Non-blocking restore of a minimized window
    fn restore_window(&self, window: WindowHandle) -> bool;

    /// Flash the taskbar button of a window
    fn flash_window(&self, window: WindowHandle);

    /// OS id of the calling thread
    fn current_thread_id(&self) -> u32;

    /// Attach (or detach) the input queue of `thread_id` to `target_thread_id`
    fn attach_thread_input(&self, thread_id: u32, target_thread_id: u32, attach: bool) -> bool;

    /// Create the message-receiving surface that delivers hotkey presses into `sink`
    fn create_hotkey_surface(&self, sink: HotkeySink) -> Result<()>;

    fn register_hotkey(&self, id: i32, binding: HotkeyBinding, no_repeat: bool) -> Result<()>;

    fn unregister_hotkey(&self, id: i32) -> Result<()>;
}

/// Factory function to create an appropriate window system based on the dry_run flag
pub fn create_window_system(dry_run: bool) -> Result<Arc<dyn WindowSystem>> {
    if dry_run {
        return Ok(Arc::new(super::dry_run::DryRunWindowSystem::new()));
    }

    #[cfg(windows)]
    {
        Ok(Arc::new(super::win32::Win32WindowSystem::new()))
    }

    #[cfg(not(windows))]
    {
        Err(crate::error::CyclerError::ServiceUnavailable(
            "оконная система поддерживается только на Windows, используйте --dry-run".to_string(),
        ))
    }
}
