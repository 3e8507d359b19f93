use super::r#trait::{HotkeySink, WindowOwner, WindowState, WindowSystem};
use crate::cycler_error;
use crate::error::{CyclerError, Result};
use crate::events::{CycleRequest, HotkeyBinding, WindowBounds, WindowHandle};
use crate::trace_if_enabled;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;

/// Поток, которому принадлежит "наш" процесс в эмуляции
pub const FAKE_OWN_THREAD: u32 = 1;

/// Window in the in-memory inventory. A `None` field makes the matching
/// query fail, the way a protected process denies access.
#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub handle: WindowHandle,
    pub title: Option<String>,
    pub class_name: Option<String>,
    pub owner: Option<WindowOwner>,
    pub image_path: Option<String>,
    pub state: Option<WindowState>,
    pub bounds: Option<WindowBounds>,
}

impl FakeWindow {
    pub fn new(raw: u64, title: &str) -> Self {
        Self {
            handle: WindowHandle::new(raw),
            title: Some(title.to_string()),
            class_name: Some(String::new()),
            owner: Some(WindowOwner {
                process_id: raw as u32,
                thread_id: 100 + raw as u32,
            }),
            image_path: Some(String::new()),
            state: Some(WindowState {
                visible: true,
                ..WindowState::default()
            }),
            bounds: Some(WindowBounds::new(0, 0, 800, 600)),
        }
    }

    pub fn with_class(mut self, class_name: &str) -> Self {
        self.class_name = Some(class_name.to_string());
        self
    }

    pub fn with_image(mut self, path: &str) -> Self {
        self.image_path = Some(path.to_string());
        self
    }

    #[cfg(test)]
    pub fn with_owner(mut self, process_id: u32, thread_id: u32) -> Self {
        self.owner = Some(WindowOwner {
            process_id,
            thread_id,
        });
        self
    }

    pub fn at(mut self, left: i32, top: i32) -> Self {
        let (width, height) = self
            .bounds
            .map(|b| (b.width(), b.height()))
            .unwrap_or((800, 600));
        self.bounds = Some(WindowBounds::new(left, top, left + width, top + height));
        self
    }

    pub fn minimized(mut self) -> Self {
        if let Some(state) = self.state.as_mut() {
            state.minimized = true;
        }
        self
    }

    pub fn hidden(mut self) -> Self {
        if let Some(state) = self.state.as_mut() {
            state.visible = false;
        }
        self
    }

    pub fn owned(mut self) -> Self {
        if let Some(state) = self.state.as_mut() {
            state.owned = true;
        }
        self
    }

    pub fn tool_window(mut self) -> Self {
        if let Some(state) = self.state.as_mut() {
            state.tool_window = true;
        }
        self
    }

    /// Процесс защищён: путь к образу недоступен
    #[cfg(test)]
    pub fn protected(mut self) -> Self {
        self.image_path = None;
        self
    }

    #[cfg(test)]
    pub fn without_title(mut self) -> Self {
        self.title = None;
        self
    }

    #[cfg(test)]
    pub fn without_state(mut self) -> Self {
        self.state = None;
        self
    }

    fn process_id(&self) -> Option<u32> {
        self.owner.map(|o| o.process_id)
    }
}

/// How the emulated OS treats foreground requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FocusPolicy {
    #[default]
    Allow,
    /// Запрос отклоняется
    #[cfg(test)]
    Deny,
    /// Запрос принят, но фокус не меняется
    #[cfg(test)]
    IgnoreSilently,
    /// Разрешено только при присоединённом вводе
    #[cfg(test)]
    AllowWhenAttached,
}

/// Recorded side effect, in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeCall {
    Restore(WindowHandle),
    RequestForeground(WindowHandle),
    Attach(u32, u32),
    Detach(u32, u32),
    Flash(WindowHandle),
}

impl fmt::Display for FakeCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FakeCall::Restore(window) => write!(f, "restore {}", window),
            FakeCall::RequestForeground(window) => write!(f, "foreground {}", window),
            FakeCall::Attach(thread, target) => write!(f, "attach {} -> {}", thread, target),
            FakeCall::Detach(thread, target) => write!(f, "detach {} -> {}", thread, target),
            FakeCall::Flash(window) => write!(f, "flash {}", window),
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    windows: Vec<FakeWindow>,
    foreground: Option<WindowHandle>,
    policy: FocusPolicy,
    enumeration_fails: bool,
    attach_fails: bool,
    attachments: Vec<(u32, u32)>,
    calls: Vec<FakeCall>,
    surface: Option<HotkeySink>,
    hotkeys: HashMap<i32, (HotkeyBinding, bool)>,
    reserved: Vec<HotkeyBinding>,
}

impl FakeState {
    fn window(&self, handle: WindowHandle) -> Option<&FakeWindow> {
        self.windows.iter().find(|w| w.handle == handle)
    }

    fn window_mut(&mut self, handle: WindowHandle) -> Option<&mut FakeWindow> {
        self.windows.iter_mut().find(|w| w.handle == handle)
    }

    fn record(&mut self, call: FakeCall) {
        trace_if_enabled!("fake: {}", call);
        self.calls.push(call);
    }
}

/// In-memory window system: a scripted inventory plus a log of every
/// state-changing call. Backs dry-run mode and the unit tests.
#[derive(Debug, Default)]
pub struct FakeWindowSystem {
    state: Mutex<FakeState>,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_windows(windows: Vec<FakeWindow>) -> Self {
        let system = Self::new();
        system.state.lock().windows = windows;
        system
    }

    #[cfg(test)]
    pub fn add_window(&self, window: FakeWindow) {
        self.state.lock().windows.push(window);
    }

    /// Окно закрыто: хэндл становится недействительным
    #[cfg(test)]
    pub fn close_window(&self, handle: WindowHandle) {
        let mut state = self.state.lock();
        state.windows.retain(|w| w.handle != handle);
        if state.foreground == Some(handle) {
            state.foreground = None;
        }
    }

    pub fn set_foreground(&self, handle: Option<WindowHandle>) {
        self.state.lock().foreground = handle;
    }

    #[cfg(test)]
    pub fn set_policy(&self, policy: FocusPolicy) {
        self.state.lock().policy = policy;
    }

    #[cfg(test)]
    pub fn set_enumeration_fails(&self, fails: bool) {
        self.state.lock().enumeration_fails = fails;
    }

    #[cfg(test)]
    pub fn set_attach_fails(&self, fails: bool) {
        self.state.lock().attach_fails = fails;
    }

    /// Сочетание занято другим приложением
    #[cfg(test)]
    pub fn reserve_binding(&self, binding: HotkeyBinding) {
        self.state.lock().reserved.push(binding);
    }

    #[cfg(test)]
    pub fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().calls.clone()
    }

    #[cfg(test)]
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    #[cfg(test)]
    pub fn count_calls(&self, predicate: impl Fn(&FakeCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    #[cfg(test)]
    pub fn attach_count(&self) -> usize {
        self.count_calls(|c| matches!(c, FakeCall::Attach(..)))
    }

    #[cfg(test)]
    pub fn detach_count(&self) -> usize {
        self.count_calls(|c| matches!(c, FakeCall::Detach(..)))
    }

    #[cfg(test)]
    pub fn active_attachments(&self) -> usize {
        self.state.lock().attachments.len()
    }

    #[cfg(test)]
    pub fn is_minimized(&self, handle: WindowHandle) -> bool {
        self.state
            .lock()
            .window(handle)
            .and_then(|w| w.state)
            .is_some_and(|s| s.minimized)
    }

    #[cfg(test)]
    pub fn has_surface(&self) -> bool {
        self.state.lock().surface.is_some()
    }

    #[cfg(test)]
    pub fn registered_hotkey(&self, id: i32) -> Option<(HotkeyBinding, bool)> {
        self.state.lock().hotkeys.get(&id).copied()
    }

    /// Эмулирует нажатие зарегистрированной горячей клавиши.
    /// false, если клавиша не зарегистрирована или получатель закрыт.
    pub fn press_hotkey(&self) -> bool {
        let state = self.state.lock();
        if state.hotkeys.is_empty() {
            return false;
        }
        state
            .surface
            .as_ref()
            .is_some_and(|sink| sink.send(CycleRequest::hotkey()).is_ok())
    }

    pub fn sink_closed(&self) -> bool {
        self.state
            .lock()
            .surface
            .as_ref()
            .map_or(true, |sink| sink.is_closed())
    }
}

fn unavailable(window: WindowHandle) -> CyclerError {
    cycler_error!(platform, "окно {} недоступно", window)
}

impl WindowSystem for FakeWindowSystem {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>> {
        let state = self.state.lock();
        if state.enumeration_fails {
            return Err(CyclerError::Platform("перечисление окон не удалось".to_string()));
        }
        Ok(state.windows.iter().map(|w| w.handle).collect())
    }

    fn window_title(&self, window: WindowHandle) -> Result<String> {
        self.state
            .lock()
            .window(window)
            .and_then(|w| w.title.clone())
            .ok_or_else(|| unavailable(window))
    }

    fn window_class(&self, window: WindowHandle) -> Result<String> {
        self.state
            .lock()
            .window(window)
            .and_then(|w| w.class_name.clone())
            .ok_or_else(|| unavailable(window))
    }

    fn window_owner(&self, window: WindowHandle) -> Result<WindowOwner> {
        self.state
            .lock()
            .window(window)
            .and_then(|w| w.owner)
            .ok_or_else(|| unavailable(window))
    }

    fn process_image_path(&self, process_id: u32) -> Result<String> {
        self.state
            .lock()
            .windows
            .iter()
            .find(|w| w.process_id() == Some(process_id))
            .and_then(|w| w.image_path.clone())
            .ok_or_else(|| cycler_error!(platform, "нет доступа к процессу {}", process_id))
    }

    fn window_state(&self, window: WindowHandle) -> Result<WindowState> {
        self.state
            .lock()
            .window(window)
            .and_then(|w| w.state)
            .ok_or_else(|| unavailable(window))
    }

    fn window_bounds(&self, window: WindowHandle) -> Result<WindowBounds> {
        self.state
            .lock()
            .window(window)
            .and_then(|w| w.bounds)
            .ok_or_else(|| unavailable(window))
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        self.state.lock().window(window).is_some()
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.state.lock().foreground
    }

    fn request_foreground(&self, window: WindowHandle) -> bool {
        let mut state = self.state.lock();
        state.record(FakeCall::RequestForeground(window));

        if state.window(window).is_none() {
            return false;
        }

        let granted = match state.policy {
            FocusPolicy::Allow => true,
            #[cfg(test)]
            FocusPolicy::Deny => return false,
            #[cfg(test)]
            FocusPolicy::IgnoreSilently => return true,
            #[cfg(test)]
            FocusPolicy::AllowWhenAttached => !state.attachments.is_empty(),
        };
        if granted {
            state.foreground = Some(window);
        }
        granted
    }

    fn restore_window(&self, window: WindowHandle) -> bool {
        let mut state = self.state.lock();
        state.record(FakeCall::Restore(window));
        match state.window_mut(window).and_then(|w| w.state.as_mut()) {
            Some(window_state) => {
                window_state.minimized = false;
                window_state.visible = true;
                true
            }
            None => false,
        }
    }

    fn flash_window(&self, window: WindowHandle) {
        self.state.lock().record(FakeCall::Flash(window));
    }

    fn current_thread_id(&self) -> u32 {
        FAKE_OWN_THREAD
    }

    fn attach_thread_input(&self, thread_id: u32, target_thread_id: u32, attach: bool) -> bool {
        let mut state = self.state.lock();
        let pair = (thread_id, target_thread_id);

        if attach {
            state.record(FakeCall::Attach(thread_id, target_thread_id));
            if state.attach_fails {
                return false;
            }
            state.attachments.push(pair);
            true
        } else {
            state.record(FakeCall::Detach(thread_id, target_thread_id));
            match state.attachments.iter().position(|p| *p == pair) {
                Some(index) => {
                    state.attachments.remove(index);
                    true
                }
                None => false,
            }
        }
    }

    fn create_hotkey_surface(&self, sink: HotkeySink) -> Result<()> {
        self.state.lock().surface = Some(sink);
        Ok(())
    }

    fn register_hotkey(&self, id: i32, binding: HotkeyBinding, no_repeat: bool) -> Result<()> {
        let mut state = self.state.lock();
        if state.surface.is_none() {
            return Err(CyclerError::SurfaceNotInitialized);
        }

        let taken_here = state
            .hotkeys
            .iter()
            .any(|(other, (b, _))| *other != id && *b == binding);
        if taken_here || state.reserved.contains(&binding) {
            return Err(CyclerError::hotkey_conflict(
                binding.to_string(),
                "сочетание зарегистрировано другим приложением",
            ));
        }
        if state.hotkeys.contains_key(&id) {
            return Err(cycler_error!(platform, "идентификатор {} уже используется", id));
        }

        state.hotkeys.insert(id, (binding, no_repeat));
        Ok(())
    }

    fn unregister_hotkey(&self, id: i32) -> Result<()> {
        match self.state.lock().hotkeys.remove(&id) {
            Some(_) => Ok(()),
            None => Err(cycler_error!(platform, "горячая клавиша {} не зарегистрирована", id)),
        }
    }
}
