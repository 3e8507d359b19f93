//! Win32 backend. Every call is a thin wrapper over user32/kernel32; the
//! hotkey surface is a message-only window pumped on its own thread.

use super::r#trait::{HotkeySink, WindowOwner, WindowState, WindowSystem};
use crate::cycler_error;
use crate::error::{CyclerError, Result};
use crate::events::{CycleRequest, HotkeyBinding, WindowBounds, WindowHandle};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, LRESULT, RECT, TRUE, WPARAM};
use windows::Win32::System::Threading::{
    AttachThreadInput, GetCurrentThreadId, OpenProcess, QueryFullProcessImageNameW,
    PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_ALT, MOD_CONTROL, MOD_NOREPEAT,
    MOD_SHIFT, MOD_WIN,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, EnumWindows,
    FlashWindowEx, GetClassNameW, GetForegroundWindow, GetMessageW, GetWindow, GetWindowLongW,
    GetWindowRect, GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsIconic,
    IsWindow, IsWindowVisible, PostMessageW, RegisterClassW, SetForegroundWindow,
    ShowWindowAsync, FLASHWINFO, FLASHW_TIMERNOFG, FLASHW_TRAY, GWL_EXSTYLE, GW_OWNER,
    HWND_MESSAGE, MSG, SW_RESTORE, WM_HOTKEY, WM_USER, WNDCLASSW, WS_EX_TOOLWINDOW,
};

/// Разбудить поток поверхности: в очереди есть команда
const WM_SURFACE_COMMAND: u32 = WM_USER + 1;
/// Остановить цикл сообщений
const WM_SURFACE_QUIT: u32 = WM_USER + 2;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

fn to_hwnd(window: WindowHandle) -> HWND {
    HWND(window.value() as usize as *mut c_void)
}

fn from_hwnd(hwnd: HWND) -> WindowHandle {
    WindowHandle::new(hwnd.0 as usize as u64)
}

fn to_win32_modifiers(binding: &HotkeyBinding, no_repeat: bool) -> HOT_KEY_MODIFIERS {
    let mut modifiers = HOT_KEY_MODIFIERS(0);
    if binding.modifiers.ctrl {
        modifiers |= MOD_CONTROL;
    }
    if binding.modifiers.alt {
        modifiers |= MOD_ALT;
    }
    if binding.modifiers.shift {
        modifiers |= MOD_SHIFT;
    }
    if binding.modifiers.win {
        modifiers |= MOD_WIN;
    }
    if no_repeat {
        modifiers |= MOD_NOREPEAT;
    }
    modifiers
}

enum SurfaceCommand {
    Register {
        id: i32,
        binding: HotkeyBinding,
        no_repeat: bool,
        reply: mpsc::Sender<Result<()>>,
    },
    Unregister {
        id: i32,
        reply: mpsc::Sender<Result<()>>,
    },
}

/// Message-only window and the thread that owns it.
/// RegisterHotKey must run on the owning thread, so commands are queued.
struct HotkeySurface {
    // HWND is !Send
    hwnd: isize,
    commands: mpsc::Sender<SurfaceCommand>,
    thread: Option<JoinHandle<()>>,
}

impl HotkeySurface {
    fn spawn(sink: HotkeySink) -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<SurfaceCommand>();
        let (init_tx, init_rx) = mpsc::channel::<Result<isize>>();

        let thread = std::thread::Builder::new()
            .name("wincycle-hotkey".to_string())
            .spawn(move || unsafe { run_surface(sink, command_rx, init_tx) })?;

        let hwnd = init_rx
            .recv()
            .map_err(|_| CyclerError::Platform("поток горячих клавиш завершился при запуске".to_string()))??;

        Ok(Self {
            hwnd,
            commands: command_tx,
            thread: Some(thread),
        })
    }

    fn post(&self, message: u32) -> Result<()> {
        unsafe {
            PostMessageW(
                Some(HWND(self.hwnd as *mut c_void)),
                message,
                WPARAM(0),
                LPARAM(0),
            )
        }
        .map_err(|e| cycler_error!(platform, "PostMessageW: {}", e))
    }

    fn execute(&self, build: impl FnOnce(mpsc::Sender<Result<()>>) -> SurfaceCommand) -> Result<()> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.commands
            .send(build(reply_tx))
            .map_err(|_| CyclerError::Platform("поток горячих клавиш остановлен".to_string()))?;
        self.post(WM_SURFACE_COMMAND)?;

        reply_rx
            .recv_timeout(COMMAND_TIMEOUT)
            .map_err(|_| CyclerError::Platform("поток горячих клавиш не ответил".to_string()))?
    }
}

impl Drop for HotkeySurface {
    fn drop(&mut self) {
        let _ = self.post(WM_SURFACE_QUIT);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        debug!("Поверхность горячих клавиш остановлена");
    }
}

unsafe extern "system" fn surface_window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    DefWindowProcW(hwnd, msg, wparam, lparam)
}

unsafe fn run_surface(
    sink: HotkeySink,
    commands: mpsc::Receiver<SurfaceCommand>,
    init: mpsc::Sender<Result<isize>>,
) {
    let class_name: Vec<u16> = "WinCycleHotkeySurface\0".encode_utf16().collect();
    let wc = WNDCLASSW {
        lpfnWndProc: Some(surface_window_proc),
        lpszClassName: PCWSTR(class_name.as_ptr()),
        ..Default::default()
    };
    RegisterClassW(&wc);

    let hwnd = match CreateWindowExW(
        Default::default(),
        PCWSTR(class_name.as_ptr()),
        None,
        Default::default(),
        0,
        0,
        0,
        0,
        Some(HWND_MESSAGE),
        None,
        None,
        None,
    ) {
        Ok(hwnd) => hwnd,
        Err(e) => {
            let _ = init.send(Err(CyclerError::Platform(format!(
                "не удалось создать окно сообщений: {}",
                e
            ))));
            return;
        }
    };
    let _ = init.send(Ok(hwnd.0 as isize));

    let mut registered: Vec<i32> = Vec::new();
    let mut msg = MSG::default();
    loop {
        let code = GetMessageW(&mut msg, Some(hwnd), 0, 0).0;
        if !message_received(code) {
            if code == -1 {
                warn!(
                    "GetMessageW завершился ошибкой, поток горячих клавиш остановлен: {}",
                    std::io::Error::last_os_error()
                );
            }
            break;
        }
        match msg.message {
            WM_HOTKEY => {
                debug!("WM_HOTKEY id={}", msg.wParam.0);
                if sink.send(CycleRequest::hotkey()).is_err() {
                    debug!("Получатель запросов закрыт, нажатие пропущено");
                }
            }
            WM_SURFACE_COMMAND => {
                while let Ok(command) = commands.try_recv() {
                    handle_command(hwnd, command, &mut registered);
                }
            }
            WM_SURFACE_QUIT => break,
            _ => {
                DispatchMessageW(&msg);
            }
        }
    }

    for id in registered {
        let _ = UnregisterHotKey(Some(hwnd), id);
    }
    let _ = DestroyWindow(hwnd);
}

/// GetMessageW: 0 означает WM_QUIT, -1 ошибку
fn message_received(code: i32) -> bool {
    code != 0 && code != -1
}

unsafe fn handle_command(hwnd: HWND, command: SurfaceCommand, registered: &mut Vec<i32>) {
    match command {
        SurfaceCommand::Register {
            id,
            binding,
            no_repeat,
            reply,
        } => {
            let result = RegisterHotKey(
                Some(hwnd),
                id,
                to_win32_modifiers(&binding, no_repeat),
                binding.key.value(),
            )
            .map(|_| registered.push(id))
            .map_err(|e| CyclerError::hotkey_conflict(binding.to_string(), e.to_string()));
            let _ = reply.send(result);
        }
        SurfaceCommand::Unregister { id, reply } => {
            registered.retain(|r| *r != id);
            let result = UnregisterHotKey(Some(hwnd), id)
                .map_err(|e| cycler_error!(platform, "UnregisterHotKey: {}", e));
            let _ = reply.send(result);
        }
    }
}

unsafe extern "system" fn collect_windows(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let windows = &mut *(lparam.0 as *mut Vec<WindowHandle>);
    windows.push(from_hwnd(hwnd));
    TRUE
}

pub struct Win32WindowSystem {
    surface: Mutex<Option<HotkeySurface>>,
}

impl Default for Win32WindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self {
            surface: Mutex::new(None),
        }
    }

    fn ensure_window(&self, window: WindowHandle) -> Result<HWND> {
        if self.is_window(window) {
            Ok(to_hwnd(window))
        } else {
            Err(cycler_error!(platform, "окно {} не существует", window))
        }
    }

    fn with_surface(&self, f: impl FnOnce(&HotkeySurface) -> Result<()>) -> Result<()> {
        match self.surface.lock().as_ref() {
            Some(surface) => f(surface),
            None => Err(CyclerError::SurfaceNotInitialized),
        }
    }
}

impl WindowSystem for Win32WindowSystem {
    fn name(&self) -> &'static str {
        "win32"
    }

    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>> {
        let mut windows: Vec<WindowHandle> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_windows),
                LPARAM(&mut windows as *mut Vec<WindowHandle> as isize),
            )
        }
        .map_err(|e| cycler_error!(platform, "EnumWindows: {}", e))?;
        Ok(windows)
    }

    fn window_title(&self, window: WindowHandle) -> Result<String> {
        let hwnd = self.ensure_window(window)?;
        unsafe {
            let len = GetWindowTextLengthW(hwnd);
            if len <= 0 {
                return Ok(String::new());
            }
            let mut buffer = vec![0u16; len as usize + 1];
            let copied = GetWindowTextW(hwnd, &mut buffer);
            Ok(String::from_utf16_lossy(&buffer[..copied.max(0) as usize]))
        }
    }

    fn window_class(&self, window: WindowHandle) -> Result<String> {
        let hwnd = self.ensure_window(window)?;
        let mut buffer = [0u16; 256];
        let len = unsafe { GetClassNameW(hwnd, &mut buffer) };
        if len <= 0 {
            return Err(cycler_error!(platform, "GetClassNameW для {}", window));
        }
        Ok(String::from_utf16_lossy(&buffer[..len as usize]))
    }

    fn window_owner(&self, window: WindowHandle) -> Result<WindowOwner> {
        let hwnd = self.ensure_window(window)?;
        let mut process_id = 0u32;
        let thread_id = unsafe { GetWindowThreadProcessId(hwnd, Some(&mut process_id)) };
        if thread_id == 0 {
            return Err(cycler_error!(platform, "GetWindowThreadProcessId для {}", window));
        }
        Ok(WindowOwner {
            process_id,
            thread_id,
        })
    }

    fn process_image_path(&self, process_id: u32) -> Result<String> {
        unsafe {
            let process = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id)
                .map_err(|e| cycler_error!(platform, "OpenProcess({}): {}", process_id, e))?;

            let mut buffer = vec![0u16; 1024];
            let mut size = buffer.len() as u32;
            let result = QueryFullProcessImageNameW(
                process,
                PROCESS_NAME_WIN32,
                PWSTR(buffer.as_mut_ptr()),
                &mut size,
            );
            let _ = CloseHandle(process);

            result.map_err(|e| {
                cycler_error!(platform, "QueryFullProcessImageNameW({}): {}", process_id, e)
            })?;
            Ok(String::from_utf16_lossy(&buffer[..size as usize]))
        }
    }

    fn window_state(&self, window: WindowHandle) -> Result<WindowState> {
        let hwnd = self.ensure_window(window)?;
        unsafe {
            let ex_style = GetWindowLongW(hwnd, GWL_EXSTYLE) as u32;
            let owned = GetWindow(hwnd, GW_OWNER).is_ok_and(|owner| !owner.is_invalid());
            Ok(WindowState {
                visible: IsWindowVisible(hwnd).as_bool(),
                minimized: IsIconic(hwnd).as_bool(),
                owned,
                tool_window: ex_style & WS_EX_TOOLWINDOW.0 != 0,
            })
        }
    }

    fn window_bounds(&self, window: WindowHandle) -> Result<WindowBounds> {
        let hwnd = self.ensure_window(window)?;
        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd, &mut rect) }
            .map_err(|e| cycler_error!(platform, "GetWindowRect для {}: {}", window, e))?;
        Ok(WindowBounds::new(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        window.value() != 0 && unsafe { IsWindow(Some(to_hwnd(window))) }.as_bool()
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let hwnd = unsafe { GetForegroundWindow() };
        (!hwnd.is_invalid()).then(|| from_hwnd(hwnd))
    }

    fn request_foreground(&self, window: WindowHandle) -> bool {
        unsafe { SetForegroundWindow(to_hwnd(window)) }.as_bool()
    }

    fn restore_window(&self, window: WindowHandle) -> bool {
        unsafe { ShowWindowAsync(to_hwnd(window), SW_RESTORE) }.as_bool()
    }

    fn flash_window(&self, window: WindowHandle) {
        let info = FLASHWINFO {
            cbSize: std::mem::size_of::<FLASHWINFO>() as u32,
            hwnd: to_hwnd(window),
            dwFlags: FLASHW_TRAY | FLASHW_TIMERNOFG,
            uCount: 0,
            dwTimeout: 0,
        };
        unsafe {
            let _ = FlashWindowEx(&info);
        }
    }

    fn current_thread_id(&self) -> u32 {
        unsafe { GetCurrentThreadId() }
    }

    fn attach_thread_input(&self, thread_id: u32, target_thread_id: u32, attach: bool) -> bool {
        unsafe { AttachThreadInput(thread_id, target_thread_id, attach) }.as_bool()
    }

    fn create_hotkey_surface(&self, sink: HotkeySink) -> Result<()> {
        let mut surface = self.surface.lock();
        if surface.is_some() {
            warn!("Поверхность горячих клавиш уже создана, пересоздаём");
        }
        // Старая поверхность останавливается в Drop до создания новой
        *surface = None;
        *surface = Some(HotkeySurface::spawn(sink)?);
        info!("Поверхность горячих клавиш создана");
        Ok(())
    }

    fn register_hotkey(&self, id: i32, binding: HotkeyBinding, no_repeat: bool) -> Result<()> {
        self.with_surface(|surface| {
            surface.execute(|reply| SurfaceCommand::Register {
                id,
                binding,
                no_repeat,
                reply,
            })
        })
    }

    fn unregister_hotkey(&self, id: i32) -> Result<()> {
        self.with_surface(|surface| surface.execute(|reply| SurfaceCommand::Unregister { id, reply }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_loop_stops_on_quit_and_error() {
        assert!(message_received(1));
        assert!(!message_received(0));
        assert!(!message_received(-1));
    }

    #[test]
    fn test_modifiers_always_carry_norepeat_when_requested() {
        let binding = HotkeyBinding::parse("Ctrl+Alt+F12").unwrap();
        let modifiers = to_win32_modifiers(&binding, true);
        assert_eq!(modifiers, MOD_CONTROL | MOD_ALT | MOD_NOREPEAT);
        assert_eq!(to_win32_modifiers(&binding, false), MOD_CONTROL | MOD_ALT);
    }
}
