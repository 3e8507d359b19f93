use super::fake::{FakeWindow, FakeWindowSystem};
use super::r#trait::{HotkeySink, WindowOwner, WindowState, WindowSystem};
use crate::error::Result;
use crate::events::{HotkeyBinding, WindowBounds, WindowHandle};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

const PRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Emulated window system: a fixed inventory of fake windows plus a ticker
/// that "presses" the registered hotkey every few seconds.
pub struct DryRunWindowSystem {
    inner: Arc<FakeWindowSystem>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl DryRunWindowSystem {
    pub fn new() -> Self {
        let inner = FakeWindowSystem::with_windows(sample_inventory());
        inner.set_foreground(Some(WindowHandle::new(0x1001)));

        Self {
            inner: Arc::new(inner),
            ticker: Mutex::new(None),
        }
    }

    fn start_ticker(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("Dry-run: нет tokio runtime, эмуляция нажатий отключена");
            return;
        };

        let inner = Arc::clone(&self.inner);
        let task = runtime.spawn(async move {
            let mut ticker = interval(PRESS_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if inner.sink_closed() {
                    debug!("Dry-run: получатель закрыт, эмуляция нажатий остановлена");
                    break;
                }
                if inner.press_hotkey() {
                    info!("Dry-run: эмулируем нажатие горячей клавиши");
                }
            }
        });

        if let Some(previous) = self.ticker.lock().replace(task) {
            previous.abort();
        }
    }
}

impl Default for DryRunWindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DryRunWindowSystem {
    fn drop(&mut self) {
        if let Some(task) = self.ticker.lock().take() {
            task.abort();
        }
    }
}

fn sample_inventory() -> Vec<FakeWindow> {
    vec![
        FakeWindow::new(0x1001, "Client 1 - dry_run")
            .with_class("DryRunClient")
            .with_image(r"C:\Games\client.exe")
            .at(0, 0),
        FakeWindow::new(0x1002, "Client 2 - dry_run")
            .with_class("DryRunClient")
            .with_image(r"C:\Games\client.exe")
            .at(960, 0),
        FakeWindow::new(0x1003, "Client 3 - dry_run")
            .with_class("DryRunClient")
            .with_image(r"C:\Games\client.exe")
            .at(0, 540)
            .minimized(),
        FakeWindow::new(0x1004, "Editor - dry_run")
            .with_class("DryRunEditor")
            .with_image(r"C:\Tools\editor.exe")
            .at(960, 540),
        FakeWindow::new(0x1005, "Tray helper - dry_run")
            .with_class("DryRunTool")
            .with_image(r"C:\Tools\helper.exe")
            .tool_window(),
        FakeWindow::new(0x1006, "Hidden - dry_run")
            .with_class("DryRunHidden")
            .hidden(),
    ]
}

impl WindowSystem for DryRunWindowSystem {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn enumerate_windows(&self) -> Result<Vec<WindowHandle>> {
        self.inner.enumerate_windows()
    }

    fn window_title(&self, window: WindowHandle) -> Result<String> {
        self.inner.window_title(window)
    }

    fn window_class(&self, window: WindowHandle) -> Result<String> {
        self.inner.window_class(window)
    }

    fn window_owner(&self, window: WindowHandle) -> Result<WindowOwner> {
        self.inner.window_owner(window)
    }

    fn process_image_path(&self, process_id: u32) -> Result<String> {
        self.inner.process_image_path(process_id)
    }

    fn window_state(&self, window: WindowHandle) -> Result<WindowState> {
        self.inner.window_state(window)
    }

    fn window_bounds(&self, window: WindowHandle) -> Result<WindowBounds> {
        self.inner.window_bounds(window)
    }

    fn is_window(&self, window: WindowHandle) -> bool {
        self.inner.is_window(window)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        self.inner.foreground_window()
    }

    fn request_foreground(&self, window: WindowHandle) -> bool {
        info!("[DRY RUN] Запрос фокуса для окна {}", window);
        self.inner.request_foreground(window)
    }

    fn restore_window(&self, window: WindowHandle) -> bool {
        info!("[DRY RUN] Восстановление окна {}", window);
        self.inner.restore_window(window)
    }

    fn flash_window(&self, window: WindowHandle) {
        info!("[DRY RUN] Мигание кнопки окна {} на панели задач", window);
        self.inner.flash_window(window)
    }

    fn current_thread_id(&self) -> u32 {
        self.inner.current_thread_id()
    }

    fn attach_thread_input(&self, thread_id: u32, target_thread_id: u32, attach: bool) -> bool {
        info!(
            "[DRY RUN] {} ввода потока {} к потоку {}",
            if attach { "Присоединение" } else { "Отсоединение" },
            thread_id,
            target_thread_id
        );
        self.inner.attach_thread_input(thread_id, target_thread_id, attach)
    }

    fn create_hotkey_surface(&self, sink: HotkeySink) -> Result<()> {
        info!("Dry-run режим - горячая клавиша эмулируется каждые {:?}", PRESS_INTERVAL);
        self.inner.create_hotkey_surface(sink)?;
        self.start_ticker();
        Ok(())
    }

    fn register_hotkey(&self, id: i32, binding: HotkeyBinding, no_repeat: bool) -> Result<()> {
        info!("[DRY RUN] Регистрация горячей клавиши {} (id={})", binding, id);
        self.inner.register_hotkey(id, binding, no_repeat)
    }

    fn unregister_hotkey(&self, id: i32) -> Result<()> {
        info!("[DRY RUN] Снятие горячей клавиши id={}", id);
        self.inner.unregister_hotkey(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_sample_inventory_is_enumerable() {
        let system = DryRunWindowSystem::new();
        let windows = system.enumerate_windows().unwrap();
        assert_eq!(windows.len(), 6);
        assert_eq!(system.foreground_window(), Some(WindowHandle::new(0x1001)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_emulates_presses() {
        let system = DryRunWindowSystem::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        system.create_hotkey_surface(tx).unwrap();
        system
            .register_hotkey(1, HotkeyBinding::parse("Ctrl+Alt+F12").unwrap(), true)
            .unwrap();

        tokio::time::sleep(PRESS_INTERVAL + Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_ok());
    }
}
