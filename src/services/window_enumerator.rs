use crate::config::Config;
use crate::events::{WindowHandle, WindowRecord};
use crate::services::matcher::MatcherSet;
use crate::services::window_system::{WindowState, WindowSystem};
use crate::{debug_if_enabled, trace_if_enabled};
use std::sync::Arc;
use tracing::warn;

/// Enumerates top-level windows and keeps the ones that qualify as cycle
/// targets. Results keep the OS enumeration order.
pub struct WindowEnumerator {
    system: Arc<dyn WindowSystem>,
    matchers: MatcherSet,
    skip_invisible: bool,
    include_minimized: bool,
}

impl WindowEnumerator {
    pub fn new(system: Arc<dyn WindowSystem>, config: &Config) -> Self {
        let matchers = MatcherSet::compile(&config.targets);
        debug_if_enabled!(
            "WindowEnumerator: {} правил фильтрации, skip_invisible={}, include_minimized={}",
            matchers.len(),
            config.skip_invisible,
            config.include_minimized
        );

        Self {
            system,
            matchers,
            skip_invisible: config.skip_invisible,
            include_minimized: config.include_minimized,
        }
    }

    pub fn find_target_windows(&self) -> Vec<WindowRecord> {
        let handles = match self.system.enumerate_windows() {
            Ok(handles) => handles,
            Err(e) => {
                warn!("Не удалось перечислить окна: {}", e);
                return Vec::new();
            }
        };

        let targets: Vec<WindowRecord> = handles
            .into_iter()
            .filter_map(|handle| self.inspect(handle))
            .collect();

        debug_if_enabled!("Найдено {} целевых окон", targets.len());
        targets
    }

    fn inspect(&self, handle: WindowHandle) -> Option<WindowRecord> {
        let state = self.system.window_state(handle).unwrap_or_else(|e| {
            trace_if_enabled!("Состояние окна {} недоступно: {}", handle, e);
            WindowState::default()
        });

        if self.skip_invisible && !state.visible {
            return None;
        }
        if !self.include_minimized && state.minimized {
            return None;
        }
        if state.owned || state.tool_window {
            return None;
        }

        let record = self.describe(handle, state);
        if !self.matchers.matches(&record) {
            trace_if_enabled!("Окно {} не подходит под правила", record);
            return None;
        }

        Some(record)
    }

    /// Собирает метаданные окна; любой неудачный запрос оставляет поле пустым
    fn describe(&self, handle: WindowHandle, state: WindowState) -> WindowRecord {
        let mut record = WindowRecord::new(handle).with_state(state.visible, state.minimized);

        if let Ok(title) = self.system.window_title(handle) {
            record = record.with_title(title);
        }
        if let Ok(class_name) = self.system.window_class(handle) {
            record = record.with_class(class_name);
        }
        if let Ok(bounds) = self.system.window_bounds(handle) {
            record = record.with_bounds(bounds);
        }
        if let Ok(owner) = self.system.window_owner(handle) {
            record.process_id = owner.process_id;
            record.thread_id = owner.thread_id;

            match self.system.process_image_path(owner.process_id) {
                Ok(path) => record = record.with_executable(path),
                Err(e) => {
                    trace_if_enabled!("Путь процесса {} недоступен: {}", owner.process_id, e)
                }
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::services::window_system::fake::{FakeWindow, FakeWindowSystem};

    fn inventory() -> Arc<FakeWindowSystem> {
        Arc::new(FakeWindowSystem::with_windows(vec![
            FakeWindow::new(1, "Client A").with_class("GameWnd").with_image(r"C:\Games\game.exe"),
            FakeWindow::new(2, "Client B").with_class("GameWnd").with_image(r"C:\Games\game.exe"),
            FakeWindow::new(3, "Notes").with_class("Notepad").with_image(r"C:\Windows\notepad.exe"),
            FakeWindow::new(4, "Client C").with_class("GameWnd").with_image(r"C:\Games\game.exe").minimized(),
            FakeWindow::new(5, "Client D").with_class("GameWnd").with_image(r"C:\Games\game.exe").hidden(),
            FakeWindow::new(6, "Dialog").with_class("#32770").with_image(r"C:\Games\game.exe").owned(),
            FakeWindow::new(7, "Overlay").with_class("GameWnd").with_image(r"C:\Games\game.exe").tool_window(),
            FakeWindow::new(8, "Launcher").with_class("GameWnd").with_image(r"C:\Games\launcher.exe"),
        ]))
    }

    fn enumerate(system: Arc<FakeWindowSystem>, config: &Config) -> Vec<u64> {
        WindowEnumerator::new(system, config)
            .find_target_windows()
            .iter()
            .map(|w| w.handle.value())
            .collect()
    }

    fn config_with(targets: Vec<TargetConfig>) -> Config {
        Config {
            targets,
            ..Config::default()
        }
    }

    #[test]
    fn test_no_matchers_keeps_all_eligible() {
        assert_eq!(enumerate(inventory(), &Config::default()), vec![1, 2, 3, 8]);
    }

    #[test]
    fn test_visibility_and_minimized_flags() {
        let config = Config {
            skip_invisible: false,
            include_minimized: true,
            ..Config::default()
        };
        assert_eq!(enumerate(inventory(), &config), vec![1, 2, 3, 4, 5, 8]);
    }

    #[test]
    fn test_or_within_type() {
        let config = config_with(vec![
            TargetConfig::new("process", "game.exe"),
            TargetConfig::new("process", "NOTEPAD.EXE"),
        ]);
        assert_eq!(enumerate(inventory(), &config), vec![1, 2, 3]);
    }

    #[test]
    fn test_and_across_types() {
        let config = config_with(vec![
            TargetConfig::new("class", "^gamewnd$"),
            TargetConfig::new("title", "^Client"),
        ]);
        assert_eq!(enumerate(inventory(), &config), vec![1, 2]);
    }

    #[test]
    fn test_invalid_matcher_keeps_type_present() {
        let config = config_with(vec![
            TargetConfig::new("process", "game.exe"),
            TargetConfig::new("title", "(broken"),
        ]);
        assert!(enumerate(inventory(), &config).is_empty());
    }

    #[test]
    fn test_failed_queries_default_fields() {
        let system = Arc::new(FakeWindowSystem::with_windows(vec![
            FakeWindow::new(1, "Client").with_image(r"C:\Games\game.exe").protected(),
            FakeWindow::new(2, "ignored").without_title().with_image(r"C:\Games\game.exe"),
        ]));
        let enumerator = WindowEnumerator::new(system.clone(), &Config::default());
        let windows = enumerator.find_target_windows();

        assert_eq!(windows.len(), 2);
        assert!(windows[0].executable_path.is_empty());
        assert_eq!(windows[0].title, "Client");
        assert!(windows[1].title.is_empty());
        assert_eq!(windows[1].executable_name, "game.exe");

        // Процесс без доступа к пути не проходит process-фильтр
        let config = config_with(vec![TargetConfig::new("process", "game.exe")]);
        assert_eq!(enumerate(system, &config), vec![2]);
    }

    #[test]
    fn test_missing_state_is_treated_as_hidden() {
        let system = Arc::new(FakeWindowSystem::with_windows(vec![
            FakeWindow::new(1, "a").without_state(),
            FakeWindow::new(2, "b"),
        ]));
        assert_eq!(enumerate(system, &Config::default()), vec![2]);
    }

    #[test]
    fn test_enumeration_failure_returns_empty() {
        let system = inventory();
        system.set_enumeration_fails(true);
        assert!(enumerate(system, &Config::default()).is_empty());
    }
}
