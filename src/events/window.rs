use serde::{Deserialize, Serialize};
use std::fmt;

/// Непрозрачный идентификатор окна верхнего уровня.
///
/// Действителен только в пределах одного цикла: после закрытия окна ОС может
/// выдать тот же идентификатор другому окну.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowHandle(pub u64);

impl WindowHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Прямоугольник окна в экранных координатах
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl WindowBounds {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

impl fmt::Display for WindowBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}@{},{}",
            self.width(),
            self.height(),
            self.left,
            self.top
        )
    }
}

/// Снимок окна на момент перечисления
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub handle: WindowHandle,
    pub title: String,
    pub class_name: String,
    pub process_id: u32,
    pub thread_id: u32,
    /// Может быть пустым, если ОС запретила доступ к процессу
    pub executable_path: String,
    pub executable_name: String,
    pub visible: bool,
    pub minimized: bool,
    pub bounds: WindowBounds,
    /// Метка последней подтверждённой активации (мс), 0 - ни разу.
    /// Пишет только FocusController.
    pub last_activated: u64,
}

impl WindowRecord {
    pub fn new(handle: WindowHandle) -> Self {
        Self {
            handle,
            title: String::new(),
            class_name: String::new(),
            process_id: 0,
            thread_id: 0,
            executable_path: String::new(),
            executable_name: String::new(),
            visible: false,
            minimized: false,
            bounds: WindowBounds::default(),
            last_activated: 0,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_class(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    /// Устанавливает путь к исполняемому файлу и выводит из него имя файла
    pub fn with_executable(mut self, path: impl Into<String>) -> Self {
        self.executable_path = path.into();
        self.executable_name = executable_name_from_path(&self.executable_path);
        self
    }

    pub fn with_bounds(mut self, bounds: WindowBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn with_state(mut self, visible: bool, minimized: bool) -> Self {
        self.visible = visible;
        self.minimized = minimized;
        self
    }

    #[cfg(test)]
    pub fn was_activated(&self) -> bool {
        self.last_activated != 0
    }
}

impl fmt::Display for WindowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.executable_name.is_empty() {
            write!(f, "{} \"{}\"", self.handle, self.title)
        } else {
            write!(
                f,
                "{} \"{}\" ({})",
                self.handle, self.title, self.executable_name
            )
        }
    }
}

/// Имя файла из полного пути; понимает оба вида разделителей
pub fn executable_name_from_path(path: &str) -> String {
    path.rsplit(|c: char| c == '\\' || c == '/')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Событие неудачной активации окна
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFailure {
    pub window: WindowRecord,
    pub fallback_attempted: bool,
    pub timestamp: std::time::Instant,
}

impl ActivationFailure {
    pub fn new(window: WindowRecord, fallback_attempted: bool) -> Self {
        Self {
            window,
            fallback_attempted,
            timestamp: std::time::Instant::now(),
        }
    }
}

impl fmt::Display for ActivationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "не удалось активировать {} (fallback: {})",
            self.window, self.fallback_attempted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_dimensions() {
        let bounds = WindowBounds::new(100, 50, 1380, 770);
        assert_eq!(bounds.width(), 1280);
        assert_eq!(bounds.height(), 720);
        assert_eq!(bounds.to_string(), "1280x720@100,50");
    }

    #[test]
    fn test_executable_name_from_path() {
        assert_eq!(
            executable_name_from_path(r"C:\Games\Client\game.exe"),
            "game.exe"
        );
        assert_eq!(executable_name_from_path("/usr/bin/xterm"), "xterm");
        assert_eq!(executable_name_from_path("plain.exe"), "plain.exe");
        assert_eq!(executable_name_from_path(""), "");
    }

    #[test]
    fn test_record_builder_and_display() {
        let record = WindowRecord::new(WindowHandle::new(0x1A2B))
            .with_title("Client 1")
            .with_class("GameWnd")
            .with_executable(r"C:\Games\game.exe")
            .with_state(true, false);

        assert_eq!(record.executable_name, "game.exe");
        assert!(!record.was_activated());
        assert_eq!(record.to_string(), "0x1A2B \"Client 1\" (game.exe)");
    }
}
