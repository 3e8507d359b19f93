use crate::error::{CyclerError, Result};
use crate::mappings::KeyNameToVk;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Виртуальный код клавиши (VK_*)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualKey(pub u32);

impl VirtualKey {
    pub fn from_name(name: &str) -> Result<Self> {
        KeyNameToVk::translate(name)
            .map(Self)
            .map_err(CyclerError::InvalidKey)
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match KeyNameToVk::reverse_translate(self.0) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "VK_0x{:02X}", self.0),
        }
    }
}

/// Модификаторы горячей клавиши
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
    pub win: bool,
}

impl Modifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ctrl(mut self, ctrl: bool) -> Self {
        self.ctrl = ctrl;
        self
    }

    pub fn with_alt(mut self, alt: bool) -> Self {
        self.alt = alt;
        self
    }

    pub fn with_shift(mut self, shift: bool) -> Self {
        self.shift = shift;
        self
    }

    pub fn with_win(mut self, win: bool) -> Self {
        self.win = win;
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.ctrl && !self.alt && !self.shift && !self.win
    }

    pub fn to_vec(&self) -> Vec<&'static str> {
        let mut result = Vec::new();
        if self.ctrl { result.push("Ctrl"); }
        if self.alt { result.push("Alt"); }
        if self.shift { result.push("Shift"); }
        if self.win { result.push("Win"); }
        result
    }

    /// Разбирает имена модификаторов из конфигурации.
    /// Возвращает модификаторы и список нераспознанных имён.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> (Self, Vec<String>) {
        let mut result = Self::new();
        let mut unknown = Vec::new();
        for name in names {
            match name.as_ref().trim().to_uppercase().as_str() {
                "CTRL" | "CONTROL" => result = result.with_ctrl(true),
                "ALT" => result = result.with_alt(true),
                "SHIFT" => result = result.with_shift(true),
                "WIN" | "SUPER" | "META" => result = result.with_win(true),
                "NONE" | "" => {}
                other => unknown.push(other.to_string()),
            }
        }
        (result, unknown)
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let modifiers = self.to_vec();
        if modifiers.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", modifiers.join("+"))
        }
    }
}

/// Глобальная горячая клавиша: модификаторы + клавиша
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HotkeyBinding {
    pub modifiers: Modifiers,
    pub key: VirtualKey,
}

impl HotkeyBinding {
    pub fn new(modifiers: Modifiers, key: VirtualKey) -> Self {
        Self { modifiers, key }
    }

    /// Разбирает строку вида "Ctrl+Alt+F4"; последний элемент - клавиша
    pub fn parse(binding: &str) -> Result<Self> {
        let parts: Vec<&str> = binding.split('+').map(|p| p.trim()).collect();
        let (key, modifier_names) = match parts.split_last() {
            Some((key, rest)) if !key.is_empty() => (key, rest),
            _ => return Err(CyclerError::InvalidKey(binding.to_string())),
        };

        let (modifiers, unknown) = Modifiers::from_names(modifier_names);
        if let Some(name) = unknown.first() {
            return Err(CyclerError::InvalidKey(format!(
                "неизвестный модификатор '{}' в '{}'",
                name, binding
            )));
        }

        Ok(Self::new(modifiers, VirtualKey::from_name(key)?))
    }
}

impl fmt::Display for HotkeyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}+{}", self.modifiers, self.key)
        }
    }
}

/// Источник запроса на переключение окна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleSource {
    /// Нажатие зарегистрированной горячей клавиши
    Hotkey,
    /// Синтетический запрос (пункт меню "переключить сейчас", --once)
    Manual,
}

/// Запрос на один цикл переключения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleRequest {
    pub source: CycleSource,
    pub timestamp: std::time::Instant,
}

impl CycleRequest {
    pub fn new(source: CycleSource) -> Self {
        Self {
            source,
            timestamp: std::time::Instant::now(),
        }
    }

    pub fn hotkey() -> Self {
        Self::new(CycleSource::Hotkey)
    }

    pub fn manual() -> Self {
        Self::new(CycleSource::Manual)
    }
}

impl fmt::Display for CycleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} ({}ms ago)",
            self.source,
            self.timestamp.elapsed().as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifiers_creation() {
        let modifiers = Modifiers::new().with_ctrl(true).with_shift(true);

        assert!(modifiers.ctrl);
        assert!(modifiers.shift);
        assert!(!modifiers.alt);
        assert!(!modifiers.win);
        assert_eq!(modifiers.to_string(), "Ctrl+Shift");
    }

    #[test]
    fn test_modifiers_from_names() {
        let (modifiers, unknown) = Modifiers::from_names(&["ctrl", "ALT", "NONE", "hyper"]);
        assert_eq!(modifiers, Modifiers::new().with_ctrl(true).with_alt(true));
        assert_eq!(unknown, vec!["HYPER".to_string()]);

        let (none, unknown) = Modifiers::from_names(&["NONE"]);
        assert!(none.is_empty());
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_binding_description() {
        let binding = HotkeyBinding::new(
            Modifiers::new().with_ctrl(true).with_alt(true),
            VirtualKey::from_name("f4").unwrap(),
        );
        assert_eq!(binding.to_string(), "Ctrl+Alt+F4");

        let bare = HotkeyBinding::new(Modifiers::new(), VirtualKey::from_name("pause").unwrap());
        assert_eq!(bare.to_string(), "Pause");
    }

    #[test]
    fn test_binding_parse() {
        let binding = HotkeyBinding::parse("Win + Shift + Tab").unwrap();
        assert!(binding.modifiers.win);
        assert!(binding.modifiers.shift);
        assert_eq!(binding.key, VirtualKey(0x09));
        assert_eq!(binding.to_string(), "Shift+Win+Tab");

        assert!(HotkeyBinding::parse("Ctrl+").is_err());
        assert!(HotkeyBinding::parse("Hyper+A").is_err());
        assert!(HotkeyBinding::parse("Ctrl+Nope").is_err());
    }
}
