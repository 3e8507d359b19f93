use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::events::{HotkeyBinding, Modifiers, VirtualKey};
use crate::services::matcher::MatcherKind;
use crate::services::window_orderer::OrderingMode;

pub const CURRENT_VERSION: u32 = 1;
const DEFAULT_HOTKEY_KEY: &str = "F12";
const MAX_SETTLE_MS: u64 = 2_000;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    #[serde(alias = "includeMinimized")]
    pub include_minimized: bool,
    #[serde(alias = "skipInvisible")]
    pub skip_invisible: bool,
    #[serde(alias = "compatFallback")]
    pub compat_fallback: bool,
    pub hotkey: HotkeyConfig,
    pub targets: Vec<TargetConfig>,
    pub ordering: OrderingConfig,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HotkeyConfig {
    pub modifiers: Vec<String>,
    pub key: String,
}

/// Правило отбора окна в том виде, как оно записано в конфигурации
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TargetConfig {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(rename = "match", alias = "pattern", default)]
    pub pattern: String,
    #[serde(alias = "pathRegex", default, skip_serializing_if = "Option::is_none")]
    pub path_regex: Option<String>,
}

impl TargetConfig {
    pub fn new(kind: &str, pattern: &str) -> Self {
        Self {
            kind: kind.to_string(),
            pattern: pattern.to_string(),
            path_regex: None,
        }
    }

    #[cfg(test)]
    pub fn with_path_regex(mut self, path_regex: &str) -> Self {
        self.path_regex = Some(path_regex.to_string());
        self
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OrderingConfig {
    pub mode: String,
    /// Ключи ручного порядка (не фильтры)
    pub manual: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(alias = "restoreSettleMs")]
    pub restore_settle_ms: u64,
    #[serde(alias = "verifySettleMs")]
    pub verify_settle_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            include_minimized: false,
            skip_invisible: true,
            compat_fallback: true,
            hotkey: HotkeyConfig::default(),
            targets: Vec::new(),
            ordering: OrderingConfig::default(),
            timing: TimingConfig::default(),
        }
    }
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            modifiers: vec!["CTRL".to_string(), "ALT".to_string()],
            key: DEFAULT_HOTKEY_KEY.to_string(),
        }
    }
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            mode: OrderingMode::ScreenLayout.as_str().to_string(),
            manual: Vec::new(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            restore_settle_ms: 120,
            verify_settle_ms: 60,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        let figment = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("WINCYCLE_").split("__"));

        Self::from_figment(figment)
            .with_context(|| format!("Не удалось загрузить конфигурацию из {:?}", config_path))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: Config = figment.extract()?;
        config.sanitize();
        Ok(config)
    }

    /// Заменяет некорректные значения значениями по умолчанию.
    /// Ошибочные поля никогда не делают конфигурацию фатальной.
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            warn!("Версия конфигурации не указана, считаем её равной {}", CURRENT_VERSION);
            self.version = CURRENT_VERSION;
        } else if self.version > CURRENT_VERSION {
            warn!(
                "Версия конфигурации {} новее поддерживаемой {}, неизвестные поля будут проигнорированы",
                self.version, CURRENT_VERSION
            );
        }

        // Горячая клавиша
        let (_, unknown) = Modifiers::from_names(self.hotkey.modifiers.as_slice());
        if !unknown.is_empty() {
            warn!("Неверные модификаторы {:?} проигнорированы", unknown);
            self.hotkey
                .modifiers
                .retain(|m| !unknown.contains(&m.trim().to_uppercase()));
        }
        if let Err(e) = VirtualKey::from_name(&self.hotkey.key) {
            warn!("{}, используем клавишу по умолчанию {}", e, DEFAULT_HOTKEY_KEY);
            self.hotkey.key = DEFAULT_HOTKEY_KEY.to_string();
        }

        // Правила отбора окон
        Self::sanitize_targets(&mut self.targets, "targets");
        Self::sanitize_targets(&mut self.ordering.manual, "ordering.manual");

        // Режим упорядочивания
        if OrderingMode::parse(&self.ordering.mode).is_none() {
            warn!(
                "Неверный режим упорядочивания '{}', используем {}",
                self.ordering.mode,
                OrderingMode::ScreenLayout.as_str()
            );
            self.ordering.mode = OrderingMode::ScreenLayout.as_str().to_string();
        }

        // Задержки
        let defaults = TimingConfig::default();
        if self.timing.restore_settle_ms > MAX_SETTLE_MS {
            warn!(
                "restore_settle_ms = {} слишком велико, используем {}",
                self.timing.restore_settle_ms, defaults.restore_settle_ms
            );
            self.timing.restore_settle_ms = defaults.restore_settle_ms;
        }
        if self.timing.verify_settle_ms > MAX_SETTLE_MS {
            warn!(
                "verify_settle_ms = {} слишком велико, используем {}",
                self.timing.verify_settle_ms, defaults.verify_settle_ms
            );
            self.timing.verify_settle_ms = defaults.verify_settle_ms;
        }
    }

    fn sanitize_targets(targets: &mut Vec<TargetConfig>, section: &str) {
        targets.retain(|target| {
            let Some(kind) = MatcherKind::parse(&target.kind) else {
                warn!("{}: неизвестный тип правила '{}', правило пропущено", section, target.kind);
                return false;
            };

            let has_path = kind == MatcherKind::Process
                && target.path_regex.as_deref().is_some_and(|p| !p.is_empty());
            if target.pattern.trim().is_empty() && !has_path {
                warn!("{}: пустой шаблон для правила типа '{}', правило пропущено", section, target.kind);
                return false;
            }

            if kind != MatcherKind::Process && target.path_regex.is_some() {
                warn!(
                    "{}: path_regex поддерживается только для типа process, игнорируется для '{}'",
                    section, target.pattern
                );
            }
            true
        });
    }

    /// Горячая клавиша из конфигурации (после sanitize всегда разбирается)
    pub fn hotkey_binding(&self) -> HotkeyBinding {
        let (modifiers, _) = Modifiers::from_names(self.hotkey.modifiers.as_slice());
        let key = VirtualKey::from_name(&self.hotkey.key).unwrap_or_else(|_| {
            VirtualKey::from_name(DEFAULT_HOTKEY_KEY).unwrap_or(VirtualKey(0x7B))
        });
        HotkeyBinding::new(modifiers, key)
    }

    pub fn ordering_mode(&self) -> OrderingMode {
        OrderingMode::parse(&self.ordering.mode).unwrap_or(OrderingMode::ScreenLayout)
    }

    pub fn restore_settle(&self) -> Duration {
        Duration::from_millis(self.timing.restore_settle_ms)
    }

    pub fn verify_settle(&self) -> Duration {
        Duration::from_millis(self.timing.verify_settle_ms)
    }
}

/// Хранилище активного снимка конфигурации.
///
/// Снимок заменяется целиком: читатели получают либо старый, либо новый
/// `Arc<Config>`, но никогда частично обновлённый.
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigStore {
    /// Загружает конфигурацию; при ошибке продолжает со значениями по умолчанию
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let config = match Config::load(&path) {
            Ok(config) => {
                info!("Конфигурация загружена из: {}", path.display());
                config
            }
            Err(e) => {
                warn!("{:#}. Используем конфигурацию по умолчанию", e);
                Config::default()
            }
        };

        Self::with_config(path, config)
    }

    pub fn with_config(path: PathBuf, config: Config) -> Self {
        Self {
            path,
            current: RwLock::new(Arc::new(config)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Перечитывает файл. При ошибке остаётся прежний снимок.
    pub fn reload(&self) -> crate::error::Result<Arc<Config>> {
        let config = Config::load(&self.path)?;
        info!("Конфигурация перезагружена из: {}", self.path.display());
        Ok(self.replace(config))
    }

    pub fn replace(&self, config: Config) -> Arc<Config> {
        let snapshot = Arc::new(config);
        *self.current.write() = snapshot.clone();
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Config {
        Config::from_figment(Figment::from(Toml::string(toml))).unwrap()
    }

    #[test]
    fn test_default_config_is_sane() {
        let mut config = Config::default();
        let before = format!("{:?}", config);
        config.sanitize();
        assert_eq!(before, format!("{:?}", config));
        assert_eq!(config.hotkey_binding().to_string(), "Ctrl+Alt+F12");
        assert_eq!(config.ordering_mode(), OrderingMode::ScreenLayout);
    }

    #[test]
    fn test_full_config_parsing() {
        let config = from_toml(
            r#"
            version = 1
            include_minimized = true
            skip_invisible = false
            compat_fallback = false

            [hotkey]
            modifiers = ["CTRL", "SHIFT"]
            key = "tab"

            [[targets]]
            type = "process"
            match = "game.exe"
            path_regex = "games"

            [[targets]]
            type = "title"
            match = "^Client"

            [ordering]
            mode = "manual"

            [[ordering.manual]]
            type = "title"
            match = "Main"

            [timing]
            restore_settle_ms = 10
            verify_settle_ms = 5
            "#,
        );

        assert!(config.include_minimized);
        assert!(!config.skip_invisible);
        assert!(!config.compat_fallback);
        assert_eq!(config.hotkey_binding().to_string(), "Ctrl+Shift+Tab");
        assert_eq!(config.targets.len(), 2);
        assert_eq!(config.targets[0].path_regex.as_deref(), Some("games"));
        assert_eq!(config.ordering_mode(), OrderingMode::Manual);
        assert_eq!(config.ordering.manual, vec![TargetConfig::new("title", "Main")]);
        assert_eq!(config.restore_settle(), Duration::from_millis(10));
        assert_eq!(config.verify_settle(), Duration::from_millis(5));
    }

    #[test]
    fn test_camel_case_aliases() {
        let config = from_toml(
            r#"
            includeMinimized = true
            skipInvisible = false
            compatFallback = false

            [[targets]]
            type = "process"
            match = "game.exe"
            pathRegex = "steamapps"

            [ordering]
            mode = "lastActive"
            "#,
        );

        assert!(config.include_minimized);
        assert!(!config.skip_invisible);
        assert!(!config.compat_fallback);
        assert_eq!(config.targets[0].path_regex.as_deref(), Some("steamapps"));
        assert_eq!(config.ordering_mode(), OrderingMode::LastActive);
    }

    #[test]
    fn test_missing_fields_are_defaulted() {
        let config = from_toml("");
        assert_eq!(config.version, CURRENT_VERSION);
        assert!(config.skip_invisible);
        assert!(!config.include_minimized);
        assert!(config.compat_fallback);
        assert!(config.targets.is_empty());
        assert_eq!(config.hotkey_binding().to_string(), "Ctrl+Alt+F12");
    }

    #[test]
    fn test_invalid_fields_are_defaulted() {
        let config = from_toml(
            r#"
            version = 0

            [hotkey]
            modifiers = ["CTRL", "HYPER"]
            key = "nokey"

            [[targets]]
            type = "window-role"
            match = "x"

            [[targets]]
            type = "title"
            match = "   "

            [[targets]]
            type = "process"
            match = ""
            path_regex = "games"

            [ordering]
            mode = "random"

            [timing]
            restore_settle_ms = 999999
            "#,
        );

        assert_eq!(config.version, CURRENT_VERSION);
        assert_eq!(config.hotkey.modifiers, vec!["CTRL".to_string()]);
        assert_eq!(config.hotkey_binding().to_string(), "Ctrl+F12");
        // Остаётся только process-правило с path_regex
        assert_eq!(config.targets.len(), 1);
        assert_eq!(config.targets[0].kind, "process");
        assert_eq!(config.ordering_mode(), OrderingMode::ScreenLayout);
        assert_eq!(config.timing.restore_settle_ms, TimingConfig::default().restore_settle_ms);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let result = Config::from_figment(Figment::from(Toml::string("skip_invisible = \"maybe\"")));
        assert!(result.is_err());
    }

    #[test]
    fn test_store_replaces_snapshot_atomically() {
        let store = ConfigStore::with_config(PathBuf::from("unused.toml"), Config::default());
        let before = store.snapshot();

        let mut updated = Config::default();
        updated.compat_fallback = false;
        store.replace(updated);

        // Старый снимок не изменился, новый виден целиком
        assert!(before.compat_fallback);
        assert!(!store.snapshot().compat_fallback);
    }

    #[test]
    fn test_store_reload_keeps_previous_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wincycle.toml");
        std::fs::write(&path, "include_minimized = [").unwrap();

        let store = ConfigStore::with_config(path.clone(), Config::default());
        assert!(store.reload().is_err());
        assert!(!store.snapshot().include_minimized);

        std::fs::write(&path, "include_minimized = true").unwrap();
        assert!(store.reload().unwrap().include_minimized);
        assert!(store.snapshot().include_minimized);
    }
}
