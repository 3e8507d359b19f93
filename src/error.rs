use thiserror::Error;

#[derive(Error, Debug)]
pub enum CyclerError {
    #[error("Ошибка конфигурации: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Ошибка ввода-вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Горячая клавиша {binding} уже занята: {reason}")]
    HotkeyConflict { binding: String, reason: String },

    #[error("Поверхность приёма сообщений не инициализирована - вызовите init_surface() до регистрации")]
    SurfaceNotInitialized,

    #[error("Неизвестная клавиша: {0}")]
    InvalidKey(String),

    #[error("Ошибка оконной системы: {0}")]
    Platform(String),

    #[error("Сервис недоступен: {0}")]
    ServiceUnavailable(String),
}

impl CyclerError {
    pub fn hotkey_conflict(binding: impl Into<String>, reason: impl Into<String>) -> Self {
        CyclerError::HotkeyConflict {
            binding: binding.into(),
            reason: reason.into(),
        }
    }

    /// Конфликт горячей клавиши - единственная ошибка, на которую пользователь может отреагировать сразу
    pub fn is_hotkey_conflict(&self) -> bool {
        matches!(self, CyclerError::HotkeyConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, CyclerError>;

// Удобные макросы для создания ошибок
#[macro_export]
macro_rules! cycler_error {
    (platform, $($arg:tt)*) => {
        $crate::error::CyclerError::Platform(format!($($arg)*))
    };
    (invalid_key, $($arg:tt)*) => {
        $crate::error::CyclerError::InvalidKey(format!($($arg)*))
    };
    (service_unavailable, $($arg:tt)*) => {
        $crate::error::CyclerError::ServiceUnavailable(format!($($arg)*))
    };
}
