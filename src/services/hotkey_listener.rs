use crate::error::{CyclerError, Result};
use crate::events::{CycleRequest, HotkeyBinding};
use crate::services::window_system::{HotkeySink, WindowSystem};
use std::sync::Arc;
use tracing::{info, warn};

/// Идентификатор единственной глобальной горячей клавиши
const HOTKEY_ID: i32 = 1;

/// Owns the single global hotkey and turns presses into cycle requests.
pub struct HotkeyListener {
    system: Arc<dyn WindowSystem>,
    sink: HotkeySink,
    surface_ready: bool,
    binding: Option<HotkeyBinding>,
}

impl HotkeyListener {
    pub fn new(system: Arc<dyn WindowSystem>, sink: HotkeySink) -> Self {
        Self {
            system,
            sink,
            surface_ready: false,
            binding: None,
        }
    }

    /// Создаёт поверхность приёма сообщений; повторный вызов ничего не делает
    pub fn init_surface(&mut self) -> Result<()> {
        if self.surface_ready {
            return Ok(());
        }
        self.system.create_hotkey_surface(self.sink.clone())?;
        self.surface_ready = true;
        Ok(())
    }

    pub fn register(&mut self, binding: HotkeyBinding) -> Result<()> {
        if !self.surface_ready {
            return Err(CyclerError::SurfaceNotInitialized);
        }
        if self.binding.is_some() {
            self.unregister();
        }

        match self.system.register_hotkey(HOTKEY_ID, binding, true) {
            Ok(()) => {
                info!("Горячая клавиша {} зарегистрирована", binding);
                self.binding = Some(binding);
                Ok(())
            }
            Err(e @ (CyclerError::HotkeyConflict { .. } | CyclerError::SurfaceNotInitialized)) => Err(e),
            Err(e) => Err(CyclerError::hotkey_conflict(binding.to_string(), e.to_string())),
        }
    }

    /// Снимает регистрацию; без зарегистрированной клавиши ничего не делает
    pub fn unregister(&mut self) {
        let Some(binding) = self.binding.take() else {
            return;
        };
        match self.system.unregister_hotkey(HOTKEY_ID) {
            Ok(()) => info!("Горячая клавиша {} снята", binding),
            Err(e) => warn!("Не удалось снять горячую клавишу {}: {}", binding, e),
        }
    }

    pub fn is_surface_ready(&self) -> bool {
        self.surface_ready
    }

    pub fn is_registered(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<HotkeyBinding> {
        self.binding
    }

    /// Текст вида "Ctrl+Alt+F4" для активной клавиши
    pub fn description(&self) -> Option<String> {
        self.binding.map(|binding| binding.to_string())
    }

    /// Ставит в очередь ручной запрос переключения
    pub fn trigger(&self) -> bool {
        self.sink.send(CycleRequest::manual()).is_ok()
    }
}

impl Drop for HotkeyListener {
    fn drop(&mut self) {
        self.unregister();
    }
}
