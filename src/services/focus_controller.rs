use crate::config::Config;
use crate::debug_if_enabled;
use crate::events::{ActivationFailure, WindowHandle, WindowRecord};
use crate::services::window_system::WindowSystem;
use crate::utils::Clock;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const FAILURE_CHANNEL_CAPACITY: usize = 16;

/// Remembers when each window was last activated by us.
///
/// Records are re-enumerated on every cycle, so the stamps have to live
/// somewhere else. Cloning shares the same map.
#[derive(Debug, Clone, Default)]
pub struct ActivationJournal {
    stamps: Arc<DashMap<WindowHandle, u64>>,
}

impl ActivationJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, window: WindowHandle, stamp: u64) {
        self.stamps.insert(window, stamp);
    }

    pub fn stamp(&self, window: WindowHandle) -> Option<u64> {
        self.stamps.get(&window).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    fn retain(&self, keep: impl FnMut(&WindowHandle, &mut u64) -> bool) {
        self.stamps.retain(keep);
    }
}

/// Присоединение ввода к чужому потоку; отсоединяется в Drop на любом пути
struct InputAttachment<'a> {
    system: &'a dyn WindowSystem,
    thread_id: u32,
    target_thread_id: u32,
}

impl<'a> InputAttachment<'a> {
    fn attach(system: &'a dyn WindowSystem, thread_id: u32, target_thread_id: u32) -> Option<Self> {
        if !system.attach_thread_input(thread_id, target_thread_id, true) {
            return None;
        }
        debug_if_enabled!("Ввод потока {} присоединён к потоку {}", thread_id, target_thread_id);
        Some(Self {
            system,
            thread_id,
            target_thread_id,
        })
    }
}

impl Drop for InputAttachment<'_> {
    fn drop(&mut self) {
        if !self
            .system
            .attach_thread_input(self.thread_id, self.target_thread_id, false)
        {
            warn!(
                "Не удалось отсоединить ввод потока {} от потока {}",
                self.thread_id, self.target_thread_id
            );
        }
    }
}

/// Brings a window to the foreground and confirms the OS actually did it.
pub struct FocusController {
    system: Arc<dyn WindowSystem>,
    clock: Arc<dyn Clock>,
    journal: ActivationJournal,
    compat_fallback: bool,
    restore_settle: Duration,
    verify_settle: Duration,
    failures: broadcast::Sender<ActivationFailure>,
}

impl FocusController {
    pub fn new(
        system: Arc<dyn WindowSystem>,
        config: &Config,
        clock: Arc<dyn Clock>,
        journal: ActivationJournal,
    ) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            system,
            clock,
            journal,
            compat_fallback: config.compat_fallback,
            restore_settle: config.restore_settle(),
            verify_settle: config.verify_settle(),
            failures,
        }
    }

    /// Publish failures into an existing channel so subscribers survive a rebuild
    pub fn with_failure_channel(mut self, failures: broadcast::Sender<ActivationFailure>) -> Self {
        self.failures = failures;
        self
    }

    pub fn failure_channel(&self) -> broadcast::Sender<ActivationFailure> {
        self.failures.clone()
    }

    #[cfg(test)]
    pub fn subscribe_failures(&self) -> broadcast::Receiver<ActivationFailure> {
        self.failures.subscribe()
    }

    #[cfg(test)]
    pub fn journal(&self) -> &ActivationJournal {
        &self.journal
    }

    pub async fn activate_window(&self, window: &mut WindowRecord) -> bool {
        let handle = window.handle;
        debug_if_enabled!("Активация окна {}", window);

        let minimized = self
            .system
            .window_state(handle)
            .map(|state| state.minimized)
            .unwrap_or(window.minimized);
        if minimized {
            if !self.system.restore_window(handle) {
                debug!("Запрос восстановления окна {} не принят", handle);
            }
            self.clock.settle(self.restore_settle).await;
            window.minimized = false;
        }

        if self.request_and_verify(handle).await {
            self.confirm(window);
            return true;
        }

        if self.compat_fallback {
            debug_if_enabled!("Основной запрос фокуса для {} не сработал, пробуем с присоединением ввода", handle);
            if self.fallback(handle).await {
                self.confirm(window);
                return true;
            }
        }

        warn!("Не удалось активировать окно {}", window);
        self.system.flash_window(handle);
        // Нет подписчиков - не ошибка
        let _ = self
            .failures
            .send(ActivationFailure::new(window.clone(), self.compat_fallback));
        false
    }

    async fn fallback(&self, handle: WindowHandle) -> bool {
        let own_thread = self.system.current_thread_id();
        let foreign_thread = self
            .system
            .foreground_window()
            .and_then(|foreground| self.system.window_owner(foreground).ok())
            .map(|owner| owner.thread_id)
            .filter(|&thread| thread != 0 && thread != own_thread);

        let Some(target_thread) = foreign_thread else {
            return self.request_and_verify(handle).await;
        };

        match InputAttachment::attach(self.system.as_ref(), own_thread, target_thread) {
            Some(_attachment) => self.request_and_verify(handle).await,
            None => {
                debug!("Не удалось присоединить ввод к потоку {}", target_thread);
                self.request_and_verify(handle).await
            }
        }
    }

    async fn request_and_verify(&self, handle: WindowHandle) -> bool {
        if !self.system.request_foreground(handle) {
            return false;
        }
        self.clock.settle(self.verify_settle).await;
        self.system.foreground_window() == Some(handle)
    }

    fn confirm(&self, window: &mut WindowRecord) {
        let previous = self.journal.stamp(window.handle).unwrap_or(0).max(window.last_activated);
        let stamp = self.clock.now().max(previous + 1);

        window.last_activated = stamp;
        self.journal.record(window.handle, stamp);
        info!("Окно {} активировано", window);
    }

    /// Живое окно, которое можно показать пользователю
    pub fn is_window_valid(&self, handle: WindowHandle) -> bool {
        self.system.is_window(handle)
            && self
                .system
                .window_state(handle)
                .is_ok_and(|state| state.visible || state.minimized)
    }

    /// Copies remembered activation stamps onto freshly enumerated records and
    /// forgets windows that no longer exist.
    pub fn apply_activation_history(&self, windows: &mut [WindowRecord]) {
        let enumerated: HashSet<WindowHandle> = windows.iter().map(|w| w.handle).collect();
        self.journal
            .retain(|handle, _| enumerated.contains(handle) || self.system.is_window(*handle));
        if self.journal.is_empty() {
            return;
        }
        debug_if_enabled!("История активаций: {} окон", self.journal.len());

        for window in windows.iter_mut() {
            if let Some(stamp) = self.journal.stamp(window.handle) {
                window.last_activated = stamp;
            }
        }
    }
}
