use crate::config::Config;
use crate::error::Result;
use crate::events::{ActivationFailure, WindowHandle, WindowRecord};
use crate::services::focus_controller::{ActivationJournal, FocusController};
use crate::services::hotkey_listener::HotkeyListener;
use crate::services::window_enumerator::WindowEnumerator;
use crate::services::window_orderer::WindowOrderer;
use crate::services::window_system::{HotkeySink, WindowSystem};
use crate::utils::Clock;
use crate::debug_if_enabled;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Ни одно окно не прошло фильтры
    NoCandidates,
    Activated(WindowHandle),
    Failed(WindowHandle),
}

impl fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleOutcome::NoCandidates => write!(f, "нет подходящих окон"),
            CycleOutcome::Activated(window) => write!(f, "активировано {}", window),
            CycleOutcome::Failed(window) => write!(f, "не удалось активировать {}", window),
        }
    }
}

/// One cycle = enumerate, order, pick the next window after the current
/// foreground one, activate it. Components are rebuilt from scratch when the
/// configuration changes; the activation journal and the failure channel
/// outlive them.
pub struct WindowCycler {
    config: Arc<Config>,
    system: Arc<dyn WindowSystem>,
    clock: Arc<dyn Clock>,
    journal: ActivationJournal,
    failures: broadcast::Sender<ActivationFailure>,
    enumerator: WindowEnumerator,
    orderer: WindowOrderer,
    focus: FocusController,
    listener: HotkeyListener,
}

impl WindowCycler {
    pub fn new(
        system: Arc<dyn WindowSystem>,
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        sink: HotkeySink,
    ) -> Self {
        let journal = ActivationJournal::new();
        let focus = FocusController::new(system.clone(), &config, clock.clone(), journal.clone());
        let failures = focus.failure_channel();

        Self {
            enumerator: WindowEnumerator::new(system.clone(), &config),
            orderer: WindowOrderer::new(&config),
            listener: HotkeyListener::new(system.clone(), sink),
            focus,
            failures,
            journal,
            clock,
            system,
            config,
        }
    }

    /// Создаёт поверхность и регистрирует горячую клавишу из конфигурации
    pub fn start(&mut self) -> Result<()> {
        self.listener.init_surface()?;
        self.listener.register(self.config.hotkey_binding())
    }

    pub fn listener(&self) -> &HotkeyListener {
        &self.listener
    }

    pub fn listener_mut(&mut self) -> &mut HotkeyListener {
        &mut self.listener
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<ActivationFailure> {
        self.failures.subscribe()
    }

    /// Текущие кандидаты в порядке переключения
    pub fn scan(&self) -> Vec<WindowRecord> {
        let mut windows = self.enumerator.find_target_windows();
        self.focus.apply_activation_history(&mut windows);
        self.orderer.order_windows(windows)
    }

    pub async fn cycle(&mut self) -> CycleOutcome {
        let ordered = self.scan();
        let current = self.system.foreground_window();

        let Some(next) = self.orderer.get_next(&ordered, current) else {
            info!("Нет подходящих окон для переключения");
            return CycleOutcome::NoCandidates;
        };
        if !self.focus.is_window_valid(next.handle) {
            warn!("Окно {} исчезло до активации", next);
            return CycleOutcome::Failed(next.handle);
        }
        debug_if_enabled!(
            "Кандидатов: {}, текущее окно: {:?}, следующее: {}",
            ordered.len(),
            current,
            next
        );

        let mut target = next.clone();
        if self.focus.activate_window(&mut target).await {
            CycleOutcome::Activated(target.handle)
        } else {
            CycleOutcome::Failed(target.handle)
        }
    }

    /// Applies a new configuration snapshot. The hotkey is re-registered only
    /// once the surface exists and the binding changed; if the new binding
    /// cannot be registered the previous one is restored and the conflict is
    /// returned. Before `start()` only the components are rebuilt.
    pub fn reconfigure(&mut self, config: Arc<Config>) -> Result<()> {
        self.enumerator = WindowEnumerator::new(self.system.clone(), &config);
        self.orderer = WindowOrderer::new(&config);
        self.focus = FocusController::new(
            self.system.clone(),
            &config,
            self.clock.clone(),
            self.journal.clone(),
        )
        .with_failure_channel(self.failures.clone());

        let binding = config.hotkey_binding();
        let previous = self.listener.binding();
        self.config = config;
        info!("Конфигурация применена (режим порядка: {})", self.orderer.mode());

        if !self.listener.is_surface_ready() {
            debug_if_enabled!("Поверхность не создана, {} будет зарегистрирована при запуске", binding);
            return Ok(());
        }
        if previous == Some(binding) {
            return Ok(());
        }

        if let Err(e) = self.listener.register(binding) {
            warn!("Новая горячая клавиша {} не зарегистрирована: {}", binding, e);
            if let Some(previous) = previous {
                if let Err(restore) = self.listener.register(previous) {
                    error!("Не удалось вернуть горячую клавишу {}: {}", previous, restore);
                }
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::error::CyclerError;
    use crate::events::HotkeyBinding;
    use crate::services::window_system::fake::{FakeWindow, FakeWindowSystem, FocusPolicy};
    use crate::utils::clock::ManualClock;
    use tokio::sync::mpsc;

    fn game(raw: u64, left: i32, top: i32) -> FakeWindow {
        FakeWindow::new(raw, &format!("Client {}", raw))
            .with_image(r"C:\Games\game.exe")
            .at(left, top)
    }

    fn setup(config: Config) -> (Arc<FakeWindowSystem>, WindowCycler, mpsc::UnboundedReceiver<crate::events::CycleRequest>) {
        let system = Arc::new(FakeWindowSystem::with_windows(vec![
            game(1, 800, 0),
            game(2, 0, 0),
            game(3, 0, 600),
            FakeWindow::new(4, "Notes").with_image(r"C:\Windows\notepad.exe").at(400, 0),
        ]));
        let (tx, rx) = mpsc::unbounded_channel();
        let cycler = WindowCycler::new(system.clone(), Arc::new(config), Arc::new(ManualClock::default()), tx);
        (system, cycler, rx)
    }

    fn games_only() -> Config {
        Config {
            targets: vec![TargetConfig::new("process", "game.exe")],
            ..Config::default()
        }
    }

    fn handle(raw: u64) -> WindowHandle {
        WindowHandle::new(raw)
    }

    #[tokio::test]
    async fn test_cycle_walks_screen_layout_and_wraps() {
        let (system, mut cycler, _rx) = setup(games_only());
        system.set_foreground(Some(handle(4)));

        // Раскладка: 2 (0,0), 1 (800,0), 3 (0,600)
        assert_eq!(cycler.cycle().await, CycleOutcome::Activated(handle(2)));
        assert_eq!(cycler.cycle().await, CycleOutcome::Activated(handle(1)));
        assert_eq!(cycler.cycle().await, CycleOutcome::Activated(handle(3)));
        assert_eq!(cycler.cycle().await, CycleOutcome::Activated(handle(2)));
        assert_eq!(system.foreground_window(), Some(handle(2)));
    }

    #[tokio::test]
    async fn test_cycle_without_candidates() {
        let config = Config {
            targets: vec![TargetConfig::new("title", "^nothing matches$")],
            ..Config::default()
        };
        let (system, mut cycler, _rx) = setup(config);

        assert_eq!(cycler.cycle().await, CycleOutcome::NoCandidates);
        assert!(system.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_reports_failure() {
        let mut failures_config = games_only();
        failures_config.compat_fallback = false;
        let (system, mut cycler, _rx) = setup(failures_config);
        let mut failures = cycler.subscribe_failures();
        system.set_policy(FocusPolicy::Deny);

        assert_eq!(cycler.cycle().await, CycleOutcome::Failed(handle(2)));
        assert_eq!(failures.try_recv().unwrap().window.handle, handle(2));
    }

    #[tokio::test]
    async fn test_last_active_uses_history_across_cycles() {
        let config = Config {
            ordering: crate::config::OrderingConfig {
                mode: "lastActive".to_string(),
                manual: Vec::new(),
            },
            ..games_only()
        };
        let (system, mut cycler, _rx) = setup(config);
        system.set_foreground(Some(handle(4)));

        // Истории нет: первая по раскладке
        assert_eq!(cycler.cycle().await, CycleOutcome::Activated(handle(2)));
        let order: Vec<WindowHandle> = cycler.scan().iter().map(|w| w.handle).collect();
        assert_eq!(order, vec![handle(2), handle(1), handle(3)]);

        assert_eq!(cycler.cycle().await, CycleOutcome::Activated(handle(1)));
        let order: Vec<WindowHandle> = cycler.scan().iter().map(|w| w.handle).collect();
        assert_eq!(order, vec![handle(1), handle(2), handle(3)]);
    }

    #[tokio::test]
    async fn test_start_registers_configured_hotkey() {
        let (system, mut cycler, mut rx) = setup(games_only());
        cycler.start().unwrap();

        assert_eq!(cycler.listener().description().as_deref(), Some("Ctrl+Alt+F12"));
        assert!(system.press_hotkey());
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_start_reports_conflict() {
        let (system, mut cycler, _rx) = setup(games_only());
        system.reserve_binding(HotkeyBinding::parse("Ctrl+Alt+F12").unwrap());

        let err = cycler.start().unwrap_err();
        assert!(err.is_hotkey_conflict());
    }

    #[tokio::test]
    async fn test_reconfigure_rebuilds_components() {
        let (system, mut cycler, _rx) = setup(games_only());
        cycler.start().unwrap();
        assert_eq!(cycler.scan().len(), 3);

        let mut config = Config::default();
        config.hotkey.modifiers = vec!["SHIFT".to_string()];
        config.hotkey.key = "F9".to_string();
        cycler.reconfigure(Arc::new(config)).unwrap();

        assert_eq!(cycler.scan().len(), 4);
        assert_eq!(
            system.registered_hotkey(1).map(|(binding, _)| binding.to_string()),
            Some("Shift+F9".to_string())
        );
    }

    #[tokio::test]
    async fn test_reconfigure_conflict_keeps_previous_hotkey() {
        let (system, mut cycler, _rx) = setup(games_only());
        cycler.start().unwrap();
        system.reserve_binding(HotkeyBinding::parse("Shift+F9").unwrap());

        let mut config = games_only();
        config.hotkey.modifiers = vec!["SHIFT".to_string()];
        config.hotkey.key = "F9".to_string();

        let result = cycler.reconfigure(Arc::new(config));
        assert!(matches!(result, Err(CyclerError::HotkeyConflict { .. })));
        assert_eq!(cycler.listener().description().as_deref(), Some("Ctrl+Alt+F12"));
    }

    #[tokio::test]
    async fn test_reconfigure_before_start_defers_hotkey() {
        let (system, mut cycler, _rx) = setup(games_only());

        let mut config = Config::default();
        config.hotkey.key = "F9".to_string();
        cycler.reconfigure(Arc::new(config)).unwrap();

        assert_eq!(cycler.scan().len(), 4);
        assert!(system.registered_hotkey(1).is_none());

        // start() берёт привязку из новой конфигурации
        cycler.start().unwrap();
        assert_eq!(
            system.registered_hotkey(1).map(|(binding, _)| binding.to_string()),
            Some("Ctrl+Alt+F9".to_string())
        );
    }

    #[tokio::test]
    async fn test_journal_survives_reconfigure() {
        let (_system, mut cycler, _rx) = setup(games_only());
        assert_eq!(cycler.cycle().await, CycleOutcome::Activated(handle(2)));

        cycler.reconfigure(Arc::new(games_only())).unwrap();
        let stamped = cycler.scan().into_iter().filter(|w| w.was_activated()).count();
        assert_eq!(stamped, 1);
    }
}
