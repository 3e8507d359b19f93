use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
mod config;
mod error;
mod events;
pub mod mappings;
mod services;
mod utils;

use config::ConfigStore;
use services::{create_window_system, WindowCycler};
use utils::SystemClock;

#[derive(Parser, Debug)]
#[command(name = "wincycle")]
#[command(about = "Переключение фокуса между выбранными окнами по глобальной горячей клавише")]
struct Args {
    /// Путь к файлу конфигурации
    #[arg(short, long, default_value = "wincycle.toml")]
    config: String,

    /// Режим сухого запуска (эмулированная оконная система)
    #[arg(long)]
    dry_run: bool,

    /// Уровень логирования
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Показать подходящие окна в порядке переключения и выйти
    #[arg(long)]
    scan: bool,

    /// Выполнить одно переключение и выйти
    #[arg(long, conflicts_with = "scan")]
    once: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Инициализация системы логирования
    init_tracing(&args.log_level)?;

    info!("Запуск wincycle v{}", env!("CARGO_PKG_VERSION"));

    // Ошибка в файле не фатальна: продолжаем со значениями по умолчанию
    let store = ConfigStore::open(&args.config);

    if args.dry_run {
        warn!("Режим сухого запуска - реальные окна не затрагиваются");
    }

    let system = create_window_system(args.dry_run)?;
    info!("Оконная система: {}", system.name());

    let (request_tx, mut requests) = mpsc::unbounded_channel();
    let mut cycler = WindowCycler::new(system, store.snapshot(), Arc::new(SystemClock), request_tx);

    if args.scan {
        print_scan(&cycler);
        return Ok(());
    }

    if args.once {
        // Тот же путь, что и у нажатия: через очередь запросов
        if cycler.listener().trigger() {
            if let Some(request) = requests.recv().await {
                debug!("Запрос на переключение: {}", request);
                let outcome = cycler.cycle().await;
                info!("Результат переключения: {}", outcome);
            }
        }
        return Ok(());
    }

    if let Err(e) = cycler.start() {
        error!("Не удалось зарегистрировать горячую клавишу: {}", e);
        if e.is_hotkey_conflict() {
            error!("Выберите другое сочетание в секции [hotkey] файла {}", args.config);
        }
        std::process::exit(1);
    }

    let failure_watch = tokio::spawn(watch_failures(cycler.subscribe_failures()));
    let mut reload_signal = ReloadSignal::new()?;

    info!(
        "Ожидание нажатий {} (Ctrl+C для выхода)",
        cycler.listener().description().unwrap_or_default()
    );

    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    warn!("Канал запросов закрыт");
                    break;
                };
                debug!("Запрос на переключение: {}", request);
                let outcome = cycler.cycle().await;
                info!("Результат переключения: {}", outcome);
            }
            _ = reload_signal.recv() => {
                info!("Получен SIGHUP - перезагрузка конфигурации");
                reload(&store, &mut cycler);
            }
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Получен сигнал завершения (Ctrl+C)"),
                    Err(err) => error!("Ошибка при ожидании сигнала завершения: {}", err),
                }
                break;
            }
        }
    }

    info!("Завершение работы...");
    if cycler.listener().is_registered() {
        cycler.listener_mut().unregister();
    }
    failure_watch.abort();

    info!("wincycle завершил работу");
    Ok(())
}

fn reload(store: &ConfigStore, cycler: &mut WindowCycler) {
    match store.reload() {
        Ok(config) => {
            if let Err(e) = cycler.reconfigure(config) {
                error!("Конфигурация применена частично: {}", e);
            }
        }
        Err(e) => warn!("Перезагрузка не удалась, остаётся прежняя конфигурация: {}", e),
    }
}

fn print_scan(cycler: &WindowCycler) {
    let windows = cycler.scan();
    if windows.is_empty() {
        println!("Подходящих окон нет");
        return;
    }

    println!("Окна в порядке переключения ({}):", windows.len());
    for (index, window) in windows.iter().enumerate() {
        println!(
            "{:>3}. {} [{}] {}{}",
            index + 1,
            window,
            window.class_name,
            window.bounds,
            if window.minimized { " (свёрнуто)" } else { "" }
        );
    }
}

async fn watch_failures(mut failures: broadcast::Receiver<events::ActivationFailure>) {
    loop {
        match failures.recv().await {
            Ok(failure) => debug!("Событие неудачной активации: {}", failure),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Пропущено {} событий неудачной активации", skipped)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(unix)]
struct ReloadSignal(signal::unix::Signal);

#[cfg(unix)]
impl ReloadSignal {
    fn new() -> Result<Self> {
        Ok(Self(signal::unix::signal(signal::unix::SignalKind::hangup())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct ReloadSignal;

#[cfg(not(unix))]
impl ReloadSignal {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}

fn init_tracing(level: &str) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .init();

    Ok(())
}
