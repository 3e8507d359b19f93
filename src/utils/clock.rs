#[cfg(test)]
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of activation timestamps and of the short settle delays used while
/// the OS applies a requested window state change.
///
/// Settling is a cooperative yield on the calling task, never a wait on a
/// worker thread: window-management calls are tied to the caller's thread.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    /// Current time in milliseconds; never returns 0.
    fn now(&self) -> u64;

    /// Yield for roughly `duration` to let the OS settle.
    async fn settle(&self, duration: Duration);
}

/// Wall clock + tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
            .max(1)
    }

    async fn settle(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

/// Виртуальные часы: settle() сдвигает время мгновенно, без реального ожидания
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
    settles: AtomicUsize,
}

#[cfg(test)]
impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_000)
    }
}

#[cfg(test)]
impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis.max(1)),
            settles: AtomicUsize::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        self.millis
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    /// Сколько раз вызывался settle()
    pub fn settle_count(&self) -> usize {
        self.settles.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }

    async fn settle(&self, duration: Duration) {
        self.settles.fetch_add(1, Ordering::SeqCst);
        // Минимум 1 мс, чтобы последовательные метки активации строго росли
        self.advance(duration.max(Duration::from_millis(1)));
    }
}
