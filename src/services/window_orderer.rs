use crate::config::Config;
use crate::events::{WindowHandle, WindowRecord};
use crate::services::matcher::TargetMatcher;
use std::cmp::Reverse;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderingMode {
    /// Порядок задаётся списком правил
    Manual,
    /// Последние активированные окна первыми
    LastActive,
    /// Сверху вниз, слева направо
    #[default]
    ScreenLayout,
}

impl OrderingMode {
    pub fn parse(mode: &str) -> Option<Self> {
        match mode.trim().to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "lastactive" | "last_active" => Some(Self::LastActive),
            "screenlayout" | "screen_layout" => Some(Self::ScreenLayout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::LastActive => "lastActive",
            Self::ScreenLayout => "screenLayout",
        }
    }
}

impl fmt::Display for OrderingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderingSpec {
    pub mode: OrderingMode,
    /// Ключи ручного порядка, в порядке приоритета
    pub manual: Vec<TargetMatcher>,
}

impl OrderingSpec {
    pub fn from_config(config: &Config) -> Self {
        Self {
            mode: config.ordering_mode(),
            manual: config
                .ordering
                .manual
                .iter()
                .filter_map(TargetMatcher::compile)
                .collect(),
        }
    }
}

/// Orders candidate windows and picks the next one to focus.
///
/// Pure: no OS calls, no state besides the compiled ordering spec.
#[derive(Debug, Clone, Default)]
pub struct WindowOrderer {
    spec: OrderingSpec,
}

impl WindowOrderer {
    pub fn new(config: &Config) -> Self {
        Self::with_spec(OrderingSpec::from_config(config))
    }

    pub fn with_spec(spec: OrderingSpec) -> Self {
        Self { spec }
    }

    pub fn mode(&self) -> OrderingMode {
        self.spec.mode
    }

    pub fn order_windows(&self, mut windows: Vec<WindowRecord>) -> Vec<WindowRecord> {
        match self.spec.mode {
            OrderingMode::ScreenLayout => {
                sort_by_layout(&mut windows);
                windows
            }
            OrderingMode::LastActive => {
                windows.sort_by_key(|w| (Reverse(w.last_activated), w.bounds.top, w.bounds.left));
                windows
            }
            OrderingMode::Manual if self.spec.manual.is_empty() => {
                sort_by_layout(&mut windows);
                windows
            }
            OrderingMode::Manual => {
                // Порядок перечисления меняется после каждой активации
                sort_by_layout(&mut windows);
                self.order_manual(windows)
            }
        }
    }

    fn order_manual(&self, windows: Vec<WindowRecord>) -> Vec<WindowRecord> {
        let mut placed = vec![false; windows.len()];
        let mut order = Vec::with_capacity(windows.len());

        for matcher in &self.spec.manual {
            for (index, window) in windows.iter().enumerate() {
                if !placed[index] && matcher.matches(window) {
                    placed[index] = true;
                    order.push(index);
                }
            }
        }
        order.extend((0..windows.len()).filter(|&index| !placed[index]));

        let mut slots: Vec<Option<WindowRecord>> = windows.into_iter().map(Some).collect();
        order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .collect()
    }

    /// Следующее окно после `current`; если текущее не в списке, первое
    pub fn get_next<'a>(
        &self,
        ordered: &'a [WindowRecord],
        current: Option<WindowHandle>,
    ) -> Option<&'a WindowRecord> {
        if ordered.len() <= 1 {
            return ordered.first();
        }

        let position = current.and_then(|handle| ordered.iter().position(|w| w.handle == handle));
        match position {
            Some(index) => ordered.get((index + 1) % ordered.len()),
            None => ordered.first(),
        }
    }
}

fn sort_by_layout(windows: &mut [WindowRecord]) {
    windows.sort_by_key(|w| (w.bounds.top, w.bounds.left));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetConfig;
    use crate::events::WindowBounds;

    fn at(raw: u64, left: i32, top: i32) -> WindowRecord {
        WindowRecord::new(WindowHandle::new(raw)).with_bounds(WindowBounds::new(left, top, left + 100, top + 100))
    }

    fn orderer(mode: OrderingMode, manual: &[TargetConfig]) -> WindowOrderer {
        WindowOrderer::with_spec(OrderingSpec {
            mode,
            manual: manual.iter().filter_map(TargetMatcher::compile).collect(),
        })
    }

    fn handles(windows: &[WindowRecord]) -> Vec<u64> {
        windows.iter().map(|w| w.handle.value()).collect()
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!(OrderingMode::parse("lastActive"), Some(OrderingMode::LastActive));
        assert_eq!(OrderingMode::parse("screen_layout"), Some(OrderingMode::ScreenLayout));
        assert_eq!(OrderingMode::parse("MANUAL"), Some(OrderingMode::Manual));
        assert_eq!(OrderingMode::parse("random"), None);
        assert_eq!(OrderingMode::ScreenLayout.to_string(), "screenLayout");
    }

    #[test]
    fn test_screen_layout_top_then_left() {
        let orderer = orderer(OrderingMode::ScreenLayout, &[]);
        let ordered = orderer.order_windows(vec![at(1, 0, 10), at(2, 100, 10), at(3, 0, 5)]);

        let positions: Vec<(i32, i32)> = ordered.iter().map(|w| (w.bounds.top, w.bounds.left)).collect();
        assert_eq!(positions, vec![(5, 0), (10, 0), (10, 100)]);
        assert_eq!(handles(&ordered), vec![3, 1, 2]);
    }

    #[test]
    fn test_screen_layout_is_stable() {
        let orderer = orderer(OrderingMode::ScreenLayout, &[]);
        let ordered = orderer.order_windows(vec![at(7, 0, 0), at(3, 0, 0), at(5, 0, 0)]);
        assert_eq!(handles(&ordered), vec![7, 3, 5]);
    }

    #[test]
    fn test_last_active_with_layout_tiebreak() {
        let orderer = orderer(OrderingMode::LastActive, &[]);
        let mut a = at(1, 0, 0);
        a.last_activated = 100;
        let mut b = at(2, 0, 0);
        b.last_activated = 300;
        let c = at(3, 50, 20);
        let d = at(4, 0, 20);

        let ordered = orderer.order_windows(vec![a, b, c, d]);
        // Никогда не активированные окна (0) в конце, по раскладке
        assert_eq!(handles(&ordered), vec![2, 1, 4, 3]);
    }

    #[test]
    fn test_manual_order_by_matchers() {
        let orderer = orderer(
            OrderingMode::Manual,
            &[TargetConfig::new("title", "^M1$"), TargetConfig::new("title", "^M2$")],
        );
        let w1 = at(1, 0, 0).with_title("M2");
        let w2 = at(2, 0, 0).with_title("M1");
        let w3 = at(3, 0, 0).with_title("other");

        let ordered = orderer.order_windows(vec![w1, w2, w3]);
        assert_eq!(handles(&ordered), vec![2, 1, 3]);
    }

    #[test]
    fn test_manual_window_placed_once() {
        let orderer = orderer(
            OrderingMode::Manual,
            &[TargetConfig::new("title", "client"), TargetConfig::new("title", "main")],
        );
        let ordered = orderer.order_windows(vec![
            at(1, 0, 0).with_title("main"),
            at(2, 0, 0).with_title("main client"),
            at(3, 0, 0).with_title("client"),
        ]);
        assert_eq!(handles(&ordered), vec![2, 3, 1]);
    }

    #[test]
    fn test_manual_group_is_layout_sorted() {
        let orderer = orderer(OrderingMode::Manual, &[TargetConfig::new("title", "^client$")]);
        let clients = [at(1, 800, 0), at(2, 0, 0), at(3, 0, 600)].map(|w| w.with_title("client"));
        let other = at(4, 400, 0).with_title("other");
        let rest = at(5, 0, 300).with_title("other");

        // Z-порядок после активации: другое окно впереди
        let first = orderer.order_windows(vec![
            other.clone(),
            clients[2].clone(),
            clients[0].clone(),
            rest.clone(),
            clients[1].clone(),
        ]);
        let second = orderer.order_windows(vec![
            clients[1].clone(),
            rest,
            clients[0].clone(),
            other,
            clients[2].clone(),
        ]);

        assert_eq!(handles(&first), vec![2, 1, 3, 4, 5]);
        assert_eq!(handles(&second), handles(&first));
    }

    #[test]
    fn test_manual_without_matchers_falls_back_to_layout() {
        let orderer = orderer(OrderingMode::Manual, &[]);
        let ordered = orderer.order_windows(vec![at(1, 0, 50), at(2, 0, 10)]);
        assert_eq!(handles(&ordered), vec![2, 1]);
    }

    #[test]
    fn test_get_next_cycles() {
        let orderer = WindowOrderer::default();
        let list = vec![at(0xA, 0, 0), at(0xB, 0, 0), at(0xC, 0, 0)];

        let next = |current: u64| orderer.get_next(&list, Some(WindowHandle::new(current))).map(|w| w.handle.value());
        assert_eq!(next(0xB), Some(0xC));
        assert_eq!(next(0xC), Some(0xA));
        assert_eq!(next(0xD), Some(0xA));
        assert_eq!(orderer.get_next(&list, None).map(|w| w.handle.value()), Some(0xA));
    }

    #[test]
    fn test_get_next_degenerate_lists() {
        let orderer = WindowOrderer::default();
        let single = vec![at(0xA, 0, 0)];
        assert_eq!(
            orderer.get_next(&single, Some(WindowHandle::new(0xA))).map(|w| w.handle.value()),
            Some(0xA)
        );
        assert_eq!(
            orderer.get_next(&single, Some(WindowHandle::new(0xF))).map(|w| w.handle.value()),
            Some(0xA)
        );
        assert!(orderer.get_next(&[], Some(WindowHandle::new(0xA))).is_none());
    }
}
