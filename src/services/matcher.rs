//! Typed window matchers compiled from configuration.
//!
//! A matcher never fails at match time: a malformed pattern produces a
//! matcher that matches nothing, so one bad rule cannot break the whole
//! filter pass.

use crate::config::TargetConfig;
use crate::events::WindowRecord;
use regex::{Regex, RegexBuilder};
use smallvec::SmallVec;
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatcherKind {
    Process,
    Class,
    Title,
}

impl MatcherKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_lowercase().as_str() {
            "process" | "exe" => Some(Self::Process),
            "class" => Some(Self::Class),
            "title" => Some(Self::Title),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Class => "class",
            Self::Title => "title",
        }
    }
}

impl fmt::Display for MatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TargetMatcher {
    kind: MatcherKind,
    source: String,
    /// Имя исполняемого файла в нижнем регистре (только process)
    exe_name: Option<String>,
    /// Регулярное выражение для class/title или для полного пути (process)
    regex: Option<Regex>,
    /// false, если хотя бы один шаблон не скомпилировался
    valid: bool,
}

impl TargetMatcher {
    /// Компилирует правило; None только для неизвестного типа
    pub fn compile(target: &TargetConfig) -> Option<Self> {
        let kind = MatcherKind::parse(&target.kind)?;
        let source = target.pattern.clone();

        let matcher = match kind {
            MatcherKind::Process => {
                let name = target.pattern.trim().to_lowercase();
                let path = target
                    .path_regex
                    .as_deref()
                    .filter(|p| !p.is_empty())
                    .map(|p| compile_regex(kind, p));

                Self {
                    kind,
                    source,
                    exe_name: (!name.is_empty()).then_some(name),
                    valid: !matches!(path, Some(None)),
                    regex: path.flatten(),
                }
            }
            MatcherKind::Class | MatcherKind::Title => {
                let regex = compile_regex(kind, &target.pattern);
                Self {
                    kind,
                    source,
                    exe_name: None,
                    valid: regex.is_some(),
                    regex,
                }
            }
        };

        Some(matcher)
    }

    pub fn kind(&self) -> MatcherKind {
        self.kind
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn matches(&self, window: &WindowRecord) -> bool {
        if !self.valid {
            return false;
        }

        match self.kind {
            MatcherKind::Process => {
                let by_name = self.exe_name.as_deref().is_some_and(|name| {
                    !window.executable_name.is_empty()
                        && window.executable_name.to_lowercase() == name
                });
                // Пустой путь (нет доступа к процессу) не сопоставляется с регуляркой
                by_name
                    || self.regex.as_ref().is_some_and(|re| {
                        !window.executable_path.is_empty() && re.is_match(&window.executable_path)
                    })
            }
            MatcherKind::Class => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(&window.class_name)),
            MatcherKind::Title => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(&window.title)),
        }
    }
}

impl fmt::Display for TargetMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.source)
    }
}

fn compile_regex(kind: MatcherKind, pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(
                "Неверное регулярное выражение '{}' в правиле {}: {}. Правило никогда не совпадёт",
                pattern, kind, e
            );
            None
        }
    }
}

/// Набор фильтров, сгруппированных по типу:
/// ИЛИ внутри группы, И между присутствующими группами.
#[derive(Debug, Clone, Default)]
pub struct MatcherSet {
    groups: SmallVec<[(MatcherKind, SmallVec<[TargetMatcher; 4]>); 3]>,
}

impl MatcherSet {
    pub fn compile(targets: &[TargetConfig]) -> Self {
        let mut set = Self::default();
        for matcher in targets.iter().filter_map(TargetMatcher::compile) {
            set.push(matcher);
        }
        set
    }

    pub fn push(&mut self, matcher: TargetMatcher) {
        if !matcher.is_valid() {
            debug!("Правило {} добавлено, но не будет совпадать", matcher);
        }
        let kind = matcher.kind();
        match self.groups.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, group)) => group.push(matcher),
            None => {
                let mut group = SmallVec::new();
                group.push(matcher);
                self.groups.push((kind, group));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.iter().map(|(_, group)| group.len()).sum()
    }

    /// Пустой набор пропускает всё
    pub fn matches(&self, window: &WindowRecord) -> bool {
        self.groups
            .iter()
            .all(|(_, group)| group.iter().any(|m| m.matches(window)))
    }
}
