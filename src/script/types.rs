//! # Script Types
//!
//! Общие типы сценария: виды компонентов, компоненты, таймлайн и
//! разбиение обратного отсчёта на три доли.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Фиксированная фраза, которую озвучивает обратный отсчёт
pub const COUNTDOWN_SPOKEN_TEXT: &str = "Three. Two. One.";

/// Метки долей обратного отсчёта в порядке воспроизведения
pub const COUNTDOWN_LABELS: [&str; 3] = ["3", "2", "1"];

/// Вид компонента таймлайна
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Question,
    Countdown,
    Answer,
    Cta,
    Intro,
}

impl ComponentKind {
    /// Ключевое слово в грамматике сценария
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Question => "QUESTION",
            Self::Countdown => "COUNTDOWN",
            Self::Answer => "ANSWER",
            Self::Cta => "CTA",
            Self::Intro => "INTRO",
        }
    }

    /// Короткое имя для файлов и логов
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Question => "question",
            Self::Countdown => "countdown",
            Self::Answer => "answer",
            Self::Cta => "cta",
            Self::Intro => "intro",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

impl FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "QUESTION" => Ok(Self::Question),
            "COUNTDOWN" => Ok(Self::Countdown),
            "ANSWER" => Ok(Self::Answer),
            "CTA" => Ok(Self::Cta),
            "INTRO" => Ok(Self::Intro),
            other => Err(format!("unknown component kind '{}'", other)),
        }
    }
}

/// Идентификатор компонента: его позиция в таймлайне
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub usize);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Один временной блок сценария
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Позиция в таймлайне
    pub id: ComponentId,
    /// Вид компонента
    pub kind: ComponentKind,
    /// Начало слота в секундах
    pub start_time: f64,
    /// Конец слота в секундах
    pub end_time: f64,
    /// Отображаемый текст
    pub content: String,
}

impl Component {
    /// Длительность слота
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Метка вида `answer#2` для логов и ошибок
    pub fn label(&self) -> String {
        format!("{}#{}", self.kind.slug(), self.id)
    }

    /// Три доли обратного отсчёта; `None` для остальных видов
    pub fn countdown_beats(&self) -> Option<[CountdownBeat; 3]> {
        match self.kind {
            ComponentKind::Countdown => Some(split_into_beats(self.start_time, self.end_time)),
            ComponentKind::Question
            | ComponentKind::Answer
            | ComponentKind::Cta
            | ComponentKind::Intro => None,
        }
    }
}

/// Одна доля обратного отсчёта: `[start, end)` и цифра на экране
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountdownBeat {
    /// Номер доли (0, 1, 2)
    pub index: usize,
    /// Начало доли в секундах таймлайна
    pub start: f64,
    /// Конец доли в секундах таймлайна
    pub end: f64,
    /// Цифра ("3", "2", "1")
    pub label: &'static str,
}

impl CountdownBeat {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Делит интервал на три равные доли; последняя заканчивается ровно в `end`
pub(crate) fn split_into_beats(start: f64, end: f64) -> [CountdownBeat; 3] {
    let step = (end - start) / 3.0;
    let bound = |i: usize| if i == 3 { end } else { start + i as f64 * step };
    [0, 1, 2].map(|i| CountdownBeat {
        index: i,
        start: bound(i),
        end: bound(i + 1),
        label: COUNTDOWN_LABELS[i],
    })
}

/// Параметры вставки интро перед сценарием
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroSpec {
    /// Текст интро
    pub text: String,
    /// Длительность интро в секундах
    pub duration: f64,
}

impl IntroSpec {
    pub fn new(text: impl Into<String>, duration: f64) -> Self {
        Self {
            text: text.into(),
            duration,
        }
    }

    /// Текст интро одной строкой: пробелы и переводы строк схлопнуты
    pub fn normalized_text(&self) -> String {
        self.text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Интро вставляется только при непустом тексте и положительной длительности
    pub fn is_active(&self) -> bool {
        !self.text.trim().is_empty() && self.duration > 0.0
    }
}

/// Строка сценария, отброшенная парсером
#[derive(Debug, Clone, PartialEq)]
pub struct ParseWarning {
    /// Номер строки (с единицы)
    pub line_number: usize,
    /// Исходный текст строки
    pub line: String,
    /// Причина отбрасывания
    pub reason: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} ('{}')", self.line_number, self.reason, self.line)
    }
}

/// Упорядоченный неизменяемый набор компонентов
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Timeline {
    components: Vec<Component>,
    total_duration: f64,
}

impl Timeline {
    /// Построить таймлайн: сдвиг под интро (ровно один раз), вставка INTRO,
    /// сортировка по началу и назначение идентификаторов
    pub(crate) fn build(mut components: Vec<Component>, intro: Option<&IntroSpec>) -> Self {
        if let Some(intro) = intro.filter(|intro| intro.is_active()) {
            for component in &mut components {
                component.start_time += intro.duration;
                component.end_time += intro.duration;
            }
            components.insert(
                0,
                Component {
                    id: ComponentId(0),
                    kind: ComponentKind::Intro,
                    start_time: 0.0,
                    end_time: intro.duration,
                    content: intro.normalized_text(),
                },
            );
        }

        // Стабильная сортировка сохраняет порядок строк при равных началах
        components.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        for (index, component) in components.iter_mut().enumerate() {
            component.id = ComponentId(index);
        }

        let total_duration = components
            .iter()
            .map(|c| c.end_time)
            .fold(0.0_f64, f64::max);

        Self {
            components,
            total_duration,
        }
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn get(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Максимальный конец слота среди всех компонентов
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Компоненты заданного вида
    pub fn of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(move |c| c.kind == kind)
    }

    /// Доли всех обратных отсчётов для оверлея
    pub fn countdown_beats(&self) -> Vec<CountdownBeat> {
        self.components
            .iter()
            .filter_map(Component::countdown_beats)
            .flatten()
            .collect()
    }

    /// Пары пересекающихся слотов
    pub fn overlapping_pairs(&self) -> Vec<(ComponentId, ComponentId)> {
        let mut pairs = Vec::new();
        for (i, a) in self.components.iter().enumerate() {
            for b in &self.components[i + 1..] {
                if b.start_time >= a.end_time {
                    continue;
                }
                pairs.push((a.id, b.id));
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(kind: ComponentKind, start: f64, end: f64) -> Component {
        Component {
            id: ComponentId(0),
            kind,
            start_time: start,
            end_time: end,
            content: "x".to_string(),
        }
    }

    #[test]
    fn test_countdown_partition() {
        let countdown = component(ComponentKind::Countdown, 5.0, 8.0);
        let beats = countdown.countdown_beats().unwrap();

        assert_eq!((beats[0].start, beats[0].end, beats[0].label), (5.0, 6.0, "3"));
        assert_eq!((beats[1].start, beats[1].end, beats[1].label), (6.0, 7.0, "2"));
        assert_eq!((beats[2].start, beats[2].end, beats[2].label), (7.0, 8.0, "1"));

        assert!(component(ComponentKind::Answer, 0.0, 1.0).countdown_beats().is_none());
    }

    #[test]
    fn test_partition_ends_exactly_at_slot_end() {
        let beats = split_into_beats(1.1, 2.3);
        assert_eq!(beats[2].end, 2.3);
        assert_eq!(beats[0].end, beats[1].start);
        assert_eq!(beats[1].end, beats[2].start);
    }

    #[test]
    fn test_build_sorts_and_assigns_ids() {
        let timeline = Timeline::build(
            vec![
                component(ComponentKind::Answer, 4.0, 6.0),
                component(ComponentKind::Question, 0.0, 4.0),
            ],
            None,
        );
        assert_eq!(timeline.components()[0].kind, ComponentKind::Question);
        assert_eq!(timeline.components()[1].id, ComponentId(1));
        assert_eq!(timeline.total_duration(), 6.0);
    }

    #[test]
    fn test_inactive_intro_is_ignored() {
        let components = vec![component(ComponentKind::Question, 0.0, 4.0)];
        let blank = Timeline::build(components.clone(), Some(&IntroSpec::new("  ", 2.0)));
        let zero = Timeline::build(components, Some(&IntroSpec::new("Hi", 0.0)));

        assert_eq!(blank.len(), 1);
        assert_eq!(zero.total_duration(), 4.0);
    }

    #[test]
    fn test_intro_text_is_collapsed_to_one_line() {
        let timeline = Timeline::build(Vec::new(), Some(&IntroSpec::new("  Quiz\n  time\t ", 1.5)));
        assert_eq!(timeline.components()[0].content, "Quiz time");
    }

    #[test]
    fn test_overlapping_pairs() {
        let timeline = Timeline::build(
            vec![
                component(ComponentKind::Question, 0.0, 5.0),
                component(ComponentKind::Countdown, 4.0, 7.0),
                component(ComponentKind::Answer, 7.0, 9.0),
            ],
            None,
        );
        assert_eq!(timeline.overlapping_pairs(), vec![(ComponentId(0), ComponentId(1))]);
    }

    #[test]
    fn test_kind_from_str_is_case_insensitive() {
        assert_eq!("cta".parse::<ComponentKind>(), Ok(ComponentKind::Cta));
        assert_eq!("CountDown".parse::<ComponentKind>(), Ok(ComponentKind::Countdown));
        assert!("music".parse::<ComponentKind>().is_err());
    }
}
