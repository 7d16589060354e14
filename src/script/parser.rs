//! Модуль для парсинга сценария квиза
//!
//! Каждая строка сценария имеет вид `[<start>-<end>] <KIND>: <content>`.
//! Строки, не подходящие под грамматику, отбрасываются без ошибки.

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::script::types::{Component, ComponentId, ComponentKind, IntroSpec, ParseWarning, Timeline};

lazy_static! {
    static ref LINE_RE: Regex =
        Regex::new(r"^\[(\d+\.?\d*)-(\d+\.?\d*)\]\s*(\w+):\s*(.+)$").unwrap();
}

/// Результат разбора: таймлайн и список отброшенных строк
#[derive(Debug, Clone)]
pub struct ParsedScript {
    pub timeline: Timeline,
    pub warnings: Vec<ParseWarning>,
}

/// Разобрать сценарий в таймлайн
///
/// Если `intro` активно, все компоненты сдвигаются на его длительность и
/// в начало вставляется компонент INTRO.
pub fn parse(raw_text: &str, intro: Option<&IntroSpec>) -> Timeline {
    let parsed = parse_with_warnings(raw_text, intro);
    for warning in &parsed.warnings {
        warn!("Skipping script line {}", warning);
    }
    parsed.timeline
}

/// Разобрать сценарий, вернув также отброшенные строки
pub fn parse_with_warnings(raw_text: &str, intro: Option<&IntroSpec>) -> ParsedScript {
    let mut components = Vec::new();
    let mut warnings = Vec::new();

    for (index, line) in raw_text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line) {
            Ok(component) => components.push(component),
            Err(reason) => warnings.push(ParseWarning {
                line_number: index + 1,
                line: line.to_string(),
                reason,
            }),
        }
    }

    let timeline = Timeline::build(components, intro);
    debug!(
        "Parsed {} components ({} lines skipped), total duration {:.3}s",
        timeline.len(),
        warnings.len(),
        timeline.total_duration()
    );

    for (a, b) in timeline.overlapping_pairs() {
        warn!("Components {} and {} overlap; they will be layered in the mix", a, b);
    }

    ParsedScript { timeline, warnings }
}

/// Разбор одной непустой строки
fn parse_line(line: &str) -> std::result::Result<Component, String> {
    let caps = LINE_RE
        .captures(line)
        .ok_or_else(|| "does not match '[start-end] KIND: content'".to_string())?;

    let start_time = caps[1]
        .parse::<f64>()
        .map_err(|e| format!("invalid start time: {}", e))?;
    let end_time = caps[2]
        .parse::<f64>()
        .map_err(|e| format!("invalid end time: {}", e))?;
    let kind = caps[3].parse::<ComponentKind>()?;

    if end_time <= start_time {
        return Err(format!("end time {} is not after start time {}", end_time, start_time));
    }

    Ok(Component {
        id: ComponentId(0),
        kind,
        start_time,
        end_time,
        content: caps[4].trim().to_string(),
    })
}

impl Timeline {
    /// Сериализовать таймлайн обратно в грамматику сценария
    ///
    /// `{}` для f64 печатает кратчайшее представление без экспоненты,
    /// поэтому повторный разбор даёт те же числа.
    pub fn to_script(&self) -> String {
        self.components()
            .iter()
            .map(|c| format!("[{}-{}] {}: {}", c.start_time, c.end_time, c.kind.keyword(), c.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO_A: &str = "[0.0-5.0] QUESTION: What is the capital of France?\n\
                              [5.0-8.0] COUNTDOWN: 3-2-1\n\
                              [8.0-12.0] ANSWER: Paris\n\
                              [12.0-15.0] CTA: Follow us!";

    #[test]
    fn test_parse_scenario_a() {
        let timeline = parse(SCENARIO_A, None);

        assert_eq!(timeline.len(), 4);
        assert_eq!(timeline.total_duration(), 15.0);
        let kinds: Vec<_> = timeline.components().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ComponentKind::Question,
                ComponentKind::Countdown,
                ComponentKind::Answer,
                ComponentKind::Cta
            ]
        );
        assert_eq!(timeline.components()[0].content, "What is the capital of France?");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let parsed = parse_with_warnings("garbage\n[BAD] X: y\n[0.0-5.0] QUESTION: Valid?", None);

        assert_eq!(parsed.timeline.len(), 1);
        assert_eq!(parsed.timeline.components()[0].content, "Valid?");
        assert_eq!(parsed.warnings.len(), 2);
        assert_eq!(parsed.warnings[0].line_number, 1);
        assert_eq!(parsed.warnings[1].line, "[BAD] X: y");
    }

    #[test]
    fn test_empty_script_yields_empty_timeline() {
        let timeline = parse("\n   \n", None);
        assert!(timeline.is_empty());
        assert_eq!(timeline.total_duration(), 0.0);
    }

    #[test]
    fn test_unknown_kind_and_reversed_slot_are_skipped() {
        let parsed = parse_with_warnings("[0-2] MUSIC: la la\n[5-3] ANSWER: backwards\n[1-1] CTA: empty", None);
        assert!(parsed.timeline.is_empty());
        assert_eq!(parsed.warnings.len(), 3);
    }

    #[test]
    fn test_kind_is_case_insensitive_and_whitespace_ignored() {
        let timeline = parse("   [1.5-3] answer:   Rome!   ", None);
        let answer = &timeline.components()[0];

        assert_eq!(answer.kind, ComponentKind::Answer);
        assert_eq!(answer.start_time, 1.5);
        assert_eq!(answer.end_time, 3.0);
        assert_eq!(answer.content, "Rome!");
    }

    #[test]
    fn test_intro_shifts_components_once() {
        let intro = IntroSpec::new("Ready for a geo quiz?", 2.0);
        let timeline = parse(SCENARIO_A, Some(&intro));

        assert_eq!(timeline.len(), 5);
        assert_eq!(timeline.total_duration(), 17.0);

        let first = &timeline.components()[0];
        assert_eq!(first.kind, ComponentKind::Intro);
        assert_eq!((first.start_time, first.end_time), (0.0, 2.0));

        let question = &timeline.components()[1];
        assert_eq!((question.start_time, question.end_time), (2.0, 7.0));
        let cta = &timeline.components()[4];
        assert_eq!((cta.start_time, cta.end_time), (14.0, 17.0));
    }

    #[test]
    fn test_output_is_sorted_by_start_time() {
        let timeline = parse("[8-12] ANSWER: Paris\n[0-5] QUESTION: Capital?\n[5-8] COUNTDOWN: 3-2-1", None);
        let starts: Vec<_> = timeline.components().iter().map(|c| c.start_time).collect();
        assert_eq!(starts, vec![0.0, 5.0, 8.0]);

        let ids: Vec<_> = timeline.components().iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_reserialize_then_reparse_is_identical() {
        let scripts = [
            SCENARIO_A.to_string(),
            "[0.1-0.35] QUESTION: 2+2?\n[0.35-3.3333] COUNTDOWN: go\n[3.3333-10] ANSWER: 4".to_string(),
        ];

        for script in &scripts {
            let timeline = parse(script, None);
            let reparsed = parse(&timeline.to_script(), None);
            assert_eq!(timeline, reparsed);
        }

        for intro_text in ["Quiz time", " Quiz time ", "Quiz\ntime", "Ready?\r\n  Go!  "] {
            let with_intro = parse(SCENARIO_A, Some(&IntroSpec::new(intro_text, 2.5)));
            assert_eq!(with_intro, parse(&with_intro.to_script(), None), "intro: {:?}", intro_text);
        }
    }
}
