//! Подготовка текста для озвучивания
//!
//! Очистка детерминирована и не имеет побочных эффектов: одинаковый вход
//! всегда даёт одинаковый выход.

use lazy_static::lazy_static;
use regex::Regex;

use crate::script::types::{Component, ComponentKind, COUNTDOWN_SPOKEN_TEXT};

lazy_static! {
    // Пиктограммы, флаги (regional indicators), вариационный селектор и ZWJ
    static ref DECORATIVE_RE: Regex =
        Regex::new(r"[\p{Extended_Pictographic}\x{1F1E6}-\x{1F1FF}\x{FE0F}\x{200D}]").unwrap();
    // Повторы одного знака: "!!!" -> "!", ",," -> ",", "..." -> "."
    static ref REPEATED_PUNCTUATION: Vec<(Regex, String)> = ['!', '?', '.', ',', ';', ':']
        .iter()
        .map(|mark| {
            let pattern = format!("{}{{2,}}", regex::escape(&mark.to_string()));
            (Regex::new(&pattern).unwrap(), mark.to_string())
        })
        .collect();
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// Фразы, которые имеют смысл только на экране
const VISUAL_PHRASES: [&str; 3] = ["The City of Light!", "Amazing, right?", "Quick math!"];

/// Текст, который нужно озвучить для компонента
///
/// Для обратного отсчёта это всегда фиксированная фраза, независимо от
/// отображаемого содержимого.
pub fn spoken_text(component: &Component) -> String {
    match component.kind {
        ComponentKind::Countdown => COUNTDOWN_SPOKEN_TEXT.to_string(),
        ComponentKind::Question
        | ComponentKind::Answer
        | ComponentKind::Cta
        | ComponentKind::Intro => clean_content_for_audio(&component.content),
    }
}

/// Убрать из текста визуальные элементы
pub fn clean_content_for_audio(content: &str) -> String {
    let cleaned = DECORATIVE_RE.replace_all(content, "");
    let cleaned = cleaned.replace(['[', ']'], "");
    let cleaned = REPEATED_PUNCTUATION
        .iter()
        .fold(cleaned, |text, (re, mark)| re.replace_all(&text, mark.as_str()).into_owned());
    let mut cleaned = normalize_whitespace(&cleaned);

    let mut removed_phrase = false;
    for phrase in VISUAL_PHRASES {
        if cleaned.contains(phrase) {
            cleaned = cleaned.replace(phrase, "");
            removed_phrase = true;
        }
    }

    if removed_phrase {
        // "Paris! The City of Light!" -> "Paris"
        cleaned = normalize_whitespace(&cleaned)
            .trim_end_matches(|c: char| c == '!' || c == ',' || c.is_whitespace())
            .to_string();
    }

    cleaned
}

fn normalize_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::types::ComponentId;

    fn component(kind: ComponentKind, content: &str) -> Component {
        Component {
            id: ComponentId(0),
            kind,
            start_time: 0.0,
            end_time: 3.0,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_countdown_always_speaks_fixed_phrase() {
        assert_eq!(spoken_text(&component(ComponentKind::Countdown, "3-2-1")), "Three. Two. One.");
        assert_eq!(spoken_text(&component(ComponentKind::Countdown, "")), "Three. Two. One.");
    }

    #[test]
    fn test_visual_flair_is_removed() {
        let cases = [
            ("🇫🇷 Paris! The City of Light!", "Paris"),
            ("💀 206 bones! Amazing, right?", "206 bones"),
            ("🧮 30! Quick math!", "30"),
            ("🏆 Everything Everywhere All at Once!", "Everything Everywhere All at Once!"),
            ("Follow for more quizzes!", "Follow for more quizzes!"),
        ];
        for (input, expected) in cases {
            assert_eq!(clean_content_for_audio(input), expected, "input: {}", input);
        }
    }

    #[test]
    fn test_brackets_punctuation_and_whitespace() {
        assert_eq!(clean_content_for_audio("[Wow]!!!   really???"), "Wow! really?");
        assert_eq!(clean_content_for_audio("Wait... what,, really;;"), "Wait. what, really;");
        assert_eq!(clean_content_for_audio("  ✨✨  "), "");
        assert_eq!(clean_content_for_audio("👨‍👩‍👧 family"), "family");
    }

    #[test]
    fn test_cleaning_is_idempotent() {
        let once = clean_content_for_audio("🌍 Which country has the most islands?!! 🎯");
        assert_eq!(once, "Which country has the most islands?!");
        assert_eq!(clean_content_for_audio(&once), once);
    }

    #[test]
    fn test_phrase_only_content_becomes_silent() {
        assert_eq!(spoken_text(&component(ComponentKind::Answer, "Quick math!")), "");
    }
}
