//! Генерация таймлайна субтитров
//!
//! Тайминг берётся прямо из компонентов сценария, а не из анализа аудио.

use serde::{Deserialize, Serialize};
use crate::script::types::{Component, ComponentKind, Timeline};

/// Формат холста итогового видео
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanvasFormat {
    /// 1080x1920, короткие строки
    #[default]
    Vertical,
    /// Горизонтальное видео
    Landscape,
}

impl CanvasFormat {
    /// Максимальная длина субтитра в символах
    pub fn max_caption_len(&self) -> usize {
        match self {
            Self::Vertical => 15,
            Self::Landscape => 30,
        }
    }
}

/// Один субтитр: интервал `[start, end)` и текст
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Caption {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Построить упорядоченный список субтитров
pub fn captions(timeline: &Timeline, canvas: CanvasFormat) -> Vec<Caption> {
    let max_len = canvas.max_caption_len();
    let mut result = Vec::new();

    for component in timeline.components() {
        match component.kind {
            // Обратный отсчёт показывает собственный оверлей
            ComponentKind::Countdown => continue,
            ComponentKind::Question
            | ComponentKind::Answer
            | ComponentKind::Cta
            | ComponentKind::Intro => result.extend(component_captions(component, max_len)),
        }
    }

    result
}

fn component_captions(component: &Component, max_len: usize) -> Vec<Caption> {
    let content = component.content.as_str();
    if content.chars().count() <= max_len {
        return vec![Caption {
            start: component.start_time,
            end: component.end_time,
            text: content.to_string(),
        }];
    }

    let words: Vec<&str> = content.split_whitespace().collect();
    let chunk_size = (max_len / 8).max(1);
    let chunks: Vec<String> = words.chunks(chunk_size).map(|chunk| chunk.join(" ")).collect();
    if chunks.is_empty() {
        return Vec::new();
    }

    let step = component.duration() / chunks.len() as f64;
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, text)| Caption {
            start: component.start_time + i as f64 * step,
            end: if i == last {
                component.end_time
            } else {
                component.start_time + (i + 1) as f64 * step
            },
            text,
        })
        .collect()
}
