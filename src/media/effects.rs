//! Звуковые эффекты квиза
//!
//! Три эффекта синтезируются ffmpeg из генераторов lavfi один раз и
//! переиспользуются между рендерами. Неудачная генерация эффекта не
//! блокирует рендер: эффект просто пропускается.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::config::QuizSyncConfig;
use crate::error::QuizSyncError;
use crate::media::tool::MediaTool;
use crate::script::types::{ComponentKind, Timeline};
use crate::utils::ffmpeg::check_file_exists_and_valid;

/// Вид звукового эффекта
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SoundEffect {
    /// Восходящий «вжух» в начале интро
    Intro,
    /// Тик на каждой доле обратного отсчёта
    CountdownTick,
    /// Двухтоновый сигнал правильного ответа
    AnswerDing,
}

impl SoundEffect {
    pub const ALL: [SoundEffect; 3] = [Self::Intro, Self::CountdownTick, Self::AnswerDing];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::CountdownTick => "countdown_tick",
            Self::AnswerDing => "answer_ding",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.wav", self.name())
    }

    /// Аргументы ffmpeg для генерации эффекта в `output`
    pub fn render_args(&self, output: &Path, sample_rate: u32) -> Vec<String> {
        let mut args: Vec<String> = ["-y", "-loglevel", "error"].map(String::from).to_vec();
        let sources: &[&str] = match self {
            Self::Intro => &["-f", "lavfi", "-i", "sine=frequency=220:duration=0.8"],
            Self::CountdownTick => &["-f", "lavfi", "-i", "sine=frequency=800:duration=0.15"],
            Self::AnswerDing => &[
                "-f", "lavfi", "-i", "sine=frequency=523:duration=0.4",
                "-f", "lavfi", "-i", "sine=frequency=659:duration=0.6",
            ],
        };
        args.extend(sources.iter().map(|s| s.to_string()));

        match self {
            Self::Intro => args.extend([
                "-af".to_string(),
                "aeval=val(0)*sin(2*PI*t*220*(1+0.5*t)):c=same,volume=1".to_string(),
            ]),
            Self::CountdownTick => args.extend([
                "-af".to_string(),
                "aeval=val(0)*exp(-t*8),volume=1".to_string(),
            ]),
            Self::AnswerDing => args.extend([
                "-filter_complex".to_string(),
                "[0]volume=1,adelay=0[a1];[1]volume=1,adelay=200[a2];[a1][a2]amix=inputs=2,volume=1"
                    .to_string(),
            ]),
        }

        args.extend([
            "-ar".to_string(),
            sample_rate.to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// Размещение эффекта на оси времени
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectCue {
    pub effect: SoundEffect,
    pub path: PathBuf,
    /// Начало в секундах таймлайна
    pub start: f64,
}

/// Набор готовых файлов эффектов
#[derive(Debug, Clone, Default)]
pub struct SoundEffectSet {
    intro: Option<PathBuf>,
    countdown: Option<PathBuf>,
    answer: Option<PathBuf>,
}

impl SoundEffectSet {
    /// Пустой набор: сведение без эффектов
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_effect(mut self, effect: SoundEffect, path: impl Into<PathBuf>) -> Self {
        *self.slot_mut(effect) = Some(path.into());
        self
    }

    /// Подготовить эффекты: свои файлы из конфигурации, готовые из директории
    /// эффектов или сгенерированные заново
    pub async fn prepare(media: &Arc<dyn MediaTool>, config: &QuizSyncConfig) -> Self {
        let mut set = Self::none();
        if !config.sound_effects.enabled {
            return set;
        }

        let effects_dir = config.resolved_effects_dir();
        if let Err(e) = tokio::fs::create_dir_all(&effects_dir).await {
            warn!("Sound effects disabled: cannot create {}: {}", effects_dir.display(), e);
            return set;
        }

        for effect in SoundEffect::ALL {
            let custom = match effect {
                SoundEffect::Intro => config.sound_effects.intro.as_ref(),
                SoundEffect::CountdownTick => config.sound_effects.countdown.as_ref(),
                SoundEffect::AnswerDing => config.sound_effects.answer.as_ref(),
            };
            if let Some(custom) = custom {
                if check_file_exists_and_valid(custom).await {
                    *set.slot_mut(effect) = Some(custom.clone());
                    continue;
                }
                warn!("Custom {} effect {} is missing; generating default", effect.name(), custom.display());
            }

            let path = effects_dir.join(effect.file_name());
            if check_file_exists_and_valid(&path).await {
                *set.slot_mut(effect) = Some(path);
                continue;
            }

            // Генерируем во временный файл, чтобы параллельный рендер не увидел недописанный
            let staging = effects_dir.join(format!("{}.{}.wav", effect.name(), uuid::Uuid::new_v4()));
            let generated = match media.render_effect(effect, &staging).await {
                Ok(()) => tokio::fs::rename(&staging, &path).await.map_err(QuizSyncError::from),
                Err(e) => Err(e),
            };
            match generated {
                Ok(()) => {
                    info!("Generated {} sound effect: {}", effect.name(), path.display());
                    *set.slot_mut(effect) = Some(path);
                }
                Err(e) => {
                    warn!("Failed to generate {} sound effect, skipping it: {}", effect.name(), e);
                    let _ = tokio::fs::remove_file(&staging).await;
                }
            }
        }

        set
    }

    pub fn get(&self, effect: SoundEffect) -> Option<&Path> {
        match effect {
            SoundEffect::Intro => self.intro.as_deref(),
            SoundEffect::CountdownTick => self.countdown.as_deref(),
            SoundEffect::AnswerDing => self.answer.as_deref(),
        }
    }

    fn slot_mut(&mut self, effect: SoundEffect) -> &mut Option<PathBuf> {
        match effect {
            SoundEffect::Intro => &mut self.intro,
            SoundEffect::CountdownTick => &mut self.countdown,
            SoundEffect::AnswerDing => &mut self.answer,
        }
    }

    /// Разместить эффекты по таймлайну
    ///
    /// Интро получает «вжух», каждая доля отсчёта свой тик, каждый ответ сигнал.
    pub fn cues(&self, timeline: &Timeline) -> Vec<EffectCue> {
        let mut cues = Vec::new();
        let mut push = |effect: SoundEffect, start: f64| {
            if let Some(path) = self.get(effect) {
                cues.push(EffectCue {
                    effect,
                    path: path.to_path_buf(),
                    start,
                });
            }
        };

        for component in timeline.components() {
            match component.kind {
                ComponentKind::Intro => push(SoundEffect::Intro, component.start_time),
                ComponentKind::Countdown => {
                    for beat in component.countdown_beats().into_iter().flatten() {
                        push(SoundEffect::CountdownTick, beat.start);
                    }
                }
                ComponentKind::Answer => push(SoundEffect::AnswerDing, component.start_time),
                ComponentKind::Question | ComponentKind::Cta => {}
            }
        }

        cues
    }
}
