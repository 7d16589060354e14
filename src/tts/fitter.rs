//! Подгонка длительности речи под слот компонента
//!
//! Для каждого компонента: синтез, нормализация громкости, измерение и,
//! если клип длиннее слота, растяжение с сохранением высоты тона.
//! Более короткий клип используется как есть и заканчивается раньше слота.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc::Sender;

use crate::config::{LoudnessTarget, QuizSyncConfig};
use crate::error::{QuizSyncError, Result};
use crate::media::tool::MediaTool;
use crate::progress::{send_progress, ProgressUpdate};
use crate::script::types::{Component, ComponentId, ComponentKind, Timeline};
use crate::tts::provider::SpeechSynthesizer;
use crate::tts::text::spoken_text;
use crate::utils::ffmpeg::check_file_exists_and_valid;
use crate::utils::temp::RenderWorkspace;

/// Готовый аудиоклип компонента
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioAsset {
    pub path: PathBuf,
    /// Измеренная длительность в секундах
    pub duration: f64,
    /// Компонент, которому принадлежит клип
    pub owner: ComponentId,
    /// Итоговый множитель скорости (1.0 без растяжения)
    pub speed_factor: f64,
}

/// Клипы компонентов рендера, по идентификатору компонента
#[derive(Debug, Clone, Default)]
pub struct ComponentAudio(BTreeMap<ComponentId, AudioAsset>);

impl ComponentAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: AudioAsset) -> Option<AudioAsset> {
        self.0.insert(asset.owner, asset)
    }

    pub fn get(&self, id: ComponentId) -> Option<&AudioAsset> {
        self.0.get(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AudioAsset> {
        self.0.values()
    }

    /// Удалить файлы клипов после сведения
    pub async fn release(self) {
        for asset in self.0.into_values() {
            if let Err(e) = tokio::fs::remove_file(&asset.path).await {
                debug!("Could not remove {}: {}", asset.path.display(), e);
            }
        }
    }
}

/// Подгонщик речи
pub struct SpeechFitter {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    media: Arc<dyn MediaTool>,
    loudness: LoudnessTarget,
    tolerance: f64,
}

impl SpeechFitter {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, media: Arc<dyn MediaTool>, config: &QuizSyncConfig) -> Self {
        Self {
            synthesizer,
            media,
            loudness: config.speech_loudness,
            tolerance: config.fit_tolerance,
        }
    }

    /// Подогнать клип компонента; `None`, если озвучивать нечего
    pub async fn fit(&self, component: &Component, workspace: &RenderWorkspace) -> Result<Option<AudioAsset>> {
        let text = spoken_text(component);
        if text.is_empty() {
            info!("{} has no spoken text, leaving it silent", component.label());
            return Ok(None);
        }
        self.fit_with_text(component, &text, workspace).await.map(Some)
    }

    /// Подогнать клип для заданного текста (например, запасного)
    pub async fn fit_with_text(
        &self,
        component: &Component,
        text: &str,
        workspace: &RenderWorkspace,
    ) -> Result<AudioAsset> {
        let label = component.label();
        let stem = format!("{}_{}", component.kind.slug(), component.id);
        let required = component.duration();

        // 1. Синтез
        let raw = workspace.scratch(&format!("{}_raw.wav", stem));
        debug!("Synthesizing {} with {}: {:?}", label, self.synthesizer.name(), text);
        self.synthesizer
            .synthesize(text, raw.path())
            .await
            .map_err(|e| QuizSyncError::Synthesis {
                component: label.clone(),
                message: format!("{:#}", e),
            })?;
        if !check_file_exists_and_valid(raw.path()).await {
            return Err(QuizSyncError::Synthesis {
                component: label,
                message: "synthesizer produced no audio".to_string(),
            });
        }

        // 2. Нормализация до измерения
        let normalized = workspace.scratch(&format!("{}_normalized.wav", stem));
        self.media
            .normalize_loudness(raw.path(), normalized.path(), &self.loudness)
            .await
            .map_err(fitting_error(&label, "loudness normalization"))?;
        drop(raw);

        // 3. Измерение
        let actual = self.measure(&label, normalized.path()).await?;

        // 4. Короткий клип остаётся как есть
        if actual <= required {
            debug!("{}: {:.3}s fits into {:.3}s slot", label, actual, required);
            return Ok(AudioAsset {
                path: normalized.persist(),
                duration: actual,
                owner: component.id,
                speed_factor: 1.0,
            });
        }

        let factor = actual / required;
        info!("{}: {:.3}s > {:.3}s slot, speeding up x{:.3}", label, actual, required, factor);
        let fitted = workspace.scratch(&format!("{}_fitted.wav", stem));
        self.media
            .change_tempo(normalized.path(), fitted.path(), factor)
            .await
            .map_err(fitting_error(&label, "time stretch"))?;
        let measured = self.measure(&label, fitted.path()).await?;

        if (measured - required).abs() <= self.tolerance {
            return Ok(AudioAsset {
                path: fitted.persist(),
                duration: measured,
                owner: component.id,
                speed_factor: factor,
            });
        }

        // Одна корректирующая попытка
        let correction = measured / required;
        warn!(
            "{}: stretched clip is {:.3}s instead of {:.3}s, correcting x{:.3}",
            label, measured, required, correction
        );
        let corrected = workspace.scratch(&format!("{}_fitted2.wav", stem));
        self.media
            .change_tempo(fitted.path(), corrected.path(), correction)
            .await
            .map_err(fitting_error(&label, "corrective time stretch"))?;
        let measured = self.measure(&label, corrected.path()).await?;

        if (measured - required).abs() > self.tolerance {
            return Err(QuizSyncError::Fitting {
                component: label,
                message: format!(
                    "clip is {:.3}s after stretching, slot is {:.3}s (tolerance {:.2}s)",
                    measured, required, self.tolerance
                ),
            });
        }

        Ok(AudioAsset {
            path: corrected.persist(),
            duration: measured,
            owner: component.id,
            speed_factor: factor * correction,
        })
    }

    /// Подогнать все компоненты таймлайна последовательно
    ///
    /// При ошибке синтеза один раз пробуется запасной текст для вида
    /// компонента из `fallback_texts`; иначе ошибка прерывает рендер.
    pub async fn fit_all(
        &self,
        timeline: &Timeline,
        workspace: &RenderWorkspace,
        fallback_texts: &HashMap<ComponentKind, String>,
        progress: &Option<Sender<ProgressUpdate>>,
    ) -> Result<ComponentAudio> {
        let mut audio = ComponentAudio::new();
        let total = timeline.len();

        for (index, component) in timeline.components().iter().enumerate() {
            send_progress(
                progress,
                ProgressUpdate::FittingComponent {
                    current: index + 1,
                    total,
                    kind: component.kind,
                },
            )
            .await;

            let fitted = match self.fit(component, workspace).await {
                Err(QuizSyncError::Synthesis { component: label, message }) => {
                    match fallback_texts.get(&component.kind) {
                        Some(fallback) => {
                            warn!("Synthesis failed for {} ({}); retrying with fallback text", label, message);
                            Some(self.fit_with_text(component, fallback, workspace).await?)
                        }
                        None => return Err(QuizSyncError::Synthesis { component: label, message }),
                    }
                }
                other => other?,
            };

            if let Some(asset) = fitted {
                audio.insert(asset);
            }
        }

        Ok(audio)
    }

    async fn measure(&self, label: &str, path: &std::path::Path) -> Result<f64> {
        let duration = self
            .media
            .probe_duration(&path.to_string_lossy())
            .await
            .map_err(fitting_error(label, "duration probe"))?;
        if !(duration > 0.0) {
            return Err(QuizSyncError::Fitting {
                component: label.to_string(),
                message: format!("measured duration is {:.3}s", duration),
            });
        }
        Ok(duration)
    }
}

fn fitting_error<'a>(label: &'a str, step: &'a str) -> impl Fn(QuizSyncError) -> QuizSyncError + 'a {
    move |e| QuizSyncError::Fitting {
        component: label.to_string(),
        message: format!("{}: {}", step, e),
    }
}
