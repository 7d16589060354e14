//! Сведение композитной дорожки
//!
//! Все входы (тишина на всю длительность, речь каждого компонента, эффекты)
//! задерживаются через `adelay` и суммируются одним `amix` с равными весами
//! и `normalize=0`. Единственная нормализация после суммы выполняется
//! финальным проходом, который также приводит дорожку к точной длине.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info};
use serde::Serialize;

use crate::config::{LoudnessTarget, QuizSyncConfig};
use crate::error::{QuizSyncError, Result};
use crate::media::effects::EffectCue;
use crate::media::tool::MediaTool;
use crate::script::types::{Component, ComponentKind, Timeline};
use crate::tts::fitter::{AudioAsset, ComponentAudio};
use crate::utils::temp::{RenderWorkspace, ScratchFile};

/// Секунды в целые миллисекунды (с округлением)
pub fn delay_ms(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}

/// Один задержанный вход сведения
#[derive(Debug, Clone, PartialEq)]
pub struct MixInput {
    pub path: PathBuf,
    pub delay_ms: u64,
    pub gain: f32,
    /// Метка для логов (`answer#2`, `countdown#1/2`, `answer_ding`)
    pub label: String,
}

/// План сведения: основа из тишины и задержанные входы
#[derive(Debug, Clone)]
pub struct MixPlan {
    base: PathBuf,
    total_duration: f64,
    inputs: Vec<MixInput>,
}

impl MixPlan {
    pub fn new(base: impl Into<PathBuf>, total_duration: f64) -> Self {
        Self {
            base: base.into(),
            total_duration,
            inputs: Vec::new(),
        }
    }

    pub fn push(&mut self, input: MixInput) {
        self.inputs.push(input);
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn inputs(&self) -> &[MixInput] {
        &self.inputs
    }

    /// Число входов amix вместе с основой
    pub fn input_count(&self) -> usize {
        self.inputs.len() + 1
    }

    /// Граф фильтров для `-filter_complex`
    ///
    /// Вход 0 это основа; `duration=first` держит длину суммы равной ей.
    pub fn filter_graph(&self) -> String {
        let mut parts: Vec<String> = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, input)| {
                let index = i + 1;
                format!(
                    "[{index}:a]volume={gain},adelay={ms}|{ms}[a{index}]",
                    gain = input.gain,
                    ms = input.delay_ms
                )
            })
            .collect();

        let labels: String = std::iter::once("[0:a]".to_string())
            .chain((1..self.input_count()).map(|i| format!("[a{}]", i)))
            .collect();
        let weights = vec!["1"; self.input_count()].join(" ");
        parts.push(format!(
            "{}amix=inputs={}:duration=first:weights={}:normalize=0[out]",
            labels,
            self.input_count(),
            weights
        ));

        parts.join(";")
    }

    /// Полная командная строка ffmpeg для сведения в `output`
    pub fn ffmpeg_args(&self, output: &Path, sample_rate: u32) -> Vec<String> {
        let mut args: Vec<String> = vec!["-y".into(), "-loglevel".into(), "error".into()];
        args.push("-i".into());
        args.push(self.base.to_string_lossy().into_owned());
        for input in &self.inputs {
            args.push("-i".into());
            args.push(input.path.to_string_lossy().into_owned());
        }
        args.extend([
            "-filter_complex".to_string(),
            self.filter_graph(),
            "-map".to_string(),
            "[out]".to_string(),
            "-ar".to_string(),
            sample_rate.to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        args
    }
}

/// Итоговая композитная дорожка
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompositeTrack {
    pub path: PathBuf,
    /// Измеренная длительность
    pub duration: f64,
    /// Сколько входов было сведено (вместе с основой)
    pub inputs: usize,
}

/// Сведение речи и эффектов по таймлайну
pub struct AudioMixer {
    media: Arc<dyn MediaTool>,
    component_gain: f32,
    effect_gain: f32,
    final_loudness: LoudnessTarget,
    tolerance: f64,
}

impl AudioMixer {
    pub fn new(media: Arc<dyn MediaTool>, config: &QuizSyncConfig) -> Self {
        Self {
            media,
            component_gain: config.component_gain,
            effect_gain: config.effect_gain,
            final_loudness: config.final_loudness,
            tolerance: config.mix_tolerance,
        }
    }

    /// Сколько входов получит amix (отсчёт даёт три входа)
    pub fn expected_inputs(timeline: &Timeline, audio: &ComponentAudio, effects: &[EffectCue]) -> usize {
        let speech: usize = timeline
            .components()
            .iter()
            .filter(|c| audio.get(c.id).is_some())
            .map(|c| match c.kind {
                ComponentKind::Countdown => 3,
                ComponentKind::Question
                | ComponentKind::Answer
                | ComponentKind::Cta
                | ComponentKind::Intro => 1,
            })
            .sum();
        1 + speech + effects.len()
    }

    /// Построить план сведения
    ///
    /// Возвращает также гарды промежуточных файлов (доли отсчёта), которые
    /// должны жить до конца сведения.
    pub async fn plan(
        &self,
        timeline: &Timeline,
        audio: &ComponentAudio,
        effects: &[EffectCue],
        base: &Path,
        workspace: &RenderWorkspace,
    ) -> Result<(MixPlan, Vec<ScratchFile>)> {
        let mut plan = MixPlan::new(base, timeline.total_duration());
        let mut scratch = Vec::new();

        for component in timeline.components() {
            let Some(asset) = audio.get(component.id) else {
                continue;
            };
            match component.kind {
                ComponentKind::Countdown => {
                    self.expand_countdown(component, asset, workspace, &mut plan, &mut scratch)
                        .await?;
                }
                ComponentKind::Question
                | ComponentKind::Answer
                | ComponentKind::Cta
                | ComponentKind::Intro => plan.push(MixInput {
                    path: asset.path.clone(),
                    delay_ms: delay_ms(component.start_time),
                    gain: self.component_gain,
                    label: component.label(),
                }),
            }
        }

        for cue in effects {
            plan.push(MixInput {
                path: cue.path.clone(),
                delay_ms: delay_ms(cue.start),
                gain: self.effect_gain,
                label: cue.effect.name().to_string(),
            });
        }

        Ok((plan, scratch))
    }

    /// Свести композитную дорожку длиной ровно `timeline.total_duration()`
    pub async fn mix(
        &self,
        timeline: &Timeline,
        audio: &ComponentAudio,
        effects: &[EffectCue],
        workspace: &RenderWorkspace,
    ) -> Result<CompositeTrack> {
        if timeline.is_empty() {
            return Err(QuizSyncError::EmptyTimeline);
        }
        let total = timeline.total_duration();

        let base = workspace.scratch("silent_base.wav");
        self.media
            .render_silence(base.path(), total)
            .await
            .map_err(mix_error("silence base"))?;

        let (plan, _scratch) = self.plan(timeline, audio, effects, base.path(), workspace).await?;
        info!("Mixing {} inputs over {:.3}s", plan.input_count(), total);
        for input in plan.inputs() {
            debug!("  {} at {} ms (gain {})", input.label, input.delay_ms, input.gain);
        }

        let mixed = workspace.scratch("mixed.wav");
        self.media
            .mix(&plan, mixed.path())
            .await
            .map_err(mix_error("amix"))?;

        let composite = workspace.scratch("composite_audio.wav");
        self.media
            .finalize_mix(mixed.path(), composite.path(), total, &self.final_loudness)
            .await
            .map_err(mix_error("final normalization"))?;

        let duration = self
            .media
            .probe_duration(&composite.path().to_string_lossy())
            .await
            .map_err(mix_error("probe composite"))?;
        if (duration - total).abs() > self.tolerance {
            return Err(QuizSyncError::Mix(format!(
                "composite is {:.3}s, expected {:.3}s",
                duration, total
            )));
        }

        Ok(CompositeTrack {
            path: composite.persist(),
            duration,
            inputs: plan.input_count(),
        })
    }

    /// Разбить клип обратного отсчёта на три доли со своими задержками
    ///
    /// Доля `i` занимает `[i/3, (i+1)/3)` внутренней длительности клипа и
    /// растягивается, если длиннее трети слота.
    async fn expand_countdown(
        &self,
        component: &Component,
        asset: &AudioAsset,
        workspace: &RenderWorkspace,
        plan: &mut MixPlan,
        scratch: &mut Vec<ScratchFile>,
    ) -> Result<()> {
        let Some(beats) = component.countdown_beats() else {
            return Ok(());
        };
        let piece = asset.duration / 3.0;

        for beat in beats {
            let segment = workspace.scratch(&format!("countdown_{}_{}.wav", component.id, beat.index));
            self.media
                .trim_audio(&asset.path, segment.path(), beat.index as f64 * piece, piece)
                .await
                .map_err(mix_error("countdown segment"))?;

            let mut source = segment.path().to_path_buf();
            scratch.push(segment);

            // Миллисекундный запас на погрешность округления
            if piece > beat.duration() + 0.001 {
                let stretched =
                    workspace.scratch(&format!("countdown_{}_{}_fitted.wav", component.id, beat.index));
                self.media
                    .change_tempo(&source, stretched.path(), piece / beat.duration())
                    .await
                    .map_err(mix_error("countdown stretch"))?;
                source = stretched.path().to_path_buf();
                scratch.push(stretched);
            }

            plan.push(MixInput {
                path: source,
                delay_ms: delay_ms(beat.start),
                gain: self.component_gain,
                label: format!("{}/{}", component.label(), beat.label),
            });
        }

        Ok(())
    }
}

fn mix_error(step: &'static str) -> impl Fn(QuizSyncError) -> QuizSyncError {
    move |e| QuizSyncError::Mix(format!("{}: {}", step, e))
}
