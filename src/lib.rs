//! Основной файл библиотеки quiz-sync
//!
//! Библиотека превращает сценарий квиза с таймкодами в синхронизированный
//! набор для рендера: композитную аудиодорожку точной длины, фоновое видео
//! нужной длительности, субтитры и доли обратного отсчёта. Синтез речи и
//! финальный рендер кадров подключаются снаружи через трейты.
//!
//! Конвейер последовательный: разбор → эффекты → подгонка речи → сведение →
//! подбор видео → рендер. Ошибка на любом этапе прерывает весь рендер.

pub mod cache;
pub mod config;
pub mod error;
pub mod media;
pub mod progress;
pub mod script;
pub mod tts;
pub mod utils;


use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::mpsc::Sender;

pub use crate::config::QuizSyncConfig;
pub use crate::error::{QuizSyncError, RenderStage, Result};
pub use crate::media::{BackgroundSource, CompositeTrack, MediaTool, ReconcileTier, SourceFetcher, VideoSegment};
pub use crate::progress::ProgressUpdate;
pub use crate::script::{Caption, CanvasFormat, ComponentKind, CountdownBeat, IntroSpec, Timeline};
pub use crate::tts::SpeechSynthesizer;
pub use crate::utils::logger::init_logger;

use crate::cache::SegmentCache;
use crate::media::{AudioMixer, FfmpegTool, HttpFetcher, SoundEffectSet, VideoReconciler};
use crate::progress::send_progress;
use crate::tts::SpeechFitter;
use crate::utils::temp::RenderWorkspace;

/// Внешний рендерер кадров и оверлеев
#[async_trait]
pub trait OverlayRenderer: Send + Sync {
    /// Отрендерить итоговое видео в `output`
    async fn render(&self, package: &RenderPackage, output: &Path) -> anyhow::Result<()>;
}

/// Запрос на рендер одного квиза
#[derive(Debug, Clone)]
pub struct RenderRequest {
    /// Сценарий в формате `[start-end] KIND: content`
    pub script: String,
    /// Интро перед сценарием
    pub intro: Option<IntroSpec>,
    /// Фоновое видео
    pub background: BackgroundSource,
    /// Куда рендерить итоговое видео
    pub output_path: PathBuf,
    /// Запасной текст по виду компонента на случай ошибки синтеза
    pub fallback_texts: HashMap<ComponentKind, String>,
}

impl RenderRequest {
    pub fn new(script: impl Into<String>, background: BackgroundSource, output_path: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            intro: None,
            background,
            output_path: output_path.into(),
            fallback_texts: HashMap::new(),
        }
    }

    pub fn with_intro(mut self, intro: IntroSpec) -> Self {
        self.intro = Some(intro);
        self
    }

    pub fn with_fallback_text(mut self, kind: ComponentKind, text: impl Into<String>) -> Self {
        self.fallback_texts.insert(kind, text.into());
        self
    }
}

/// Всё, что нужно рендереру
#[derive(Debug, Clone, Serialize)]
pub struct RenderPackage {
    pub timeline: Timeline,
    pub composite_audio: CompositeTrack,
    pub video: VideoSegment,
    pub captions: Vec<Caption>,
    pub countdown_beats: Vec<CountdownBeat>,
}

/// Подготовленный рендер вместе с рабочей директорией, где лежат его файлы
#[derive(Debug)]
pub struct PreparedRender {
    pub package: RenderPackage,
    workspace: RenderWorkspace,
}

impl PreparedRender {
    pub fn workspace_path(&self) -> &Path {
        self.workspace.path()
    }

    /// Оставить файлы на диске и вернуть набор с путём рабочей директории
    pub fn keep(self) -> (RenderPackage, PathBuf) {
        let PreparedRender { package, workspace } = self;
        (package, workspace.keep())
    }
}

/// Основная структура для работы с библиотекой
pub struct QuizSync {
    /// Конфигурация библиотеки
    config: QuizSyncConfig,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    media: Arc<dyn MediaTool>,
    fetcher: Arc<dyn SourceFetcher>,
    /// Канал прогресса
    progress_sender: Option<Sender<ProgressUpdate>>,
}

impl QuizSync {
    /// Создать экземпляр с ffmpeg из конфигурации (или PATH) и HTTP-загрузчиком
    pub fn new(config: QuizSyncConfig, synthesizer: Arc<dyn SpeechSynthesizer>) -> Result<Self> {
        let media: Arc<dyn MediaTool> = Arc::new(FfmpegTool::from_config(&config)?);
        Self::with_tools(config, synthesizer, media, Arc::new(HttpFetcher::new()))
    }

    /// Создать экземпляр со своими реализациями инструментов
    pub fn with_tools(
        config: QuizSyncConfig,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        media: Arc<dyn MediaTool>,
        fetcher: Arc<dyn SourceFetcher>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            synthesizer,
            media,
            fetcher,
            progress_sender: None,
        })
    }

    /// Установить канал прогресса
    pub fn with_progress_sender(mut self, sender: Sender<ProgressUpdate>) -> Self {
        self.progress_sender = Some(sender);
        self
    }

    pub fn config(&self) -> &QuizSyncConfig {
        &self.config
    }

    /// Подготовить аудио, видео и субтитры, не вызывая рендерер
    pub async fn prepare(&self, request: &RenderRequest) -> Result<PreparedRender> {
        self.run_pipeline(request).await.map_err(|e| {
            error!("Quiz render failed during {}: {}", e.stage(), e);
            e
        })
    }

    /// Полный рендер: рендерер вызывается только когда аудио и видео готовы
    ///
    /// Промежуточные файлы удаляются после рендера (если это разрешено
    /// конфигурацией), поэтому пути в возвращённом наборе могут быть уже
    /// недоступны.
    pub async fn render(&self, request: &RenderRequest, renderer: &dyn OverlayRenderer) -> Result<RenderPackage> {
        let prepared = self.prepare(request).await?;

        send_progress(&self.progress_sender, ProgressUpdate::Rendering).await;
        info!("Rendering quiz video to {}", request.output_path.display());
        renderer
            .render(&prepared.package, &request.output_path)
            .await
            .map_err(|e| {
                let e = QuizSyncError::Render(format!("{:#}", e));
                error!("Quiz render failed during {}: {}", e.stage(), e);
                e
            })?;

        send_progress(&self.progress_sender, ProgressUpdate::Finished).await;
        let PreparedRender { package, workspace } = prepared;
        drop(workspace);
        Ok(package)
    }

    async fn run_pipeline(&self, request: &RenderRequest) -> Result<PreparedRender> {
        let progress = &self.progress_sender;
        send_progress(progress, ProgressUpdate::Started).await;

        let version = self.media.version().await?;
        debug!("Media tool: {}", version);
        let workspace = RenderWorkspace::new(self.config.work_dir.as_deref(), self.config.cleanup_temp_files)?;

        // Шаг 1: разбор сценария
        send_progress(progress, ProgressUpdate::ParsingScript).await;
        let timeline = script::parse(&request.script, request.intro.as_ref());
        if timeline.is_empty() {
            return Err(QuizSyncError::EmptyTimeline);
        }
        info!(
            "Parsed quiz script: {} components, {:.3}s",
            timeline.len(),
            timeline.total_duration()
        );

        // Шаг 2: звуковые эффекты
        send_progress(progress, ProgressUpdate::GeneratingEffects).await;
        let effects = SoundEffectSet::prepare(&self.media, &self.config).await;
        let cues = effects.cues(&timeline);

        // Шаг 3: подгонка речи
        let fitter = SpeechFitter::new(self.synthesizer.clone(), self.media.clone(), &self.config);
        let audio = fitter
            .fit_all(&timeline, &workspace, &request.fallback_texts, progress)
            .await?;
        info!("Fitted {} speech clips", audio.len());

        // Шаг 4: сведение
        let mixer = AudioMixer::new(self.media.clone(), &self.config);
        send_progress(
            progress,
            ProgressUpdate::Mixing {
                inputs: AudioMixer::expected_inputs(&timeline, &audio, &cues),
            },
        )
        .await;
        let composite = mixer.mix(&timeline, &audio, &cues, &workspace).await?;
        audio.release().await;
        info!("Composite track ready: {} ({:.3}s)", composite.path.display(), composite.duration);

        // Шаг 5: фоновое видео
        send_progress(progress, ProgressUpdate::ReconcilingVideo).await;
        let reconciler = VideoReconciler::new(
            self.media.clone(),
            self.fetcher.clone(),
            SegmentCache::from_config(&self.config),
            self.config.video.clone(),
        );
        let video = reconciler
            .reconcile(&request.background, timeline.total_duration(), &workspace, progress)
            .await?;
        info!("Background video ready via {}: {}", video.tier, video.input());

        let captions = script::captions(&timeline, self.config.canvas);
        let countdown_beats = timeline.countdown_beats();

        Ok(PreparedRender {
            package: RenderPackage {
                timeline,
                composite_audio: composite,
                video,
                captions,
                countdown_beats,
            },
            workspace,
        })
    }
}
