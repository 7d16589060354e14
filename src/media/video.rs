//! Подбор фонового видео под длительность квиза
//!
//! Состояния: определение длительности источника, выбор окна, вырезание
//! (если нужно), проверка результата. При сбое вырезания по очереди
//! пробуются уровни отката, каждый не больше одного раза:
//! полная загрузка и локальное вырезание, полная загрузка целиком,
//! исходная ссылка.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::Sender;

use crate::cache::SegmentCache;
use crate::config::VideoConfig;
use crate::error::{QuizSyncError, Result};
use crate::media::tool::MediaTool;
use crate::progress::{send_progress, ProgressUpdate};
use crate::utils::ffmpeg::check_file_exists_and_valid;
use crate::utils::temp::RenderWorkspace;

/// Удалённый ли источник (http/https)
pub fn is_remote(locator: &str) -> bool {
    let lower = locator.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Аргументы ffmpeg для вырезания и перекодирования отрезка
///
/// Для удалённого источника добавляются опции переподключения.
pub fn extract_args(source: &str, start: f64, duration: f64, output: &Path, remote: bool) -> Vec<String> {
    let mut args: Vec<String> = vec!["-loglevel".into(), "error".into()];
    if remote {
        args.extend(
            [
                "-protocol_whitelist", "file,http,https,tcp,tls",
                "-reconnect", "1",
                "-reconnect_streamed", "1",
                "-reconnect_delay_max", "2",
                "-http_persistent", "0",
            ]
            .map(String::from),
        );
    }
    args.extend([
        "-ss".to_string(),
        format!("{:.3}", start),
        "-t".to_string(),
        format!("{:.3}", duration),
        "-i".to_string(),
        source.to_string(),
    ]);
    args.extend(
        [
            "-c:v", "libx264",
            "-preset", "ultrafast",
            "-movflags", "+faststart",
            "-pix_fmt", "yuv420p",
            "-avoid_negative_ts", "make_zero",
            "-y",
        ]
        .map(String::from),
    );
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Фоновый источник
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackgroundSource {
    /// Путь к файлу или URL
    pub locator: String,
    /// Известная заранее длительность (метаданные библиотеки ассетов)
    pub known_duration: Option<f64>,
}

impl BackgroundSource {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            known_duration: None,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.known_duration = Some(duration);
        self
    }

    pub fn is_remote(&self) -> bool {
        is_remote(&self.locator)
    }
}

/// Окно внутри источника
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoWindow {
    pub start: f64,
    pub end: f64,
    /// Нужно ли вырезать окно (источник длиннее квиза)
    pub extract: bool,
}

impl VideoWindow {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Выбрать окно источника длиной в квиз
///
/// Если источник не длиннее квиза (или длительность неизвестна), берётся
/// весь источник. Иначе начало выбирается случайно так, чтобы окно не
/// заходило в отступ от конца источника.
pub fn choose_window<R: Rng + ?Sized>(
    source_duration: f64,
    quiz_duration: f64,
    config: &VideoConfig,
    rng: &mut R,
) -> VideoWindow {
    let quiz_duration = if quiz_duration > 0.0 {
        quiz_duration
    } else {
        warn!(
            "Quiz duration not available ({:.1}s), using default {:.1}s",
            quiz_duration, config.default_quiz_duration
        );
        config.default_quiz_duration
    };

    if !(source_duration > 0.0) || source_duration <= quiz_duration {
        return VideoWindow {
            start: 0.0,
            end: if source_duration > 0.0 { source_duration } else { quiz_duration },
            extract: false,
        };
    }

    let safety_margin = (source_duration * config.safety_margin_ratio).min(config.max_safety_margin);
    let max_start = (source_duration - quiz_duration - safety_margin).max(0.0);
    let start = if max_start > 0.0 {
        rng.gen_range(0.0..=max_start)
    } else {
        0.0
    };

    VideoWindow {
        start,
        end: start + quiz_duration,
        extract: true,
    }
}

/// Каким путём получено фоновое видео
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ReconcileTier {
    /// Источник целиком, вырезание не требовалось
    Direct,
    /// Вырезанный отрезок
    Extracted,
    /// Отрезок, вырезанный из полной локальной загрузки
    LocalExtracted,
    /// Полная локальная загрузка без вырезания
    FullDownload,
    /// Исходная ссылка без обработки
    OriginalSource,
}

impl ReconcileTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Extracted => "extracted",
            Self::LocalExtracted => "local extraction",
            Self::FullDownload => "full download",
            Self::OriginalSource => "original source",
        }
    }
}

impl fmt::Display for ReconcileTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Готовое фоновое видео
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSegment {
    pub source_identifier: String,
    /// Длительность источника (0, если неизвестна)
    pub source_duration: f64,
    pub chosen_start: f64,
    pub chosen_end: f64,
    /// Локальный файл, если он есть
    pub local_path: Option<PathBuf>,
    pub tier: ReconcileTier,
}

impl VideoSegment {
    /// Что передать рендереру: локальный файл или исходная ссылка
    pub fn input(&self) -> String {
        match &self.local_path {
            Some(path) => path.to_string_lossy().into_owned(),
            None => self.source_identifier.clone(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.chosen_end - self.chosen_start
    }
}

/// Загрузка удалённого источника целиком
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, locator: &str, dest: &Path) -> anyhow::Result<()>;
}

/// Потоковая загрузка по HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str, dest: &Path) -> anyhow::Result<()> {
        let response = self.client.get(locator).send().await?.error_for_status()?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if written == 0 {
            anyhow::bail!("empty response body from {}", locator);
        }
        Ok(())
    }
}

/// Подбор фонового видео
pub struct VideoReconciler {
    media: Arc<dyn MediaTool>,
    fetcher: Arc<dyn SourceFetcher>,
    cache: SegmentCache,
    config: VideoConfig,
}

impl VideoReconciler {
    pub fn new(
        media: Arc<dyn MediaTool>,
        fetcher: Arc<dyn SourceFetcher>,
        cache: SegmentCache,
        config: VideoConfig,
    ) -> Self {
        Self {
            media,
            fetcher,
            cache,
            config,
        }
    }

    pub async fn reconcile(
        &self,
        source: &BackgroundSource,
        quiz_duration: f64,
        workspace: &RenderWorkspace,
        progress: &Option<Sender<ProgressUpdate>>,
    ) -> Result<VideoSegment> {
        let mut rng = StdRng::from_entropy();
        self.reconcile_with_rng(source, quiz_duration, workspace, progress, &mut rng)
            .await
    }

    /// То же, что `reconcile`, с внешним генератором для выбора окна
    pub async fn reconcile_with_rng<R: Rng + Send>(
        &self,
        source: &BackgroundSource,
        quiz_duration: f64,
        workspace: &RenderWorkspace,
        progress: &Option<Sender<ProgressUpdate>>,
        rng: &mut R,
    ) -> Result<VideoSegment> {
        let locator = source.locator.trim();
        if locator.is_empty() {
            return Err(QuizSyncError::VideoResolution("background source locator is empty".to_string()));
        }
        let remote = is_remote(locator);
        if !remote && !Path::new(locator).exists() {
            error!("Background video {} does not exist", locator);
            return Err(QuizSyncError::VideoResolution(format!(
                "background video {} does not exist",
                locator
            )));
        }

        let cached = if remote { self.usable_cache_entry(locator).await } else { None };
        let source_duration = self.source_duration(source, locator, cached.as_deref()).await;
        let window = choose_window(source_duration, quiz_duration, &self.config, rng);
        info!(
            "Background video: {:.1}s total, using {:.1}s - {:.1}s",
            source_duration, window.start, window.end
        );

        let segment = |tier: ReconcileTier, start: f64, end: f64, local_path: Option<PathBuf>| VideoSegment {
            source_identifier: locator.to_string(),
            source_duration,
            chosen_start: start,
            chosen_end: end,
            local_path,
            tier,
        };
        let local_source = if remote { cached.clone() } else { Some(PathBuf::from(locator)) };

        if !window.extract {
            return Ok(segment(ReconcileTier::Direct, window.start, window.end, local_source));
        }

        // Вырезание, из кэша если он есть
        let input = match &cached {
            Some(path) => path.to_string_lossy().into_owned(),
            None => locator.to_string(),
        };
        let output = workspace.file("background_segment.mp4");
        match self.extract_and_validate(&input, &window, &output).await {
            Ok(duration) => {
                info!("Video segment extracted: {} ({:.1}s)", output.display(), duration);
                return Ok(segment(ReconcileTier::Extracted, window.start, window.end, Some(output)));
            }
            Err(e) => warn!("Segment extraction from {} failed: {}", input, e),
        }

        // Повреждённую запись кэша заменяем свежей загрузкой
        if cached.is_some() {
            self.cache.evict(locator).await;
        }

        let full = if remote {
            send_progress(progress, ProgressUpdate::VideoFallback { tier: ReconcileTier::LocalExtracted }).await;
            match self.download(locator).await {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Full download of {} failed: {}", locator, e);
                    None
                }
            }
        } else {
            None
        };

        if let Some(full) = &full {
            let local_output = workspace.file("background_segment_local.mp4");
            match self
                .extract_and_validate(&full.to_string_lossy(), &window, &local_output)
                .await
            {
                Ok(duration) => {
                    info!("Local segment extracted: {} ({:.1}s)", local_output.display(), duration);
                    return Ok(segment(
                        ReconcileTier::LocalExtracted,
                        window.start,
                        window.end,
                        Some(local_output),
                    ));
                }
                Err(e) => warn!("Local segment extraction failed: {}", e),
            }

            send_progress(progress, ProgressUpdate::VideoFallback { tier: ReconcileTier::FullDownload }).await;
            match self.validate(full).await {
                Ok(duration) => {
                    warn!("Using full local download unsegmented ({:.1}s)", duration);
                    return Ok(segment(ReconcileTier::FullDownload, 0.0, duration, Some(full.clone())));
                }
                Err(e) => warn!("Full local download is unusable: {}", e),
            }
        }

        send_progress(progress, ProgressUpdate::VideoFallback { tier: ReconcileTier::OriginalSource }).await;
        warn!("Falling back to original video source {}", locator);
        let end = if source_duration > 0.0 { source_duration } else { window.duration() };
        let original = if remote { None } else { Some(PathBuf::from(locator)) };
        Ok(segment(ReconcileTier::OriginalSource, 0.0, end, original))
    }

    /// Запись кэша, если она проходит проверку; испорченная запись удаляется
    async fn usable_cache_entry(&self, locator: &str) -> Option<PathBuf> {
        let path = self.cache.lookup(locator).await?;
        match self.validate(&path).await {
            Ok(_) => Some(path),
            Err(e) => {
                warn!("Cached copy of {} is unusable, evicting it: {}", locator, e);
                self.cache.evict(locator).await;
                None
            }
        }
    }

    /// Длительность источника; 0, если её не удалось получить
    async fn source_duration(&self, source: &BackgroundSource, locator: &str, cached: Option<&Path>) -> f64 {
        if let Some(duration) = source.known_duration.filter(|d| *d > 0.0) {
            return duration;
        }
        let probe_target = match cached {
            Some(path) => path.to_string_lossy().into_owned(),
            None => locator.to_string(),
        };
        match self.media.probe_duration(&probe_target).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("Could not get duration of {}: {}", locator, e);
                0.0
            }
        }
    }

    async fn extract_and_validate(&self, input: &str, window: &VideoWindow, output: &Path) -> Result<f64> {
        if output.exists() {
            tokio::fs::remove_file(output).await?;
        }
        self.media
            .extract_segment(
                input,
                window.start,
                window.duration(),
                output,
                Duration::from_secs(self.config.extraction_timeout_secs),
            )
            .await?;
        self.validate(output).await
    }

    /// Файл существует, не пуст и длиннее минимальной длительности
    async fn validate(&self, path: &Path) -> Result<f64> {
        if !check_file_exists_and_valid(path).await {
            return Err(QuizSyncError::VideoResolution(format!("{} is missing or empty", path.display())));
        }
        let duration = self.media.probe_duration(&path.to_string_lossy()).await?;
        if duration <= self.config.min_valid_duration {
            return Err(QuizSyncError::VideoResolution(format!(
                "{} is only {:.3}s long",
                path.display(),
                duration
            )));
        }
        Ok(duration)
    }

    /// Загрузить источник в кэш целиком
    async fn download(&self, locator: &str) -> Result<PathBuf> {
        let staging = self.cache.staging_path(locator)?;
        info!("Downloading full background video {} ...", locator);

        let timeout = Duration::from_secs(self.config.download_timeout_secs);
        let fetched = match tokio::time::timeout(timeout, self.fetcher.fetch(locator, &staging)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(QuizSyncError::VideoResolution(format!("download failed: {:#}", e))),
            Err(_) => Err(QuizSyncError::ToolTimeout {
                tool: "download".to_string(),
                seconds: timeout.as_secs(),
            }),
        };
        if let Err(e) = fetched {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        // В кэш попадают только воспроизводимые файлы
        if let Err(e) = self.validate(&staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(QuizSyncError::VideoResolution(format!("downloaded file is unusable: {}", e)));
        }

        let entry = self.cache.commit(&staging, locator).await?;
        if let Err(e) = self.cache.prune_keeping(Some(&entry)) {
            warn!("Failed to prune video cache: {}", e);
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_containment() {
        let config = VideoConfig::default();
        let mut rng = StdRng::seed_from_u64(42);

        for i in 0..2000 {
            let quiz = 5.0 + (i % 40) as f64;
            let source = quiz + 0.01 + (i % 97) as f64 * 1.7;
            let window = choose_window(source, quiz, &config, &mut rng);

            assert!(window.extract);
            assert!(window.start >= 0.0);
            assert!(window.end <= source, "{:?} exceeds {}", window, source);
            assert!((window.duration() - quiz).abs() < 1e-9);
        }
    }

    #[test]
    fn test_window_respects_safety_margin() {
        let config = VideoConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        // Отступ 5 секунд: начало не позже 100 - 15 - 5
        for _ in 0..500 {
            let window = choose_window(100.0, 15.0, &config, &mut rng);
            assert!(window.start <= 80.0);
        }
    }

    #[test]
    fn test_short_or_unknown_source_uses_whole_clip() {
        let config = VideoConfig::default();
        let mut rng = StdRng::seed_from_u64(1);

        let short = choose_window(10.0, 15.0, &config, &mut rng);
        assert_eq!(short, VideoWindow { start: 0.0, end: 10.0, extract: false });

        let equal = choose_window(15.0, 15.0, &config, &mut rng);
        assert!(!equal.extract);

        let unknown = choose_window(0.0, 15.0, &config, &mut rng);
        assert_eq!(unknown, VideoWindow { start: 0.0, end: 15.0, extract: false });
    }

    #[test]
    fn test_non_positive_quiz_duration_uses_default() {
        let config = VideoConfig::default();
        let mut rng = StdRng::seed_from_u64(3);

        let window = choose_window(120.0, 0.0, &config, &mut rng);
        assert!((window.duration() - 30.0).abs() < 1e-9);
        assert!(window.end <= 120.0);
    }

    #[test]
    fn test_extract_args_remote_options() {
        let remote = extract_args("https://cdn.example.com/v.mp4", 12.5, 15.0, Path::new("out.mp4"), true);
        let local = extract_args("/videos/v.mp4", 12.5, 15.0, Path::new("out.mp4"), false);

        assert!(remote.contains(&"-reconnect_streamed".to_string()));
        assert!(remote.contains(&"file,http,https,tcp,tls".to_string()));
        assert!(!local.contains(&"-reconnect".to_string()));
        for args in [&remote, &local] {
            assert!(args.contains(&"+faststart".to_string()));
            assert!(args.contains(&"yuv420p".to_string()));
            assert!(args.windows(2).any(|w| w[0] == "-ss" && w[1] == "12.500"));
            assert!(args.windows(2).any(|w| w[0] == "-t" && w[1] == "15.000"));
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.com/a.mp4"));
        assert!(is_remote("HTTP://example.com/a.mp4"));
        assert!(!is_remote("/tmp/a.mp4"));
        assert!(!is_remote("file:///tmp/a.mp4"));
    }
}
