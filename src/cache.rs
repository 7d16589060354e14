//! Модуль кэша фоновых видео между рендерами
//!
//! Записи адресуются md5 от локатора источника. Запись пишется во временный
//! файл с уникальным именем и переименовывается на место, поэтому при
//! гонке двух рендеров побеждает последний, а читатели никогда не видят
//! недописанный файл.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::QuizSyncConfig;
use crate::error::Result;
use crate::utils::ffmpeg::check_file_exists_and_valid;

const ENTRY_EXTENSION: &str = "mp4";
const STAGING_EXTENSION: &str = "part";

/// Кэш загруженных источников
#[derive(Debug, Clone)]
pub struct SegmentCache {
    /// Директория для кэша
    cache_dir: PathBuf,
    /// Максимальный размер кэша в байтах
    max_size: Option<u64>,
}

impl SegmentCache {
    pub fn new(cache_dir: impl Into<PathBuf>, max_size: Option<u64>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_size,
        }
    }

    pub fn from_config(config: &QuizSyncConfig) -> Self {
        Self::new(config.resolved_cache_dir(), config.max_cache_size)
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Ключ кэша: md5 от локатора в hex
    pub fn key(locator: &str) -> String {
        format!("{:x}", md5::compute(locator.as_bytes()))
    }

    /// Путь записи для локатора (файл может не существовать)
    pub fn entry_path(&self, locator: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{}", Self::key(locator), ENTRY_EXTENSION))
    }

    /// Готовая запись, если она есть и не пустая
    pub async fn lookup(&self, locator: &str) -> Option<PathBuf> {
        let path = self.entry_path(locator);
        if check_file_exists_and_valid(&path).await {
            debug!("Cache hit for {} at {}", locator, path.display());
            Some(path)
        } else {
            None
        }
    }

    /// Уникальный временный файл для заполнения записи
    pub fn staging_path(&self, locator: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.cache_dir)?;
        Ok(self.cache_dir.join(format!(
            "{}.{}.{}",
            Self::key(locator),
            uuid::Uuid::new_v4(),
            STAGING_EXTENSION
        )))
    }

    /// Переименовать заполненный временный файл в запись
    pub async fn commit(&self, staging: &Path, locator: &str) -> Result<PathBuf> {
        let entry = self.entry_path(locator);
        tokio::fs::rename(staging, &entry).await?;
        info!("Cached {} as {}", locator, entry.display());
        Ok(entry)
    }

    /// Удалить запись (например, повреждённую)
    pub async fn evict(&self, locator: &str) {
        let entry = self.entry_path(locator);
        if let Err(e) = tokio::fs::remove_file(&entry).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to evict cache entry {}: {}", entry.display(), e);
            }
        }
    }

    /// Удалить старые записи, пока размер кэша превышает максимальный
    ///
    /// Возвращает число удалённых файлов.
    pub fn prune(&self) -> Result<usize> {
        self.prune_keeping(None)
    }

    /// То же, что `prune`, но запись `keep` не удаляется никогда,
    /// даже если она одна больше лимита
    pub fn prune_keeping(&self, keep: Option<&Path>) -> Result<usize> {
        let Some(max_size) = self.max_size else {
            return Ok(0);
        };
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut total_size = 0;
        let mut files = Vec::new();

        // Только записи верхнего уровня: поддиректории (эффекты) не трогаем
        for entry in WalkDir::new(&self.cache_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            let is_entry = entry.file_type().is_file()
                && entry.path().extension().map_or(false, |ext| ext == ENTRY_EXTENSION);
            if !is_entry {
                continue;
            }
            let metadata = entry.metadata().map_err(std::io::Error::from)?;
            total_size += metadata.len();
            if keep == Some(entry.path()) {
                continue;
            }
            files.push((entry.into_path(), metadata.modified()?, metadata.len()));
        }

        if total_size <= max_size {
            return Ok(0);
        }

        // От старых к новым
        files.sort_by(|a, b| a.1.cmp(&b.1));

        let mut removed = 0;
        for (path, _, len) in files {
            if total_size <= max_size {
                break;
            }
            fs::remove_file(&path)?;
            total_size -= len;
            removed += 1;
            debug!("Pruned cache entry {}", path.display());
        }

        Ok(removed)
    }
}
