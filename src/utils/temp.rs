//! Модуль для работы с временными файлами
//!
//! `RenderWorkspace` владеет рабочей директорией одного рендера,
//! `ScratchFile` удаляет промежуточный файл при выходе из области видимости
//! на любом пути, включая ошибку.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::error::Result;

/// Рабочая директория одного рендера
#[derive(Debug)]
pub struct RenderWorkspace {
    /// Временная директория (None после `keep`)
    temp_dir: Option<TempDir>,
    /// Путь к директории
    path: PathBuf,
    /// Нужно ли удалять файлы при завершении
    cleanup: bool,
}

impl RenderWorkspace {
    /// Создать рабочую директорию внутри `base` (или во временной директории системы)
    pub fn new(base: Option<&Path>, cleanup: bool) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("quiz-sync-");
        let temp_dir = match base {
            Some(base) => {
                fs::create_dir_all(base)?;
                builder.tempdir_in(base)?
            }
            None => builder.tempdir()?,
        };
        let path = temp_dir.path().to_path_buf();
        debug!("Created render workspace {}", path.display());

        Ok(Self {
            temp_dir: Some(temp_dir),
            path,
            cleanup,
        })
    }

    /// Путь к рабочей директории
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Путь к файлу внутри рабочей директории
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Промежуточный файл, который будет удалён вместе с гардом
    pub fn scratch(&self, name: &str) -> ScratchFile {
        ScratchFile::new(self.file(name))
    }

    /// Оставить директорию на диске и вернуть её путь
    pub fn keep(mut self) -> PathBuf {
        if let Some(dir) = self.temp_dir.take() {
            return dir.keep();
        }
        self.path.clone()
    }
}

impl Drop for RenderWorkspace {
    fn drop(&mut self) {
        if let Some(dir) = self.temp_dir.take() {
            if self.cleanup {
                if let Err(e) = dir.close() {
                    warn!("Failed to remove render workspace {}: {}", self.path.display(), e);
                }
            } else {
                let kept = dir.keep();
                debug!("Keeping render workspace {}", kept.display());
            }
        }
    }
}

/// Гард промежуточного файла
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    persisted: bool,
}

impl ScratchFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            persisted: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Отменить удаление и вернуть путь
    pub fn persist(mut self) -> PathBuf {
        self.persisted = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.persisted && self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_file_removed_unless_persisted() {
        let workspace = RenderWorkspace::new(None, true).unwrap();

        let scratch = workspace.scratch("delayed.wav");
        fs::write(scratch.path(), b"x").unwrap();
        let dropped_path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!dropped_path.exists());

        let scratch = workspace.scratch("composite.wav");
        fs::write(scratch.path(), b"x").unwrap();
        let kept = scratch.persist();
        assert!(kept.exists());
    }

    #[test]
    fn test_workspace_cleanup_flag() {
        let base = tempfile::tempdir().unwrap();

        let workspace = RenderWorkspace::new(Some(base.path()), true).unwrap();
        let removed = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!removed.exists());

        let workspace = RenderWorkspace::new(Some(base.path()), false).unwrap();
        let kept = workspace.path().to_path_buf();
        fs::write(workspace.file("a.wav"), b"x").unwrap();
        drop(workspace);
        assert!(kept.join("a.wav").exists());
    }
}
