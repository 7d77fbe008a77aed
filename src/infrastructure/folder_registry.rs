//! 文件夹注册表 - 基础设施层
//!
//! 持久化"要处理哪些文件夹"，格式为 `{"folders": [...]}`。

use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    folders: Vec<PathBuf>,
}

/// 已注册的文件夹列表
#[derive(Debug, Clone)]
pub struct FolderRegistry {
    path: PathBuf,
    folders: Vec<PathBuf>,
}

impl FolderRegistry {
    /// 从注册表文件加载
    ///
    /// 文件不存在时返回空列表；内容损坏时记录错误并返回空列表。
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let folders = match Self::read(&path) {
            Ok(folders) => folders,
            Err(e) => {
                error!("❌ 加载注册表失败: {}", e);
                Vec::new()
            }
        };
        info!("📁 注册表中共有 {} 个文件夹", folders.len());
        Self { path, folders }
    }

    fn read(path: &Path) -> Result<Vec<PathBuf>, RegistryError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: RegistryFile =
            serde_json::from_str(&content).map_err(|source| RegistryError::Json {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(file
            .folders
            .into_iter()
            .filter(|p| !p.as_os_str().is_empty())
            .collect())
    }

    /// 写回注册表文件
    pub fn save(&self) -> Result<(), RegistryError> {
        let file = RegistryFile {
            folders: self.folders.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|source| RegistryError::Json {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })
    }

    pub fn folders(&self) -> &[PathBuf] {
        &self.folders
    }

    /// 添加文件夹，已存在时返回 false
    pub fn add(&mut self, folder: impl Into<PathBuf>) -> bool {
        let folder = folder.into();
        if folder.as_os_str().is_empty() || self.folders.contains(&folder) {
            return false;
        }
        self.folders.push(folder);
        true
    }

    /// 移除文件夹，不存在时返回 false
    pub fn remove(&mut self, folder: &Path) -> bool {
        let before = self.folders.len();
        self.folders.retain(|f| f != folder);
        self.folders.len() != before
    }
}
