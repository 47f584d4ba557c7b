use crate::application::ports::KeyValueStore;
use crate::shared::error::AppError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// プロセス内だけで生きるストア（セッションストア相当）
#[derive(Default)]
pub struct MemoryKeyValueStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.values.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, AppError> {
        Ok(self.values.read().await.keys().cloned().collect())
    }
}

/// JSON ファイル 1 つに全キーを書き出すストア（ローカルストレージ相当）
pub struct FileKeyValueStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// ファイルがあれば読み込む。壊れていれば空から始める。
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let values = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!("ignoring unreadable store {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("opened key-value store at {}", path.display());
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(values)
            .map_err(|e| AppError::SerializationError(e.to_string()))?;
        // 途中で落ちても元ファイルを壊さないよう一時ファイル経由で置き換える
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value.to_string());
        self.persist(&values).await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut values = self.values.write().await;
        if values.remove(key).is_some() {
            self.persist(&values).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, AppError> {
        Ok(self.values.read().await.keys().cloned().collect())
    }
}
