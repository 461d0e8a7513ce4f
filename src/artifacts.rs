use std::io;
use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("writing {} failed: {}", .path.display(), .source)]
pub struct ArtifactError {
    path: PathBuf,
    source: io::Error,
}

/// Names of one accepted upload's image and order files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifacts {
    pub image: String,
    pub orders: String,
}

/// Writes accepted images to `maps/` and their order lists to `orders/`.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    maps_dir: PathBuf,
    orders_dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(maps_dir: impl Into<PathBuf>, orders_dir: impl Into<PathBuf>) -> Self {
        Self {
            maps_dir: maps_dir.into(),
            orders_dir: orders_dir.into(),
        }
    }

    pub async fn prepare(&self) -> Result<(), ArtifactError> {
        for dir in [&self.maps_dir, &self.orders_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| ArtifactError {
                    path: dir.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Stores both files under one fresh stem derived from `now_ms`.
    pub async fn store(
        &self,
        image: &[u8],
        orders: &[u8],
        now_ms: i64,
    ) -> Result<StoredArtifacts, ArtifactError> {
        let stem = format!("{}-{}", now_ms, &Uuid::new_v4().simple().to_string()[..8]);
        let stored = StoredArtifacts {
            image: format!("{stem}.png"),
            orders: format!("{stem}.json"),
        };
        self.prepare().await?;
        write(self.maps_dir.join(&stored.image), image).await?;
        write(self.orders_dir.join(&stored.orders), orders).await?;
        debug!(image = %stored.image, orders = %stored.orders, "stored artifacts");
        Ok(stored)
    }
}

async fn write(path: PathBuf, bytes: &[u8]) -> Result<(), ArtifactError> {
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|source| ArtifactError { path, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stores_under_fresh_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("maps"), dir.path().join("orders"));

        let first = store.store(b"png", b"[]", 1000).await.unwrap();
        let second = store.store(b"png", b"[]", 1000).await.unwrap();
        assert_ne!(first, second);
        assert!(first.image.starts_with("1000-") && first.image.ends_with(".png"));

        let orders = tokio::fs::read(dir.path().join("orders").join(&first.orders))
            .await
            .unwrap();
        assert_eq!(orders, b"[]");
        assert!(dir.path().join("maps").join(&second.image).exists());
    }
}
