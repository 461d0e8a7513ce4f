//! Ingestion of a new target image.
//!
//! An update is checked, extracted off the async executor, stored, and only
//! then published. Any rejection leaves canvas state untouched. At most one
//! update is in flight at a time.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::canvas::CanvasVersion;
use crate::hub::Hub;
use crate::orders::{self, RejectionReason};

pub const PNG_CONTENT_TYPE: &str = "image/png";
pub const DEFAULT_REASON: &str = "No reason given";

#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub password: Option<String>,
    pub image: Option<Upload>,
    pub reason: Option<String>,
    pub uploader: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("Incorrect password")]
    IncorrectPassword,
    #[error("The file must be PNG!")]
    NotPng,
    #[error("{0}")]
    Rejected(#[from] RejectionReason),
    #[error("An error occurred.")]
    Malformed(String),
    #[error("An error occurred.")]
    Storage(#[from] ArtifactError),
    #[error("An error occurred.")]
    Internal(String),
}

impl UpdateError {
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::IncorrectPassword => StatusCode::UNAUTHORIZED,
            Self::NotPng | Self::Rejected(_) | Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::Storage(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UpdateError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}

pub struct Updater {
    hub: Hub,
    artifacts: ArtifactStore,
    password: String,
    in_flight: Mutex<()>,
}

impl Updater {
    pub fn new(hub: Hub, artifacts: ArtifactStore, password: impl Into<String>) -> Self {
        Self {
            hub,
            artifacts,
            password: password.into(),
            in_flight: Mutex::new(()),
        }
    }

    fn password_matches(&self, candidate: Option<&str>) -> bool {
        match candidate {
            Some(candidate) if !candidate.is_empty() && !self.password.is_empty() => {
                candidate.as_bytes().ct_eq(self.password.as_bytes()).into()
            }
            _ => false,
        }
    }

    pub async fn submit(&self, request: UpdateRequest) -> Result<CanvasVersion, UpdateError> {
        if !self.password_matches(request.password.as_deref()) {
            warn!("update rejected: incorrect password");
            return Err(UpdateError::IncorrectPassword);
        }
        let upload = match request.image {
            Some(upload) if upload.content_type.as_deref() == Some(PNG_CONTENT_TYPE) => upload,
            _ => return Err(UpdateError::NotPng),
        };

        let _in_flight = self.in_flight.lock().await;
        let geometry = self.hub.geometry();
        let (bytes, extracted) = tokio::task::spawn_blocking(move || {
            let extracted = orders::extract(&upload.bytes, geometry.width, geometry.height);
            (upload.bytes, extracted)
        })
        .await
        .map_err(|err| UpdateError::Internal(format!("extraction task failed: {err}")))?;
        let extracted = extracted.map_err(|reason| {
            warn!("update rejected: {reason}");
            reason
        })?;

        let encoded = orders::encode_orders(&extracted)
            .map_err(|err| UpdateError::Internal(err.to_string()))?;
        let now = self.hub.now_ms();
        let stored = self.artifacts.store(&bytes, &encoded, now).await?;

        let version = CanvasVersion {
            image: stored.image,
            orders: stored.orders,
            order_length: extracted.len(),
            created_at: now,
            reason: request
                .reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_REASON.to_string()),
            uploader: request.uploader.filter(|u| !u.trim().is_empty()),
        };
        info!(
            image = %version.image,
            orders = version.order_length,
            uploader = version.uploader.as_deref().unwrap_or("-"),
            reason = %version.reason,
            "accepted canvas update"
        );
        Ok(self.hub.publish(version).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::CanvasState;
    use crate::clock::SystemClock;
    use crate::config::{CanvasGeometry, Config};
    use crate::persist::Persistence;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use std::sync::Arc;

    fn setup(dir: &std::path::Path) -> (Hub, Updater) {
        let config = Config {
            data_dir: dir.to_path_buf(),
            password: "hunter2".to_string(),
            canvas: CanvasGeometry {
                width: 2,
                height: 1,
            },
            ..Config::default()
        };
        let hub = Hub::new(
            &config,
            CanvasState::default(),
            Persistence::new(config.state_file()),
            Arc::new(SystemClock),
        );
        let artifacts = ArtifactStore::new(config.maps_dir(), config.orders_dir());
        let updater = Updater::new(hub.clone(), artifacts, config.password.clone());
        (hub, updater)
    }

    fn png(pixels: &[[u8; 4]]) -> Vec<u8> {
        let mut raster = RgbaImage::new(pixels.len() as u32, 1);
        for (x, px) in pixels.iter().enumerate() {
            raster.put_pixel(x as u32, 0, Rgba(*px));
        }
        let mut buf = Cursor::new(Vec::new());
        raster.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn request(password: &str, bytes: Vec<u8>) -> UpdateRequest {
        UpdateRequest {
            password: Some(password.to_string()),
            image: Some(Upload {
                content_type: Some(PNG_CONTENT_TYPE.to_string()),
                bytes,
            }),
            reason: None,
            uploader: Some("ops".to_string()),
        }
    }

    #[tokio::test]
    async fn accepted_update_replaces_current_and_writes_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (hub, updater) = setup(dir.path());
        let bytes = png(&[[0, 0, 0, 255], [0, 0, 0, 0]]);

        let version = updater.submit(request("hunter2", bytes)).await.unwrap();
        assert_eq!(version.order_length, 1);
        assert_eq!(version.reason, DEFAULT_REASON);
        assert_eq!(version.uploader.as_deref(), Some("ops"));
        assert_eq!(hub.current().await, version);

        let orders = std::fs::read(dir.path().join("orders").join(&version.orders)).unwrap();
        assert_eq!(orders, b"[[0,0,27]]");
        assert!(dir.path().join("maps").join(&version.image).exists());
    }

    #[tokio::test]
    async fn concurrent_updates_are_applied_one_after_another() {
        let dir = tempfile::tempdir().unwrap();
        let (hub, updater) = setup(dir.path());
        let first = request("hunter2", png(&[[0, 0, 0, 255], [0, 0, 0, 0]]));
        let second = request("hunter2", png(&[[255, 255, 255, 255], [0, 0, 0, 255]]));

        let (a, b) = tokio::join!(updater.submit(first), updater.submit(second));
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.image, b.image);
        assert_ne!(a.orders, b.orders);

        let view = hub.map_view().await;
        assert_eq!(view.recent.len(), 3);
        assert_eq!(view.recent[0], view.current);
        assert!(view.current == a || view.current == b);
        for version in [&a, &b] {
            assert!(dir.path().join("maps").join(&version.image).exists());
            assert!(dir.path().join("orders").join(&version.orders).exists());
        }
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (hub, updater) = setup(dir.path());
        let before = hub.current().await;
        let err = updater
            .submit(request("hunter3", png(&[[0, 0, 0, 255], [0, 0, 0, 255]])))
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::IncorrectPassword));
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(hub.current().await, before);

        let missing = UpdateRequest {
            password: None,
            ..request("", Vec::new())
        };
        assert!(matches!(
            updater.submit(missing).await,
            Err(UpdateError::IncorrectPassword)
        ));
    }

    #[tokio::test]
    async fn non_png_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_hub, updater) = setup(dir.path());
        let mut req = request("hunter2", png(&[[0, 0, 0, 255], [0, 0, 0, 255]]));
        req.image.as_mut().unwrap().content_type = Some("image/jpeg".to_string());
        let err = updater.submit(req).await.unwrap_err();
        assert_eq!(err.to_string(), "The file must be PNG!");
    }

    #[tokio::test]
    async fn off_palette_pixel_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let (hub, updater) = setup(dir.path());
        let before = hub.current().await;

        let err = updater
            .submit(request(
                "hunter2",
                png(&[[0, 0, 0, 255], [0x12, 0x34, 0x56, 255]]),
            ))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "A pixel on 1, 0 has a wrong color. R: 18, G: 52, B: 86, A: 255"
        );
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(hub.current().await, before);
        assert!(!dir.path().join("orders").exists());
    }

    #[tokio::test]
    async fn wrong_geometry_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (_hub, updater) = setup(dir.path());
        let err = updater
            .submit(request("hunter2", png(&[[0, 0, 0, 255]])))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "The file must be 2x1 pixels!");
    }
}
