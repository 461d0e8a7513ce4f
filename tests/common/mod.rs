#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use image::{ImageFormat, Rgba, RgbaImage};
use placehub::app::{self, Running};
use placehub::clock::SystemClock;
use placehub::config::{CanvasGeometry, Config};
use placehub::url::Url;
use placehub::RemoteCanvas;

pub const PASSWORD: &str = "correct horse";
pub const WIDTH: u32 = 4;
pub const HEIGHT: u32 = 2;

pub fn config(dir: &Path) -> Config {
    Config {
        ws_addr: "127.0.0.1:0".parse().unwrap(),
        http_addr: "127.0.0.1:0".parse().unwrap(),
        data_dir: dir.to_path_buf(),
        password: PASSWORD.to_string(),
        canvas: CanvasGeometry {
            width: WIDTH,
            height: HEIGHT,
        },
        stats_interval: Duration::from_millis(50),
        ..Config::default()
    }
}

pub async fn start(dir: &Path) -> Running {
    app::start(config(dir), Arc::new(SystemClock)).await.unwrap()
}

pub async fn connect(running: &Running) -> RemoteCanvas {
    let url = Url::parse(&format!("ws://{}/api/ws", running.ws_addr)).unwrap();
    let client = RemoteCanvas::new(url).await.unwrap();
    // The session is registered once the server has answered something.
    client.ping().await.unwrap();
    client
}

pub fn http_url(running: &Running, path: &str) -> String {
    format!("http://{}{}", running.http_addr, path)
}

/// A PNG of the test geometry; `None` cells are fully transparent.
pub fn png(cells: &[Option<[u8; 3]>]) -> Vec<u8> {
    let mut raster = RgbaImage::from_pixel(WIDTH, HEIGHT, Rgba([0, 0, 0, 0]));
    for (i, cell) in cells.iter().enumerate() {
        if let Some([r, g, b]) = cell {
            let (x, y) = (i as u32 % WIDTH, i as u32 / WIDTH);
            raster.put_pixel(x, y, Rgba([*r, *g, *b, 255]));
        }
    }
    let mut buf = Cursor::new(Vec::new());
    raster.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub async fn upload(
    running: &Running,
    password: &str,
    bytes: Vec<u8>,
    reason: Option<&str>,
) -> reqwest::Response {
    let image = reqwest::multipart::Part::bytes(bytes)
        .file_name("target.png")
        .mime_str("image/png")
        .unwrap();
    let mut form = reqwest::multipart::Form::new()
        .text("password", password.to_string())
        .part("image", image);
    if let Some(reason) = reason {
        form = form.text("reason", reason.to_string());
    }
    reqwest::Client::new()
        .post(http_url(running, "/updateorders"))
        .multipart(form)
        .send()
        .await
        .unwrap()
}
