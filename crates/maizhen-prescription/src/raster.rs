//! 处方图片资源
//!
//! 当前显示的图片用 [`ImageLease`] 持有，释放时归还计数，旋转与清除时
//! 旧图片先于新图片被释放，保证不会残留句柄。

use image::codecs::jpeg::JpegEncoder;
use maizhen_core::{ImageUpload, MaizhenError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// 旋转后图片的文件名
pub const ROTATED_FILE_NAME: &str = "rotated.jpg";

/// 图片句柄计数器
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry {
    live: Arc<AtomicUsize>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一张图片，返回持有它的句柄
    pub fn lease(&self, upload: ImageUpload) -> ImageLease {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Image leased: {} ({} live)", upload.file_name, live);
        ImageLease {
            upload,
            live: Arc::clone(&self.live),
        }
    }

    /// 尚未释放的句柄数量
    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

/// 当前图片的独占句柄，Drop 时释放
#[derive(Debug)]
pub struct ImageLease {
    upload: ImageUpload,
    live: Arc<AtomicUsize>,
}

impl ImageLease {
    pub fn upload(&self) -> &ImageUpload {
        &self.upload
    }
}

impl Drop for ImageLease {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!("Image released: {}", self.upload.file_name);
    }
}

/// 顺时针旋转90度，重新编码为JPEG
pub fn rotate_clockwise(source: &ImageUpload, quality: u8) -> Result<ImageUpload> {
    let decoded = image::load_from_memory(&source.bytes)
        .map_err(|e| MaizhenError::Image(format!("无法解码图片 {}: {}", source.file_name, e)))?;

    let rotated = decoded.rotate90().to_rgb8();
    let mut bytes = Vec::new();
    rotated
        .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
        .map_err(|e| MaizhenError::Image(format!("图片编码失败: {}", e)))?;

    Ok(ImageUpload {
        file_name: ROTATED_FILE_NAME.to_string(),
        mime_type: "image/jpeg".to_string(),
        bytes,
    })
}

/// 按扩展名推断图片类型
pub fn guess_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}
