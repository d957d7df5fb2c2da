//! 行に添付された画像

use base64::{engine::general_purpose::STANDARD, Engine};
use scaflow_common::{is_accepted_media_type, media_type_for_extension};
use std::path::Path;
use std::sync::Arc;

const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// 行の添付ファイル
///
/// 呼び出し側が所有し、解析中は読み取りのみ。複製しても画像データは共有される。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl ImageAttachment {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            bytes: bytes.into(),
        }
    }

    /// ファイル名と内容からメディアタイプを判定して生成
    pub fn detect(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let media_type = detect_media_type(&file_name, &bytes);
        Self {
            file_name,
            media_type,
            bytes: bytes.into(),
        }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::detect(file_name, bytes))
    }

    /// 解析対象の画像か
    pub fn is_accepted(&self) -> bool {
        is_accepted_media_type(&self.media_type)
    }

    /// `data:<media-type>;base64,<payload>` 形式に変換
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes.as_ref())
    }
}

/// 内容（マジックバイト）を優先し、判定できなければ拡張子から推定
pub fn detect_media_type(file_name: &str, bytes: &[u8]) -> String {
    if let Ok(format) = image::guess_format(bytes) {
        return format.to_mime_type().to_string();
    }

    Path::new(file_name)
        .extension()
        .and_then(|ext| media_type_for_extension(&ext.to_string_lossy()))
        .unwrap_or(FALLBACK_MEDIA_TYPE)
        .to_string()
}
