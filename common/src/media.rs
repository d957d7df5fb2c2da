//! メディアタイプ判定

/// 拡張子 → MIMEタイプ
const EXTENSION_MEDIA_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("tif", "image/tiff"),
    ("tiff", "image/tiff"),
    ("heic", "image/heic"),
    ("pdf", "application/pdf"),
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    ("json", "application/json"),
];

/// 解析対象として受け付けるメディアタイプか
///
/// 画像（`image/*`）のみ受け付ける。パラメータ部分（`;charset=...`）は無視。
pub fn is_accepted_media_type(media_type: &str) -> bool {
    let essence = media_type.split(';').next().unwrap_or("").trim();
    essence
        .split_once('/')
        .map(|(top, sub)| top.eq_ignore_ascii_case("image") && !sub.is_empty())
        .unwrap_or(false)
}

/// 拡張子からMIMEタイプを推定
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    let ext = ext.trim_start_matches('.');
    EXTENSION_MEDIA_TYPES
        .iter()
        .find(|(e, _)| e.eq_ignore_ascii_case(ext))
        .map(|(_, m)| *m)
}
