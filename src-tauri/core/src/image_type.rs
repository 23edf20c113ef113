//! 支持上传的图片扩展名与 MIME 类型。
//! 先按扩展名判断，再按文件内容用 infer 推断；推断出的类型也必须在支持列表中。

use std::path::Path;

/// 扩展名到 MIME 的映射（小写，不含点号）。
const EXT_MIME: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("svg", "image/svg+xml"),
    ("avif", "image/avif"),
    ("heic", "image/heic"),
];

/// 根据扩展名返回 MIME。`ext` 可含点号，大小写不敏感。
pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let e = ext.trim().trim_start_matches('.').to_lowercase();
    if e.is_empty() {
        return None;
    }
    EXT_MIME
        .iter()
        .find(|(k, _)| *k == e)
        .map(|(_, mime)| *mime)
}

#[inline]
pub fn is_supported_mime(mime: &str) -> bool {
    let m = mime.to_lowercase();
    EXT_MIME.iter().any(|(_, v)| *v == m)
}

/// 推断待上传文件的 MIME：扩展名优先，其次内容嗅探；都不是支持的图片时返回 None。
pub fn detect_image_mime(file_name: &str, content: &[u8]) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    if let Some(mime) = mime_for_extension(ext) {
        return Some(mime);
    }
    let kind = infer::get(content)?;
    EXT_MIME
        .iter()
        .map(|(_, v)| *v)
        .find(|v| v.eq_ignore_ascii_case(kind.mime_type()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for_extension("PNG"), Some("image/png"));
        assert_eq!(mime_for_extension(".jpg"), Some("image/jpeg"));
        assert_eq!(mime_for_extension("txt"), None);
        assert_eq!(mime_for_extension(""), None);
    }

    #[test]
    fn test_detect_by_content() {
        assert_eq!(detect_image_mime("cat.png", b"whatever"), Some("image/png"));
        assert_eq!(detect_image_mime("photo", PNG_MAGIC), Some("image/png"));
        assert_eq!(detect_image_mime("notes.txt", b"hello world"), None);
    }

    #[test]
    fn test_is_supported_mime() {
        assert!(is_supported_mime("image/PNG"));
        assert!(!is_supported_mime("text/plain"));
    }
}
