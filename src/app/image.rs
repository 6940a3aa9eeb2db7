//! Image type detection
//!
//! Pages on disk and inside archives are recognised by extension first and
//! by magic bytes when the extension says nothing. Downloads pick their file
//! extension from the response content type, then from the bytes.

use image::ImageFormat;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "avif", "bmp", "jxl", "heif", "heic",
];

/// Whether a file name carries a known image extension
pub fn has_image_extension(name: &str) -> bool {
    extension_of(name)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Whether the named file is an image, sniffing `head` when the extension is unknown
///
/// `head` only needs the first few dozen bytes of the file.
pub fn is_image(name: &str, head: Option<&[u8]>) -> bool {
    if has_image_extension(name) {
        return true;
    }
    if let Some(ext) = extension_of(name) {
        if NON_IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return false;
        }
    }
    head.map(|bytes| image::guess_format(bytes).is_ok())
        .unwrap_or(false)
}

const NON_IMAGE_EXTENSIONS: &[&str] = &[
    "tmp", "xml", "xhtml", "html", "htm", "opf", "ncx", "css", "txt", "json", "nomedia",
];

/// File extension for a MIME type such as `image/png`
pub fn extension_from_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        "image/jxl" => Some("jxl"),
        "image/heif" => Some("heif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// File extension guessed from the leading bytes of an image
pub fn extension_from_bytes(bytes: &[u8]) -> Option<&'static str> {
    let format = image::guess_format(bytes).ok()?;
    let ext = match format {
        ImageFormat::Jpeg => "jpg",
        ImageFormat::Png => "png",
        ImageFormat::Gif => "gif",
        ImageFormat::WebP => "webp",
        ImageFormat::Avif => "avif",
        ImageFormat::Bmp => "bmp",
        other => other.extensions_str().first().copied()?,
    };
    Some(ext)
}

/// Extension for a downloaded page: content type, then magic bytes, then `jpg`
pub fn page_extension(content_type: Option<&str>, bytes: &[u8]) -> &'static str {
    content_type
        .and_then(extension_from_mime)
        .or_else(|| extension_from_bytes(bytes))
        .unwrap_or("jpg")
}

fn extension_of(name: &str) -> Option<String> {
    let file = crate::app::naming::entry_file_name(name);
    file.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}
