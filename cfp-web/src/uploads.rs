//! Submission file uploads
//!
//! The content type is sniffed from the bytes; the client's claim is
//! ignored. ZIP containers are opened to tell the Office Open XML formats
//! apart, since a slideshow and a presentation share the same layout. Files
//! land under `submissions/YYYY/MM/DD/` in the uploads root.

use crate::db::submissions::StoredFile;
use crate::error::{ApiError, ApiResult};
use chrono::{DateTime, Datelike, Utc};
use sha2::{Digest, Sha256};
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

pub const PDF: &str = "application/pdf";
pub const DOC: &str = "application/msword";
pub const DOCX: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PPT: &str = "application/vnd.ms-powerpoint";
pub const PPTX: &str = "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const PPSX: &str = "application/vnd.openxmlformats-officedocument.presentationml.slideshow";
pub const ZIP: &str = "application/zip";
const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

pub const ALLOWED_CONTENT_TYPES: &[&str] = &[PDF, DOC, DOCX, PPT, PPTX, PPSX, ZIP];

const OOXML_PREFIX: &str = "application/vnd.openxmlformats-officedocument.";

/// Main part content types declared in `[Content_Types].xml`, slideshow first
const OOXML_MAIN_PARTS: &[(&str, &str)] = &[
    ("presentationml.slideshow.main+xml", PPSX),
    ("presentationml.presentation.main+xml", PPTX),
    ("wordprocessingml.document.main+xml", DOCX),
    ("spreadsheetml.sheet.main+xml", XLSX),
];

const CONTENT_TYPES_LIMIT: u64 = 256 * 1024;

pub const TYPE_NOT_ALLOWED: &str = "File type is not allowed (Allowed types: pdf, doc/x, ppt/s, zip).";

const MAX_FILE_NAME_CHARS: usize = 100;

pub fn too_large_message(max_size: usize) -> String {
    format!(
        "Submitted file is too large. Please limit uploads to {}MiB.",
        max_size / (1024 * 1024)
    )
}

/// Content type of an upload as seen from its bytes
pub fn sniff_content_type(bytes: &[u8]) -> Option<&'static str> {
    let detected = infer::get(bytes)?.mime_type();
    if detected == ZIP || detected.starts_with(OOXML_PREFIX) {
        return Some(classify_zip(bytes).unwrap_or(detected));
    }
    Some(detected)
}

/// Look inside a ZIP container for an Office Open XML main part
///
/// `None` when the archive cannot be read.
fn classify_zip(bytes: &[u8]) -> Option<&'static str> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).ok()?;

    let mut manifest = String::new();
    if let Ok(entry) = archive.by_name("[Content_Types].xml") {
        if entry.take(CONTENT_TYPES_LIMIT).read_to_string(&mut manifest).is_err() {
            manifest.clear();
        }
    }
    if let Some((_, content_type)) = OOXML_MAIN_PARTS
        .iter()
        .find(|(main_part, _)| manifest.contains(*main_part))
    {
        return Some(*content_type);
    }

    // No usable manifest, fall back on the part folders
    let has_folder = |prefix: &str| archive.file_names().any(|name| name.starts_with(prefix));
    let content_type = if has_folder("word/") {
        DOCX
    } else if has_folder("ppt/") {
        PPTX
    } else if has_folder("xl/") {
        XLSX
    } else {
        ZIP
    };
    Some(content_type)
}

/// Sniff the content type and enforce the size limit
///
/// Returns the detected content type, or the form error for the `file` field.
pub fn check_upload(bytes: &[u8], max_size: usize) -> Result<&'static str, String> {
    let detected = sniff_content_type(bytes);

    let Some(content_type) = detected.and_then(|mime| {
        ALLOWED_CONTENT_TYPES.iter().copied().find(|allowed| *allowed == mime)
    }) else {
        debug!(detected = ?detected, "Rejected upload type");
        return Err(TYPE_NOT_ALLOWED.to_string());
    };

    if bytes.len() > max_size {
        return Err(too_large_message(max_size));
    }

    Ok(content_type)
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Reduce a client file name to a safe final path component
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    // Keep the tail so the extension survives
    let skip = cleaned.chars().count().saturating_sub(MAX_FILE_NAME_CHARS);
    let truncated: String = cleaned.chars().skip(skip).collect();
    if truncated.is_empty() {
        "upload".to_string()
    } else {
        truncated
    }
}

/// Join a stored relative path onto the uploads root, refusing escapes
pub fn resolve_stored(uploads_root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(uploads_root.join(relative))
}

/// Write an upload and describe it for the database
pub async fn store_upload(
    uploads_root: &Path,
    original_name: &str,
    bytes: &[u8],
    content_type: &str,
    now: DateTime<Utc>,
) -> ApiResult<StoredFile> {
    let file_name = sanitize_file_name(original_name);
    let relative_path = format!(
        "submissions/{:04}/{:02}/{:02}/{}_{}",
        now.year(),
        now.month(),
        now.day(),
        Uuid::new_v4().simple(),
        file_name
    );

    let full_path = resolve_stored(uploads_root, &relative_path)
        .ok_or_else(|| ApiError::Internal(format!("Unsafe upload path: {}", relative_path)))?;
    if let Some(parent) = full_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&full_path, bytes).await?;

    debug!(path = %full_path.display(), size = bytes.len(), "Stored upload");

    Ok(StoredFile {
        relative_path,
        file_name,
        content_type: content_type.to_string(),
        size: bytes.len() as i64,
        sha256: content_hash(bytes),
    })
}

pub async fn read_stored(uploads_root: &Path, relative: &str) -> ApiResult<Vec<u8>> {
    let path = resolve_stored(uploads_root, relative)
        .ok_or_else(|| ApiError::NotFound("Submission file".to_string()))?;
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ApiError::NotFound("Submission file".to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Best-effort removal of a stored file
pub async fn remove_stored(uploads_root: &Path, relative: &str) {
    let Some(path) = resolve_stored(uploads_root, relative) else {
        warn!("Refusing to remove unsafe upload path {}", relative);
        return;
    };
    if let Err(e) = tokio::fs::remove_file(&path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove upload {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    const PDF_BYTES: &[u8] = b"%PDF-1.7\n1 0 obj\n<<>>\nendobj\n%%EOF\n";
    const BARE_ZIP: &[u8] = b"PK\x03\x04\x14\x00\x00\x00\x00\x00";

    const WORD_CLSID: &str = "00020906-0000-0000-c000-000000000046";
    const POWERPOINT_CLSID: &str = "64818d10-4f9b-11cf-86ea-00aa00b929e8";

    fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// Minimal Office Open XML package whose main part is `main_part`
    fn ooxml(main_part: &str, main_content_type: &str) -> Vec<u8> {
        let manifest = format!(
            "<?xml version=\"1.0\"?><Types><Override PartName=\"/{}\" ContentType=\"{}\"/></Types>",
            main_part, main_content_type
        );
        zip_archive(&[
            ("[Content_Types].xml", manifest.as_str()),
            ("_rels/.rels", "<Relationships/>"),
            (main_part, "<document/>"),
        ])
    }

    /// Empty compound file tagged with an application CLSID
    fn ole2(clsid: &str) -> Vec<u8> {
        let mut file = cfb::CompoundFile::create(Cursor::new(Vec::new())).unwrap();
        file.set_storage_clsid("/", Uuid::parse_str(clsid).unwrap()).unwrap();
        file.create_stream("/WordDocument").unwrap().write_all(&[0u8; 64]).unwrap();
        file.flush().unwrap();
        file.into_inner().into_inner()
    }

    #[test]
    fn test_check_upload_accepts_pdf_and_zip() {
        assert_eq!(check_upload(PDF_BYTES, 1024), Ok(PDF));
        assert_eq!(check_upload(BARE_ZIP, 1024), Ok(ZIP));

        let archive = zip_archive(&[("slides/notes.txt", "plain"), ("data.csv", "1,2")]);
        assert_eq!(check_upload(&archive, 1 << 20), Ok(ZIP));
    }

    #[test]
    fn test_check_upload_accepts_office_open_xml() {
        let docx = ooxml(
            "word/document.xml",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml",
        );
        let pptx = ooxml(
            "ppt/presentation.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml",
        );
        let ppsx = ooxml(
            "ppt/presentation.xml",
            "application/vnd.openxmlformats-officedocument.presentationml.slideshow.main+xml",
        );
        assert_eq!(check_upload(&docx, 1 << 20), Ok(DOCX));
        assert_eq!(check_upload(&pptx, 1 << 20), Ok(PPTX));
        assert_eq!(check_upload(&ppsx, 1 << 20), Ok(PPSX));

        // Without a manifest the part folders decide
        let bare = zip_archive(&[("ppt/presentation.xml", "<presentation/>")]);
        assert_eq!(check_upload(&bare, 1 << 20), Ok(PPTX));
    }

    #[test]
    fn test_check_upload_accepts_legacy_office() {
        assert_eq!(check_upload(&ole2(WORD_CLSID), 1 << 20), Ok(DOC));
        assert_eq!(check_upload(&ole2(POWERPOINT_CLSID), 1 << 20), Ok(PPT));
    }

    #[test]
    fn test_check_upload_rejects_spreadsheets() {
        let xlsx = ooxml(
            "xl/workbook.xml",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml",
        );
        assert_eq!(check_upload(&xlsx, 1 << 20), Err(TYPE_NOT_ALLOWED.to_string()));

        let xls = ole2("00020820-0000-0000-c000-000000000046");
        assert_eq!(check_upload(&xls, 1 << 20), Err(TYPE_NOT_ALLOWED.to_string()));
    }

    #[test]
    fn test_check_upload_rejects_other_types() {
        assert_eq!(check_upload(b"just some text", 1024), Err(TYPE_NOT_ALLOWED.to_string()));
        assert_eq!(
            check_upload(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR", 1024),
            Err(TYPE_NOT_ALLOWED.to_string())
        );
    }

    #[test]
    fn test_check_upload_size_limit() {
        let mut big = PDF_BYTES.to_vec();
        big.resize(2 * 1024 * 1024 + 1, b' ');
        assert_eq!(
            check_upload(&big, 2 * 1024 * 1024),
            Err("Submitted file is too large. Please limit uploads to 2MiB.".to_string())
        );
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\talk slides.pdf"), "talk_slides.pdf");
        assert_eq!(sanitize_file_name(".hidden"), "hidden");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name(&format!("{}.pdf", "a".repeat(200))).len(), 100);
        assert!(sanitize_file_name(&format!("{}.pdf", "a".repeat(200))).ends_with(".pdf"));
    }

    #[test]
    fn test_resolve_rejects_escapes() {
        let root = Path::new("/srv/uploads");
        assert!(resolve_stored(root, "../secret").is_none());
        assert!(resolve_stored(root, "/etc/passwd").is_none());
        assert_eq!(
            resolve_stored(root, "submissions/2024/01/02/a.pdf"),
            Some(PathBuf::from("/srv/uploads/submissions/2024/01/02/a.pdf"))
        );
    }

    #[tokio::test]
    async fn test_store_read_remove() {
        let temp_dir = TempDir::new().unwrap();
        let now = Utc::now();
        let stored = store_upload(temp_dir.path(), "paper.pdf", PDF_BYTES, PDF, now)
            .await
            .unwrap();

        assert!(stored.relative_path.starts_with(&format!("submissions/{:04}/", now.year())));
        assert!(stored.relative_path.ends_with("_paper.pdf"));
        assert_eq!(stored.sha256, content_hash(PDF_BYTES));
        assert_eq!(stored.size, PDF_BYTES.len() as i64);

        let bytes = read_stored(temp_dir.path(), &stored.relative_path).await.unwrap();
        assert_eq!(bytes, PDF_BYTES);

        remove_stored(temp_dir.path(), &stored.relative_path).await;
        assert!(matches!(
            read_stored(temp_dir.path(), &stored.relative_path).await,
            Err(ApiError::NotFound(_))
        ));
    }
}
