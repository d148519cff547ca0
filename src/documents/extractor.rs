use std::io::{Cursor, Read};

use crate::error::{LanternError, Result};

const PLAIN_TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "rst", "csv", "json", "yaml", "yml", "toml", "xml", "html", "htm",
    "log", "ini", "cfg", "conf",
];

fn extension_of(filename: &str) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Check if an upload with this file name can be ingested.
pub fn is_supported(filename: &str) -> bool {
    let ext = extension_of(filename);
    PLAIN_TEXT_EXTENSIONS.contains(&ext.as_str()) || ext == "pdf" || ext == "docx"
}

/// Extract text from uploaded bytes, picking the format from the file name.
pub fn extract_text(filename: &str, bytes: &[u8]) -> Result<String> {
    let ext = extension_of(filename);
    let text = match ext.as_str() {
        "pdf" => extract_pdf(filename, bytes)?,
        "docx" => extract_docx(filename, bytes)?,
        e if PLAIN_TEXT_EXTENSIONS.contains(&e) => String::from_utf8_lossy(bytes).into_owned(),
        other => {
            return Err(LanternError::Document(format!(
                "Unsupported file type: {}",
                if other.is_empty() { "(none)" } else { other }
            )))
        }
    };

    if text.trim().is_empty() {
        return Err(LanternError::Document(format!(
            "No extractable text in {}",
            filename
        )));
    }
    Ok(text)
}

fn extract_pdf(filename: &str, bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| {
        LanternError::Document(format!("Failed to parse PDF {}: {}", filename, e))
    })?;

    let mut text = String::new();
    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(content) => {
                text.push_str(&content);
                text.push('\n');
            }
            Err(e) => tracing::debug!("Skipping page {} of {}: {}", page_num, filename, e),
        }
    }
    Ok(text)
}

/// DOCX is a ZIP archive; body text lives in `<w:t>` runs of word/document.xml.
fn extract_docx(filename: &str, bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| {
            LanternError::Document(format!("{} has no word/document.xml: {}", filename, e))
        })?
        .read_to_string(&mut xml)?;
    Ok(docx_xml_to_text(&xml))
}

fn docx_xml_to_text(xml: &str) -> String {
    let mut text = String::new();
    let mut in_text_run = false;
    let mut chars = xml.chars();
    let mut tag = String::new();

    while let Some(ch) = chars.next() {
        if ch != '<' {
            if in_text_run {
                text.push(ch);
            }
            continue;
        }

        in_text_run = false;
        tag.clear();
        tag.push(ch);
        for next in chars.by_ref() {
            tag.push(next);
            if next == '>' {
                break;
            }
        }

        if tag.starts_with("<w:p ") || tag == "<w:p>" || tag == "</w:p>" {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
        } else if tag.starts_with("<w:br") {
            text.push('\n');
        } else if tag.starts_with("<w:tab") {
            text.push('\t');
        } else if tag == "<w:t>" || (tag.starts_with("<w:t ") && !tag.ends_with("/>")) {
            in_text_run = true;
        }
    }

    decode_xml_entities(&text)
}

fn decode_xml_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("word/document.xml", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(document_xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extract_plain_text() {
        let text = extract_text("notes.md", b"# Title\nHello, this is a test.").unwrap();
        assert!(text.contains("Hello"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = extract_text("setup.exe", b"MZ").unwrap_err();
        assert!(err.to_string().contains("Unsupported file type: exe"));
        assert!(extract_text("README", b"text").is_err());
    }

    #[test]
    fn test_empty_document_rejected() {
        assert!(matches!(
            extract_text("blank.txt", b"   \n"),
            Err(LanternError::Document(_))
        ));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported("a.TXT"));
        assert!(is_supported("report.pdf"));
        assert!(is_supported("letter.docx"));
        assert!(!is_supported("sheet.xlsx"));
        assert!(!is_supported("noext"));
    }

    #[test]
    fn test_extract_docx() {
        let xml = r#"<w:document><w:body><w:p><w:r><w:t>Lantern &amp; tools</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">second </w:t><w:tab/><w:t>line</w:t></w:r></w:p></w:body></w:document>"#;
        let text = extract_text("doc.docx", &docx_bytes(xml)).unwrap();
        assert_eq!(text.trim(), "Lantern & tools\nsecond \tline");
    }

    #[test]
    fn test_corrupt_docx_is_error() {
        assert!(extract_text("broken.docx", b"not a zip").is_err());
    }

    #[test]
    fn test_corrupt_pdf_is_error() {
        assert!(matches!(
            extract_text("broken.pdf", b"%PDF-garbage"),
            Err(LanternError::Document(_))
        ));
    }
}
