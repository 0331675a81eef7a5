//! Result merging: combine per-chunk DOCX parts into one document.
//!
//! A DOCX file is an OOXML zip archive whose text lives in
//! `word/document.xml`. Chunks are page ranges of one source document, so a
//! faithful merge is body concatenation: splice every subsequent part's
//! `<w:body>` content into the first part's body, in original chunk order,
//! keeping a single section-properties block. Styles, numbering, and the
//! rest of the package are taken from the first part — all parts came out of
//! the same Drive export pipeline, so their support parts are identical.
//!
//! Single-chunk runs never reach this module; the lifecycle controller
//! copies the one output directly.

use crate::error::DriveOcrError;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::{write::FileOptions, ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";

/// Merge DOCX parts, in the given (original index) order, into `dest`.
///
/// Blocking: zip I/O is synchronous. Callers on the async runtime should
/// wrap this in `spawn_blocking`.
pub fn merge_docx(parts: &[PathBuf], dest: &Path) -> Result<(), DriveOcrError> {
    if parts.len() < 2 {
        return Err(DriveOcrError::MergeFailed {
            detail: format!("merge requires at least 2 parts, got {}", parts.len()),
        });
    }

    // Collect every part's body content; keep the first part's section
    // properties as the merged document's single sectPr.
    let mut bodies = Vec::with_capacity(parts.len());
    let mut kept_sect_pr = None;
    let mut first_head = None;
    let mut first_tail = None;

    for (i, part) in parts.iter().enumerate() {
        let xml = read_document_xml(part)?;
        let (head, body, tail) = split_body(&xml).ok_or_else(|| DriveOcrError::MergeFailed {
            detail: format!("{}: no <w:body> element found", part.display()),
        })?;
        let (content, sect_pr) = strip_sect_pr(body);
        if i == 0 {
            first_head = Some(head.to_string());
            first_tail = Some(tail.to_string());
            kept_sect_pr = sect_pr.map(|s| s.to_string());
        }
        bodies.push(content);
        debug!("collected body of part {} ({} bytes)", i, xml.len());
    }

    let merged_xml = format!(
        "{}{}{}{}",
        first_head.unwrap_or_default(),
        bodies.concat(),
        kept_sect_pr.unwrap_or_default(),
        first_tail.unwrap_or_default(),
    );

    write_merged(&parts[0], &merged_xml, dest)
}

/// Read `word/document.xml` out of one DOCX part.
fn read_document_xml(part: &Path) -> Result<String, DriveOcrError> {
    let file = File::open(part).map_err(|e| DriveOcrError::MergeFailed {
        detail: format!("opening {}: {}", part.display(), e),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| DriveOcrError::MergeFailed {
        detail: format!("{} is not a DOCX archive: {}", part.display(), e),
    })?;
    let mut entry = archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| DriveOcrError::MergeFailed {
            detail: format!("{} has no {}: {}", part.display(), DOCUMENT_PART, e),
        })?;
    let mut xml = String::new();
    entry
        .read_to_string(&mut xml)
        .map_err(|e| DriveOcrError::MergeFailed {
            detail: format!("reading {} of {}: {}", DOCUMENT_PART, part.display(), e),
        })?;
    Ok(xml)
}

/// Rewrite the first part's archive with the merged document body.
///
/// Every entry except `word/document.xml` is raw-copied unchanged, so the
/// merged file keeps the first part's styles, fonts, and relationships.
fn write_merged(template: &Path, document_xml: &str, dest: &Path) -> Result<(), DriveOcrError> {
    let file = File::open(template).map_err(|e| DriveOcrError::MergeFailed {
        detail: format!("opening {}: {}", template.display(), e),
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| DriveOcrError::MergeFailed {
        detail: format!("{} is not a DOCX archive: {}", template.display(), e),
    })?;

    let out = File::create(dest).map_err(|e| DriveOcrError::OutputWriteFailed {
        path: dest.to_path_buf(),
        source: e,
    })?;
    let mut writer = ZipWriter::new(out);

    let merge_err = |detail: String| DriveOcrError::MergeFailed { detail };

    for i in 0..archive.len() {
        let entry = archive
            .by_index_raw(i)
            .map_err(|e| merge_err(format!("reading entry {i}: {e}")))?;
        if entry.name() == DOCUMENT_PART {
            continue;
        }
        writer
            .raw_copy_file(entry)
            .map_err(|e| merge_err(format!("copying entry {i}: {e}")))?;
    }

    writer
        .start_file(DOCUMENT_PART, FileOptions::default())
        .map_err(|e| merge_err(format!("starting {DOCUMENT_PART}: {e}")))?;
    writer
        .write_all(document_xml.as_bytes())
        .map_err(|e| merge_err(format!("writing {DOCUMENT_PART}: {e}")))?;
    writer
        .finish()
        .map_err(|e| merge_err(format!("finalising archive: {e}")))?;

    Ok(())
}

/// Split a document.xml into (head, body content, tail) around `<w:body>`.
fn split_body(xml: &str) -> Option<(&str, &str, &str)> {
    const OPEN: &str = "<w:body>";
    const CLOSE: &str = "</w:body>";
    let open = xml.find(OPEN)?;
    let close = xml.rfind(CLOSE)?;
    let body_start = open + OPEN.len();
    if close < body_start {
        return None;
    }
    Some((&xml[..body_start], &xml[body_start..close], &xml[close..]))
}

/// Remove the body-level `<w:sectPr>` block, returning (content, sectPr).
///
/// Handles both the paired and self-closing forms; a body without one is
/// returned unchanged.
fn strip_sect_pr(body: &str) -> (String, Option<&str>) {
    const OPEN: &str = "<w:sectPr";
    const CLOSE: &str = "</w:sectPr>";
    let Some(start) = body.find(OPEN) else {
        return (body.to_string(), None);
    };
    let end = if let Some(close) = body[start..].find(CLOSE) {
        start + close + CLOSE.len()
    } else if let Some(selfclose) = body[start..].find("/>") {
        start + selfclose + 2
    } else {
        return (body.to_string(), None);
    };
    let mut content = String::with_capacity(body.len() - (end - start));
    content.push_str(&body[..start]);
    content.push_str(&body[end..]);
    (content, Some(&body[start..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_docx(dir: &Path, name: &str, paragraph: &str) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        let mut writer = ZipWriter::new(file);
        writer
            .start_file("[Content_Types].xml", FileOptions::default())
            .unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer
            .start_file(DOCUMENT_PART, FileOptions::default())
            .unwrap();
        let xml = format!(
            "<w:document><w:body><w:p><w:r><w:t>{paragraph}</w:t></w:r></w:p>\
             <w:sectPr><w:pgSz/></w:sectPr></w:body></w:document>"
        );
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap();
        path
    }

    fn merged_document_xml(path: &Path) -> String {
        let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut xml = String::new();
        archive
            .by_name(DOCUMENT_PART)
            .unwrap()
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn merge_preserves_part_order() {
        let dir = tempfile::tempdir().unwrap();
        let parts = vec![
            fake_docx(dir.path(), "p0.docx", "Alpha"),
            fake_docx(dir.path(), "p1.docx", "Bravo"),
            fake_docx(dir.path(), "p2.docx", "Charlie"),
        ];
        let dest = dir.path().join("merged.docx");

        merge_docx(&parts, &dest).unwrap();

        let xml = merged_document_xml(&dest);
        let a = xml.find("Alpha").expect("Alpha missing");
        let b = xml.find("Bravo").expect("Bravo missing");
        let c = xml.find("Charlie").expect("Charlie missing");
        assert!(a < b && b < c, "bodies out of order: {xml}");

        // Exactly one section-properties block survives.
        assert_eq!(xml.matches("<w:sectPr").count(), 1, "xml: {xml}");
        // Support parts are carried over from the first archive.
        let mut archive = ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        assert!(archive.by_name("[Content_Types].xml").is_ok());
    }

    #[test]
    fn merge_rejects_single_part() {
        let dir = tempfile::tempdir().unwrap();
        let part = fake_docx(dir.path(), "only.docx", "Solo");
        let err = merge_docx(&[part], &dir.path().join("out.docx")).unwrap_err();
        assert!(matches!(err, DriveOcrError::MergeFailed { .. }));
    }

    #[test]
    fn merge_rejects_non_docx_part() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.docx");
        std::fs::write(&bogus, b"not a zip").unwrap();
        let other = fake_docx(dir.path(), "ok.docx", "Ok");
        let err = merge_docx(&[bogus, other], &dir.path().join("out.docx")).unwrap_err();
        assert!(matches!(err, DriveOcrError::MergeFailed { .. }));
    }

    #[test]
    fn strip_sect_pr_handles_both_forms() {
        let (content, sect) = strip_sect_pr("<w:p>x</w:p><w:sectPr><w:pgSz/></w:sectPr>");
        assert_eq!(content, "<w:p>x</w:p>");
        assert!(sect.unwrap().starts_with("<w:sectPr"));

        let (content, sect) = strip_sect_pr("<w:p>y</w:p><w:sectPr/>");
        assert_eq!(content, "<w:p>y</w:p>");
        assert_eq!(sect, Some("<w:sectPr/>"));

        let (content, sect) = strip_sect_pr("<w:p>z</w:p>");
        assert_eq!(content, "<w:p>z</w:p>");
        assert!(sect.is_none());
    }

    #[test]
    fn split_body_extracts_content() {
        let xml = "<w:document><w:body><w:p>hi</w:p></w:body></w:document>";
        let (head, body, tail) = split_body(xml).unwrap();
        assert!(head.ends_with("<w:body>"));
        assert_eq!(body, "<w:p>hi</w:p>");
        assert!(tail.starts_with("</w:body>"));
        assert!(split_body("<w:document/>").is_none());
    }
}
