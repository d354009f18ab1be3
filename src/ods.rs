//! # ODS container
//!
//! Minimal reader and writer for OpenDocument spreadsheets holding plain string
//! cells. Only what vocabulary lists need is supported: named sheets of text rows.
//!
//! A written workbook is a zip archive with:
//!
//! ```text
//! mimetype                 (stored, first entry)
//! content.xml              sheets as <table:table> of string cells
//! styles.xml               empty office:styles
//! META-INF/manifest.xml
//! ```
//!
//! Files are written to a temporary file next to the target and renamed into place,
//! so a reader never sees a half-written workbook.

use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use roxmltree::{Document, Node};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

use crate::error::VocabularyError;

pub const ODS_MIMETYPE: &str = "application/vnd.oasis.opendocument.spreadsheet";

const NS_OFFICE: &str = "urn:oasis:names:tc:opendocument:xmlns:office:1.0";
const NS_TABLE: &str = "urn:oasis:names:tc:opendocument:xmlns:table:1.0";
const NS_TEXT: &str = "urn:oasis:names:tc:opendocument:xmlns:text:1.0";
const NS_MANIFEST: &str = "urn:oasis:names:tc:opendocument:xmlns:manifest:1.0";

/// Upper bound for `number-columns-repeated` / `number-rows-repeated` expansion.
/// Office suites pad sheets with huge repeat counts of empty cells.
const MAX_REPEAT: usize = 1024;

#[derive(Debug, Error)]
pub enum OdsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("invalid content.xml: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("content.xml is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("could not move workbook into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl From<OdsError> for VocabularyError {
    fn from(err: OdsError) -> Self {
        VocabularyError::Export(err.to_string())
    }
}

/// One worksheet: a name and rows of cell text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }
}

/// Write `sheets` to `path`, replacing any existing file.
///
/// The parent directory must exist.
pub fn write_workbook(path: &Path, sheets: &[Sheet]) -> Result<(), OdsError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = NamedTempFile::new_in(dir)?;
    let mut writer = ZipWriter::new(temp);

    writer.start_file("mimetype", entry_options(CompressionMethod::Stored))?;
    writer.write_all(ODS_MIMETYPE.as_bytes())?;

    writer.start_file("content.xml", entry_options(CompressionMethod::Deflated))?;
    writer.write_all(content_xml(sheets).as_bytes())?;

    writer.start_file("styles.xml", entry_options(CompressionMethod::Deflated))?;
    writer.write_all(styles_xml().as_bytes())?;

    writer.start_file("META-INF/manifest.xml", entry_options(CompressionMethod::Deflated))?;
    writer.write_all(manifest_xml().as_bytes())?;

    let mut temp = writer.finish()?;
    temp.flush()?;
    temp.persist(path)?;

    debug!("Wrote workbook {} ({} sheets)", path.display(), sheets.len());
    Ok(())
}

fn entry_options(method: CompressionMethod) -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(method)
}

/// Read every sheet of the workbook at `path`.
///
/// Repeated cells and rows are expanded; trailing empty cells and empty rows are
/// dropped. Cells are trimmed.
pub fn read_workbook(path: &Path) -> Result<Vec<Sheet>, OdsError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut bytes = Vec::new();
    archive.by_name("content.xml")?.read_to_end(&mut bytes)?;
    let xml = String::from_utf8(bytes)?;
    parse_content(&xml)
}

fn parse_content(xml: &str) -> Result<Vec<Sheet>, OdsError> {
    let document = Document::parse(xml)?;
    let sheets = document
        .descendants()
        .filter(|node| is_element(*node, NS_TABLE, "table"))
        .map(read_sheet)
        .collect();
    Ok(sheets)
}

fn read_sheet(table: Node) -> Sheet {
    let mut sheet = Sheet::new(table.attribute((NS_TABLE, "name")).unwrap_or_default());

    // Rows may sit directly under the table or inside header-rows / row-group wrappers.
    for row in table
        .descendants()
        .filter(|node| is_element(*node, NS_TABLE, "table-row"))
    {
        let mut cells = Vec::new();
        for cell in row.children().filter(|node| {
            is_element(*node, NS_TABLE, "table-cell")
                || is_element(*node, NS_TABLE, "covered-table-cell")
        }) {
            let text = cell_text(cell);
            let repeat = repeat_count(cell, "number-columns-repeated");
            cells.extend(std::iter::repeat_n(text, repeat));
        }

        while cells.last().is_some_and(|cell: &String| cell.is_empty()) {
            cells.pop();
        }
        if cells.is_empty() {
            continue;
        }

        let repeat = repeat_count(row, "number-rows-repeated");
        for _ in 1..repeat {
            sheet.rows.push(cells.clone());
        }
        sheet.rows.push(cells);
    }
    sheet
}

fn cell_text(cell: Node) -> String {
    let paragraphs: Vec<String> = cell
        .children()
        .filter(|node| is_element(*node, NS_TEXT, "p"))
        .map(|paragraph| {
            paragraph
                .descendants()
                .filter_map(|node| {
                    if is_element(node, NS_TEXT, "s") {
                        let count = node
                            .attribute((NS_TEXT, "c"))
                            .and_then(|value| value.parse::<usize>().ok())
                            .unwrap_or(1);
                        Some(" ".repeat(count))
                    } else if node.is_text() {
                        node.text().map(str::to_string)
                    } else {
                        None
                    }
                })
                .collect::<String>()
        })
        .collect();
    paragraphs.join("\n").trim().to_string()
}

fn repeat_count(node: Node, attribute: &str) -> usize {
    node.attribute((NS_TABLE, attribute))
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(1)
        .clamp(1, MAX_REPEAT)
}

fn is_element(node: Node, namespace: &str, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(namespace)
}

fn content_xml(sheets: &[Sheet]) -> String {
    let mut xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="{NS_OFFICE}" xmlns:table="{NS_TABLE}" xmlns:text="{NS_TEXT}" office:version="1.2"><office:body><office:spreadsheet>"#
    );
    for sheet in sheets {
        xml.push_str(&format!(r#"<table:table table:name="{}">"#, escape_xml(&sheet.name)));
        for row in &sheet.rows {
            xml.push_str("<table:table-row>");
            for cell in row {
                xml.push_str(&format!(
                    r#"<table:table-cell office:value-type="string"><text:p>{}</text:p></table:table-cell>"#,
                    escape_xml(cell)
                ));
            }
            xml.push_str("</table:table-row>");
        }
        xml.push_str("</table:table>");
    }
    xml.push_str("</office:spreadsheet></office:body></office:document-content>");
    xml
}

fn styles_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-styles xmlns:office="{NS_OFFICE}" office:version="1.2"><office:styles/></office:document-styles>"#
    )
}

fn manifest_xml() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="{NS_MANIFEST}" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:media-type="{ODS_MIMETYPE}"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#
    )
}

/// Escape text for element content and attribute values. Characters XML 1.0
/// cannot carry are dropped.
fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\t' | '\n' | '\r' => escaped.push(ch),
            ch if ch.is_control() => {}
            ch => escaped.push(ch),
        }
    }
    escaped
}
