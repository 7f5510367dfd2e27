//! Access to the spreadsheet currently open in the editor.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Serialized empty sheet loaded by "new file".
pub const BLANK_SHEET: &str = "version:1.5\n\
sheet:c:10:r:30:tvf:1\n\
font:1:normal normal 10pt Arial,Helvetica,sans-serif\n\
valueformat:1:text-wiki\n";

/// The spreadsheet engine, reduced to what paid actions need.
pub trait Workbook: Send + Sync {
    /// Serialized sheet as stored on save.
    fn spreadsheet_content(&self) -> io::Result<String>;

    /// Rendered HTML used for printing.
    fn html_content(&self) -> io::Result<String>;

    /// Replaces the open sheet with `content`, shown under `name`.
    fn view_file(&self, name: &str, content: &str) -> io::Result<()>;
}

/// Sheet kept in a text file on disk.
#[derive(Debug, Clone)]
pub struct SheetFile {
    path: PathBuf,
}

impl SheetFile {
    /// Sheet backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Workbook for SheetFile {
    fn spreadsheet_content(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }

    fn html_content(&self) -> io::Result<String> {
        let raw = self.spreadsheet_content()?;
        Ok(render_html(&raw))
    }

    fn view_file(&self, _name: &str, content: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, content)
    }
}

/// Wraps a serialized sheet in a printable HTML document.
pub fn render_html(raw: &str) -> String {
    let mut body = String::with_capacity(raw.len() + 64);
    for ch in raw.chars() {
        match ch {
            '&' => body.push_str("&amp;"),
            '<' => body.push_str("&lt;"),
            '>' => body.push_str("&gt;"),
            '"' => body.push_str("&quot;"),
            '\'' => body.push_str("&#39;"),
            other => body.push(other),
        }
    }
    format!("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"></head><body><pre>{body}</pre></body></html>\n")
}
