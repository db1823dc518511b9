use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// A position in a text document expressed as (line, UTF-16 code unit offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// A half-open range in a text document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    #[inline]
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

/// An LSP-style content change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    /// The range of text to replace. If `None`, the entire text is replaced.
    pub range: Option<Range>,
    pub text: String,
}

impl ContentChange {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            text: text.into(),
        }
    }

    pub fn replace(range: Range, text: impl Into<String>) -> Self {
        Self {
            range: Some(range),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TextError {
    #[error("invalid range")]
    InvalidRange,
}

/// Immutable-by-default document text with a line index.
///
/// Clones share the underlying buffer; [`SourceText::apply_changes`] copies on write.
#[derive(Clone)]
pub struct SourceText {
    text: Arc<String>,
    line_offsets: Arc<Vec<usize>>,
}

impl SourceText {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let line_offsets = compute_line_offsets(&text);
        Self {
            text: Arc::new(text),
            line_offsets: Arc::new(line_offsets),
        }
    }

    pub fn empty() -> Self {
        Self::new(String::new())
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.line_offsets.len()
    }

    /// Applies a sequence of changes in order. On error the text is left untouched.
    pub fn apply_changes(&mut self, changes: &[ContentChange]) -> Result<(), TextError> {
        let mut updated = self.clone();
        for change in changes {
            updated.apply_change(change)?;
        }
        *self = updated;
        Ok(())
    }

    fn apply_change(&mut self, change: &ContentChange) -> Result<(), TextError> {
        let Some(range) = change.range else {
            *self = SourceText::new(change.text.clone());
            return Ok(());
        };

        let start = self.position_to_offset(range.start);
        let end = self.position_to_offset(range.end);
        if start > end || end > self.text.len() {
            return Err(TextError::InvalidRange);
        }

        let text = Arc::make_mut(&mut self.text);
        text.replace_range(start..end, &change.text);
        self.line_offsets = Arc::new(compute_line_offsets(text));
        Ok(())
    }

    fn position_to_offset(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.line_offsets.len() {
            return self.text.len();
        }

        let line_start = self.line_offsets[line];
        let mut line_end = if line + 1 < self.line_offsets.len() {
            self.line_offsets[line + 1]
        } else {
            self.text.len()
        };

        // Columns are defined over the line text, excluding `\n`, `\r\n` or `\r`.
        if line_end > line_start {
            let bytes = self.text.as_bytes();
            if bytes[line_end - 1] == b'\n' {
                line_end -= 1;
                if line_end > line_start && bytes[line_end - 1] == b'\r' {
                    line_end -= 1;
                }
            } else if bytes[line_end - 1] == b'\r' {
                line_end -= 1;
            }
        }

        let line_slice = &self.text[line_start..line_end];
        line_start + utf16_column_to_byte_offset_clamped(line_slice, position.character)
    }
}

impl fmt::Debug for SourceText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceText")
            .field("len", &self.text.len())
            .field("lines", &self.line_offsets.len())
            .finish()
    }
}

impl PartialEq for SourceText {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.text, &other.text) || self.text == other.text
    }
}

impl Eq for SourceText {}

impl From<&str> for SourceText {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SourceText {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

fn compute_line_offsets(text: &str) -> Vec<usize> {
    let mut offsets = vec![0];
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                offsets.push(i + 1);
                i += 1;
            }
            b'\r' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    offsets.push(i + 2);
                    i += 2;
                } else {
                    offsets.push(i + 1);
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    offsets
}

/// Converts a UTF-16 column into a byte offset into `line`, clamping past-the-end columns to
/// the line end and columns inside a surrogate pair to the start of that character.
fn utf16_column_to_byte_offset_clamped(line: &str, column_utf16: u32) -> usize {
    let mut col: u32 = 0;
    for (idx, ch) in line.char_indices() {
        let ch_len = ch.len_utf16() as u32;
        if col >= column_utf16 || col + ch_len > column_utf16 {
            return idx;
        }
        col = col.saturating_add(ch_len);
    }
    line.len()
}

#[derive(Debug, Error)]
pub enum TextLoadError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("text loader failed: {0}")]
    Other(String),
}

/// Deferred source of a document's text.
///
/// The store never calls a loader itself; loaders run only when a caller asks a document
/// snapshot for its text.
pub trait TextLoader: fmt::Debug + Send + Sync {
    fn load(&self) -> Result<SourceText, TextLoadError>;
}

/// Loads text from the local file system.
#[derive(Debug, Clone)]
pub struct FileTextLoader {
    path: PathBuf,
}

impl FileTextLoader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TextLoader for FileTextLoader {
    fn load(&self) -> Result<SourceText, TextLoadError> {
        tracing::trace!(
            target: "quire.core",
            path = %self.path.display(),
            "loading document text"
        );
        std::fs::read_to_string(&self.path)
            .map(SourceText::new)
            .map_err(|source| TextLoadError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Loader that always produces empty text.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyTextLoader;

impl TextLoader for EmptyTextLoader {
    fn load(&self) -> Result<SourceText, TextLoadError> {
        Ok(SourceText::empty())
    }
}

/// Where a document's text comes from: a deferred loader, or an in-memory buffer once the
/// document is open in an editor.
#[derive(Debug, Clone)]
pub enum TextSource {
    Loader(Arc<dyn TextLoader>),
    Buffer(SourceText),
}

impl TextSource {
    pub fn loader(loader: impl TextLoader + 'static) -> Self {
        TextSource::Loader(Arc::new(loader))
    }

    pub fn buffer(text: impl Into<SourceText>) -> Self {
        TextSource::Buffer(text.into())
    }

    pub fn empty() -> Self {
        TextSource::Buffer(SourceText::empty())
    }

    pub fn as_buffer(&self) -> Option<&SourceText> {
        match self {
            TextSource::Buffer(text) => Some(text),
            TextSource::Loader(_) => None,
        }
    }
}
