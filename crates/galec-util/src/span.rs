//! Source location tracking.
//!
//! A [`Span`] identifies a range of bytes within a file registered in the
//! [`SourceMap`], together with the 1-based line/column of its start for
//! human-readable output.

use std::path::{Path, PathBuf};

/// A unique identifier for a source file.
///
/// FileIds are assigned sequentially as files are added to the [`SourceMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u32);

impl FileId {
    /// A dummy FileId for spans that do not belong to a real file.
    pub const DUMMY: FileId = FileId(u32::MAX);

    pub fn is_dummy(self) -> bool {
        self == Self::DUMMY
    }
}

/// Source location span.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    /// File identifier.
    pub file: FileId,
    /// Line number (1-based).
    pub line: u32,
    /// Column number (1-based).
    pub column: u32,
    /// Start byte offset in the file.
    pub start: u32,
    /// End byte offset in the file.
    pub end: u32,
}

impl Default for FileId {
    fn default() -> Self {
        Self::DUMMY
    }
}

impl Span {
    /// Dummy span for synthetic nodes.
    pub const DUMMY: Span = Span {
        file: FileId::DUMMY,
        line: 0,
        column: 0,
        start: 0,
        end: 0,
    };

    /// Create a new span.
    pub fn new(file: FileId, line: u32, column: u32, start: u32, end: u32) -> Self {
        Self {
            file,
            line,
            column,
            start,
            end,
        }
    }

    /// Create a point span at a line/column, without byte offsets.
    pub fn point(file: FileId, line: u32, column: u32) -> Self {
        Self {
            file,
            line,
            column,
            start: 0,
            end: 0,
        }
    }

    /// Returns true if this span refers to a real source location.
    pub fn is_valid(self) -> bool {
        !self.file.is_dummy()
    }

    /// Sort key used when ordering diagnostics: (file, line, column).
    pub fn sort_key(self) -> (FileId, u32, u32) {
        (self.file, self.line, self.column)
    }
}

/// A single registered source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path the file was registered under.
    pub path: PathBuf,
    /// Full file contents.
    pub contents: String,
}

impl SourceFile {
    /// Returns the text of the given 1-based line, without the newline.
    pub fn line_text(&self, line: u32) -> Option<&str> {
        if line == 0 {
            return None;
        }
        self.contents
            .lines()
            .nth(line as usize - 1)
    }
}

/// Registry of source files, addressed by [`FileId`].
///
/// File identity is path-based: registering the same canonical path twice
/// returns the same id, which is what import caching keys on.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file, returning its id. Re-registering a path returns the
    /// existing id without replacing the contents.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> FileId {
        let path = path.into();
        if let Some(existing) = self.file_id_for_path(&path) {
            return existing;
        }
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            path,
            contents: contents.into(),
        });
        id
    }

    /// Load a file from disk and register it, returning its id.
    ///
    /// Loading an already-registered path returns the existing id without
    /// touching the filesystem, so file identity is stable across repeated
    /// imports.
    pub fn load_file(&mut self, path: &Path) -> crate::error::SourceMapResult<FileId> {
        if let Some(existing) = self.file_id_for_path(path) {
            return Ok(existing);
        }
        let contents =
            std::fs::read_to_string(path).map_err(|source| crate::error::SourceMapError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(self.add_file(path, contents))
    }

    /// Look up the id of an already-registered path.
    pub fn file_id_for_path(&self, path: &Path) -> Option<FileId> {
        self.files
            .iter()
            .position(|f| f.path == path)
            .map(|i| FileId(i as u32))
    }

    /// Get a registered file.
    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        if id.is_dummy() {
            return None;
        }
        self.files.get(id.0 as usize)
    }

    /// Display name for a file id.
    pub fn file_name(&self, id: FileId) -> String {
        match self.file(id) {
            Some(f) => f.path.display().to_string(),
            None => "<unknown>".to_string(),
        }
    }

    /// The source line a span starts on, for caret rendering.
    pub fn line_text(&self, span: Span) -> Option<&str> {
        self.file(span.file)?.line_text(span.line)
    }
}
