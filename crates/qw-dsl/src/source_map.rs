use crate::ast::Span;
use crate::diagnostics::{Diagnostic, render_diagnostics};

/// Where one document lives within the concatenated source.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Display name, such as `"house.twl"` or `"<source>"`.
    pub name: String,
    /// Byte offset of the document within the concatenated source.
    pub offset: usize,
    /// Byte length of the document.
    pub len: usize,
}

/// Concatenation of several logic documents, mapping byte offsets back to
/// the document they came from.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    source: String,
    files: Vec<FileEntry>,
}

impl SourceMap {
    /// Create an empty source map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source map holding a single anonymous document.
    pub fn single(source: &str) -> Self {
        let mut map = Self::new();
        map.add_file("<source>", source);
        map
    }

    /// Append a document. Returns its index.
    ///
    /// Documents are separated by a newline so that tokens never run across
    /// two of them.
    pub fn add_file(&mut self, name: impl Into<String>, text: &str) -> usize {
        if !self.source.is_empty() {
            self.source.push('\n');
        }
        let idx = self.files.len();
        self.files.push(FileEntry {
            name: name.into(),
            offset: self.source.len(),
            len: text.len(),
        });
        self.source.push_str(text);
        idx
    }

    /// The concatenated source.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// All documents, in order.
    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// The text of document `index`.
    pub fn file_text(&self, index: usize) -> Option<&str> {
        let file = self.files.get(index)?;
        self.source.get(file.offset..file.offset + file.len)
    }

    /// Find which document a byte offset belongs to.
    ///
    /// An offset at the very end of a document belongs to it, so that
    /// end-of-input spans still resolve.
    pub fn file_index_for_offset(&self, offset: usize) -> Option<usize> {
        self.files
            .iter()
            .position(|f| offset >= f.offset && offset <= f.offset + f.len)
    }

    /// Find which document a byte offset belongs to.
    pub fn file_for_offset(&self, offset: usize) -> Option<&FileEntry> {
        self.file_index_for_offset(offset).map(|idx| &self.files[idx])
    }

    /// Convert a global span into `(document index, local span)`.
    pub fn to_local_span(&self, span: &Span) -> Option<(usize, Span)> {
        self.file_index_for_offset(span.start).map(|idx| {
            let file = &self.files[idx];
            let end = span.end.min(file.offset + file.len);
            (idx, span.start - file.offset..end - file.offset)
        })
    }

    /// Render diagnostics with global spans, each against its own document.
    pub fn render(&self, diagnostics: &[Diagnostic]) -> String {
        let mut output = String::new();
        for diag in diagnostics {
            match self.to_local_span(&diag.span) {
                Some((idx, local)) => {
                    let text = self.file_text(idx).unwrap_or_default();
                    let local_diag = Diagnostic {
                        span: local,
                        ..diag.clone()
                    };
                    output.push_str(&render_diagnostics(text, &self.files[idx].name, &[local_diag]));
                }
                None => {
                    output.push_str(&diag.to_string());
                    output.push('\n');
                }
            }
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_document() {
        let map = SourceMap::single("type r {}");
        assert_eq!(map.files().len(), 1);
        assert_eq!(map.files()[0].name, "<source>");
        assert_eq!(map.source(), "type r {}");
    }

    #[test]
    fn offsets_map_back_to_documents() {
        let mut map = SourceMap::new();
        map.add_file("a.twl", "type r {}");
        map.add_file("b.twl", "type c {}");
        assert_eq!(map.source(), "type r {}\ntype c {}");
        assert_eq!(map.file_for_offset(3).map(|f| f.name.as_str()), Some("a.twl"));
        assert_eq!(map.file_for_offset(12).map(|f| f.name.as_str()), Some("b.twl"));
        assert_eq!(map.to_local_span(&(15..16)), Some((1, 5..6)));
        assert_eq!(map.file_text(1), Some("type c {}"));
    }

    #[test]
    fn render_uses_the_right_document() {
        let mut map = SourceMap::new();
        map.add_file("a.twl", "type r {}");
        map.add_file("b.twl", "type c : o {}");
        let output = map.render(&[Diagnostic::error(19..20, "unknown type: o")]);
        assert!(output.contains("b.twl"));
        assert!(!output.contains("a.twl"));
    }
}
