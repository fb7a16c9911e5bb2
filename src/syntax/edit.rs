//! Span-based text edits.
//!
//! Bytes outside the edited ranges are copied through untouched, so
//! regenerated text keeps every unrelated line exactly where it was.

use oxc::span::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    start: u32,
    end: u32,
    text: String,
    order: usize,
}

/// A batch of non-overlapping edits against one source text.
#[derive(Debug, Default)]
pub struct TextEdits {
    edits: Vec<Edit>,
}

impl TextEdits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at `offset`. Inserts at the same offset keep their call order.
    pub fn insert(&mut self, offset: u32, text: impl Into<String>) {
        self.push(offset, offset, text.into());
    }

    pub fn replace(&mut self, span: Span, text: impl Into<String>) {
        self.push(span.start, span.end, text.into());
    }

    pub fn delete(&mut self, start: u32, end: u32) {
        self.push(start, end, String::new());
    }

    fn push(&mut self, start: u32, end: u32, text: String) {
        let order = self.edits.len();
        self.edits.push(Edit {
            start,
            end: end.max(start),
            text,
            order,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Produce the edited text. An edit overlapping an earlier one is
    /// clipped to start where the earlier one ended.
    pub fn apply(mut self, source: &str) -> String {
        self.edits
            .sort_by_key(|e| (e.start, e.end > e.start, e.order));

        let added: usize = self.edits.iter().map(|e| e.text.len()).sum();
        let mut out = String::with_capacity(source.len() + added);
        let mut cursor = 0usize;

        for edit in &self.edits {
            let start = (edit.start as usize).clamp(cursor, source.len());
            let end = (edit.end as usize).clamp(start, source.len());
            out.push_str(&source[cursor..start]);
            out.push_str(&edit.text);
            cursor = end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_mixed() {
        let source = "<Grid columns={1} />";
        let mut edits = TextEdits::new();
        edits.replace(Span::new(15, 16), "2");
        edits.insert(17, " id={3}");
        assert_eq!(edits.apply(source), "<Grid columns={2} id={3} />");
    }

    #[test]
    fn test_inserts_keep_order() {
        let mut edits = TextEdits::new();
        edits.insert(1, "b");
        edits.insert(1, "c");
        edits.insert(0, "_");
        assert_eq!(edits.apply("ad"), "_abcd");
    }

    #[test]
    fn test_insert_before_replace_at_same_offset() {
        let mut edits = TextEdits::new();
        edits.replace(Span::new(0, 1), "X");
        edits.insert(0, ">");
        assert_eq!(edits.apply("abc"), ">Xbc");
    }

    #[test]
    fn test_delete_and_empty() {
        let mut edits = TextEdits::new();
        assert!(edits.is_empty());
        edits.delete(1, 3);
        assert_eq!(edits.apply("abcd"), "ad");
    }

    #[test]
    fn test_out_of_range_clamped() {
        let mut edits = TextEdits::new();
        edits.insert(100, "!");
        assert_eq!(edits.apply("abc"), "abc!");
    }
}
