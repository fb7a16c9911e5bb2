//! Applying one operation to one element's attributes.
//!
//! Every operation becomes a handful of span edits against the current text,
//! so bytes outside the touched value are never regenerated.

use super::error::PatchError;
use super::model::{PathSegment, PatchOperation, display_path};
use crate::syntax::literal::{render_attribute_value, render_js, render_key};
use crate::syntax::{
    AttributeValue, MarkupElement, NamedAttribute, ObjectMember, TextEdits, ValueNode, span_text,
};
use oxc::span::Span;
use serde_json::Value;

/// Apply `op` to `element` and return the edited text.
pub fn apply_operation(
    text: &str,
    element: &MarkupElement,
    op: &PatchOperation,
) -> Result<String, PatchError> {
    let path = op.path();
    let Some((PathSegment::Key(name), rest)) = path.split_first() else {
        return Err(PatchError::PathNotFound {
            path: display_path(path),
            reason: "path must start with an attribute name".to_string(),
        });
    };

    let attr = element
        .attribute(name)
        .ok_or_else(|| PatchError::AttributeNotFound {
            name: name.clone(),
            tag_name: element.tag_name.clone(),
        })?;

    let mut edits = TextEdits::new();

    if rest.is_empty() {
        match op.value() {
            Some(value) => replace_attribute(&mut edits, attr, value),
            None => remove_attribute(&mut edits, text, attr),
        }
        return Ok(edits.apply(text));
    }

    // Nested edits only go into fully literal values.
    let root = match &attr.value {
        AttributeValue::Expression { value, .. } if value.to_json().is_some() => value,
        _ => {
            return Err(PatchError::TargetNotLiteral {
                path: display_path(path),
            });
        }
    };

    let Some((last, parents)) = rest.split_last() else {
        return Ok(text.to_string());
    };

    let mut node = root;
    for (depth, segment) in parents.iter().enumerate() {
        node = child(node, segment, &path[..depth + 2])?;
    }

    let cursor = Cursor { text, path };
    match op.value() {
        Some(value) => cursor.set(&mut edits, node, last, value)?,
        None => cursor.remove(&mut edits, node, last)?,
    }
    Ok(edits.apply(text))
}

fn child<'a>(
    node: &'a ValueNode,
    segment: &PathSegment,
    path: &[PathSegment],
) -> Result<&'a ValueNode, PatchError> {
    let not_found = |reason: String| PatchError::PathNotFound {
        path: display_path(path),
        reason,
    };
    match (node, segment) {
        (ValueNode::Array { items, .. }, PathSegment::Index(i)) => items
            .get(*i)
            .ok_or_else(|| not_found(format!("index {i} out of bounds ({} items)", items.len()))),
        (ValueNode::Object { members, .. }, PathSegment::Key(key)) => members
            .iter()
            .rev()
            .find(|m| &m.key == key)
            .map(|m| &m.value)
            .ok_or_else(|| not_found(format!("no property `{key}`"))),
        (ValueNode::Opaque { .. }, _) => Err(PatchError::TargetNotLiteral {
            path: display_path(path),
        }),
        (other, _) => Err(not_found(format!("cannot index into {}", other.kind()))),
    }
}

// ============================================================================
// Whole attribute
// ============================================================================

fn replace_attribute(edits: &mut TextEdits, attr: &NamedAttribute, value: &Value) {
    let rendered = render_attribute_value(value);
    match &attr.value {
        AttributeValue::Absent => edits.insert(attr.name_span.end, format!("={rendered}")),
        AttributeValue::Text { span, .. }
        | AttributeValue::Expression { span, .. }
        | AttributeValue::Markup { span } => edits.replace(*span, rendered),
    }
}

/// Drop the attribute together with the whitespace before it.
fn remove_attribute(edits: &mut TextEdits, text: &str, attr: &NamedAttribute) {
    let start = attr.span.start as usize;
    let trimmed = text[..start].trim_end_matches(char::is_whitespace).len();
    edits.delete(trimmed as u32, attr.span.end);
}

// ============================================================================
// Nested values
// ============================================================================

struct Cursor<'a> {
    text: &'a str,
    path: &'a [PathSegment],
}

impl Cursor<'_> {
    fn not_found(&self, reason: impl Into<String>) -> PatchError {
        PatchError::PathNotFound {
            path: display_path(self.path),
            reason: reason.into(),
        }
    }

    /// `add`/`replace`: overwrite an existing slot, or create it.
    fn set(
        &self,
        edits: &mut TextEdits,
        node: &ValueNode,
        segment: &PathSegment,
        value: &Value,
    ) -> Result<(), PatchError> {
        let rendered = render_js(value);
        match (node, segment) {
            (ValueNode::Object { span, members }, PathSegment::Key(key)) => {
                if let Some(member) = members.iter().rev().find(|m| &m.key == key) {
                    edits.replace(member.value.span(), rendered);
                } else {
                    self.insert_member(edits, *span, members, key, &rendered);
                }
                Ok(())
            }
            (ValueNode::Array { span, items }, PathSegment::Index(i)) => {
                if let Some(item) = items.get(*i) {
                    edits.replace(item.span(), rendered);
                } else {
                    let spans: Vec<Span> = items.iter().map(ValueNode::span).collect();
                    self.append_item(edits, *span, &spans, &rendered);
                }
                Ok(())
            }
            (ValueNode::Opaque { .. }, _) => Err(PatchError::TargetNotLiteral {
                path: display_path(self.path),
            }),
            (other, _) => Err(self.not_found(format!("cannot set {segment} on {}", other.kind()))),
        }
    }

    fn remove(
        &self,
        edits: &mut TextEdits,
        node: &ValueNode,
        segment: &PathSegment,
    ) -> Result<(), PatchError> {
        match (node, segment) {
            (ValueNode::Object { span, members }, PathSegment::Key(key)) => {
                let index = members
                    .iter()
                    .rposition(|m| &m.key == key)
                    .ok_or_else(|| self.not_found(format!("no property `{key}`")))?;
                let spans: Vec<Span> = members.iter().map(|m| m.span).collect();
                remove_item(edits, *span, &spans, index, "{}");
                Ok(())
            }
            (ValueNode::Array { span, items }, PathSegment::Index(i)) => {
                if *i >= items.len() {
                    return Err(self.not_found(format!(
                        "index {i} out of bounds ({} items)",
                        items.len()
                    )));
                }
                let spans: Vec<Span> = items.iter().map(ValueNode::span).collect();
                remove_item(edits, *span, &spans, *i, "[]");
                Ok(())
            }
            (ValueNode::Opaque { .. }, _) => Err(PatchError::TargetNotLiteral {
                path: display_path(self.path),
            }),
            (other, _) => {
                Err(self.not_found(format!("cannot remove {segment} from {}", other.kind())))
            }
        }
    }

    fn insert_member(
        &self,
        edits: &mut TextEdits,
        container: Span,
        members: &[ObjectMember],
        key: &str,
        rendered: &str,
    ) {
        let key = render_key(key);
        let Some(last) = members.last() else {
            edits.replace(container, format!("{{ {key}: {rendered} }}"));
            return;
        };

        let colon = members
            .iter()
            .map(|m| span_text(self.text, Span::new(m.key_span.end, m.value.span().start)))
            .find(|gap| gap.trim() == ":")
            .unwrap_or(": ");
        let spans: Vec<Span> = members.iter().map(|m| m.span).collect();
        let separator = self.separator(container, &spans);
        edits.insert(last.span.end, format!("{separator}{key}{colon}{rendered}"));
    }

    fn append_item(&self, edits: &mut TextEdits, container: Span, items: &[Span], rendered: &str) {
        let Some(last) = items.last() else {
            edits.replace(container, format!("[{rendered}]"));
            return;
        };
        let separator = self.separator(container, items);
        edits.insert(last.end, format!("{separator}{rendered}"));
    }

    /// Separator for a new trailing item, copied from the container.
    fn separator(&self, container: Span, items: &[Span]) -> String {
        if let [.., prev, last] = items {
            let gap = span_text(self.text, Span::new(prev.end, last.start));
            if gap.trim() == "," {
                return gap.to_string();
            }
        }

        let Some(first) = items.first() else {
            return ", ".to_string();
        };
        let opening = span_text(self.text, Span::new(container.start + 1, first.start));
        if opening.contains('\n') {
            return format!(",\n{}", self.indent_of(first.start));
        }
        let body = items.last().map_or(first.end, |last| last.end);
        if opening.is_empty() && is_compact(span_text(self.text, Span::new(first.start, body))) {
            ",".to_string()
        } else {
            ", ".to_string()
        }
    }

    /// Leading whitespace of the line containing `offset`.
    fn indent_of(&self, offset: u32) -> &str {
        let offset = offset as usize;
        let line_start = self.text[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line = &self.text[line_start..offset];
        &line[..line.len() - line.trim_start().len()]
    }
}

/// No whitespace outside string literals, e.g. `{field:"id"}`.
fn is_compact(text: &str) -> bool {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for c in text.chars() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if matches!(c, '"' | '\'' | '`') => quote = Some(c),
            None if c.is_whitespace() => return false,
            None => {}
        }
    }
    true
}

/// Delete item `index` with one adjacent separator.
fn remove_item(edits: &mut TextEdits, container: Span, items: &[Span], index: usize, empty: &str) {
    let item = items[index];
    if items.len() == 1 {
        edits.replace(container, empty);
    } else if index == 0 {
        edits.delete(item.start, items[1].start);
    } else {
        edits.delete(items[index - 1].end, item.end);
    }
}
