//! Lowering from the oxc AST to [`MarkupTree`].

use super::tree::{
    AttributeSlot, AttributeValue, MarkupElement, MarkupTree, NamedAttribute, NodeId,
    ObjectMember, Prelude, ValueNode, span_text,
};
use oxc::ast::ast::{
    ArrayExpression, Expression, JSXAttributeItem, JSXAttributeValue, JSXElement,
    JSXOpeningElement, ObjectExpression, ObjectPropertyKind, Program, PropertyKind, Statement,
};
use oxc::ast_visit::{Visit, walk};
use oxc::span::{GetSpan, Span};
use oxc::syntax::operator::UnaryOperator;

pub(super) fn lower_program(source: &str, program: &Program<'_>) -> MarkupTree {
    let mut collector = Collector {
        source,
        elements: Vec::new(),
    };
    collector.visit_program(program);

    MarkupTree {
        elements: collector.elements,
        prelude: prelude_anchor(source, program),
    }
}

fn prelude_anchor(source: &str, program: &Program<'_>) -> Prelude {
    let last_import = program
        .body
        .iter()
        .filter(|stmt| matches!(stmt, Statement::ImportDeclaration(_)))
        .map(|stmt| stmt.span().end)
        .max();
    if let Some(offset) = last_import {
        return Prelude {
            offset,
            needs_newline: false,
        };
    }

    if let Some(directive) = program.directives.last() {
        return Prelude {
            offset: directive.span.end,
            needs_newline: false,
        };
    }

    if let Some(hashbang) = &program.hashbang {
        // Hashbang runs to end of line; start on the next one.
        let end = hashbang.span.end as usize;
        let rest = &source[end.min(source.len())..];
        let newline = if rest.starts_with("\r\n") {
            2
        } else if rest.starts_with('\n') {
            1
        } else {
            0
        };
        return Prelude {
            offset: hashbang.span.end + newline,
            needs_newline: newline == 0,
        };
    }

    Prelude::default()
}

struct Collector<'s> {
    source: &'s str,
    elements: Vec<MarkupElement>,
}

impl<'a> Visit<'a> for Collector<'_> {
    fn visit_jsx_element(&mut self, it: &JSXElement<'a>) {
        // Pre-order: the parent is numbered before anything inside it,
        // including elements nested in its attribute values.
        let element = self.lower_element(it);
        self.elements.push(element);
        walk::walk_jsx_element(self, it);
    }
}

impl Collector<'_> {
    fn lower_element(&self, it: &JSXElement<'_>) -> MarkupElement {
        let opening = &it.opening_element;
        let name_span = opening.name.span();
        let node_id = NodeId::new(u32::try_from(self.elements.len() + 1).unwrap_or(u32::MAX));

        let attributes = opening
            .attributes
            .iter()
            .map(|item| match item {
                JSXAttributeItem::Attribute(attr) => AttributeSlot::Named(NamedAttribute {
                    name: span_text(self.source, attr.name.span()).to_string(),
                    span: attr.span,
                    name_span: attr.name.span(),
                    value: self.lower_attribute_value(attr.value.as_ref()),
                }),
                JSXAttributeItem::SpreadAttribute(spread) => {
                    AttributeSlot::Spread { span: spread.span }
                }
            })
            .collect();

        MarkupElement {
            node_id,
            tag_name: span_text(self.source, name_span).to_string(),
            span: it.span,
            opening: opening.span,
            attr_insert: Self::attr_insert(opening),
            attributes,
        }
    }

    /// End of the last attribute, else of the tag name and its type arguments.
    /// Comments before `>` stay after the insertion.
    fn attr_insert(opening: &JSXOpeningElement<'_>) -> u32 {
        opening
            .attributes
            .last()
            .map(|item| item.span().end)
            .or_else(|| opening.type_arguments.as_ref().map(|args| args.span.end))
            .unwrap_or_else(|| opening.name.span().end)
    }

    fn lower_attribute_value(&self, value: Option<&JSXAttributeValue<'_>>) -> AttributeValue {
        match value {
            None => AttributeValue::Absent,
            Some(JSXAttributeValue::StringLiteral(lit)) => AttributeValue::Text {
                span: lit.span,
                value: lit.value.to_string(),
            },
            Some(JSXAttributeValue::ExpressionContainer(container)) => {
                let value = match container.expression.as_expression() {
                    Some(expr) => lower_value(expr),
                    None => ValueNode::Opaque {
                        span: container.span,
                    },
                };
                AttributeValue::Expression {
                    span: container.span,
                    value,
                }
            }
            Some(JSXAttributeValue::Element(el)) => AttributeValue::Markup { span: el.span },
            Some(JSXAttributeValue::Fragment(frag)) => AttributeValue::Markup { span: frag.span },
        }
    }
}

fn lower_value(expr: &Expression<'_>) -> ValueNode {
    match expr {
        Expression::StringLiteral(lit) => ValueNode::Scalar {
            span: lit.span,
            value: serde_json::Value::String(lit.value.to_string()),
        },
        Expression::NumericLiteral(lit) => number(lit.span, lit.value),
        Expression::BooleanLiteral(lit) => ValueNode::Scalar {
            span: lit.span,
            value: serde_json::Value::Bool(lit.value),
        },
        Expression::NullLiteral(lit) => ValueNode::Scalar {
            span: lit.span,
            value: serde_json::Value::Null,
        },
        Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => {
            match tpl.quasis.first().and_then(|q| q.value.cooked.as_ref()) {
                Some(cooked) => ValueNode::Scalar {
                    span: tpl.span,
                    value: serde_json::Value::String(cooked.to_string()),
                },
                None => ValueNode::Opaque { span: tpl.span },
            }
        }
        Expression::UnaryExpression(unary) => match (&unary.operator, &unary.argument) {
            (UnaryOperator::UnaryNegation, Expression::NumericLiteral(lit)) => {
                number(unary.span, -lit.value)
            }
            (UnaryOperator::UnaryPlus, Expression::NumericLiteral(lit)) => {
                number(unary.span, lit.value)
            }
            _ => ValueNode::Opaque { span: unary.span },
        },
        Expression::ParenthesizedExpression(paren) => lower_value(&paren.expression),
        Expression::TSAsExpression(cast) => lower_value(&cast.expression),
        Expression::TSSatisfiesExpression(cast) => lower_value(&cast.expression),
        Expression::ArrayExpression(array) => lower_array(array),
        Expression::ObjectExpression(object) => lower_object(object),
        other => ValueNode::Opaque { span: other.span() },
    }
}

fn number(span: Span, value: f64) -> ValueNode {
    if !value.is_finite() {
        return ValueNode::Opaque { span };
    }
    #[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
    let json = if value.fract() == 0.0 && value.abs() < 9.0e15 {
        serde_json::Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(serde_json::Value::Null, Into::into)
    };
    ValueNode::Scalar { span, value: json }
}

fn lower_array(array: &ArrayExpression<'_>) -> ValueNode {
    // Spreads and holes make indices meaningless.
    let items = array
        .elements
        .iter()
        .map(|el| el.as_expression().map(lower_value))
        .collect::<Option<Vec<_>>>();
    match items {
        Some(items) => ValueNode::Array {
            span: array.span,
            items,
        },
        None => ValueNode::Opaque { span: array.span },
    }
}

fn lower_object(object: &ObjectExpression<'_>) -> ValueNode {
    let members = object
        .properties
        .iter()
        .map(|kind| match kind {
            ObjectPropertyKind::ObjectProperty(prop)
                if matches!(prop.kind, PropertyKind::Init)
                    && !prop.method
                    && !prop.shorthand
                    && !prop.computed =>
            {
                prop.key.static_name().map(|key| ObjectMember {
                    key: key.to_string(),
                    key_span: prop.key.span(),
                    span: prop.span,
                    value: lower_value(&prop.value),
                })
            }
            _ => None,
        })
        .collect::<Option<Vec<_>>>();
    match members {
        Some(members) => ValueNode::Object {
            span: object.span,
            members,
        },
        None => ValueNode::Opaque { span: object.span },
    }
}
