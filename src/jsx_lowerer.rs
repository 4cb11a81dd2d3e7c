//! JSX Lowering
//!
//! Rewrites markup elements and fragments into calls to the configured
//! component-construction entry point (`React.createElement` by default):
//!
//! ```text
//! <Panel title="x" {...rest}>  hi  </Panel>
//! React.createElement(Panel, { title: "x", ...rest }, "hi")
//! ```

use oxc_allocator::{Allocator, Box as oxc_box, CloneIn, Vec as ArenaVec};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_ast_visit::walk_mut::walk_expression;
use oxc_ast_visit::VisitMut;
use oxc_span::SPAN;

use crate::options::TranspileOptions;

// ═══════════════════════════════════════════════════════════════════════════════
// JSX LOWERER
// ═══════════════════════════════════════════════════════════════════════════════

pub struct JsxLowerer<'a> {
    pub ast: AstBuilder<'a>,
    pragma: Vec<&'a str>,
    pragma_frag: Vec<&'a str>,
}

impl<'a> JsxLowerer<'a> {
    pub fn new(allocator: &'a Allocator, options: &TranspileOptions) -> Self {
        Self {
            ast: AstBuilder::new(allocator),
            pragma: split_path(allocator, &options.pragma),
            pragma_frag: split_path(allocator, &options.pragma_frag),
        }
    }

    fn atom(&self, s: &str) -> &'a str {
        self.ast.allocator.alloc_str(s)
    }

    fn lower_jsx_element(&mut self, element: &JSXElement<'a>) -> Expression<'a> {
        let mut args = self.ast.vec();
        args.push(Argument::from(
            self.element_type(&element.opening_element.name),
        ));
        let props = self.lower_attributes(&element.opening_element.attributes);
        args.push(Argument::from(props));
        self.push_children(&element.children, &mut args);

        let callee = self.path_expression(&self.pragma);
        self.ast.expression_call(
            SPAN,
            callee,
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }

    fn lower_jsx_fragment(&mut self, fragment: &JSXFragment<'a>) -> Expression<'a> {
        let mut args = self.ast.vec();
        args.push(Argument::from(self.path_expression(&self.pragma_frag)));
        args.push(Argument::from(self.ast.expression_null_literal(SPAN)));
        self.push_children(&fragment.children, &mut args);

        let callee = self.path_expression(&self.pragma);
        self.ast.expression_call(
            SPAN,
            callee,
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        )
    }

    /// First construction argument. Names starting with an uppercase letter
    /// refer to a component in scope; anything else is a host tag string.
    fn element_type(&self, name: &JSXElementName<'a>) -> Expression<'a> {
        match name {
            JSXElementName::Identifier(id) => self.tag_reference(&id.name),
            JSXElementName::IdentifierReference(id) => self.tag_reference(&id.name),
            JSXElementName::NamespacedName(ns) => {
                let tag = format!("{}:{}", ns.namespace.name, ns.name.name);
                self.ast
                    .expression_string_literal(SPAN, self.atom(&tag), None)
            }
            JSXElementName::MemberExpression(member) => self.member_reference(member),
            JSXElementName::ThisExpression(_) => self.ast.expression_this(SPAN),
        }
    }

    fn tag_reference(&self, name: &str) -> Expression<'a> {
        let name = self.atom(name);
        if name.chars().next().is_some_and(char::is_uppercase) {
            self.ast.expression_identifier(SPAN, name)
        } else {
            self.ast.expression_string_literal(SPAN, name, None)
        }
    }

    fn member_reference(&self, member: &JSXMemberExpression<'a>) -> Expression<'a> {
        let object = match &member.object {
            JSXMemberExpressionObject::IdentifierReference(id) => {
                self.ast.expression_identifier(SPAN, self.atom(&id.name))
            }
            JSXMemberExpressionObject::MemberExpression(inner) => self.member_reference(inner),
            JSXMemberExpressionObject::ThisExpression(_) => self.ast.expression_this(SPAN),
        };
        Expression::from(self.ast.member_expression_static(
            SPAN,
            object,
            self.ast
                .identifier_name(SPAN, self.atom(&member.property.name)),
            false,
        ))
    }

    fn lower_attributes(&mut self, items: &[JSXAttributeItem<'a>]) -> Expression<'a> {
        if items.is_empty() {
            return self.ast.expression_null_literal(SPAN);
        }

        let mut properties = self.ast.vec();
        for item in items {
            match item {
                JSXAttributeItem::Attribute(attr) => {
                    let key = match &attr.name {
                        JSXAttributeName::Identifier(id) => self.property_key(&id.name),
                        JSXAttributeName::NamespacedName(ns) => {
                            self.property_key(&format!("{}:{}", ns.namespace.name, ns.name.name))
                        }
                    };

                    let value = match &attr.value {
                        None => self.ast.expression_boolean_literal(SPAN, true),
                        Some(JSXAttributeValue::StringLiteral(s)) => {
                            Expression::StringLiteral(self.ast.alloc((**s).clone()))
                        }
                        Some(JSXAttributeValue::ExpressionContainer(container)) => self
                            .lower_jsx_expression(&container.expression)
                            .unwrap_or_else(|| self.ast.expression_identifier(SPAN, "undefined")),
                        Some(JSXAttributeValue::Element(el)) => self.lower_jsx_element(el),
                        Some(JSXAttributeValue::Fragment(frag)) => self.lower_jsx_fragment(frag),
                    };

                    properties.push(self.ast.object_property_kind_object_property(
                        SPAN,
                        PropertyKind::Init,
                        key,
                        value,
                        false,
                        false,
                        false,
                    ));
                }
                JSXAttributeItem::SpreadAttribute(spread) => {
                    let mut argument = spread.argument.clone_in(self.ast.allocator);
                    self.visit_expression(&mut argument);
                    properties.push(
                        self.ast
                            .object_property_kind_spread_property(SPAN, argument),
                    );
                }
            }
        }

        self.ast.expression_object(SPAN, properties)
    }

    fn property_key(&self, name: &str) -> PropertyKey<'a> {
        let name = self.atom(name);
        if is_identifier_name(name) {
            PropertyKey::StaticIdentifier(self.ast.alloc(self.ast.identifier_name(SPAN, name)))
        } else {
            PropertyKey::StringLiteral(self.ast.alloc(self.ast.string_literal(SPAN, name, None)))
        }
    }

    fn push_children(
        &mut self,
        children: &[JSXChild<'a>],
        args: &mut ArenaVec<'a, Argument<'a>>,
    ) {
        for child in children {
            match child {
                JSXChild::Text(text) => {
                    if let Some(literal) = self.lower_jsx_text(text) {
                        args.push(Argument::from(literal));
                    }
                }
                JSXChild::Element(el) => {
                    args.push(Argument::from(self.lower_jsx_element(el)));
                }
                JSXChild::Fragment(frag) => {
                    args.push(Argument::from(self.lower_jsx_fragment(frag)));
                }
                JSXChild::ExpressionContainer(container) => {
                    // `{/* comment */}` has nothing to pass
                    if let Some(expr) = self.lower_jsx_expression(&container.expression) {
                        args.push(Argument::from(expr));
                    }
                }
                JSXChild::Spread(spread) => {
                    let mut argument = spread.expression.clone_in(self.ast.allocator);
                    self.visit_expression(&mut argument);
                    args.push(self.ast.argument_spread_element(SPAN, argument));
                }
            }
        }
    }

    /// Trimmed text as a string literal; whitespace-only text yields nothing.
    /// Character references are decoded first, so `&nbsp;` alone is blank.
    fn lower_jsx_text(&self, text: &JSXText<'a>) -> Option<Expression<'a>> {
        let decoded = html_escape::decode_html_entities(text.value.as_str());
        let trimmed = decoded.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(
            self.ast
                .expression_string_literal(SPAN, self.atom(trimmed), None),
        )
    }

    fn lower_jsx_expression(&mut self, jsx_expr: &JSXExpression<'a>) -> Option<Expression<'a>> {
        let mut expr = jsx_expr.as_expression()?.clone_in(self.ast.allocator);
        self.visit_expression(&mut expr);
        Some(expr)
    }

    fn path_expression(&self, parts: &[&'a str]) -> Expression<'a> {
        let mut parts = parts.iter().copied();
        let mut expr = self
            .ast
            .expression_identifier(SPAN, parts.next().unwrap_or("undefined"));
        for part in parts {
            expr = Expression::from(self.ast.member_expression_static(
                SPAN,
                expr,
                self.ast.identifier_name(SPAN, part),
                false,
            ));
        }
        expr
    }
}

impl<'a> VisitMut<'a> for JsxLowerer<'a> {
    fn visit_expression(&mut self, expr: &mut Expression<'a>) {
        match expr {
            Expression::JSXElement(element) => {
                let lowered = self.lower_jsx_element(element);
                *expr = lowered;
            }
            Expression::JSXFragment(fragment) => {
                let lowered = self.lower_jsx_fragment(fragment);
                *expr = lowered;
            }
            _ => walk_expression(self, expr),
        }
    }
}

fn split_path<'a>(allocator: &'a Allocator, path: &str) -> Vec<&'a str> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .map(|part| &*allocator.alloc_str(part))
        .collect()
}

/// ASCII identifier check used to decide between `.name` and `["name"]`.
pub(crate) fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
