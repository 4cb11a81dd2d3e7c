//! Static Linkage Evaluator
//!
//! Executes the module-linkage subset of lowered source without a script
//! engine: awaited `___require` calls, member projections, literal values,
//! function/class bindings and `__export` assignments. Everything else is
//! skipped (statements) or kept as [`Value::Opaque`] (expressions).
//!
//! Evaluation happens in two phases. The lowered program is parsed and
//! compiled into an owned [`Plan`] first, so no arena-bound AST is held
//! across an `await`; the plan then runs against the module's `Require`.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};
use std::collections::HashMap;

use crate::error::{EvalError, LoadError, LoadResult};
use crate::eval::{Evaluator, ExecutableUnit};
use crate::loader::Require;
use crate::value::{Exports, FunctionRef, Value};

#[derive(Debug, Clone, Copy, Default)]
pub struct StaticEvaluator;

#[async_trait]
impl Evaluator for StaticEvaluator {
    async fn evaluate(
        &self,
        unit: &ExecutableUnit,
        require: Require,
        exports: Exports,
    ) -> LoadResult<()> {
        let plan = Plan::compile(unit)?;
        plan.run(&require, &exports).await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAN
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Value(Value),
    Binding(String),
    /// `await ___require("<specifier>")`
    Require(String),
    Member(Box<Expr>, String),
    Array(Vec<Expr>),
    Object(Vec<Property>),
    Function(FunctionRef),
    Opaque(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Property {
    Entry(String, Expr),
    Spread(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Bind { name: String, value: Expr },
    Export { name: String, value: Expr },
    /// `Object.assign(__export, <expr>)`
    ExportAll(Expr),
    /// Evaluated for its loads only.
    Effect(Expr),
}

#[derive(Debug, Default)]
pub struct Plan {
    /// Function and class declarations, bound before anything else runs.
    hoisted: Vec<Step>,
    steps: Vec<Step>,
}

impl Plan {
    pub fn compile(unit: &ExecutableUnit) -> LoadResult<Plan> {
        let allocator = Allocator::default();
        let source_type = SourceType::default().with_module(true);
        let ret = Parser::new(&allocator, &unit.source, source_type).parse();
        if ret.panicked || !ret.errors.is_empty() {
            let messages: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
            return Err(LoadError::Evaluation(EvalError::msg(format!(
                "{}: lowered source did not parse: {}",
                unit.origin,
                messages.join("; ")
            ))));
        }

        let compiler = PlanCompiler {
            source: &unit.source,
            require_name: &unit.require_name,
            exports_name: &unit.exports_name,
        };
        let mut plan = Plan::default();
        for stmt in &ret.program.body {
            compiler.statement(stmt, &mut plan);
        }
        Ok(plan)
    }

    pub fn len(&self) -> usize {
        self.hoisted.len() + self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn run(&self, require: &Require, exports: &Exports) -> LoadResult<()> {
        let mut scope: HashMap<String, Value> = HashMap::new();

        for step in self.hoisted.iter().chain(&self.steps) {
            match step {
                Step::Bind { name, value } => {
                    let value = eval(value, &scope, require).await?;
                    scope.insert(name.clone(), value);
                }
                Step::Export { name, value } => {
                    let value = eval(value, &scope, require).await?;
                    exports.set(name.clone(), value);
                }
                Step::ExportAll(expr) => match eval(expr, &scope, require).await? {
                    Value::Module(other) => exports.assign_from(&other),
                    Value::Object(map) => {
                        for (name, value) in map {
                            exports.set(name, value);
                        }
                    }
                    _ => {}
                },
                Step::Effect(expr) => {
                    eval(expr, &scope, require).await?;
                }
            }
        }
        Ok(())
    }
}

fn eval<'e>(
    expr: &'e Expr,
    scope: &'e HashMap<String, Value>,
    require: &'e Require,
) -> BoxFuture<'e, LoadResult<Value>> {
    async move {
        Ok(match expr {
            Expr::Value(value) => value.clone(),
            // unknown names are host globals (React, window, ...)
            Expr::Binding(name) => scope
                .get(name)
                .cloned()
                .unwrap_or_else(|| Value::Opaque(name.clone())),
            Expr::Require(specifier) => Value::Module(require.call(specifier).await?),
            Expr::Member(object, key) => match eval(object, scope, require).await? {
                Value::Opaque(source) => Value::Opaque(format!("{}.{}", source, key)),
                value => value.get(key),
            },
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(eval(item, scope, require).await?);
                }
                Value::Array(values)
            }
            Expr::Object(properties) => {
                let mut map = IndexMap::new();
                for property in properties {
                    match property {
                        Property::Entry(key, value) => {
                            map.insert(key.clone(), eval(value, scope, require).await?);
                        }
                        Property::Spread(value) => match eval(value, scope, require).await? {
                            Value::Object(other) => map.extend(other),
                            Value::Module(other) => map.extend(other.snapshot()),
                            _ => {}
                        },
                    }
                }
                Value::Object(map)
            }
            Expr::Function(func) => Value::Function(func.clone()),
            Expr::Opaque(source) => Value::Opaque(source.clone()),
        })
    }
    .boxed()
}

// ═══════════════════════════════════════════════════════════════════════════════
// AST -> PLAN
// ═══════════════════════════════════════════════════════════════════════════════

struct PlanCompiler<'s> {
    source: &'s str,
    require_name: &'s str,
    exports_name: &'s str,
}

impl<'s> PlanCompiler<'s> {
    fn slice(&self, span: Span) -> String {
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or_default()
            .to_string()
    }

    fn statement(&self, stmt: &Statement<'_>, plan: &mut Plan) {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    let BindingPattern::BindingIdentifier(id) = &declarator.id else {
                        tracing::warn!(
                            binding = %self.slice(declarator.id.span()),
                            "destructuring binding left unevaluated"
                        );
                        if let Some(init) = &declarator.init {
                            plan.steps.push(Step::Effect(self.expression(init)));
                        }
                        continue;
                    };
                    let value = declarator
                        .init
                        .as_ref()
                        .map(|init| self.expression(init))
                        .unwrap_or(Expr::Value(Value::Undefined));
                    plan.steps.push(Step::Bind {
                        name: id.name.to_string(),
                        value,
                    });
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    plan.hoisted.push(Step::Bind {
                        name: id.name.to_string(),
                        value: Expr::Function(FunctionRef {
                            name: Some(id.name.to_string()),
                            source: self.slice(func.span),
                        }),
                    });
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    plan.steps.push(Step::Bind {
                        name: id.name.to_string(),
                        value: Expr::Function(FunctionRef {
                            name: Some(id.name.to_string()),
                            source: self.slice(class.span),
                        }),
                    });
                }
            }
            Statement::ExpressionStatement(expr_stmt) => {
                self.expression_statement(&expr_stmt.expression, plan)
            }
            _ => tracing::trace!(statement = %self.slice(stmt.span()), "statement skipped"),
        }
    }

    fn expression_statement(&self, expr: &Expression<'_>, plan: &mut Plan) {
        match expr {
            Expression::AssignmentExpression(assign)
                if assign.operator == AssignmentOperator::Assign =>
            {
                if let Some(name) = self.export_slot(&assign.left) {
                    plan.steps.push(Step::Export {
                        name,
                        value: self.expression(&assign.right),
                    });
                } else if let AssignmentTarget::AssignmentTargetIdentifier(id) = &assign.left {
                    plan.steps.push(Step::Bind {
                        name: id.name.to_string(),
                        value: self.expression(&assign.right),
                    });
                }
            }
            Expression::CallExpression(call) if self.is_export_all(call) => {
                if let Some(source) = call.arguments.get(1).and_then(|a| a.as_expression()) {
                    plan.steps.push(Step::ExportAll(self.expression(source)));
                }
            }
            Expression::AwaitExpression(_) | Expression::ParenthesizedExpression(_) => {
                plan.steps.push(Step::Effect(self.expression(expr)));
            }
            _ => tracing::trace!(expression = %self.slice(expr.span()), "expression skipped"),
        }
    }

    fn is_exports(&self, expr: &Expression<'_>) -> bool {
        matches!(expr, Expression::Identifier(id) if id.name.as_str() == self.exports_name)
    }

    fn export_slot(&self, target: &AssignmentTarget<'_>) -> Option<String> {
        match target {
            AssignmentTarget::StaticMemberExpression(member) if self.is_exports(&member.object) => {
                Some(member.property.name.to_string())
            }
            AssignmentTarget::ComputedMemberExpression(member)
                if self.is_exports(&member.object) =>
            {
                match &member.expression {
                    Expression::StringLiteral(s) => Some(s.value.to_string()),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn is_export_all(&self, call: &CallExpression<'_>) -> bool {
        let Expression::StaticMemberExpression(callee) = &call.callee else {
            return false;
        };
        let is_object_assign = matches!(&callee.object, Expression::Identifier(id) if id.name == "Object")
            && callee.property.name == "assign";
        is_object_assign
            && call.arguments.len() == 2
            && call
                .arguments
                .first()
                .and_then(|a| a.as_expression())
                .is_some_and(|target| self.is_exports(target))
    }

    fn require_specifier(&self, expr: &Expression<'_>) -> Option<String> {
        let Expression::CallExpression(call) = expr else {
            return None;
        };
        match &call.callee {
            Expression::Identifier(id) if id.name.as_str() == self.require_name => {}
            _ => return None,
        }
        if call.arguments.len() != 1 {
            return None;
        }
        match call.arguments.first().and_then(|a| a.as_expression()) {
            Some(Expression::StringLiteral(s)) => Some(s.value.to_string()),
            _ => None,
        }
    }

    fn expression(&self, expr: &Expression<'_>) -> Expr {
        match expr {
            Expression::StringLiteral(s) => Expr::Value(Value::String(s.value.to_string())),
            Expression::NumericLiteral(n) => Expr::Value(Value::Number(n.value)),
            Expression::BooleanLiteral(b) => Expr::Value(Value::Bool(b.value)),
            Expression::NullLiteral(_) => Expr::Value(Value::Null),
            Expression::TemplateLiteral(t) if t.expressions.is_empty() => {
                let text = t
                    .quasis
                    .first()
                    .map(|q| q.value.cooked.unwrap_or(q.value.raw).to_string())
                    .unwrap_or_default();
                Expr::Value(Value::String(text))
            }
            Expression::UnaryExpression(unary)
                if unary.operator == UnaryOperator::UnaryNegation =>
            {
                match &unary.argument {
                    Expression::NumericLiteral(n) => Expr::Value(Value::Number(-n.value)),
                    _ => self.opaque(expr),
                }
            }
            Expression::Identifier(id) if id.name == "undefined" => Expr::Value(Value::Undefined),
            Expression::Identifier(id) => Expr::Binding(id.name.to_string()),
            Expression::ParenthesizedExpression(paren) => self.expression(&paren.expression),
            Expression::AwaitExpression(awaited) => match self.require_specifier(&awaited.argument) {
                Some(specifier) => Expr::Require(specifier),
                None => self.opaque(expr),
            },
            Expression::StaticMemberExpression(member) => Expr::Member(
                Box::new(self.expression(&member.object)),
                member.property.name.to_string(),
            ),
            Expression::ComputedMemberExpression(member) => match &member.expression {
                Expression::StringLiteral(s) => {
                    Expr::Member(Box::new(self.expression(&member.object)), s.value.to_string())
                }
                Expression::NumericLiteral(n) => {
                    Expr::Member(Box::new(self.expression(&member.object)), n.value.to_string())
                }
                _ => self.opaque(expr),
            },
            Expression::ArrayExpression(array) => Expr::Array(
                array
                    .elements
                    .iter()
                    .map(|element| match element {
                        ArrayExpressionElement::Elision(_) => Expr::Value(Value::Undefined),
                        ArrayExpressionElement::SpreadElement(spread) => {
                            Expr::Opaque(self.slice(spread.span))
                        }
                        other => other
                            .as_expression()
                            .map(|e| self.expression(e))
                            .unwrap_or(Expr::Value(Value::Undefined)),
                    })
                    .collect(),
            ),
            Expression::ObjectExpression(object) => self.object(object),
            Expression::FunctionExpression(func) => Expr::Function(FunctionRef {
                name: func.id.as_ref().map(|id| id.name.to_string()),
                source: self.slice(func.span),
            }),
            Expression::ArrowFunctionExpression(arrow) => Expr::Function(FunctionRef {
                name: None,
                source: self.slice(arrow.span),
            }),
            Expression::ClassExpression(class) => Expr::Function(FunctionRef {
                name: class.id.as_ref().map(|id| id.name.to_string()),
                source: self.slice(class.span),
            }),
            _ => self.opaque(expr),
        }
    }

    fn object(&self, object: &ObjectExpression<'_>) -> Expr {
        let mut properties = Vec::with_capacity(object.properties.len());
        for property in &object.properties {
            match property {
                ObjectPropertyKind::ObjectProperty(p) => {
                    let key = if p.computed {
                        None
                    } else {
                        p.key.static_name().map(|name| name.to_string())
                    };
                    let Some(key) = key else {
                        return Expr::Opaque(self.slice(object.span));
                    };
                    let value = match p.kind {
                        PropertyKind::Init => self.expression(&p.value),
                        PropertyKind::Get | PropertyKind::Set => Expr::Opaque(self.slice(p.span)),
                    };
                    properties.push(Property::Entry(key, value));
                }
                ObjectPropertyKind::SpreadProperty(spread) => {
                    properties.push(Property::Spread(self.expression(&spread.argument)));
                }
            }
        }
        Expr::Object(properties)
    }

    fn opaque(&self, expr: &Expression<'_>) -> Expr {
        Expr::Opaque(self.slice(expr.span()))
    }
}
