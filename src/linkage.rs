//! Module-linkage lowering.
//!
//! `import`/`export` statements cannot run inside a plain function body, so
//! they are rewritten against two parameters supplied at evaluation time: the
//! reference-resolution function (`___require`) and the export container
//! (`__export`).
//!
//! ```text
//! import A, { b as c } from "./m"   const A = (await ___require("./m")).default, c = (await ___require("./m")).b;
//! import * as ns from "./m"         const ns = await ___require("./m");
//! export const x = 1, y = 2         const x = 1, y = 2; __export.x = x; __export.y = y;
//! export default function F() {}    function F() {} __export.default = F;
//! export { a as b } from "./m"      __export.b = (await ___require("./m")).a;
//! ```

use oxc_allocator::{Allocator, Box as oxc_box, Vec as ArenaVec};
use oxc_ast::ast::*;
use oxc_ast::AstBuilder;
use oxc_parser::Parser;
use oxc_span::{SourceType, SPAN};

use crate::error::TranspileError;
use crate::jsx_lowerer::is_identifier_name;
use crate::options::TranspileOptions;

pub struct ModuleLinker<'a> {
    ast: AstBuilder<'a>,
    require_name: &'a str,
    exports_name: &'a str,
}

impl<'a> ModuleLinker<'a> {
    pub fn new(allocator: &'a Allocator, options: &TranspileOptions) -> Self {
        Self {
            ast: AstBuilder::new(allocator),
            require_name: allocator.alloc_str(&options.require_name),
            exports_name: allocator.alloc_str(&options.exports_name),
        }
    }

    fn atom(&self, s: &str) -> &'a str {
        self.ast.allocator.alloc_str(s)
    }

    /// Rewrites every top-level module declaration of `program` in place.
    pub fn link_program(&self, program: &mut Program<'a>) -> Result<(), TranspileError> {
        let body = std::mem::replace(&mut program.body, self.ast.vec());
        let mut linked = self.ast.vec();

        for stmt in body.into_iter() {
            match stmt {
                Statement::ImportDeclaration(decl) => self.lower_import(&decl, &mut linked)?,
                Statement::ExportDefaultDeclaration(decl) => {
                    self.lower_export_default(decl, &mut linked)
                }
                Statement::ExportNamedDeclaration(decl) => {
                    self.lower_export_named(decl, &mut linked)
                }
                Statement::ExportAllDeclaration(decl) => self.lower_export_all(&decl, &mut linked),
                other => linked.push(other),
            }
        }

        program.body = linked;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // IMPORTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn lower_import(
        &self,
        decl: &ImportDeclaration<'a>,
        out: &mut ArenaVec<'a, Statement<'a>>,
    ) -> Result<(), TranspileError> {
        let mut default_local = None;
        let mut namespace_local = None;
        let mut named = Vec::new();

        if let Some(specifiers) = &decl.specifiers {
            for specifier in specifiers {
                match specifier {
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                        default_local = Some(s.local.name.to_string());
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                        namespace_local = Some(s.local.name.to_string());
                    }
                    ImportDeclarationSpecifier::ImportSpecifier(s) => {
                        named.push((s.local.name.to_string(), s.imported.name().to_string()));
                    }
                }
            }
        }

        let call = format!(
            "await {}({})",
            self.require_name,
            quote(&decl.source.value)
        );

        let mut bindings = Vec::new();
        if let Some(local) = &default_local {
            bindings.push(format!("{} = ({}).default", local, call));
        }
        for (local, imported) in &named {
            bindings.push(format!("{} = ({}){}", local, call, projection(imported)));
        }

        let mut code = String::new();
        if !bindings.is_empty() {
            code.push_str(&format!("const {};\n", bindings.join(", ")));
        }
        if let Some(local) = &namespace_local {
            code.push_str(&format!("const {} = {};\n", local, call));
        }
        if code.is_empty() {
            // Side-effect-only import: load it, bind nothing.
            code.push_str(&format!("{};\n", call));
        }

        for stmt in self.parse_statements(&code)? {
            out.push(stmt);
        }
        Ok(())
    }

    fn parse_statements(&self, code: &str) -> Result<ArenaVec<'a, Statement<'a>>, TranspileError> {
        let code = self.atom(code);
        let source_type = SourceType::default().with_module(true);
        let ret = Parser::new(self.ast.allocator, code, source_type).parse();
        if ret.panicked || !ret.errors.is_empty() {
            let messages: Vec<String> = ret.errors.iter().map(|e| e.to_string()).collect();
            return Err(TranspileError::Internal(format!(
                "generated import `{}` did not parse: {}",
                code.trim(),
                messages.join("; ")
            )));
        }
        Ok(ret.program.body)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPORTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn lower_export_default(
        &self,
        decl: oxc_box<'a, ExportDefaultDeclaration<'a>>,
        out: &mut ArenaVec<'a, Statement<'a>>,
    ) {
        match decl.unbox().declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(mut func) => {
                if let Some(name) = func.id.as_ref().map(|id| id.name.to_string()) {
                    out.push(Statement::FunctionDeclaration(func));
                    out.push(self.assign_export("default", self.identifier(&name)));
                } else {
                    func.r#type = FunctionType::FunctionExpression;
                    out.push(self.assign_export("default", Expression::FunctionExpression(func)));
                }
            }
            ExportDefaultDeclarationKind::ClassDeclaration(mut class) => {
                if let Some(name) = class.id.as_ref().map(|id| id.name.to_string()) {
                    out.push(Statement::ClassDeclaration(class));
                    out.push(self.assign_export("default", self.identifier(&name)));
                } else {
                    class.r#type = ClassType::ClassExpression;
                    out.push(self.assign_export("default", Expression::ClassExpression(class)));
                }
            }
            ExportDefaultDeclarationKind::TSInterfaceDeclaration(_) => {}
            other => {
                out.push(self.assign_export("default", other.into_expression()));
            }
        }
    }

    fn lower_export_named(
        &self,
        mut decl: oxc_box<'a, ExportNamedDeclaration<'a>>,
        out: &mut ArenaVec<'a, Statement<'a>>,
    ) {
        if let Some(declaration) = decl.declaration.take() {
            let mut names = Vec::new();
            let stmt = match declaration {
                Declaration::VariableDeclaration(var_decl) => {
                    for declarator in &var_decl.declarations {
                        collect_binding_names(&declarator.id, &mut names);
                    }
                    Statement::VariableDeclaration(var_decl)
                }
                Declaration::FunctionDeclaration(func) => {
                    names.extend(func.id.as_ref().map(|id| id.name.to_string()));
                    Statement::FunctionDeclaration(func)
                }
                Declaration::ClassDeclaration(class) => {
                    names.extend(class.id.as_ref().map(|id| id.name.to_string()));
                    Statement::ClassDeclaration(class)
                }
                // type-only declarations have no runtime binding
                _ => return,
            };

            out.push(stmt);
            for name in &names {
                out.push(self.assign_export(name, self.identifier(name)));
            }
            return;
        }

        let source = decl.source.as_ref().map(|s| s.value.to_string());
        for specifier in &decl.specifiers {
            let exported = specifier.exported.name();
            let local = specifier.local.name();
            let value = match &source {
                Some(source) => self.project(self.require_call(source), &local),
                None => self.identifier(&local),
            };
            out.push(self.assign_export(&exported, value));
        }
    }

    fn lower_export_all(
        &self,
        decl: &ExportAllDeclaration<'a>,
        out: &mut ArenaVec<'a, Statement<'a>>,
    ) {
        let namespace = self.require_call(&decl.source.value);
        if let Some(exported) = &decl.exported {
            out.push(self.assign_export(&exported.name(), namespace));
            return;
        }

        // export * from "m"  ->  Object.assign(__export, await ___require("m"))
        let callee = Expression::from(self.ast.member_expression_static(
            SPAN,
            self.ast.expression_identifier(SPAN, "Object"),
            self.ast.identifier_name(SPAN, "assign"),
            false,
        ));
        let mut args = self.ast.vec();
        args.push(Argument::from(
            self.ast.expression_identifier(SPAN, self.exports_name),
        ));
        args.push(Argument::from(namespace));
        let call = self.ast.expression_call(
            SPAN,
            callee,
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        );
        out.push(self.ast.statement_expression(SPAN, call));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BUILDERS
    // ═══════════════════════════════════════════════════════════════════════════

    fn identifier(&self, name: &str) -> Expression<'a> {
        self.ast.expression_identifier(SPAN, self.atom(name))
    }

    /// `await ___require("<source>")`
    fn require_call(&self, source: &str) -> Expression<'a> {
        let mut args = self.ast.vec();
        args.push(Argument::from(self.ast.expression_string_literal(
            SPAN,
            self.atom(source),
            None,
        )));
        let call = self.ast.expression_call(
            SPAN,
            self.ast.expression_identifier(SPAN, self.require_name),
            None::<oxc_box<TSTypeParameterInstantiation>>,
            args,
            false,
        );
        self.ast.expression_await(SPAN, call)
    }

    fn member(&self, object: Expression<'a>, name: &str) -> MemberExpression<'a> {
        let name = self.atom(name);
        if is_identifier_name(name) {
            self.ast.member_expression_static(
                SPAN,
                object,
                self.ast.identifier_name(SPAN, name),
                false,
            )
        } else {
            self.ast.member_expression_computed(
                SPAN,
                object,
                self.ast.expression_string_literal(SPAN, name, None),
                false,
            )
        }
    }

    fn project(&self, object: Expression<'a>, name: &str) -> Expression<'a> {
        Expression::from(self.member(object, name))
    }

    /// `__export.<name> = <value>;`
    fn assign_export(&self, name: &str, value: Expression<'a>) -> Statement<'a> {
        let slot = self.member(
            self.ast.expression_identifier(SPAN, self.exports_name),
            name,
        );
        let target = AssignmentTarget::from(SimpleAssignmentTarget::from(slot));
        self.ast.statement_expression(
            SPAN,
            self.ast
                .expression_assignment(SPAN, AssignmentOperator::Assign, target, value),
        )
    }
}

fn collect_binding_names(pattern: &BindingPattern<'_>, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_binding_names(elem, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_binding_names(&assign.left, names),
    }
}

/// JSON string quoting doubles as a valid JS string literal.
fn quote(s: &str) -> String {
    serde_json::Value::from(s).to_string()
}

fn projection(name: &str) -> String {
    if is_identifier_name(name) {
        format!(".{}", name)
    } else {
        format!("[{}]", quote(name))
    }
}
