//! Parse-then-render pipeline shared by inline and fetched sources.

use oxc_allocator::Allocator;
use oxc_ast_visit::VisitMut;
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::error::TranspileError;
use crate::jsx_lowerer::JsxLowerer;
use crate::linkage::ModuleLinker;
use crate::options::TranspileOptions;

#[derive(Debug, Clone, Default)]
pub struct Transpiler {
    options: TranspileOptions,
}

impl Transpiler {
    pub fn new(options: TranspileOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TranspileOptions {
        &self.options
    }

    /// Lowers JSX source into a plain statement list that expects the
    /// configured require/export parameters to be in scope.
    pub fn transpile(&self, source: &str) -> Result<String, TranspileError> {
        let allocator = Allocator::default();
        let source_type = SourceType::default()
            .with_module(true)
            .with_jsx(true);

        let ret = Parser::new(&allocator, source, source_type).parse();
        if !ret.errors.is_empty() {
            return Err(TranspileError::syntax(&ret.errors));
        }
        if ret.panicked {
            return Err(TranspileError::syntax(["parser aborted"]));
        }

        let mut program = ret.program;

        // 1. Markup -> construction calls
        let mut jsx_lowerer = JsxLowerer::new(&allocator, &self.options);
        jsx_lowerer.visit_program(&mut program);

        // 2. import/export -> require/export-container statements
        ModuleLinker::new(&allocator, &self.options).link_program(&mut program)?;

        // Synthesized nodes carry empty spans; stale comments would attach to them.
        program.comments.clear();

        let code = Codegen::new().build(&program).code;
        tracing::trace!(bytes = code.len(), "lowered module source");
        Ok(code)
    }
}

/// Lowers `source` with the default runtime names.
pub fn transpile(source: &str) -> Result<String, TranspileError> {
    Transpiler::default().transpile(source)
}
