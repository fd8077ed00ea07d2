use std::collections::BTreeSet;

use tracing::{debug, info};

use super::FunctionLowering;
use super::descriptor::{MatchingDescriptor, describe};
use super::runtime::RuntimeRegistry;
use crate::config::EhConfig;
use crate::diagnostics::{Diagnostic, DiagnosticSink, EhDiagnostic, Span};
use crate::error::{Error, Result};
use crate::ir::{FunctionKind, LoweredFunction};
use crate::types::{Ty, TypeSystem};

/// State shared by every function of one translation unit.
pub struct TranslationUnit<'t> {
    config: EhConfig,
    types: &'t dyn TypeSystem,
    registry: RuntimeRegistry,
    diagnostics: DiagnosticSink,
    referenced_type_info: BTreeSet<String>,
    eh_disabled_reported: bool,
    functions: Vec<LoweredFunction>,
}

/// Everything lowering produced for a translation unit.
#[derive(Debug)]
pub struct UnitArtifact {
    pub functions: Vec<LoweredFunction>,
    /// Runtime entry points declared, in declaration order.
    pub runtime_symbols: Vec<String>,
    /// Type-info objects named by handlers and exception specifications.
    pub referenced_type_info: Vec<String>,
    /// Non-fatal diagnostics (warnings and notes).
    pub diagnostics: Vec<Diagnostic>,
}

impl UnitArtifact {
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&LoweredFunction> {
        self.functions.iter().find(|function| function.name == name)
    }
}

impl<'t> TranslationUnit<'t> {
    #[must_use]
    pub fn new(config: EhConfig, types: &'t dyn TypeSystem) -> Self {
        debug!(
            target: "eh",
            exceptions = config.exceptions,
            honor_std = config.honor_std,
            unwind_model = %config.unwind_model,
            "begin translation unit"
        );
        Self {
            config,
            types,
            registry: RuntimeRegistry::new(config.honor_std),
            diagnostics: DiagnosticSink::default(),
            referenced_type_info: BTreeSet::new(),
            eh_disabled_reported: false,
            functions: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EhConfig {
        &self.config
    }

    #[must_use]
    pub fn types(&self) -> &'t dyn TypeSystem {
        self.types
    }

    #[must_use]
    pub fn registry(&self) -> &RuntimeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut RuntimeRegistry {
        &mut self.registry
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.as_slice()
    }

    /// Lowered functions finished so far.
    #[must_use]
    pub fn functions(&self) -> &[LoweredFunction] {
        &self.functions
    }

    pub fn begin_function(
        &mut self,
        name: impl Into<String>,
        kind: FunctionKind,
    ) -> FunctionLowering<'_, 't> {
        FunctionLowering::new(self, name.into(), kind)
    }

    /// Whether EH constructs may be lowered. When exceptions are disabled the
    /// first caller gets an error diagnostic; later callers are refused
    /// silently.
    pub fn doing_eh(&mut self, span: Option<Span>) -> bool {
        if self.config.exceptions {
            return true;
        }
        if !self.eh_disabled_reported {
            self.eh_disabled_reported = true;
            self.report(Diagnostic::eh(
                EhDiagnostic::ExceptionsDisabled,
                "exception handling disabled, use -fexceptions to enable",
                span,
            ));
        }
        false
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        debug!(target: "eh", diagnostic = %diagnostic, "lowering diagnostic");
        self.diagnostics.push(diagnostic);
    }

    /// Descriptor for a handler or exception-specification type. The
    /// type-info object it names is recorded as referenced by the unit.
    pub fn describe_ref(&mut self, ty: &Ty) -> MatchingDescriptor {
        let descriptor = describe(self.types, ty);
        if let Some(symbol) = descriptor.symbol() {
            self.referenced_type_info.insert(symbol.to_string());
        }
        descriptor
    }

    /// Type-info symbols that must be emitted because a handler table or an
    /// exception specification matches against them.
    #[must_use]
    pub fn mark_all_runtime_matches(&self) -> Vec<String> {
        self.referenced_type_info.iter().cloned().collect()
    }

    pub(crate) fn push_function(&mut self, function: LoweredFunction) -> &LoweredFunction {
        self.functions.push(function);
        let index = self.functions.len() - 1;
        &self.functions[index]
    }

    /// Ends the unit. Fails with every recorded diagnostic when any of them
    /// is an error.
    pub fn finish(mut self) -> Result<UnitArtifact> {
        let runtime_symbols = self.registry.declared_symbols().to_vec();
        let referenced_type_info = self.mark_all_runtime_matches();
        self.registry.reset();

        if self.diagnostics.has_errors() {
            return Err(Error::Lowering {
                diagnostics: self.diagnostics.into_vec(),
            });
        }
        info!(
            target: "eh",
            functions = self.functions.len(),
            runtime_symbols = runtime_symbols.len(),
            type_info = referenced_type_info.len(),
            "finished translation unit"
        );
        Ok(UnitArtifact {
            functions: self.functions,
            runtime_symbols,
            referenced_type_info,
            diagnostics: self.diagnostics.into_vec(),
        })
    }
}
