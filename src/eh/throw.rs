use super::*;
use crate::diagnostics::{Diagnostic, EhDiagnostic};
use tracing::debug;

/// The operand of a `throw` expression, already lowered by the expression
/// collaborator.
#[derive(Clone, Debug)]
pub struct ThrowOperand {
    pub value: Operand,
    /// Static type of the expression before decay.
    pub ty: Ty,
    pub has_side_effects: bool,
    /// The operand is the literal `NULL`.
    pub is_null_literal: bool,
    pub span: Option<Span>,
}

impl ThrowOperand {
    #[must_use]
    pub fn new(value: Operand, ty: Ty) -> Self {
        Self {
            value,
            ty,
            has_side_effects: false,
            is_null_literal: false,
            span: None,
        }
    }

    #[must_use]
    pub fn with_side_effects(mut self) -> Self {
        self.has_side_effects = true;
        self
    }

    #[must_use]
    pub fn null_literal(mut self) -> Self {
        self.is_null_literal = true;
        self
    }

    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

/// Outcome of lowering a `throw` expression.
#[derive(Clone, Debug, PartialEq)]
pub enum ThrowLowering {
    /// A value was handed to the unwinder. `storage` holds the exception
    /// buffer for value types; pointers are thrown by value without one.
    Thrown {
        descriptor: MatchingDescriptor,
        storage: Option<LocalId>,
    },
    Rethrown,
    /// Nothing was emitted.
    Error,
}

impl ThrowLowering {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, ThrowLowering::Error)
    }
}

function_lowering_impl! {
    /// Lowers `throw operand;`, or `throw;` when `operand` is `None`.
    pub fn lower_throw(&mut self, operand: Option<ThrowOperand>, span: Option<Span>) -> ThrowLowering {
        let span = operand.as_ref().and_then(|operand| operand.span).or(span);
        let Some(operand) = operand else {
            if !self.unit.doing_eh(span) {
                return ThrowLowering::Error;
            }
            self.call_runtime(RuntimeEntry::UncatchException, None, Vec::new());
            return ThrowLowering::Rethrown;
        };
        if operand.ty.is_error() {
            return ThrowLowering::Error;
        }
        if operand.is_null_literal {
            self.unit.report(Diagnostic::eh(
                EhDiagnostic::ThrowingNull,
                "throwing NULL, which has integral, not pointer type",
                span,
            ));
        }
        if !self.complete_ptr_ref_or_void_ptr(&operand.ty) {
            self.unit.report(Diagnostic::eh(
                EhDiagnostic::IncompleteThrowType,
                format!("cannot throw expression of incomplete type `{}`", operand.ty),
                span,
            ));
            return ThrowLowering::Error;
        }
        if !self.unit.doing_eh(span) {
            return ThrowLowering::Error;
        }

        let thrown = operand.ty.decay();
        if thrown.is_pointer() {
            return self.throw_pointer(operand.value, &thrown);
        }
        self.throw_object(operand, &thrown.main_variant(), span)
    }

    fn throw_pointer(&mut self, value: Operand, ty: &Ty) -> ThrowLowering {
        let descriptor = describe(self.types(), ty);
        debug!(target: "eh", function = %self.name, ty = %ty, "throwing pointer by value");
        self.call_runtime(
            RuntimeEntry::PushException,
            None,
            vec![
                value.convert(Ty::void_ptr()),
                Operand::Descriptor(descriptor.clone()),
                Operand::Null,
            ],
        );
        ThrowLowering::Thrown {
            descriptor,
            storage: None,
        }
    }

    fn throw_object(&mut self, operand: ThrowOperand, ty: &Ty, span: Option<Span>) -> ThrowLowering {
        let types = self.types();
        let Some(size) = types.size_of(ty) else {
            self.unit.report(Diagnostic::eh(
                EhDiagnostic::UnsizedThrowType,
                format!("size of thrown type `{ty}` is unknown"),
                span,
            ));
            return ThrowLowering::Error;
        };

        // The source expression is fully evaluated before the buffer exists.
        // The temporary lives until the throw leaves the expression.
        let temp_scope = operand.has_side_effects;
        let value = if temp_scope {
            self.push_scope();
            let temp = self.declare_local(None, ty.clone(), LocalKind::Temp, span);
            self.emit(Instr::Init {
                place: Operand::Local(temp),
                value: operand.value,
                ctor: None,
            });
            if let Some(dtor) = types.destructor(ty) {
                self.register_cleanup(vec![destructor_call(dtor, temp)]);
            }
            Operand::Local(temp)
        } else {
            operand.value
        };

        let storage = self.declare_local(None, Ty::void_ptr(), LocalKind::Temp, span);
        self.call_runtime(
            RuntimeEntry::AllocException,
            Some(storage),
            vec![Operand::Int(i128::from(size))],
        );
        let place = Operand::Local(storage)
            .convert(Ty::pointer_to(ty.clone()))
            .deref();
        let ctor = types.copy_constructor(ty);
        self.protect_with_terminate(|this| {
            this.emit(Instr::Init { place, value, ctor });
        });

        let descriptor = describe(types, ty);
        let cleanup = match types.destructor(ty) {
            Some(dtor) => Operand::FnAddr(dtor).convert(cleanup_fn_type()),
            None => Operand::Null,
        };
        debug!(target: "eh", function = %self.name, ty = %ty, size, "throwing object");
        self.call_runtime(
            RuntimeEntry::PushException,
            None,
            vec![
                Operand::Local(storage),
                Operand::Descriptor(descriptor.clone()),
                cleanup,
            ],
        );
        if temp_scope {
            self.pop_scope();
        }
        ThrowLowering::Thrown {
            descriptor,
            storage: Some(storage),
        }
    }
}
