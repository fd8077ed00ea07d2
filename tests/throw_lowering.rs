mod common;

use common::{Event, MYOBJ_COPY, MYOBJ_DTOR, Outcome, RequireExt, Simulator, descriptor, types};
use eh_lowering::diagnostics::{EhDiagnostic, Severity, Span};
use eh_lowering::ir::{Instr, Operand};
use eh_lowering::{EhConfig, FunctionKind, ThrowLowering, ThrowOperand, TranslationUnit, Ty};

#[test]
fn uncaught_object_escapes_with_its_descriptor() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    let thrown = lowering.lower_throw(
        Some(ThrowOperand::new(Operand::opaque("make()"), Ty::class("MyObj")).with_side_effects()),
        None,
    );
    let function = lowering.finish();

    let expected = descriptor(&types, &Ty::class("MyObj"));
    assert!(matches!(
        &thrown,
        ThrowLowering::Thrown { descriptor, storage: Some(_) } if *descriptor == expected
    ));
    let run = Simulator::new(function).run();
    assert_eq!(run.outcome, Outcome::Escaped(expected));
    assert_eq!(
        run.events,
        [
            Event::Init(None),
            Event::Call("__eh_alloc".into()),
            Event::Init(Some(MYOBJ_COPY.into())),
            Event::Call("__cp_push_exception".into()),
            Event::Call(MYOBJ_DTOR.into()),
        ]
    );
}

#[test]
fn side_effects_are_evaluated_before_allocation() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    lowering.lower_throw(
        Some(ThrowOperand::new(Operand::opaque("make()"), Ty::class("MyObj")).with_side_effects()),
        None,
    );
    let function = lowering.finish();

    let temp = function
        .position(|instr| {
            matches!(instr, Instr::Init { value, .. } if *value == Operand::opaque("make()"))
        })
        .require("temporary holds the operand");
    let alloc = function
        .position(|instr| instr.called_symbol() == Some("__eh_alloc"))
        .require("buffer is allocated");
    assert!(temp < alloc);
}

#[test]
fn caught_throw_destroys_its_temporary_once() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    let try_block = lowering.begin_try_block(None);
    lowering.lower_throw(
        Some(ThrowOperand::new(Operand::opaque("MyObj()"), Ty::class("MyObj")).with_side_effects()),
        None,
    );
    lowering.finish_try_block(&try_block);
    lowering.lower_catch(&try_block, None, |this, _| this.emit_user("recover()"));
    lowering.finish_handler_sequence(try_block);
    let function = lowering.finish();

    let run = Simulator::new(function).run();
    assert_eq!(run.outcome, Outcome::FellThrough);
    assert_eq!(run.calls(MYOBJ_DTOR), 1);
    let dtor = run.position(&Event::Call(MYOBJ_DTOR.into())).require("temporary destroyed");
    let start = run
        .position(&Event::Call("__start_cp_handler".into()))
        .require("handler entered");
    assert!(dtor < start, "the temporary dies before the handler runs");
}

#[test]
fn scalar_is_copied_without_constructor() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    lowering.lower_throw(Some(ThrowOperand::new(Operand::Int(42), Ty::int())), None);
    let function = lowering.finish();

    assert!(function.instrs.iter().any(|instr| matches!(
        instr,
        Instr::Call { callee, args, .. }
            if callee.symbol() == "__eh_alloc" && *args == [Operand::Int(4)]
    )));
    let run = Simulator::new(function).run();
    assert_eq!(run.outcome, Outcome::Escaped(descriptor(&types, &Ty::int())));
    assert!(run.events.contains(&Event::Init(None)));
}

#[test]
fn array_operand_is_thrown_as_pointer() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    let thrown = lowering.lower_throw(
        Some(ThrowOperand::new(
            Operand::opaque("buffer"),
            Ty::array_of(Ty::int(), Some(8)),
        )),
        None,
    );
    let function = lowering.finish();

    let expected = descriptor(&types, &Ty::pointer_to(Ty::int()));
    assert_eq!(
        thrown,
        ThrowLowering::Thrown {
            descriptor: expected,
            storage: None,
        }
    );
    assert_eq!(function.count_calls("__eh_alloc"), 0);
}

#[test]
fn incomplete_class_is_rejected_before_any_code() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    let span = Span::new(10, 18);
    let thrown = lowering.lower_throw(
        Some(ThrowOperand::new(Operand::opaque("fwd"), Ty::class("Fwd")).with_span(span)),
        None,
    );
    let function = lowering.finish();

    assert!(thrown.is_error());
    assert!(function.instrs.is_empty());
    let err = unit.finish().expect_err("incomplete throw is an error");
    let [diagnostic] = err.diagnostics() else {
        panic!("expected one diagnostic, got {:?}", err.diagnostics());
    };
    assert!(diagnostic.is(EhDiagnostic::IncompleteThrowType));
    assert_eq!(diagnostic.span, Some(span));
    assert_eq!(
        diagnostic.message,
        "cannot throw expression of incomplete type `Fwd`"
    );
}

#[test]
fn pointer_to_incomplete_class_is_rejected() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    let thrown = lowering.lower_throw(
        Some(ThrowOperand::new(
            Operand::opaque("fwd_ptr"),
            Ty::pointer_to(Ty::class("Fwd")),
        )),
        None,
    );
    lowering.finish();
    assert!(thrown.is_error());
    assert!(unit.finish().is_err());
}

#[test]
fn void_pointer_is_thrown() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    let thrown = lowering.lower_throw(
        Some(ThrowOperand::new(Operand::opaque("raw"), Ty::void_ptr())),
        None,
    );
    lowering.finish();
    assert!(!thrown.is_error());
    assert!(unit.finish().is_ok());
}

#[test]
fn throwing_null_warns_and_throws_an_integer() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    let thrown = lowering.lower_throw(
        Some(ThrowOperand::new(Operand::Int(0), Ty::int()).null_literal()),
        None,
    );
    lowering.finish();

    assert!(matches!(thrown, ThrowLowering::Thrown { .. }));
    let artifact = unit.finish().require("warnings do not fail the unit");
    let [warning] = artifact.diagnostics.as_slice() else {
        panic!("expected one warning, got {:?}", artifact.diagnostics);
    };
    assert!(warning.is(EhDiagnostic::ThrowingNull));
    assert_eq!(warning.severity, Severity::Warning);
}

#[test]
fn rethrow_emits_a_single_runtime_call() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    let mut lowering = unit.begin_function("raise", FunctionKind::Normal);
    assert_eq!(lowering.lower_throw(None, None), ThrowLowering::Rethrown);
    assert!(!lowering.is_reachable());
    let function = lowering.finish();

    assert_eq!(function.instrs.len(), 1);
    assert_eq!(
        function.called_symbols().collect::<Vec<_>>(),
        ["__uncatch_exception"]
    );
    let run = Simulator::new(function).run();
    assert_eq!(run.outcome, Outcome::Terminated, "nothing to rethrow");
}

#[test]
fn disabled_exceptions_report_once_per_unit() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT.with_exceptions(false), &types);
    for name in ["first", "second"] {
        let mut lowering = unit.begin_function(name, FunctionKind::Normal);
        let thrown = lowering.lower_throw(
            Some(ThrowOperand::new(Operand::Int(1), Ty::int())),
            None,
        );
        assert!(thrown.is_error());
        assert_eq!(lowering.lower_throw(None, None), ThrowLowering::Error);
        let function = lowering.finish();
        assert!(function.instrs.is_empty());
    }
    let err = unit.finish().expect_err("disabled exceptions are an error");
    assert_eq!(err.diagnostics().len(), 1);
    assert!(err.diagnostics()[0].is(EhDiagnostic::ExceptionsDisabled));
}

#[test]
fn runtime_entries_are_declared_once_per_unit() {
    let types = types();
    let mut unit = TranslationUnit::new(EhConfig::DEFAULT, &types);
    for name in ["first", "second"] {
        let mut lowering = unit.begin_function(name, FunctionKind::Normal);
        lowering.lower_throw(
            Some(ThrowOperand::new(Operand::opaque("obj"), Ty::class("MyObj"))),
            None,
        );
        lowering.finish();
    }
    let artifact = unit.finish().require("unit lowers cleanly");
    assert_eq!(
        artifact.runtime_symbols,
        ["__eh_alloc", "std::terminate", "__cp_push_exception"]
    );
    let first = artifact.function("first").require("first function");
    let second = artifact.function("second").require("second function");
    assert!(first.called_symbols().eq(second.called_symbols()));
}
