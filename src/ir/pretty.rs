use std::fmt::Write;

use super::{
    Callee, HandlerMatch, Instr, LocalKind, LoweredFunction, Operand, RegionAction,
};

/// Render a lowered function into a human-readable string.
#[must_use]
pub fn format_function(function: &LoweredFunction) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {} {{", function.kind.as_str(), function.name);
    for (index, local) in function.locals.iter().enumerate() {
        let kind = match local.kind {
            LocalKind::User => "",
            LocalKind::Temp => " temp",
            LocalKind::Artificial => " artificial",
        };
        let _ = write!(out, "    let _{index}: {};{kind}", local.ty);
        if let Some(name) = &local.name {
            let _ = write!(out, " // {name}");
        }
        out.push('\n');
    }
    for instr in &function.instrs {
        match instr {
            Instr::Label(_) => {
                let _ = writeln!(out, "  {}", format_instr(instr));
            }
            _ => {
                let _ = writeln!(out, "    {}", format_instr(instr));
            }
        }
    }
    if !function.handlers.is_empty() {
        let _ = writeln!(out, "    handlers:");
        for entry in &function.handlers {
            let accepts = match &entry.accepts {
                HandlerMatch::Type(descriptor) => descriptor.to_string(),
                HandlerMatch::CatchAll => "...".to_string(),
            };
            let _ = writeln!(out, "      {} catch {accepts} -> {}", entry.region, entry.label);
        }
    }
    out.push_str("}\n");
    out
}

/// Render one instruction without indentation.
#[must_use]
pub fn format_instr(instr: &Instr) -> String {
    match instr {
        Instr::StorageLive(local) => format!("StorageLive({local})"),
        Instr::StorageDead(local) => format!("StorageDead({local})"),
        Instr::Assign { dest, value } => format!("{dest} = {}", format_operand(value)),
        Instr::Init { place, value, ctor } => {
            let mut text = format!("init {} = {}", format_operand(place), format_operand(value));
            if let Some(ctor) = ctor {
                let _ = write!(text, " via {ctor}");
            }
            text
        }
        Instr::Call { dest, callee, args } => {
            let args = args.iter().map(format_operand).collect::<Vec<_>>().join(", ");
            let mut text = String::new();
            if let Some(dest) = dest {
                let _ = write!(text, "{dest} = ");
            }
            let _ = write!(text, "call {}({args})", callee.symbol());
            if let Callee::Runtime(_) = callee {
                if callee.diverges() {
                    text.push_str(" -> !");
                }
            }
            text
        }
        Instr::Stmt(text) => format!("stmt {text}"),
        Instr::RegionStart { region, parent } => match parent {
            Some(parent) => format!("region_start {region} in {parent}"),
            None => format!("region_start {region}"),
        },
        Instr::RegionEnd { region, action } => {
            format!("region_end {region} {}", format_action(action))
        }
        Instr::Label(label) => format!("{label}:"),
        Instr::Jump(label) => format!("jump {label}"),
        Instr::Return => "return".to_string(),
    }
}

fn format_action(action: &RegionAction) -> String {
    match action {
        RegionAction::Terminate(handle) => format!("terminate({})", handle.symbol()),
        RegionAction::Dispatch => "dispatch".to_string(),
        RegionAction::Forward => "forward".to_string(),
        RegionAction::Cleanup(instrs) => {
            let body = instrs.iter().map(format_instr).collect::<Vec<_>>().join("; ");
            format!("cleanup {{ {body} }}")
        }
    }
}

fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::Local(local) => local.to_string(),
        Operand::Int(value) => value.to_string(),
        Operand::Null => "null".to_string(),
        Operand::Descriptor(descriptor) => descriptor.to_string(),
        Operand::FnAddr(symbol) => format!("&{symbol}"),
        Operand::AddrOf(inner) => format!("&{}", format_operand(inner)),
        Operand::Deref(inner) => format!("(*{})", format_operand(inner)),
        Operand::Field(base, field) => format!("{}.{}", format_operand(base), field.name()),
        Operand::Convert { value, ty } => format!("({} as {ty})", format_operand(value)),
        Operand::Aggregate(items) => {
            let items = items.iter().map(format_operand).collect::<Vec<_>>().join(", ");
            format!("[{items}]")
        }
        Operand::Opaque(text) => format!("`{text}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        ContextField, FnDecl, FnHandle, FnSignature, FunctionKind, LabelId, LocalDecl, LocalId,
        RegionId,
    };
    use crate::types::Ty;

    fn terminate() -> FnHandle {
        FnHandle::new(FnDecl {
            symbol: "std::terminate".into(),
            signature: FnSignature::new(Vec::new(), Ty::void()).noreturn(),
            external: true,
            public: true,
            artificial: true,
        })
    }

    #[test]
    fn formats_nested_operands() {
        let value = Operand::Local(LocalId(0))
            .deref()
            .field(ContextField::Value)
            .addr_of()
            .convert(Ty::pointer_to(Ty::int()));
        assert_eq!(format_operand(&value), "(&(*_0).value as int*)");
    }

    #[test]
    fn formats_function_with_labels_and_regions() {
        let function = LoweredFunction {
            name: "f".into(),
            kind: FunctionKind::Normal,
            locals: vec![LocalDecl::new(
                Some("tmp".into()),
                Ty::int(),
                LocalKind::Temp,
                None,
            )],
            instrs: vec![
                Instr::RegionStart {
                    region: RegionId(0),
                    parent: None,
                },
                Instr::Stmt("work()".into()),
                Instr::RegionEnd {
                    region: RegionId(0),
                    action: RegionAction::Terminate(terminate()),
                },
                Instr::Jump(LabelId(0)),
                Instr::Label(LabelId(0)),
                Instr::Return,
            ],
            handlers: Vec::new(),
        };
        let text = format_function(&function);
        assert_eq!(
            text,
            "fn f {\n    let _0: int; temp // tmp\n    region_start r0\n    stmt work()\n    region_end r0 terminate(std::terminate)\n    jump L0\n  L0:\n    return\n}\n"
        );
    }
}
