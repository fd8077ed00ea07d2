// Each integration-test crate uses a different subset of these helpers.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;

use eh_lowering::eh::describe;
use eh_lowering::ir::{
    HandlerEntry, Instr, LabelId, LocalId, LoweredFunction, Operand, RegionAction, RegionId,
};
use eh_lowering::{ClassInfo, MatchingDescriptor, Ty, TypeTable};

pub trait RequireExt<T> {
    fn require(self, context: &str) -> T;
}

impl<T> RequireExt<T> for Option<T> {
    fn require(self, context: &str) -> T {
        match self {
            Some(value) => value,
            None => panic!("{context}"),
        }
    }
}

impl<T, E: Debug> RequireExt<T> for Result<T, E> {
    fn require(self, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => panic!("{context}: {err:?}"),
        }
    }
}

pub const MYOBJ_COPY: &str = "MyObj::MyObj(const MyObj&)";
pub const MYOBJ_DTOR: &str = "MyObj::~MyObj";

/// Classes shared by the integration tests.
pub fn types() -> TypeTable {
    let mut types = TypeTable::new();
    types.declare_class("Fwd");
    types.define_class("A", ClassInfo::new(4));
    types.define_class("B", ClassInfo::new(4));
    types.define_class("C", ClassInfo::new(4));
    types.define_class(
        "MyObj",
        ClassInfo::new(16)
            .with_destructor(MYOBJ_DTOR)
            .with_copy_constructor(MYOBJ_COPY),
    );
    types
}

pub fn descriptor(types: &TypeTable, ty: &Ty) -> MatchingDescriptor {
    describe(types, ty)
}

/// How a simulated run ended.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Returned,
    FellThrough,
    Terminated,
    Escaped(MatchingDescriptor),
}

/// Something observable that happened during a run.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Stmt(String),
    Call(String),
    Init(Option<String>),
}

#[derive(Debug)]
pub struct Run {
    pub outcome: Outcome,
    pub events: Vec<Event>,
}

impl Run {
    pub fn calls(&self, symbol: &str) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Call(called) if called == symbol))
            .count()
    }

    pub fn stmts(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Stmt(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.iter().position(|candidate| candidate == event)
    }
}

enum Step {
    Next,
    Goto(usize),
    Raise(MatchingDescriptor),
    Finish(Outcome),
}

/// Executes lowered code against a model of the unwinding runtime.
///
/// Statements and constructors can be configured to throw. A raised
/// exception starts at the innermost region physically enclosing the
/// faulting instruction and then follows region parents: cleanup regions run
/// their cleanup, dispatch regions consult the handler table, terminate
/// regions end the run and forwarding regions do nothing.
pub struct Simulator<'f> {
    function: &'f LoweredFunction,
    throwing_stmts: HashMap<String, MatchingDescriptor>,
    throwing_calls: HashMap<String, MatchingDescriptor>,
    throwing_ctors: HashSet<String>,
    ctor_exception: Option<MatchingDescriptor>,
    labels: HashMap<LabelId, usize>,
    enclosing: Vec<Option<RegionId>>,
    regions: HashMap<RegionId, (Option<RegionId>, RegionAction)>,
    locals: HashMap<LocalId, Operand>,
    in_flight: Option<MatchingDescriptor>,
    caught: Vec<MatchingDescriptor>,
    events: Vec<Event>,
}

impl<'f> Simulator<'f> {
    pub fn new(function: &'f LoweredFunction) -> Self {
        let mut labels = HashMap::new();
        let mut enclosing = Vec::with_capacity(function.instrs.len());
        let mut regions = HashMap::new();
        let mut open: Vec<RegionId> = Vec::new();
        for (index, instr) in function.instrs.iter().enumerate() {
            match instr {
                Instr::Label(label) => {
                    labels.insert(*label, index);
                }
                Instr::RegionStart { region, .. } => open.push(*region),
                _ => {}
            }
            enclosing.push(open.last().copied());
            if let Instr::RegionEnd { region, action } = instr {
                let popped = open.pop();
                assert_eq!(popped, Some(*region), "regions are not properly nested");
                regions.insert(*region, (function.region_parent(*region), action.clone()));
            }
        }
        assert!(open.is_empty(), "unterminated regions: {open:?}");
        Self {
            function,
            throwing_stmts: HashMap::new(),
            throwing_calls: HashMap::new(),
            throwing_ctors: HashSet::new(),
            ctor_exception: None,
            labels,
            enclosing,
            regions,
            locals: HashMap::new(),
            in_flight: None,
            caught: Vec::new(),
            events: Vec::new(),
        }
    }

    /// `text` raises an exception of `descriptor` when executed.
    pub fn throwing_stmt(mut self, text: &str, descriptor: MatchingDescriptor) -> Self {
        self.throwing_stmts.insert(text.to_string(), descriptor);
        self
    }

    /// Calls to `symbol`, such as a destructor, raise `descriptor`.
    pub fn throwing_call(mut self, symbol: &str, descriptor: MatchingDescriptor) -> Self {
        self.throwing_calls.insert(symbol.to_string(), descriptor);
        self
    }

    /// Constructions through `ctor` raise `descriptor`.
    pub fn throwing_ctor(mut self, ctor: &str, descriptor: MatchingDescriptor) -> Self {
        self.throwing_ctors.insert(ctor.to_string());
        self.ctor_exception = Some(descriptor);
        self
    }

    pub fn run(mut self) -> Run {
        let function = self.function;
        let mut pc = 0;
        let mut steps = 0usize;
        let outcome = loop {
            steps += 1;
            assert!(steps < 100_000, "simulation did not terminate");
            let Some(instr) = function.instrs.get(pc) else {
                break Outcome::FellThrough;
            };
            let step = match instr {
                Instr::Call { dest, callee, args } => self.call(callee.symbol(), *dest, args),
                other => self.step(other),
            };
            match step {
                Step::Next => pc += 1,
                Step::Goto(target) => pc = target,
                Step::Finish(outcome) => break outcome,
                Step::Raise(exception) => match self.unwind(pc, exception) {
                    Ok(target) => pc = target,
                    Err(outcome) => break outcome,
                },
            }
        };
        Run {
            outcome,
            events: self.events,
        }
    }

    fn step(&mut self, instr: &Instr) -> Step {
        match instr {
            Instr::Assign { dest, value } => {
                self.locals.insert(*dest, value.clone());
                Step::Next
            }
            Instr::Init { ctor, .. } => {
                self.events.push(Event::Init(ctor.clone()));
                match ctor {
                    Some(ctor) if self.throwing_ctors.contains(ctor) => {
                        Step::Raise(self.ctor_exception.clone().unwrap_or(MatchingDescriptor::Error))
                    }
                    _ => Step::Next,
                }
            }
            Instr::Stmt(text) => {
                self.events.push(Event::Stmt(text.clone()));
                match self.throwing_stmts.get(text) {
                    Some(descriptor) => Step::Raise(descriptor.clone()),
                    None => Step::Next,
                }
            }
            Instr::Jump(label) => Step::Goto(self.label(*label)),
            Instr::Return => Step::Finish(Outcome::Returned),
            _ => Step::Next,
        }
    }

    fn call(&mut self, symbol: &str, dest: Option<LocalId>, args: &[Operand]) -> Step {
        self.events.push(Event::Call(symbol.to_string()));
        if let Some(descriptor) = self.throwing_calls.get(symbol) {
            return Step::Raise(descriptor.clone());
        }
        match symbol {
            "__eh_alloc" => {
                if let Some(dest) = dest {
                    self.locals.insert(dest, Operand::opaque("buffer"));
                }
                Step::Next
            }
            "__cp_push_exception" => match &args[1] {
                Operand::Descriptor(descriptor) => Step::Raise(descriptor.clone()),
                other => panic!("push without a descriptor: {other:?}"),
            },
            "__start_cp_handler" => {
                let exception = self
                    .in_flight
                    .take()
                    .require("handler entered without an exception in flight");
                self.caught.push(exception);
                Step::Next
            }
            "__cp_pop_exception" => {
                self.caught.pop().require("context released twice");
                Step::Next
            }
            "__uncatch_exception" => match self.caught.last() {
                Some(exception) => Step::Raise(exception.clone()),
                None => Step::Finish(Outcome::Terminated),
            },
            "__check_eh_spec" => {
                let allowed = self.spec_types(&args[1]);
                let current = self
                    .caught
                    .last()
                    .cloned()
                    .require("specification check without an exception");
                if allowed.contains(&current) {
                    Step::Raise(current)
                } else {
                    Step::Finish(Outcome::Terminated)
                }
            }
            "terminate" | "std::terminate" => Step::Finish(Outcome::Terminated),
            _ => Step::Next,
        }
    }

    fn spec_types(&self, array: &Operand) -> Vec<MatchingDescriptor> {
        let Some(local) = array.base_local() else {
            panic!("specification array is not a local: {array:?}");
        };
        match self.locals.get(&local) {
            Some(Operand::Aggregate(items)) => items
                .iter()
                .map(|item| match item {
                    Operand::Descriptor(descriptor) => descriptor.clone(),
                    other => panic!("specification entry is not a descriptor: {other:?}"),
                })
                .collect(),
            other => panic!("specification array was never filled: {other:?}"),
        }
    }

    /// Finds where `exception` raised at `pc` is caught, running cleanups on
    /// the way.
    fn unwind(&mut self, pc: usize, exception: MatchingDescriptor) -> Result<usize, Outcome> {
        let function = self.function;
        let mut region = self.enclosing[pc];
        while let Some(current) = region {
            let (parent, action) = self.regions[&current].clone();
            match action {
                RegionAction::Terminate(_) => return Err(Outcome::Terminated),
                RegionAction::Forward => {}
                RegionAction::Cleanup(cleanup) => {
                    for instr in &cleanup {
                        let step = match instr {
                            Instr::Call { callee, dest, args } => {
                                self.call(callee.symbol(), *dest, args)
                            }
                            other => self.step(other),
                        };
                        match step {
                            Step::Finish(outcome) => return Err(outcome),
                            // A second exception while unwinding.
                            Step::Raise(_) => return Err(Outcome::Terminated),
                            Step::Next | Step::Goto(_) => {}
                        }
                    }
                }
                RegionAction::Dispatch => {
                    let handler = function
                        .handlers
                        .iter()
                        .find(|entry: &&HandlerEntry| {
                            entry.region == current && entry.accepts.accepts(&exception)
                        });
                    if let Some(entry) = handler {
                        self.in_flight = Some(exception);
                        return Ok(self.label(entry.label));
                    }
                }
            }
            region = parent;
        }
        Err(Outcome::Escaped(exception))
    }

    fn label(&self, label: LabelId) -> usize {
        self.labels
            .get(&label)
            .copied()
            .require(&format!("label {label} is never placed"))
    }
}
