/// Continuation handoff.
///
/// Every point in this core where a user procedure would need to be called
/// — a chaperone handler, a hash callback, one step of `hash-for-each` —
/// does not call it. It returns a `Step` describing what to apply and how
/// to resume, and the caller (the evaluator's trampoline) is responsible
/// for the actual call and for feeding the result back in. Design Notes
/// §9: "the core returns a `Step` sum ... do not emulate the evaluator's
/// trampoline inside the core."
///
/// Struct guards suspend the same way but through their own
/// `struct_instance::PendingConstruction`/`ConstructOutcome` pair rather
/// than `Step`/`Resumption`: a guard chain needs to thread the
/// accumulated field vector and the remaining super chain back in on
/// every resumption, which doesn't fit `Resumption`'s flat, `Copy`-ish
/// shape without duplicating that state inside it.

use crate::value::Value;

/// What the evaluator must do to keep a suspended core operation moving.
#[derive(Debug, Clone)]
pub enum Step {
    /// The operation finished without needing to call into user code.
    Done(Value),
    /// Apply `proc` to `args`. Once the evaluator has a result, it resumes
    /// the suspended operation through `resume`.
    Apply {
        proc: Value,
        args: Vec<Value>,
        resume: Resumption,
    },
}

impl Step {
    pub fn done(v: Value) -> Self {
        Step::Done(v)
    }

    pub fn apply(proc: Value, args: Vec<Value>, resume: Resumption) -> Self {
        Step::Apply { proc, args, resume }
    }

    /// Convenience for call sites that know an operation can never suspend
    /// (e.g. an unwrapped value with no chaperone to consult).
    pub fn into_done(self) -> Option<Value> {
        match self {
            Step::Done(v) => Some(v),
            Step::Apply { .. } => None,
        }
    }
}

/// Marks which suspended operation a handler's result should be fed back
/// into, and any state that operation needs to continue.
#[derive(Debug, Clone)]
pub enum Resumption {
    /// `f` itself has just returned for entry `index`; advance to
    /// resolving the next entry's key/value (the snapshot itself lives
    /// with the caller that issued the `Step`, per §4.5: "the core
    /// snapshots the `items` sequence at call time").
    HashForEachNext { index: usize },
    /// A wrapped table's `key` handler has just returned the transformed
    /// key for entry `index`; resume by resolving that entry's value.
    HashForEachKey { index: usize },
    /// A wrapped table's `ref` handler has just returned the resolved
    /// value for entry `index` (looked up under `key`); resume by
    /// invoking `f` with `(key, resolved-value)`.
    HashForEachValue { index: usize, key: Value },
    /// Feed a chaperone/impersonator handler's result back into the
    /// kind-specific wrapper operation that invoked it.
    ChaperoneHandler { op: ChaperoneOp },
}

/// Which interposed operation a chaperone/impersonator handler result
/// belongs to (§4.4's wrapper-kind table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaperoneOp {
    ProcedureApply,
    VectorRef,
    VectorSet,
    BoxUnbox,
    BoxSet,
    HashRef,
    HashSet,
    HashRemove,
    HashKey,
    HashClear,
    StructAccess,
    StructMutate,
    MarkGet,
    MarkSet,
}
