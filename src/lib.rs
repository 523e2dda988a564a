/// Axiom core — the numeric tower, struct-type system, and
/// chaperone/impersonator wrapper layer underneath an Axiom evaluator.
///
/// This crate is deliberately evaluator-agnostic: it has no reader, macro
/// expander, compiler, bytecode loader, continuation/trampoline, GC, or
/// I/O layer. Every point where a user procedure would need to be invoked
/// is surfaced as a `step::Step` for the embedding evaluator to drive.

pub mod chaperone;
pub mod conf;
pub mod errors;
pub mod hash;
pub mod inspector;
pub mod interner;
pub mod numeric;
pub mod step;
pub mod struct_instance;
pub mod struct_type;
pub mod value;

pub use chaperone::{Wrapper, WrapperKind};
pub use conf::AxConf;
pub use errors::{CoreError, Diagnostic, DiagnosticLevel};
pub use hash::{Comparator, HashTable};
pub use step::{ChaperoneOp, Resumption, Step};
pub use struct_instance::StructInstance;
pub use struct_type::StructType;
pub use value::Value;
