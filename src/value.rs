/// The universal runtime value type for the core (§3).
///
/// Every variant carries enough state to answer identity (`eq?`), printing,
/// and the capability predicates the rest of this crate needs. Mutable
/// containers are `Arc<RwLock<...>>`, matching the surrounding toolchain's
/// own value representation (`core/value.rs`'s `AxValue::Lst`/`Map`).

use crate::chaperone::Wrapper;
use crate::hash::HashTable;
use crate::struct_instance::StructInstance;
use crate::struct_type::StructType;
use num_bigint::BigInt;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub struct ConsCell {
    pub car: Value,
    pub cdr: Value,
}

/// A vector's backing storage plus its mutability flag — impersonating
/// (but not chaperoning) an immutable vector/box/hash fails at wrapper
/// construction (§4.4).
#[derive(Debug)]
pub struct VectorData {
    pub items: RwLock<Vec<Value>>,
    pub immutable: bool,
}

#[derive(Debug)]
pub struct BoxData {
    pub value: RwLock<Value>,
    pub immutable: bool,
}

/// What a `Procedure` actually is, as far as this core needs to know.
/// `FieldAccessor`/`FieldMutator` carry enough to be recognised as a valid
/// struct-wrapper override (§4.4 step 3) and back
/// `struct-accessor-procedure?`/`struct-mutator-procedure?` (SPEC_FULL §7).
#[derive(Debug, Clone)]
pub enum ProcedureKind {
    Opaque,
    FieldAccessor { declared_type: Arc<StructType>, field_index: usize },
    FieldMutator { declared_type: Arc<StructType>, field_index: usize },
    /// The predicate half of a `make-impersonator-property` triple: the
    /// evaluator dispatches a call on one of these to
    /// `chaperone::has_impersonator_property`.
    ImpersonatorPropPredicate { descriptor: Arc<PropertyDescriptor> },
    /// The accessor half of the same triple, dispatching to
    /// `chaperone::impersonator_property_ref`.
    ImpersonatorPropAccessor { descriptor: Arc<PropertyDescriptor> },
    /// `struct-type-make-constructor`'s result: a constructor closed over
    /// its type, dispatching to `struct_instance::construct`.
    StructConstructor { declared_type: Arc<StructType> },
    /// `struct-type-make-predicate`'s result, dispatching to
    /// `struct_instance::struct_predicate`.
    StructPredicate { declared_type: Arc<StructType> },
}

/// An opaque callable the evaluator knows how to invoke; the core only
/// needs its identity, never its body (§1: "the core never inspects
/// [environments/continuations], only threads them").
#[derive(Debug)]
pub struct ProcedureValue {
    pub id: u64,
    pub name: Option<String>,
    pub kind: ProcedureKind,
}

impl ProcedureValue {
    pub fn named(name: impl Into<String>) -> Arc<Self> {
        Arc::new(ProcedureValue { id: next_id(), name: Some(name.into()), kind: ProcedureKind::Opaque })
    }

    pub fn anonymous() -> Arc<Self> {
        Arc::new(ProcedureValue { id: next_id(), name: None, kind: ProcedureKind::Opaque })
    }

    pub fn of_kind(name: Option<String>, kind: ProcedureKind) -> Arc<Self> {
        Arc::new(ProcedureValue { id: next_id(), name, kind })
    }
}

#[derive(Debug)]
pub struct ContinuationMarkKey {
    pub id: u64,
    pub name: Option<String>,
}

impl ContinuationMarkKey {
    pub fn new(name: Option<String>) -> Arc<Self> {
        Arc::new(ContinuationMarkKey { id: next_id(), name })
    }
}

/// An impersonator/struct-type property descriptor (§3, §4.2): an opaque
/// identity with a name, equipped with a predicate/accessor pair constructed
/// alongside it in `chaperone::make_impersonator_property`.
///
/// `guard` and `supers` only matter to struct-type properties
/// (`struct_type::make_struct_type_property`, §4.2's "A type may declare
/// property values; a `guard` attached to the property rewrites the value
/// at attach time. `supers` allows deriving property values from others.");
/// impersonator properties (`chaperone::make_impersonator_property`) leave
/// both empty.
#[derive(Debug)]
pub struct PropertyDescriptor {
    pub id: u64,
    pub name: String,
    /// Invoked at `make_struct_type` attach time with `(attached_value,
    /// type_name)`; its result replaces the stored value. A user procedure,
    /// so invoking it suspends through
    /// `struct_type::MakeStructTypeOutcome::NeedsPropertyGuard` the same way
    /// a construction guard suspends through `ConstructOutcome::NeedsGuard`.
    pub guard: Option<Value>,
    /// Other property descriptors this one aliases: if a type has no direct
    /// value for this descriptor, `StructType::lookup_prop` tries each of
    /// these in order before giving up.
    pub supers: Vec<Arc<PropertyDescriptor>>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(PropertyDescriptor { id: next_id(), name: name.into(), guard: None, supers: Vec::new() })
    }

    pub fn with_guard_and_supers(name: impl Into<String>, guard: Option<Value>, supers: Vec<Arc<PropertyDescriptor>>) -> Arc<Self> {
        Arc::new(PropertyDescriptor { id: next_id(), name: name.into(), guard, supers })
    }
}

#[derive(Clone)]
pub enum Value {
    Fixnum(i64),
    Bignum(BigInt),
    Flonum(f64),
    /// Real and imaginary components; never themselves `Complex` (§3's
    /// non-nesting invariant, enforced by `Value::complex`).
    Complex(Box<Value>, Box<Value>),
    Bool(bool),
    Symbol(u32),
    Cons(Arc<RwLock<ConsCell>>),
    Null,
    Void,
    Procedure(Arc<ProcedureValue>),
    Vector(Arc<VectorData>),
    BoxV(Arc<BoxData>),
    HashTable(Arc<HashTable>),
    ContinuationMarkKey(Arc<ContinuationMarkKey>),
    Struct(Arc<StructInstance>),
    StructType(Arc<StructType>),
    PropertyDescriptor(Arc<PropertyDescriptor>),
    /// A chaperone or impersonator wrapper around any of the above
    /// (§3's wrapper definition; §4.4).
    Wrapped(Arc<Wrapper>),
}

impl Value {
    /// Builds a `Complex`, enforcing that neither component is itself
    /// `Complex` (§3).
    pub fn complex(re: Value, im: Value) -> Result<Value, crate::errors::NumericError> {
        if matches!(re, Value::Complex(..)) || matches!(im, Value::Complex(..)) {
            return Err(crate::errors::NumericError::DomainError {
                message: "complex components must not themselves be complex".to_string(),
            });
        }
        Ok(Value::Complex(Box::new(re), Box::new(im)))
    }

    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Cons(Arc::new(RwLock::new(ConsCell { car, cdr })))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Arc::new(VectorData { items: RwLock::new(items), immutable: false }))
    }

    pub fn immutable_vector(items: Vec<Value>) -> Value {
        Value::Vector(Arc::new(VectorData { items: RwLock::new(items), immutable: true }))
    }

    pub fn boxed(v: Value) -> Value {
        Value::BoxV(Arc::new(BoxData { value: RwLock::new(v), immutable: false }))
    }

    pub fn immutable_boxed(v: Value) -> Value {
        Value::BoxV(Arc::new(BoxData { value: RwLock::new(v), immutable: true }))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Fixnum(_) => "fixnum",
            Value::Bignum(_) => "bignum",
            Value::Flonum(_) => "flonum",
            Value::Complex(..) => "complex",
            Value::Bool(_) => "boolean",
            Value::Symbol(_) => "symbol",
            Value::Cons(_) => "pair",
            Value::Null => "null",
            Value::Void => "void",
            Value::Procedure(_) => "procedure",
            Value::Vector(_) => "vector",
            Value::BoxV(_) => "box",
            Value::HashTable(_) => "hash-table",
            Value::ContinuationMarkKey(_) => "continuation-mark-key",
            Value::Struct(_) => "struct",
            Value::StructType(_) => "struct-type",
            Value::PropertyDescriptor(_) => "impersonator-property",
            Value::Wrapped(w) => w.kind.type_name(),
        }
    }

    /// Everything but `#f` is truthy, including `0`, `'()`, and the empty
    /// vector — Scheme truthiness, not C truthiness.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Bool(false))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Fixnum(_) | Value::Bignum(_) | Value::Flonum(_) | Value::Complex(..))
    }

    /// Follows a wrapper chain down to its non-wrapper base, non-recursively
    /// (Design Notes §9: "a non-recursive walk is mandatory because chains
    /// can be deep"). Used by unsafe struct ops and by `get_base_object`.
    pub fn unwrap_base(&self) -> &Value {
        let mut cur = self;
        while let Value::Wrapped(w) = cur {
            cur = &w.inner;
        }
        cur
    }

    /// `eq?` — identity comparison. Immediates compare by value; everything
    /// heap-allocated compares by `Arc` pointer identity. Two wrappers
    /// around the same inner value are never `eq?` to each other or to the
    /// inner value (Design Notes §9).
    pub fn eq_identity(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Fixnum(a), Value::Fixnum(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Void, Value::Void) => true,
            (Value::Cons(a), Value::Cons(b)) => Arc::ptr_eq(a, b),
            (Value::Procedure(a), Value::Procedure(b)) => Arc::ptr_eq(a, b),
            (Value::Vector(a), Value::Vector(b)) => Arc::ptr_eq(a, b),
            (Value::BoxV(a), Value::BoxV(b)) => Arc::ptr_eq(a, b),
            (Value::HashTable(a), Value::HashTable(b)) => Arc::ptr_eq(a, b),
            (Value::ContinuationMarkKey(a), Value::ContinuationMarkKey(b)) => Arc::ptr_eq(a, b),
            (Value::Struct(a), Value::Struct(b)) => Arc::ptr_eq(a, b),
            (Value::StructType(a), Value::StructType(b)) => Arc::ptr_eq(a, b),
            (Value::PropertyDescriptor(a), Value::PropertyDescriptor(b)) => Arc::ptr_eq(a, b),
            (Value::Wrapped(a), Value::Wrapped(b)) => Arc::ptr_eq(a, b),
            // Bignum/Flonum/Complex are boxed but not interned: eq? on two
            // freshly computed numbers of the same value is unspecified in
            // Scheme and conventionally false unless they're the same
            // allocation, which the core has no way to observe here.
            _ => false,
        }
    }

    /// `eqv?` — like `eq?`, but numbers and compare by value within the
    /// same exactness (§4.5's "numeric ... equality for numbers").
    pub fn eqv(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bignum(a), Value::Bignum(b)) => a == b,
            (Value::Flonum(a), Value::Flonum(b)) => a.to_bits() == b.to_bits(),
            (Value::Complex(a1, b1), Value::Complex(a2, b2)) => a1.eqv(a2) && b1.eqv(b2),
            _ => self.eq_identity(other),
        }
    }

    /// `equal?` — full structural equality.
    pub fn equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Cons(a), Value::Cons(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.read().unwrap();
                let b = b.read().unwrap();
                a.car.equal(&b.car) && a.cdr.equal(&b.cdr)
            }
            (Value::Vector(a), Value::Vector(b)) => {
                if Arc::ptr_eq(a, b) {
                    return true;
                }
                let a = a.items.read().unwrap();
                let b = b.items.read().unwrap();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equal(y))
            }
            (Value::BoxV(a), Value::BoxV(b)) => {
                Arc::ptr_eq(a, b) || a.value.read().unwrap().equal(&b.value.read().unwrap())
            }
            (Value::Struct(a), Value::Struct(b)) => a.structurally_equal(b),
            (Value::Fixnum(_) | Value::Bignum(_) | Value::Flonum(_) | Value::Complex(..), _) => {
                crate::numeric::numeric_equal(self, other)
            }
            _ => self.eqv(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Fixnum(n) => write!(f, "{}", n),
            Value::Bignum(n) => write!(f, "{}", n),
            Value::Flonum(n) => write!(f, "{}", n),
            Value::Complex(re, im) => write!(f, "{:?}+{:?}i", re, im),
            Value::Bool(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Symbol(idx) => write!(f, "{}", crate::interner::resolve(*idx).unwrap_or_default()),
            Value::Cons(_) => write!(f, "(...)"),
            Value::Null => write!(f, "()"),
            Value::Void => write!(f, "#<void>"),
            Value::Procedure(p) => write!(f, "#<procedure:{}>", p.name.as_deref().unwrap_or("anonymous")),
            Value::Vector(_) => write!(f, "#(...)"),
            Value::BoxV(_) => write!(f, "#<box>"),
            Value::HashTable(_) => write!(f, "#<hash-table>"),
            Value::ContinuationMarkKey(_) => write!(f, "#<continuation-mark-key>"),
            Value::Struct(s) => write!(f, "#<struct:{}>", s.struct_type.name),
            Value::StructType(t) => write!(f, "#<struct-type:{}>", t.name),
            Value::PropertyDescriptor(p) => write!(f, "#<struct-type-property:{}>", p.name),
            Value::Wrapped(w) => write!(f, "#<{}:{:?}>", w.kind.type_name(), w.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixnums_are_eq_by_value() {
        assert!(Value::Fixnum(5).eq_identity(&Value::Fixnum(5)));
        assert!(!Value::Fixnum(5).eq_identity(&Value::Fixnum(6)));
    }

    #[test]
    fn fresh_vectors_are_not_eq_even_with_equal_contents() {
        let a = Value::vector(vec![Value::Fixnum(1)]);
        let b = Value::vector(vec![Value::Fixnum(1)]);
        assert!(!a.eq_identity(&b));
        assert!(a.equal(&b));
    }

    #[test]
    fn complex_rejects_nested_complex() {
        let inner = Value::complex(Value::Fixnum(1), Value::Fixnum(2)).unwrap();
        let err = Value::complex(inner, Value::Fixnum(0));
        assert!(err.is_err());
    }

    #[test]
    fn everything_but_false_is_truthy() {
        assert!(Value::Fixnum(0).is_truthy());
        assert!(Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
    }

    #[test]
    fn cons_equal_is_structural_not_identity() {
        let a = Value::cons(Value::Fixnum(1), Value::Null);
        let b = Value::cons(Value::Fixnum(1), Value::Null);
        assert!(!a.eq_identity(&b));
        assert!(a.equal(&b));
    }
}
