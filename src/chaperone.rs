/// Chaperones and impersonators (C4): wrappers that interpose on
/// procedures, vectors, boxes, hashes, structs, and continuation-mark keys.
///
/// A chaperone constrains its handlers' results to be `chaperone-of?` the
/// original (the evaluator enforces that; this module only records
/// `is_chaperone` on construction and refuses to wrap an immutable base
/// value with an impersonator). Construction-time argument parsing mirrors
/// the surrounding toolchain's `impersonator.py` `unpack_*` helpers: scan
/// the trailing arguments for the first `PropertyDescriptor`, everything
/// before it is kind-specific handlers, everything from it on is an even
/// key/value property list.

use crate::errors::{ChaperoneError, CoreError, StructError};
use crate::step::{ChaperoneOp, Resumption, Step};
use crate::struct_type::StructType;
use crate::value::{ProcedureKind, ProcedureValue, PropertyDescriptor, Value};
use once_cell::sync::Lazy;
use std::sync::Arc;

#[derive(Debug)]
pub struct Wrapper {
    pub inner: Value,
    pub is_chaperone: bool,
    pub kind: WrapperKind,
    pub props: Vec<(Arc<PropertyDescriptor>, Value)>,
}

/// Which struct field a `Struct` wrapper's handler overrides. Matched by
/// `(declared_type, field_index)` rather than by the accessor/mutator
/// procedure's own identity, since a fresh `FieldAccessor`/`FieldMutator`
/// procedure can be minted for the same field more than once (§4.3).
#[derive(Debug, Clone)]
pub enum StructOverride {
    Accessor { declared_type: Arc<StructType>, field_index: usize },
    Mutator { declared_type: Arc<StructType>, field_index: usize },
}

impl StructOverride {
    fn matches_accessor(&self, ty: &Arc<StructType>, idx: usize) -> bool {
        matches!(self, StructOverride::Accessor { declared_type, field_index }
            if Arc::ptr_eq(declared_type, ty) && *field_index == idx)
    }

    fn matches_mutator(&self, ty: &Arc<StructType>, idx: usize) -> bool {
        matches!(self, StructOverride::Mutator { declared_type, field_index }
            if Arc::ptr_eq(declared_type, ty) && *field_index == idx)
    }
}

#[derive(Debug)]
pub enum WrapperKind {
    Procedure { check: Value },
    Vector { get: Value, set: Value },
    Box { get: Value, set: Value },
    Hash { get: Value, set: Value, remove: Value, key: Value, clear: Option<Value> },
    Struct { overrides: Vec<(StructOverride, Value)> },
    ContinuationMarkKey { get: Value, set: Value },
}

impl WrapperKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            WrapperKind::Procedure { .. } => "procedure",
            WrapperKind::Vector { .. } => "vector",
            WrapperKind::Box { .. } => "box",
            WrapperKind::Hash { .. } => "hash-table",
            WrapperKind::Struct { .. } => "struct",
            WrapperKind::ContinuationMarkKey { .. } => "continuation-mark-key",
        }
    }
}

// ---------------------------------------------------------------------------
// Predicates & base-object access (§4.4, §7)
// ---------------------------------------------------------------------------

pub fn is_impersonator(v: &Value) -> bool {
    matches!(v, Value::Wrapped(_))
}

/// True for any chaperone wrapper, and trivially true for an unwrapped
/// value (an unwrapped value chaperones itself — see `chaperone_of`).
pub fn is_chaperone(v: &Value) -> bool {
    match v {
        Value::Wrapped(w) => w.is_chaperone,
        _ => true,
    }
}

pub fn get_base_object(v: &Value) -> Value {
    v.unwrap_base().clone()
}

pub fn is_callable(v: &Value) -> bool {
    match v {
        Value::Procedure(_) => true,
        Value::Wrapped(w) => matches!(w.kind, WrapperKind::Procedure { .. }),
        _ => false,
    }
}

/// `chaperone-of?`: `a` is `b`, or `a` is a chain of chaperones (never
/// impersonators) bottoming out at `b`.
pub fn chaperone_of(a: &Value, b: &Value) -> bool {
    let mut cur = a;
    loop {
        if cur.eq_identity(b) {
            return true;
        }
        match cur {
            Value::Wrapped(w) if w.is_chaperone => cur = &w.inner,
            _ => return false,
        }
    }
}

/// `impersonator-of?`: like `chaperone-of?` but any wrapper kind counts.
pub fn impersonator_of(a: &Value, b: &Value) -> bool {
    let mut cur = a;
    loop {
        if cur.eq_identity(b) {
            return true;
        }
        match cur {
            Value::Wrapped(w) => cur = &w.inner,
            _ => return false,
        }
    }
}

// ---------------------------------------------------------------------------
// Impersonator properties (§3, §7's `impersonator-prop:application-mark`)
// ---------------------------------------------------------------------------

pub fn make_impersonator_property(name: impl Into<String>) -> Arc<PropertyDescriptor> {
    PropertyDescriptor::new(name)
}

/// `(make-impersonator-property name)`: the full spec-level constructor,
/// returning the descriptor alongside a predicate and an accessor procedure
/// the evaluator dispatches via `ProcedureKind::ImpersonatorPropPredicate`/
/// `ImpersonatorPropAccessor` (§3's "returns a triple").
pub fn make_impersonator_property_triple(name: impl Into<String>) -> (Arc<PropertyDescriptor>, Value, Value) {
    let descriptor = PropertyDescriptor::new(name);
    let predicate = Value::Procedure(ProcedureValue::of_kind(
        Some(format!("{}?", descriptor.name)),
        ProcedureKind::ImpersonatorPropPredicate { descriptor: Arc::clone(&descriptor) },
    ));
    let accessor = Value::Procedure(ProcedureValue::of_kind(
        Some(format!("{}-accessor", descriptor.name)),
        ProcedureKind::ImpersonatorPropAccessor { descriptor: Arc::clone(&descriptor) },
    ));
    (descriptor, predicate, accessor)
}

pub fn impersonator_property_ref(v: &Value, descriptor: &Arc<PropertyDescriptor>) -> Option<Value> {
    match v {
        Value::Wrapped(w) => w
            .props
            .iter()
            .find(|(d, _)| Arc::ptr_eq(d, descriptor))
            .map(|(_, val)| val.clone())
            .or_else(|| impersonator_property_ref(&w.inner, descriptor)),
        _ => None,
    }
}

pub fn has_impersonator_property(v: &Value, descriptor: &Arc<PropertyDescriptor>) -> bool {
    impersonator_property_ref(v, descriptor).is_some()
}

/// A built-in property an impersonated procedure's handler can attach a
/// continuation-mark value to, applied automatically around the call by
/// the evaluator (SPEC_FULL §7's supplemented feature).
pub static APPLICATION_MARK_PROPERTY: Lazy<Arc<PropertyDescriptor>> =
    Lazy::new(|| PropertyDescriptor::new("impersonator-prop:application-mark"));

// ---------------------------------------------------------------------------
// Property-list / handler argument splitting (grounded in impersonator.py's
// unpack_* functions: scan for the first PropertyDescriptor, everything
// before it is handlers, everything from it on is key/value pairs)
// ---------------------------------------------------------------------------

fn split_off_properties(args: Vec<Value>) -> Result<(Vec<Value>, Vec<(Arc<PropertyDescriptor>, Value)>), CoreError> {
    let split_at = args.iter().position(|v| matches!(v, Value::PropertyDescriptor(_)));
    match split_at {
        None => Ok((args, Vec::new())),
        Some(idx) => {
            let handlers = args[..idx].to_vec();
            let tail = &args[idx..];
            if tail.len() % 2 != 0 {
                return Err(CoreError::Chaperone(ChaperoneError::InvalidPropertyList));
            }
            let mut props = Vec::with_capacity(tail.len() / 2);
            for pair in tail.chunks(2) {
                match &pair[0] {
                    Value::PropertyDescriptor(d) => props.push((Arc::clone(d), pair[1].clone())),
                    _ => return Err(CoreError::Chaperone(ChaperoneError::InvalidPropertyList)),
                }
            }
            Ok((handlers, props))
        }
    }
}

fn contract_violation(expected: &str, found: &Value) -> CoreError {
    CoreError::Struct(StructError::ContractViolation { expected: expected.to_string(), found: found.type_name().to_string() })
}

fn require_callable(v: &Value) -> Result<(), CoreError> {
    if is_callable(v) {
        Ok(())
    } else {
        Err(CoreError::Chaperone(ChaperoneError::NotCallable))
    }
}

// ---------------------------------------------------------------------------
// Construction — one `make_*_wrapper` per interposable kind (§4.4)
// ---------------------------------------------------------------------------

pub fn make_procedure_wrapper(inner: Value, args: Vec<Value>, is_chaperone: bool) -> Result<Value, CoreError> {
    if !is_callable(&inner) {
        return Err(contract_violation("a procedure", &inner));
    }
    let (mut rest, props) = split_off_properties(args)?;
    if rest.len() != 1 {
        return Err(CoreError::Chaperone(ChaperoneError::ArityMismatch { expected: "a single check handler".to_string(), found: rest.len() }));
    }
    let check = rest.remove(0);
    require_callable(&check)?;
    Ok(Value::Wrapped(Arc::new(Wrapper { inner, is_chaperone, kind: WrapperKind::Procedure { check }, props })))
}

pub fn make_vector_wrapper(inner: Value, args: Vec<Value>, is_chaperone: bool) -> Result<Value, CoreError> {
    let data = match inner.unwrap_base() {
        Value::Vector(d) => Arc::clone(d),
        other => return Err(contract_violation("a vector", other)),
    };
    if !is_chaperone && data.immutable {
        return Err(CoreError::Chaperone(ChaperoneError::CannotImpersonateImmutable));
    }
    let (mut rest, props) = split_off_properties(args)?;
    if rest.len() != 2 {
        return Err(CoreError::Chaperone(ChaperoneError::ArityMismatch { expected: "ref and set handlers".to_string(), found: rest.len() }));
    }
    let set = rest.pop().unwrap();
    let get = rest.pop().unwrap();
    require_callable(&get)?;
    require_callable(&set)?;
    Ok(Value::Wrapped(Arc::new(Wrapper { inner, is_chaperone, kind: WrapperKind::Vector { get, set }, props })))
}

pub fn make_box_wrapper(inner: Value, args: Vec<Value>, is_chaperone: bool) -> Result<Value, CoreError> {
    let data = match inner.unwrap_base() {
        Value::BoxV(d) => Arc::clone(d),
        other => return Err(contract_violation("a box", other)),
    };
    if !is_chaperone && data.immutable {
        return Err(CoreError::Chaperone(ChaperoneError::CannotImpersonateImmutable));
    }
    let (mut rest, props) = split_off_properties(args)?;
    if rest.len() != 2 {
        return Err(CoreError::Chaperone(ChaperoneError::ArityMismatch { expected: "unbox and set-box! handlers".to_string(), found: rest.len() }));
    }
    let set = rest.pop().unwrap();
    let get = rest.pop().unwrap();
    require_callable(&get)?;
    require_callable(&set)?;
    Ok(Value::Wrapped(Arc::new(Wrapper { inner, is_chaperone, kind: WrapperKind::Box { get, set }, props })))
}

pub fn make_hash_wrapper(inner: Value, args: Vec<Value>, is_chaperone: bool) -> Result<Value, CoreError> {
    match inner.unwrap_base() {
        Value::HashTable(_) => {}
        other => return Err(contract_violation("a hash table", other)),
    }
    let (mut rest, props) = split_off_properties(args)?;
    let clear = match rest.len() {
        5 => Some(rest.pop().unwrap()),
        4 => None,
        n => return Err(CoreError::Chaperone(ChaperoneError::ArityMismatch { expected: "ref, set, remove, key and an optional clear handler".to_string(), found: n })),
    };
    let key = rest.pop().unwrap();
    let remove = rest.pop().unwrap();
    let set = rest.pop().unwrap();
    let get = rest.pop().unwrap();
    for h in [&get, &set, &remove, &key] {
        require_callable(h)?;
    }
    if let Some(ref c) = clear {
        require_callable(c)?;
    }
    Ok(Value::Wrapped(Arc::new(Wrapper { inner, is_chaperone, kind: WrapperKind::Hash { get, set, remove, key, clear }, props })))
}

pub fn make_continuation_mark_key_wrapper(inner: Value, args: Vec<Value>, is_chaperone: bool) -> Result<Value, CoreError> {
    match inner.unwrap_base() {
        Value::ContinuationMarkKey(_) => {}
        other => return Err(contract_violation("a continuation-mark key", other)),
    }
    let (mut rest, props) = split_off_properties(args)?;
    if rest.len() != 2 {
        return Err(CoreError::Chaperone(ChaperoneError::ArityMismatch { expected: "get and set handlers".to_string(), found: rest.len() }));
    }
    let set = rest.pop().unwrap();
    let get = rest.pop().unwrap();
    require_callable(&get)?;
    require_callable(&set)?;
    Ok(Value::Wrapped(Arc::new(Wrapper { inner, is_chaperone, kind: WrapperKind::ContinuationMarkKey { get, set }, props })))
}

fn parse_struct_override(ov: &Value, family: &Arc<StructType>) -> Result<StructOverride, CoreError> {
    let p = match ov {
        Value::Procedure(p) => p,
        _ => return Err(CoreError::Chaperone(ChaperoneError::InvalidOverride { detail: "override must be a field accessor or mutator procedure".to_string() })),
    };
    match &p.kind {
        ProcedureKind::FieldAccessor { declared_type, field_index } => {
            check_family(declared_type, family)?;
            Ok(StructOverride::Accessor { declared_type: Arc::clone(declared_type), field_index: *field_index })
        }
        ProcedureKind::FieldMutator { declared_type, field_index } => {
            check_family(declared_type, family)?;
            Ok(StructOverride::Mutator { declared_type: Arc::clone(declared_type), field_index: *field_index })
        }
        _ => Err(CoreError::Chaperone(ChaperoneError::InvalidOverride { detail: "not a struct field accessor or mutator".to_string() })),
    }
}

fn check_family(declared_type: &Arc<StructType>, family: &Arc<StructType>) -> Result<(), CoreError> {
    if declared_type.is_subtype_of(family) || family.is_subtype_of(declared_type) {
        Ok(())
    } else {
        Err(CoreError::Chaperone(ChaperoneError::InvalidOverride {
            detail: format!("'{}' is not in the same struct type family as '{}'", declared_type.name, family.name),
        }))
    }
}

/// `chaperone-struct`/`impersonate-struct`: the base struct, followed by
/// `field-accessor-or-mutator handler` pairs, followed by an optional
/// property list (§4.4 step 3). An impersonator may not override an
/// immutable field (it would let a reader bypass `ImmutableFieldMutation`).
pub fn make_struct_wrapper(args: Vec<Value>, is_chaperone: bool) -> Result<Value, CoreError> {
    let (rest, props) = split_off_properties(args)?;
    if rest.is_empty() || rest.len() % 2 == 0 {
        return Err(CoreError::Chaperone(ChaperoneError::ArityMismatch { expected: "a struct followed by override/handler pairs".to_string(), found: rest.len() }));
    }
    let mut it = rest.into_iter();
    let base = it.next().unwrap();
    let family = match base.unwrap_base() {
        Value::Struct(inst) => Arc::clone(&inst.struct_type),
        other => return Err(contract_violation("a struct", other)),
    };
    let mut overrides = Vec::new();
    loop {
        let (ov, handler) = match (it.next(), it.next()) {
            (Some(ov), Some(handler)) => (ov, handler),
            (None, None) => break,
            _ => unreachable!("arity was checked to be odd above"),
        };
        let parsed = parse_struct_override(&ov, &family)?;
        if !is_chaperone {
            let (declared_type, field_index) = match &parsed {
                StructOverride::Accessor { declared_type, field_index } => (declared_type, *field_index),
                StructOverride::Mutator { declared_type, field_index } => (declared_type, *field_index),
            };
            if declared_type.immutables.contains(&field_index) {
                return Err(CoreError::Chaperone(ChaperoneError::CannotImpersonateImmutable));
            }
        }
        require_callable(&handler)?;
        overrides.push((parsed, handler));
    }
    Ok(Value::Wrapped(Arc::new(Wrapper { inner: base, is_chaperone, kind: WrapperKind::Struct { overrides }, props })))
}

// ---------------------------------------------------------------------------
// Interposed operations — each returns a `Step`; a non-recursive outer-to-
// inner walk finds the outermost wrapper whose handler applies, matching
// `unwrap_base`'s walk (Design Notes §9).
// ---------------------------------------------------------------------------

fn find_procedure_check(v: &Value) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::Procedure { check } = &w.kind {
            return Some((w.inner.clone(), check.clone()));
        }
        cur = &w.inner;
    }
    None
}

/// `procedure-arity`-unchanged application through a chaperone/impersonator
/// chain: the outermost `check` handler receives the wrapped procedure
/// itself plus the call arguments, and its result is the actual arguments
/// applied to the base procedure (§4.4's Procedure row).
pub fn procedure_apply(v: &Value, args: Vec<Value>) -> Step {
    match find_procedure_check(v) {
        Some((_, check)) => {
            let mut handler_args = vec![v.clone()];
            handler_args.extend(args);
            Step::apply(check, handler_args, Resumption::ChaperoneHandler { op: ChaperoneOp::ProcedureApply })
        }
        None => Step::apply(v.unwrap_base().clone(), args, Resumption::ChaperoneHandler { op: ChaperoneOp::ProcedureApply }),
    }
}

fn find_vector_get(v: &Value) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::Vector { get, .. } = &w.kind {
            return Some((w.inner.clone(), get.clone()));
        }
        cur = &w.inner;
    }
    None
}

fn find_vector_set(v: &Value) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::Vector { set, .. } = &w.kind {
            return Some((w.inner.clone(), set.clone()));
        }
        cur = &w.inner;
    }
    None
}

/// `vector-ref` through a wrapper chain: the raw value is read off the base
/// vector, then the outermost `get` handler (if any) post-processes it,
/// receiving `(wrapper-or-vector, index, raw-value)` (§4.4).
pub fn vector_ref(v: &Value, index: usize) -> Result<Step, CoreError> {
    let data = match v.unwrap_base() {
        Value::Vector(d) => Arc::clone(d),
        other => return Err(contract_violation("a vector", other)),
    };
    let raw = {
        let items = data.items.read().unwrap();
        items.get(index).cloned().ok_or_else(|| {
            CoreError::Struct(StructError::ContractViolation { expected: format!("an index below {}", items.len()), found: format!("index {}", index) })
        })?
    };
    match find_vector_get(v) {
        Some((w, get)) => Ok(Step::apply(get, vec![w, Value::Fixnum(index as i64), raw], Resumption::ChaperoneHandler { op: ChaperoneOp::VectorRef })),
        None => Ok(Step::done(raw)),
    }
}

/// `vector-set!` through a wrapper chain: the outermost `set` handler runs
/// first and its result is what actually gets written (§4.4). Call
/// `finish_vector_set` with that result once the evaluator has it.
pub fn vector_set(v: &Value, index: usize, new_val: Value) -> Result<Step, CoreError> {
    let data = match v.unwrap_base() {
        Value::Vector(d) => Arc::clone(d),
        other => return Err(contract_violation("a vector", other)),
    };
    if data.immutable {
        return Err(contract_violation("a mutable vector", v));
    }
    if index >= data.items.read().unwrap().len() {
        return Err(CoreError::Struct(StructError::ContractViolation { expected: "an in-range vector index".to_string(), found: format!("index {}", index) }));
    }
    match find_vector_set(v) {
        Some((w, set)) => Ok(Step::apply(set, vec![w, Value::Fixnum(index as i64), new_val], Resumption::ChaperoneHandler { op: ChaperoneOp::VectorSet })),
        None => {
            data.items.write().unwrap()[index] = new_val;
            Ok(Step::done(Value::Void))
        }
    }
}

pub fn finish_vector_set(v: &Value, index: usize, handler_result: Value) -> Result<(), CoreError> {
    match v.unwrap_base() {
        Value::Vector(d) => {
            d.items.write().unwrap()[index] = handler_result;
            Ok(())
        }
        other => Err(contract_violation("a vector", other)),
    }
}

fn find_box_get(v: &Value) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::Box { get, .. } = &w.kind {
            return Some((w.inner.clone(), get.clone()));
        }
        cur = &w.inner;
    }
    None
}

fn find_box_set(v: &Value) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::Box { set, .. } = &w.kind {
            return Some((w.inner.clone(), set.clone()));
        }
        cur = &w.inner;
    }
    None
}

pub fn unbox(v: &Value) -> Result<Step, CoreError> {
    let data = match v.unwrap_base() {
        Value::BoxV(d) => Arc::clone(d),
        other => return Err(contract_violation("a box", other)),
    };
    let raw = data.value.read().unwrap().clone();
    match find_box_get(v) {
        Some((w, get)) => Ok(Step::apply(get, vec![w, raw], Resumption::ChaperoneHandler { op: ChaperoneOp::BoxUnbox })),
        None => Ok(Step::done(raw)),
    }
}

pub fn set_box(v: &Value, new_val: Value) -> Result<Step, CoreError> {
    let data = match v.unwrap_base() {
        Value::BoxV(d) => Arc::clone(d),
        other => return Err(contract_violation("a box", other)),
    };
    if data.immutable {
        return Err(contract_violation("a mutable box", v));
    }
    match find_box_set(v) {
        Some((w, set)) => Ok(Step::apply(set, vec![w, new_val], Resumption::ChaperoneHandler { op: ChaperoneOp::BoxSet })),
        None => {
            *data.value.write().unwrap() = new_val;
            Ok(Step::done(Value::Void))
        }
    }
}

pub fn finish_set_box(v: &Value, handler_result: Value) -> Result<(), CoreError> {
    match v.unwrap_base() {
        Value::BoxV(d) => {
            *d.value.write().unwrap() = handler_result;
            Ok(())
        }
        other => Err(contract_violation("a box", other)),
    }
}

fn find_struct_override(v: &Value, pred: impl Fn(&StructOverride) -> bool) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::Struct { overrides } = &w.kind {
            if let Some((_, handler)) = overrides.iter().find(|(ov, _)| pred(ov)) {
                return Some((w.inner.clone(), handler.clone()));
            }
        }
        cur = &w.inner;
    }
    None
}

/// A struct field read through a wrapper chain: the physical read happens
/// first (via `accessor.call`, which already unwraps the chain itself),
/// then the outermost wrapper with a matching override post-processes the
/// result, receiving `(wrapper-inner, raw-value)` (§4.4's Struct row).
pub fn struct_field_access(v: &Value, accessor: &crate::struct_instance::FieldAccessor) -> Result<Step, StructError> {
    let raw = accessor.call(v)?;
    match find_struct_override(v, |ov| ov.matches_accessor(&accessor.declared_type, accessor.field_index)) {
        Some((w, handler)) => Ok(Step::apply(handler, vec![w, raw], Resumption::ChaperoneHandler { op: ChaperoneOp::StructAccess })),
        None => Ok(Step::done(raw)),
    }
}

/// A struct field write through a wrapper chain: the outermost wrapper
/// with a matching override runs first, and its result is what actually
/// gets written via `finish_struct_mutate`.
pub fn struct_field_mutate(v: &Value, mutator: &crate::struct_instance::FieldMutator, new_val: Value) -> Result<Step, StructError> {
    match find_struct_override(v, |ov| ov.matches_mutator(&mutator.declared_type, mutator.field_index)) {
        Some((w, handler)) => Ok(Step::apply(handler, vec![w, new_val], Resumption::ChaperoneHandler { op: ChaperoneOp::StructMutate })),
        None => {
            mutator.call(v, new_val)?;
            Ok(Step::done(Value::Void))
        }
    }
}

pub fn finish_struct_mutate(v: &Value, mutator: &crate::struct_instance::FieldMutator, handler_result: Value) -> Result<(), StructError> {
    mutator.call(v, handler_result)
}

fn find_cmk_get(v: &Value) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::ContinuationMarkKey { get, .. } = &w.kind {
            return Some((w.inner.clone(), get.clone()));
        }
        cur = &w.inner;
    }
    None
}

fn find_cmk_set(v: &Value) -> Option<(Value, Value)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if let WrapperKind::ContinuationMarkKey { set, .. } = &w.kind {
            return Some((w.inner.clone(), set.clone()));
        }
        cur = &w.inner;
    }
    None
}

/// `continuation-mark-set-first`/`with-continuation-mark` read through a
/// wrapped key: the raw mark value is post-processed by the outermost
/// `get` handler, receiving `(wrapper-or-key, raw-value)`.
pub fn mark_get(v: &Value, raw: Value) -> Step {
    match find_cmk_get(v) {
        Some((w, get)) => Step::apply(get, vec![w, raw], Resumption::ChaperoneHandler { op: ChaperoneOp::MarkGet }),
        None => Step::done(raw),
    }
}

/// `with-continuation-mark` write through a wrapped key: the outermost
/// `set` handler transforms the value before it's installed.
pub fn mark_set(v: &Value, value: Value) -> Step {
    match find_cmk_set(v) {
        Some((w, set)) => Step::apply(set, vec![w, value], Resumption::ChaperoneHandler { op: ChaperoneOp::MarkSet }),
        None => Step::done(value),
    }
}

/// Applies the predicate/accessor half of a `make-impersonator-property`
/// triple directly, without going through the evaluator's general call
/// dispatch — used when the caller already knows it's holding one of these
/// procedures (SPEC_FULL §7's supplemented feature).
pub fn apply_impersonator_prop_procedure(kind: &ProcedureKind, v: &Value) -> Option<Value> {
    match kind {
        ProcedureKind::ImpersonatorPropPredicate { descriptor } => Some(Value::Bool(has_impersonator_property(v, descriptor))),
        ProcedureKind::ImpersonatorPropAccessor { descriptor } => impersonator_property_ref(v, descriptor),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::struct_type::{make_struct_type_unguarded, StructTypeParams};

    fn proc(name: &str) -> Value {
        Value::Procedure(crate::value::ProcedureValue::named(name))
    }

    #[test]
    fn wrapping_an_immutable_vector_as_an_impersonator_fails() {
        let v = Value::immutable_vector(vec![Value::Fixnum(1)]);
        let err = make_vector_wrapper(v, vec![proc("get"), proc("set")], false).unwrap_err();
        assert!(matches!(err, CoreError::Chaperone(ChaperoneError::CannotImpersonateImmutable)));
    }

    #[test]
    fn chaperoning_an_immutable_vector_is_allowed() {
        let v = Value::immutable_vector(vec![Value::Fixnum(1)]);
        let wrapped = make_vector_wrapper(v, vec![proc("get"), proc("set")], true).unwrap();
        assert!(is_impersonator(&wrapped));
        assert!(is_chaperone(&wrapped));
    }

    #[test]
    fn a_non_callable_handler_is_rejected() {
        let v = Value::vector(vec![Value::Fixnum(1)]);
        let err = make_vector_wrapper(v, vec![Value::Fixnum(0), proc("set")], false).unwrap_err();
        assert!(matches!(err, CoreError::Chaperone(ChaperoneError::NotCallable)));
    }

    #[test]
    fn vector_ref_with_no_handler_returns_done() {
        let v = Value::vector(vec![Value::Fixnum(42)]);
        let step = vector_ref(&v, 0).unwrap();
        assert!(matches!(step.into_done(), Some(Value::Fixnum(42))));
    }

    #[test]
    fn vector_ref_with_a_handler_suspends() {
        let v = Value::vector(vec![Value::Fixnum(42)]);
        let wrapped = make_vector_wrapper(v, vec![proc("get"), proc("set")], false).unwrap();
        let step = vector_ref(&wrapped, 0).unwrap();
        assert!(step.into_done().is_none());
    }

    #[test]
    fn chaperone_of_walks_only_chaperones() {
        let base = Value::vector(vec![Value::Fixnum(1)]);
        let chaperoned = make_vector_wrapper(base.clone(), vec![proc("get"), proc("set")], true).unwrap();
        assert!(chaperone_of(&chaperoned, &base));
        assert!(impersonator_of(&chaperoned, &base));
    }

    #[test]
    fn impersonator_of_but_not_chaperone_of() {
        let base = Value::vector(vec![Value::Fixnum(1)]);
        let impersonated = make_vector_wrapper(base.clone(), vec![proc("get"), proc("set")], false).unwrap();
        assert!(!chaperone_of(&impersonated, &base));
        assert!(impersonator_of(&impersonated, &base));
    }

    #[test]
    fn a_struct_override_must_belong_to_the_wrapped_type_family() {
        let a = make_struct_type_unguarded(StructTypeParams::new("a", 1)).unwrap();
        let b = make_struct_type_unguarded(StructTypeParams::new("b", 1)).unwrap();
        let inst = match crate::struct_instance::construct(&a, vec![Value::Fixnum(1)]).unwrap() {
            crate::struct_instance::ConstructOutcome::Done(i) => i,
            _ => panic!("unexpected guard"),
        };
        let accessor = crate::struct_instance::FieldAccessor { declared_type: b, field_index: 0, name: None };
        let err = make_struct_wrapper(vec![Value::Struct(inst), Value::Procedure(accessor.as_procedure()), proc("h")], false).unwrap_err();
        assert!(matches!(err, CoreError::Chaperone(ChaperoneError::InvalidOverride { .. })));
    }

    #[test]
    fn an_impersonator_cannot_override_an_immutable_field() {
        let mut params = StructTypeParams::new("point", 1);
        params.immutables.insert(0);
        let ty = make_struct_type_unguarded(params).unwrap();
        let inst = match crate::struct_instance::construct(&ty, vec![Value::Fixnum(1)]).unwrap() {
            crate::struct_instance::ConstructOutcome::Done(i) => i,
            _ => panic!("unexpected guard"),
        };
        let mutator = crate::struct_instance::FieldMutator { declared_type: Arc::clone(&ty), field_index: 0, name: None };
        let err = make_struct_wrapper(vec![Value::Struct(inst), Value::Procedure(mutator.as_procedure()), proc("h")], false).unwrap_err();
        assert!(matches!(err, CoreError::Chaperone(ChaperoneError::CannotImpersonateImmutable)));
    }

    #[test]
    fn split_off_properties_separates_handlers_from_props() {
        let descriptor = make_impersonator_property("flavor");
        let (handlers, props) = split_off_properties(vec![
            proc("get"),
            proc("set"),
            Value::PropertyDescriptor(Arc::clone(&descriptor)),
            Value::Symbol(7),
        ])
        .unwrap();
        assert_eq!(handlers.len(), 2);
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn impersonator_property_triple_predicate_and_accessor_agree_with_has_and_ref() {
        let (descriptor, predicate, accessor) = make_impersonator_property_triple("flavor");
        let vec_val = Value::vector(vec![Value::Fixnum(1)]);
        let wrapped = make_vector_wrapper(vec_val.clone(), vec![proc("get"), proc("set"), Value::PropertyDescriptor(Arc::clone(&descriptor)), Value::Symbol(99)], true).unwrap();

        let predicate_kind = match &predicate {
            Value::Procedure(p) => p.kind.clone(),
            _ => panic!("expected a procedure"),
        };
        let accessor_kind = match &accessor {
            Value::Procedure(p) => p.kind.clone(),
            _ => panic!("expected a procedure"),
        };

        assert!(matches!(apply_impersonator_prop_procedure(&predicate_kind, &wrapped), Some(Value::Bool(true))));
        assert!(matches!(apply_impersonator_prop_procedure(&predicate_kind, &vec_val), Some(Value::Bool(false))));
        assert!(matches!(apply_impersonator_prop_procedure(&accessor_kind, &wrapped), Some(Value::Symbol(99))));
    }
}
