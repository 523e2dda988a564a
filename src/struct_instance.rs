/// Struct instances & first-class accessors/mutators (C3).

use crate::errors::StructError;
use crate::inspector::current_inspector;
use crate::struct_type::{intern_prefab_type, make_struct_type_unguarded, prefab_key_to_struct_type, PrefabKey, StructType, StructTypeParams};
use crate::value::{ProcedureKind, ProcedureValue, Value};
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct StructInstance {
    pub struct_type: Arc<StructType>,
    pub fields: RwLock<Vec<Value>>,
}

impl StructInstance {
    pub fn structurally_equal(&self, other: &StructInstance) -> bool {
        if !Arc::ptr_eq(&self.struct_type, &other.struct_type) {
            return false;
        }
        let a = self.fields.read().unwrap();
        let b = other.fields.read().unwrap();
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equal(y))
    }
}

fn super_chain(ty: &Arc<StructType>) -> Vec<Arc<StructType>> {
    let mut chain = Vec::new();
    let mut cur = Some(Arc::clone(ty));
    while let Some(t) = cur {
        let next = t.super_type.clone();
        chain.push(t);
        cur = next;
    }
    chain.reverse();
    chain
}

/// Construction state threaded across a chain of guard suspensions
/// (§4.2: "Guards chain super-to-sub").
pub struct PendingConstruction {
    chain: Vec<Arc<StructType>>,
    level: usize,
    accumulated: Vec<Value>,
    remaining_args: Vec<Value>,
}

pub enum ConstructOutcome {
    Done(Arc<StructInstance>),
    /// The caller must apply `guard` to `guard_args` and feed the result
    /// vector back through `resume_construct` along with `pending`.
    NeedsGuard { guard: Value, guard_args: Vec<Value>, pending: PendingConstruction },
}

/// `Constructor.call(args)` (§4.3): validates the combined init-field count
/// across the type and all its supers, then runs guards super-to-sub.
pub fn construct(ty: &Arc<StructType>, args: Vec<Value>) -> Result<ConstructOutcome, StructError> {
    let chain = super_chain(ty);
    let total_init: usize = chain.iter().map(|t| t.init_field_cnt).sum();
    if args.len() != total_init {
        return Err(StructError::ArityMismatch { expected: total_init, found: args.len() });
    }
    advance(PendingConstruction { chain, level: 0, accumulated: Vec::new(), remaining_args: args })
}

/// Feeds a guard's rewritten field vector back in. The constructor
/// re-validates the replacement length against the type's own
/// `init_field_cnt` before proceeding (SPEC_FULL §3).
pub fn resume_construct(mut pending: PendingConstruction, guard_result: Vec<Value>) -> Result<ConstructOutcome, StructError> {
    let level_ty = pending.chain[pending.level].clone();
    if guard_result.len() != level_ty.init_field_cnt {
        return Err(StructError::ArityMismatch { expected: level_ty.init_field_cnt, found: guard_result.len() });
    }
    pending.accumulated.extend(guard_result);
    for _ in 0..level_ty.auto_field_cnt {
        pending.accumulated.push(level_ty.auto_val.clone());
    }
    pending.level += 1;
    advance(pending)
}

fn advance(mut pending: PendingConstruction) -> Result<ConstructOutcome, StructError> {
    if pending.level == pending.chain.len() {
        let ty = pending.chain.last().cloned().expect("a struct type always has at least itself in its chain");
        return Ok(ConstructOutcome::Done(Arc::new(StructInstance { struct_type: ty, fields: RwLock::new(pending.accumulated) })));
    }
    let level_ty = pending.chain[pending.level].clone();
    let take = level_ty.init_field_cnt;
    let this_level_inits: Vec<Value> = pending.remaining_args.drain(0..take).collect();

    if let Some(guard) = level_ty.guard.clone() {
        let mut guard_args = this_level_inits;
        guard_args.push(Value::Symbol(crate::interner::intern(&level_ty.name)));
        return Ok(ConstructOutcome::NeedsGuard { guard, guard_args, pending });
    }

    pending.accumulated.extend(this_level_inits);
    for _ in 0..level_ty.auto_field_cnt {
        pending.accumulated.push(level_ty.auto_val.clone());
    }
    pending.level += 1;
    advance(pending)
}

fn require_instance_of(v: &Value, ty: &Arc<StructType>) -> Result<Arc<StructInstance>, StructError> {
    match v.unwrap_base() {
        Value::Struct(inst) if inst.struct_type.is_subtype_of(ty) => Ok(Arc::clone(inst)),
        other => Err(StructError::ContractViolation {
            expected: format!("a struct of type '{}' or a subtype", ty.name),
            found: other.type_name().to_string(),
        }),
    }
}

fn physical_offset(ty: &Arc<StructType>, field_index: usize) -> usize {
    ty.super_type.as_ref().map(|s| s.total_field_cnt).unwrap_or(0) + field_index
}

#[derive(Debug)]
pub struct FieldAccessor {
    pub declared_type: Arc<StructType>,
    pub field_index: usize,
    pub name: Option<String>,
}

impl FieldAccessor {
    /// Field index is interpreted within the declared type's own field
    /// block; the physical offset adds the super's total field count (§4.3).
    pub fn call(&self, v: &Value) -> Result<Value, StructError> {
        let inst = require_instance_of(v, &self.declared_type)?;
        let offset = physical_offset(&self.declared_type, self.field_index);
        Ok(inst.fields.read().unwrap()[offset].clone())
    }

    pub fn as_procedure(&self) -> Arc<ProcedureValue> {
        ProcedureValue::of_kind(
            self.name.clone(),
            ProcedureKind::FieldAccessor { declared_type: Arc::clone(&self.declared_type), field_index: self.field_index },
        )
    }
}

#[derive(Debug)]
pub struct FieldMutator {
    pub declared_type: Arc<StructType>,
    pub field_index: usize,
    pub name: Option<String>,
}

impl FieldMutator {
    pub fn call(&self, v: &Value, new_val: Value) -> Result<(), StructError> {
        let inst = require_instance_of(v, &self.declared_type)?;
        if self.declared_type.immutables.contains(&self.field_index) {
            return Err(StructError::ImmutableFieldMutation {
                field: self.field_index,
                type_name: self.declared_type.name.clone(),
            });
        }
        let offset = physical_offset(&self.declared_type, self.field_index);
        inst.fields.write().unwrap()[offset] = new_val;
        Ok(())
    }

    pub fn as_procedure(&self) -> Arc<ProcedureValue> {
        ProcedureValue::of_kind(
            self.name.clone(),
            ProcedureKind::FieldMutator { declared_type: Arc::clone(&self.declared_type), field_index: self.field_index },
        )
    }
}

pub fn struct_accessor_procedure(p: &ProcedureValue) -> bool {
    matches!(p.kind, ProcedureKind::FieldAccessor { .. })
}

pub fn struct_mutator_procedure(p: &ProcedureValue) -> bool {
    matches!(p.kind, ProcedureKind::FieldMutator { .. })
}

/// `struct->vector`: `(struct:<name> f0 f1 ...)` including super fields in
/// declaration order (§4.3).
pub fn struct_to_vector(s: &Arc<StructInstance>) -> Value {
    let mut items = vec![Value::Symbol(crate::interner::intern(&format!("struct:{}", s.struct_type.name)))];
    items.extend(s.fields.read().unwrap().iter().cloned());
    Value::vector(items)
}

pub fn struct_predicate(v: &Value, ty: &Arc<StructType>) -> bool {
    matches!(v.unwrap_base(), Value::Struct(inst) if inst.struct_type.is_subtype_of(ty))
}

// ---------------------------------------------------------------------------
// Unsafe struct ops — bypass chaperones and immutability (§6)
// ---------------------------------------------------------------------------

pub fn unsafe_struct_ref(v: &Value, index: usize) -> Option<Value> {
    match v.unwrap_base() {
        Value::Struct(inst) => inst.fields.read().unwrap().get(index).cloned(),
        _ => None,
    }
}

pub fn unsafe_struct_set(v: &Value, index: usize, new_val: Value) -> bool {
    match v.unwrap_base() {
        Value::Struct(inst) => {
            let mut fields = inst.fields.write().unwrap();
            if index < fields.len() {
                fields[index] = new_val;
                true
            } else {
                false
            }
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Prefab structs (`make-prefab-struct`, `prefab-struct-key`) and `struct-info`
// ---------------------------------------------------------------------------

/// `make-prefab-struct`: interns (or reuses) the struct type for `key`, then
/// constructs an instance directly — prefab types never carry a guard, so
/// there is no `NeedsGuard` suspension to thread through here
/// (`struct_structinfo.py`'s `W_Struct.make_prefab`).
pub fn make_prefab_struct(key: PrefabKey, vals: Vec<Value>) -> Result<Arc<StructInstance>, StructError> {
    let field_cnt = key.init_count + key.auto_count;
    let super_type = match &key.super_key {
        Some(sk) => Some(prefab_key_to_struct_type(sk).ok_or_else(|| StructError::ContractViolation {
            expected: "a previously-registered prefab super type".to_string(),
            found: "an unknown prefab key".to_string(),
        })?),
        None => None,
    };
    let mut params = StructTypeParams::new(key.name.clone(), key.init_count);
    params.auto_field_cnt = key.auto_count;
    params.super_type = super_type;
    params.is_prefab = true;
    params.immutables = (0..field_cnt).filter(|i| key.immutables_mask & (1u64 << i) != 0).collect();
    params.prefab_key = Some(key.clone());
    let ty = intern_prefab_type(key, || make_struct_type_unguarded(params))?;
    match construct(&ty, vals)? {
        ConstructOutcome::Done(inst) => Ok(inst),
        ConstructOutcome::NeedsGuard { .. } => unreachable!("prefab struct types never carry a guard"),
    }
}

/// `prefab-struct-key`: `None` (Racket's `#f`) unless the instance's type is
/// actually prefab.
pub fn prefab_struct_key(inst: &Arc<StructInstance>) -> Option<PrefabKey> {
    inst.struct_type.prefab_key.clone()
}

/// `struct-type-make-constructor`: a constructor procedure closed over
/// `ty`, dispatched via `apply_struct_constructor`.
pub fn struct_type_make_constructor(ty: &Arc<StructType>) -> Arc<ProcedureValue> {
    ProcedureValue::of_kind(Some(format!("make-{}", ty.name)), ProcedureKind::StructConstructor { declared_type: Arc::clone(ty) })
}

/// `struct-type-make-predicate`: a predicate procedure closed over `ty`,
/// dispatched via `apply_struct_predicate`.
pub fn struct_type_make_predicate(ty: &Arc<StructType>) -> Arc<ProcedureValue> {
    ProcedureValue::of_kind(Some(format!("{}?", ty.name)), ProcedureKind::StructPredicate { declared_type: Arc::clone(ty) })
}

pub fn apply_struct_constructor(kind: &ProcedureKind, args: Vec<Value>) -> Option<Result<ConstructOutcome, StructError>> {
    match kind {
        ProcedureKind::StructConstructor { declared_type } => Some(construct(declared_type, args)),
        _ => None,
    }
}

pub fn apply_struct_predicate(kind: &ProcedureKind, v: &Value) -> Option<bool> {
    match kind {
        ProcedureKind::StructPredicate { declared_type } => Some(struct_predicate(v, declared_type)),
        _ => None,
    }
}

/// `struct-info`: the type, if it's controlled by the current inspector,
/// paired with the "skipped fields" flag (always `false` here — this core
/// has no notion of a subtype expression hiding fields from a
/// macro-generated accessor chain). Resolves SPEC_FULL's Open Question by
/// following the *documented* contract rather than the original's `# TODO`
/// stub, which always returned the type unconditionally.
pub fn struct_info(v: &Value) -> (Option<Arc<StructType>>, bool) {
    match v.unwrap_base() {
        Value::Struct(inst) if inst.struct_type.is_controlled_by(&current_inspector()) => (Some(Arc::clone(&inst.struct_type)), false),
        _ => (None, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::struct_type::{make_struct_type_unguarded, StructTypeParams};

    fn simple_type(name: &str, n: usize) -> Arc<StructType> {
        make_struct_type_unguarded(StructTypeParams::new(name, n)).unwrap()
    }

    fn build(ty: &Arc<StructType>, args: Vec<Value>) -> Arc<StructInstance> {
        match construct(ty, args).unwrap() {
            ConstructOutcome::Done(inst) => inst,
            ConstructOutcome::NeedsGuard { .. } => panic!("unexpected guard suspension"),
        }
    }

    #[test]
    fn accessor_reads_back_the_constructed_value() {
        let ty = simple_type("point", 2);
        let inst = build(&ty, vec![Value::Fixnum(3), Value::Fixnum(4)]);
        let accessor = FieldAccessor { declared_type: Arc::clone(&ty), field_index: 0, name: None };
        let v = accessor.call(&Value::Struct(inst)).unwrap();
        assert!(matches!(v, Value::Fixnum(3)));
    }

    #[test]
    fn mutating_an_immutable_field_fails() {
        let mut params = StructTypeParams::new("point", 2);
        params.immutables.insert(0);
        let ty = make_struct_type_unguarded(params).unwrap();
        let inst = build(&ty, vec![Value::Fixnum(1), Value::Fixnum(2)]);
        let mutator = FieldMutator { declared_type: Arc::clone(&ty), field_index: 0, name: None };
        let err = mutator.call(&Value::Struct(inst), Value::Fixnum(99)).unwrap_err();
        assert!(matches!(err, StructError::ImmutableFieldMutation { .. }));
    }

    #[test]
    fn accessor_on_subtype_instance_uses_physical_offset() {
        let animal = simple_type("animal", 1);
        let mut dog_params = StructTypeParams::new("dog", 1);
        dog_params.super_type = Some(Arc::clone(&animal));
        let dog = make_struct_type_unguarded(dog_params).unwrap();
        let inst = build(&dog, vec![Value::Symbol(1), Value::Fixnum(7)]);
        let dog_accessor = FieldAccessor { declared_type: Arc::clone(&dog), field_index: 0, name: None };
        let v = dog_accessor.call(&Value::Struct(inst)).unwrap();
        assert!(matches!(v, Value::Fixnum(7)));
    }

    #[test]
    fn struct_to_vector_begins_with_the_struct_colon_name() {
        let ty = simple_type("point", 2);
        let inst = build(&ty, vec![Value::Fixnum(1), Value::Fixnum(2)]);
        let vec_val = struct_to_vector(&inst);
        match vec_val {
            Value::Vector(data) => {
                let items = data.items.read().unwrap();
                assert_eq!(crate::interner::resolve(match items[0] { Value::Symbol(s) => s, _ => panic!() }).unwrap(), "struct:point");
                assert_eq!(items.len(), 3);
            }
            _ => panic!("expected a vector"),
        }
    }

    #[test]
    fn wrong_arity_is_rejected() {
        let ty = simple_type("point", 2);
        let err = construct(&ty, vec![Value::Fixnum(1)]).err().unwrap();
        assert!(matches!(err, StructError::ArityMismatch { expected: 2, found: 1 }));
    }

    #[test]
    fn make_prefab_struct_round_trips_through_prefab_struct_key() {
        let key = crate::struct_type::PrefabKey {
            name: "posn".to_string(),
            init_count: 2,
            auto_count: 0,
            immutables_mask: 0,
            super_key: None,
        };
        let inst = make_prefab_struct(key.clone(), vec![Value::Fixnum(1), Value::Fixnum(2)]).unwrap();
        assert_eq!(prefab_struct_key(&inst), Some(key));
    }

    #[test]
    fn prefab_struct_key_is_none_for_an_ordinary_struct() {
        let ty = simple_type("point", 1);
        let inst = build(&ty, vec![Value::Fixnum(1)]);
        assert_eq!(prefab_struct_key(&inst), None);
    }

    #[test]
    fn struct_type_make_constructor_and_predicate_dispatch_correctly() {
        let ty = simple_type("point", 2);
        let ctor = struct_type_make_constructor(&ty);
        let pred = struct_type_make_predicate(&ty);

        let outcome = apply_struct_constructor(&ctor.kind, vec![Value::Fixnum(1), Value::Fixnum(2)]).unwrap().unwrap();
        let inst = match outcome {
            ConstructOutcome::Done(inst) => inst,
            ConstructOutcome::NeedsGuard { .. } => panic!("no guard"),
        };
        let inst_val = Value::Struct(inst);
        assert_eq!(apply_struct_predicate(&pred.kind, &inst_val), Some(true));
        assert_eq!(apply_struct_predicate(&pred.kind, &Value::Fixnum(1)), Some(false));
        assert!(apply_struct_constructor(&ProcedureKind::Opaque, vec![]).is_none());
    }

    #[test]
    fn struct_info_reports_the_type_under_the_default_inspector() {
        let ty = simple_type("point", 1);
        let inst = build(&ty, vec![Value::Fixnum(1)]);
        let (reported_ty, skipped) = struct_info(&Value::Struct(inst));
        assert!(reported_ty.is_some());
        assert!(!skipped);
    }
}
