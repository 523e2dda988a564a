/// The struct-type registry (C2): nominal types, single inheritance,
/// properties, prefab interning, inspectors.
///
/// `StructType` identity is `Arc`-based; subtyping walks the `super` chain
/// by pointer identity, the same way the surrounding toolchain's
/// `AxClass::resolve_method` walks `parent: Option<Arc<AxClass>>`.

use crate::errors::StructError;
use crate::inspector::{current_inspector, Inspector};
use crate::value::{PropertyDescriptor, Value};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug)]
pub struct StructType {
    pub name: String,
    pub super_type: Option<Arc<StructType>>,
    pub init_field_cnt: usize,
    pub auto_field_cnt: usize,
    pub auto_val: Value,
    pub props: Vec<(Arc<PropertyDescriptor>, Value)>,
    pub inspector: Arc<Inspector>,
    pub immutables: HashSet<usize>,
    pub guard: Option<Value>,
    pub constr_name: Option<String>,
    pub is_prefab: bool,
    pub is_opaque: bool,
    pub total_field_cnt: usize,
    pub prefab_key: Option<PrefabKey>,
}

impl StructType {
    /// `total_field_cnt = init_field_cnt + auto_field_cnt + (super's, if any)` (§3).
    pub fn is_subtype_of(self: &Arc<Self>, other: &Arc<StructType>) -> bool {
        let mut cur = Arc::clone(self);
        loop {
            if Arc::ptr_eq(&cur, other) {
                return true;
            }
            match cur.super_type.clone() {
                Some(s) => cur = s,
                None => return false,
            }
        }
    }

    /// Is `self` controlled by `inspector` — i.e. is `inspector` an
    /// ancestor of (or identical to) `self.inspector` (§4.2)?
    pub fn is_controlled_by(&self, inspector: &Arc<Inspector>) -> bool {
        inspector.controls(&self.inspector)
    }

    /// Looks up `descriptor`'s value on this type or a super-type; failing
    /// that, tries each of `descriptor.supers` in turn (§4.2's "`supers`
    /// allows deriving property values from others").
    pub fn lookup_prop(&self, descriptor: &Arc<PropertyDescriptor>) -> Option<Value> {
        self.props
            .iter()
            .find(|(d, _)| Arc::ptr_eq(d, descriptor))
            .map(|(_, v)| v.clone())
            .or_else(|| self.super_type.as_ref().and_then(|s| s.lookup_prop(descriptor)))
            .or_else(|| descriptor.supers.iter().find_map(|alias| self.lookup_prop(alias)))
    }
}

/// `(make-struct-type-property name [guard supers])` (§4.2). `guard`, if
/// given, is invoked at every `make_struct_type` attach site with
/// `(attached_value, type_name)`, its result replacing the stored value.
/// `supers` lets a type with no direct value for this descriptor fall back
/// to another descriptor's value (`StructType::lookup_prop`).
pub fn make_struct_type_property(name: impl Into<String>, guard: Option<Value>, supers: Vec<Arc<PropertyDescriptor>>) -> Arc<PropertyDescriptor> {
    PropertyDescriptor::with_guard_and_supers(name, guard, supers)
}

/// Parameters accepted by `make-struct-type` (§4.2's `do_make_struct_type`
/// parameter list/defaults, via `struct_structinfo.py`).
pub struct StructTypeParams {
    pub name: String,
    pub super_type: Option<Arc<StructType>>,
    pub init_field_cnt: usize,
    pub auto_field_cnt: usize,
    pub auto_val: Value,
    pub props: Vec<(Arc<PropertyDescriptor>, Value)>,
    pub inspector: Option<Arc<Inspector>>,
    pub immutables: HashSet<usize>,
    pub guard: Option<Value>,
    pub constr_name: Option<String>,
    pub is_prefab: bool,
    pub is_opaque: bool,
    pub prefab_key: Option<PrefabKey>,
}

impl StructTypeParams {
    pub fn new(name: impl Into<String>, init_field_cnt: usize) -> Self {
        StructTypeParams {
            name: name.into(),
            super_type: None,
            init_field_cnt,
            auto_field_cnt: 0,
            auto_val: Value::Bool(false),
            props: Vec::new(),
            inspector: None,
            immutables: HashSet::new(),
            guard: None,
            constr_name: None,
            is_prefab: false,
            is_opaque: false,
            prefab_key: None,
        }
    }
}

/// Construction state threaded across a chain of struct-type-property guard
/// suspensions, the same shape as `struct_instance::PendingConstruction` for
/// construction guards.
pub struct PendingStructType {
    base: StructTypeBase,
    remaining_props: Vec<(Arc<PropertyDescriptor>, Value)>,
    next_prop: usize,
    attached_props: Vec<(Arc<PropertyDescriptor>, Value)>,
}

/// The parts of `StructTypeParams` that don't need further processing once
/// property-guard attachment starts.
struct StructTypeBase {
    name: String,
    super_type: Option<Arc<StructType>>,
    init_field_cnt: usize,
    auto_field_cnt: usize,
    auto_val: Value,
    inspector: Arc<Inspector>,
    immutables: HashSet<usize>,
    guard: Option<Value>,
    constr_name: Option<String>,
    is_prefab: bool,
    is_opaque: bool,
    total_field_cnt: usize,
    prefab_key: Option<PrefabKey>,
}

pub enum MakeStructTypeOutcome {
    Done(Arc<StructType>),
    /// The caller must apply `guard` to `guard_args` (`(attached_value,
    /// type_name)`) and feed the single-value result back through
    /// `resume_make_struct_type` along with `pending`.
    NeedsPropertyGuard { guard: Value, guard_args: Vec<Value>, pending: PendingStructType },
}

pub fn make_struct_type(params: StructTypeParams) -> Result<MakeStructTypeOutcome, StructError> {
    let super_total = params.super_type.as_ref().map(|s| s.total_field_cnt).unwrap_or(0);
    let total_field_cnt = super_total + params.init_field_cnt + params.auto_field_cnt;

    if params.immutables.iter().any(|&i| i >= params.init_field_cnt + params.auto_field_cnt) {
        return Err(StructError::ContractViolation {
            expected: format!("immutable field index < {}", params.init_field_cnt + params.auto_field_cnt),
            found: "an out-of-range field index".to_string(),
        });
    }

    let inspector = params.inspector.unwrap_or_else(current_inspector);

    let base = StructTypeBase {
        name: params.name,
        super_type: params.super_type,
        init_field_cnt: params.init_field_cnt,
        auto_field_cnt: params.auto_field_cnt,
        auto_val: params.auto_val,
        inspector,
        immutables: params.immutables,
        guard: params.guard,
        constr_name: params.constr_name,
        is_prefab: params.is_prefab,
        is_opaque: params.is_opaque,
        total_field_cnt,
        prefab_key: params.prefab_key,
    };

    attach_props(PendingStructType { base, remaining_props: params.props, next_prop: 0, attached_props: Vec::new() })
}

/// Feeds a property guard's rewritten value back in, then continues
/// attaching any remaining properties.
pub fn resume_make_struct_type(mut pending: PendingStructType, guard_result: Value) -> Result<MakeStructTypeOutcome, StructError> {
    let (descriptor, _) = pending.remaining_props[pending.next_prop].clone();
    pending.attached_props.push((descriptor, guard_result));
    pending.next_prop += 1;
    attach_props(pending)
}

fn attach_props(mut pending: PendingStructType) -> Result<MakeStructTypeOutcome, StructError> {
    while pending.next_prop < pending.remaining_props.len() {
        let (descriptor, value) = pending.remaining_props[pending.next_prop].clone();
        match descriptor.guard.clone() {
            Some(guard) => {
                let guard_args = vec![value, Value::Symbol(crate::interner::intern(&pending.base.name))];
                return Ok(MakeStructTypeOutcome::NeedsPropertyGuard { guard, guard_args, pending });
            }
            None => {
                pending.attached_props.push((descriptor, value));
                pending.next_prop += 1;
            }
        }
    }

    let base = pending.base;
    Ok(MakeStructTypeOutcome::Done(Arc::new(StructType {
        name: base.name,
        super_type: base.super_type,
        init_field_cnt: base.init_field_cnt,
        auto_field_cnt: base.auto_field_cnt,
        auto_val: base.auto_val,
        props: pending.attached_props,
        inspector: base.inspector,
        immutables: base.immutables,
        guard: base.guard,
        constr_name: base.constr_name,
        is_prefab: base.is_prefab,
        is_opaque: base.is_opaque,
        total_field_cnt: base.total_field_cnt,
        prefab_key: base.prefab_key,
    })))
}

/// Convenience for callers that know none of their properties carry a guard
/// (most call sites, and every existing test): unwraps straight to the
/// built type or panics on an unexpected suspension.
pub fn make_struct_type_unguarded(params: StructTypeParams) -> Result<Arc<StructType>, StructError> {
    match make_struct_type(params)? {
        MakeStructTypeOutcome::Done(ty) => Ok(ty),
        MakeStructTypeOutcome::NeedsPropertyGuard { .. } => {
            panic!("make_struct_type_unguarded called with a property that carries a guard")
        }
    }
}

// ---------------------------------------------------------------------------
// Prefab interning (§4.2: "two prefab types with the same key share
// identity")
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrefabKey {
    pub name: String,
    pub init_count: usize,
    pub auto_count: usize,
    /// Immutable fields encoded as a bitmask over the type's own fields.
    pub immutables_mask: u64,
    pub super_key: Option<Box<PrefabKey>>,
}

static PREFAB_REGISTRY: Lazy<DashMap<PrefabKey, Arc<StructType>>> = Lazy::new(DashMap::new);

/// `make-prefab-struct`'s type half: interns by `PrefabKey`, returning the
/// existing type if one was already registered under this key.
pub fn intern_prefab_type(key: PrefabKey, build: impl FnOnce() -> Result<Arc<StructType>, StructError>) -> Result<Arc<StructType>, StructError> {
    if let Some(existing) = PREFAB_REGISTRY.get(&key) {
        return Ok(Arc::clone(existing.value()));
    }
    let ty = build()?;
    match PREFAB_REGISTRY.entry(key) {
        dashmap::mapref::entry::Entry::Occupied(e) => Ok(Arc::clone(e.get())),
        dashmap::mapref::entry::Entry::Vacant(e) => {
            e.insert(Arc::clone(&ty));
            Ok(ty)
        }
    }
}

pub fn prefab_key_to_struct_type(key: &PrefabKey) -> Option<Arc<StructType>> {
    PREFAB_REGISTRY.get(key).map(|r| Arc::clone(r.value()))
}

// ---------------------------------------------------------------------------
// Reflection (`struct-type-info`, §6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StructTypeInfo {
    pub name: String,
    pub init_field_cnt: usize,
    pub auto_field_cnt: usize,
    pub immutables: Vec<usize>,
    pub super_type: Option<Arc<StructType>>,
    pub skipped: bool,
}

/// `struct-type-info`'s shape-only half. The original's tuple also carries a
/// single dynamic-field-index accessor/mutator pair; this core instead
/// hands out one `FieldAccessor`/`FieldMutator` per field (§4.3), so those
/// two slots are left for the caller to mint rather than duplicated here.
pub fn struct_type_info(ty: &Arc<StructType>) -> StructTypeInfo {
    let mut immutables: Vec<usize> = ty.immutables.iter().copied().collect();
    immutables.sort_unstable();
    StructTypeInfo {
        name: ty.name.clone(),
        init_field_cnt: ty.init_field_cnt,
        auto_field_cnt: ty.auto_field_cnt,
        immutables,
        super_type: ty.super_type.clone(),
        skipped: false,
    }
}
