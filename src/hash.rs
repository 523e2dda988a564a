/// eq/eqv/equal hash tables (C5), plus the chaperone layer's interposed
/// hash operations.
///
/// Entries are a flat `Vec<(Value, Value)>` behind a lock rather than a
/// `std::collections::HashMap`: key comparison is `eq?`/`eqv?`/`equal?`
/// depending on the table's `Comparator`, which does not line up with
/// `Value`'s (deliberately absent) `std::hash::Hash`/`Eq` impls — `equal?`
/// in particular must walk into vectors and structs, which a derived
/// `Hash` can't do without forcing every `Value` variant to be hashable.
/// Lookup is linear, matching `hash_items()`'s own list-of-pairs shape in
/// `original_source/pycket/values_hash.py`.

use crate::chaperone::{Wrapper, WrapperKind};
use crate::errors::{CoreError, HashError};
use crate::step::{ChaperoneOp, Resumption, Step};
use crate::value::Value;
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Eqv,
    Equal,
}

impl Comparator {
    fn keys_match(self, a: &Value, b: &Value) -> bool {
        match self {
            Comparator::Eq => a.eq_identity(b),
            Comparator::Eqv => a.eqv(b),
            Comparator::Equal => a.equal(b),
        }
    }
}

#[derive(Debug)]
pub struct HashTable {
    pub comparator: Comparator,
    pub mutable: bool,
    entries: RwLock<Vec<(Value, Value)>>,
}

impl HashTable {
    pub fn new(comparator: Comparator, mutable: bool, entries: Vec<(Value, Value)>) -> Arc<HashTable> {
        Arc::new(HashTable { comparator, mutable, entries: RwLock::new(entries) })
    }

    pub fn from_pairs(comparator: Comparator, mutable: bool, keys: Vec<Value>, vals: Vec<Value>) -> Arc<HashTable> {
        let mut entries = Vec::with_capacity(keys.len());
        for (k, v) in keys.into_iter().zip(vals.into_iter()) {
            set_into(&mut entries, comparator, k, v);
        }
        HashTable::new(comparator, mutable, entries)
    }

    pub fn count(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.entries.read().unwrap().iter().find(|(k, _)| self.comparator.keys_match(k, key)).map(|(_, v)| v.clone())
    }

    /// `hash_items()`'s snapshot — taken once per `hash-for-each`/`hash-map`
    /// call (§4.5: "the core snapshots the `items` sequence at call time").
    pub fn snapshot(&self) -> Vec<(Value, Value)> {
        self.entries.read().unwrap().clone()
    }
}

fn set_into(entries: &mut Vec<(Value, Value)>, comparator: Comparator, key: Value, val: Value) {
    match entries.iter_mut().find(|(k, _)| comparator.keys_match(k, &key)) {
        Some(slot) => slot.1 = val,
        None => entries.push((key, val)),
    }
}

fn require_table(v: &Value) -> Result<Arc<HashTable>, CoreError> {
    match v.unwrap_base() {
        Value::HashTable(t) => Ok(Arc::clone(t)),
        other => Err(CoreError::Struct(crate::errors::StructError::ContractViolation {
            expected: "a hash table".to_string(),
            found: other.type_name().to_string(),
        })),
    }
}

fn require_mutable(t: &HashTable) -> Result<(), CoreError> {
    if t.mutable {
        Ok(())
    } else {
        Err(CoreError::Hash(HashError::ImmutableTable))
    }
}

// ---------------------------------------------------------------------------
// Direct (unchaperoned) operations
// ---------------------------------------------------------------------------

pub fn hash_ref(v: &Value, key: &Value) -> Result<Value, CoreError> {
    let t = require_table(v)?;
    t.get(key).ok_or_else(|| CoreError::Hash(HashError::KeyNotFound))
}

pub fn hash_set_bang(v: &Value, key: Value, val: Value) -> Result<(), CoreError> {
    let t = require_table(v)?;
    require_mutable(&t)?;
    let mut entries = t.entries.write().unwrap();
    set_into(&mut entries, t.comparator, key, val);
    Ok(())
}

/// `hash-set` (non-destructive): only valid on an immutable table, returns
/// a fresh immutable table sharing no mutable state with the argument
/// (§5: resolved stub contract).
pub fn hash_set(v: &Value, key: Value, val: Value) -> Result<Value, CoreError> {
    let t = require_table(v)?;
    if t.mutable {
        return Err(CoreError::Struct(crate::errors::StructError::ContractViolation {
            expected: "an immutable hash table".to_string(),
            found: "a mutable hash table".to_string(),
        }));
    }
    let mut entries = t.snapshot();
    set_into(&mut entries, t.comparator, key, val);
    Ok(Value::HashTable(HashTable::new(t.comparator, false, entries)))
}

pub fn hash_remove_bang(v: &Value, key: &Value) -> Result<(), CoreError> {
    let t = require_table(v)?;
    require_mutable(&t)?;
    let mut entries = t.entries.write().unwrap();
    entries.retain(|(k, _)| !t.comparator.keys_match(k, key));
    Ok(())
}

pub fn hash_remove(v: &Value, key: &Value) -> Result<Value, CoreError> {
    let t = require_table(v)?;
    if t.mutable {
        return Err(CoreError::Struct(crate::errors::StructError::ContractViolation {
            expected: "an immutable hash table".to_string(),
            found: "a mutable hash table".to_string(),
        }));
    }
    let mut entries = t.snapshot();
    entries.retain(|(k, _)| !t.comparator.keys_match(k, key));
    Ok(Value::HashTable(HashTable::new(t.comparator, false, entries)))
}

pub fn hash_clear_bang(v: &Value) -> Result<(), CoreError> {
    let t = require_table(v)?;
    require_mutable(&t)?;
    t.entries.write().unwrap().clear();
    Ok(())
}

pub fn hash_clear(v: &Value) -> Result<Value, CoreError> {
    let t = require_table(v)?;
    Ok(Value::HashTable(HashTable::new(t.comparator, false, Vec::new())))
}

/// `hash-copy`: a shallow copy, always mutable regardless of the source's
/// mutability (Racket's own contract — §5).
pub fn hash_copy(v: &Value) -> Result<Value, CoreError> {
    let t = require_table(v)?;
    Ok(Value::HashTable(HashTable::new(t.comparator, true, t.snapshot())))
}

pub fn hash_count(v: &Value) -> Result<usize, CoreError> {
    Ok(require_table(v)?.count())
}

// ---------------------------------------------------------------------------
// Constructors (`make-hash`/`make-hasheq`/`make-hasheqv`/`make-immutable-hash`,
// `hash`/`hasheq`/`hasheqv`, `make-weak-hasheq`) — matching Racket's own
// mutable-vs-immutable, comparator-vs-name split.
// ---------------------------------------------------------------------------

/// `(make-hash [assocs])`: mutable, `equal?`-keyed.
pub fn make_hash(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    Value::HashTable(HashTable::from_pairs(Comparator::Equal, true, keys, vals))
}

/// `(make-hasheq [assocs])`: mutable, `eq?`-keyed.
pub fn make_hasheq(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    Value::HashTable(HashTable::from_pairs(Comparator::Eq, true, keys, vals))
}

/// `(make-hasheqv [assocs])`: mutable, `eqv?`-keyed.
pub fn make_hasheqv(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    Value::HashTable(HashTable::from_pairs(Comparator::Eqv, true, keys, vals))
}

/// `(make-immutable-hash [assocs])`: immutable, `equal?`-keyed.
pub fn make_immutable_hash(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    Value::HashTable(HashTable::from_pairs(Comparator::Equal, false, keys, vals))
}

/// `(hash k v ...)`: immutable, `equal?`-keyed, built from the literal
/// key/value pairs at the call site rather than an assoc list.
pub fn hash(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    Value::HashTable(HashTable::from_pairs(Comparator::Equal, false, keys, vals))
}

/// `(hasheq k v ...)`: immutable, `eq?`-keyed.
pub fn hasheq(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    Value::HashTable(HashTable::from_pairs(Comparator::Eq, false, keys, vals))
}

/// `(hasheqv k v ...)`: immutable, `eqv?`-keyed.
pub fn hasheqv(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    Value::HashTable(HashTable::from_pairs(Comparator::Eqv, false, keys, vals))
}

/// `(make-weak-hasheq [assocs])`: per spec.md's Non-goals, weak hash tables
/// are stubbed as a plain `eq?` table — entries are never actually collected
/// early, matching `original_source/pycket/prims/hash.py`'s own
/// `# FIXME: not actually weak` comment on its equivalent expose.
pub fn make_weak_hasheq(keys: Vec<Value>, vals: Vec<Value>) -> Value {
    make_hasheq(keys, vals)
}

// ---------------------------------------------------------------------------
// Positional iteration (`hash-iterate-first/next/key/value`) — unlike
// `hash-for-each`/`hash-map`, these never invoke user code, so there is no
// `Step` suspension here: the index is just a position into a fresh
// snapshot, stable only until the next mutation (Racket's own contract).
// ---------------------------------------------------------------------------

pub fn hash_iterate_first(v: &Value) -> Result<Option<usize>, CoreError> {
    let t = require_table(v)?;
    Ok(if t.count() == 0 { None } else { Some(0) })
}

pub fn hash_iterate_next(v: &Value, index: usize) -> Result<Option<usize>, CoreError> {
    let t = require_table(v)?;
    let next = index + 1;
    Ok(if next < t.count() { Some(next) } else { None })
}

pub fn hash_iterate_key(v: &Value, index: usize) -> Result<Value, CoreError> {
    let t = require_table(v)?;
    t.snapshot().get(index).map(|(k, _)| k.clone()).ok_or(CoreError::Hash(HashError::KeyNotFound))
}

pub fn hash_iterate_value(v: &Value, index: usize) -> Result<Value, CoreError> {
    let t = require_table(v)?;
    t.snapshot().get(index).map(|(_, val)| val.clone()).ok_or(CoreError::Hash(HashError::KeyNotFound))
}

/// `hash-map`: `f(k, v)` applied over a snapshot, collected in snapshot
/// order. Since `f` may be user code, this is modeled the same way as
/// `hash-for-each` (§4.5): the caller drives a `Step::Apply` per entry and
/// accumulates results itself; `hash_map_items` just hands back the
/// snapshot to iterate against.
pub fn hash_map_items(v: &Value) -> Result<Vec<(Value, Value)>, CoreError> {
    Ok(require_table(v)?.snapshot())
}

// ---------------------------------------------------------------------------
// CPS-style iteration (§4.5, §9)
// ---------------------------------------------------------------------------

/// Begins a `hash-for-each`: takes the snapshot and returns the first step.
/// The caller (evaluator) holds onto `items` and `v` itself and feeds each
/// `Resumption::HashForEach{Next,Key,Value}` back through the matching
/// `hash_for_each_*` resume function below.
///
/// Each entry's key and value are routed through `v`'s wrapper chain (if
/// any) before `f` ever sees them — the `key` handler transforms the
/// snapshotted key, then the `ref` handler post-processes the looked-up
/// value, exactly as a direct `hash-ref` would (§4.5). If the entry was
/// removed from the live table since the snapshot was taken, the lookup
/// under the (possibly transformed) key resolves to "missing" and the
/// entry is silently skipped — `f` is never called for it.
pub fn hash_for_each_start(v: &Value, f: Value) -> Result<(Vec<(Value, Value)>, Step), CoreError> {
    let items = require_table(v)?.snapshot();
    let step = hash_for_each_resolve(v, &items, f, 0);
    Ok((items, step))
}

fn hash_for_each_resolve(v: &Value, items: &[(Value, Value)], f: Value, index: usize) -> Step {
    if index >= items.len() {
        return Step::done(Value::Void);
    }
    let (k, _) = items[index].clone();
    match chaperone_transform_key(v, k) {
        Step::Done(key) => hash_for_each_after_key(v, items, f, index, key),
        Step::Apply { proc, args, .. } => Step::apply(proc, args, Resumption::HashForEachKey { index }),
    }
}

fn hash_for_each_after_key(v: &Value, items: &[(Value, Value)], f: Value, index: usize, key: Value) -> Step {
    let raw = require_table(v).ok().and_then(|t| t.get(&key));
    match raw {
        None => hash_for_each_resolve(v, items, f, index + 1),
        Some(raw) => match chaperone_hash_ref(v, key.clone(), raw) {
            Step::Done(resolved) => Step::apply(f, vec![key, resolved], Resumption::HashForEachNext { index: index + 1 }),
            Step::Apply { proc, args, .. } => Step::apply(proc, args, Resumption::HashForEachValue { index, key }),
        },
    }
}

/// Resumes a suspended `key` handler call: `key` is its (fed-back) result.
pub fn hash_for_each_key_resolved(v: &Value, items: &[(Value, Value)], f: Value, index: usize, key: Value) -> Step {
    hash_for_each_after_key(v, items, f, index, key)
}

/// Resumes a suspended `ref` handler call: `resolved` is its (fed-back)
/// result, ready to hand to `f` alongside `key`.
pub fn hash_for_each_value_resolved(f: Value, index: usize, key: Value, resolved: Value) -> Step {
    Step::apply(f, vec![key, resolved], Resumption::HashForEachNext { index: index + 1 })
}

/// Resumes after `f` itself has returned for `index - 1`: resolves the
/// next entry.
pub fn hash_for_each_next(v: &Value, items: &[(Value, Value)], f: Value, index: usize) -> Step {
    hash_for_each_resolve(v, items, f, index)
}

// ---------------------------------------------------------------------------
// Hashing for the `equal` comparator (also exposed, §7)
// ---------------------------------------------------------------------------

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

fn fnv_mix(mut h: u64, byte: u8) -> u64 {
    h ^= byte as u64;
    h.wrapping_mul(FNV_PRIME)
}

fn fnv_bytes(mut h: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        h = fnv_mix(h, b);
    }
    h
}

/// `equal-hash-code`: a structural hash consistent with `Value::equal` —
/// equal values hash identically. Recurses into vectors/cons/structs the
/// same way `equal` does.
pub fn equal_hash_code(v: &Value) -> i64 {
    structural_hash(v, FNV_OFFSET) as i64
}

/// `equal-secondary-hash-code`: a second, independent-enough hash for
/// double hashing — seeded differently from `equal-hash-code` (§7).
pub fn equal_secondary_hash_code(v: &Value) -> i64 {
    structural_hash(v, !FNV_OFFSET) as i64
}

fn structural_hash(v: &Value, seed: u64) -> u64 {
    match v {
        Value::Fixnum(n) => fnv_bytes(seed, &n.to_le_bytes()),
        Value::Bignum(n) => fnv_bytes(seed, n.to_string().as_bytes()),
        Value::Flonum(n) => fnv_bytes(seed, &n.to_bits().to_le_bytes()),
        Value::Complex(re, im) => structural_hash(im, structural_hash(re, seed)),
        Value::Bool(b) => fnv_mix(seed, *b as u8),
        Value::Symbol(s) => fnv_bytes(seed, &s.to_le_bytes()),
        Value::Null => fnv_mix(seed, 0),
        Value::Void => fnv_mix(seed, 1),
        Value::Cons(c) => {
            let cell = c.read().unwrap();
            structural_hash(&cell.cdr, structural_hash(&cell.car, seed))
        }
        Value::Vector(data) => {
            let items = data.items.read().unwrap();
            items.iter().fold(fnv_mix(seed, 2), |acc, item| structural_hash(item, acc))
        }
        Value::BoxV(data) => structural_hash(&data.value.read().unwrap(), fnv_mix(seed, 3)),
        Value::Struct(inst) => {
            let fields = inst.fields.read().unwrap();
            let named = fnv_bytes(fnv_mix(seed, 4), inst.struct_type.name.as_bytes());
            fields.iter().fold(named, |acc, field| structural_hash(field, acc))
        }
        // Everything else (procedures, hash tables, struct types, property
        // descriptors, continuation-mark keys, wrappers) hashes by identity
        // — `equal?` on these falls back to `eq?` (`Value::equal`).
        other => fnv_bytes(seed, format!("{:p}", other as *const Value).as_bytes()),
    }
}

// ---------------------------------------------------------------------------
// Interposed hash operations (§4.4's HashTable row): the `key` handler
// transforms the key before it reaches the base table; `ref`/`set`/
// `remove`/`clear` then post-process or gate that lookup.
// ---------------------------------------------------------------------------

fn outermost_hash_wrapper(v: &Value) -> Option<(Value, Arc<Wrapper>)> {
    let mut cur = v;
    while let Value::Wrapped(w) = cur {
        if matches!(w.kind, WrapperKind::Hash { .. }) {
            return Some((w.inner.clone(), Arc::clone(w)));
        }
        cur = &w.inner;
    }
    None
}

/// Runs a wrapped hash table's `key` handler (if any) to transform the key
/// before a `ref`/`set!`/`remove!` reaches the base table. Returns the
/// step needed to run that handler, or `Step::done` with the key
/// unchanged if there's no wrapper or no key handler at this layer.
pub fn chaperone_transform_key(v: &Value, key: Value) -> Step {
    match outermost_hash_wrapper(v) {
        Some((w, wrapper)) => match &wrapper.kind {
            WrapperKind::Hash { key: key_handler, .. } => {
                Step::apply(key_handler.clone(), vec![w, key], Resumption::ChaperoneHandler { op: ChaperoneOp::HashKey })
            }
            _ => unreachable!("outermost_hash_wrapper only returns Hash wrappers"),
        },
        None => Step::done(key),
    }
}

/// After the (possibly key-transformed) lookup has produced a raw value,
/// the outermost `ref` handler post-processes it, receiving
/// `(wrapper-or-table, key, raw-value)`.
pub fn chaperone_hash_ref(v: &Value, key: Value, raw: Value) -> Step {
    match outermost_hash_wrapper(v) {
        Some((w, wrapper)) => match &wrapper.kind {
            WrapperKind::Hash { get, .. } => Step::apply(get.clone(), vec![w, key, raw], Resumption::ChaperoneHandler { op: ChaperoneOp::HashRef }),
            _ => unreachable!(),
        },
        None => Step::done(raw),
    }
}

/// The outermost `set` handler runs before a `hash-set!`/`hash-set`
/// actually writes, receiving `(wrapper-or-table, key, value)`; its result
/// is what gets written.
pub fn chaperone_hash_set(v: &Value, key: Value, val: Value) -> Step {
    match outermost_hash_wrapper(v) {
        Some((w, wrapper)) => match &wrapper.kind {
            WrapperKind::Hash { set, .. } => Step::apply(set.clone(), vec![w, key, val], Resumption::ChaperoneHandler { op: ChaperoneOp::HashSet }),
            _ => unreachable!(),
        },
        None => Step::done(val),
    }
}

pub fn chaperone_hash_remove(v: &Value, key: Value) -> Step {
    match outermost_hash_wrapper(v) {
        Some((w, wrapper)) => match &wrapper.kind {
            WrapperKind::Hash { remove, .. } => Step::apply(remove.clone(), vec![w, key], Resumption::ChaperoneHandler { op: ChaperoneOp::HashRemove }),
            _ => unreachable!(),
        },
        None => Step::done(key),
    }
}

/// The `clear?` handler is optional (§4.4's `clear?`); without one, clear
/// simply reaches the base table directly.
pub fn chaperone_hash_clear(v: &Value) -> Step {
    match outermost_hash_wrapper(v) {
        Some((w, wrapper)) => match &wrapper.kind {
            WrapperKind::Hash { clear: Some(clear), .. } => {
                Step::apply(clear.clone(), vec![w], Resumption::ChaperoneHandler { op: ChaperoneOp::HashClear })
            }
            WrapperKind::Hash { clear: None, .. } => Step::done(Value::Void),
            _ => unreachable!(),
        },
        None => Step::done(Value::Void),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_table_distinguishes_fresh_allocations() {
        let t = HashTable::new(Comparator::Eq, true, Vec::new());
        let k1 = Value::vector(vec![Value::Fixnum(1)]);
        let k2 = Value::vector(vec![Value::Fixnum(1)]);
        t.entries.write().unwrap().push((k1.clone(), Value::Symbol(0)));
        assert!(t.get(&k1).is_some());
        assert!(t.get(&k2).is_none());
    }

    #[test]
    fn equal_table_matches_structurally() {
        let t = HashTable::new(Comparator::Equal, true, Vec::new());
        let k1 = Value::vector(vec![Value::Fixnum(1)]);
        let k2 = Value::vector(vec![Value::Fixnum(1)]);
        t.entries.write().unwrap().push((k1, Value::Symbol(0)));
        assert!(t.get(&k2).is_some());
    }

    #[test]
    fn hash_set_bang_overwrites_existing_key() {
        let v = Value::HashTable(HashTable::new(Comparator::Eqv, true, Vec::new()));
        hash_set_bang(&v, Value::Fixnum(1), Value::Symbol(10)).unwrap();
        hash_set_bang(&v, Value::Fixnum(1), Value::Symbol(20)).unwrap();
        assert_eq!(hash_count(&v).unwrap(), 1);
        assert!(matches!(hash_ref(&v, &Value::Fixnum(1)).unwrap(), Value::Symbol(20)));
    }

    #[test]
    fn hash_set_on_a_mutable_table_is_rejected() {
        let v = Value::HashTable(HashTable::new(Comparator::Eqv, true, Vec::new()));
        let err = hash_set(&v, Value::Fixnum(1), Value::Symbol(0)).unwrap_err();
        assert!(matches!(err, CoreError::Struct(_)));
    }

    #[test]
    fn hash_set_on_an_immutable_table_returns_a_new_table() {
        let v = Value::HashTable(HashTable::new(Comparator::Eqv, false, vec![(Value::Fixnum(1), Value::Symbol(0))]));
        let updated = hash_set(&v, Value::Fixnum(2), Value::Symbol(1)).unwrap();
        assert_eq!(hash_count(&v).unwrap(), 1);
        assert_eq!(hash_count(&updated).unwrap(), 2);
    }

    #[test]
    fn hash_ref_missing_key_signals_key_not_found() {
        let v = Value::HashTable(HashTable::new(Comparator::Eq, true, Vec::new()));
        let err = hash_ref(&v, &Value::Fixnum(1)).unwrap_err();
        assert!(matches!(err, CoreError::Hash(HashError::KeyNotFound)));
    }

    #[test]
    fn equal_hash_code_is_consistent_for_structurally_equal_vectors() {
        let a = Value::vector(vec![Value::Fixnum(1), Value::Fixnum(2)]);
        let b = Value::vector(vec![Value::Fixnum(1), Value::Fixnum(2)]);
        assert_eq!(equal_hash_code(&a), equal_hash_code(&b));
    }

    #[test]
    fn hash_and_make_hash_pick_the_right_comparator_and_mutability() {
        let h = hash(vec![Value::Fixnum(1)], vec![Value::Symbol(0)]);
        assert!(matches!(&h, Value::HashTable(t) if t.comparator == Comparator::Equal && !t.mutable));
        let mh = make_hasheq(vec![Value::Fixnum(1)], vec![Value::Symbol(0)]);
        assert!(matches!(&mh, Value::HashTable(t) if t.comparator == Comparator::Eq && t.mutable));
    }

    #[test]
    fn iterate_first_next_walk_every_index_then_stop() {
        let v = Value::HashTable(HashTable::new(
            Comparator::Eqv,
            true,
            vec![(Value::Fixnum(1), Value::Symbol(0)), (Value::Fixnum(2), Value::Symbol(1))],
        ));
        let first = hash_iterate_first(&v).unwrap().unwrap();
        assert_eq!(first, 0);
        let second = hash_iterate_next(&v, first).unwrap().unwrap();
        assert_eq!(second, 1);
        assert!(hash_iterate_next(&v, second).unwrap().is_none());
        assert!(matches!(hash_iterate_key(&v, first).unwrap(), Value::Fixnum(1)));
        assert!(matches!(hash_iterate_value(&v, second).unwrap(), Value::Symbol(1)));
    }

    #[test]
    fn iterate_first_on_an_empty_table_is_none() {
        let v = Value::HashTable(HashTable::new(Comparator::Equal, true, Vec::new()));
        assert!(hash_iterate_first(&v).unwrap().is_none());
    }

    #[test]
    fn hash_for_each_visits_every_entry_once() {
        let v = Value::HashTable(HashTable::new(Comparator::Eqv, true, vec![(Value::Fixnum(1), Value::Symbol(0)), (Value::Fixnum(2), Value::Symbol(1))]));
        let f = Value::Procedure(crate::value::ProcedureValue::named("f"));
        let (items, step) = hash_for_each_start(&v, f.clone()).unwrap();
        assert_eq!(items.len(), 2);
        match step {
            Step::Apply { resume: Resumption::HashForEachNext { index }, .. } => assert_eq!(index, 1),
            _ => panic!("expected a suspension on the first entry"),
        }
        let step2 = hash_for_each_next(&v, &items, f, 2);
        assert!(step2.into_done().is_some());
    }

    #[test]
    fn hash_for_each_skips_an_entry_removed_after_the_snapshot() {
        let t = HashTable::new(Comparator::Eqv, true, vec![(Value::Fixnum(1), Value::Symbol(0)), (Value::Fixnum(2), Value::Symbol(1))]);
        let v = Value::HashTable(Arc::clone(&t));
        let f = Value::Procedure(crate::value::ProcedureValue::named("f"));
        let (items, step) = hash_for_each_start(&v, f.clone()).unwrap();
        // The snapshot still has both entries, but the live table no longer does.
        hash_remove_bang(&v, &Value::Fixnum(1)).unwrap();
        match step {
            Step::Apply { resume: Resumption::HashForEachNext { index }, .. } => assert_eq!(index, 1),
            _ => panic!("expected a suspension on the first entry"),
        }
        // Advancing past the removed entry (index 0) skips it and lands
        // directly on a suspension for entry 1, never calling `f` for 0.
        let step_for_entry_0 = hash_for_each_resolve(&v, &items, f, 0);
        match step_for_entry_0 {
            Step::Apply { proc, args, resume: Resumption::HashForEachNext { index } } => {
                assert_eq!(index, 2);
                assert!(matches!(proc, Value::Procedure(_)));
                assert!(matches!(args[0], Value::Fixnum(2)));
            }
            _ => panic!("expected the skip to land on entry 1's call"),
        }
    }
}
