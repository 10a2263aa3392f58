//! The type interner.
//!
//! Hash-consing table: interning the same [`TypeKey`] twice yields the
//! same [`TypeId`], so structural equality of constructed types is id
//! equality regardless of construction path. Interior mutability keeps
//! the interner shareable by `&self` throughout the checker; the core is
//! single-threaded per compilation unit.

use std::cell::{Cell, RefCell};

use rustc_hash::FxHashMap;

use crate::types::*;

pub struct TypeInterner {
    types: RefCell<Vec<TypeKey>>,
    map: RefCell<FxHashMap<TypeKey, TypeId>>,
    /// Memoized lazy-form expansions.
    eval_cache: RefCell<FxHashMap<TypeId, TypeId>>,
    /// One instantiation per `(definition, argument tuple)`.
    instantiation_cache: RefCell<FxHashMap<(TypeId, Vec<TypeId>), TypeId>>,
    next_class_id: Cell<u32>,
    instantiation_depth: Cell<u32>,
}

impl TypeInterner {
    pub fn new() -> Self {
        let interner = TypeInterner {
            types: RefCell::new(Vec::with_capacity(64)),
            map: RefCell::new(FxHashMap::default()),
            eval_cache: RefCell::new(FxHashMap::default()),
            instantiation_cache: RefCell::new(FxHashMap::default()),
            next_class_id: Cell::new(0),
            instantiation_depth: Cell::new(0),
        };
        // Pre-seed the fixed primitive ids, in TypeId constant order.
        let seeds = [
            TypeKey::Any,
            TypeKey::Unknown,
            TypeKey::Never,
            TypeKey::Error,
            TypeKey::Number,
            TypeKey::String,
            TypeKey::Boolean,
            TypeKey::Symbol,
            TypeKey::BigInt,
            TypeKey::Void,
            TypeKey::Null,
            TypeKey::Undefined,
            TypeKey::BooleanLiteral(true),
            TypeKey::BooleanLiteral(false),
        ];
        for (i, key) in seeds.into_iter().enumerate() {
            let id = interner.intern(key);
            debug_assert_eq!(id.0 as usize, i);
        }
        interner
    }

    pub fn intern(&self, key: TypeKey) -> TypeId {
        if let Some(&id) = self.map.borrow().get(&key) {
            return id;
        }
        let mut types = self.types.borrow_mut();
        let id = TypeId(types.len() as u32);
        types.push(key.clone());
        self.map.borrow_mut().insert(key, id);
        id
    }

    /// Look up the key for an id. Keys are cloned out so no borrow is
    /// held across solver recursion.
    pub fn lookup(&self, id: TypeId) -> TypeKey {
        self.types
            .borrow()
            .get(id.0 as usize)
            .cloned()
            .unwrap_or(TypeKey::Error)
    }

    pub fn len(&self) -> usize {
        self.types.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn fresh_class_id(&self) -> u32 {
        let id = self.next_class_id.get();
        self.next_class_id.set(id + 1);
        id
    }

    // =========================================================================
    // Constructors that maintain the structural invariants
    // =========================================================================

    pub fn string_literal(&self, text: &str) -> TypeId {
        self.intern(TypeKey::StringLiteral(text.to_string()))
    }

    pub fn number_literal(&self, value: f64) -> TypeId {
        self.intern(TypeKey::NumberLiteral(FloatBits::from_f64(value)))
    }

    pub fn boolean_literal(&self, value: bool) -> TypeId {
        if value { TypeId::TRUE } else { TypeId::FALSE }
    }

    pub fn array(&self, element: TypeId) -> TypeId {
        self.intern(TypeKey::Array(element))
    }

    pub fn promise(&self, inner: TypeId) -> TypeId {
        self.intern(TypeKey::Promise(inner))
    }

    pub fn tuple(&self, elements: Vec<TupleElement>) -> TypeId {
        self.intern(TypeKey::Tuple(TupleType::from_elements(elements)))
    }

    pub fn conditional(&self, conditional: ConditionalType) -> TypeId {
        self.intern(TypeKey::Conditional(conditional))
    }

    /// Build a union, maintaining the invariants: nested unions are
    /// flattened, `never` is dropped (identity), `any`/`unknown` absorb,
    /// duplicate members and literals subsumed by their primitive are
    /// removed, `true | false` collapses to `boolean`, and a singleton
    /// union collapses to its member.
    pub fn union(&self, members: Vec<TypeId>) -> TypeId {
        let mut flat: Vec<TypeId> = Vec::with_capacity(members.len());
        let mut saw_any = false;
        let mut saw_unknown = false;
        self.flatten_union_into(&members, &mut flat, &mut saw_any, &mut saw_unknown);
        if saw_any {
            return TypeId::ANY;
        }
        if saw_unknown {
            return TypeId::UNKNOWN;
        }

        // Literal subsumption.
        let has_string = flat.contains(&TypeId::STRING);
        let has_number = flat.contains(&TypeId::NUMBER);
        let has_boolean = flat.contains(&TypeId::BOOLEAN);
        let mut seen = rustc_hash::FxHashSet::default();
        let mut result: Vec<TypeId> = Vec::with_capacity(flat.len());
        for id in flat {
            if !seen.insert(id) {
                continue;
            }
            match self.lookup(id) {
                TypeKey::StringLiteral(_) if has_string => continue,
                TypeKey::NumberLiteral(_) if has_number => continue,
                TypeKey::BooleanLiteral(_) if has_boolean => continue,
                _ => result.push(id),
            }
        }

        // true | false == boolean
        if result.contains(&TypeId::TRUE) && result.contains(&TypeId::FALSE) {
            result.retain(|&id| id != TypeId::TRUE && id != TypeId::FALSE);
            if !result.contains(&TypeId::BOOLEAN) {
                result.push(TypeId::BOOLEAN);
            }
        }

        match result.len() {
            0 => TypeId::NEVER,
            1 => result[0],
            _ => self.intern(TypeKey::Union(result)),
        }
    }

    fn flatten_union_into(
        &self,
        members: &[TypeId],
        out: &mut Vec<TypeId>,
        saw_any: &mut bool,
        saw_unknown: &mut bool,
    ) {
        for &id in members {
            match self.lookup(id) {
                TypeKey::Union(inner) => {
                    self.flatten_union_into(&inner, out, saw_any, saw_unknown)
                }
                TypeKey::Never => {}
                TypeKey::Any => *saw_any = true,
                TypeKey::Unknown => *saw_unknown = true,
                _ => out.push(id),
            }
        }
    }

    /// Build an intersection: nested intersections are flattened,
    /// `never` annihilates, `any` absorbs, `unknown` is the identity,
    /// contradictory primitives collapse to `never`, and a singleton
    /// collapses to its member.
    pub fn intersection(&self, members: Vec<TypeId>) -> TypeId {
        let mut flat: Vec<TypeId> = Vec::with_capacity(members.len());
        let mut saw_any = false;
        for &id in &members {
            if !self.flatten_intersection_into(id, &mut flat, &mut saw_any) {
                return TypeId::NEVER;
            }
        }
        if saw_any {
            return TypeId::ANY;
        }
        let mut seen = rustc_hash::FxHashSet::default();
        let mut result: Vec<TypeId> = Vec::with_capacity(flat.len());
        for id in flat {
            if seen.insert(id) {
                result.push(id);
            }
        }

        // string & number (and friends) have no inhabitants.
        let primitive_count = result
            .iter()
            .filter(|&&id| {
                matches!(
                    self.lookup(id),
                    TypeKey::Number
                        | TypeKey::String
                        | TypeKey::Boolean
                        | TypeKey::Symbol
                        | TypeKey::BigInt
                        | TypeKey::Null
                        | TypeKey::Undefined
                        | TypeKey::Void
                )
            })
            .count();
        if primitive_count > 1 {
            return TypeId::NEVER;
        }

        match result.len() {
            0 => TypeId::UNKNOWN,
            1 => result[0],
            _ => self.intern(TypeKey::Intersection(result)),
        }
    }

    /// Returns false when `never` was found (the whole intersection is
    /// `never`).
    fn flatten_intersection_into(
        &self,
        id: TypeId,
        out: &mut Vec<TypeId>,
        saw_any: &mut bool,
    ) -> bool {
        match self.lookup(id) {
            TypeKey::Intersection(inner) => {
                for member in inner {
                    if !self.flatten_intersection_into(member, out, saw_any) {
                        return false;
                    }
                }
                true
            }
            TypeKey::Never => false,
            TypeKey::Any => {
                *saw_any = true;
                true
            }
            TypeKey::Unknown => true,
            _ => {
                out.push(id);
                true
            }
        }
    }

    // =========================================================================
    // Caches
    // =========================================================================

    pub fn cached_evaluation(&self, id: TypeId) -> Option<TypeId> {
        self.eval_cache.borrow().get(&id).copied()
    }

    pub fn cache_evaluation(&self, id: TypeId, result: TypeId) {
        self.eval_cache.borrow_mut().insert(id, result);
    }

    pub fn cached_instantiation(&self, def: TypeId, args: &[TypeId]) -> Option<TypeId> {
        self.instantiation_cache
            .borrow()
            .get(&(def, args.to_vec()))
            .copied()
    }

    pub fn cache_instantiation(&self, def: TypeId, args: Vec<TypeId>, result: TypeId) {
        self.instantiation_cache
            .borrow_mut()
            .insert((def, args), result);
    }

    pub fn enter_instantiation(&self) -> bool {
        let depth = self.instantiation_depth.get();
        if depth >= sharpts_common::limits::MAX_INSTANTIATION_DEPTH {
            return false;
        }
        self.instantiation_depth.set(depth + 1);
        true
    }

    pub fn leave_instantiation(&self) {
        let depth = self.instantiation_depth.get();
        self.instantiation_depth.set(depth.saturating_sub(1));
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}
