//! Type-parameter substitution.
//!
//! Rebuilds a type with free type parameters replaced by arguments.
//! During substitution of tuple types, a `Spread(T)` element whose `T`
//! substitutes to a tuple is flattened in place, which is what gives
//! variadic tuples their semantics. Substitution terminates because type
//! parameters do not recurse through themselves; conditional types may
//! re-enter through constraints, which the instantiation-depth budget
//! bounds.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::TypeInterner;
use crate::types::*;

/// A map from type-parameter name to argument.
#[derive(Debug, Clone, Default)]
pub struct TypeSubstitution {
    map: FxHashMap<String, TypeId>,
}

impl TypeSubstitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: TypeId) {
        self.map.insert(name.into(), ty);
    }

    pub fn get(&self, name: &str) -> Option<TypeId> {
        self.map.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Build from declared parameters and explicit arguments, applying
    /// parameter defaults (themselves substituted) for trailing
    /// positions.
    pub fn from_params(
        interner: &TypeInterner,
        params: &[TypeParamInfo],
        args: &[TypeId],
    ) -> Self {
        let mut subst = TypeSubstitution::new();
        for (i, param) in params.iter().enumerate() {
            let arg = match args.get(i) {
                Some(&arg) => arg,
                None => match param.default {
                    Some(default) => instantiate_type(interner, default, &subst),
                    None => param.constraint.unwrap_or(TypeId::UNKNOWN),
                },
            };
            subst.insert(param.name.clone(), arg);
        }
        subst
    }
}

/// Substitute free type parameters in `ty` according to `subst`.
pub fn instantiate_type(interner: &TypeInterner, ty: TypeId, subst: &TypeSubstitution) -> TypeId {
    if subst.is_empty() {
        return ty;
    }
    if !interner.enter_instantiation() {
        return TypeId::ERROR;
    }
    let result = instantiate_inner(interner, ty, subst);
    interner.leave_instantiation();
    result
}

fn instantiate_inner(interner: &TypeInterner, ty: TypeId, subst: &TypeSubstitution) -> TypeId {
    let key = interner.lookup(ty);
    match key {
        TypeKey::TypeParameter(info) => subst.get(&info.name).unwrap_or(ty),
        TypeKey::Infer(name) => subst.get(&name).unwrap_or(ty),
        TypeKey::Array(element) => {
            let new = instantiate_inner(interner, element, subst);
            if new == element { ty } else { interner.array(new) }
        }
        TypeKey::Promise(inner) => {
            let new = instantiate_inner(interner, inner, subst);
            if new == inner { ty } else { interner.promise(new) }
        }
        TypeKey::Spread(inner) => {
            let new = instantiate_inner(interner, inner, subst);
            if new == inner {
                ty
            } else {
                interner.intern(TypeKey::Spread(new))
            }
        }
        TypeKey::Tuple(tuple) => instantiate_tuple(interner, ty, &tuple, subst),
        TypeKey::Union(members) => {
            let new: Vec<TypeId> = members
                .iter()
                .map(|&m| instantiate_inner(interner, m, subst))
                .collect();
            if new == members { ty } else { interner.union(new) }
        }
        TypeKey::Intersection(members) => {
            let new: Vec<TypeId> = members
                .iter()
                .map(|&m| instantiate_inner(interner, m, subst))
                .collect();
            if new == members {
                ty
            } else {
                interner.intersection(new)
            }
        }
        TypeKey::KeyOf(source) => {
            let new = instantiate_inner(interner, source, subst);
            if new == source {
                ty
            } else {
                interner.intern(TypeKey::KeyOf(new))
            }
        }
        TypeKey::IndexedAccess { object, index } => {
            let new_object = instantiate_inner(interner, object, subst);
            let new_index = instantiate_inner(interner, index, subst);
            if new_object == object && new_index == index {
                ty
            } else {
                interner.intern(TypeKey::IndexedAccess {
                    object: new_object,
                    index: new_index,
                })
            }
        }
        TypeKey::Conditional(conditional) => {
            let check = instantiate_inner(interner, conditional.check_type, subst);
            let extends = instantiate_inner(interner, conditional.extends_type, subst);
            let true_type = instantiate_inner(interner, conditional.true_type, subst);
            let false_type = instantiate_inner(interner, conditional.false_type, subst);
            interner.conditional(ConditionalType {
                check_type: check,
                extends_type: extends,
                true_type,
                false_type,
                is_distributive: conditional.is_distributive,
            })
        }
        TypeKey::Mapped(mapped) => {
            // The mapped parameter shadows any outer binding of the same
            // name; substitution must not capture it.
            let constraint = instantiate_inner(interner, mapped.constraint, subst);
            let value = instantiate_shadowed(interner, mapped.value, subst, &mapped.param);
            let as_clause = mapped
                .as_clause
                .map(|a| instantiate_shadowed(interner, a, subst, &mapped.param));
            interner.intern(TypeKey::Mapped(MappedType {
                param: mapped.param.clone(),
                constraint,
                value,
                optional: mapped.optional,
                readonly: mapped.readonly,
                as_clause,
            }))
        }
        TypeKey::TemplateLiteral { quasis, types } => {
            let new: Vec<TypeId> = types
                .iter()
                .map(|&t| instantiate_inner(interner, t, subst))
                .collect();
            if new == types {
                ty
            } else {
                interner.intern(TypeKey::TemplateLiteral { quasis, types: new })
            }
        }
        TypeKey::Record(record) => {
            let fields: Vec<(String, PropInfo)> = record
                .fields
                .iter()
                .map(|(name, prop)| {
                    (
                        name.clone(),
                        PropInfo {
                            ty: instantiate_inner(interner, prop.ty, subst),
                            ..*prop
                        },
                    )
                })
                .collect();
            let indexes = instantiate_indexes(interner, &record.indexes, subst);
            interner.intern(TypeKey::Record(RecordType { fields, indexes }))
        }
        TypeKey::Function(function) => {
            // Bound type parameters of the function shadow outer names.
            let shadowed: Vec<&str> = function
                .type_params
                .iter()
                .map(|p| p.name.as_str())
                .collect();
            let params: Vec<ParamInfo> = function
                .params
                .iter()
                .map(|p| ParamInfo {
                    name: p.name.clone(),
                    ty: instantiate_unless_shadowed(interner, p.ty, subst, &shadowed),
                    optional: p.optional,
                    rest: p.rest,
                })
                .collect();
            let ret = instantiate_unless_shadowed(interner, function.ret, subst, &shadowed);
            let this_type = function
                .this_type
                .map(|t| instantiate_unless_shadowed(interner, t, subst, &shadowed));
            let predicate = function.predicate.as_ref().map(|p| PredicateInfo {
                param: p.param.clone(),
                ty: p
                    .ty
                    .map(|t| instantiate_unless_shadowed(interner, t, subst, &shadowed)),
                asserts: p.asserts,
            });
            interner.intern(TypeKey::Function(FunctionType {
                type_params: function.type_params.clone(),
                params,
                ret,
                min_arity: function.min_arity,
                has_rest: function.has_rest,
                this_type,
                predicate,
            }))
        }
        TypeKey::Overloaded(signatures) => {
            let new: Vec<TypeId> = signatures
                .iter()
                .map(|&s| instantiate_inner(interner, s, subst))
                .collect();
            if new == signatures {
                ty
            } else {
                interner.intern(TypeKey::Overloaded(new))
            }
        }
        TypeKey::InstantiatedGeneric { def, args } => {
            let new_args: SmallVec<[TypeId; 2]> = args
                .iter()
                .map(|&a| instantiate_inner(interner, a, subst))
                .collect();
            if new_args == args {
                ty
            } else {
                interner.intern(TypeKey::InstantiatedGeneric {
                    def,
                    args: new_args,
                })
            }
        }
        TypeKey::Instance(class) => {
            let new = instantiate_inner(interner, class, subst);
            if new == class {
                ty
            } else {
                interner.intern(TypeKey::Instance(new))
            }
        }
        // Classes, interfaces, and enums substitute through
        // `InstantiatedGeneric` wrappers, never in place.
        _ => ty,
    }
}

fn instantiate_indexes(
    interner: &TypeInterner,
    indexes: &IndexSignatures,
    subst: &TypeSubstitution,
) -> IndexSignatures {
    IndexSignatures {
        string_index: indexes
            .string_index
            .map(|t| instantiate_inner(interner, t, subst)),
        number_index: indexes
            .number_index
            .map(|t| instantiate_inner(interner, t, subst)),
        symbol_index: indexes
            .symbol_index
            .map(|t| instantiate_inner(interner, t, subst)),
    }
}

fn instantiate_shadowed(
    interner: &TypeInterner,
    ty: TypeId,
    subst: &TypeSubstitution,
    shadowed: &str,
) -> TypeId {
    instantiate_unless_shadowed(interner, ty, subst, &[shadowed])
}

fn instantiate_unless_shadowed(
    interner: &TypeInterner,
    ty: TypeId,
    subst: &TypeSubstitution,
    shadowed: &[&str],
) -> TypeId {
    if shadowed.is_empty() {
        return instantiate_inner(interner, ty, subst);
    }
    let mut narrowed = TypeSubstitution::new();
    for (name, &id) in subst.map.iter() {
        if !shadowed.contains(&name.as_str()) {
            narrowed.insert(name.clone(), id);
        }
    }
    if narrowed.is_empty() {
        return ty;
    }
    instantiate_inner(interner, ty, &narrowed)
}

/// Tuple substitution with in-place spread flattening:
/// `[E, ...T]` with `T = [number, boolean]` becomes
/// `[E, number, boolean]`.
fn instantiate_tuple(
    interner: &TypeInterner,
    original: TypeId,
    tuple: &TupleType,
    subst: &TypeSubstitution,
) -> TypeId {
    let mut elements: Vec<TupleElement> = Vec::with_capacity(tuple.elements.len());
    let mut changed = false;
    for element in &tuple.elements {
        let new_ty = instantiate_inner(interner, element.type_id, subst);
        if element.rest {
            match interner.lookup(new_ty) {
                TypeKey::Tuple(inner) => {
                    changed = true;
                    elements.extend(inner.elements.iter().cloned());
                    continue;
                }
                TypeKey::Array(item) => {
                    changed = changed || new_ty != element.type_id;
                    elements.push(TupleElement {
                        type_id: item,
                        name: element.name.clone(),
                        optional: false,
                        rest: true,
                    });
                    continue;
                }
                _ => {}
            }
        }
        changed = changed || new_ty != element.type_id;
        elements.push(TupleElement {
            type_id: new_ty,
            ..element.clone()
        });
    }
    if !changed {
        return original;
    }
    interner.tuple(elements)
}
