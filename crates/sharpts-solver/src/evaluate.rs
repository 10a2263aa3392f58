//! On-demand expansion of lazy type forms.
//!
//! `keyof`, indexed access, conditional, mapped, and template-literal
//! types are expanded here, memoized per input id. Expansion distributes
//! over unions the way TypeScript does; hitting a naked type parameter
//! preserves laziness (the form is returned unchanged and re-expanded
//! after substitution).

use sharpts_common::limits;

use crate::TypeInterner;
use crate::compat::is_compatible;
use crate::instantiate::{TypeSubstitution, instantiate_type};
use crate::shape::shape_of;
use crate::types::*;

/// Expand a type until it is no longer a lazy form (or until expansion
/// is blocked on a free type parameter). Idempotent: expanding an
/// already-expanded form returns an equal type.
pub fn evaluate_type(interner: &TypeInterner, ty: TypeId) -> TypeId {
    if let Some(cached) = interner.cached_evaluation(ty) {
        return cached;
    }
    if !interner.enter_instantiation() {
        return TypeId::ERROR;
    }
    let result = evaluate_inner(interner, ty);
    interner.leave_instantiation();
    // Only cache resolved results; a lazy form blocked on a type
    // parameter must re-expand after substitution.
    if result != ty || !interner.lookup(ty).is_lazy() {
        interner.cache_evaluation(ty, result);
    }
    result
}

fn evaluate_inner(interner: &TypeInterner, ty: TypeId) -> TypeId {
    match interner.lookup(ty) {
        TypeKey::KeyOf(source) => evaluate_keyof(interner, ty, source),
        TypeKey::IndexedAccess { object, index } => {
            evaluate_indexed_access(interner, ty, object, index)
        }
        TypeKey::Conditional(conditional) => evaluate_conditional(interner, ty, &conditional),
        TypeKey::Mapped(mapped) => evaluate_mapped(interner, ty, &mapped),
        TypeKey::TemplateLiteral { quasis, types } => {
            evaluate_template(interner, ty, &quasis, &types)
        }
        TypeKey::Union(members) => {
            let evaluated: Vec<TypeId> = members
                .iter()
                .map(|&m| evaluate_type(interner, m))
                .collect();
            if evaluated == members {
                ty
            } else {
                interner.union(evaluated)
            }
        }
        TypeKey::Intersection(members) => {
            let evaluated: Vec<TypeId> = members
                .iter()
                .map(|&m| evaluate_type(interner, m))
                .collect();
            if evaluated == members {
                ty
            } else {
                interner.intersection(evaluated)
            }
        }
        _ => ty,
    }
}

fn is_free(interner: &TypeInterner, ty: TypeId) -> bool {
    matches!(
        interner.lookup(ty),
        TypeKey::TypeParameter(_) | TypeKey::Infer(_)
    )
}

/// Blocked on a type parameter, directly or through another lazy form
/// that could not expand yet.
fn is_unresolved(interner: &TypeInterner, ty: TypeId) -> bool {
    is_free(interner, ty) || interner.lookup(ty).is_lazy()
}

// =============================================================================
// keyof
// =============================================================================

fn evaluate_keyof(interner: &TypeInterner, original: TypeId, source: TypeId) -> TypeId {
    let source = evaluate_type(interner, source);
    if is_free(interner, source) {
        return original;
    }
    match interner.lookup(source) {
        TypeKey::Any => interner.union(vec![TypeId::STRING, TypeId::NUMBER, TypeId::SYMBOL]),
        TypeKey::Array(_) => TypeId::NUMBER,
        TypeKey::Tuple(tuple) => {
            let keys: Vec<TypeId> = tuple
                .elements
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.rest)
                .map(|(i, _)| interner.string_literal(&i.to_string()))
                .collect();
            interner.union(keys)
        }
        TypeKey::Union(members) => {
            // keyof (A | B) is the keys common to every member.
            let mut key_sets: Vec<Vec<TypeId>> = Vec::new();
            for member in members {
                let keys = evaluate_keyof(interner, original, member);
                match interner.lookup(keys) {
                    TypeKey::Union(ks) => key_sets.push(ks),
                    _ => key_sets.push(vec![keys]),
                }
            }
            let Some(first) = key_sets.first().cloned() else {
                return TypeId::NEVER;
            };
            let common: Vec<TypeId> = first
                .into_iter()
                .filter(|k| key_sets.iter().all(|set| set.contains(k)))
                .collect();
            interner.union(common)
        }
        _ => match shape_of(interner, source) {
            Some(shape) => {
                let mut keys: Vec<TypeId> = shape
                    .props
                    .iter()
                    .map(|(name, _)| interner.string_literal(name))
                    .collect();
                if shape.indexes.string_index.is_some() {
                    keys.push(TypeId::STRING);
                }
                if shape.indexes.number_index.is_some() {
                    keys.push(TypeId::NUMBER);
                }
                interner.union(keys)
            }
            None => TypeId::NEVER,
        },
    }
}

// =============================================================================
// Indexed access
// =============================================================================

fn evaluate_indexed_access(
    interner: &TypeInterner,
    original: TypeId,
    object: TypeId,
    index: TypeId,
) -> TypeId {
    let object = evaluate_type(interner, object);
    let index = evaluate_type(interner, index);
    if is_unresolved(interner, object) || is_unresolved(interner, index) {
        return original;
    }

    // Distribute over index unions: T[A | B] == T[A] | T[B].
    if let TypeKey::Union(members) = interner.lookup(index) {
        let parts: Vec<TypeId> = members
            .iter()
            .map(|&m| evaluate_indexed_access(interner, original, object, m))
            .collect();
        return interner.union(parts);
    }
    // And over object unions.
    if let TypeKey::Union(members) = interner.lookup(object) {
        let parts: Vec<TypeId> = members
            .iter()
            .map(|&m| evaluate_indexed_access(interner, original, m, index))
            .collect();
        return interner.union(parts);
    }

    match (interner.lookup(object), interner.lookup(index)) {
        (TypeKey::Any, _) => TypeId::ANY,
        (TypeKey::Array(element), TypeKey::Number | TypeKey::NumberLiteral(_)) => element,
        (TypeKey::Tuple(tuple), TypeKey::NumberLiteral(bits)) => {
            let idx = bits.as_f64();
            if idx < 0.0 || idx.fract() != 0.0 {
                return TypeId::ERROR;
            }
            match tuple.elements.get(idx as usize) {
                Some(element) if !element.rest => element.type_id,
                _ => {
                    if tuple.has_spread {
                        // A rest element absorbs any remaining index.
                        tuple
                            .elements
                            .iter()
                            .find(|e| e.rest)
                            .map(|e| e.type_id)
                            .unwrap_or(TypeId::ERROR)
                    } else {
                        TypeId::ERROR
                    }
                }
            }
        }
        (TypeKey::Tuple(tuple), TypeKey::Number) => {
            let members: Vec<TypeId> = tuple.elements.iter().map(|e| e.type_id).collect();
            interner.union(members)
        }
        (_, TypeKey::StringLiteral(name)) => match shape_of(interner, object) {
            Some(shape) => match shape.find(&name) {
                Some(prop) => prop.ty,
                None => shape.indexes.string_index.unwrap_or(TypeId::ERROR),
            },
            None => TypeId::ERROR,
        },
        (_, TypeKey::String) => match shape_of(interner, object) {
            Some(shape) => {
                if let Some(string_index) = shape.indexes.string_index {
                    string_index
                } else {
                    let members: Vec<TypeId> =
                        shape.props.iter().map(|(_, p)| p.ty).collect();
                    interner.union(members)
                }
            }
            None => TypeId::ERROR,
        },
        (_, TypeKey::Number) => match shape_of(interner, object) {
            Some(shape) => shape.indexes.number_index.unwrap_or(TypeId::ERROR),
            None => TypeId::ERROR,
        },
        _ => TypeId::ERROR,
    }
}

// =============================================================================
// Conditional types
// =============================================================================

fn evaluate_conditional(
    interner: &TypeInterner,
    original: TypeId,
    conditional: &ConditionalType,
) -> TypeId {
    let check = evaluate_type(interner, conditional.check_type);
    if is_unresolved(interner, check) {
        return original;
    }

    // Distribution over a union check type.
    if conditional.is_distributive {
        if let TypeKey::Union(members) = interner.lookup(check) {
            let parts: Vec<TypeId> = members
                .iter()
                .map(|&member| {
                    let branch = interner.conditional(ConditionalType {
                        check_type: member,
                        extends_type: conditional.extends_type,
                        true_type: conditional.true_type,
                        false_type: conditional.false_type,
                        is_distributive: false,
                    });
                    evaluate_type(interner, branch)
                })
                .collect();
            return interner.union(parts);
        }
    }

    let mut bindings = TypeSubstitution::new();
    let matched = match_extends(interner, conditional.extends_type, check, &mut bindings);
    let branch = if matched {
        conditional.true_type
    } else {
        conditional.false_type
    };
    let substituted = instantiate_type(interner, branch, &bindings);
    evaluate_type(interner, substituted)
}

/// Match a check type against an extends pattern, binding `infer`
/// placeholders. Without placeholders this is plain compatibility.
fn match_extends(
    interner: &TypeInterner,
    pattern: TypeId,
    target: TypeId,
    bindings: &mut TypeSubstitution,
) -> bool {
    match interner.lookup(pattern) {
        TypeKey::Infer(name) => {
            if let Some(existing) = bindings.get(&name) {
                let merged = interner.union(vec![existing, target]);
                bindings.insert(name, merged);
            } else {
                bindings.insert(name, target);
            }
            true
        }
        TypeKey::Array(p_elem) => match interner.lookup(target) {
            TypeKey::Array(t_elem) => match_extends(interner, p_elem, t_elem, bindings),
            TypeKey::Tuple(tuple) => {
                let element_union =
                    interner.union(tuple.elements.iter().map(|e| e.type_id).collect());
                match_extends(interner, p_elem, element_union, bindings)
            }
            _ => false,
        },
        TypeKey::Promise(p_inner) => match interner.lookup(target) {
            TypeKey::Promise(t_inner) => match_extends(interner, p_inner, t_inner, bindings),
            _ => false,
        },
        TypeKey::Tuple(p_tuple) => match interner.lookup(target) {
            TypeKey::Tuple(t_tuple) => {
                match_tuple_extends(interner, &p_tuple, &t_tuple, bindings)
            }
            _ => false,
        },
        TypeKey::Function(p_func) => match interner.lookup(target) {
            TypeKey::Function(t_func) => {
                if !match_extends(interner, p_func.ret, t_func.ret, bindings) {
                    return false;
                }
                for (p, t) in p_func.params.iter().zip(t_func.params.iter()) {
                    if !match_extends(interner, p.ty, t.ty, bindings) {
                        return false;
                    }
                }
                true
            }
            _ => false,
        },
        TypeKey::Record(p_record) => {
            let Some(target_shape) = shape_of(interner, target) else {
                return false;
            };
            for (name, p_prop) in &p_record.fields {
                let Some(t_prop) = target_shape.find(name) else {
                    return p_prop.optional;
                };
                if !match_extends(interner, p_prop.ty, t_prop.ty, bindings) {
                    return false;
                }
            }
            true
        }
        _ => is_compatible(interner, pattern, target),
    }
}

fn match_tuple_extends(
    interner: &TypeInterner,
    pattern: &TupleType,
    target: &TupleType,
    bindings: &mut TypeSubstitution,
) -> bool {
    let mut target_iter = target.elements.iter();
    for p_elem in &pattern.elements {
        if p_elem.rest {
            // Bind the rest pattern to the remaining elements as a tuple.
            let rest: Vec<TupleElement> = target_iter.cloned().collect();
            let rest_tuple = interner.tuple(rest);
            return match_extends(interner, p_elem.type_id, rest_tuple, bindings);
        }
        match target_iter.next() {
            Some(t_elem) => {
                if !match_extends(interner, p_elem.type_id, t_elem.type_id, bindings) {
                    return false;
                }
            }
            None => return p_elem.optional,
        }
    }
    target_iter.next().is_none()
}

// =============================================================================
// Mapped types
// =============================================================================

fn evaluate_mapped(interner: &TypeInterner, original: TypeId, mapped: &MappedType) -> TypeId {
    let constraint = evaluate_type(interner, mapped.constraint);
    if is_unresolved(interner, constraint) {
        return original;
    }

    // Homomorphic mapped types (`[K in keyof T]`) preserve source
    // optionality and readonly-ness.
    let homomorphic_source = match interner.lookup(mapped.constraint) {
        TypeKey::KeyOf(source) => {
            let source = evaluate_type(interner, source);
            shape_of(interner, source)
        }
        _ => None,
    };

    let keys: Vec<TypeId> = match interner.lookup(constraint) {
        TypeKey::Union(members) => members,
        TypeKey::Never => Vec::new(),
        _ => vec![constraint],
    };

    let mut fields: Vec<(String, PropInfo)> = Vec::new();
    let mut indexes = IndexSignatures::default();

    for key in keys {
        let mut subst = TypeSubstitution::new();
        subst.insert(mapped.param.clone(), key);

        // Key remapping via `as`.
        let out_key = match mapped.as_clause {
            Some(as_clause) => {
                let remapped = instantiate_type(interner, as_clause, &subst);
                evaluate_type(interner, remapped)
            }
            None => key,
        };
        if out_key == TypeId::NEVER {
            continue;
        }

        let value = instantiate_type(interner, mapped.value, &subst);
        let value = evaluate_type(interner, value);

        match interner.lookup(out_key) {
            TypeKey::StringLiteral(name) => {
                let source_prop = homomorphic_source
                    .as_ref()
                    .and_then(|s| s.find(&name))
                    .copied();
                let optional = match mapped.optional {
                    MappedModifier::Add => true,
                    MappedModifier::Remove => false,
                    MappedModifier::None => source_prop.is_some_and(|p| p.optional),
                };
                let readonly = match mapped.readonly {
                    MappedModifier::Add => true,
                    MappedModifier::Remove => false,
                    MappedModifier::None => source_prop.is_some_and(|p| p.readonly),
                };
                fields.push((
                    name,
                    PropInfo {
                        ty: value,
                        optional,
                        readonly,
                    },
                ));
            }
            TypeKey::NumberLiteral(bits) => {
                fields.push((
                    sharpts_common::numeric::format_number(bits.as_f64()),
                    PropInfo {
                        ty: value,
                        optional: mapped.optional == MappedModifier::Add,
                        readonly: mapped.readonly == MappedModifier::Add,
                    },
                ));
            }
            TypeKey::String => indexes.string_index = Some(value),
            TypeKey::Number => indexes.number_index = Some(value),
            TypeKey::Symbol => indexes.symbol_index = Some(value),
            _ => {}
        }
    }

    interner.intern(TypeKey::Record(RecordType { fields, indexes }))
}

// =============================================================================
// Template literal types
// =============================================================================

/// The number of strings a template-literal type would expand to, or
/// `None` when a slot is not a finite set of literals.
pub fn template_expansion_size(interner: &TypeInterner, types: &[TypeId]) -> Option<usize> {
    let mut total: usize = 1;
    for &ty in types {
        let count = literal_strings(interner, evaluate_type(interner, ty))?.len();
        total = total.checked_mul(count.max(1))?;
    }
    Some(total)
}

fn literal_strings(interner: &TypeInterner, ty: TypeId) -> Option<Vec<String>> {
    match interner.lookup(ty) {
        TypeKey::StringLiteral(s) => Some(vec![s]),
        TypeKey::NumberLiteral(bits) => {
            Some(vec![sharpts_common::numeric::format_number(bits.as_f64())])
        }
        TypeKey::BooleanLiteral(b) => Some(vec![b.to_string()]),
        TypeKey::Union(members) => {
            let mut all = Vec::new();
            for member in members {
                all.extend(literal_strings(interner, member)?);
            }
            Some(all)
        }
        _ => None,
    }
}

fn evaluate_template(
    interner: &TypeInterner,
    original: TypeId,
    quasis: &[String],
    types: &[TypeId],
) -> TypeId {
    if types.is_empty() {
        return interner.string_literal(&quasis.concat());
    }
    let mut slots: Vec<Vec<String>> = Vec::with_capacity(types.len());
    for &ty in types {
        let evaluated = evaluate_type(interner, ty);
        if is_free(interner, evaluated) {
            return original;
        }
        match literal_strings(interner, evaluated) {
            Some(strings) => slots.push(strings),
            // A wide slot (`string`, `number`) makes the whole template
            // only as precise as `string`.
            None => return TypeId::STRING,
        }
    }

    let total = slots
        .iter()
        .fold(1usize, |acc, s| acc.saturating_mul(s.len().max(1)));
    if total > limits::MAX_TEMPLATE_EXPANSION {
        return TypeId::ERROR;
    }

    // Cartesian product over the slots, in slot order.
    let mut results: Vec<String> = vec![quasis[0].clone()];
    for (i, slot) in slots.iter().enumerate() {
        let mut next = Vec::with_capacity(results.len() * slot.len().max(1));
        for prefix in &results {
            for value in slot {
                let mut s = prefix.clone();
                s.push_str(value);
                s.push_str(&quasis[i + 1]);
                next.push(s);
            }
        }
        results = next;
    }

    let members: Vec<TypeId> = results
        .iter()
        .map(|s| interner.string_literal(s))
        .collect();
    interner.union(members)
}
