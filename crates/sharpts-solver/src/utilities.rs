//! The built-in utility types.
//!
//! `Partial`, `Required`, `Readonly`, and `Record` delegate to the
//! mapped-type machinery (so a naked type-parameter argument stays
//! lazy); the extraction utilities operate directly on evaluated types.

use crate::TypeInterner;
use crate::compat::is_compatible;
use crate::evaluate::evaluate_type;
use crate::shape::shape_of;
use crate::types::*;

/// Apply a utility type by name. Returns `None` when the name is not a
/// built-in utility (the caller then resolves it as a user type).
pub fn apply_utility(interner: &TypeInterner, name: &str, args: &[TypeId]) -> Option<TypeId> {
    let result = match (name, args) {
        ("Partial", [t]) => mapped_over_keys(interner, *t, MappedModifier::Add, MappedModifier::None),
        ("Required", [t]) => {
            mapped_over_keys(interner, *t, MappedModifier::Remove, MappedModifier::None)
        }
        ("Readonly", [t]) => {
            mapped_over_keys(interner, *t, MappedModifier::None, MappedModifier::Add)
        }
        ("Record", [k, v]) => {
            let mapped = interner.intern(TypeKey::Mapped(MappedType {
                param: "K".to_string(),
                constraint: *k,
                value: *v,
                optional: MappedModifier::None,
                readonly: MappedModifier::None,
                as_clause: None,
            }));
            evaluate_type(interner, mapped)
        }
        ("Pick", [t, k]) => pick(interner, *t, *k, false),
        ("Omit", [t, k]) => pick(interner, *t, *k, true),
        ("ReturnType", [f]) => return_type(interner, *f),
        ("Parameters", [f]) => parameters_tuple(interner, *f, false),
        ("ConstructorParameters", [c]) => parameters_tuple(interner, *c, true),
        ("InstanceType", [c]) => instance_type(interner, *c),
        ("Awaited", [t]) => awaited(interner, *t),
        ("NonNullable", [t]) => filter_union(interner, *t, |id| {
            id != TypeId::NULL && id != TypeId::UNDEFINED
        }),
        ("Extract", [t, u]) => {
            let u = *u;
            filter_union(interner, *t, |id| is_compatible(interner, u, id))
        }
        ("Exclude", [t, u]) => {
            let u = *u;
            filter_union(interner, *t, |id| !is_compatible(interner, u, id))
        }
        ("Uppercase", [t]) => case_intrinsic(interner, *t, &|s| s.to_uppercase()),
        ("Lowercase", [t]) => case_intrinsic(interner, *t, &|s| s.to_lowercase()),
        ("Capitalize", [t]) => case_intrinsic(interner, *t, &capitalize),
        ("Uncapitalize", [t]) => case_intrinsic(interner, *t, &uncapitalize),
        _ => return None,
    };
    Some(result)
}

/// `{ [K in keyof T] ...: T[K] }` with the requested modifiers; a naked
/// type-parameter argument keeps the whole form lazy.
fn mapped_over_keys(
    interner: &TypeInterner,
    source: TypeId,
    optional: MappedModifier,
    readonly: MappedModifier,
) -> TypeId {
    let param_name = "K".to_string();
    let key_param = interner.intern(TypeKey::TypeParameter(TypeParamInfo {
        name: param_name.clone(),
        constraint: None,
        default: None,
        is_const: false,
        variance: Variance::Invariant,
    }));
    let constraint = interner.intern(TypeKey::KeyOf(source));
    let value = interner.intern(TypeKey::IndexedAccess {
        object: source,
        index: key_param,
    });
    let mapped = interner.intern(TypeKey::Mapped(MappedType {
        param: param_name,
        constraint,
        value,
        optional,
        readonly,
        as_clause: None,
    }));
    evaluate_type(interner, mapped)
}

fn key_strings(interner: &TypeInterner, keys: TypeId) -> Vec<String> {
    match interner.lookup(evaluate_type(interner, keys)) {
        TypeKey::StringLiteral(s) => vec![s],
        TypeKey::NumberLiteral(bits) => {
            vec![sharpts_common::numeric::format_number(bits.as_f64())]
        }
        TypeKey::Union(members) => members
            .into_iter()
            .flat_map(|m| key_strings(interner, m))
            .collect(),
        _ => Vec::new(),
    }
}

fn pick(interner: &TypeInterner, source: TypeId, keys: TypeId, complement: bool) -> TypeId {
    let source = evaluate_type(interner, source);
    if matches!(
        interner.lookup(source),
        TypeKey::TypeParameter(_) | TypeKey::Infer(_)
    ) {
        // A naked parameter defers to the equivalent mapped form:
        // Pick<T, K> == { [P in K]: T[P] } and
        // Omit<T, K> == { [P in keyof T as P extends K ? never : P]: T[P] }.
        tracing::trace!(complement, "pick deferred on naked type parameter");
        let p = interner.intern(TypeKey::TypeParameter(TypeParamInfo {
            name: "P".to_string(),
            constraint: None,
            default: None,
            is_const: false,
            variance: Variance::Invariant,
        }));
        let value = interner.intern(TypeKey::IndexedAccess {
            object: source,
            index: p,
        });
        let (constraint, as_clause) = if complement {
            let keyof = interner.intern(TypeKey::KeyOf(source));
            let filter = interner.conditional(ConditionalType {
                check_type: p,
                extends_type: keys,
                true_type: TypeId::NEVER,
                false_type: p,
                is_distributive: true,
            });
            (keyof, Some(filter))
        } else {
            (keys, None)
        };
        return interner.intern(TypeKey::Mapped(MappedType {
            param: "P".to_string(),
            constraint,
            value,
            optional: MappedModifier::None,
            readonly: MappedModifier::None,
            as_clause,
        }));
    }
    let Some(shape) = shape_of(interner, source) else {
        return TypeId::ERROR;
    };
    let selected = key_strings(interner, keys);
    let fields: Vec<(String, PropInfo)> = shape
        .props
        .into_iter()
        .filter(|(name, _)| selected.contains(name) != complement)
        .collect();
    interner.intern(TypeKey::Record(RecordType {
        fields,
        indexes: IndexSignatures::default(),
    }))
}

fn return_type(interner: &TypeInterner, f: TypeId) -> TypeId {
    match interner.lookup(evaluate_type(interner, f)) {
        TypeKey::Function(function) => function.ret,
        // The implementation-last convention: overload resolution order
        // makes the final signature the widest.
        TypeKey::Overloaded(signatures) => signatures
            .last()
            .map(|&s| return_type(interner, s))
            .unwrap_or(TypeId::NEVER),
        TypeKey::Union(members) => {
            let parts: Vec<TypeId> = members
                .into_iter()
                .map(|m| return_type(interner, m))
                .collect();
            interner.union(parts)
        }
        _ => TypeId::NEVER,
    }
}

fn parameters_tuple(interner: &TypeInterner, f: TypeId, constructor: bool) -> TypeId {
    let target = evaluate_type(interner, f);
    let function = match interner.lookup(target) {
        TypeKey::Function(function) => Some(function),
        TypeKey::Overloaded(signatures) => signatures.last().and_then(|&s| {
            match interner.lookup(s) {
                TypeKey::Function(function) => Some(function),
                _ => None,
            }
        }),
        TypeKey::Class(class) if constructor => class.ctor.and_then(|ctor| {
            match interner.lookup(ctor) {
                TypeKey::Function(function) => Some(function),
                TypeKey::Overloaded(signatures) => signatures.last().and_then(|&s| {
                    match interner.lookup(s) {
                        TypeKey::Function(function) => Some(function),
                        _ => None,
                    }
                }),
                _ => None,
            }
        }),
        _ => None,
    };
    let Some(function) = function else {
        return TypeId::NEVER;
    };
    let elements: Vec<TupleElement> = function
        .params
        .iter()
        .map(|p| TupleElement {
            type_id: p.ty,
            name: Some(p.name.clone()),
            optional: p.optional,
            rest: p.rest,
        })
        .collect();
    interner.tuple(elements)
}

fn instance_type(interner: &TypeInterner, c: TypeId) -> TypeId {
    let target = evaluate_type(interner, c);
    match interner.lookup(target) {
        TypeKey::Class(_) | TypeKey::InstantiatedGeneric { .. } => {
            interner.intern(TypeKey::Instance(target))
        }
        _ => TypeId::NEVER,
    }
}

/// Recursively unwrap `Promise`, distributing over unions.
fn awaited(interner: &TypeInterner, t: TypeId) -> TypeId {
    match interner.lookup(evaluate_type(interner, t)) {
        TypeKey::Promise(inner) => awaited(interner, inner),
        TypeKey::Union(members) => {
            let parts: Vec<TypeId> = members.into_iter().map(|m| awaited(interner, m)).collect();
            interner.union(parts)
        }
        _ => t,
    }
}

fn filter_union(
    interner: &TypeInterner,
    t: TypeId,
    keep: impl Fn(TypeId) -> bool,
) -> TypeId {
    let t = evaluate_type(interner, t);
    match interner.lookup(t) {
        TypeKey::Union(members) => {
            let kept: Vec<TypeId> = members.into_iter().filter(|&m| keep(m)).collect();
            interner.union(kept)
        }
        _ => {
            if keep(t) {
                t
            } else {
                TypeId::NEVER
            }
        }
    }
}

fn case_intrinsic(
    interner: &TypeInterner,
    t: TypeId,
    transform: &dyn Fn(&str) -> String,
) -> TypeId {
    match interner.lookup(evaluate_type(interner, t)) {
        TypeKey::StringLiteral(s) => interner.string_literal(&transform(&s)),
        TypeKey::Union(members) => {
            let parts: Vec<TypeId> = members
                .into_iter()
                .map(|m| case_intrinsic(interner, m, transform))
                .collect();
            interner.union(parts)
        }
        TypeKey::String => TypeId::STRING,
        _ => t,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn uncapitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
