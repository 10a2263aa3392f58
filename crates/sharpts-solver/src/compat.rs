//! Structural compatibility (assignability).
//!
//! `is_compatible(expected, actual)` answers "may a value of type
//! `actual` flow into a position of type `expected`". Rules follow the
//! TypeScript lattice: `any` is mutually compatible with everything,
//! `unknown` accepts everything, `never` is the bottom, literals widen
//! to their primitives, arrays are covariant, function parameters are
//! bivariant (method-parameter behavior) and returns covariant, classes
//! are nominal but satisfy structural shapes through their public
//! members.
//!
//! Recursive types are handled coinductively: a pair already in
//! progress is assumed compatible.

use std::cell::RefCell;

use rustc_hash::FxHashSet;

use crate::TypeInterner;
use crate::evaluate::evaluate_type;
use crate::shape::{class_of_instance, shape_of};
use crate::types::*;

thread_local! {
    static IN_PROGRESS: RefCell<FxHashSet<(TypeId, TypeId)>> =
        RefCell::new(FxHashSet::default());
}

/// Structural assignability check.
pub fn is_compatible(interner: &TypeInterner, expected: TypeId, actual: TypeId) -> bool {
    let expected = evaluate_type(interner, expected);
    let actual = evaluate_type(interner, actual);

    if expected == actual {
        return true;
    }
    if expected == TypeId::ERROR || actual == TypeId::ERROR {
        // Poison: the error was already reported.
        return true;
    }
    if expected == TypeId::ANY || actual == TypeId::ANY {
        return true;
    }
    if expected == TypeId::UNKNOWN {
        return true;
    }
    if actual == TypeId::UNKNOWN {
        return false;
    }
    if actual == TypeId::NEVER {
        return true;
    }
    if expected == TypeId::NEVER {
        return false;
    }

    let pair = (expected, actual);
    let already = IN_PROGRESS.with(|set| !set.borrow_mut().insert(pair));
    if already {
        return true;
    }
    let result = compatible_inner(interner, expected, actual);
    IN_PROGRESS.with(|set| {
        set.borrow_mut().remove(&pair);
    });
    result
}

fn compatible_inner(interner: &TypeInterner, expected: TypeId, actual: TypeId) -> bool {
    let expected_key = interner.lookup(expected);
    let actual_key = interner.lookup(actual);

    // A union source: every branch must be accepted.
    if let TypeKey::Union(members) = &actual_key {
        return members
            .iter()
            .all(|&m| is_compatible(interner, expected, m));
    }
    // An intersection target: every branch must accept the source.
    if let TypeKey::Intersection(members) = &expected_key {
        return members
            .iter()
            .all(|&m| is_compatible(interner, m, actual));
    }
    // A union target: some branch accepts the source.
    if let TypeKey::Union(members) = &expected_key {
        return members
            .iter()
            .any(|&m| is_compatible(interner, m, actual));
    }
    // An intersection source: some branch satisfies the target.
    if let TypeKey::Intersection(members) = &actual_key {
        return members
            .iter()
            .any(|&m| is_compatible(interner, expected, m));
    }

    match (&expected_key, &actual_key) {
        // Literal widening.
        (TypeKey::String, TypeKey::StringLiteral(_)) => true,
        (TypeKey::Number, TypeKey::NumberLiteral(_)) => true,
        (TypeKey::Boolean, TypeKey::BooleanLiteral(_)) => true,
        (TypeKey::String, TypeKey::TemplateLiteral { .. }) => true,

        // Numeric enums interoperate with number (legacy enum rule);
        // string enums widen to string but not back.
        (TypeKey::Number, TypeKey::Enum(e)) if e.kind == EnumKind::Numeric => true,
        (TypeKey::Enum(e), TypeKey::Number | TypeKey::NumberLiteral(_))
            if e.kind == EnumKind::Numeric =>
        {
            true
        }
        (TypeKey::String, TypeKey::Enum(e)) if e.kind == EnumKind::String => true,
        (TypeKey::Enum(a), TypeKey::Enum(b)) => a.enum_id == b.enum_id,

        (TypeKey::Void, TypeKey::Undefined) => true,

        // Type parameters: a source parameter is usable where its
        // constraint is; a target parameter accepts only itself (handled
        // by the id-equality fast path) or a compatible constraint walk.
        (_, TypeKey::TypeParameter(info)) => match info.constraint {
            Some(constraint) => is_compatible(interner, expected, constraint),
            None => false,
        },
        (TypeKey::TypeParameter(info), _) => match info.constraint {
            // Unsound in general; matches the bivariant leniency the
            // original applies at generic boundaries.
            Some(constraint) => is_compatible(interner, constraint, actual),
            None => false,
        },

        // Arrays are covariant; tuples are compatible with arrays of a
        // compatible element union.
        (TypeKey::Array(e), TypeKey::Array(a)) => is_compatible(interner, *e, *a),
        (TypeKey::Array(e), TypeKey::Tuple(tuple)) => tuple
            .elements
            .iter()
            .all(|el| is_compatible(interner, *e, el.type_id)),
        (TypeKey::Tuple(e), TypeKey::Tuple(a)) => tuple_compatible(interner, e, a),

        (TypeKey::Promise(e), TypeKey::Promise(a)) => is_compatible(interner, *e, *a),

        (TypeKey::Function(e), TypeKey::Function(a)) => function_compatible(interner, e, a),
        (TypeKey::Function(_), TypeKey::Overloaded(signatures)) => signatures
            .iter()
            .any(|&s| is_compatible(interner, expected, s)),
        (TypeKey::Overloaded(expected_sigs), _) => expected_sigs
            .iter()
            .all(|&s| is_compatible(interner, s, actual)),

        // Nominal instances: same class or a superclass of it; an
        // interface target falls through to the structural check below.
        (TypeKey::Instance(e_target), TypeKey::Instance(a_target)) => {
            if instance_extends(interner, *a_target, *e_target) {
                return true;
            }
            structural_check(interner, expected, actual)
        }

        _ => structural_check(interner, expected, actual),
    }
}

/// Does the class behind `derived` walk up to the class behind `base`?
fn instance_extends(interner: &TypeInterner, derived: TypeId, base: TypeId) -> bool {
    let Some((base_class, _)) = class_of_instance(interner, base) else {
        return false;
    };
    let mut current = Some(derived);
    while let Some(target) = current {
        let Some((class, _)) = class_of_instance(interner, target) else {
            return false;
        };
        if class.class_id == base_class.class_id {
            return true;
        }
        current = class.superclass;
    }
    false
}

/// Intrinsic members of values that have no structural shape: strings,
/// arrays, and tuples still satisfy `{ length: number }`-style targets.
fn intrinsic_member(interner: &TypeInterner, actual: TypeId, name: &str) -> Option<TypeId> {
    match interner.lookup(actual) {
        TypeKey::String | TypeKey::StringLiteral(_) | TypeKey::TemplateLiteral { .. } => {
            (name == "length").then_some(TypeId::NUMBER)
        }
        TypeKey::Array(_) | TypeKey::Tuple(_) => (name == "length").then_some(TypeId::NUMBER),
        _ => None,
    }
}

/// Structural fallback: the target must have a member view, and the
/// source must supply every required member compatibly. Index signatures
/// on the target constrain all source properties.
fn structural_check(interner: &TypeInterner, expected: TypeId, actual: TypeId) -> bool {
    if matches!(actual, TypeId::NULL | TypeId::UNDEFINED | TypeId::VOID) {
        return false;
    }
    let Some(expected_shape) = shape_of(interner, expected) else {
        return false;
    };
    let Some(actual_shape) = shape_of(interner, actual) else {
        // Shapeless sources satisfy a target through their intrinsic
        // members (an empty target shape accepts any of them).
        return expected_shape.props.iter().all(|(name, expected_prop)| {
            match intrinsic_member(interner, actual, name) {
                Some(ty) => is_compatible(interner, expected_prop.ty, ty),
                None => expected_prop.optional,
            }
        }) && expected_shape.indexes.string_index.is_none()
            && expected_shape.indexes.number_index.is_none();
    };

    for (name, expected_prop) in &expected_shape.props {
        match actual_shape.find(name) {
            Some(actual_prop) => {
                if !is_compatible(interner, expected_prop.ty, actual_prop.ty) {
                    return false;
                }
            }
            None => {
                if !expected_prop.optional {
                    // A string index on the source can still supply it.
                    match actual_shape.indexes.string_index {
                        Some(index_ty)
                            if is_compatible(interner, expected_prop.ty, index_ty) => {}
                        _ => return false,
                    }
                }
            }
        }
    }

    if let Some(string_index) = expected_shape.indexes.string_index {
        for (_, actual_prop) in &actual_shape.props {
            if !is_compatible(interner, string_index, actual_prop.ty) {
                return false;
            }
        }
        if let Some(actual_index) = actual_shape.indexes.string_index {
            if !is_compatible(interner, string_index, actual_index) {
                return false;
            }
        }
    }
    if let Some(number_index) = expected_shape.indexes.number_index {
        if let Some(actual_index) = actual_shape.indexes.number_index {
            if !is_compatible(interner, number_index, actual_index) {
                return false;
            }
        }
    }
    true
}

fn tuple_compatible(interner: &TypeInterner, expected: &TupleType, actual: &TupleType) -> bool {
    // The source must cover the target's required prefix and must not
    // overflow a target without a rest element.
    if (actual.required_count as usize) < expected.required_count as usize
        && !actual.has_spread
    {
        return false;
    }
    let expected_max = if expected.has_spread {
        usize::MAX
    } else {
        expected.elements.len()
    };
    if actual.elements.len() > expected_max && !actual.has_spread {
        return false;
    }

    let mut expected_rest: Option<TypeId> = None;
    for (i, actual_elem) in actual.elements.iter().enumerate() {
        let expected_ty = match expected.elements.get(i) {
            Some(e) => {
                if e.rest {
                    expected_rest = Some(e.type_id);
                }
                e.type_id
            }
            None => match expected_rest {
                Some(rest) => rest,
                None => return false,
            },
        };
        if !is_compatible(interner, expected_ty, actual_elem.type_id) {
            return false;
        }
    }
    true
}

/// Function compatibility: bivariant parameters (TypeScript
/// method-parameter behavior), covariant return, arity tolerance for
/// sources with fewer parameters.
fn function_compatible(
    interner: &TypeInterner,
    expected: &FunctionType,
    actual: &FunctionType,
) -> bool {
    // The source may not require more arguments than the target
    // supplies.
    let supplied = if expected.has_rest {
        u32::MAX
    } else {
        expected.params.len() as u32
    };
    if actual.min_arity > supplied {
        return false;
    }

    for (e_param, a_param) in expected.params.iter().zip(actual.params.iter()) {
        let forward = is_compatible(interner, a_param.ty, e_param.ty);
        let backward = is_compatible(interner, e_param.ty, a_param.ty);
        if !forward && !backward {
            return false;
        }
    }

    // Covariant return; a void target tolerates any source return.
    if expected.ret == TypeId::VOID {
        return true;
    }
    is_compatible(interner, expected.ret, actual.ret)
}
