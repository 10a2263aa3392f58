//! Interner and normalization invariants.

use crate::intern::TypeInterner;
use crate::types::*;

#[test]
fn interning_is_hash_consed() {
    let interner = TypeInterner::new();
    let a = interner.array(TypeId::NUMBER);
    let b = interner.array(TypeId::NUMBER);
    assert_eq!(a, b);

    // Structurally equal tuples compare equal regardless of
    // construction path.
    let t1 = interner.tuple(vec![
        TupleElement {
            type_id: TypeId::NUMBER,
            name: None,
            optional: false,
            rest: false,
        },
        TupleElement {
            type_id: TypeId::STRING,
            name: None,
            optional: false,
            rest: false,
        },
    ]);
    let t2 = interner.tuple(vec![
        TupleElement {
            type_id: TypeId::NUMBER,
            name: None,
            optional: false,
            rest: false,
        },
        TupleElement {
            type_id: TypeId::STRING,
            name: None,
            optional: false,
            rest: false,
        },
    ]);
    assert_eq!(t1, t2);
}

#[test]
fn primitives_have_fixed_ids() {
    let interner = TypeInterner::new();
    assert_eq!(interner.intern(TypeKey::Any), TypeId::ANY);
    assert_eq!(interner.intern(TypeKey::Never), TypeId::NEVER);
    assert_eq!(interner.intern(TypeKey::String), TypeId::STRING);
    assert_eq!(interner.intern(TypeKey::BooleanLiteral(true)), TypeId::TRUE);
}

#[test]
fn union_flattens_and_absorbs_never() {
    let interner = TypeInterner::new();
    let inner = interner.union(vec![TypeId::NUMBER, TypeId::STRING]);
    let outer = interner.union(vec![inner, TypeId::BOOLEAN, TypeId::NEVER]);
    match interner.lookup(outer) {
        TypeKey::Union(members) => {
            assert_eq!(members.len(), 3);
            assert!(members.contains(&TypeId::NUMBER));
            assert!(members.contains(&TypeId::STRING));
            assert!(members.contains(&TypeId::BOOLEAN));
        }
        other => panic!("expected flattened union, got {other:?}"),
    }
}

#[test]
fn singleton_union_collapses() {
    let interner = TypeInterner::new();
    assert_eq!(interner.union(vec![TypeId::NUMBER]), TypeId::NUMBER);
    assert_eq!(
        interner.union(vec![TypeId::NUMBER, TypeId::NUMBER]),
        TypeId::NUMBER
    );
    assert_eq!(interner.union(vec![]), TypeId::NEVER);
}

#[test]
fn union_subsumes_literals_under_their_primitive() {
    let interner = TypeInterner::new();
    let lit = interner.string_literal("a");
    assert_eq!(interner.union(vec![lit, TypeId::STRING]), TypeId::STRING);

    let both_bools = interner.union(vec![TypeId::TRUE, TypeId::FALSE]);
    assert_eq!(both_bools, TypeId::BOOLEAN);
}

#[test]
fn intersection_annihilates_on_never_and_contradiction() {
    let interner = TypeInterner::new();
    assert_eq!(
        interner.intersection(vec![TypeId::NUMBER, TypeId::NEVER]),
        TypeId::NEVER
    );
    assert_eq!(
        interner.intersection(vec![TypeId::NUMBER, TypeId::STRING]),
        TypeId::NEVER
    );
    assert_eq!(
        interner.intersection(vec![TypeId::NUMBER, TypeId::UNKNOWN]),
        TypeId::NUMBER
    );
    assert_eq!(
        interner.intersection(vec![TypeId::NUMBER, TypeId::ANY]),
        TypeId::ANY
    );
}

#[test]
fn tuple_required_count_ignores_optional_and_rest() {
    let interner = TypeInterner::new();
    let id = interner.tuple(vec![
        TupleElement {
            type_id: TypeId::NUMBER,
            name: None,
            optional: false,
            rest: false,
        },
        TupleElement {
            type_id: TypeId::STRING,
            name: None,
            optional: true,
            rest: false,
        },
        TupleElement {
            type_id: TypeId::BOOLEAN,
            name: None,
            optional: false,
            rest: true,
        },
    ]);
    match interner.lookup(id) {
        TypeKey::Tuple(tuple) => {
            assert_eq!(tuple.required_count, 1);
            assert!(tuple.has_spread);
        }
        other => panic!("expected tuple, got {other:?}"),
    }
}
