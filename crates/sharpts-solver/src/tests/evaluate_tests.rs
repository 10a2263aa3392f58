//! Lazy-form expansion: keyof, indexed access, conditionals (with
//! distribution and infer), mapped types, template literals.

use crate::evaluate::evaluate_type;
use crate::instantiate::{TypeSubstitution, instantiate_type};
use crate::intern::TypeInterner;
use crate::types::*;

fn record(interner: &TypeInterner, fields: &[(&str, TypeId, bool)]) -> TypeId {
    interner.intern(TypeKey::Record(RecordType {
        fields: fields
            .iter()
            .map(|(name, ty, optional)| {
                (
                    name.to_string(),
                    PropInfo {
                        ty: *ty,
                        optional: *optional,
                        readonly: false,
                    },
                )
            })
            .collect(),
        indexes: IndexSignatures::default(),
    }))
}

fn type_param(interner: &TypeInterner, name: &str) -> TypeId {
    interner.intern(TypeKey::TypeParameter(TypeParamInfo {
        name: name.to_string(),
        constraint: None,
        default: None,
        is_const: false,
        variance: Variance::Invariant,
    }))
}

#[test]
fn keyof_yields_literal_union() {
    let interner = TypeInterner::new();
    let obj = record(&interner, &[("a", TypeId::NUMBER, false), ("b", TypeId::STRING, false)]);
    let keys = evaluate_type(&interner, interner.intern(TypeKey::KeyOf(obj)));
    let a = interner.string_literal("a");
    let b = interner.string_literal("b");
    assert_eq!(keys, interner.union(vec![a, b]));
}

#[test]
fn keyof_on_naked_parameter_stays_lazy() {
    let interner = TypeInterner::new();
    let t = type_param(&interner, "T");
    let keyof = interner.intern(TypeKey::KeyOf(t));
    assert_eq!(evaluate_type(&interner, keyof), keyof);
}

#[test]
fn indexed_access_resolves_members_and_distributes() {
    let interner = TypeInterner::new();
    let obj = record(&interner, &[("a", TypeId::NUMBER, false), ("b", TypeId::STRING, false)]);
    let a = interner.string_literal("a");
    let b = interner.string_literal("b");

    let t_a = evaluate_type(
        &interner,
        interner.intern(TypeKey::IndexedAccess { object: obj, index: a }),
    );
    assert_eq!(t_a, TypeId::NUMBER);

    let both = interner.union(vec![a, b]);
    let t_both = evaluate_type(
        &interner,
        interner.intern(TypeKey::IndexedAccess { object: obj, index: both }),
    );
    assert_eq!(t_both, interner.union(vec![TypeId::NUMBER, TypeId::STRING]));
}

#[test]
fn tuple_indexing_with_dynamic_number_unions_elements() {
    let interner = TypeInterner::new();
    let tuple = interner.tuple(vec![
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
    let by_index = evaluate_type(
        &interner,
        interner.intern(TypeKey::IndexedAccess {
            object: tuple,
            index: TypeId::NUMBER,
        }),
    );
    assert_eq!(by_index, interner.union(vec![TypeId::NUMBER, TypeId::STRING]));

    let zero = interner.number_literal(0.0);
    let by_literal = evaluate_type(
        &interner,
        interner.intern(TypeKey::IndexedAccess {
            object: tuple,
            index: zero,
        }),
    );
    assert_eq!(by_literal, TypeId::NUMBER);

    // Out of range is a poison type (the checker reports it).
    let five = interner.number_literal(5.0);
    let out = evaluate_type(
        &interner,
        interner.intern(TypeKey::IndexedAccess {
            object: tuple,
            index: five,
        }),
    );
    assert_eq!(out, TypeId::ERROR);
}

#[test]
fn distributive_conditional_distributes_over_union() {
    let interner = TypeInterner::new();
    // string | number extends string ? "yes" : "no", distributive.
    let yes = interner.string_literal("yes");
    let no = interner.string_literal("no");
    let check = interner.union(vec![TypeId::STRING, TypeId::NUMBER]);
    let conditional = interner.conditional(ConditionalType {
        check_type: check,
        extends_type: TypeId::STRING,
        true_type: yes,
        false_type: no,
        is_distributive: true,
    });
    let result = evaluate_type(&interner, conditional);
    assert_eq!(result, interner.union(vec![yes, no]));
}

#[test]
fn non_distributive_conditional_checks_the_whole_union() {
    let interner = TypeInterner::new();
    let yes = interner.string_literal("yes");
    let no = interner.string_literal("no");
    let check = interner.union(vec![TypeId::STRING, TypeId::NUMBER]);
    let conditional = interner.conditional(ConditionalType {
        check_type: check,
        extends_type: TypeId::STRING,
        true_type: yes,
        false_type: no,
        is_distributive: false,
    });
    // string | number as a whole does not extend string.
    assert_eq!(evaluate_type(&interner, conditional), no);
}

#[test]
fn conditional_on_free_parameter_stays_lazy_then_resolves() {
    let interner = TypeInterner::new();
    let t = type_param(&interner, "T");
    let yes = interner.string_literal("yes");
    let no = interner.string_literal("no");
    let conditional = interner.conditional(ConditionalType {
        check_type: t,
        extends_type: TypeId::STRING,
        true_type: yes,
        false_type: no,
        is_distributive: true,
    });
    assert_eq!(evaluate_type(&interner, conditional), conditional);

    let mut subst = TypeSubstitution::new();
    subst.insert("T", TypeId::STRING);
    let instantiated = instantiate_type(&interner, conditional, &subst);
    assert_eq!(evaluate_type(&interner, instantiated), yes);
}

#[test]
fn infer_binds_through_promise_pattern() {
    let interner = TypeInterner::new();
    // Promise<number> extends Promise<infer U> ? U : never
    let u = interner.intern(TypeKey::Infer("U".to_string()));
    let pattern = interner.promise(u);
    let check = interner.promise(TypeId::NUMBER);
    let conditional = interner.conditional(ConditionalType {
        check_type: check,
        extends_type: pattern,
        true_type: u,
        false_type: TypeId::NEVER,
        is_distributive: true,
    });
    assert_eq!(evaluate_type(&interner, conditional), TypeId::NUMBER);
}

#[test]
fn mapped_type_adds_optionality() {
    let interner = TypeInterner::new();
    // { [K in keyof T]?: T[K] } over { a: number; b: string }
    let source = record(&interner, &[("a", TypeId::NUMBER, false), ("b", TypeId::STRING, false)]);
    let k = type_param(&interner, "K");
    let mapped = interner.intern(TypeKey::Mapped(MappedType {
        param: "K".to_string(),
        constraint: interner.intern(TypeKey::KeyOf(source)),
        value: interner.intern(TypeKey::IndexedAccess {
            object: source,
            index: k,
        }),
        optional: MappedModifier::Add,
        readonly: MappedModifier::None,
        as_clause: None,
    }));
    let result = evaluate_type(&interner, mapped);
    match interner.lookup(result) {
        TypeKey::Record(record) => {
            assert_eq!(record.fields.len(), 2);
            assert!(record.fields.iter().all(|(_, p)| p.optional));
            let a = record.fields.iter().find(|(n, _)| n == "a").unwrap();
            assert_eq!(a.1.ty, TypeId::NUMBER);
        }
        other => panic!("expected record, got {other:?}"),
    }
}

#[test]
fn mapped_key_remapping_drops_never_keys() {
    let interner = TypeInterner::new();
    let source = record(&interner, &[("a", TypeId::NUMBER, false), ("b", TypeId::STRING, false)]);
    let k = type_param(&interner, "K");
    // as-clause: K extends "a" ? K : never  (keeps only "a")
    let a_lit = interner.string_literal("a");
    let as_clause = interner.conditional(ConditionalType {
        check_type: k,
        extends_type: a_lit,
        true_type: k,
        false_type: TypeId::NEVER,
        is_distributive: true,
    });
    let mapped = interner.intern(TypeKey::Mapped(MappedType {
        param: "K".to_string(),
        constraint: interner.intern(TypeKey::KeyOf(source)),
        value: interner.intern(TypeKey::IndexedAccess {
            object: source,
            index: k,
        }),
        optional: MappedModifier::None,
        readonly: MappedModifier::None,
        as_clause: Some(as_clause),
    }));
    let result = evaluate_type(&interner, mapped);
    match interner.lookup(result) {
        TypeKey::Record(record) => {
            assert_eq!(record.fields.len(), 1);
            assert_eq!(record.fields[0].0, "a");
        }
        other => panic!("expected record, got {other:?}"),
    }
}

#[test]
fn template_literal_expands_cartesian_product() {
    let interner = TypeInterner::new();
    let a = interner.string_literal("a");
    let b = interner.string_literal("b");
    let x = interner.string_literal("x");
    let y = interner.string_literal("y");
    let left = interner.union(vec![a, b]);
    let right = interner.union(vec![x, y]);
    let template = interner.intern(TypeKey::TemplateLiteral {
        quasis: vec!["".into(), "-".into(), "".into()],
        types: vec![left, right],
    });
    let result = evaluate_type(&interner, template);
    let expected = interner.union(vec![
        interner.string_literal("a-x"),
        interner.string_literal("a-y"),
        interner.string_literal("b-x"),
        interner.string_literal("b-y"),
    ]);
    assert_eq!(result, expected);
}

#[test]
fn template_literal_with_wide_slot_collapses_to_string() {
    let interner = TypeInterner::new();
    let template = interner.intern(TypeKey::TemplateLiteral {
        quasis: vec!["id-".into(), "".into()],
        types: vec![TypeId::STRING],
    });
    assert_eq!(evaluate_type(&interner, template), TypeId::STRING);
}

#[test]
fn oversized_template_expansion_is_rejected() {
    let interner = TypeInterner::new();
    // 22 * 22 * 22 = 10648 > 10000
    let letters: Vec<TypeId> = (0..22)
        .map(|i| interner.string_literal(&format!("k{i}")))
        .collect();
    let slot = interner.union(letters);
    let template = interner.intern(TypeKey::TemplateLiteral {
        quasis: vec!["".into(), "".into(), "".into(), "".into()],
        types: vec![slot, slot, slot],
    });
    assert_eq!(evaluate_type(&interner, template), TypeId::ERROR);
}

#[test]
fn expansion_is_idempotent() {
    let interner = TypeInterner::new();
    let obj = record(&interner, &[("a", TypeId::NUMBER, false)]);
    let keys = interner.intern(TypeKey::KeyOf(obj));
    let once = evaluate_type(&interner, keys);
    let twice = evaluate_type(&interner, once);
    assert_eq!(once, twice);
}

#[test]
fn variadic_tuple_substitution_flattens_and_counts() {
    let interner = TypeInterner::new();
    // [E, ...T] with T = [A?, B] -> required_count = 2 (E and B).
    let t = type_param(&interner, "T");
    let open = interner.tuple(vec![
        TupleElement {
            type_id: TypeId::STRING, // E
            name: None,
            optional: false,
            rest: false,
        },
        TupleElement {
            type_id: t,
            name: None,
            optional: false,
            rest: true,
        },
    ]);
    let arg = interner.tuple(vec![
        TupleElement {
            type_id: TypeId::NUMBER, // A?
            name: None,
            optional: true,
            rest: false,
        },
        TupleElement {
            type_id: TypeId::BOOLEAN, // B
            name: None,
            optional: false,
            rest: false,
        },
    ]);
    let mut subst = TypeSubstitution::new();
    subst.insert("T", arg);
    let result = instantiate_type(&interner, open, &subst);
    match interner.lookup(result) {
        TypeKey::Tuple(tuple) => {
            assert_eq!(tuple.elements.len(), 3);
            assert_eq!(tuple.required_count, 2);
            assert!(!tuple.has_spread);
            assert!(tuple.elements[1].optional);
        }
        other => panic!("expected flattened tuple, got {other:?}"),
    }
}
