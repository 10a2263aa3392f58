//! Utility-type semantics and round-trip laws.

use crate::evaluate::evaluate_type;
use crate::intern::TypeInterner;
use crate::types::*;
use crate::utilities::apply_utility;

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

fn fields_of(interner: &TypeInterner, ty: TypeId) -> Vec<(String, PropInfo)> {
    match interner.lookup(evaluate_type(interner, ty)) {
        TypeKey::Record(record) => record.fields,
        other => panic!("expected record, got {other:?}"),
    }
}

#[test]
fn partial_makes_every_property_optional() {
    let interner = TypeInterner::new();
    let obj = record(&interner, &[("a", TypeId::NUMBER, false), ("b", TypeId::STRING, false)]);
    let partial = apply_utility(&interner, "Partial", &[obj]).unwrap();
    assert!(fields_of(&interner, partial).iter().all(|(_, p)| p.optional));
}

#[test]
fn required_removes_optionality() {
    let interner = TypeInterner::new();
    let obj = record(&interner, &[("a", TypeId::NUMBER, true), ("b", TypeId::STRING, true)]);
    let required = apply_utility(&interner, "Required", &[obj]).unwrap();
    assert!(fields_of(&interner, required).iter().all(|(_, p)| !p.optional));
}

#[test]
fn readonly_marks_all_properties() {
    let interner = TypeInterner::new();
    let obj = record(&interner, &[("a", TypeId::NUMBER, false)]);
    let readonly = apply_utility(&interner, "Readonly", &[obj]).unwrap();
    assert!(fields_of(&interner, readonly).iter().all(|(_, p)| p.readonly));
}

#[test]
fn partial_of_required_equals_partial() {
    let interner = TypeInterner::new();
    let obj = record(&interner, &[("a", TypeId::NUMBER, true), ("b", TypeId::STRING, false)]);
    let required = apply_utility(&interner, "Required", &[obj]).unwrap();
    let partial_of_required = apply_utility(&interner, "Partial", &[required]).unwrap();
    let partial = apply_utility(&interner, "Partial", &[obj]).unwrap();
    assert_eq!(
        fields_of(&interner, partial_of_required),
        fields_of(&interner, partial)
    );
}

#[test]
fn record_utility_builds_fields_from_literal_keys() {
    let interner = TypeInterner::new();
    let a = interner.string_literal("a");
    let b = interner.string_literal("b");
    let keys = interner.union(vec![a, b]);
    let result = apply_utility(&interner, "Record", &[keys, TypeId::NUMBER]).unwrap();
    let fields = fields_of(&interner, result);
    assert_eq!(fields.len(), 2);
    assert!(fields.iter().all(|(_, p)| p.ty == TypeId::NUMBER));
}

#[test]
fn record_utility_with_wide_key_becomes_index_signature() {
    let interner = TypeInterner::new();
    let result = apply_utility(&interner, "Record", &[TypeId::STRING, TypeId::NUMBER]).unwrap();
    match interner.lookup(evaluate_type(&interner, result)) {
        TypeKey::Record(record) => {
            assert!(record.fields.is_empty());
            assert_eq!(record.indexes.string_index, Some(TypeId::NUMBER));
        }
        other => panic!("expected record, got {other:?}"),
    }
}

#[test]
fn pick_preserves_optionality_and_omit_complements() {
    let interner = TypeInterner::new();
    let obj = record(
        &interner,
        &[
            ("a", TypeId::NUMBER, false),
            ("b", TypeId::STRING, true),
            ("c", TypeId::BOOLEAN, false),
        ],
    );
    let key_b = interner.string_literal("b");
    let picked = apply_utility(&interner, "Pick", &[obj, key_b]).unwrap();
    let picked_fields = fields_of(&interner, picked);
    assert_eq!(picked_fields.len(), 1);
    assert_eq!(picked_fields[0].0, "b");
    assert!(picked_fields[0].1.optional);

    let omitted = apply_utility(&interner, "Omit", &[obj, key_b]).unwrap();
    let omitted_fields = fields_of(&interner, omitted);
    let names: Vec<&str> = omitted_fields.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[test]
fn return_type_and_parameters_extract_signatures() {
    let interner = TypeInterner::new();
    let f = interner.intern(TypeKey::Function(FunctionType::simple(
        vec![
            ParamInfo {
                name: "x".into(),
                ty: TypeId::NUMBER,
                optional: false,
                rest: false,
            },
            ParamInfo {
                name: "y".into(),
                ty: TypeId::STRING,
                optional: true,
                rest: false,
            },
        ],
        TypeId::BOOLEAN,
    )));
    assert_eq!(
        apply_utility(&interner, "ReturnType", &[f]).unwrap(),
        TypeId::BOOLEAN
    );
    let params = apply_utility(&interner, "Parameters", &[f]).unwrap();
    match interner.lookup(params) {
        TypeKey::Tuple(tuple) => {
            assert_eq!(tuple.elements.len(), 2);
            assert_eq!(tuple.required_count, 1);
            assert_eq!(tuple.elements[0].name.as_deref(), Some("x"));
        }
        other => panic!("expected tuple, got {other:?}"),
    }
    // Non-callable: never.
    assert_eq!(
        apply_utility(&interner, "ReturnType", &[TypeId::NUMBER]).unwrap(),
        TypeId::NEVER
    );
}

#[test]
fn awaited_unwraps_nested_promises() {
    let interner = TypeInterner::new();
    let nested = interner.promise(interner.promise(TypeId::NUMBER));
    assert_eq!(
        apply_utility(&interner, "Awaited", &[nested]).unwrap(),
        TypeId::NUMBER
    );
}

#[test]
fn nonnullable_strips_null_and_undefined() {
    let interner = TypeInterner::new();
    let nullable = interner.union(vec![TypeId::NUMBER, TypeId::NULL, TypeId::UNDEFINED]);
    assert_eq!(
        apply_utility(&interner, "NonNullable", &[nullable]).unwrap(),
        TypeId::NUMBER
    );
    // NonNullable<T | null | undefined> == NonNullable<T>.
    let t = interner.union(vec![TypeId::NUMBER, TypeId::STRING]);
    let t_nullable = interner.union(vec![t, TypeId::NULL, TypeId::UNDEFINED]);
    assert_eq!(
        apply_utility(&interner, "NonNullable", &[t_nullable]).unwrap(),
        apply_utility(&interner, "NonNullable", &[t]).unwrap()
    );
}

#[test]
fn exclude_and_extract_laws() {
    let interner = TypeInterner::new();
    let t = interner.union(vec![TypeId::NUMBER, TypeId::STRING, TypeId::BOOLEAN]);
    // Exclude<T, never> == T
    assert_eq!(
        apply_utility(&interner, "Exclude", &[t, TypeId::NEVER]).unwrap(),
        t
    );
    // Extract<T, any> == T
    assert_eq!(
        apply_utility(&interner, "Extract", &[t, TypeId::ANY]).unwrap(),
        t
    );
    // Exclude<string | number, string> == number
    let excluded = apply_utility(&interner, "Exclude", &[t, TypeId::STRING]).unwrap();
    assert_eq!(
        excluded,
        interner.union(vec![TypeId::NUMBER, TypeId::BOOLEAN])
    );
}

#[test]
fn case_intrinsics_distribute_over_unions() {
    let interner = TypeInterner::new();
    let a = interner.string_literal("ab");
    let b = interner.string_literal("cd");
    let both = interner.union(vec![a, b]);
    let upper = apply_utility(&interner, "Uppercase", &[both]).unwrap();
    assert_eq!(
        upper,
        interner.union(vec![
            interner.string_literal("AB"),
            interner.string_literal("CD")
        ])
    );
    assert_eq!(
        apply_utility(&interner, "Capitalize", &[a]).unwrap(),
        interner.string_literal("Ab")
    );
    assert_eq!(
        apply_utility(&interner, "Uncapitalize", &[interner.string_literal("Xy")]).unwrap(),
        interner.string_literal("xy")
    );
}

#[test]
fn unknown_name_is_not_a_utility() {
    let interner = TypeInterner::new();
    assert!(apply_utility(&interner, "MyAlias", &[TypeId::NUMBER]).is_none());
}
