//! Assignability laws.

use crate::compat::is_compatible;
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

#[test]
fn compatibility_is_reflexive() {
    let interner = TypeInterner::new();
    for ty in [
        TypeId::NUMBER,
        TypeId::STRING,
        TypeId::BOOLEAN,
        TypeId::NULL,
        TypeId::UNDEFINED,
        TypeId::ANY,
        TypeId::UNKNOWN,
        TypeId::NEVER,
    ] {
        assert!(is_compatible(&interner, ty, ty), "{ty:?} not reflexive");
    }
}

#[test]
fn never_is_bottom() {
    let interner = TypeInterner::new();
    assert!(is_compatible(&interner, TypeId::NUMBER, TypeId::NEVER));
    assert!(is_compatible(&interner, TypeId::STRING, TypeId::NEVER));
    assert!(!is_compatible(&interner, TypeId::NEVER, TypeId::NUMBER));
}

#[test]
fn any_and_unknown_lattice() {
    let interner = TypeInterner::new();
    // any is mutually compatible with everything.
    assert!(is_compatible(&interner, TypeId::NUMBER, TypeId::ANY));
    assert!(is_compatible(&interner, TypeId::ANY, TypeId::NUMBER));
    // unknown accepts anything, but flows only into any/unknown.
    assert!(is_compatible(&interner, TypeId::UNKNOWN, TypeId::NUMBER));
    assert!(!is_compatible(&interner, TypeId::NUMBER, TypeId::UNKNOWN));
    assert!(is_compatible(&interner, TypeId::ANY, TypeId::UNKNOWN));
}

#[test]
fn null_and_undefined_are_distinct() {
    let interner = TypeInterner::new();
    assert!(!is_compatible(&interner, TypeId::NULL, TypeId::UNDEFINED));
    assert!(!is_compatible(&interner, TypeId::UNDEFINED, TypeId::NULL));
    assert!(!is_compatible(&interner, TypeId::NUMBER, TypeId::NULL));
    let nullable = interner.union(vec![TypeId::NUMBER, TypeId::NULL]);
    assert!(is_compatible(&interner, nullable, TypeId::NULL));
}

#[test]
fn literals_widen_to_their_primitive() {
    let interner = TypeInterner::new();
    let hello = interner.string_literal("hello");
    let one = interner.number_literal(1.0);
    assert!(is_compatible(&interner, TypeId::STRING, hello));
    assert!(is_compatible(&interner, TypeId::NUMBER, one));
    assert!(is_compatible(&interner, TypeId::BOOLEAN, TypeId::TRUE));
    // The reverse requires narrowing.
    assert!(!is_compatible(&interner, hello, TypeId::STRING));
}

#[test]
fn arrays_are_covariant() {
    let interner = TypeInterner::new();
    let lit = interner.string_literal("a");
    let narrow = interner.array(lit);
    let wide = interner.array(TypeId::STRING);
    assert!(is_compatible(&interner, wide, narrow));
    assert!(!is_compatible(&interner, narrow, wide));
}

#[test]
fn union_source_requires_every_branch() {
    let interner = TypeInterner::new();
    let num_or_str = interner.union(vec![TypeId::NUMBER, TypeId::STRING]);
    // number | string flows into number | string | boolean.
    let wider = interner.union(vec![TypeId::NUMBER, TypeId::STRING, TypeId::BOOLEAN]);
    assert!(is_compatible(&interner, wider, num_or_str));
    // ... but not into number alone.
    assert!(!is_compatible(&interner, TypeId::NUMBER, num_or_str));
    // A single member flows into the union.
    assert!(is_compatible(&interner, num_or_str, TypeId::NUMBER));
}

#[test]
fn structural_records_check_required_members() {
    let interner = TypeInterner::new();
    let expected = record(&interner, &[("a", TypeId::NUMBER, false), ("b", TypeId::STRING, true)]);
    let with_a = record(&interner, &[("a", TypeId::NUMBER, false)]);
    let with_wrong_a = record(&interner, &[("a", TypeId::STRING, false)]);
    let empty = record(&interner, &[]);
    assert!(is_compatible(&interner, expected, with_a));
    assert!(!is_compatible(&interner, expected, with_wrong_a));
    assert!(!is_compatible(&interner, expected, empty));
}

#[test]
fn index_signatures_constrain_all_properties() {
    let interner = TypeInterner::new();
    let expected = interner.intern(TypeKey::Record(RecordType {
        fields: Vec::new(),
        indexes: IndexSignatures {
            string_index: Some(TypeId::NUMBER),
            number_index: None,
            symbol_index: None,
        },
    }));
    let ok = record(&interner, &[("a", TypeId::NUMBER, false)]);
    let bad = record(&interner, &[("a", TypeId::STRING, false)]);
    assert!(is_compatible(&interner, expected, ok));
    assert!(!is_compatible(&interner, expected, bad));
}

#[test]
fn tuples_check_length_and_positions() {
    let interner = TypeInterner::new();
    let pair = interner.tuple(vec![
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
    let swapped = interner.tuple(vec![
        TupleElement {
            type_id: TypeId::STRING,
            name: None,
            optional: false,
            rest: false,
        },
        TupleElement {
            type_id: TypeId::NUMBER,
            name: None,
            optional: false,
            rest: false,
        },
    ]);
    let single = interner.tuple(vec![TupleElement {
        type_id: TypeId::NUMBER,
        name: None,
        optional: false,
        rest: false,
    }]);
    assert!(is_compatible(&interner, pair, pair));
    assert!(!is_compatible(&interner, pair, swapped));
    assert!(!is_compatible(&interner, pair, single));

    // Tuples flow into arrays of a compatible element type.
    let number_or_string = interner.union(vec![TypeId::NUMBER, TypeId::STRING]);
    let array = interner.array(number_or_string);
    assert!(is_compatible(&interner, array, pair));
}

#[test]
fn function_returns_are_covariant_and_params_bivariant() {
    let interner = TypeInterner::new();
    let lit = interner.string_literal("a");
    let takes_string_returns_lit = interner.intern(TypeKey::Function(FunctionType::simple(
        vec![ParamInfo {
            name: "x".into(),
            ty: TypeId::STRING,
            optional: false,
            rest: false,
        }],
        lit,
    )));
    let takes_lit_returns_string = interner.intern(TypeKey::Function(FunctionType::simple(
        vec![ParamInfo {
            name: "x".into(),
            ty: lit,
            optional: false,
            rest: false,
        }],
        TypeId::STRING,
    )));
    // Bivariant parameters accept both directions; the literal return
    // flows covariantly into string.
    assert!(is_compatible(
        &interner,
        takes_lit_returns_string,
        takes_string_returns_lit
    ));

    let returns_number = interner.intern(TypeKey::Function(FunctionType::simple(
        Vec::new(),
        TypeId::NUMBER,
    )));
    let wants_string = interner.intern(TypeKey::Function(FunctionType::simple(
        Vec::new(),
        TypeId::STRING,
    )));
    assert!(!is_compatible(&interner, wants_string, returns_number));

    // A void-returning target tolerates any source return.
    let wants_void = interner.intern(TypeKey::Function(FunctionType::simple(
        Vec::new(),
        TypeId::VOID,
    )));
    assert!(is_compatible(&interner, wants_void, returns_number));
}

#[test]
fn fewer_params_flow_into_more() {
    let interner = TypeInterner::new();
    let nullary = interner.intern(TypeKey::Function(FunctionType::simple(
        Vec::new(),
        TypeId::VOID,
    )));
    let unary = interner.intern(TypeKey::Function(FunctionType::simple(
        vec![ParamInfo {
            name: "x".into(),
            ty: TypeId::NUMBER,
            optional: false,
            rest: false,
        }],
        TypeId::VOID,
    )));
    // A callback taking fewer arguments is fine; the reverse is not.
    assert!(is_compatible(&interner, unary, nullary));
    assert!(!is_compatible(&interner, nullary, unary));
}

#[test]
fn classes_are_nominal_but_satisfy_shapes() {
    let interner = TypeInterner::new();
    let make_class = |name: &str| {
        let class = ClassType {
            class_id: interner.fresh_class_id(),
            name: name.to_string(),
            superclass: None,
            type_params: Vec::new(),
            fields: vec![(
                "x".to_string(),
                FieldInfo {
                    ty: TypeId::NUMBER,
                    flags: MemberFlags::PUBLIC,
                },
            )],
            methods: Vec::new(),
            getters: Vec::new(),
            setters: Vec::new(),
            static_members: Vec::new(),
            ctor: None,
            abstract_methods: Vec::new(),
            abstract_getters: Vec::new(),
            abstract_setters: Vec::new(),
            is_abstract: false,
        };
        let class_id = interner.intern(TypeKey::Class(class));
        interner.intern(TypeKey::Instance(class_id))
    };
    let a = make_class("A");
    let b = make_class("B");
    // Identically shaped but nominally distinct... yet both satisfy the
    // structural shape { x: number }.
    assert!(!is_compatible(&interner, a, b));
    let shape = record(&interner, &[("x", TypeId::NUMBER, false)]);
    assert!(is_compatible(&interner, shape, a));
    assert!(is_compatible(&interner, shape, b));
}

#[test]
fn subclass_instances_flow_into_base() {
    let interner = TypeInterner::new();
    let base = ClassType {
        class_id: interner.fresh_class_id(),
        name: "Base".to_string(),
        superclass: None,
        type_params: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
        getters: Vec::new(),
        setters: Vec::new(),
        static_members: Vec::new(),
        ctor: None,
        abstract_methods: Vec::new(),
        abstract_getters: Vec::new(),
        abstract_setters: Vec::new(),
        is_abstract: false,
    };
    let base_id = interner.intern(TypeKey::Class(base));
    let derived = ClassType {
        class_id: interner.fresh_class_id(),
        name: "Derived".to_string(),
        superclass: Some(base_id),
        type_params: Vec::new(),
        fields: Vec::new(),
        methods: Vec::new(),
        getters: Vec::new(),
        setters: Vec::new(),
        static_members: Vec::new(),
        ctor: None,
        abstract_methods: Vec::new(),
        abstract_getters: Vec::new(),
        abstract_setters: Vec::new(),
        is_abstract: false,
    };
    let derived_id = interner.intern(TypeKey::Class(derived));
    let base_inst = interner.intern(TypeKey::Instance(base_id));
    let derived_inst = interner.intern(TypeKey::Instance(derived_id));
    assert!(is_compatible(&interner, base_inst, derived_inst));
    assert!(!is_compatible(&interner, derived_inst, base_inst));
}
