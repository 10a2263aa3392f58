//! The built-in global shape environment.
//!
//! The library surface is out of the core's scope; what is installed
//! here are only the shapes the checker needs to accept programs that
//! use `console`, `Math`, `Object`, `Symbol`, `Promise`, `process.argv`,
//! the error classes, and the iteration-protocol interfaces.

use sharpts_solver::types::*;

use crate::context::{BindingKind, CheckerContext};

impl CheckerContext {
    pub fn install_globals(&mut self) {
        self.install_console();
        self.install_math();
        self.install_object();
        self.install_symbol();
        self.install_process();
        self.install_conversions();
        self.install_promise_statics();
        self.install_error_classes();
        self.install_iteration_interfaces();
        self.install_crypto();
        self.install_url();
    }

    fn record(&mut self, fields: Vec<(&str, TypeId)>) -> TypeId {
        self.interner.intern(TypeKey::Record(RecordType {
            fields: fields
                .into_iter()
                .map(|(name, ty)| {
                    (
                        name.to_string(),
                        PropInfo {
                            ty,
                            optional: false,
                            readonly: false,
                        },
                    )
                })
                .collect(),
            indexes: IndexSignatures::default(),
        }))
    }

    fn install_console(&mut self) {
        let log = self.variadic_function(TypeId::VOID);
        let console = self.record(vec![
            ("log", log),
            ("error", log),
            ("warn", log),
            ("info", log),
            ("debug", log),
        ]);
        let _ = self.declare("console", console, BindingKind::Builtin);
    }

    fn install_math(&mut self) {
        let unary = self.simple_function(&[("x", TypeId::NUMBER, false)], TypeId::NUMBER);
        let binary = self.simple_function(
            &[("x", TypeId::NUMBER, false), ("y", TypeId::NUMBER, false)],
            TypeId::NUMBER,
        );
        let spread = {
            let rest = ParamInfo {
                name: "values".to_string(),
                ty: self.interner.array(TypeId::NUMBER),
                optional: false,
                rest: true,
            };
            self.interner.intern(TypeKey::Function(FunctionType::simple(
                vec![rest],
                TypeId::NUMBER,
            )))
        };
        let nullary = self.simple_function(&[], TypeId::NUMBER);
        let math = self.record(vec![
            ("abs", unary),
            ("floor", unary),
            ("ceil", unary),
            ("round", unary),
            ("trunc", unary),
            ("sqrt", unary),
            ("sign", unary),
            ("log", unary),
            ("log2", unary),
            ("log10", unary),
            ("exp", unary),
            ("sin", unary),
            ("cos", unary),
            ("tan", unary),
            ("atan2", binary),
            ("pow", binary),
            ("min", spread),
            ("max", spread),
            ("random", nullary),
            ("PI", TypeId::NUMBER),
            ("E", TypeId::NUMBER),
        ]);
        let _ = self.declare("Math", math, BindingKind::Builtin);
    }

    fn install_object(&mut self) {
        // freeze/seal are identity-typed: <T>(o: T) => T.
        let t = self.interner.intern(TypeKey::TypeParameter(TypeParamInfo {
            name: "T".to_string(),
            constraint: None,
            default: None,
            is_const: false,
            variance: Variance::Invariant,
        }));
        let mut identity = FunctionType::simple(
            vec![ParamInfo {
                name: "o".to_string(),
                ty: t,
                optional: false,
                rest: false,
            }],
            t,
        );
        identity.type_params = vec![TypeParamInfo {
            name: "T".to_string(),
            constraint: None,
            default: None,
            is_const: false,
            variance: Variance::Invariant,
        }];
        let identity = self.interner.intern(TypeKey::Function(identity));

        let predicate = self.simple_function(&[("o", TypeId::ANY, false)], TypeId::BOOLEAN);
        let string_array = self.interner.array(TypeId::STRING);
        let any_array = self.interner.array(TypeId::ANY);
        let keys = self.simple_function(&[("o", TypeId::ANY, false)], string_array);
        let values = self.simple_function(&[("o", TypeId::ANY, false)], any_array);
        let assign = self.variadic_function(TypeId::ANY);
        let object = self.record(vec![
            ("freeze", identity),
            ("seal", identity),
            ("isFrozen", predicate),
            ("isSealed", predicate),
            ("keys", keys),
            ("values", values),
            ("entries", values),
            ("assign", assign),
        ]);
        let _ = self.declare("Object", object, BindingKind::Builtin);
    }

    fn install_symbol(&mut self) {
        let symbol = self.record(vec![
            ("iterator", TypeId::SYMBOL),
            ("asyncIterator", TypeId::SYMBOL),
        ]);
        let _ = self.declare("Symbol", symbol, BindingKind::Builtin);
    }

    fn install_process(&mut self) {
        let string_array = self.interner.array(TypeId::STRING);
        let process = self.record(vec![("argv", string_array)]);
        let _ = self.declare("process", process, BindingKind::Builtin);
    }

    fn install_conversions(&mut self) {
        let to_string = self.simple_function(&[("value", TypeId::ANY, true)], TypeId::STRING);
        let to_number = self.simple_function(&[("value", TypeId::ANY, true)], TypeId::NUMBER);
        let to_boolean = self.simple_function(&[("value", TypeId::ANY, true)], TypeId::BOOLEAN);
        let parse_int = self.simple_function(
            &[("text", TypeId::STRING, false), ("radix", TypeId::NUMBER, true)],
            TypeId::NUMBER,
        );
        let parse_float = self.simple_function(&[("text", TypeId::STRING, false)], TypeId::NUMBER);
        let is_nan = self.simple_function(&[("value", TypeId::NUMBER, false)], TypeId::BOOLEAN);
        let _ = self.declare("String", to_string, BindingKind::Builtin);
        let _ = self.declare("Boolean", to_boolean, BindingKind::Builtin);
        let _ = self.declare("parseInt", parse_int, BindingKind::Builtin);
        let _ = self.declare("parseFloat", parse_float, BindingKind::Builtin);
        let _ = self.declare("isNaN", is_nan, BindingKind::Builtin);

        let is_integer = self.simple_function(&[("value", TypeId::ANY, false)], TypeId::BOOLEAN);
        let is_finite = self.simple_function(&[("value", TypeId::ANY, false)], TypeId::BOOLEAN);
        let number_statics = self.record(vec![
            ("isInteger", is_integer),
            ("isFinite", is_finite),
            ("parseFloat", parse_float),
            ("parseInt", parse_int),
            ("NaN", TypeId::NUMBER),
            ("MAX_SAFE_INTEGER", TypeId::NUMBER),
            ("MIN_SAFE_INTEGER", TypeId::NUMBER),
            ("EPSILON", TypeId::NUMBER),
        ]);
        // `Number` is both a conversion function and a namespace of
        // statics; the record form covers the static surface, and call
        // sites fall back to it being callable via intersection.
        let callable_number = self.interner.intersection(vec![to_number, number_statics]);
        let _ = self.declare("Number", callable_number, BindingKind::Builtin);
    }

    fn install_promise_statics(&mut self) {
        // Promise.resolve: <T>(value: T) => Promise<T>
        let t = self.interner.intern(TypeKey::TypeParameter(TypeParamInfo {
            name: "T".to_string(),
            constraint: None,
            default: None,
            is_const: false,
            variance: Variance::Invariant,
        }));
        let t_promise = self.interner.promise(t);
        let mut resolve = FunctionType::simple(
            vec![ParamInfo {
                name: "value".to_string(),
                ty: t,
                optional: true,
                rest: false,
            }],
            t_promise,
        );
        resolve.type_params = vec![TypeParamInfo {
            name: "T".to_string(),
            constraint: None,
            default: None,
            is_const: false,
            variance: Variance::Invariant,
        }];
        let resolve = self.interner.intern(TypeKey::Function(resolve));

        let any_promise = self.interner.promise(TypeId::ANY);
        let reject = self.simple_function(&[("reason", TypeId::ANY, true)], any_promise);
        let any_array = self.interner.array(TypeId::ANY);
        let array_promise = self.interner.promise(any_array);
        let all = self.simple_function(&[("values", any_array, false)], array_promise);
        let race = self.simple_function(&[("values", any_array, false)], any_promise);

        let statics = self.record(vec![
            ("resolve", resolve),
            ("reject", reject),
            ("all", all),
            ("race", race),
        ]);
        let _ = self.declare("Promise", statics, BindingKind::Builtin);
    }

    fn install_error_classes(&mut self) {
        let message_param = ParamInfo {
            name: "message".to_string(),
            ty: TypeId::STRING,
            optional: true,
            rest: false,
        };
        let mut base_id = None;
        for name in ["Error", "TypeError", "RangeError", "SyntaxError"] {
            let ctor = self
                .interner
                .intern(TypeKey::Function(FunctionType::simple(
                    vec![message_param.clone()],
                    TypeId::VOID,
                )));
            let class = ClassType {
                class_id: self.interner.fresh_class_id(),
                name: name.to_string(),
                superclass: base_id,
                type_params: Vec::new(),
                fields: vec![
                    (
                        "message".to_string(),
                        FieldInfo {
                            ty: TypeId::STRING,
                            flags: MemberFlags::PUBLIC,
                        },
                    ),
                    (
                        "name".to_string(),
                        FieldInfo {
                            ty: TypeId::STRING,
                            flags: MemberFlags::PUBLIC,
                        },
                    ),
                    (
                        "stack".to_string(),
                        FieldInfo {
                            ty: TypeId::STRING,
                            flags: MemberFlags::PUBLIC | MemberFlags::OPTIONAL,
                        },
                    ),
                ],
                methods: Vec::new(),
                getters: Vec::new(),
                setters: Vec::new(),
                static_members: Vec::new(),
                ctor: Some(ctor),
                abstract_methods: Vec::new(),
                abstract_getters: Vec::new(),
                abstract_setters: Vec::new(),
                is_abstract: false,
            };
            let id = self.interner.intern(TypeKey::Class(class));
            if name == "Error" {
                base_id = Some(id);
            }
            self.register_type(name, id);
            let _ = self.declare(name, id, BindingKind::Builtin);
        }
    }

    /// The utility wrapper surfaces: hash/cipher helpers and URL
    /// parsing. The backends supply the implementations; only the
    /// callable shapes live here.
    fn install_crypto(&mut self) {
        let hash = self.simple_function(
            &[
                ("algorithm", TypeId::STRING, false),
                ("data", TypeId::STRING, false),
            ],
            TypeId::STRING,
        );
        let cipher = self.simple_function(
            &[
                ("key", TypeId::STRING, false),
                ("data", TypeId::STRING, false),
            ],
            TypeId::STRING,
        );
        let crypto = self.record(vec![("hash", hash), ("cipher", cipher)]);
        let _ = self.declare("crypto", crypto, BindingKind::Builtin);
    }

    fn install_url(&mut self) {
        let parts = self.record(vec![
            ("protocol", TypeId::STRING),
            ("host", TypeId::STRING),
            ("path", TypeId::STRING),
            ("query", TypeId::STRING),
        ]);
        let parse = self.simple_function(&[("text", TypeId::STRING, false)], parts);
        let url = self.record(vec![("parse", parse)]);
        let _ = self.declare("url", url, BindingKind::Builtin);
    }

    /// The iteration-protocol interfaces, registered as generic
    /// interfaces so annotations like `Generator<number>` resolve and
    /// `for...of` can extract the element type.
    fn install_iteration_interfaces(&mut self) {
        for name in [
            "Iterator",
            "Iterable",
            "IterableIterator",
            "Generator",
            "AsyncIterator",
            "AsyncIterable",
            "AsyncGenerator",
        ] {
            let t = TypeParamInfo {
                name: "T".to_string(),
                constraint: None,
                default: None,
                is_const: false,
                variance: Variance::Out,
            };
            let t_id = self.interner.intern(TypeKey::TypeParameter(t.clone()));
            let result = self.interner.intern(TypeKey::Record(RecordType {
                fields: vec![
                    (
                        "value".to_string(),
                        PropInfo {
                            ty: t_id,
                            optional: false,
                            readonly: false,
                        },
                    ),
                    (
                        "done".to_string(),
                        PropInfo {
                            ty: TypeId::BOOLEAN,
                            optional: false,
                            readonly: false,
                        },
                    ),
                ],
                indexes: IndexSignatures::default(),
            }));
            let is_async = name.starts_with("Async");
            let step = if is_async {
                self.interner.promise(result)
            } else {
                result
            };
            let next = self.simple_function(&[("value", TypeId::ANY, true)], step);
            let ret = self.simple_function(&[("value", TypeId::ANY, true)], step);
            let throw = self.simple_function(&[("error", TypeId::ANY, true)], step);
            let interface = InterfaceType {
                name: name.to_string(),
                type_params: vec![t],
                members: vec![
                    (
                        "next".to_string(),
                        PropInfo {
                            ty: next,
                            optional: false,
                            readonly: false,
                        },
                    ),
                    (
                        "return".to_string(),
                        PropInfo {
                            ty: ret,
                            optional: true,
                            readonly: false,
                        },
                    ),
                    (
                        "throw".to_string(),
                        PropInfo {
                            ty: throw,
                            optional: true,
                            readonly: false,
                        },
                    ),
                ],
                extends: Vec::new(),
                indexes: IndexSignatures::default(),
            };
            let id = self.interner.intern(TypeKey::Interface(interface));
            self.register_type(name, id);
        }
    }
}
