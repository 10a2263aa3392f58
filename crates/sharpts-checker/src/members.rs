//! Property access typing.
//!
//! Resolves `object.name` over every kind of receiver: structural
//! shapes, class instances (with accessibility enforcement), the static
//! side of classes, enums, and the built-in member surfaces of strings,
//! numbers, arrays, and promises.

use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;
use sharpts_solver::evaluate::evaluate_type;
use sharpts_solver::instantiate::instantiate_type;
use sharpts_solver::types::*;
use sharpts_solver::{class_of_instance, shape_of, type_to_string};

use crate::context::CheckerContext;

impl CheckerContext {
    /// The type of `object.name`.
    pub fn member_type_of(
        &mut self,
        object: TypeId,
        name: &str,
        span: Span,
    ) -> Result<TypeId, Diagnostic> {
        let object = evaluate_type(&self.interner, object);
        match self.interner.lookup(object) {
            TypeKey::Any | TypeKey::Error => return Ok(TypeId::ANY),
            TypeKey::String | TypeKey::StringLiteral(_) | TypeKey::TemplateLiteral { .. } => {
                if let Some(ty) = self.string_member(name) {
                    return Ok(ty);
                }
            }
            TypeKey::Number | TypeKey::NumberLiteral(_) => {
                if let Some(ty) = self.number_member(name) {
                    return Ok(ty);
                }
            }
            TypeKey::BigInt | TypeKey::Boolean | TypeKey::BooleanLiteral(_) => {
                if name == "toString" {
                    return Ok(self.simple_function(&[], TypeId::STRING));
                }
            }
            TypeKey::Array(element) => {
                if let Some(ty) = self.array_member(name, element) {
                    return Ok(ty);
                }
            }
            TypeKey::Tuple(tuple) => {
                let element = self
                    .interner
                    .union(tuple.elements.iter().map(|e| e.type_id).collect());
                if let Some(ty) = self.array_member(name, element) {
                    return Ok(ty);
                }
            }
            TypeKey::Promise(inner) => {
                if let Some(ty) = self.promise_member(name, inner) {
                    return Ok(ty);
                }
            }
            TypeKey::Function(_) | TypeKey::Overloaded(_) => {
                // bind/call/apply keep the dynamic contract.
                if matches!(name, "bind" | "call" | "apply") {
                    return Ok(TypeId::ANY);
                }
            }
            TypeKey::Enum(enum_type) => {
                if let Some((_, value)) = enum_type.members.iter().find(|(n, _)| n == name) {
                    return Ok(match value {
                        EnumMemberValue::Num(bits) => {
                            self.interner.number_literal(bits.as_f64())
                        }
                        EnumMemberValue::Str(text) => self.interner.string_literal(text),
                    });
                }
                return Err(Diagnostic::type_error(
                    span,
                    format!(
                        "Property '{name}' does not exist on enum '{}'.",
                        enum_type.name
                    ),
                    diagnostic_codes::PROPERTY_MISSING,
                ));
            }
            TypeKey::Class(class) => {
                // Static side.
                if let Some(member) = class
                    .static_members
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, f)| *f)
                {
                    self.check_accessibility(&class, member.flags, name, span)?;
                    return Ok(member.ty);
                }
                // Statics inherit through the base chain.
                if let Some(superclass) = class.superclass {
                    if let Some((base, _)) = class_of_instance(&self.interner, superclass) {
                        let base_id = self.interner.intern(TypeKey::Class(base));
                        return self.member_type_of(base_id, name, span);
                    }
                }
            }
            TypeKey::Instance(target) => {
                if let Some((class, subst)) = class_of_instance(&self.interner, target) {
                    let mut current = Some((class, subst));
                    while let Some((class, subst)) = current {
                        // A setter-only accessor still names a property;
                        // its field info carries the value type.
                        let found = class
                            .find_field(name)
                            .or_else(|| class.find_method(name))
                            .or_else(|| class.find_getter(name))
                            .or_else(|| class.find_setter(name))
                            .copied();
                        if let Some(member) = found {
                            self.check_accessibility(&class, member.flags, name, span)?;
                            return Ok(instantiate_type(&self.interner, member.ty, &subst));
                        }
                        current = class
                            .superclass
                            .and_then(|s| class_of_instance(&self.interner, s));
                    }
                    return Err(Diagnostic::type_error(
                        span,
                        format!(
                            "Property '{name}' does not exist on type '{}'.",
                            type_to_string(&self.interner, object)
                        ),
                        diagnostic_codes::PROPERTY_MISSING,
                    ));
                }
            }
            TypeKey::Union(members) => {
                // A member access on a union is the union of the member
                // types, defined on every branch.
                let mut parts = Vec::with_capacity(members.len());
                for member in members {
                    parts.push(self.member_type_of(member, name, span)?);
                }
                return Ok(self.interner.union(parts));
            }
            _ => {}
        }

        if let Some(shape) = shape_of(&self.interner, object) {
            if let Some(prop) = shape.find(name) {
                let ty = prop.ty;
                return Ok(if prop.optional {
                    self.interner.union(vec![ty, TypeId::UNDEFINED])
                } else {
                    ty
                });
            }
            if let Some(index_ty) = shape.indexes.string_index {
                return Ok(index_ty);
            }
        }

        Err(Diagnostic::type_error(
            span,
            format!(
                "Property '{name}' does not exist on type '{}'.",
                type_to_string(&self.interner, object)
            ),
            diagnostic_codes::PROPERTY_MISSING,
        ))
    }

    fn check_accessibility(
        &self,
        class: &ClassType,
        flags: MemberFlags,
        name: &str,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let inside = self.this_stack.iter().rev().any(|&this_ty| {
            match self.interner.lookup(this_ty) {
                TypeKey::Instance(target) => class_of_instance(&self.interner, target)
                    .map(|(c, _)| {
                        c.class_id == class.class_id
                            || class_inherits(&self.interner, &c, class.class_id)
                    })
                    .unwrap_or(false),
                _ => false,
            }
        });
        match flags.accessibility() {
            Accessibility::Public => Ok(()),
            Accessibility::Private if inside => Ok(()),
            Accessibility::Private => Err(Diagnostic::type_error(
                span,
                format!(
                    "Property '{name}' is private and only accessible within class '{}'.",
                    class.name
                ),
                diagnostic_codes::PRIVATE_ACCESS,
            )),
            Accessibility::Protected if inside => Ok(()),
            Accessibility::Protected => Err(Diagnostic::type_error(
                span,
                format!(
                    "Property '{name}' is protected and only accessible within class '{}' and its subclasses.",
                    class.name
                ),
                diagnostic_codes::PROTECTED_ACCESS,
            )),
        }
    }

    // =========================================================================
    // Built-in member surfaces
    // =========================================================================

    pub fn simple_function(&mut self, params: &[(&str, TypeId, bool)], ret: TypeId) -> TypeId {
        let params: Vec<ParamInfo> = params
            .iter()
            .map(|(name, ty, optional)| ParamInfo {
                name: name.to_string(),
                ty: *ty,
                optional: *optional,
                rest: false,
            })
            .collect();
        self.interner
            .intern(TypeKey::Function(FunctionType::simple(params, ret)))
    }

    pub fn variadic_function(&mut self, ret: TypeId) -> TypeId {
        let rest = ParamInfo {
            name: "args".to_string(),
            ty: self.interner.array(TypeId::ANY),
            optional: false,
            rest: true,
        };
        self.interner
            .intern(TypeKey::Function(FunctionType::simple(vec![rest], ret)))
    }

    fn string_member(&mut self, name: &str) -> Option<TypeId> {
        let string_array = self.interner.array(TypeId::STRING);
        Some(match name {
            "length" => TypeId::NUMBER,
            "toUpperCase" | "toLowerCase" | "trim" | "toString" => {
                self.simple_function(&[], TypeId::STRING)
            }
            "charAt" => self.simple_function(&[("index", TypeId::NUMBER, false)], TypeId::STRING),
            "charCodeAt" => {
                self.simple_function(&[("index", TypeId::NUMBER, false)], TypeId::NUMBER)
            }
            "slice" | "substring" => self.simple_function(
                &[("start", TypeId::NUMBER, true), ("end", TypeId::NUMBER, true)],
                TypeId::STRING,
            ),
            "indexOf" | "lastIndexOf" => {
                self.simple_function(&[("search", TypeId::STRING, false)], TypeId::NUMBER)
            }
            "includes" | "startsWith" | "endsWith" => {
                self.simple_function(&[("search", TypeId::STRING, false)], TypeId::BOOLEAN)
            }
            "split" => {
                self.simple_function(&[("separator", TypeId::STRING, false)], string_array)
            }
            "replace" => self.simple_function(
                &[
                    ("pattern", TypeId::STRING, false),
                    ("replacement", TypeId::STRING, false),
                ],
                TypeId::STRING,
            ),
            "repeat" => self.simple_function(&[("count", TypeId::NUMBER, false)], TypeId::STRING),
            "padStart" | "padEnd" => self.simple_function(
                &[
                    ("length", TypeId::NUMBER, false),
                    ("fill", TypeId::STRING, true),
                ],
                TypeId::STRING,
            ),
            "concat" => self.simple_function(&[("other", TypeId::STRING, false)], TypeId::STRING),
            _ => return None,
        })
    }

    fn number_member(&mut self, name: &str) -> Option<TypeId> {
        Some(match name {
            "toFixed" => {
                self.simple_function(&[("digits", TypeId::NUMBER, true)], TypeId::STRING)
            }
            "toString" => {
                self.simple_function(&[("radix", TypeId::NUMBER, true)], TypeId::STRING)
            }
            _ => return None,
        })
    }

    fn array_member(&mut self, name: &str, element: TypeId) -> Option<TypeId> {
        let array = self.interner.array(element);
        let optional_element = self.interner.union(vec![element, TypeId::UNDEFINED]);
        Some(match name {
            "length" => TypeId::NUMBER,
            "push" | "unshift" => {
                let rest = ParamInfo {
                    name: "items".to_string(),
                    ty: array,
                    optional: false,
                    rest: true,
                };
                self.interner.intern(TypeKey::Function(FunctionType::simple(
                    vec![rest],
                    TypeId::NUMBER,
                )))
            }
            "pop" | "shift" => self.simple_function(&[], optional_element),
            "slice" => self.simple_function(
                &[("start", TypeId::NUMBER, true), ("end", TypeId::NUMBER, true)],
                array,
            ),
            "indexOf" | "lastIndexOf" => {
                self.simple_function(&[("item", element, false)], TypeId::NUMBER)
            }
            "includes" => self.simple_function(&[("item", element, false)], TypeId::BOOLEAN),
            "join" => self.simple_function(&[("separator", TypeId::STRING, true)], TypeId::STRING),
            "concat" => self.simple_function(&[("other", array, false)], array),
            "reverse" => self.simple_function(&[], array),
            "map" => {
                // <U>(f: (item: T, index?: number) => U) => U[]
                let u = self.interner.intern(TypeKey::TypeParameter(TypeParamInfo {
                    name: "U".to_string(),
                    constraint: None,
                    default: None,
                    is_const: false,
                    variance: Variance::Invariant,
                }));
                let callback = self.simple_function(
                    &[("item", element, false), ("index", TypeId::NUMBER, true)],
                    u,
                );
                let u_array = self.interner.array(u);
                let mut function = FunctionType::simple(
                    vec![ParamInfo {
                        name: "callback".to_string(),
                        ty: callback,
                        optional: false,
                        rest: false,
                    }],
                    u_array,
                );
                function.type_params = vec![TypeParamInfo {
                    name: "U".to_string(),
                    constraint: None,
                    default: None,
                    is_const: false,
                    variance: Variance::Invariant,
                }];
                self.interner.intern(TypeKey::Function(function))
            }
            "filter" => {
                let callback = self.simple_function(
                    &[("item", element, false), ("index", TypeId::NUMBER, true)],
                    TypeId::BOOLEAN,
                );
                self.simple_function(&[("callback", callback, false)], array)
            }
            "forEach" => {
                let callback = self.simple_function(
                    &[("item", element, false), ("index", TypeId::NUMBER, true)],
                    TypeId::VOID,
                );
                self.simple_function(&[("callback", callback, false)], TypeId::VOID)
            }
            "find" => {
                let callback = self.simple_function(
                    &[("item", element, false), ("index", TypeId::NUMBER, true)],
                    TypeId::BOOLEAN,
                );
                self.simple_function(&[("callback", callback, false)], optional_element)
            }
            "findIndex" => {
                let callback = self.simple_function(&[("item", element, false)], TypeId::BOOLEAN);
                self.simple_function(&[("callback", callback, false)], TypeId::NUMBER)
            }
            "some" | "every" => {
                let callback = self.simple_function(&[("item", element, false)], TypeId::BOOLEAN);
                self.simple_function(&[("callback", callback, false)], TypeId::BOOLEAN)
            }
            "sort" => {
                let comparator = self.simple_function(
                    &[("a", element, false), ("b", element, false)],
                    TypeId::NUMBER,
                );
                self.simple_function(&[("comparator", comparator, true)], array)
            }
            "reduce" => TypeId::ANY,
            _ => return None,
        })
    }

    fn promise_member(&mut self, name: &str, inner: TypeId) -> Option<TypeId> {
        Some(match name {
            "then" => {
                // <U>(onFulfilled: (value: T) => U) => Promise<U>
                let u = self.interner.intern(TypeKey::TypeParameter(TypeParamInfo {
                    name: "U".to_string(),
                    constraint: None,
                    default: None,
                    is_const: false,
                    variance: Variance::Invariant,
                }));
                let callback = self.simple_function(&[("value", inner, false)], u);
                let u_promise = self.interner.promise(u);
                let mut function = FunctionType::simple(
                    vec![ParamInfo {
                        name: "onFulfilled".to_string(),
                        ty: callback,
                        optional: false,
                        rest: false,
                    }],
                    u_promise,
                );
                function.type_params = vec![TypeParamInfo {
                    name: "U".to_string(),
                    constraint: None,
                    default: None,
                    is_const: false,
                    variance: Variance::Invariant,
                }];
                self.interner.intern(TypeKey::Function(function))
            }
            "catch" => {
                let handler = self.simple_function(&[("reason", TypeId::ANY, false)], TypeId::ANY);
                let any_promise = self.interner.promise(TypeId::ANY);
                self.simple_function(&[("onRejected", handler, true)], any_promise)
            }
            "finally" => {
                let handler = self.simple_function(&[], TypeId::VOID);
                let same = self.interner.promise(inner);
                self.simple_function(&[("onFinally", handler, true)], same)
            }
            _ => return None,
        })
    }
}

fn class_inherits(
    interner: &sharpts_solver::TypeInterner,
    class: &ClassType,
    ancestor_id: u32,
) -> bool {
    let mut current = class.superclass;
    while let Some(target) = current {
        match class_of_instance(interner, target) {
            Some((base, _)) => {
                if base.class_id == ancestor_id {
                    return true;
                }
                current = base.superclass;
            }
            None => return false,
        }
    }
    false
}
