//! Structural member views.
//!
//! Compatibility, expansion, and property access all need "the members
//! of this type" regardless of whether it is a record, an interface
//! (with inheritance), a class instance (public members, base chain), an
//! intersection, or a generic instantiation. [`shape_of`] computes that
//! view.

use crate::instantiate::{TypeSubstitution, instantiate_type};
use crate::TypeInterner;
use crate::types::*;

/// A flattened member view of a structural type.
#[derive(Debug, Clone, Default)]
pub struct TypeShape {
    pub props: Vec<(String, PropInfo)>,
    pub indexes: IndexSignatures,
}

impl TypeShape {
    pub fn find(&self, name: &str) -> Option<&PropInfo> {
        self.props.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    fn push_if_absent(&mut self, name: &str, prop: PropInfo) {
        if self.find(name).is_none() {
            self.props.push((name.to_string(), prop));
        }
    }
}

/// Resolve the class type and substitution behind an `Instance` id.
pub fn class_of_instance(
    interner: &TypeInterner,
    instance_target: TypeId,
) -> Option<(ClassType, TypeSubstitution)> {
    match interner.lookup(instance_target) {
        TypeKey::Class(class) => Some((class, TypeSubstitution::new())),
        TypeKey::InstantiatedGeneric { def, args } => match interner.lookup(def) {
            TypeKey::Class(class) => {
                let subst = TypeSubstitution::from_params(interner, &class.type_params, &args);
                Some((class, subst))
            }
            _ => None,
        },
        _ => None,
    }
}

/// Compute the member view of a type, or `None` when the type has no
/// structural members (primitives, functions, type parameters).
pub fn shape_of(interner: &TypeInterner, ty: TypeId) -> Option<TypeShape> {
    match interner.lookup(ty) {
        TypeKey::Record(record) => Some(TypeShape {
            props: record.fields.clone(),
            indexes: record.indexes.clone(),
        }),
        TypeKey::Interface(interface) => {
            let mut shape = TypeShape {
                props: interface.members.clone(),
                indexes: interface.indexes.clone(),
            };
            // Inherited members; own declarations win.
            for &base in &interface.extends {
                if let Some(base_shape) = shape_of(interner, base) {
                    for (name, prop) in base_shape.props {
                        shape.push_if_absent(&name, prop);
                    }
                }
            }
            Some(shape)
        }
        TypeKey::Instance(target) => {
            let (class, subst) = class_of_instance(interner, target)?;
            let mut shape = TypeShape::default();
            collect_instance_members(interner, &class, &subst, &mut shape);
            Some(shape)
        }
        TypeKey::InstantiatedGeneric { def, args } => match interner.lookup(def) {
            TypeKey::Interface(interface) => {
                let subst = TypeSubstitution::from_params(interner, &interface.type_params, &args);
                let base = shape_of(interner, def)?;
                Some(TypeShape {
                    props: base
                        .props
                        .into_iter()
                        .map(|(name, prop)| {
                            (
                                name,
                                PropInfo {
                                    ty: instantiate_type(interner, prop.ty, &subst),
                                    ..prop
                                },
                            )
                        })
                        .collect(),
                    indexes: IndexSignatures {
                        string_index: base
                            .indexes
                            .string_index
                            .map(|t| instantiate_type(interner, t, &subst)),
                        number_index: base
                            .indexes
                            .number_index
                            .map(|t| instantiate_type(interner, t, &subst)),
                        symbol_index: base
                            .indexes
                            .symbol_index
                            .map(|t| instantiate_type(interner, t, &subst)),
                    },
                })
            }
            _ => None,
        },
        TypeKey::Intersection(members) => {
            let mut shape = TypeShape::default();
            let mut any = false;
            for member in members {
                if let Some(member_shape) = shape_of(interner, member) {
                    any = true;
                    for (name, prop) in member_shape.props {
                        shape.push_if_absent(&name, prop);
                    }
                    if shape.indexes.string_index.is_none() {
                        shape.indexes.string_index = member_shape.indexes.string_index;
                    }
                    if shape.indexes.number_index.is_none() {
                        shape.indexes.number_index = member_shape.indexes.number_index;
                    }
                    if shape.indexes.symbol_index.is_none() {
                        shape.indexes.symbol_index = member_shape.indexes.symbol_index;
                    }
                }
            }
            any.then_some(shape)
        }
        _ => None,
    }
}

/// Public members of a class instance, walking the base chain
/// (derived members shadow base members).
fn collect_instance_members(
    interner: &TypeInterner,
    class: &ClassType,
    subst: &TypeSubstitution,
    shape: &mut TypeShape,
) {
    for (name, field) in &class.fields {
        if field.flags.accessibility() != Accessibility::Public {
            continue;
        }
        shape.push_if_absent(
            name,
            PropInfo {
                ty: instantiate_type(interner, field.ty, subst),
                optional: field.flags.contains(MemberFlags::OPTIONAL),
                readonly: field.flags.contains(MemberFlags::READONLY),
            },
        );
    }
    for (name, method) in &class.methods {
        if method.flags.accessibility() != Accessibility::Public {
            continue;
        }
        shape.push_if_absent(
            name,
            PropInfo {
                ty: instantiate_type(interner, method.ty, subst),
                optional: false,
                readonly: false,
            },
        );
    }
    for (name, getter) in &class.getters {
        if getter.flags.accessibility() != Accessibility::Public {
            continue;
        }
        let has_setter = class.find_setter(name).is_some();
        shape.push_if_absent(
            name,
            PropInfo {
                ty: instantiate_type(interner, getter.ty, subst),
                optional: false,
                readonly: !has_setter,
            },
        );
    }
    // Setter-only (write-only) accessors still contribute a property
    // with the setter's value type; a matching getter was surfaced
    // above, so push_if_absent leaves paired accessors untouched.
    for (name, setter) in &class.setters {
        if setter.flags.accessibility() != Accessibility::Public {
            continue;
        }
        shape.push_if_absent(
            name,
            PropInfo {
                ty: instantiate_type(interner, setter.ty, subst),
                optional: false,
                readonly: false,
            },
        );
    }
    if let Some(superclass) = class.superclass {
        if let Some((base, base_subst)) = class_of_instance(interner, superclass) {
            // Superclass type arguments are written in terms of the
            // derived class's parameters; compose the substitutions.
            let mut composed = TypeSubstitution::new();
            for param in &base.type_params {
                if let Some(arg) = base_subst.get(&param.name) {
                    composed.insert(param.name.clone(), instantiate_type(interner, arg, subst));
                }
            }
            collect_instance_members(interner, &base, &composed, shape);
        }
    }
}
