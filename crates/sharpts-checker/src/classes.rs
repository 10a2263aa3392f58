//! Class elaboration.
//!
//! A class is collected into a mutable builder, validated (override
//! correctness, abstract completeness, interface satisfaction), then
//! frozen into the interned nominal class type before the declaration
//! statement is accepted. Member bodies are checked afterwards against
//! the frozen type.

use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;
use sharpts_parser::ast::*;
use sharpts_solver::types::{self as solver, MemberFlags, TypeId, TypeKey};
use sharpts_solver::{class_of_instance, is_compatible, shape_of, type_to_string};

use crate::annotations::TypeParamEnv;
use crate::context::{BindingKind, CheckerContext, FunctionContext};
use crate::expr::FunctionBody;

/// Construction-time scratch for a class under elaboration.
#[derive(Default)]
struct ClassBuilder {
    fields: Vec<(String, solver::FieldInfo)>,
    methods: Vec<(String, solver::FieldInfo)>,
    getters: Vec<(String, solver::FieldInfo)>,
    setters: Vec<(String, solver::FieldInfo)>,
    static_members: Vec<(String, solver::FieldInfo)>,
    ctor: Option<TypeId>,
    abstract_methods: Vec<String>,
    abstract_getters: Vec<String>,
    abstract_setters: Vec<String>,
}

impl CheckerContext {
    /// Elaborate a class declaration and return its (static-side) type.
    pub fn check_class_decl(&mut self, decl: &ClassDecl) -> Result<TypeId, Diagnostic> {
        // Reuse the hoisted provisional class id so self-references made
        // before elaboration stay nominally equal.
        let class_id = match self
            .type_bindings
            .get(&decl.name)
            .map(|&id| self.interner.lookup(id))
        {
            Some(TypeKey::Class(provisional)) => provisional.class_id,
            _ => self.interner.fresh_class_id(),
        };

        let env = TypeParamEnv::default();
        let (type_param_infos, class_env) = self.bind_type_params(&decl.type_params, &env)?;

        // Superclass resolution.
        let superclass = match &decl.superclass {
            Some((name, args)) => {
                let Some(&base_binding) = self.type_bindings.get(name) else {
                    return Err(Diagnostic::type_error(
                        decl.span,
                        format!("Cannot find name '{name}'."),
                        diagnostic_codes::CANNOT_FIND_NAME,
                    ));
                };
                let TypeKey::Class(base) = self.interner.lookup(base_binding) else {
                    return Err(Diagnostic::type_error(
                        decl.span,
                        format!("Class '{}' can only extend another class.", decl.name),
                        diagnostic_codes::TYPE_NOT_ASSIGNABLE,
                    ));
                };
                let converted: Vec<TypeId> = args
                    .iter()
                    .map(|a| self.type_from_ann(a, &class_env))
                    .collect::<Result<_, _>>()?;
                Some(if base.type_params.is_empty() {
                    base_binding
                } else {
                    self.instantiate_definition(base_binding, &base.type_params, &converted)
                })
            }
            None => None,
        };

        // Member collection.
        let mut builder = ClassBuilder::default();
        let mut ctor_signatures: Vec<TypeId> = Vec::new();
        for member in &decl.members {
            self.collect_member(decl, member, &class_env, &mut builder, &mut ctor_signatures)?;
        }
        if !ctor_signatures.is_empty() {
            // Constructor overloads merge into one callable whose public
            // shape is the overload set (the implementation signature
            // participates only when alone).
            builder.ctor = Some(match ctor_signatures.len() {
                1 => ctor_signatures[0],
                2 => ctor_signatures[0],
                _ => {
                    let declared: Vec<TypeId> =
                        ctor_signatures[..ctor_signatures.len() - 1].to_vec();
                    self.interner.intern(TypeKey::Overloaded(declared))
                }
            });
        }

        // Freeze.
        let class = solver::ClassType {
            class_id,
            name: decl.name.clone(),
            superclass,
            type_params: type_param_infos,
            fields: builder.fields,
            methods: builder.methods,
            getters: builder.getters,
            setters: builder.setters,
            static_members: builder.static_members,
            ctor: builder.ctor,
            abstract_methods: builder.abstract_methods,
            abstract_getters: builder.abstract_getters,
            abstract_setters: builder.abstract_setters,
            is_abstract: decl.is_abstract,
        };
        let class_ty = self.interner.intern(TypeKey::Class(class.clone()));
        self.register_type(&decl.name, class_ty);

        // Validations against the frozen type.
        self.validate_overrides(decl, &class)?;
        self.validate_abstract_completeness(decl, &class)?;
        for implemented in &decl.implements {
            let interface_ty = self.type_from_ann(implemented, &class_env)?;
            self.validate_implements(decl, class_ty, interface_ty, implemented.span)?;
        }

        // Member bodies, with `this` bound to the instance type.
        let instance = self.interner.intern(TypeKey::Instance(class_ty));
        let super_instance = superclass
            .map(|s| self.interner.intern(TypeKey::Instance(s)));
        self.this_stack.push(instance);
        self.super_stack.push(super_instance);
        let bodies = self.check_member_bodies(decl, &class_env);
        self.this_stack.pop();
        self.super_stack.pop();
        bodies?;

        Ok(class_ty)
    }

    fn collect_member(
        &mut self,
        decl: &ClassDecl,
        member: &ClassMember,
        class_env: &TypeParamEnv,
        builder: &mut ClassBuilder,
        ctor_signatures: &mut Vec<TypeId>,
    ) -> Result<(), Diagnostic> {
        let Some(name) = member.name.as_static() else {
            return Err(Diagnostic::type_error(
                member.span,
                "Class member names must be statically known.",
                diagnostic_codes::UNEXPECTED_TOKEN,
            ));
        };
        let mut flags = match member.accessibility {
            AccessModifier::Public => MemberFlags::PUBLIC,
            AccessModifier::Protected => MemberFlags::PROTECTED,
            AccessModifier::Private => MemberFlags::PRIVATE,
        };
        if member.is_readonly {
            flags |= MemberFlags::READONLY;
        }
        if member.is_static {
            flags |= MemberFlags::STATIC;
        }
        if member.is_abstract {
            if !decl.is_abstract {
                return Err(Diagnostic::type_error(
                    member.span,
                    format!(
                        "Abstract member '{name}' may only appear in an abstract class."
                    ),
                    diagnostic_codes::ABSTRACT_NOT_IMPLEMENTED,
                ));
            }
            flags |= MemberFlags::ABSTRACT;
        }

        match &member.kind {
            MemberKind::Field { type_ann, init } => {
                let declared = type_ann
                    .as_ref()
                    .map(|a| self.type_from_ann(a, class_env))
                    .transpose()?;
                let ty = match declared {
                    Some(ty) => ty,
                    None => match init {
                        Some(init) => {
                            let init_ty = self.check_expr(init)?;
                            self.widen_literal(init_ty)
                        }
                        None => TypeId::ANY,
                    },
                };
                if member.is_static {
                    builder.static_members.push((name, solver::FieldInfo { ty, flags }));
                } else {
                    builder.fields.push((name, solver::FieldInfo { ty, flags }));
                }
            }
            MemberKind::Method(parts) => {
                let (infos, method_env) = self.bind_type_params(&parts.type_params, class_env)?;
                let signature = self.signature_from_parts(
                    &parts.params,
                    parts.return_type.as_ref(),
                    &infos,
                    &method_env,
                    parts.is_async,
                    parts.is_generator,
                )?;
                if member.is_abstract {
                    builder.abstract_methods.push(name.clone());
                }
                if member.is_static {
                    builder
                        .static_members
                        .push((name, solver::FieldInfo { ty: signature, flags }));
                } else {
                    // Overloaded methods merge by name.
                    if let Some(existing) = builder.methods.iter_mut().find(|(n, _)| *n == name)
                    {
                        let merged = match self.interner.lookup(existing.1.ty) {
                            TypeKey::Overloaded(mut signatures) => {
                                signatures.push(signature);
                                self.interner.intern(TypeKey::Overloaded(signatures))
                            }
                            _ => self
                                .interner
                                .intern(TypeKey::Overloaded(vec![existing.1.ty, signature])),
                        };
                        existing.1.ty = merged;
                    } else {
                        builder
                            .methods
                            .push((name, solver::FieldInfo { ty: signature, flags }));
                    }
                }
            }
            MemberKind::Getter { return_type, .. } => {
                let ty = return_type
                    .as_ref()
                    .map(|a| self.type_from_ann(a, class_env))
                    .transpose()?
                    .unwrap_or(TypeId::ANY);
                if member.is_abstract {
                    builder.abstract_getters.push(name.clone());
                }
                builder.getters.push((name, solver::FieldInfo { ty, flags }));
            }
            MemberKind::Setter { param, .. } => {
                let ty = param
                    .type_ann
                    .as_ref()
                    .map(|a| self.type_from_ann(a, class_env))
                    .transpose()?
                    .unwrap_or(TypeId::ANY);
                if member.is_abstract {
                    builder.abstract_setters.push(name.clone());
                }
                builder.setters.push((name, solver::FieldInfo { ty, flags }));
            }
            MemberKind::Constructor { params, body } => {
                let signature = self.signature_from_parts(
                    params,
                    None,
                    &[],
                    class_env,
                    false,
                    false,
                )?;
                let _ = body;
                ctor_signatures.push(signature);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Validations
    // =========================================================================

    fn validate_overrides(
        &mut self,
        decl: &ClassDecl,
        class: &solver::ClassType,
    ) -> Result<(), Diagnostic> {
        for member in &decl.members {
            if !member.is_override {
                continue;
            }
            let name = member.name.as_static().unwrap_or_default();
            if member.is_static {
                return Err(Diagnostic::type_error(
                    member.span,
                    format!("'override' modifier cannot be used with static member '{name}'."),
                    diagnostic_codes::OVERRIDE_ON_STATIC,
                ));
            }
            let Some(superclass) = class.superclass else {
                return Err(Diagnostic::type_error(
                    member.span,
                    format!(
                        "This member cannot have an 'override' modifier because class '{}' does not extend another class.",
                        decl.name
                    ),
                    diagnostic_codes::OVERRIDE_WITHOUT_BASE,
                ));
            };
            if !self.ancestor_declares(superclass, &name) {
                return Err(Diagnostic::type_error(
                    member.span,
                    format!(
                        "This member cannot have an 'override' modifier because it is not declared in a base class of '{}'.",
                        decl.name
                    ),
                    diagnostic_codes::OVERRIDE_WITHOUT_BASE,
                ));
            }
        }
        Ok(())
    }

    fn ancestor_declares(&self, superclass: TypeId, name: &str) -> bool {
        let mut current = Some(superclass);
        while let Some(target) = current {
            let Some((class, _)) = class_of_instance(&self.interner, target) else {
                return false;
            };
            if class.find_field(name).is_some()
                || class.find_method(name).is_some()
                || class.find_getter(name).is_some()
                || class.find_setter(name).is_some()
            {
                return true;
            }
            current = class.superclass;
        }
        false
    }

    /// A concrete class extending an abstract one must implement every
    /// abstract member (or stay abstract itself).
    fn validate_abstract_completeness(
        &mut self,
        decl: &ClassDecl,
        class: &solver::ClassType,
    ) -> Result<(), Diagnostic> {
        if class.is_abstract {
            return Ok(());
        }
        let mut current = class.superclass;
        while let Some(target) = current {
            let Some((base, _)) = class_of_instance(&self.interner, target) else {
                break;
            };
            if base.is_abstract {
                let pending = base
                    .abstract_methods
                    .iter()
                    .chain(base.abstract_getters.iter())
                    .chain(base.abstract_setters.iter());
                for name in pending {
                    let implemented = class.find_method(name).is_some()
                        || class.find_getter(name).is_some()
                        || class.find_setter(name).is_some()
                        || class.find_field(name).is_some();
                    if !implemented {
                        return Err(Diagnostic::type_error(
                            decl.span,
                            format!(
                                "Non-abstract class '{}' does not implement inherited abstract member '{}' from class '{}'.",
                                decl.name, name, base.name
                            ),
                            diagnostic_codes::ABSTRACT_NOT_IMPLEMENTED,
                        ));
                    }
                }
            }
            current = base.superclass;
        }
        Ok(())
    }

    fn validate_implements(
        &mut self,
        decl: &ClassDecl,
        class_ty: TypeId,
        interface_ty: TypeId,
        span: Span,
    ) -> Result<(), Diagnostic> {
        let instance = self.interner.intern(TypeKey::Instance(class_ty));
        let Some(interface_shape) = shape_of(&self.interner, interface_ty) else {
            return Err(Diagnostic::type_error(
                span,
                "A class can only implement an interface or object type.",
                diagnostic_codes::INTERFACE_NOT_SATISFIED,
            ));
        };
        let instance_shape = shape_of(&self.interner, instance).unwrap_or_default();
        for (name, expected) in &interface_shape.props {
            match instance_shape.find(name) {
                Some(actual) => {
                    if !is_compatible(&self.interner, expected.ty, actual.ty) {
                        return Err(Diagnostic::type_error(
                            span,
                            format!(
                                "Property '{}' in class '{}' is of type '{}', which does not satisfy '{}'.",
                                name,
                                decl.name,
                                type_to_string(&self.interner, actual.ty),
                                type_to_string(&self.interner, expected.ty),
                            ),
                            diagnostic_codes::INTERFACE_NOT_SATISFIED,
                        ));
                    }
                }
                None if expected.optional => {}
                None => {
                    return Err(Diagnostic::type_error(
                        span,
                        format!(
                            "Class '{}' incorrectly implements the interface: property '{}' is missing.",
                            decl.name, name
                        ),
                        diagnostic_codes::INTERFACE_NOT_SATISFIED,
                    ));
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Member bodies
    // =========================================================================

    fn check_member_bodies(
        &mut self,
        decl: &ClassDecl,
        class_env: &TypeParamEnv,
    ) -> Result<(), Diagnostic> {
        for member in &decl.members {
            match &member.kind {
                MemberKind::Method(parts) => {
                    if parts.body.is_some() {
                        self.check_function_like(
                            &parts.type_params,
                            &parts.params,
                            parts.return_type.as_ref(),
                            FunctionBody::Block(parts.body.as_deref()),
                            parts.is_async,
                            parts.is_generator,
                        )?;
                    }
                }
                MemberKind::Constructor { params, body } => {
                    if let Some(body) = body {
                        self.push_scope();
                        for param in params {
                            let ty = param
                                .type_ann
                                .as_ref()
                                .map(|a| self.type_from_ann(a, class_env))
                                .transpose()?
                                .unwrap_or(TypeId::ANY);
                            self.declare(&param.name, ty, BindingKind::Param)?;
                        }
                        self.function_stack.push(FunctionContext {
                            return_type: None,
                            is_async: false,
                            is_generator: false,
                        });
                        let result = self.check_statements(body);
                        self.function_stack.pop();
                        self.pop_scope();
                        result?;
                    }
                }
                MemberKind::Getter { return_type, body } => {
                    if let Some(body) = body {
                        self.push_scope();
                        let env = class_env.clone();
                        let expected = return_type
                            .as_ref()
                            .map(|a| self.type_from_ann(a, &env))
                            .transpose()?;
                        self.function_stack.push(FunctionContext {
                            return_type: expected,
                            is_async: false,
                            is_generator: false,
                        });
                        let result = self.check_statements(body);
                        self.function_stack.pop();
                        self.pop_scope();
                        result?;
                    }
                }
                MemberKind::Setter { param, body } => {
                    if let Some(body) = body {
                        self.push_scope();
                        let ty = param
                            .type_ann
                            .as_ref()
                            .map(|a| self.type_from_ann(a, class_env))
                            .transpose()?
                            .unwrap_or(TypeId::ANY);
                        self.declare(&param.name, ty, BindingKind::Param)?;
                        self.function_stack.push(FunctionContext {
                            return_type: None,
                            is_async: false,
                            is_generator: false,
                        });
                        let result = self.check_statements(body);
                        self.function_stack.pop();
                        self.pop_scope();
                        result?;
                    }
                }
                MemberKind::Field { init, .. } => {
                    if let Some(init) = init {
                        self.check_expr(init)?;
                    }
                }
            }
        }
        Ok(())
    }
}
