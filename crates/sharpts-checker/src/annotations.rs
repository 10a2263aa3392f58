//! Conversion of parsed type annotations into solver types.

use rustc_hash::FxHashMap;
use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::limits;
use sharpts_parser::ast::{
    self, ObjectTypeMember, PathSeg, PrimitiveKind, TypeAnn, TypeAnnKind, TypeParamDecl,
};
use sharpts_solver::evaluate::{evaluate_type, template_expansion_size};
use sharpts_solver::instantiate::{TypeSubstitution, instantiate_type};
use sharpts_solver::types::*;
use sharpts_solver::{apply_utility, shape_of};
use smallvec::SmallVec;

use crate::context::CheckerContext;

/// In-scope type parameters (and `infer` placeholders) during
/// annotation conversion.
pub type TypeParamEnv = FxHashMap<String, TypeId>;

impl CheckerContext {
    /// Intern declared type parameters and extend the environment.
    pub fn bind_type_params(
        &mut self,
        decls: &[TypeParamDecl],
        env: &TypeParamEnv,
    ) -> Result<(Vec<TypeParamInfo>, TypeParamEnv), Diagnostic> {
        let mut extended = env.clone();
        let mut infos = Vec::with_capacity(decls.len());
        let mut seen_default = false;
        for decl in decls {
            let constraint = decl
                .constraint
                .as_ref()
                .map(|c| self.type_from_ann(c, &extended))
                .transpose()?;
            let default = decl
                .default
                .as_ref()
                .map(|d| self.type_from_ann(d, &extended))
                .transpose()?;
            if default.is_some() {
                seen_default = true;
            } else if seen_default {
                return Err(Diagnostic::type_error(
                    decl.span,
                    "Required type parameters may not follow optional type parameters.",
                    diagnostic_codes::CONSTRAINT_UNSATISFIED,
                ));
            }
            let info = TypeParamInfo {
                name: decl.name.clone(),
                constraint,
                default,
                is_const: decl.is_const,
                variance: match decl.variance {
                    ast::Variance::Invariant => Variance::Invariant,
                    ast::Variance::In => Variance::In,
                    ast::Variance::Out => Variance::Out,
                    ast::Variance::InOut => Variance::InOut,
                },
            };
            let id = self.interner.intern(TypeKey::TypeParameter(info.clone()));
            extended.insert(decl.name.clone(), id);
            infos.push(info);
        }
        Ok((infos, extended))
    }

    pub fn type_from_ann(
        &mut self,
        ann: &TypeAnn,
        env: &TypeParamEnv,
    ) -> Result<TypeId, Diagnostic> {
        match &ann.kind {
            TypeAnnKind::Primitive(kind) => Ok(match kind {
                PrimitiveKind::Number => TypeId::NUMBER,
                PrimitiveKind::String => TypeId::STRING,
                PrimitiveKind::Boolean => TypeId::BOOLEAN,
                PrimitiveKind::Symbol => TypeId::SYMBOL,
                PrimitiveKind::BigInt => TypeId::BIGINT,
                PrimitiveKind::Void => TypeId::VOID,
                PrimitiveKind::Null => TypeId::NULL,
                PrimitiveKind::Undefined => TypeId::UNDEFINED,
                PrimitiveKind::Any => TypeId::ANY,
                PrimitiveKind::Unknown => TypeId::UNKNOWN,
                PrimitiveKind::Never => TypeId::NEVER,
                PrimitiveKind::Object => self.interner.intern(TypeKey::Record(RecordType {
                    fields: Vec::new(),
                    indexes: IndexSignatures::default(),
                })),
            }),
            TypeAnnKind::NumberLit(value) => Ok(self.interner.number_literal(*value)),
            TypeAnnKind::StrLit(text) => Ok(self.interner.string_literal(text)),
            TypeAnnKind::BoolLit(value) => Ok(self.interner.boolean_literal(*value)),
            TypeAnnKind::Ref { path, type_args } => self.resolve_type_ref(ann, path, type_args, env),
            TypeAnnKind::Union(members) => {
                let ids: Vec<TypeId> = members
                    .iter()
                    .map(|m| self.type_from_ann(m, env))
                    .collect::<Result<_, _>>()?;
                Ok(self.interner.union(ids))
            }
            TypeAnnKind::Intersection(members) => {
                let ids: Vec<TypeId> = members
                    .iter()
                    .map(|m| self.type_from_ann(m, env))
                    .collect::<Result<_, _>>()?;
                Ok(self.interner.intersection(ids))
            }
            TypeAnnKind::ArrayOf(element) => {
                let element = self.type_from_ann(element, env)?;
                Ok(self.interner.array(element))
            }
            TypeAnnKind::IndexedAccess { object, index } => {
                let object = self.type_from_ann(object, env)?;
                let index = self.type_from_ann(index, env)?;
                let access = self
                    .interner
                    .intern(TypeKey::IndexedAccess { object, index });
                let resolved = evaluate_type(&self.interner, access);
                if resolved == TypeId::ERROR {
                    return Err(Diagnostic::type_error(
                        ann.span,
                        "The indexed access does not resolve to a property.",
                        diagnostic_codes::NOT_INDEXABLE,
                    ));
                }
                Ok(resolved)
            }
            TypeAnnKind::Tuple(elements) => {
                let mut converted = Vec::with_capacity(elements.len());
                for element in elements {
                    converted.push(TupleElement {
                        type_id: self.type_from_ann(&element.ty, env)?,
                        name: element.name.clone(),
                        optional: element.optional,
                        rest: element.spread,
                    });
                }
                Ok(self.interner.tuple(converted))
            }
            TypeAnnKind::Object(members) => {
                let record = self.record_from_members(members, env)?;
                Ok(self.interner.intern(TypeKey::Record(record)))
            }
            TypeAnnKind::Mapped {
                param,
                constraint,
                value,
                optional,
                readonly,
                as_clause,
            } => {
                let mut inner = env.clone();
                let param_id = self.interner.intern(TypeKey::TypeParameter(TypeParamInfo {
                    name: param.clone(),
                    constraint: None,
                    default: None,
                    is_const: false,
                    variance: Variance::Invariant,
                }));
                inner.insert(param.clone(), param_id);
                let constraint = self.type_from_ann(constraint, env)?;
                let value = self.type_from_ann(value, &inner)?;
                let as_clause = as_clause
                    .as_ref()
                    .map(|a| self.type_from_ann(a, &inner))
                    .transpose()?;
                let mapped = self.interner.intern(TypeKey::Mapped(MappedType {
                    param: param.clone(),
                    constraint,
                    value,
                    optional: convert_modifier(optional),
                    readonly: convert_modifier(readonly),
                    as_clause,
                }));
                Ok(evaluate_type(&self.interner, mapped))
            }
            TypeAnnKind::Function {
                type_params,
                params,
                return_type,
            } => {
                let (infos, inner) = self.bind_type_params(type_params, env)?;
                let mut converted = Vec::with_capacity(params.len());
                for param in params {
                    converted.push(ParamInfo {
                        name: param.name.clone(),
                        ty: self.type_from_ann(&param.ty, &inner)?,
                        optional: param.optional,
                        rest: param.rest,
                    });
                }
                let (ret, predicate) = self.return_type_from_ann(return_type, &inner)?;
                let min_arity = converted
                    .iter()
                    .filter(|p| !p.optional && !p.rest)
                    .count() as u32;
                let has_rest = converted.iter().any(|p| p.rest);
                Ok(self.interner.intern(TypeKey::Function(FunctionType {
                    type_params: infos,
                    params: converted,
                    ret,
                    min_arity,
                    has_rest,
                    this_type: None,
                    predicate,
                })))
            }
            TypeAnnKind::Keyof(source) => {
                let source = self.type_from_ann(source, env)?;
                let keyof = self.interner.intern(TypeKey::KeyOf(source));
                Ok(evaluate_type(&self.interner, keyof))
            }
            TypeAnnKind::TypeofQuery(segments) => self.resolve_typeof_query(ann, segments),
            TypeAnnKind::Conditional {
                check,
                extends,
                true_ty,
                false_ty,
            } => {
                // `infer` placeholders declared in the extends clause are
                // visible in the true branch.
                let mut infer_env = env.clone();
                collect_infer_names(extends, &mut |name| {
                    let id = self
                        .interner
                        .intern(TypeKey::Infer(name.to_string()));
                    infer_env.insert(name.to_string(), id);
                });
                let check_id = self.type_from_ann(check, env)?;
                let extends_id = self.type_from_ann(extends, &infer_env)?;
                let true_id = self.type_from_ann(true_ty, &infer_env)?;
                let false_id = self.type_from_ann(false_ty, env)?;
                let is_distributive = matches!(
                    self.interner.lookup(check_id),
                    TypeKey::TypeParameter(_)
                );
                let conditional = self.interner.conditional(ConditionalType {
                    check_type: check_id,
                    extends_type: extends_id,
                    true_type: true_id,
                    false_type: false_id,
                    is_distributive,
                });
                Ok(evaluate_type(&self.interner, conditional))
            }
            TypeAnnKind::Infer(name) => Ok(self
                .interner
                .intern(TypeKey::Infer(name.clone()))),
            TypeAnnKind::TemplateLiteral { quasis, types } => {
                let ids: Vec<TypeId> = types
                    .iter()
                    .map(|t| self.type_from_ann(t, env))
                    .collect::<Result<_, _>>()?;
                if let Some(size) = template_expansion_size(&self.interner, &ids) {
                    if size > limits::MAX_TEMPLATE_EXPANSION {
                        return Err(Diagnostic::type_error(
                            ann.span,
                            format!(
                                "Expression produces a union type that is too complex to represent ({size} combinations)."
                            ),
                            diagnostic_codes::TEMPLATE_EXPANSION_TOO_LARGE,
                        ));
                    }
                }
                let template = self.interner.intern(TypeKey::TemplateLiteral {
                    quasis: quasis.clone(),
                    types: ids,
                });
                Ok(evaluate_type(&self.interner, template))
            }
            TypeAnnKind::Predicate { .. } => {
                // A predicate outside return-type position reads as
                // boolean; the predicate itself is extracted by the
                // function-declaration conversion.
                Ok(TypeId::BOOLEAN)
            }
            TypeAnnKind::UniqueSymbol => Ok(TypeId::SYMBOL),
        }
    }

    /// Convert a return-type annotation, splitting off a type predicate
    /// when present.
    pub fn return_type_from_ann(
        &mut self,
        ann: &TypeAnn,
        env: &TypeParamEnv,
    ) -> Result<(TypeId, Option<PredicateInfo>), Diagnostic> {
        if let TypeAnnKind::Predicate { param, ty, asserts } = &ann.kind {
            let narrowed = ty
                .as_ref()
                .map(|t| self.type_from_ann(t, env))
                .transpose()?;
            let ret = if *asserts { TypeId::VOID } else { TypeId::BOOLEAN };
            return Ok((
                ret,
                Some(PredicateInfo {
                    param: param.clone(),
                    ty: narrowed,
                    asserts: *asserts,
                }),
            ));
        }
        Ok((self.type_from_ann(ann, env)?, None))
    }

    pub fn record_from_members(
        &mut self,
        members: &[ObjectTypeMember],
        env: &TypeParamEnv,
    ) -> Result<RecordType, Diagnostic> {
        let mut fields: Vec<(String, PropInfo)> = Vec::new();
        let mut indexes = IndexSignatures::default();
        for member in members {
            match member {
                ObjectTypeMember::Property {
                    name,
                    ty,
                    optional,
                    readonly,
                } => {
                    let ty = self.type_from_ann(ty, env)?;
                    fields.push((
                        name.clone(),
                        PropInfo {
                            ty,
                            optional: *optional,
                            readonly: *readonly,
                        },
                    ));
                }
                ObjectTypeMember::Method {
                    name,
                    type_params,
                    params,
                    return_type,
                    optional,
                } => {
                    let (infos, inner) = self.bind_type_params(type_params, env)?;
                    let mut converted = Vec::with_capacity(params.len());
                    for param in params {
                        converted.push(ParamInfo {
                            name: param.name.clone(),
                            ty: self.type_from_ann(&param.ty, &inner)?,
                            optional: param.optional,
                            rest: param.rest,
                        });
                    }
                    let (ret, predicate) = self.return_type_from_ann(return_type, &inner)?;
                    let min_arity = converted
                        .iter()
                        .filter(|p| !p.optional && !p.rest)
                        .count() as u32;
                    let has_rest = converted.iter().any(|p| p.rest);
                    let ty = self.interner.intern(TypeKey::Function(FunctionType {
                        type_params: infos,
                        params: converted,
                        ret,
                        min_arity,
                        has_rest,
                        this_type: None,
                        predicate,
                    }));
                    fields.push((
                        name.clone(),
                        PropInfo {
                            ty,
                            optional: *optional,
                            readonly: false,
                        },
                    ));
                }
                ObjectTypeMember::Index { key, value, .. } => {
                    let value = self.type_from_ann(value, env)?;
                    match key {
                        ast::IndexKeyKind::String => indexes.string_index = Some(value),
                        ast::IndexKeyKind::Number => indexes.number_index = Some(value),
                        ast::IndexKeyKind::Symbol => indexes.symbol_index = Some(value),
                    }
                }
            }
        }
        Ok(RecordType { fields, indexes })
    }

    // =========================================================================
    // Named references
    // =========================================================================

    fn resolve_type_ref(
        &mut self,
        ann: &TypeAnn,
        path: &[String],
        type_args: &[TypeAnn],
        env: &TypeParamEnv,
    ) -> Result<TypeId, Diagnostic> {
        let joined = path.join(".");
        let head = &path[0];

        // In-scope type parameters shadow everything.
        if path.len() == 1 {
            if let Some(&bound) = env.get(head) {
                if type_args.is_empty() {
                    return Ok(bound);
                }
            }
        }

        let args: Vec<TypeId> = type_args
            .iter()
            .map(|a| self.type_from_ann(a, env))
            .collect::<Result<_, _>>()?;

        // Built-in structural names.
        if path.len() == 1 {
            match head.as_str() {
                "Array" | "ReadonlyArray" => {
                    let element = args.first().copied().unwrap_or(TypeId::ANY);
                    return Ok(self.interner.array(element));
                }
                "Promise" => {
                    let inner = args.first().copied().unwrap_or(TypeId::ANY);
                    return Ok(self.interner.promise(inner));
                }
                _ => {}
            }
            if let Some(result) = apply_utility(&self.interner, head, &args) {
                return Ok(result);
            }
        }

        // Aliases expand at reference time with arguments substituted.
        if let Some(alias) = self.aliases.get(&joined).cloned() {
            return self.expand_alias(&alias, &args, ann);
        }

        if let Some(&target) = self.type_bindings.get(&joined) {
            return Ok(self.reference_named_type(target, &args, ann));
        }

        if let Some(enum_type) = self.enums.get(&joined) {
            return Ok(self
                .interner
                .intern(TypeKey::Enum(enum_type.clone())));
        }

        Err(Diagnostic::type_error(
            ann.span,
            format!("Cannot find name '{joined}'."),
            diagnostic_codes::CANNOT_FIND_NAME,
        ))
    }

    /// Turn a class/interface binding into the type a *type position*
    /// reference means: `Instance(C)` for classes, the interface shape
    /// itself for interfaces, instantiated when arguments are given.
    fn reference_named_type(&mut self, target: TypeId, args: &[TypeId], _ann: &TypeAnn) -> TypeId {
        match self.interner.lookup(target) {
            TypeKey::Class(class) => {
                let reference = if class.type_params.is_empty() {
                    target
                } else {
                    self.instantiate_definition(target, &class.type_params, args)
                };
                self.interner.intern(TypeKey::Instance(reference))
            }
            TypeKey::Interface(interface) => {
                if interface.type_params.is_empty() {
                    target
                } else {
                    self.instantiate_definition(target, &interface.type_params, args)
                }
            }
            _ => target,
        }
    }

    pub fn instantiate_definition(
        &mut self,
        def: TypeId,
        params: &[TypeParamInfo],
        args: &[TypeId],
    ) -> TypeId {
        // Apply defaults for missing trailing arguments.
        let mut full: SmallVec<[TypeId; 2]> = SmallVec::with_capacity(params.len());
        for (i, param) in params.iter().enumerate() {
            let arg = args.get(i).copied().or(param.default).unwrap_or(TypeId::ANY);
            full.push(arg);
        }
        if let Some(cached) = self.interner.cached_instantiation(def, &full) {
            return cached;
        }
        let id = self.interner.intern(TypeKey::InstantiatedGeneric {
            def,
            args: full.clone(),
        });
        self.interner.cache_instantiation(def, full.to_vec(), id);
        id
    }

    fn expand_alias(
        &mut self,
        alias: &sharpts_parser::ast::TypeAliasDecl,
        args: &[TypeId],
        ann: &TypeAnn,
    ) -> Result<TypeId, Diagnostic> {
        if args.len() > alias.type_params.len() {
            return Err(Diagnostic::type_error(
                ann.span,
                format!(
                    "Generic type '{}' requires {} type argument(s).",
                    alias.name,
                    alias.type_params.len()
                ),
                diagnostic_codes::CONSTRAINT_UNSATISFIED,
            ));
        }
        let empty = TypeParamEnv::default();
        let (infos, inner) = self.bind_type_params(&alias.type_params, &empty)?;
        // Constraint checks on explicit arguments.
        for (info, &arg) in infos.iter().zip(args.iter()) {
            if let Some(constraint) = info.constraint {
                if !sharpts_solver::is_compatible(&self.interner, constraint, arg) {
                    return Err(Diagnostic::type_error(
                        ann.span,
                        format!(
                            "Type '{}' does not satisfy the constraint '{}'.",
                            sharpts_solver::type_to_string(&self.interner, arg),
                            sharpts_solver::type_to_string(&self.interner, constraint)
                        ),
                        diagnostic_codes::CONSTRAINT_UNSATISFIED,
                    ));
                }
            }
        }
        let body = self.type_from_ann(&alias.ty.clone(), &inner)?;
        let subst = TypeSubstitution::from_params(&self.interner, &infos, args);
        let substituted = instantiate_type(&self.interner, body, &subst);
        Ok(evaluate_type(&self.interner, substituted))
    }

    fn resolve_typeof_query(
        &mut self,
        ann: &TypeAnn,
        segments: &[PathSeg],
    ) -> Result<TypeId, Diagnostic> {
        let PathSeg::Prop(head) = &segments[0] else {
            return Err(Diagnostic::type_error(
                ann.span,
                "Identifier expected in typeof query.",
                diagnostic_codes::CANNOT_FIND_NAME,
            ));
        };
        let mut current = match self.lookup(head) {
            Some(binding) => binding.ty,
            None => {
                return Err(Diagnostic::type_error(
                    ann.span,
                    format!("Cannot find name '{head}'."),
                    diagnostic_codes::CANNOT_FIND_NAME,
                ));
            }
        };
        for segment in &segments[1..] {
            let name = match segment {
                PathSeg::Prop(name) | PathSeg::Index(name) => name,
            };
            current = match shape_of(&self.interner, current).and_then(|s| s.find(name).copied()) {
                Some(prop) => prop.ty,
                None => {
                    return Err(Diagnostic::type_error(
                        ann.span,
                        format!("Property '{name}' does not exist in typeof query."),
                        diagnostic_codes::PROPERTY_MISSING,
                    ));
                }
            };
        }
        Ok(current)
    }
}

fn convert_modifier(modifier: &ast::MappedModifier) -> MappedModifier {
    match modifier {
        ast::MappedModifier::None => MappedModifier::None,
        ast::MappedModifier::Add => MappedModifier::Add,
        ast::MappedModifier::Remove => MappedModifier::Remove,
    }
}

fn collect_infer_names(ann: &TypeAnn, register: &mut impl FnMut(&str)) {
    match &ann.kind {
        TypeAnnKind::Infer(name) => register(name),
        TypeAnnKind::Union(members) | TypeAnnKind::Intersection(members) => {
            for member in members {
                collect_infer_names(member, register);
            }
        }
        TypeAnnKind::ArrayOf(inner) | TypeAnnKind::Keyof(inner) => {
            collect_infer_names(inner, register)
        }
        TypeAnnKind::IndexedAccess { object, index } => {
            collect_infer_names(object, register);
            collect_infer_names(index, register);
        }
        TypeAnnKind::Tuple(elements) => {
            for element in elements {
                collect_infer_names(&element.ty, register);
            }
        }
        TypeAnnKind::Ref { type_args, .. } => {
            for arg in type_args {
                collect_infer_names(arg, register);
            }
        }
        TypeAnnKind::Function {
            params,
            return_type,
            ..
        } => {
            for param in params {
                collect_infer_names(&param.ty, register);
            }
            collect_infer_names(return_type, register);
        }
        TypeAnnKind::TemplateLiteral { types, .. } => {
            for ty in types {
                collect_infer_names(ty, register);
            }
        }
        TypeAnnKind::Object(members) => {
            for member in members {
                if let ObjectTypeMember::Property { ty, .. } = member {
                    collect_infer_names(ty, register);
                }
            }
        }
        _ => {}
    }
}
