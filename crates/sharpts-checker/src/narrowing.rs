//! Flow-sensitive narrowing.
//!
//! A condition expression contributes `(path, narrowed type)` pairs for
//! its true and false branches. Paths are identifiers, property chains,
//! or element accesses with a literal index; any write to a path or a
//! prefix of it invalidates the narrowings that extend it (handled in
//! [`CheckerContext::invalidate_narrowings`]).

use rustc_hash::FxHashMap;
use sharpts_parser::ast::{BinaryOp, Expr, ExprKind, Lit, LogicalOp, UnaryOp};
use sharpts_solver::evaluate::evaluate_type;
use sharpts_solver::types::*;
use sharpts_solver::{is_compatible, shape_of};

use crate::context::CheckerContext;

/// Narrowings for one branch, keyed by path.
pub type NarrowingSet = FxHashMap<String, TypeId>;

impl CheckerContext {
    /// The canonical narrowing path of an expression, when it has one.
    pub fn path_key(&self, expr: &Expr) -> Option<String> {
        match &expr.kind {
            ExprKind::Ident(name) => Some(name.clone()),
            ExprKind::This => Some("this".to_string()),
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) => self.path_key(inner),
            ExprKind::Member {
                object, property, ..
            } => Some(format!("{}.{property}", self.path_key(object)?)),
            ExprKind::Index { object, index, .. } => match &index.kind {
                ExprKind::Literal(Lit::Number(n)) => {
                    Some(format!("{}[{n}]", self.path_key(object)?))
                }
                ExprKind::Literal(Lit::Str(s)) => Some(format!("{}.{s}", self.path_key(object)?)),
                _ => None,
            },
            _ => None,
        }
    }

    /// The declared (pre-narrowing) type of a path expression, if it can
    /// be resolved without reporting errors.
    fn declared_type_of_path(&mut self, expr: &Expr) -> Option<TypeId> {
        match &expr.kind {
            ExprKind::Ident(name) => self.lookup(name).map(|b| b.ty),
            ExprKind::This => self.this_stack.last().copied(),
            ExprKind::Paren(inner) | ExprKind::NonNull(inner) => self.declared_type_of_path(inner),
            ExprKind::Member {
                object, property, ..
            } => {
                let object_ty = self.effective_type_of_path(object)?;
                self.member_type_of(object_ty, property, expr.span).ok()
            }
            _ => None,
        }
    }

    /// The current (narrowed if applicable) type of a path expression.
    pub fn effective_type_of_path(&mut self, expr: &Expr) -> Option<TypeId> {
        if let Some(path) = self.path_key(expr) {
            if let Some(narrowed) = self.narrowed(&path) {
                return Some(narrowed);
            }
        }
        self.declared_type_of_path(expr)
    }

    /// Extract the `(then, else)` narrowing sets of a condition.
    pub fn narrowings_from_condition(&mut self, cond: &Expr) -> (NarrowingSet, NarrowingSet) {
        let mut then_set = NarrowingSet::default();
        let mut else_set = NarrowingSet::default();
        self.collect_narrowings(cond, &mut then_set, &mut else_set);
        (then_set, else_set)
    }

    fn collect_narrowings(
        &mut self,
        cond: &Expr,
        then_set: &mut NarrowingSet,
        else_set: &mut NarrowingSet,
    ) {
        match &cond.kind {
            ExprKind::Paren(inner) => self.collect_narrowings(inner, then_set, else_set),
            ExprKind::Unary {
                op: UnaryOp::Not,
                operand,
            } => self.collect_narrowings(operand, else_set, then_set),
            ExprKind::Logical {
                op: LogicalOp::And,
                left,
                right,
            } => {
                // Both conjuncts hold in the true branch.
                let mut discard = NarrowingSet::default();
                self.collect_narrowings(left, then_set, &mut discard);
                self.collect_narrowings(right, then_set, &mut discard);
            }
            ExprKind::Logical {
                op: LogicalOp::Or,
                left,
                right,
            } => {
                // Both disjuncts fail in the false branch.
                let mut discard = NarrowingSet::default();
                self.collect_narrowings(left, &mut discard, else_set);
                self.collect_narrowings(right, &mut discard, else_set);
            }
            ExprKind::Binary {
                op,
                left,
                right,
            } => self.collect_from_comparison(*op, left, right, then_set, else_set),
            ExprKind::Call { callee, args, .. } => {
                self.collect_from_predicate_call(callee, args, then_set, else_set);
            }
            _ => {
                // Truthiness: `if (x)` removes null/undefined (and the
                // false literal) in the true branch.
                if let Some(path) = self.path_key(cond) {
                    if let Some(declared) = self.effective_type_of_path(cond) {
                        let narrowed = self.remove_from_union(declared, &[
                            TypeId::NULL,
                            TypeId::UNDEFINED,
                        ]);
                        then_set.insert(path, narrowed);
                    }
                }
            }
        }
    }

    fn collect_from_comparison(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        then_set: &mut NarrowingSet,
        else_set: &mut NarrowingSet,
    ) {
        let (positive, loose) = match op {
            BinaryOp::StrictEq => (true, false),
            BinaryOp::Eq => (true, true),
            BinaryOp::StrictNeq => (false, false),
            BinaryOp::Neq => (false, true),
            BinaryOp::Instanceof => {
                self.collect_instanceof(left, right, then_set);
                return;
            }
            BinaryOp::In => {
                self.collect_in(left, right, then_set, else_set);
                return;
            }
            _ => return,
        };
        // Orient the comparison so the interesting operand is on the left.
        for (subject, probe) in [(left, right), (right, left)] {
            if self.collect_equality(subject, probe, positive, loose, then_set, else_set) {
                return;
            }
        }
    }

    /// Handle `typeof x === "..."`, `x === null/undefined`, and
    /// discriminated-union equality. Returns true when a narrowing was
    /// recorded.
    fn collect_equality(
        &mut self,
        subject: &Expr,
        probe: &Expr,
        positive: bool,
        loose: bool,
        then_set: &mut NarrowingSet,
        else_set: &mut NarrowingSet,
    ) -> bool {
        // typeof x === "kind"
        if let ExprKind::Unary {
            op: UnaryOp::Typeof,
            operand,
        } = &subject.kind
        {
            let ExprKind::Literal(Lit::Str(kind)) = &probe.kind else {
                return false;
            };
            let Some(path) = self.path_key(operand) else {
                return false;
            };
            let Some(declared) = self.effective_type_of_path(operand) else {
                return false;
            };
            let Some(target) = typeof_target(kind) else {
                return false;
            };
            let (matching, rest) = self.split_by(declared, target);
            let (then_ty, else_ty) = if positive {
                (matching, rest)
            } else {
                (rest, matching)
            };
            then_set.insert(path.clone(), then_ty);
            else_set.insert(path, else_ty);
            return true;
        }

        // x === null / undefined (loose equality covers both).
        let probe_nullish = match &probe.kind {
            ExprKind::Literal(Lit::Null) => Some(if loose {
                vec![TypeId::NULL, TypeId::UNDEFINED]
            } else {
                vec![TypeId::NULL]
            }),
            ExprKind::Literal(Lit::Undefined) => Some(if loose {
                vec![TypeId::NULL, TypeId::UNDEFINED]
            } else {
                vec![TypeId::UNDEFINED]
            }),
            _ => None,
        };
        if let Some(nullish) = probe_nullish {
            let Some(path) = self.path_key(subject) else {
                return false;
            };
            let Some(declared) = self.effective_type_of_path(subject) else {
                return false;
            };
            let matching = self.keep_from_union(declared, &nullish);
            let rest = self.remove_from_union(declared, &nullish);
            let (then_ty, else_ty) = if positive {
                (matching, rest)
            } else {
                (rest, matching)
            };
            then_set.insert(path.clone(), then_ty);
            else_set.insert(path, else_ty);
            return true;
        }

        // Discriminated unions: x.kind === "literal".
        let literal = match &probe.kind {
            ExprKind::Literal(Lit::Str(s)) => Some(self.interner.string_literal(s)),
            ExprKind::Literal(Lit::Number(n)) => Some(self.interner.number_literal(*n)),
            ExprKind::Literal(Lit::Bool(b)) => Some(self.interner.boolean_literal(*b)),
            _ => None,
        };
        if let (Some(literal), ExprKind::Member { object, property, .. }) =
            (literal, &subject.kind)
        {
            let Some(object_path) = self.path_key(object) else {
                return false;
            };
            let Some(object_ty) = self.effective_type_of_path(object) else {
                return false;
            };
            if let TypeKey::Union(members) = self.interner.lookup(object_ty) {
                let mut matching = Vec::new();
                let mut rest = Vec::new();
                for member in members {
                    let discriminant = shape_of(&self.interner, member)
                        .and_then(|s| s.find(property).map(|p| p.ty));
                    let is_match = discriminant
                        .map(|d| is_compatible(&self.interner, d, literal))
                        .unwrap_or(false);
                    if is_match {
                        matching.push(member);
                    } else {
                        rest.push(member);
                    }
                }
                let matching = self.interner.union(matching);
                let rest = self.interner.union(rest);
                let (then_ty, else_ty) = if positive {
                    (matching, rest)
                } else {
                    (rest, matching)
                };
                then_set.insert(object_path.clone(), then_ty);
                else_set.insert(object_path, else_ty);
                return true;
            }
        }
        false
    }

    fn collect_instanceof(&mut self, left: &Expr, right: &Expr, then_set: &mut NarrowingSet) {
        let Some(path) = self.path_key(left) else {
            return;
        };
        let ExprKind::Ident(class_name) = &right.kind else {
            return;
        };
        let Some(binding) = self.lookup(class_name) else {
            return;
        };
        if let TypeKey::Class(_) = self.interner.lookup(binding.ty) {
            let instance = self.interner.intern(TypeKey::Instance(binding.ty));
            // Keep union members already narrower than the class.
            if let Some(declared) = self.effective_type_of_path(left) {
                if let TypeKey::Union(members) = self.interner.lookup(declared) {
                    let matching: Vec<TypeId> = members
                        .into_iter()
                        .filter(|&m| is_compatible(&self.interner, instance, m))
                        .collect();
                    if !matching.is_empty() {
                        let narrowed = self.interner.union(matching);
                        then_set.insert(path, narrowed);
                        return;
                    }
                }
            }
            then_set.insert(path, instance);
        }
    }

    fn collect_in(
        &mut self,
        left: &Expr,
        right: &Expr,
        then_set: &mut NarrowingSet,
        else_set: &mut NarrowingSet,
    ) {
        let ExprKind::Literal(Lit::Str(prop)) = &left.kind else {
            return;
        };
        let Some(path) = self.path_key(right) else {
            return;
        };
        let Some(declared) = self.effective_type_of_path(right) else {
            return;
        };
        if let TypeKey::Union(members) = self.interner.lookup(declared) {
            let mut with = Vec::new();
            let mut without = Vec::new();
            for member in members {
                let has = shape_of(&self.interner, member)
                    .map(|s| s.find(prop).is_some())
                    .unwrap_or(false);
                if has {
                    with.push(member);
                } else {
                    without.push(member);
                }
            }
            let with = self.interner.union(with);
            let without = self.interner.union(without);
            then_set.insert(path.clone(), with);
            else_set.insert(path, without);
        }
    }

    /// Apply a user-defined type predicate (`x is T`) at a call in
    /// condition position. The false branch keeps the declared union
    /// members the predicate type does not cover.
    fn collect_from_predicate_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        then_set: &mut NarrowingSet,
        else_set: &mut NarrowingSet,
    ) {
        let Some(callee_ty) = self.effective_type_of_path(callee) else {
            return;
        };
        let TypeKey::Function(function) = self.interner.lookup(callee_ty) else {
            return;
        };
        let Some(predicate) = &function.predicate else {
            return;
        };
        let Some(narrowed) = predicate.ty else {
            return;
        };
        // Find the argument bound to the predicate parameter.
        let position = function
            .params
            .iter()
            .position(|p| p.name == predicate.param);
        let Some(arg) = position.and_then(|i| args.get(i)) else {
            return;
        };
        let Some(path) = self.path_key(arg) else {
            return;
        };
        then_set.insert(path.clone(), narrowed);
        if let Some(declared) = self.effective_type_of_path(arg) {
            if let TypeKey::Union(members) = self.interner.lookup(declared) {
                let rest: Vec<TypeId> = members
                    .into_iter()
                    .filter(|&m| !is_compatible(&self.interner, narrowed, m))
                    .collect();
                let rest = self.interner.union(rest);
                else_set.insert(path, rest);
            }
        }
    }

    // =========================================================================
    // Union surgery
    // =========================================================================

    /// Split a declared type into the part matching `target` and the
    /// rest.
    fn split_by(&mut self, declared: TypeId, target: TypeofTarget) -> (TypeId, TypeId) {
        let declared = evaluate_type(&self.interner, declared);
        let members = match self.interner.lookup(declared) {
            TypeKey::Union(members) => members,
            _ => vec![declared],
        };
        let mut matching = Vec::new();
        let mut rest = Vec::new();
        for member in members {
            if self.matches_typeof(member, target) {
                matching.push(member);
            } else {
                rest.push(member);
            }
        }
        if matching.is_empty() {
            // `any`/`unknown` narrow straight to the probed primitive.
            if declared == TypeId::ANY || declared == TypeId::UNKNOWN {
                return (target_type(&mut self.interner, target), declared);
            }
        }
        (self.interner.union(matching), self.interner.union(rest))
    }

    fn matches_typeof(&self, member: TypeId, target: TypeofTarget) -> bool {
        let key = self.interner.lookup(member);
        match target {
            TypeofTarget::Number => {
                matches!(key, TypeKey::Number | TypeKey::NumberLiteral(_) | TypeKey::Enum(_))
            }
            TypeofTarget::String => matches!(
                key,
                TypeKey::String | TypeKey::StringLiteral(_) | TypeKey::TemplateLiteral { .. }
            ),
            TypeofTarget::Boolean => {
                matches!(key, TypeKey::Boolean | TypeKey::BooleanLiteral(_))
            }
            TypeofTarget::Undefined => member == TypeId::UNDEFINED || member == TypeId::VOID,
            TypeofTarget::Function => {
                matches!(key, TypeKey::Function(_) | TypeKey::Overloaded(_) | TypeKey::Class(_))
            }
            TypeofTarget::Object => matches!(
                key,
                TypeKey::Record(_)
                    | TypeKey::Interface(_)
                    | TypeKey::Instance(_)
                    | TypeKey::Array(_)
                    | TypeKey::Tuple(_)
                    | TypeKey::Promise(_)
                    | TypeKey::Null
            ),
            TypeofTarget::Symbol => member == TypeId::SYMBOL,
            TypeofTarget::BigInt => matches!(key, TypeKey::BigInt),
        }
    }

    pub fn remove_from_union(&mut self, declared: TypeId, drop: &[TypeId]) -> TypeId {
        let declared = evaluate_type(&self.interner, declared);
        match self.interner.lookup(declared) {
            TypeKey::Union(members) => {
                let kept: Vec<TypeId> = members
                    .into_iter()
                    .filter(|m| !drop.contains(m))
                    .collect();
                self.interner.union(kept)
            }
            _ => declared,
        }
    }

    fn keep_from_union(&mut self, declared: TypeId, keep: &[TypeId]) -> TypeId {
        let declared = evaluate_type(&self.interner, declared);
        match self.interner.lookup(declared) {
            TypeKey::Union(members) => {
                let kept: Vec<TypeId> =
                    members.into_iter().filter(|m| keep.contains(m)).collect();
                self.interner.union(kept)
            }
            _ => {
                if keep.contains(&declared) || declared == TypeId::ANY {
                    self.interner.union(keep.to_vec())
                } else {
                    TypeId::NEVER
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeofTarget {
    Number,
    String,
    Boolean,
    Undefined,
    Function,
    Object,
    Symbol,
    BigInt,
}

fn typeof_target(kind: &str) -> Option<TypeofTarget> {
    Some(match kind {
        "number" => TypeofTarget::Number,
        "string" => TypeofTarget::String,
        "boolean" => TypeofTarget::Boolean,
        "undefined" => TypeofTarget::Undefined,
        "function" => TypeofTarget::Function,
        "object" => TypeofTarget::Object,
        "symbol" => TypeofTarget::Symbol,
        "bigint" => TypeofTarget::BigInt,
        _ => return None,
    })
}

fn target_type(
    interner: &mut sharpts_solver::TypeInterner,
    target: TypeofTarget,
) -> TypeId {
    match target {
        TypeofTarget::Number => TypeId::NUMBER,
        TypeofTarget::String => TypeId::STRING,
        TypeofTarget::Boolean => TypeId::BOOLEAN,
        TypeofTarget::Undefined => TypeId::UNDEFINED,
        TypeofTarget::Symbol => TypeId::SYMBOL,
        TypeofTarget::BigInt => TypeId::BIGINT,
        TypeofTarget::Function => interner.intern(TypeKey::Function(FunctionType::simple(
            vec![ParamInfo {
                name: "args".to_string(),
                ty: interner.array(TypeId::ANY),
                optional: false,
                rest: true,
            }],
            TypeId::ANY,
        ))),
        TypeofTarget::Object => interner.intern(TypeKey::Record(RecordType {
            fields: Vec::new(),
            indexes: IndexSignatures {
                string_index: Some(TypeId::ANY),
                number_index: None,
                symbol_index: None,
            },
        })),
    }
}
