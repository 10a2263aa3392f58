//! The closed set of type shapes.
//!
//! Every type is a [`TypeKey`] interned to a [`TypeId`]. Number values
//! inside keys are stored as IEEE-754 bit patterns ([`FloatBits`]) so
//! keys stay `Eq + Hash`.

use bitflags::bitflags;
use smallvec::SmallVec;

/// An interned type. Primitives occupy fixed ids (see the constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const ANY: TypeId = TypeId(0);
    pub const UNKNOWN: TypeId = TypeId(1);
    pub const NEVER: TypeId = TypeId(2);
    /// Poison type produced after an error was already reported.
    pub const ERROR: TypeId = TypeId(3);
    pub const NUMBER: TypeId = TypeId(4);
    pub const STRING: TypeId = TypeId(5);
    pub const BOOLEAN: TypeId = TypeId(6);
    pub const SYMBOL: TypeId = TypeId(7);
    pub const BIGINT: TypeId = TypeId(8);
    pub const VOID: TypeId = TypeId(9);
    pub const NULL: TypeId = TypeId(10);
    pub const UNDEFINED: TypeId = TypeId(11);
    pub const TRUE: TypeId = TypeId(12);
    pub const FALSE: TypeId = TypeId(13);

    pub const FIRST_DYNAMIC: u32 = 14;
}

/// An f64 stored by bit pattern so it can participate in `Eq`/`Hash`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FloatBits(pub u64);

impl FloatBits {
    pub fn from_f64(value: f64) -> Self {
        FloatBits(value.to_bits())
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_bits(self.0)
    }
}

bitflags! {
    /// Modifiers attached to a class or object member.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemberFlags: u8 {
        const PUBLIC = 1;
        const PROTECTED = 1 << 1;
        const PRIVATE = 1 << 2;
        const READONLY = 1 << 3;
        const STATIC = 1 << 4;
        const ABSTRACT = 1 << 5;
        const OPTIONAL = 1 << 6;
    }
}

impl MemberFlags {
    pub fn accessibility(&self) -> Accessibility {
        if self.contains(MemberFlags::PRIVATE) {
            Accessibility::Private
        } else if self.contains(MemberFlags::PROTECTED) {
            Accessibility::Protected
        } else {
            Accessibility::Public
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessibility {
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variance {
    Invariant,
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeParamInfo {
    pub name: String,
    pub constraint: Option<TypeId>,
    pub default: Option<TypeId>,
    pub is_const: bool,
    pub variance: Variance,
}

/// A property of a record, interface, or instance shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropInfo {
    pub ty: TypeId,
    pub optional: bool,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct IndexSignatures {
    pub string_index: Option<TypeId>,
    pub number_index: Option<TypeId>,
    pub symbol_index: Option<TypeId>,
}

/// An anonymous structural object type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordType {
    pub fields: Vec<(String, PropInfo)>,
    pub indexes: IndexSignatures,
}

/// A named interface. Structurally identical to a record apart from the
/// name and declared type parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterfaceType {
    pub name: String,
    pub type_params: Vec<TypeParamInfo>,
    pub members: Vec<(String, PropInfo)>,
    pub extends: Vec<TypeId>,
    pub indexes: IndexSignatures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldInfo {
    pub ty: TypeId,
    pub flags: MemberFlags,
}

/// A class declaration's type. Classes are nominal: `class_id` keeps two
/// identically-shaped classes distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassType {
    pub class_id: u32,
    pub name: String,
    /// `Class` or `InstantiatedGeneric` over one.
    pub superclass: Option<TypeId>,
    pub type_params: Vec<TypeParamInfo>,
    pub fields: Vec<(String, FieldInfo)>,
    /// `Function` or `Overloaded` per method.
    pub methods: Vec<(String, FieldInfo)>,
    pub getters: Vec<(String, FieldInfo)>,
    pub setters: Vec<(String, FieldInfo)>,
    pub static_members: Vec<(String, FieldInfo)>,
    pub ctor: Option<TypeId>,
    pub abstract_methods: Vec<String>,
    pub abstract_getters: Vec<String>,
    pub abstract_setters: Vec<String>,
    pub is_abstract: bool,
}

impl ClassType {
    pub fn find_field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn find_method(&self, name: &str) -> Option<&FieldInfo> {
        self.methods.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn find_getter(&self, name: &str) -> Option<&FieldInfo> {
        self.getters.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn find_setter(&self, name: &str) -> Option<&FieldInfo> {
        self.setters.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    pub name: String,
    pub ty: TypeId,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredicateInfo {
    pub param: String,
    pub ty: Option<TypeId>,
    pub asserts: bool,
}

/// A callable signature. A non-empty `type_params` list makes this a
/// generic function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionType {
    pub type_params: Vec<TypeParamInfo>,
    pub params: Vec<ParamInfo>,
    pub ret: TypeId,
    pub min_arity: u32,
    pub has_rest: bool,
    pub this_type: Option<TypeId>,
    pub predicate: Option<PredicateInfo>,
}

impl FunctionType {
    pub fn simple(params: Vec<ParamInfo>, ret: TypeId) -> Self {
        let min_arity = params.iter().filter(|p| !p.optional && !p.rest).count() as u32;
        let has_rest = params.iter().any(|p| p.rest);
        FunctionType {
            type_params: Vec::new(),
            params,
            ret,
            min_arity,
            has_rest,
            this_type: None,
            predicate: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleElement {
    pub type_id: TypeId,
    pub name: Option<String>,
    pub optional: bool,
    pub rest: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleType {
    pub elements: Vec<TupleElement>,
    pub required_count: u32,
    pub has_spread: bool,
}

impl TupleType {
    pub fn from_elements(elements: Vec<TupleElement>) -> Self {
        let required_count = elements
            .iter()
            .filter(|e| !e.optional && !e.rest)
            .count() as u32;
        let has_spread = elements.iter().any(|e| e.rest);
        TupleType {
            elements,
            required_count,
            has_spread,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConditionalType {
    pub check_type: TypeId,
    pub extends_type: TypeId,
    pub true_type: TypeId,
    pub false_type: TypeId,
    /// A conditional whose check type was written as a naked type
    /// parameter distributes over unions.
    pub is_distributive: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MappedModifier {
    None,
    Add,
    Remove,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappedType {
    pub param: String,
    pub constraint: TypeId,
    pub value: TypeId,
    pub optional: MappedModifier,
    pub readonly: MappedModifier,
    pub as_clause: Option<TypeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumKind {
    Numeric,
    String,
    Heterogeneous,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnumMemberValue {
    Num(FloatBits),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumType {
    pub enum_id: u32,
    pub name: String,
    pub kind: EnumKind,
    pub members: Vec<(String, EnumMemberValue)>,
    pub is_const: bool,
}

/// The closed variant set of the type system.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKey {
    // Primitives (fixed, pre-seeded ids).
    Any,
    Unknown,
    Never,
    Error,
    Number,
    String,
    Boolean,
    Symbol,
    BigInt,
    Void,
    Null,
    Undefined,

    // Literals.
    StringLiteral(String),
    NumberLiteral(FloatBits),
    BooleanLiteral(bool),

    // Compound.
    Array(TypeId),
    Tuple(TupleType),

    // Structural.
    Record(RecordType),
    Interface(InterfaceType),

    // Nominal.
    Class(ClassType),
    /// An instance of a class (`TypeId` points at the `Class`, or at an
    /// `InstantiatedGeneric` over one).
    Instance(TypeId),

    // Callables.
    Function(FunctionType),
    Overloaded(Vec<TypeId>),

    // Generics.
    TypeParameter(TypeParamInfo),
    InstantiatedGeneric {
        def: TypeId,
        args: SmallVec<[TypeId; 2]>,
    },

    // Derived / lazy.
    Union(Vec<TypeId>),
    Intersection(Vec<TypeId>),
    KeyOf(TypeId),
    IndexedAccess {
        object: TypeId,
        index: TypeId,
    },
    Conditional(ConditionalType),
    Infer(String),
    Mapped(MappedType),
    TemplateLiteral {
        /// `quasis.len() == types.len() + 1`
        quasis: Vec<String>,
        types: Vec<TypeId>,
    },
    Spread(TypeId),
    Promise(TypeId),
    Enum(EnumType),
}

impl TypeKey {
    /// Whether this key is one of the lazy forms that `evaluate_type`
    /// expands.
    pub fn is_lazy(&self) -> bool {
        matches!(
            self,
            TypeKey::KeyOf(_)
                | TypeKey::IndexedAccess { .. }
                | TypeKey::Conditional(_)
                | TypeKey::Mapped(_)
                | TypeKey::TemplateLiteral { .. }
        )
    }
}
