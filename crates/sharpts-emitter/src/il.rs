//! The IL model: a stack-oriented instruction stream with typed local
//! slots, structured exception regions, labels, and a small primitive
//! opcode set. Leaf operations the host runtime must supply (array
//! element access, dictionary probes, promise registration, weak
//! tables) are expressed as intrinsics; the emitted runtime shim
//! composes them into the dynamic-dispatch helpers.

use serde::{Deserialize, Serialize};

/// A branch target, resolved by index into the method's instruction
/// stream at `MarkLabel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Label(pub u32);

/// Static type of an evaluation-stack slot or local. `Ref` is a boxed
/// object reference; the unboxed cases exist only on hot paths the
/// emitter can prove monomorphic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackType {
    Double,
    Bool,
    Str,
    Ref,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalSlot {
    pub name: String,
    pub ty: StackType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    pub class: String,
    pub name: String,
}

/// Host-provided leaf operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intrinsic {
    /// Runtime type tag of a boxed value (small integer).
    TypeTag,
    /// The `typeof` spelling for a boxed value.
    TypeOfName,
    ArrayNew,
    ArrayGet,
    ArraySet,
    ArrayLen,
    ArrayPush,
    StringLen,
    StringCharAt,
    StringConcat,
    StringEquals,
    DictNew,
    DictGet,
    DictSet,
    DictHas,
    DictRemove,
    DictKeys,
    /// Per-class field table walk (`_fields` up the base chain).
    FieldTableGet,
    FieldTableSet,
    /// Weak identity tables (frozen/sealed/private brands/symbol slots).
    WeakTableNew,
    WeakTableAdd,
    WeakTableHas,
    WeakTableGet,
    ConsoleWrite,
    NumberToString,
    ToNumber,
    MathPow,
    StringCompare,
    MakeClosure,
    InvokeClosure,
    ConstructObject,
    InstanceCheck,
    ArrayAppendAll,
    /// Resolve a built-in global binding by name.
    GetGlobal,
    MakeSymbol,
    MakePromise,
    PromiseResolve,
    PromiseReject,
    PromiseIsCompleted,
    PromiseResult,
    RegisterContinuation,
    /// Drive a machine object as an async function / (async) generator.
    RunAsyncMachine,
    MakeGenerator,
    MakeAsyncGenerator,
    BlockOnPromise,
    /// Cryptographic and URL utility wrappers (emitted only when the
    /// program references them).
    HashDigest,
    CipherTransform,
    UrlParse,
    ThrowError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Instr {
    // Constants
    LdcF64(f64),
    LdcStr(String),
    LdcBool(bool),
    LdcNull,
    LdcUndefined,
    /// Arbitrary-precision integer constant, decimal text.
    LdcBigInt(String),

    // Slots
    LdLoc(u16),
    StLoc(u16),
    LdArg(u16),
    StArg(u16),

    // Fields
    LdFld(MethodRef),
    StFld(MethodRef),
    LdSFld(MethodRef),
    StSFld(MethodRef),

    // Calls
    Call { method: MethodRef, argc: u8 },
    CallVirt { method: MethodRef, argc: u8 },
    CallIntrinsic { intrinsic: Intrinsic, argc: u8 },
    NewObj { class: String, argc: u8 },

    // Control flow
    MarkLabel(Label),
    Br(Label),
    BrTrue(Label),
    BrFalse(Label),
    Switch(Vec<Label>),
    Ret,

    // Exception regions (structured)
    BeginTry,
    BeginCatch { exception_local: u16 },
    BeginFinally,
    EndException,
    Leave(Label),
    Throw,
    Rethrow,

    // Arithmetic / comparison (operate on the unboxed stack types)
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Shl,
    Shr,
    UShr,
    BitAnd,
    BitOr,
    BitXor,
    BitNot,
    CmpEq,
    CmpNe,
    CmpLt,
    CmpLe,
    CmpGt,
    CmpGe,

    // Representation changes
    Box,
    UnboxDouble,
    UnboxBool,
    ConvStr,

    // Stack shuffling
    Dup,
    Pop,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlMethod {
    pub name: String,
    pub params: Vec<String>,
    pub locals: Vec<LocalSlot>,
    pub body: Vec<Instr>,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlField {
    pub name: String,
    pub ty: StackType,
    pub is_static: bool,
}

/// The per-state region stack of a state machine, emitted alongside
/// `MoveNext` so a raised exception in the consumer dispatches to the
/// right catch/finally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionInfo {
    pub parent: Option<u32>,
    pub catch_state: Option<u32>,
    pub finally_state: Option<u32>,
    pub exit_state: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlClass {
    pub name: String,
    pub base: Option<String>,
    pub fields: Vec<IlField>,
    pub methods: Vec<IlMethod>,
    /// Present on state-machine classes.
    pub regions: Vec<RegionInfo>,
    /// State handler indices for state-machine classes
    /// (`state -> region`), parallel to the machine's states.
    pub state_handlers: Vec<Option<u32>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IlModule {
    pub name: String,
    pub classes: Vec<IlClass>,
    pub methods: Vec<IlMethod>,
    /// Entry method name (the synthetic `main`).
    pub entry: String,
    /// Required host runtime version for the companion config.
    pub runtime_version: String,
}

impl IlModule {
    pub fn find_method(&self, name: &str) -> Option<&IlMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn find_class(&self, name: &str) -> Option<&IlClass> {
        self.classes.iter().find(|c| c.name == name)
    }
}

// =============================================================================
// Textual listing
// =============================================================================

impl std::fmt::Display for IlModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, ".module {}", self.name)?;
        writeln!(f, ".entry {}", self.entry)?;
        for class in &self.classes {
            write!(f, ".class {}", class.name)?;
            if let Some(base) = &class.base {
                write!(f, " extends {base}")?;
            }
            writeln!(f)?;
            for field in &class.fields {
                writeln!(
                    f,
                    "  .field {}{} : {:?}",
                    if field.is_static { "static " } else { "" },
                    field.name,
                    field.ty
                )?;
            }
            for method in &class.methods {
                write_method(f, method, "  ")?;
            }
            writeln!(f, ".end class")?;
        }
        for method in &self.methods {
            write_method(f, method, "")?;
        }
        Ok(())
    }
}

fn write_method(
    f: &mut std::fmt::Formatter<'_>,
    method: &IlMethod,
    indent: &str,
) -> std::fmt::Result {
    writeln!(
        f,
        "{indent}.method {}({})",
        method.name,
        method.params.join(", ")
    )?;
    for (i, local) in method.locals.iter().enumerate() {
        writeln!(f, "{indent}  .local {i} {} : {:?}", local.name, local.ty)?;
    }
    for instr in &method.body {
        match instr {
            Instr::MarkLabel(label) => writeln!(f, "{indent} L{}:", label.0)?,
            other => writeln!(f, "{indent}    {other:?}")?,
        }
    }
    writeln!(f, "{indent}.end method")
}
