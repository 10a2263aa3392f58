//! The method builder.
//!
//! Accumulates instructions while maintaining the `StackType` shadow of
//! the evaluation stack, so boxing conversions are inserted only when a
//! value's representation actually has to change. Labels are reserved
//! first and marked later; the builder checks the marks on finish.

use rustc_hash::FxHashMap;
use sharpts_common::diagnostics::{Diagnostic, diagnostic_codes};
use sharpts_common::span::Span;

use crate::il::*;

pub struct MethodBuilder {
    name: String,
    params: Vec<String>,
    locals: Vec<LocalSlot>,
    body: Vec<Instr>,
    stack: Vec<StackType>,
    next_label: u32,
    marked: FxHashMap<u32, bool>,
}

impl MethodBuilder {
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        MethodBuilder {
            name: name.into(),
            params,
            locals: Vec::new(),
            body: Vec::new(),
            stack: Vec::new(),
            next_label: 0,
            marked: FxHashMap::default(),
        }
    }

    pub fn declare_local(&mut self, name: impl Into<String>, ty: StackType) -> u16 {
        let index = self.locals.len() as u16;
        self.locals.push(LocalSlot {
            name: name.into(),
            ty,
        });
        index
    }

    pub fn local_type(&self, index: u16) -> StackType {
        self.locals
            .get(index as usize)
            .map(|l| l.ty)
            .unwrap_or(StackType::Ref)
    }

    pub fn reserve_label(&mut self) -> Label {
        let label = Label(self.next_label);
        self.next_label += 1;
        self.marked.insert(label.0, false);
        label
    }

    pub fn mark_label(&mut self, label: Label) {
        self.marked.insert(label.0, true);
        self.body.push(Instr::MarkLabel(label));
        // Control merges at labels; the conservative merge is a boxed
        // stack, and the emitter keeps the stack empty across branches.
        self.stack.clear();
    }

    /// Raw push; the caller declares the stack effect.
    pub fn emit(&mut self, instr: Instr, pops: usize, pushes: Option<StackType>) {
        for _ in 0..pops {
            self.stack.pop();
        }
        if let Some(ty) = pushes {
            self.stack.push(ty);
        }
        self.body.push(instr);
    }

    pub fn top(&self) -> Option<StackType> {
        self.stack.last().copied()
    }

    // =========================================================================
    // Typed convenience emitters
    // =========================================================================

    pub fn ldc_f64(&mut self, value: f64) {
        self.emit(Instr::LdcF64(value), 0, Some(StackType::Double));
    }

    pub fn ldc_str(&mut self, value: &str) {
        self.emit(Instr::LdcStr(value.to_string()), 0, Some(StackType::Str));
    }

    pub fn ldc_bool(&mut self, value: bool) {
        self.emit(Instr::LdcBool(value), 0, Some(StackType::Bool));
    }

    pub fn ldc_null(&mut self) {
        self.emit(Instr::LdcNull, 0, Some(StackType::Ref));
    }

    pub fn ldc_undefined(&mut self) {
        self.emit(Instr::LdcUndefined, 0, Some(StackType::Ref));
    }

    pub fn ld_loc(&mut self, index: u16) {
        let ty = self.local_type(index);
        self.emit(Instr::LdLoc(index), 0, Some(ty));
    }

    pub fn st_loc(&mut self, index: u16) {
        let expected = self.local_type(index);
        self.coerce_top(expected);
        self.emit(Instr::StLoc(index), 1, None);
    }

    pub fn ld_arg(&mut self, index: u16) {
        self.emit(Instr::LdArg(index), 0, Some(StackType::Ref));
    }

    pub fn st_arg(&mut self, index: u16) {
        self.ensure_boxed();
        self.emit(Instr::StArg(index), 1, None);
    }

    pub fn ld_fld(&mut self, class: &str, field: &str) {
        self.emit(
            Instr::LdFld(MethodRef {
                class: class.to_string(),
                name: field.to_string(),
            }),
            1,
            Some(StackType::Ref),
        );
    }

    pub fn st_fld(&mut self, class: &str, field: &str) {
        self.ensure_boxed();
        self.emit(
            Instr::StFld(MethodRef {
                class: class.to_string(),
                name: field.to_string(),
            }),
            2,
            None,
        );
    }

    pub fn call(&mut self, class: &str, name: &str, argc: u8, returns: Option<StackType>) {
        self.emit(
            Instr::Call {
                method: MethodRef {
                    class: class.to_string(),
                    name: name.to_string(),
                },
                argc,
            },
            argc as usize,
            returns,
        );
    }

    pub fn call_intrinsic(&mut self, intrinsic: Intrinsic, argc: u8, returns: Option<StackType>) {
        self.emit(
            Instr::CallIntrinsic { intrinsic, argc },
            argc as usize,
            returns,
        );
    }

    pub fn br(&mut self, label: Label) {
        self.emit(Instr::Br(label), 0, None);
        self.stack.clear();
    }

    pub fn br_true(&mut self, label: Label) {
        self.ensure_bool();
        self.emit(Instr::BrTrue(label), 1, None);
    }

    pub fn br_false(&mut self, label: Label) {
        self.ensure_bool();
        self.emit(Instr::BrFalse(label), 1, None);
    }

    pub fn ret(&mut self) {
        self.emit(Instr::Ret, 0, None);
        self.stack.clear();
    }

    pub fn dup(&mut self) {
        let top = self.top();
        self.emit(Instr::Dup, 0, top.or(Some(StackType::Ref)));
    }

    pub fn pop(&mut self) {
        self.emit(Instr::Pop, 1, None);
    }

    // =========================================================================
    // Representation discipline
    // =========================================================================

    /// Box the top of stack if it is currently unboxed.
    pub fn ensure_boxed(&mut self) {
        match self.top() {
            Some(StackType::Double) | Some(StackType::Bool) | Some(StackType::Str) => {
                self.emit(Instr::Box, 1, Some(StackType::Ref));
            }
            _ => {}
        }
    }

    /// Unbox the top of stack to a double if it is a reference.
    pub fn ensure_double(&mut self) {
        match self.top() {
            Some(StackType::Ref) | None => {
                self.emit(Instr::UnboxDouble, 1, Some(StackType::Double));
            }
            Some(StackType::Bool) | Some(StackType::Str) => {
                self.emit(Instr::CallIntrinsic {
                    intrinsic: Intrinsic::ToNumber,
                    argc: 1,
                }, 1, Some(StackType::Double));
            }
            Some(StackType::Double) => {}
        }
    }

    pub fn ensure_bool(&mut self) {
        match self.top() {
            Some(StackType::Bool) => {}
            _ => {
                self.ensure_boxed();
                self.call("Runtime", "IsTruthy", 1, Some(StackType::Bool));
            }
        }
    }

    fn coerce_top(&mut self, expected: StackType) {
        match expected {
            StackType::Ref => self.ensure_boxed(),
            StackType::Double => self.ensure_double(),
            StackType::Bool => self.ensure_bool(),
            StackType::Str => {
                if self.top() != Some(StackType::Str) {
                    self.emit(Instr::ConvStr, 1, Some(StackType::Str));
                }
            }
        }
    }

    // =========================================================================
    // Finishing
    // =========================================================================

    pub fn finish(self, is_static: bool, span: Span) -> Result<IlMethod, Diagnostic> {
        for (label, marked) in &self.marked {
            if !marked {
                return Err(Diagnostic::compile_error(
                    span,
                    format!(
                        "internal emitter invariant violated: label L{label} in '{}' was never marked",
                        self.name
                    ),
                    diagnostic_codes::EMITTER_INVARIANT,
                ));
            }
        }
        Ok(IlMethod {
            name: self.name,
            params: self.params,
            locals: self.locals,
            body: self.body,
            is_static,
        })
    }
}
