/*
Copyright 2025 Connor Nolan

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use super::{Context, Pass, track_pc};
use crate::expr::Expr;
use crate::ir::{Node, NodeKind};
use crate::opcodes::Mode;

/// The zero-page form of a parser-level mode, if it has one.
fn narrowed(mode: Mode) -> Option<Mode> {
    match mode {
        Mode::Memory => Some(Mode::ZeroPage),
        Mode::MemoryX => Some(Mode::ZeroPageX),
        Mode::MemoryY => Some(Mode::ZeroPageY),
        Mode::Pointer => Some(Mode::ZPIndirect),
        Mode::PointerX => Some(Mode::IndirectX),
        Mode::PointerY => Some(Mode::IndirectY),
        _ => None,
    }
}

/// The parser-level mode a zero-page form collapsed from.
fn widened(mode: Mode) -> Option<Mode> {
    match mode {
        Mode::ZeroPage => Some(Mode::Memory),
        Mode::ZeroPageX => Some(Mode::MemoryX),
        Mode::ZeroPageY => Some(Mode::MemoryY),
        Mode::ZPIndirect => Some(Mode::Pointer),
        Mode::IndirectX => Some(Mode::PointerX),
        Mode::IndirectY => Some(Mode::PointerY),
        _ => None,
    }
}

/// Narrows an instruction to its zero-page form when the operand fits in
/// a byte and the opcode supports the narrower mode. Returns whether the
/// node changed.
fn try_collapse(opcode: &str, mode: &mut Mode, args: &[Expr], ctx: &mut Context<'_>) -> bool {
    if !ctx.options.enable_collapse {
        return false;
    }
    let Some(narrow) = narrowed(*mode) else {
        return false;
    };
    if !ctx.opcodes.has_mode(opcode, narrow) {
        return false;
    }
    let Context { env, errors, .. } = ctx;
    if args[0].value(env, errors) < 0x100 {
        *mode = narrow;
        true
    } else {
        false
    }
}

/// Settles the addressing modes that need no fixed-point machinery:
/// branches become relative, two-operand instructions become
/// zero-page-relative, and instructions whose operand is a pure constant
/// are sized immediately.
pub struct EasyModes;

impl Pass for EasyModes {
    fn name(&self) -> &'static str {
        "Easy addressing modes pass"
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        let NodeKind::Instruction { opcode, mode, args } = &mut node.kind else {
            return;
        };
        match *mode {
            Mode::Memory => {
                if ctx.opcodes.has_mode(opcode, Mode::Relative) {
                    *mode = Mode::Relative;
                } else if ctx.opcodes.has_mode(opcode, Mode::RelativeLong) {
                    *mode = Mode::RelativeLong;
                } else if args[0].is_hardcoded() && !try_collapse(opcode, mode, args, ctx) {
                    *mode = Mode::Absolute;
                }
            }
            Mode::MemoryX => {
                if args[0].is_hardcoded() && !try_collapse(opcode, mode, args, ctx) {
                    *mode = Mode::AbsoluteX;
                }
            }
            Mode::MemoryY => {
                if args[0].is_hardcoded() && !try_collapse(opcode, mode, args, ctx) {
                    *mode = Mode::AbsoluteY;
                }
            }
            Mode::Memory2 => *mode = Mode::ZPRelative,
            Mode::Pointer => {
                if args[0].is_hardcoded() && !try_collapse(opcode, mode, args, ctx) {
                    *mode = Mode::Indirect;
                }
            }
            Mode::PointerX => {
                if args[0].is_hardcoded() && !try_collapse(opcode, mode, args, ctx) {
                    *mode = Mode::AbsIndX;
                }
            }
            Mode::PointerY => {
                if args[0].is_hardcoded() && !try_collapse(opcode, mode, args, ctx) {
                    *mode = Mode::AbsIndY;
                }
            }
            Mode::PointerZ => *mode = Mode::IndirectZ,
            Mode::PointerSPY => *mode = Mode::IndirectSPY,
            Mode::Immediate => {
                // opcodes like phw only take a word-sized immediate
                if !ctx.opcodes.has_mode(opcode, Mode::Immediate)
                    && ctx.opcodes.has_mode(opcode, Mode::ImmediateLong)
                {
                    *mode = Mode::ImmediateLong;
                }
            }
            _ => {}
        }
    }
}

/// Converts as many instructions as possible to zero-page form, and
/// widens back any instruction whose operand no longer fits after other
/// passes moved code around. Tracks the PC while walking so operands
/// that reference `^` read the instruction's own address.
pub struct Collapse {
    collapsed: usize,
}

impl Collapse {
    pub fn new() -> Self {
        Self { collapsed: 0 }
    }
}

impl Pass for Collapse {
    fn name(&self) -> &'static str {
        "Instruction collapse pass"
    }

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {
        self.collapsed = 0;
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        if let NodeKind::Instruction { opcode, mode, args } = &mut node.kind {
            match *mode {
                Mode::Memory
                | Mode::MemoryX
                | Mode::MemoryY
                | Mode::Pointer
                | Mode::PointerX
                | Mode::PointerY => {
                    if try_collapse(opcode, mode, args, ctx) {
                        self.collapsed += 1;
                    }
                }
                Mode::ZeroPage
                | Mode::ZeroPageX
                | Mode::ZeroPageY
                | Mode::ZPIndirect
                | Mode::IndirectX
                | Mode::IndirectY => {
                    let Context { env, errors, .. } = ctx;
                    if args[0].value(env, errors) >= 0x100 {
                        if let Some(wide) = widened(*mode) {
                            *mode = wide;
                            self.collapsed += 1;
                        }
                    }
                }
                _ => {}
            }
        }
        track_pc(node, ctx);
    }

    fn stable(&self) -> bool {
        self.collapsed == 0
    }
}

/// Rewrites the parser-level kinds that survived width selection to
/// their absolute equivalents.
pub struct NormalizeModes;

impl Pass for NormalizeModes {
    fn name(&self) -> &'static str {
        "Mode normalization pass"
    }

    fn visit(&mut self, node: &mut Node, _ctx: &mut Context<'_>) {
        let NodeKind::Instruction { mode, .. } = &mut node.kind else {
            return;
        };
        *mode = match *mode {
            Mode::Memory => Mode::Absolute,
            Mode::MemoryX => Mode::AbsoluteX,
            Mode::MemoryY => Mode::AbsoluteY,
            Mode::Pointer => Mode::Indirect,
            Mode::PointerX => Mode::AbsIndX,
            // a parser-level PointerY surviving this far is a bug upstream;
            // the emitter will reject the mode
            Mode::PointerY => Mode::AbsIndY,
            other => other,
        };
    }
}
