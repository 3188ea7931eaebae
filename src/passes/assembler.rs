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

use super::{Context, Pass};
use crate::expr::Expr;
use crate::ir::{Node, NodeKind};
use crate::listing::{LabelMap, Listing};
use crate::opcodes::Mode;
use std::fmt::Write as _;

/// The final pass: converts the settled IR into bytes, range-checking
/// every operand, and feeds the listing and label-map collectors along
/// the way. Bytes may only be emitted in a text segment.
pub struct Assembler {
    pub output: Vec<u8>,
    pub code: usize,
    pub data: usize,
    pub filler: usize,
    pub listing: Option<Listing>,
    pub label_map: Option<LabelMap>,
}

impl Assembler {
    pub fn new(want_listing: bool, want_label_map: bool) -> Self {
        Self {
            output: Vec::new(),
            code: 0,
            data: 0,
            filler: 0,
            listing: want_listing.then(Listing::new),
            label_map: want_label_map.then(LabelMap::new),
        }
    }

    fn push_raw(&mut self, ctx: &mut Context<'_>, byte: u8) {
        if ctx.write_ok {
            self.output.push(byte);
        } else {
            ctx.errors.log("Attempt to write to data segment");
        }
    }

    /// Emits one byte, range-checked; out-of-range values are reported
    /// and substituted with 0. Returns the evaluated value for display.
    fn output_byte(&mut self, ctx: &mut Context<'_>, expr: &Expr) -> i64 {
        let Context { env, errors, .. } = ctx;
        let mut value = expr.value(env, errors);
        if !(0..=0xFF).contains(&value) {
            errors.log(format!("Byte constant {} out of range", expr));
            value = 0;
        }
        self.push_raw(ctx, value as u8);
        value
    }

    fn output_word(&mut self, ctx: &mut Context<'_>, expr: &Expr) -> i64 {
        let Context { env, errors, .. } = ctx;
        let mut value = expr.value(env, errors);
        if !(0..=0xFFFF).contains(&value) {
            errors.log(format!("Word constant {} out of range", expr));
            value = 0;
        }
        self.push_raw(ctx, (value & 0xFF) as u8);
        self.push_raw(ctx, ((value >> 8) & 0xFF) as u8);
        value
    }

    fn output_dword(&mut self, ctx: &mut Context<'_>, expr: &Expr) -> i64 {
        let Context { env, errors, .. } = ctx;
        let mut value = expr.value(env, errors);
        if !(0..=0xFFFF_FFFF).contains(&value) {
            errors.log(format!("DWord constant {} out of range", expr));
            value = 0;
        }
        for shift in [0, 8, 16, 24] {
            self.push_raw(ctx, ((value >> shift) & 0xFF) as u8);
        }
        value
    }

    fn output_word_be(&mut self, ctx: &mut Context<'_>, expr: &Expr) -> i64 {
        let Context { env, errors, .. } = ctx;
        let mut value = expr.value(env, errors);
        if !(0..=0xFFFF).contains(&value) {
            errors.log(format!("Word constant {} out of range", expr));
            value = 0;
        }
        self.push_raw(ctx, ((value >> 8) & 0xFF) as u8);
        self.push_raw(ctx, (value & 0xFF) as u8);
        value
    }

    fn output_dword_be(&mut self, ctx: &mut Context<'_>, expr: &Expr) -> i64 {
        let Context { env, errors, .. } = ctx;
        let mut value = expr.value(env, errors);
        if !(0..=0xFFFF_FFFF).contains(&value) {
            errors.log(format!("DWord constant {} out of range", expr));
            value = 0;
        }
        for shift in [24, 16, 8, 0] {
            self.push_raw(ctx, ((value >> shift) & 0xFF) as u8);
        }
        value
    }

    /// Forwards bytes emitted since `start` to the listing.
    fn list_data(&mut self, ctx: &Context<'_>, pc: i64, start: usize) {
        if let Some(listing) = &mut self.listing {
            if ctx.write_ok && self.output.len() > start {
                listing.add_data(pc, &self.output[start..]);
            }
        }
    }

    fn assemble_instruction(
        &mut self,
        point: &str,
        opcode: &str,
        mode: Mode,
        args: &[Expr],
        ctx: &mut Context<'_>,
    ) {
        if mode.is_parser_level() {
            ctx.errors.log(format!(
                "Internal error!  Assembler reached unresolved mode \"{}\"",
                mode.name()
            ));
            return;
        }
        let Some(base) = ctx.opcodes.byte(opcode, mode) else {
            ctx.errors.log(format!(
                "{} does not have mode \"{}\"",
                opcode.to_uppercase(),
                mode.name()
            ));
            return;
        };
        let pc = ctx.env.pc();
        let start = self.output.len();
        self.push_raw(ctx, base);
        let mut display = Vec::new();
        match mode {
            Mode::Implied => {}
            Mode::Relative => {
                let Context { env, errors, .. } = ctx;
                let target = args[0].value(env, errors);
                let mut offset = target - (pc + 2);
                if !(-128..=127).contains(&offset) {
                    errors.log("Branch target out of bounds");
                    offset = 0;
                }
                self.push_raw(ctx, (offset & 0xFF) as u8);
                display.push(target & 0xFFFF);
            }
            Mode::RelativeLong => {
                let Context { env, errors, .. } = ctx;
                let target = args[0].value(env, errors);
                let offset = (target - (pc + 2)).rem_euclid(0x10000);
                self.push_raw(ctx, (offset & 0xFF) as u8);
                self.push_raw(ctx, ((offset >> 8) & 0xFF) as u8);
                display.push(target & 0xFFFF);
            }
            Mode::ZPRelative => {
                let tested = self.output_byte(ctx, &args[0]);
                let Context { env, errors, .. } = ctx;
                let target = args[1].value(env, errors);
                let mut offset = target - (pc + 3);
                if !(-128..=127).contains(&offset) {
                    errors.log("Branch target out of bounds");
                    offset = 0;
                }
                self.push_raw(ctx, (offset & 0xFF) as u8);
                display.push(tested);
                display.push(target & 0xFFFF);
            }
            _ => match mode.arg_length() {
                1 => display.push(self.output_byte(ctx, &args[0])),
                2 => display.push(self.output_word(ctx, &args[0])),
                _ => {}
            },
        }
        ctx.env.inc_pc(1 + mode.arg_length() as i64);
        self.code += 1 + mode.arg_length();

        if self.listing.is_some() && ctx.write_ok {
            let mut hex = String::new();
            for byte in &self.output[start..] {
                if !hex.is_empty() {
                    hex.push(' ');
                }
                let _ = write!(hex, "{:02X}", byte);
            }
            let operand = operand_text(mode, &display);
            let text = if operand.is_empty() {
                format!(" {:04X}  {:<9} {}", pc & 0xFFFF, hex, opcode)
            } else {
                format!(" {:04X}  {:<9} {} {}", pc & 0xFFFF, hex, opcode, operand)
            };
            if let Some(listing) = &mut self.listing {
                listing.add_instruction(point, text);
            }
        }
    }
}

/// The reconstructed operand for the listing, with all arguments
/// precomputed.
fn operand_text(mode: Mode, values: &[i64]) -> String {
    match mode {
        Mode::Immediate => format!("#${:02X}", values[0]),
        Mode::ImmediateLong => format!("#${:04X}", values[0]),
        Mode::ZeroPage => format!("${:02X}", values[0]),
        Mode::ZeroPageX => format!("${:02X},X", values[0]),
        Mode::ZeroPageY => format!("${:02X},Y", values[0]),
        Mode::Absolute => format!("${:04X}", values[0]),
        Mode::AbsoluteX => format!("${:04X},X", values[0]),
        Mode::AbsoluteY => format!("${:04X},Y", values[0]),
        Mode::Indirect => format!("(${:04X})", values[0]),
        Mode::AbsIndX => format!("(${:04X},X)", values[0]),
        Mode::AbsIndY => format!("(${:04X}),Y", values[0]),
        Mode::AbsIndZ => format!("(${:04X}),Z", values[0]),
        Mode::ZPIndirect => format!("(${:02X})", values[0]),
        Mode::IndirectX => format!("(${:02X},X)", values[0]),
        Mode::IndirectY => format!("(${:02X}),Y", values[0]),
        Mode::IndirectZ => format!("(${:02X}),Z", values[0]),
        Mode::IndirectSPY => format!("(${:02X},SP),Y", values[0]),
        Mode::Relative | Mode::RelativeLong => format!("${:04X}", values[0]),
        Mode::ZPRelative => format!("${:02X},${:04X}", values[0], values[1]),
        _ => String::new(),
    }
}

impl Pass for Assembler {
    fn name(&self) -> &'static str {
        "Assembler"
    }

    fn post_pass(&mut self, ctx: &mut Context<'_>) {
        if ctx.options.verbose >= 1 && ctx.errors.count() == 0 {
            eprintln!(
                "Assembly complete: {} bytes output ({} code, {} data, {} filler)",
                self.output.len(),
                self.code,
                self.data,
                self.filler
            );
        }
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        match &node.kind {
            NodeKind::Instruction { opcode, mode, args } => {
                self.assemble_instruction(&node.point, opcode, *mode, args, ctx);
            }
            NodeKind::Byte(exprs) => {
                let pc = ctx.env.pc();
                let start = self.output.len();
                for expr in exprs {
                    self.output_byte(ctx, expr);
                }
                ctx.env.inc_pc(exprs.len() as i64);
                self.data += exprs.len();
                self.list_data(ctx, pc, start);
            }
            NodeKind::Word(exprs) => {
                let pc = ctx.env.pc();
                let start = self.output.len();
                for expr in exprs {
                    self.output_word(ctx, expr);
                }
                ctx.env.inc_pc(exprs.len() as i64 * 2);
                self.data += exprs.len() * 2;
                self.list_data(ctx, pc, start);
            }
            NodeKind::Dword(exprs) => {
                let pc = ctx.env.pc();
                let start = self.output.len();
                for expr in exprs {
                    self.output_dword(ctx, expr);
                }
                ctx.env.inc_pc(exprs.len() as i64 * 4);
                self.data += exprs.len() * 4;
                self.list_data(ctx, pc, start);
            }
            NodeKind::WordBE(exprs) => {
                let pc = ctx.env.pc();
                let start = self.output.len();
                for expr in exprs {
                    self.output_word_be(ctx, expr);
                }
                ctx.env.inc_pc(exprs.len() as i64 * 2);
                self.data += exprs.len() * 2;
                self.list_data(ctx, pc, start);
            }
            NodeKind::DwordBE(exprs) => {
                let pc = ctx.env.pc();
                let start = self.output.len();
                for expr in exprs {
                    self.output_dword_be(ctx, expr);
                }
                ctx.env.inc_pc(exprs.len() as i64 * 4);
                self.data += exprs.len() * 4;
                self.list_data(ctx, pc, start);
            }
            NodeKind::ByteRange {
                bytes,
                offset,
                size,
            } => {
                let pc = ctx.env.pc();
                let start = self.output.len();
                let (offset_v, size_v) = {
                    let Context { env, errors, .. } = ctx;
                    (offset.value(env, errors), size.value(env, errors))
                };
                if offset_v < 0 || size_v < 0 || offset_v + size_v > bytes.len() as i64 {
                    ctx.errors.log(format!(
                        "Bad .incbin range: offset {} size {} of {} bytes",
                        offset_v,
                        size_v,
                        bytes.len()
                    ));
                } else {
                    let slice = bytes[offset_v as usize..(offset_v + size_v) as usize].to_vec();
                    if ctx.write_ok {
                        self.output.extend_from_slice(&slice);
                        self.data += slice.len();
                    } else {
                        ctx.errors.log("Attempt to write to data segment");
                    }
                }
                ctx.env.inc_pc(size_v.max(0));
                self.list_data(ctx, pc, start);
            }
            NodeKind::SetPC(target) => {
                let value = {
                    let Context { env, errors, .. } = ctx;
                    target.value(env, errors)
                };
                ctx.env.set_pc(value);
                if let Some(listing) = &mut self.listing {
                    listing.divider(value);
                }
            }
            NodeKind::CheckPC(target) => {
                let Context { env, errors, .. } = ctx;
                let target = target.value(env, errors);
                let pc = env.pc();
                if pc > target {
                    errors.log(format!(
                        ".checkpc assertion failed: ${:x} > ${:x}",
                        pc, target
                    ));
                }
            }
            NodeKind::Advance { target, fill } => {
                let pc = ctx.env.pc();
                let start = self.output.len();
                let (target_v, mut fill_v) = {
                    let Context { env, errors, .. } = ctx;
                    (target.value(env, errors), fill.value(env, errors))
                };
                if pc > target_v {
                    ctx.errors.log(format!(
                        "Attempted to .advance backwards: ${:x} to ${:x}",
                        pc, target_v
                    ));
                } else {
                    if !(0..=0xFF).contains(&fill_v) {
                        ctx.errors
                            .log(format!("Byte constant {} out of range", fill));
                        fill_v = 0;
                    }
                    if ctx.write_ok {
                        let count = (target_v - pc) as usize;
                        self.output.resize(self.output.len() + count, fill_v as u8);
                        self.filler += count;
                    } else {
                        ctx.errors.log("Attempt to write to data segment");
                    }
                }
                ctx.env.set_pc(target_v);
                self.list_data(ctx, pc, start);
            }
            NodeKind::Label { name, value } => {
                if let Some(map) = &mut self.label_map {
                    let Context { env, errors, .. } = ctx;
                    let location = value.value(env, errors);
                    map.add(name, &node.point, location);
                }
            }
            _ => {
                ctx.errors
                    .log("Internal error!  Assembler cannot understand this node type");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Options;
    use crate::errors::ErrorLog;
    use crate::opcodes::OpcodeTable;

    /// Every table entry encodes to exactly 1 + arglen bytes, the first
    /// of which is the table's base byte, under every instruction set.
    #[test]
    fn test_every_table_entry_encodes() {
        let options = Options {
            verbose: 0,
            ..Options::default()
        };
        let sets = [
            (false, false, false),
            (true, false, false),
            (false, true, false),
            (false, false, true),
        ];
        for (undoc, c02, c4502) in sets {
            let table = OpcodeTable::build(undoc, c02, c4502);
            for (mnemonic, mode, base) in table.iter() {
                let mut ctx = Context::new(&table, &options, ErrorLog::new(false));
                let mut assembler = Assembler::new(false, false);
                let args = match mode {
                    Mode::Implied => vec![],
                    Mode::ZPRelative => vec![Expr::Constant(1), Expr::Constant(2)],
                    _ => vec![Expr::Constant(1)],
                };
                let mut node = Node::new(
                    "test:1",
                    NodeKind::Instruction {
                        opcode: mnemonic.to_string(),
                        mode,
                        args,
                    },
                );
                assembler.visit(&mut node, &mut ctx);
                assert_eq!(
                    ctx.errors.count(),
                    0,
                    "errors encoding {} in {}",
                    mnemonic,
                    mode.name()
                );
                assert_eq!(
                    assembler.output.len(),
                    1 + mode.arg_length(),
                    "wrong length for {} in {}",
                    mnemonic,
                    mode.name()
                );
                assert_eq!(assembler.output[0], base);
            }
        }
    }
}
