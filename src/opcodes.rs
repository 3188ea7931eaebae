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

use std::collections::HashMap;

/// Addressing modes. The `Memory*` and `Pointer*` kinds are produced by
/// the parser before operand widths are known; none of them survive past
/// the mode-normalization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Implied,
    Immediate,
    ImmediateLong,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    AbsIndX,
    AbsIndY,
    AbsIndZ,
    ZPIndirect,
    IndirectX,
    IndirectY,
    IndirectZ,
    IndirectSPY,
    Relative,
    RelativeLong,
    ZPRelative,
    // parser-level kinds, width not yet selected
    Memory,
    MemoryX,
    MemoryY,
    Memory2,
    Pointer,
    PointerX,
    PointerY,
    PointerZ,
    PointerSPY,
}

impl Mode {
    /// The name used in diagnostics ("LDA does not have mode ...").
    pub fn name(self) -> &'static str {
        match self {
            Mode::Implied => "Implied",
            Mode::Immediate => "Immediate",
            Mode::ImmediateLong => "Immediate Word",
            Mode::ZeroPage => "Zero Page",
            Mode::ZeroPageX => "Zero Page, X",
            Mode::ZeroPageY => "Zero Page, Y",
            Mode::Absolute => "Absolute",
            Mode::AbsoluteX => "Absolute, X",
            Mode::AbsoluteY => "Absolute, Y",
            Mode::Indirect => "(Absolute)",
            Mode::AbsIndX => "(Absolute, X)",
            Mode::AbsIndY => "(Absolute), Y",
            Mode::AbsIndZ => "(Absolute), Z",
            Mode::ZPIndirect => "(Zero Page)",
            Mode::IndirectX => "(Zero Page, X)",
            Mode::IndirectY => "(Zero Page), Y",
            Mode::IndirectZ => "(Zero Page), Z",
            Mode::IndirectSPY => "(Zero Page, SP), Y",
            Mode::Relative => "Relative",
            Mode::RelativeLong => "Relative Word",
            Mode::ZPRelative => "Zero Page, Relative",
            Mode::Memory => "Memory",
            Mode::MemoryX => "Memory, X",
            Mode::MemoryY => "Memory, Y",
            Mode::Memory2 => "Memory, Memory",
            Mode::Pointer => "Pointer",
            Mode::PointerX => "Pointer, X",
            Mode::PointerY => "Pointer, Y",
            Mode::PointerZ => "Pointer, Z",
            Mode::PointerSPY => "Pointer SP, Y",
        }
    }

    /// Operand bytes following the opcode byte.
    pub fn arg_length(self) -> usize {
        match self {
            Mode::Implied => 0,
            Mode::Immediate
            | Mode::ZeroPage
            | Mode::ZeroPageX
            | Mode::ZeroPageY
            | Mode::ZPIndirect
            | Mode::IndirectX
            | Mode::IndirectY
            | Mode::IndirectZ
            | Mode::IndirectSPY
            | Mode::Relative => 1,
            Mode::ImmediateLong
            | Mode::Absolute
            | Mode::AbsoluteX
            | Mode::AbsoluteY
            | Mode::Indirect
            | Mode::AbsIndX
            | Mode::AbsIndY
            | Mode::AbsIndZ
            | Mode::RelativeLong
            | Mode::ZPRelative => 2,
            // unresolved kinds never reach emission
            _ => 0,
        }
    }

    /// Instruction footprint used for program-counter tracking. Unresolved
    /// kinds are charged at their widest possible encoding.
    pub fn pc_size(self) -> i64 {
        match self {
            Mode::Implied => 1,
            Mode::PointerZ | Mode::PointerSPY => 2,
            Mode::Memory
            | Mode::MemoryX
            | Mode::MemoryY
            | Mode::Memory2
            | Mode::Pointer
            | Mode::PointerX
            | Mode::PointerY => 3,
            _ => 1 + self.arg_length() as i64,
        }
    }

    pub fn is_parser_level(self) -> bool {
        matches!(
            self,
            Mode::Memory
                | Mode::MemoryX
                | Mode::MemoryY
                | Mode::Memory2
                | Mode::Pointer
                | Mode::PointerX
                | Mode::PointerY
                | Mode::PointerZ
                | Mode::PointerSPY
        )
    }
}

/// Maps each known mnemonic to the base opcode byte of every addressing
/// mode it supports under the selected instruction set.
pub struct OpcodeTable {
    ops: HashMap<&'static str, HashMap<Mode, u8>>,
}

use Mode::*;

impl OpcodeTable {
    /// Builds the table for the selected instruction set. The three
    /// extension flags are mutually exclusive at the CLI; `everything()`
    /// is the only caller that sets more than one.
    pub fn build(undoc: bool, c02: bool, c4502: bool) -> Self {
        let mut table = Self {
            ops: HashMap::new(),
        };
        table.add_base();
        if undoc {
            table.add_undoc();
        }
        if c02 {
            table.add_c02_core();
            table.add_rockwell();
            table.add_wdc();
        }
        if c4502 {
            table.add_c02_core();
            table.add_rockwell();
            table.add_ce02();
        }
        table
    }

    /// The union of every instruction set, used only for the
    /// reserved-label-name warning.
    pub fn everything() -> Self {
        let mut table = Self::build(true, true, true);
        table.add_wdc();
        table
    }

    pub fn contains(&self, mnemonic: &str) -> bool {
        self.ops.contains_key(mnemonic)
    }

    pub fn byte(&self, mnemonic: &str, mode: Mode) -> Option<u8> {
        self.ops.get(mnemonic)?.get(&mode).copied()
    }

    pub fn has_mode(&self, mnemonic: &str, mode: Mode) -> bool {
        self.byte(mnemonic, mode).is_some()
    }

    /// Every (mnemonic, mode, base byte) entry in the table.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Mode, u8)> + '_ {
        self.ops.iter().flat_map(|(&mnemonic, modes)| {
            modes.iter().map(move |(&mode, &byte)| (mnemonic, mode, byte))
        })
    }

    /// Merges modes into a mnemonic's row, creating the row if needed.
    fn add(&mut self, mnemonic: &'static str, modes: &[(Mode, u8)]) {
        let row = self.ops.entry(mnemonic).or_default();
        for &(mode, byte) in modes {
            row.insert(mode, byte);
        }
    }

    fn add_base(&mut self) {
        self.add("adc", &[(Immediate, 0x69), (ZeroPage, 0x65), (ZeroPageX, 0x75), (Absolute, 0x6D), (AbsoluteX, 0x7D), (AbsoluteY, 0x79), (IndirectX, 0x61), (IndirectY, 0x71)]);
        self.add("and", &[(Immediate, 0x29), (ZeroPage, 0x25), (ZeroPageX, 0x35), (Absolute, 0x2D), (AbsoluteX, 0x3D), (AbsoluteY, 0x39), (IndirectX, 0x21), (IndirectY, 0x31)]);
        self.add("asl", &[(Implied, 0x0A), (ZeroPage, 0x06), (ZeroPageX, 0x16), (Absolute, 0x0E), (AbsoluteX, 0x1E)]);
        self.add("bcc", &[(Relative, 0x90)]);
        self.add("bcs", &[(Relative, 0xB0)]);
        self.add("beq", &[(Relative, 0xF0)]);
        self.add("bit", &[(ZeroPage, 0x24), (Absolute, 0x2C)]);
        self.add("bmi", &[(Relative, 0x30)]);
        self.add("bne", &[(Relative, 0xD0)]);
        self.add("bpl", &[(Relative, 0x10)]);
        self.add("brk", &[(Implied, 0x00)]);
        self.add("bvc", &[(Relative, 0x50)]);
        self.add("bvs", &[(Relative, 0x70)]);
        self.add("clc", &[(Implied, 0x18)]);
        self.add("cld", &[(Implied, 0xD8)]);
        self.add("cli", &[(Implied, 0x58)]);
        self.add("clv", &[(Implied, 0xB8)]);
        self.add("cmp", &[(Immediate, 0xC9), (ZeroPage, 0xC5), (ZeroPageX, 0xD5), (Absolute, 0xCD), (AbsoluteX, 0xDD), (AbsoluteY, 0xD9), (IndirectX, 0xC1), (IndirectY, 0xD1)]);
        self.add("cpx", &[(Immediate, 0xE0), (ZeroPage, 0xE4), (Absolute, 0xEC)]);
        self.add("cpy", &[(Immediate, 0xC0), (ZeroPage, 0xC4), (Absolute, 0xCC)]);
        self.add("dec", &[(ZeroPage, 0xC6), (ZeroPageX, 0xD6), (Absolute, 0xCE), (AbsoluteX, 0xDE)]);
        self.add("dex", &[(Implied, 0xCA)]);
        self.add("dey", &[(Implied, 0x88)]);
        self.add("eor", &[(Immediate, 0x49), (ZeroPage, 0x45), (ZeroPageX, 0x55), (Absolute, 0x4D), (AbsoluteX, 0x5D), (AbsoluteY, 0x59), (IndirectX, 0x41), (IndirectY, 0x51)]);
        self.add("inc", &[(ZeroPage, 0xE6), (ZeroPageX, 0xF6), (Absolute, 0xEE), (AbsoluteX, 0xFE)]);
        self.add("inx", &[(Implied, 0xE8)]);
        self.add("iny", &[(Implied, 0xC8)]);
        self.add("jmp", &[(Absolute, 0x4C), (Indirect, 0x6C)]);
        self.add("jsr", &[(Absolute, 0x20)]);
        self.add("lda", &[(Immediate, 0xA9), (ZeroPage, 0xA5), (ZeroPageX, 0xB5), (Absolute, 0xAD), (AbsoluteX, 0xBD), (AbsoluteY, 0xB9), (IndirectX, 0xA1), (IndirectY, 0xB1)]);
        self.add("ldx", &[(Immediate, 0xA2), (ZeroPage, 0xA6), (ZeroPageY, 0xB6), (Absolute, 0xAE), (AbsoluteY, 0xBE)]);
        self.add("ldy", &[(Immediate, 0xA0), (ZeroPage, 0xA4), (ZeroPageX, 0xB4), (Absolute, 0xAC), (AbsoluteX, 0xBC)]);
        self.add("lsr", &[(Implied, 0x4A), (ZeroPage, 0x46), (ZeroPageX, 0x56), (Absolute, 0x4E), (AbsoluteX, 0x5E)]);
        self.add("nop", &[(Implied, 0xEA)]);
        self.add("ora", &[(Immediate, 0x09), (ZeroPage, 0x05), (ZeroPageX, 0x15), (Absolute, 0x0D), (AbsoluteX, 0x1D), (AbsoluteY, 0x19), (IndirectX, 0x01), (IndirectY, 0x11)]);
        self.add("pha", &[(Implied, 0x48)]);
        self.add("php", &[(Implied, 0x08)]);
        self.add("pla", &[(Implied, 0x68)]);
        self.add("plp", &[(Implied, 0x28)]);
        self.add("rol", &[(Implied, 0x2A), (ZeroPage, 0x26), (ZeroPageX, 0x36), (Absolute, 0x2E), (AbsoluteX, 0x3E)]);
        self.add("ror", &[(Implied, 0x6A), (ZeroPage, 0x66), (ZeroPageX, 0x76), (Absolute, 0x6E), (AbsoluteX, 0x7E)]);
        self.add("rti", &[(Implied, 0x40)]);
        self.add("rts", &[(Implied, 0x60)]);
        self.add("sbc", &[(Immediate, 0xE9), (ZeroPage, 0xE5), (ZeroPageX, 0xF5), (Absolute, 0xED), (AbsoluteX, 0xFD), (AbsoluteY, 0xF9), (IndirectX, 0xE1), (IndirectY, 0xF1)]);
        self.add("sec", &[(Implied, 0x38)]);
        self.add("sed", &[(Implied, 0xF8)]);
        self.add("sei", &[(Implied, 0x78)]);
        self.add("sta", &[(ZeroPage, 0x85), (ZeroPageX, 0x95), (Absolute, 0x8D), (AbsoluteX, 0x9D), (AbsoluteY, 0x99), (IndirectX, 0x81), (IndirectY, 0x91)]);
        self.add("stx", &[(ZeroPage, 0x86), (ZeroPageY, 0x96), (Absolute, 0x8E)]);
        self.add("sty", &[(ZeroPage, 0x84), (ZeroPageX, 0x94), (Absolute, 0x8C)]);
        self.add("tax", &[(Implied, 0xAA)]);
        self.add("tay", &[(Implied, 0xA8)]);
        self.add("tsx", &[(Implied, 0xBA)]);
        self.add("txa", &[(Implied, 0x8A)]);
        self.add("txs", &[(Implied, 0x9A)]);
        self.add("tya", &[(Implied, 0x98)]);
    }

    // 6510 undocumented opcodes
    fn add_undoc(&mut self) {
        self.add("slo", &[(ZeroPage, 0x07), (ZeroPageX, 0x17), (Absolute, 0x0F), (AbsoluteX, 0x1F), (AbsoluteY, 0x1B), (IndirectX, 0x03), (IndirectY, 0x13)]);
        self.add("rla", &[(ZeroPage, 0x27), (ZeroPageX, 0x37), (Absolute, 0x2F), (AbsoluteX, 0x3F), (AbsoluteY, 0x3B), (IndirectX, 0x23), (IndirectY, 0x33)]);
        self.add("sre", &[(ZeroPage, 0x47), (ZeroPageX, 0x57), (Absolute, 0x4F), (AbsoluteX, 0x5F), (AbsoluteY, 0x5B), (IndirectX, 0x43), (IndirectY, 0x53)]);
        self.add("rra", &[(ZeroPage, 0x67), (ZeroPageX, 0x77), (Absolute, 0x6F), (AbsoluteX, 0x7F), (AbsoluteY, 0x7B), (IndirectX, 0x63), (IndirectY, 0x73)]);
        self.add("sax", &[(ZeroPage, 0x87), (ZeroPageY, 0x97), (Absolute, 0x8F), (IndirectX, 0x83)]);
        self.add("lax", &[(ZeroPage, 0xA7), (ZeroPageY, 0xB7), (Absolute, 0xAF), (AbsoluteY, 0xBF), (IndirectX, 0xA3), (IndirectY, 0xB3)]);
        self.add("dcp", &[(ZeroPage, 0xC7), (ZeroPageX, 0xD7), (Absolute, 0xCF), (AbsoluteX, 0xDF), (AbsoluteY, 0xDB), (IndirectX, 0xC3), (IndirectY, 0xD3)]);
        self.add("isc", &[(ZeroPage, 0xE7), (ZeroPageX, 0xF7), (Absolute, 0xEF), (AbsoluteX, 0xFF), (AbsoluteY, 0xFB), (IndirectX, 0xE3), (IndirectY, 0xF3)]);
        self.add("anc", &[(Immediate, 0x0B)]);
        self.add("alr", &[(Immediate, 0x4B)]);
        self.add("arr", &[(Immediate, 0x6B)]);
        self.add("axs", &[(Immediate, 0xCB)]);
        self.add("xaa", &[(Immediate, 0x8B)]);
        self.add("las", &[(AbsoluteY, 0xBB)]);
        self.add("tas", &[(AbsoluteY, 0x9B)]);
        self.add("ahx", &[(AbsoluteY, 0x9F), (IndirectY, 0x93)]);
        self.add("shx", &[(AbsoluteY, 0x9E)]);
        self.add("shy", &[(AbsoluteX, 0x9C)]);
    }

    // 65c02 extensions shared with the 4502
    fn add_c02_core(&mut self) {
        self.add("bra", &[(Relative, 0x80)]);
        self.add("phx", &[(Implied, 0xDA)]);
        self.add("phy", &[(Implied, 0x5A)]);
        self.add("plx", &[(Implied, 0xFA)]);
        self.add("ply", &[(Implied, 0x7A)]);
        self.add("stz", &[(ZeroPage, 0x64), (ZeroPageX, 0x74), (Absolute, 0x9C), (AbsoluteX, 0x9E)]);
        self.add("trb", &[(ZeroPage, 0x14), (Absolute, 0x1C)]);
        self.add("tsb", &[(ZeroPage, 0x04), (Absolute, 0x0C)]);
        self.add("adc", &[(ZPIndirect, 0x72)]);
        self.add("and", &[(ZPIndirect, 0x32)]);
        self.add("cmp", &[(ZPIndirect, 0xD2)]);
        self.add("eor", &[(ZPIndirect, 0x52)]);
        self.add("lda", &[(ZPIndirect, 0xB2)]);
        self.add("ora", &[(ZPIndirect, 0x12)]);
        self.add("sbc", &[(ZPIndirect, 0xF2)]);
        self.add("sta", &[(ZPIndirect, 0x92)]);
        self.add("bit", &[(Immediate, 0x89), (ZeroPageX, 0x34), (AbsoluteX, 0x3C)]);
        self.add("dec", &[(Implied, 0x3A)]);
        self.add("inc", &[(Implied, 0x1A)]);
        self.add("jmp", &[(AbsIndX, 0x7C)]);
    }

    // Rockwell bit instructions, present on both the 65c02 and the 4502
    fn add_rockwell(&mut self) {
        self.add("rmb0", &[(ZeroPage, 0x07)]);
        self.add("rmb1", &[(ZeroPage, 0x17)]);
        self.add("rmb2", &[(ZeroPage, 0x27)]);
        self.add("rmb3", &[(ZeroPage, 0x37)]);
        self.add("rmb4", &[(ZeroPage, 0x47)]);
        self.add("rmb5", &[(ZeroPage, 0x57)]);
        self.add("rmb6", &[(ZeroPage, 0x67)]);
        self.add("rmb7", &[(ZeroPage, 0x77)]);
        self.add("smb0", &[(ZeroPage, 0x87)]);
        self.add("smb1", &[(ZeroPage, 0x97)]);
        self.add("smb2", &[(ZeroPage, 0xA7)]);
        self.add("smb3", &[(ZeroPage, 0xB7)]);
        self.add("smb4", &[(ZeroPage, 0xC7)]);
        self.add("smb5", &[(ZeroPage, 0xD7)]);
        self.add("smb6", &[(ZeroPage, 0xE7)]);
        self.add("smb7", &[(ZeroPage, 0xF7)]);
        self.add("bbr0", &[(ZPRelative, 0x0F)]);
        self.add("bbr1", &[(ZPRelative, 0x1F)]);
        self.add("bbr2", &[(ZPRelative, 0x2F)]);
        self.add("bbr3", &[(ZPRelative, 0x3F)]);
        self.add("bbr4", &[(ZPRelative, 0x4F)]);
        self.add("bbr5", &[(ZPRelative, 0x5F)]);
        self.add("bbr6", &[(ZPRelative, 0x6F)]);
        self.add("bbr7", &[(ZPRelative, 0x7F)]);
        self.add("bbs0", &[(ZPRelative, 0x8F)]);
        self.add("bbs1", &[(ZPRelative, 0x9F)]);
        self.add("bbs2", &[(ZPRelative, 0xAF)]);
        self.add("bbs3", &[(ZPRelative, 0xBF)]);
        self.add("bbs4", &[(ZPRelative, 0xCF)]);
        self.add("bbs5", &[(ZPRelative, 0xDF)]);
        self.add("bbs6", &[(ZPRelative, 0xEF)]);
        self.add("bbs7", &[(ZPRelative, 0xFF)]);
    }

    // WDC-only 65c02 additions; the 4502 reuses these slots
    fn add_wdc(&mut self) {
        self.add("stp", &[(Implied, 0xDB)]);
        self.add("wai", &[(Implied, 0xCB)]);
    }

    // CSG 65CE02/4502 extensions
    fn add_ce02(&mut self) {
        self.add("cle", &[(Implied, 0x02)]);
        self.add("see", &[(Implied, 0x03)]);
        self.add("tsy", &[(Implied, 0x0B)]);
        self.add("inz", &[(Implied, 0x1B)]);
        self.add("tys", &[(Implied, 0x2B)]);
        self.add("dez", &[(Implied, 0x3B)]);
        self.add("neg", &[(Implied, 0x42)]);
        self.add("taz", &[(Implied, 0x4B)]);
        self.add("tab", &[(Implied, 0x5B)]);
        self.add("map", &[(Implied, 0x5C)]);
        self.add("tza", &[(Implied, 0x6B)]);
        self.add("tba", &[(Implied, 0x7B)]);
        self.add("phz", &[(Implied, 0xDB)]);
        self.add("plz", &[(Implied, 0xFB)]);
        self.add("asr", &[(Implied, 0x43), (ZeroPage, 0x44), (ZeroPageX, 0x54)]);
        self.add("asw", &[(Absolute, 0xCB)]);
        self.add("row", &[(Absolute, 0xEB)]);
        self.add("dew", &[(ZeroPage, 0xC3)]);
        self.add("inw", &[(ZeroPage, 0xE3)]);
        self.add("ldz", &[(Immediate, 0xA3), (Absolute, 0xAB), (AbsoluteX, 0xBB)]);
        self.add("cpz", &[(Immediate, 0xC2), (ZeroPage, 0xD4), (Absolute, 0xDC)]);
        self.add("phw", &[(ImmediateLong, 0xF4), (Absolute, 0xFC)]);
        self.add("rtn", &[(Immediate, 0x62)]);
        self.add("bsr", &[(RelativeLong, 0x63)]);
        self.add("bcc", &[(RelativeLong, 0x93)]);
        self.add("bcs", &[(RelativeLong, 0xB3)]);
        self.add("beq", &[(RelativeLong, 0xF3)]);
        self.add("bmi", &[(RelativeLong, 0x33)]);
        self.add("bne", &[(RelativeLong, 0xD3)]);
        self.add("bpl", &[(RelativeLong, 0x13)]);
        self.add("bra", &[(RelativeLong, 0x83)]);
        self.add("bvc", &[(RelativeLong, 0x53)]);
        self.add("bvs", &[(RelativeLong, 0x73)]);
        self.add("ora", &[(IndirectZ, 0x12)]);
        self.add("and", &[(IndirectZ, 0x32)]);
        self.add("eor", &[(IndirectZ, 0x52)]);
        self.add("adc", &[(IndirectZ, 0x72)]);
        self.add("sta", &[(IndirectZ, 0x92), (IndirectSPY, 0x82)]);
        self.add("lda", &[(IndirectZ, 0xB2), (IndirectSPY, 0xE2)]);
        self.add("cmp", &[(IndirectZ, 0xD2)]);
        self.add("sbc", &[(IndirectZ, 0xF2)]);
        self.add("jsr", &[(Indirect, 0x22), (AbsIndX, 0x23)]);
        self.add("sty", &[(AbsoluteX, 0x8B)]);
        self.add("stx", &[(AbsoluteY, 0x9B)]);
    }
}

/// The branch whose condition is the complement of the given one, used
/// when a too-long branch is rewritten around an absolute jump. `bra`
/// has no inverse and is replaced by `jmp` instead.
pub fn reversed_branch(mnemonic: &str) -> Option<&'static str> {
    Some(match mnemonic {
        "bcc" => "bcs",
        "bcs" => "bcc",
        "beq" => "bne",
        "bne" => "beq",
        "bmi" => "bpl",
        "bpl" => "bmi",
        "bvc" => "bvs",
        "bvs" => "bvc",
        "bbr0" => "bbs0",
        "bbr1" => "bbs1",
        "bbr2" => "bbs2",
        "bbr3" => "bbs3",
        "bbr4" => "bbs4",
        "bbr5" => "bbs5",
        "bbr6" => "bbs6",
        "bbr7" => "bbs7",
        "bbs0" => "bbr0",
        "bbs1" => "bbr1",
        "bbs2" => "bbr2",
        "bbs3" => "bbr3",
        "bbs4" => "bbr4",
        "bbs5" => "bbr5",
        "bbs6" => "bbr6",
        "bbs7" => "bbr7",
        _ => return None,
    })
}
