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

use super::{ParseLine, Parser, TokenPat};
use crate::environment::{DEFAULT_DATA_SEGMENT, DEFAULT_TEXT_SEGMENT};
use crate::errors::ErrorLog;
use crate::expr::{Expr, Operator};
use crate::file_reader::FileReader;
use crate::ir::{Node, NodeKind};
use crate::lexer::Token;
use std::path::Path;

impl<'a, F: FileReader> Parser<'a, F> {
    /// Routes a directive to its handler. `.ascii`, `.address`,
    /// `.segment`, `.code`, and `.link` are aliases kept for old
    /// P65-style sources.
    pub(super) fn dispatch_pragma(
        &mut self,
        name: &str,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        match name {
            "include" => self.pragma_include(ppt, line, out, errors),
            "require" => self.pragma_require(ppt, line, out, errors),
            "incbin" => self.pragma_incbin(ppt, line, out, errors),
            "charmap" => self.pragma_charmap(line, errors),
            "charmapbin" => self.pragma_charmapbin(line, errors),
            "org" => self.pragma_org(ppt, line, out, errors),
            "advance" => self.pragma_advance(ppt, line, out, errors),
            "checkpc" => self.pragma_checkpc(ppt, line, out, errors),
            "alias" => self.pragma_alias(ppt, line, out, errors),
            "space" => self.pragma_space(ppt, line, out, errors),
            "text" | "segment" | "code" => self.pragma_text(ppt, line, out, errors),
            "data" => self.pragma_data(ppt, line, out, errors),
            "byte" | "ascii" => self.pragma_data_list(ppt, line, out, errors, NodeKind::Byte),
            "word" | "address" => self.pragma_data_list(ppt, line, out, errors, NodeKind::Word),
            "dword" => self.pragma_data_list(ppt, line, out, errors, NodeKind::Dword),
            "wordbe" => self.pragma_data_list(ppt, line, out, errors, NodeKind::WordBE),
            "dwordbe" => self.pragma_data_list(ppt, line, out, errors, NodeKind::DwordBE),
            "scope" => self.pragma_marker(ppt, line, out, errors, NodeKind::ScopeBegin),
            "scend" => self.pragma_marker(ppt, line, out, errors, NodeKind::ScopeEnd),
            "macend" => self.pragma_marker(ppt, line, out, errors, NodeKind::MacroEnd),
            "macro" => self.pragma_macro(ppt, line, out, errors),
            "invoke" => self.pragma_invoke(ppt, line, out, errors),
            "outfile" => self.pragma_outfile(line, errors),
            "link" => self.pragma_link(ppt, line, out, errors),
            _ => errors.log(format!("Unknown pragma {}", name)),
        }
    }

    fn pragma_include(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let filename = line.expect_string(errors);
        line.expect_eol(errors);
        out.push(self.parse_file(ppt, &filename, errors));
    }

    fn pragma_require(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let filename = line.expect_string(errors);
        line.expect_eol(errors);
        if self.required_files.insert(filename.clone()) {
            out.push(self.parse_file(ppt, &filename, errors));
        }
    }

    fn pragma_incbin(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let filename = line.expect_string(errors);
        let mut offset = Expr::Constant(0);
        let mut size = None;
        if matches!(line.lookahead(0), Token::Punct(',')) {
            line.pop();
            offset = self.parse_expr(line, errors);
            if matches!(line.lookahead(0), Token::Punct(',')) {
                line.pop();
                size = Some(self.parse_expr(line, errors));
            }
        }
        line.expect_eol(errors);
        let bytes = match self.reader.read_binary(Path::new(&filename)) {
            Ok(bytes) => bytes,
            Err(_) => {
                errors.log(format!("Could not read {}", filename));
                return;
            }
        };
        // default size runs from the offset to the end of the file
        let size = size.unwrap_or_else(|| Expr::Sequence {
            first: Box::new(Expr::Constant(bytes.len() as i64)),
            rest: vec![(Operator::Sub, offset.clone())],
        });
        out.push(Node::new(
            ppt,
            NodeKind::ByteRange {
                bytes,
                offset,
                size,
            },
        ));
    }

    fn pragma_charmap(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) {
        if matches!(line.lookahead(0), Token::Eol) {
            line.expect_eol(errors);
            for (i, slot) in self.charmap.iter_mut().enumerate() {
                *slot = i as u8;
            }
            return;
        }
        let items = self.read_data(line, errors);
        let mut values = Vec::with_capacity(items.len());
        for item in &items {
            match item {
                Expr::Constant(value) => values.push(*value),
                _ => {
                    errors.log("Illegal character in .charmap directive");
                    return;
                }
            }
        }
        let base = values[0];
        let replacement = &values[1..];
        if base < 0
            || base > 255
            || base as usize + replacement.len() > 256
            || replacement.iter().any(|&v| !(0..=255).contains(&v))
        {
            errors.log("Charmap replacement out of range");
            return;
        }
        for (i, &value) in replacement.iter().enumerate() {
            self.charmap[base as usize + i] = value as u8;
        }
    }

    fn pragma_charmapbin(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) {
        let filename = line.expect_string(errors);
        line.expect_eol(errors);
        match self.reader.read_binary(Path::new(&filename)) {
            Ok(bytes) => {
                if bytes.len() == 256 {
                    self.charmap.copy_from_slice(&bytes);
                } else {
                    errors.log(format!("Character map {} not 256 bytes long", filename));
                }
            }
            Err(_) => errors.log(format!("Could not read {}", filename)),
        }
    }

    fn pragma_org(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let new_pc = self.parse_expr(line, errors);
        line.expect_eol(errors);
        out.push(Node::new(ppt, NodeKind::SetPC(new_pc)));
    }

    fn pragma_advance(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let target = self.parse_expr(line, errors);
        let fill = if matches!(line.lookahead(0), Token::Punct(',')) {
            line.pop();
            self.parse_expr(line, errors)
        } else {
            Expr::Constant(0)
        };
        line.expect_eol(errors);
        out.push(Node::new(ppt, NodeKind::Advance { target, fill }));
    }

    fn pragma_checkpc(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let target = self.parse_expr(line, errors);
        line.expect_eol(errors);
        out.push(Node::new(ppt, NodeKind::CheckPC(target)));
    }

    fn pragma_alias(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let name = line.expect_label(errors);
        let value = self.parse_expr(line, errors);
        line.expect_eol(errors);
        out.push(Node::new(ppt, NodeKind::Label { name, value }));
    }

    /// `.space name size` gives a name to the current address and skips
    /// `size` bytes past it, without emitting anything.
    fn pragma_space(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let name = line.expect_label(errors);
        let size = line.expect_num(errors);
        line.expect_eol(errors);
        out.push(Node::new(
            ppt,
            NodeKind::Label {
                name,
                value: Expr::Pc,
            },
        ));
        out.push(Node::new(
            ppt,
            NodeKind::SetPC(Expr::Sequence {
                first: Box::new(Expr::Pc),
                rest: vec![(Operator::Add, Expr::Constant(size))],
            }),
        ));
    }

    fn pragma_text(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let segment = self.segment_name(line, errors, DEFAULT_TEXT_SEGMENT);
        out.push(Node::new(ppt, NodeKind::TextSegment(segment)));
    }

    fn pragma_data(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let segment = self.segment_name(line, errors, DEFAULT_DATA_SEGMENT);
        out.push(Node::new(ppt, NodeKind::DataSegment(segment)));
    }

    fn segment_name(
        &mut self,
        line: &mut ParseLine,
        errors: &mut ErrorLog,
        default: &str,
    ) -> String {
        match line.expect(&[TokenPat::Label, TokenPat::Eol], errors) {
            Token::Label(name) => {
                line.expect_eol(errors);
                name
            }
            _ => default.to_string(),
        }
    }

    fn pragma_data_list(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
        make: fn(Vec<Expr>) -> NodeKind,
    ) {
        let data = self.read_data(line, errors);
        out.push(Node::new(ppt, make(data)));
    }

    fn pragma_marker(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
        kind: NodeKind,
    ) {
        line.expect_eol(errors);
        out.push(Node::new(ppt, kind));
    }

    fn pragma_macro(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let name = line.expect_label(errors);
        line.expect_eol(errors);
        out.push(Node::new(ppt, NodeKind::MacroBegin(name)));
    }

    fn pragma_invoke(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let name = line.expect_label(errors);
        let args = if matches!(line.lookahead(0), Token::Eol) {
            Vec::new()
        } else {
            self.read_data(line, errors)
        };
        out.push(Node::new(ppt, NodeKind::MacroInvoke { name, args }));
    }

    fn pragma_outfile(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) {
        let filename = line.expect_string(errors);
        line.expect_eol(errors);
        if self.outfile_request.is_none() {
            self.outfile_request = Some(filename);
        }
    }

    /// `.link "file" addr` places an included file at a fixed address.
    fn pragma_link(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        out: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let filename = line.expect_string(errors);
        let new_pc = self.parse_expr(line, errors);
        line.expect_eol(errors);
        out.push(Node::new(ppt, NodeKind::SetPC(new_pc)));
        out.push(self.parse_file(ppt, &filename, errors));
    }
}
