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

mod pragmas;

use crate::Options;
use crate::errors::ErrorLog;
use crate::expr::{Expr, Operator};
use crate::file_reader::FileReader;
use crate::ir::{Node, NodeKind};
use crate::lexer::{self, Token};
use crate::opcodes::{Mode, OpcodeTable};
use std::collections::HashSet;
use std::path::Path;

/// Token shapes for `ParseLine::expect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPat {
    Num,
    Str,
    Label,
    Opcode,
    X,
    Y,
    Eol,
    Punct(char),
}

impl TokenPat {
    fn matches(self, token: &Token) -> bool {
        match (self, token) {
            (TokenPat::Num, Token::Num(_)) => true,
            (TokenPat::Str, Token::Str(_)) => true,
            (TokenPat::Label, Token::Label(_)) => true,
            (TokenPat::Opcode, Token::Opcode(_)) => true,
            (TokenPat::X, Token::X) => true,
            (TokenPat::Y, Token::Y) => true,
            (TokenPat::Eol, Token::Eol) => true,
            (TokenPat::Punct(c), Token::Punct(t)) => c == *t,
            _ => false,
        }
    }

    fn describe(self) -> String {
        match self {
            TokenPat::Num => "\"NUM\"".to_string(),
            TokenPat::Str => "\"STRING\"".to_string(),
            TokenPat::Label => "\"LABEL\"".to_string(),
            TokenPat::Opcode => "\"OPCODE\"".to_string(),
            TokenPat::X => "\"X\"".to_string(),
            TokenPat::Y => "\"Y\"".to_string(),
            TokenPat::Eol => "\"EOL\"".to_string(),
            TokenPat::Punct(c) => format!("\"{}\"", c),
        }
    }
}

/// The parse state of one line of tokens. Lookahead past the end of the
/// line keeps returning the final token (always `Eol`), so the parser
/// can never run off the line.
pub struct ParseLine {
    tokens: Vec<Token>,
    position: usize,
}

impl ParseLine {
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(matches!(tokens.last(), Some(Token::Eol)));
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn lookahead(&self, n: usize) -> &Token {
        let target = (self.position + n).min(self.tokens.len() - 1);
        &self.tokens[target]
    }

    pub fn pop(&mut self) -> Token {
        let token = self.tokens[self.position].clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    /// Pops a token and reports a diagnostic when it matches none of the
    /// wanted shapes. The popped token is returned either way so parsing
    /// can continue.
    pub fn expect(&mut self, wanted: &[TokenPat], errors: &mut ErrorLog) -> Token {
        let token = self.pop();
        if !wanted.iter().any(|p| p.matches(&token)) {
            let expected: Vec<String> = wanted.iter().map(|p| p.describe()).collect();
            errors.log(format!("Expected: {}", expected.join(", ")));
        }
        token
    }

    pub fn expect_label(&mut self, errors: &mut ErrorLog) -> String {
        match self.expect(&[TokenPat::Label], errors) {
            Token::Label(name) => name,
            _ => "error".to_string(),
        }
    }

    pub fn expect_num(&mut self, errors: &mut ErrorLog) -> i64 {
        match self.expect(&[TokenPat::Num], errors) {
            Token::Num(value) => value,
            _ => 0,
        }
    }

    pub fn expect_string(&mut self, errors: &mut ErrorLog) -> String {
        match self.expect(&[TokenPat::Str], errors) {
            Token::Str(value) => value,
            _ => String::new(),
        }
    }

    pub fn expect_eol(&mut self, errors: &mut ErrorLog) {
        self.expect(&[TokenPat::Eol], errors);
    }
}

/// The recursive-descent parser and its per-assembly state: the
/// anonymous-label counter, the `.require` bookkeeping, the active
/// character map, and any `.outfile` request.
pub struct Parser<'a, F: FileReader> {
    reader: &'a F,
    opcodes: &'a OpcodeTable,
    options: &'a Options,
    temp_label_count: i64,
    required_files: HashSet<String>,
    include_stack: Vec<String>,
    charmap: [u8; 256],
    outfile_request: Option<String>,
}

impl<'a, F: FileReader> Parser<'a, F> {
    pub fn new(reader: &'a F, opcodes: &'a OpcodeTable, options: &'a Options) -> Self {
        let mut charmap = [0u8; 256];
        for (i, slot) in charmap.iter_mut().enumerate() {
            *slot = i as u8;
        }
        Self {
            reader,
            opcodes,
            options,
            temp_label_count: 0,
            required_files: HashSet::new(),
            include_stack: Vec::new(),
            charmap,
            outfile_request: None,
        }
    }

    /// The filename requested by the first `.outfile` pragma, if any.
    pub fn requested_outfile(&self) -> Option<&str> {
        self.outfile_request.as_deref()
    }

    /// Loads and parses a source file into an IR tree.
    pub fn parse_file(&mut self, point: &str, filename: &str, errors: &mut ErrorLog) -> Node {
        errors.set_point(point);
        if self.options.verbose >= 2 {
            if filename == "-" {
                eprintln!("Loading from standard input");
            } else {
                eprintln!("Loading {}", filename);
            }
        }
        if self.include_stack.iter().any(|f| f == filename) {
            errors.log(format!("Recursive include of {}", filename));
            return Node::null(point);
        }
        let source = match self.reader.read_to_string(Path::new(filename)) {
            Ok(source) => source,
            Err(_) => {
                errors.log(format!("Could not read {}", filename));
                return Node::null(point);
            }
        };
        self.include_stack.push(filename.to_string());
        let mut nodes = Vec::new();
        for (i, line) in source.lines().enumerate() {
            let ppt = format!("{}:{}", filename, i + 1);
            errors.set_point(&ppt);
            let tokens = lexer::lex(line, self.opcodes, errors);
            let node = self.parse_line(&ppt, tokens, errors);
            if !matches!(node.kind, NodeKind::Null) {
                nodes.push(node);
            }
        }
        self.include_stack.pop();
        Node::sequence(point, nodes)
    }

    /// Turns one line of tokens into an IR node. A line may stack several
    /// statements: labels (named or `*`) continue into whatever follows
    /// them.
    fn parse_line(&mut self, ppt: &str, tokens: Vec<Token>, errors: &mut ErrorLog) -> Node {
        let mut line = ParseLine::new(tokens);
        let mut result = Vec::new();
        loop {
            if matches!(line.lookahead(0), Token::Eol) {
                break;
            }
            if matches!(line.lookahead(1), Token::Punct(':')) {
                let name = line.expect_label(errors);
                line.expect(&[TokenPat::Punct(':')], errors);
                result.push(Node::new(
                    ppt,
                    NodeKind::Label {
                        name,
                        value: Expr::Pc,
                    },
                ));
                continue;
            }
            match line.lookahead(0) {
                Token::Punct('*') => {
                    line.pop();
                    self.temp_label_count += 1;
                    result.push(Node::new(
                        ppt,
                        NodeKind::Label {
                            name: format!("*{}", self.temp_label_count),
                            value: Expr::Pc,
                        },
                    ));
                }
                Token::Punct('.') | Token::Punct('`') => {
                    let which = line.pop();
                    let pragma = if which == Token::Punct('.') {
                        line.expect_label(errors)
                    } else {
                        "invoke".to_string()
                    };
                    self.dispatch_pragma(&pragma, ppt, &mut line, &mut result, errors);
                    break;
                }
                _ => {
                    self.parse_instruction(ppt, &mut line, &mut result, errors);
                    break;
                }
            }
        }
        Node::sequence(ppt, result)
    }

    /// Parses an opcode statement, classifying the addressing-mode family
    /// from the token that follows the mnemonic.
    fn parse_instruction(
        &mut self,
        ppt: &str,
        line: &mut ParseLine,
        result: &mut Vec<Node>,
        errors: &mut ErrorLog,
    ) {
        let opcode = match line.expect(&[TokenPat::Opcode], errors) {
            Token::Opcode(name) => name,
            _ => return,
        };
        let (mode, args) = match line.lookahead(0) {
            Token::Eol => (Mode::Implied, Vec::new()),
            Token::Punct('#') => {
                line.pop();
                let arg = self.parse_expr(line, errors);
                line.expect_eol(errors);
                (Mode::Immediate, vec![arg])
            }
            Token::Punct('(') => {
                line.pop();
                let arg = self.parse_expr(line, errors);
                let mode = self.parse_pointer_tail(line, errors);
                (mode, vec![arg])
            }
            _ => {
                let arg = self.parse_expr(line, errors);
                match line.expect(&[TokenPat::Eol, TokenPat::Punct(',')], errors) {
                    Token::Punct(',') => match line.lookahead(0) {
                        Token::X => {
                            line.pop();
                            line.expect_eol(errors);
                            (Mode::MemoryX, vec![arg])
                        }
                        Token::Y => {
                            line.pop();
                            line.expect_eol(errors);
                            (Mode::MemoryY, vec![arg])
                        }
                        _ => {
                            let second = self.parse_expr(line, errors);
                            line.expect_eol(errors);
                            (Mode::Memory2, vec![arg, second])
                        }
                    },
                    _ => (Mode::Memory, vec![arg]),
                }
            }
        };
        result.push(Node::new(ppt, NodeKind::Instruction { opcode, mode, args }));
    }

    /// Everything after `( expr` in an instruction operand.
    fn parse_pointer_tail(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) -> Mode {
        if matches!(line.lookahead(0), Token::Punct(',')) {
            line.pop();
            if self.options.c4502 && *line.lookahead(0) == Token::Label("sp".to_string()) {
                line.pop();
                line.expect(&[TokenPat::Punct(')')], errors);
                line.expect(&[TokenPat::Punct(',')], errors);
                line.expect(&[TokenPat::Y], errors);
                line.expect_eol(errors);
                return Mode::PointerSPY;
            }
            line.expect(&[TokenPat::X], errors);
            line.expect(&[TokenPat::Punct(')')], errors);
            line.expect_eol(errors);
            return Mode::PointerX;
        }
        line.expect(&[TokenPat::Punct(')')], errors);
        match line.expect(&[TokenPat::Punct(','), TokenPat::Eol], errors) {
            Token::Punct(',') => {
                if self.options.c4502 && *line.lookahead(0) == Token::Label("z".to_string()) {
                    line.pop();
                    line.expect_eol(errors);
                    Mode::PointerZ
                } else {
                    line.expect(&[TokenPat::Y], errors);
                    line.expect_eol(errors);
                    Mode::PointerY
                }
            }
            _ => Mode::Pointer,
        }
    }

    /// Parses an arithmetic expression. Precedence has three layers
    /// around the atoms: `* /` bind tightest, then `+ -`, then the bit
    /// operators `& | ^`, each left-associative.
    pub fn parse_expr(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) -> Expr {
        self.parse_bits(line, errors)
    }

    fn parse_bits(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) -> Expr {
        self.parse_seq(
            line,
            errors,
            &[
                ('&', Operator::And),
                ('|', Operator::Or),
                ('^', Operator::Xor),
            ],
            Self::parse_arith,
        )
    }

    fn parse_arith(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) -> Expr {
        self.parse_seq(
            line,
            errors,
            &[('+', Operator::Add), ('-', Operator::Sub)],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) -> Expr {
        self.parse_seq(
            line,
            errors,
            &[('*', Operator::Mul), ('/', Operator::Div)],
            Self::parse_atom,
        )
    }

    /// One precedence level: reads operands from the tighter-binding
    /// layer below and gathers any run of this layer's operators into a
    /// single sequence expression.
    fn parse_seq(
        &mut self,
        line: &mut ParseLine,
        errors: &mut ErrorLog,
        operators: &[(char, Operator)],
        next: fn(&mut Self, &mut ParseLine, &mut ErrorLog) -> Expr,
    ) -> Expr {
        let first = next(self, line, errors);
        let mut rest = Vec::new();
        loop {
            let c = match line.lookahead(0) {
                Token::Punct(c) => *c,
                _ => break,
            };
            let Some(&(_, op)) = operators.iter().find(|(symbol, _)| *symbol == c) else {
                break;
            };
            line.pop();
            rest.push((op, next(self, line, errors)));
        }
        if rest.is_empty() {
            first
        } else {
            Expr::Sequence {
                first: Box::new(first),
                rest,
            }
        }
    }

    fn parse_atom(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) -> Expr {
        match line.lookahead(0).clone() {
            Token::Num(value) => {
                line.pop();
                Expr::Constant(value)
            }
            Token::Label(name) => {
                line.pop();
                Expr::Label(name)
            }
            Token::Punct('^') => {
                line.pop();
                Expr::Pc
            }
            Token::Punct('[') => {
                line.pop();
                let inner = self.parse_expr(line, errors);
                line.expect(&[TokenPat::Punct(']')], errors);
                inner
            }
            Token::Punct('+') => {
                // a run of '+'s names the Nth next anonymous label
                let mut offset = 0;
                while matches!(line.lookahead(0), Token::Punct('+')) {
                    offset += 1;
                    line.pop();
                }
                Expr::Label(format!("*{}", self.temp_label_count + offset))
            }
            Token::Punct('-') => {
                let mut offset = 1;
                while matches!(line.lookahead(0), Token::Punct('-')) {
                    offset -= 1;
                    line.pop();
                }
                Expr::Label(format!("*{}", self.temp_label_count + offset))
            }
            Token::Punct('>') => {
                line.pop();
                Expr::HighByte(Box::new(self.parse_atom(line, errors)))
            }
            Token::Punct('<') => {
                line.pop();
                Expr::LowByte(Box::new(self.parse_atom(line, errors)))
            }
            _ => {
                errors.log("Expected: expression");
                Expr::Constant(0)
            }
        }
    }

    /// Reads a comma-separated data list. String items expand to one
    /// constant per byte, translated through the active character map.
    pub(crate) fn read_data(&mut self, line: &mut ParseLine, errors: &mut ErrorLog) -> Vec<Expr> {
        let mut data = Vec::new();
        loop {
            if let Token::Str(text) = line.lookahead(0) {
                let text = text.clone();
                line.pop();
                for byte in text.bytes() {
                    data.push(Expr::Constant(self.charmap[byte as usize] as i64));
                }
            } else {
                let expr = self.parse_expr(line, errors);
                data.push(expr);
            }
            match line.expect(&[TokenPat::Punct(','), TokenPat::Eol], errors) {
                Token::Punct(',') => continue,
                _ => break,
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_reader::MockFileReader;

    fn parse_source(source: &str) -> (Node, usize) {
        let options = Options::default();
        let table = OpcodeTable::build(false, false, false);
        let mut reader = MockFileReader::default();
        reader.add_file("test.oph", source);
        let mut errors = ErrorLog::new(true);
        let mut parser = Parser::new(&reader, &table, &options);
        let node = parser.parse_file("<Top Level>", "test.oph", &mut errors);
        (node, errors.count())
    }

    fn statements(node: Node) -> Vec<Node> {
        match node.kind {
            NodeKind::Sequence(children) => children,
            NodeKind::Null => Vec::new(),
            _ => vec![node],
        }
    }

    #[test]
    fn test_implied_and_immediate() {
        let (node, count) = parse_source("nop\nlda #$41\n");
        assert_eq!(count, 0);
        let stmts = statements(node);
        assert_eq!(
            stmts[0].kind,
            NodeKind::Instruction {
                opcode: "nop".to_string(),
                mode: Mode::Implied,
                args: vec![],
            }
        );
        assert_eq!(
            stmts[1].kind,
            NodeKind::Instruction {
                opcode: "lda".to_string(),
                mode: Mode::Immediate,
                args: vec![Expr::Constant(0x41)],
            }
        );
    }

    #[test]
    fn test_memory_and_pointer_families() {
        let (node, count) =
            parse_source("lda $10\nlda $10,x\nldx $10,y\nlda ($10,x)\nlda ($10),y\njmp ($1234)\n");
        assert_eq!(count, 0);
        let modes: Vec<Mode> = statements(node)
            .into_iter()
            .map(|n| match n.kind {
                NodeKind::Instruction { mode, .. } => mode,
                other => panic!("expected instruction, got {:?}", other),
            })
            .collect();
        assert_eq!(
            modes,
            vec![
                Mode::Memory,
                Mode::MemoryX,
                Mode::MemoryY,
                Mode::PointerX,
                Mode::PointerY,
                Mode::Pointer
            ]
        );
    }

    #[test]
    fn test_label_statement_continues_line() {
        let (node, count) = parse_source("start: lda #1\n");
        assert_eq!(count, 0);
        let stmts = statements(node);
        assert_eq!(stmts.len(), 2);
        assert_eq!(
            stmts[0].kind,
            NodeKind::Label {
                name: "start".to_string(),
                value: Expr::Pc,
            }
        );
    }

    #[test]
    fn test_precedence_groups_by_level() {
        let (node, count) = parse_source("lda #1+2*3\n");
        assert_eq!(count, 0);
        let stmts = statements(node);
        let NodeKind::Instruction { args, .. } = &stmts[0].kind else {
            panic!("expected instruction");
        };
        // 1 + [2*3], grouped so the sequence holds one precedence level
        let Expr::Sequence { first, rest } = &args[0] else {
            panic!("expected sequence, got {:?}", args[0]);
        };
        assert_eq!(**first, Expr::Constant(1));
        assert_eq!(rest.len(), 1);
        let (op, operand) = &rest[0];
        assert_eq!(*op, Operator::Add);
        let Expr::Sequence { first, rest } = operand else {
            panic!("expected nested sequence");
        };
        assert_eq!(**first, Expr::Constant(2));
        assert_eq!(rest[0], (Operator::Mul, Expr::Constant(3)));
    }

    #[test]
    fn test_anonymous_label_references() {
        let (node, count) = parse_source("lda +\nlda ++\n* lda -\n");
        assert_eq!(count, 0);
        let stmts = statements(node);
        let arg = |n: &Node| match &n.kind {
            NodeKind::Instruction { args, .. } => args[0].clone(),
            other => panic!("expected instruction, got {:?}", other),
        };
        assert_eq!(arg(&stmts[0]), Expr::Label("*1".to_string()));
        assert_eq!(arg(&stmts[1]), Expr::Label("*2".to_string()));
        // the line "* lda -" defines *1 and then refers to it
        let NodeKind::Sequence(pair) = &stmts[2].kind else {
            panic!("expected sequence for the starred line");
        };
        assert_eq!(
            pair[0].kind,
            NodeKind::Label {
                name: "*1".to_string(),
                value: Expr::Pc,
            }
        );
        assert_eq!(arg(&pair[1]), Expr::Label("*1".to_string()));
    }

    #[test]
    fn test_byte_selectors_bind_atoms() {
        let (node, count) = parse_source("lda #>$1234\n");
        assert_eq!(count, 0);
        let stmts = statements(node);
        let NodeKind::Instruction { args, .. } = &stmts[0].kind else {
            panic!("expected instruction");
        };
        assert_eq!(args[0], Expr::HighByte(Box::new(Expr::Constant(0x1234))));
    }

    #[test]
    fn test_unknown_pragma_reports() {
        let (_, count) = parse_source(".bogus 1\n");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_unexpected_token_reports() {
        let (_, count) = parse_source("lda ##\n");
        assert_ne!(count, 0);
    }

    #[test]
    fn test_two_operand_instruction() {
        let (node, count) = parse_source("lda $10, $20\n");
        assert_eq!(count, 0);
        let stmts = statements(node);
        assert_eq!(
            stmts[0].kind,
            NodeKind::Instruction {
                opcode: "lda".to_string(),
                mode: Mode::Memory2,
                args: vec![Expr::Constant(0x10), Expr::Constant(0x20)],
            }
        );
    }

    #[test]
    fn test_missing_file_reports() {
        let options = Options::default();
        let table = OpcodeTable::build(false, false, false);
        let reader = MockFileReader::default();
        let mut errors = ErrorLog::new(true);
        let mut parser = Parser::new(&reader, &table, &options);
        let node = parser.parse_file("<Top Level>", "gone.oph", &mut errors);
        assert_eq!(errors.count(), 1);
        assert_eq!(node.kind, NodeKind::Null);
    }
}
