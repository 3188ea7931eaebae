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

use crate::expr::Expr;
use crate::opcodes::Mode;
use std::fmt;

/// One node of the assembler's intermediate representation. `point` is
/// the source position ("file:line", extended with "->" arrows through
/// macro expansions) used for diagnostics and the listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub point: String,
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Sequence(Vec<Node>),
    /// The identity of the sequence constructor; dropped on concatenation.
    Null,
    Label {
        name: String,
        value: Expr,
    },
    SetPC(Expr),
    Advance {
        target: Expr,
        fill: Expr,
    },
    CheckPC(Expr),
    ScopeBegin,
    ScopeEnd,
    TextSegment(String),
    DataSegment(String),
    MacroBegin(String),
    MacroEnd,
    MacroInvoke {
        name: String,
        args: Vec<Expr>,
    },
    Byte(Vec<Expr>),
    Word(Vec<Expr>),
    Dword(Vec<Expr>),
    WordBE(Vec<Expr>),
    DwordBE(Vec<Expr>),
    /// A slice of an included binary file; offset and size stay symbolic
    /// until emission.
    ByteRange {
        bytes: Vec<u8>,
        offset: Expr,
        size: Expr,
    },
    Instruction {
        opcode: String,
        mode: Mode,
        args: Vec<Expr>,
    },
}

impl Node {
    pub fn new(point: &str, kind: NodeKind) -> Self {
        Self {
            point: point.to_string(),
            kind,
        }
    }

    pub fn null(point: &str) -> Self {
        Self::new(point, NodeKind::Null)
    }

    /// Builds a sequence, dropping `Null` nodes. An empty result is
    /// `Null` and a single survivor is returned unwrapped.
    pub fn sequence(point: &str, nodes: Vec<Node>) -> Self {
        let mut nodes: Vec<Node> = nodes
            .into_iter()
            .filter(|n| !matches!(n.kind, NodeKind::Null))
            .collect();
        match nodes.len() {
            0 => Self::null(point),
            1 => nodes.remove(0),
            _ => Self::new(point, NodeKind::Sequence(nodes)),
        }
    }

    /// Applies `f` to every expression this node carries, recursing
    /// through sequences.
    pub fn for_each_expr(&self, f: &mut dyn FnMut(&Expr)) {
        match &self.kind {
            NodeKind::Sequence(children) => {
                for child in children {
                    child.for_each_expr(f);
                }
            }
            NodeKind::Label { value, .. } => f(value),
            NodeKind::SetPC(e) | NodeKind::CheckPC(e) => f(e),
            NodeKind::Advance { target, fill } => {
                f(target);
                f(fill);
            }
            NodeKind::Byte(exprs)
            | NodeKind::Word(exprs)
            | NodeKind::Dword(exprs)
            | NodeKind::WordBE(exprs)
            | NodeKind::DwordBE(exprs) => {
                for e in exprs {
                    f(e);
                }
            }
            NodeKind::ByteRange { offset, size, .. } => {
                f(offset);
                f(size);
            }
            NodeKind::Instruction { args, .. } | NodeKind::MacroInvoke { args, .. } => {
                for e in args {
                    f(e);
                }
            }
            _ => {}
        }
    }

    /// Mutable counterpart of `for_each_expr`, used by macro expansion.
    pub fn for_each_expr_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match &mut self.kind {
            NodeKind::Sequence(children) => {
                for child in children {
                    child.for_each_expr_mut(f);
                }
            }
            NodeKind::Label { value, .. } => f(value),
            NodeKind::SetPC(e) | NodeKind::CheckPC(e) => f(e),
            NodeKind::Advance { target, fill } => {
                f(target);
                f(fill);
            }
            NodeKind::Byte(exprs)
            | NodeKind::Word(exprs)
            | NodeKind::Dword(exprs)
            | NodeKind::WordBE(exprs)
            | NodeKind::DwordBE(exprs) => {
                for e in exprs {
                    f(e);
                }
            }
            NodeKind::ByteRange { offset, size, .. } => {
                f(offset);
                f(size);
            }
            NodeKind::Instruction { args, .. } | NodeKind::MacroInvoke { args, .. } => {
                for e in args {
                    f(e);
                }
            }
            _ => {}
        }
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match &self.kind {
            NodeKind::Sequence(children) => {
                writeln!(f, "{}Sequence <{}>", pad, self.point)?;
                for child in children {
                    child.fmt_indented(f, depth + 1)?;
                }
                Ok(())
            }
            NodeKind::Null => writeln!(f, "{}Null", pad),
            NodeKind::Label { name, value } => writeln!(f, "{}Label {} = {}", pad, name, value),
            NodeKind::SetPC(e) => writeln!(f, "{}SetPC {}", pad, e),
            NodeKind::Advance { target, fill } => {
                writeln!(f, "{}Advance {} fill {}", pad, target, fill)
            }
            NodeKind::CheckPC(e) => writeln!(f, "{}CheckPC {}", pad, e),
            NodeKind::ScopeBegin => writeln!(f, "{}ScopeBegin", pad),
            NodeKind::ScopeEnd => writeln!(f, "{}ScopeEnd", pad),
            NodeKind::TextSegment(name) => writeln!(f, "{}TextSegment {}", pad, name),
            NodeKind::DataSegment(name) => writeln!(f, "{}DataSegment {}", pad, name),
            NodeKind::MacroBegin(name) => writeln!(f, "{}MacroBegin {}", pad, name),
            NodeKind::MacroEnd => writeln!(f, "{}MacroEnd", pad),
            NodeKind::MacroInvoke { name, args } => {
                write!(f, "{}MacroInvoke {}", pad, name)?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                writeln!(f)
            }
            NodeKind::Byte(exprs) => fmt_data(f, &pad, "Byte", exprs),
            NodeKind::Word(exprs) => fmt_data(f, &pad, "Word", exprs),
            NodeKind::Dword(exprs) => fmt_data(f, &pad, "Dword", exprs),
            NodeKind::WordBE(exprs) => fmt_data(f, &pad, "WordBE", exprs),
            NodeKind::DwordBE(exprs) => fmt_data(f, &pad, "DwordBE", exprs),
            NodeKind::ByteRange { bytes, offset, size } => writeln!(
                f,
                "{}ByteRange ({} bytes) offset {} size {}",
                pad,
                bytes.len(),
                offset,
                size
            ),
            NodeKind::Instruction { opcode, mode, args } => {
                write!(f, "{}{} [{}]", pad, opcode, mode.name())?;
                for arg in args {
                    write!(f, " {}", arg)?;
                }
                writeln!(f)
            }
        }
    }
}

fn fmt_data(f: &mut fmt::Formatter<'_>, pad: &str, tag: &str, exprs: &[Expr]) -> fmt::Result {
    write!(f, "{}{}", pad, tag)?;
    for e in exprs {
        write!(f, " {}", e)?;
    }
    writeln!(f)
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_drops_null() {
        let nodes = vec![
            Node::null("t:1"),
            Node::new("t:2", NodeKind::ScopeBegin),
            Node::null("t:3"),
            Node::new("t:4", NodeKind::ScopeEnd),
        ];
        let seq = Node::sequence("t:1", nodes);
        match seq.kind {
            NodeKind::Sequence(children) => assert_eq!(children.len(), 2),
            other => panic!("expected sequence, got {:?}", other),
        }
    }

    #[test]
    fn test_sequence_collapses_singleton() {
        let nodes = vec![Node::null("t:1"), Node::new("t:2", NodeKind::ScopeBegin)];
        let seq = Node::sequence("t:1", nodes);
        assert_eq!(seq.kind, NodeKind::ScopeBegin);
        assert_eq!(seq.point, "t:2");
    }

    #[test]
    fn test_empty_sequence_is_null() {
        let seq = Node::sequence("t:1", vec![Node::null("t:1")]);
        assert_eq!(seq.kind, NodeKind::Null);
    }

    #[test]
    fn test_for_each_expr_visits_nested() {
        let node = Node::new(
            "t:1",
            NodeKind::Sequence(vec![
                Node::new(
                    "t:1",
                    NodeKind::Label {
                        name: "a".to_string(),
                        value: Expr::Pc,
                    },
                ),
                Node::new("t:2", NodeKind::Byte(vec![Expr::Constant(1), Expr::Constant(2)])),
            ]),
        );
        let mut seen = 0;
        node.for_each_expr(&mut |_| seen += 1);
        assert_eq!(seen, 3);
    }
}
