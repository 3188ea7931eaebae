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
use crate::expr::{Expr, Operator};
use crate::ir::{Node, NodeKind};
use crate::opcodes::{Mode, reversed_branch};

/// `^ + n`
fn pc_plus(n: i64) -> Expr {
    Expr::Sequence {
        first: Box::new(Expr::Pc),
        rest: vec![(Operator::Add, Expr::Constant(n))],
    }
}

enum Rewrite {
    Keep,
    /// Same opcode, 16-bit relative encoding (4502).
    Long,
    /// `bra` has no inverse; it simply becomes `jmp`.
    Jmp,
    /// Reversed branch over an absolute jump.
    Reverse(&'static str),
    /// Reversed zero-page-relative branch over an absolute jump.
    ReverseZp(&'static str),
    OutOfBounds,
}

/// Rewrites branches whose target is out of signed-8-bit reach. Under
/// the 4502 the 16-bit relative form is used; otherwise the branch is
/// reversed around an absolute `jmp` (growing the instruction, which is
/// why this runs inside the width-selection fixed point). With branch
/// extension disabled the same condition is an error.
pub struct ExtendBranches {
    expanded: usize,
}

impl ExtendBranches {
    pub fn new() -> Self {
        Self { expanded: 0 }
    }
}

impl Pass for ExtendBranches {
    fn name(&self) -> &'static str {
        "Branch expansion pass"
    }

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {
        self.expanded = 0;
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        let rewrite = match &node.kind {
            NodeKind::Instruction { opcode, mode, args } => match *mode {
                Mode::Relative => {
                    let Context {
                        env,
                        errors,
                        opcodes,
                        options,
                        ..
                    } = ctx;
                    let target = args[0].value(env, errors);
                    let offset = target - (env.pc() + 2);
                    if (-128..=127).contains(&offset) {
                        Rewrite::Keep
                    } else if !options.enable_branch_extend {
                        Rewrite::OutOfBounds
                    } else if options.c4502 && opcodes.has_mode(opcode, Mode::RelativeLong) {
                        Rewrite::Long
                    } else if opcode.as_str() == "bra" {
                        Rewrite::Jmp
                    } else if let Some(reversed) = reversed_branch(opcode) {
                        Rewrite::Reverse(reversed)
                    } else {
                        Rewrite::OutOfBounds
                    }
                }
                Mode::ZPRelative => {
                    let Context {
                        env,
                        errors,
                        options,
                        ..
                    } = ctx;
                    let target = args[1].value(env, errors);
                    let offset = target - (env.pc() + 3);
                    if (-128..=127).contains(&offset) {
                        Rewrite::Keep
                    } else if !options.enable_branch_extend {
                        Rewrite::OutOfBounds
                    } else if let Some(reversed) = reversed_branch(opcode) {
                        Rewrite::ReverseZp(reversed)
                    } else {
                        Rewrite::OutOfBounds
                    }
                }
                _ => Rewrite::Keep,
            },
            _ => {
                track_pc(node, ctx);
                return;
            }
        };

        match rewrite {
            Rewrite::Keep => {
                track_pc(node, ctx);
            }
            Rewrite::OutOfBounds => {
                ctx.errors.log("Branch target out of bounds");
                track_pc(node, ctx);
            }
            Rewrite::Long => {
                if let NodeKind::Instruction { mode, .. } = &mut node.kind {
                    *mode = Mode::RelativeLong;
                }
                self.expanded += 1;
                ctx.errors
                    .warn("branch out of range, replacing with 16-bit relative branch");
                track_pc(node, ctx);
            }
            Rewrite::Jmp => {
                if let NodeKind::Instruction { opcode, mode, .. } = &mut node.kind {
                    *opcode = "jmp".to_string();
                    *mode = Mode::Absolute;
                }
                self.expanded += 1;
                ctx.errors.warn("branch out of range, replacing with jmp");
                track_pc(node, ctx);
            }
            Rewrite::Reverse(reversed) => {
                let NodeKind::Instruction { args, .. } = &node.kind else {
                    return;
                };
                let target = args[0].clone();
                let point = node.point.clone();
                node.kind = NodeKind::Sequence(vec![
                    Node::new(
                        &point,
                        NodeKind::Instruction {
                            opcode: reversed.to_string(),
                            mode: Mode::Relative,
                            args: vec![pc_plus(5)],
                        },
                    ),
                    Node::new(
                        &point,
                        NodeKind::Instruction {
                            opcode: "jmp".to_string(),
                            mode: Mode::Absolute,
                            args: vec![target],
                        },
                    ),
                ]);
                self.expanded += 1;
                ctx.errors
                    .warn("branch out of range, replacing with 5-byte equivalent");
                ctx.env.inc_pc(5);
            }
            Rewrite::ReverseZp(reversed) => {
                let NodeKind::Instruction { args, .. } = &node.kind else {
                    return;
                };
                let tested = args[0].clone();
                let target = args[1].clone();
                let point = node.point.clone();
                node.kind = NodeKind::Sequence(vec![
                    Node::new(
                        &point,
                        NodeKind::Instruction {
                            opcode: reversed.to_string(),
                            mode: Mode::ZPRelative,
                            args: vec![tested, pc_plus(6)],
                        },
                    ),
                    Node::new(
                        &point,
                        NodeKind::Instruction {
                            opcode: "jmp".to_string(),
                            mode: Mode::Absolute,
                            args: vec![target],
                        },
                    ),
                ]);
                self.expanded += 1;
                ctx.errors
                    .warn("branch out of range, replacing with 6-byte equivalent");
                ctx.env.inc_pc(6);
            }
        }
    }

    fn stable(&self) -> bool {
        self.expanded == 0
    }
}
