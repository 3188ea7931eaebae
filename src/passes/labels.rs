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
use crate::ir::{Node, NodeKind};
use crate::opcodes::OpcodeTable;
use std::collections::{HashMap, HashSet};

/// Finds all reachable labels, inserting each into the environment with
/// a provisional value of 0 once its binding expression is resolvable.
/// Runs under a fixed point because labels can depend on labels defined
/// later.
///
/// The walk tracks whether the program counter is currently *definable*:
/// it starts out known, becomes unknown after a `.org`/`.advance` whose
/// operand cannot be resolved yet, and becomes known again after one
/// that can.
pub struct InitLabels {
    changed: bool,
    pc_valid: bool,
    /// Qualified label -> the point that defined it, kept across
    /// iterations so re-visiting a node is not a duplicate.
    defined: HashMap<String, String>,
    seen_this_pass: HashSet<String>,
    reported: HashSet<String>,
    reserved: OpcodeTable,
}

impl InitLabels {
    pub fn new() -> Self {
        Self {
            changed: false,
            pc_valid: true,
            defined: HashMap::new(),
            seen_this_pass: HashSet::new(),
            reported: HashSet::new(),
            reserved: OpcodeTable::everything(),
        }
    }
}

impl Pass for InitLabels {
    fn name(&self) -> &'static str {
        "Label initialization pass"
    }

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {
        self.changed = false;
        self.pc_valid = true;
        self.seen_this_pass.clear();
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        match &node.kind {
            NodeKind::SetPC(target) | NodeKind::Advance { target, .. } => {
                self.pc_valid = target.is_valid(&ctx.env, self.pc_valid);
            }
            NodeKind::Label { name, value } => {
                let qualified = format!("{}:{}", ctx.env.current_scope(), name);
                let duplicate = match self.defined.get(&qualified) {
                    // a second definition elsewhere, or the same point
                    // reached twice in one walk (a file included twice)
                    Some(point) => {
                        point != &node.point || self.seen_this_pass.contains(&qualified)
                    }
                    None => false,
                };
                if duplicate {
                    if self.reported.insert(qualified.clone()) {
                        ctx.errors
                            .log(format!("Duplicate label definition '{}'", name));
                    }
                } else if !self.defined.contains_key(&qualified) {
                    if self.reserved.contains(name) || name.as_str() == "x" || name.as_str() == "y" {
                        ctx.errors
                            .warn(format!("'{}' is also an instruction or register name", name));
                    }
                    self.defined.insert(qualified.clone(), node.point.clone());
                }
                self.seen_this_pass.insert(qualified);
                if value.is_valid(&ctx.env, self.pc_valid) && !ctx.env.contains(name) {
                    ctx.env.define(name, 0);
                    self.changed = true;
                }
            }
            _ => {}
        }
    }

    fn stable(&self) -> bool {
        !self.changed
    }
}

/// Verifies that everything which must resolve — label bindings,
/// `.org`, `.advance`, `.checkpc` — is valid relative to the
/// PC-validity state it entered with. After label initialization has
/// settled, anything still unresolvable depends on itself.
pub struct CircularityCheck {
    pc_valid: bool,
}

impl CircularityCheck {
    pub fn new() -> Self {
        Self { pc_valid: true }
    }
}

impl Pass for CircularityCheck {
    fn name(&self) -> &'static str {
        "Circularity check pass"
    }

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {
        self.pc_valid = true;
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        match &node.kind {
            NodeKind::SetPC(target) => {
                let ok = target.is_valid(&ctx.env, self.pc_valid);
                self.pc_valid = ok;
                if !ok {
                    ctx.errors
                        .log("Undefined or circular reference on program counter set");
                }
            }
            NodeKind::Advance { target, .. } => {
                let ok = target.is_valid(&ctx.env, self.pc_valid);
                self.pc_valid = ok;
                if !ok {
                    ctx.errors
                        .log("Undefined or circular reference on .advance");
                }
            }
            NodeKind::CheckPC(target) => {
                if !target.is_valid(&ctx.env, self.pc_valid) {
                    ctx.errors
                        .log("Undefined or circular reference on program counter check");
                }
            }
            NodeKind::Label { name, value } => {
                if !value.is_valid(&ctx.env, self.pc_valid) {
                    ctx.errors
                        .log(format!("Undefined or circular dependency for label '{}'", name));
                }
            }
            _ => {}
        }
    }
}

/// Evaluates every expression in the tree, discarding the results, so
/// that any remaining undefined reference is reported before the
/// width-selection machinery starts leaning on the values.
pub struct CheckExprs;

impl Pass for CheckExprs {
    fn name(&self) -> &'static str {
        "Expression checking pass"
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        let Context { env, errors, .. } = ctx;
        node.for_each_expr(&mut |expr| {
            expr.value(env, errors);
        });
    }
}

/// Recomputes the value of every label against the current instruction
/// widths, reporting whether anything moved.
pub struct UpdateLabels {
    changed: bool,
}

impl UpdateLabels {
    pub fn new() -> Self {
        Self { changed: false }
    }
}

impl Pass for UpdateLabels {
    fn name(&self) -> &'static str {
        "Label update pass"
    }

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {
        self.changed = false;
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        if let NodeKind::Label { name, value } = &node.kind {
            let Context { env, errors, .. } = ctx;
            let old = env.lookup(name);
            let new = value.value(env, errors);
            env.define(name, new);
            if old != Some(new) {
                self.changed = true;
            }
        } else if !track_pc(node, ctx) {
            ctx.errors.log(format!(
                "Internal error!  {} cannot understand this node type",
                self.name()
            ));
        }
    }

    fn stable(&self) -> bool {
        !self.changed
    }
}
