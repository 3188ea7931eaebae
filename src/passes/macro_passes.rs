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
use crate::ir::{Node, NodeKind};

/// Extracts macro definitions into the registry and blanks the
/// corresponding nodes out of the tree. Definitions may not nest.
pub struct DefineMacros {
    in_def: bool,
    nested_error: bool,
}

impl DefineMacros {
    pub fn new() -> Self {
        Self {
            in_def: false,
            nested_error: false,
        }
    }
}

impl Pass for DefineMacros {
    fn name(&self) -> &'static str {
        "Macro definition pass"
    }

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {
        self.in_def = false;
        self.nested_error = false;
    }

    fn post_pass(&mut self, ctx: &mut Context<'_>) {
        if self.in_def {
            ctx.errors.log("Unmatched .macro");
        } else if ctx.options.verbose >= 4 {
            eprintln!("Macro definitions:\n{}", ctx.macros.dump());
        }
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        let kind = std::mem::replace(&mut node.kind, NodeKind::Null);
        match kind {
            NodeKind::MacroBegin(name) => {
                if self.in_def {
                    // suppress the cascade of errors the rest of this
                    // definition would otherwise produce
                    self.nested_error = true;
                    node.kind = NodeKind::MacroBegin(name);
                    ctx.errors.log("Nested macro definition");
                } else {
                    ctx.macros.begin(name);
                    self.in_def = true;
                }
            }
            NodeKind::MacroEnd => {
                if self.in_def {
                    ctx.macros.end();
                    self.in_def = false;
                } else {
                    node.kind = NodeKind::MacroEnd;
                    if !self.nested_error {
                        ctx.errors.log("Unmatched .macend");
                    }
                }
            }
            other => {
                if self.in_def {
                    ctx.macros.append(Node {
                        point: node.point.clone(),
                        kind: other,
                    });
                } else {
                    node.kind = other;
                }
            }
        }
    }
}

/// Replaces each macro invocation with its expansion in place. Runs
/// under a fixed point so that macros invoking other macros settle;
/// runaway recursion is caught by the driver's iteration cap.
pub struct ExpandMacros {
    changed: bool,
}

impl ExpandMacros {
    pub fn new() -> Self {
        Self { changed: false }
    }
}

impl Pass for ExpandMacros {
    fn name(&self) -> &'static str {
        "Macro expansion pass"
    }

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {
        self.changed = false;
    }

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        if !matches!(node.kind, NodeKind::MacroInvoke { .. }) {
            return;
        }
        let NodeKind::MacroInvoke { name, args } =
            std::mem::replace(&mut node.kind, NodeKind::Null)
        else {
            return;
        };
        let replacement = ctx.macros.expand(&node.point, &name, &args, &mut ctx.errors);
        node.kind = replacement.kind;
        self.changed = true;
    }

    fn stable(&self) -> bool {
        !self.changed
    }
}
