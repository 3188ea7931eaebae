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

//! The pass pipeline. The IR tree is built once; translation happens by
//! running many small passes over it, several of them repeatedly inside
//! fixed-point drivers until instruction widths and label values stop
//! moving.

pub mod assembler;
mod branches;
mod labels;
mod macro_passes;
mod modes;

pub use assembler::Assembler;
pub use branches::ExtendBranches;
pub use labels::{CheckExprs, CircularityCheck, InitLabels, UpdateLabels};
pub use macro_passes::{DefineMacros, ExpandMacros};
pub use modes::{Collapse, EasyModes, NormalizeModes};

use crate::Options;
use crate::environment::Environment;
use crate::errors::ErrorLog;
use crate::ir::{Node, NodeKind};
use crate::macros::MacroStore;
use crate::opcodes::OpcodeTable;

/// Everything a pass can see: the symbol environment, the diagnostic
/// sink, the macro registry, the opcode table, and the run options.
/// One value of this is threaded through the whole pipeline.
pub struct Context<'a> {
    pub env: Environment,
    pub errors: ErrorLog,
    pub macros: MacroStore,
    pub opcodes: &'a OpcodeTable,
    pub options: &'a Options,
    /// Bytes may only be emitted while this is set; data segments clear it.
    pub write_ok: bool,
}

impl<'a> Context<'a> {
    pub fn new(opcodes: &'a OpcodeTable, options: &'a Options, errors: ErrorLog) -> Self {
        Self {
            env: Environment::new(),
            errors,
            macros: MacroStore::new(),
            opcodes,
            options,
            write_ok: true,
        }
    }
}

/// A single tree-walking pass. The shared walker handles the structural
/// node kinds (sequence recursion, segment switches, scopes); `visit`
/// receives everything else.
pub trait Pass {
    fn name(&self) -> &'static str;

    fn pre_pass(&mut self, _ctx: &mut Context<'_>) {}

    fn post_pass(&mut self, _ctx: &mut Context<'_>) {}

    fn visit(&mut self, node: &mut Node, ctx: &mut Context<'_>);

    /// Whether the last run changed nothing; consulted by fixed-point
    /// drivers. Passes that never change the tree are always stable.
    fn stable(&self) -> bool {
        true
    }
}

/// Anything the pipeline can run: a pass, or a whole fixed-point group
/// of them.
pub trait Stage {
    fn go(&mut self, node: &mut Node, ctx: &mut Context<'_>);
    fn stable(&self) -> bool;
}

impl<P: Pass> Stage for P {
    /// Prepares the environment, walks the tree once, and dumps state at
    /// the chattier verbosity levels. Refuses to run once any error has
    /// been reported.
    fn go(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        if ctx.errors.count() != 0 {
            return;
        }
        if ctx.options.verbose >= 3 {
            eprintln!("Running: {}", self.name());
        }
        ctx.env.reset(&mut ctx.errors);
        ctx.write_ok = true;
        self.pre_pass(ctx);
        walk(self, node, ctx);
        self.post_pass(ctx);
        ctx.env.reset(&mut ctx.errors);
        if ctx.options.verbose >= 4 {
            eprintln!("Current IR:\n{}", node);
        }
        if ctx.options.verbose >= 5 {
            eprintln!("Current labels:\n{}", ctx.env);
        }
    }

    fn stable(&self) -> bool {
        Pass::stable(self)
    }
}

/// Dispatches one node, handling the structural kinds every pass agrees
/// on and keeping the diagnostic point current.
pub fn walk<P: Pass + ?Sized>(pass: &mut P, node: &mut Node, ctx: &mut Context<'_>) {
    ctx.errors.set_point(&node.point);
    match &mut node.kind {
        NodeKind::Sequence(children) => {
            for child in children {
                walk(pass, child, ctx);
            }
            return;
        }
        NodeKind::Null => return,
        NodeKind::TextSegment(name) => {
            ctx.write_ok = true;
            ctx.env.set_segment(name.as_str());
            return;
        }
        NodeKind::DataSegment(name) => {
            ctx.write_ok = false;
            ctx.env.set_segment(name.as_str());
            return;
        }
        NodeKind::ScopeBegin => {
            ctx.env.new_scope();
            return;
        }
        NodeKind::ScopeEnd => {
            ctx.env.end_scope(&mut ctx.errors);
            return;
        }
        _ => {}
    }
    pass.visit(node, ctx);
}

const FIXPOINT_LIMIT: usize = 100;

/// Runs a list of stages in order until all of them report stability.
/// Always runs them at least once; gives up after 100 iterations, since
/// a pipeline that keeps changing is stuck in a dependency cycle.
pub struct FixPoint {
    name: &'static str,
    stages: Vec<Box<dyn Stage>>,
}

impl FixPoint {
    pub fn new(name: &'static str, stages: Vec<Box<dyn Stage>>) -> Self {
        Self { name, stages }
    }
}

impl Stage for FixPoint {
    fn go(&mut self, node: &mut Node, ctx: &mut Context<'_>) {
        for _ in 0..FIXPOINT_LIMIT {
            if ctx.errors.count() != 0 {
                return;
            }
            for stage in &mut self.stages {
                stage.go(node, ctx);
            }
            if ctx.errors.count() != 0 {
                return;
            }
            if self.stages.iter().all(|s| s.stable()) {
                return;
            }
            if ctx.options.verbose >= 3 {
                eprintln!("Fixpoint failed, looping back");
            }
        }
        ctx.errors.log(format!(
            "Can't make {} converge!  Maybe there's a recursive dependency somewhere?",
            self.name
        ));
    }

    fn stable(&self) -> bool {
        true
    }
}

/// Advances the PC by the natural footprint of a node. Shared by every
/// pass that needs to know instruction addresses while it walks.
/// Returns false for node kinds that have no business surviving to a
/// PC-tracking pass.
pub fn track_pc(node: &Node, ctx: &mut Context<'_>) -> bool {
    match &node.kind {
        NodeKind::Instruction { mode, .. } => ctx.env.inc_pc(mode.pc_size()),
        NodeKind::Byte(exprs) => ctx.env.inc_pc(exprs.len() as i64),
        NodeKind::Word(exprs) | NodeKind::WordBE(exprs) => ctx.env.inc_pc(exprs.len() as i64 * 2),
        NodeKind::Dword(exprs) | NodeKind::DwordBE(exprs) => {
            ctx.env.inc_pc(exprs.len() as i64 * 4)
        }
        NodeKind::ByteRange { size, .. } => {
            let size = size.value(&ctx.env, &mut ctx.errors);
            ctx.env.inc_pc(size);
        }
        NodeKind::SetPC(target) | NodeKind::Advance { target, .. } => {
            let target = target.value(&ctx.env, &mut ctx.errors);
            ctx.env.set_pc(target);
        }
        NodeKind::CheckPC(_) | NodeKind::Label { .. } => {}
        _ => return false,
    }
    true
}

/// The pass pipeline in its fixed order, mirroring the dependency
/// structure of the translation: macros first, then label discovery and
/// validation, then width selection interleaved with label settling,
/// then normalization. Byte emission (the `Assembler` pass) is run
/// separately by the caller so it can keep the output buffer.
pub fn pipeline() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(DefineMacros::new()),
        Box::new(FixPoint::new(
            "macro expansion",
            vec![Box::new(ExpandMacros::new())],
        )),
        Box::new(FixPoint::new(
            "label initialization",
            vec![Box::new(InitLabels::new())],
        )),
        Box::new(CircularityCheck::new()),
        Box::new(CheckExprs),
        Box::new(EasyModes),
        Box::new(FixPoint::new(
            "instruction selection 2",
            vec![
                Box::new(FixPoint::new(
                    "instruction selection 1",
                    vec![
                        Box::new(FixPoint::new(
                            "label update",
                            vec![Box::new(UpdateLabels::new())],
                        )),
                        Box::new(Collapse::new()),
                    ],
                )),
                Box::new(ExtendBranches::new()),
            ],
        )),
        Box::new(NormalizeModes),
        Box::new(UpdateLabels::new()),
    ]
}
