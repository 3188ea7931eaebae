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

use crate::errors::ErrorLog;
use crate::expr::Expr;
use crate::ir::{Node, NodeKind};
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// `_N` parameter references; `_0` is not a parameter.
fn param_index(name: &str) -> Option<usize> {
    match name.strip_prefix('_')?.parse::<usize>() {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

fn collect_labels(expr: &Expr, f: &mut dyn FnMut(&str)) {
    match expr {
        Expr::Constant(_) | Expr::Pc => {}
        Expr::Label(name) => f(name),
        Expr::HighByte(sub) | Expr::LowByte(sub) => collect_labels(sub, f),
        Expr::Sequence { first, rest } => {
            collect_labels(first, f);
            for (_, operand) in rest {
                collect_labels(operand, f);
            }
        }
    }
}

struct Macro {
    body: Vec<Node>,
    /// Highest `_N` parameter the body references.
    params: usize,
}

/// The macro registry. Definitions are global and last for the whole
/// assembly; each expansion clones the stored body so the IR tree never
/// shares substructure between invocations.
pub struct MacroStore {
    macros: HashMap<String, Macro>,
    current: Option<(String, Vec<Node>)>,
    invocations: usize,
}

impl MacroStore {
    pub fn new() -> Self {
        Self {
            macros: HashMap::new(),
            current: None,
            invocations: 0,
        }
    }

    pub fn begin(&mut self, name: String) {
        self.current = Some((name, Vec::new()));
    }

    pub fn defining(&self) -> bool {
        self.current.is_some()
    }

    pub fn append(&mut self, node: Node) {
        if let Some((_, body)) = &mut self.current {
            body.push(node);
        }
    }

    pub fn end(&mut self) {
        if let Some((name, body)) = self.current.take() {
            let mut params = 0;
            for node in &body {
                node.for_each_expr(&mut |e| {
                    collect_labels(e, &mut |label| {
                        if let Some(n) = param_index(label) {
                            params = params.max(n);
                        }
                    });
                });
            }
            self.macros.insert(name, Macro { body, params });
        }
    }

    /// Expands an invocation: the body is cloned, `_N` references are
    /// replaced by the actual argument expressions, labels defined inside
    /// the body are renamed uniquely for this invocation, and the result
    /// is wrapped in its own scope. Each cloned node's point records the
    /// call site ahead of the definition site.
    pub fn expand(
        &mut self,
        point: &str,
        name: &str,
        args: &[Expr],
        errors: &mut ErrorLog,
    ) -> Node {
        let Some(mac) = self.macros.get(name) else {
            errors.log(format!("Undefined macro '{}'", name));
            return Node::null(point);
        };
        if args.len() < mac.params {
            errors.log(format!(
                "Macro '{}' expects {} argument(s), got {}",
                name,
                mac.params,
                args.len()
            ));
        }
        self.invocations += 1;
        let serial = self.invocations;

        let defined: HashSet<String> = mac
            .body
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Label { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect();
        let uniquified = |label: &str| format!("_*{}_{}", serial, label);

        let mut nodes = Vec::with_capacity(mac.body.len() + 2);
        nodes.push(Node::new(point, NodeKind::ScopeBegin));
        for original in &mac.body {
            let mut node = original.clone();
            node.point = format!("{}->{}", point, original.point);
            if let NodeKind::Label { name, .. } = &mut node.kind {
                if defined.contains(name.as_str()) {
                    *name = uniquified(name);
                }
            }
            node.for_each_expr_mut(&mut |e| {
                e.map_labels(&mut |label| {
                    if let Some(n) = param_index(label) {
                        Some(args.get(n - 1).cloned().unwrap_or(Expr::Constant(0)))
                    } else if defined.contains(label) {
                        Some(Expr::Label(uniquified(label)))
                    } else {
                        None
                    }
                });
            });
            nodes.push(node);
        }
        nodes.push(Node::new(point, NodeKind::ScopeEnd));
        Node::new(point, NodeKind::Sequence(nodes))
    }

    pub fn dump(&self) -> String {
        let mut out = String::new();
        let mut names: Vec<&String> = self.macros.keys().collect();
        names.sort();
        for name in names {
            let _ = writeln!(out, "{}:", name);
            for node in &self.macros[name].body {
                let _ = write!(out, "{}", node);
            }
        }
        out
    }
}

impl Default for MacroStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_greet() -> MacroStore {
        let mut store = MacroStore::new();
        store.begin("greet".to_string());
        store.append(Node::new(
            "m.oph:2",
            NodeKind::Byte(vec![
                Expr::Constant(104),
                Expr::Constant(105),
                Expr::Label("_1".to_string()),
            ]),
        ));
        store.end();
        store
    }

    #[test]
    fn test_parameter_count_inferred() {
        let store = store_with_greet();
        assert_eq!(store.macros["greet"].params, 1);
    }

    #[test]
    fn test_expand_substitutes_parameters() {
        let mut store = store_with_greet();
        let mut errors = ErrorLog::new(true);
        let node = store.expand("t.oph:4", "greet", &[Expr::Constant(65)], &mut errors);
        assert_eq!(errors.count(), 0);
        let NodeKind::Sequence(children) = node.kind else {
            panic!("expected a sequence");
        };
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].kind, NodeKind::ScopeBegin);
        assert_eq!(children[2].kind, NodeKind::ScopeEnd);
        assert_eq!(
            children[1].kind,
            NodeKind::Byte(vec![
                Expr::Constant(104),
                Expr::Constant(105),
                Expr::Constant(65)
            ])
        );
        assert_eq!(children[1].point, "t.oph:4->m.oph:2");
    }

    #[test]
    fn test_expand_uniquifies_body_labels() {
        let mut store = MacroStore::new();
        store.begin("spin".to_string());
        store.append(Node::new(
            "m.oph:2",
            NodeKind::Label {
                name: "loop".to_string(),
                value: Expr::Pc,
            },
        ));
        store.append(Node::new(
            "m.oph:3",
            NodeKind::Instruction {
                opcode: "bne".to_string(),
                mode: crate::opcodes::Mode::Memory,
                args: vec![Expr::Label("loop".to_string())],
            },
        ));
        store.end();

        let mut errors = ErrorLog::new(true);
        let first = store.expand("t.oph:1", "spin", &[], &mut errors);
        let second = store.expand("t.oph:2", "spin", &[], &mut errors);

        let label_of = |node: &Node| -> String {
            let NodeKind::Sequence(children) = &node.kind else {
                panic!("expected a sequence");
            };
            let NodeKind::Label { name, .. } = &children[1].kind else {
                panic!("expected a label");
            };
            name.clone()
        };
        let first_label = label_of(&first);
        let second_label = label_of(&second);
        assert_ne!(first_label, second_label);
        assert!(first_label.starts_with("_*"));

        // the branch reference is renamed to match
        let NodeKind::Sequence(children) = &first.kind else {
            panic!("expected a sequence");
        };
        let NodeKind::Instruction { args, .. } = &children[2].kind else {
            panic!("expected an instruction");
        };
        assert_eq!(args[0], Expr::Label(first_label));
    }

    #[test]
    fn test_undefined_macro_reports() {
        let mut store = MacroStore::new();
        let mut errors = ErrorLog::new(true);
        let node = store.expand("t.oph:1", "nope", &[], &mut errors);
        assert_eq!(errors.count(), 1);
        assert_eq!(node.kind, NodeKind::Null);
    }

    #[test]
    fn test_missing_arguments_report_and_read_zero() {
        let mut store = store_with_greet();
        let mut errors = ErrorLog::new(true);
        let node = store.expand("t.oph:1", "greet", &[], &mut errors);
        assert_eq!(errors.count(), 1);
        let NodeKind::Sequence(children) = node.kind else {
            panic!("expected a sequence");
        };
        assert_eq!(
            children[1].kind,
            NodeKind::Byte(vec![
                Expr::Constant(104),
                Expr::Constant(105),
                Expr::Constant(0)
            ])
        );
    }

    #[test]
    fn test_outer_references_pass_through() {
        let mut store = MacroStore::new();
        store.begin("callout".to_string());
        store.append(Node::new(
            "m.oph:2",
            NodeKind::Instruction {
                opcode: "jmp".to_string(),
                mode: crate::opcodes::Mode::Memory,
                args: vec![Expr::Label("main".to_string())],
            },
        ));
        store.end();
        let mut errors = ErrorLog::new(true);
        let node = store.expand("t.oph:1", "callout", &[], &mut errors);
        let NodeKind::Sequence(children) = node.kind else {
            panic!("expected a sequence");
        };
        let NodeKind::Instruction { args, .. } = &children[1].kind else {
            panic!("expected an instruction");
        };
        assert_eq!(args[0], Expr::Label("main".to_string()));
    }
}
