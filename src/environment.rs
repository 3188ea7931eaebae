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
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_TEXT_SEGMENT: &str = "*text-default*";
pub const DEFAULT_DATA_SEGMENT: &str = "*data-default*";

/// The shared assembly state threaded through every pass: the symbol
/// table with its lexical scopes, the current segment, and the program
/// counter.
///
/// Names beginning with `_` are private to their enclosing scope and are
/// looked up innermost-first through the scope stack; every other name is
/// global. `reset()` rewinds the scope counter and the per-segment
/// program counters between passes but keeps the symbol values — that is
/// how forward references settle over repeated passes: scope ids are
/// handed out in the same order every time, so each label lands in the
/// same scope on every pass.
pub struct Environment {
    scopes: Vec<HashMap<String, i64>>,
    stack: Vec<usize>,
    pc: i64,
    segments: HashMap<String, i64>,
    segment: String,
    scope_count: usize,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
            stack: vec![0],
            pc: 0,
            segments: HashMap::new(),
            segment: DEFAULT_TEXT_SEGMENT.to_string(),
            scope_count: 0,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<i64> {
        if name.starts_with('_') {
            for &scope in self.stack.iter().rev() {
                if let Some(&value) = self.scopes[scope].get(name) {
                    return Some(value);
                }
            }
            None
        } else {
            self.scopes[0].get(name).copied()
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Binds a name in the scope that owns it: the innermost scope for
    /// `_`-prefixed names, the global scope for everything else.
    pub fn define(&mut self, name: &str, value: i64) {
        let scope = if name.starts_with('_') {
            *self.stack.last().unwrap()
        } else {
            0
        };
        self.scopes[scope].insert(name.to_string(), value);
    }

    /// The scope id that qualifies `_`-prefixed names defined here.
    pub fn current_scope(&self) -> usize {
        *self.stack.last().unwrap()
    }

    pub fn pc(&self) -> i64 {
        self.pc
    }

    pub fn set_pc(&mut self, value: i64) {
        self.pc = value;
    }

    pub fn inc_pc(&mut self, amount: i64) {
        self.pc += amount;
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Switches segments, saving this segment's PC and restoring the
    /// target's (0 if it has never been entered).
    pub fn set_segment(&mut self, name: &str) {
        self.segments.insert(self.segment.clone(), self.pc);
        self.segment = name.to_string();
        self.pc = self.segments.get(name).copied().unwrap_or(0);
    }

    pub fn new_scope(&mut self) {
        self.scope_count += 1;
        self.stack.push(self.scope_count);
        if self.scopes.len() <= self.scope_count {
            self.scopes.push(HashMap::new());
        }
    }

    pub fn end_scope(&mut self, errors: &mut ErrorLog) {
        if self.stack.len() == 1 {
            errors.log("Unmatched .scend");
        } else {
            self.stack.pop();
        }
    }

    /// Clears the program counter, segments, and scoping information for
    /// the next pass. Symbol values survive.
    pub fn reset(&mut self, errors: &mut ErrorLog) {
        self.pc = 0;
        self.segments.clear();
        self.segment = DEFAULT_TEXT_SEGMENT.to_string();
        self.scope_count = 0;
        if self.stack.len() > 1 {
            errors.log("Unmatched .scope");
        }
        self.stack.clear();
        self.stack.push(0);
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, scope) in self.scopes.iter().enumerate() {
            if scope.is_empty() {
                continue;
            }
            let mut names: Vec<&String> = scope.keys().collect();
            names.sort();
            for name in names {
                writeln!(f, "{}:{} = ${:04X}", id, name, scope[name])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_and_scoped_lookup() {
        let mut errors = ErrorLog::new(true);
        let mut env = Environment::new();
        env.define("main", 0x1000);
        env.new_scope();
        env.define("_local", 1);
        assert_eq!(env.lookup("main"), Some(0x1000));
        assert_eq!(env.lookup("_local"), Some(1));

        env.new_scope();
        env.define("_local", 2);
        assert_eq!(env.lookup("_local"), Some(2));
        env.end_scope(&mut errors);
        assert_eq!(env.lookup("_local"), Some(1));
        env.end_scope(&mut errors);
        assert_eq!(env.lookup("_local"), None);
        assert_eq!(errors.count(), 0);
    }

    #[test]
    fn test_globals_defined_inside_scopes_are_global() {
        let mut errors = ErrorLog::new(true);
        let mut env = Environment::new();
        env.new_scope();
        env.define("shared", 5);
        env.end_scope(&mut errors);
        assert_eq!(env.lookup("shared"), Some(5));
    }

    #[test]
    fn test_scope_ids_repeat_after_reset() {
        let mut errors = ErrorLog::new(true);
        let mut env = Environment::new();
        env.new_scope();
        let first = env.current_scope();
        env.define("_x", 7);
        env.end_scope(&mut errors);
        env.reset(&mut errors);

        env.new_scope();
        assert_eq!(env.current_scope(), first);
        // the value from the previous pass is still visible
        assert_eq!(env.lookup("_x"), Some(7));
    }

    #[test]
    fn test_segments_save_and_restore_pc() {
        let mut env = Environment::new();
        env.set_pc(0x200);
        env.set_segment("bss");
        assert_eq!(env.pc(), 0);
        env.set_pc(0xC000);
        env.set_segment(DEFAULT_TEXT_SEGMENT);
        assert_eq!(env.pc(), 0x200);
        env.set_segment("bss");
        assert_eq!(env.pc(), 0xC000);
    }

    #[test]
    fn test_unmatched_scope_reports() {
        let mut errors = ErrorLog::new(true);
        let mut env = Environment::new();
        env.end_scope(&mut errors);
        assert_eq!(errors.count(), 1);

        env.new_scope();
        env.reset(&mut errors);
        assert_eq!(errors.count(), 2);
    }
}
