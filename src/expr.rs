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

use crate::environment::Environment;
use crate::errors::ErrorLog;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
}

impl Operator {
    pub fn symbol(self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
            Operator::And => '&',
            Operator::Or => '|',
            Operator::Xor => '^',
        }
    }
}

/// An operand expression. Sequences are pre-grouped by the parser so a
/// single node only ever holds operators of one precedence level, applied
/// left to right.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Constant(i64),
    Label(String),
    /// `^`, the program counter at evaluation time.
    Pc,
    HighByte(Box<Expr>),
    LowByte(Box<Expr>),
    Sequence {
        first: Box<Expr>,
        rest: Vec<(Operator, Expr)>,
    },
}

impl Expr {
    /// Whether every label this expression references is bound, and — if
    /// it depends on the program counter — whether the PC is currently
    /// considered known.
    pub fn is_valid(&self, env: &Environment, pc_valid: bool) -> bool {
        match self {
            Expr::Constant(_) => true,
            Expr::Label(name) => env.contains(name),
            Expr::Pc => pc_valid,
            Expr::HighByte(sub) | Expr::LowByte(sub) => sub.is_valid(env, pc_valid),
            Expr::Sequence { first, rest } => {
                first.is_valid(env, pc_valid)
                    && rest.iter().all(|(_, e)| e.is_valid(env, pc_valid))
            }
        }
    }

    /// Evaluates the expression. Undefined references are reported and
    /// read as 0 so that evaluation always produces a value.
    pub fn value(&self, env: &Environment, errors: &mut ErrorLog) -> i64 {
        match self {
            Expr::Constant(value) => *value,
            Expr::Label(name) => match env.lookup(name) {
                Some(value) => value,
                None => {
                    errors.log(format!("Unknown label '{}'", name));
                    0
                }
            },
            Expr::Pc => env.pc(),
            Expr::HighByte(sub) => (sub.value(env, errors) >> 8) & 0xFF,
            Expr::LowByte(sub) => sub.value(env, errors) & 0xFF,
            Expr::Sequence { first, rest } => {
                let mut acc = first.value(env, errors);
                for (op, operand) in rest {
                    let rhs = operand.value(env, errors);
                    acc = match op {
                        Operator::Add => acc + rhs,
                        Operator::Sub => acc - rhs,
                        Operator::Mul => acc * rhs,
                        Operator::Div => {
                            if rhs == 0 {
                                errors.log("Division by zero");
                                0
                            } else {
                                acc / rhs
                            }
                        }
                        Operator::And => acc & rhs,
                        Operator::Or => acc | rhs,
                        Operator::Xor => acc ^ rhs,
                    };
                }
                acc
            }
        }
    }

    /// True iff the expression is a pure constant, independent of labels
    /// and the program counter.
    pub fn is_hardcoded(&self) -> bool {
        match self {
            Expr::Constant(_) => true,
            Expr::Label(_) | Expr::Pc => false,
            Expr::HighByte(sub) | Expr::LowByte(sub) => sub.is_hardcoded(),
            Expr::Sequence { first, rest } => {
                first.is_hardcoded() && rest.iter().all(|(_, e)| e.is_hardcoded())
            }
        }
    }

    /// Rewrites label references in place: wherever `f` returns a
    /// replacement for a referenced name, that subtree is substituted.
    /// Used by macro expansion for parameter binding and label
    /// uniquification.
    pub fn map_labels(&mut self, f: &mut dyn FnMut(&str) -> Option<Expr>) {
        match self {
            Expr::Constant(_) | Expr::Pc => {}
            Expr::Label(name) => {
                if let Some(replacement) = f(name) {
                    *self = replacement;
                }
            }
            Expr::HighByte(sub) | Expr::LowByte(sub) => sub.map_labels(f),
            Expr::Sequence { first, rest } => {
                first.map_labels(f);
                for (_, operand) in rest {
                    operand.map_labels(f);
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Constant(value) => write!(f, "{}", value),
            Expr::Label(name) => write!(f, "{}", name),
            Expr::Pc => write!(f, "^"),
            Expr::HighByte(sub) => write!(f, ">{}", sub),
            Expr::LowByte(sub) => write!(f, "<{}", sub),
            Expr::Sequence { first, rest } => {
                write!(f, "[{}", first)?;
                for (op, operand) in rest {
                    write!(f, "{}{}", op.symbol(), operand)?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(first: Expr, rest: Vec<(Operator, Expr)>) -> Expr {
        Expr::Sequence {
            first: Box::new(first),
            rest,
        }
    }

    #[test]
    fn test_sequence_is_left_associative() {
        let mut errors = ErrorLog::new(true);
        let env = Environment::new();
        // 10 - 4 - 3 = 3, not 9
        let e = seq(
            Expr::Constant(10),
            vec![
                (Operator::Sub, Expr::Constant(4)),
                (Operator::Sub, Expr::Constant(3)),
            ],
        );
        assert_eq!(e.value(&env, &mut errors), 3);
    }

    #[test]
    fn test_byte_selectors() {
        let mut errors = ErrorLog::new(true);
        let env = Environment::new();
        let high = Expr::HighByte(Box::new(Expr::Constant(0x1234)));
        let low = Expr::LowByte(Box::new(Expr::Constant(0x1234)));
        assert_eq!(high.value(&env, &mut errors), 0x12);
        assert_eq!(low.value(&env, &mut errors), 0x34);
    }

    #[test]
    fn test_unknown_label_reads_as_zero_and_reports() {
        let mut errors = ErrorLog::new(true);
        let env = Environment::new();
        let e = Expr::Label("nowhere".to_string());
        assert_eq!(e.value(&env, &mut errors), 0);
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn test_division_by_zero_reports() {
        let mut errors = ErrorLog::new(true);
        let env = Environment::new();
        let e = seq(Expr::Constant(8), vec![(Operator::Div, Expr::Constant(0))]);
        assert_eq!(e.value(&env, &mut errors), 0);
        assert_eq!(errors.count(), 1);
    }

    #[test]
    fn test_hardcoded() {
        assert!(Expr::Constant(4).is_hardcoded());
        assert!(!Expr::Pc.is_hardcoded());
        assert!(!Expr::Label("x".to_string()).is_hardcoded());
        let mixed = seq(
            Expr::Constant(1),
            vec![(Operator::Add, Expr::Label("x".to_string()))],
        );
        assert!(!mixed.is_hardcoded());
    }

    #[test]
    fn test_validity_tracks_pc_flag() {
        let env = Environment::new();
        assert!(Expr::Pc.is_valid(&env, true));
        assert!(!Expr::Pc.is_valid(&env, false));
        let indirect = Expr::HighByte(Box::new(Expr::Pc));
        assert!(!indirect.is_valid(&env, false));
    }

    #[test]
    fn test_map_labels_substitutes() {
        let mut e = seq(
            Expr::Label("_1".to_string()),
            vec![(Operator::Add, Expr::Label("stay".to_string()))],
        );
        e.map_labels(&mut |name| {
            if name == "_1" {
                Some(Expr::Constant(9))
            } else {
                None
            }
        });
        let expected = seq(
            Expr::Constant(9),
            vec![(Operator::Add, Expr::Label("stay".to_string()))],
        );
        assert_eq!(e, expected);
    }
}
