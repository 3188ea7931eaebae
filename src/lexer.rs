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
use crate::opcodes::OpcodeTable;

/// The single-character tokens of the dialect.
pub const PUNCTUATION: &str = "#,`<>():.+-*/&|^[]";

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(i64),
    Str(String),
    Label(String),
    Opcode(String),
    X,
    Y,
    Punct(char),
    Eol,
}

fn numeric_base(c: char) -> Option<(&'static str, u32)> {
    match c {
        '$' => Some(("hexadecimal", 16)),
        '%' => Some(("binary", 2)),
        '0' => Some(("octal", 8)),
        _ => None,
    }
}

fn add_token(result: &mut Vec<Token>, token: &str, opcodes: &OpcodeTable, errors: &mut ErrorLog) {
    if token.is_empty() {
        return;
    }
    if token == "0" {
        result.push(Token::Num(0));
        return;
    }
    let first = token.chars().next().unwrap();
    let rest = &token[first.len_utf8()..];
    if first == '"' {
        result.push(Token::Str(rest.to_string()));
    } else if let Some((base_name, radix)) = numeric_base(first) {
        match i64::from_str_radix(rest, radix) {
            Ok(value) => result.push(Token::Num(value)),
            Err(_) => {
                errors.log(format!("Invalid {} constant: {}", base_name, rest));
                result.push(Token::Num(0));
            }
        }
    } else if first.is_ascii_digit() {
        match token.parse::<i64>() {
            Ok(value) => result.push(Token::Num(value)),
            Err(_) => {
                errors.log("Identifiers may not begin with a number");
                result.push(Token::Label("error".to_string()));
            }
        }
    } else if first == '\'' {
        let mut chars = rest.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => result.push(Token::Num(c as i64)),
            _ => {
                errors.log(format!("Invalid character constant '{}'", rest));
                result.push(Token::Num(0));
            }
        }
    } else if PUNCTUATION.contains(first) {
        if !rest.is_empty() {
            errors.log(format!("Internal lexer error!  '{}' can't happen!", token));
        }
        result.push(Token::Punct(first));
    } else {
        let id = token.to_lowercase();
        if opcodes.contains(&id) {
            result.push(Token::Opcode(id));
        } else if id == "x" {
            result.push(Token::X);
        } else if id == "y" {
            result.push(Token::Y);
        } else {
            result.push(Token::Label(id));
        }
    }
}

/// Turns one line of source into tokens. The lexer is line-local and
/// error-tolerant: problems are reported through the diagnostic sink and
/// the token list always ends with `Eol`.
pub fn lex(line: &str, opcodes: &OpcodeTable, errors: &mut ErrorLog) -> Vec<Token> {
    let mut result = Vec::new();
    let mut value = String::new();
    let mut quote_mode = false;
    let mut backslash_mode = false;

    for c in line.trim().chars() {
        if backslash_mode {
            backslash_mode = false;
            value.push(c);
        } else if c == '\\' {
            backslash_mode = true;
        } else if quote_mode {
            if c == '"' {
                quote_mode = false;
            } else {
                value.push(c);
            }
        } else if c == ';' {
            add_token(&mut result, &value, opcodes, errors);
            value.clear();
            break;
        } else if c.is_whitespace() {
            add_token(&mut result, &value, opcodes, errors);
            value.clear();
        } else if PUNCTUATION.contains(c) {
            add_token(&mut result, &value, opcodes, errors);
            add_token(&mut result, &c.to_string(), opcodes, errors);
            value.clear();
        } else if c == '"' {
            add_token(&mut result, &value, opcodes, errors);
            value.clear();
            value.push('"');
            quote_mode = true;
        } else {
            value.push(c);
        }
    }
    if backslash_mode {
        errors.log("Backslashed newline");
    }
    if quote_mode {
        errors.log("Unterminated string constant");
    }
    add_token(&mut result, &value, opcodes, errors);
    result.push(Token::Eol);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(line: &str) -> Vec<Token> {
        let table = OpcodeTable::build(false, false, false);
        let mut errors = ErrorLog::new(true);
        let tokens = lex(line, &table, &mut errors);
        assert_eq!(errors.count(), 0, "unexpected lex errors for {:?}", line);
        tokens
    }

    fn lex_err(line: &str) -> (Vec<Token>, usize) {
        let table = OpcodeTable::build(false, false, false);
        let mut errors = ErrorLog::new(true);
        let tokens = lex(line, &table, &mut errors);
        (tokens, errors.count())
    }

    #[test]
    fn test_instruction_line() {
        assert_eq!(
            lex_ok("lda #$41"),
            vec![
                Token::Opcode("lda".to_string()),
                Token::Punct('#'),
                Token::Num(0x41),
                Token::Eol
            ]
        );
    }

    #[test]
    fn test_numeric_bases() {
        assert_eq!(lex_ok("$ff")[0], Token::Num(255));
        assert_eq!(lex_ok("%1010")[0], Token::Num(10));
        assert_eq!(lex_ok("0777")[0], Token::Num(511));
        assert_eq!(lex_ok("0")[0], Token::Num(0));
        assert_eq!(lex_ok("123")[0], Token::Num(123));
    }

    #[test]
    fn test_character_literal() {
        assert_eq!(lex_ok("'A")[0], Token::Num(65));
    }

    #[test]
    fn test_case_folding_and_identifiers() {
        assert_eq!(lex_ok("LDA")[0], Token::Opcode("lda".to_string()));
        assert_eq!(lex_ok("Main")[0], Token::Label("main".to_string()));
        assert_eq!(lex_ok("X")[0], Token::X);
        assert_eq!(lex_ok("y")[0], Token::Y);
    }

    #[test]
    fn test_opcode_recognition_follows_instruction_set() {
        let c02 = OpcodeTable::build(false, true, false);
        let mut errors = ErrorLog::new(true);
        assert_eq!(
            lex("phx", &c02, &mut errors)[0],
            Token::Opcode("phx".to_string())
        );
        // under the base set the same identifier is just a label
        assert_eq!(lex_ok("phx")[0], Token::Label("phx".to_string()));
    }

    #[test]
    fn test_comment_ends_line() {
        assert_eq!(
            lex_ok("nop ; does nothing"),
            vec![Token::Opcode("nop".to_string()), Token::Eol]
        );
    }

    #[test]
    fn test_string_with_escape() {
        assert_eq!(
            lex_ok(r#".byte "say \"hi\"""#),
            vec![
                Token::Punct('.'),
                Token::Label("byte".to_string()),
                Token::Str("say \"hi\"".to_string()),
                Token::Eol
            ]
        );
    }

    #[test]
    fn test_unterminated_string_reports_but_ends_line() {
        let (tokens, count) = lex_err(".byte \"oops");
        assert_eq!(count, 1);
        assert_eq!(tokens.last(), Some(&Token::Eol));
    }

    #[test]
    fn test_backslashed_newline_reports() {
        let (_, count) = lex_err("lda #1 \\");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_invalid_hex_reports_zero() {
        let (tokens, count) = lex_err("$zz");
        assert_eq!(count, 1);
        assert_eq!(tokens[0], Token::Num(0));
    }

    #[test]
    fn test_punctuation_splits_tokens() {
        assert_eq!(
            lex_ok("1+2*3"),
            vec![
                Token::Num(1),
                Token::Punct('+'),
                Token::Num(2),
                Token::Punct('*'),
                Token::Num(3),
                Token::Eol
            ]
        );
    }

    #[test]
    fn test_empty_line_is_just_eol() {
        assert_eq!(lex_ok("   "), vec![Token::Eol]);
    }
}
