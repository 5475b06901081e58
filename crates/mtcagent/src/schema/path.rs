// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! XPath-like filter dialect.
//!
//! The accepted subset:
//!
//! ```text
//! "//"            descendant axis
//! "//"NAME        component/dataitem by element name ("*" matches any)
//! [@attr="value"] attribute predicate on the preceding step
//! ```
//!
//! Steps match a dataitem's ancestor chain as a subsequence: each step must
//! match a strictly later chain node than the previous one. A dataitem is
//! selected when its full chain (Device -> components -> DataItem) admits a
//! match for every step.

use crate::error::{Error, Result};

/// One node of a dataitem ancestor chain: element name plus attributes.
#[derive(Debug, Clone)]
pub struct PathNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

impl PathNode {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One parsed step: element name and zero or more attribute predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub name: String,
    pub predicates: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.peek_char()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> Result<()> {
        match self.next_char() {
            Some(ch) if ch == expected => Ok(()),
            other => Err(Error::InvalidXPath(format!(
                "expected '{}' at offset {}, found {:?}",
                expected, self.pos, other
            ))),
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.next_char();
            } else {
                break;
            }
        }
    }

    fn read_name(&mut self) -> String {
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '-' {
                self.next_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn read_quoted(&mut self) -> Result<String> {
        let quote = match self.next_char() {
            Some(q @ ('"' | '\'')) => q,
            other => {
                return Err(Error::InvalidXPath(format!(
                    "expected quoted value at offset {}, found {:?}",
                    self.pos, other
                )))
            }
        };
        let start = self.pos;
        while let Some(ch) = self.peek_char() {
            if ch == quote {
                let value = self.input[start..self.pos].to_string();
                self.next_char();
                return Ok(value);
            }
            self.next_char();
        }
        Err(Error::InvalidXPath("unterminated quoted value".to_string()))
    }
}

/// Parse a filter expression into steps.
pub fn parse_path(expr: &str) -> Result<Vec<PathStep>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(Error::InvalidXPath("empty path expression".to_string()));
    }

    let mut lexer = Lexer::new(expr);
    let mut steps = Vec::new();

    while lexer.peek_char().is_some() {
        lexer.eat('/')?;
        lexer.eat('/')?;

        let name = if lexer.peek_char() == Some('*') {
            lexer.next_char();
            "*".to_string()
        } else {
            let name = lexer.read_name();
            if name.is_empty() {
                return Err(Error::InvalidXPath(format!(
                    "missing element name at offset {}",
                    lexer.pos
                )));
            }
            name
        };

        let mut predicates = Vec::new();
        while lexer.peek_char() == Some('[') {
            lexer.next_char();
            loop {
                lexer.skip_whitespace();
                lexer.eat('@')?;
                let attr = lexer.read_name();
                if attr.is_empty() {
                    return Err(Error::InvalidXPath(format!(
                        "missing attribute name at offset {}",
                        lexer.pos
                    )));
                }
                lexer.skip_whitespace();
                lexer.eat('=')?;
                lexer.skip_whitespace();
                let value = lexer.read_quoted()?;
                predicates.push((attr, value));

                lexer.skip_whitespace();
                if lexer.peek_char() == Some(']') {
                    lexer.next_char();
                    break;
                }
                // Only "and" joins predicates inside one bracket.
                let word = lexer.read_name();
                if word != "and" {
                    return Err(Error::InvalidXPath(format!(
                        "expected 'and' or ']' at offset {}",
                        lexer.pos
                    )));
                }
            }
        }

        steps.push(PathStep { name, predicates });
    }

    Ok(steps)
}

// ---------------------------------------------------------------------------
// Matching
// ---------------------------------------------------------------------------

fn step_matches(step: &PathStep, node: &PathNode) -> bool {
    if step.name != "*" && step.name != node.name {
        return false;
    }
    step.predicates
        .iter()
        .all(|(attr, value)| node.attribute(attr) == Some(value.as_str()))
}

/// True when the steps match the chain as an ordered subsequence.
pub fn matches_chain(steps: &[PathStep], chain: &[PathNode]) -> bool {
    let mut chain_iter = chain.iter();
    for step in steps {
        let matched = chain_iter.any(|node| step_matches(step, node));
        if !matched {
            return false;
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, attrs: &[(&str, &str)]) -> PathNode {
        PathNode {
            name: name.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn chain() -> Vec<PathNode> {
        vec![
            node("Device", &[("uuid", "000"), ("name", "VMC-3Axis")]),
            node("Axes", &[("id", "ax1")]),
            node("Linear", &[("id", "x1"), ("name", "X")]),
            node(
                "DataItem",
                &[("id", "xpos"), ("type", "POSITION"), ("subType", "ACTUAL")],
            ),
        ]
    }

    #[test]
    fn parse_single_step() {
        let steps = parse_path("//Axes").expect("parses");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, "Axes");
        assert!(steps[0].predicates.is_empty());
    }

    #[test]
    fn parse_step_with_predicate() {
        let steps = parse_path(r#"//DataItem[@type="VOLTAGE"]"#).expect("parses");
        assert_eq!(
            steps[0].predicates,
            vec![("type".to_string(), "VOLTAGE".to_string())]
        );
    }

    #[test]
    fn parse_multi_step_with_and() {
        let steps =
            parse_path(r#"//Linear[@name="X" and @id="x1"]//DataItem"#).expect("parses");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].predicates.len(), 2);
        assert_eq!(steps[1].name, "DataItem");
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_path("").is_err());
        assert!(parse_path("/Axes").is_err());
        assert!(parse_path("//").is_err());
        assert!(parse_path(r#"//DataItem[@type]"#).is_err());
        assert!(parse_path(r#"//DataItem[@type="x"#).is_err());
    }

    #[test]
    fn matches_subsequence() {
        let steps = parse_path("//Axes//DataItem").expect("parses");
        assert!(matches_chain(&steps, &chain()));
    }

    #[test]
    fn matches_respects_order() {
        let steps = parse_path("//DataItem//Axes").expect("parses");
        assert!(!matches_chain(&steps, &chain()));
    }

    #[test]
    fn intermediate_component_selects_descendants() {
        let steps = parse_path(r#"//Linear[@name="X"]"#).expect("parses");
        assert!(matches_chain(&steps, &chain()));
    }

    #[test]
    fn wildcard_matches_any_element() {
        let steps = parse_path(r#"//*[@id="x1"]"#).expect("parses");
        assert!(matches_chain(&steps, &chain()));
    }

    #[test]
    fn predicate_mismatch_fails() {
        let steps = parse_path(r#"//Device[@uuid="999"]"#).expect("parses");
        assert!(!matches_chain(&steps, &chain()));
    }
}
