//! Script parser

use crate::ast::Expr;
use crate::{ScriptError, MAX_DEPTH};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "script.pest"]
struct ScriptParser;

/// Parse a script into its top-level forms
pub fn parse(source: &str) -> Result<Vec<Expr>, ScriptError> {
    if nesting_depth(source) > MAX_DEPTH {
        return Err(ScriptError::TooDeep(MAX_DEPTH));
    }
    let mut pairs = ScriptParser::parse(Rule::program, source)
        .map_err(|e| ScriptError::Parse(e.to_string()))?;
    let program = pairs.next()
        .ok_or_else(|| ScriptError::Parse("empty parse tree".to_string()))?;

    program.into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build)
        .collect()
}

fn build(pair: Pair<Rule>) -> Result<Expr, ScriptError> {
    let text = pair.as_str();
    match pair.as_rule() {
        Rule::integer => text.parse()
            .map(Expr::Int)
            .map_err(|_| ScriptError::Parse(format!("integer out of range: {}", text))),
        Rule::float => text.parse()
            .map(Expr::Float)
            .map_err(|_| ScriptError::Parse(format!("bad float: {}", text))),
        Rule::boolean => Ok(Expr::Bool(text == "#t")),
        Rule::string => {
            let raw = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Expr::Str(unescape(raw)))
        }
        Rule::symbol => Ok(Expr::Symbol(text.to_string())),
        Rule::list => Ok(Expr::List(pair.into_inner().map(build).collect::<Result<_, _>>()?)),
        Rule::color => Ok(Expr::Color(pair.into_inner().map(build).collect::<Result<_, _>>()?)),
        rule => Err(ScriptError::Parse(format!("unexpected {:?}", rule))),
    }
}

/// Deepest parenthesis nesting outside strings and comments
fn nesting_depth(source: &str) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    let mut chars = source.chars();
    while let Some(c) = chars.next() {
        match c {
            '(' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            ')' => depth = depth.saturating_sub(1),
            '"' => {
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            chars.next();
                        }
                        '"' => break,
                        _ => {}
                    }
                }
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            _ => {}
        }
    }
    deepest
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}
