//! `${NAME}` / `${NAME:default}` placeholder scanner built on `nom`.

use std::collections::BTreeSet;

use nom::IResult;
use nom::Parser;
use nom::branch::alt;
use nom::bytes::complete::{tag, take_while, take_while1};
use nom::character::complete::char;
use nom::combinator::opt;
use nom::sequence::preceded;

/// A piece of a templated string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Literal text copied verbatim.
    Text(&'a str),
    /// A variable reference with an optional inline default.
    Var {
        /// Variable name.
        name: &'a str,
        /// Inline default after `:` or `:-`.
        default: Option<&'a str>,
    },
    /// A `${` that does not open a well-formed placeholder, up to the next
    /// `}` or the end of input.
    Malformed(&'a str),
}

/// Placeholders that could not be resolved during substitution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Unresolved {
    /// Names with neither a value nor an inline default.
    pub missing: BTreeSet<String>,
    /// Malformed tokens, verbatim.
    pub malformed: BTreeSet<String>,
}

impl Unresolved {
    /// Whether every placeholder was resolved.
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.malformed.is_empty()
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn placeholder(input: &str) -> IResult<&str, Segment<'_>> {
    let (input, _) = tag("${")(input)?;
    let (input, name) = take_while1(is_name_char)(input)?;
    let (input, default) =
        opt(preceded(alt((tag(":-"), tag(":"))), take_while(|c: char| c != '}'))).parse(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, Segment::Var { name, default }))
}

/// Splits `input` into literal, placeholder, and malformed segments.
pub fn segments(mut input: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    while !input.is_empty() {
        if input.starts_with("${") {
            if let Ok((rest, segment)) = placeholder(input) {
                out.push(segment);
                input = rest;
            } else {
                let end = input.find('}').map_or(input.len(), |i| i + 1);
                out.push(Segment::Malformed(&input[..end]));
                input = &input[end..];
            }
            continue;
        }
        let end = input.find("${").unwrap_or(input.len());
        out.push(Segment::Text(&input[..end]));
        input = &input[end..];
    }
    out
}

/// Replaces every placeholder in `input`.
///
/// Looked-up values win over inline defaults. Names with neither, and
/// malformed tokens, are recorded in `unresolved` and contribute nothing to
/// the output.
pub fn substitute<'v, F>(input: &str, lookup: F, unresolved: &mut Unresolved) -> String
where
    F: Fn(&str) -> Option<&'v str>,
{
    let mut out = String::with_capacity(input.len());
    for segment in segments(input) {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Var { name, default } => match lookup(name).or(default) {
                Some(value) => out.push_str(value),
                None => {
                    let _ = unresolved.missing.insert(name.to_string());
                }
            },
            Segment::Malformed(token) => {
                let _ = unresolved.malformed.insert(token.to_string());
            }
        }
    }
    out
}
