//! nom building blocks shared by the text format and selector parsers

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{anychar, char},
    error::{ErrorKind, ParseError},
    multi::fold_many0,
    sequence::{preceded, terminated},
};
use thiserror::Error;

use super::family::is_valid_label_name;

/// Characters of remaining input quoted in generic errors
const SNIPPET_CHARS: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SyntaxError {
    pub message: String,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type IResult<I, T, E = SyntaxError> = nom::IResult<I, T, E>;

impl ParseError<&str> for SyntaxError {
    fn from_error_kind(input: &str, kind: ErrorKind) -> Self {
        let snippet: String = input.chars().take(SNIPPET_CHARS).collect();
        Self::new(format!(
            "unexpected input {snippet:?} ({})",
            kind.description()
        ))
    }

    // Keep the innermost message; it names what was actually expected
    fn append(_input: &str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

/// Run `parser` over `input`; anything but trailing whitespace left over is
/// an error
pub fn parse_all<'a, O, F>(mut parser: F, input: &'a str) -> Result<O, SyntaxError>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    match parser(input) {
        Ok((rest, out)) if rest.trim().is_empty() => Ok(out),
        Ok((rest, _)) => Err(SyntaxError::new(format!(
            "unexpected trailing content {:?}",
            rest.trim()
        ))),
        Err(nom::Err::Error(e) | nom::Err::Failure(e)) => Err(e),
        Err(nom::Err::Incomplete(_)) => Err(SyntaxError::new("incomplete input")),
    }
}

/// Apply `second` to the output of `first`; an `Err` from `second` is a hard
/// failure that stops any enclosing `alt`
pub fn map_fail<'a, O1, O2, F, G>(
    mut first: F,
    mut second: G,
) -> impl FnMut(&'a str) -> IResult<&'a str, O2>
where
    F: FnMut(&'a str) -> IResult<&'a str, O1>,
    G: FnMut(O1) -> Result<O2, SyntaxError>,
{
    move |i| {
        let (rest, out) = first(i)?;
        second(out)
            .map(|value| (rest, value))
            .map_err(nom::Err::Failure)
    }
}

/// Turn a recoverable error of `parser` into a failure reading
/// "expected `what`"
pub fn or_fail<'a, O, F>(
    mut parser: F,
    what: &'static str,
) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    move |i| {
        parser(i).map_err(|e| match e {
            nom::Err::Error(_) => nom::Err::Failure(SyntaxError::new(format!("expected {what}"))),
            other => other,
        })
    }
}

/// `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn label_name(i: &str) -> IResult<&str, &str> {
    map_fail(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        check_label_name,
    )(i)
}

fn check_label_name(name: &str) -> Result<&str, SyntaxError> {
    if is_valid_label_name(name) {
        Ok(name)
    } else {
        Err(SyntaxError::new(format!("invalid label name {name:?}")))
    }
}

/// Double-quoted value with `\\`, `\"` and `\n` escapes
pub fn quoted_value(i: &str) -> IResult<&str, String> {
    let fragment = alt((
        escape_sequence,
        take_while1(|c: char| c != '\\' && c != '"'),
    ));
    let body = fold_many0(fragment, String::new, |mut acc: String, s: &str| {
        acc.push_str(s);
        acc
    });

    preceded(
        or_fail(char('"'), "opening quote"),
        terminated(body, or_fail(char('"'), "closing quote")),
    )(i)
}

fn escape_sequence(i: &str) -> IResult<&str, &str> {
    preceded(char('\\'), map_fail(anychar, unescape))(i)
}

fn unescape(c: char) -> Result<&'static str, SyntaxError> {
    match c {
        '\\' => Ok("\\"),
        '"' => Ok("\""),
        'n' => Ok("\n"),
        other => Err(SyntaxError::new(format!(
            "invalid escape sequence '\\{other}'"
        ))),
    }
}

/// Any run of characters up to whitespace, possibly empty
pub fn token(i: &str) -> IResult<&str, &str> {
    take_while(|c: char| !c.is_whitespace())(i)
}
