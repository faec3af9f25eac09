//! Nom-based positional line parser.
//!
//! Splits a line into tag block, prefix, command, middle parameters and
//! trailing parameter in one pass. Nothing is found by substring search, so a
//! ` :` or a channel name inside the tag block cannot be mistaken for a field
//! boundary.

use nom::{
    bytes::complete::{take_while, take_while1},
    character::complete::{char, space0},
    combinator::opt,
    error::{context, VerboseError, VerboseErrorKind},
    sequence::preceded,
    IResult,
};

type ParseResult<I, O> = IResult<I, O, VerboseError<I>>;

/// Parse the tag block (the part after `@` and before the first space).
fn parse_tags(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing message tags",
        preceded(char('@'), take_while(|c| c != ' ')),
    )(input)
}

/// Parse message prefix (the part after `:` and before the first space).
fn parse_prefix(input: &str) -> ParseResult<&str, &str> {
    context(
        "parsing message prefix",
        preceded(char(':'), take_while(|c| c != ' ')),
    )(input)
}

/// Parse the command token. A line with no command fails here.
fn parse_command(input: &str) -> ParseResult<&str, &str> {
    context("parsing command", take_while1(|c| c != ' '))(input)
}

/// Parse a complete line into its components.
///
/// Line format:
/// ```text
/// [@tags] [:prefix] <command> [params...] [:trailing]
/// ```
pub fn parse_message(input: &str) -> ParseResult<&str, ParsedMessage<'_>> {
    let (input, tags) = context("parsing optional tags", opt(parse_tags))(input)?;
    let (input, _) = space0(input)?;

    let (input, prefix) = context("parsing optional prefix", opt(parse_prefix))(input)?;
    let (input, _) = space0(input)?;

    let (input, command) = parse_command(input)?;

    let mut params: Vec<&str> = Vec::new();
    let mut trailing = None;
    let mut rest = input;

    loop {
        rest = rest.trim_start_matches(' ');
        if rest.is_empty() {
            break;
        }
        if let Some(after_colon) = rest.strip_prefix(':') {
            // Trailing parameter - everything after `:` until line end
            let end = after_colon.find(['\r', '\n']).unwrap_or(after_colon.len());
            trailing = Some(&after_colon[..end]);
            rest = &after_colon[end..];
            break;
        }
        let end = rest.find([' ', '\r', '\n']).unwrap_or(rest.len());
        if end == 0 {
            break;
        }
        params.push(&rest[..end]);
        rest = &rest[end..];
    }

    Ok((
        rest,
        ParsedMessage {
            tags,
            prefix,
            command,
            params,
            trailing,
        },
    ))
}

/// A parsed line with borrowed string slices.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage<'a> {
    /// Raw tag block (without the leading `@`), if present.
    pub tags: Option<&'a str>,
    /// Raw prefix string (without the leading `:`), if present.
    pub prefix: Option<&'a str>,
    /// The command token, verbatim.
    pub command: &'a str,
    /// Middle parameters.
    pub params: Vec<&'a str>,
    /// The trailing parameter (after ` :`), if present.
    pub trailing: Option<&'a str>,
}

impl<'a> ParsedMessage<'a> {
    /// Parse a line into a `ParsedMessage`.
    ///
    /// Returns the byte position and context of the innermost failure.
    pub fn parse(input: &'a str) -> Result<Self, (usize, Option<&'static str>)> {
        match parse_message(input) {
            Ok((_remaining, msg)) => Ok(msg),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let mut context_info = None;
                let mut position = input.len();
                for (error_input, error_kind) in &e.errors {
                    position = input.len() - error_input.len();
                    if let VerboseErrorKind::Context(ctx) = error_kind {
                        context_info = Some(*ctx);
                    }
                }
                Err((position, context_info))
            }
            Err(nom::Err::Incomplete(_)) => Err((input.len(), Some("incomplete input"))),
        }
    }
}
