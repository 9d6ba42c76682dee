#![allow(clippy::module_name_repetitions)]

//! Lexer and parser for the operator console.
//!
//! The lexer uses `regal` to produce a bounded token stream. The parser walks
//! that token slice with small matcher functions, and numeric literals are
//! decoded with `winnow`'s ASCII number parsers.

use super::catalog::{self, BUTTON_CHOICES, Choice, CommandTag, THRESHOLD_CHOICES};
use core::fmt;
use core::ops::Range;
use core::time::Duration;

use heapless::Vec as HeaplessVec;
use regal::IncrementalError;
use regal::TokenCache;
use regal_macros::RegalLexer;
use winnow::ascii::{dec_uint, float};

use crate::stability::ThresholdUpdate;

/// Maximum number of tokens produced per console line.
pub const MAX_TOKENS: usize = 16;
const MAX_CACHE_RECORDS: usize = MAX_TOKENS * 2;

/// Lexical token kinds recognized by the console grammar.
#[derive(RegalLexer, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TokenKind {
    /// Binary mask literal such as `0b10110`.
    #[regex(r"0b[01]+", priority = 3)]
    Binary,
    /// Decimal literal with a fractional part.
    #[regex(r"[0-9]+\.[0-9]+", priority = 3)]
    Decimal,
    /// Duration literal ending in `ms` or `s`.
    #[regex(r"[0-9]+(?:ms|s)", priority = 2)]
    Duration,
    /// Unsuffixed integer literal.
    #[regex(r"[0-9]+")]
    Integer,
    /// Identifier or keyword (case-insensitive match performed later).
    #[regex(r"[A-Za-z][A-Za-z0-9-]*")]
    Ident,
    /// Inline whitespace is ignored.
    #[regex(r"[ \t]+", skip)]
    Whitespace,
    /// End-of-line token (`\r`, `\n`, or `\r\n`).
    #[token("\r\n")]
    #[token("\n")]
    #[token("\r")]
    Eol,
    /// Pseudo variant used when the lexer encounters unsupported input.
    #[default]
    #[regex(r".", priority = 1024)]
    Error,
}

/// Token emitted by the lexer with a byte span back into the source line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub lexeme: &'a str,
    pub span: Range<usize>,
}

/// Bounded token buffer to avoid dynamic allocation in `no_std` environments.
pub type TokenBuffer<'a> = HeaplessVec<Token<'a>, MAX_TOKENS>;

/// Lexer errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LexError {
    /// Input produced more tokens than the static buffer allows.
    TooManyTokens { processed: usize },
    /// Underlying lexer reported an unrecoverable error.
    Engine,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::TooManyTokens { processed } => {
                write!(f, "token buffer exhausted after {processed} items")
            }
            LexError::Engine => write!(f, "lexer engine error"),
        }
    }
}

/// Grammar errors emitted by the parser.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GrammarErrorKind<'a> {
    UnexpectedToken {
        expected: &'static str,
        found: Option<TokenKind>,
        span: Range<usize>,
    },
    UnexpectedEnd {
        expected: &'static str,
    },
    UnknownCommand {
        name: &'a str,
    },
    InvalidNumber {
        span: Range<usize>,
    },
    InvalidMask {
        span: Range<usize>,
    },
    InvalidDuration {
        span: Range<usize>,
    },
    InvalidToken {
        span: Range<usize>,
        lexeme: &'a str,
    },
}

impl fmt::Display for GrammarErrorKind<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrammarErrorKind::UnexpectedToken {
                expected,
                found,
                span,
            } => write!(f, "expected {expected}, found {found:?} at {span:?}"),
            GrammarErrorKind::UnexpectedEnd { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
            GrammarErrorKind::UnknownCommand { name } => {
                write!(f, "unknown command `{name}` (try `help`)")
            }
            GrammarErrorKind::InvalidNumber { span } => {
                write!(f, "invalid number literal at {span:?}")
            }
            GrammarErrorKind::InvalidMask { span } => {
                write!(f, "invalid switch mask at {span:?}")
            }
            GrammarErrorKind::InvalidDuration { span } => {
                write!(f, "invalid duration literal at {span:?}")
            }
            GrammarErrorKind::InvalidToken { span, lexeme } => {
                write!(f, "unsupported token `{lexeme}` at {span:?}")
            }
        }
    }
}

/// Wrapper type enabling a consistent error surface for consumers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrammarError<'a> {
    pub kind: GrammarErrorKind<'a>,
}

impl fmt::Display for GrammarError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl<'a> GrammarError<'a> {
    fn unexpected(expected: &'static str, token: Option<&Token<'a>>) -> Self {
        GrammarError {
            kind: match token {
                Some(tok) => GrammarErrorKind::UnexpectedToken {
                    expected,
                    found: Some(tok.kind),
                    span: tok.span.clone(),
                },
                None => GrammarErrorKind::UnexpectedEnd { expected },
            },
        }
    }

    fn with_span(token: &Token<'a>, make: fn(Range<usize>) -> GrammarErrorKind<'a>) -> Self {
        GrammarError {
            kind: make(token.span.clone()),
        }
    }

    fn invalid_token(token: &Token<'a>) -> Self {
        GrammarError {
            kind: GrammarErrorKind::InvalidToken {
                span: token.span.clone(),
                lexeme: token.lexeme,
            },
        }
    }
}

/// Combined lex/parse error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseError<'a> {
    Lex(LexError),
    Grammar(GrammarError<'a>),
}

impl fmt::Display for ParseError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(err) => err.fmt(f),
            ParseError::Grammar(err) => err.fmt(f),
        }
    }
}

/// Structured commands produced by the parser.
#[derive(Clone, Debug, PartialEq)]
pub enum Command<'a> {
    Sample(f32),
    Count(u32),
    Switches(u32),
    Button(ButtonCommand),
    Threshold(ThresholdUpdate),
    Advance(Duration),
    Status,
    Help(HelpCommand<'a>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ButtonCommand {
    Maintenance,
    Volatile,
    Stable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdKind {
    Frequency,
    RateOfChange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HelpCommand<'a> {
    pub topic: Option<&'a str>,
}

type Input<'src, 'slice> = &'slice [Token<'src>];

/// Tokenize the provided line.
pub fn lex(line: &str) -> Result<TokenBuffer<'_>, LexError> {
    let compiled = TokenKind::lexer();
    let mut cache: TokenCache<TokenKind, MAX_CACHE_RECORDS> = TokenCache::new();
    let partial = cache
        .rebuild(compiled, line)
        .map_err(map_incremental_error)?;
    let mut buffer = TokenBuffer::new();

    for record in cache.tokens() {
        if record.skipped {
            continue;
        }

        let span = record.start..record.end;
        push_token(&mut buffer, record.token, &line[span.clone()], span)?;
    }

    if let Some(partial) = partial.filter(|partial| !partial.fragment.is_empty()) {
        let start = partial.start;
        let span = start..start + partial.fragment.len();
        push_token(&mut buffer, TokenKind::Error, partial.fragment, span)?;
    }

    Ok(buffer)
}

fn push_token<'a>(
    buffer: &mut TokenBuffer<'a>,
    kind: TokenKind,
    lexeme: &'a str,
    span: Range<usize>,
) -> Result<(), LexError> {
    buffer
        .push(Token { kind, lexeme, span })
        .map_err(|_| LexError::TooManyTokens {
            processed: buffer.len() + 1,
        })
}

fn map_incremental_error(error: IncrementalError) -> LexError {
    match error {
        IncrementalError::TokenOverflow => LexError::TooManyTokens {
            processed: MAX_TOKENS,
        },
        _ => LexError::Engine,
    }
}

/// Parse a console command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError<'_>> {
    let tokens = lex(line).map_err(ParseError::Lex)?;

    if let Some(token) = tokens.iter().find(|token| token.kind == TokenKind::Error) {
        return Err(ParseError::Grammar(GrammarError::invalid_token(token)));
    }

    let mut input: Input<'_, '_> = tokens.as_slice();
    let command = command(&mut input).map_err(ParseError::Grammar)?;

    match input.iter().find(|token| token.kind != TokenKind::Eol) {
        Some(token) => Err(ParseError::Grammar(GrammarError::unexpected(
            "end of command",
            Some(token),
        ))),
        None => Ok(command),
    }
}

fn command<'src>(input: &mut Input<'src, '_>) -> Result<Command<'src>, GrammarError<'src>> {
    let keyword = expect_kind(input, TokenKind::Ident, "command keyword")?;
    let Some(spec) = catalog::find(keyword.lexeme) else {
        return Err(GrammarError {
            kind: GrammarErrorKind::UnknownCommand {
                name: keyword.lexeme,
            },
        });
    };

    match spec.tag {
        CommandTag::Sample => number(input, "frequency in Hz").map(Command::Sample),
        CommandTag::Count => {
            let token = expect_kind(input, TokenKind::Integer, "sample count")?;
            parse_u32(&token).map(Command::Count)
        }
        CommandTag::Switches => mask(input).map(Command::Switches),
        CommandTag::Button => {
            choice(input, &BUTTON_CHOICES, "maintenance|volatile|stable").map(Command::Button)
        }
        CommandTag::Threshold => {
            let kind = choice(input, &THRESHOLD_CHOICES, "freq|roc")?;
            let value = number(input, "threshold value")?;
            Ok(Command::Threshold(match kind {
                ThresholdKind::Frequency => ThresholdUpdate::MinFrequency(value),
                ThresholdKind::RateOfChange => ThresholdUpdate::RateOfChange(value),
            }))
        }
        CommandTag::Advance => {
            let token = expect_kind(input, TokenKind::Duration, "duration")?;
            parse_duration(&token).map(Command::Advance)
        }
        CommandTag::Status => Ok(Command::Status),
        CommandTag::Help => Ok(Command::Help(HelpCommand {
            topic: optional_ident(input),
        })),
    }
}

fn expect_kind<'src>(
    input: &mut Input<'src, '_>,
    kind: TokenKind,
    label: &'static str,
) -> Result<Token<'src>, GrammarError<'src>> {
    match input.split_first() {
        Some((token, rest)) if token.kind == kind => {
            *input = rest;
            Ok(token.clone())
        }
        Some((token, _)) => Err(GrammarError::unexpected(label, Some(token))),
        None => Err(GrammarError::unexpected(label, None)),
    }
}

fn optional_ident<'src>(input: &mut Input<'src, '_>) -> Option<&'src str> {
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Ident => {
            *input = rest;
            Some(token.lexeme)
        }
        _ => None,
    }
}

fn choice<'src, T: Copy>(
    input: &mut Input<'src, '_>,
    choices: &[Choice<T>],
    label: &'static str,
) -> Result<T, GrammarError<'src>> {
    let token = expect_kind(input, TokenKind::Ident, label)?;
    catalog::find_choice(choices, token.lexeme)
        .ok_or_else(|| GrammarError::unexpected(label, Some(&token)))
}

fn number<'src>(
    input: &mut Input<'src, '_>,
    label: &'static str,
) -> Result<f32, GrammarError<'src>> {
    match input.split_first() {
        Some((token, rest)) if matches!(token.kind, TokenKind::Decimal | TokenKind::Integer) => {
            *input = rest;
            parse_f32(token)
        }
        Some((token, _)) => Err(GrammarError::unexpected(label, Some(token))),
        None => Err(GrammarError::unexpected(label, None)),
    }
}

fn mask<'src>(input: &mut Input<'src, '_>) -> Result<u32, GrammarError<'src>> {
    match input.split_first() {
        Some((token, rest)) if token.kind == TokenKind::Binary => {
            *input = rest;
            token
                .lexeme
                .strip_prefix("0b")
                .and_then(|digits| u32::from_str_radix(digits, 2).ok())
                .ok_or_else(|| {
                    GrammarError::with_span(token, |span| GrammarErrorKind::InvalidMask { span })
                })
        }
        Some((token, rest)) if token.kind == TokenKind::Integer => {
            *input = rest;
            parse_u32(token)
        }
        Some((token, _)) => Err(GrammarError::unexpected("switch mask", Some(token))),
        None => Err(GrammarError::unexpected("switch mask", None)),
    }
}

fn parse_f32<'a>(token: &Token<'a>) -> Result<f32, GrammarError<'a>> {
    let mut text = token.lexeme;
    match float::<_, f32, ()>(&mut text) {
        Ok(value) if text.is_empty() => Ok(value),
        _ => Err(GrammarError::with_span(token, |span| {
            GrammarErrorKind::InvalidNumber { span }
        })),
    }
}

fn parse_u32<'a>(token: &Token<'a>) -> Result<u32, GrammarError<'a>> {
    let mut text = token.lexeme;
    match dec_uint::<_, u32, ()>(&mut text) {
        Ok(value) if text.is_empty() => Ok(value),
        _ => Err(GrammarError::with_span(token, |span| {
            GrammarErrorKind::InvalidNumber { span }
        })),
    }
}

fn parse_duration<'a>(token: &Token<'a>) -> Result<Duration, GrammarError<'a>> {
    let invalid =
        || GrammarError::with_span(token, |span| GrammarErrorKind::InvalidDuration { span });

    let (digits, to_duration): (&str, fn(u64) -> Duration) =
        if let Some(rest) = token.lexeme.strip_suffix("ms") {
            (rest, Duration::from_millis)
        } else if let Some(rest) = token.lexeme.strip_suffix('s') {
            (rest, Duration::from_secs)
        } else {
            return Err(invalid());
        };

    let mut text = digits;
    match dec_uint::<_, u64, ()>(&mut text) {
        Ok(value) if text.is_empty() => Ok(to_duration(value)),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(input: &str) -> Command<'_> {
        parse(input).expect("command should parse")
    }

    #[test]
    fn parses_decimal_and_integer_samples() {
        assert_eq!(parse_ok("sample 49.75"), Command::Sample(49.75));
        assert_eq!(parse_ok("sample 50"), Command::Sample(50.0));
    }

    #[test]
    fn parses_binary_and_decimal_masks() {
        assert_eq!(parse_ok("switches 0b10110"), Command::Switches(0b1_0110));
        assert_eq!(parse_ok("switches 31"), Command::Switches(31));
    }

    #[test]
    fn parses_buttons_case_insensitively() {
        assert_eq!(
            parse_ok("Button MAINTENANCE"),
            Command::Button(ButtonCommand::Maintenance)
        );
        assert_eq!(
            parse_ok("button stable"),
            Command::Button(ButtonCommand::Stable)
        );
    }

    #[test]
    fn parses_threshold_updates() {
        assert_eq!(
            parse_ok("threshold roc 0.6"),
            Command::Threshold(ThresholdUpdate::RateOfChange(0.6))
        );
        assert_eq!(
            parse_ok("threshold freq 48.5"),
            Command::Threshold(ThresholdUpdate::MinFrequency(48.5))
        );
    }

    #[test]
    fn parses_advance_durations() {
        assert_eq!(
            parse_ok("advance 250ms"),
            Command::Advance(Duration::from_millis(250))
        );
        assert_eq!(parse_ok("advance 2s"), Command::Advance(Duration::from_secs(2)));
    }

    #[test]
    fn parses_help_topic_and_status() {
        assert_eq!(parse_ok("status"), Command::Status);
        assert_eq!(
            parse_ok("help switches"),
            Command::Help(HelpCommand {
                topic: Some("switches"),
            })
        );
        assert_eq!(parse_ok("help\n"), Command::Help(HelpCommand { topic: None }));
    }

    #[test]
    fn rejects_unknown_commands() {
        match parse("reboot now") {
            Err(ParseError::Grammar(err)) => assert_eq!(
                err.kind,
                GrammarErrorKind::UnknownCommand { name: "reboot" }
            ),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_arguments() {
        assert!(matches!(
            parse("status now"),
            Err(ParseError::Grammar(GrammarError {
                kind: GrammarErrorKind::UnexpectedToken { .. }
            }))
        ));
    }

    #[test]
    fn rejects_invalid_token() {
        match parse("sample 50$") {
            Err(ParseError::Grammar(err)) => {
                assert!(matches!(err.kind, GrammarErrorKind::InvalidToken { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_argument() {
        assert!(matches!(
            parse("count"),
            Err(ParseError::Grammar(GrammarError {
                kind: GrammarErrorKind::UnexpectedEnd { .. }
            }))
        ));
    }
}
