//! Parses the textual tree format into [`Tree`]s.
//!
//! The format is a superset of JSON: unquoted identifier-like strings, hex
//! integers and floats, `+nan`/`+inf`/`-inf`, `//` comments, optional commas,
//! and shortcut declarations (`&name value` / `&name:value`) with uses
//! (`*name`).  Parsing happens in two phases: the grammar is parsed into a
//! raw term structure carrying source positions, then shortcuts are resolved
//! into the final [`Tree`].

use crate::error::{Error, Result};
use crate::tree::{Form, Tree, TreePair};
use nom::error::{ContextError, ErrorKind, ParseError as NomParseError, VerboseError, VerboseErrorKind};
use nom::{IResult, Slice};
use nom_locate::LocatedSpan;
use std::fs;
use std::io::Read;
use std::path::Path;

type RawSpan<'a> = LocatedSpan<&'a str>;
type PResult<'a, T> = IResult<RawSpan<'a>, T, VerboseError<RawSpan<'a>>>;

/// A source position, kept on raw terms so the resolution phase can report
/// errors with line and column.
#[derive(Clone, Copy, Debug)]
struct Pos {
    line: u32,
    col: u32,
}

impl Pos {
    fn of(span: &RawSpan) -> Pos {
        Pos {
            line: span.location_line(),
            col: span.get_utf8_column() as u32,
        }
    }
}

/// The output of the grammar phase.  Scalars are resolved eagerly; shortcut
/// declarations and uses wait for the resolution phase.
#[derive(Debug)]
enum RawTerm {
    Done(Tree),
    Array(Vec<RawTerm>),
    Object(Vec<(RawTerm, Pos, RawTerm)>),
    Decl {
        name: String,
        pos: Pos,
        // &name:value declares value, then the following term stands alone;
        // &name value declares the following term itself.
        explicit_value: Option<Box<RawTerm>>,
        rest: Box<RawTerm>,
    },
    Use {
        name: String,
        pos: Pos,
    },
}

///// CHARACTER CLASSES

/// Reserved characters may not appear outside of strings.
fn is_reserved(c: u8) -> bool {
    matches!(c, b'\\' | b'`' | b'(' | b')' | b'\'')
}

fn is_word_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || matches!(c, b'_' | b'#' | b'~' | b'@')
}

fn is_word_char(c: u8) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            b'-' | b'.' | b'/' | b'_' | b'#' | b'~' | b'@' | b'!' | b'$'
                | b'%' | b'+' | b'=' | b'^' | b'|' | b'<' | b'>' | b'?'
        )
}

///// LOW-LEVEL PARSERS

fn fail<'a, T>(input: RawSpan<'a>, msg: &'static str) -> PResult<'a, T> {
    Err(nom::Err::Failure(VerboseError::add_context(
        input,
        msg,
        VerboseError::from_error_kind(input, ErrorKind::Fail),
    )))
}

/// Skips whitespace and `//` comments.
fn ws(mut input: RawSpan) -> PResult<()> {
    loop {
        let s = input.fragment().as_bytes();
        match s.first() {
            Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                input = input.slice(1..);
            }
            Some(b'/') if s.get(1) == Some(&b'/') => {
                let end = s
                    .iter()
                    .position(|&c| c == b'\n')
                    .map(|i| i + 1)
                    .unwrap_or(s.len());
                input = input.slice(end..);
            }
            _ => return Ok((input, ())),
        }
    }
}

/// Skips whitespace, comments, and commas (the separators inside arrays and
/// objects; leading and trailing commas are fine).
fn commas(mut input: RawSpan) -> PResult<()> {
    loop {
        let (i, ()) = ws(input)?;
        if i.fragment().as_bytes().first() == Some(&b',') {
            input = i.slice(1..);
        } else {
            return Ok((i, ()));
        }
    }
}

/// Parses a quoted string with JSON escape sequences.
fn quoted_string(input: RawSpan) -> PResult<String> {
    let s = input.fragment().as_bytes();
    debug_assert_eq!(s.first(), Some(&b'"'));
    let mut r = String::new();
    let mut i = 1;
    loop {
        match s.get(i) {
            None => return fail(input, "string not terminated by end of input"),
            Some(b'"') => return Ok((input.slice(i + 1..), r)),
            Some(b'\\') => {
                i += 1;
                match s.get(i) {
                    None => {
                        return fail(
                            input,
                            "string not terminated by end of input",
                        )
                    }
                    Some(b'"') => r.push('"'),
                    Some(b'\\') => r.push('\\'),
                    Some(b'/') => r.push('/'),
                    Some(b'b') => r.push('\x08'),
                    Some(b'f') => r.push('\x0c'),
                    Some(b'n') => r.push('\n'),
                    Some(b'r') => r.push('\r'),
                    Some(b't') => r.push('\t'),
                    Some(b'u') => {
                        let (ni, c) = unicode_escape(input, s, i)?;
                        i = ni;
                        r.push(c);
                        continue;
                    }
                    Some(_) => {
                        return fail(
                            input.slice(i..),
                            "unrecognized escape sequence",
                        )
                    }
                }
                i += 1;
            }
            Some(_) => {
                // Copy a full UTF-8 sequence
                let frag = &input.fragment()[i..];
                let c = frag.chars().next().unwrap();
                r.push(c);
                i += c.len_utf8();
            }
        }
    }
}

/// Parses the 4 hex digits after `\u`, combining surrogate pairs.  Returns
/// the index just past the escape.
fn unicode_escape<'a>(
    input: RawSpan<'a>,
    s: &[u8],
    i: usize,
) -> std::result::Result<(usize, char), nom::Err<VerboseError<RawSpan<'a>>>> {
    fn hex4(s: &[u8], i: usize) -> Option<u32> {
        let mut v = 0u32;
        for k in 0..4 {
            let d = (*s.get(i + k)? as char).to_digit(16)?;
            v = v * 16 + d;
        }
        Some(v)
    }
    let bad = |input: RawSpan<'a>| {
        nom::Err::Failure(VerboseError::add_context(
            input,
            "invalid \\u escape sequence",
            VerboseError::from_error_kind(input, ErrorKind::Fail),
        ))
    };
    // i points at the 'u'
    let hi = hex4(s, i + 1).ok_or_else(|| bad(input))?;
    if (0xd800..0xdc00).contains(&hi) {
        // Expect a low surrogate right after
        if s.get(i + 5) == Some(&b'\\') && s.get(i + 6) == Some(&b'u') {
            let lo = hex4(s, i + 7).ok_or_else(|| bad(input))?;
            if (0xdc00..0xe000).contains(&lo) {
                let c = 0x10000 + ((hi - 0xd800) << 10) + (lo - 0xdc00);
                let c = char::from_u32(c).ok_or_else(|| bad(input))?;
                return Ok((i + 11, c));
            }
        }
        Err(bad(input))
    } else {
        let c = char::from_u32(hi).ok_or_else(|| bad(input))?;
        Ok((i + 5, c))
    }
}

/// Parses a word: an unquoted run of identifier-ish characters.  `::` and
/// `:/` are allowed mid-word (type paths and IRIs), a lone `:` ends it.
fn word(input: RawSpan) -> PResult<RawSpan> {
    let s = input.fragment().as_bytes();
    let mut i = 1; // first char already checked by the caller
    loop {
        match s.get(i) {
            Some(&c) if is_word_char(c) => i += 1,
            Some(b':')
                if matches!(s.get(i + 1), Some(b':') | Some(b'/')) =>
            {
                i += 2;
            }
            Some(b'"') => {
                return fail(
                    input.slice(i..),
                    "quote cannot occur inside a word",
                )
            }
            Some(&c) if is_reserved(c) => {
                return fail(
                    input.slice(i..),
                    "reserved symbol cannot be used outside of strings",
                )
            }
            _ => break,
        }
    }
    Ok((input.slice(i..), input.slice(..i)))
}

///// NUMBERS
// Numbers are lexed as words, then interpreted.  Integer interpretation is
// tried first; if it doesn't consume the whole word, float interpretation
// takes over.

fn number_from_word<'a>(
    input: RawSpan<'a>,
    w: &str,
) -> PResult<'a, Tree> {
    match w {
        "+nan" => return Ok((input, Tree::from(f64::NAN))),
        "+inf" => return Ok((input, Tree::from(f64::INFINITY))),
        "-inf" => return Ok((input, Tree::from(f64::NEG_INFINITY))),
        _ => {}
    }
    let mut rest = w;
    let mut minus = false;
    match rest.as_bytes().first() {
        Some(b'+') => rest = &rest[1..],
        Some(b'-') => {
            minus = true;
            rest = &rest[1..];
        }
        _ => {}
    }
    if !rest.as_bytes().first().is_some_and(|c| c.is_ascii_digit()) {
        return fail(input, "malformed number");
    }
    let mut hex = false;
    if rest.len() >= 2 && (rest.starts_with("0x") || rest.starts_with("0X")) {
        hex = true;
        rest = &rest[2..];
    }
    let digit_end = rest
        .bytes()
        .position(|c| {
            if hex {
                !c.is_ascii_hexdigit()
            } else {
                !c.is_ascii_digit()
            }
        })
        .unwrap_or(rest.len());
    if digit_end == 0 {
        return fail(input, "malformed number");
    }
    if digit_end == rest.len() {
        let radix = if hex { 16 } else { 10 };
        if let Ok(v) = i64::from_str_radix(rest, radix) {
            return Ok((input, Tree::from(if minus { -v } else { v })));
        }
        // Integer overflow falls through to float interpretation
    } else if rest.as_bytes()[digit_end] == b'.' {
        let after_dot = rest.as_bytes().get(digit_end + 1);
        let dot_ok = match after_dot {
            Some(&c) if hex => c.is_ascii_hexdigit(),
            Some(&c) => c.is_ascii_digit(),
            None => false,
        };
        if !dot_ok {
            return fail(input, "number cannot end with a .");
        }
    }
    let v = if hex {
        match hex_float(rest) {
            Some(v) => v,
            None => return fail(input, "malformed number"),
        }
    } else {
        match rest.parse::<f64>() {
            Ok(v) => v,
            Err(_) => return fail(input, "junk at end of number"),
        }
    };
    Ok((input, Tree::from(if minus { -v } else { v })))
}

/// Interprets a hex float: hex digits, optional `.` + hex digits, optional
/// `p`/`P` power-of-two exponent.  The `0x` prefix and sign are gone already.
fn hex_float(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut v = 0.0f64;
    let mut i = 0;
    let mut any = false;
    while let Some(d) = bytes.get(i).and_then(|&c| (c as char).to_digit(16)) {
        v = v * 16.0 + d as f64;
        i += 1;
        any = true;
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let mut scale = 1.0 / 16.0;
        while let Some(d) =
            bytes.get(i).and_then(|&c| (c as char).to_digit(16))
        {
            v += d as f64 * scale;
            scale /= 16.0;
            i += 1;
            any = true;
        }
    }
    if !any {
        return None;
    }
    if matches!(bytes.get(i), Some(b'p') | Some(b'P')) {
        i += 1;
        let exp: i32 = s[i..].parse().ok()?;
        return Some(v * (exp as f64).exp2());
    }
    if i != bytes.len() {
        return None;
    }
    Some(v)
}

///// TERMS

fn array(input: RawSpan) -> PResult<RawTerm> {
    let mut input = input.slice(1..); // for the [
    let mut items = Vec::new();
    loop {
        let (i, ()) = commas(input)?;
        input = i;
        match input.fragment().as_bytes().first() {
            None => return fail(input, "array not terminated"),
            Some(b':') => return fail(input, "cannot have : in an array"),
            Some(b']') => {
                return Ok((input.slice(1..), RawTerm::Array(items)))
            }
            Some(_) => {
                let (i, item) = term(input)?;
                input = i;
                items.push(item);
            }
        }
    }
}

fn object(input: RawSpan) -> PResult<RawTerm> {
    let mut input = input.slice(1..); // for the {
    let mut pairs = Vec::new();
    loop {
        let (i, ()) = commas(input)?;
        input = i;
        match input.fragment().as_bytes().first() {
            None => return fail(input, "object not terminated"),
            Some(b':') => {
                return fail(input, "missing key before : in object")
            }
            Some(b'}') => {
                return Ok((input.slice(1..), RawTerm::Object(pairs)))
            }
            Some(_) => {}
        }
        let key_pos = Pos::of(&input);
        let (i, key) = term(input)?;
        let (i, ()) = ws(i)?;
        input = i;
        match input.fragment().as_bytes().first() {
            None => return fail(input, "object not terminated"),
            Some(b':') => input = input.slice(1..),
            Some(&c) if is_reserved(c) => {
                return fail(
                    input,
                    "reserved symbol cannot be used outside of strings",
                )
            }
            Some(_) => return fail(input, "missing : after key in object"),
        }
        let (i, ()) = ws(input)?;
        input = i;
        match input.fragment().as_bytes().first() {
            Some(b',') | Some(b'}') | None => {
                return fail(input, "missing value after : in object")
            }
            Some(_) => {}
        }
        let (i, value) = term(input)?;
        input = i;
        pairs.push((key, key_pos, value));
    }
}

/// Parses the name after `&` or `*`: a word or a quoted string.
fn shortcut_name(input: RawSpan) -> PResult<String> {
    match input.fragment().as_bytes().first() {
        Some(b'"') => quoted_string(input),
        Some(&c) if is_word_start(c) => {
            let (i, w) = word(input)?;
            let w = *w.fragment();
            if matches!(w, "null" | "true" | "false") {
                fail(input, "cannot use a non-string as a shortcut name")
            } else {
                Ok((i, w.to_owned()))
            }
        }
        _ => fail(input, "expected shortcut name"),
    }
}

fn decl(input: RawSpan) -> PResult<RawTerm> {
    let pos = Pos::of(&input);
    let input = input.slice(1..); // for the &
    let (input, name) = shortcut_name(input)?;
    let (input, ()) = ws(input)?;
    if input.fragment().as_bytes().first() == Some(&b':') {
        let (input, ()) = ws(input.slice(1..))?;
        let (input, value) = term(input)?;
        let (input, ()) = commas(input)?;
        let (input, rest) = term(input)?;
        Ok((
            input,
            RawTerm::Decl {
                name,
                pos,
                explicit_value: Some(Box::new(value)),
                rest: Box::new(rest),
            },
        ))
    } else {
        let (input, rest) = term(input)?;
        Ok((
            input,
            RawTerm::Decl {
                name,
                pos,
                explicit_value: None,
                rest: Box::new(rest),
            },
        ))
    }
}

fn shortcut_use(input: RawSpan) -> PResult<RawTerm> {
    let pos = Pos::of(&input);
    let input = input.slice(1..); // for the *
    let (input, name) = shortcut_name(input)?;
    Ok((input, RawTerm::Use { name, pos }))
}

fn term(input: RawSpan) -> PResult<RawTerm> {
    match input.fragment().as_bytes().first() {
        None => fail(input, "expected term but ran into end of document"),
        Some(&c) if is_word_start(c) => {
            let (i, w) = word(input)?;
            let t = match *w.fragment() {
                "null" => Tree::null(),
                "true" => Tree::from(true),
                "false" => Tree::from(false),
                w => Tree::from(w),
            };
            Ok((i, RawTerm::Done(t)))
        }
        Some(&c) if c.is_ascii_digit() || c == b'+' || c == b'-' => {
            let (i, w) = word(input)?;
            let (_, t) = number_from_word(input, w.fragment())?;
            Ok((i, RawTerm::Done(t)))
        }
        Some(b'"') => {
            let (i, s) = quoted_string(input)?;
            Ok((i, RawTerm::Done(Tree::from(s))))
        }
        Some(b'[') => array(input),
        Some(b'{') => object(input),
        Some(b'&') => decl(input),
        Some(b'*') => shortcut_use(input),
        Some(b':') | Some(b',') | Some(b']') | Some(b'}') => {
            fail(input, "unexpected punctuation")
        }
        Some(&c) if is_reserved(c) => fail(
            input,
            "reserved symbol cannot be used outside of strings",
        ),
        Some(_) => fail(input, "unrecognized character"),
    }
}

fn document(input: RawSpan) -> PResult<RawTerm> {
    // Skip BOM
    let input = if input.fragment().starts_with('\u{feff}') {
        input.slice('\u{feff}'.len_utf8()..)
    } else {
        input
    };
    let (input, ()) = ws(input)?;
    let (input, t) = term(input)?;
    let (input, ()) = ws(input)?;
    if !input.fragment().is_empty() {
        return fail(input, "extra stuff at end of document");
    }
    Ok((input, t))
}

///// RESOLUTION

struct Resolver<'s> {
    filename: &'s str,
    // A vector beats a map for the handful of shortcuts real documents have
    shortcuts: Vec<(String, Tree)>,
}

impl Resolver<'_> {
    fn error(&self, pos: Pos, msg: String) -> Error {
        Error::ParseError {
            msg,
            filename: self.filename.to_owned(),
            line: pos.line,
            col: pos.col,
        }
    }

    fn declare(&mut self, name: String, value: Tree, pos: Pos) -> Result<()> {
        if self.shortcuts.iter().any(|(n, _)| *n == name) {
            return Err(self.error(
                pos,
                format!("duplicate declaration of shortcut &{}", name),
            ));
        }
        self.shortcuts.push((name, value));
        Ok(())
    }

    fn resolve(&mut self, term: RawTerm) -> Result<Tree> {
        match term {
            RawTerm::Done(t) => Ok(t),
            RawTerm::Array(items) => Ok(Tree::from(
                items
                    .into_iter()
                    .map(|t| self.resolve(t))
                    .collect::<Result<Vec<Tree>>>()?,
            )),
            RawTerm::Object(pairs) => {
                let mut o = Vec::<TreePair>::with_capacity(pairs.len());
                for (key, key_pos, value) in pairs {
                    let key = self.resolve(key)?;
                    if key.form() != Form::String {
                        return Err(self.error(
                            key_pos,
                            format!(
                                "cannot use non-string {:?} as key in object",
                                key
                            ),
                        ));
                    }
                    let key = String::try_from(&key)?;
                    let value = self.resolve(value)?;
                    // Duplicate keys are permitted; last write wins
                    if let Some(p) = o.iter_mut().find(|p| p.0 == key) {
                        p.1 = value;
                    } else {
                        o.push((key, value));
                    }
                }
                Ok(Tree::from(o))
            }
            RawTerm::Decl {
                name,
                pos,
                explicit_value,
                rest,
            } => match explicit_value {
                Some(value) => {
                    let value = self.resolve(*value)?;
                    self.declare(name, value, pos)?;
                    self.resolve(*rest)
                }
                None => {
                    let value = self.resolve(*rest)?;
                    self.declare(name, value.clone(), pos)?;
                    Ok(value)
                }
            },
            RawTerm::Use { name, pos } => self
                .shortcuts
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, t)| t.clone())
                .ok_or_else(|| {
                    self.error(pos, format!("unknown shortcut *{}", name))
                }),
        }
    }
}

///// ENTRY POINTS

/// Parse a tree from a string.  The filename is only used in error messages.
pub fn tree_from_string_named(src: &str, filename: &str) -> Result<Tree> {
    match document(RawSpan::new(src)) {
        Ok((_, raw)) => Resolver {
            filename,
            shortcuts: Vec::new(),
        }
        .resolve(raw),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            // The first context in the chain is the message we labeled
            // ourselves; everything else is nom noise.
            let (span, msg) = e
                .errors
                .iter()
                .filter_map(|(span, kind)| match kind {
                    VerboseErrorKind::Context(c) => Some((span, *c)),
                    _ => None,
                })
                .next()
                .unwrap_or((
                    &e.errors[0].0,
                    "malformed document",
                ));
            Err(Error::ParseError {
                msg: msg.to_owned(),
                filename: filename.to_owned(),
                line: span.location_line(),
                col: span.get_utf8_column() as u32,
            })
        }
        Err(nom::Err::Incomplete(_)) => unreachable!(),
    }
}

pub fn tree_from_string(src: &str) -> Result<Tree> {
    tree_from_string_named(src, "")
}

pub fn string_from_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let filename = path.display().to_string();
    let mut f = fs::File::open(path).map_err(|e| Error::OpenFailed {
        filename: filename.clone(),
        message: e.to_string(),
    })?;
    let mut r = String::new();
    f.read_to_string(&mut r).map_err(|e| Error::ReadFailed {
        filename,
        message: e.to_string(),
    })?;
    Ok(r)
}

pub fn tree_from_file(path: impl AsRef<Path>) -> Result<Tree> {
    let src = string_from_file(&path)?;
    tree_from_string_named(&src, &path.as_ref().display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asserts the source parses to the expected tree.
    macro_rules! y {
        ($src:expr, $expected:expr) => {
            assert_eq!(
                tree_from_string($src).unwrap(),
                $expected,
                "yes: {}",
                $src
            );
        };
    }

    /// Asserts the source fails to parse.
    macro_rules! n {
        ($src:expr) => {
            assert!(
                matches!(
                    tree_from_string($src),
                    Err(Error::ParseError { .. })
                ),
                "no: {}",
                $src
            );
        };
    }

    fn arr(items: Vec<Tree>) -> Tree {
        Tree::from(items)
    }
    fn obj(pairs: Vec<(&str, Tree)>) -> Tree {
        Tree::from(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_scalars() {
        y!("null", Tree::null());
        y!("0", Tree::from(0));
        y!("345", Tree::from(345));
        y!("-44", Tree::from(-44));
        y!("2.5", Tree::from(2.5));
        y!("-4", Tree::from(-4.0));
        y!("1e45", Tree::from(1e45));
        y!("0xdeadbeef00", Tree::from(0xdeadbeef00i64));
        y!("+0x40", Tree::from(0x40));
        y!("-0x40", Tree::from(-0x40));
        y!("000099", Tree::from(99));
        y!("000", Tree::from(0));
        n!("0.");
        n!(".0");
        n!("0.e4");
        let dead_beef =
            (0xdead as f64 + 0xbeef as f64 / 65536.0) * 2f64.powi(30);
        y!("0xdead.beefP30", Tree::from(dead_beef));
        y!("+0xdead.beefP30", Tree::from(dead_beef));
        y!("-0xdead.beefP30", Tree::from(-dead_beef));
        n!("++0");
        n!("--0");
        y!("+nan", Tree::from(f64::NAN));
        y!("+inf", Tree::from(f64::INFINITY));
        y!("-inf", Tree::from(f64::NEG_INFINITY));
    }

    #[test]
    fn test_strings() {
        y!("\"\"", Tree::from(""));
        y!("asdf", Tree::from("asdf"));
        y!("\"null\"", Tree::from("null"));
        y!("\"true\"", Tree::from("true"));
        y!("\"false\"", Tree::from("false"));
        y!("#", Tree::from("#"));
        y!("#foo", Tree::from("#foo"));
        y!("\"a\\nb\\t\\\"c\\\"\"", Tree::from("a\nb\t\"c\""));
        y!("\"\\u0041\\u00e9\"", Tree::from("Aé"));
        y!("\"\\ud83d\\ude00\"", Tree::from("😀"));
        n!("\"asdf");
        n!("\"bad\\escape\"");
    }

    #[test]
    fn test_containers() {
        y!("[]", arr(vec![]));
        y!("[,,,,,]", arr(vec![]));
        y!(
            "[0 1 foo]",
            arr(vec![Tree::from(0), Tree::from(1), Tree::from("foo")])
        );
        y!("{}", obj(vec![]));
        y!("{\"asdf\":\"foo\"}", obj(vec![("asdf", Tree::from("foo"))]));
        y!("{asdf:0}", obj(vec![("asdf", Tree::from(0))]));
        n!("{0:0}");
        y!(
            "{a:0 \"null\":1 \"0\":foo}",
            obj(vec![
                ("a", Tree::from(0)),
                ("null", Tree::from(1)),
                ("0", Tree::from("foo")),
            ])
        );
        y!(
            "[[0 1] [[2] [3 4]]]",
            arr(vec![
                arr(vec![Tree::from(0), Tree::from(1)]),
                arr(vec![
                    arr(vec![Tree::from(2)]),
                    arr(vec![Tree::from(3), Tree::from(4)]),
                ]),
            ])
        );
        y!("{a:1 a:2}", obj(vec![("a", Tree::from(2))]));
        y!("3 //4", Tree::from(3));
        y!("//c\n3", Tree::from(3));
    }

    #[test]
    fn test_shortcuts() {
        y!("&foo 1", Tree::from(1));
        y!("&foo:1 *foo", Tree::from(1));
        y!("&\"null\":4 *\"null\"", Tree::from(4));
        y!("[&foo 1 *foo]", arr(vec![Tree::from(1), Tree::from(1)]));
        y!("[&foo:1 *foo]", arr(vec![Tree::from(1)]));
        y!("{&key asdf:*key}", obj(vec![("asdf", Tree::from("asdf"))]));
        y!(
            "{&borp:\"bump\" *borp:*borp}",
            obj(vec![("bump", Tree::from("bump"))])
        );
        n!("{&borp:44 *borp:*borp}");
        n!("&foo");
        n!("&foo:1");
        n!("&1 1");
        n!("&null 1");
        n!("*foo");
        n!("4 &foo:4");
        n!("&foo *foo");
        n!("&foo:*foo 1");
        n!("&&a 1");
        n!("& a 1");
        n!("[&a:1 &a:2 0]");
        n!("[+nana]");
    }

    #[test]
    fn test_error_position() {
        match tree_from_string_named("[0 1\n  !!]", "f.ayu") {
            Err(Error::ParseError {
                filename, line, ..
            }) => {
                assert_eq!(filename, "f.ayu");
                assert_eq!(line, 2);
            }
            other => panic!("expected ParseError, got {:?}", other),
        }
    }

    #[test]
    fn test_bom() {
        y!("\u{feff}3", Tree::from(3));
    }
}
