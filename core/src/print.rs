//! Prints [`Tree`]s back to text.
//!
//! Two top-level layouts: pretty (multi-line, indented) and compact (minimal
//! whitespace).  The orthogonal JSON mode emits only JSON-legal output:
//! quoted strings, `1e999` instead of `+inf`, `null` instead of `+nan`, and
//! element commas.  Pretty mode consults each node's presentation flags;
//! small arrays and objects are auto-compacted.

use crate::error::{Error, Result};
use crate::tree::{Rep, Tree, TreeFlags};
use std::fmt::Write as _;
use std::fs;
use std::io::Write as _;
use std::path::Path;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrintOptions {
    pub pretty: bool,
    pub json: bool,
}

impl PrintOptions {
    pub fn compact() -> PrintOptions {
        PrintOptions::default()
    }
    pub fn pretty() -> PrintOptions {
        PrintOptions {
            pretty: true,
            json: false,
        }
    }
    pub fn json(mut self) -> PrintOptions {
        self.json = true;
        self
    }
}

struct Printer {
    opts: PrintOptions,
    out: String,
}

impl Printer {
    fn newline(&mut self, ind: usize) {
        self.out.push('\n');
        for _ in 0..ind {
            self.out.push_str("    ");
        }
    }

    fn int(&mut self, v: i64, hex: bool) {
        if hex {
            if v < 0 {
                self.out.push('-');
            }
            let _ = write!(self.out, "0x{:x}", v.unsigned_abs());
        } else {
            let _ = write!(self.out, "{}", v);
        }
    }

    fn double(&mut self, v: f64, hex: bool) {
        if v.is_nan() {
            self.out.push_str(if self.opts.json { "null" } else { "+nan" });
        } else if v == f64::INFINITY {
            self.out.push_str(if self.opts.json { "1e999" } else { "+inf" });
        } else if v == f64::NEG_INFINITY {
            self.out
                .push_str(if self.opts.json { "-1e999" } else { "-inf" });
        } else if v == 0.0 {
            if v.is_sign_negative() {
                self.out.push('-');
            }
            self.out.push('0');
        } else if hex && !self.opts.json {
            if v < 0.0 {
                self.out.push('-');
            }
            self.hex_double(v.abs());
        } else {
            let a = v.abs();
            if v == v.trunc() && a < 1e16 {
                let _ = write!(self.out, "{}", v as i64);
            } else if !(1e-4..1e16).contains(&a) {
                let _ = write!(self.out, "{:e}", v);
            } else {
                let _ = write!(self.out, "{}", v);
            }
        }
    }

    /// Prints a finite positive double as `0x1.<frac>p<exp>`.
    fn hex_double(&mut self, v: f64) {
        let bits = v.to_bits();
        let mut exp = ((bits >> 52) & 0x7ff) as i64;
        let mut mant = bits & 0xf_ffff_ffff_ffff;
        if exp == 0 {
            // Subnormal: shift the leading 1 up to bit 52
            let shift = mant.leading_zeros() as i64 - 11;
            mant = (mant << shift) & 0xf_ffff_ffff_ffff;
            exp = 1 - shift;
        }
        self.out.push_str("0x1");
        if mant != 0 {
            self.out.push('.');
            let hex = format!("{:013x}", mant);
            self.out.push_str(hex.trim_end_matches('0'));
        }
        let _ = write!(self.out, "p{:+}", exp - 1023);
    }

    fn quoted(&mut self, s: &str, expand: bool) {
        self.out.push('"');
        for c in s.chars() {
            match c {
                '"' => self.out.push_str("\\\""),
                '\\' => self.out.push_str("\\\\"),
                '\x08' => self.out.push_str("\\b"),
                '\x0c' => self.out.push_str("\\f"),
                '\n' => {
                    if expand && !self.opts.json {
                        self.out.push(c);
                    } else {
                        self.out.push_str("\\n");
                    }
                }
                '\r' => self.out.push_str("\\r"),
                '\t' => {
                    if expand && !self.opts.json {
                        self.out.push(c);
                    } else {
                        self.out.push_str("\\t");
                    }
                }
                c if self.opts.json && (c as u32) < 0x20 => {
                    let _ = write!(self.out, "\\u{:04x}", c as u32);
                }
                c => self.out.push(c),
            }
        }
        self.out.push('"');
    }

    fn string(&mut self, s: &str, expand: bool) {
        if self.opts.json {
            return self.quoted(s, false);
        }
        // Reserved words and the empty string must be quoted to stay strings
        if matches!(s, "" | "null" | "true" | "false") {
            self.out.push('"');
            self.out.push_str(s);
            self.out.push('"');
            return;
        }
        let bytes = s.as_bytes();
        if !(bytes[0].is_ascii_alphabetic() || bytes[0] == b'_') {
            return self.quoted(s, expand);
        }
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b':' => {
                    if matches!(bytes.get(i + 1), Some(b':') | Some(b'/')) {
                        i += 2;
                    } else {
                        return self.quoted(s, expand);
                    }
                }
                c if c.is_ascii_alphanumeric() => i += 1,
                b'-' | b'.' | b'/' | b'_' => i += 1,
                _ => return self.quoted(s, expand),
            }
        }
        // No need to quote
        self.out.push_str(s);
    }

    fn subtree(&mut self, t: &Tree, ind: usize) {
        let flags = t.flags();
        match &t.rep {
            Rep::Undefined => {
                panic!("cannot print an undefined tree");
            }
            Rep::Null => self.out.push_str("null"),
            Rep::Bool(v) => {
                self.out.push_str(if *v { "true" } else { "false" })
            }
            Rep::Int(v) => {
                let hex = !self.opts.json
                    && flags.contains(TreeFlags::PREFER_HEX);
                self.int(*v, hex);
            }
            Rep::Double(v) => {
                let hex = flags.contains(TreeFlags::PREFER_HEX);
                self.double(*v, hex);
            }
            Rep::String(s) => {
                self.string(s, flags.contains(TreeFlags::PREFER_EXPANDED))
            }
            Rep::Array(a) => {
                if a.is_empty() {
                    self.out.push_str("[]");
                    return;
                }
                let expand = if !self.opts.pretty {
                    false
                } else if flags.contains(TreeFlags::PREFER_EXPANDED) {
                    true
                } else if flags.contains(TreeFlags::PREFER_COMPACT) {
                    false
                } else {
                    a.len() > 4
                };
                let show_indices =
                    expand && a.len() > 4 && !self.opts.json;
                self.out.push('[');
                for (i, elem) in a.iter().enumerate() {
                    if i == 0 {
                        if expand {
                            self.newline(ind + 1);
                        }
                    } else if expand {
                        if self.opts.json {
                            self.out.push(',');
                        }
                        self.newline(ind + 1);
                    } else {
                        self.out.push(if self.opts.json { ',' } else { ' ' });
                    }
                    self.subtree(elem, ind + expand as usize);
                    if show_indices {
                        let _ = write!(self.out, "  // {}", i);
                    }
                }
                if expand {
                    self.newline(ind);
                }
                self.out.push(']');
            }
            Rep::Object(o) => {
                if o.is_empty() {
                    self.out.push_str("{}");
                    return;
                }
                let expand = if !self.opts.pretty {
                    false
                } else if flags.contains(TreeFlags::PREFER_EXPANDED) {
                    true
                } else if flags.contains(TreeFlags::PREFER_COMPACT) {
                    false
                } else {
                    o.len() > 1
                };
                self.out.push('{');
                for (i, (key, value)) in o.iter().enumerate() {
                    if i == 0 {
                        if expand {
                            self.newline(ind + 1);
                        }
                    } else if expand {
                        if self.opts.json {
                            self.out.push(',');
                        }
                        self.newline(ind + 1);
                    } else {
                        self.out.push(if self.opts.json { ',' } else { ' ' });
                    }
                    self.string(key, false);
                    self.out.push(':');
                    if expand {
                        self.out.push(' ');
                    }
                    self.subtree(value, ind + expand as usize);
                }
                if expand {
                    self.newline(ind);
                }
                self.out.push('}');
            }
            Rep::Error(e) => {
                // Not valid to read back in; diagnostics only
                let _ = write!(self.out, "?({})", e);
            }
        }
    }
}

/// Render a tree to a string.  Panics on an undefined tree.
pub fn tree_to_string(t: &Tree, opts: PrintOptions) -> String {
    let mut printer = Printer {
        opts,
        out: String::new(),
    };
    printer.subtree(t, 0);
    if opts.pretty {
        printer.out.push('\n');
    }
    printer.out
}

pub fn string_to_file(content: &str, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let filename = path.display().to_string();
    let mut f = fs::File::create(path).map_err(|e| Error::OpenFailed {
        filename: filename.clone(),
        message: e.to_string(),
    })?;
    f.write_all(content.as_bytes())
        .map_err(|e| Error::WriteFailed {
            filename: filename.clone(),
            message: e.to_string(),
        })?;
    f.sync_all().map_err(|e| Error::CloseFailed {
        filename,
        message: e.to_string(),
    })?;
    Ok(())
}

/// Render a tree to a file.  Files are usually meant for human editing, so
/// callers generally want [`PrintOptions::pretty`] here.
pub fn tree_to_file(
    t: &Tree,
    path: impl AsRef<Path>,
    opts: PrintOptions,
) -> Result<()> {
    string_to_file(&tree_to_string(t, opts), path)
}

/// Debug formatting for trees: compact, and tolerates the undefined form.
pub(crate) fn debug_tree(
    t: &Tree,
    f: &mut std::fmt::Formatter<'_>,
) -> std::fmt::Result {
    if !t.has_value() {
        return f.write_str("undefined");
    }
    f.write_str(&tree_to_string(t, PrintOptions::compact()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tree_from_string;

    fn sample() -> Tree {
        tree_from_string(
            r#"{a:1 b:[1 2 3 4 5] c:{d:hello e:"two words"} f:2.5 g:[0.5]}"#,
        )
        .unwrap()
    }

    const PRETTY: &str = "\
{
    a: 1
    b: [
        1  // 0
        2  // 1
        3  // 2
        4  // 3
        5  // 4
    ]
    c: {
        d: hello
        e: \"two words\"
    }
    f: 2.5
    g: [0.5]
}
";

    const COMPACT: &str = "{a:1 b:[1 2 3 4 5] \
c:{d:hello e:\"two words\"} f:2.5 g:[0.5]}";

    const PRETTY_JSON: &str = "\
{
    \"a\": 1,
    \"b\": [
        1,
        2,
        3,
        4,
        5
    ],
    \"c\": {
        \"d\": \"hello\",
        \"e\": \"two words\"
    },
    \"f\": 2.5,
    \"g\": [0.5]
}
";

    const COMPACT_JSON: &str = "{\"a\":1,\"b\":[1,2,3,4,5],\
\"c\":{\"d\":\"hello\",\"e\":\"two words\"},\"f\":2.5,\"g\":[0.5]}";

    #[test]
    fn test_modes_match_goldens() {
        let t = sample();
        assert_eq!(tree_to_string(&t, PrintOptions::pretty()), PRETTY);
        assert_eq!(tree_to_string(&t, PrintOptions::compact()), COMPACT);
        assert_eq!(
            tree_to_string(&t, PrintOptions::pretty().json()),
            PRETTY_JSON
        );
        assert_eq!(
            tree_to_string(&t, PrintOptions::compact().json()),
            COMPACT_JSON
        );
    }

    #[test]
    fn test_json_mode_is_valid_json() {
        let t = sample();
        for opts in [PrintOptions::pretty().json(), PrintOptions::compact().json()]
        {
            let s = tree_to_string(&t, opts);
            serde_json::from_str::<serde_json::Value>(&s)
                .expect("JSON mode emitted invalid JSON");
        }
    }

    #[test]
    fn test_roundtrip() {
        for src in [
            "null",
            "true",
            "[0 -1 2.5 1e45 +nan +inf -inf]",
            "{a:[] b:{} c:\"\"}",
            "[\"string with spaces\" word \"0\" \"null\"]",
            "-0",
        ] {
            let t = tree_from_string(src).unwrap();
            for opts in [PrintOptions::pretty(), PrintOptions::compact()] {
                let printed = tree_to_string(&t, opts);
                assert_eq!(
                    tree_from_string(&printed).unwrap(),
                    t,
                    "round trip failed: {} -> {}",
                    src,
                    printed
                );
            }
        }
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tree_to_string(&Tree::from(1.0), PrintOptions::compact()),
            "1",
        );
        assert_eq!(
            tree_to_string(&Tree::from(145.0), PrintOptions::compact()),
            "145",
        );
        assert_eq!(
            tree_to_string(&Tree::from(-0.0), PrintOptions::compact()),
            "-0",
        );
        let hexed = Tree::from(0xdead).with_flags(TreeFlags::PREFER_HEX);
        assert_eq!(
            tree_to_string(&hexed, PrintOptions::compact()),
            "0xdead",
        );
        // Hex flag is ignored in JSON mode
        assert_eq!(
            tree_to_string(&hexed, PrintOptions::compact().json()),
            "57005",
        );
        let hexf = Tree::from(10.5).with_flags(TreeFlags::PREFER_HEX);
        let printed = tree_to_string(&hexf, PrintOptions::compact());
        assert_eq!(printed, "0x1.5p+3");
        assert_eq!(
            tree_from_string(&printed).unwrap(),
            Tree::from(10.5),
            "hex floats round trip"
        );
    }

    #[test]
    fn test_string_quoting() {
        let cases = [
            ("word", "word"),
            ("two words", "\"two words\""),
            ("", "\"\""),
            ("null", "\"null\""),
            ("0", "\"0\""),
            ("a::b", "a::b"),
            ("scheme:/path", "scheme:/path"),
            ("a:b", "\"a:b\""),
            ("tab\there", "\"tab\\there\""),
        ];
        for (input, expected) in cases {
            assert_eq!(
                tree_to_string(&Tree::from(input), PrintOptions::compact()),
                expected,
            );
        }
    }
}
