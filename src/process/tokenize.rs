// src/process/tokenize.rs
use csv::{ReaderBuilder, StringRecord};
use std::io::BufRead;

use crate::config::LoaderConfig;

/// Delimiter + quote pair used to split a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub delimiter: char,
    pub quote: char,
}

impl Default for Dialect {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
        }
    }
}

impl From<&LoaderConfig> for Dialect {
    fn from(cfg: &LoaderConfig) -> Self {
        Self {
            delimiter: cfg.delimiter,
            quote: cfg.quote,
        }
    }
}

/// One line split into fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenized {
    pub fields: Vec<String>,
    /// A quote was still open at end of line; `fields` is a best-effort split.
    pub malformed: bool,
}

/// Accumulates one field. `quoted` is the byte span of `buf` that came from
/// inside quotes; whitespace is only trimmed outside it.
#[derive(Default)]
struct FieldBuf {
    buf: String,
    quoted: Option<(usize, usize)>,
}

impl FieldBuf {
    fn open_quote(&mut self) {
        if self.quoted.is_none() {
            let at = self.buf.len();
            self.quoted = Some((at, at));
        }
    }

    fn close_quote(&mut self) {
        if let Some((start, _)) = self.quoted {
            self.quoted = Some((start, self.buf.len()));
        }
    }

    fn finish(&mut self) -> String {
        let out = match self.quoted {
            None => self.buf.trim().to_string(),
            Some((start, end)) => {
                let head = self.buf[..start].trim_start();
                let tail = self.buf[end..].trim_end();
                let mut s = String::with_capacity(head.len() + (end - start) + tail.len());
                s.push_str(head);
                s.push_str(&self.buf[start..end]);
                s.push_str(tail);
                s
            }
        };
        self.buf.clear();
        self.quoted = None;
        out
    }
}

/// Split `line` into fields.
///
/// - the delimiter inside quotes is literal
/// - a doubled quote inside quotes is one literal quote
/// - whitespace outside quotes is trimmed, whitespace inside is kept
/// - an unbalanced quote runs to end of line and marks the result malformed
///
/// Well-formed lines go through the `csv` reader. Lines it would read
/// differently fall back to [`split_quoted`].
pub fn tokenize_line(line: &str, dialect: Dialect) -> Tokenized {
    match split_plain(line, dialect) {
        Some(fields) => Tokenized {
            fields,
            malformed: false,
        },
        None => split_quoted(line, dialect),
    }
}

/// Parse one line with `csv`, then check each field against the raw text.
///
/// Returns `None` unless every field is either unquoted with no quote
/// character in it, or exactly wrapped in quotes with inner quotes doubled.
/// The `csv` reader keeps a quote that follows whitespace as literal text,
/// keeps text after a closing quote, and lets an open quote swallow the rest
/// of the input. Those lines are left to [`split_quoted`].
fn split_plain(line: &str, dialect: Dialect) -> Option<Vec<String>> {
    let delimiter = u8::try_from(dialect.delimiter).ok().filter(u8::is_ascii)?;
    let quote = u8::try_from(dialect.quote).ok().filter(u8::is_ascii)?;

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .quote(quote)
        .buffer_capacity(line.len() + 1)
        .from_reader(line.as_bytes());
    let mut record = StringRecord::new();
    if !rdr.read_record(&mut record).ok()? {
        return None;
    }

    let mut rest = line;
    let mut fields = Vec::with_capacity(record.len());
    for (i, field) in record.iter().enumerate() {
        if i > 0 {
            rest = rest.strip_prefix(dialect.delimiter)?;
        }
        rest = if let Some(after) = rest.strip_prefix(quoted(field, dialect.quote).as_str()) {
            fields.push(field.to_string());
            after
        } else if !field.contains(dialect.quote) {
            let after = rest.strip_prefix(field)?;
            fields.push(field.trim().to_string());
            after
        } else {
            return None;
        };
    }
    rest.is_empty().then_some(fields)
}

/// `field` as it appears between quotes in the source.
fn quoted(field: &str, quote: char) -> String {
    let mut out = String::with_capacity(field.len() + 2);
    out.push(quote);
    for c in field.chars() {
        if c == quote {
            out.push(quote);
        }
        out.push(c);
    }
    out.push(quote);
    out
}

/// Character-level split for lines [`split_plain`] rejects. A quote opens
/// anywhere outside quotes; whitespace is trimmed around the quoted span.
fn split_quoted(line: &str, dialect: Dialect) -> Tokenized {
    let mut fields = Vec::new();
    let mut field = FieldBuf::default();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == dialect.quote {
                if chars.peek() == Some(&dialect.quote) {
                    chars.next();
                    field.buf.push(c);
                } else {
                    in_quotes = false;
                    field.close_quote();
                }
            } else {
                field.buf.push(c);
            }
        } else if c == dialect.quote {
            in_quotes = true;
            field.open_quote();
        } else if c == dialect.delimiter {
            fields.push(field.finish());
        } else {
            field.buf.push(c);
        }
    }

    if in_quotes {
        field.close_quote();
    }
    fields.push(field.finish());

    Tokenized {
        fields,
        malformed: in_quotes,
    }
}

/// A line read from the source, before or after tokenizing.
#[derive(Debug)]
pub enum Line {
    Blank,
    Fields(Tokenized),
}

/// Lazily reads and tokenizes lines from a buffered reader.
///
/// Yields `(line_number, Line)` with 1-based line numbers; I/O and UTF-8
/// failures are passed through as `Err`.
pub struct Lines<R> {
    reader: R,
    dialect: Dialect,
    buf: String,
    line_no: usize,
}

impl<R: BufRead> Lines<R> {
    pub fn new(reader: R, dialect: Dialect) -> Self {
        Self {
            reader,
            dialect,
            buf: String::new(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = (usize, std::io::Result<Line>);

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_line(&mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_no += 1;
                let text = self.buf.trim_end_matches(['\n', '\r']);
                let line = if text.trim().is_empty() {
                    Line::Blank
                } else {
                    Line::Fields(tokenize_line(text, self.dialect))
                };
                Some((self.line_no, Ok(line)))
            }
            Err(e) => {
                self.line_no += 1;
                Some((self.line_no, Err(e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn split(line: &str) -> Vec<String> {
        tokenize_line(line, Dialect::default()).fields
    }

    #[test]
    fn plain_fields_are_trimmed() {
        assert_eq!(split(" a , b,c "), vec!["a", "b", "c"]);
    }

    #[test]
    fn quoted_delimiter_and_doubled_quote() {
        let t = tokenize_line(r#"1,"Smith, ""Jr""",x"#, Dialect::default());
        assert_eq!(t.fields, vec!["1", r#"Smith, "Jr""#, "x"]);
        assert!(!t.malformed);
    }

    #[test]
    fn whitespace_inside_quotes_is_kept() {
        assert_eq!(split(r#"  "  padded  "  ,b"#), vec!["  padded  ", "b"]);
    }

    #[test]
    fn empty_and_trailing_fields() {
        assert_eq!(split("a,,c,"), vec!["a", "", "c", ""]);
        assert_eq!(split(r#""""#), vec![""]);
    }

    #[test]
    fn unbalanced_quote_is_best_effort() {
        let t = tokenize_line(r#"1,"open, still open"#, Dialect::default());
        assert!(t.malformed);
        assert_eq!(t.fields, vec!["1", "open, still open"]);
    }

    #[test]
    fn custom_dialect() {
        let d = Dialect {
            delimiter: ';',
            quote: '\'',
        };
        let t = tokenize_line("a;'b;c';'it''s'", d);
        assert_eq!(t.fields, vec!["a", "b;c", "it's"]);
    }

    #[test]
    fn csv_path_agrees_with_fallback_on_clean_lines() {
        let d = Dialect::default();
        for line in [
            "a,b,c",
            " a , b ,c ",
            r#""x, y",2,"#,
            r#""O""Neil","  kept  ""#,
            r#""""#,
        ] {
            assert_eq!(split_plain(line, d), Some(split_quoted(line, d).fields), "{line:?}");
        }
    }

    #[test]
    fn quote_edge_cases_use_fallback() {
        let d = Dialect::default();
        for line in [
            r#"a, "b, c""#,
            r#""a"  ,b"#,
            r#""a"b,c"#,
            r#"1,"open"#,
            r#"1,"abc"""#,
        ] {
            assert_eq!(split_plain(line, d), None, "{line:?}");
        }
        assert_eq!(split(r#"a, "b, c""#), vec!["a", "b, c"]);
        assert_eq!(split(r#""a"  ,b"#), vec!["a", "b"]);
    }

    #[test]
    fn non_ascii_dialect_uses_fallback() {
        let d = Dialect {
            delimiter: '¦',
            quote: '"',
        };
        assert_eq!(split_plain("a¦b", d), None);
        assert_eq!(tokenize_line(r#"a ¦ "b¦c""#, d).fields, vec!["a", "b¦c"]);
    }

    #[test]
    fn lines_strip_crlf_and_flag_blanks() {
        let src = Cursor::new("x,y\r\n\r\n1,2\r\n3,4");
        let got: Vec<_> = Lines::new(src, Dialect::default())
            .map(|(n, l)| (n, l.unwrap()))
            .collect();
        assert_eq!(got.len(), 4);
        assert!(matches!(&got[0].1, Line::Fields(t) if t.fields == ["x", "y"]));
        assert!(matches!(got[1].1, Line::Blank));
        assert!(matches!(&got[2].1, Line::Fields(t) if t.fields == ["1", "2"]));
        assert_eq!(got[3].0, 4);
        assert!(matches!(&got[3].1, Line::Fields(t) if t.fields == ["3", "4"]));
    }
}
