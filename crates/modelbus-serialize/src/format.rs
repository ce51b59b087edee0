//! printf-style format strings.
//!
//! A format string such as `"%6s\t%d\t%f\n"` is parsed once into a
//! [`FormatSpec`]: an ordered list of typed fields and the literal text
//! between them. Encoding renders values the way C's `printf` would;
//! decoding is a strict positional scanner that expects every literal run
//! exactly where the format puts it.
//!
//! Field syntax is `%[width][.precision][length]conversion`:
//!
//! | conversion      | kind    | width             | precision        |
//! |-----------------|---------|-------------------|------------------|
//! | `s`             | string  | maximum length    | not allowed      |
//! | `d` `i` `u`     | integer | minimum, right-aligned | not allowed |
//! | `f` `F`         | float   | minimum, right-aligned | digits (6)  |
//! | `e` `E`         | float   | minimum, right-aligned | digits (6)  |
//! | `g` `G`         | float   | minimum, right-aligned | significant digits (6) |
//!
//! Length modifiers (`h`, `hh`, `l`, `ll`, `L`, `z`, `j`) are accepted and
//! ignored. `%%` is a literal percent sign.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::error::{Result, SerializeError};
use crate::value::{Value, ValueKind};

/// Kind of a format field.
pub type FieldKind = ValueKind;

const DEFAULT_FLOAT_PRECISION: usize = 6;

/// How a float field is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatStyle {
    /// `%f`: fixed number of decimals.
    Fixed,
    /// `%e`: one integer digit and an exponent.
    Exponent,
    /// `%g`: the shorter of the two, trailing zeros removed.
    General,
}

/// One typed field of a format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub kind: FieldKind,
    /// Longest accepted string (strings only).
    pub max_width: Option<usize>,
    /// Minimum rendered width (numbers only).
    pub width: Option<usize>,
    /// Digits after the point, or significant digits for `%g` (floats only).
    pub precision: Option<usize>,
    pub style: FloatStyle,
    /// Upper-case conversion (`%E`, `%G`, `%F`).
    pub uppercase: bool,
}

impl FieldDescriptor {
    fn conversion(&self) -> char {
        let c = match (self.kind, self.style) {
            (ValueKind::Str, _) => 's',
            (ValueKind::Int, _) => 'd',
            (ValueKind::Float, FloatStyle::Fixed) => 'f',
            (ValueKind::Float, FloatStyle::Exponent) => 'e',
            (ValueKind::Float, FloatStyle::General) => 'g',
        };
        if self.uppercase {
            c.to_ascii_uppercase()
        } else {
            c
        }
    }
}

/// A piece of a format: literal text or a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Field(FieldDescriptor),
}

/// A parsed, validated format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    source: String,
    segments: Vec<Segment>,
    field_count: usize,
}

impl FormatSpec {
    /// Parse and validate a format string.
    pub fn parse(format: &str) -> Result<Self> {
        let invalid = |reason: String| SerializeError::InvalidFormat {
            format: format.to_string(),
            reason,
        };

        let mut segments: Vec<Segment> = Vec::new();
        let mut literal = String::new();
        let mut chars = format.char_indices().peekable();

        while let Some((at, c)) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            if chars.next_if(|&(_, c)| c == '%').is_some() {
                literal.push('%');
                continue;
            }

            let width = take_number(&mut chars);
            let precision = if chars.next_if(|&(_, c)| c == '.').is_some() {
                Some(take_number(&mut chars).unwrap_or(0))
            } else {
                None
            };
            while chars
                .next_if(|&(_, c)| matches!(c, 'h' | 'l' | 'L' | 'z' | 'j'))
                .is_some()
            {}

            let Some((_, conv)) = chars.next() else {
                return Err(invalid(format!("incomplete field at byte {at}")));
            };
            let (kind, style) = match conv {
                's' => (ValueKind::Str, FloatStyle::Fixed),
                'd' | 'i' | 'u' => (ValueKind::Int, FloatStyle::Fixed),
                'f' | 'F' => (ValueKind::Float, FloatStyle::Fixed),
                'e' | 'E' => (ValueKind::Float, FloatStyle::Exponent),
                'g' | 'G' => (ValueKind::Float, FloatStyle::General),
                other => {
                    return Err(invalid(format!(
                        "unsupported conversion '%{other}' at byte {at}"
                    )))
                }
            };
            if precision.is_some() && kind != ValueKind::Float {
                return Err(invalid(format!(
                    "precision is only allowed on float fields (byte {at})"
                )));
            }

            let field = FieldDescriptor {
                kind,
                max_width: if kind == ValueKind::Str { width } else { None },
                width: if kind == ValueKind::Str { None } else { width },
                precision,
                style,
                uppercase: conv.is_ascii_uppercase(),
            };

            if !literal.is_empty() {
                if let Some(Segment::Field(prev)) = segments.last() {
                    check_boundary(prev, &literal).map_err(&invalid)?;
                }
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            } else if let Some(Segment::Field(_)) = segments.last() {
                return Err(invalid(format!(
                    "fields must be separated by literal text (field at byte {at})"
                )));
            }
            segments.push(Segment::Field(field));
        }
        if !literal.is_empty() {
            if let Some(Segment::Field(prev)) = segments.last() {
                check_boundary(prev, &literal).map_err(&invalid)?;
            }
            segments.push(Segment::Literal(literal));
        }

        let field_count = segments
            .iter()
            .filter(|s| matches!(s, Segment::Field(_)))
            .count();
        if field_count == 0 {
            return Err(invalid("format contains no fields".to_string()));
        }

        Ok(Self {
            source: format.to_string(),
            segments,
            field_count,
        })
    }

    /// The format string as given to [`FormatSpec::parse`].
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field(f) => Some(f),
            Segment::Literal(_) => None,
        })
    }

    pub fn field_count(&self) -> usize {
        self.field_count
    }

    pub fn field_kinds(&self) -> Vec<FieldKind> {
        self.fields().map(|f| f.kind).collect()
    }

    /// Check arity and kinds of `values` against the fields.
    pub fn check(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.field_count {
            return Err(SerializeError::ArityMismatch {
                expected: self.field_count,
                actual: values.len(),
            });
        }
        for (index, (field, value)) in self.fields().zip(values).enumerate() {
            if field.kind != value.kind() {
                return Err(SerializeError::TypeMismatch {
                    field: index,
                    expected: field.kind,
                    actual: value.kind(),
                });
            }
            if let (Value::Str(s), Some(max)) = (value, field.max_width) {
                let len = s.chars().count();
                if len > max {
                    return Err(SerializeError::StringTooLong {
                        field: index,
                        len,
                        max,
                    });
                }
            }
        }
        self.check_delimiters(values)
    }

    /// A string must not contain the literal that ends its field, or the
    /// decoder would stop early.
    fn check_delimiters(&self, values: &[Value]) -> Result<()> {
        let mut index = 0usize;
        for (i, segment) in self.segments.iter().enumerate() {
            let Segment::Field(_) = segment else {
                continue;
            };
            if let (Value::Str(s), Some(Segment::Literal(delimiter))) =
                (&values[index], self.segments.get(i + 1))
            {
                let joined = format!("{s}{delimiter}");
                if joined.find(delimiter.as_str()) != Some(s.len()) {
                    return Err(SerializeError::DelimiterInString {
                        field: index,
                        delimiter: delimiter.clone(),
                    });
                }
            }
            index += 1;
        }
        Ok(())
    }

    /// Render `values` and append them to `dst`.
    ///
    /// Nothing is written unless every value conforms.
    pub fn encode_into(&self, values: &[Value], dst: &mut BytesMut) -> Result<()> {
        self.check(values)?;

        let mut out = String::new();
        let mut next = values.iter();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => {
                    let Some(value) = next.next() else {
                        break;
                    };
                    render_field(field, value, &mut out);
                }
            }
        }

        dst.put_slice(out.as_bytes());
        Ok(())
    }

    /// Render `values` into a new buffer.
    pub fn encode(&self, values: &[Value]) -> Result<Vec<u8>> {
        let mut dst = BytesMut::new();
        self.encode_into(values, &mut dst)?;
        Ok(dst.to_vec())
    }

    /// Scan `input` against the format.
    pub fn decode(&self, input: &[u8]) -> Result<Vec<Value>> {
        let text = std::str::from_utf8(input)
            .map_err(|err| SerializeError::parse(err.valid_up_to(), "input is not valid UTF-8"))?;

        let mut values = Vec::with_capacity(self.field_count);
        let mut pos = 0usize;
        let mut field_index = 0usize;

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(expected) => {
                    if !text[pos..].starts_with(expected.as_str()) {
                        return Err(SerializeError::parse(
                            pos,
                            format!("expected {expected:?}"),
                        ));
                    }
                    pos += expected.len();
                }
                Segment::Field(field) => {
                    let following = match self.segments.get(i + 1) {
                        Some(Segment::Literal(text)) => Some(text.as_str()),
                        _ => None,
                    };
                    let (value, end) = scan_field(field, field_index, text, pos, following)?;
                    values.push(value);
                    pos = end;
                    field_index += 1;
                }
            }
        }

        if pos != text.len() {
            return Err(SerializeError::parse(
                pos,
                format!("{} unexpected trailing bytes", text.len() - pos),
            ));
        }
        Ok(values)
    }

    /// Convert textual arguments to values of the fields' kinds.
    pub fn parse_args(&self, args: &[&str]) -> Result<Vec<Value>> {
        if args.len() != self.field_count {
            return Err(SerializeError::ArityMismatch {
                expected: self.field_count,
                actual: args.len(),
            });
        }
        self.fields()
            .zip(args)
            .enumerate()
            .map(|(index, (field, arg))| {
                let bad = || SerializeError::InvalidArgument {
                    field: index,
                    value: arg.to_string(),
                    expected: field.kind,
                };
                match field.kind {
                    ValueKind::Str => Ok(Value::Str(arg.to_string())),
                    ValueKind::Int => arg.trim().parse().map(Value::Int).map_err(|_| bad()),
                    ValueKind::Float => arg.trim().parse().map(Value::Float).map_err(|_| bad()),
                }
            })
            .collect()
    }
}

impl fmt::Display for FormatSpec {
    /// Normalized form: length modifiers dropped, `%i`/`%u` shown as `%d`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => f.write_str(&text.replace('%', "%%"))?,
                Segment::Field(field) => {
                    f.write_str("%")?;
                    if let Some(width) = field.max_width.or(field.width) {
                        write!(f, "{width}")?;
                    }
                    if let Some(precision) = field.precision {
                        write!(f, ".{precision}")?;
                    }
                    write!(f, "{}", field.conversion())?;
                }
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for FormatSpec {
    type Err = SerializeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Option<usize> {
    let mut number: Option<usize> = None;
    while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
        let digit = c as usize - '0' as usize;
        number = Some(number.unwrap_or(0).saturating_mul(10).saturating_add(digit));
    }
    number
}

fn render_field(field: &FieldDescriptor, value: &Value, out: &mut String) {
    let rendered = match value {
        Value::Str(s) => {
            out.push_str(s);
            return;
        }
        Value::Int(v) => v.to_string(),
        Value::Float(v) => render_float(
            *v,
            field.style,
            field.precision.unwrap_or(DEFAULT_FLOAT_PRECISION),
            field.uppercase,
        ),
    };
    let width = field.width.unwrap_or(0);
    out.push_str(&format!("{rendered:>width$}"));
}

/// Render a float the way C's `printf` does for `%f`, `%e` and `%g`.
pub(crate) fn render_float(v: f64, style: FloatStyle, precision: usize, uppercase: bool) -> String {
    let text = if v.is_nan() {
        "nan".to_string()
    } else if v.is_infinite() {
        if v < 0.0 { "-inf" } else { "inf" }.to_string()
    } else {
        match style {
            FloatStyle::Fixed => format!("{v:.precision$}"),
            FloatStyle::Exponent => render_exponent(v, precision),
            FloatStyle::General => render_general(v, precision),
        }
    };
    if uppercase {
        text.to_ascii_uppercase()
    } else {
        text
    }
}

fn render_exponent(v: f64, precision: usize) -> String {
    let (mantissa, exponent) = split_exponent(v, precision);
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

/// Rust renders `3.14e0`; split that into mantissa text and exponent.
fn split_exponent(v: f64, precision: usize) -> (String, i32) {
    let text = format!("{v:.precision$e}");
    match text.split_once('e') {
        Some((mantissa, exp)) => (mantissa.to_string(), exp.parse().unwrap_or(0)),
        None => (text, 0),
    }
}

fn render_general(v: f64, precision: usize) -> String {
    let significant = precision.max(1);
    let (_, exponent) = split_exponent(v, significant - 1);

    if exponent < -4 || exponent >= significant as i32 {
        let (mantissa, exponent) = split_exponent(v, significant - 1);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{sign}{:02}",
            trim_fraction(&mantissa),
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (significant as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

/// A number field must not be followed by text its scanner would consume.
fn check_boundary(field: &FieldDescriptor, literal: &str) -> std::result::Result<(), String> {
    let Some(first) = literal.chars().next() else {
        return Ok(());
    };
    let continues = match field.kind {
        ValueKind::Str => false,
        ValueKind::Int => first.is_ascii_digit(),
        ValueKind::Float => first.is_ascii_digit() || matches!(first, '.' | 'e' | 'E'),
    };
    if continues {
        return Err(format!(
            "%{} field cannot be followed by {literal:?}",
            field.conversion()
        ));
    }
    Ok(())
}

fn scan_field(
    field: &FieldDescriptor,
    index: usize,
    text: &str,
    start: usize,
    following: Option<&str>,
) -> Result<(Value, usize)> {
    match field.kind {
        ValueKind::Str => {
            let rest = &text[start..];
            let len = match following {
                Some(literal) => rest.find(literal).ok_or_else(|| {
                    SerializeError::parse(start, format!("expected {literal:?} after string field"))
                })?,
                None => rest.len(),
            };
            let slice = &rest[..len];
            if let Some(max) = field.max_width {
                let chars = slice.chars().count();
                if chars > max {
                    return Err(SerializeError::StringTooLong {
                        field: index,
                        len: chars,
                        max,
                    });
                }
            }
            Ok((Value::Str(slice.to_string()), start + len))
        }
        ValueKind::Int => {
            let begin = skip_blanks(text, start);
            let end = scan_integer(text.as_bytes(), begin);
            let token = &text[begin..end];
            let value = token.parse::<i64>().map_err(|_| {
                SerializeError::parse(begin, format!("expected integer for field {index}"))
            })?;
            Ok((Value::Int(value), end))
        }
        ValueKind::Float => {
            let begin = skip_blanks(text, start);
            let end = scan_float(text.as_bytes(), begin);
            let token = &text[begin..end];
            let value = token.parse::<f64>().map_err(|_| {
                SerializeError::parse(begin, format!("expected float for field {index}"))
            })?;
            Ok((Value::Float(value), end))
        }
    }
}

fn skip_blanks(text: &str, start: usize) -> usize {
    let bytes = text.as_bytes();
    let mut pos = start;
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
        pos += 1;
    }
    pos
}

fn scan_sign(bytes: &[u8], pos: usize) -> usize {
    if pos < bytes.len() && matches!(bytes[pos], b'+' | b'-') {
        pos + 1
    } else {
        pos
    }
}

fn scan_digits(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        pos += 1;
    }
    pos
}

fn scan_integer(bytes: &[u8], start: usize) -> usize {
    let digits = scan_sign(bytes, start);
    let end = scan_digits(bytes, digits);
    if end == digits {
        start
    } else {
        end
    }
}

/// Longest prefix at `start` that reads as a C float literal.
fn scan_float(bytes: &[u8], start: usize) -> usize {
    let body = scan_sign(bytes, start);

    for word in ["infinity", "inf", "nan"] {
        let end = body + word.len();
        if end <= bytes.len() && bytes[body..end].eq_ignore_ascii_case(word.as_bytes()) {
            return end;
        }
    }

    let int_end = scan_digits(bytes, body);
    let mut end = int_end;
    let mut has_digits = int_end > body;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_end = scan_digits(bytes, end + 1);
        has_digits |= frac_end > end + 1;
        end = frac_end;
    }
    if !has_digits {
        return start;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let exp_digits = scan_sign(bytes, end + 1);
        let exp_end = scan_digits(bytes, exp_digits);
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    end
}
