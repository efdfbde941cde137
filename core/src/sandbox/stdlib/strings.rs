//! String methods and the three formatting mini-languages
//! (`format` specs, `str.format` fields, `%` interpolation)

use super::{datetime, Args};
use crate::sandbox::interpreter::Interpreter;
use crate::sandbox::types::errors::py_str_repr;
use crate::sandbox::types::{raise, EvalResult, ExcKind, Val};
use crate::table::format::py_float;

/* ===================== Format Specs ===================== */

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> EvalResult<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
        out.sign = Some(chars[i]);
        i += 1;
    }
    if i < chars.len() && chars[i] == '#' {
        out.alternate = true;
        i += 1;
    }
    if i < chars.len() && chars[i] == '0' {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i > start {
        out.width = chars[start..i].iter().collect::<String>().parse().unwrap_or(0);
    }
    if i < chars.len() && matches!(chars[i], ',' | '_') {
        out.grouping = Some(chars[i]);
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        i += 1;
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        out.precision = Some(chars[start..i].iter().collect::<String>().parse().unwrap_or(0));
    }
    if i < chars.len() {
        out.kind = Some(chars[i]);
        i += 1;
    }
    if i != chars.len() {
        return raise(ExcKind::ValueError, "Invalid format specifier");
    }
    Ok(out)
}

/// `format(value, spec)`, used by f-strings and `str.format`
pub fn format_value(value: &Val, spec: &str) -> EvalResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    // datetime specs are strftime patterns
    match value {
        Val::Time(t) if spec.contains('%') => return datetime::strftime(t, spec),
        Val::Date(d) if spec.contains('%') => {
            return datetime::strftime(&crate::table::midnight(*d), spec)
        }
        _ => {}
    }

    let spec = parse_spec(spec)?;
    let (body, numeric) = match value {
        Val::Int(_) | Val::Bool(_) | Val::Float(_) => (format_number(value, &spec)?, true),
        Val::Str(s) => {
            if let Some(kind) = spec.kind.filter(|k| *k != 's') {
                return raise(
                    ExcKind::ValueError,
                    format!("Unknown format code '{}' for object of type 'str'", kind),
                );
            }
            let text = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            (text, false)
        }
        Val::None if spec.kind.is_some() => {
            return raise(
                ExcKind::TypeError,
                "unsupported format string passed to NoneType.__format__",
            )
        }
        other => (other.to_str(), false),
    };
    Ok(pad(&body, &spec, numeric))
}

fn pad(body: &str, spec: &Spec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body.to_string();
    }
    let fill_count = spec.width - len;
    let zero_pad = spec.zero && spec.align.is_none() && numeric;
    let fill = if zero_pad { '0' } else { spec.fill.unwrap_or(' ') };
    let align = if zero_pad {
        '='
    } else {
        spec.align.unwrap_or(if numeric { '>' } else { '<' })
    };
    let filler = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{}{}", body, filler(fill_count)),
        '^' => {
            let left = fill_count / 2;
            format!("{}{}{}", filler(left), body, filler(fill_count - left))
        }
        '=' => {
            let (sign, digits) = match body.chars().next() {
                Some(c @ ('-' | '+' | ' ')) => (c.to_string(), &body[1..]),
                _ => (String::new(), body),
            };
            format!("{}{}{}", sign, filler(fill_count), digits)
        }
        _ => format!("{}{}", filler(fill_count), body),
    }
}

fn format_number(value: &Val, spec: &Spec) -> EvalResult<String> {
    let is_int = matches!(value, Val::Int(_) | Val::Bool(_));
    let x = value.as_f64().unwrap_or(0.0);
    let kind = spec.kind;

    let mut body = match kind {
        Some('d') | Some('n') if is_int => value.as_i64().unwrap_or(0).unsigned_abs().to_string(),
        Some('d') => {
            return raise(
                ExcKind::ValueError,
                "Unknown format code 'd' for object of type 'float'",
            )
        }
        Some('x') | Some('X') | Some('o') | Some('b') if is_int => {
            let n = value.as_i64().unwrap_or(0).unsigned_abs();
            let text = match kind {
                Some('x') => format!("{:x}", n),
                Some('X') => format!("{:X}", n),
                Some('o') => format!("{:o}", n),
                _ => format!("{:b}", n),
            };
            if spec.alternate {
                format!("0{}{}", kind.unwrap_or('x').to_ascii_lowercase(), text)
            } else {
                text
            }
        }
        Some('f') | Some('F') => fixed(x.abs(), spec.precision.unwrap_or(6)),
        Some('e') | Some('E') => {
            let text = scientific(x.abs(), spec.precision.unwrap_or(6));
            if kind == Some('E') {
                text.to_uppercase()
            } else {
                text
            }
        }
        Some('g') | Some('G') => general(x.abs(), spec.precision.unwrap_or(6), spec.alternate),
        Some('%') => format!("{}%", fixed(x.abs() * 100.0, spec.precision.unwrap_or(6))),
        None if is_int => value.as_i64().unwrap_or(0).unsigned_abs().to_string(),
        None => match spec.precision {
            Some(p) => general(x.abs(), p.max(1), false),
            None => py_float(x.abs()),
        },
        Some(other) => {
            return raise(
                ExcKind::ValueError,
                format!(
                    "Unknown format code '{}' for object of type '{}'",
                    other,
                    value.type_name()
                ),
            )
        }
    };

    if let Some(separator) = spec.grouping {
        body = group_thousands(&body, separator);
    }
    let negative = x < 0.0 || (x == 0.0 && x.is_sign_negative() && !is_int);
    let sign = match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    };
    Ok(format!("{}{}", sign, body))
}

fn fixed(x: f64, precision: usize) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return "inf".to_string();
    }
    format!("{:.*}", precision, x)
}

fn scientific(x: f64, precision: usize) -> String {
    if !x.is_finite() {
        return fixed(x, 0);
    }
    let text = format!("{:.*e}", precision, x);
    let (mantissa, exponent) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    format!(
        "{}e{}{:02}",
        mantissa,
        if exponent < 0 { '-' } else { '+' },
        exponent.abs()
    )
}

fn general(x: f64, precision: usize, alternate: bool) -> String {
    if !x.is_finite() {
        return fixed(x, 0);
    }
    let precision = precision.max(1);
    if x == 0.0 {
        return if alternate {
            format!("{:.*}", precision - 1, 0.0)
        } else {
            "0".to_string()
        };
    }
    let sci = format!("{:.*e}", precision - 1, x);
    let exponent: i32 = sci
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);
    let text = if exponent >= -4 && exponent < precision as i32 {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        format!("{:.*}", decimals, x)
    } else {
        scientific(x, precision - 1)
    };
    if alternate {
        return text;
    }
    strip_zeros(&text)
}

fn strip_zeros(text: &str) -> String {
    let (number, exponent) = match text.find('e') {
        Some(pos) => (&text[..pos], &text[pos..]),
        None => (text, ""),
    };
    let number = if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    };
    format!("{}{}", number, exponent)
}

fn group_thousands(body: &str, separator: char) -> String {
    let (int_part, rest) = match body.find(|c: char| !c.is_ascii_digit()) {
        Some(pos) => (&body[..pos], &body[pos..]),
        None => (body, ""),
    };
    let digits: Vec<char> = int_part.chars().collect();
    let mut out = String::with_capacity(body.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(*c);
    }
    out.push_str(rest);
    out
}

/* ===================== str.format ===================== */

fn format_fields(template: &str, args: &Args) -> EvalResult<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                let mut depth = 0;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' if depth == 0 => break,
                        '}' => depth -= 1,
                        _ => {}
                    }
                    field.push(c);
                }
                let (head, spec) = match field.split_once(':') {
                    Some((head, spec)) => (head.to_string(), spec.to_string()),
                    None => (field.clone(), String::new()),
                };
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conv)) => (name.to_string(), conv.chars().next()),
                    None => (head, None),
                };
                let value = if name.is_empty() {
                    auto += 1;
                    args.positional.get(auto - 1).cloned()
                } else if let Ok(pos) = name.parse::<usize>() {
                    args.positional.get(pos).cloned()
                } else {
                    args.kw(&name).cloned()
                };
                let Some(value) = value else {
                    if name.is_empty() || name.parse::<usize>().is_ok() {
                        return raise(
                            ExcKind::IndexError,
                            "Replacement index out of range for positional args tuple",
                        );
                    }
                    return raise(ExcKind::KeyError, py_str_repr(&name));
                };
                let value = match conversion {
                    Some('r') => Val::Str(value.repr()),
                    Some(_) => Val::Str(value.to_str()),
                    None => value,
                };
                out.push_str(&format_value(&value, &spec)?);
            }
            '}' => return raise(ExcKind::ValueError, "Single '}' encountered in format string"),
            c => out.push(c),
        }
    }
    Ok(out)
}

/* ===================== % Interpolation ===================== */

pub fn percent_format(template: &str, args: &Val) -> EvalResult<String> {
    let positional: Vec<Val> = match args {
        Val::Tuple(items) => items.as_ref().clone(),
        Val::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mut next = positional.into_iter();
    let mut out = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }
        let mut key = None;
        if chars.peek() == Some(&'(') {
            chars.next();
            let name: String = chars.by_ref().take_while(|c| *c != ')').collect();
            key = Some(name);
        }
        let mut spec = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | ' ' | '#') {
                spec.push(c);
                chars.next();
            } else {
                break;
            }
        }
        let Some(conversion) = chars.next() else {
            return raise(ExcKind::ValueError, "incomplete format");
        };
        let value = match &key {
            Some(name) => match args {
                Val::Dict(entries) => super::builtins::dict_get(entries, &Val::Str(name.clone()))
                    .ok_or_else(|| {
                        crate::sandbox::types::Unwind::from(
                            crate::sandbox::types::Exception::key_error(name),
                        )
                    })?,
                _ => return raise(ExcKind::TypeError, "format requires a mapping"),
            },
            None => match next.next() {
                Some(value) => value,
                None => {
                    return raise(
                        ExcKind::TypeError,
                        "not enough arguments for format string",
                    )
                }
            },
        };
        // "-10" means left-aligned in %-style
        let std_spec = match spec.strip_prefix('-') {
            Some(rest) => format!("<{}", rest),
            None => spec.clone(),
        };
        let rendered = match conversion {
            's' => format_value(&Val::Str(value.to_str()), &std_spec)?,
            'r' => format_value(&Val::Str(value.repr()), &std_spec)?,
            'd' | 'i' | 'u' => {
                let n = super::builtins::to_int(&value)?;
                format_value(&n, &format!("{}d", std_spec))?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x' | 'X' | 'o' => {
                let std_spec = if spec.contains('.') || !"fFeE".contains(conversion) {
                    std_spec
                } else {
                    format!("{}.6", std_spec)
                };
                format_value(&value, &format!("{}{}", std_spec, conversion))?
            }
            other => {
                return raise(
                    ExcKind::ValueError,
                    format!("unsupported format character '{}'", other),
                )
            }
        };
        out.push_str(&rendered);
    }
    Ok(out)
}

/* ===================== Methods ===================== */

const METHODS: [&str; 44] = [
    "upper", "lower", "title", "capitalize", "swapcase", "casefold", "strip", "lstrip", "rstrip",
    "split", "rsplit", "splitlines", "join", "replace", "startswith", "endswith", "find",
    "rfind", "index", "count", "format", "isdigit", "isnumeric", "isdecimal", "isalpha",
    "isalnum", "isspace", "isupper", "islower", "istitle", "zfill", "center", "ljust", "rjust",
    "partition", "rpartition", "removeprefix", "removesuffix", "encode", "decode", "expandtabs",
    "rindex", "__len__", "format_map",
];

pub fn has_method(name: &str) -> bool {
    METHODS.contains(&name)
}

fn strip_set<'a>(s: &'a str, chars: &Option<String>, left: bool, right: bool) -> &'a str {
    let matches = |c: char| match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    let mut out = s;
    if left {
        out = out.trim_start_matches(matches);
    }
    if right {
        out = out.trim_end_matches(matches);
    }
    out
}

fn affix_matches(
    s: &str,
    value: &Val,
    check: impl Fn(&str, &str) -> bool,
) -> EvalResult<bool> {
    match value {
        Val::Str(p) => Ok(check(s, p)),
        Val::Tuple(items) => Ok(items
            .iter()
            .any(|v| v.as_str().map(|p| check(s, p)).unwrap_or(false))),
        other => raise(
            ExcKind::TypeError,
            format!(
                "startswith first arg must be str or a tuple of str, not {}",
                other.type_name()
            ),
        ),
    }
}

pub fn call_method(
    interp: &mut Interpreter,
    s: &str,
    name: &str,
    args: Args,
) -> EvalResult<Val> {
    let text = |t: String| Ok(Val::Str(t));
    match name {
        "upper" => text(s.to_uppercase()),
        "lower" | "casefold" => text(s.to_lowercase()),
        "swapcase" => text(
            s.chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<String>()
                    } else {
                        c.to_uppercase().collect::<String>()
                    }
                })
                .collect(),
        ),
        "title" => text(title_case(s)),
        "capitalize" => {
            let mut chars = s.chars();
            text(match chars.next() {
                Some(first) => format!(
                    "{}{}",
                    first.to_uppercase(),
                    chars.as_str().to_lowercase()
                ),
                None => String::new(),
            })
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = args.str_opt(0, "chars")?;
            text(strip_set(s, &chars, name != "rstrip", name != "lstrip").to_string())
        }
        "split" | "rsplit" => {
            let sep = args.str_opt(0, "sep")?;
            let maxsplit = args.int_opt(1, "maxsplit")?.unwrap_or(-1);
            let parts = split(s, sep.as_deref(), maxsplit, name == "rsplit")?;
            Ok(Val::list(parts.into_iter().map(Val::Str).collect()))
        }
        "splitlines" => Ok(Val::list(s.lines().map(Val::str).collect())),
        "join" => {
            let items = interp.iterate(args.required(0, "iterable", "join")?)?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Val::Str(part) => parts.push(part.clone()),
                    other => {
                        return raise(
                            ExcKind::TypeError,
                            format!(
                                "sequence item {}: expected str instance, {} found",
                                i,
                                other.type_name()
                            ),
                        )
                    }
                }
            }
            text(parts.join(s))
        }
        "replace" => {
            let old = args.str_opt(0, "old")?.unwrap_or_default();
            let new = args.str_opt(1, "new")?.unwrap_or_default();
            match args.int_opt(2, "count")? {
                Some(n) if n >= 0 => text(s.replacen(&old, &new, n as usize)),
                _ => text(s.replace(&old, &new)),
            }
        }
        "startswith" => affix_matches(s, args.required(0, "prefix", name)?, |s, p| {
            s.starts_with(p)
        })
        .map(Val::Bool),
        "endswith" => affix_matches(s, args.required(0, "suffix", name)?, |s, p| {
            s.ends_with(p)
        })
        .map(Val::Bool),
        "find" | "rfind" | "index" | "rindex" => {
            let needle = args.str_opt(0, "sub")?.unwrap_or_default();
            let found = if name.starts_with('r') {
                s.rfind(&needle)
            } else {
                s.find(&needle)
            };
            match found {
                Some(byte) => Ok(Val::Int(s[..byte].chars().count() as i64)),
                None if name.ends_with("index") => raise(ExcKind::ValueError, "substring not found"),
                None => Ok(Val::Int(-1)),
            }
        }
        "count" => {
            let needle = args.str_opt(0, "sub")?.unwrap_or_default();
            if needle.is_empty() {
                return Ok(Val::Int(s.chars().count() as i64 + 1));
            }
            Ok(Val::Int(s.matches(&needle).count() as i64))
        }
        "format" => format_fields(s, &args).map(Val::Str),
        "format_map" => {
            let mut mapped = Args::default();
            if let Some(Val::Dict(entries)) = args.positional.first() {
                for (k, v) in entries.borrow().iter() {
                    mapped.keywords.push((k.to_str(), v.clone()));
                }
            }
            format_fields(s, &mapped).map(Val::Str)
        }
        "isdigit" | "isnumeric" | "isdecimal" => Ok(Val::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()),
        )),
        "isalpha" => Ok(Val::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => Ok(Val::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))),
        "isspace" => Ok(Val::Bool(!s.is_empty() && s.chars().all(char::is_whitespace))),
        "isupper" => Ok(Val::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase),
        )),
        "islower" => Ok(Val::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase),
        )),
        "istitle" => Ok(Val::Bool(!s.is_empty() && title_case(s) == s)),
        "zfill" => {
            let width = args.usize_or(0, "width", 0)?;
            text(pad(s, &Spec { width, zero: true, ..Spec::default() }, true))
        }
        "center" | "ljust" | "rjust" => {
            let width = args.usize_or(0, "width", 0)?;
            let fill = args.str_opt(1, "fillchar")?.and_then(|f| f.chars().next());
            let align = match name {
                "center" => '^',
                "ljust" => '<',
                _ => '>',
            };
            let spec = Spec {
                fill,
                align: Some(align),
                width,
                ..Spec::default()
            };
            text(pad(s, &spec, false))
        }
        "partition" | "rpartition" => {
            let sep = args.str_opt(0, "sep")?.unwrap_or_default();
            let found = if name == "partition" {
                s.find(&sep)
            } else {
                s.rfind(&sep)
            };
            let parts = match found {
                Some(pos) => vec![&s[..pos], sep.as_str(), &s[pos + sep.len()..]],
                None if name == "partition" => vec![s, "", ""],
                None => vec!["", "", s],
            };
            Ok(Val::tuple(parts.into_iter().map(Val::str).collect()))
        }
        "removeprefix" => {
            let prefix = args.str_opt(0, "prefix")?.unwrap_or_default();
            text(s.strip_prefix(prefix.as_str()).unwrap_or(s).to_string())
        }
        "removesuffix" => {
            let suffix = args.str_opt(0, "suffix")?.unwrap_or_default();
            text(s.strip_suffix(suffix.as_str()).unwrap_or(s).to_string())
        }
        "expandtabs" => text(s.replace('\t', "        ")),
        "encode" | "decode" => text(s.to_string()),
        "__len__" => Ok(Val::Int(s.chars().count() as i64)),
        _ => super::no_attribute(&Val::str(s), name),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            start = false;
        } else {
            out.push(c);
            start = true;
        }
    }
    out
}

fn split(s: &str, sep: Option<&str>, maxsplit: i64, from_right: bool) -> EvalResult<Vec<String>> {
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize };
    match sep {
        Some("") => raise(ExcKind::ValueError, "empty separator"),
        Some(sep) => {
            let parts: Vec<String> = if from_right {
                let mut parts: Vec<String> =
                    s.rsplitn(limit.saturating_add(1), sep).map(String::from).collect();
                parts.reverse();
                parts
            } else {
                s.splitn(limit.saturating_add(1), sep).map(String::from).collect()
            };
            Ok(parts)
        }
        None => {
            let words: Vec<&str> = s.split_whitespace().collect();
            if words.len() <= limit.saturating_add(1) || limit == usize::MAX {
                return Ok(words.into_iter().map(String::from).collect());
            }
            if from_right {
                let keep = words.len() - limit;
                let mut out = vec![words[..keep].join(" ")];
                out.extend(words[keep..].iter().map(|w| w.to_string()));
                Ok(out)
            } else {
                let mut out: Vec<String> = words[..limit].iter().map(|w| w.to_string()).collect();
                out.push(words[limit..].join(" "));
                Ok(out)
            }
        }
    }
}
