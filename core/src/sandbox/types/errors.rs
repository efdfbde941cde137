//! Exceptions raised by analysis code, and the sandbox's own error type

use std::fmt;

/* ===================== Exceptions ===================== */

/// Exception classes visible to analysis code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcKind {
    Exception,
    SyntaxError,
    IndentationError,
    NameError,
    TypeError,
    ValueError,
    LookupError,
    KeyError,
    IndexError,
    AttributeError,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    ImportError,
    ModuleNotFoundError,
    RuntimeError,
    NotImplementedError,
    AssertionError,
    StopIteration,
}

impl ExcKind {
    pub const ALL: [ExcKind; 19] = [
        ExcKind::Exception,
        ExcKind::SyntaxError,
        ExcKind::IndentationError,
        ExcKind::NameError,
        ExcKind::TypeError,
        ExcKind::ValueError,
        ExcKind::LookupError,
        ExcKind::KeyError,
        ExcKind::IndexError,
        ExcKind::AttributeError,
        ExcKind::ArithmeticError,
        ExcKind::ZeroDivisionError,
        ExcKind::OverflowError,
        ExcKind::ImportError,
        ExcKind::ModuleNotFoundError,
        ExcKind::RuntimeError,
        ExcKind::NotImplementedError,
        ExcKind::AssertionError,
        ExcKind::StopIteration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExcKind::Exception => "Exception",
            ExcKind::SyntaxError => "SyntaxError",
            ExcKind::IndentationError => "IndentationError",
            ExcKind::NameError => "NameError",
            ExcKind::TypeError => "TypeError",
            ExcKind::ValueError => "ValueError",
            ExcKind::LookupError => "LookupError",
            ExcKind::KeyError => "KeyError",
            ExcKind::IndexError => "IndexError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::ArithmeticError => "ArithmeticError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
            ExcKind::OverflowError => "OverflowError",
            ExcKind::ImportError => "ImportError",
            ExcKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::NotImplementedError => "NotImplementedError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::StopIteration => "StopIteration",
        }
    }

    pub fn from_name(name: &str) -> Option<ExcKind> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }

    fn parent(&self) -> Option<ExcKind> {
        match self {
            ExcKind::Exception => None,
            ExcKind::IndentationError => Some(ExcKind::SyntaxError),
            ExcKind::KeyError | ExcKind::IndexError => Some(ExcKind::LookupError),
            ExcKind::ZeroDivisionError | ExcKind::OverflowError => Some(ExcKind::ArithmeticError),
            ExcKind::ModuleNotFoundError => Some(ExcKind::ImportError),
            ExcKind::NotImplementedError => Some(ExcKind::RuntimeError),
            _ => Some(ExcKind::Exception),
        }
    }

    /// `except <handler>` catches `self`
    pub fn is_subclass_of(&self, handler: ExcKind) -> bool {
        let mut current = Some(*self);
        while let Some(kind) = current {
            if kind == handler {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// A raised exception
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: ExcKind,
    /// `str(e)`; for KeyError this is already the repr of the missing key
    pub message: String,
}

impl Exception {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        Exception {
            kind,
            message: message.into(),
        }
    }

    pub fn key_error(key: &str) -> Self {
        Exception::new(ExcKind::KeyError, py_str_repr(key))
    }

    /// `repr(e)`, e.g. `KeyError('pace')` or `NameError("name 'x' is not defined")`
    pub fn repr(&self) -> String {
        match self.kind {
            ExcKind::KeyError => format!("KeyError({})", self.message),
            _ if self.message.is_empty() => format!("{}()", self.kind.name()),
            _ => format!("{}({})", self.kind.name(), py_str_repr(&self.message)),
        }
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

/// Python's `repr()` of a string: single quotes unless the text contains one
pub fn py_str_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/* ===================== Sandbox Errors ===================== */

/// Why an execution did not complete
///
/// `Raised` is an ordinary exception escaping the program; the other variants
/// are limits enforced by the sandbox and cannot be caught by `try`.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecError {
    #[error("{}", .0.repr())]
    Raised(Exception),

    #[error("TimeoutError('code execution exceeded {limit_ms} ms')")]
    Timeout { limit_ms: u64 },

    #[error("RuntimeError('execution step budget of {limit} exhausted')")]
    StepLimit { limit: u64 },

    #[error("MemoryError('collection of {size} elements exceeds the limit of {limit}')")]
    CollectionLimit { size: usize, limit: usize },

    #[error("RecursionError('maximum recursion depth of {limit} exceeded')")]
    RecursionLimit { limit: usize },

    #[error("RuntimeError('execution cancelled')")]
    Cancelled,

    #[error("RuntimeError('sandbox worker failed: {0}')")]
    Internal(String),
}

impl ExecError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }
}

/// Non-local exit from evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum Unwind {
    /// Catchable exception
    Raise(Exception),
    /// Limit violation; never caught by analysis code
    Halt(ExecError),
}

impl From<Exception> for Unwind {
    fn from(exc: Exception) -> Self {
        Unwind::Raise(exc)
    }
}

pub type EvalResult<T> = Result<T, Unwind>;

/// Shorthand for raising an exception from interpreter code
pub fn raise<T>(kind: ExcKind, message: impl Into<String>) -> EvalResult<T> {
    Err(Unwind::Raise(Exception::new(kind, message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_error_repr() {
        assert_eq!(Exception::key_error("pace").repr(), "KeyError('pace')");
    }

    #[test]
    fn test_repr_switches_quotes() {
        let exc = Exception::new(ExcKind::NameError, "name 'x' is not defined");
        assert_eq!(exc.repr(), "NameError(\"name 'x' is not defined\")");
    }

    #[test]
    fn test_hierarchy() {
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::LookupError));
        assert!(ExcKind::KeyError.is_subclass_of(ExcKind::Exception));
        assert!(!ExcKind::KeyError.is_subclass_of(ExcKind::ValueError));
        assert!(ExcKind::ModuleNotFoundError.is_subclass_of(ExcKind::ImportError));
    }

    #[test]
    fn test_limit_errors_render_as_python_exceptions() {
        let err = ExecError::Timeout { limit_ms: 500 };
        assert_eq!(
            err.to_string(),
            "TimeoutError('code execution exceeded 500 ms')"
        );
        assert!(err.is_timeout());
    }
}
