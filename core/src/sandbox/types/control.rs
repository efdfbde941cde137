//! Control flow signals between statements

use super::values::Val;

/// How a statement finished
///
/// Exceptions travel separately as `Unwind`; this only covers the structured
/// exits that loops and function calls consume.
#[derive(Debug, Clone)]
pub enum Control {
    None,
    Break,
    Continue,
    Return(Val),
}

impl Control {
    pub fn is_none(&self) -> bool {
        matches!(self, Control::None)
    }
}
