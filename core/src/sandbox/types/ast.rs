//! AST for the analysis language

use serde::{Deserialize, Serialize};

/* ===================== Statements ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Stmt {
    Expr {
        expr: Expr,
    },
    /// `a = b = value`; every target receives the same value
    Assign {
        targets: Vec<Target>,
        value: Expr,
    },
    AugAssign {
        target: Target,
        op: BinaryOp,
        value: Expr,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
    },
    FunctionDef {
        name: String,
        params: Vec<Param>,
        body: Vec<Stmt>,
    },
    Return {
        value: Option<Expr>,
    },
    Import {
        names: Vec<ImportName>,
    },
    FromImport {
        module: String,
        names: Vec<ImportName>,
    },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    With {
        context: Expr,
        target: Option<Target>,
        body: Vec<Stmt>,
    },
    Raise {
        exc: Option<Expr>,
    },
    Del {
        targets: Vec<Target>,
    },
    Pass,
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportName {
    /// Dotted module path for `import`; member name (or `*`) for `from ... import`
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptHandler {
    /// Exception class expression (`KeyError`, `(KeyError, ValueError)`); None catches all
    pub kind: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
}

/// Assignment target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Target {
    Name { name: String },
    Tuple { items: Vec<Target> },
    Subscript { object: Expr, index: Expr },
    Attribute { object: Expr, attr: String },
}

/* ===================== Expressions ===================== */

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum FStringPart {
    Text {
        text: String,
    },
    Field {
        expr: Expr,
        /// `!r` / `!s` conversion
        conversion: Option<char>,
        spec: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    Invert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    LShift,
    RShift,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::LShift => "<<",
            BinaryOp::RShift => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompKind {
    List,
    Generator,
    Dict,
}

/// One `for target in iter if cond ...` clause of a comprehension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompFor {
    pub target: Target,
    pub iter: Expr,
    pub conds: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Arg {
    Positional(Expr),
    Keyword(String, Expr),
    /// `*iterable`
    Splat(Expr),
    /// `**mapping`
    KwSplat(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Expr {
    Lit {
        v: Literal,
    },
    FString {
        parts: Vec<FStringPart>,
    },
    Ident {
        name: String,
    },
    List {
        items: Vec<Expr>,
    },
    Tuple {
        items: Vec<Expr>,
    },
    Dict {
        items: Vec<(Expr, Expr)>,
    },
    Attr {
        object: Box<Expr>,
        attr: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Arg>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Bool {
        op: BoolOp,
        values: Vec<Expr>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Comp {
        kind: CompKind,
        element: Box<Expr>,
        /// Value expression for dict comprehensions
        value: Option<Box<Expr>>,
        clauses: Vec<CompFor>,
    },
}

impl Expr {
    pub fn ident(name: &str) -> Expr {
        Expr::Ident {
            name: name.to_string(),
        }
    }

    pub fn lit(v: Literal) -> Expr {
        Expr::Lit { v }
    }
}
