//! PEST-based parser for the analysis language
//!
//! Source text goes through the layout pass first (indentation → markers),
//! then through the grammar in `analysis.pest`, and the resulting pairs are
//! built into the AST in `types::ast`.

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::types::ast::{
    Arg, BinaryOp, BoolOp, CompFor, CompKind, CompareOp, ExceptHandler, Expr, FStringPart,
    ImportName, Literal, Param, Stmt, Target, UnaryOp,
};

pub mod layout;

#[cfg(test)]
mod tests;

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "sandbox/parser/analysis.pest"]
struct AnalysisParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid syntax (line {line}): {message}")]
    Syntax { message: String, line: usize },

    #[error("{message} (line {line})")]
    Indentation { message: String, line: usize },

    #[error("invalid syntax: {0}")]
    Build(String),
}

impl ParseError {
    /// Python exception class this error surfaces as
    pub fn kind_name(&self) -> &'static str {
        match self {
            ParseError::Indentation { .. } => "IndentationError",
            _ => "SyntaxError",
        }
    }

    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Syntax { line, .. } | ParseError::Indentation { line, .. } => Some(*line),
            ParseError::Build(_) => None,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

fn pest_error(err: pest::error::Error<Rule>, laid_out: &layout::Layout) -> ParseError {
    let logical = match err.line_col {
        pest::error::LineColLocation::Pos((line, _)) => line,
        pest::error::LineColLocation::Span((line, _), _) => line,
    };
    let found = err.line().replace(layout::INDENT, "").replace(layout::DEDENT, "");
    ParseError::Syntax {
        message: format!("near `{}`", found.trim()),
        line: laid_out.source_line(logical),
    }
}

/* ===================== Public API ===================== */

/// Parse a program into its top-level statements
pub fn parse_program(source: &str) -> ParseResult<Vec<Stmt>> {
    let laid_out = layout::layout(source)?;
    let mut pairs = AnalysisParser::parse(Rule::program, &laid_out.text)
        .map_err(|err| pest_error(err, &laid_out))?;
    let program = next(&mut pairs, "program")?;

    let mut body = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::EOI {
            continue;
        }
        body.push(build_statement(pair)?);
    }
    Ok(body)
}

/// Parse a single expression (used for f-string fields)
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let mut pairs = AnalysisParser::parse(Rule::fstring_field, source.trim()).map_err(|err| {
        ParseError::Build(format!("invalid expression `{}`: {}", source.trim(), err.variant.message()))
    })?;
    let field = next(&mut pairs, "expression")?;
    let mut inner = field.into_inner();
    build_expr(next(&mut inner, "expression")?)
}

/* ===================== Pair Helpers ===================== */

fn next<'a>(pairs: &mut Pairs<'a, Rule>, what: &str) -> ParseResult<Pair<'a, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::Build(format!("expected {}", what)))
}

fn next_sig<'a>(
    pairs: &mut impl Iterator<Item = Pair<'a, Rule>>,
    what: &str,
) -> ParseResult<Pair<'a, Rule>> {
    pairs
        .next()
        .ok_or_else(|| ParseError::Build(format!("expected {}", what)))
}

/// Keyword tokens carry no information once the enclosing rule is known
fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_and
            | Rule::kw_as
            | Rule::kw_break
            | Rule::kw_continue
            | Rule::kw_def
            | Rule::kw_del
            | Rule::kw_elif
            | Rule::kw_else
            | Rule::kw_except
            | Rule::kw_finally
            | Rule::kw_for
            | Rule::kw_from
            | Rule::kw_if
            | Rule::kw_import
            | Rule::kw_in
            | Rule::kw_is
            | Rule::kw_lambda
            | Rule::kw_not
            | Rule::kw_or
            | Rule::kw_pass
            | Rule::kw_raise
            | Rule::kw_return
            | Rule::kw_try
            | Rule::kw_while
            | Rule::kw_with
    )
}

fn significant(pair: Pair<'_, Rule>) -> impl Iterator<Item = Pair<'_, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

/* ===================== Statements ===================== */

fn build_statement(pair: Pair<Rule>) -> ParseResult<Stmt> {
    match pair.as_rule() {
        Rule::expr_stmt => {
            let mut inner = pair.into_inner();
            let expr = build_expression_list(next(&mut inner, "expression")?)?;
            Ok(Stmt::Expr { expr })
        }
        Rule::assign_stmt => {
            let mut parts: Vec<Pair<Rule>> = pair.into_inner().collect();
            let value = parts
                .pop()
                .ok_or_else(|| ParseError::Build("assignment without value".to_string()))?;
            let value = build_expression_list(value)?;
            let targets = parts
                .into_iter()
                .map(build_target_list)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Stmt::Assign { targets, value })
        }
        Rule::aug_assign_stmt => {
            let mut inner = pair.into_inner();
            let target = build_target(next(&mut inner, "target")?)?;
            let op = match next(&mut inner, "operator")?.as_str() {
                "+=" => BinaryOp::Add,
                "-=" => BinaryOp::Sub,
                "*=" => BinaryOp::Mul,
                "/=" => BinaryOp::Div,
                "//=" => BinaryOp::FloorDiv,
                "%=" => BinaryOp::Mod,
                "**=" => BinaryOp::Pow,
                "&=" => BinaryOp::BitAnd,
                "|=" => BinaryOp::BitOr,
                "^=" => BinaryOp::BitXor,
                "<<=" => BinaryOp::LShift,
                ">>=" => BinaryOp::RShift,
                other => return Err(ParseError::Build(format!("unknown operator {}", other))),
            };
            let value = build_expression_list(next(&mut inner, "value")?)?;
            Ok(Stmt::AugAssign { target, op, value })
        }
        Rule::return_stmt => {
            let value = significant(pair).next().map(build_expression_list).transpose()?;
            Ok(Stmt::Return { value })
        }
        Rule::raise_stmt => {
            let exc = significant(pair).next().map(build_expr).transpose()?;
            Ok(Stmt::Raise { exc })
        }
        Rule::del_stmt => {
            let list = next_sig(&mut significant(pair), "target")?;
            let targets = list
                .into_inner()
                .map(build_target)
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Stmt::Del { targets })
        }
        Rule::pass_stmt => Ok(Stmt::Pass),
        Rule::break_stmt => Ok(Stmt::Break),
        Rule::continue_stmt => Ok(Stmt::Continue),
        Rule::import_stmt => {
            let mut names = Vec::new();
            for item in significant(pair) {
                let mut parts = significant(item);
                let module = next_sig(&mut parts, "module")?.as_str().to_string();
                let alias = parts.next().map(|p| p.as_str().to_string());
                names.push(ImportName {
                    name: module,
                    alias,
                });
            }
            Ok(Stmt::Import { names })
        }
        Rule::from_import_stmt => {
            let mut inner = significant(pair);
            let module = next_sig(&mut inner, "module")?.as_str().to_string();
            let list = next_sig(&mut inner, "names")?;
            let mut names = Vec::new();
            for item in list.into_inner() {
                let mut parts = significant(item);
                let name = next_sig(&mut parts, "name")?.as_str().to_string();
                let alias = parts.next().map(|p| p.as_str().to_string());
                names.push(ImportName { name, alias });
            }
            Ok(Stmt::FromImport { module, names })
        }
        Rule::if_stmt => build_if_stmt(pair),
        Rule::for_stmt => {
            let mut inner = significant(pair);
            let target = build_target_list(next_sig(&mut inner, "loop target")?)?;
            let iter = build_expression_list(next_sig(&mut inner, "iterable")?)?;
            let body = build_suite(next_sig(&mut inner, "loop body")?)?;
            Ok(Stmt::For { target, iter, body })
        }
        Rule::while_stmt => {
            let mut inner = significant(pair);
            let test = build_expr(next_sig(&mut inner, "condition")?)?;
            let body = build_suite(next_sig(&mut inner, "loop body")?)?;
            Ok(Stmt::While { test, body })
        }
        Rule::def_stmt => build_def_stmt(pair),
        Rule::try_stmt => build_try_stmt(pair),
        Rule::with_stmt => {
            let mut context = None;
            let mut target = None;
            let mut body = Vec::new();
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::expression => context = Some(build_expr(part)?),
                    Rule::target => target = Some(build_target(part)?),
                    Rule::suite => body = build_suite(part)?,
                    _ => {}
                }
            }
            let context =
                context.ok_or_else(|| ParseError::Build("with without context".to_string()))?;
            Ok(Stmt::With {
                context,
                target,
                body,
            })
        }
        other => Err(ParseError::Build(format!(
            "unexpected statement: {:?}",
            other
        ))),
    }
}

fn build_suite(pair: Pair<Rule>) -> ParseResult<Vec<Stmt>> {
    pair.into_inner().map(build_statement).collect()
}

fn build_if_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut inner = significant(pair);
    let test = build_expr(next_sig(&mut inner, "condition")?)?;
    let body = build_suite(next_sig(&mut inner, "if body")?)?;

    let mut elifs = Vec::new();
    let mut orelse = Vec::new();
    for clause in inner {
        match clause.as_rule() {
            Rule::elif_clause => {
                let mut parts = significant(clause);
                let elif_test = build_expr(next_sig(&mut parts, "condition")?)?;
                let elif_body = build_suite(next_sig(&mut parts, "elif body")?)?;
                elifs.push((elif_test, elif_body));
            }
            Rule::else_clause => {
                let mut parts = significant(clause);
                orelse = build_suite(next_sig(&mut parts, "else body")?)?;
            }
            _ => {}
        }
    }

    for (elif_test, elif_body) in elifs.into_iter().rev() {
        orelse = vec![Stmt::If {
            test: elif_test,
            body: elif_body,
            orelse,
        }];
    }

    Ok(Stmt::If { test, body, orelse })
}

fn build_def_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut name = String::new();
    let mut params = Vec::new();
    let mut body = Vec::new();

    for part in significant(pair) {
        match part.as_rule() {
            Rule::identifier => name = part.as_str().to_string(),
            Rule::param_list => {
                for param in part.into_inner() {
                    let mut inner = param.into_inner();
                    let param_name = next(&mut inner, "parameter")?.as_str().to_string();
                    let default = inner.next().map(build_expr).transpose()?;
                    params.push(Param {
                        name: param_name,
                        default,
                    });
                }
            }
            Rule::suite => body = build_suite(part)?,
            _ => {}
        }
    }

    Ok(Stmt::FunctionDef { name, params, body })
}

fn build_try_stmt(pair: Pair<Rule>) -> ParseResult<Stmt> {
    let mut inner = significant(pair);
    let body = build_suite(next_sig(&mut inner, "try body")?)?;
    let mut handlers = Vec::new();
    let mut orelse = Vec::new();
    let mut finalbody = Vec::new();

    for clause in inner {
        match clause.as_rule() {
            Rule::except_clause => {
                let mut kind = None;
                let mut name = None;
                let mut handler_body = Vec::new();
                for part in significant(clause) {
                    match part.as_rule() {
                        Rule::expression => kind = Some(build_expr(part)?),
                        Rule::identifier => name = Some(part.as_str().to_string()),
                        Rule::suite => handler_body = build_suite(part)?,
                        _ => {}
                    }
                }
                handlers.push(ExceptHandler {
                    kind,
                    name,
                    body: handler_body,
                });
            }
            Rule::else_clause => {
                orelse = build_suite(next_sig(&mut significant(clause), "else body")?)?;
            }
            Rule::finally_clause => {
                finalbody = build_suite(next_sig(&mut significant(clause), "finally body")?)?;
            }
            _ => {}
        }
    }

    Ok(Stmt::Try {
        body,
        handlers,
        orelse,
        finalbody,
    })
}

/* ===================== Targets ===================== */

fn build_target_list(pair: Pair<Rule>) -> ParseResult<Target> {
    let mut items = pair
        .into_inner()
        .map(build_target)
        .collect::<ParseResult<Vec<_>>>()?;
    if items.len() == 1 {
        if let Some(item) = items.pop() {
            return Ok(item);
        }
    }
    Ok(Target::Tuple { items })
}

fn build_target(pair: Pair<Rule>) -> ParseResult<Target> {
    let mut inner = pair.into_inner();
    let first = next(&mut inner, "target")?;
    match first.as_rule() {
        Rule::target_list => build_target_list(first),
        _ => expr_to_target(build_expr(first)?),
    }
}

fn expr_to_target(expr: Expr) -> ParseResult<Target> {
    match expr {
        Expr::Ident { name } => Ok(Target::Name { name }),
        Expr::Index { object, index } => Ok(Target::Subscript {
            object: *object,
            index: *index,
        }),
        Expr::Attr { object, attr } => Ok(Target::Attribute {
            object: *object,
            attr,
        }),
        Expr::Tuple { items } | Expr::List { items } => Ok(Target::Tuple {
            items: items
                .into_iter()
                .map(expr_to_target)
                .collect::<ParseResult<Vec<_>>>()?,
        }),
        _ => Err(ParseError::Build(
            "cannot assign to expression".to_string(),
        )),
    }
}

/* ===================== Expressions ===================== */

fn build_expression_list(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut items = Vec::new();
    let mut trailing = false;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::trailing_comma => trailing = true,
            _ => items.push(build_expr(part)?),
        }
    }
    if items.len() == 1 && !trailing {
        if let Some(item) = items.pop() {
            return Ok(item);
        }
    }
    Ok(Expr::Tuple { items })
}

fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |left, (op, right)| Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    })
}

fn build_expr(pair: Pair<Rule>) -> ParseResult<Expr> {
    match pair.as_rule() {
        Rule::expression | Rule::slice_lower | Rule::slice_upper | Rule::slice_step => {
            let mut inner = pair.into_inner();
            build_expr(next(&mut inner, "expression")?)
        }

        Rule::lambda_expr => {
            let mut params = Vec::new();
            let mut body = None;
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::lambda_params => {
                        params = part.into_inner().map(|p| p.as_str().to_string()).collect();
                    }
                    _ => body = Some(build_expr(part)?),
                }
            }
            let body = body.ok_or_else(|| ParseError::Build("lambda without body".to_string()))?;
            Ok(Expr::Lambda {
                params,
                body: Box::new(body),
            })
        }

        Rule::conditional => {
            let mut inner = significant(pair);
            let body = build_expr(next_sig(&mut inner, "expression")?)?;
            match inner.next() {
                None => Ok(body),
                Some(test) => {
                    let test = build_expr(test)?;
                    let orelse = build_expr(next_sig(&mut inner, "else branch")?)?;
                    Ok(Expr::IfExp {
                        test: Box::new(test),
                        body: Box::new(body),
                        orelse: Box::new(orelse),
                    })
                }
            }
        }

        Rule::or_test | Rule::and_test => {
            let op = if pair.as_rule() == Rule::or_test {
                BoolOp::Or
            } else {
                BoolOp::And
            };
            let mut values = significant(pair)
                .map(build_expr)
                .collect::<ParseResult<Vec<_>>>()?;
            if values.len() == 1 {
                if let Some(value) = values.pop() {
                    return Ok(value);
                }
            }
            Ok(Expr::Bool { op, values })
        }

        Rule::not_test => {
            let mut inner = pair.into_inner();
            let first = next(&mut inner, "operand")?;
            if first.as_rule() == Rule::kw_not {
                let operand = build_expr(next(&mut inner, "operand")?)?;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            } else {
                build_expr(first)
            }
        }

        Rule::comparison => {
            let mut inner = pair.into_inner();
            let left = build_expr(next(&mut inner, "operand")?)?;
            let mut rest = Vec::new();
            while let Some(op_pair) = inner.next() {
                let op = build_compare_op(&op_pair)?;
                let right = build_expr(next(&mut inner, "operand")?)?;
                rest.push((op, right));
            }
            if rest.is_empty() {
                return Ok(left);
            }
            Ok(Expr::Compare {
                left: Box::new(left),
                rest,
            })
        }

        Rule::bit_or | Rule::bit_xor | Rule::bit_and => {
            let op = match pair.as_rule() {
                Rule::bit_or => BinaryOp::BitOr,
                Rule::bit_xor => BinaryOp::BitXor,
                _ => BinaryOp::BitAnd,
            };
            let mut inner = pair.into_inner();
            let first = build_expr(next(&mut inner, "operand")?)?;
            let rest = inner
                .map(|p| -> ParseResult<(BinaryOp, Expr)> { Ok((op, build_expr(p)?)) })
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(fold_binary(first, rest))
        }

        Rule::shift | Rule::arith | Rule::term => {
            let mut inner = pair.into_inner();
            let first = build_expr(next(&mut inner, "operand")?)?;
            let mut rest = Vec::new();
            while let Some(op_pair) = inner.next() {
                let op = match op_pair.as_str().trim() {
                    "+" => BinaryOp::Add,
                    "-" => BinaryOp::Sub,
                    "*" => BinaryOp::Mul,
                    "/" => BinaryOp::Div,
                    "//" => BinaryOp::FloorDiv,
                    "%" => BinaryOp::Mod,
                    "<<" => BinaryOp::LShift,
                    ">>" => BinaryOp::RShift,
                    other => return Err(ParseError::Build(format!("unknown operator {}", other))),
                };
                rest.push((op, build_expr(next(&mut inner, "operand")?)?));
            }
            Ok(fold_binary(first, rest))
        }

        Rule::factor => {
            let mut inner = pair.into_inner();
            let first = next(&mut inner, "operand")?;
            if first.as_rule() != Rule::unary_op {
                return build_expr(first);
            }
            let operand = build_expr(next(&mut inner, "operand")?)?;
            let op = match first.as_str() {
                "-" => UnaryOp::Neg,
                "+" => UnaryOp::Pos,
                _ => UnaryOp::Invert,
            };
            Ok(match (op, operand) {
                (UnaryOp::Neg, Expr::Lit { v: Literal::Int(n) }) => Expr::lit(Literal::Int(-n)),
                (UnaryOp::Neg, Expr::Lit { v: Literal::Float(x) }) => {
                    Expr::lit(Literal::Float(-x))
                }
                (op, operand) => Expr::Unary {
                    op,
                    operand: Box::new(operand),
                },
            })
        }

        Rule::power => {
            let mut inner = pair.into_inner();
            let base = build_expr(next(&mut inner, "operand")?)?;
            match inner.next() {
                None => Ok(base),
                Some(exp) => Ok(Expr::Binary {
                    op: BinaryOp::Pow,
                    left: Box::new(base),
                    right: Box::new(build_expr(exp)?),
                }),
            }
        }

        Rule::postfix => build_postfix(pair),
        Rule::string_group => build_string_group(pair),
        Rule::number => build_number(pair.as_str()),
        Rule::kw_none => Ok(Expr::lit(Literal::None)),
        Rule::kw_true => Ok(Expr::lit(Literal::Bool(true))),
        Rule::kw_false => Ok(Expr::lit(Literal::Bool(false))),
        Rule::identifier => Ok(Expr::ident(pair.as_str())),
        Rule::list_display => build_list_display(pair),
        Rule::dict_display => build_dict_display(pair),
        Rule::paren_display => build_paren_display(pair),

        other => Err(ParseError::Build(format!(
            "unexpected expression: {:?}",
            other
        ))),
    }
}

fn build_compare_op(pair: &Pair<Rule>) -> ParseResult<CompareOp> {
    let text = pair.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
    Ok(match text.as_str() {
        "==" => CompareOp::Eq,
        "!=" => CompareOp::Ne,
        "<" => CompareOp::Lt,
        "<=" => CompareOp::Le,
        ">" => CompareOp::Gt,
        ">=" => CompareOp::Ge,
        "in" => CompareOp::In,
        "not in" => CompareOp::NotIn,
        "is" => CompareOp::Is,
        "is not" => CompareOp::IsNot,
        other => {
            return Err(ParseError::Build(format!(
                "unknown comparison {}",
                other
            )))
        }
    })
}

fn build_postfix(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut inner = pair.into_inner();
    let mut expr = build_expr(next(&mut inner, "atom")?)?;

    for trailer in inner {
        expr = match trailer.as_rule() {
            Rule::attribute => {
                let mut parts = trailer.into_inner();
                let attr = next(&mut parts, "attribute name")?.as_str().to_string();
                Expr::Attr {
                    object: Box::new(expr),
                    attr,
                }
            }
            Rule::call => {
                let args = match trailer.into_inner().next() {
                    Some(list) => build_arg_list(list)?,
                    None => Vec::new(),
                };
                Expr::Call {
                    callee: Box::new(expr),
                    args,
                }
            }
            Rule::subscript => {
                let mut items = Vec::new();
                let mut trailing = false;
                for item in trailer.into_inner() {
                    match item.as_rule() {
                        Rule::trailing_comma => trailing = true,
                        Rule::slice => items.push(build_slice(item)?),
                        _ => items.push(build_expr(item)?),
                    }
                }
                let index = if items.len() == 1 && !trailing {
                    items.remove(0)
                } else {
                    Expr::Tuple { items }
                };
                Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                }
            }
            other => {
                return Err(ParseError::Build(format!(
                    "unexpected trailer: {:?}",
                    other
                )))
            }
        };
    }

    Ok(expr)
}

fn build_slice(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut lower = None;
    let mut upper = None;
    let mut step = None;
    for part in pair.into_inner() {
        let rule = part.as_rule();
        let value = Some(Box::new(build_expr(part)?));
        match rule {
            Rule::slice_lower => lower = value,
            Rule::slice_upper => upper = value,
            _ => step = value,
        }
    }
    Ok(Expr::Slice { lower, upper, step })
}

fn build_arg_list(pair: Pair<Rule>) -> ParseResult<Vec<Arg>> {
    let mut args = Vec::new();
    for argument in pair.into_inner() {
        let mut inner = argument.into_inner();
        let first = next(&mut inner, "argument")?;
        let arg = match first.as_rule() {
            Rule::kwarg => {
                let mut parts = first.into_inner();
                let name = next(&mut parts, "keyword")?.as_str().to_string();
                let value = build_expr(next(&mut parts, "keyword value")?)?;
                Arg::Keyword(name, value)
            }
            Rule::star_arg => {
                let double = first.as_str().trim_start().starts_with("**");
                let mut parts = first.into_inner();
                let value = build_expr(next(&mut parts, "unpacked value")?)?;
                if double {
                    Arg::KwSplat(value)
                } else {
                    Arg::Splat(value)
                }
            }
            _ => {
                let element = build_expr(first)?;
                match inner.next() {
                    Some(comp) => Arg::Positional(Expr::Comp {
                        kind: CompKind::Generator,
                        element: Box::new(element),
                        value: None,
                        clauses: build_comp_for(comp)?,
                    }),
                    None => Arg::Positional(element),
                }
            }
        };
        args.push(arg);
    }
    Ok(args)
}

fn build_comp_for(pair: Pair<Rule>) -> ParseResult<Vec<CompFor>> {
    let mut clauses = Vec::new();
    let mut current = Some(pair);

    while let Some(clause) = current.take() {
        let mut inner = significant(clause);
        let target = build_target_list(next_sig(&mut inner, "comprehension target")?)?;
        let iter = build_expr(next_sig(&mut inner, "comprehension iterable")?)?;
        let mut conds = Vec::new();
        for part in inner {
            match part.as_rule() {
                Rule::comp_if => {
                    let cond = next_sig(&mut significant(part), "condition")?;
                    conds.push(build_expr(cond)?);
                }
                Rule::comp_for => current = Some(part),
                _ => {}
            }
        }
        clauses.push(CompFor {
            target,
            iter,
            conds,
        });
    }

    Ok(clauses)
}

fn build_list_display(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut items = Vec::new();
    for part in pair.into_inner() {
        if part.as_rule() == Rule::comp_for {
            let element = items
                .pop()
                .ok_or_else(|| ParseError::Build("comprehension without element".to_string()))?;
            return Ok(Expr::Comp {
                kind: CompKind::List,
                element: Box::new(element),
                value: None,
                clauses: build_comp_for(part)?,
            });
        }
        items.push(build_expr(part)?);
    }
    Ok(Expr::List { items })
}

fn build_dict_display(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut items = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::dict_item => {
                let mut inner = part.into_inner();
                let key = build_expr(next(&mut inner, "key")?)?;
                let value = build_expr(next(&mut inner, "value")?)?;
                items.push((key, value));
            }
            Rule::comp_for => {
                let (key, value) = items
                    .pop()
                    .ok_or_else(|| ParseError::Build("comprehension without element".to_string()))?;
                return Ok(Expr::Comp {
                    kind: CompKind::Dict,
                    element: Box::new(key),
                    value: Some(Box::new(value)),
                    clauses: build_comp_for(part)?,
                });
            }
            _ => {}
        }
    }
    Ok(Expr::Dict { items })
}

fn build_paren_display(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut items = Vec::new();
    let mut trailing = false;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::comp_for => {
                let element = items
                    .pop()
                    .ok_or_else(|| ParseError::Build("generator without element".to_string()))?;
                return Ok(Expr::Comp {
                    kind: CompKind::Generator,
                    element: Box::new(element),
                    value: None,
                    clauses: build_comp_for(part)?,
                });
            }
            Rule::trailing_comma => trailing = true,
            _ => items.push(build_expr(part)?),
        }
    }
    if items.len() == 1 && !trailing {
        if let Some(item) = items.pop() {
            return Ok(item);
        }
    }
    Ok(Expr::Tuple { items })
}

/* ===================== Literals ===================== */

fn build_number(text: &str) -> ParseResult<Expr> {
    let clean = text.replace('_', "");
    let is_float = clean.contains(['.', 'e', 'E']);
    if !is_float {
        if let Ok(n) = clean.parse::<i64>() {
            return Ok(Expr::lit(Literal::Int(n)));
        }
    }
    clean
        .parse::<f64>()
        .map(|x| Expr::lit(Literal::Float(x)))
        .map_err(|_| ParseError::Build(format!("invalid number literal {}", text)))
}

fn build_string_group(pair: Pair<Rule>) -> ParseResult<Expr> {
    let mut parts: Vec<FStringPart> = Vec::new();
    let mut has_fields = false;

    for literal in pair.into_inner() {
        let is_fstring = literal.as_rule() == Rule::fstr_lit;
        let mut raw = false;
        let mut body = "";
        for piece in literal.into_inner() {
            match piece.as_rule() {
                Rule::str_prefix | Rule::fstr_prefix => {
                    raw = piece.as_str().contains(['r', 'R']);
                }
                Rule::quoted => body = strip_quotes(piece.as_str()),
                _ => {}
            }
        }

        if is_fstring {
            for part in split_fstring(body, raw)? {
                if matches!(part, FStringPart::Field { .. }) {
                    has_fields = true;
                }
                push_part(&mut parts, part);
            }
        } else {
            let text = if raw { body.to_string() } else { unescape(body) };
            push_part(&mut parts, FStringPart::Text { text });
        }
    }

    if has_fields {
        return Ok(Expr::FString { parts });
    }
    let text = parts
        .into_iter()
        .map(|part| match part {
            FStringPart::Text { text } => text,
            FStringPart::Field { .. } => String::new(),
        })
        .collect::<String>();
    Ok(Expr::lit(Literal::Str(text)))
}

fn push_part(parts: &mut Vec<FStringPart>, part: FStringPart) {
    if let FStringPart::Text { text } = &part {
        if let Some(FStringPart::Text { text: last }) = parts.last_mut() {
            last.push_str(text);
            return;
        }
    }
    parts.push(part);
}

fn strip_quotes(quoted: &str) -> &str {
    let q = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
        3
    } else {
        1
    };
    if quoted.len() < 2 * q {
        return "";
    }
    &quoted[q..quoted.len() - q]
}

/// Resolve backslash escapes in a non-raw string body
pub fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split an f-string body into literal text and `{expr!conv:spec}` fields
fn split_fstring(body: &str, raw: bool) -> ParseResult<Vec<FStringPart>> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    let flush = |text: &mut String, parts: &mut Vec<FStringPart>| {
        if !text.is_empty() {
            let resolved = if raw { text.clone() } else { unescape(text) };
            parts.push(FStringPart::Text { text: resolved });
            text.clear();
        }
    };

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            '{' if chars.get(i + 1) == Some(&'{') => {
                text.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                text.push('}');
                i += 2;
            }
            '{' => {
                flush(&mut text, &mut parts);
                let end = find_field_end(&chars, i + 1).ok_or_else(|| {
                    ParseError::Build("f-string: expecting '}'".to_string())
                })?;
                let field: String = chars[i + 1..end].iter().collect();
                parts.push(build_fstring_field(&field)?);
                i = end + 1;
            }
            '}' => {
                return Err(ParseError::Build(
                    "f-string: single '}' is not allowed".to_string(),
                ))
            }
            _ => {
                text.push(ch);
                i += 1;
            }
        }
    }
    flush(&mut text, &mut parts);
    Ok(parts)
}

fn find_field_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (offset, ch) in chars[start..].iter().enumerate() {
        let pos = start + offset;
        if let Some(q) = quote {
            if *ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(*ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '}' if depth == 0 => return Some(pos),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn build_fstring_field(field: &str) -> ParseResult<FStringPart> {
    let chars: Vec<char> = field.chars().collect();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut expr_end = chars.len();
    let mut conversion = None;
    let mut spec = None;

    for (i, ch) in chars.iter().enumerate() {
        if let Some(q) = quote {
            if *ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(*ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => {
                expr_end = i;
                conversion = chars.get(i + 1).copied();
                if chars.get(i + 2) == Some(&':') {
                    spec = Some(chars[i + 3..].iter().collect());
                }
                break;
            }
            ':' if depth == 0 => {
                expr_end = i;
                spec = Some(chars[i + 1..].iter().collect());
                break;
            }
            _ => {}
        }
    }

    let source: String = chars[..expr_end].iter().collect();
    let expr = parse_expression(&source)?;
    Ok(FStringPart::Field {
        expr,
        conversion,
        spec,
    })
}
