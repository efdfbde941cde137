use super::*;

fn parse_one(source: &str) -> Stmt {
    let mut body = parse_program(source).unwrap();
    assert_eq!(body.len(), 1, "expected one statement in {:?}", source);
    body.remove(0)
}

fn parse_expr_stmt(source: &str) -> Expr {
    match parse_one(source) {
        Stmt::Expr { expr } => expr,
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

#[test]
fn test_assignment_with_subscript_target() {
    match parse_one("df['pace'] = df['moving_time'] / df['distance']\n") {
        Stmt::Assign { targets, value } => {
            assert_eq!(targets.len(), 1);
            match &targets[0] {
                Target::Subscript { object, index } => {
                    assert_eq!(object, &Expr::ident("df"));
                    assert_eq!(index, &Expr::lit(Literal::Str("pace".into())));
                }
                other => panic!("Expected subscript target, got {:?}", other),
            }
            match value {
                Expr::Binary { op, .. } => assert_eq!(op, BinaryOp::Div),
                other => panic!("Expected division, got {:?}", other),
            }
        }
        other => panic!("Expected assignment, got {:?}", other),
    }
}

#[test]
fn test_chained_and_tuple_assignment() {
    match parse_one("a = b = 0") {
        Stmt::Assign { targets, .. } => assert_eq!(targets.len(), 2),
        other => panic!("Expected assignment, got {:?}", other),
    }
    match parse_one("fig, ax = plt.subplots(figsize=(10, 6))") {
        Stmt::Assign { targets, value } => {
            match &targets[0] {
                Target::Tuple { items } => assert_eq!(items.len(), 2),
                other => panic!("Expected tuple target, got {:?}", other),
            }
            match value {
                Expr::Call { args, .. } => match &args[0] {
                    Arg::Keyword(name, Expr::Tuple { items }) => {
                        assert_eq!(name, "figsize");
                        assert_eq!(items.len(), 2);
                    }
                    other => panic!("Expected figsize keyword, got {:?}", other),
                },
                other => panic!("Expected call, got {:?}", other),
            }
        }
        other => panic!("Expected assignment, got {:?}", other),
    }
}

#[test]
fn test_comparison_is_not_keyword_argument() {
    match parse_expr_stmt("f(x == 1)") {
        Expr::Call { args, .. } => match &args[0] {
            Arg::Positional(Expr::Compare { rest, .. }) => {
                assert_eq!(rest[0].0, CompareOp::Eq)
            }
            other => panic!("Expected comparison argument, got {:?}", other),
        },
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_mask_expression_precedence() {
    let expr = parse_expr_stmt("df[(df['year'] == 2024) & (df['distance'] > 5)]");
    match expr {
        Expr::Index { index, .. } => match *index {
            Expr::Binary { op, .. } => assert_eq!(op, BinaryOp::BitAnd),
            other => panic!("Expected bitwise and, got {:?}", other),
        },
        other => panic!("Expected subscript, got {:?}", other),
    }
}

#[test]
fn test_not_in_and_is_not() {
    match parse_expr_stmt("a not in b") {
        Expr::Compare { rest, .. } => assert_eq!(rest[0].0, CompareOp::NotIn),
        other => panic!("Expected comparison, got {:?}", other),
    }
    match parse_expr_stmt("a is not None") {
        Expr::Compare { rest, .. } => assert_eq!(rest[0].0, CompareOp::IsNot),
        other => panic!("Expected comparison, got {:?}", other),
    }
}

#[test]
fn test_if_elif_else_folds_into_nested_if() {
    let source = "if x > 1:\n    y = 1\nelif x > 0:\n    y = 2\nelse:\n    y = 3\n";
    match parse_one(source) {
        Stmt::If { body, orelse, .. } => {
            assert_eq!(body.len(), 1);
            match &orelse[0] {
                Stmt::If { orelse: inner, .. } => assert_eq!(inner.len(), 1),
                other => panic!("Expected nested if, got {:?}", other),
            }
        }
        other => panic!("Expected if, got {:?}", other),
    }
}

#[test]
fn test_for_loop_with_tuple_target() {
    let source = "for i, row in df.iterrows():\n    print(row['name'])\n";
    match parse_one(source) {
        Stmt::For { target, body, .. } => {
            assert!(matches!(target, Target::Tuple { ref items } if items.len() == 2));
            assert_eq!(body.len(), 1);
        }
        other => panic!("Expected for loop, got {:?}", other),
    }
}

#[test]
fn test_def_with_defaults_and_return() {
    let source = "def pace(m, d=1.0):\n    if d == 0:\n        return None\n    return m / d\n";
    match parse_one(source) {
        Stmt::FunctionDef { name, params, body } => {
            assert_eq!(name, "pace");
            assert_eq!(params.len(), 2);
            assert!(params[0].default.is_none());
            assert_eq!(params[1].default, Some(Expr::lit(Literal::Float(1.0))));
            assert_eq!(body.len(), 2);
        }
        other => panic!("Expected def, got {:?}", other),
    }
}

#[test]
fn test_try_except_finally() {
    let source = "try:\n    x = 1 / 0\nexcept (KeyError, ZeroDivisionError) as e:\n    print(e)\nfinally:\n    print('done')\n";
    match parse_one(source) {
        Stmt::Try {
            handlers,
            finalbody,
            ..
        } => {
            assert_eq!(handlers.len(), 1);
            assert_eq!(handlers[0].name.as_deref(), Some("e"));
            assert!(matches!(handlers[0].kind, Some(Expr::Tuple { .. })));
            assert_eq!(finalbody.len(), 1);
        }
        other => panic!("Expected try, got {:?}", other),
    }
}

#[test]
fn test_imports() {
    match parse_one("import matplotlib.pyplot as plt") {
        Stmt::Import { names } => {
            assert_eq!(names[0].name, "matplotlib.pyplot");
            assert_eq!(names[0].alias.as_deref(), Some("plt"));
        }
        other => panic!("Expected import, got {:?}", other),
    }
    match parse_one("from datetime import datetime, timedelta") {
        Stmt::FromImport { module, names } => {
            assert_eq!(module, "datetime");
            assert_eq!(names.len(), 2);
        }
        other => panic!("Expected from-import, got {:?}", other),
    }
}

#[test]
fn test_fstring_fields_and_specs() {
    match parse_expr_stmt("f\"Total: {total:.2f} miles ({n!r})\"") {
        Expr::FString { parts } => {
            assert_eq!(parts.len(), 5);
            match &parts[1] {
                FStringPart::Field { expr, spec, .. } => {
                    assert_eq!(expr, &Expr::ident("total"));
                    assert_eq!(spec.as_deref(), Some(".2f"));
                }
                other => panic!("Expected field, got {:?}", other),
            }
            match &parts[3] {
                FStringPart::Field { conversion, .. } => assert_eq!(*conversion, Some('r')),
                other => panic!("Expected field, got {:?}", other),
            }
        }
        other => panic!("Expected f-string, got {:?}", other),
    }
}

#[test]
fn test_fstring_field_with_subscript_quotes() {
    match parse_expr_stmt("f\"{row['name']}: {row['distance']:.1f}\"") {
        Expr::FString { parts } => assert_eq!(parts.len(), 3),
        other => panic!("Expected f-string, got {:?}", other),
    }
}

#[test]
fn test_adjacent_strings_concatenate() {
    assert_eq!(
        parse_expr_stmt("'No data ' \"found\""),
        Expr::lit(Literal::Str("No data found".into()))
    );
}

#[test]
fn test_comprehensions() {
    match parse_expr_stmt("[x * 2 for x in xs if x > 1]") {
        Expr::Comp { kind, clauses, .. } => {
            assert_eq!(kind, CompKind::List);
            assert_eq!(clauses[0].conds.len(), 1);
        }
        other => panic!("Expected comprehension, got {:?}", other),
    }
    match parse_expr_stmt("sum(r for r in runs)") {
        Expr::Call { args, .. } => assert!(matches!(
            args[0],
            Arg::Positional(Expr::Comp {
                kind: CompKind::Generator,
                ..
            })
        )),
        other => panic!("Expected call, got {:?}", other),
    }
    match parse_expr_stmt("{k: v for k, v in pairs}") {
        Expr::Comp { kind, value, .. } => {
            assert_eq!(kind, CompKind::Dict);
            assert!(value.is_some());
        }
        other => panic!("Expected dict comprehension, got {:?}", other),
    }
}

#[test]
fn test_slices() {
    match parse_expr_stmt("df.iloc[:, 0]") {
        Expr::Index { index, .. } => match *index {
            Expr::Tuple { items } => {
                assert!(matches!(
                    items[0],
                    Expr::Slice {
                        lower: None,
                        upper: None,
                        step: None
                    }
                ));
            }
            other => panic!("Expected tuple index, got {:?}", other),
        },
        other => panic!("Expected subscript, got {:?}", other),
    }
    match parse_expr_stmt("xs[1:]") {
        Expr::Index { index, .. } => match *index {
            Expr::Slice { lower, upper, .. } => {
                assert!(lower.is_some());
                assert!(upper.is_none());
            }
            other => panic!("Expected slice, got {:?}", other),
        },
        other => panic!("Expected subscript, got {:?}", other),
    }
}

#[test]
fn test_lambda_and_conditional_expression() {
    match parse_expr_stmt("df.apply(lambda r: r['a'] if r['b'] else 0, axis=1)") {
        Expr::Call { args, .. } => match &args[0] {
            Arg::Positional(Expr::Lambda { params, body }) => {
                assert_eq!(params, &vec!["r".to_string()]);
                assert!(matches!(**body, Expr::IfExp { .. }));
            }
            other => panic!("Expected lambda, got {:?}", other),
        },
        other => panic!("Expected call, got {:?}", other),
    }
}

#[test]
fn test_negative_literal_folding_and_power() {
    assert_eq!(parse_expr_stmt("-3"), Expr::lit(Literal::Int(-3)));
    match parse_expr_stmt("2 ** 3") {
        Expr::Binary { op, .. } => assert_eq!(op, BinaryOp::Pow),
        other => panic!("Expected power, got {:?}", other),
    }
}

#[test]
fn test_augmented_assignment() {
    match parse_one("total += row['distance']") {
        Stmt::AugAssign { op, .. } => assert_eq!(op, BinaryOp::Add),
        other => panic!("Expected augmented assignment, got {:?}", other),
    }
}

#[test]
fn test_bitwise_augmented_assignment() {
    let cases = [
        ("x <<= 2", BinaryOp::LShift),
        ("x >>= 1", BinaryOp::RShift),
        ("x ^= mask", BinaryOp::BitXor),
        ("x &= 3", BinaryOp::BitAnd),
        ("x //= 2", BinaryOp::FloorDiv),
    ];
    for (source, expected) in cases {
        match parse_one(source) {
            Stmt::AugAssign { op, .. } => assert_eq!(op, expected, "{}", source),
            other => panic!("Expected augmented assignment, got {:?}", other),
        }
    }
}

#[test]
fn test_shift_binds_looser_than_addition() {
    // 1 ^ 2 << 3 + 4  ==  1 ^ (2 << (3 + 4))
    match parse_expr_stmt("1 ^ 2 << 3 + 4") {
        Expr::Binary { op, right, .. } => {
            assert_eq!(op, BinaryOp::BitXor);
            match *right {
                Expr::Binary { op, right, .. } => {
                    assert_eq!(op, BinaryOp::LShift);
                    assert!(matches!(*right, Expr::Binary { op: BinaryOp::Add, .. }));
                }
                other => panic!("Expected shift, got {:?}", other),
            }
        }
        other => panic!("Expected xor, got {:?}", other),
    }
    match parse_expr_stmt("a >> 1 >= b") {
        Expr::Compare { .. } => {}
        other => panic!("Expected comparison, got {:?}", other),
    }
}

#[test]
fn test_multiline_call_and_comments() {
    let source = "result = df.groupby('year').agg(\n    total=('distance', 'sum'),  # miles\n    runs=('id', 'count'),\n)\nprint(result)\n";
    assert_eq!(parse_program(source).unwrap().len(), 2);
}

#[test]
fn test_single_line_suite() {
    match parse_one("if df.empty: print('No data found')") {
        Stmt::If { body, .. } => assert_eq!(body.len(), 1),
        other => panic!("Expected if, got {:?}", other),
    }
}

#[test]
fn test_syntax_error_reports_source_line() {
    match parse_program("x = 1\ny = (2 +\nprint(x)\n") {
        Err(ParseError::Syntax { .. }) => {}
        other => panic!("Expected syntax error, got {:?}", other),
    }
    match parse_program("x = 1\nprint(x +)\n") {
        Err(err @ ParseError::Syntax { .. }) => {
            assert_eq!(err.line(), Some(2));
            assert_eq!(err.kind_name(), "SyntaxError");
        }
        other => panic!("Expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_bad_dedent_is_indentation_error() {
    match parse_program("if x:\n        y = 1\n    z = 2\n") {
        Err(err @ ParseError::Indentation { .. }) => {
            assert_eq!(err.kind_name(), "IndentationError")
        }
        other => panic!("Expected indentation error, got {:?}", other),
    }
}

#[test]
fn test_keywords_are_not_identifiers() {
    assert!(parse_program("in = 3\n").is_err());
    match parse_expr_stmt("format_time") {
        Expr::Ident { name } => assert_eq!(name, "format_time"),
        other => panic!("Expected identifier, got {:?}", other),
    }
}
