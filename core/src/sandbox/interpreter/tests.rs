use super::*;

fn run_with(profile: Profile, limits: Limits, source: &str) -> RunReport {
    Interpreter::new(profile, limits, CancellationToken::new()).run(source)
}

fn run(source: &str) -> RunReport {
    run_with(Profile::Data, Limits::default(), source)
}

/// Stdout of a program expected to finish cleanly
fn stdout(source: &str) -> String {
    let report = run(source);
    if let Some(err) = &report.error {
        panic!("program failed with {}: {}", err, source);
    }
    report.stdout
}

fn raised_kind(report: &RunReport) -> ExcKind {
    match &report.error {
        Some(ExecError::Raised(exc)) => exc.kind,
        other => panic!("Expected a raised exception, got {:?}", other),
    }
}

#[test]
fn test_arithmetic_follows_python_semantics() {
    assert_eq!(stdout("print(7 / 2, 7 // 2, -7 // 2, 7 % 3, -7 % 3)"), "3.5 3 -4 1 2\n");
    assert_eq!(stdout("print(2 ** 10, 2 ** -1)"), "1024 0.5\n");
    assert_eq!(stdout("print(0.1 + 0.2)"), "0.30000000000000004\n");
    assert_eq!(stdout("print(10 / 5)"), "2.0\n");
}

#[test]
fn test_division_by_zero_messages() {
    let cases = [
        ("1 / 0", "division by zero"),
        ("1 // 0", "integer division or modulo by zero"),
        ("1 % 0", "integer modulo by zero"),
        ("1.0 / 0", "float division by zero"),
    ];
    for (expr, message) in cases {
        let source = format!("try:\n    {}\nexcept ZeroDivisionError as e:\n    print(e)", expr);
        assert_eq!(stdout(&source), format!("{}\n", message));
    }
}

#[test]
fn test_integer_overflow_raises() {
    for source in [
        "print(2 ** 63)",
        "print(9223372036854775807 + 1)",
        "print(3037000500 * 3037000500)",
        "print((-9223372036854775807 - 1) // -1)",
        "print(-(-9223372036854775807 - 1))",
        "print(abs(-9223372036854775807 - 1))",
        "print(1 << 70)",
    ] {
        assert_eq!(raised_kind(&run(source)), ExcKind::OverflowError, "{}", source);
    }
    assert_eq!(raised_kind(&run("print(len('ab' * 10 ** 18))")), ExcKind::OverflowError);
    assert_eq!(stdout("print(len([] * 10 ** 18), 'ab' * 2, [0] * 3)"), "0 abab [0, 0, 0]\n");
    assert_eq!(stdout("print((-9223372036854775807 - 1) % -1)"), "0\n");
    assert_eq!(stdout("print(2 ** 62, 1 ** 100000000000, (-1) ** 7)"), "4611686018427387904 1 -1\n");
    let source = "\
try:
    x = 2 ** 64
except ArithmeticError as e:
    print('caught', e)
";
    assert_eq!(stdout(source), "caught integer result too large to represent\n");
}

#[test]
fn test_bitwise_and_shift_operators() {
    assert_eq!(stdout("print(5 ^ 3, 8 >> 1, 1 << 4, 6 & 3, 6 | 1, ~5)"), "6 4 16 2 7 -6\n");
    assert_eq!(stdout("print(-9 >> 1, 5 >> 100, True ^ True)"), "-5 0 False\n");
    assert_eq!(stdout("print(1 + 2 << 1, 1 | 2 ^ 3 & 1, 2 < 1 << 2)"), "6 3 True\n");
    assert_eq!(stdout("x = 3\nx <<= 2\nx ^= 1\nx >>= 1\nx |= 8\nx &= 12\nprint(x)"), "12\n");
    assert_eq!(raised_kind(&run("print(1 << -1)")), ExcKind::ValueError);
    assert_eq!(raised_kind(&run("print(1.5 ^ 1)")), ExcKind::TypeError);
}

#[test]
fn test_datetimes_out_of_range_raise() {
    let scalar = "import pandas as pd\nt = pd.Timestamp('2024-06-01')\nprint(t + pd.Timedelta(days=10 ** 8))";
    assert_eq!(raised_kind(&run(scalar)), ExcKind::OverflowError);
    let series = "\
import pandas as pd
s = pd.to_datetime(pd.Series(['2024-06-01', '2024-06-02']))
print(s - pd.Timedelta(days=10 ** 8))
";
    assert_eq!(raised_kind(&run(series)), ExcKind::OverflowError);
    let delta = "import pandas as pd\nbig = pd.Timedelta(days=10 ** 14)\nprint(big + big)";
    assert_eq!(raised_kind(&run(delta)), ExcKind::OverflowError);
    let near = "import pandas as pd\nprint(pd.Timestamp('2024-06-01') + pd.Timedelta(days=1))";
    assert_eq!(stdout(near), "2024-06-02 00:00:00\n");
}

#[test]
fn test_print_separators() {
    assert_eq!(stdout("print('a', 'b', sep='-', end='!')"), "a-b!");
}

#[test]
fn test_fstring_format_specs() {
    let source = "x = 3.14159\nn = 1234567\nprint(f\"{x:.2f} {n:,} {'ok'!r}\")";
    assert_eq!(stdout(source), "3.14 1,234,567 'ok'\n");
}

#[test]
fn test_functions_defaults_and_closures() {
    let source = "\
def scale(factor=2):
    def apply(x):
        return x * factor
    return apply

double = scale()
triple = scale(3)
print(double(5), triple(5))
";
    assert_eq!(stdout(source), "10 15\n");
}

#[test]
fn test_comprehensions_and_containers() {
    assert_eq!(stdout("print([i * i for i in range(4) if i != 2])"), "[0, 1, 9]\n");
    let source = "d = {'a': 1}\nd['b'] = 2\nprint(d, len(d), {k: v * 10 for k, v in d.items()})";
    assert_eq!(stdout(source), "{'a': 1, 'b': 2} 2 {'a': 10, 'b': 20}\n");
}

#[test]
fn test_loops_with_break_and_continue() {
    let source = "\
total = 0
for i in range(10):
    if i == 5:
        break
    if i == 1:
        continue
    total += i
n = 0
while n < 3:
    n += 1
print(total, n)
";
    assert_eq!(stdout(source), "9 3\n");
}

#[test]
fn test_try_except_finally() {
    let source = "\
try:
    1 / 0
except ZeroDivisionError as e:
    print('caught', e)
finally:
    print('done')
";
    assert_eq!(stdout(source), "caught division by zero\ndone\n");
}

#[test]
fn test_uncaught_exception_keeps_stdout() {
    let report = run("print('before')\nundefined_name\nprint('after')");
    assert_eq!(report.stdout, "before\n");
    assert_eq!(raised_kind(&report), ExcKind::NameError);
}

#[test]
fn test_syntax_error_is_reported_without_running() {
    let report = run("print('x')\nif True print('y')");
    assert_eq!(report.stdout, "");
    assert_eq!(raised_kind(&report), ExcKind::SyntaxError);
}

#[test]
fn test_disallowed_imports() {
    assert_eq!(raised_kind(&run("import os")), ExcKind::ImportError);
    assert_eq!(
        raised_kind(&run("import matplotlib.pyplot as plt")),
        ExcKind::ImportError
    );
    assert_eq!(raised_kind(&run("import tensorflow")), ExcKind::ModuleNotFoundError);
    let report = run_with(
        Profile::Chart,
        Limits::default(),
        "import matplotlib.pyplot as plt\nimport pandas as pd\nprint('ok')",
    );
    assert!(report.error.is_none(), "{:?}", report.error);
}

#[test]
fn test_step_budget_stops_infinite_loops() {
    let limits = Limits {
        max_steps: 1_000,
        ..Limits::default()
    };
    let report = run_with(Profile::Data, limits, "while True:\n    pass\n");
    match report.error {
        Some(ExecError::StepLimit { limit }) => assert_eq!(limit, 1_000),
        other => panic!("Expected step limit, got {:?}", other),
    }
}

#[test]
fn test_step_limit_cannot_be_caught() {
    let limits = Limits {
        max_steps: 500,
        ..Limits::default()
    };
    let source = "try:\n    while True:\n        pass\nexcept Exception:\n    print('swallowed')\n";
    let report = run_with(Profile::Data, limits, source);
    assert_eq!(report.stdout, "");
    assert!(matches!(report.error, Some(ExecError::StepLimit { .. })));
}

#[test]
fn test_cancellation_is_observed() {
    let token = CancellationToken::new();
    token.cancel();
    let report = Interpreter::new(Profile::Data, Limits::default(), token).run("while True:\n    pass\n");
    assert_eq!(report.error, Some(ExecError::Cancelled));
}

#[test]
fn test_recursion_limit() {
    let source = "def down(n):\n    return down(n + 1)\ndown(0)\n";
    assert!(matches!(run(source).error, Some(ExecError::RecursionLimit { .. })));
}

#[test]
fn test_output_is_truncated_at_the_cap() {
    let limits = Limits {
        max_output_bytes: 10,
        ..Limits::default()
    };
    let report = run_with(Profile::Data, limits, "print('x' * 100)");
    assert!(report.error.is_none());
    assert!(report.output_truncated);
    assert_eq!(report.stdout.len(), 10);
}

#[test]
fn test_bound_globals_are_visible() {
    let mut interp = Interpreter::new(Profile::Data, Limits::default(), CancellationToken::new());
    interp.bind("limit", Val::Int(42));
    let report = interp.run("print(limit + 1)");
    assert_eq!(report.stdout, "43\n");
}

#[test]
fn test_lambda_sorting_key() {
    let source = "runs = [('a', 5.0), ('b', 3.2), ('c', 8.1)]\nprint([r[0] for r in sorted(runs, key=lambda r: r[1], reverse=True)])";
    assert_eq!(stdout(source), "['c', 'a', 'b']\n");
}
