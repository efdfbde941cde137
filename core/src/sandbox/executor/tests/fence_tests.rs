//! Tests for fence stripping and fingerprints

use crate::sandbox::executor::{fingerprint, strip_code_fences};

#[test]
fn test_plain_code_is_untouched() {
    assert_eq!(strip_code_fences("print(1)"), "print(1)");
}

#[test]
fn test_python_fence_is_removed() {
    let fenced = "```python\nimport pandas as pd\nprint(df['distance'].sum())\n```\n";
    assert_eq!(
        strip_code_fences(fenced),
        "import pandas as pd\nprint(df['distance'].sum())"
    );
}

#[test]
fn test_tag_is_case_insensitive_and_optional() {
    assert_eq!(strip_code_fences("```Python\nx = 1\n```"), "x = 1");
    assert_eq!(strip_code_fences("```py\nx = 1\n```"), "x = 1");
    assert_eq!(strip_code_fences("```\nx = 1\n```"), "x = 1");
    assert_eq!(strip_code_fences("  \n\nx = 1  \n\n"), "x = 1");
}

#[test]
fn test_identifiers_starting_with_tag_survive() {
    assert_eq!(strip_code_fences("```\npyplot_done = True\n```"), "pyplot_done = True");
    assert_eq!(strip_code_fences("python_version = 3"), "python_version = 3");
}

#[test]
fn test_variables_named_like_a_tag_survive() {
    assert_eq!(strip_code_fences("py = df['distance']\nprint(py.sum())"), "py = df['distance']\nprint(py.sum())");
    assert_eq!(strip_code_fences("```\npy = 2\nprint(py)\n```"), "py = 2\nprint(py)");
    assert_eq!(strip_code_fences("```python\npython = 3\n```"), "python = 3");
    assert_eq!(strip_code_fences("python\nprint(1)"), "print(1)");
}

#[test]
fn test_inner_indentation_is_kept() {
    let fenced = "```python\nfor i in range(2):\n    print(i)\n```";
    assert_eq!(strip_code_fences(fenced), "for i in range(2):\n    print(i)");
}

#[test]
fn test_fingerprint_is_stable_hex() {
    let a = fingerprint("print(1)");
    assert_eq!(a.len(), 64);
    assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(a, fingerprint("print(1)"));
    assert_ne!(a, fingerprint("print(2)"));
}
