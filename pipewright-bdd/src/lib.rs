//! BDD harness (cucumber-rs).
//!
//! Scenarios under `features/` drive the `pipewright` binary against a
//! scratch installation root. This crate keeps them out of the production
//! crates.

/// Package units the scenarios register as the `lab` repository.
///
/// Each entry is `(directory, pkg.yaml)`.
pub const LAB_UNITS: &[(&str, &str)] = &[
    (
        "echoer",
        r#"type: Echoer
kind: application
options:
  - name: fail_on
    msg: Lifecycle phase that exits non-zero
    type: str
    default: ""
start: "test '##fail_on##' != start && echo started ##pkg_id## X=$X PRELOAD=$LD_PRELOAD"
stop: "test '##fail_on##' != stop && echo stopped ##pkg_id##"
status: "echo idle"
"#,
    ),
    (
        "setter",
        r#"type: Setter
kind: service
env:
  set:
    X: "1"
"#,
    ),
    (
        "preload",
        r#"type: Preload
kind: interceptor
env:
  prepend:
    LD_PRELOAD: libfoo.so
"#,
    ),
];
