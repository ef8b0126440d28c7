//! Environment handed to external tools.

/// Fixed minimal environment for the bootstrap and archive tools.
///
/// External tools never inherit the caller's environment.
pub const TOOL_ENV: &[(&str, &str)] = &[
    ("TERM", "vt102"),
    ("SHELL", "/bin/bash"),
    ("USER", "root"),
    ("LANG", "C"),
    ("HOME", "/root"),
    ("PWD", "/root"),
    (
        "PATH",
        "/usr/local/sbin:/usr/local/bin:/usr/bin:/usr/bin/core_perl",
    ),
];
