//! Stable exit codes for tfgen CLI commands.

/// Command succeeded (template validated, deployment applied).
pub const OK: i32 = 0;
/// Invalid input/config or a collaborator failed before a verdict was reached.
pub const INVALID: i32 = 1;
/// `tfgen generate` used its whole retry budget without a valid template.
pub const EXHAUSTED: i32 = 3;
/// A validation verdict could not be decoded.
pub const DECODE: i32 = 4;
/// `tfgen generate --deploy` got a failed deployment verdict.
pub const DEPLOY_FAILED: i32 = 5;
