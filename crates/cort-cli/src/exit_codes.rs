//! Exit codes for CLI operations
//!
//! These follow Unix conventions and sysexits.h where applicable.

/// Success - operation completed without errors
pub const SUCCESS: i32 = 0;

/// General error - unspecified failure
pub const ERROR: i32 = 1;

/// Template error - template rendering failed
pub const TEMPLATE_ERROR: i32 = 3;

/// Generation error - composition, decoding or transformers failed
pub const GENERATION_ERROR: i32 = 4;

/// IO error - file not found, permission denied, etc.
pub const IO_ERROR: i32 = 5;

/// Usage error - invalid arguments, parameters or configuration
pub const USAGE_ERROR: i32 = 64;
