//! CLI Exit Code Registry
//!
//! Single source of truth for `tallysync` exit codes. Scripts and
//! schedulers rely on them.
//!
//! A sync that fails (bad workbook, destination down, rejected batch)
//! still exits 0: the failure is recorded in the JSON report, which is the
//! run's contract. Non-zero means no trustworthy report exists.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Report written (status may be `success` or `error`)      |
//! | 2    | CLI usage error (bad args, reported by clap)             |
//! | 3    | Report could not be written                              |
//! | 4    | Config file invalid (`validate` only)                    |

/// Success - a report was written.
pub const EXIT_SUCCESS: u8 = 0;

/// The report file could not be created or written.
pub const EXIT_REPORT_WRITE: u8 = 3;

/// `validate` found the config file unreadable or invalid.
pub const EXIT_CONFIG: u8 = 4;
