// Spreadsheet input and report output

pub mod grid;
pub mod report_file;
pub mod workbook;

pub use report_file::{write_report, ReportWriteError};
pub use workbook::WorkbookSource;
