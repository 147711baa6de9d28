//! Low-level readers and writers shared by the workbook formats.
pub(crate) mod biff8;
pub(crate) mod string;
pub(crate) mod xml;
pub(crate) mod zip;
