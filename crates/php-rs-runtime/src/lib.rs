//! PHP runtime services
//!
//! This crate implements the parts of the PHP runtime layer the embedded
//! engine needs:
//! - Error reporting (E_ERROR, E_WARNING, E_NOTICE, etc.)
//! - INI system (ini_get/ini_set, php.ini parsing)
//!
//! Equivalent to php-src/main/

pub mod error;
pub mod ini;

pub use error::{ErrorHandler, ErrorLevel, PhpError, Report};
pub use ini::{IniEntry, IniPermission, IniSystem};
