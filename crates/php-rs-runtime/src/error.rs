//! PHP error reporting.
//!
//! Error levels (E_ERROR, E_WARNING, ...), the `error_reporting` mask, the
//! @ silence operator, and routing of diagnostics to the log and display
//! channels according to `log_errors` / `display_errors`.
//!
//! Reference: php-src/main/main.c (php_error_cb), php-src/Zend/zend_errors.h

use std::fmt;

/// PHP error levels (bitmask).
///
/// Reference: php-src/Zend/zend_errors.h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorLevel {
    /// Fatal error - execution cannot continue.
    Error = 1, // E_ERROR
    /// Non-fatal warning - execution continues.
    Warning = 2, // E_WARNING
    /// Parser error.
    Parse = 4, // E_PARSE
    /// Informational notice.
    Notice = 8, // E_NOTICE
    /// Fatal error triggered by the core.
    CoreError = 16, // E_CORE_ERROR
    /// Warning triggered by the core.
    CoreWarning = 32, // E_CORE_WARNING
    /// Fatal error during compilation.
    CompileError = 64, // E_COMPILE_ERROR
    /// Warning during compilation.
    CompileWarning = 128, // E_COMPILE_WARNING
    /// User-triggered error (trigger_error).
    UserError = 256, // E_USER_ERROR
    /// User-triggered warning.
    UserWarning = 512, // E_USER_WARNING
    /// User-triggered notice.
    UserNotice = 1024, // E_USER_NOTICE
    /// Coding standards suggestion.
    Strict = 2048, // E_STRICT
    /// Catchable fatal error.
    RecoverableError = 4096, // E_RECOVERABLE_ERROR
    /// Feature deprecation notice.
    Deprecated = 8192, // E_DEPRECATED
    /// User-triggered deprecation.
    UserDeprecated = 16384, // E_USER_DEPRECATED
}

const ALL_LEVELS: [ErrorLevel; 15] = [
    ErrorLevel::Error,
    ErrorLevel::Warning,
    ErrorLevel::Parse,
    ErrorLevel::Notice,
    ErrorLevel::CoreError,
    ErrorLevel::CoreWarning,
    ErrorLevel::CompileError,
    ErrorLevel::CompileWarning,
    ErrorLevel::UserError,
    ErrorLevel::UserWarning,
    ErrorLevel::UserNotice,
    ErrorLevel::Strict,
    ErrorLevel::RecoverableError,
    ErrorLevel::Deprecated,
    ErrorLevel::UserDeprecated,
];

impl ErrorLevel {
    /// E_ALL constant - all error levels combined.
    pub const ALL: u32 = 32767;

    /// Levels the @ operator cannot silence (PHP 8).
    pub const FATAL_MASK: u32 = 1 | 4 | 16 | 64 | 256 | 4096;

    /// Get the bitmask value.
    pub fn mask(self) -> u32 {
        self as u32
    }

    /// Check if this level is fatal (stops execution).
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            ErrorLevel::Error
                | ErrorLevel::Parse
                | ErrorLevel::CoreError
                | ErrorLevel::CompileError
                | ErrorLevel::UserError
        )
    }

    /// Get the PHP constant name for this error level (e.g., "E_WARNING").
    pub fn name(self) -> &'static str {
        match self {
            ErrorLevel::Error => "E_ERROR",
            ErrorLevel::Warning => "E_WARNING",
            ErrorLevel::Parse => "E_PARSE",
            ErrorLevel::Notice => "E_NOTICE",
            ErrorLevel::CoreError => "E_CORE_ERROR",
            ErrorLevel::CoreWarning => "E_CORE_WARNING",
            ErrorLevel::CompileError => "E_COMPILE_ERROR",
            ErrorLevel::CompileWarning => "E_COMPILE_WARNING",
            ErrorLevel::UserError => "E_USER_ERROR",
            ErrorLevel::UserWarning => "E_USER_WARNING",
            ErrorLevel::UserNotice => "E_USER_NOTICE",
            ErrorLevel::Strict => "E_STRICT",
            ErrorLevel::RecoverableError => "E_RECOVERABLE_ERROR",
            ErrorLevel::Deprecated => "E_DEPRECATED",
            ErrorLevel::UserDeprecated => "E_USER_DEPRECATED",
        }
    }

    /// Get the PHP label (for error messages, e.g., "Warning", "Fatal error").
    pub fn label(self) -> &'static str {
        match self {
            ErrorLevel::Error | ErrorLevel::CoreError | ErrorLevel::CompileError => "Fatal error",
            ErrorLevel::UserError => "Fatal error",
            ErrorLevel::Warning
            | ErrorLevel::CoreWarning
            | ErrorLevel::CompileWarning
            | ErrorLevel::UserWarning => "Warning",
            ErrorLevel::Parse => "Parse error",
            ErrorLevel::Notice | ErrorLevel::UserNotice => "Notice",
            ErrorLevel::Strict => "Strict Standards",
            ErrorLevel::RecoverableError => "Recoverable fatal error",
            ErrorLevel::Deprecated | ErrorLevel::UserDeprecated => "Deprecated",
        }
    }

    /// Try to convert a u32 to an ErrorLevel.
    pub fn from_u32(val: u32) -> Option<Self> {
        ALL_LEVELS.iter().copied().find(|level| level.mask() == val)
    }

    /// Look up a level by its constant name (`E_USER_WARNING`).
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_LEVELS.iter().copied().find(|level| level.name() == name)
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Evaluate an `error_reporting` setting: a number, or constant names
/// combined with `|`, `&` and `~` (`E_ALL & ~E_NOTICE`).
pub fn parse_error_reporting(value: &str) -> u32 {
    let value = value.trim();
    if let Ok(n) = value.parse::<i64>() {
        return n as u32;
    }

    let term = |text: &str| -> u32 {
        let text = text.trim();
        let (negate, name) = match text.strip_prefix('~') {
            Some(rest) => (true, rest.trim()),
            None => (false, text),
        };
        let mask = match name {
            "E_ALL" => ErrorLevel::ALL,
            _ => name
                .parse::<u32>()
                .ok()
                .or_else(|| ErrorLevel::from_name(name).map(ErrorLevel::mask))
                .unwrap_or(0),
        };
        if negate {
            !mask & ErrorLevel::ALL
        } else {
            mask
        }
    };

    value
        .split('|')
        .map(|alternative| alternative.split('&').map(term).fold(ErrorLevel::ALL, |acc, m| acc & m))
        .fold(0, |acc, m| acc | m)
}

/// A PHP error with level, message, and location.
#[derive(Debug, Clone, PartialEq)]
pub struct PhpError {
    /// Error level.
    pub level: ErrorLevel,
    /// Error message.
    pub message: String,
    /// File where the error occurred.
    pub file: Option<String>,
    /// Line number.
    pub line: Option<u32>,
}

impl PhpError {
    /// Create a new error.
    pub fn new(level: ErrorLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    /// Set the file location.
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Set the line number.
    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    fn location(&self) -> String {
        match (&self.file, self.line) {
            (Some(f), Some(l)) => format!(" in {} on line {}", f, l),
            (Some(f), None) => format!(" in {}", f),
            _ => String::new(),
        }
    }

    /// Format as PHP would display it.
    pub fn format(&self) -> String {
        format!("{}: {}{}", self.level.label(), self.message, self.location())
    }

    /// Line written to the error log (note the double space).
    pub fn log_line(&self) -> String {
        format!("PHP {}:  {}{}\n", self.level.label(), self.message, self.location())
    }

    /// Text echoed to output when `display_errors` is on.
    pub fn display_text(&self) -> String {
        format!("\n{}\n", self.format())
    }
}

impl fmt::Display for PhpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Where a reported error has to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Text for the error log, when `log_errors` is on.
    pub log: Option<String>,
    /// Text for the output stream, when `display_errors` is on.
    pub display: Option<String>,
}

/// The error handling subsystem.
///
/// Tracks the error_reporting mask and the @ silence operator, and decides
/// which channels receive each diagnostic.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    /// Current error_reporting bitmask (which levels to report).
    error_reporting: u32,
    /// Stack of saved error_reporting levels (for @ operator).
    silence_stack: Vec<u32>,
    log_errors: bool,
    display_errors: bool,
    last_error: Option<PhpError>,
}

impl ErrorHandler {
    /// Create a new error handler with PHP's built-in defaults.
    pub fn new() -> Self {
        Self {
            error_reporting: ErrorLevel::ALL,
            silence_stack: Vec::new(),
            log_errors: false,
            display_errors: true,
            last_error: None,
        }
    }

    /// Create a handler configured from the current INI settings.
    pub fn from_ini(ini: &crate::IniSystem) -> Self {
        let mut handler = Self::new();
        for name in ["error_reporting", "log_errors", "display_errors"] {
            handler.apply_ini(name, ini.get(name));
        }
        handler
    }

    /// Pick up a changed INI directive; unrelated names are ignored.
    pub fn apply_ini(&mut self, name: &str, value: &str) {
        match name {
            "error_reporting" => {
                let mask = parse_error_reporting(value);
                match self.silence_stack.first_mut() {
                    // Changed under @: takes effect once the outermost @ ends
                    Some(saved) => *saved = mask,
                    None => self.error_reporting = mask,
                }
            }
            "log_errors" => self.log_errors = crate::ini::parse_bool(value),
            "display_errors" => self.display_errors = crate::ini::parse_bool(value),
            _ => {}
        }
    }

    /// Get the current error_reporting level.
    pub fn error_reporting(&self) -> u32 {
        self.error_reporting
    }

    /// Begin error suppression (@ operator). Fatal levels stay reported.
    pub fn begin_silence(&mut self) {
        self.silence_stack.push(self.error_reporting);
        self.error_reporting &= ErrorLevel::FATAL_MASK;
    }

    /// End error suppression (@ operator). Restores previous level.
    pub fn end_silence(&mut self) {
        if let Some(level) = self.silence_stack.pop() {
            self.error_reporting = level;
        }
    }

    /// Check if errors are currently suppressed (@ operator active).
    pub fn is_silenced(&self) -> bool {
        !self.silence_stack.is_empty()
    }

    /// Handle an error, returning the text each channel should receive.
    pub fn handle_error(&mut self, error: PhpError) -> Report {
        let mut report = Report::default();
        if error.level.mask() & self.error_reporting != 0 {
            if self.log_errors {
                report.log = Some(error.log_line());
            }
            if self.display_errors {
                report.display = Some(error.display_text());
            }
        }
        self.last_error = Some(error);
        report
    }

    /// The most recent error, reported or not (error_get_last).
    pub fn last_error(&self) -> Option<&PhpError> {
        self.last_error.as_ref()
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}
