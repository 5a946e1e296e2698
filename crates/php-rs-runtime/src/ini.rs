//! PHP INI system.
//!
//! Directive registry behind ini_get()/ini_set(), with permission levels and
//! php.ini style parsing for host supplied configuration.
//!
//! Reference: php-src/main/php_ini.c, php-src/Zend/zend_ini.h

use std::collections::HashMap;

/// INI entry permission levels.
///
/// Controls when an INI directive can be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IniPermission {
    /// Can only be set in php.ini or by the embedding host.
    System = 1, // INI_SYSTEM
    /// Can be set in php.ini, .htaccess, or httpd.conf.
    PerDir = 2, // INI_PERDIR
    /// Can be set at runtime via ini_set().
    User = 4, // INI_USER
    /// Can be set anywhere (System | PerDir | User).
    All = 7, // INI_ALL
}

impl IniPermission {
    /// Check if this permission allows runtime modification (via ini_set).
    pub fn allows_user_change(self) -> bool {
        (self as u8) & (IniPermission::User as u8) != 0
    }
}

/// A single INI entry.
#[derive(Debug, Clone)]
pub struct IniEntry {
    /// The directive name (e.g., "error_reporting").
    pub name: String,
    /// Current value.
    pub value: String,
    /// Value restored by ini_restore() and at request end.
    pub default_value: String,
    /// Permission level.
    pub permission: IniPermission,
    /// Whether this entry has been modified at runtime.
    pub modified: bool,
}

impl IniEntry {
    /// Create a new INI entry.
    pub fn new(
        name: impl Into<String>,
        default: impl Into<String>,
        permission: IniPermission,
    ) -> Self {
        let default = default.into();
        Self {
            name: name.into(),
            value: default.clone(),
            default_value: default,
            permission,
            modified: false,
        }
    }
}

/// The INI system - manages the configuration directives of one request.
#[derive(Debug, Clone)]
pub struct IniSystem {
    entries: HashMap<String, IniEntry>,
}

impl IniSystem {
    /// Create a new INI system with core directives pre-registered.
    pub fn new() -> Self {
        let mut sys = Self {
            entries: HashMap::new(),
        };
        sys.register_core_directives();
        sys
    }

    /// Register the core PHP INI directives with their php-src defaults.
    fn register_core_directives(&mut self) {
        let directives = [
            ("error_reporting", "32767", IniPermission::All), // E_ALL
            ("display_errors", "1", IniPermission::All),
            ("display_startup_errors", "1", IniPermission::All),
            ("log_errors", "0", IniPermission::All),
            ("html_errors", "0", IniPermission::All),
            ("error_log", "", IniPermission::All),
            ("precision", "14", IniPermission::All),
            ("serialize_precision", "-1", IniPermission::All),
            ("default_charset", "UTF-8", IniPermission::All),
            ("default_mimetype", "text/html", IniPermission::All),
            ("implicit_flush", "0", IniPermission::All),
            ("max_execution_time", "30", IniPermission::All),
            ("memory_limit", "128M", IniPermission::All),
            ("output_buffering", "0", IniPermission::PerDir),
            ("short_open_tag", "1", IniPermission::PerDir),
            ("register_argc_argv", "1", IniPermission::PerDir),
            ("open_basedir", "", IniPermission::System),
            ("disable_functions", "", IniPermission::System),
        ];

        for (name, default, perm) in directives {
            self.entries
                .insert(name.to_string(), IniEntry::new(name, default, perm));
        }
    }

    /// Register a custom INI directive.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        default: impl Into<String>,
        permission: IniPermission,
    ) {
        let name = name.into();
        self.entries
            .insert(name.clone(), IniEntry::new(name, default, permission));
    }

    /// Get the value of an INI directive. Returns empty string if not found.
    pub fn get(&self, name: &str) -> &str {
        self.entries
            .get(name)
            .map(|e| e.value.as_str())
            .unwrap_or("")
    }

    /// Get the full INI entry (if it exists).
    pub fn get_entry(&self, name: &str) -> Option<&IniEntry> {
        self.entries.get(name)
    }

    /// Set an INI directive at runtime (ini_set).
    ///
    /// Returns the old value, or None if the directive doesn't exist or
    /// the change is not permitted.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let entry = self.entries.get_mut(name)?;
        if !entry.permission.allows_user_change() {
            return None;
        }
        let old = std::mem::replace(&mut entry.value, value.into());
        entry.modified = true;
        Some(old)
    }

    /// Set a directive at startup (INI_SYSTEM stage): permissions are not
    /// checked, unknown names are registered, and the value becomes the
    /// default that ini_restore() returns to.
    pub fn set_system(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.get_mut(name) {
            Some(entry) => {
                entry.value = value.clone();
                entry.default_value = value;
                entry.modified = false;
            }
            None => {
                self.entries.insert(
                    name.to_string(),
                    IniEntry::new(name, value, IniPermission::All),
                );
            }
        }
    }

    /// Restore an INI directive to its default value (ini_restore).
    pub fn restore(&mut self, name: &str) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.value = entry.default_value.clone();
            entry.modified = false;
        }
    }

    /// Parse a php.ini format string and apply the settings at startup.
    pub fn parse_ini_string(&mut self, content: &str) {
        for (key, value) in parse_ini_pairs(content) {
            self.set_system(&key, value);
        }
    }

    /// Get an INI value as a boolean (handles "On", "Off", "1", "0", etc.).
    pub fn get_bool(&self, name: &str) -> bool {
        parse_bool(self.get(name))
    }

    /// Get an INI value as an integer.
    pub fn get_long(&self, name: &str) -> i64 {
        // Handle PHP shorthand: 128M, 8G, 1K
        parse_ini_size(self.get(name))
    }

    /// Reset all modified entries to defaults.
    pub fn reset(&mut self) {
        for entry in self.entries.values_mut() {
            if entry.modified {
                entry.value = entry.default_value.clone();
                entry.modified = false;
            }
        }
    }
}

impl Default for IniSystem {
    fn default() -> Self {
        Self::new()
    }
}

/// `key = value` pairs of a php.ini document, in order. Comments, section
/// headers and surrounding quotes are stripped.
pub fn parse_ini_pairs(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();

        // Skip comments and empty lines
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        // Skip section headers [section]
        if line.starts_with('[') && line.ends_with(']') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let mut value = value.trim();

        // Strip inline comments outside quoted values
        if !value.starts_with('"') && !value.starts_with('\'') {
            if let Some(comment_pos) = value.find(';') {
                value = value[..comment_pos].trim();
            }
        }

        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }

        pairs.push((key.to_string(), value.to_string()));
    }
    pairs
}

/// INI boolean: "1", "On", "Yes", "True" (any case) are true.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "on" | "yes" | "true"
    )
}

/// Parse a PHP INI size value (e.g., "128M" → 134217728).
fn parse_ini_size(val: &str) -> i64 {
    let val = val.trim();
    if val.is_empty() {
        return 0;
    }

    let (num_str, multiplier) = match val.as_bytes().last() {
        Some(b'K' | b'k') => (&val[..val.len() - 1], 1024i64),
        Some(b'M' | b'm') => (&val[..val.len() - 1], 1024 * 1024),
        Some(b'G' | b'g') => (&val[..val.len() - 1], 1024 * 1024 * 1024),
        _ => (val, 1),
    };

    num_str.trim().parse::<i64>().unwrap_or(0).saturating_mul(multiplier)
}
