//! PHPT test runner
//!
//! Runs the .phpt files under `tests/phpt` through the embed engine, one
//! engine per test.
//! Reference: https://qa.php.net/phpt_details.php
//!
//! Supported sections:
//! - --TEST-- (required): Test description
//! - --INI--: INI settings applied to the engine
//! - --FILE-- (required): PHP code to execute
//! - --EXPECT-- or --EXPECTF-- (required): Expected output
//! - --EXPECTHEADERS--: Expected response headers, one `Name: value` per line

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use php_bridge::{ContextError, Engine, EngineConfig};
use regex::Regex;

/// Represents a parsed PHPT test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhptTest {
    /// Test description (from --TEST-- section)
    pub description: String,
    /// PHP code to execute (from --FILE-- section)
    pub file: String,
    /// Expected output (from --EXPECT-- or --EXPECTF-- section)
    pub expect: PhptExpect,
    /// Optional INI settings (from --INI-- section)
    pub ini: Option<String>,
    /// Optional expected headers (from --EXPECTHEADERS-- section)
    pub headers: Option<String>,
}

/// Expected output format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhptExpect {
    /// Exact match (from --EXPECT--)
    Exact(String),
    /// Format string match with %s, %d, %f placeholders (from --EXPECTF--)
    Format(String),
}

/// Parse a .phpt file
pub fn parse_phpt(content: &str) -> Result<PhptTest, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current_section: Option<String> = None;
    let mut current_content = String::new();

    for line in content.lines() {
        if line.len() > 4 && line.starts_with("--") && line.ends_with("--") {
            if let Some(section_name) = current_section.take() {
                sections.insert(section_name, current_content.trim_end().to_string());
                current_content.clear();
            }
            let section_name = line
                .trim_start_matches("--")
                .trim_end_matches("--")
                .to_string();
            current_section = Some(section_name);
        } else if current_section.is_some() {
            current_content.push_str(line);
            current_content.push('\n');
        }
    }

    if let Some(section_name) = current_section {
        sections.insert(section_name, current_content.trim_end().to_string());
    }

    let description = sections
        .get("TEST")
        .ok_or("Missing required --TEST-- section")?
        .clone();

    let file = sections
        .get("FILE")
        .ok_or("Missing required --FILE-- section")?
        .clone();

    let expect = if let Some(exact) = sections.get("EXPECT") {
        PhptExpect::Exact(exact.clone())
    } else if let Some(format) = sections.get("EXPECTF") {
        PhptExpect::Format(format.clone())
    } else {
        return Err("Missing required --EXPECT-- or --EXPECTF-- section".to_string());
    };

    Ok(PhptTest {
        description,
        file,
        expect,
        ini: sections.get("INI").cloned(),
        headers: sections.get("EXPECTHEADERS").cloned(),
    })
}

/// Output from executing a PHPT test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhptOutput {
    /// Script output
    pub output: String,
    /// Lines written to the log sink
    pub log: String,
    /// Response headers, one `Name: value` per line
    pub headers: String,
    /// Execution error other than exit(), if any
    pub error: Option<String>,
}

/// Execute a PHPT test by running its --FILE-- section in a fresh engine
pub fn execute_phpt(test: &PhptTest) -> Result<PhptOutput, String> {
    let mut config = EngineConfig::new();
    if let Some(ref ini) = test.ini {
        config = config.ini_file(ini);
    }
    let engine = Engine::with_config(config).map_err(|e| e.to_string())?;
    let mut ctx = engine.new_context().map_err(|e| e.to_string())?;

    let output = Rc::new(RefCell::new(Vec::<u8>::new()));
    let log = Rc::new(RefCell::new(Vec::<u8>::new()));
    ctx.set_output(output.clone());
    ctx.set_log(log.clone());

    let mut script = tempfile::Builder::new()
        .suffix(".php")
        .tempfile()
        .map_err(|e| format!("Failed to create temporary file: {}", e))?;
    script
        .write_all(test.file.as_bytes())
        .map_err(|e| format!("Failed to write temporary file: {}", e))?;

    let error = match ctx.exec(script.path()) {
        Ok(()) | Err(ContextError::Exit(_)) => None,
        Err(e) => Some(e.to_string()),
    };

    let headers = ctx
        .headers()
        .iter()
        .flat_map(|(name, values)| values.iter().map(move |value| format!("{}: {}", name, value)))
        .collect::<Vec<_>>()
        .join("\n");

    let output = String::from_utf8_lossy(&output.borrow()).into_owned();
    let log = String::from_utf8_lossy(&log.borrow()).into_owned();
    Ok(PhptOutput {
        output,
        log,
        headers,
        error,
    })
}

/// Translate an --EXPECTF-- section into an anchored regex, the way
/// run-tests.php does.
pub fn expectf_regex(format: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("(?s)^");
    let mut literal = String::new();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }
        let placeholder = match chars.next() {
            Some('e') => "/",
            Some('s') => r"[^\r\n]+",
            Some('S') => r"[^\r\n]*",
            Some('a') => r".+",
            Some('A') => r".*",
            Some('w') => r"\s*",
            Some('i') => r"[+-]?\d+",
            Some('d') => r"\d+",
            Some('x') => r"[0-9a-fA-F]+",
            Some('f') => r"[+-]?\.?\d+\.?\d*(?:[Ee][+-]?\d+)?",
            Some('c') => r".",
            Some('%') => {
                literal.push('%');
                continue;
            }
            Some(other) => {
                literal.push('%');
                literal.push(other);
                continue;
            }
            None => {
                literal.push('%');
                break;
            }
        };
        pattern.push_str(&regex::escape(&literal));
        literal.clear();
        pattern.push_str(placeholder);
    }
    pattern.push_str(&regex::escape(&literal));
    pattern.push('$');
    Regex::new(&pattern)
}

/// Compare script output against the expectation, ignoring trailing
/// whitespace like run-tests.php.
pub fn output_matches(expect: &PhptExpect, actual: &str) -> bool {
    let actual = actual.trim_end();
    match expect {
        PhptExpect::Exact(expected) => expected.trim_end() == actual,
        PhptExpect::Format(format) => {
            expectf_regex(format.trim_end()).is_ok_and(|re| re.is_match(actual))
        }
    }
}

/// Run one .phpt file; Err describes the mismatch.
pub fn run_phpt_file(path: &Path) -> Result<(), String> {
    let content = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let test = parse_phpt(&content)?;
    let result = execute_phpt(&test)?;

    if !output_matches(&test.expect, &result.output) {
        return Err(format!(
            "{}\n--- expected ---\n{:?}\n--- actual ---\n{}\n--- log ---\n{}\n--- error ---\n{:?}",
            test.description, test.expect, result.output, result.log, result.error
        ));
    }
    if let Some(ref headers) = test.headers {
        if headers.trim_end() != result.headers {
            return Err(format!(
                "{}: headers differ\n--- expected ---\n{}\n--- actual ---\n{}",
                test.description, headers, result.headers
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phpt_suite() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/phpt");
        let mut paths: Vec<_> = fs::read_dir(&dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "phpt"))
            .collect();
        paths.sort();
        assert!(!paths.is_empty(), "no .phpt files in {}", dir.display());

        let failures: Vec<String> = paths
            .iter()
            .filter_map(|path| run_phpt_file(path).err().map(|e| format!("{}: {}", path.display(), e)))
            .collect();
        assert!(failures.is_empty(), "{}", failures.join("\n\n"));
    }

    #[test]
    fn test_parse_simple_phpt() {
        let content = r#"--TEST--
Simple echo test
--FILE--
<?php
echo "Hello, World!";
?>
--EXPECT--
Hello, World!
"#;

        let result = parse_phpt(content).unwrap();
        assert_eq!(result.description, "Simple echo test");
        assert_eq!(result.file, "<?php\necho \"Hello, World!\";\n?>");
        assert_eq!(
            result.expect,
            PhptExpect::Exact("Hello, World!".to_string())
        );
        assert!(result.ini.is_none());
        assert!(result.headers.is_none());
    }

    #[test]
    fn test_parse_phpt_with_ini_and_headers() {
        let content = r#"--TEST--
Test with INI settings
--INI--
display_errors=1
--FILE--
<?php
header('X-A: 1');
--EXPECTHEADERS--
X-A: 1
--EXPECTF--
%A
"#;

        let result = parse_phpt(content).unwrap();
        assert_eq!(result.ini.as_deref(), Some("display_errors=1"));
        assert_eq!(result.headers.as_deref(), Some("X-A: 1"));
        assert_eq!(result.expect, PhptExpect::Format("%A".to_string()));
    }

    #[test]
    fn test_parse_phpt_missing_sections() {
        let missing_test = "--FILE--\n<?php\n--EXPECT--\nx\n";
        assert!(parse_phpt(missing_test)
            .unwrap_err()
            .contains("Missing required --TEST-- section"));

        let missing_file = "--TEST--\nTest\n--EXPECT--\ntest\n";
        assert!(parse_phpt(missing_file)
            .unwrap_err()
            .contains("Missing required --FILE-- section"));

        let missing_expect = "--TEST--\nTest\n--FILE--\n<?php\n";
        assert!(parse_phpt(missing_expect)
            .unwrap_err()
            .contains("Missing required --EXPECT-- or --EXPECTF-- section"));
    }

    #[test]
    fn test_expectf_placeholders() {
        let expect = PhptExpect::Format(
            "\nWarning: Undefined variable $b in %s on line %d\n100%% done".to_string(),
        );
        assert!(output_matches(
            &expect,
            "\nWarning: Undefined variable $b in /tmp/x.php on line 2\n100% done\n"
        ));
        assert!(!output_matches(
            &expect,
            "\nWarning: Undefined variable $b in /tmp/x.php on line two\n100% done"
        ));
        assert!(output_matches(&PhptExpect::Format("%f|%i|%x".into()), "-1.5e3|+7|ff"));
        assert!(output_matches(&PhptExpect::Format("a%Ab".into()), "a\n\nb"));
    }

    #[test]
    fn test_exact_match_ignores_trailing_whitespace() {
        let expect = PhptExpect::Exact("ok".to_string());
        assert!(output_matches(&expect, "ok\n\n"));
        assert!(!output_matches(&expect, " ok"));
    }
}
