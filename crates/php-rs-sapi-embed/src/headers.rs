//! Response headers collected from a context's scripts.

use indexmap::IndexMap;
use php_rs_vm::HeaderOp;

/// Headers set through `header()` and `header_remove()`.
///
/// Names are stored in canonical form (`content-type` becomes
/// `Content-Type`), so lookups ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: IndexMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one header operation. `line` is `Name: value` for replace and
    /// append, or the bare name for delete. Lines without a colon or with
    /// an empty value are ignored.
    pub fn apply(&mut self, op: HeaderOp, line: &str) {
        match op {
            HeaderOp::Replace | HeaderOp::Append => {
                let Some((name, value)) = line.split_once(':') else {
                    return;
                };
                let (name, value) = (name.trim(), value.trim());
                if name.is_empty() || value.is_empty() {
                    return;
                }
                let values = self.entries.entry(canonical_name(name)).or_default();
                if op == HeaderOp::Replace {
                    values.clear();
                }
                values.push(value.to_string());
            }
            HeaderOp::Delete => {
                let name = line.split(':').next().unwrap_or_default().trim();
                if !name.is_empty() {
                    self.entries.shift_remove(&canonical_name(name));
                }
            }
            HeaderOp::DeleteAll => self.entries.clear(),
        }
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    /// Every value of `name`, in the order they were added.
    pub fn values(&self, name: &str) -> &[String] {
        self.entries
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&canonical_name(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Canonical MIME header form: the first letter and every letter after a
/// hyphen upper-cased, the rest lower-cased. Names containing anything
/// other than token characters are returned unchanged.
pub fn canonical_name(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("x-testing"), "X-Testing");
        assert_eq!(canonical_name("CONTENT-TYPE"), "Content-Type");
        assert_eq!(canonical_name("etag"), "Etag");
        assert_eq!(canonical_name("bad name"), "bad name");
    }

    #[test]
    fn test_replace_and_append() {
        let mut headers = Headers::new();
        headers.apply(HeaderOp::Replace, "X-Testing: Hello");
        headers.apply(HeaderOp::Append, "x-testing: World");
        assert_eq!(headers.values("X-Testing"), ["Hello", "World"]);
        headers.apply(HeaderOp::Replace, "X-TESTING:  Again ");
        assert_eq!(headers.values("x-testing"), ["Again"]);
        assert_eq!(headers.get("X-Testing"), Some("Again"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_malformed_lines_are_ignored() {
        let mut headers = Headers::new();
        headers.apply(HeaderOp::Replace, "NoColon");
        headers.apply(HeaderOp::Replace, "Empty:   ");
        headers.apply(HeaderOp::Append, ": value");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let mut headers = Headers::new();
        headers.apply(HeaderOp::Replace, "Location: http://example.com:8080/");
        assert_eq!(headers.get("location"), Some("http://example.com:8080/"));
    }

    #[test]
    fn test_delete() {
        let mut headers = Headers::new();
        headers.apply(HeaderOp::Replace, "X-Testing: Hello");
        headers.apply(HeaderOp::Replace, "X-Other: 1");
        headers.apply(HeaderOp::Delete, "x-testing");
        assert!(!headers.contains("X-Testing"));
        assert!(headers.contains("X-Other"));
        headers.apply(HeaderOp::DeleteAll, "");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_missing_header_reads_empty() {
        let headers = Headers::new();
        assert_eq!(headers.get("X-None"), None);
        assert!(headers.values("X-None").is_empty());
    }
}
