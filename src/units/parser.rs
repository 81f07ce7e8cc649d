//! INI-style unit file parser
//!
//! Parses unit files into sections of key/value lists. The parser never
//! fails: anything it does not understand is skipped, so a hand-edited unit
//! with a stray line still loads.

use std::collections::HashMap;

/// A section maps an upper-cased key to every value assigned to it, in file order
pub type ParsedSection = HashMap<String, Vec<String>>;

/// A parsed unit file is a map of section headers (e.g. "[Service]") to their contents
pub type ParsedFile = HashMap<String, ParsedSection>;

/// Parse a unit file from a string
pub fn parse_file(content: &str) -> ParsedFile {
    let mut sections: ParsedFile = HashMap::new();
    let mut current: Option<String> = None;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if is_section_header(line) {
            // Repeated sections are merged into the first one
            sections.entry(line.to_string()).or_default();
            current = Some(line.to_string());
            continue;
        }

        // Skip lines before the first section
        let Some(section) = current.as_ref() else {
            continue;
        };

        // Find the = separator
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };

        let name = name.trim().to_uppercase();
        if name.is_empty() {
            continue;
        }

        let entries = sections.entry(section.clone()).or_default();
        let values = entries.entry(name).or_default();
        let value = value.trim();
        if value.is_empty() {
            // Empty assignment resets the key, as in systemd
            values.clear();
        } else {
            values.push(value.to_string());
        }
    }

    sections
}

fn is_section_header(line: &str) -> bool {
    line.len() > 2 && line.starts_with('[') && line.ends_with(']')
}

/// Last value assigned to `key` in `section`, if any
pub fn last_value<'a>(parsed: &'a ParsedFile, section: &str, key: &str) -> Option<&'a str> {
    parsed
        .get(section)?
        .get(&key.to_uppercase())?
        .last()
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_service() {
        let content = r#"
[Unit]
Description=Test Service

[Service]
Type=simple
ExecStart=/usr/bin/test
"#;
        let parsed = parse_file(content);

        assert!(parsed.contains_key("[Unit]"));
        assert!(parsed.contains_key("[Service]"));
        assert_eq!(last_value(&parsed, "[Unit]", "Description"), Some("Test Service"));
        assert_eq!(last_value(&parsed, "[Service]", "ExecStart"), Some("/usr/bin/test"));
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_file("").is_empty());
    }

    #[test]
    fn test_comments_only() {
        let parsed = parse_file("# This is a comment\n; Another comment\n");
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_comments_inside_section() {
        let content = r#"
[Unit]
# This is a comment
Description=Test
; Another comment
"#;
        let parsed = parse_file(content);
        assert_eq!(parsed["[Unit]"].len(), 1);
    }

    #[test]
    fn test_line_without_equals_is_ignored() {
        let content = r#"
[Service]
this line has no separator
ExecStart=/bin/true
"#;
        let parsed = parse_file(content);
        assert_eq!(parsed["[Service]"].len(), 1);
        assert_eq!(last_value(&parsed, "[Service]", "ExecStart"), Some("/bin/true"));
    }

    #[test]
    fn test_value_with_equals_and_commas() {
        let content = r#"
[Service]
ExecStart=/bin/echo a,b --opt=1
"#;
        let parsed = parse_file(content);
        assert_eq!(
            last_value(&parsed, "[Service]", "ExecStart"),
            Some("/bin/echo a,b --opt=1")
        );
    }

    #[test]
    fn test_key_case_insensitive_last_wins() {
        let content = r#"
[Unit]
description=Lower
DESCRIPTION=Upper
Description=Mixed
"#;
        let parsed = parse_file(content);
        assert_eq!(parsed["[Unit]"]["DESCRIPTION"].len(), 3);
        assert_eq!(last_value(&parsed, "[Unit]", "description"), Some("Mixed"));
    }

    #[test]
    fn test_empty_assignment_resets() {
        let content = r#"
[Service]
ExecStart=/bin/one
ExecStart=
"#;
        let parsed = parse_file(content);
        assert_eq!(last_value(&parsed, "[Service]", "ExecStart"), None);
    }

    #[test]
    fn test_whitespace_handling() {
        let content = "[Unit]\n   Description   =   Test Service  \n";
        let parsed = parse_file(content);
        assert_eq!(last_value(&parsed, "[Unit]", "Description"), Some("Test Service"));
    }

    #[test]
    fn test_duplicate_sections_merge() {
        let content = r#"
[Unit]
Description=First

[Service]
ExecStart=/bin/true

[Unit]
Documentation=man:true(1)
"#;
        let parsed = parse_file(content);
        let unit = &parsed["[Unit]"];
        assert!(unit.contains_key("DESCRIPTION"));
        assert!(unit.contains_key("DOCUMENTATION"));
    }

    #[test]
    fn test_lines_before_first_section() {
        let content = "Orphan=value\n[Unit]\nDescription=Test\n";
        let parsed = parse_file(content);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["[Unit]"].len(), 1);
    }

    #[test]
    fn test_unknown_sections_preserved() {
        let content = "[Install]\nWantedBy=multi-user.target\n[X-Custom]\nFoo=bar\n";
        let parsed = parse_file(content);
        assert_eq!(last_value(&parsed, "[Install]", "WantedBy"), Some("multi-user.target"));
        assert_eq!(last_value(&parsed, "[X-Custom]", "Foo"), Some("bar"));
    }

    #[test]
    fn test_bare_brackets_are_not_headers() {
        let parsed = parse_file("[]\nKey=value\n");
        assert!(parsed.is_empty());
    }
}
