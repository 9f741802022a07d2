//! Parsing of `git status --porcelain -z` (v1) output.

/// Paths listed by NUL-terminated porcelain status output, in output order.
///
/// With `-z` git prints paths verbatim, without quoting or escapes. A
/// rename or copy entry is followed by a second field holding the original
/// path; only the new path is reported.
pub fn parse_porcelain(output: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut fields = output.split('\0');

    while let Some(entry) = fields.next() {
        let Some(path) = entry.get(3..).filter(|p| !p.is_empty()) else {
            continue;
        };
        let status = &entry.as_bytes()[..2];
        if status.iter().any(|b| matches!(b, b'R' | b'C')) {
            fields.next();
        }
        paths.push(path.to_string());
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_states() {
        let out = " M .fleece/issues.jsonl\0?? src/new.rs\0A  docs/a.md\0 D gone.txt\0";
        assert_eq!(
            parse_porcelain(out),
            vec![".fleece/issues.jsonl", "src/new.rs", "docs/a.md", "gone.txt"]
        );
    }

    #[test]
    fn rename_reports_new_path_and_skips_origin() {
        assert_eq!(
            parse_porcelain("R  new.rs\0old.rs\0 M after.rs\0"),
            vec!["new.rs", "after.rs"]
        );
    }

    #[test]
    fn paths_are_taken_verbatim() {
        assert_eq!(
            parse_porcelain("?? with space.txt\0?? caf\u{e9}/r\u{e9}sum\u{e9}.md\0"),
            vec!["with space.txt", "caf\u{e9}/r\u{e9}sum\u{e9}.md"]
        );
    }

    #[test]
    fn empty_output_is_clean() {
        assert!(parse_porcelain("").is_empty());
        assert!(parse_porcelain("\0").is_empty());
    }
}
