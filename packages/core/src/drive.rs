//! Shared drives ("Taildrive") and parsing of `tailscale drive list`.
//!
//! The list command prints a fixed-width table:
//!
//! ```text
//! name     path                   as
//! -------- ---------------------- -----
//! docs     /home/alice/Documents  alice
//! ```
//!
//! Column spans are taken from the dashed separator row so that paths with
//! spaces survive. A JSON array of `{Name, Path, As}` objects is accepted too.

use serde_json::{Map, Value};

use crate::json::{read_str, read_str_any};

/// A local directory shared over the tailnet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriveInfo {
    /// Share name, unique within one drive list.
    pub name: String,
    /// Local directory being shared.
    pub path: String,
    /// User the share is exposed as, if reported.
    pub share_as: Option<String>,
}

impl DriveInfo {
    /// Creates a drive descriptor for a new share.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            share_as: None,
        }
    }

    /// Builds a drive from a JSON object, defaulting missing fields.
    pub fn from_json(obj: &Map<String, Value>) -> Self {
        let share_as = read_str_any(obj, &["As", "as"]);
        Self {
            name: read_str(obj, "Name"),
            path: read_str(obj, "Path"),
            share_as: (!share_as.is_empty()).then_some(share_as),
        }
    }
}

/// Parses the stdout of `drive list`.
///
/// Never fails: unrecognised lines are skipped.
pub fn parse_drive_list(output: &str) -> Vec<DriveInfo> {
    let trimmed = output.trim();
    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
            return items
                .iter()
                .filter_map(Value::as_object)
                .map(DriveInfo::from_json)
                .filter(|d| !d.name.is_empty())
                .collect();
        }
    }

    let lines: Vec<&str> = output.lines().collect();
    match lines.iter().position(|line| is_separator(line)) {
        Some(sep) => {
            let spans = column_spans(lines[sep]);
            lines[sep + 1..]
                .iter()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| drive_from_columns(&slice_columns(line, &spans)))
                .collect()
        }
        None => lines
            .iter()
            .filter(|line| !is_header(line))
            .filter_map(|line| {
                let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
                drive_from_columns(&fields)
            })
            .collect(),
    }
}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| c == '-' || c.is_whitespace())
}

fn is_header(line: &str) -> bool {
    line.split_whitespace()
        .next()
        .is_some_and(|first| first.eq_ignore_ascii_case("name"))
}

/// Start offsets (in chars) of each dash run in the separator row.
fn column_spans(separator: &str) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut in_run = false;
    for (i, c) in separator.chars().enumerate() {
        if c == '-' && !in_run {
            starts.push(i);
        }
        in_run = c == '-';
    }
    starts
}

fn slice_columns(line: &str, starts: &[usize]) -> Vec<String> {
    let chars: Vec<char> = line.chars().collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(chars.len()).min(chars.len());
            let start = start.min(end);
            chars[start..end].iter().collect::<String>().trim().to_string()
        })
        .collect()
}

fn drive_from_columns(fields: &[String]) -> Option<DriveInfo> {
    let name = fields.first().filter(|n| !n.is_empty())?;
    let path = fields.get(1).cloned().unwrap_or_default();
    let share_as = fields.get(2).filter(|s| !s.is_empty()).cloned();
    Some(DriveInfo {
        name: name.clone(),
        path,
        share_as,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DRIVE_LIST: &str = "\
name      path                     as
--------- ------------------------ ------
docs      /home/alice/Documents    alice
music     /srv/My Music            alice
";

    #[test]
    fn test_parse_table_with_spaces_in_path() {
        let drives = parse_drive_list(SAMPLE_DRIVE_LIST);

        assert_eq!(drives.len(), 2);
        assert_eq!(drives[0].name, "docs");
        assert_eq!(drives[0].path, "/home/alice/Documents");
        assert_eq!(drives[0].share_as.as_deref(), Some("alice"));
        assert_eq!(drives[1].path, "/srv/My Music");
    }

    #[test]
    fn test_parse_table_without_separator() {
        let drives = parse_drive_list("name path\nphotos /data/photos\n");

        assert_eq!(drives, vec![DriveInfo::new("photos", "/data/photos")]);
    }

    #[test]
    fn test_parse_json_array() {
        let drives = parse_drive_list(
            r#"[{"Name":"docs","Path":"/home/a/docs","As":"a"},{"Path":"/nameless"}]"#,
        );

        assert_eq!(drives.len(), 1);
        assert_eq!(drives[0].share_as.as_deref(), Some("a"));
    }

    #[test]
    fn test_parse_empty_output() {
        assert!(parse_drive_list("").is_empty());
        assert!(parse_drive_list("name path as\n---- ---- --\n").is_empty());
    }

    #[test]
    fn test_short_rows_do_not_panic() {
        let drives = parse_drive_list("name      path\n--------- ---------\nx\n");

        assert_eq!(drives.len(), 1);
        assert_eq!(drives[0].name, "x");
        assert_eq!(drives[0].path, "");
    }
}
