//! Parsing and serializing the patch-collection text format.
//!
//! Example document:
//!
//! ```text
//! =~
//!     ut-data/fragment.graph::Fragment
//! main=~
//!     ut-data/outergraph.graph::deferred_pass_main
//!     perPixel=~
//!         ut-data/perpixel.graph::Default_PerPixel
//! =~
//!     ut-data/outergraph.graph::CoordsToColor
//! ```
//!
//! An indentation-nested sequence of `<name>=~` entries (`name` may be
//! empty); each entry's body is a deeper-indented block whose first line
//! is the bound archive reference, optionally followed by nested
//! `<param>=~` bindings (recursively the same shape) and an
//! `Implements=<archive-ref>` override line.

use rg_shader_graph::InstantiationRequest;

#[derive(Debug, thiserror::Error)]
pub enum TextFormatError {
    #[error("line {0}: expected an indented block under this entry")]
    MissingBody(usize),
    #[error("line {0}: unexpected indentation")]
    UnexpectedIndent(usize),
    #[error("line {0}: entry already has an archive reference")]
    DuplicateArchiveRef(usize),
    #[error("line {0}: entry already has an Implements= override")]
    DuplicateImplements(usize),
    #[error("line {0}: entry has no archive reference")]
    MissingArchiveRef(usize),
}

struct Line {
    number: usize,
    indent: usize,
    text: String,
}

fn tokenize(input: &str) -> Vec<Line> {
    input
        .lines()
        .enumerate()
        .filter_map(|(idx, raw)| {
            let trimmed_end = raw.trim_end();
            if trimmed_end.trim().is_empty() {
                return None;
            }
            let indent = trimmed_end.len() - trimmed_end.trim_start().len();
            Some(Line {
                number: idx + 1,
                indent,
                text: trimmed_end.trim().to_string(),
            })
        })
        .collect()
}

/// Parses a full patch-collection text document into `(name, request)`
/// pairs in declaration order.
pub fn parse(input: &str) -> Result<Vec<(String, InstantiationRequest)>, TextFormatError> {
    let lines = tokenize(input);
    let mut pos = 0;
    let base_indent = lines.first().map_or(0, |l| l.indent);
    parse_block(&lines, &mut pos, base_indent)
}

fn parse_block(lines: &[Line], pos: &mut usize, indent: usize) -> Result<Vec<(String, InstantiationRequest)>, TextFormatError> {
    let mut entries = Vec::new();
    while *pos < lines.len() && lines[*pos].indent == indent {
        let line = &lines[*pos];
        let Some(name) = line.text.strip_suffix("=~") else {
            break;
        };
        let name = name.to_string();
        *pos += 1;
        let request = parse_entry_body(lines, pos, indent, line.number)?;
        entries.push((name, request));
    }
    Ok(entries)
}

fn parse_entry_body(lines: &[Line], pos: &mut usize, parent_indent: usize, header_line: usize) -> Result<InstantiationRequest, TextFormatError> {
    if *pos >= lines.len() || lines[*pos].indent <= parent_indent {
        return Err(TextFormatError::MissingBody(header_line));
    }
    let body_indent = lines[*pos].indent;

    let mut archive_name: Option<String> = None;
    let mut implements: Option<String> = None;
    let mut bindings = Vec::new();

    while *pos < lines.len() && lines[*pos].indent == body_indent {
        let line = &lines[*pos];
        if let Some(rest) = line.text.strip_suffix("=~") {
            let param_name = rest.to_string();
            let line_number = line.number;
            *pos += 1;
            let nested = parse_entry_body(lines, pos, body_indent, line_number)?;
            bindings.push((param_name, nested));
        } else if let Some(value) = line.text.strip_prefix("Implements=") {
            if implements.is_some() {
                return Err(TextFormatError::DuplicateImplements(line.number));
            }
            implements = Some(value.to_string());
            *pos += 1;
        } else {
            if archive_name.is_some() {
                return Err(TextFormatError::DuplicateArchiveRef(line.number));
            }
            archive_name = Some(line.text.clone());
            *pos += 1;
        }

        if *pos < lines.len() && lines[*pos].indent > body_indent {
            return Err(TextFormatError::UnexpectedIndent(lines[*pos].number));
        }
    }

    let archive_name = archive_name.ok_or(TextFormatError::MissingArchiveRef(header_line))?;
    let mut request = InstantiationRequest::new(archive_name);
    request.parameter_bindings = bindings;
    if let Some(implements) = implements {
        request.implements_archive_name = implements;
    }
    Ok(request)
}

/// Serializes `(name, request)` pairs back into patch-collection text, in
/// the same shape [`parse`] accepts. Deterministic: the same input tree
/// always produces the same text, which together with [`parse`] being
/// its inverse on well-formed input gives the round-trip property.
#[must_use]
pub fn serialize(entries: &[(String, InstantiationRequest)]) -> String {
    let mut out = String::new();
    write_block(&mut out, entries, 0);
    out
}

fn write_block(out: &mut String, entries: &[(String, InstantiationRequest)], indent: usize) {
    for (name, request) in entries {
        out.push_str(&"    ".repeat(indent));
        out.push_str(name);
        out.push_str("=~\n");
        write_entry_body(out, request, indent + 1);
    }
}

fn write_entry_body(out: &mut String, request: &InstantiationRequest, indent: usize) {
    let pad = "    ".repeat(indent);
    out.push_str(&pad);
    out.push_str(&request.archive_name);
    out.push('\n');
    write_block(out, &request.parameter_bindings, indent);
    if !request.implements_archive_name.is_empty() {
        out.push_str(&pad);
        out.push_str("Implements=");
        out.push_str(&request.implements_archive_name);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "=~\n    ut-data/fragment.graph::Fragment\nmain=~\n    ut-data/outergraph.graph::deferred_pass_main\n    perPixel=~\n        ut-data/perpixel.graph::Default_PerPixel\n=~\n    ut-data/outergraph.graph::CoordsToColor\n";

    #[test]
    fn parses_fixture_shape() {
        let parsed = parse(FIXTURE).unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].0, "");
        assert_eq!(parsed[0].1.archive_name, "ut-data/fragment.graph::Fragment");
        assert_eq!(parsed[1].0, "main");
        assert_eq!(parsed[1].1.parameter_bindings.len(), 1);
        assert_eq!(parsed[1].1.parameter_bindings[0].0, "perPixel");
        assert_eq!(parsed[1].1.parameter_bindings[0].1.archive_name, "ut-data/perpixel.graph::Default_PerPixel");
    }

    #[test]
    fn parses_implements_override() {
        let text = "=~\n    ut-data/shader_with_selectors.pixel.hlsl::PerPixelWithSelectors\n    Implements=xleres/Objects/Templates.pixel.hlsl::PerPixel\n";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].1.implements_archive_name, "xleres/Objects/Templates.pixel.hlsl::PerPixel");
    }

    #[test]
    fn round_trips_through_serialize() {
        let parsed = parse(FIXTURE).unwrap();
        let rendered = serialize(&parsed);
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(parsed, reparsed);
    }

    #[test]
    fn missing_archive_ref_is_an_error() {
        let text = "main=~\n    perPixel=~\n        ut-data/x.graph::Y\n";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, TextFormatError::MissingArchiveRef(_)));
    }
}
