use lsp_types::{AnnotatedTextEdit, ChangeAnnotationIdentifier, OneOf, Position, Range, TextEdit};
use serde::{Deserialize, Serialize};

/// A snippet string as carried by [`SnippetTextEdit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetString {
    #[serde(default = "SnippetString::kind")]
    pub kind: String,
    pub value: String,
}

impl SnippetString {
    fn kind() -> String {
        "snippet".to_string()
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self {
            kind: Self::kind(),
            value: value.into(),
        }
    }
}

/// A text edit whose replacement is a snippet.
///
/// The snippet value is inserted literally; placeholders are not expanded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnippetTextEdit {
    pub range: Range,
    pub snippet: SnippetString,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation_id: Option<ChangeAnnotationIdentifier>,
}

/// Anything that replaces a range of a document with literal text
pub trait TextReplacement {
    fn range(&self) -> Range;
    fn replacement(&self) -> &str;
}

impl TextReplacement for TextEdit {
    fn range(&self) -> Range {
        self.range
    }

    fn replacement(&self) -> &str {
        &self.new_text
    }
}

impl TextReplacement for AnnotatedTextEdit {
    fn range(&self) -> Range {
        self.text_edit.range
    }

    fn replacement(&self) -> &str {
        &self.text_edit.new_text
    }
}

impl TextReplacement for SnippetTextEdit {
    fn range(&self) -> Range {
        self.range
    }

    fn replacement(&self) -> &str {
        &self.snippet.value
    }
}

impl TextReplacement for OneOf<TextEdit, AnnotatedTextEdit> {
    fn range(&self) -> Range {
        match self {
            OneOf::Left(edit) => edit.range(),
            OneOf::Right(edit) => edit.range(),
        }
    }

    fn replacement(&self) -> &str {
        match self {
            OneOf::Left(edit) => edit.replacement(),
            OneOf::Right(edit) => edit.replacement(),
        }
    }
}

impl<T: TextReplacement + ?Sized> TextReplacement for &T {
    fn range(&self) -> Range {
        (**self).range()
    }

    fn replacement(&self) -> &str {
        (**self).replacement()
    }
}

/// Apply a set of non-overlapping text edits to `content`.
///
/// Every range refers to the original content. Edits are applied from the end
/// of the document towards the start, so the result does not depend on the
/// order of `edits`. Inserts sharing a position end up in input order.
pub fn apply_text_edits<E: TextReplacement>(content: &str, edits: &[E]) -> String {
    let mut lines = split_lines(content);

    let mut order: Vec<usize> = (0..edits.len()).collect();
    order.sort_by(|&a, &b| {
        let key_a = position_key(edits[a].range().start);
        let key_b = position_key(edits[b].range().start);
        key_b.cmp(&key_a).then(b.cmp(&a))
    });

    for index in order {
        let edit = &edits[index];
        apply_one(&mut lines, normalize(edit.range()), edit.replacement());
    }

    lines.concat()
}

fn apply_one(lines: &mut Vec<String>, range: Range, new_text: &str) {
    let start_line = range.start.line as usize;
    let end_line = range.end.line as usize;

    // Past the end of the document: pad with empty lines and append
    if start_line >= lines.len() {
        if let Some(last) = lines.last_mut() {
            if content_len(last) == last.len() {
                last.push('\n');
            }
        }
        while lines.len() <= start_line {
            lines.push("\n".to_string());
        }
        lines[start_line] = new_text.to_string();
        return;
    }

    let first = &lines[start_line];
    let start = utf16_to_byte(first, range.start.character);

    if start_line == end_line {
        let end = utf16_to_byte(first, range.end.character).max(start);
        let replaced = format!("{}{}{}", &first[..start], new_text, &first[end..]);
        lines[start_line] = replaced;
        return;
    }

    let tail = match lines.get(end_line) {
        Some(last) => last[utf16_to_byte(last, range.end.character)..].to_string(),
        None => String::new(),
    };
    let replaced = format!("{}{}{}", &first[..start], new_text, tail);
    lines[start_line] = replaced;

    let remove_end = (end_line + 1).min(lines.len());
    lines.drain(start_line + 1..remove_end);
}

/// Split text into lines, keeping `\n`, `\r\n` or `\r` attached to each line
pub fn split_lines(content: &str) -> Vec<String> {
    let bytes = content.as_bytes();
    let mut lines = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => {
                lines.push(content[start..=i].to_string());
                start = i + 1;
            }
            b'\r' => {
                if bytes.get(i + 1) == Some(&b'\n') {
                    i += 1;
                }
                lines.push(content[start..=i].to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    if start < bytes.len() {
        lines.push(content[start..].to_string());
    }

    lines
}

/// Byte length of a line without its terminator
fn content_len(line: &str) -> usize {
    line.trim_end_matches(['\n', '\r']).len()
}

/// Convert a UTF-16 character offset into a byte offset within `line`.
///
/// Offsets past the end of the line clamp to the end of its content.
fn utf16_to_byte(line: &str, character: u32) -> usize {
    let character = character as usize;
    let limit = content_len(line);
    let mut utf16_offset = 0;
    let mut byte_offset = 0;

    for ch in line[..limit].chars() {
        if utf16_offset >= character {
            break;
        }
        utf16_offset += ch.len_utf16();
        byte_offset += ch.len_utf8();
    }

    byte_offset
}

fn position_key(position: Position) -> (u32, u32) {
    (position.line, position.character)
}

/// Make sure `end` never precedes `start`
fn normalize(range: Range) -> Range {
    if position_key(range.end) < position_key(range.start) {
        Range::new(range.start, range.start)
    } else {
        range
    }
}
