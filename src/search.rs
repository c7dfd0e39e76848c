//! Rendering of notes and search results for the terminal.

use std::io::Write;

use serde::Serialize;

use crate::{
    error::Result,
    note::{Attachment, Note},
    note_id::short_of,
    tantivy_index::SearchResult,
};

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    tags: &'a [String],
    total_hits: usize,
    returned: usize,
    elapsed_ms: u64,
    notes: &'a [Note],
}

/// One line per note, then a summary line.
pub fn format_human(out: &mut impl Write, result: &SearchResult) -> Result<()> {
    if result.notes.is_empty() {
        writeln!(out, "No notes found.")?;
        return Ok(());
    }

    for note in &result.notes {
        write_summary(out, note)?;
    }

    writeln!(
        out,
        "\n{} of {} note(s) in {} ms",
        result.notes.len(),
        result.total_hits,
        result.elapsed.as_millis()
    )?;
    Ok(())
}

pub fn format_json(
    out: &mut impl Write,
    result: &SearchResult,
    query: &str,
    tags: &[String],
) -> Result<()> {
    let output = SearchOutput {
        query,
        tags,
        total_hits: result.total_hits,
        returned: result.notes.len(),
        elapsed_ms: result.elapsed.as_millis() as u64,
        notes: &result.notes,
    };
    serde_json::to_writer(&mut *out, &output)?;
    writeln!(out)?;
    Ok(())
}

/// All fields of one note.
pub fn format_note(out: &mut impl Write, note: &Note) -> Result<()> {
    let id = note.id.as_deref().unwrap_or_default();
    writeln!(out, "#{} {}", short_of(id), note.description)?;
    writeln!(out, "  id:       {id}")?;
    if !note.tags.is_empty() {
        writeln!(out, "  tags:     {}", note.tags.join(", "))?;
    }
    writeln!(out, "  created:  {}", note.create_date)?;
    writeln!(out, "  modified: {}", note.modify_date)?;
    if !note.attachments.is_empty() {
        writeln!(out, "  attachments:")?;
        for attachment in &note.attachments {
            writeln!(out, "    - {}", describe_attachment(attachment))?;
        }
    }
    Ok(())
}

pub fn format_note_json(out: &mut impl Write, note: &Note) -> Result<()> {
    serde_json::to_writer(&mut *out, note)?;
    writeln!(out)?;
    Ok(())
}

pub fn format_tags(
    out: &mut impl Write,
    tags: &[String],
    json: bool,
) -> Result<()> {
    if json {
        serde_json::to_writer(&mut *out, tags)?;
        writeln!(out)?;
    } else if tags.is_empty() {
        writeln!(out, "No tags.")?;
    } else {
        for tag in tags {
            writeln!(out, "{tag}")?;
        }
    }
    Ok(())
}

fn write_summary(out: &mut impl Write, note: &Note) -> Result<()> {
    let id = note.id.as_deref().unwrap_or_default();
    let first_line = note.description.lines().next().unwrap_or_default();
    write!(out, "#{}  {}  {first_line}", short_of(id), note.modify_date)?;
    if !note.tags.is_empty() {
        write!(out, "  [{}]", note.tags.join(", "))?;
    }
    match note.attachments.len() {
        0 => writeln!(out)?,
        1 => writeln!(out, "  (1 attachment)")?,
        n => writeln!(out, "  ({n} attachments)")?,
    }
    Ok(())
}

fn describe_attachment(attachment: &Attachment) -> String {
    let target = match (&attachment.file_path, &attachment.http_url) {
        (Some(path), _) => path.display().to_string(),
        (None, Some(url)) => url.clone(),
        (None, None) => String::new(),
    };
    match (&attachment.note, target.is_empty()) {
        (Some(note), true) => note.clone(),
        (Some(note), false) => format!("{target} ({note})"),
        (None, _) => target,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn render(f: impl FnOnce(&mut Vec<u8>) -> Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn sample() -> Note {
        Note::new(
            "Quarterly review\nsecond line",
            vec!["work".into(), "q3".into()],
            vec![
                Attachment::file("/data/attachments/x/deck.pdf", Some("slides".into())),
                Attachment::url("https://example.com", None),
                Attachment {
                    note: Some("call Sam first".into()),
                    ..Attachment::default()
                },
            ],
        )
        .with_id("abcdef123456")
    }

    fn result(notes: Vec<Note>) -> SearchResult {
        SearchResult {
            total_hits: notes.len(),
            notes,
            elapsed: Duration::from_millis(3),
        }
    }

    #[test]
    fn human_output_lists_one_line_per_note() {
        let text = render(|out| format_human(out, &result(vec![sample()])));
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("#abcdef  "));
        assert!(first.contains("Quarterly review  [work, q3]  (3 attachments)"));
        assert!(!first.contains("second line"));
        assert!(text.contains("1 of 1 note(s) in 3 ms"));
    }

    #[test]
    fn human_output_for_no_results() {
        let text = render(|out| format_human(out, &result(vec![])));
        assert_eq!(text, "No notes found.\n");
    }

    #[test]
    fn json_output_is_parseable() {
        let tags = vec!["work".to_string()];
        let text = render(|out| {
            format_json(out, &result(vec![sample()]), "review", &tags)
        });
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["query"], "review");
        assert_eq!(value["total_hits"], 1);
        assert_eq!(value["notes"][0]["id"], "abcdef123456");
        assert_eq!(value["notes"][0]["attachments"][1]["httpUrl"], "https://example.com");
    }

    #[test]
    fn note_details_describe_each_attachment() {
        let text = render(|out| format_note(out, &sample()));
        assert!(text.contains("  id:       abcdef123456"));
        assert!(text.contains("    - /data/attachments/x/deck.pdf (slides)"));
        assert!(text.contains("    - https://example.com\n"));
        assert!(text.contains("    - call Sam first\n"));
    }

    #[test]
    fn tags_render_as_lines_or_json() {
        let tags = vec!["a".to_string(), "b".to_string()];
        assert_eq!(render(|out| format_tags(out, &tags, false)), "a\nb\n");
        assert_eq!(render(|out| format_tags(out, &tags, true)), "[\"a\",\"b\"]\n");
        assert_eq!(render(|out| format_tags(out, &[], false)), "No tags.\n");
    }
}
