//! Markdown rendering of highlights into sink notes.
//!
//! Every function here is pure: the same input always renders byte-identical
//! output.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{BASE_TAG, UNKNOWN_DATE, UNTITLED};
use crate::models::{source_label, Book, Highlight, Note};

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

/// Ordered, duplicate-free tag list.
#[derive(Debug, Default)]
struct TagSet {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl TagSet {
    fn push(&mut self, tag: String) {
        if self.seen.insert(tag.clone()) {
            self.ordered.push(tag);
        }
    }

    /// Base tag, then source, then category.
    fn push_book_tags(&mut self, source: &str, book: Option<&Book>) {
        self.push(BASE_TAG.to_string());
        self.push(tag_from(source));
        if let Some(category) = book.and_then(|b| b.category.as_deref()) {
            if !category.is_empty() {
                self.push(tag_from(category));
            }
        }
    }

    fn push_highlight_tags(&mut self, highlight: &Highlight) {
        for tag in &highlight.tags {
            self.push(tag_from(&tag.name));
        }
    }

    fn render(&self) -> String {
        self.ordered.join(" ")
    }
}

/// `#` + lowercased label with whitespace runs collapsed to `-`.
fn tag_from(label: &str) -> String {
    format!("#{}", WHITESPACE_RUN.replace_all(&label.to_lowercase(), "-"))
}

/// Long US date ("March 5, 2024") or [`UNKNOWN_DATE`].
pub fn format_date(value: Option<&str>) -> String {
    value
        .and_then(crate::models::parse_timestamp)
        .map(|dt: DateTime<Utc>| dt.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| UNKNOWN_DATE.to_string())
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Render one highlight as a standalone note.
pub fn format_highlight(highlight: &Highlight, book: Option<&Book>) -> Note {
    let title = book
        .map(|b| b.title.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED);
    let source = source_label(book, highlight);

    let mut content = format!("# {}\n\n", title);

    if let Some(author) = non_blank(book.and_then(|b| b.author.as_deref())) {
        content.push_str(&format!("**Author:** {}\n\n", author));
    }

    content.push_str(&format!("> {}\n\n", highlight.text));

    if let Some(note) = non_blank(highlight.note.as_deref()) {
        content.push_str(&format!("**My Note:** {}\n\n", note));
    }

    content.push_str("---\n\n");
    content.push_str(&format!("**Source:** {}\n", source));
    content.push_str(&format!(
        "**Highlighted:** {}\n",
        format_date(highlight.highlighted_at.as_deref())
    ));
    push_location_lines(&mut content, highlight);

    let mut tags = TagSet::default();
    tags.push_book_tags(&source, book);
    tags.push_highlight_tags(highlight);
    content.push_str(&format!("\n{}", tags.render()));

    Note {
        content,
        created_at: highlight.highlighted_at.clone(),
    }
}

fn push_location_lines(content: &mut String, highlight: &Highlight) {
    if let Some(location) = highlight.location {
        content.push_str(&format!("**Location:** {}\n", location));
    }
    if let Some(url) = non_blank(highlight.url.as_deref()) {
        content.push_str(&format!("**URL:** {}\n", url));
    }
}

fn book_index(books: &[Book]) -> HashMap<i64, &Book> {
    books.iter().map(|b| (b.id, b)).collect()
}

/// Render every highlight individually, in input order.
pub fn format_batch(highlights: &[Highlight], books: &[Book]) -> Vec<Note> {
    let index = book_index(books);
    highlights
        .iter()
        .map(|h| {
            let book = h.book_id.and_then(|id| index.get(&id).copied());
            format_highlight(h, book)
        })
        .collect()
}

/// Render one note per book, plus one note per highlight whose book is unknown.
///
/// Books appear in order of their first highlight; ungrouped notes follow in
/// original highlight order.
pub fn format_grouped_by_book(highlights: &[Highlight], books: &[Book]) -> Vec<Note> {
    let index = book_index(books);

    let mut order: Vec<i64> = Vec::new();
    let mut groups: HashMap<i64, Vec<&Highlight>> = HashMap::new();
    let mut ungrouped: Vec<&Highlight> = Vec::new();

    for highlight in highlights {
        match highlight.book_id.filter(|id| index.contains_key(id)) {
            Some(book_id) => {
                let entry = groups.entry(book_id).or_default();
                if entry.is_empty() {
                    order.push(book_id);
                }
                entry.push(highlight);
            }
            None => ungrouped.push(highlight),
        }
    }

    let mut notes: Vec<Note> = order
        .iter()
        .filter_map(|id| Some(format_book_group(index.get(id)?, groups.get(id)?)))
        .collect();

    notes.extend(ungrouped.into_iter().map(|h| format_highlight(h, None)));
    notes
}

fn format_book_group(book: &Book, highlights: &[&Highlight]) -> Note {
    let title = if book.title.is_empty() {
        UNTITLED
    } else {
        book.title.as_str()
    };
    let source = highlights
        .first()
        .map(|h| source_label(Some(book), h))
        .unwrap_or_else(|| crate::defaults::UNKNOWN_SOURCE.to_string());

    let mut content = format!("# {}\n\n", title);

    if let Some(author) = non_blank(book.author.as_deref()) {
        content.push_str(&format!("**Author:** {}\n", author));
    }
    content.push_str(&format!("**Source:** {}\n", source));
    if let Some(category) = non_blank(book.category.as_deref()) {
        content.push_str(&format!("**Category:** {}\n", category));
    }
    content.push_str(&format!("**Highlights:** {}\n\n", highlights.len()));
    content.push_str("---\n\n");

    let mut tags = TagSet::default();
    tags.push_book_tags(&source, Some(book));

    for (idx, highlight) in highlights.iter().enumerate() {
        content.push_str(&format!("## {}.\n\n", idx + 1));
        content.push_str(&format!("> {}\n\n", highlight.text));
        if let Some(note) = non_blank(highlight.note.as_deref()) {
            content.push_str(&format!("**My Note:** {}\n\n", note));
        }
        content.push_str(&format!(
            "**Highlighted:** {}\n",
            format_date(highlight.highlighted_at.as_deref())
        ));
        push_location_lines(&mut content, highlight);
        content.push('\n');

        tags.push_highlight_tags(highlight);
    }

    content.push_str("---\n\n");
    content.push_str(&tags.render());

    Note {
        content,
        created_at: highlights.first().and_then(|h| h.highlighted_at.clone()),
    }
}
