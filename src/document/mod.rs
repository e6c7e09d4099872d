//! Task document model: a title plus ordered `## Section` blocks.
//!
//! On disk a task file is a YAML header block (see [`frontmatter`]), a
//! `# Title` line and one or more `## SectionName` blocks. Canonical sections
//! are written first in canonical order; custom sections follow in the order
//! they were added. The `Tasks` section is a checklist of `- [ ]` items.

pub mod frontmatter;
pub mod normalize;

pub use frontmatter::Frontmatter;
pub use normalize::{MetaField, normalize};

use crate::error::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Sections every task document is expected to carry, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalSection {
    Instruction,
    Tasks,
    Deliverable,
    Log,
}

impl CanonicalSection {
    pub const ALL: [CanonicalSection; 4] = [
        CanonicalSection::Instruction,
        CanonicalSection::Tasks,
        CanonicalSection::Deliverable,
        CanonicalSection::Log,
    ];

    /// Lower-cased lookup key.
    pub fn key(&self) -> &'static str {
        match self {
            CanonicalSection::Instruction => "instruction",
            CanonicalSection::Tasks => "tasks",
            CanonicalSection::Deliverable => "deliverable",
            CanonicalSection::Log => "log",
        }
    }

    /// Heading written to disk.
    pub fn heading(&self) -> &'static str {
        match self {
            CanonicalSection::Instruction => "Instruction",
            CanonicalSection::Tasks => "Tasks",
            CanonicalSection::Deliverable => "Deliverable",
            CanonicalSection::Log => "Log",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

/// One checkbox line of the `Tasks` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub done: bool,
    pub text: String,
}

impl ChecklistItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            done: false,
            text: text.into(),
        }
    }

    fn render(&self) -> String {
        format!("- [{}] {}", if self.done { "x" } else { " " }, self.text)
    }
}

/// Body of a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum SectionBody {
    Text(String),
    Checklist(Vec<ChecklistItem>),
}

impl SectionBody {
    /// Textual form as written under the heading.
    pub fn render(&self) -> String {
        match self {
            SectionBody::Text(text) => text.clone(),
            SectionBody::Checklist(items) => items
                .iter()
                .map(ChecklistItem::render)
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SectionBody::Text(text) => text.trim().is_empty(),
            SectionBody::Checklist(items) => items.is_empty(),
        }
    }
}

/// A named section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading as written (case preserved).
    pub name: String,
    pub body: SectionBody,
}

impl Section {
    pub fn key(&self) -> String {
        section_key(&self.name)
    }
}

fn section_key(name: &str) -> String {
    name.trim().to_lowercase()
}

static CHECKBOX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[-*+]\s+\[([ xX])\]\s?(.*)$").expect("checkbox pattern is valid")
});

/// Parse checklist lines; `None` when any non-blank line is not a checkbox.
fn parse_checklist(text: &str) -> Option<Vec<ChecklistItem>> {
    let mut items = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let caps = CHECKBOX.captures(line)?;
        items.push(ChecklistItem {
            done: &caps[1] != " ",
            text: caps[2].trim_end().to_string(),
        });
    }
    Some(items)
}

/// Build the body for a section key from raw text.
fn body_for(key: &str, text: &str) -> SectionBody {
    if key == CanonicalSection::Tasks.key()
        && let Some(items) = parse_checklist(text)
    {
        return SectionBody::Checklist(items);
    }
    SectionBody::Text(text.to_string())
}

/// Trim blank lines around a block and trailing whitespace on each line.
fn tidy(lines: &[&str]) -> String {
    let cleaned: Vec<&str> = lines.iter().map(|l| l.trim_end()).collect();
    let start = cleaned.iter().position(|l| !l.is_empty()).unwrap_or(cleaned.len());
    let end = cleaned.iter().rposition(|l| !l.is_empty()).map_or(start, |i| i + 1);
    cleaned[start..end].join("\n")
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// A line the reader treats as structure: a section heading or a fence.
fn is_marker(line: &str) -> bool {
    line.starts_with("## ") || is_fence(line)
}

/// Backslashes in front of a marker; the reader drops exactly one.
fn is_escaped(line: &str) -> bool {
    line.starts_with('\\') && is_marker(line.trim_start_matches('\\'))
}

/// Escape a block so it reads back as the same text.
///
/// Headings outside code fences, an unmatched trailing fence and lines that
/// already look escaped get one leading backslash.
fn escape_block(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let fences: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !is_escaped(line) && is_fence(line))
        .map(|(idx, _)| idx)
        .collect();
    let unmatched = if fences.len() % 2 == 1 {
        fences.last().copied()
    } else {
        None
    };

    let mut in_fence = false;
    let mut out = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let escape = if is_escaped(line) || unmatched == Some(idx) {
            true
        } else if is_fence(line) {
            in_fence = !in_fence;
            false
        } else {
            !in_fence && line.starts_with("## ")
        };
        if escape {
            out.push(format!("\\{}", line));
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

/// Checklist text on a single line, as it is written.
fn one_line(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join(" ").trim_end().to_string()
}

/// Title plus ordered named sections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDocument {
    pub title: String,
    /// Free text between the title line and the first section.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub preamble: String,
    /// Sections in insertion order, unique by lower-cased name.
    sections: Vec<Section>,
}

impl TaskDocument {
    /// New document with empty canonical sections.
    pub fn new(title: impl Into<String>) -> Self {
        let mut doc = Self {
            title: title.into(),
            ..Default::default()
        };
        for section in CanonicalSection::ALL {
            doc.set_section(section.heading(), "");
        }
        doc
    }

    /// Parse a full document (header block, title, sections).
    ///
    /// The header must be well formed if present; its contents are returned
    /// by [`parse_task_file`].
    pub fn parse(raw: &str) -> StoreResult<Self> {
        parse_task_file(raw).map(|(_, doc)| doc)
    }

    /// Parse section blocks only, with no header and no title line.
    pub fn parse_content(raw: &str) -> StoreResult<Self> {
        let lines: Vec<&str> = raw.lines().collect();
        let mut doc = Self::default();
        doc.read_sections(&lines, 1)?;
        Ok(doc)
    }

    fn parse_body(body: &str, first_line: usize) -> StoreResult<Self> {
        let lines: Vec<&str> = body.lines().collect();

        let Some(title_idx) = lines.iter().position(|l| !l.trim().is_empty()) else {
            return Err(StoreError::parse("Missing title line", Some(first_line)));
        };
        let title_line = lines[title_idx].trim();
        let Some(title) = title_line.strip_prefix("# ") else {
            return Err(StoreError::parse(
                format!("Expected '# Title' line, found '{}'", title_line),
                Some(first_line + title_idx),
            ));
        };

        let mut doc = Self {
            title: title.trim().to_string(),
            ..Default::default()
        };
        doc.read_sections(&lines[title_idx + 1..], first_line + title_idx + 1)?;
        Ok(doc)
    }

    fn read_sections(&mut self, lines: &[&str], first_line: usize) -> StoreResult<()> {
        let mut current: Option<String> = None;
        let mut buffer: Vec<&str> = Vec::new();
        let mut in_fence = false;

        for (offset, line) in lines.iter().enumerate() {
            if is_escaped(line) {
                buffer.push(&line[1..]);
                continue;
            }
            if is_fence(line) {
                in_fence = !in_fence;
            }

            let heading = if in_fence { None } else { line.strip_prefix("## ") };
            match heading {
                Some(name) => {
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(StoreError::parse(
                            "Section heading without a name",
                            Some(first_line + offset),
                        ));
                    }
                    self.flush(current.take(), &buffer);
                    buffer.clear();
                    current = Some(name.to_string());
                }
                None => buffer.push(line),
            }
        }
        self.flush(current, &buffer);
        Ok(())
    }

    fn flush(&mut self, name: Option<String>, buffer: &[&str]) {
        let text = tidy(buffer);
        match name {
            Some(name) => match self.position(&name) {
                // Repeated headings fold into the first occurrence.
                Some(idx) => {
                    let existing = self.sections[idx].body.render();
                    let merged = if existing.is_empty() {
                        text
                    } else if text.is_empty() {
                        existing
                    } else {
                        format!("{}\n\n{}", existing, text)
                    };
                    self.sections[idx].body = body_for(&section_key(&name), &merged);
                }
                None => self.sections.push(Section {
                    body: body_for(&section_key(&name), &text),
                    name,
                }),
            },
            None => self.preamble = text,
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        let key = section_key(name);
        self.sections.iter().position(|s| s.key() == key)
    }

    /// Sections in insertion order.
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Sections in write order: canonical first, then custom ones as added.
    pub fn ordered_sections(&self) -> Vec<&Section> {
        let mut ordered: Vec<&Section> = CanonicalSection::ALL
            .iter()
            .filter_map(|c| self.section(c.key()))
            .collect();
        ordered.extend(
            self.sections
                .iter()
                .filter(|s| CanonicalSection::from_key(&s.key()).is_none()),
        );
        ordered
    }

    /// Lower-cased section keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.sections.iter().map(Section::key).collect()
    }

    /// Case-insensitive section lookup.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.position(name).map(|idx| &self.sections[idx])
    }

    /// Rendered text of a section.
    pub fn section_text(&self, name: &str) -> Option<String> {
        self.section(name).map(|s| s.body.render())
    }

    /// Replace (or append) a section from raw text.
    pub fn set_section(&mut self, name: &str, text: &str) {
        let key = section_key(name);
        let body = body_for(&key, &tidy(&text.lines().collect::<Vec<_>>()));
        match self.position(name) {
            Some(idx) => self.sections[idx].body = body,
            None => {
                let name = CanonicalSection::from_key(&key)
                    .map(|c| c.heading().to_string())
                    .unwrap_or_else(|| name.trim().to_string());
                self.sections.push(Section { name, body });
            }
        }
    }

    /// Remove a section, returning it if present.
    pub fn remove_section(&mut self, name: &str) -> Option<Section> {
        self.position(name).map(|idx| self.sections.remove(idx))
    }

    /// Checklist items of the `Tasks` section (empty when absent or free text).
    pub fn checklist(&self) -> Vec<ChecklistItem> {
        match self.section(CanonicalSection::Tasks.key()).map(|s| &s.body) {
            Some(SectionBody::Checklist(items)) => items.clone(),
            _ => Vec::new(),
        }
    }

    /// Replace the `Tasks` section with the given items.
    ///
    /// Item text is folded onto one line.
    pub fn set_checklist(&mut self, items: Vec<ChecklistItem>) {
        let items = items
            .into_iter()
            .map(|item| ChecklistItem {
                text: one_line(&item.text),
                ..item
            })
            .collect();
        let body = SectionBody::Checklist(items);
        match self.position(CanonicalSection::Tasks.key()) {
            Some(idx) => self.sections[idx].body = body,
            None => self.sections.push(Section {
                name: CanonicalSection::Tasks.heading().to_string(),
                body,
            }),
        }
    }

    /// Flip the done flag of the checklist item at `index`, returning its new state.
    pub fn toggle_item(&mut self, index: usize) -> StoreResult<bool> {
        let mut items = self.checklist();
        let len = items.len();
        let item = items.get_mut(index).ok_or_else(|| {
            StoreError::invalid_value(
                "tasks",
                format!("Checklist has {} items, no item at index {}", len, index),
            )
        })?;
        item.done = !item.done;
        let done = item.done;
        self.set_checklist(items);
        Ok(done)
    }

    /// Append a timestamped line to the `Log` section.
    pub fn append_log(&mut self, entry: &str, at: DateTime<Utc>) {
        let line = format!("- {}: {}", at.format("%Y-%m-%d %H:%M"), entry.trim());
        let existing = self
            .section_text(CanonicalSection::Log.key())
            .unwrap_or_default();
        let text = if existing.is_empty() {
            line
        } else {
            format!("{}\n{}", existing, line)
        };
        self.set_section(CanonicalSection::Log.heading(), &text);
    }

    /// Fill sections that are missing or empty here from `template`.
    pub fn fill_from(&mut self, template: &TaskDocument) {
        for section in template.sections() {
            let empty_here = self
                .section(&section.name)
                .map_or(true, |s| s.body.is_empty());
            if empty_here {
                self.set_section(&section.name, &section.body.render());
            }
        }
        if self.preamble.is_empty() {
            self.preamble = template.preamble.clone();
        }
    }

    /// Content-only serialization: sections without title or header.
    pub fn to_content(&self) -> String {
        let mut out = String::new();
        for section in self.ordered_sections() {
            out.push_str("## ");
            out.push_str(&section.name);
            out.push_str("\n\n");
            let body = escape_block(&section.body.render());
            if !body.is_empty() {
                out.push_str(&body);
                out.push_str("\n\n");
            }
        }
        while out.ends_with("\n\n") {
            out.pop();
        }
        out
    }

    /// Title line, preamble and sections (no header block).
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n", self.title);
        if !self.preamble.is_empty() {
            out.push_str(&escape_block(&self.preamble));
            out.push_str("\n\n");
        }
        out.push_str(&self.to_content());
        if !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }
}

/// Parse a complete task file into its header and document.
pub fn parse_task_file(raw: &str) -> StoreResult<(Frontmatter, TaskDocument)> {
    let (header, body, first_line) = frontmatter::split(raw)?;
    let frontmatter = match header {
        Some(text) => Frontmatter::parse(text)?,
        None => Frontmatter::default(),
    };
    let doc = TaskDocument::parse_body(body, first_line)?;
    Ok((frontmatter, doc))
}

/// Serialize a header and document into the on-disk text.
pub fn serialize_task_file(frontmatter: &Frontmatter, doc: &TaskDocument) -> StoreResult<String> {
    let mut out = frontmatter.render()?;
    out.push('\n');
    out.push_str(&doc.to_markdown());
    Ok(out)
}
