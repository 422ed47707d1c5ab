use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use docx_rs::{BreakType, Docx, Paragraph, Run, Style, StyleType};

use crate::document::{DocumentLocation, TrialDocument};

const QA_COLOR: &str = "FF0000";
const HEADING_1: &str = "Heading1";
const HEADING_2: &str = "Heading2";

/// Durable storage for assembled documents.
pub trait DocumentSink {
    /// Persist `doc` and return where it went.
    fn persist(&mut self, doc: &TrialDocument, location: &DocumentLocation) -> Result<PathBuf>;
}

/// Writes one `.docx` file per document into a single folder.
pub struct DocxSink {
    folder: PathBuf,
}

impl DocxSink {
    pub fn new(folder: &Path) -> Result<Self> {
        std::fs::create_dir_all(folder)
            .with_context(|| format!("Failed to create output folder {:?}", folder))?;
        Ok(DocxSink {
            folder: folder.to_path_buf(),
        })
    }

    pub fn path_for(&self, location: &DocumentLocation) -> PathBuf {
        self.folder.join(format!("{}.docx", location.file_stem()))
    }
}

impl DocumentSink for DocxSink {
    fn persist(&mut self, doc: &TrialDocument, location: &DocumentLocation) -> Result<PathBuf> {
        let path = self.path_for(location);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create {:?}", path))?;
        render(doc)
            .build()
            .pack(file)
            .with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

fn render(doc: &TrialDocument) -> Docx {
    Docx::new()
        .add_style(
            Style::new(HEADING_1, StyleType::Paragraph)
                .name("Heading 1")
                .size(32)
                .bold(),
        )
        .add_style(
            Style::new(HEADING_2, StyleType::Paragraph)
                .name("Heading 2")
                .size(26)
                .bold(),
        )
        .add_paragraph(heading(&doc.heading, HEADING_1))
        .add_paragraph(heading(&doc.title, HEADING_1))
        .add_paragraph(heading(&doc.link_heading, HEADING_2))
        .add_paragraph(add_lines(Paragraph::new(), &Run::new(), &doc.body))
        .add_paragraph(labeled("Question:", &doc.question))
        .add_paragraph(labeled("Answer:", &doc.answer))
        .add_paragraph(Paragraph::new())
}

fn heading(text: &str, style: &str) -> Paragraph {
    Paragraph::new()
        .add_run(Run::new().add_text(text))
        .style(style)
}

/// Append `text` to `p`, one run per line, separated by line breaks.
fn add_lines(mut p: Paragraph, template: &Run, text: &str) -> Paragraph {
    for (i, line) in text.lines().enumerate() {
        let mut run = template.clone();
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        p = p.add_run(run.add_text(line));
    }
    p
}

fn labeled(label: &str, text: &str) -> Paragraph {
    let red = Run::new().color(QA_COLOR);
    let p = Paragraph::new().add_run(
        red.clone()
            .add_text(label)
            .add_break(BreakType::TextWrapping),
    );
    add_lines(p, &red, text)
}
