use crate::qa::QaPair;

pub const NO_QUESTION: &str = "No question available";
pub const NO_ANSWER: &str = "No answer available";

/// Everything rendered into one per-trial output document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrialDocument {
    /// Run-level heading, e.g. `Clinical Trials Data ALK - Document 3`.
    pub heading: String,
    pub title: String,
    /// Sub-heading carrying the trial link.
    pub link_heading: String,
    /// Filtered record, verbatim.
    pub body: String,
    pub question: String,
    pub answer: String,
    /// False when the question/answer are placeholders.
    pub answered: bool,
}

/// Output file naming: `<prefix>_data_<geneShort><index>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLocation {
    pub file_prefix: String,
    pub gene_short: String,
    pub index: usize,
}

impl DocumentLocation {
    pub fn file_stem(&self) -> String {
        format!("{}_data_{}{}", self.file_prefix, self.gene_short, self.index)
    }
}

pub fn assemble(
    gene_short: &str,
    index: usize,
    title: &str,
    link: &str,
    body: &str,
    qa: Option<&QaPair>,
) -> TrialDocument {
    let (question, answer) = match qa {
        Some(pair) => (pair.question.clone(), pair.answer.clone()),
        None => (NO_QUESTION.to_string(), NO_ANSWER.to_string()),
    };
    TrialDocument {
        heading: format!("Clinical Trials Data {} - Document {}", gene_short, index),
        title: title.to_string(),
        link_heading: format!("Clinical Trial: {}", link),
        body: body.to_string(),
        question,
        answer,
        answered: qa.is_some(),
    }
}
