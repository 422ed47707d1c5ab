//! Cohort runs: fetch → filter → generate → assemble → persist, one link at a time.
//!
//! Fetch and generation failures stay inside their item. Persistence failures
//! end the run unless the sink policy says to skip the item.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};

use crate::cohort::GeneCohort;
use crate::document::{self, DocumentLocation};
use crate::filter::filter_record;
use crate::gemini::AnswerGenerator;
use crate::qa::QaGenerator;
use crate::sink::DocumentSink;
use crate::source::RecordSource;
use crate::utils::trial_id_from_url;

/// What to do when the document sink fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkFailurePolicy {
    /// Stop the whole run.
    #[default]
    Abort,
    /// Log, record, and continue with the next link. The index stays consumed.
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Malformed {
        link: String,
        error: String,
    },
    FetchFailed {
        link: String,
        trial_id: String,
        status: Option<u16>,
        error: String,
        latency_ms: i64,
    },
    Written {
        index: usize,
        link: String,
        trial_id: String,
        title: String,
        path: PathBuf,
        answered: bool,
        attempts: u32,
        latency_ms: i64,
    },
    SinkFailed {
        index: usize,
        link: String,
        trial_id: String,
        error: String,
    },
}

/// Result of one cohort run, outcomes in link order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CohortReport {
    pub gene: String,
    pub gene_short: String,
    pub outcomes: Vec<ItemOutcome>,
}

impl CohortReport {
    pub fn new(cohort: &GeneCohort) -> Self {
        CohortReport {
            gene: cohort.gene.clone(),
            gene_short: cohort.short_name().to_string(),
            outcomes: Vec::with_capacity(cohort.links.len()),
        }
    }

    pub fn written(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Written { .. }))
            .count()
    }

    pub fn fetch_failures(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::FetchFailed { .. }))
            .count()
    }

    /// Indices of documents written with placeholder Q/A.
    pub fn unanswered(&self) -> Vec<usize> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                ItemOutcome::Written {
                    index,
                    answered: false,
                    ..
                } => Some(*index),
                _ => None,
            })
            .collect()
    }
}

pub struct BatchRunner<S, G, D> {
    source: S,
    qa: QaGenerator<G>,
    sink: D,
    file_prefix: String,
    sink_failure: SinkFailurePolicy,
    show_progress: bool,
}

impl<S, G, D> BatchRunner<S, G, D>
where
    S: RecordSource,
    G: AnswerGenerator,
    D: DocumentSink,
{
    pub fn new(source: S, qa: QaGenerator<G>, sink: D, file_prefix: &str) -> Self {
        BatchRunner {
            source,
            qa,
            sink,
            file_prefix: file_prefix.to_string(),
            sink_failure: SinkFailurePolicy::default(),
            show_progress: true,
        }
    }

    pub fn with_sink_failure(mut self, policy: SinkFailurePolicy) -> Self {
        self.sink_failure = policy;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Process every link of `cohort` in order, appending one outcome per link
    /// to `report`. Documents are numbered from 1 per successfully fetched link.
    ///
    /// On an aborting sink failure the error is returned and `report` keeps
    /// every outcome up to and including the failed item.
    pub async fn run_cohort(
        &mut self,
        cohort: &GeneCohort,
        report: &mut CohortReport,
    ) -> Result<()> {
        let gene_short = report.gene_short.clone();
        let pb = if self.show_progress {
            let pb = ProgressBar::new(cohort.links.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{prefix:>6} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
                    .progress_chars("=> "),
            );
            pb.set_prefix(gene_short.clone());
            pb
        } else {
            ProgressBar::hidden()
        };

        let outcomes = &mut report.outcomes;
        let mut index = 0usize;

        for link in &cohort.links {
            let trial_id = match trial_id_from_url(link) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping {}: {}", link, e);
                    outcomes.push(ItemOutcome::Malformed {
                        link: link.clone(),
                        error: e.to_string(),
                    });
                    pb.inc(1);
                    continue;
                }
            };
            pb.set_message(trial_id.clone());

            let start = Instant::now();
            let fetched = self.source.fetch(&trial_id).await;
            let latency_ms = start.elapsed().as_millis() as i64;

            let record = match fetched {
                Ok(record) => record,
                Err(e) => {
                    warn!("Failed to fetch data for {}: {}", trial_id, e);
                    outcomes.push(ItemOutcome::FetchFailed {
                        link: link.clone(),
                        trial_id,
                        status: e.status(),
                        error: e.to_string(),
                        latency_ms,
                    });
                    pb.inc(1);
                    continue;
                }
            };
            index += 1;

            let excerpt = filter_record(&record.raw);
            let qa = self.qa.generate(&cohort.gene, &excerpt).await;
            let doc = document::assemble(
                &gene_short,
                index,
                &record.title,
                link,
                &excerpt,
                qa.pair.as_ref(),
            );
            if !doc.answered {
                warn!(
                    "{} could not get an answer after {} attempts",
                    doc.heading, qa.attempts
                );
            }

            let location = DocumentLocation {
                file_prefix: self.file_prefix.clone(),
                gene_short: gene_short.clone(),
                index,
            };
            match self.sink.persist(&doc, &location) {
                Ok(path) => outcomes.push(ItemOutcome::Written {
                    index,
                    link: link.clone(),
                    trial_id,
                    title: record.title,
                    path,
                    answered: doc.answered,
                    attempts: qa.attempts,
                    latency_ms,
                }),
                Err(e) => {
                    warn!("Failed to save {}: {:#}", location.file_stem(), e);
                    outcomes.push(ItemOutcome::SinkFailed {
                        index,
                        link: link.clone(),
                        trial_id,
                        error: format!("{:#}", e),
                    });
                    if self.sink_failure == SinkFailurePolicy::Abort {
                        pb.abandon();
                        return Err(e.context(format!("Failed to save {}", location.file_stem())));
                    }
                }
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        info!(
            "{}: {} documents written, {} fetch failures, {} unanswered",
            report.gene,
            report.written(),
            report.fetch_failures(),
            report.unanswered().len()
        );
        Ok(())
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TrialDocument;
    use crate::error::{FetchError, GenerationError};
    use crate::qa::RetryPolicy;
    use crate::source::TrialRecord;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    const RAW: &str = "{\n  \"nctId\": \"X\",\n  \"sex\": \"ALL\",\n  \"minimumAge\": \"18 Years\"\n}";

    /// Serves every id except those listed as failing.
    struct FakeSource {
        failing: HashSet<String>,
    }

    impl FakeSource {
        fn failing(ids: &[&str]) -> Self {
            FakeSource {
                failing: ids.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl RecordSource for FakeSource {
        async fn fetch(&self, trial_id: &str) -> Result<TrialRecord, FetchError> {
            if self.failing.contains(trial_id) {
                return Err(FetchError::Status(404));
            }
            Ok(TrialRecord {
                title: format!("Title {}", trial_id),
                raw: RAW.to_string(),
            })
        }
    }

    struct Echo {
        fail: bool,
    }

    impl AnswerGenerator for Echo {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            if self.fail {
                Err(GenerationError::EmptyResponse)
            } else {
                Ok("Eligible.".to_string())
            }
        }
    }

    type Saved = Arc<Mutex<Vec<(String, TrialDocument)>>>;

    /// Keeps documents in a shared list; fails for the indices listed in `fail_at`.
    #[derive(Default)]
    struct MemorySink {
        saved: Saved,
        fail_at: Vec<usize>,
    }

    impl MemorySink {
        fn failing_at(fail_at: &[usize]) -> Self {
            MemorySink {
                fail_at: fail_at.to_vec(),
                ..Default::default()
            }
        }
    }

    impl DocumentSink for MemorySink {
        fn persist(&mut self, doc: &TrialDocument, location: &DocumentLocation) -> Result<PathBuf> {
            if self.fail_at.contains(&location.index) {
                anyhow::bail!("disk full");
            }
            self.saved
                .lock()
                .unwrap()
                .push((location.file_stem(), doc.clone()));
            Ok(PathBuf::from(format!("{}.docx", location.file_stem())))
        }
    }

    fn runner(
        source: FakeSource,
        fail_generation: bool,
        sink: MemorySink,
    ) -> BatchRunner<FakeSource, Echo, MemorySink> {
        let qa = QaGenerator::new(
            Echo {
                fail: fail_generation,
            },
            RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
            },
        );
        BatchRunner::new(source, qa, sink, "clinical_trials").with_progress(false)
    }

    fn cohort(ids: &[&str]) -> GeneCohort {
        GeneCohort {
            gene: "KRAS".into(),
            short_name: None,
            links: ids
                .iter()
                .map(|id| format!("https://clinicaltrials.gov/study/{}", id))
                .collect(),
        }
    }

    async fn run(
        r: &mut BatchRunner<FakeSource, Echo, MemorySink>,
        c: &GeneCohort,
    ) -> CohortReport {
        let mut report = CohortReport::new(c);
        r.run_cohort(c, &mut report).await.unwrap();
        report
    }

    fn stems(saved: &Saved) -> Vec<String> {
        saved.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    #[tokio::test]
    async fn failed_fetch_does_not_consume_an_index() {
        let sink = MemorySink::default();
        let saved = Arc::clone(&sink.saved);
        let mut r = runner(FakeSource::failing(&["NCT2"]), false, sink);
        let report = run(&mut r, &cohort(&["NCT1", "NCT2", "NCT3"])).await;

        assert_eq!(report.written(), 2);
        assert_eq!(report.fetch_failures(), 1);
        let titled: Vec<(String, String)> = saved
            .lock()
            .unwrap()
            .iter()
            .map(|(stem, doc)| (stem.clone(), doc.title.clone()))
            .collect();
        assert_eq!(
            titled,
            vec![
                ("clinical_trials_data_KRAS1".to_string(), "Title NCT1".to_string()),
                ("clinical_trials_data_KRAS2".to_string(), "Title NCT3".to_string()),
            ]
        );
        assert!(matches!(
            &report.outcomes[1],
            ItemOutcome::FetchFailed { trial_id, status: Some(404), .. } if trial_id == "NCT2"
        ));
    }

    #[tokio::test]
    async fn document_count_matches_successful_fetches() {
        let ids = ["A1", "A2", "A3", "A4", "A5", "A6"];
        let sink = MemorySink::default();
        let saved = Arc::clone(&sink.saved);
        let mut r = runner(FakeSource::failing(&["A1", "A4", "A5"]), false, sink);
        let report = run(&mut r, &cohort(&ids)).await;
        assert_eq!(report.written(), ids.len() - 3);
        assert_eq!(saved.lock().unwrap().len(), 3);
        assert_eq!(report.outcomes.len(), ids.len());
    }

    #[tokio::test]
    async fn generation_failure_degrades_but_still_writes() {
        let sink = MemorySink::default();
        let saved = Arc::clone(&sink.saved);
        let mut r = runner(FakeSource::failing(&[]), true, sink);
        let report = run(&mut r, &cohort(&["NCT1", "NCT2"])).await;
        assert_eq!(report.written(), 2);
        assert_eq!(report.unanswered(), vec![1, 2]);
        let (_, doc) = saved.lock().unwrap()[0].clone();
        assert_eq!(doc.question, document::NO_QUESTION);
        assert_eq!(doc.answer, document::NO_ANSWER);
        assert!(matches!(report.outcomes[0], ItemOutcome::Written { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn document_carries_filtered_body_and_link() {
        let sink = MemorySink::default();
        let saved = Arc::clone(&sink.saved);
        let mut r = runner(FakeSource::failing(&[]), false, sink);
        run(&mut r, &cohort(&["NCT9"])).await;
        let (_, doc) = saved.lock().unwrap()[0].clone();
        assert_eq!(doc.heading, "Clinical Trials Data KRAS - Document 1");
        assert_eq!(doc.link_heading, "Clinical Trial: https://clinicaltrials.gov/study/NCT9");
        assert_eq!(doc.body, "  \"sex\": \"ALL\",\n  \"minimumAge\": \"18 Years\"");
        assert_eq!(doc.answer, "Eligible.");
        assert!(doc.question.contains("KRAS gene mutation"));
    }

    #[tokio::test]
    async fn malformed_link_is_skipped() {
        let sink = MemorySink::default();
        let saved = Arc::clone(&sink.saved);
        let mut r = runner(FakeSource::failing(&[]), false, sink);
        let mut c = cohort(&["NCT1"]);
        c.links.insert(0, "https://clinicaltrials.gov/".into());
        let report = run(&mut r, &c).await;
        assert_eq!(report.written(), 1);
        assert!(matches!(report.outcomes[0], ItemOutcome::Malformed { .. }));
        assert_eq!(stems(&saved), vec!["clinical_trials_data_KRAS1"]);
    }

    #[tokio::test]
    async fn sink_failure_aborts_by_default() {
        let sink = MemorySink::failing_at(&[2]);
        let saved = Arc::clone(&sink.saved);
        let mut r = runner(FakeSource::failing(&[]), false, sink);
        let c = cohort(&["NCT1", "NCT2", "NCT3"]);
        let mut report = CohortReport::new(&c);
        let err = r.run_cohort(&c, &mut report).await.unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));
        assert_eq!(stems(&saved), vec!["clinical_trials_data_KRAS1"]);
    }

    #[tokio::test]
    async fn aborted_cohort_keeps_outcomes_so_far() {
        let sink = MemorySink::failing_at(&[2]);
        let mut r = runner(FakeSource::failing(&["NCT2"]), false, sink);
        let c = cohort(&["NCT1", "NCT2", "NCT3", "NCT4"]);
        let mut report = CohortReport::new(&c);
        assert!(r.run_cohort(&c, &mut report).await.is_err());

        assert_eq!(report.gene, "KRAS");
        assert_eq!(report.outcomes.len(), 3);
        assert!(matches!(report.outcomes[0], ItemOutcome::Written { index: 1, .. }));
        assert!(matches!(report.outcomes[1], ItemOutcome::FetchFailed { .. }));
        assert!(matches!(
            &report.outcomes[2],
            ItemOutcome::SinkFailed { index: 2, trial_id, error, .. }
                if trial_id == "NCT3" && error.contains("disk full")
        ));
    }

    #[tokio::test]
    async fn sink_failure_skip_policy_continues() {
        let sink = MemorySink::failing_at(&[2]);
        let saved = Arc::clone(&sink.saved);
        let mut r = runner(FakeSource::failing(&[]), false, sink)
            .with_sink_failure(SinkFailurePolicy::Skip);
        let report = run(&mut r, &cohort(&["NCT1", "NCT2", "NCT3"])).await;
        assert_eq!(report.written(), 2);
        assert!(matches!(report.outcomes[1], ItemOutcome::SinkFailed { index: 2, .. }));
        assert_eq!(
            stems(&saved),
            vec!["clinical_trials_data_KRAS1", "clinical_trials_data_KRAS3"]
        );
    }

    #[tokio::test]
    async fn empty_cohort() {
        let mut r = runner(FakeSource::failing(&[]), false, MemorySink::default());
        let report = run(&mut r, &cohort(&[])).await;
        assert_eq!(report.written(), 0);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn report_uses_short_name() {
        let mut c = cohort(&["NCT1"]);
        c.short_name = Some("HER2".into());
        let report = CohortReport::new(&c);
        assert_eq!(report.gene, "KRAS");
        assert_eq!(report.gene_short, "HER2");
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn policy_names() {
        #[derive(Deserialize)]
        struct W {
            p: SinkFailurePolicy,
        }
        let w: W = toml::from_str("p = \"skip\"").unwrap();
        assert_eq!(w.p, SinkFailurePolicy::Skip);
    }
}
