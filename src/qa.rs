//! Question/answer generation for one filtered trial record.
//!
//! Generator failures are retried up to a fixed attempt budget and then
//! absorbed: the caller always gets a `QaOutcome`, never an error.

use std::time::Duration;

use tracing::{debug, warn};

use crate::gemini::AnswerGenerator;

/// Attempt budget and inter-attempt delay for the generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(20));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QaOutcome {
    /// `None` once the attempt budget is exhausted.
    pub pair: Option<QaPair>,
    pub attempts: u32,
}

/// The eligibility question shown in the document, without the record.
pub fn display_question(gene: &str) -> String {
    format!(
        "Based on the following clinical trial information, would a patient with a {} gene mutation be eligible for the clinical trial?",
        gene
    )
}

/// The prompt sent to the generator: the display question followed by the record.
pub fn prompt(gene: &str, context: &str) -> String {
    format!("{} {}", display_question(gene), context)
}

pub struct QaGenerator<G> {
    generator: G,
    policy: RetryPolicy,
}

impl<G: AnswerGenerator> QaGenerator<G> {
    pub fn new(generator: G, policy: RetryPolicy) -> Self {
        QaGenerator { generator, policy }
    }

    pub async fn generate(&self, gene: &str, context: &str) -> QaOutcome {
        let question = prompt(gene, context);
        let mut attempts = 0;

        while attempts < self.policy.max_attempts {
            match self.generator.generate(&question).await {
                Ok(answer) => {
                    attempts += 1;
                    debug!(gene, attempts, "answer generated");
                    return QaOutcome {
                        pair: Some(QaPair {
                            question: display_question(gene),
                            answer,
                        }),
                        attempts,
                    };
                }
                Err(e) => {
                    let delay = self.policy.backoff(attempts);
                    attempts += 1;
                    warn!(
                        "Generation failed for {} (attempt {}/{}): {}",
                        gene, attempts, self.policy.max_attempts, e
                    );
                    if attempts < self.policy.max_attempts && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        QaOutcome {
            pair: None,
            attempts,
        }
    }
}
