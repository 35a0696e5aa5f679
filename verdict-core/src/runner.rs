//! The classification runner: orchestrates processing, rendering,
//! model invocation, rail parsing, and result aggregation.
//!
//! The run proceeds in stages. Data processors are applied to all rows
//! first (bounded concurrency, per-row failure isolation), then every
//! surviving row is rendered on the coordinator — so a templating
//! mistake aborts the run before a single model call is made — and
//! only then are model calls dispatched to the worker pool. Results
//! land in a pre-sized slot vector indexed by row position, so
//! out-of-order completion never disturbs output alignment.

use crate::client::ModelClient;
use crate::error::{ConfigError, RowError};
use crate::processor::DataProcessor;
use crate::rails::select_label;
use crate::retry::{RetryConfig, with_retry};
use crate::template::ClassificationTemplate;
use crate::types::{ClassificationResult, Dataset, RenderedPart, Row};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Recognized runner options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Worker pool size shared by the processing and model stages.
    /// Bounded on purpose: model providers rate-limit.
    pub concurrency: usize,
    pub provide_explanation: bool,
    pub retry: RetryConfig,
    pub normalize_case: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            provide_explanation: false,
            retry: RetryConfig::default(),
            normalize_case: true,
        }
    }
}

/// Summary statistics for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows: usize,
    pub labeled: usize,
    pub parse_misses: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunReport {
    fn collect(
        run_id: Uuid,
        model: &str,
        started_at: DateTime<Utc>,
        results: &[ClassificationResult],
    ) -> Self {
        let labeled = results.iter().filter(|r| r.is_labeled()).count();
        let cancelled = results
            .iter()
            .filter(|r| r.error == Some(RowError::Cancelled))
            .count();
        let failed = results
            .iter()
            .filter(|r| r.is_failed() && r.error != Some(RowError::Cancelled))
            .count();
        let parse_misses = results.len() - labeled - failed - cancelled;

        Self {
            run_id,
            model: model.to_string(),
            started_at,
            finished_at: Utc::now(),
            rows: results.len(),
            labeled,
            parse_misses,
            failed,
            cancelled,
        }
    }
}

/// Aggregated output of a run: one result per input row, in input
/// order, plus the run summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub results: Vec<ClassificationResult>,
    pub report: RunReport,
}

/// Orchestrates a classification run over a dataset.
///
/// The template is shared read-only across all workers; the model
/// client is the one shared collaborator and must be safe for
/// concurrent use.
pub struct ClassificationRunner {
    template: Arc<ClassificationTemplate>,
    processor: Option<Arc<dyn DataProcessor>>,
    config: RunnerConfig,
}

impl ClassificationRunner {
    pub fn new(template: ClassificationTemplate) -> Self {
        Self {
            template: Arc::new(template),
            processor: None,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_processor(mut self, processor: Arc<dyn DataProcessor>) -> Self {
        self.processor = Some(processor);
        self
    }

    /// Run to completion without external cancellation.
    pub async fn run(
        &self,
        dataset: Dataset,
        client: Arc<dyn ModelClient>,
    ) -> Result<RunOutput, ConfigError> {
        self.run_with_cancellation(dataset, client, CancellationToken::new())
            .await
    }

    /// Run with a caller-held cancellation token.
    ///
    /// On cancellation, in-flight rows are abandoned and unstarted
    /// rows are never launched; rows already completed keep their
    /// results, everything else is marked [`RowError::Cancelled`].
    pub async fn run_with_cancellation(
        &self,
        dataset: Dataset,
        client: Arc<dyn ModelClient>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, ConfigError> {
        if self.config.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let row_count = dataset.len();
        tracing::info!(
            %run_id,
            rows = row_count,
            model = client.model_name(),
            concurrency = self.config.concurrency,
            "starting classification run"
        );

        let mut slots: Vec<Option<ClassificationResult>> = vec![None; row_count];

        // Stage 1: data processing, bounded and failure-isolated.
        let processed = self.process_rows(dataset.into_rows(), &cancel).await;

        // Stage 2: render every surviving row before any model call.
        // Configuration mistakes surface here and abort the run.
        let mut tasks: Vec<(usize, Row, Vec<RenderedPart>)> = Vec::new();
        let required = self.template.variables();
        for (index, outcome) in processed.into_iter().enumerate() {
            match outcome {
                Err(error) => slots[index] = Some(ClassificationResult::failed(error)),
                Ok(row) => {
                    if self.processor.is_some() {
                        // A variable still missing after processing is a
                        // data problem for this row, not a template bug.
                        if let Some(missing) = required.iter().find(|v| !row.contains(v)) {
                            slots[index] =
                                Some(ClassificationResult::failed(RowError::DataProcessing {
                                    message: format!(
                                        "variable '{missing}' missing after processing"
                                    ),
                                }));
                            continue;
                        }
                    }
                    let parts = self.template.render(&row)?;
                    tasks.push((index, row, parts));
                }
            }
        }

        // Stage 3: model invocation and rail parsing.
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(tasks.len());
        for (index, row, parts) in tasks {
            let template = self.template.clone();
            let config = self.config.clone();
            let client = client.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            let handle = tokio::spawn(async move {
                let result =
                    classify_row(&template, &config, client.as_ref(), &semaphore, &cancel, row, parts)
                        .await;
                (index, result)
            });
            handles.push(handle);
        }

        for handle in handles {
            match handle.await {
                Ok((index, result)) => slots[index] = Some(result),
                Err(join_err) => {
                    tracing::error!(error = %join_err, "row worker panicked");
                }
            }
        }

        let results: Vec<ClassificationResult> = slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ClassificationResult::failed(RowError::ModelInvocation {
                        message: "row worker did not report a result".into(),
                    })
                })
            })
            .collect();

        let report = RunReport::collect(run_id, client.model_name(), started_at, &results);
        tracing::info!(
            %run_id,
            labeled = report.labeled,
            parse_misses = report.parse_misses,
            failed = report.failed,
            cancelled = report.cancelled,
            "classification run finished"
        );

        Ok(RunOutput { results, report })
    }

    /// Apply the data processor to every row under the concurrency
    /// limit. Without a processor, rows pass through unchanged.
    async fn process_rows(
        &self,
        rows: Vec<Row>,
        cancel: &CancellationToken,
    ) -> Vec<Result<Row, RowError>> {
        let Some(processor) = &self.processor else {
            return rows.into_iter().map(Ok).collect();
        };

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));
        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let processor = processor.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RowError::Cancelled),
                    permit = semaphore.acquire_owned() => permit.expect("semaphore closed"),
                };
                let key = row.key.clone();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(RowError::Cancelled),
                    outcome = processor.process(row) => outcome.map_err(|e| {
                        tracing::debug!(row = %key, error = %e, "data processing failed");
                        RowError::from(e)
                    }),
                }
            }));
        }

        let mut processed = Vec::with_capacity(handles.len());
        for handle in handles {
            processed.push(match handle.await {
                Ok(outcome) => outcome,
                Err(_) => Err(RowError::DataProcessing {
                    message: "processor worker panicked".into(),
                }),
            });
        }
        processed
    }
}

/// Classify one rendered row: model call with retry, rail parsing,
/// optional explanation pass. Isolated from every other row.
async fn classify_row(
    template: &ClassificationTemplate,
    config: &RunnerConfig,
    client: &dyn ModelClient,
    semaphore: &Semaphore,
    cancel: &CancellationToken,
    row: Row,
    parts: Vec<RenderedPart>,
) -> ClassificationResult {
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return ClassificationResult::failed(RowError::Cancelled),
        permit = semaphore.acquire() => permit.expect("semaphore closed"),
    };

    let raw = tokio::select! {
        biased;
        _ = cancel.cancelled() => return ClassificationResult::failed(RowError::Cancelled),
        outcome = with_retry(&config.retry, || client.generate(&parts)) => outcome,
    };

    let raw = match raw {
        Ok(text) => text,
        Err(error) => {
            tracing::debug!(row = %row.key, error = %error, "model invocation failed");
            return ClassificationResult::failed(RowError::from(error));
        }
    };

    let label = select_label(template.rails(), &raw, config.normalize_case);
    tracing::debug!(row = %row.key, label = ?label, "row classified");
    let mut result = match label {
        Some(label) => ClassificationResult::labeled(label, raw),
        None => ClassificationResult::parse_miss(raw),
    };

    if config.provide_explanation {
        if let Some(explanation) = template.explanation() {
            // The label is already secured; a cancellation or failure
            // from here on only costs the explanation.
            let mut explain_row = row;
            explain_row.set("label", result.label.clone().unwrap_or_default());

            match explanation.render(&explain_row) {
                Err(error) => {
                    tracing::warn!(row = %explain_row.key, error = %error, "explanation render failed");
                }
                Ok(explain_parts) => {
                    tokio::select! {
                        outcome = with_retry(&config.retry, || client.generate(&explain_parts)) => {
                            match outcome {
                                Ok(text) => result = result.with_explanation(text),
                                Err(error) => {
                                    tracing::warn!(row = %explain_row.key, error = %error, "explanation call failed");
                                }
                            }
                        }
                        _ = cancel.cancelled() => {}
                    }
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockModelClient;
    use crate::error::{ModelError, ProcessError};
    use crate::processor::FnProcessor;
    use crate::template::ExplanationTemplate;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn sentiment_template() -> ClassificationTemplate {
        ClassificationTemplate::builder()
            .rails(["positive", "neutral", "negative"])
            .text_part("Classify the sentiment of: {text}")
            .build()
            .unwrap()
    }

    fn dataset(items: &[&str]) -> Dataset {
        Dataset::from_items("text", items.iter().map(|s| s.to_string()).collect())
    }

    fn fast_config() -> RunnerConfig {
        RunnerConfig {
            retry: RetryConfig {
                max_retries: 1,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
                backoff_multiplier: 2.0,
                jitter: false,
            },
            ..RunnerConfig::default()
        }
    }

    #[tokio::test]
    async fn n_rows_in_n_results_out() {
        let runner = ClassificationRunner::new(sentiment_template()).with_config(fast_config());
        let client = Arc::new(MockModelClient::with_response("positive"));
        let output = runner
            .run(dataset(&["a", "b", "c"]), client)
            .await
            .unwrap();

        assert_eq!(output.results.len(), 3);
        assert!(output.results.iter().all(|r| r.label.as_deref() == Some("positive")));
        assert_eq!(output.report.labeled, 3);
        assert_eq!(output.report.rows, 3);
    }

    #[tokio::test]
    async fn results_align_with_input_order() {
        let mut config = fast_config();
        config.concurrency = 1;
        let runner = ClassificationRunner::new(sentiment_template()).with_config(config);

        // With concurrency 1 the queued replies map to rows in order.
        let client = MockModelClient::new();
        client.queue_text("negative");
        client.queue_text("neutral");
        client.queue_text("positive");

        let output = runner
            .run(dataset(&["a", "b", "c"]), Arc::new(client))
            .await
            .unwrap();
        let labels: Vec<Option<&str>> = output.results.iter().map(|r| r.label.as_deref()).collect();
        assert_eq!(
            labels,
            vec![Some("negative"), Some("neutral"), Some("positive")]
        );
    }

    #[tokio::test]
    async fn processor_failure_is_isolated_to_its_row() {
        let processor = FnProcessor::new(|row: Row| {
            if row.key.index == 2 {
                Err(ProcessError::other("fetch exploded"))
            } else {
                Ok(row)
            }
        });
        let runner = ClassificationRunner::new(sentiment_template())
            .with_config(fast_config())
            .with_processor(Arc::new(processor));
        let client = Arc::new(MockModelClient::with_response("positive"));

        let output = runner
            .run(dataset(&["r0", "r1", "r2", "r3", "r4"]), client)
            .await
            .unwrap();

        assert_eq!(output.results.len(), 5);
        for (index, result) in output.results.iter().enumerate() {
            if index == 2 {
                assert_eq!(result.label, None);
                assert!(matches!(
                    result.error,
                    Some(RowError::DataProcessing { .. })
                ));
            } else {
                assert_eq!(result.label.as_deref(), Some("positive"));
            }
        }
        assert_eq!(output.report.failed, 1);
        assert_eq!(output.report.labeled, 4);
    }

    #[tokio::test]
    async fn parse_miss_preserves_raw_response() {
        let runner = ClassificationRunner::new(sentiment_template()).with_config(fast_config());
        let client = Arc::new(MockModelClient::with_response(
            "I am not able to classify this.",
        ));
        let output = runner.run(dataset(&["a"]), client).await.unwrap();

        let result = &output.results[0];
        assert_eq!(result.label, None);
        assert_eq!(result.error, None);
        assert_eq!(result.raw_response, "I am not able to classify this.");
        assert_eq!(output.report.parse_misses, 1);
    }

    #[tokio::test]
    async fn missing_variable_aborts_before_any_model_call() {
        let runner = ClassificationRunner::new(sentiment_template()).with_config(fast_config());
        let client = Arc::new(MockModelClient::with_response("positive"));
        let bad_dataset = Dataset::from_items("wrong_name", vec!["a".into(), "b".into()]);

        let err = runner
            .run(bad_dataset, client.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingVariable { ref variable, .. } if variable == "text"));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn missing_variable_after_processing_is_row_error() {
        // Identity processor: the template variable never shows up, so
        // every row fails as a data problem instead of aborting the run.
        let runner = ClassificationRunner::new(sentiment_template())
            .with_config(fast_config())
            .with_processor(Arc::new(FnProcessor::new(|row: Row| Ok(row))));
        let client = Arc::new(MockModelClient::with_response("positive"));
        let bad_dataset = Dataset::from_items("wrong_name", vec!["a".into(), "b".into()]);

        let output = runner.run(bad_dataset, client.clone()).await.unwrap();
        assert_eq!(output.results.len(), 2);
        for result in &output.results {
            assert!(matches!(
                result.error,
                Some(RowError::DataProcessing { .. })
            ));
        }
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn concurrency_does_not_change_outcome() {
        let items = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let mut serial = fast_config();
        serial.concurrency = 1;
        let mut parallel = fast_config();
        parallel.concurrency = 8;

        let runner_serial =
            ClassificationRunner::new(sentiment_template()).with_config(serial);
        let runner_parallel =
            ClassificationRunner::new(sentiment_template()).with_config(parallel);

        let out_serial = runner_serial
            .run(
                dataset(&items),
                Arc::new(MockModelClient::with_response("neutral")),
            )
            .await
            .unwrap();
        let out_parallel = runner_parallel
            .run(
                dataset(&items),
                Arc::new(MockModelClient::with_response("neutral")),
            )
            .await
            .unwrap();

        assert_eq!(out_serial.results, out_parallel.results);
    }

    #[tokio::test]
    async fn retry_exhaustion_is_model_invocation_error() {
        let runner = ClassificationRunner::new(sentiment_template()).with_config(fast_config());
        let client = MockModelClient::new();
        // fast_config allows one retry: two transient failures exhaust it.
        client.queue_failure(ModelError::Connection {
            message: "reset".into(),
        });
        client.queue_failure(ModelError::Connection {
            message: "reset again".into(),
        });

        let output = runner.run(dataset(&["a"]), Arc::new(client)).await.unwrap();
        let result = &output.results[0];
        assert_eq!(result.label, None);
        assert!(matches!(
            result.error,
            Some(RowError::ModelInvocation { .. })
        ));
        assert_eq!(result.raw_response, "");
    }

    #[tokio::test]
    async fn transient_failure_then_success_is_labeled() {
        let runner = ClassificationRunner::new(sentiment_template()).with_config(fast_config());
        let client = MockModelClient::new();
        client.queue_failure(ModelError::Timeout { timeout_secs: 1 });
        client.queue_text("negative");

        let output = runner.run(dataset(&["a"]), Arc::new(client)).await.unwrap();
        assert_eq!(output.results[0].label.as_deref(), Some("negative"));
    }

    #[tokio::test]
    async fn explanation_pass_populates_explanation() {
        let template = ClassificationTemplate::builder()
            .rails(["positive", "negative"])
            .text_part("Classify: {text}")
            .explanation(
                ExplanationTemplate::text("Why is '{text}' {label}? One sentence.").unwrap(),
            )
            .build()
            .unwrap();

        let mut config = fast_config();
        config.concurrency = 1;
        config.provide_explanation = true;
        let runner = ClassificationRunner::new(template).with_config(config);

        let client = MockModelClient::new();
        client.queue_text("positive");
        client.queue_text("Because the wording is enthusiastic.");

        let output = runner
            .run(dataset(&["great stuff"]), Arc::new(client))
            .await
            .unwrap();
        let result = &output.results[0];
        assert_eq!(result.label.as_deref(), Some("positive"));
        assert_eq!(
            result.explanation.as_deref(),
            Some("Because the wording is enthusiastic.")
        );
    }

    #[tokio::test]
    async fn explanation_failure_keeps_primary_label() {
        let template = ClassificationTemplate::builder()
            .rails(["positive", "negative"])
            .text_part("Classify: {text}")
            .explanation(ExplanationTemplate::text("Explain {label}.").unwrap())
            .build()
            .unwrap();

        let mut config = fast_config();
        config.concurrency = 1;
        config.provide_explanation = true;
        let runner = ClassificationRunner::new(template).with_config(config);

        let client = MockModelClient::new();
        client.queue_text("negative");
        client.queue_failure(ModelError::Provider {
            message: "overloaded".into(),
        });

        let output = runner.run(dataset(&["meh"]), Arc::new(client)).await.unwrap();
        let result = &output.results[0];
        assert_eq!(result.label.as_deref(), Some("negative"));
        assert_eq!(result.explanation, None);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn explanation_skipped_when_not_requested() {
        let template = ClassificationTemplate::builder()
            .rails(["positive", "negative"])
            .text_part("Classify: {text}")
            .explanation(ExplanationTemplate::text("Explain {label}.").unwrap())
            .build()
            .unwrap();
        let runner = ClassificationRunner::new(template).with_config(fast_config());
        let client = Arc::new(MockModelClient::with_response("positive"));

        let output = runner.run(dataset(&["a"]), client.clone()).await.unwrap();
        assert_eq!(output.results[0].explanation, None);
        // One call per row: no explanation request went out.
        assert_eq!(client.calls(), 1);
    }

    /// Answers the first call immediately, then stalls forever. Lets a
    /// test cancel a run with one row finished and one in flight.
    struct FirstThenStallClient {
        calls: AtomicUsize,
    }

    impl FirstThenStallClient {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ModelClient for FirstThenStallClient {
        async fn generate(&self, _parts: &[RenderedPart]) -> Result<String, ModelError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok("positive".to_string())
            } else {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("positive".to_string())
            }
        }

        fn model_name(&self) -> &str {
            "stall-mock"
        }
    }

    #[tokio::test]
    async fn mid_run_cancellation_preserves_completed_rows() {
        let mut config = fast_config();
        config.concurrency = 1;
        let runner = ClassificationRunner::new(sentiment_template()).with_config(config);
        let client = Arc::new(FirstThenStallClient::new());
        let cancel = CancellationToken::new();

        // Cancel once row 0 has answered and row 1 is stalled in flight.
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let output = runner
            .run_with_cancellation(dataset(&["a", "b", "c"]), client.clone(), cancel)
            .await
            .unwrap();

        let first = &output.results[0];
        assert_eq!(first.label.as_deref(), Some("positive"));
        assert_eq!(first.error, None);
        for result in &output.results[1..] {
            assert_eq!(result.label, None);
            assert_eq!(result.error, Some(RowError::Cancelled));
        }
        // Row 1 was abandoned in flight; row 2 never reached the model.
        assert!(client.calls() <= 2);
        assert_eq!(output.report.labeled, 1);
        assert_eq!(output.report.cancelled, 2);
    }

    #[tokio::test]
    async fn pre_cancelled_run_marks_all_rows_cancelled() {
        let runner = ClassificationRunner::new(sentiment_template()).with_config(fast_config());
        let client = Arc::new(MockModelClient::with_response("positive"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let output = runner
            .run_with_cancellation(dataset(&["a", "b", "c"]), client.clone(), cancel)
            .await
            .unwrap();
        assert_eq!(output.results.len(), 3);
        for result in &output.results {
            assert_eq!(result.error, Some(RowError::Cancelled));
        }
        assert_eq!(output.report.cancelled, 3);
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn empty_dataset_yields_empty_output() {
        let runner = ClassificationRunner::new(sentiment_template()).with_config(fast_config());
        let client = Arc::new(MockModelClient::with_response("positive"));
        let output = runner.run(Dataset::default(), client).await.unwrap();
        assert!(output.results.is_empty());
        assert_eq!(output.report.rows, 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_config_error() {
        let mut config = fast_config();
        config.concurrency = 0;
        let runner = ClassificationRunner::new(sentiment_template()).with_config(config);
        let client = Arc::new(MockModelClient::with_response("positive"));
        let err = runner.run(dataset(&["a"]), client).await.unwrap_err();
        assert_eq!(err, ConfigError::ZeroConcurrency);
    }
}
