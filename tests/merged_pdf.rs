//! Merged-PDF segmentation through the import task.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    BatchReply, FakeSource, Harness, PAGE_BREAK, StaticFetcher, Statement, TextPdfTools, pdf_page,
    seven_page_set,
};
use judge_importer::error::AppError;
use judge_importer::models::Problem;
use judge_importer::services::{AttemptState, ProblemImporter, TaskStatus};
use judge_importer::sources::SourceRegistry;
use judge_importer::storage::{ProblemQuery, ProblemRepository};

const SET_URL: &str = "https://judge.test/contest/statements.pdf";

fn set_problem(id: &str, name: &str) -> Problem {
    let mut problem = Problem::new("gym", id, name);
    problem.is_pdf = true;
    problem.original_url = Some(SET_URL.to_string());
    problem
}

fn gym_source() -> FakeSource {
    FakeSource::new("gym")
        .statement("1", Statement::MergedPdf(SET_URL.to_string()))
        .statement("2", Statement::MergedPdf(SET_URL.to_string()))
        .statement("3", Statement::MergedPdf(SET_URL.to_string()))
}

async fn seed(harness: &Harness) {
    // Inserted out of order; the batch sorts by id.
    for (id, name) in [("3", "C"), ("1", "A"), ("2", "B")] {
        harness.storage.save(&set_problem(id, name)).await.unwrap();
    }
}

/// Only two problem headers, for three known problems.
fn two_problem_set() -> String {
    [
        pdf_page(1, Some(("A", "Alpha")), "Alpha"),
        pdf_page(2, None, "Alpha continued"),
        pdf_page(3, Some(("B", "Bravo")), "Bravo"),
    ]
    .join(&PAGE_BREAK.to_string())
}

async fn settle(importer: &ProblemImporter) -> AttemptState {
    loop {
        match importer.batches().attempt_state(SET_URL) {
            Some(AttemptState::InProgress) | None => tokio::time::sleep(Duration::from_secs(10)).await,
            Some(state) => return state,
        }
    }
}

async fn stored(harness: &Harness) -> Vec<Problem> {
    let mut problems = harness.storage.find(&ProblemQuery::All).await.unwrap();
    problems.sort_by(|a, b| Problem::cmp_ids(&a.id, &b.id));
    problems
}

#[tokio::test]
async fn test_seven_pages_three_problems() {
    let harness = Harness::new(StaticFetcher::new().with(SET_URL, "application/pdf", seven_page_set()));
    seed(&harness).await;
    let importer = harness.importer();
    let source = gym_source();

    let trigger = set_problem("1", "A");
    let status = importer.import_problem(&source, trigger).await;
    assert_eq!(status, TaskStatus::Skipped);
    assert_eq!(importer.batches().attempt_state(SET_URL), Some(AttemptState::Succeeded));

    let problems = stored(&harness).await;
    let names: Vec<&str> = problems.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Bravo", "Charlie"]);
    for problem in &problems {
        assert!(problem.imported);
        assert_eq!(problem.import_tries, 0);
        assert_eq!(problem.language.as_deref(), Some("english"));
        assert_eq!(
            problem.url.as_deref(),
            Some(format!("https://cdn.test/assets/problems/gym/{}.pdf", problem.id).as_str())
        );
    }

    // Each output holds its own pages, in id order, without its metadata
    // block, running header or page footer.
    let first = std::fs::read_to_string(harness.published("assets/problems/gym/1.pdf")).unwrap();
    assert!(first.starts_with("Alpha is the subject"));
    assert!(first.contains("Alpha continued"));
    assert!(!first.contains("Bravo"));
    assert!(!first.contains("Time limit"));
    assert!(!first.contains("Regional Contest"));
    assert!(!first.contains("Page 1"));

    let second = std::fs::read_to_string(harness.published("assets/problems/gym/2.pdf")).unwrap();
    assert!(second.starts_with("Bravo is the subject"));
    assert!(!second.contains("Charlie"));

    let third = std::fs::read_to_string(harness.published("assets/problems/gym/3.pdf")).unwrap();
    assert!(third.contains("Charlie continued"));
    assert!(third.contains("Charlie appendix"));

    assert_eq!(harness.scratch_entries(), 0);
}

#[tokio::test]
async fn test_second_attempt_is_already_handled() {
    let harness = Harness::new(StaticFetcher::new().with(SET_URL, "application/pdf", seven_page_set()));
    seed(&harness).await;
    let importer = harness.importer();

    let problem = set_problem("2", "B");
    assert!(importer.batches().import(&problem).await.is_ok());
    assert_eq!(harness.tools.page_counts.load(Ordering::SeqCst), 1);

    let again = importer.batches().import(&problem).await;
    assert!(matches!(again, Err(AppError::AlreadyHandled(ref url)) if url == SET_URL));
    assert_eq!(harness.tools.page_counts.load(Ordering::SeqCst), 1);
    assert_eq!(harness.fetcher.requests.load(Ordering::SeqCst), 1);

    // Through the import task the repeat is a no-op.
    let status = importer.import_problem(&gym_source(), set_problem("3", "C")).await;
    assert_eq!(status, TaskStatus::Skipped);
    let problems = stored(&harness).await;
    assert!(problems.iter().all(|p| p.imported && p.import_tries == 0));
}

#[tokio::test]
async fn test_count_mismatch_publishes_nothing() {
    let harness = Harness::new(StaticFetcher::new().with(SET_URL, "application/pdf", two_problem_set()));
    seed(&harness).await;
    let importer = harness.importer();
    let source = gym_source();

    let status = importer.import_problem(&source, set_problem("1", "A")).await;
    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(importer.batches().attempt_state(SET_URL), Some(AttemptState::Failed));
    // Batch failures are not retried.
    assert_eq!(source.imports.load(Ordering::SeqCst), 1);

    let problems = stored(&harness).await;
    assert!(problems.iter().all(|p| !p.imported && p.url.is_none()));
    let tries: Vec<u32> = problems.iter().map(|p| p.import_tries).collect();
    assert_eq!(tries, vec![1, 0, 0]);

    assert!(!harness.published("assets/problems").exists());
    assert_eq!(harness.scratch_entries(), 0);

    // The failed URL is not recomputed by its siblings.
    let status = importer.import_problem(&source, set_problem("2", "B")).await;
    assert_eq!(status, TaskStatus::Skipped);
    assert_eq!(harness.tools.page_counts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sweep_imports_whole_set_once() {
    let harness = Harness::new(StaticFetcher::new().with(SET_URL, "application/pdf", seven_page_set()));
    seed(&harness).await;
    let importer = harness.importer();

    let mut registry = SourceRegistry::new();
    registry.register(Arc::new(gym_source()));

    let problems = stored(&harness).await;
    let summary = importer.import_all(&registry, problems).await;
    assert_eq!(summary.total(), 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(harness.tools.page_counts.load(Ordering::SeqCst), 1);

    let problems = stored(&harness).await;
    assert!(problems.iter().all(|p| p.imported && p.import_tries == 0));
}

#[tokio::test(start_paused = true)]
async fn test_slow_failing_batch_counts_one_attempt() {
    let harness = Harness::with_tools(
        StaticFetcher::new().with(SET_URL, "application/pdf", two_problem_set()),
        TextPdfTools::slow(Duration::from_secs(300)),
    );
    seed(&harness).await;
    let importer = harness.importer();
    let source = gym_source();

    // The wait gives up after the import timeout; the batch keeps running.
    let status = importer.import_problem(&source, set_problem("1", "A")).await;
    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(source.imports.load(Ordering::SeqCst), 1);
    assert_eq!(importer.batches().attempt_state(SET_URL), Some(AttemptState::InProgress));

    assert_eq!(settle(&importer).await, AttemptState::Failed);
    let tries: Vec<u32> = stored(&harness).await.iter().map(|p| p.import_tries).collect();
    assert_eq!(tries, vec![1, 0, 0]);

    let status = importer.import_problem(&source, set_problem("2", "B")).await;
    assert_eq!(status, TaskStatus::Skipped);
    let tries: Vec<u32> = stored(&harness).await.iter().map(|p| p.import_tries).collect();
    assert_eq!(tries, vec![1, 0, 0]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_batch_still_imports_the_set() {
    let harness = Harness::with_tools(
        StaticFetcher::new().with(SET_URL, "application/pdf", seven_page_set()),
        TextPdfTools::slow(Duration::from_secs(300)),
    );
    seed(&harness).await;
    let importer = harness.importer();

    let status = importer.import_problem(&gym_source(), set_problem("1", "A")).await;
    assert_eq!(status, TaskStatus::Failed);

    assert_eq!(settle(&importer).await, AttemptState::Succeeded);
    let problems = stored(&harness).await;
    assert!(problems.iter().all(|p| p.imported && p.import_tries == 0));
    assert!(harness.published("assets/problems/gym/3.pdf").exists());
}

#[tokio::test]
async fn test_adapter_batch_bypasses_segmenter() {
    let harness = Harness::new(StaticFetcher::new().with(SET_URL, "application/pdf", seven_page_set()));
    seed(&harness).await;
    let importer = harness.importer();
    let source = gym_source().handles_batches(BatchReply::Skipped);

    let status = importer.import_problem(&source, set_problem("1", "A")).await;
    assert_eq!(status, TaskStatus::Skipped);
    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.tools.page_counts.load(Ordering::SeqCst), 0);
    assert_eq!(harness.fetcher.requests.load(Ordering::SeqCst), 0);
    assert_eq!(importer.batches().attempt_state(SET_URL), None);
    assert!(stored(&harness).await.iter().all(|p| !p.imported && p.import_tries == 0));
}

#[tokio::test]
async fn test_adapter_batch_failure_is_counted() {
    let harness = Harness::new(StaticFetcher::new());
    seed(&harness).await;
    let importer = harness.importer();
    let source = gym_source().handles_batches(BatchReply::Fails);

    let status = importer.import_problem(&source, set_problem("1", "A")).await;
    assert_eq!(status, TaskStatus::Failed);
    assert_eq!(source.imports.load(Ordering::SeqCst), 1);
    assert_eq!(importer.batches().attempt_state(SET_URL), None);

    let tries: Vec<u32> = stored(&harness).await.iter().map(|p| p.import_tries).collect();
    assert_eq!(tries, vec![1, 0, 0]);
}
