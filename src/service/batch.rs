use futures::future::join_all;
use tracing::{info, warn};
use crate::{
    error::{Result, SoucheError},
    storage::{Database, Store},
};

/// Outcome of a bulk mutation. Items succeed or fail independently and
/// nothing is rolled back.
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<(String, Result<()>)>,
}

impl BatchSummary {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SoucheError)> {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id.as_str(), e)))
    }

    pub fn print_summary(&self, action: &str) {
        println!("\n=== {} ===", action);
        println!("Total:       {}", self.total);
        println!("Successful:  {} ✓", self.successful);
        println!("Failed:      {} ✗", self.failed);
        for (id, e) in self.failures() {
            println!("  {}: {}", id, e);
        }
    }
}

/// Apply `op` to every id concurrently and collect per-item outcomes.
/// `op` returns false when the record does not exist.
pub async fn run_batch<F>(store: &Store, action: &str, ids: Vec<String>, op: F) -> BatchSummary
where
    F: Fn(&Database, &str) -> Result<bool> + Copy,
{
    if ids.is_empty() {
        info!("{}: nothing to do", action);
        return BatchSummary::default();
    }

    info!("{}: processing {} records", action, ids.len());

    let outcomes = join_all(ids.into_iter().map(|id| async move {
        let target = id.clone();
        let result = store
            .write(action, move |db| {
                if op(db, &target)? {
                    Ok(())
                } else {
                    Err(SoucheError::NotFound(target.clone()))
                }
            })
            .await;
        (id, result)
    }))
    .await;

    let mut summary = BatchSummary {
        total: outcomes.len(),
        ..BatchSummary::default()
    };

    for (id, result) in outcomes {
        match &result {
            Ok(()) => summary.successful += 1,
            Err(e) => {
                summary.failed += 1;
                warn!("{} failed for {}: {}", action, id, e);
            }
        }
        summary.results.push((id, result));
    }

    info!(
        "{} complete: {} successful, {} failed",
        action, summary.successful, summary.failed
    );
    summary
}
