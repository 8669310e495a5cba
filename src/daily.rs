use crate::storage::{load_state, save_state};
use chrono::{Local, NaiveDate};
use std::future::Future;
use std::path::PathBuf;
use tracing::{debug, error, warn};

/// Current local calendar date. Recurrence and the gate both work at
/// calendar-day granularity, so this is the only clock the engine reads.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Guards the daily materialization so it runs at most once per calendar day
/// per client, re-arming on date rollover.
///
/// The last-run date lives in the local state file. The compare-and-record
/// happens before the job future is first awaited, so two triggers arriving
/// back to back (focus regain plus visibility, say) cannot both decide to
/// run. Recording before completion also means a job that later fails is not
/// retried until the next rollover: fire-and-forget once-per-day, not
/// at-least-once.
pub struct RunOnceGate {
    state_path: PathBuf,
}

impl RunOnceGate {
    pub fn new(state_path: PathBuf) -> Self {
        RunOnceGate { state_path }
    }

    /// Run `job` unless it already ran on `today`. Returns whether it ran.
    /// Safe to call repeatedly within the same day; the repeat is a no-op.
    pub async fn run_once_per_day<F, Fut>(&self, today: NaiveDate, job: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let mut state = match load_state(&self.state_path) {
            Ok(state) => state,
            Err(err) => {
                warn!("could not read local state, treating daily job as never run: {err:#}");
                Default::default()
            }
        };
        if state.last_run == Some(today) {
            debug!("daily job already ran on {today}");
            return false;
        }
        state.last_run = Some(today);
        if let Err(err) = save_state(&self.state_path, &state) {
            error!("could not record daily run date: {err:#}");
        }

        if let Err(err) = job().await {
            error!("daily job failed: {err:#}");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn gate(dir: &tempfile::TempDir) -> RunOnceGate {
        RunOnceGate::new(dir.path().join("state.yml"))
    }

    #[tokio::test]
    async fn runs_once_per_simulated_date() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir);
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let runs = runs.clone();
            gate.run_once_per_day(date("2024-01-05"), || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rearms_on_date_rollover() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir);
        let runs = Arc::new(AtomicUsize::new(0));

        for day in ["2024-01-05", "2024-01-05", "2024-01-06"] {
            let runs = runs.clone();
            gate.run_once_per_day(date(day), || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn last_run_survives_across_gate_instances() {
        let dir = tempfile::tempdir().unwrap();
        let ran_first = gate(&dir)
            .run_once_per_day(date("2024-01-05"), || async { Ok(()) })
            .await;
        let ran_second = gate(&dir)
            .run_once_per_day(date("2024-01-05"), || async { Ok(()) })
            .await;
        assert!(ran_first);
        assert!(!ran_second);
    }

    #[tokio::test]
    async fn failing_job_is_not_retried_until_next_day() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir);
        let runs = Arc::new(AtomicUsize::new(0));

        {
            let runs = runs.clone();
            gate.run_once_per_day(date("2024-01-05"), || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                anyhow::bail!("store down")
            })
            .await;
        }
        {
            let runs = runs.clone();
            gate.run_once_per_day(date("2024-01-05"), || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_triggers_decide_before_either_job_completes() {
        let dir = tempfile::tempdir().unwrap();
        let gate = gate(&dir);
        let runs = Arc::new(AtomicUsize::new(0));

        let slow = {
            let runs = runs.clone();
            gate.run_once_per_day(date("2024-01-05"), || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })
        };
        let second = {
            let runs = runs.clone();
            gate.run_once_per_day(date("2024-01-05"), || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        };
        // The date is recorded before the first job's future suspends, so
        // the second trigger must see it and decline.
        let (a, b) = tokio::join!(slow, second);
        assert!(a);
        assert!(!b);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
