// SPDX-License-Identifier: Apache-2.0

use std::error::Error;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::error;

pub type TaskResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Resolves when the first task finishes, with that task's result.
pub async fn wait_for_any_task(tasks: &mut JoinSet<TaskResult>) -> TaskResult {
    match tasks.join_next().await {
        None => Ok(()),
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut JoinSet<TaskResult>,
    timeout: Duration,
) -> TaskResult {
    wait_for_tasks_with_deadline(tasks, Instant::now() + timeout).await
}

/// Joins every task. The last task error wins, a missed deadline is an error.
pub async fn wait_for_tasks_with_deadline(
    tasks: &mut JoinSet<TaskResult>,
    stop_at: Instant,
) -> TaskResult {
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(e)))) => result = Err(e),
            Ok(Some(Err(e))) => error!(error = ?e, "Failed to join with task"),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_any_task_returns_first_result() {
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        tasks.spawn(async {
            sleep(Duration::from_secs(30)).await;
            Ok(())
        });
        tasks.spawn(async { Err("source failed".into()) });

        let err = wait_for_any_task(&mut tasks).await.unwrap_err();
        assert_eq!(err.to_string(), "source failed");
        tasks.abort_all();
    }

    #[tokio::test]
    async fn test_any_task_on_empty_set() {
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        assert!(wait_for_any_task(&mut tasks).await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_all_collects_error() {
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        tasks.spawn(async { Ok(()) });
        tasks.spawn(async { Err("exporter failed".into()) });

        let err = wait_for_tasks_with_timeout(&mut tasks, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "exporter failed");
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_wait_all_times_out() {
        let mut tasks: JoinSet<TaskResult> = JoinSet::new();
        tasks.spawn(async {
            sleep(Duration::from_secs(30)).await;
            Ok(())
        });

        let err = wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        tasks.abort_all();
    }
}
