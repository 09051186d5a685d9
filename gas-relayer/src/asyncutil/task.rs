use std::future::Future;
use std::pin::Pin;

use error_stack::{Context, Report, Result, ResultExt};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// A boxed unit of work that runs until it finishes on its own or its token is cancelled.
pub type CancellableTask<Output> =
    Box<dyn FnOnce(CancellationToken) -> Pin<Box<dyn Future<Output = Output> + Send>> + Send>;

pub fn cancellable<Fut, T>(task: impl FnOnce(CancellationToken) -> Fut + Send + 'static) -> CancellableTask<T>
where
    Fut: Future<Output = T> + Send + 'static,
{
    Box::new(move |token: CancellationToken| Box::pin(task(token)))
}

#[derive(Error, Debug)]
#[error("task {0} failed")]
pub struct TaskError(pub String);

/// Long running tasks that live and die together: as soon as one of them ends, all others are
/// cancelled, and the errors of all of them are returned.
pub struct TaskGroup<E> {
    name: String,
    tasks: Vec<(String, CancellableTask<Result<(), E>>)>,
}

impl<E> TaskGroup<E>
where
    E: From<TaskError> + Context,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: vec![],
        }
    }

    pub fn add_task(mut self, label: impl Into<String>, task: CancellableTask<Result<(), E>>) -> Self {
        self.tasks.push((label.into(), task));
        self
    }

    pub async fn run(self, token: CancellationToken) -> Result<(), E> {
        let mut running = JoinSet::new();
        for (label, task) in self.tasks {
            // child tokens let a task cancel its own work without taking the group down
            let future = task(token.child_token());
            running.spawn(async move { (label, future.await) });
        }

        let total = running.len();
        let mut result: Result<(), E> = Ok(());

        while let Some(finished) = running.join_next().await {
            token.cancel();
            info!(
                group = %self.name,
                "shutting down tasks ({}/{})",
                total.saturating_sub(running.len()),
                total
            );

            let outcome = match finished {
                Ok((_, Ok(()))) => continue,
                Ok((label, Err(err))) => err.change_context(E::from(TaskError(label))),
                Err(err) => Report::new(err).change_context(E::from(TaskError(self.name.clone()))),
            };

            result = match result {
                Ok(()) => Err(outcome),
                Err(mut report) => {
                    report.extend_one(outcome);
                    Err(report)
                }
            };
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use error_stack::report;
    use tokio::time::sleep;
    use tokio_util::sync::CancellationToken;

    use super::{cancellable, TaskError, TaskGroup};

    #[tokio::test]
    async fn empty_group_should_succeed() {
        let group: TaskGroup<TaskError> = TaskGroup::new("empty");

        assert!(group.run(CancellationToken::new()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn one_finished_task_should_cancel_the_others() {
        let result = TaskGroup::<TaskError>::new("group")
            .add_task(
                "waiting",
                cancellable(|token: CancellationToken| async move {
                    token.cancelled().await;
                    Ok(())
                }),
            )
            .add_task(
                "short",
                cancellable(|_| async {
                    sleep(Duration::from_secs(1)).await;
                    Ok(())
                }),
            )
            .run(CancellationToken::new())
            .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn errors_of_all_tasks_should_be_collected() {
        let err = TaskGroup::<TaskError>::new("group")
            .add_task(
                "first",
                cancellable(|_| async { Err(report!(TaskError("inner".to_string()))) }),
            )
            .add_task(
                "second",
                cancellable(|_| async { Err(report!(TaskError("inner".to_string()))) }),
            )
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.current_frames().len(), 2);
    }

    #[tokio::test]
    async fn panicking_task_should_become_an_error() {
        let result = TaskGroup::<TaskError>::new("group")
            .add_task(
                "panicking",
                cancellable(|_| async {
                    if true {
                        panic!("boom");
                    }
                    Ok(())
                }),
            )
            .run(CancellationToken::new())
            .await;

        assert!(result.is_err());
    }
}
