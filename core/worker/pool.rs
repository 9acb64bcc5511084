use super::*;
use crate::Config;
use std::marker::PhantomData;
use thiserror::*;
use tokio_util::task::LocalPoolHandle;
use tracing::*;

/// The WorkerPool spins up a pool of workers that pull from a shared queue.
///
/// This pool is _lazy_ and will only spin up workers at execution time. However, at that time it
/// is _eager_, and will spin up as many workers as allowed in `Config.max_local_workers`.
///
#[derive(Debug)]
pub struct WorkerPool<W: Worker> {
    worker_pool: LocalPoolHandle,
    _worker: PhantomData<W>,
}

impl<Ctx: Context + 'static, W: Worker<Context = Ctx>> WorkerPool<W> {
    #[tracing::instrument(name = "WorkerPool::new", skip(config))]
    pub fn new(config: &Config) -> Self {
        let worker_pool = LocalPoolHandle::new({
            // NOTE: we want to make sure you don't ask for more workers than the number of CPUs
            // available, but there is always at least one.
            let max = num_cpus::get();
            let ask = config.max_local_workers();
            ask.min(max).max(1)
        });

        Self {
            worker_pool,
            _worker: PhantomData,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.worker_pool.num_threads()
    }

    /// Run one worker per thread until the shared queue in `ctx` runs dry, and return the
    /// results they recorded.
    ///
    #[tracing::instrument(name = "WorkerPool::execute", skip(self, ctx))]
    pub async fn execute(&self, ctx: Ctx) -> Result<Arc<TaskResults>, WorkerPoolError> {
        let mut workers = vec![];
        for worker_id in 0..self.worker_pool.num_threads() {
            workers.push(self.spawn_worker(worker_id, ctx.clone()));
        }

        let mut first_error = None;
        for result in futures::future::join_all(workers).await {
            let result = match result {
                Ok(result) => result,
                Err(err) => Err(WorkerPoolError::WorkerPanicked(err.to_string())),
            };
            if let Err(err) = result {
                error!("Worker stopped early: {}", err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(ctx.results()),
        }
    }

    fn spawn_worker(
        &self,
        worker_id: usize,
        ctx: Ctx,
    ) -> tokio::task::JoinHandle<Result<(), WorkerPoolError>> {
        self.worker_pool.spawn_pinned(move || async move {
            let mut worker = W::new(worker_id, ctx)?;
            worker.run().await?;
            Ok(())
        })
    }
}

#[derive(Error, Debug)]
pub enum WorkerPoolError {
    #[error(transparent)]
    WorkerError(WorkerError),

    #[error("A worker crashed: {0}")]
    WorkerPanicked(String),
}

impl From<WorkerError> for WorkerPoolError {
    fn from(err: WorkerError) -> Self {
        Self::WorkerError(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BuildTarget, RuleKey};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default)]
    struct CountingContext {
        task_results: Arc<TaskResults>,
        started: Arc<AtomicUsize>,
    }

    impl Context for CountingContext {
        fn results(&self) -> Arc<TaskResults> {
            self.task_results.clone()
        }
    }

    #[derive(Debug)]
    struct CountingWorker {
        ctx: CountingContext,
    }

    #[async_trait(?Send)]
    impl Worker for CountingWorker {
        type Context = CountingContext;

        fn new(_id: usize, ctx: Self::Context) -> Result<Self, WorkerError> {
            Ok(Self { ctx })
        }

        async fn run(&mut self) -> Result<(), WorkerError> {
            self.ctx.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Debug)]
    struct FailingWorker;

    #[async_trait(?Send)]
    impl Worker for FailingWorker {
        type Context = CountingContext;

        fn new(_id: usize, _ctx: Self::Context) -> Result<Self, WorkerError> {
            Ok(Self)
        }

        async fn run(&mut self) -> Result<(), WorkerError> {
            let target: BuildTarget = "//a:a".parse().unwrap();
            Err(WorkerError::UnknownTarget(target))
        }
    }

    #[tokio::test]
    async fn pools_always_have_at_least_one_worker() {
        let config = Config::builder().max_local_workers(0).build().unwrap();
        let pool: WorkerPool<CountingWorker> = WorkerPool::new(&config);
        assert_eq!(pool.num_workers(), 1);
    }

    #[tokio::test]
    async fn every_worker_runs_once() {
        let config = Config::builder().max_local_workers(2).build().unwrap();
        let pool: WorkerPool<CountingWorker> = WorkerPool::new(&config);
        let ctx = CountingContext::default();
        ctx.task_results.add_expected_target("//a:a".parse().unwrap());
        ctx.task_results
            .transition(
                &"//a:a".parse().unwrap(),
                RuleState::KeyComputed(RuleKey::from_bytes([0; 32])),
            )
            .unwrap();

        let results = pool.execute(ctx.clone()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(ctx.started.load(Ordering::SeqCst), pool.num_workers());
    }

    #[tokio::test]
    async fn worker_errors_are_reported() {
        let config = Config::builder().max_local_workers(1).build().unwrap();
        let pool: WorkerPool<FailingWorker> = WorkerPool::new(&config);
        assert_matches!(
            pool.execute(CountingContext::default()).await,
            Err(WorkerPoolError::WorkerError(WorkerError::UnknownTarget(_)))
        );
    }
}
