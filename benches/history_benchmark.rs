// Execution history and step executor benchmarks
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use incident_playbook_engine::config::UnknownActionPolicy;
use incident_playbook_engine::models::{ExecutionStatus, IncidentExecution, PlaybookStep};
use incident_playbook_engine::playbooks::{
    create_default_registry, ActionContext, ExecutionHistory, StepExecutor,
};
use std::sync::Arc;
use tokio::runtime::Runtime;
use uuid::Uuid;

fn history_insert_with_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_insert_with_eviction");

    for capacity in [100usize, 1_000, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            capacity,
            |b, &capacity| {
                let history = ExecutionHistory::new(capacity);
                let playbook_id = Uuid::new_v4();
                for _ in 0..capacity {
                    history.insert(IncidentExecution::new(playbook_id, "INC-warm"));
                }

                b.iter(|| {
                    // history is full, every insert evicts the oldest record
                    black_box(history.insert(IncidentExecution::new(playbook_id, "INC-bench")))
                });
            },
        );
    }
    group.finish();
}

fn history_queries(c: &mut Criterion) {
    let history = ExecutionHistory::new(1_000);
    let playbooks: Vec<Uuid> = (0..10).map(|_| Uuid::new_v4()).collect();

    for i in 0..1_000 {
        let mut execution = IncidentExecution::new(playbooks[i % playbooks.len()], "INC-q");
        if i % 3 == 0 {
            let _ = execution.transition(ExecutionStatus::Running);
        }
        history.insert(execution);
    }

    c.bench_function("history_list_active", |b| {
        b.iter(|| black_box(history.list_active()))
    });

    c.bench_function("history_list_by_playbook", |b| {
        b.iter(|| black_box(history.list_by_playbook(&playbooks[3])))
    });

    c.bench_function("history_count_by_status", |b| {
        b.iter(|| black_box(history.count_by_status(ExecutionStatus::Pending)))
    });
}

fn executor_noop_step(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let executor = StepExecutor::new(
        Arc::new(create_default_registry()),
        UnknownActionPolicy::Fail,
    );
    let context = ActionContext::new(Uuid::new_v4(), Uuid::new_v4(), "Bench", "INC-bench");
    let step = PlaybookStep::new("noop", "Noop", "noop", 1).with_timeout(5.0);

    c.bench_function("executor_noop_step", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(executor.execute(&step, &context).await) });
    });
}

criterion_group!(
    benches,
    history_insert_with_eviction,
    history_queries,
    executor_noop_step
);
criterion_main!(benches);
