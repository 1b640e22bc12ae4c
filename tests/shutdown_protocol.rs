use ce_bench::{BenchConfig, QueryResult, RunContext, Statement, Task, TaskQueue, WorkerPool};
use crossbeam::channel::unbounded;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

mod common;
use common::EchoInstance;

const TASKS_PER_PRODUCER: usize = 200;

/// Every producer enqueues its tasks and a shutdown; returns the results each
/// producer received.
fn run_producers(producers: usize, workers: usize) -> Vec<Vec<QueryResult>> {
    let queue = TaskQueue::bounded(8);
    let ctx = RunContext::new(BenchConfig::default(), producers).unwrap();
    let pool = WorkerPool::start(
        Arc::new(EchoInstance),
        Arc::clone(&queue),
        workers,
        Arc::clone(&ctx),
    )
    .unwrap();

    let barrier = Arc::new(Barrier::new(producers));
    let mut handles = Vec::new();
    for producer_id in 0..producers {
        let sender = queue.sender().unwrap();
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            let (result_sink, results) = unbounded();
            barrier.wait();
            for i in 0..TASKS_PER_PRODUCER {
                sender
                    .send(Task::Execute {
                        statement: Statement::Plain(format!("select {producer_id}, {i}")),
                        result_sink: result_sink.clone(),
                        completion: None,
                    })
                    .unwrap();
            }
            sender.send(Task::Shutdown { result_sink }).unwrap();
            drop(sender);
            results.iter().collect::<Vec<_>>()
        }));
    }

    let results: Vec<Vec<QueryResult>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let stats = pool.join().unwrap();

    assert!(ctx.take_failure().is_none());
    assert!(queue.is_closed());
    assert!(stats.closed_queue);
    assert_eq!(stats.shutdowns, producers as u64);
    assert_eq!(ctx.exited_producers(), producers);
    assert_eq!(stats.executed, (producers * TASKS_PER_PRODUCER) as u64);
    results
}

fn assert_exactly_once(producers: usize, results: &[Vec<QueryResult>]) {
    assert_eq!(results.len(), producers);
    for (producer_id, received) in results.iter().enumerate() {
        assert_eq!(received.len(), TASKS_PER_PRODUCER);
        let unique: HashSet<String> = received
            .iter()
            .map(|r| r.statement.to_sql().into_owned())
            .collect();
        assert_eq!(unique.len(), TASKS_PER_PRODUCER);
        assert!(unique.iter().all(|sql| sql.starts_with(&format!("select {producer_id},"))));
    }
}

#[test]
fn test_single_producer_closes_queue_once() {
    let results = run_producers(1, 4);
    assert_exactly_once(1, &results);
}

#[test]
fn test_two_producers_close_queue_once() {
    let results = run_producers(2, 4);
    assert_exactly_once(2, &results);
}

#[test]
fn test_five_producers_close_queue_once() {
    let results = run_producers(5, 3);
    assert_exactly_once(5, &results);
}

#[test]
fn test_more_producers_than_workers() {
    let results = run_producers(5, 1);
    assert_exactly_once(5, &results);
}

#[test]
fn test_repeated_runs_are_independent() {
    for _ in 0..20 {
        let results = run_producers(2, 8);
        assert_exactly_once(2, &results);
    }
}
