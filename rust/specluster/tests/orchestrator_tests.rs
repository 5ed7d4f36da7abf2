mod common;

use common::{
    TableOracle,
    test_config,
    write_window,
};
use specluster::clustering::{
    JobOutcome,
    collect_outputs,
};
use specluster::errors::SpecClusterError;
use specluster::progress::WindowListener;
use specluster::stream::read_window_file;
use specluster::{
    CancellationToken,
    ClusteringStage,
    JobOrchestrator,
    JobResult,
    ProgressEvent,
    WindowDescriptor,
    WindowJobSpec,
};
use std::path::PathBuf;
use std::sync::{
    Arc,
    Mutex,
};

fn oracle() -> Arc<TableOracle> {
    Arc::new(TableOracle::new(&[("a1", "a2", 0.95), ("b1", "b2", 0.95)]))
}

#[test]
fn test_jobs_cluster_every_window() {
    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    std::fs::create_dir_all(&out_dir).unwrap();
    let a = write_window(&dir.path().join("a.cls"), &[("a1", 100.0), ("a2", 100.3)]);
    let b = write_window(&dir.path().join("b.cls"), &[("b1", 200.0), ("b2", 200.1), ("b3", 205.0)]);

    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let mut orchestrator = JobOrchestrator::new(
        Arc::new(test_config(vec![0.9])),
        oracle(),
        CancellationToken::new(),
        ClusteringStage::Clustering,
    )
    .unwrap();
    orchestrator.add_progress_listener(Arc::new(move |e: &ProgressEvent| {
        sink.lock().unwrap().push(e.clone());
    }));
    let h1 = orchestrator.submit(WindowJobSpec::new(a, out_dir.join("a.cls"), out_dir.clone()));
    let h2 = orchestrator.submit(WindowJobSpec::new(b, out_dir.join("b.cls"), out_dir.clone()));
    assert_eq!((h1.job_index, h2.job_index), (0, 1));

    let results = orchestrator.await_all().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_completed()));

    let outputs = collect_outputs(results, "clustering").unwrap();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].item_count, 1);
    assert_eq!(outputs[1].item_count, 2);
    assert_eq!(read_window_file(&outputs[1].path).unwrap()[0].member_count(), 2);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].completed, 2);
    assert_eq!(events[1].total, 2);
    assert!(events.iter().all(|e| e.message.starts_with("Completed clustering")));

    // Nothing staged is left behind.
    let leftovers: Vec<PathBuf> = std::fs::read_dir(&out_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[test]
fn test_failed_job_does_not_stop_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_window(&dir.path().join("good.cls"), &[("a1", 100.0), ("a2", 100.3)]);
    let missing = WindowDescriptor {
        path: dir.path().join("missing.cls"),
        min_mass: 300.0,
        max_mass: 310.0,
        item_count: 4,
    };

    let mut orchestrator = JobOrchestrator::new(
        Arc::new(test_config(vec![0.9, 0.8])),
        oracle(),
        CancellationToken::new(),
        ClusteringStage::Clustering,
    )
    .unwrap();
    orchestrator.submit(WindowJobSpec::new(
        missing,
        dir.path().join("missing.out.cls"),
        dir.path().to_path_buf(),
    ));
    orchestrator.submit(WindowJobSpec::new(
        good,
        dir.path().join("good.out.cls"),
        dir.path().to_path_buf(),
    ));
    let results = orchestrator.await_all().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results.iter().filter(|r| r.is_completed()).count(), 1);

    // The successful output is kept for a retry.
    assert!(dir.path().join("good.out.cls").exists());
    assert!(!dir.path().join("missing.out.cls").exists());

    match collect_outputs(results, "clustering") {
        Err(SpecClusterError::FailedJobs { stage, failures }) => {
            assert_eq!(stage, "clustering");
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].window, dir.path().join("missing.cls"));
        }
        other => panic!("expected failed jobs, got {:?}", other),
    }
}

#[test]
fn test_cancelled_jobs_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_window(&dir.path().join("a.cls"), &[("a1", 100.0), ("a2", 100.3)]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut orchestrator = JobOrchestrator::new(
        Arc::new(test_config(vec![0.9])),
        oracle(),
        cancel,
        ClusteringStage::Clustering,
    )
    .unwrap();
    orchestrator.submit(WindowJobSpec::new(
        a,
        dir.path().join("a.out.cls"),
        dir.path().to_path_buf(),
    ));
    let results = orchestrator.await_all().unwrap();
    assert!(matches!(results[0].outcome, JobOutcome::Cancelled));
    assert!(!dir.path().join("a.out.cls").exists());
    assert!(matches!(
        collect_outputs(results, "clustering"),
        Err(SpecClusterError::Cancelled)
    ));
}

struct RejectingListener {
    seen: usize,
}

impl WindowListener for RejectingListener {
    fn on_window_completed(&mut self, result: &JobResult) -> Result<(), SpecClusterError> {
        self.seen += 1;
        Err(SpecClusterError::Io {
            source: std::io::Error::other("sink closed"),
            path: Some(result.input.path.clone()),
        })
    }
}

#[test]
fn test_listener_error_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_window(&dir.path().join("a.cls"), &[("a1", 100.0)]);
    let b = write_window(&dir.path().join("b.cls"), &[("b1", 200.0)]);
    let mut listener = RejectingListener { seen: 0 };
    let cancel = CancellationToken::new();
    {
        let mut orchestrator = JobOrchestrator::new(
            Arc::new(test_config(vec![0.9])),
            oracle(),
            cancel.clone(),
            ClusteringStage::Clustering,
        )
        .unwrap();
        orchestrator.add_window_listener(&mut listener);
        for (w, name) in [(a, "a.out.cls"), (b, "b.out.cls")] {
            orchestrator.submit(WindowJobSpec::new(w, dir.path().join(name), dir.path().to_path_buf()));
        }
        assert!(matches!(
            orchestrator.await_all(),
            Err(SpecClusterError::Io { .. })
        ));
    }
    // Only the first completion is delivered; the failure cancels the rest.
    assert_eq!(listener.seen, 1);
    assert!(cancel.is_cancelled());
}
