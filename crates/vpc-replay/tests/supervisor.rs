//! End-to-end supervisor behavior with scripted stand-in workers.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use vpc_replay::control::ControlBlock;
use vpc_replay::database::{Database, DatabaseError, ResourceTag};
use vpc_replay::supervisor::{run_master, ReplayOptions};
use vpc_replay::ReplaySummary;

/// Fixed pipeline totals; the supervisor only reads list lengths.
struct FixedDatabase {
    graphics: usize,
    compute: usize,
}

impl Database for FixedDatabase {
    fn prepare(&mut self) -> Result<(), DatabaseError> {
        Ok(())
    }

    fn hash_list_for_tag(&self, tag: ResourceTag) -> Result<Vec<u64>, DatabaseError> {
        let count = match tag {
            ResourceTag::GraphicsPipeline => self.graphics,
            ResourceTag::ComputePipeline => self.compute,
            _ => 0,
        };
        Ok((0..count as u64).collect())
    }
}

fn write_script(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("worker.sh");
    fs::write(&path, format!("#!/bin/sh\n{body}")).unwrap();
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
    path
}

fn options(script: PathBuf) -> ReplayOptions {
    ReplayOptions {
        num_workers: 1,
        databases: vec![PathBuf::from("state.json")],
        worker_binary: Some(script),
        crash_grace: Duration::from_millis(300),
        ..ReplayOptions::default()
    }
}

#[tokio::test]
async fn crashed_worker_is_restarted_past_reported_progress() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("args.log");
    let marker = dir.path().join("crashed-once");

    let script = write_script(
        dir.path(),
        &format!(
            r#"echo "$@" >> {log}
cat > /dev/null
if [ -f {marker} ]; then
    exit 0
fi
touch {marker}
echo "GRAPHICS 42"
echo "CRASH"
exit 2
"#,
            log = log.display(),
            marker = marker.display()
        ),
    );

    let mut database = FixedDatabase {
        graphics: 100,
        compute: 0,
    };
    let summary = run_master(&mut database, &options(script)).await.unwrap();

    assert_eq!(summary.clean_process_deaths, 1);
    assert_eq!(summary.dirty_process_deaths, 0);

    let invocations: Vec<String> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].contains("--graphics-pipeline-range 0 100"));
    assert!(invocations[1].contains("--graphics-pipeline-range 42 100"));
    assert!(invocations[1].contains("--slave-process"));
    assert!(invocations[1].contains("--num-threads 1"));
}

#[tokio::test]
async fn faulty_modules_propagate_to_replacement_workers() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("crashed-once");
    let received = dir.path().join("stdin.txt");
    let shm = dir.path().join("vpc-shm").display().to_string();
    let mutex = dir.path().join("vpc-shm.lock").display().to_string();

    // The steering side owns the mapping; the supervisor only opens it.
    ControlBlock::create(&shm, &mutex, 4096).unwrap();

    let script = write_script(
        dir.path(),
        &format!(
            r#"if [ -f {marker} ]; then
    cat > {received}
    exit 0
fi
touch {marker}
cat > /dev/null
echo "GRAPHICS 10"
echo "MODULE deadbeefcafe"
echo "CRASH"
exit 2
"#,
            marker = marker.display(),
            received = received.display()
        ),
    );

    let mut database = FixedDatabase {
        graphics: 100,
        compute: 0,
    };
    let mut opts = options(script);
    opts.shm_name = Some(shm.clone());
    opts.shm_mutex_name = Some(mutex.clone());

    let summary = run_master(&mut database, &opts).await.unwrap();
    assert_eq!(summary.banned_modules, 1);
    assert_eq!(summary.clean_process_deaths, 1);

    // The replacement worker received the blacklist on stdin.
    assert_eq!(fs::read_to_string(&received).unwrap(), "deadbeefcafe\n");

    // Telemetry landed in the control block under the mutex.
    let block = ControlBlock::open(&shm, &mutex).unwrap();
    assert!(block.progress_started());
    assert!(block.progress_complete());
    assert_eq!(block.banned_modules(), 1);
    assert_eq!(block.clean_deaths(), 1);
    assert_eq!(block.message(0).as_deref(), Some("MODULE deadbeefcafe"));
}

#[tokio::test]
async fn hung_worker_is_terminated_after_the_grace_period() {
    let dir = tempfile::tempdir().unwrap();

    // Reports a crash, releases the pipe and then refuses to die.
    let script = write_script(
        dir.path(),
        r#"cat > /dev/null
echo "CRASH"
exec > /dev/null
sleep 30
exit 2
"#,
    );

    let mut database = FixedDatabase {
        graphics: 10,
        compute: 0,
    };
    let start = std::time::Instant::now();
    let summary = run_master(&mut database, &options(script)).await.unwrap();

    // Killed without ever reporting progress: a dirty death, no restart,
    // and long before the scripted 30 s sleep.
    assert_eq!(summary.dirty_process_deaths, 1);
    assert_eq!(summary.clean_process_deaths, 0);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn finished_workers_are_not_restarted() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("args.log");

    let script = write_script(
        dir.path(),
        &format!(
            r#"echo "$@" >> {log}
cat > /dev/null
echo "GRAPHICS 0"
echo "COMPUTE 0"
exit 0
"#,
            log = log.display()
        ),
    );

    let mut database = FixedDatabase {
        graphics: 8,
        compute: 4,
    };
    let mut opts = options(script);
    opts.num_workers = 2;

    let summary = run_master(&mut database, &opts).await.unwrap();
    assert_eq!(summary, ReplaySummary::default());

    let invocations = fs::read_to_string(&log).unwrap();
    assert_eq!(invocations.lines().count(), 2);
    assert!(invocations.contains("--graphics-pipeline-range 0 4"));
    assert!(invocations.contains("--graphics-pipeline-range 4 8"));
    assert!(invocations.contains("--compute-pipeline-range 0 2"));
    assert!(invocations.contains("--compute-pipeline-range 2 4"));
}
