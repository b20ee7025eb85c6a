//! The master side of crash-isolated replay.
//!
//! The workload is split into one contiguous graphics range and one
//! contiguous compute range per worker. Each worker is a child process
//! with a piped stdout carrying the line protocol of [`crate::message`];
//! a monitor task per worker forwards parsed messages and, once the child
//! exits, drains the remaining buffered lines before reporting the exit,
//! so per-worker ordering is preserved. The supervisor itself runs a
//! single event loop.
//!
//! A worker that crashes after reporting progress is restarted on the
//! remaining range; each restart strictly advances at least one stream,
//! so the run always terminates. A worker that dies without ever
//! reporting progress is declared broken and retired.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use vpc_core::types::Hash;

use crate::control::ControlBlock;
use crate::database::{Database, ResourceTag};
use crate::error::SupervisorError;
use crate::message::WorkerMessage;

#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Number of worker processes to fan out to.
    pub num_workers: u32,
    /// State documents handed to every worker.
    pub databases: Vec<PathBuf>,
    /// Worker executable; defaults to the current executable.
    pub worker_binary: Option<PathBuf>,
    pub shm_name: Option<String>,
    pub shm_mutex_name: Option<String>,
    pub on_disk_pipeline_cache: Option<PathBuf>,
    pub pipeline_cache: bool,
    pub spirv_validate: bool,
    /// Route worker stderr to the void instead of inheriting ours.
    pub quiet_slave: bool,
    /// Grace period between a worker's CRASH message and forcible
    /// termination.
    pub crash_grace: Duration,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            num_workers: 1,
            databases: Vec::new(),
            worker_binary: None,
            shm_name: None,
            shm_mutex_name: None,
            on_disk_pipeline_cache: None,
            pipeline_cache: false,
            spirv_validate: false,
            quiet_slave: false,
            crash_grace: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub clean_process_deaths: u32,
    pub dirty_process_deaths: u32,
    /// Distinct shader modules blacklisted during the run.
    pub banned_modules: usize,
}

enum WorkerEvent {
    Message(usize, WorkerMessage),
    UnknownLine(usize, String),
    /// Exit code, or `None` when the child was killed by a signal.
    Exited(usize, Option<i32>),
}

struct WorkerState {
    index: usize,
    start_graphics: u32,
    end_graphics: u32,
    start_compute: u32,
    end_compute: u32,
    graphics_progress: i64,
    compute_progress: i64,
    kill_tx: Option<oneshot::Sender<()>>,
    crash_deadline: Option<Instant>,
}

/// Contiguous share `index` of `total` split across `workers`.
fn partition(total: u32, workers: u32, index: u32) -> (u32, u32) {
    let start = (index as u64 * total as u64 / workers as u64) as u32;
    let end = ((index as u64 + 1) * total as u64 / workers as u64) as u32;
    (start, end)
}

async fn spawn_worker(
    options: &ReplayOptions,
    state: &mut WorkerState,
    faulty_modules: &HashSet<Hash>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> Result<(), SupervisorError> {
    state.graphics_progress = -1;
    state.compute_progress = -1;
    state.crash_deadline = None;

    let binary = match &options.worker_binary {
        Some(path) => path.clone(),
        None => std::env::current_exe().map_err(SupervisorError::WorkerSpawnFailed)?,
    };

    let mut command = Command::new(&binary);
    command.args(&options.databases);
    command.arg("--slave-process");
    command.args(["--num-threads", "1"]);
    command.args([
        "--graphics-pipeline-range".to_string(),
        state.start_graphics.to_string(),
        state.end_graphics.to_string(),
    ]);
    command.args([
        "--compute-pipeline-range".to_string(),
        state.start_compute.to_string(),
        state.end_compute.to_string(),
    ]);
    if let Some(shm) = &options.shm_name {
        command.args(["--shm-name", shm]);
    }
    if let Some(mutex) = &options.shm_mutex_name {
        command.args(["--shm-mutex-name", mutex]);
    }
    if options.pipeline_cache {
        command.arg("--pipeline-cache");
    }
    if options.spirv_validate {
        command.arg("--spirv-val");
    }
    if let Some(cache) = &options.on_disk_pipeline_cache {
        // Each worker gets its own cache file; worker 0 keeps the bare name.
        let path = if state.index != 0 {
            PathBuf::from(format!("{}.{}", cache.display(), state.index))
        } else {
            cache.clone()
        };
        command.arg("--on-disk-pipeline-cache");
        command.arg(path);
    }

    command.stdin(Stdio::piped());
    command.stdout(Stdio::piped());
    command.stderr(if options.quiet_slave {
        Stdio::null()
    } else {
        Stdio::inherit()
    });

    // Children must not outlive a dying supervisor.
    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL);
            Ok(())
        });
    }

    let mut child = command
        .spawn()
        .map_err(SupervisorError::WorkerSpawnFailed)?;

    // Hand the current blacklist to the worker, then close its stdin so
    // it knows the list is complete. A write failure means the child is
    // already gone; its exit event will deal with that.
    if let Some(mut stdin) = child.stdin.take() {
        for hash in faulty_modules {
            if let Err(err) = stdin.write_all(format!("{hash:x}\n").as_bytes()).await {
                warn!(worker = state.index, "failed to send blacklist: {err}");
                break;
            }
        }
    }

    let stdout = child
        .stdout
        .take()
        .expect("worker stdout must be piped");

    let (kill_tx, kill_rx) = oneshot::channel();
    state.kill_tx = Some(kill_tx);

    info!(
        worker = state.index,
        graphics_range = ?(state.start_graphics, state.end_graphics),
        compute_range = ?(state.start_compute, state.end_compute),
        "spawned replay worker"
    );

    tokio::spawn(monitor_worker(state.index, child, stdout, kill_rx, events));
    Ok(())
}

/// Owns the child for its lifetime: forwards stdout messages, applies a
/// kill request, and reports the exit status only after the pipe has been
/// fully drained.
async fn monitor_worker(
    index: usize,
    mut child: Child,
    stdout: ChildStdout,
    mut kill_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut kill_requested = false;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => forward_line(index, &line, &events),
                Ok(None) | Err(_) => break,
            },
            _ = &mut kill_rx, if !kill_requested => {
                kill_requested = true;
                let _ = child.start_kill();
            }
        }
    }

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = &mut kill_rx, if !kill_requested => {
                kill_requested = true;
                let _ = child.start_kill();
            }
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(_) => None,
    };
    let _ = events.send(WorkerEvent::Exited(index, code));
}

fn forward_line(index: usize, line: &str, events: &mpsc::UnboundedSender<WorkerEvent>) {
    let event = match WorkerMessage::parse(line) {
        Some(message) => WorkerEvent::Message(index, message),
        None => WorkerEvent::UnknownLine(index, line.to_string()),
    };
    let _ = events.send(event);
}

/// Run the whole replay: partition, spawn, supervise, restart.
pub async fn run_master(
    database: &mut dyn Database,
    options: &ReplayOptions,
) -> Result<ReplaySummary, SupervisorError> {
    let control = match (&options.shm_name, &options.shm_mutex_name) {
        (Some(shm), Some(mutex)) => Some(ControlBlock::open(shm, mutex)?),
        _ => None,
    };

    database.prepare()?;
    let num_graphics = database.hash_list_for_tag(ResourceTag::GraphicsPipeline)?.len() as u32;
    let num_compute = database.hash_list_for_tag(ResourceTag::ComputePipeline)?.len() as u32;
    info!(num_graphics, num_compute, "replay workload sized");

    if let Some(block) = &control {
        block.set_progress_started();
    }

    let workers = options.num_workers.max(1);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let mut faulty_modules: HashSet<Hash> = HashSet::new();
    let mut states: Vec<WorkerState> = Vec::new();
    let mut summary = ReplaySummary::default();
    let mut active = 0usize;

    for i in 0..workers {
        let (start_graphics, end_graphics) = partition(num_graphics, workers, i);
        let (start_compute, end_compute) = partition(num_compute, workers, i);
        let mut state = WorkerState {
            index: i as usize,
            start_graphics,
            end_graphics,
            start_compute,
            end_compute,
            graphics_progress: -1,
            compute_progress: -1,
            kill_tx: None,
            crash_deadline: None,
        };
        if state.start_graphics >= state.end_graphics && state.start_compute >= state.end_compute {
            debug!(worker = state.index, "empty range, nothing to do");
            continue;
        }
        spawn_worker(options, &mut state, &faulty_modules, events_tx.clone()).await?;
        active += 1;
        states.push(state);
    }

    while active > 0 {
        let next_deadline = states.iter().filter_map(|s| s.crash_deadline).min();

        let event = match next_deadline {
            Some(deadline) => {
                tokio::select! {
                    event = events_rx.recv() => event,
                    _ = sleep_until(deadline) => {
                        fire_timeouts(&mut states);
                        continue;
                    }
                }
            }
            None => events_rx.recv().await,
        };

        let Some(event) = event else { break };
        match event {
            WorkerEvent::Message(index, message) => {
                handle_message(
                    &mut states,
                    index,
                    message,
                    options,
                    &mut faulty_modules,
                    control.as_ref(),
                );
            }
            WorkerEvent::UnknownLine(index, line) => {
                warn!(worker = index, line, "unexpected message from worker");
            }
            WorkerEvent::Exited(index, code) => {
                active -= 1;
                let position = states
                    .iter()
                    .position(|s| s.index == index)
                    .expect("exit event for unknown worker");
                let mut state = states.swap_remove(position);
                state.kill_tx = None;
                state.crash_deadline = None;

                if should_restart(&mut state, index, code, &mut summary, control.as_ref()) {
                    spawn_worker(options, &mut state, &faulty_modules, events_tx.clone()).await?;
                    active += 1;
                    states.push(state);
                }
            }
        }
    }

    if let Some(block) = &control {
        block.set_progress_complete();
    }

    summary.banned_modules = faulty_modules.len();
    info!(
        clean = summary.clean_process_deaths,
        dirty = summary.dirty_process_deaths,
        banned = summary.banned_modules,
        "replay complete"
    );
    Ok(summary)
}

fn fire_timeouts(states: &mut [WorkerState]) {
    let now = Instant::now();
    for state in states.iter_mut() {
        if state.crash_deadline.is_some_and(|d| d <= now) {
            state.crash_deadline = None;
            warn!("{}", SupervisorError::WorkerTimedOut { index: state.index });
            if let Some(kill) = state.kill_tx.take() {
                let _ = kill.send(());
            }
        }
    }
}

fn handle_message(
    states: &mut [WorkerState],
    index: usize,
    message: WorkerMessage,
    options: &ReplayOptions,
    faulty_modules: &mut HashSet<Hash>,
    control: Option<&ControlBlock>,
) {
    let Some(state) = states.iter_mut().find(|s| s.index == index) else {
        return;
    };
    match message {
        WorkerMessage::Graphics(progress) => {
            state.graphics_progress = i64::from(progress);
        }
        WorkerMessage::Compute(progress) => {
            state.compute_progress = i64::from(progress);
        }
        WorkerMessage::Module(hash) => {
            info!(worker = index, module = format_args!("{hash:x}"), "blacklisting shader module");
            faulty_modules.insert(hash);
            if let Some(block) = control {
                block.increment_banned_modules();
                if let Err(err) = block.write_message(&WorkerMessage::Module(hash).to_string()) {
                    warn!("failed to publish banned module: {err}");
                }
            }
        }
        WorkerMessage::Crash => {
            // The worker is trying to die gracefully; give it a bounded
            // window before pulling the plug.
            warn!(worker = index, "worker reported a crash");
            state.crash_deadline = Some(Instant::now() + options.crash_grace);
        }
    }
}

/// Apply the restart policy to a finished worker. Returns whether a
/// replacement should be spawned on the updated range.
fn should_restart(
    state: &mut WorkerState,
    index: usize,
    code: Option<i32>,
    summary: &mut ReplaySummary,
    control: Option<&ControlBlock>,
) -> bool {
    if code == Some(0) {
        info!(worker = index, "worker finished");
        return false;
    }

    if state.graphics_progress < 0 && state.compute_progress < 0 {
        // Died before any progress marker; restarting would just crash
        // the same way.
        error!("{}", SupervisorError::WorkerDirtyDeath { index });
        summary.dirty_process_deaths += 1;
        if let Some(block) = control {
            block.increment_dirty_deaths();
        }
        return false;
    }

    summary.clean_process_deaths += 1;
    if let Some(block) = control {
        block.increment_clean_deaths();
    }

    // A stream that never reported keeps its previous start index.
    if state.graphics_progress >= 0 {
        state.start_graphics = state.start_graphics.max(state.graphics_progress as u32);
    }
    if state.compute_progress >= 0 {
        state.start_compute = state.start_compute.max(state.compute_progress as u32);
    }

    if state.start_graphics >= state.end_graphics && state.start_compute >= state.end_compute {
        warn!(worker = index, exit_code = ?code, "worker crashed with nothing left to replay");
        return false;
    }

    warn!(
        worker = index,
        exit_code = ?code,
        graphics_range = ?(state.start_graphics, state.end_graphics),
        compute_range = ?(state.start_compute, state.end_compute),
        "worker crashed, retrying on the remaining range"
    );
    true
}
