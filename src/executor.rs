//! Drives a [`project::CommandProject`] over a CAN channel and, for UDS
//! commands, a [`UdsSessionEngine`]: walks groups and commands in order,
//! re-dispatches periodic commands on their own background threads, and
//! reports progress as a stream of [`ExecutorEvent`]s.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use crate::channel::{CanChannel, ChannelError};
use crate::frame::{CanFrame, FrameError};
use crate::project::{Command, CommandGroup, CommandProject, CommandStatus, CommandType, SendMode};
use crate::uds::{UdsError, UdsRequest, UdsService, UdsSessionEngine};

/// How long [`CommandExecutor::stop`] waits for periodic dispatch threads to
/// notice cancellation before giving up and detaching them.
const STOP_JOIN_BUDGET: Duration = Duration::from_secs(2);

/// Error surfaced by [`CommandExecutor`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// A project is already running on this executor.
    #[error("a project is already running on this executor")]
    Busy,
    /// No project is running.
    #[error("no project is currently running")]
    NotRunning,
    /// A command referenced a command type with no matching payload.
    #[error("command {0:?} has command_type {1:?} but no matching payload")]
    MissingPayload(String, CommandType),
    /// Building the CAN frame for a `can_frame` command failed.
    #[error("invalid CAN frame: {0}")]
    Frame(#[from] FrameError),
    /// Sending a CAN frame failed at the channel layer.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
    /// A `uds_command` was present but this executor has no UDS session.
    #[error("command requires a UDS session but none was configured")]
    NoUdsSession,
    /// The UDS request failed.
    #[error("UDS error: {0}")]
    Uds(#[from] UdsError),
    /// The caller named a channel id this executor was not bound to.
    #[error("channel {0:?} is not the channel this executor is bound to")]
    UnknownChannel(String),
}

/// One observable milestone in a project's execution. Delivered over the
/// channel returned by [`CommandExecutor::start`] rather than as callback
/// fields, so a caller can observe progress from any thread without holding
/// a lock on the executor.
#[derive(Debug, Clone)]
pub enum ExecutorEvent {
    /// The project's run began.
    ProjectStarted { project_id: String },
    /// The project's run ended, either by running out of groups or by
    /// [`CommandExecutor::stop`].
    ProjectCompleted { project_id: String },
    /// A group's command list began its first pass.
    GroupStarted { group_id: String },
    /// A group finished its configured repeat count (or was cancelled).
    GroupCompleted { group_id: String },
    /// A command was handed to its transport.
    CommandStarted { command_id: String },
    /// A command's dispatch completed successfully.
    CommandCompleted { command_id: String },
    /// A command's dispatch failed.
    CommandFailed { command_id: String, error: String },
}

/// A live snapshot of one command's running counters (spec §3 "running
/// counters", §8.5). `CommandExecutor::start` takes a [`CommandProject`] by
/// value and only ever reads it afterwards (§3's "read-only borrow of the
/// project while it runs"), so counters are advanced in this side table
/// rather than by mutating the command in place; a caller that wants them
/// folded back into a persisted project can do so after the run completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandCounters {
    /// Number of times this command has been dispatched.
    pub execution_count: u64,
    /// Number of dispatches that completed successfully.
    pub success_count: u64,
    /// Number of dispatches that failed.
    pub fail_count: u64,
    /// Most recent dispatch outcome.
    pub status: CommandStatus,
    /// Unix millis of the most recent dispatch, 0 if never run.
    pub last_executed: u64,
}

type CounterTable = Arc<Mutex<HashMap<String, CommandCounters>>>;

fn record_counter(table: &CounterTable, command_id: &str, succeeded: bool) {
    let mut table = table.lock().unwrap();
    let entry = table.entry(command_id.to_string()).or_default();
    entry.execution_count += 1;
    if succeeded {
        entry.success_count += 1;
        entry.status = CommandStatus::Success;
    } else {
        entry.fail_count += 1;
        entry.status = CommandStatus::Failed;
    }
    entry.last_executed = now_unix_millis();
}

fn now_unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Drives one [`CommandProject`] at a time over a CAN channel pair.
///
/// Concurrency mirrors the rest of this crate: a dedicated worker thread
/// owns the run, periodic commands get their own thread, and every
/// suspension point (sleeps, periodic loops) checks a shared cancellation
/// flag rather than being abruptly killed.
pub struct CommandExecutor {
    channel_id: String,
    can: Arc<dyn CanChannel>,
    uds: Option<Arc<UdsSessionEngine>>,
    cancel: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    periodic: Arc<Mutex<Vec<JoinHandle<()>>>>,
    events: Mutex<Option<mpsc::Sender<ExecutorEvent>>>,
    counters: CounterTable,
}

impl std::fmt::Debug for CommandExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExecutor")
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl CommandExecutor {
    /// Builds an executor bound to `channel_id`, driving `can` and,
    /// optionally, a UDS session for `uds_command` steps. A project with no
    /// `uds_command` steps can pass `None` for `uds`.
    ///
    /// This executor always drives the one channel pair it was built with;
    /// `channel_id` exists so [`CommandExecutor::start`]/`execute_one`'s
    /// `channel_id` argument (named in the public contract for hosts that
    /// juggle several channels/executors) can be checked against it rather
    /// than silently ignored.
    pub fn new(channel_id: impl Into<String>, can: Arc<dyn CanChannel>, uds: Option<Arc<UdsSessionEngine>>) -> Self {
        Self {
            channel_id: channel_id.into(),
            can,
            uds,
            cancel: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            periodic: Arc::new(Mutex::new(Vec::new())),
            events: Mutex::new(None),
            counters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// True while a project is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current execution/success/fail counters and status for `command_id`,
    /// advanced as the running (or most recently run) project dispatches it.
    /// `None` if the command has never been dispatched by this executor.
    pub fn command_counters(&self, command_id: &str) -> Option<CommandCounters> {
        self.counters.lock().unwrap().get(command_id).cloned()
    }

    /// Starts running `project` on a background thread, returning the
    /// receiving end of its event stream. Fails if a project is already
    /// running on this executor.
    pub fn start(
        &self,
        project: CommandProject,
        channel_id: &str,
    ) -> Result<mpsc::Receiver<ExecutorEvent>, ExecutorError> {
        if channel_id != self.channel_id {
            return Err(ExecutorError::UnknownChannel(channel_id.to_string()));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            self.running.store(true, Ordering::SeqCst);
            return Err(ExecutorError::Busy);
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.counters.lock().unwrap().clear();

        let (tx, rx) = mpsc::channel();
        *self.events.lock().unwrap() = Some(tx.clone());

        let can = self.can.clone();
        let uds = self.uds.clone();
        let cancel = self.cancel.clone();
        let running = self.running.clone();
        let periodic_for_worker = self.periodic.clone();
        let counters = self.counters.clone();

        let handle = std::thread::spawn(move || {
            let _ = tx.send(ExecutorEvent::ProjectStarted {
                project_id: project.id.clone(),
            });
            for group in &project.groups {
                if cancel.load(Ordering::SeqCst) {
                    break;
                }
                if !group.enabled {
                    continue;
                }
                run_group(group, &can, uds.as_ref(), &cancel, &tx, &periodic_for_worker, &counters);
            }
            let _ = tx.send(ExecutorEvent::ProjectCompleted {
                project_id: project.id,
            });
            running.store(false, Ordering::SeqCst);
        });

        *self.worker.lock().unwrap() = Some(handle);
        self.periodic.lock().unwrap().clear();
        Ok(rx)
    }

    /// Requests cancellation and waits (up to a bounded timeout) for the
    /// worker and any periodic dispatch threads to notice and exit. Threads
    /// that do not exit in time are detached rather than leaked-and-blocked.
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(handle) = self.worker.lock().unwrap().take() {
            join_with_budget(handle, STOP_JOIN_BUDGET);
        }
        let periodic = std::mem::take(&mut *self.periodic.lock().unwrap());
        let deadline = Instant::now() + STOP_JOIN_BUDGET;
        for handle in periodic {
            let remaining = deadline.saturating_duration_since(Instant::now());
            join_with_budget(handle, remaining);
        }
        self.running.store(false, Ordering::SeqCst);
        *self.events.lock().unwrap() = None;
    }

    /// Dispatches a single command immediately, bypassing group sequencing
    /// and periodic re-dispatch. Useful for a "run this one step" action in
    /// a caller's UI.
    pub fn execute_one(&self, command: &Command, channel_id: &str) -> Result<(), ExecutorError> {
        if channel_id != self.channel_id {
            return Err(ExecutorError::UnknownChannel(channel_id.to_string()));
        }
        let result = dispatch(command, &self.can, self.uds.as_ref());
        record_counter(&self.counters, &command.id, result.is_ok());
        result
    }
}

/// Blocks on `handle` for up to `budget`, polling [`JoinHandle::is_finished`].
/// `std::thread::JoinHandle` has no native timed join, so cooperative
/// cancellation (the `cancel` flag) is what actually bounds the wait; this
/// only protects against a thread that never checks it.
fn join_with_budget(handle: JoinHandle<()>, budget: Duration) {
    let deadline = Instant::now() + budget;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("executor thread did not exit within the stop budget; detaching");
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
}

fn run_group(
    group: &CommandGroup,
    can: &Arc<dyn CanChannel>,
    uds: Option<&Arc<UdsSessionEngine>>,
    cancel: &Arc<AtomicBool>,
    tx: &mpsc::Sender<ExecutorEvent>,
    periodic: &Arc<Mutex<Vec<JoinHandle<()>>>>,
    counters: &CounterTable,
) {
    let _ = tx.send(ExecutorEvent::GroupStarted {
        group_id: group.id.clone(),
    });

    let mut iterations = 0u32;
    loop {
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        for command in &group.commands {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            if !command.enabled {
                continue;
            }
            match command.send_mode {
                SendMode::Single | SendMode::OnChange => {
                    run_command(command, can, uds, tx, counters);
                }
                SendMode::Periodic => {
                    spawn_periodic(
                        command.clone(),
                        can.clone(),
                        uds.cloned(),
                        cancel.clone(),
                        tx.clone(),
                        periodic,
                        counters.clone(),
                    );
                }
            }
        }
        iterations += 1;
        if group.repeat_count != 0 && iterations >= group.repeat_count {
            break;
        }
        if cancel.load(Ordering::SeqCst) {
            break;
        }
        sleep_cancelable(Duration::from_millis(group.repeat_interval as u64), cancel);
    }

    let _ = tx.send(ExecutorEvent::GroupCompleted {
        group_id: group.id.clone(),
    });
}

fn spawn_periodic(
    command: Command,
    can: Arc<dyn CanChannel>,
    uds: Option<Arc<UdsSessionEngine>>,
    cancel: Arc<AtomicBool>,
    tx: mpsc::Sender<ExecutorEvent>,
    periodic: &Arc<Mutex<Vec<JoinHandle<()>>>>,
    counters: CounterTable,
) {
    let period = Duration::from_millis(command.period.max(1) as u64);
    let handle = std::thread::spawn(move || {
        while !cancel.load(Ordering::SeqCst) {
            run_command(&command, &can, uds.as_ref(), &tx, &counters);
            sleep_cancelable(period, &cancel);
        }
    });
    periodic.lock().unwrap().push(handle);
}

fn sleep_cancelable(total: Duration, cancel: &Arc<AtomicBool>) {
    let step = Duration::from_millis(20);
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let chunk = remaining.min(step);
        std::thread::sleep(chunk);
        remaining -= chunk;
    }
}

fn run_command(
    command: &Command,
    can: &Arc<dyn CanChannel>,
    uds: Option<&Arc<UdsSessionEngine>>,
    tx: &mpsc::Sender<ExecutorEvent>,
    counters: &CounterTable,
) {
    let _ = tx.send(ExecutorEvent::CommandStarted {
        command_id: command.id.clone(),
    });
    let result = dispatch(command, can, uds);
    record_counter(counters, &command.id, result.is_ok());
    match result {
        Ok(()) => {
            let _ = tx.send(ExecutorEvent::CommandCompleted {
                command_id: command.id.clone(),
            });
        }
        Err(e) => {
            debug!("command {} failed: {e}", command.id);
            let _ = tx.send(ExecutorEvent::CommandFailed {
                command_id: command.id.clone(),
                error: e.to_string(),
            });
        }
    }
}

fn dispatch(
    command: &Command,
    can: &Arc<dyn CanChannel>,
    uds: Option<&Arc<UdsSessionEngine>>,
) -> Result<(), ExecutorError> {
    match command.command_type {
        CommandType::CanFrame => {
            let spec = command
                .can_frame
                .as_ref()
                .ok_or_else(|| ExecutorError::MissingPayload(command.id.clone(), command.command_type))?;
            let frame = CanFrame::new(spec.arbitration_id, &spec.data, spec.flags(), 0, SystemTime::now())?;
            can.send(&frame)?;
            Ok(())
        }
        CommandType::UdsCommand => {
            let spec = command
                .uds_command
                .as_ref()
                .ok_or_else(|| ExecutorError::MissingPayload(command.id.clone(), command.command_type))?;
            let engine = uds.ok_or(ExecutorError::NoUdsSession)?;
            let timeout = Duration::from_millis(spec.timeout as u64);
            let service = UdsService::from(spec.service_id);
            let request = match spec.subfunction {
                Some(sf) => UdsRequest::with_sub_function(service, sf, spec.data.clone(), timeout),
                None => UdsRequest::new(service, spec.data.clone(), timeout),
            };
            if spec.expect_response {
                engine.send_request(request)?;
            } else {
                engine.send_and_forget(request)?;
            }
            Ok(())
        }
        CommandType::Wait => {
            let spec = command
                .wait_command
                .as_ref()
                .ok_or_else(|| ExecutorError::MissingPayload(command.id.clone(), command.command_type))?;
            std::thread::sleep(Duration::from_millis(spec.duration as u64));
            Ok(())
        }
        CommandType::Comment => Ok(()),
        CommandType::Script => Ok(()),
    }
}

/// Stamps `command`'s counters after a dispatch outcome, mirroring what the
/// executor's event stream reports. Exposed for callers that persist a
/// project's commands back to disk after a run and want `execution_count`/
/// `success_count`/`fail_count`/`status`/`last_executed` to reflect it.
pub fn record_outcome(command: &mut Command, succeeded: bool) {
    command.execution_count += 1;
    if succeeded {
        command.success_count += 1;
        command.status = CommandStatus::Success;
    } else {
        command.fail_count += 1;
        command.status = CommandStatus::Failed;
    }
    command.last_executed = now_unix_millis();
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::channel::{CanChannelConfig, CanChannelStats, ChannelResult, SendStatus, SubscriptionId};
    use crate::project::{CanFrameCommand, CommandGroup};
    use std::sync::atomic::AtomicU64;

    #[derive(Debug, Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<CanFrame>>,
    }

    impl CanChannel for RecordingChannel {
        fn open(&mut self, _config: CanChannelConfig) -> ChannelResult<()> {
            Ok(())
        }
        fn close(&mut self) -> ChannelResult<()> {
            Ok(())
        }
        fn send(&self, frame: &CanFrame) -> ChannelResult<SendStatus> {
            self.sent.lock().unwrap().push(frame.clone());
            Ok(SendStatus::Accepted)
        }
        fn subscribe(&self, _callback: Box<dyn Fn(CanFrame) + Send + Sync>) -> SubscriptionId {
            0
        }
        fn unsubscribe(&self, _id: SubscriptionId) {}
        fn stats(&self) -> CanChannelStats {
            CanChannelStats::default()
        }
    }

    fn sample_group() -> CommandGroup {
        CommandGroup {
            id: "g1".into(),
            name: "group".into(),
            description: String::new(),
            enabled: true,
            commands: vec![Command {
                id: "c1".into(),
                name: "ping".into(),
                command_type: CommandType::CanFrame,
                send_mode: SendMode::Single,
                period: 1000,
                enabled: true,
                status: CommandStatus::Pending,
                last_executed: 0,
                execution_count: 0,
                success_count: 0,
                fail_count: 0,
                can_frame: Some(CanFrameCommand {
                    arbitration_id: 0x123,
                    data: vec![0x01, 0x02],
                    is_extended_id: false,
                    is_fd: false,
                    bitrate_switch: false,
                    error_state_indicator: false,
                    dlc: 2,
                    comment: String::new(),
                }),
                uds_command: None,
                wait_command: None,
                comment_command: None,
                script_command: None,
            }],
            repeat_count: 1,
            repeat_interval: 10,
            run_in_sequence: true,
        }
    }

    #[test]
    fn runs_a_single_group_to_completion() {
        let can: Arc<dyn CanChannel> = Arc::new(RecordingChannel::default());
        let executor = CommandExecutor::new("can0", can, None);
        let mut project = CommandProject::new("p1", "proj", "");
        project.add_group(sample_group());

        let rx = executor.start(project, "can0").unwrap();
        let mut events = Vec::new();
        while let Ok(event) = rx.recv_timeout(Duration::from_secs(1)) {
            let is_last = matches!(event, ExecutorEvent::ProjectCompleted { .. });
            events.push(event);
            if is_last {
                break;
            }
        }
        assert!(events
            .iter()
            .any(|e| matches!(e, ExecutorEvent::CommandCompleted { command_id } if command_id == "c1")));
        assert!(!executor.is_running());
    }

    #[test]
    fn second_start_while_running_is_rejected() {
        let can: Arc<dyn CanChannel> = Arc::new(RecordingChannel::default());
        let executor = CommandExecutor::new("can0", can, None);
        let mut group = sample_group();
        group.repeat_count = 0;
        group.repeat_interval = 50;
        let mut project = CommandProject::new("p1", "proj", "");
        project.add_group(group);

        let _rx = executor.start(project.clone(), "can0").unwrap();
        let err = executor.start(project, "can0").unwrap_err();
        assert!(matches!(err, ExecutorError::Busy));
        executor.stop();
    }

    #[test]
    fn periodic_command_advances_live_counters_until_stopped() {
        let can: Arc<dyn CanChannel> = Arc::new(RecordingChannel::default());
        let executor = CommandExecutor::new("can0", can, None);
        let mut group = sample_group();
        group.commands[0].send_mode = SendMode::Periodic;
        group.commands[0].period = 20;
        group.repeat_count = 1;
        let mut project = CommandProject::new("p1", "proj", "");
        project.add_group(group);

        let _rx = executor.start(project, "can0").unwrap();
        std::thread::sleep(Duration::from_secs(1));
        executor.stop();

        let counters = executor.command_counters("c1").expect("command ran at least once");
        assert!(
            counters.execution_count >= 20,
            "expected at least 20 ticks in 1s at a 20ms period, got {}",
            counters.execution_count
        );
        assert_eq!(counters.execution_count, counters.success_count);
        assert_eq!(counters.status, CommandStatus::Success);
    }

    #[test]
    fn record_outcome_updates_counters_and_status() {
        let mut command = sample_group().commands.remove(0);
        record_outcome(&mut command, true);
        assert_eq!(command.execution_count, 1);
        assert_eq!(command.success_count, 1);
        assert_eq!(command.status, CommandStatus::Success);
        record_outcome(&mut command, false);
        assert_eq!(command.execution_count, 2);
        assert_eq!(command.fail_count, 1);
        assert_eq!(command.status, CommandStatus::Failed);

        let _ = AtomicU64::new(0);
    }
}
