use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

/// lifecycle of a dispatched target process. transitions are monotonic:
/// once out of `Running` a pid never changes status again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Terminated,
    Crashed,
    TimedOut,
}

impl Status {
    pub fn is_final(&self) -> bool {
        *self != Self::Running
    }
}

/// pid bookkeeping shared between the dispatcher, the watcher task, and
/// the reaper. the watcher scans on a 10 ms cadence, delivers the
/// controlled-timeout signal past the CPU budget, and records natural
/// terminations.
pub struct Statuses {
    timeout: Duration,
    pids: Mutex<BTreeSet<i32>>,
    statuses: Mutex<BTreeMap<i32, Status>>,
    clocks: Mutex<BTreeMap<i32, Instant>>,
}

impl Statuses {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            pids: Mutex::new(BTreeSet::new()),
            statuses: Mutex::new(BTreeMap::new()),
            clocks: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, pid: i32) {
        self.statuses.lock().unwrap().insert(pid, Status::Running);
        self.clocks.lock().unwrap().insert(pid, Instant::now());
        self.pids.lock().unwrap().insert(pid);
    }

    pub fn update(&self, pid: i32, status: Status) {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.get(&pid) == Some(&Status::Running) {
            statuses.insert(pid, status);
        }
    }

    pub fn status(&self, pid: i32) -> Option<Status> {
        self.statuses.lock().unwrap().get(&pid).copied()
    }

    pub fn live(&self) -> usize {
        self.statuses
            .lock()
            .unwrap()
            .values()
            .filter(|status| **status == Status::Running)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.pids.lock().unwrap().is_empty()
    }

    fn copy_pids(&self) -> BTreeSet<i32> {
        self.pids.lock().unwrap().clone()
    }

    fn remove(&self, pid: i32) {
        self.statuses.lock().unwrap().remove(&pid);
        self.clocks.lock().unwrap().remove(&pid);
        self.pids.lock().unwrap().remove(&pid);
    }
}

// the watcher pass
impl Statuses {
    /// one scan over every tracked pid: reap what exited, time out what
    /// overran its CPU budget
    pub fn scan(&self) {
        for pid in self.copy_pids() {
            match probe(pid) {
                Status::Running => {
                    if self.elapsed(pid) > self.timeout {
                        timeout_kill(pid);
                        self.update(pid, Status::TimedOut);
                    }
                }
                status => self.update(pid, status),
            }
        }
    }

    /// the budget covers both clocks: consumed CPU time (user plus
    /// system) and wall time since dispatch
    fn elapsed(&self, pid: i32) -> Duration {
        let wall = self
            .clocks
            .lock()
            .unwrap()
            .get(&pid)
            .map(|started| started.elapsed())
            .unwrap_or_default();
        cpu_time(pid).unwrap_or_default().max(wall)
    }

    /// pull every pid that left `Running` out of tracking
    pub fn harvest(&self) -> BTreeMap<i32, Status> {
        let mut finished = BTreeMap::new();
        for pid in self.copy_pids() {
            if let Some(status) = self.status(pid) {
                if status.is_final() {
                    finished.insert(pid, status);
                }
            }
        }
        for pid in finished.keys() {
            self.remove(*pid);
        }
        finished
    }

    /// shutdown: group-kill everything still tracked
    pub fn kill_all(&self) {
        for pid in self.copy_pids() {
            group_kill(pid);
            self.remove(pid);
        }
    }
}

/// non-blocking wait: has the child left the building
fn probe(pid: i32) -> Status {
    let mut status = 0;
    let waited = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG | libc::WUNTRACED) };
    if waited == pid && (libc::WIFEXITED(status) || libc::WIFSIGNALED(status)) {
        Status::Terminated
    } else {
        Status::Running
    }
}

/// utime + stime from /proc, in clock ticks
fn cpu_time(pid: i32) -> Option<Duration> {
    let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // fields 14 and 15, counted after the parenthesized comm field
    let after_comm = stat.rsplit(')').next()?;
    let fields = after_comm.split_whitespace().collect::<Vec<_>>();
    let utime = fields.get(11)?.parse::<u64>().ok()?;
    let stime = fields.get(12)?.parse::<u64>().ok()?;
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) } as u64;
    Some(Duration::from_secs_f64((utime + stime) as f64 / ticks as f64))
}

/// notify the child of the timeout; its runtime flushes the trace and
/// exits on its own
pub fn timeout_kill(pid: i32) {
    unsafe { libc::kill(pid, libc::SIGUSR2) };
}

/// no more mercy: take the whole process group down
pub fn group_kill(pid: i32) {
    unsafe {
        libc::kill(-pid, libc::SIGKILL);
        libc::kill(pid, libc::SIGKILL);
        let mut status = 0;
        libc::waitpid(pid, &mut status, 0);
    }
}
