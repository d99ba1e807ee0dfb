use super::command::InputKind;
use super::command::Template;
use super::statuses::Statuses;
use crate::TestcaseId;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

/// launches the target once per testcase and keeps the pid bookkeeping the
/// watcher and the reaper work from
pub struct Commander {
    template: Template,
    inputs: PathBuf,
    dumps: PathBuf,
    env: BTreeMap<String, String>,
    force_crash: bool,
    stream_output: bool,
    statuses: Arc<Statuses>,
    testcases: Mutex<BTreeMap<i32, TestcaseId>>,
}

impl Commander {
    pub fn new(
        template: Template,
        inputs: PathBuf,
        dumps: PathBuf,
        env: BTreeMap<String, String>,
        timeout: Duration,
        force_crash: bool,
        stream_output: bool,
    ) -> Self {
        Self {
            template,
            inputs,
            dumps,
            env,
            force_crash,
            stream_output,
            statuses: Arc::new(Statuses::new(timeout)),
            testcases: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn statuses(&self) -> Arc<Statuses> {
        self.statuses.clone()
    }

    pub fn input_kind(&self) -> InputKind {
        self.template.kind()
    }

    /// launch the target for one testcase; false means the dispatch is
    /// lost and the testcase should be skipped, never that the driver
    /// should stop
    pub fn call(&self, testcase: TestcaseId, payload: &[u8]) -> bool {
        let args = match self.template.materialize(&self.inputs, testcase, payload) {
            Ok(args) => args,
            Err(e) => {
                log::error!("cannot materialize testcase {}: {}", testcase, e);
                return false;
            }
        };
        let mut command = std::process::Command::new(self.template.executable());
        command
            .args(&args)
            .envs(&self.env)
            .env(crate::ENV_TESTCASE_ID, testcase.to_string())
            .env(crate::ENV_DUMPS_PATH, &self.dumps);
        if self.force_crash {
            command.env(crate::ENV_CRASH_ME, "1");
        }
        if !self.stream_output {
            command.stdout(Stdio::null()).stderr(Stdio::null());
        }
        // own process group, so a group-kill reaches any descendants
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        match command.spawn() {
            Ok(child) => {
                let pid = child.id() as i32;
                log::info!("assign pid={} with testcase_id={}", pid, testcase);
                self.testcases.lock().unwrap().insert(pid, testcase);
                self.statuses.insert(pid);
                true
            }
            Err(e) => {
                log::error!("process call for testcase_id={} failed: {}", testcase, e);
                false
            }
        }
    }

    pub fn testcase_of(&self, pid: i32) -> Option<TestcaseId> {
        self.testcases.lock().unwrap().get(&pid).copied()
    }

    /// forget a pid once its trace has been drained
    pub fn processed(&self, pid: i32) {
        self.testcases.lock().unwrap().remove(&pid);
    }

    pub fn shutdown(&self) {
        self.statuses.kill_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::statuses::Status;
    use std::time::Instant;

    fn commander(call: &str, dir: &std::path::Path) -> Commander {
        Commander::new(
            Template::parse(call).unwrap(),
            dir.to_path_buf(),
            dir.join("dumps"),
            BTreeMap::new(),
            Duration::from_secs(10),
            false,
            false,
        )
    }

    #[test]
    fn dispatch_tracks_pid_and_testcase() {
        let dir = tempfile::tempdir().unwrap();
        let commander = commander("true __INPUT__", dir.path());
        assert!(commander.call(11, b"payload"));
        let statuses = commander.statuses();
        let deadline = Instant::now() + Duration::from_secs(5);
        while statuses.live() > 0 && Instant::now() < deadline {
            statuses.scan();
            std::thread::sleep(Duration::from_millis(10));
        }
        let finished = statuses.harvest();
        assert_eq!(finished.len(), 1);
        let (pid, status) = finished.into_iter().next().unwrap();
        assert_eq!(status, Status::Terminated);
        assert_eq!(commander.testcase_of(pid), Some(11));
        commander.processed(pid);
        assert_eq!(commander.testcase_of(pid), None);
    }

    #[test]
    fn missing_executable_fails_the_call_only() {
        let dir = tempfile::tempdir().unwrap();
        let commander = commander("/nonexistent/binary __INPUT__", dir.path());
        assert!(!commander.call(12, b"payload"));
    }

    #[test]
    fn file_inputs_are_written_per_testcase() {
        let dir = tempfile::tempdir().unwrap();
        let commander = commander("true __FILE__", dir.path());
        assert!(commander.call(13, b"file payload"));
        assert_eq!(
            std::fs::read(dir.path().join("tc_13")).unwrap(),
            b"file payload"
        );
        commander.shutdown();
    }
}
