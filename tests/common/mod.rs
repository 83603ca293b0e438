//! Shared fixtures: an in-memory sandbox runtime and a scripted agent.
//!
//! The fake agent listens on a loopback port standing in for every
//! sandbox's control port. For each command it asks the test's script what
//! happened, writes captured output into the runtime's files in judge mode,
//! and dials the completion back to the correlator like a real agent.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio::net::{TcpListener, TcpStream};

use cafecoder_judge::config::Config;
use cafecoder_judge::correlator::Correlator;
use cafecoder_judge::judge::Judge;
use cafecoder_judge::sandbox::SandboxRuntime;
use cafecoder_judge::transport::{
    recv_message, send_message, CommandRequest, CompletionRecord, Mode,
};

pub const WORK_PREFIX: &str = "/judge";

#[derive(Default)]
struct RuntimeState {
    calls: Vec<String>,
    files: HashMap<(String, String), Vec<u8>>,
}

/// Sandbox runtime that keeps every sandbox's files in memory.
#[derive(Default)]
pub struct MemoryRuntime {
    state: Mutex<RuntimeState>,
    pub fail_create: bool,
    pub panic_on_read: bool,
}

impl MemoryRuntime {
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    pub fn panicking_reads() -> Self {
        Self {
            panic_on_read: true,
            ..Self::default()
        }
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn file(&self, sandbox: &str, path: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(&(sandbox.to_string(), path.to_string()))
            .cloned()
    }

    pub fn put(&self, sandbox: &str, path: &str, contents: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert((sandbox.to_string(), path.to_string()), contents.to_vec());
    }
}

#[async_trait]
impl SandboxRuntime for MemoryRuntime {
    async fn create(&self, name: &str, image: &str) -> Result<()> {
        self.log(format!("create {name} {image}"));
        anyhow::ensure!(!self.fail_create, "no such image: {image}");
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        self.log(format!("start {name}"));
        Ok(())
    }

    async fn address(&self, _name: &str) -> Result<Option<String>> {
        Ok(Some("127.0.0.1".into()))
    }

    async fn stop(&self, name: &str, _timeout: Duration) -> Result<()> {
        self.log(format!("stop {name}"));
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.log(format!("remove {name}"));
        Ok(())
    }

    async fn write_file(&self, name: &str, path: &str, contents: &[u8]) -> Result<()> {
        self.put(name, path, contents);
        Ok(())
    }

    async fn read_file(&self, name: &str, path: &str) -> Result<Vec<u8>> {
        assert!(!self.panic_on_read, "runtime blew up reading {path}");
        self.file(name, path)
            .ok_or_else(|| anyhow::anyhow!("no such file {path} in {name}"))
    }
}

/// What the scripted agent reports for one command.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub elapsed_ms: i64,
    pub success: bool,
    pub error_message: String,
    pub stdout: String,
    pub stderr: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn output(stdout: &str, elapsed_ms: i64) -> Self {
        Self {
            elapsed_ms,
            success: true,
            stdout: stdout.to_string(),
            ..Self::default()
        }
    }
}

/// Decides the outcome of a command. Receives the staged test input for
/// judge-mode commands.
pub type Script = Arc<dyn Fn(&CommandRequest, &[u8]) -> Reply + Send + Sync>;

/// Everything a test needs to drive the judge.
pub struct Harness {
    pub judge: Judge<MemoryRuntime>,
    pub runtime: Arc<MemoryRuntime>,
    pub commands: Arc<Mutex<Vec<CommandRequest>>>,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new(script: Script) -> Self {
        Self::with_runtime(MemoryRuntime::default(), script).await
    }

    pub async fn with_runtime(runtime: MemoryRuntime, script: Script) -> Self {
        Self::configured(runtime, script, |_| {}).await
    }

    /// Build a harness, then let the test adjust the judge's config.
    pub async fn configured(
        runtime: MemoryRuntime,
        script: Script,
        adjust: impl FnOnce(&mut Config),
    ) -> Self {
        let runtime = Arc::new(runtime);
        let correlator = Correlator::new();

        let completions = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let completion_addr = completions.local_addr().unwrap();
        tokio::spawn(Arc::clone(&correlator).serve(completions));

        let agent = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let control_port = agent.local_addr().unwrap().port();
        let commands = Arc::new(Mutex::new(Vec::new()));
        tokio::spawn(run_agent(
            agent,
            completion_addr,
            Arc::clone(&runtime),
            Arc::clone(&commands),
            script,
        ));

        let mut config = Config {
            control_port,
            work_dir_prefix: WORK_PREFIX.into(),
            completion_timeout_seconds: 5,
            address_attempts: 1,
            ..Config::default()
        };
        adjust(&mut config);

        Self {
            judge: Judge::new(Arc::new(config), Arc::clone(&runtime), correlator),
            runtime,
            commands,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    /// Write a source file and return its path.
    pub fn source(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    /// Write a problem directory with `(name, input, expected)` cases.
    pub fn problem(&self, name: &str, cases: &[(&str, &str, &str)]) -> PathBuf {
        let root = self.dir.path().join(name);
        std::fs::create_dir_all(root.join("in")).unwrap();
        std::fs::create_dir_all(root.join("out")).unwrap();

        let mut manifest = String::new();
        for (case, input, expected) in cases {
            std::fs::write(root.join("in").join(case), input).unwrap();
            std::fs::write(root.join("out").join(case), expected).unwrap();
            manifest.push_str(case);
            manifest.push('\n');
        }
        std::fs::write(root.join("testcase_list.txt"), manifest).unwrap();
        root
    }

    pub fn commands_for(&self, session: &str) -> Vec<CommandRequest> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.session_id == session)
            .cloned()
            .collect()
    }
}

/// Submission line for the intake protocol.
pub fn line(session: &str, source: &Path, language: u8, tests: &Path, score: i64) -> String {
    format!(
        "0,{session},{},{language},{},{score}\n",
        source.display(),
        tests.display()
    )
}

async fn run_agent(
    listener: TcpListener,
    completion_addr: SocketAddr,
    runtime: Arc<MemoryRuntime>,
    commands: Arc<Mutex<Vec<CommandRequest>>>,
    script: Script,
) {
    loop {
        let Ok((mut conn, _)) = listener.accept().await else {
            continue;
        };
        let Ok(request) = recv_message::<_, CommandRequest>(&mut conn).await else {
            continue;
        };
        commands.lock().unwrap().push(request.clone());

        let work_dir = format!("{WORK_PREFIX}/{}", request.session_id);
        let input = runtime
            .file(&request.session_id, &format!("{work_dir}/testcase.txt"))
            .unwrap_or_default();
        let reply = script(&request, &input);

        if request.mode == Mode::Judge {
            runtime.put(
                &request.session_id,
                &format!("{work_dir}/userStdout.txt"),
                reply.stdout.as_bytes(),
            );
            runtime.put(
                &request.session_id,
                &format!("{work_dir}/userStderr.txt"),
                reply.stderr.as_bytes(),
            );
        }

        tokio::spawn(async move {
            tokio::time::sleep(reply.delay).await;
            let record = CompletionRecord {
                session_id: request.session_id,
                elapsed_ms: reply.elapsed_ms,
                success: reply.success,
                error_message: reply.error_message,
            };
            let mut stream = TcpStream::connect(completion_addr).await.unwrap();
            send_message(&mut stream, &record).await.unwrap();
        });
    }
}

/// Wrap a closure as a [`Script`].
pub fn script(f: impl Fn(&CommandRequest, &[u8]) -> Reply + Send + Sync + 'static) -> Script {
    Arc::new(f)
}

/// Script where every tool command succeeds and test runs are decided by `f`.
pub fn runs(f: impl Fn(&CommandRequest, &[u8]) -> Reply + Send + Sync + 'static) -> Script {
    script(move |req, input| match req.mode {
        Mode::Judge => f(req, input),
        Mode::Others => Reply::ok(),
    })
}
