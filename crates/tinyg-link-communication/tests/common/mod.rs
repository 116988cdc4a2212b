#![allow(dead_code)]

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tinyg_link_communication::{Channel, TinyGLink};
use tinyg_link_settings::LinkConfig;

pub const HARD_STOP_LINE: &str =
    r#"{"er":{"fb":440.20,"st":204,"msg":"Limit switch hit - Shutdown occurred"}}"#;

pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

// Everything the mock saw, shared with the test
#[derive(Default)]
pub struct MockState {
    pub writes: Vec<String>,
    pub inbox: VecDeque<u8>,
    pub in_use: bool,
    pub overlaps: usize,
    pub flow_control: bool,
    pub input_clears: usize,
    pub output_clears: usize,
    pub closed: bool,
    pub fail_reads: bool,
    pub read_hold: Duration,
    pub reads: usize,
}

#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    pub fn push_input(&self, bytes: &[u8]) {
        self.state.lock().inbox.extend(bytes.iter().copied());
    }

    pub fn push_line(&self, line: &str) {
        self.push_input(format!("{}\n", line).as_bytes());
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().writes.clone()
    }

    pub fn count_writes(&self, payload: &str) -> usize {
        self.state
            .lock()
            .writes
            .iter()
            .filter(|w| w.trim_end() == payload)
            .count()
    }

    pub fn overlaps(&self) -> usize {
        self.state.lock().overlaps
    }

    pub fn flow_control(&self) -> bool {
        self.state.lock().flow_control
    }

    pub fn input_clears(&self) -> usize {
        self.state.lock().input_clears
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn fail_reads(&self) {
        self.state.lock().fail_reads = true;
    }

    // Keep each read "on the wire" for a while, as a slow port would
    pub fn hold_reads(&self, hold: Duration) {
        self.state.lock().read_hold = hold;
    }

    pub fn reads(&self) -> usize {
        self.state.lock().reads
    }
}

pub struct MockChannel {
    state: Arc<Mutex<MockState>>,
    responder: Option<Responder>,
    write_hold: Duration,
}

impl MockChannel {
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let channel = Self {
            state: state.clone(),
            responder: None,
            write_hold: Duration::ZERO,
        };
        (channel, MockHandle { state })
    }

    pub fn with_responder(responder: Responder) -> (Self, MockHandle) {
        let (mut channel, handle) = Self::new();
        channel.responder = Some(responder);
        (channel, handle)
    }

    // Keep each write "on the wire" for a while so overlapping access shows up
    pub fn hold_writes(mut self, hold: Duration) -> Self {
        self.write_hold = hold;
        self
    }

    // Mark the wire busy, counting anyone who finds it busy already
    fn enter(&self) {
        let mut state = self.state.lock();
        if state.in_use {
            state.overlaps += 1;
        }
        state.in_use = true;
    }

    fn leave(&self) {
        self.state.lock().in_use = false;
    }

    fn unplugged(&self) -> io::Result<()> {
        if self.state.lock().fail_reads {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        Ok(())
    }
}

impl Channel for MockChannel {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.enter();
        if !self.write_hold.is_zero() {
            std::thread::sleep(self.write_hold);
        }

        let text = String::from_utf8_lossy(data).to_string();
        let replies = match self.responder.as_mut() {
            Some(responder) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .flat_map(|line| responder(line))
                .collect(),
            None => Vec::new(),
        };

        let mut state = self.state.lock();
        state.writes.push(text);
        for reply in replies {
            state.inbox.extend(reply.bytes());
            state.inbox.push_back(b'\n');
        }
        drop(state);
        self.leave();
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn bytes_pending(&self) -> io::Result<usize> {
        self.unplugged()?;
        self.enter();
        let pending = self.state.lock().inbox.len();
        self.leave();
        Ok(pending)
    }

    fn read_available(&mut self) -> io::Result<Vec<u8>> {
        self.unplugged()?;
        self.enter();
        let hold = {
            let mut state = self.state.lock();
            state.reads += 1;
            state.read_hold
        };
        if !hold.is_zero() {
            std::thread::sleep(hold);
        }
        let bytes: Vec<u8> = self.state.lock().inbox.drain(..).collect();
        self.leave();
        Ok(bytes)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        let mut state = self.state.lock();
        state.inbox.clear();
        state.input_clears += 1;
        Ok(())
    }

    fn clear_output(&mut self) -> io::Result<()> {
        self.state.lock().output_clears += 1;
        Ok(())
    }

    fn set_hardware_flow_control(&mut self, enabled: bool) -> io::Result<()> {
        self.state.lock().flow_control = enabled;
        Ok(())
    }

    fn name(&self) -> String {
        "mock".to_string()
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// A scripted controller: remembers settings, answers `n` queries, echoes
/// G-code, and reports a hard stop for any line containing the trigger.
#[derive(Clone, Default)]
pub struct FakeTinyG {
    pub settings: Arc<Mutex<HashMap<String, f64>>>,
    pub silent_keys: HashSet<String>,
    pub fault_trigger: Option<String>,
}

impl FakeTinyG {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setting(self, key: &str, value: f64) -> Self {
        self.settings.lock().insert(key.to_string(), value);
        self
    }

    pub fn silent_for(mut self, key: &str) -> Self {
        self.silent_keys.insert(key.to_string());
        self
    }

    pub fn fault_on(mut self, trigger: &str) -> Self {
        self.fault_trigger = Some(trigger.to_string());
        self
    }

    pub fn setting(&self, key: &str) -> Option<f64> {
        self.settings.lock().get(key).copied()
    }

    pub fn respond(&mut self, line: &str) -> Vec<String> {
        if let Some(trigger) = &self.fault_trigger {
            if line.contains(trigger.as_str()) {
                return vec![HARD_STOP_LINE.to_string()];
            }
        }

        // `{"key":n}` is a query; quote the bare n so it parses
        let line = line.replace(":n}", ":\"n\"}").replace(":n,", ":\"n\",");
        let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(&line) else {
            return Vec::new();
        };

        let mut replies = Vec::new();
        for (key, value) in obj {
            let key = key.to_ascii_lowercase();
            if value == json!("n") {
                if self.silent_keys.contains(&key) {
                    continue;
                }
                let current = self.setting(&key).unwrap_or(0.0);
                replies.push(response(&key, json!(current)));
            } else if let Some(number) = value.as_f64() {
                self.settings.lock().insert(key.clone(), number);
                replies.push(response(&key, json!(number)));
            } else {
                replies.push(response(&key, value));
            }
        }
        replies
    }

    pub fn responder(&self) -> Responder {
        let mut device = self.clone();
        Box::new(move |line| device.respond(line))
    }
}

fn response(key: &str, value: Value) -> String {
    let mut body = serde_json::Map::new();
    body.insert(key.to_string(), value);
    json!({ "r": body, "f": [1, 0, 4, 1] }).to_string()
}

/// Fast timings so the reader heuristics settle within milliseconds
pub fn test_config(dir: &Path) -> LinkConfig {
    let mut config = LinkConfig::default();
    config.polling.poll_interval_ms = 5;
    config.polling.quiet_poll_threshold = 3;
    config.polling.write_settle_ms = 1;
    config.sync.query_interval_ms = 5;
    config.sync.verify_timeout_ms = Some(2_000);
    config.session.log_path = Some(dir.join("tinyg.log"));
    config.session.startup_settle_ms = 5;
    config.session.shutdown_join_timeout_ms = 1_000;
    config
}

pub async fn open_link(channel: MockChannel, config: LinkConfig) -> TinyGLink {
    TinyGLink::with_channel(Box::new(channel), config)
        .await
        .expect("link setup")
}

pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    condition()
}
