//! Behavioral state: TTL-bounded session and process-observation maps,
//! per §4.2 and §5 (bounded capacity, multi-writer, concurrent-map
//! discipline).

use dashmap::DashMap;
use std::time::{Duration, Instant};

const SESSION_TTL: Duration = Duration::from_secs(300);
const SESSION_CAPACITY: usize = 1000;
const PROCESS_TTL: Duration = Duration::from_secs(600);
const PROCESS_CAPACITY: usize = 5000;
const SESSION_LOGIN_THRESHOLD: u32 = 10;

/// Process/command-line substrings treated as suspicious, matched
/// against the observed name or command line (§4.2).
const SUSPICIOUS_PROCESSES: &[&str] = &[
    "nc.exe", "netcat", "ncat", "psexec", "wmic", "powershell", "mimikatz", "procdump", "lsass",
    "tor.exe", "proxychains",
];

#[derive(Debug, Clone)]
struct SessionEntry {
    count: u32,
    first_seen: Instant,
    last_update: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessStatus {
    Normal,
    Suspicious,
}

#[derive(Debug, Clone)]
struct ProcessEntry {
    status: ProcessStatus,
    first_seen: Instant,
    last_update: Instant,
    command_line_digest: String,
}

pub struct BehavioralState {
    sessions: DashMap<String, SessionEntry>,
    processes: DashMap<String, ProcessEntry>,
}

impl BehavioralState {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            processes: DashMap::new(),
        }
    }

    /// Key = `user@source_ip`. Increments login count; returns `true`
    /// when the count exceeds the threshold within the TTL window
    /// (warning signal per §4.2).
    pub fn observe_login(&self, user: &str, source_ip: &str) -> bool {
        self.evict_expired_sessions();
        let key = format!("{user}@{source_ip}");
        let now = Instant::now();

        let mut warn = false;
        self.sessions
            .entry(key)
            .and_modify(|entry| {
                entry.count += 1;
                entry.last_update = now;
                warn = entry.count > SESSION_LOGIN_THRESHOLD;
            })
            .or_insert_with(|| SessionEntry {
                count: 1,
                first_seen: now,
                last_update: now,
            });

        if self.sessions.len() > SESSION_CAPACITY {
            self.evict_oldest_session();
        }

        warn
    }

    pub fn session_count(&self) -> usize {
        self.evict_expired_sessions();
        self.sessions.len()
    }

    /// Key = `user:process`. Classifies against the suspicious-process
    /// list; returns `true` (warning signal) on a suspicious match.
    pub fn observe_process(&self, user: &str, process: &str, command_line: &str) -> bool {
        self.evict_expired_processes();
        let key = format!("{user}:{process}");
        let now = Instant::now();

        let suspicious = SUSPICIOUS_PROCESSES
            .iter()
            .any(|marker| process.to_lowercase().contains(marker) || command_line.to_lowercase().contains(marker));

        let status = if suspicious {
            ProcessStatus::Suspicious
        } else {
            ProcessStatus::Normal
        };

        self.processes.insert(
            key,
            ProcessEntry {
                status: status.clone(),
                first_seen: now,
                last_update: now,
                command_line_digest: digest(command_line),
            },
        );

        if self.processes.len() > PROCESS_CAPACITY {
            self.evict_oldest_process();
        }

        suspicious
    }

    pub fn process_count(&self) -> usize {
        self.evict_expired_processes();
        self.processes.len()
    }

    fn evict_expired_sessions(&self) {
        let now = Instant::now();
        self.sessions
            .retain(|_, entry| now.duration_since(entry.last_update) < SESSION_TTL);
    }

    fn evict_expired_processes(&self) {
        let now = Instant::now();
        self.processes
            .retain(|_, entry| now.duration_since(entry.last_update) < PROCESS_TTL);
    }

    fn evict_oldest_session(&self) {
        if let Some(oldest_key) = self
            .sessions
            .iter()
            .min_by_key(|e| e.first_seen)
            .map(|e| e.key().clone())
        {
            self.sessions.remove(&oldest_key);
        }
    }

    fn evict_oldest_process(&self) {
        if let Some(oldest_key) = self
            .processes
            .iter()
            .min_by_key(|e| e.first_seen)
            .map(|e| e.key().clone())
        {
            self.processes.remove(&oldest_key);
        }
    }
}

impl Default for BehavioralState {
    fn default() -> Self {
        Self::new()
    }
}

fn digest(command_line: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    command_line.hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_count_is_monotonic_within_window() {
        let state = BehavioralState::new();
        for _ in 0..10 {
            assert!(!state.observe_login("alice", "10.0.0.1"));
        }
        assert!(state.observe_login("alice", "10.0.0.1"));
    }

    #[test]
    fn session_bound_is_never_exceeded() {
        let state = BehavioralState::new();
        for i in 0..(SESSION_CAPACITY + 50) {
            state.observe_login("user", &format!("10.0.{}.{}", i / 256, i % 256));
        }
        assert!(state.session_count() <= SESSION_CAPACITY);
    }

    #[test]
    fn suspicious_process_is_flagged() {
        let state = BehavioralState::new();
        assert!(state.observe_process("bob", "mimikatz.exe", "mimikatz.exe sekurlsa::logonpasswords"));
    }

    #[test]
    fn normal_process_is_not_flagged() {
        let state = BehavioralState::new();
        assert!(!state.observe_process("bob", "bash", "bash -c ls"));
    }
}
