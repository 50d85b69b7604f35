use uuid::Uuid;

use crate::error::{Result, SchedError};
use crate::scheduler::job::{MAX_PRIORITY, MIN_PRIORITY};

const SUBMIT_KEYWORD: &str = "submit";

/// A decoded `submit <command...> [priority]` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub command: Vec<String>,
    pub priority: u32,
}

impl Submission {
    pub fn new(command: Vec<String>, priority: u32) -> Self {
        Self { command, priority }
    }

    /// Decode one line of the submission grammar.
    ///
    /// The last token is taken as the priority when at least two tokens
    /// follow `submit` and it parses as an integer. Without one the job
    /// gets [`MIN_PRIORITY`].
    pub fn decode(line: &str) -> Result<Self> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(SUBMIT_KEYWORD) => {}
            Some(other) => {
                return Err(SchedError::Decode(format!("unknown verb `{}`", other)));
            }
            None => return Err(SchedError::Decode("empty message".to_string())),
        }

        let mut command: Vec<String> = tokens.map(str::to_string).collect();
        if command.is_empty() {
            return Err(SchedError::Decode("missing command".to_string()));
        }

        let mut priority = MIN_PRIORITY;
        if command.len() >= 2 {
            if let Some(explicit) = command.last().and_then(|t| t.parse::<i64>().ok()) {
                if !(MIN_PRIORITY as i64..=MAX_PRIORITY as i64).contains(&explicit) {
                    return Err(SchedError::Decode(format!(
                        "priority {} outside {}..={}",
                        explicit, MIN_PRIORITY, MAX_PRIORITY
                    )));
                }
                priority = explicit as u32;
                command.pop();
            }
        }

        Ok(Self { command, priority })
    }

    /// Encode with an explicit priority, so a numeric last argument of the
    /// command is never read back as the priority.
    pub fn encode(&self) -> String {
        format!(
            "{} {} {}",
            SUBMIT_KEYWORD,
            self.command.join(" "),
            self.priority
        )
    }
}

/// The ingestor's answer to a decoded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Accepted { job_id: Uuid, pid: u32 },
    Rejected(String),
}

impl Reply {
    pub fn encode(&self) -> String {
        match self {
            Reply::Accepted { job_id, pid } => format!("ok {} {}", job_id, pid),
            Reply::Rejected(reason) => format!("error {}", reason),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if let Some(reason) = line.strip_prefix("error ") {
            return Some(Reply::Rejected(reason.to_string()));
        }
        let mut parts = line.strip_prefix("ok ")?.split_whitespace();
        let job_id = parts.next()?.parse().ok()?;
        let pid = parts.next()?.parse().ok()?;
        Some(Reply::Accepted { job_id, pid })
    }
}
