use crate::error::ValidationError;
use crate::model::vo::{ParsedRow, Value};

/// Sub-job indices of a PBS job array, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobArray {
    pub start: u32,
    pub end: u32,
    pub step: Option<u32>,
}

impl JobArray {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            step: None,
        }
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.end < self.start || self.step == Some(0) {
            return Err(ValidationError::JobArray {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Option string of the `-J` directive.
    pub fn range_option(&self) -> String {
        match self.step {
            Some(step) => format!("{}-{}:{step}", self.start, self.end),
            None => format!("{}-{}", self.start, self.end),
        }
    }

    pub fn indices(&self) -> Vec<u32> {
        let step = self.step.unwrap_or(1).max(1) as usize;
        (self.start..=self.end).step_by(step).collect()
    }
}

/// PBS job state codes as printed in the `S` column of `qstat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Begun,
    Exiting,
    Finished,
    Held,
    Moved,
    Queued,
    Running,
    Suspended,
    Transit,
    UserSuspended,
    Waiting,
    Expired,
    Unknown,
}

impl JobState {
    pub fn from_code(code: &str) -> Self {
        match code {
            "B" => Self::Begun,
            "E" => Self::Exiting,
            "F" => Self::Finished,
            "H" => Self::Held,
            "M" => Self::Moved,
            "Q" => Self::Queued,
            "R" => Self::Running,
            "S" => Self::Suspended,
            "T" => Self::Transit,
            "U" => Self::UserSuspended,
            "W" => Self::Waiting,
            "X" => Self::Expired,
            _ => Self::Unknown,
        }
    }

    /// Whether the job can still be terminated.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running | Self::Begun)
    }
}

/// Typed view of one `qstat` status row.
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub job_id: String,
    pub name: String,
    pub queue: String,
    pub state: JobState,
    pub status_code: String,
    /// Seconds, when the scheduler reported it.
    pub elapsed: Option<i64>,
}

impl TryFrom<&ParsedRow> for JobStatus {
    type Error = String;

    fn try_from(row: &ParsedRow) -> Result<Self, Self::Error> {
        let text = |name: &str| {
            row.text(name)
                .map(str::to_owned)
                .ok_or_else(|| format!("row on line {} has no `{name}`", row.line))
        };
        let status_code = text("status")?;
        Ok(Self {
            job_id: text("job_id")?,
            name: text("jobname")?,
            queue: text("queue")?,
            state: JobState::from_code(&status_code),
            status_code,
            elapsed: match row.get("elapsed_time") {
                Some(Value::Integer(seconds)) => Some(*seconds),
                _ => None,
            },
        })
    }
}
