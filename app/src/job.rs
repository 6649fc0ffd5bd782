use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use domain::error::{Result, UitError};
use domain::model::entity::{JobState, JobStatus, PbsScript};
use domain::model::vo::ParsedRow;
use infrastructure::sync::timer;
use service::prelude::ParseOutcome;

use crate::client::{Client, ScriptSource};

/// A PBS script bound to a client, submitted at most once.
pub struct PbsJob {
    script: PbsScript,
    client: Arc<Client>,
    working_dir: Option<String>,
    job_id: Option<String>,
    status: Option<JobStatus>,
}

impl PbsJob {
    pub fn new(script: PbsScript, client: Arc<Client>) -> Self {
        Self {
            script,
            client,
            working_dir: None,
            job_id: None,
            status: None,
        }
    }

    /// A job submitted earlier, e.g. in another process.
    pub fn existing(
        script: PbsScript,
        client: Arc<Client>,
        job_id: impl Into<String>,
        working_dir: impl Into<String>,
    ) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
            job_id: Some(job_id.into()),
            ..Self::new(script, client)
        }
    }

    pub fn name(&self) -> &str {
        &self.script.name
    }

    pub fn script(&self) -> &PbsScript {
        &self.script
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// `1234` of `1234.pbs01`.
    pub fn job_number(&self) -> Option<&str> {
        self.job_id()
            .map(|id| id.split('.').next().unwrap_or(id))
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    pub fn status(&self) -> Option<&JobStatus> {
        self.status.as_ref()
    }

    /// Creates the working directory (`$WORKDIR/<name>` by default), uploads
    /// the script as `<name>_run.pbs` and queues it. Later calls return the
    /// first job id without submitting again.
    pub async fn submit(&mut self, working_dir: Option<&str>) -> Result<String> {
        if let Some(job_id) = &self.job_id {
            return Ok(job_id.clone());
        }

        let working_dir = match working_dir.or(self.working_dir.as_deref()) {
            Some(dir) => dir.to_owned(),
            None => format!("{}/{}", self.client.workdir().await?, self.script.name),
        };
        self.client
            .call(&format!("mkdir -p {working_dir}"), None)
            .await?;

        let remote_name = format!("{}_run.pbs", self.script.name);
        let job_id = self
            .client
            .submit(
                ScriptSource::Script(&self.script),
                Some(&working_dir),
                Some(&remote_name),
            )
            .await?;

        self.working_dir = Some(working_dir);
        self.job_id = Some(job_id.clone());
        Ok(job_id)
    }

    /// Fetches the current scheduler state of the job.
    pub async fn update_status(&mut self) -> Result<&JobStatus> {
        let job_id = self.submitted_id()?;
        let status = fetch_status(&self.client, &job_id).await?;
        Ok(self.status.insert(status))
    }

    /// Refreshes the status of all `jobs` with a single `qstat` on the client
    /// of the first one. Jobs missing from the output keep their old status.
    pub async fn update_statuses(jobs: &mut [PbsJob]) -> Result<ParseOutcome> {
        let Some(first) = jobs.first() else {
            return Ok(ParseOutcome::default());
        };
        let client = first.client.clone();
        let job_ids = jobs
            .iter()
            .map(|job| job.submitted_id())
            .collect::<Result<Vec<_>>>()?;
        let job_ids: Vec<&str> = job_ids.iter().map(String::as_str).collect();

        let outcome = client.status(&job_ids, None, false).await?;
        for job in jobs.iter_mut() {
            let Some(job_id) = job.job_id.as_deref() else {
                continue;
            };
            match find_status(outcome.rows(), job_id) {
                Ok(status) => job.status = Some(status),
                Err(e) => tracing::warn!(job_id, "Status not updated: {e}"),
            }
        }
        Ok(outcome)
    }

    /// Polls the status every `interval` until the job finished.
    pub async fn wait(&mut self, interval: Duration) -> Result<JobStatus> {
        let job_id = self.submitted_id()?;
        let client = &self.client;
        let status = timer::poll(interval, || {
            let job_id = job_id.as_str();
            async move {
                match fetch_status(client, job_id).await {
                    Ok(status) if matches!(status.state, JobState::Finished | JobState::Expired) => {
                        ControlFlow::Break(Ok(status))
                    }
                    Ok(_) => ControlFlow::Continue(()),
                    Err(e) => ControlFlow::Break(Err(e)),
                }
            }
        })
        .await?;
        self.status = Some(status.clone());
        Ok(status)
    }

    pub async fn stdout_log(&self) -> Result<String> {
        self.log("o").await
    }

    pub async fn stderr_log(&self) -> Result<String> {
        self.log("e").await
    }

    async fn log(&self, kind: &str) -> Result<String> {
        let job_number = self.job_number().ok_or_else(not_submitted)?;
        let working_dir = self.working_dir.as_deref().unwrap_or(".");
        let path = format!("{working_dir}/{}.{kind}{job_number}", self.script.name);
        self.client.call(&format!("cat {path}"), None).await
    }

    fn submitted_id(&self) -> Result<String> {
        self.job_id.clone().ok_or_else(not_submitted)
    }
}

async fn fetch_status(client: &Client, job_id: &str) -> Result<JobStatus> {
    let outcome = client.status(&[job_id], None, false).await?;
    find_status(outcome.rows(), job_id)
}

fn find_status(rows: &[ParsedRow], job_id: &str) -> Result<JobStatus> {
    let row = rows
        .iter()
        .find(|row| row.text("job_id").is_some_and(|id| same_job(id, job_id)))
        .ok_or_else(|| UitError::Protocol {
            endpoint: "exec".to_owned(),
            message: format!("qstat reported nothing for job {job_id}"),
        })?;
    let status = JobStatus::try_from(row).map_err(|message| UitError::Protocol {
        endpoint: "exec".to_owned(),
        message,
    })?;
    tracing::debug!(job_id, state = ?status.state, "Updated job status");
    Ok(status)
}

fn not_submitted() -> UitError {
    UitError::InvalidArgument("job has not been submitted".to_owned())
}

/// `qstat` may truncate the server part of the id.
fn same_job(listed: &str, job_id: &str) -> bool {
    listed == job_id || listed.split('.').next() == job_id.split('.').next()
}
