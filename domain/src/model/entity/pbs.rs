use chrono::Duration;

use super::job::JobArray;
use crate::error::ValidationError;

/// A `#PBS <flag> <value>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbsDirective {
    pub flag: String,
    pub value: String,
}

impl PbsDirective {
    pub fn new(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOperation {
    Load(String),
    Unload(String),
    Swap { old: String, new: String },
}

/// A batch job description. Fields are validated when rendered, so they can be
/// changed freely in between.
#[derive(Debug, Clone, PartialEq)]
pub struct PbsScript {
    pub name: String,
    pub project_id: String,
    pub num_nodes: u32,
    pub processes_per_node: u32,
    pub max_time: Duration,
    pub queue: String,
    pub node_type: String,
    pub system: String,
    pub array: Option<JobArray>,
    pub execution_block: String,
    pub configure_job_dir: bool,
    directives: Vec<PbsDirective>,
    module_uses: Vec<String>,
    module_ops: Vec<ModuleOperation>,
    environment: Vec<(String, String)>,
}

impl PbsScript {
    pub const DEFAULT_QUEUE: &'static str = "debug";
    pub const DEFAULT_NODE_TYPE: &'static str = "compute";
    pub const DEFAULT_SYSTEM: &'static str = "narwhal";

    pub fn new(
        name: impl Into<String>,
        project_id: impl Into<String>,
        num_nodes: u32,
        processes_per_node: u32,
        max_time: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            project_id: project_id.into(),
            num_nodes,
            processes_per_node,
            max_time,
            queue: Self::DEFAULT_QUEUE.to_owned(),
            node_type: Self::DEFAULT_NODE_TYPE.to_owned(),
            system: Self::DEFAULT_SYSTEM.to_owned(),
            array: None,
            execution_block: String::new(),
            configure_job_dir: false,
            directives: Vec::new(),
            module_uses: Vec::new(),
            module_ops: Vec::new(),
            environment: Vec::new(),
        }
    }

    /// Sets `max_time` from `HH:MM:SS`, `MM:SS` or `SS`.
    pub fn set_walltime(&mut self, walltime: &str) -> Result<(), ValidationError> {
        self.max_time = parse_walltime(walltime)?;
        Ok(())
    }

    /// `max_time` as PBS prints it, hours unpadded.
    pub fn walltime(&self) -> String {
        let total = self.max_time.num_seconds();
        let hours = total / 3600;
        let minutes = total % 3600 / 60;
        let seconds = total % 60;
        format!("{hours}:{minutes:02}:{seconds:02}")
    }

    pub fn set_directive(&mut self, flag: impl Into<String>, value: impl Into<String>) {
        self.directives.push(PbsDirective::new(flag, value));
    }

    /// Values of every optional directive with the given flag, in insertion order.
    pub fn get_directive(&self, flag: &str) -> Vec<&str> {
        self.directives
            .iter()
            .filter(|d| d.flag == flag)
            .map(|d| d.value.as_str())
            .collect()
    }

    pub fn first_directive(&self, flag: &str) -> Option<&str> {
        self.get_directive(flag).into_iter().next()
    }

    pub fn optional_directives(&self) -> &[PbsDirective] {
        &self.directives
    }

    pub fn module_use(&mut self, path: impl Into<String>) {
        self.module_uses.push(path.into());
    }

    pub fn load_module(&mut self, module: impl Into<String>) {
        self.module_ops.push(ModuleOperation::Load(module.into()));
    }

    pub fn unload_module(&mut self, module: impl Into<String>) {
        self.module_ops.push(ModuleOperation::Unload(module.into()));
    }

    pub fn swap_module(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.module_ops.push(ModuleOperation::Swap {
            old: old.into(),
            new: new.into(),
        });
    }

    pub fn module_uses(&self) -> &[String] {
        &self.module_uses
    }

    pub fn module_operations(&self) -> &[ModuleOperation] {
        &self.module_ops
    }

    /// Setting an existing key replaces its value in place.
    pub fn set_environment_variable(&mut self, key: impl Into<String>, value: impl ToString) {
        let key = key.into();
        let value = value.to_string();
        match self.environment.iter_mut().find(|(k, _)| *k == key) {
            Some((_, v)) => *v = value,
            None => self.environment.push((key, value)),
        }
    }

    pub fn environment_variables(&self) -> &[(String, String)] {
        &self.environment
    }
}

pub fn parse_walltime(walltime: &str) -> Result<Duration, ValidationError> {
    let invalid = || ValidationError::InvalidWalltime(walltime.to_owned());
    let parts = walltime
        .split(':')
        .map(|p| p.trim().parse::<i64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| *p < 0) {
        return Err(invalid());
    }

    parts
        .iter()
        .try_fold(0i64, |acc, part| acc.checked_mul(60)?.checked_add(*part))
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}
