use std::sync::Arc;

use domain::{
    error::ValidationError,
    model::entity::{ModuleOperation, PbsDirective, PbsScript},
};
use indoc::{formatdoc, indoc};

use crate::node_types::NodeTypes;

const SHEBANG: &str = "#!/bin/bash";

const JOB_DIR_CONFIGURATION: &str = indoc! {r#"
    JOBID=`echo ${PBS_JOBID} | cut -d '.' -f 1 | cut -d '[' -f 1`
    JOBDIR=$PBS_O_WORKDIR/$PBS_JOBNAME.$JOBID
    if [ ! -d ${JOBDIR} ]; then
      mkdir -p ${JOBDIR}
    fi

"#};

/// `## Title ` padded with dashes to a fixed width.
pub fn block_header(title: &str) -> String {
    format!("## {:-<50}", format!("{title} "))
}

/// Every divisor of `n`, ascending.
pub fn factors(n: u32) -> Vec<u32> {
    (1..=n).filter(|i| n % i == 0).collect()
}

/// Renders [`PbsScript`]s into batch script text.
#[derive(Debug, Clone)]
pub struct PbsScriptBuilder {
    node_types: Arc<NodeTypes>,
}

impl Default for PbsScriptBuilder {
    fn default() -> Self {
        Self::new(Arc::new(NodeTypes::builtin()))
    }
}

impl PbsScriptBuilder {
    pub fn new(node_types: Arc<NodeTypes>) -> Self {
        Self { node_types }
    }

    pub fn node_types(&self) -> &NodeTypes {
        &self.node_types
    }

    /// Checks `script` and returns the core count of its node type.
    pub fn validate(&self, script: &PbsScript) -> Result<u32, ValidationError> {
        if script.name.is_empty() {
            return Err(ValidationError::Required("name"));
        }
        if script.project_id.is_empty() {
            return Err(ValidationError::Required("project_id"));
        }
        if script.num_nodes == 0 {
            return Err(ValidationError::NotPositive {
                field: "num_nodes",
                value: script.num_nodes,
            });
        }
        if script.processes_per_node == 0 {
            return Err(ValidationError::NotPositive {
                field: "processes_per_node",
                value: script.processes_per_node,
            });
        }
        if script.max_time < chrono::Duration::zero() {
            return Err(ValidationError::NegativeMaxTime);
        }

        let system = script.system.to_lowercase();
        let node_type = script.node_type.to_lowercase();
        let cores = self.node_types.cores(&system, &node_type)?;
        if cores % script.processes_per_node != 0 {
            return Err(ValidationError::ProcessesPerNode {
                value: script.processes_per_node,
                system,
                node_type,
                allowed: factors(cores),
            });
        }
        if let Some(array) = &script.array {
            array.validate()?;
        }
        Ok(cores)
    }

    /// The `-l select=…` resource request.
    pub fn select_directive(&self, script: &PbsScript) -> Result<PbsDirective, ValidationError> {
        let cores = self.validate(script)?;
        let node_type = script.node_type.to_lowercase();

        let mut select = format!("select={}:ncpus={cores}", script.num_nodes);
        if node_type != "transfer" {
            select.push_str(&format!(":mpiprocs={}", script.processes_per_node));
        }
        let accelerator = match node_type.as_str() {
            "gpu" => Some("ngpus"),
            "bigmem" => Some("bigmem"),
            "knl" => Some("nmics"),
            _ => None,
        };
        if let Some(resource) = accelerator {
            select.push_str(&format!(":{resource}=1"));
        }
        Ok(PbsDirective::new("-l", select))
    }

    pub fn render(&self, script: &PbsScript) -> Result<String, ValidationError> {
        let select = self.select_directive(script)?;

        let mut required = vec![
            PbsDirective::new("-N", script.name.as_str()),
            PbsDirective::new("-A", script.project_id.as_str()),
            PbsDirective::new("-q", script.queue.as_str()),
            select,
            PbsDirective::new("-l", format!("walltime={}", script.walltime())),
        ];
        if let Some(array) = &script.array {
            required.push(PbsDirective::new("-J", array.range_option()));
            required.push(PbsDirective::new("-r", "y"));
        }

        let blocks = [
            SHEBANG.to_owned(),
            render_directives("Required PBS Directives", &required),
            render_directives("Optional Directives", script.optional_directives()),
            render_modules(script),
            render_environment(script),
            render_execution(script),
        ];
        Ok(blocks.join("\n\n"))
    }
}

fn render_directives(title: &str, directives: &[PbsDirective]) -> String {
    let mut lines = vec![block_header(title)];
    lines.extend(directives.iter().map(|d| format!("#PBS {} {}", d.flag, d.value)));
    lines.join("\n")
}

fn render_modules(script: &PbsScript) -> String {
    let mut lines = vec![block_header("Modules")];
    lines.extend(script.module_uses().iter().map(|p| format!("module use --append {p}")));
    lines.extend(script.module_operations().iter().map(|op| match op {
        ModuleOperation::Load(m) => format!("module load {m}"),
        ModuleOperation::Unload(m) => format!("module unload {m}"),
        ModuleOperation::Swap { old, new } => format!("module swap {old} {new}"),
    }));
    lines.join("\n")
}

fn render_environment(script: &PbsScript) -> String {
    let mut lines = vec![block_header("Environment")];
    lines.extend(
        script
            .environment_variables()
            .iter()
            .map(|(k, v)| format!("export {k}=\"{v}\"")),
    );
    lines.join("\n")
}

fn render_execution(script: &PbsScript) -> String {
    let job_dir = if script.configure_job_dir {
        JOB_DIR_CONFIGURATION
    } else {
        ""
    };
    format!(
        "{}\n{job_dir}{}",
        block_header("Execution Block"),
        script.execution_block
    )
}

/// A ready-made execution block: sets up a run directory (one per array
/// index), stages input files, then runs the user's script.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionBlock {
    /// Fetched with `archive get`.
    pub archive_input_files: Vec<String>,
    /// Copied from `$HOME`.
    pub home_input_files: Vec<String>,
    pub script: String,
}

impl ExecutionBlock {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Default::default()
        }
    }

    pub fn render(&self) -> String {
        let archive_input_files = self
            .archive_input_files
            .iter()
            .map(|f| format!("archive get {f}"))
            .collect::<Vec<_>>()
            .join("\n");
        let home_input_files = self
            .home_input_files
            .iter()
            .map(|f| format!("cp $HOME/{f} ."))
            .collect::<Vec<_>>()
            .join("\n");
        let user_header = block_header("User Defined Script");
        let cleanup_header = block_header("Cleanup");
        let script = &self.script;

        formatdoc! {r#"
            echo -e "-------------------------"
            echo -e "Starting Execute Block..."
            echo -e "-------------------------"

            # Configure Job/Run Dirs
            JOBDIR=$PBS_O_WORKDIR
            cd $JOBDIR

            JOBID=`echo ${{PBS_JOBID}} | cut -d '.' -f 1 | cut -d '[' -f 1`

            if [ -z ${{PBS_ARRAY_INDEX+x}} ];
              then
                RUNDIR=$JOBDIR
              else
                RUNDIR=$JOBDIR/run_$PBS_ARRAY_INDEX
                mkdir -p ${{RUNDIR}}
                cd $RUNDIR
            fi

            # stage input data from archive
            {archive_input_files}

            # stage input data from home
            {home_input_files}

            {user_header}
            {script}

            {cleanup_header}
            echo -e "-------------------------"
            echo -e "Finished Execute Block..."
            echo -e "-------------------------"
        "#}
    }
}
