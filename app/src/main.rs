use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use domain::model::entity::PbsScript;
use service::prelude::Table;
use tracing_subscriber::EnvFilter;
use uit::{Client, ConfigOverrides, Target};

/// Log in to UIT+, connect to a login node of SYSTEM and print the
/// subproject allocations as CSV.
#[derive(Parser, Debug)]
#[command(name = "uit", version, about)]
struct Args {
    /// HPC system to connect to
    #[arg(env = "UIT_SYSTEM", default_value = PbsScript::DEFAULT_SYSTEM)]
    system: String,

    /// Paste the authorization code instead of running the local callback listener
    #[arg(long)]
    manual: bool,

    /// Config file holding client_id and client_secret
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// File the tokens are stored in
    #[arg(long, value_name = "PATH")]
    token_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let overrides = ConfigOverrides {
        config_file: args.config,
        token_file: args.token_file,
        ..Default::default()
    };

    let client = Client::new(overrides).with_context(|| "Failed to build client".red())?;

    // Don't log before login because it will break the login interface
    client
        .authenticate(&args.system, !args.manual)
        .await
        .with_context(|| "Login failed".red())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let message = client
        .connect(Target::System(args.system.clone()), &[])
        .await
        .with_context(|| format!("Cannot connect to {}", args.system).red())?;
    println!("{}", message.green());

    let usage = client
        .show_usage()
        .await
        .with_context(|| "Cannot fetch usage".red())?;
    print!("{}", Table::from_rows(usage.rows()).to_csv()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Args;

    #[test]
    fn manual_flag_and_system() {
        let args = Args::try_parse_from(["uit", "--manual", "carpenter"]).unwrap();
        assert!(args.manual);
        assert_eq!("carpenter", args.system);
        assert!(args.config.is_none());
    }
}
