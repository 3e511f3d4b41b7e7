use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(author, about, version)]
pub struct Args {
    /// Optional TOML file with the same keys as the action inputs
    #[arg(short, long, default_value = "evalgate.toml")]
    pub config_path: PathBuf,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub print_config: bool,

    /// Run the evaluation but print the report instead of posting it
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}
