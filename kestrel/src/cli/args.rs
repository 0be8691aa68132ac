//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kestrel",
    about = "Supervise an instrumented executable and profile its call graph",
    after_help = "\
EXAMPLES:
    kestrel -- ./my-app --port 8080          Profile with default settings
    kestrel --interval 10 -- ./my-app        Snapshot every 10 seconds
    kestrel --quiet -- ./my-app | jq .tree   Pipe snapshots into other tools

The socket path is exported to the child as KESTREL_SOCKET."
)]
pub struct Args {
    /// Seconds between profile snapshots
    #[arg(long, env = "KESTREL_INTERVAL_SECS", default_value = "60")]
    pub interval: u64,

    /// Directory for the instrument socket (defaults to the temp dir)
    #[arg(long, env = "KESTREL_SOCKET_DIR", value_name = "DIR")]
    pub socket_dir: Option<PathBuf>,

    /// Application id stamped onto emitted snapshots
    #[arg(long, env = "KESTREL_APP_ID")]
    pub app_id: Option<String>,

    /// Suppress kestrel's own banner and summary output
    #[arg(short, long)]
    pub quiet: bool,

    /// Command to launch, with its arguments
    #[arg(value_name = "COMMAND", trailing_var_arg = true)]
    pub command: Vec<String>,
}
