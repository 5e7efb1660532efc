use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate a rule set without touching any table
    Validate {
        #[arg(long, help = "Rule-set file path (falls back to TABLESYNC_CONFIG_FILE)")]
        config: Option<String>,

        #[command(flatten)]
        env: EnvArgs,
    },
    /// Evaluate every rule and print the planned changes; nothing is written
    Plan {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<String>,
    },
    /// Evaluate every rule and write the changes back to the tables
    Sync {
        #[command(flatten)]
        target: TargetArgs,

        #[arg(long, help = "Maximum number of write batches in flight")]
        max_concurrent: Option<usize>,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<String>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct EnvArgs {
    #[arg(long, help = "Optional .env file merged under the process environment")]
    pub env_file: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    #[arg(long, help = "Rule-set file path (falls back to TABLESYNC_CONFIG_FILE)")]
    pub config: Option<String>,

    #[arg(
        long,
        help = "Directory of <table>.json snapshots (falls back to TABLESYNC_DATA_DIR)"
    )]
    pub data_dir: Option<String>,

    #[command(flatten)]
    pub env: EnvArgs,
}
