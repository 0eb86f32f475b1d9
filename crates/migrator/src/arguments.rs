use {
    alloy::{primitives::Address, signers::local::PrivateKeySigner},
    clap::Parser,
    std::path::PathBuf,
    url::Url,
};

#[derive(Parser)]
pub struct Arguments {
    /// The remote node URL to connect to.
    #[clap(long, env, default_value = "http://localhost:8545")]
    pub node_url: Url,

    /// Hex-encoded private key of the operator account. Required by
    /// state-changing commands; read-only commands work without it.
    #[clap(long, env)]
    pub operator_key: Option<PrivateKeySigner>,

    /// Deployment environment. Checkpoints of different environments never
    /// interact.
    #[clap(long, env, default_value = "staging")]
    pub environment: String,

    /// Directory holding the checkpoint documents.
    #[clap(long, env, default_value = "checkpoints")]
    pub checkpoint_root: PathBuf,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand)]
pub enum Command {
    /// Deploys the artifact set, resuming a prior partial deployment of the
    /// same environment.
    Deploy {
        /// Directory holding token.hex, collection.hex and minter.hex
        /// creation bytecode files.
        #[clap(long, env)]
        code_dir: PathBuf,

        /// Address administering the collection and, when self-hosted, the
        /// minter.
        #[clap(long, env)]
        admin: Address,

        /// Address receiving the companion token supply.
        #[clap(long, env)]
        treasury: Address,

        /// Externally operated minter host. Omitting it selects the
        /// self-hosted variant. Only honored on the environment's first run.
        #[clap(long, env)]
        proxy_host: Option<Address>,
    },

    /// Loads one dataset into the deployed artifacts, resuming at the
    /// checkpointed cursor.
    Load {
        #[clap(long, env, value_enum)]
        dataset: Dataset,

        /// Path of the dataset CSV file.
        #[clap(long, env)]
        file: PathBuf,

        /// Records per remote operation.
        #[clap(long, env, default_value = "50")]
        batch_size: usize,

        /// Discards the dataset's load progress after an interactive
        /// confirmation, restarting it from the first record.
        #[clap(long)]
        reset: bool,
    },

    /// Verifies a dataset against live remote state, stopping at the first
    /// divergence.
    Verify {
        #[clap(long, env, value_enum)]
        dataset: Dataset,

        /// Path of the dataset CSV file.
        #[clap(long, env)]
        file: PathBuf,
    },

    /// Compares raw mapping storage of two artifact instances word by word.
    CompareStorage {
        /// CSV listing the holder addresses to compare.
        #[clap(long, env)]
        subjects: PathBuf,

        /// Mapping head slot indices to derive entries from.
        #[clap(long, env, value_delimiter = ',', default_value = "0")]
        slot_indices: Vec<u64>,

        #[clap(long, env)]
        left: Address,

        #[clap(long, env)]
        right: Address,
    },

    /// Deploys a replacement for one artifact and archives the current
    /// instance in the checkpoint's history.
    Swap {
        /// Directory holding the creation bytecode files.
        #[clap(long, env)]
        code_dir: PathBuf,

        /// Name of the artifact to replace.
        #[clap(long, env)]
        name: String,
    },

    /// Promotes the completed deployment to an immutable named release.
    Release {
        #[clap(long, env)]
        label: String,
    },
}

/// The three ops-curated datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dataset {
    Unrevealed,
    Revealed,
    Locked,
}

impl Dataset {
    /// Checkpoint slot holding this dataset's load progress.
    pub fn slot(&self) -> &'static str {
        match self {
            Self::Unrevealed => "load-unrevealed",
            Self::Revealed => "load-revealed",
            Self::Locked => "load-locked",
        }
    }
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "node_url: {}", self.node_url)?;
        writeln!(f, "operator_key: SECRET")?;
        writeln!(f, "environment: {}", self.environment)?;
        writeln!(f, "checkpoint_root: {}", self.checkpoint_root.display())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_load_command() {
        let args = Arguments::try_parse_from([
            "migrator",
            "--environment",
            "prod",
            "load",
            "--dataset",
            "revealed",
            "--file",
            "revealed.csv",
            "--batch-size",
            "25",
        ])
        .unwrap();
        assert_eq!(args.environment, "prod");
        match args.command {
            Command::Load {
                dataset,
                batch_size,
                reset,
                ..
            } => {
                assert_eq!(dataset, Dataset::Revealed);
                assert_eq!(dataset.slot(), "load-revealed");
                assert_eq!(batch_size, 25);
                assert!(!reset);
            }
            _ => panic!("expected a load command"),
        }
    }

    #[test]
    fn display_never_prints_the_operator_key() {
        let args = Arguments::try_parse_from([
            "migrator",
            "--operator-key",
            "0000000000000000000000000000000000000000000000000000000000000001",
            "release",
            "--label",
            "v1",
        ])
        .unwrap();
        let printed = args.to_string();
        assert!(printed.contains("operator_key: SECRET"));
        assert!(!printed.contains("0000000000000000000000000001"));
    }
}
