//! Command line options.

use std::path::PathBuf;

use aodv_core::NodeId;

pub const USAGE: &str = "\
aodv-sim - supervised route-discovery simulation

Usage:
  aodv-sim [--mode sim|cli] [--script <path>] [--nodes <id,id,...>]

Options:
  --mode <mode>      'sim' runs a script to completion (default), 'cli' starts the console
  --script <path>    JSON event script to run instead of the reference scenario
  --nodes <ids>      Comma separated node ids for sim mode (default: 1,2)
  -V, --version      Print version
  -h, --help         Print this help

Environment:
  RUST_LOG              Log filter (default: aodv_sim=info,aodv_core=warn)
  AODV_QUEUE_CAPACITY   Per-node queue capacity (default: 16)
  AODV_ACK_TIMEOUT_MS   Acknowledgment timeout in milliseconds (default: 5000)";

/// How the binary runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run a script through the driver and exit.
    Sim,
    /// Interactive console.
    Cli,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub mode: Mode,
    pub script: Option<PathBuf>,
    pub nodes: Vec<NodeId>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            mode: Mode::Sim,
            script: None,
            nodes: vec![NodeId(1), NodeId(2)],
        }
    }
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Run(Options),
    Help,
    Version,
}

impl Invocation {
    /// Parse arguments (without the program name).
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let mut options = Options::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Invocation::Help),
                "-V" | "--version" => return Ok(Invocation::Version),
                "--mode" => {
                    options.mode = match args.next().as_deref() {
                        Some("sim") => Mode::Sim,
                        Some("cli") => Mode::Cli,
                        Some(other) => {
                            return Err(format!(
                                "invalid mode '{other}', use 'sim' for simulation or 'cli' for the console"
                            ))
                        }
                        None => return Err("--mode requires a value".into()),
                    };
                }
                "--script" => {
                    let path = args.next().ok_or("--script requires a path")?;
                    options.script = Some(PathBuf::from(path));
                }
                "--nodes" => {
                    let raw = args.next().ok_or("--nodes requires a list of ids")?;
                    options.nodes = raw
                        .split(',')
                        .map(|id| id.parse::<NodeId>().map_err(|e| e.to_string()))
                        .collect::<Result<_, _>>()?;
                }
                other => return Err(format!("unknown argument: {other}")),
            }
        }

        Ok(Invocation::Run(options))
    }
}
