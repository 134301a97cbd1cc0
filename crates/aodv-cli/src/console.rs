//! Interactive console.
//!
//! Top level commands: `help`, `start`, `status`, `exit`. `start` opens a
//! manual session where `rreq <node-id>` runs one route discovery, `logs`
//! prints its path, `status` prints the nodes and `stop` ends the session.
//! Bad input is reported and the console keeps going.

use aodv_core::{
    Driver, DriverConfig, NodeId, NodeSnapshot, PathStep, Result, RouteDiscovery, RouteOutcome,
};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{debug, error};

use crate::render;

const HELP: &str = "\
Available commands:
  start  - Start the manual simulation
  status - Display the status of supervisors
  exit   - Exit the CLI";

const SESSION_HELP: &str = "\
Session commands:
  rreq <nodeid> - Run a route discovery initiated by <nodeid>
  logs          - Print the path of the last discovery
  status        - Display the status of supervisors
  stop          - Stop the manual simulation";

/// Responder paired with `initiator`: node 2, or node 1 when the initiator is 2.
fn responder_for(initiator: NodeId) -> NodeId {
    if initiator == NodeId(2) {
        NodeId(1)
    } else {
        NodeId(2)
    }
}

/// State of one `start` ... `stop` session.
#[derive(Default)]
struct Session {
    driver: Option<Driver>,
    path: Vec<PathStep>,
}

impl Session {
    async fn close(&mut self) -> Option<Vec<NodeSnapshot>> {
        let driver = self.driver.take()?;
        let snapshots = driver.snapshots();
        if let Err(e) = driver.shutdown().await {
            error!("session shutdown failed: {}", e);
        }
        Some(snapshots)
    }
}

/// Line-oriented console over any async reader and writer.
pub struct Console<R, W> {
    lines: Lines<R>,
    output: W,
    config: DriverConfig,
    last_snapshots: Vec<NodeSnapshot>,
}

impl<R, W> Console<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(input: R, output: W, config: DriverConfig) -> Self {
        Self {
            lines: input.lines(),
            output,
            config,
            last_snapshots: Vec::new(),
        }
    }

    /// Hand back the writer, e.g. to inspect what was printed.
    pub fn into_output(self) -> W {
        self.output
    }

    async fn say(&mut self, text: impl AsRef<str>) -> Result<()> {
        self.output.write_all(text.as_ref().as_bytes()).await?;
        self.output.write_all(b"\n").await?;
        self.output.flush().await?;
        Ok(())
    }

    async fn prompt(&mut self, text: &str) -> Result<Option<String>> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(self.lines.next_line().await?)
    }

    async fn print_snapshots(&mut self, snapshots: &[NodeSnapshot], empty: &str) -> Result<()> {
        if snapshots.is_empty() {
            return self.say(empty).await;
        }
        for line in render::snapshot_lines(snapshots) {
            self.say(line).await?;
        }
        Ok(())
    }

    /// Run until `exit` or end of input.
    pub async fn run(&mut self) -> Result<()> {
        self.say("CLI started. Type 'help' to see available commands.").await?;

        while let Some(line) = self.prompt("Enter command: ").await? {
            match line.trim() {
                "" => {}
                "exit" => {
                    self.say("Exiting CLI.").await?;
                    return Ok(());
                }
                "help" => self.say(HELP).await?,
                "status" => {
                    let snapshots = self.last_snapshots.clone();
                    self.print_snapshots(&snapshots, "No simulation has run yet.").await?;
                }
                "start" => {
                    if !self.session().await? {
                        break;
                    }
                }
                other => self.say(format!("Unknown command: {other}")).await?,
            }
        }

        debug!("console input closed");
        Ok(())
    }

    /// One manual session. Returns `false` if input ended inside it.
    async fn session(&mut self) -> Result<bool> {
        self.say("Starting supervisors...").await?;
        self.say("Type 'rreq <nodeid>' to send RREQ, 'help' for more.").await?;

        let mut session = Session::default();
        let mut input_open = true;

        loop {
            let Some(line) = self.prompt("Enter event: ").await? else {
                input_open = false;
                break;
            };
            let parts: Vec<&str> = line.split_whitespace().collect();

            match parts.as_slice() {
                [] => {}
                ["stop"] => {
                    self.say("Stopping manual simulation.").await?;
                    break;
                }
                ["help"] => self.say(SESSION_HELP).await?,
                ["logs"] => {
                    if session.path.is_empty() {
                        self.say("No logs available.").await?;
                    } else {
                        self.say("Path logs:").await?;
                        let path = session.path.clone();
                        for step in path {
                            self.say(step.to_string()).await?;
                        }
                    }
                }
                ["status"] => {
                    let snapshots = session
                        .driver
                        .as_ref()
                        .map(Driver::snapshots)
                        .unwrap_or_default();
                    self.print_snapshots(&snapshots, "No nodes started yet.").await?;
                }
                ["rreq"] => {
                    self.say("Please provide both event and nodeid (e.g., rreq 1)").await?;
                }
                ["rreq", id] => match id.parse::<NodeId>() {
                    Ok(initiator) => self.discover(&mut session, initiator).await?,
                    Err(e) => self.say(format!("Error: {e}")).await?,
                },
                ["rreq", _, extra @ ..] => {
                    self.say(format!(
                        "Too many arguments: {} (e.g., rreq 1)",
                        extra.join(" ")
                    ))
                    .await?;
                }
                [other, ..] => self.say(format!("Unknown event: {other}")).await?,
            }
        }

        if let Some(snapshots) = session.close().await {
            self.last_snapshots = snapshots;
        }
        Ok(input_open)
    }

    /// Run one discovery, reusing the session's nodes when they fit.
    async fn discover(&mut self, session: &mut Session, initiator: NodeId) -> Result<()> {
        let responder = responder_for(initiator);

        let fits = session.driver.as_ref().is_some_and(|driver| {
            let ids = driver.node_ids();
            ids.contains(&initiator) && ids.contains(&responder)
        });
        if !fits {
            session.close().await;
            match Driver::start([initiator, responder], self.config.clone()) {
                Ok(driver) => session.driver = Some(driver),
                Err(e) => {
                    error!("could not start nodes: {}", e);
                    return self.say(format!("Error: {e}")).await;
                }
            }
        }
        let Some(driver) = session.driver.as_mut() else {
            return Ok(());
        };

        let discovery = RouteDiscovery::new(initiator, responder);
        match discovery.run(driver).await {
            Ok(RouteOutcome::Completed { path, reports }) => {
                for report in &reports {
                    for line in render::step_lines(report) {
                        self.say(line).await?;
                    }
                }
                session.path = path;
                self.say("Route discovery completed. Type 'logs' to see the path.").await?;
            }
            Ok(RouteOutcome::Blocked { node }) => {
                self.say(format!("Node {node} blocked from sending RREQ by supervisor"))
                    .await?;
            }
            Err(e) => {
                error!("route discovery failed: {}", e);
                self.say(format!("Error: {e}")).await?;
                session.close().await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run_console(input: &str) -> String {
        let mut console = Console::new(input.as_bytes(), Vec::new(), DriverConfig::default());
        console.run().await.unwrap();
        String::from_utf8(console.into_output()).unwrap()
    }

    #[test]
    fn responder_pairing() {
        assert_eq!(responder_for(NodeId(1)), NodeId(2));
        assert_eq!(responder_for(NodeId(2)), NodeId(1));
        assert_eq!(responder_for(NodeId(7)), NodeId(2));
    }

    #[tokio::test]
    async fn top_level_commands() {
        let out = run_console("help\nstatus\nfrobnicate\nexit\nhelp\n").await;
        assert!(out.contains("Available commands:"));
        assert!(out.contains("No simulation has run yet."));
        assert!(out.contains("Unknown command: frobnicate"));
        assert!(out.contains("Exiting CLI."));
        // Nothing after exit is read.
        assert_eq!(out.matches("Available commands:").count(), 1);
    }

    #[tokio::test]
    async fn end_of_input_exits() {
        let out = run_console("help\n").await;
        assert!(out.contains("Available commands:"));
        assert!(!out.contains("Exiting CLI."));
    }

    #[tokio::test]
    async fn session_runs_discovery_and_prints_logs() {
        let out = run_console("start\nlogs\nrreq 1\nlogs\nstatus\nstop\nexit\n").await;

        assert!(out.contains("No logs available."));
        assert!(out.contains("-> Node 1 sending RREQ"));
        assert!(out.contains("-> Node 1 accepting RREP"));
        assert!(out.contains("Path logs:"));
        assert!(out.contains("Node 2 forwarded RREP to Node 1"));
        assert!(out.contains("Node 1 sent DATA to Node 2"));
        assert!(out.contains("Node 1: state=Idle rreq=Unlocked rrep=Locked processed=5"));
        assert!(out.contains("Stopping manual simulation."));
    }

    #[tokio::test]
    async fn session_reuses_nodes_across_discoveries() {
        let out = run_console("start\nrreq 1\nrreq 2\nstatus\nstop\nstatus\n").await;

        assert!(out.contains("Node 2 sent DATA to Node 1"));
        // Ten events reached both nodes of the same run.
        assert!(out.contains("Node 1: state=Idle rreq=Unlocked rrep=Unlocked processed=10"));
        assert!(out.contains("Node 2: state=Idle rreq=Unlocked rrep=Locked processed=10"));
    }

    #[tokio::test]
    async fn extra_rreq_arguments_are_reported() {
        let out = run_console("start\nrreq 1 2 3\nlogs\nstop\n").await;

        assert!(out.contains("Too many arguments: 2 3 (e.g., rreq 1)"));
        assert!(!out.contains("Unknown event"));
        // Nothing ran.
        assert!(out.contains("No logs available."));
    }

    #[tokio::test]
    async fn driver_start_failure_keeps_console_alive() {
        let config = DriverConfig::default().with_queue_capacity(0);
        let input = "start\nrreq 1\nstatus\nstop\nhelp\nexit\n";
        let mut console = Console::new(input.as_bytes(), Vec::new(), config);
        console.run().await.unwrap();
        let out = String::from_utf8(console.into_output()).unwrap();

        assert!(out.contains("Error: invalid configuration: queue capacity must be at least 1"));
        assert!(out.contains("No nodes started yet."));
        assert!(out.contains("Stopping manual simulation."));
        assert!(out.contains("Available commands:"));
        assert!(out.contains("Exiting CLI."));
    }

    #[tokio::test]
    async fn session_reports_bad_input() {
        let out = run_console("start\nrreq\nrreq abc\nping 1\n\nstop\n").await;

        assert!(out.contains("Please provide both event and nodeid (e.g., rreq 1)"));
        assert!(out.contains("Error: invalid node id: abc"));
        assert!(out.contains("Unknown event: ping"));
        assert!(out.contains("Stopping manual simulation."));
    }
}
