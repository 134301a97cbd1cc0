//! Console formatting of driver results.

use aodv_core::{NodeSnapshot, StepReport};

const SEPARATOR: &str = "----------------------";

/// Lines printed after one broadcast step.
pub fn step_lines(report: &StepReport) -> Vec<String> {
    let mut lines: Vec<String> = report
        .observations
        .iter()
        .map(|obs| format!("-> {obs}"))
        .collect();
    lines.extend(report.failures.iter().map(|failure| format!("-> {failure}")));
    lines.push(format!("Event processed: {}", report.event));
    lines.extend(
        report
            .observations
            .iter()
            .map(|obs| format!("-> Node {} state: {}", obs.node, obs.snapshot.state)),
    );
    lines.push(SEPARATOR.to_string());
    lines
}

/// One line per node.
pub fn snapshot_lines(snapshots: &[NodeSnapshot]) -> Vec<String> {
    snapshots.iter().map(ToString::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use aodv_core::{DeliveryFailure, Driver, DriverConfig, Event, EventKind, NodeFailure, NodeId};

    #[tokio::test]
    async fn renders_a_step() {
        let mut driver = Driver::start([NodeId(1), NodeId(2)], DriverConfig::default()).unwrap();
        let report = driver
            .feed(Event::new(NodeId(1), EventKind::RequestSend))
            .await
            .unwrap();

        assert_eq!(
            step_lines(&report),
            vec![
                "-> Node 1 sending RREQ",
                "-> Node 2 observed RREQ_SEND from Node 1",
                "Event processed: RREQ_SEND from Node 1",
                "-> Node 1 state: Waiting",
                "-> Node 2 state: Idle",
                "----------------------",
            ]
        );

        assert_eq!(
            snapshot_lines(&driver.snapshots())[0],
            "Node 1: state=Waiting rreq=Locked rrep=Locked processed=1"
        );
        driver.shutdown().await.unwrap();
    }

    #[test]
    fn renders_missed_nodes() {
        let report = StepReport {
            seq: 3,
            event: Event::new(NodeId(1), EventKind::DataSend),
            observations: Vec::new(),
            failures: vec![NodeFailure {
                node: NodeId(2),
                failure: DeliveryFailure::QueueClosed,
            }],
        };

        assert_eq!(
            step_lines(&report),
            vec![
                "-> Node 2 is down: queue closed",
                "Event processed: DATA_SEND from Node 1",
                "----------------------",
            ]
        );
    }
}
