//! Simulate command - runs a whole group in-process.

use std::path::Path;
use std::thread;

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use serde::Serialize;
use vsync_config::ConfigLoader;
use vsync_membership::instrumentation::{METRICS, MetricsSnapshot};
use vsync_membership::sim::{NodeState, SimulatedGroup};
use vsync_membership::MembershipConfig;
use vsync_sst::DeliveryMode;
use vsync_view::View;

/// How the metrics footer of a text report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MetricsFormat {
    /// One summary line.
    Summary,
    /// Prometheus exposition format.
    Prometheus,
}

pub struct SimulateArgs {
    pub size: u32,
    pub crashes: Vec<usize>,
    pub seed: u64,
    pub queued: bool,
    pub rounds: u64,
    /// Sleep the configured poll interval between rounds.
    pub pace: bool,
    pub config_dir: String,
    pub json: bool,
    pub metrics: MetricsFormat,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub rounds: u64,
    pub settled: bool,
    pub nodes: Vec<NodeReport>,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub id: u32,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub fn run(args: &SimulateArgs) -> Result<()> {
    let config = ConfigLoader::new()
        .with_project_dir(Path::new(&args.config_dir))
        .load()
        .context("failed to load configuration")?;
    let report = simulate(args, &config.membership)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
        print!("{}", render_metrics(&report.metrics, args.metrics));
    }
    Ok(())
}

pub fn simulate(args: &SimulateArgs, config: &MembershipConfig) -> Result<Report> {
    if args.size == 0 {
        bail!("a group needs at least one member");
    }
    if let Some(rank) = args.crashes.iter().find(|r| **r >= args.size as usize) {
        bail!("cannot crash rank {rank} in a group of {}", args.size);
    }

    let mode = if args.queued {
        DeliveryMode::Queued
    } else {
        DeliveryMode::Immediate
    };
    let mut group = SimulatedGroup::new(args.size, config, mode, args.seed)?;
    for rank in &args.crashes {
        group.crash(*rank);
    }
    group.detect_crashes();

    tracing::info!(size = args.size, crashed = args.crashes.len(), seed = args.seed, "simulating");
    // With nothing to agree on the group idles; a few rounds show that.
    let limit = if args.crashes.is_empty() {
        args.rounds.min(5)
    } else {
        args.rounds
    };
    let mut settled = false;
    for _ in 0..limit {
        if group.step()? == 0 {
            settled = true;
            break;
        }
        if args.pace {
            thread::sleep(config.poll_interval());
        }
    }

    let nodes = group
        .nodes()
        .iter()
        .map(|node| {
            let (state, view, detail) = match node.state() {
                NodeState::Running => ("running", None, None),
                NodeState::Crashed => ("crashed", None, None),
                NodeState::Installed(view) => ("installed", Some(view.clone()), None),
                NodeState::Evicted(epoch) => ("evicted", None, Some(format!("removed in epoch {epoch}"))),
                NodeState::Stopped(reason) => ("stopped", None, Some(reason.clone())),
            };
            NodeReport {
                id: node.id().as_u32(),
                state,
                view,
                detail,
            }
        })
        .collect();

    Ok(Report {
        rounds: group.rounds(),
        settled,
        nodes,
        metrics: METRICS.snapshot(),
    })
}

fn print_report(report: &Report) {
    println!(
        "{} after {} rounds",
        if report.settled { "Settled" } else { "Still running" },
        report.rounds
    );
    println!();
    for node in &report.nodes {
        match (&node.view, &node.detail) {
            (Some(view), _) => println!("  node {:>3}  {:<9}  {view}", node.id, node.state),
            (None, Some(detail)) => println!("  node {:>3}  {:<9}  {detail}", node.id, node.state),
            (None, None) => println!("  node {:>3}  {}", node.id, node.state),
        }
    }
    println!();
}

/// Renders the metrics footer.
pub fn render_metrics(m: &MetricsSnapshot, format: MetricsFormat) -> String {
    match format {
        MetricsFormat::Summary => format!(
            "polls {}  suspicions {}  proposals {}  promotions {}  wedges {}  installs {}\n",
            m.polls_total,
            m.suspicions_total,
            m.proposals_total,
            m.promotions_total,
            m.wedges_total,
            m.views_installed_total
        ),
        MetricsFormat::Prometheus => METRICS.export_prometheus(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(size: u32, crashes: Vec<usize>) -> SimulateArgs {
        SimulateArgs {
            size,
            crashes,
            seed: 7,
            queued: true,
            rounds: 500,
            pace: false,
            config_dir: ".".to_string(),
            json: false,
            metrics: MetricsFormat::Summary,
        }
    }

    #[test]
    fn survivors_install_the_same_view() {
        let report = simulate(&args(5, vec![2]), &MembershipConfig::default()).unwrap();
        assert!(report.settled);

        let views: Vec<&View> = report.nodes.iter().filter_map(|n| n.view.as_ref()).collect();
        assert_eq!(views.len(), 4);
        for view in &views {
            assert_eq!(view.members(), views[0].members());
            assert_eq!(view.epoch_id(), views[0].epoch_id());
        }
        assert_eq!(report.nodes[2].state, "crashed");
    }

    #[test]
    fn minority_stops() {
        let report = simulate(&args(3, vec![0, 1]), &MembershipConfig::default()).unwrap();
        assert_eq!(report.nodes[2].state, "stopped");
    }

    #[test]
    fn rejects_out_of_range_crash() {
        assert!(simulate(&args(3, vec![3]), &MembershipConfig::default()).is_err());
        assert!(simulate(&args(0, vec![]), &MembershipConfig::default()).is_err());
    }

    #[test]
    fn metrics_render_in_both_formats() {
        let report = simulate(&args(5, vec![4]), &MembershipConfig::default()).unwrap();
        assert!(report.settled);

        let summary = render_metrics(&report.metrics, MetricsFormat::Summary);
        assert!(summary.starts_with("polls "));
        assert!(summary.ends_with('\n'));

        let exposition = render_metrics(&report.metrics, MetricsFormat::Prometheus);
        assert!(exposition.contains("# TYPE vsync_views_installed_total counter"));
        assert!(exposition.contains("# TYPE vsync_epoch gauge"));
        let installs = exposition
            .lines()
            .find_map(|l| l.strip_prefix("vsync_views_installed_total "))
            .unwrap();
        assert!(installs.parse::<u64>().unwrap() >= 4);
    }

    #[test]
    fn report_serializes() {
        let report = simulate(&args(3, vec![]), &MembershipConfig::default()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
        assert_eq!(json["nodes"][0]["state"], "running");
    }
}
