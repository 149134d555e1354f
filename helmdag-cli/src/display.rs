// src/display.rs

//! Pretty-printing of [`ChartError`] diagnostics to stderr.

use std::collections::BTreeMap;

use helmdag::{ChartError, FailedPod};

pub fn print_chart_error(detail: &ChartError) {
    print_failed_group("FAILED DEPLOYMENTS", "Deployment", &detail.failed_deployments);
    print_failed_group("FAILED JOBS", "Job", &detail.failed_jobs);
    print_failed_group("FAILED DAEMONSETS", "DaemonSet", &detail.failed_daemon_sets);
    if !detail.failed_pods.is_empty() {
        eprintln!("FAILED PODS:\n===================");
        for pod in &detail.failed_pods {
            print_failed_pod(pod);
        }
    }
}

fn print_failed_group(header: &str, kind: &str, group: &BTreeMap<String, Vec<FailedPod>>) {
    if group.is_empty() {
        return;
    }
    eprintln!("{header}:\n===================");
    for (name, pods) in group {
        eprintln!("{kind}: {name}");
        for pod in pods {
            print_failed_pod(pod);
        }
    }
}

fn print_failed_pod(pod: &FailedPod) {
    eprintln!("\tPod: {}", pod.name);
    eprintln!("\tPhase: {}", pod.phase);
    eprintln!("\tReason: {}", pod.reason);
    eprintln!("\tMessage: {}", pod.message);
    eprintln!("\tConditions: {:?}", pod.conditions);
    eprintln!("\tContainer Statuses: {:?}", pod.container_statuses);
    if pod.logs.is_empty() {
        eprintln!("\tContainer Logs: <none>");
        return;
    }
    eprintln!("\tContainer Logs:");
    for (container, logs) in &pod.logs {
        eprintln!("\t\tContainer: {container}");
        if logs.is_empty() {
            eprintln!("\t\tLogs: <empty>");
        } else {
            eprintln!("\t\tLogs:\n====LOG START====\n{logs}\n====LOG END====");
        }
    }
}
