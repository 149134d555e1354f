#![allow(dead_code)]

use std::time::Duration;

use helmdag::{Chart, HealthIndication};

/// Builder for [`Chart`] to simplify test setup.
pub struct ChartBuilder {
    chart: Chart,
}

impl ChartBuilder {
    pub fn new(title: &str) -> Self {
        Self {
            chart: Chart {
                title: title.to_string(),
                location: format!("/charts/{title}"),
                ..Default::default()
            },
        }
    }

    pub fn location(mut self, location: &str) -> Self {
        self.chart.location = location.to_string();
        self
    }

    pub fn depends_on(mut self, title: &str) -> Self {
        self.chart.dependency_list.push(title.to_string());
        self
    }

    pub fn wait_for_deployment(mut self, deployment: &str) -> Self {
        self.chart.wait_until_deployment = deployment.to_string();
        self
    }

    pub fn health(mut self, health: HealthIndication) -> Self {
        self.chart.health_indication = health;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.chart.wait_timeout = timeout;
        self
    }

    pub fn helm_wait(mut self) -> Self {
        self.chart.wait_until_helm_ready = true;
        self
    }

    pub fn values(mut self, values: &[u8]) -> Self {
        self.chart.value_overrides = values.to_vec();
        self
    }

    pub fn build(self) -> Chart {
        self.chart
    }
}

/// The canonical four-chart test graph:
///
/// ```text
/// redis <- anotherthing <- toplevel
/// redis <------------------toplevel
/// someservice <------------toplevel
/// ```
///
/// All charts ignore pod health so walks complete without a cluster.
pub fn sample_charts() -> Vec<Chart> {
    vec![
        ChartBuilder::new("toplevel")
            .depends_on("someservice")
            .depends_on("anotherthing")
            .depends_on("redis")
            .build(),
        ChartBuilder::new("someservice").build(),
        ChartBuilder::new("anotherthing").depends_on("redis").build(),
        ChartBuilder::new("redis").build(),
    ]
}
