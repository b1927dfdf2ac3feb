//! Print the graph description a session would launch.

use duofeed_common::config::AppConfig;
use duofeed_pipeline::{BackendCapability, GstProbe};

use crate::setup;

pub fn run(config: &AppConfig, json: bool) -> anyhow::Result<()> {
    let candidates = BackendCapability::from_config(&config.backends)?;
    let description = setup::build_description(config, &candidates, &GstProbe)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&description)?);
        return Ok(());
    }

    println!(
        "# {} feed(s), canvas {}, policy {}, sink {} ({:?})",
        description.feeds.len(),
        description.canvas,
        description.policy,
        description.backend.factory(),
        description.backend.embedding
    );
    for line in description.lines() {
        println!("{line}");
    }
    Ok(())
}
