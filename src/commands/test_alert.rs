use crate::context::AppContext;
use anyhow::{anyhow, Result};
use chrono::Local;
use log::{info, warn};

/// Sends a fixed message through every channel and reports which accepted it.
pub async fn run(app: &AppContext) -> Result<Vec<String>> {
    let subject = "stockpick test alert";
    let body = format!(
        "Test message sent at {}. Alert delivery is working.",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );

    let mut delivered = Vec::new();
    for channel in app.channels() {
        match channel.send(subject, &body).await {
            Ok(()) => {
                info!("Test alert delivered via {}", channel.name());
                delivered.push(channel.name().to_string());
            }
            Err(err) => warn!("Test alert via {} failed: {:#}", channel.name(), err),
        }
    }

    if delivered.is_empty() {
        return Err(anyhow!("No alert channel accepted the test message"));
    }
    Ok(delivered)
}
