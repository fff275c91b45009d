use crate::models::{PlaybookCategory, PlaybookDefinition, PlaybookSeverity, PlaybookStep};
use serde_json::json;

/// Built-in playbooks registered when the engine starts with seeding enabled
pub fn default_playbooks() -> Vec<PlaybookDefinition> {
    vec![security_breach_response(), performance_degradation_response()]
}

fn security_breach_response() -> PlaybookDefinition {
    PlaybookDefinition::new(
        "Security Breach Response",
        PlaybookCategory::Security,
        PlaybookSeverity::Critical,
    )
    .with_description("Contain a suspected breach, preserve evidence and page the security team")
    .auto_execute()
    .with_step(
        PlaybookStep::new("isolate", "Isolate affected systems", "isolate_system", 1)
            .with_description("Cut network access for the compromised hosts")
            .with_parameter("target", json!("affected-hosts-{{incident_id}}"))
            .with_timeout(30.0),
    )
    .with_step(
        PlaybookStep::new("backup", "Snapshot for forensics", "create_backup", 2)
            .with_description("Capture disk and memory state before cleanup")
            .with_parameter("target", json!("forensics-{{incident_id}}"))
            .with_timeout(120.0),
    )
    .with_step(
        PlaybookStep::new("notify", "Page security on-call", "send_notification", 3)
            .with_parameter("channel", json!("security-oncall"))
            .with_parameter(
                "message",
                json!("Breach containment running for incident {{incident_id}}"),
            )
            .optional(),
    )
}

fn performance_degradation_response() -> PlaybookDefinition {
    PlaybookDefinition::new(
        "Performance Degradation Response",
        PlaybookCategory::Performance,
        PlaybookSeverity::High,
    )
    .with_description("Add capacity, let load settle and tell the SRE rotation")
    .with_step(
        PlaybookStep::new("scale", "Scale out application tier", "scale_resources", 1)
            .with_parameter("service", json!("application"))
            .with_parameter("replicas", json!(6))
            .with_timeout(60.0),
    )
    .with_step(
        PlaybookStep::new("settle", "Wait for load to settle", "wait", 2)
            .with_parameter("duration_ms", json!(5_000))
            .with_timeout(30.0),
    )
    .with_step(
        PlaybookStep::new("notify", "Notify SRE on-call", "send_notification", 3)
            .with_parameter("channel", json!("sre-oncall"))
            .with_parameter(
                "message",
                json!("Scaled application tier for incident {{incident_id}}"),
            )
            .optional(),
    )
}
