//! Office specialist: billing validation and escalation to office humans.

use crate::client_wrapper::ClientWrapper;
use crate::specialists::SpecialistAgent;
use crate::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
use crate::tool_protocols::FunctionToolProtocol;
use crate::users;
use crate::whatsapp::WhatsAppClient;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::sync::Arc;

/// The deterministic billing rule, the "old API" that knows about contracts
/// and goodwill. Not a model.
///
/// `job_data` is the JSON string handed over by the field service agent. Jobs
/// over one included work hour conflict unless goodwill has been approved.
pub fn process_billing_rule(job_data: &str, force_goodwill: bool) -> JsonValue {
    let data: JsonValue = match serde_json::from_str(job_data) {
        Ok(d) => d,
        Err(e) => {
            return json!({
                "status": "error",
                "reason": format!("job_data is not valid JSON: {}", e),
            });
        }
    };
    let job_id = data
        .get("job_id")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let work_hours = data
        .get("work_hours")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    if work_hours > 1.0 && !force_goodwill {
        json!({
            "status": "conflict",
            "job_id": job_id,
            "reason": "goodwill_review_required",
            "details": format!(
                "{}h beyond the one hour included in the service contract",
                work_hours - 1.0
            ),
        })
    } else {
        json!({
            "status": "success",
            "job_id": job_id,
            "note": if force_goodwill {
                "Booked as goodwill"
            } else {
                "Standard booking successful"
            },
        })
    }
}

/// Render the escalation text shown to the office human.
pub fn format_escalation(job_id: &str, message: &str, options: &[String]) -> String {
    let mut text = format!(
        "HUMAN DECISION REQUIRED\nJob: {}\n{}\n",
        job_id, message
    );
    if !options.is_empty() {
        text.push_str(&format!("Options: {}", options.join(" / ")));
    }
    text.trim_end().to_string()
}

/// Build the office agent with its two tools registered.
///
/// When a WhatsApp client is supplied, escalations are pushed to every
/// registered office number; without one they are only logged (CLI runs).
pub async fn build(
    client: Arc<dyn ClientWrapper>,
    system_prompt: String,
    whatsapp: Option<Arc<WhatsAppClient>>,
) -> Result<SpecialistAgent, Box<dyn Error + Send + Sync>> {
    let functions = FunctionToolProtocol::new();

    functions
        .register_tool(
            ToolMetadata::new(
                "process_billing_rule",
                "Apply the deterministic billing rules to a completed job. Returns \
                 either a successful booking or a conflict that needs a goodwill \
                 decision from an office human. Set force_goodwill to true only \
                 after an office human has approved the goodwill.",
            )
            .with_parameter(
                ToolParameter::new("job_data", ToolParameterType::String)
                    .with_description("JSON string of the job data from the field service agent")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("force_goodwill", ToolParameterType::Boolean)
                    .with_description("True once goodwill has been approved by a human"),
            ),
            Arc::new(|params| {
                Box::pin(async move {
                    let job_data = params["job_data"].as_str().unwrap_or("");
                    let force_goodwill = params["force_goodwill"].as_bool().unwrap_or(false);
                    log::info!(
                        "[TOOL] process_billing_rule(force_goodwill={})",
                        force_goodwill
                    );
                    Ok(ToolResult::success(process_billing_rule(
                        job_data,
                        force_goodwill,
                    )))
                })
            }),
        )
        .await;

    functions
        .register_tool(
            ToolMetadata::new(
                "escalate_to_office_human",
                "Notify an office employee that a yes/no decision is needed, e.g. a \
                 goodwill approval for a billing conflict. Phrase the message as a \
                 direct question and list the possible options.",
            )
            .with_parameter(
                ToolParameter::new("job_id", ToolParameterType::String)
                    .with_description("The job the decision concerns")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("message", ToolParameterType::String)
                    .with_description("The question for the office human")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("options", ToolParameterType::Array)
                    .with_description("Answer options, e.g. ['Grant goodwill', 'Reject']"),
            ),
            Arc::new(move |params| {
                let whatsapp = whatsapp.clone();
                Box::pin(async move {
                    let job_id = params["job_id"].as_str().unwrap_or("unknown");
                    let message = params["message"].as_str().unwrap_or("");
                    let options: Vec<String> = params["options"]
                        .as_array()
                        .map(|a| {
                            a.iter()
                                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                                .collect()
                        })
                        .unwrap_or_default();

                    let text = format_escalation(job_id, message, &options);
                    log::info!("[TOOL] escalate_to_office_human:\n{}", text);

                    if let Some(client) = &whatsapp {
                        for number in users::whatsapp_numbers_for_role("office") {
                            if let Err(e) = client.send(number, &text).await {
                                log::error!("escalation to {} failed: {}", number, e);
                            }
                        }
                    }

                    Ok(ToolResult::success(json!({"escalation_status": "sent"})))
                })
            }),
        )
        .await;

    let mut registry = ToolRegistry::empty();
    registry.add_protocol(Arc::new(functions)).await?;

    Ok(SpecialistAgent::new(
        "office-agent",
        client,
        system_prompt,
        registry,
    ))
}
