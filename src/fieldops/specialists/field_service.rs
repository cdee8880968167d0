//! Field service specialist: collects job reports from technicians, links
//! them to customer records, and hands completed jobs to the office.

use crate::agent_proxy::AgentProxy;
use crate::client_wrapper::ClientWrapper;
use crate::specialists::SpecialistAgent;
use crate::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult};
use crate::tool_protocols::FunctionToolProtocol;
use serde_json::{json, Value as JsonValue};
use std::error::Error;
use std::sync::Arc;

/// Stub customer database lookup. One known customer; the prompt tells the
/// model to retry with common spelling variants before giving up.
pub fn find_customer(customer_name: &str, customer_address: &str) -> JsonValue {
    let name = customer_name.trim().to_lowercase();
    let address = customer_address.trim().to_lowercase();

    if name == "meier" && address.contains("schillerstrasse 12") {
        json!({
            "status": "found",
            "customer_id": "789",
            "full_name": "Klaus Meier",
            "full_address": "Schillerstrasse 12, 10117 Berlin",
        })
    } else {
        json!({
            "status": "not_found",
            "customer_id": null,
            "full_name": null,
            "full_address": null,
        })
    }
}

/// Open-invoice check, the guard against duplicate billing. Only the known
/// customer resolves; anything else reports an error status so the model asks
/// the technician to re-verify.
pub fn check_invoice_status(customer_id: &str) -> JsonValue {
    if customer_id == "789" {
        json!({
            "status": "no_open_invoice",
            "existing_invoice_id": null,
        })
    } else {
        json!({
            "status": "error",
            "existing_invoice_id": null,
        })
    }
}

/// Build the field service agent with its three tools registered.
pub async fn build(
    client: Arc<dyn ClientWrapper>,
    system_prompt: String,
    office_url: &str,
) -> Result<SpecialistAgent, Box<dyn Error + Send + Sync>> {
    let functions = FunctionToolProtocol::new();

    functions
        .register_tool(
            ToolMetadata::new(
                "find_customer",
                "Find a customer's unique id and validate their details against the \
                 customer database. Use as soon as a customer name and address are \
                 extracted from the technician's report. If not found, retry with \
                 common misspellings (Meier / Meyer / Mayer).",
            )
            .with_parameter(
                ToolParameter::new("customer_name", ToolParameterType::String)
                    .with_description("Customer surname as reported")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("customer_address", ToolParameterType::String)
                    .with_description("Street address as reported")
                    .required(),
            ),
            Arc::new(|params| {
                Box::pin(async move {
                    let name = params["customer_name"].as_str().unwrap_or("");
                    let address = params["customer_address"].as_str().unwrap_or("");
                    log::info!("[TOOL] find_customer({:?}, {:?})", name, address);
                    Ok(ToolResult::success(find_customer(name, address)))
                })
            }),
        )
        .await;

    functions
        .register_tool(
            ToolMetadata::new(
                "check_invoice_status",
                "Check for existing open invoices for a customer id. Always run this \
                 after find_customer and before asking the technician to confirm, to \
                 prevent duplicate billing.",
            )
            .with_parameter(
                ToolParameter::new("customer_id", ToolParameterType::String)
                    .with_description("Customer id returned by find_customer")
                    .required(),
            ),
            Arc::new(|params| {
                Box::pin(async move {
                    let customer_id = params["customer_id"].as_str().unwrap_or("");
                    log::info!("[TOOL] check_invoice_status({:?})", customer_id);
                    Ok(ToolResult::success(check_invoice_status(customer_id)))
                })
            }),
        )
        .await;

    // Completed jobs are handed to the office agent over HTTP; the handoff
    // carries no conversation context, the job data is self-contained.
    let office = Arc::new(AgentProxy::office(office_url));
    functions
        .register_tool(
            ToolMetadata::new(
                "send_data_to_office",
                "Hand a completed, customer-confirmed job record to the office agent \
                 for billing. job_data must be a JSON string with job_id, customer_id, \
                 work_hours, and a description of the work performed.",
            )
            .with_parameter(
                ToolParameter::new("job_data", ToolParameterType::String)
                    .with_description("JSON string of the completed job record")
                    .required(),
            ),
            Arc::new(move |params| {
                let office = Arc::clone(&office);
                Box::pin(async move {
                    let job_data = params["job_data"].as_str().unwrap_or("").to_string();
                    log::info!("[TOOL] send_data_to_office: {}", job_data);
                    let reply = office
                        .call(&job_data, &JsonValue::Array(Vec::new()))
                        .await;
                    Ok(ToolResult::success(json!({
                        "status": "sent",
                        "office_reply": reply,
                    })))
                })
            }),
        )
        .await;

    let mut registry = ToolRegistry::empty();
    registry.add_protocol(Arc::new(functions)).await?;

    Ok(SpecialistAgent::new(
        "field-service-agent",
        client,
        system_prompt,
        registry,
    ))
}
