//! Simulate command implementation.

use devshadow_engine::{
    AttrValue, Attribute, MockTransport, ShadowConfig, ShadowContext, SimulatedCloud,
};
use devshadow_protocol::ShadowTopics;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// Inputs of a simulation run.
#[derive(Debug)]
pub struct SimulateOptions {
    /// Product key of the device.
    pub product_key: String,
    /// Name of the device.
    pub device_name: String,
    /// Attributes to register and report.
    pub attributes: Vec<(String, AttrValue)>,
    /// Desired values pushed by the cloud.
    pub desired: Vec<(String, AttrValue)>,
    /// Attribute to delete before shutting down.
    pub delete: Option<String>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Outcome of a simulation run.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// Device attribute values at the end of the run.
    pub device: serde_json::Map<String, Value>,
    /// Reported state held by the cloud.
    pub reported: serde_json::Map<String, Value>,
    /// Desired state held by the cloud.
    pub desired: serde_json::Map<String, Value>,
    /// Final document version.
    pub version: u64,
    /// Number of requests the cloud received.
    pub requests: usize,
    /// Number of desired values applied on the device.
    pub deltas_applied: usize,
    /// Attribute deleted, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = Duration::from_millis(options.timeout_ms);
    let config = ShadowConfig::new(&options.product_key, &options.device_name)
        .with_yield_quantum(Duration::from_millis(20))
        .with_construct_yield(Duration::from_millis(20))
        .with_request_timeout(timeout)
        .with_initial_sync_timeout(timeout)
        .with_teardown_grace(Duration::from_millis(200));

    let transport = MockTransport::new();
    let cloud = SimulatedCloud::new(&ShadowTopics::for_device(
        &options.product_key,
        &options.device_name,
    ));
    cloud.attach(&transport);

    let shadow = ShadowContext::construct(config, transport.clone())?;

    let attributes: Vec<Attribute> = options
        .attributes
        .iter()
        .map(|(name, value)| {
            Attribute::new(name.as_str(), value.clone()).on_delta({
                let name = name.clone();
                move |value| info!(attribute = %name, %value, "desired value applied")
            })
        })
        .collect();
    for attribute in &attributes {
        shadow.register_attribute(attribute.clone())?;
    }

    if !attributes.is_empty() {
        shadow.report(&attributes.iter().collect::<Vec<_>>())?;
        println!("Reported {} attribute(s)", attributes.len());
    }

    let mut deltas_applied = 0;
    if !options.desired.is_empty() {
        for (name, value) in &options.desired {
            cloud.set_desired(name.as_str(), to_json(value)?);
        }
        deltas_applied = shadow.apply_control_message(&cloud.control_message())?;
        println!("Applied {deltas_applied} desired value(s)");

        // Re-report so the cloud sees the applied values.
        if deltas_applied > 0 {
            shadow.report(&attributes.iter().collect::<Vec<_>>())?;
        }
    }

    let mut deleted = None;
    if let Some(name) = &options.delete {
        let attribute = attributes
            .iter()
            .find(|a| a.name() == name.as_str())
            .cloned()
            .unwrap_or_else(|| Attribute::new(name.as_str(), AttrValue::Null));
        shadow.delete_attribute(&attribute)?;
        println!("Deleted attribute '{name}'");
        deleted = Some(name.clone());
    }

    let device: serde_json::Map<String, Value> = attributes
        .iter()
        .filter(|a| shadow.is_registered(a.name()))
        .map(|a| Ok((a.name().to_string(), to_json(&a.value())?)))
        .collect::<serde_json::Result<_>>()?;

    shadow.deconstruct()?;

    let result = SimulateResult {
        device,
        reported: cloud.reported(),
        desired: cloud.desired(),
        version: cloud.version(),
        requests: cloud.requests(),
        deltas_applied,
        deleted,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text(&result),
    }
    Ok(())
}

fn to_json(value: &AttrValue) -> serde_json::Result<Value> {
    serde_json::from_str(&value.to_json_literal())
}

fn print_text(result: &SimulateResult) {
    println!();
    println!("Simulation Summary:");
    println!("  Document version: {}", result.version);
    println!("  Cloud requests:   {}", result.requests);
    println!("  Deltas applied:   {}", result.deltas_applied);
    println!();
    println!("  Device:");
    for (name, value) in &result.device {
        println!("    {name} = {value}");
    }
    println!("  Reported:");
    for (name, value) in &result.reported {
        println!("    {name} = {value}");
    }
    println!("  Desired:");
    for (name, value) in &result.desired {
        println!("    {name} = {value}");
    }
}
