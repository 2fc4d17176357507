//! Format command implementation.

use devshadow_protocol::{
    AttrValue, Method, PatchBuilder, TokenGenerator, REPORTED_CLOSING, REPORTED_OPENING,
};

/// Runs the format command.
pub fn run(
    product_key: &str,
    device_name: &str,
    method: &str,
    capacity: usize,
    fields: &[(String, AttrValue)],
) -> Result<(), Box<dyn std::error::Error>> {
    let method = Method::from_name(method)
        .filter(|m| matches!(m, Method::Update | Method::Delete | Method::Get))
        .ok_or_else(|| format!("Unsupported method '{method}' (update, delete, get)"))?;

    if method == Method::Get && !fields.is_empty() {
        return Err("get requests carry no attributes".into());
    }

    let tokens = TokenGenerator::new(product_key, device_name);
    let opening = (method != Method::Get).then_some(REPORTED_OPENING);
    let mut builder = PatchBuilder::init(method, tokens.next_token(), capacity, opening)?;
    for (name, value) in fields {
        // Deletes always send null.
        let value = if method == Method::Delete {
            &AttrValue::Null
        } else {
            value
        };
        builder.add(name, value)?;
    }

    let closing = opening.map(|_| REPORTED_CLOSING);
    let remaining = builder.remaining();
    let patch = builder.finalize(closing)?;

    println!("{}", patch.as_str());
    eprintln!(
        "{} bytes, {} of {} remaining before finalize",
        patch.len(),
        remaining,
        capacity
    );
    Ok(())
}
