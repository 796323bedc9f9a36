//! Import helpers for simplifying resource import implementations

use crate::context::Context;
use crate::resource::{ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource};
use crate::types::{AttributePath, Diagnostic, DynamicValue};

/// Sets the import ID to a specific attribute in state
///
/// Example: ID "N_123" -> state.network_id = "N_123"
pub fn import_state_passthrough_id(
    _ctx: &Context,
    attr_path: AttributePath,
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let mut state = DynamicValue::object();

    if let Err(e) = state.set_string(&attr_path, request.id.clone()) {
        response.diagnostics.push(
            Diagnostic::error(
                format!("Failed to set import ID: {}", e),
                format!("Could not set attribute '{}' to value '{}'", attr_path, request.id),
            )
            .with_attribute(attr_path),
        );
        return;
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
    });
}

/// Splits a comma separated import ID across several attributes
///
/// Example: ID "N_123,0" with ["network_id", "number"] sets both attributes.
/// The part count must match the attribute count and no part may be empty.
pub fn import_state_composite_id(
    _ctx: &Context,
    attributes: &[&str],
    request: &ImportResourceStateRequest,
    response: &mut ImportResourceStateResponse,
) {
    let parts: Vec<&str> = request.id.split(',').map(str::trim).collect();

    if parts.len() != attributes.len() || parts.iter().any(|p| p.is_empty()) {
        response.diagnostics.push(Diagnostic::error(
            "Unexpected Import Identifier",
            format!(
                "Expected import identifier with format: {}. Got: {}",
                attributes.join(","),
                request.id
            ),
        ));
        return;
    }

    let mut state = DynamicValue::object();
    for (name, part) in attributes.iter().zip(parts) {
        let path = AttributePath::new(name);
        if let Err(e) = state.set_string(&path, part.to_string()) {
            response.diagnostics.push(
                Diagnostic::error(format!("Failed to set import ID: {}", e), "")
                    .with_attribute(path),
            );
            return;
        }
    }

    response.imported_resources.push(ImportedResource {
        type_name: request.type_name.clone(),
        state,
    });
}
