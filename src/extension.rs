//! Extension-method support.
//!
//! ACP reserves JSON-RPC methods whose names begin with `_` as a stable
//! namespace for peer-specific functionality outside the core protocol.
//! Inbound extension methods are routed to an optional
//! [`ExtensionMethodHandler`]; outbound helpers validate the name before it
//! touches the wire.

use async_trait::async_trait;
use serde_json::value::RawValue;

use crate::cancel::CancelScope;
use crate::error::{RequestError, Result};

/// Handles extension-method requests and notifications addressed to this
/// side of the connection.
#[async_trait]
pub trait ExtensionMethodHandler: Send + Sync {
    /// Handle an extension method.
    ///
    /// Unrecognized methods should return
    /// [`RequestError::method_not_found`]; for extension *notifications* that
    /// error is swallowed silently, per the protocol.
    async fn handle_extension_method(
        &self,
        ctx: CancelScope,
        method: &str,
        params: Option<&RawValue>,
    ) -> Result<serde_json::Value>;
}

pub(crate) fn is_extension_method(method: &str) -> bool {
    method.starts_with('_')
}

pub(crate) fn validate_extension_method_name(method: &str) -> Result<()> {
    if method.is_empty() {
        return Err(
            RequestError::invalid_request().data("extension method name must be non-empty")
        );
    }
    if !method.starts_with('_') {
        return Err(RequestError::invalid_request().data(format!(
            "extension method name must start with '_' (got {method:?})"
        )));
    }
    Ok(())
}
