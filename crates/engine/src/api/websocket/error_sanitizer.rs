//! Error sanitization for client-facing messages.
//!
//! Prevents leaking internal details (store errors, handler context) to clients.

/// Log the full error server-side and return a generic message for the client.
pub fn sanitize_error<E: std::fmt::Display>(error: &E, context: &str) -> String {
    tracing::error!(
        error = %error,
        context = context,
        "Internal error occurred"
    );

    format!("An error occurred while {context}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_message_hides_the_cause() {
        let message = sanitize_error(&"snapshot store: disk /var/lib/tk full", "ending the session");
        assert_eq!(message, "An error occurred while ending the session");
    }
}
