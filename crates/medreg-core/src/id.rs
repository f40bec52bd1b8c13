/// Generate a fresh record id.
///
/// Boundary payloads may carry a client-supplied id; when they do not, the
/// store fills one in with this.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
