use analyst::Warehouse;
use tracing::warn;

pub const UNKNOWN_USER: &str = "unknown";

/// Resolve the identity stamped on audit records.
///
/// A configured id wins; otherwise the warehouse session's current user is
/// asked for, and any failure resolves to `"unknown"`.
pub async fn resolve_user_id(configured: Option<&str>, warehouse: &dyn Warehouse) -> String {
    if let Some(id) = configured.map(str::trim).filter(|id| !id.is_empty()) {
        return id.to_string();
    }

    match warehouse.execute("SELECT CURRENT_USER()").await {
        Ok(table) => table
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(|cell| cell.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_USER.to_string()),
        Err(e) => {
            warn!("could not resolve current user: {}", e);
            UNKNOWN_USER.to_string()
        }
    }
}
