//! Role-scoped read resolution.
//!
//! Every list read goes through [`list_scope`], which maps the caller's role
//! to a store filter and the cache key partition the result may be served
//! from. The mapping is a pure function: same resource and caller, same
//! scope. Write authorization is the separate, equally pure [`authorize`].

use crate::error::CoreError;
use crate::model::{CallerIdentity, ResourceKind, Role};

/// Reserved organization id for the in-house development hospital. Hidden
/// from every caller except SUPER.
pub const DEVELOPMENT_HOSPITAL_ID: &str = "HID-DEVELOPMENT";

/// Roles allowed to mutate registry records.
pub const MUTATING_ROLES: &[Role] = &[Role::Super, Role::Service, Role::Admin, Role::LegacyAdmin];

/// Store-side restriction applied to a list read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeFilter {
    /// No restriction. SUPER only.
    All,
    /// Everything except the development organization.
    ExcludeDevelopment,
    /// A single organization, with the development organization excluded
    /// even if named explicitly.
    Organization(String),
}

impl ScopeFilter {
    /// Whether a record owned by `organization_id` is visible under this
    /// filter. Both store backends decide visibility through this, so the
    /// isolation rules live in exactly one place.
    pub fn allows(&self, organization_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::ExcludeDevelopment => organization_id != DEVELOPMENT_HOSPITAL_ID,
            Self::Organization(org) => {
                organization_id == org && organization_id != DEVELOPMENT_HOSPITAL_ID
            }
        }
    }
}

/// Resolved scope for a list read: what to ask the store for, and which
/// cache partition the answer belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListScope {
    pub filter: ScopeFilter,
    pub cache_key: String,
}

/// Resolve the scope for a list read of `resource` by `caller`.
///
/// # Errors
///
/// `InvalidScope` when the role is not list-authorized (USER) or an admin
/// identity arrives without a bound organization.
pub fn list_scope(resource: ResourceKind, caller: &CallerIdentity) -> Result<ListScope, CoreError> {
    let base = resource.as_str();
    match caller.role {
        Role::Super => Ok(ListScope {
            filter: ScopeFilter::All,
            cache_key: base.to_string(),
        }),
        Role::Service => Ok(ListScope {
            filter: ScopeFilter::ExcludeDevelopment,
            cache_key: format!("{base}:{DEVELOPMENT_HOSPITAL_ID}"),
        }),
        Role::Admin | Role::LegacyAdmin => {
            if caller.hospital_id.is_empty() {
                return Err(CoreError::invalid_scope(format!(
                    "role {} requires a bound hospital id",
                    caller.role
                )));
            }
            Ok(ListScope {
                filter: ScopeFilter::Organization(caller.hospital_id.clone()),
                cache_key: format!("{base}:{}", caller.hospital_id),
            })
        }
        Role::User => Err(CoreError::invalid_scope(format!(
            "role {} may not list {base} records",
            caller.role
        ))),
    }
}

/// Cache key for a single-record read.
///
/// The `:id:` infix keeps record entries under the resource prefix, so
/// blanket prefix invalidation clears them, while staying disjoint from the
/// organization-partitioned list keys.
pub fn record_cache_key(resource: ResourceKind, id: &str) -> String {
    format!("{}:id:{id}", resource.as_str())
}

/// Pure containment check used before mutations. An empty `required` slice
/// means any authenticated role.
pub fn authorize(role: Role, required: &[Role]) -> bool {
    required.is_empty() || required.contains(&role)
}
