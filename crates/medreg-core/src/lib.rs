pub mod error;
pub mod event;
pub mod id;
pub mod model;
pub mod scope;

pub use error::{CoreError, ErrorCategory, Result};
pub use event::{ChangeEvent, ChangeKind};
pub use id::generate_id;
pub use model::{
    CallerIdentity, Hospital, HospitalRecord, HospitalSummary, HospitalUpdate, NewHospital,
    NewUser, NewWard, ResourceKind, Role, User, UserCredentials, UserRecord, UserUpdate, Ward,
    WardKind, WardRecord, WardSummary, WardUpdate,
};
pub use scope::{
    DEVELOPMENT_HOSPITAL_ID, ListScope, MUTATING_ROLES, ScopeFilter, authorize, list_scope,
    record_cache_key,
};
