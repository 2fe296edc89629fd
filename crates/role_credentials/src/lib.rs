//! Trust-policy bootstrap and temporary role credentials for local workloads.
//!
//! The flow at startup is: resolve the caller identity, normalize it to a
//! durable principal ARN, make sure the role's trust document authorizes that
//! principal, then assume the role with bounded exponential backoff.

mod arn;
mod aws_cli;
mod backoff;
mod credentials;
mod error;
mod identity;
mod manager;
mod trust;

pub use arn::{normalize_principal_arn, role_name_from_arn};
pub use aws_cli::AwsCliIdentity;
pub use backoff::{backoff_delay, BACKOFF_BASE, BACKOFF_MAX, MAX_ASSUME_ATTEMPTS};
pub use credentials::{is_expiring, minutes_until_expiry, Credentials, EXPIRY_THRESHOLD};
pub use error::RoleCredentialsError;
pub use identity::IdentityService;
pub use manager::{session_name_at, CredentialManager};
pub use trust::{
    authorize_principal, ensure_trust, statement_principals, TrustUpdate, PROPAGATION_WAIT,
    TRUST_STATEMENT_SID,
};
