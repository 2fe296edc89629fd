use std::sync::OnceLock;

use regex::Regex;

const SSO_ROLE_PREFIX: &str = "AWSReservedSSO_";
const SSO_ROLE_PATH: &str = "aws-reserved/sso.amazonaws.com/";

fn assumed_role_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"^arn:([^:]+):sts::(\d+):assumed-role/([^/]+)/.+$")
            .expect("assumed-role regex must compile")
    })
}

/// Rewrite an assumed-role session ARN to the durable IAM role ARN.
///
/// SSO permission-set roles live under the reserved SSO path. Anything that is
/// not an assumed-role session ARN passes through unchanged, which makes this
/// idempotent.
pub fn normalize_principal_arn(arn: &str) -> String {
    let Some(captures) = assumed_role_regex().captures(arn) else {
        return arn.to_owned();
    };

    let partition = &captures[1];
    let account = &captures[2];
    let role_name = &captures[3];

    if role_name.starts_with(SSO_ROLE_PREFIX) {
        format!("arn:{partition}:iam::{account}:role/{SSO_ROLE_PATH}{role_name}")
    } else {
        format!("arn:{partition}:iam::{account}:role/{role_name}")
    }
}

/// Role name is the last path segment of a role ARN.
pub fn role_name_from_arn(role_arn: &str) -> Option<&str> {
    role_arn
        .rsplit('/')
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.starts_with("arn:"))
}
