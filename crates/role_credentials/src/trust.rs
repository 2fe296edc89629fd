use std::time::Duration;

use serde_json::{json, Value};

use crate::arn::{normalize_principal_arn, role_name_from_arn};
use crate::error::RoleCredentialsError;
use crate::identity::IdentityService;

/// Marker of the statement this tool owns inside a role's trust document.
pub const TRUST_STATEMENT_SID: &str = "ServerlessAgentCoreLocalDevPolicy";

/// Mandatory wait after a trust document write. Assuming the role earlier can be
/// denied and the denial cached upstream for minutes.
pub const PROPAGATION_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustUpdate {
    /// Principal already authorized; nothing written.
    Unchanged,
    AddedStatement,
    AddedPrincipal,
}

impl TrustUpdate {
    pub fn wrote(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Principal ARNs of a statement; accepts the single-string and array forms.
pub fn statement_principals(statement: &Value) -> Vec<String> {
    match statement.get("Principal").and_then(|principal| principal.get("AWS")) {
        Some(Value::String(arn)) if !arn.is_empty() => vec![arn.clone()],
        Some(Value::Array(arns)) => arns
            .iter()
            .filter_map(Value::as_str)
            .filter(|arn| !arn.is_empty())
            .map(ToOwned::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Make `document` authorize `principal_arn` through the marker statement.
///
/// The marker statement is only ever appended to, never removed. An existing
/// entry matches either exactly or after normalization.
pub fn authorize_principal(
    document: &mut Value,
    principal_arn: &str,
    role_name: &str,
) -> Result<TrustUpdate, RoleCredentialsError> {
    let statements = document
        .get_mut("Statement")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| RoleCredentialsError::MalformedTrustDocument {
            role_name: role_name.to_owned(),
        })?;

    let marker = statements
        .iter()
        .position(|statement| statement.get("Sid").and_then(Value::as_str) == Some(TRUST_STATEMENT_SID));
    let Some(index) = marker else {
        statements.push(json!({
            "Sid": TRUST_STATEMENT_SID,
            "Effect": "Allow",
            "Principal": { "AWS": [principal_arn] },
            "Action": "sts:AssumeRole",
        }));
        return Ok(TrustUpdate::AddedStatement);
    };
    let statement = &mut statements[index];

    let mut principals = statement_principals(statement);
    let present = principals
        .iter()
        .any(|existing| existing == principal_arn || normalize_principal_arn(existing) == principal_arn);
    if present {
        return Ok(TrustUpdate::Unchanged);
    }

    principals.push(principal_arn.to_owned());
    match statement.get_mut("Principal").and_then(Value::as_object_mut) {
        Some(principal) => {
            principal.insert("AWS".to_owned(), json!(principals));
        }
        None => {
            if let Some(object) = statement.as_object_mut() {
                object.insert("Principal".to_owned(), json!({ "AWS": principals }));
            }
        }
    }
    Ok(TrustUpdate::AddedPrincipal)
}

/// Ensure the role trusts `principal_arn`, persisting and waiting for propagation
/// only when the document changed.
pub async fn ensure_trust(
    service: &dyn IdentityService,
    principal_arn: &str,
    role_arn: &str,
) -> Result<TrustUpdate, RoleCredentialsError> {
    let role_name = role_name_from_arn(role_arn).ok_or_else(|| RoleCredentialsError::InvalidRoleArn {
        arn: role_arn.to_owned(),
    })?;
    let principal = normalize_principal_arn(principal_arn);
    tracing::debug!(role_name, principal = %principal, "checking trust policy");

    let mut document = service.trust_document(role_name).await?;
    let update = authorize_principal(&mut document, &principal, role_name)?;
    if !update.wrote() {
        tracing::debug!(role_name, "principal already trusted");
        return Ok(update);
    }

    service.update_trust_document(role_name, &document).await?;
    tracing::debug!(
        role_name,
        ?update,
        wait_secs = PROPAGATION_WAIT.as_secs(),
        "waiting for trust policy to propagate"
    );
    tokio::time::sleep(PROPAGATION_WAIT).await;
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::{authorize_principal, statement_principals, TrustUpdate, TRUST_STATEMENT_SID};
    use serde_json::json;

    const PRINCIPAL: &str = "arn:aws:iam::123456789012:role/Developer";

    #[test]
    fn missing_statement_is_appended_once() {
        let mut document = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": {"Service": "bedrock-agentcore.amazonaws.com"},
                "Action": "sts:AssumeRole"
            }]
        });

        let update = authorize_principal(&mut document, PRINCIPAL, "AgentRole").expect("update");
        assert_eq!(update, TrustUpdate::AddedStatement);

        let statements = document["Statement"].as_array().expect("statements");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1]["Sid"], TRUST_STATEMENT_SID);
        assert_eq!(statements[1]["Principal"]["AWS"], json!([PRINCIPAL]));

        let again = authorize_principal(&mut document, PRINCIPAL, "AgentRole").expect("update");
        assert_eq!(again, TrustUpdate::Unchanged);
        assert_eq!(document["Statement"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn principal_appended_to_single_string_form() {
        let mut document = json!({
            "Statement": [{
                "Sid": TRUST_STATEMENT_SID,
                "Effect": "Allow",
                "Principal": {"AWS": "arn:aws:iam::123456789012:user/other"},
                "Action": "sts:AssumeRole"
            }]
        });

        let update = authorize_principal(&mut document, PRINCIPAL, "AgentRole").expect("update");
        assert_eq!(update, TrustUpdate::AddedPrincipal);
        assert_eq!(
            statement_principals(&document["Statement"][0]),
            vec!["arn:aws:iam::123456789012:user/other".to_owned(), PRINCIPAL.to_owned()]
        );
    }

    #[test]
    fn session_arn_entries_match_after_normalization() {
        let mut document = json!({
            "Statement": [{
                "Sid": TRUST_STATEMENT_SID,
                "Principal": {"AWS": ["arn:aws:sts::123456789012:assumed-role/Developer/old-session"]}
            }]
        });

        let update = authorize_principal(&mut document, PRINCIPAL, "AgentRole").expect("update");
        assert_eq!(update, TrustUpdate::Unchanged);
    }

    #[test]
    fn document_without_statements_is_rejected() {
        let mut document = json!({"Version": "2012-10-17"});
        assert!(authorize_principal(&mut document, PRINCIPAL, "AgentRole").is_err());
    }
}
