use std::collections::BTreeMap;

use role_credentials::Credentials;

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const ENV_REGION: &str = "AWS_REGION";
pub const ENV_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const ENV_DEV_MODE: &str = "AGENTCORE_DEV_MODE";
pub const ENV_UNBUFFERED: &str = "PYTHONUNBUFFERED";
pub const ENV_PORT: &str = "PORT";

/// Host variables a subprocess needs to run at all.
const SYSTEM_ESSENTIALS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "LANG",
    "LC_ALL",
    "TMPDIR",
    "TERM",
    "VIRTUAL_ENV",
    "SYSTEMROOT",
    "TEMP",
    "TMP",
];

/// Credentials, region and markers shared by both backends, with user
/// variables merged last so they win on collision.
pub fn workload_env(
    credentials: &Credentials,
    region: &str,
    user: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert(ENV_ACCESS_KEY_ID.to_owned(), credentials.access_key_id.clone());
    env.insert(
        ENV_SECRET_ACCESS_KEY.to_owned(),
        credentials.secret_access_key.clone(),
    );
    env.insert(ENV_SESSION_TOKEN.to_owned(), credentials.session_token.clone());
    env.insert(ENV_REGION.to_owned(), region.to_owned());
    env.insert(ENV_DEFAULT_REGION.to_owned(), region.to_owned());
    env.insert(ENV_DEV_MODE.to_owned(), "true".to_owned());
    env.insert(ENV_UNBUFFERED.to_owned(), "1".to_owned());
    env.extend(user.iter().map(|(key, value)| (key.clone(), value.clone())));
    env
}

/// Minimal explicit environment for a local subprocess: system essentials from
/// `host`, the assigned port, then [`workload_env`].
pub fn process_env<I>(
    host: I,
    port: u16,
    credentials: &Credentials,
    region: &str,
    user: &BTreeMap<String, String>,
) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: BTreeMap<String, String> = host
        .into_iter()
        .filter(|(key, _)| SYSTEM_ESSENTIALS.contains(&key.as_str()))
        .collect();
    env.insert(ENV_PORT.to_owned(), port.to_string());
    env.extend(workload_env(credentials, region, user));
    env
}

/// `KEY=value` pairs in the container daemon's format.
pub fn to_container_env(env: &BTreeMap<String, String>) -> Vec<String> {
    env.iter().map(|(key, value)| format!("{key}={value}")).collect()
}
