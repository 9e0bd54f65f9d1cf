use crate::config::{DEFAULT_REGION, Profile, load_profile, save_profile, validate_region};
use crate::output::{emit_output, is_json_mode};
use crate::utils::{finish_spinner, handle_error, spinner};
use clap::ArgMatches;
use dialoguer::{Input, Password};

#[derive(serde::Serialize)]
struct ConfigOutput {
    path: String,
    region: String,
    static_credentials: bool,
    endpoint: Option<String>,
}

pub fn config(matches: &ArgMatches) {
    let profile = match get_params(matches) {
        Ok(profile) => profile,
        Err(e) => handle_error(e, None),
    };

    let pb = spinner("Writing config...");

    let path = match save_profile(&profile) {
        Ok(path) => path,
        Err(e) => handle_error(e, Some(&pb)),
    };

    if is_json_mode() {
        emit_output(&ConfigOutput {
            path: path.display().to_string(),
            region: profile.region,
            static_credentials: profile.access_key.is_some(),
            endpoint: profile.endpoint,
        });
        return;
    }

    finish_spinner(&pb, &format!("Config written to {}", path.display()));
}

fn get_params(matches: &ArgMatches) -> Result<Profile, String> {
    let current = load_profile()?.unwrap_or_default();
    let flag = |name: &str| matches.get_one::<String>(name).cloned();

    let region = match flag("region") {
        Some(region) => region,
        None if is_json_mode() => Some(current.region.clone())
            .filter(|region| !region.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        None => Input::<String>::new()
            .with_prompt("Region")
            .default(if current.region.is_empty() {
                DEFAULT_REGION.to_string()
            } else {
                current.region.clone()
            })
            .interact_text()
            .map_err(|e| e.to_string())?,
    };
    validate_region(&region)?;

    let access_key = match flag("access-key") {
        Some(key) => Some(key),
        None if is_json_mode() => current.access_key.clone(),
        None => {
            let typed: String = Input::<String>::new()
                .with_prompt("Access key (leave empty to use the AWS default credential chain)")
                .allow_empty(true)
                .interact_text()
                .map_err(|e| e.to_string())?;
            Some(typed.trim().to_string()).filter(|key| !key.is_empty())
        }
    };

    let secret_key = match (&access_key, flag("secret-key")) {
        (None, _) => None,
        (Some(_), Some(secret)) => Some(secret),
        (Some(_), None) if is_json_mode() => current.secret_key.clone(),
        (Some(_), None) => Some(
            Password::new()
                .with_prompt("Secret key")
                .interact()
                .map_err(|e| e.to_string())?,
        ),
    };

    if access_key.is_some() && secret_key.is_none() {
        return Err("A secret key is required together with an access key".to_string());
    }

    Ok(Profile {
        access_key,
        secret_key,
        region,
        endpoint: flag("endpoint").or(current.endpoint),
    })
}
