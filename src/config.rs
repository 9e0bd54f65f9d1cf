use crate::vault_clients::GlacierClientConfig;
use clap::ArgMatches;
use dirs::home_dir;
use regex::Regex;
use rmp_serde::Serializer;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_REGION: &str = "us-east-1";

/// Credentials profile written by `syno-restore config`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
}

pub fn config_dir() -> Result<PathBuf, String> {
    home_dir()
        .map(|home| home.join(".syno-restore"))
        .ok_or_else(|| "Could not determine your home directory".to_string())
}

pub fn config_path() -> Result<PathBuf, String> {
    Ok(config_dir()?.join("config.msgpack"))
}

pub fn load_profile() -> Result<Option<Profile>, String> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read(&path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    rmp_serde::from_slice(&contents)
        .map(Some)
        .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

pub fn save_profile(profile: &Profile) -> Result<PathBuf, String> {
    let mut buf = Vec::new();
    profile
        .serialize(&mut Serializer::new(&mut buf))
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;

    let path = dir.join("config.msgpack");
    std::fs::write(&path, buf).map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;

    Ok(path)
}

pub fn validate_region(region: &str) -> Result<(), String> {
    let pattern = Regex::new(r"^[a-z]{2}(-gov)?-[a-z]+-\d$").map_err(|e| e.to_string())?;

    if pattern.is_match(region) {
        Ok(())
    } else {
        Err(format!(
            "'{}' is not a valid region (expected something like 'us-east-1')",
            region
        ))
    }
}

/// Vault names are 1-255 characters of letters, digits, '_', '-' and '.'.
pub fn validate_vault_name(vault: &str) -> Result<(), String> {
    let pattern = Regex::new(r"^[A-Za-z0-9_.\-]{1,255}$").map_err(|e| e.to_string())?;

    if pattern.is_match(vault) {
        Ok(())
    } else {
        Err(format!("'{}' is not a valid vault name", vault))
    }
}

/// Merges the global connection flags over the saved profile.
pub fn client_config(matches: &ArgMatches) -> Result<GlacierClientConfig, String> {
    let profile = load_profile()?.unwrap_or_default();
    merge_client_config(matches, profile)
}

fn merge_client_config(matches: &ArgMatches, profile: Profile) -> Result<GlacierClientConfig, String> {
    let flag = |name: &str| matches.get_one::<String>(name).cloned();

    let region = flag("region")
        .or_else(|| Some(profile.region).filter(|region| !region.is_empty()))
        .unwrap_or_else(|| DEFAULT_REGION.to_string());
    validate_region(&region)?;

    let access_key = flag("access-key").or(profile.access_key);
    let secret_key = flag("secret-key").or(profile.secret_key);

    if access_key.is_some() != secret_key.is_some() {
        return Err("Both --access-key and --secret-key are needed to use static credentials".to_string());
    }

    Ok(GlacierClientConfig {
        region,
        access_key,
        secret_key,
        endpoint: flag("endpoint").or(profile.endpoint),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{Arg, Command};

    fn matches(args: &[&str]) -> ArgMatches {
        Command::new("syno-restore")
            .arg(Arg::new("access-key").short('k').long("access-key"))
            .arg(Arg::new("secret-key").short('s').long("secret-key"))
            .arg(Arg::new("region").short('r').long("region"))
            .arg(Arg::new("endpoint").short('e').long("endpoint"))
            .get_matches_from(std::iter::once("syno-restore").chain(args.iter().copied()))
    }

    #[test]
    fn flags_override_profile() {
        let profile = Profile {
            access_key: Some("AKIAPROFILE".to_string()),
            secret_key: Some("profile-secret".to_string()),
            region: "eu-west-1".to_string(),
            endpoint: None,
        };

        let config = merge_client_config(&matches(&["-r", "eu-central-1"]), profile).unwrap();

        assert_eq!(config.region, "eu-central-1");
        assert_eq!(config.access_key.as_deref(), Some("AKIAPROFILE"));
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn defaults_to_us_east_1_without_profile() {
        let config = merge_client_config(&matches(&[]), Profile::default()).unwrap();

        assert_eq!(config.region, DEFAULT_REGION);
        assert!(config.access_key.is_none());
    }

    #[test]
    fn half_credentials_are_rejected() {
        let result = merge_client_config(&matches(&["-k", "AKIA"]), Profile::default());

        assert!(result.is_err());
    }

    #[test]
    fn validates_names() {
        assert!(validate_region("us-east-1").is_ok());
        assert!(validate_region("us-gov-west-1").is_ok());
        assert!(validate_region("mars").is_err());
        assert!(validate_vault_name("Backups_mapping").is_ok());
        assert!(validate_vault_name("bad name").is_err());
        assert!(validate_vault_name("").is_err());
    }
}
