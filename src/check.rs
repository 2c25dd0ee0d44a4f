//! `readsync check`: which settings are present, with secrets masked.

use anyhow::Result;

use crate::config::{
    Config, Requirement, ENV_FEISHU_APP_ID, ENV_FEISHU_APP_SECRET, ENV_FEISHU_APP_TOKEN,
    ENV_FEISHU_TABLE_ID, ENV_READWISE_TOKEN,
};

/// One row of the `readsync check` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingStatus {
    pub name: &'static str,
    pub value: String,
    pub ok: bool,
}

pub fn get_settings(config: &Config) -> Vec<SettingStatus> {
    let secret = |name: &'static str, value: &Option<String>| SettingStatus {
        name,
        value: value.as_deref().map(mask).unwrap_or_else(|| "MISSING".to_string()),
        ok: value.as_deref().is_some_and(|v| !v.trim().is_empty()),
    };
    let plain = |name: &'static str, value: String| SettingStatus {
        name,
        value,
        ok: true,
    };

    vec![
        secret(ENV_READWISE_TOKEN, &config.source.token),
        plain("source.tag", config.source.tag.clone()),
        plain("source.api_base", config.source.api_base.clone()),
        plain(
            "source.lookback_hours",
            config
                .source
                .lookback_hours
                .map(|h| h.to_string())
                .unwrap_or_else(|| "none".to_string()),
        ),
        secret(ENV_FEISHU_APP_ID, &config.destination.app_id),
        secret(ENV_FEISHU_APP_SECRET, &config.destination.app_secret),
        secret(ENV_FEISHU_APP_TOKEN, &config.destination.app_token),
        secret(ENV_FEISHU_TABLE_ID, &config.destination.table_id),
        plain("destination.api_base", config.destination.api_base.clone()),
        plain("mapping.marker_tag", config.marker_tag().to_string()),
        plain(
            "mapping.utc_offset_hours",
            config.mapping.utc_offset_hours.to_string(),
        ),
    ]
}

/// Show the first and last two characters only.
fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}…{}", head, tail)
}

pub fn run_check(config: &Config) -> Result<()> {
    println!("{:<26} {:<6} VALUE", "SETTING", "OK");
    for status in get_settings(config) {
        println!("{:<26} {:<6} {}", status.name, status.ok, status.value);
    }

    let missing = config.missing_settings(Requirement::Full);
    if missing.is_empty() {
        println!("ready to sync");
    } else {
        println!("missing: {}", missing.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_hides_secrets() {
        assert_eq!(mask("abc"), "***");
        assert_eq!(mask("t-g10498hEGT5BA2"), "t-…A2");
    }

    #[test]
    fn test_settings_report_missing() {
        let mut config = Config::default();
        config.source.token = Some("rw-secret-token".to_string());

        let settings = get_settings(&config);
        let token = settings.iter().find(|s| s.name == ENV_READWISE_TOKEN).unwrap();
        assert!(token.ok);
        assert!(!token.value.contains("secret"));

        let table = settings.iter().find(|s| s.name == ENV_FEISHU_TABLE_ID).unwrap();
        assert!(!table.ok);
        assert_eq!(table.value, "MISSING");
    }
}
