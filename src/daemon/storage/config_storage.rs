use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::{NaiveDate, Weekday};
use fs4::tokio::AsyncFileExt;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncWriteExt},
};
use tracing::{debug, warn};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Preferences of the person being tracked. Field names follow the json clients already send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    pub breaks: Vec<serde_json::Value>,
    pub daily_work_hours: f64,
    pub sick_days_monthly_rate: f64,
    pub vacation_days_monthly_rate: f64,
    /// Dates formatted as `YYYY-MM-DD`.
    pub holidays: Vec<String>,
    /// Weekday names, for example `mon` or `Tuesday`.
    pub working_days: Vec<String>,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            breaks: vec![],
            daily_work_hours: 8.,
            sick_days_monthly_rate: 8.,
            vacation_days_monthly_rate: 8.,
            holidays: vec![],
            working_days: vec![],
        }
    }
}

impl UserConfig {
    /// Configured working days. Monday to Friday when nothing usable is configured.
    pub fn working_weekdays(&self) -> Vec<Weekday> {
        let days = self
            .working_days
            .iter()
            .filter_map(|v| match v.trim().parse::<Weekday>() {
                Ok(day) => Some(day),
                Err(_) => {
                    warn!("Ignoring unknown working day {v}");
                    None
                }
            })
            .collect::<Vec<_>>();
        if days.is_empty() {
            vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ]
        } else {
            days
        }
    }

    pub fn holiday_dates(&self) -> Vec<NaiveDate> {
        self.holidays
            .iter()
            .filter_map(|v| match NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d") {
                Ok(day) => Some(day),
                Err(e) => {
                    warn!("Ignoring holiday {v}: {e}");
                    None
                }
            })
            .collect()
    }
}

/// Keeps [UserConfig] as a json file in the application directory.
pub struct ConfigStorage {
    path: PathBuf,
}

impl ConfigStorage {
    pub fn new(application_dir: PathBuf) -> Self {
        Self {
            path: application_dir.join(CONFIG_FILE_NAME),
        }
    }

    /// Reads the config. A missing file means defaults.
    pub async fn load(&self) -> Result<UserConfig> {
        async fn read(path: &Path) -> std::result::Result<String, std::io::Error> {
            let mut file = File::open(path).await?;
            file.lock_shared()?;
            let mut data = String::new();
            let result = file.read_to_string(&mut data).await;
            file.unlock_async().await?;
            result?;
            Ok(data)
        }

        match read(&self.path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {:?}, using defaults", self.path);
                Ok(UserConfig::default())
            }
            Err(e) => Err(e)?,
        }
    }

    pub async fn save(&self, config: &UserConfig) -> Result<()> {
        let data = serde_json::to_string_pretty(config)?;
        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        file.lock_exclusive()?;
        let result = async {
            file.set_len(0).await?;
            file.write_all(data.as_bytes()).await?;
            file.flush().await?;
            file.sync_data().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;
        file.unlock_async().await?;
        result?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{NaiveDate, Weekday};
    use tempfile::tempdir;

    use super::{ConfigStorage, UserConfig};

    #[tokio::test]
    async fn test_missing_config_is_default() -> Result<()> {
        let dir = tempdir()?;
        let storage = ConfigStorage::new(dir.path().to_path_buf());
        assert_eq!(storage.load().await?, UserConfig::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_config_roundtrip_uses_client_field_names() -> Result<()> {
        let dir = tempdir()?;
        let storage = ConfigStorage::new(dir.path().to_path_buf());
        let config: UserConfig = serde_json::from_str(
            r#"{"dailyWorkHours": 6, "workingDays": ["mon", "Tuesday"], "holidays": ["2024-05-01"]}"#,
        )?;
        assert_eq!(config.daily_work_hours, 6.);
        assert_eq!(config.vacation_days_monthly_rate, 8.);
        storage.save(&config).await?;
        assert_eq!(storage.load().await?, config);
        assert_eq!(config.working_weekdays(), vec![Weekday::Mon, Weekday::Tue]);
        assert_eq!(
            config.holiday_dates(),
            vec![NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_save_replaces_longer_config() -> Result<()> {
        let dir = tempdir()?;
        let storage = ConfigStorage::new(dir.path().to_path_buf());
        storage
            .save(&UserConfig {
                holidays: (1..=28).map(|d| format!("2024-02-{d:02}")).collect(),
                ..UserConfig::default()
            })
            .await?;
        storage.save(&UserConfig::default()).await?;
        assert_eq!(storage.load().await?, UserConfig::default());
        Ok(())
    }

    #[test]
    fn test_default_working_days() {
        assert_eq!(UserConfig::default().working_weekdays().len(), 5);
    }
}
