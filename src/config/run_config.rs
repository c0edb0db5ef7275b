// ==========================================
// 保护定值同步系统 - 运行配置
// ==========================================
// 职责: 将 config_kv 中的键值组装为一次运行的类型化配置
// 缺省: 与 RunConfig::default() 一致
// ==========================================

use crate::config::config_manager::{config_keys, ConfigError, ConfigManager, ConfigResult};
use crate::domain::types::Region;
use crate::engine::matching::TieBreakPolicy;
use crate::engine::orchestrator::OrchestratorOptions;
use crate::index::setting_index::{SettingIndexOptions, DEFAULT_EXCLUDED_PATTERNS};
use crate::index::type_resolver::DEFAULT_TYPE_SUFFIXES;
use crate::source::settings_source::RetryPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// 定值库路径环境变量
pub const DB_PATH_ENV: &str = "PROTECTION_SYNC_DB_PATH";

/// 默认定值库文件名
const DEFAULT_DB_FILE: &str = "protection_settings.db";

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub region: Region,

    // ===== 规则与参考表 =====
    pub type_mapping_file: PathBuf,
    pub rules_dir: PathBuf,
    pub alt_name_file: PathBuf,
    pub curve_mapping_file: PathBuf,

    // ===== 匹配 =====
    pub tie_break: TieBreakPolicy,
    pub excluded_patterns: Vec<String>,
    pub type_suffixes: Vec<String>,

    // ===== 写入 =====
    pub batch_write_cache: bool,
    pub mark_failed_out_of_service: bool,
    pub out_of_service_attribute: String,

    // ===== 定值源重试 =====
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        let orchestrator = OrchestratorOptions::default();
        Self {
            region: Region::Energex,
            type_mapping_file: PathBuf::from("mapping/type_mapping.csv"),
            rules_dir: PathBuf::from("mapping"),
            alt_name_file: PathBuf::from("mapping/alt_names.csv"),
            curve_mapping_file: PathBuf::from("mapping/curve_mapping.csv"),
            tie_break: orchestrator.tie_break,
            excluded_patterns: DEFAULT_EXCLUDED_PATTERNS.iter().map(|s| s.to_string()).collect(),
            type_suffixes: DEFAULT_TYPE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            batch_write_cache: orchestrator.batch_write_cache,
            mark_failed_out_of_service: orchestrator.mark_failed_out_of_service,
            out_of_service_attribute: orchestrator.out_of_service_attribute,
            retry: RetryPolicy::default(),
        }
    }
}

impl RunConfig {
    /// 从 config_kv 读取运行配置
    ///
    /// # 返回
    /// - Err: 区域 / 决胜策略取值无法识别（这两项不静默回落）
    pub fn load(config: &ConfigManager) -> ConfigResult<Self> {
        let defaults = Self::default();

        let region = match config.get_config_value(config_keys::REGION)? {
            Some(raw) if !raw.trim().is_empty() => {
                raw.parse::<Region>().map_err(|message| ConfigError::InvalidValue {
                    key: config_keys::REGION.to_string(),
                    message,
                })?
            }
            _ => defaults.region,
        };

        let tie_break = match config.get_config_value(config_keys::TIE_BREAK_POLICY)? {
            Some(raw) if !raw.trim().is_empty() => {
                raw.parse::<TieBreakPolicy>()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: config_keys::TIE_BREAK_POLICY.to_string(),
                        message,
                    })?
            }
            _ => defaults.tie_break,
        };

        let path_or = |key: &str, default: &PathBuf| -> ConfigResult<PathBuf> {
            Ok(config
                .get_config_value(key)?
                .filter(|v| !v.trim().is_empty())
                .map(|v| PathBuf::from(v.trim()))
                .unwrap_or_else(|| default.clone()))
        };

        let retry = RetryPolicy {
            max_attempts: config
                .get_parsed_or(config_keys::RETRY_MAX_ATTEMPTS, defaults.retry.max_attempts)?
                .max(1),
            initial_backoff: Duration::from_millis(config.get_parsed_or(
                config_keys::RETRY_INITIAL_BACKOFF_MS,
                defaults.retry.initial_backoff.as_millis() as u64,
            )?),
            multiplier: config
                .get_parsed_or(config_keys::RETRY_BACKOFF_MULTIPLIER, defaults.retry.multiplier)?,
            max_backoff: Duration::from_millis(config.get_parsed_or(
                config_keys::RETRY_MAX_BACKOFF_MS,
                defaults.retry.max_backoff.as_millis() as u64,
            )?),
        };

        Ok(Self {
            region,
            type_mapping_file: path_or(config_keys::TYPE_MAPPING_FILE, &defaults.type_mapping_file)?,
            rules_dir: path_or(config_keys::RULES_DIR, &defaults.rules_dir)?,
            alt_name_file: path_or(config_keys::ALT_NAME_FILE, &defaults.alt_name_file)?,
            curve_mapping_file: path_or(config_keys::CURVE_MAPPING_FILE, &defaults.curve_mapping_file)?,
            tie_break,
            excluded_patterns: config
                .get_list(config_keys::EXCLUDED_PATTERNS)?
                .unwrap_or(defaults.excluded_patterns),
            type_suffixes: config
                .get_list(config_keys::TYPE_SUFFIXES)?
                .unwrap_or(defaults.type_suffixes),
            batch_write_cache: config
                .get_bool_or(config_keys::BATCH_WRITE_CACHE, defaults.batch_write_cache)?,
            mark_failed_out_of_service: config.get_bool_or(
                config_keys::MARK_FAILED_OUT_OF_SERVICE,
                defaults.mark_failed_out_of_service,
            )?,
            out_of_service_attribute: config.get_string_or(
                config_keys::OUT_OF_SERVICE_ATTRIBUTE,
                &defaults.out_of_service_attribute,
            )?,
            retry,
        })
    }

    pub fn orchestrator_options(&self) -> OrchestratorOptions {
        OrchestratorOptions {
            tie_break: self.tie_break,
            batch_write_cache: self.batch_write_cache,
            mark_failed_out_of_service: self.mark_failed_out_of_service,
            out_of_service_attribute: self.out_of_service_attribute.clone(),
        }
    }

    pub fn index_options(&self) -> SettingIndexOptions {
        SettingIndexOptions::default().with_excluded_patterns(self.excluded_patterns.clone())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }
}

/// 定值库默认路径
///
/// 优先读取环境变量 PROTECTION_SYNC_DB_PATH，否则使用系统数据目录
pub fn default_db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::data_dir()
        .map(|dir| dir.join("protection-settings-sync"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DB_FILE)
}
