//! 配置模块，负责加载分析器的JSON配置文件

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置文件不存在: {}", .0.display())]
    NotFound(PathBuf),
    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("无法解析JSON配置文件 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// 分析器配置，JSON 中缺省的字段使用默认值
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// 语句中没有 backfill-tolerance 指令时使用的回填容忍时间（秒）
    pub backfill_tolerance_secs: u64,
    /// 携带 SQL 语句的 URL 参数名
    pub query_param: String,
    /// ClickHouse HTTP 接口地址
    pub upstream_url: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            backfill_tolerance_secs: 60,
            query_param: "query".to_string(),
            upstream_url: "http://127.0.0.1:8123/".to_string(),
        }
    }
}

impl AnalyzerConfig {
    /// 从JSON文件加载配置
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(ConfigError::NotFound(path_ref.to_path_buf()));
        }

        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path_ref.to_path_buf(),
            source,
        })
    }

    pub fn backfill_tolerance(&self) -> Duration {
        Duration::from_secs(self.backfill_tolerance_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;

    #[test]
    fn test_load_valid_json_config() {
        // 创建临时配置文件
        let temp_file = "test_analyzer_config.json";
        let mut file = fs::File::create(temp_file).unwrap();
        writeln!(file, r#"{{
            "backfill_tolerance_secs": 30,
            "query_param": "sql",
            "upstream_url": "http://clickhouse:8123/"
        }}"#).unwrap();

        let config = AnalyzerConfig::from_json_file(temp_file).unwrap();
        assert_eq!(config.backfill_tolerance(), Duration::from_secs(30));
        assert_eq!(config.query_param, "sql");
        assert_eq!(config.upstream_url, "http://clickhouse:8123/");

        // 清理
        fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_omitted_fields_use_defaults() {
        let temp_file = "test_analyzer_partial.json";
        let mut file = fs::File::create(temp_file).unwrap();
        writeln!(file, r#"{{ "query_param": "q" }}"#).unwrap();

        let config = AnalyzerConfig::from_json_file(temp_file).unwrap();
        assert_eq!(config.query_param, "q");
        assert_eq!(config.backfill_tolerance_secs, 60);
        assert_eq!(config.upstream_url, AnalyzerConfig::default().upstream_url);

        fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_invalid_json_config() {
        let temp_file = "test_analyzer_invalid.json";
        let mut file = fs::File::create(temp_file).unwrap();
        writeln!(file, "invalid json").unwrap();

        let result = AnalyzerConfig::from_json_file(temp_file);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));

        fs::remove_file(temp_file).ok();
    }

    #[test]
    fn test_missing_file() {
        let result = AnalyzerConfig::from_json_file("non_existent_analyzer.json");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
