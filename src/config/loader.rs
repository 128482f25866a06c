//! 配置加载器实现
//!
//! 提供TOML配置文件解析、环境变量替换和错误处理功能

use crate::config::types::{validate_config, Config};
use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;

/// 配置加载器trait，定义配置加载接口
#[async_trait]
pub trait ConfigLoader: Send + Sync {
    /// 从文件加载配置
    ///
    /// # 参数
    /// * `path` - 配置文件路径
    ///
    /// # 返回
    /// * `Result<Config>` - 加载的配置或错误
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config>;

    /// 从字符串加载配置
    async fn load_from_string(&self, content: &str) -> Result<Config>;

    /// 验证配置
    fn validate(&self, config: &Config) -> Result<()>;
}

/// TOML配置加载器实现
#[derive(Debug, Clone)]
pub struct TomlConfigLoader {
    /// 是否启用环境变量替换
    enable_env_substitution: bool,
}

impl TomlConfigLoader {
    /// 创建新的TOML配置加载器
    ///
    /// # 参数
    /// * `enable_env_substitution` - 是否启用环境变量替换
    pub fn new(enable_env_substitution: bool) -> Self {
        Self {
            enable_env_substitution,
        }
    }

    /// 替换字符串中 `${VAR_NAME}` 格式的环境变量
    fn substitute_env_vars(&self, content: &str) -> Result<String> {
        if !self.enable_env_substitution {
            return Ok(content.to_string());
        }

        let env_var_regex = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .map_err(|e| ConfigError::ParseError(format!("正则表达式错误: {}", e)))?;

        let mut result = content.to_string();

        for captures in env_var_regex.captures_iter(content) {
            let full_match = &captures[0];
            let var_name = &captures[1];

            match std::env::var(var_name) {
                Ok(value) => {
                    result = result.replace(full_match, &value);
                }
                Err(_) => {
                    return Err(ConfigError::EnvVarError {
                        var: var_name.to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(result)
    }

    /// 解析TOML内容
    fn parse_toml(&self, content: &str) -> Result<Config> {
        let processed_content = self.substitute_env_vars(content)?;

        let config: Config = toml::from_str(&processed_content)
            .map_err(|e| ConfigError::ParseError(format!("TOML解析失败: {}", e)))?;

        Ok(config)
    }
}

#[async_trait]
impl ConfigLoader for TomlConfigLoader {
    async fn load_from_file<P: AsRef<Path> + Send>(&self, path: P) -> Result<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_string_lossy().to_string(),
            }
            .into());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::ParseError(format!("读取文件失败: {}", e)))?;

        let config = self.parse_toml(&content)?;
        self.validate(&config)?;

        log::info!("成功加载配置文件: {}", path.display());
        log::debug!("配置内容: {:?}", config);

        Ok(config)
    }

    async fn load_from_string(&self, content: &str) -> Result<Config> {
        let config = self.parse_toml(content)?;
        self.validate(&config)?;

        log::debug!("成功解析配置字符串");

        Ok(config)
    }

    fn validate(&self, config: &Config) -> Result<()> {
        validate_config(config).map_err(|e| ConfigError::ValidationError(e).into())
    }
}

/// 获取默认配置文件路径
///
/// 优先使用当前目录下的 `config.toml`，否则使用用户配置目录
/// `<config_dir>/cluster-vitals/config.toml`。
pub fn get_default_config_path() -> std::path::PathBuf {
    if Path::new("config.toml").exists() {
        return std::path::PathBuf::from("config.toml");
    }

    dirs::config_dir()
        .map(|config_dir| config_dir.join("cluster-vitals").join("config.toml"))
        .unwrap_or_else(|| std::path::PathBuf::from("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ProbeProtocol;
    use crate::error::VitalsError;
    use serial_test::serial;
    use std::env;
    use std::io::Write;

    const TEST_CONFIG_TOML: &str = r#"
[global]
node_name = "node-1"
log_level = "debug"
log_file = "/var/log/cluster-vitals.log"
retry_attempts = 2

[[checkers]]
name = "dns-reachability"
type = "network"
interval_seconds = 60
timeout_seconds = 30

[checkers.network]
namespace = "kube-system"
peer_selector = "k8s-app=kube-dns"
service_name = "kube-dns"
excluded_nodes = ["node-2"]

[[checkers]]
name = "http-reachability"
type = "network"

[checkers.network]
protocol = "http"
port = 8080
http_path = "/healthz"

[[discovery.peers]]
name = "coredns-a"
namespace = "kube-system"
node_name = "node-3"
phase = "running"
ready = true
address = "10.0.0.11"
labels = { "k8s-app" = "kube-dns" }

[[discovery.services]]
name = "kube-dns"
namespace = "kube-system"
address = "10.96.0.10"
"#;

    const TEST_CONFIG_WITH_ENV_VARS: &str = r#"
[global]
node_name = "${CLUSTER_VITALS_TEST_NODE}"

[[checkers]]
name = "dns-reachability"
type = "network"

[checkers.network]
service_name = "kube-dns"
"#;

    #[tokio::test]
    async fn test_toml_parsing() {
        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_string(TEST_CONFIG_TOML).await.unwrap();

        assert_eq!(config.global.node_name, "node-1");
        assert_eq!(config.global.retry_attempts, 2);
        assert_eq!(
            config.global.log_file.as_deref(),
            Some(std::path::Path::new("/var/log/cluster-vitals.log"))
        );
        assert_eq!(config.checkers.len(), 2);

        let dns = &config.checkers[0];
        assert_eq!(dns.checker_type, "network");
        assert_eq!(dns.interval_seconds, 60);
        let spec = dns.network.as_ref().unwrap();
        assert_eq!(spec.excluded_nodes, vec!["node-2".to_string()]);
        assert_eq!(spec.protocol, ProbeProtocol::Dns);

        let http = &config.checkers[1];
        assert_eq!(http.interval_seconds, 0);
        let spec = http.network.as_ref().unwrap();
        assert_eq!(spec.protocol, ProbeProtocol::Http);
        assert_eq!(spec.port, 8080);

        assert_eq!(config.discovery.peers.len(), 1);
        assert_eq!(config.discovery.services.len(), 1);
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution() {
        env::set_var("CLUSTER_VITALS_TEST_NODE", "worker-7");

        let loader = TomlConfigLoader::new(true);
        let config = loader
            .load_from_string(TEST_CONFIG_WITH_ENV_VARS)
            .await
            .unwrap();

        assert_eq!(config.global.node_name, "worker-7");
        assert!(config.global.log_file.is_none());

        env::remove_var("CLUSTER_VITALS_TEST_NODE");
    }

    #[tokio::test]
    #[serial]
    async fn test_env_var_substitution_missing_var() {
        env::remove_var("CLUSTER_VITALS_TEST_NODE");

        let loader = TomlConfigLoader::new(true);
        let result = loader.load_from_string(TEST_CONFIG_WITH_ENV_VARS).await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("CLUSTER_VITALS_TEST_NODE"));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_at_load() {
        let content = r#"
[[checkers]]
name = "dup"
type = "network"
[checkers.network]

[[checkers]]
name = "dup"
type = "network"
[checkers.network]
"#;
        let loader = TomlConfigLoader::new(false);
        let err = loader.load_from_string(content).await.unwrap_err();
        assert!(matches!(
            err,
            VitalsError::Config(ConfigError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TEST_CONFIG_TOML.as_bytes()).unwrap();

        let loader = TomlConfigLoader::new(false);
        let config = loader.load_from_file(file.path()).await.unwrap();
        assert_eq!(config.checkers[0].name, "dns-reachability");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let loader = TomlConfigLoader::new(false);
        let err = loader
            .load_from_file("/nonexistent/cluster-vitals.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VitalsError::Config(ConfigError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_substitute_env_vars_disabled() {
        let loader = TomlConfigLoader::new(false);
        let content = "test ${VAR} content";
        let result = loader.substitute_env_vars(content).unwrap();
        assert_eq!(result, content);
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }
}
